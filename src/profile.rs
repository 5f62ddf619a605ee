//! Profile records and the ordered corpus the index is built over.

use std::collections::HashSet;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::vector::ProfileIndex;

/// A professional profile as produced by upstream extraction.
///
/// Attributes used by hard-criteria filtering are optional or possibly empty;
/// a missing attribute makes the corresponding criterion fail rather than
/// raising. Unknown JSON fields are ignored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Profile {
    pub profile_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, alias = "current_title", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_years: Option<f64>,

    #[serde(default)]
    pub skills: Vec<String>,

    #[serde(default)]
    pub work_locations: Vec<String>,

    #[serde(default)]
    pub study_locations: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,

    #[serde(default, alias = "current_company", skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,

    #[serde(
        default,
        alias = "highest_education_level",
        skip_serializing_if = "Option::is_none"
    )]
    pub education: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connections: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,

    /// Precomputed embedding, if the corpus ships one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Profile {
    /// Text sent to the embedding provider for this profile.
    ///
    /// Uses `raw_text` when present, otherwise a composition of the
    /// descriptive fields.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        if let Some(raw) = self.raw_text.as_deref().filter(|t| !t.trim().is_empty()) {
            return raw.to_string();
        }

        let mut parts: Vec<&str> = Vec::new();
        parts.extend(self.name.as_deref());
        parts.extend(self.title.as_deref());
        parts.extend(self.industry.as_deref());
        parts.extend(self.company.as_deref());
        parts.extend(self.education.as_deref());
        parts.extend(self.skills.iter().map(String::as_str));
        parts.extend(self.summary.as_deref());
        parts.join(" ")
    }

    /// Work and study locations together, work first.
    pub fn all_locations(&self) -> impl Iterator<Item = &str> {
        self.work_locations
            .iter()
            .chain(self.study_locations.iter())
            .map(String::as_str)
    }
}

/// Ordered, immutable profile corpus addressed by `ProfileIndex`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileStore {
    profiles: Vec<Profile>,
}

impl ProfileStore {
    /// Wraps `profiles`, rejecting duplicate or empty `profile_id`s.
    pub fn new(profiles: Vec<Profile>) -> EngineResult<Self> {
        if ProfileIndex::from_usize(profiles.len()).is_none() {
            return Err(EngineError::Corpus {
                reason: format!("{} profiles exceed the addressable range", profiles.len()),
            });
        }

        let mut seen = HashSet::with_capacity(profiles.len());
        for (position, profile) in profiles.iter().enumerate() {
            if profile.profile_id.trim().is_empty() {
                return Err(EngineError::Corpus {
                    reason: format!("profile at position {position} has an empty profile_id"),
                });
            }
            if !seen.insert(profile.profile_id.as_str()) {
                return Err(EngineError::Corpus {
                    reason: format!("duplicate profile_id '{}'", profile.profile_id),
                });
            }
        }

        Ok(Self { profiles })
    }

    /// Loads a JSON Lines corpus, one profile object per non-blank line.
    pub fn load_jsonl(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| EngineError::Corpus {
            reason: format!("cannot open '{}': {e}", path.display()),
        })?;

        let mut profiles = Vec::new();
        for (line_number, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| EngineError::Corpus {
                reason: format!("cannot read '{}': {e}", path.display()),
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let profile: Profile =
                serde_json::from_str(&line).map_err(|e| EngineError::Corpus {
                    reason: format!("{}:{}: {e}", path.display(), line_number + 1),
                })?;
            profiles.push(profile);
        }

        tracing::debug!(path = %path.display(), profiles = profiles.len(), "loaded profile corpus");
        Self::new(profiles)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: ProfileIndex) -> Option<&Profile> {
        self.profiles.get(index.as_usize())
    }

    #[must_use]
    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// Iterates profiles together with their global positions.
    pub fn iter(&self) -> impl Iterator<Item = (ProfileIndex, &Profile)> {
        // The constructor guarantees every position fits in a u32
        self.profiles
            .iter()
            .enumerate()
            .map(|(i, profile)| (ProfileIndex::new(i as u32), profile))
    }
}
