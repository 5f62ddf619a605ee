//! Structured hard constraints a candidate must satisfy.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Hard constraints produced by a criteria parser.
///
/// Every field is optional. An absent field and an empty list both impose no
/// constraint. Unknown fields are ignored when deserializing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardCriteria {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_experience: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_experience: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_skills: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded_skills: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industries: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub companies: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub education_keywords: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_connections: Option<u32>,
}

impl HardCriteria {
    /// True when no field constrains anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let list_empty = |list: &Option<Vec<String>>| list.as_ref().is_none_or(Vec::is_empty);

        self.min_experience.is_none()
            && self.max_experience.is_none()
            && self.min_connections.is_none()
            && list_empty(&self.required_skills)
            && list_empty(&self.excluded_skills)
            && list_empty(&self.locations)
            && list_empty(&self.industries)
            && list_empty(&self.companies)
            && list_empty(&self.education_keywords)
    }

    /// Reads criteria from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| EngineError::Config {
            reason: format!("cannot read criteria file {}: {e}", path.display()),
        })?;
        serde_json::from_str(&content).map_err(|e| EngineError::Config {
            reason: format!("invalid criteria in {}: {e}", path.display()),
        })
    }
}
