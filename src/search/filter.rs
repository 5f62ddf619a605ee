//! Hard-criteria filtering.
//!
//! Each criteria category is one row of [`CATEGORIES`]: the policy that
//! combines its checks, a function extracting the checks from
//! [`HardCriteria`], and a matcher testing one check against a profile.
//! Categories are ANDed. A category with no checks passes every profile.
//!
//! A matcher returns `None` when the profile lacks the attribute the check
//! needs; the category then fails for that profile. Evaluation never errors.

use crate::profile::{Profile, ProfileStore};
use crate::search::criteria::HardCriteria;
use crate::search::retriever::Candidate;

/// How the checks of one category combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Every check must match.
    StrictAll,
    /// No check may match.
    StrictNone,
    /// At least one check must match.
    LenientAny,
}

/// A single test derived from the criteria.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Check<'c> {
    AtLeast(f64),
    AtMost(f64),
    Term(&'c str),
}

/// One row of the filter table.
pub struct Category {
    pub name: &'static str,
    pub policy: Policy,
    pub checks: for<'c> fn(&'c HardCriteria) -> Vec<Check<'c>>,
    pub matcher: fn(&Profile, &Check<'_>) -> Option<bool>,
}

impl std::fmt::Debug for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Category")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Category {
    /// Whether `profile` satisfies this category under `criteria`.
    #[must_use]
    pub fn admits(&self, profile: &Profile, criteria: &HardCriteria) -> bool {
        let checks = (self.checks)(criteria);
        if checks.is_empty() {
            return true;
        }

        let mut outcomes = checks.iter().map(|check| (self.matcher)(profile, check));
        match self.policy {
            Policy::StrictAll => outcomes.all(|o| o == Some(true)),
            Policy::StrictNone => outcomes.all(|o| o == Some(false)),
            Policy::LenientAny => outcomes.any(|o| o == Some(true)),
        }
    }
}

pub static CATEGORIES: &[Category] = &[
    Category {
        name: "experience",
        policy: Policy::StrictAll,
        checks: experience_checks,
        matcher: experience_matches,
    },
    Category {
        name: "connections",
        policy: Policy::StrictAll,
        checks: connection_checks,
        matcher: connections_match,
    },
    Category {
        name: "excluded_skills",
        policy: Policy::StrictNone,
        checks: excluded_skill_checks,
        matcher: has_exact_skill,
    },
    Category {
        name: "required_skills",
        policy: Policy::LenientAny,
        checks: required_skill_checks,
        matcher: has_overlapping_skill,
    },
    Category {
        name: "locations",
        policy: Policy::LenientAny,
        checks: location_checks,
        matcher: has_location,
    },
    Category {
        name: "industries",
        policy: Policy::LenientAny,
        checks: industry_checks,
        matcher: industry_matches,
    },
    Category {
        name: "companies",
        policy: Policy::LenientAny,
        checks: company_checks,
        matcher: company_matches,
    },
    Category {
        name: "education",
        policy: Policy::LenientAny,
        checks: education_checks,
        matcher: education_matches,
    },
];

fn experience_checks(criteria: &HardCriteria) -> Vec<Check<'_>> {
    criteria
        .min_experience
        .map(Check::AtLeast)
        .into_iter()
        .chain(criteria.max_experience.map(Check::AtMost))
        .collect()
}

fn connection_checks(criteria: &HardCriteria) -> Vec<Check<'_>> {
    criteria
        .min_connections
        .map(|n| Check::AtLeast(f64::from(n)))
        .into_iter()
        .collect()
}

fn excluded_skill_checks(criteria: &HardCriteria) -> Vec<Check<'_>> {
    terms(&criteria.excluded_skills)
}

fn required_skill_checks(criteria: &HardCriteria) -> Vec<Check<'_>> {
    terms(&criteria.required_skills)
}

fn location_checks(criteria: &HardCriteria) -> Vec<Check<'_>> {
    terms(&criteria.locations)
}

fn industry_checks(criteria: &HardCriteria) -> Vec<Check<'_>> {
    terms(&criteria.industries)
}

fn company_checks(criteria: &HardCriteria) -> Vec<Check<'_>> {
    terms(&criteria.companies)
}

fn education_checks(criteria: &HardCriteria) -> Vec<Check<'_>> {
    terms(&criteria.education_keywords)
}

fn terms(list: &Option<Vec<String>>) -> Vec<Check<'_>> {
    list.iter()
        .flatten()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(Check::Term)
        .collect()
}

fn bound(value: Option<f64>, check: &Check<'_>) -> Option<bool> {
    let value = value?;
    match *check {
        Check::AtLeast(min) => Some(value >= min),
        Check::AtMost(max) => Some(value <= max),
        Check::Term(_) => None,
    }
}

fn term(check: &Check<'_>) -> Option<String> {
    match check {
        Check::Term(t) => Some(t.trim().to_lowercase()),
        _ => None,
    }
}

fn experience_matches(profile: &Profile, check: &Check<'_>) -> Option<bool> {
    bound(profile.experience_years, check)
}

fn connections_match(profile: &Profile, check: &Check<'_>) -> Option<bool> {
    bound(profile.connections.map(f64::from), check)
}

fn has_exact_skill(profile: &Profile, check: &Check<'_>) -> Option<bool> {
    let term = term(check)?;
    Some(profile.skills.iter().any(|s| s.trim().to_lowercase() == term))
}

fn has_overlapping_skill(profile: &Profile, check: &Check<'_>) -> Option<bool> {
    let term = term(check)?;
    Some(profile.skills.iter().any(|s| overlaps(s, &term)))
}

fn has_location(profile: &Profile, check: &Check<'_>) -> Option<bool> {
    let term = term(check)?;
    Some(profile.all_locations().any(|l| overlaps(l, &term)))
}

fn industry_matches(profile: &Profile, check: &Check<'_>) -> Option<bool> {
    contains(profile.industry.as_deref(), check)
}

fn company_matches(profile: &Profile, check: &Check<'_>) -> Option<bool> {
    contains(profile.company.as_deref(), check)
}

fn education_matches(profile: &Profile, check: &Check<'_>) -> Option<bool> {
    contains(profile.education.as_deref(), check)
}

/// Case-insensitive membership or containment in either direction.
fn overlaps(value: &str, needle: &str) -> bool {
    let value = value.trim().to_lowercase();
    !value.is_empty() && (value.contains(needle) || needle.contains(value.as_str()))
}

/// The criterion is a case-insensitive substring of a scalar field.
fn contains(field: Option<&str>, check: &Check<'_>) -> Option<bool> {
    let field = field?.to_lowercase();
    term(check).map(|t| field.contains(&t))
}

/// Whether `profile` passes every category.
#[must_use]
pub fn passes(profile: &Profile, criteria: &HardCriteria) -> bool {
    CATEGORIES.iter().all(|category| category.admits(profile, criteria))
}

/// Keeps the candidates whose profiles pass `criteria`, in input order.
///
/// Candidates pointing outside `store` are dropped.
#[must_use]
pub fn filter_candidates(
    candidates: Vec<Candidate>,
    store: &ProfileStore,
    criteria: &HardCriteria,
) -> Vec<Candidate> {
    if criteria.is_empty() {
        return candidates
            .into_iter()
            .filter(|c| store.get(c.index).is_some())
            .collect();
    }

    let before = candidates.len();
    let kept: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| store.get(c.index).is_some_and(|p| passes(p, criteria)))
        .collect();

    tracing::debug!(before, after = kept.len(), "applied hard criteria");
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{ClusterId, ProfileIndex, Score};

    fn lawyer() -> Profile {
        Profile {
            profile_id: "lawyer".to_string(),
            experience_years: Some(5.0),
            skills: vec![" Corporate Law ".to_string(), "M&A".to_string()],
            work_locations: vec!["London, UK".to_string()],
            study_locations: vec!["Oxford".to_string()],
            industry: Some("Legal Services".to_string()),
            company: Some("Clifford Chance".to_string()),
            education: Some("LLB Law".to_string()),
            connections: Some(480),
            ..Profile::default()
        }
    }

    fn sparse() -> Profile {
        Profile {
            profile_id: "sparse".to_string(),
            ..Profile::default()
        }
    }

    #[test]
    fn test_numeric_bounds_are_strict() {
        let within = HardCriteria {
            min_experience: Some(2.0),
            max_experience: Some(5.0),
            ..HardCriteria::default()
        };
        assert!(passes(&lawyer(), &within));
        assert!(!passes(&sparse(), &within));

        let above = HardCriteria {
            max_experience: Some(4.0),
            ..HardCriteria::default()
        };
        assert!(!passes(&lawyer(), &above));

        let connections = HardCriteria {
            min_connections: Some(500),
            ..HardCriteria::default()
        };
        assert!(!passes(&lawyer(), &connections));
    }

    #[test]
    fn test_excluded_skill_is_exact_match() {
        let exact = HardCriteria {
            excluded_skills: Some(vec!["corporate law".to_string()]),
            ..HardCriteria::default()
        };
        assert!(!passes(&lawyer(), &exact));

        let partial = HardCriteria {
            excluded_skills: Some(vec!["law".to_string()]),
            ..HardCriteria::default()
        };
        assert!(passes(&lawyer(), &partial));
    }

    #[test]
    fn test_required_skills_match_any_in_either_direction() {
        let criteria = HardCriteria {
            required_skills: Some(vec!["Python".to_string(), "Corporate Lawyer".to_string()]),
            ..HardCriteria::default()
        };
        assert!(passes(&lawyer(), &criteria));

        let none = HardCriteria {
            required_skills: Some(vec!["Python".to_string()]),
            ..HardCriteria::default()
        };
        assert!(!passes(&lawyer(), &none));
        assert!(!passes(&sparse(), &none));
    }

    #[test]
    fn test_locations_use_work_and_study() {
        let criteria = HardCriteria {
            locations: Some(vec!["Paris".to_string(), "oxford".to_string()]),
            ..HardCriteria::default()
        };
        assert!(passes(&lawyer(), &criteria));

        let london = HardCriteria {
            locations: Some(vec!["london".to_string()]),
            ..HardCriteria::default()
        };
        assert!(passes(&lawyer(), &london));
    }

    #[test]
    fn test_missing_scalar_fails_category() {
        let criteria = HardCriteria {
            industries: Some(vec!["legal".to_string()]),
            ..HardCriteria::default()
        };
        assert!(passes(&lawyer(), &criteria));
        assert!(!passes(&sparse(), &criteria));

        let education = HardCriteria {
            education_keywords: Some(vec!["MBA".to_string(), "llb".to_string()]),
            ..HardCriteria::default()
        };
        assert!(passes(&lawyer(), &education));
        assert!(!passes(&sparse(), &education));
    }

    #[test]
    fn test_empty_lists_impose_nothing() {
        let criteria = HardCriteria {
            required_skills: Some(Vec::new()),
            companies: Some(vec!["   ".to_string()]),
            ..HardCriteria::default()
        };
        assert!(passes(&sparse(), &criteria));
    }

    #[test]
    fn test_filter_preserves_order_and_is_idempotent() {
        let junior = Profile {
            profile_id: "junior".to_string(),
            experience_years: Some(1.0),
            skills: vec!["corporate law".to_string()],
            ..Profile::default()
        };
        let store = ProfileStore::new(vec![lawyer(), sparse(), junior]).unwrap();
        let candidates: Vec<Candidate> = [2u32, 1, 0, 7]
            .iter()
            .map(|&i| Candidate {
                index: ProfileIndex::new(i),
                score: Score::new(0.5).unwrap(),
                cluster_id: ClusterId::new(0),
            })
            .collect();
        let criteria = HardCriteria {
            required_skills: Some(vec!["corporate law".to_string()]),
            ..HardCriteria::default()
        };

        let once = filter_candidates(candidates, &store, &criteria);
        let kept: Vec<u32> = once.iter().map(|c| c.index.get()).collect();
        assert_eq!(kept, vec![2, 0]);

        let twice = filter_candidates(once.clone(), &store, &criteria);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_every_category_is_named_once() {
        let mut names: Vec<&str> = CATEGORIES.iter().map(|c| c.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), CATEGORIES.len());
    }
}
