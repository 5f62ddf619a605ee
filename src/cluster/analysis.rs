//! Descriptive statistics for each built cluster.

use std::collections::HashMap;

use serde::Serialize;

use crate::cluster::ClusterSlot;
use crate::profile::{Profile, ProfileStore};
use crate::vector::ClusterId;

const TOP_INDUSTRIES: usize = 5;
const TOP_COMPANIES: usize = 5;
const TOP_SKILLS: usize = 10;
const TOP_LOCATIONS: usize = 5;

/// What a cluster is made of.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub cluster_id: ClusterId,
    pub size: usize,
    /// Mean over members that report experience; `None` if none do.
    pub average_experience: Option<f64>,
    pub top_industries: Vec<(String, usize)>,
    pub top_companies: Vec<(String, usize)>,
    /// Skills are counted trimmed and lowercased.
    pub top_skills: Vec<(String, usize)>,
    pub top_locations: Vec<(String, usize)>,
}

/// Summarizes every built cluster, in cluster id order.
#[must_use]
pub fn analyze_clusters(store: &ProfileStore, slots: &[ClusterSlot]) -> Vec<ClusterSummary> {
    slots
        .iter()
        .filter_map(ClusterSlot::as_built)
        .map(|cluster| {
            let members: Vec<&Profile> = cluster
                .positions()
                .iter()
                .filter_map(|&p| store.get(p))
                .collect();
            summarize(cluster.id(), &members)
        })
        .collect()
}

fn summarize(cluster_id: ClusterId, members: &[&Profile]) -> ClusterSummary {
    let experience: Vec<f64> = members.iter().filter_map(|p| p.experience_years).collect();
    let average_experience =
        (!experience.is_empty()).then(|| experience.iter().sum::<f64>() / experience.len() as f64);

    let mut industries = Counter::default();
    let mut companies = Counter::default();
    let mut skills = Counter::default();
    let mut locations = Counter::default();

    for profile in members {
        industries.add_opt(profile.industry.as_deref());
        companies.add_opt(profile.company.as_deref());
        for skill in &profile.skills {
            let skill = skill.trim().to_lowercase();
            if !skill.is_empty() {
                skills.add(skill);
            }
        }
        for location in profile.all_locations() {
            locations.add_opt(Some(location));
        }
    }

    let summary = ClusterSummary {
        cluster_id,
        size: members.len(),
        average_experience,
        top_industries: industries.top(TOP_INDUSTRIES),
        top_companies: companies.top(TOP_COMPANIES),
        top_skills: skills.top(TOP_SKILLS),
        top_locations: locations.top(TOP_LOCATIONS),
    };

    tracing::info!(
        cluster = %cluster_id,
        size = summary.size,
        avg_experience = ?summary.average_experience,
        top_industries = ?summary.top_industries.iter().take(3).map(|(n, _)| n).collect::<Vec<_>>(),
        top_skills = ?summary.top_skills.iter().take(5).map(|(n, _)| n).collect::<Vec<_>>(),
        "cluster summary"
    );

    summary
}

#[derive(Default)]
struct Counter(HashMap<String, usize>);

impl Counter {
    fn add(&mut self, key: String) {
        *self.0.entry(key).or_default() += 1;
    }

    fn add_opt(&mut self, key: Option<&str>) {
        if let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) {
            self.add(key.to_string());
        }
    }

    /// Most frequent first; equal counts in name order.
    fn top(self, n: usize) -> Vec<(String, usize)> {
        let mut entries: Vec<(String, usize)> = self.0.into_iter().collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(n);
        entries
    }
}
