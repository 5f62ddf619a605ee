#![allow(dead_code)]

use std::sync::Arc;

use talent_search::config::ClusteringConfig;
use talent_search::vector::{BulkEmbedder, MockEmbeddingGenerator, VectorDimension};
use talent_search::{BuildReport, GenerationBuilder, IndexGeneration, Profile, ProfileStore};

pub const CORPUS_SIZE: usize = 200;
pub const DIMENSION: usize = 384;

/// Ground-truth skill group of a synthetic profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    Legal,
    Software,
    Mechanical,
}

pub fn group_of(index: usize) -> Group {
    match index % 3 {
        0 => Group::Legal,
        1 => Group::Software,
        _ => Group::Mechanical,
    }
}

const CITIES: [&str; 4] = ["London", "Madrid", "Berlin", "Toronto"];

/// 200 profiles in three skill groups:
/// {"tax law", "corporate law"}, {"python", "data engineering"} and
/// {"mechanical design"}. Every ninth legal profile also lists "litigation".
pub fn synthetic_profiles() -> Vec<Profile> {
    (0..CORPUS_SIZE).map(synthetic_profile).collect()
}

pub fn synthetic_profile(i: usize) -> Profile {
    let city = CITIES[i % CITIES.len()];
    let years = (i % 11) as f64;

    let (title, skills, industry, company, education, text): (&str, Vec<&str>, _, _, _, String) =
        match group_of(i) {
            Group::Legal => {
                let mut skills = if i % 2 == 0 {
                    vec!["corporate law", "contracts"]
                } else {
                    vec!["tax law", "compliance"]
                };
                if i % 9 == 0 {
                    skills.push("litigation");
                }
                (
                    "Lawyer",
                    skills,
                    "Legal Services",
                    "Garrigues",
                    "LLM Law",
                    if i % 2 == 0 {
                        "corporate lawyer law firm legal counsel contracts clients mergers acquisitions"
                    } else {
                        "tax lawyer law firm legal counsel tax planning compliance clients"
                    }
                    .to_string(),
                )
            }
            Group::Software => (
                "Data Engineer",
                vec!["python", "data engineering"],
                "Software",
                "Datadog",
                "BSc Computer Science",
                format!(
                    "python data engineering pipelines spark airflow software developer {}",
                    if i % 2 == 0 { "etl warehouse" } else { "streaming kafka" }
                ),
            ),
            Group::Mechanical => (
                "Mechanical Engineer",
                vec!["mechanical design"],
                "Manufacturing",
                "Siemens",
                "MEng Mechanical Engineering",
                format!(
                    "mechanical design cad solidworks manufacturing prototypes turbines {}",
                    if i % 2 == 0 { "automotive" } else { "aerospace" }
                ),
            ),
        };

    Profile {
        profile_id: format!("profile-{i:03}"),
        name: Some(format!("Candidate {i}")),
        title: Some(title.to_string()),
        experience_years: Some(years),
        skills: skills.into_iter().map(str::to_string).collect(),
        work_locations: vec![city.to_string()],
        industry: Some(industry.to_string()),
        company: Some(company.to_string()),
        education: Some(education.to_string()),
        connections: Some((i * 7 % 500) as u32),
        raw_text: Some(text),
        ..Profile::default()
    }
}

pub fn store() -> Arc<ProfileStore> {
    Arc::new(ProfileStore::new(synthetic_profiles()).expect("synthetic corpus is valid"))
}

pub fn generator() -> MockEmbeddingGenerator {
    MockEmbeddingGenerator::with_dimension(VectorDimension::new(DIMENSION).expect("valid dimension"))
}

/// Fast settings for a fixed number of clusters.
pub fn clustering_config(k: usize) -> ClusteringConfig {
    ClusteringConfig {
        n_clusters: Some(k),
        n_init: 3,
        max_iterations: 50,
        ..ClusteringConfig::default()
    }
}

/// Embeds the synthetic corpus with the mock provider and builds a generation.
pub async fn build_generation(config: ClusteringConfig) -> (IndexGeneration, BuildReport) {
    build_generation_over(store(), config).await
}

pub async fn build_generation_over(
    store: Arc<ProfileStore>,
    config: ClusteringConfig,
) -> (IndexGeneration, BuildReport) {
    let embedder = BulkEmbedder::new(Arc::new(generator()), 8);
    GenerationBuilder::new(config)
        .with_embedder(embedder)
        .build(store)
        .await
        .expect("synthetic corpus builds")
}
