//! Tables for search results, cluster summaries and build reports.

use comfy_table::{
    Attribute, Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

use crate::cluster::ClusterSummary;
use crate::generation::BuildReport;
use crate::search::SearchResult;

/// Builder for a rounded table with bold headers.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.apply_modifier(UTF8_ROUND_CORNERS);
        Self { table }
    }

    pub fn set_headers(mut self, headers: &[&str]) -> Self {
        let header_cells: Vec<Cell> = headers
            .iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    pub fn add_cells(mut self, row: Vec<Cell>) -> Self {
        self.table.add_row(row);
        self
    }

    pub fn build(self) -> String {
        self.table.to_string()
    }
}

fn joined(values: &[(String, usize)], take: usize) -> String {
    values
        .iter()
        .take(take)
        .map(|(name, count)| format!("{name} ({count})"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn or_dash(value: Option<&str>) -> String {
    value.filter(|v| !v.is_empty()).unwrap_or("-").to_string()
}

/// Ranked search results.
pub fn create_results_table(results: &[SearchResult<'_>]) -> String {
    let mut builder = TableBuilder::new().set_headers(&[
        "#", "Score", "Profile", "Name", "Title", "Experience", "Cluster",
    ]);

    for (rank, result) in results.iter().enumerate() {
        let profile = result.profile;
        let score = result.score.get();
        let color = if score >= 0.5 {
            Color::Green
        } else if score >= 0.25 {
            Color::Yellow
        } else {
            Color::Red
        };

        builder = builder.add_cells(vec![
            Cell::new(rank + 1),
            Cell::new(format!("{score:.3}")).fg(color),
            Cell::new(&profile.profile_id),
            Cell::new(or_dash(profile.name.as_deref())),
            Cell::new(or_dash(profile.title.as_deref())),
            Cell::new(
                profile
                    .experience_years
                    .map_or_else(|| "-".to_string(), |y| format!("{y:.1} y")),
            ),
            Cell::new(result.cluster_id),
        ]);
    }

    builder.build()
}

/// One row per built cluster.
pub fn create_cluster_table(summaries: &[ClusterSummary]) -> String {
    let mut builder = TableBuilder::new().set_headers(&[
        "Cluster",
        "Size",
        "Avg. experience",
        "Top industries",
        "Top skills",
        "Top locations",
    ]);

    for summary in summaries {
        builder = builder.add_row(vec![
            summary.cluster_id.to_string(),
            summary.size.to_string(),
            summary
                .average_experience
                .map_or_else(|| "-".to_string(), |y| format!("{y:.1}")),
            joined(&summary.top_industries, 3),
            joined(&summary.top_skills, 5),
            joined(&summary.top_locations, 3),
        ]);
    }

    builder.build()
}

/// Totals of a build.
pub fn create_build_table(report: &BuildReport) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(vec![
        Cell::new("Metric").add_attribute(Attribute::Bold),
        Cell::new("Value").add_attribute(Attribute::Bold),
    ]);

    table.add_row(vec!["Generation".to_string(), report.generation.to_string()]);
    table.add_row(vec!["Profiles".to_string(), report.profiles_total.to_string()]);
    table.add_row(vec!["Indexed".to_string(), report.profiles_indexed.to_string()]);
    table.add_row(vec!["Clusters (K)".to_string(), report.k.to_string()]);
    if let Some(selection) = &report.selection {
        let best = selection
            .scores
            .iter()
            .find(|(k, _)| *k == selection.k)
            .map_or(f32::NAN, |(_, s)| *s);
        table.add_row(vec![
            "K selection".to_string(),
            format!(
                "{} candidates on {} profiles, silhouette {best:.3}",
                selection.scores.len(),
                selection.sample_size
            ),
        ]);
    }
    table.add_row(vec!["Empty clusters".to_string(), report.empty_clusters.to_string()]);
    table.add_row(vec![
        Cell::new("Excluded profiles"),
        warn_if_nonzero(report.embedding_failures.len()),
    ]);
    table.add_row(vec![
        Cell::new("Failed clusters"),
        warn_if_nonzero(report.index_failures.len()),
    ]);
    table.add_row(vec!["Time".to_string(), format!("{:.2?}", report.elapsed)]);

    table.to_string()
}

fn warn_if_nonzero(count: usize) -> Cell {
    let cell = Cell::new(count);
    if count > 0 {
        cell.fg(Color::Yellow).add_attribute(Attribute::Bold)
    } else {
        cell
    }
}
