//! Terminal output for the CLI: tables, progress indicators and styling.

pub mod progress;
pub mod tables;
pub mod theme;

pub use progress::{create_progress_bar, create_spinner};
pub use tables::{TableBuilder, create_build_table, create_cluster_table, create_results_table};
pub use theme::{THEME, Theme};
