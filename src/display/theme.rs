//! Terminal styling for CLI output.

use std::sync::LazyLock;

use console::Style;

/// Shared theme for every command.
pub static THEME: LazyLock<Theme> = LazyLock::new(Theme::default);

#[derive(Debug, Clone)]
pub struct Theme {
    pub success: Style,
    pub error: Style,
    pub warning: Style,
    pub header: Style,
    pub dim: Style,
    /// Scores, counts and other figures
    pub number: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            success: Style::new().green().bright(),
            error: Style::new().red().bright(),
            warning: Style::new().yellow().bright(),
            header: Style::new().cyan().bold(),
            dim: Style::new().dim(),
            number: Style::new().cyan(),
        }
    }
}

impl Theme {
    pub fn success_with_icon(&self, text: &str) -> String {
        self.iconed("✓", &self.success, text)
    }

    pub fn error_with_icon(&self, text: &str) -> String {
        self.iconed("✗", &self.error, text)
    }

    pub fn warning_with_icon(&self, text: &str) -> String {
        self.iconed("⚠", &self.warning, text)
    }

    /// Styles `text` unless colors are disabled (`NO_COLOR`, not a terminal).
    pub fn apply<T: std::fmt::Display>(&self, style: &Style, text: T) -> String {
        if Self::colors_disabled() {
            text.to_string()
        } else {
            style.apply_to(text).to_string()
        }
    }

    fn iconed(&self, icon: &str, style: &Style, text: &str) -> String {
        format!("{} {}", self.apply(style, icon), self.apply(style, text))
    }

    fn colors_disabled() -> bool {
        std::env::var_os("NO_COLOR").is_some() || !console::colors_enabled()
    }
}
