//! Colored terminal output utilities.

use console::{Style, Term};

/// Width of the label column in startup summaries.
const LABEL_WIDTH: usize = 12;

/// Terminal output formatter.
pub(crate) struct Output {
    term: Term,
    label: Style,
    url: Style,
    yellow: Style,
    red: Style,
}

impl Output {
    /// Create a formatter writing to stderr.
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            term: Term::stderr(),
            label: Style::new().dim(),
            url: Style::new().cyan().bold(),
            yellow: Style::new().yellow(),
            red: Style::new().red(),
        }
    }

    /// Print the address the server is reachable at.
    pub(crate) fn serving(&self, url: &str) {
        let _ = self
            .term
            .write_line(&format!("Serving {}", self.url.apply_to(url)));
    }

    /// Print one `label  value` line of the startup summary.
    pub(crate) fn field(&self, label: &str, value: &str) {
        let padded = format!("{label:<LABEL_WIDTH$}");
        let _ = self
            .term
            .write_line(&format!("  {}{value}", self.label.apply_to(padded)));
    }

    /// Print a warning message (yellow).
    pub(crate) fn warning(&self, msg: &str) {
        let _ = self.term.write_line(&self.yellow.apply_to(msg).to_string());
    }

    /// Print an error message (red).
    pub(crate) fn error(&self, msg: &str) {
        let _ = self.term.write_line(&self.red.apply_to(msg).to_string());
    }
}
