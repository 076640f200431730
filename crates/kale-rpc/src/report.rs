//! User-visible reports
//!
//! Every user-visible failure, and the compile/upload success messages, is
//! delivered as a [`Report`] through a [`Notifier`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Title plus ordered message lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Dialog title
    pub title: String,
    /// Message lines, in display order
    pub lines: Vec<String>,
}

impl Report {
    /// Create a report
    #[must_use]
    pub fn new(title: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            title: title.into(),
            lines,
        }
    }

    /// Append a line (builder pattern)
    #[must_use]
    pub fn with_line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)?;
        for line in &self.lines {
            write!(f, "\n  {line}")?;
        }
        Ok(())
    }
}

/// Surface that shows reports to the user
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Show a report; resolves once it has been delivered
    async fn notify(&self, report: Report);
}

/// Notifier that writes reports to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, report: Report) {
        tracing::warn!(title = %report.title, lines = ?report.lines, "report");
    }
}
