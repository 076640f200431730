//! Terminal implementations of the prompt and notifier seams

use async_trait::async_trait;
use kale_deploy::OverwritePrompt;
use kale_rpc::{Notifier, Report};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Prints reports to stderr
pub(crate) struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, report: Report) {
        tracing::debug!(title = %report.title, "report");
        eprintln!("{report}");
    }
}

/// Asks on the terminal before overwriting a pipeline
pub(crate) enum ConsolePrompt {
    /// Read the answer from stdin
    Ask,
    /// Answer without asking
    Always(bool),
}

#[async_trait]
impl OverwritePrompt for ConsolePrompt {
    async fn confirm_overwrite(&self, pipeline_name: &str) -> bool {
        match self {
            Self::Always(answer) => *answer,
            Self::Ask => ask(pipeline_name).await.unwrap_or_else(|err| {
                tracing::warn!(error = %err, "could not read the answer, not overwriting");
                false
            }),
        }
    }
}

async fn ask(pipeline_name: &str) -> std::io::Result<bool> {
    let mut stderr = tokio::io::stderr();
    stderr
        .write_all(
            format!("Pipeline {pipeline_name} already exists. Overwrite it? [y/N] ").as_bytes(),
        )
        .await?;
    stderr.flush().await?;

    let mut answer = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut answer)
        .await?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
