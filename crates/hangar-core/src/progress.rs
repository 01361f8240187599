//! Progress updates sent through channels.
//!
//! Pipelines receive an `mpsc::Sender<ProgressUpdate>` per invocation; there
//! is no global event bus. Dropping the receiver silently discards updates,
//! which keeps fire-and-forget reporting out of the failure path.

/// Progress update sent through channels.
#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    /// A pipeline step started.
    StepStarted {
        step: String,
        index: usize,
        total: usize,
    },
    /// Fractional progress within the current step. `None` = indeterminate.
    Fraction {
        value: Option<f32>,
        message: String,
    },
    /// Dependency installation progress.
    Dependency {
        package: String,
        completed_count: u32,
        total_count: Option<u32>,
    },
    /// A raw console line from an external process (git, pip, entry point).
    ConsoleLine { line: String },
    /// Error occurred.
    Error { message: String },
    /// Pipeline completed.
    Completed { success: bool },
}

/// Send a progress update, ignoring a closed channel.
pub async fn send_progress(
    tx: &Option<tokio::sync::mpsc::Sender<ProgressUpdate>>,
    update: ProgressUpdate,
) {
    if let Some(tx) = tx {
        let _ = tx.send(update).await;
    }
}
