//! Progress reporting for lifecycle batches
//!
//! A batch runs on a spawned task and reports each finished table over an
//! unbounded channel. The calling task drains the channel into a progress bar,
//! so the terminal is only ever written from one place.

use indicatif::{ProgressBar, ProgressStyle};
use shadow_audit_common::TableRef;
use shadow_audit_core::BulkOutcome;
use std::future::Future;
use tokio::sync::mpsc;

use crate::error::{CliError, Result};

/// One table of a batch has finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub done: usize,
    pub total: usize,
    pub table: TableRef,
}

/// Sending half handed to the background batch.
#[derive(Clone)]
pub struct ProgressSender(mpsc::UnboundedSender<ProgressEvent>);

impl ProgressSender {
    /// Report progress. A closed receiver is ignored; the batch carries on.
    pub fn send(&self, done: usize, total: usize, table: &TableRef) {
        let _ = self.0.send(ProgressEvent {
            done,
            total,
            table: table.clone(),
        });
    }
}

/// Create a progress bar for a batch of `total` tables
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}

/// Create a spinner for single operations
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Run `batch` on a background task and show its progress until it finishes.
pub async fn run_with_progress<F, Fut>(message: &str, total: usize, batch: F) -> Result<BulkOutcome>
where
    F: FnOnce(ProgressSender) -> Fut,
    Fut: Future<Output = BulkOutcome> + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(batch(ProgressSender(tx)));

    let pb = create_progress_bar(total as u64, message);
    while let Some(event) = rx.recv().await {
        pb.set_position(event.done as u64);
        pb.set_message(format!("{} ({})", message, event.table));
    }
    pb.finish_with_message(message.to_string());

    handle.await.map_err(|e| CliError::Task(e.to_string()))
}
