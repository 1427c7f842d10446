use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use tokio::sync::mpsc;

use crate::engine::state::SyncEvent;

const BAR_TEMPLATE: &str = "{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} files {msg}";

/// Console view of a running synchronization.
pub struct ProgressReporter {
    bar: ProgressBar,
    completed: u64,
    failures: u64,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(0))
    }

    fn with_bar(bar: ProgressBar) -> Self {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        Self {
            bar,
            completed: 0,
            failures: 0,
        }
    }

    /// Drain events until every sender is gone.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<SyncEvent>) {
        while let Some(event) = events.recv().await {
            self.apply(&event);
        }
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }

    fn apply(&mut self, event: &SyncEvent) {
        match event {
            SyncEvent::Started { total_files } => {
                self.bar.set_length(*total_files as u64);
                self.bar.set_position(0);
            }
            SyncEvent::FileCompleted { path, attempts } => {
                self.completed += 1;
                self.bar.inc(1);
                self.bar.set_message(path.clone());
                debug!("progress: {path} done after {attempts} attempt(s)");
            }
            // The orchestrator already logs the failure at `warn`.
            SyncEvent::FileFailed {
                path,
                attempt,
                mirror,
                error,
            } => {
                self.failures += 1;
                debug!("progress: {path} failed via {mirror}: {error}");
                self.bar
                    .set_message(format!("retrying {path} (attempt {attempt} failed)"));
            }
            SyncEvent::Finished => {
                self.bar.finish_with_message(format!(
                    "done: {} files, {} failed attempts retried",
                    self.completed, self.failures
                ));
            }
        }
    }
}
