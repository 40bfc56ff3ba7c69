//! Terminal progress for the CLI.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::crawler::{CrawlEvent, EventSink};
use crate::harvest::{HarvestSummary, SessionStatus};

/// One progress bar per session, on top of another sink
#[derive(Debug)]
pub struct ProgressEvents {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    inner: Arc<dyn EventSink>,
}

impl ProgressEvents {
    /// Draw to stderr and forward every event to `inner`
    pub fn new(inner: Arc<dyn EventSink>) -> Self {
        Self::with_target(inner, ProgressDrawTarget::stderr())
    }

    /// Track progress without drawing anything
    pub fn hidden(inner: Arc<dyn EventSink>) -> Self {
        Self::with_target(inner, ProgressDrawTarget::hidden())
    }

    fn with_target(inner: Arc<dyn EventSink>, target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: Mutex::new(HashMap::new()),
            inner,
        }
    }

    /// Position of a session's bar, if it has one
    pub fn position(&self, session: &str) -> Option<u64> {
        self.bars
            .lock()
            .ok()
            .and_then(|bars| bars.get(session).map(|bar| bar.position()))
    }

    fn bar(&self, session: &str, total: u64) -> ProgressBar {
        let bar = self.multi.add(ProgressBar::new(total));
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:<24} {wide_bar:.cyan/blue} {pos}/{len} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        bar.set_prefix(session.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    }

    fn update(&self, event: &CrawlEvent) {
        let Ok(mut bars) = self.bars.lock() else {
            return;
        };

        match event {
            CrawlEvent::ProbeCompleted { session, total } => {
                let bar = self.bar(session, *total);
                if let Some(old) = bars.insert(session.clone(), bar) {
                    old.finish_and_clear();
                }
            }
            CrawlEvent::PageFetched {
                session,
                order,
                received,
                ..
            } => {
                if let Some(bar) = bars.get(session) {
                    bar.inc(*received as u64);
                    bar.set_message(order.to_string());
                }
            }
            CrawlEvent::PassCompleted { session, .. } => {
                if let Some(bar) = bars.get(session) {
                    if bar.length().is_some_and(|len| bar.position() >= len) {
                        bar.finish_with_message("done");
                    }
                }
            }
            CrawlEvent::PassExhausted { session, .. } => {
                if let Some(bar) = bars.get(session) {
                    bar.abandon_with_message("exhausted");
                }
            }
            CrawlEvent::EntrySkipped { .. } | CrawlEvent::Retrying { .. } => {}
        }
    }
}

impl EventSink for ProgressEvents {
    fn emit(&self, event: &CrawlEvent) {
        self.update(event);
        self.inner.emit(event);
    }
}

/// Print a per-session summary of a harvest
pub fn print_summary(summary: &HarvestSummary) {
    for outcome in &summary.outcomes {
        let name = match &outcome.filter_label {
            Some(label) => format!("{} [{}]", outcome.category, label),
            None => outcome.category.clone(),
        };
        match &outcome.status {
            SessionStatus::Completed { total, retrieved } => println!(
                "✓ {:<28} {:>7} / {:<7} {}",
                name,
                retrieved,
                total,
                outcome.path.display()
            ),
            SessionStatus::Failed(e) => println!("✗ {:<28} {}", name, e),
        }
    }

    println!(
        "\n{} sessions completed, {} failed, {} records{}",
        summary.completed(),
        summary.failed(),
        summary.records(),
        if summary.cancelled { " (cancelled)" } else { "" }
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::RecordingEvents;
    use crate::models::SortOrder;

    #[test]
    fn test_progress_tracks_pages_and_forwards() {
        let inner = Arc::new(RecordingEvents::new());
        let progress = ProgressEvents::hidden(inner.clone());

        progress.emit(&CrawlEvent::ProbeCompleted {
            session: "cs.CR".to_string(),
            total: 1500,
        });
        for received in [1000, 500] {
            progress.emit(&CrawlEvent::PageFetched {
                session: "cs.CR".to_string(),
                order: SortOrder::Ascending,
                offset: 0,
                received,
                accumulated: 0,
                target: 1500,
            });
        }

        assert_eq!(progress.position("cs.CR"), Some(1500));
        assert_eq!(progress.position("cs.LG"), None);
        assert_eq!(inner.events().len(), 3);
    }
}
