//! Bridges the orchestrator's synchronous [`ProgressReporter`] callbacks to
//! the async [`JobManager`], per §5 ("Job Manager serializes writes per
//! `job_id`"). Updates are queued on an unbounded channel and drained by a
//! single background task so persistence stays serialized even though
//! `ProgressReporter` itself cannot `.await`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use docforge_core::ProgressReporter;
use docforge_jobs::JobManager;
use docforge_shared::{JobId, JobPhase};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

enum Event {
    Phase(JobPhase),
    Record { pages_discovered: u32, pages_processed: u32, pages_crawled: u32, current_page_url: Option<String> },
    Log(String),
}

/// Orchestrator-facing progress sink for one running job.
pub struct JobManagerProgress {
    tx: mpsc::UnboundedSender<Event>,
    cancelled: Arc<AtomicBool>,
}

/// Background tasks spawned alongside a [`JobManagerProgress`]; join/abort
/// them once the orchestrator run finishes.
pub struct ProgressTasks {
    drain: JoinHandle<()>,
    poll_cancel: JoinHandle<()>,
}

impl ProgressTasks {
    /// Close the event channel, wait for queued updates to flush, then stop
    /// polling for cancellation.
    pub async fn finish(self) {
        let _ = self.drain.await;
        self.poll_cancel.abort();
    }
}

impl JobManagerProgress {
    pub fn spawn(job_id: JobId, manager: Arc<JobManager>) -> (Self, ProgressTasks) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let drain_manager = manager.clone();
        let drain = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let result = match event {
                    Event::Phase(phase) => drain_manager.set_phase(&job_id, phase).await,
                    Event::Record { pages_discovered, pages_processed, pages_crawled, current_page_url } => {
                        drain_manager
                            .update(&job_id, |job| {
                                job.counters.pages_discovered = pages_discovered;
                                job.counters.pages_processed = pages_processed;
                                job.counters.pages_crawled = pages_crawled;
                                job.current_page_url = current_page_url;
                            })
                            .await
                    }
                    Event::Log(line) => drain_manager.log(&job_id, line).await,
                };
                if let Err(e) = result {
                    tracing::warn!(%job_id, error = %e, "dropped progress update");
                }
            }
        });

        let cancelled = Arc::new(AtomicBool::new(false));
        let poll_flag = cancelled.clone();
        let poll_manager = manager;
        let poll_cancel = tokio::spawn(async move {
            loop {
                if poll_manager.is_cancelled(&job_id).await {
                    poll_flag.store(true, Ordering::Relaxed);
                    return;
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        });

        (Self { tx, cancelled }, ProgressTasks { drain, poll_cancel })
    }
}

impl ProgressReporter for JobManagerProgress {
    fn phase(&self, phase: JobPhase) {
        let _ = self.tx.send(Event::Phase(phase));
    }

    fn record(&self, pages_discovered: u32, pages_processed: u32, pages_crawled: u32, current_page_url: Option<&str>) {
        let _ = self.tx.send(Event::Record {
            pages_discovered,
            pages_processed,
            pages_crawled,
            current_page_url: current_page_url.map(str::to_string),
        });
    }

    fn log(&self, line: &str) {
        let _ = self.tx.send(Event::Log(line.to_string()));
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
