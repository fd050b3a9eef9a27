use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::core::IngestOutcome;
use crate::engine::AlertEngine;
use crate::notifications::Notifier;

/// A raw detection payload plus where it came from (file name, line number).
#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub source: String,
    pub payload: Value,
}

/// Messages from the pipeline to whoever renders results.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PipelineOutput {
    Ingested { source: String, outcome: IngestOutcome },
    Rejected { source: String, kind: String, error: String },
}

/// Run the pipeline: receive payloads, ingest them on blocking workers, forward results.
///
/// At most `max_in_flight` ingestions run at once. Reports for the same shelf
/// still serialize inside the engine. Returns once the input channel closes
/// and every in-flight report has finished.
pub async fn run_pipeline(
    mut rx: mpsc::UnboundedReceiver<PipelineInput>,
    out: mpsc::UnboundedSender<PipelineOutput>,
    engine: Arc<AlertEngine>,
    notifier: Arc<Notifier>,
    max_in_flight: usize,
) {
    let permits = Arc::new(Semaphore::new(max_in_flight.max(1)));
    let mut tasks = JoinSet::new();
    let mut received: u64 = 0;

    info!("Pipeline started ({} workers), waiting for detection reports...", max_in_flight.max(1));

    while let Some(input) = rx.recv().await {
        received += 1;
        let Ok(permit) = permits.clone().acquire_owned().await else {
            error!("Pipeline semaphore closed");
            break;
        };
        let engine = engine.clone();
        let notifier = notifier.clone();
        let out = out.clone();

        tasks.spawn(async move {
            let PipelineInput { source, payload } = input;
            let result = tokio::task::spawn_blocking(move || engine.ingest(&payload)).await;
            drop(permit);

            let message = match result {
                Ok(Ok(outcome)) => {
                    debug!("{source}: {} alerts created", outcome.created_count());
                    for alert in &outcome.created {
                        notifier.notify(alert);
                    }
                    PipelineOutput::Ingested { source, outcome }
                }
                Ok(Err(e)) => {
                    warn!("{source}: {e}");
                    PipelineOutput::Rejected {
                        source,
                        kind: e.kind().to_string(),
                        error: e.to_string(),
                    }
                }
                Err(e) => {
                    error!("{source}: ingestion worker failed: {e}");
                    PipelineOutput::Rejected {
                        source,
                        kind: "worker".to_string(),
                        error: e.to_string(),
                    }
                }
            };
            if out.send(message).is_err() {
                debug!("Output channel closed, dropping result");
            }
        });

        // reap finished tasks so the set does not grow with the input
        while tasks.try_join_next().is_some() {}
    }

    while tasks.join_next().await.is_some() {}
    info!("Pipeline shutting down after {received} reports");
}
