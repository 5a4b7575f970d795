use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use tokio::time::{Duration, sleep};
use tracing::info;

use sluice_core::{
    HandlerRegistry, QueueConfig, QueueManager, SluiceError, TaskCallback, TaskCategory,
    TaskHandler, TaskSnapshot,
};

#[derive(Debug, Deserialize)]
struct LookupPayload {
    registry_number: String,
}

/// Stub registry lookup: pretends to call the external service, with a
/// little jitter so the queue's interleaving shows in the logs.
struct StubLookupHandler;

#[async_trait]
impl TaskHandler for StubLookupHandler {
    async fn handle(&self, payload: serde_json::Value) -> Result<serde_json::Value, SluiceError> {
        let p: LookupPayload = serde_json::from_value(payload)
            .map_err(|e| SluiceError::Handler(format!("payload decode: {e}")))?;

        let millis = rand::thread_rng().gen_range(50..250);
        sleep(Duration::from_millis(millis)).await;

        Ok(serde_json::json!({
            "registry_number": p.registry_number,
            "name": format!("Company {}", p.registry_number),
            "active": true,
        }))
    }
}

/// Stub document export that fails its first `n` calls, to show the retry
/// path end to end.
struct FlakyExportHandler {
    remaining_failures: AtomicU32,
}

impl FlakyExportHandler {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl TaskHandler for FlakyExportHandler {
    async fn handle(&self, payload: serde_json::Value) -> Result<serde_json::Value, SluiceError> {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(SluiceError::Handler(format!(
                "generation service unavailable (left={left})"
            )));
        }

        sleep(Duration::from_millis(100)).await;
        Ok(serde_json::json!({
            "url": "https://files.example/report.pdf",
            "pages": 12,
            "source": payload,
        }))
    }
}

struct LogCallback;

#[async_trait]
impl TaskCallback for LogCallback {
    async fn on_terminal(&self, snapshot: &TaskSnapshot) -> Result<(), SluiceError> {
        info!(task_id = %snapshot.id, status = ?snapshot.status, retries = snapshot.retry_count, "export settled");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), SluiceError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // (A) Wire handlers for every category; coverage is checked at
    // construction.
    let mut registry = HandlerRegistry::new();
    registry.register(TaskCategory::ExportPdf, Arc::new(FlakyExportHandler::new(2)))?;
    registry.register(TaskCategory::ExportSlides, Arc::new(FlakyExportHandler::new(0)))?;
    registry.register(TaskCategory::CompanyLookup, Arc::new(StubLookupHandler))?;
    registry.register(TaskCategory::PersonLookup, Arc::new(StubLookupHandler))?;

    let manager = QueueManager::new(QueueConfig::default(), registry)?;
    manager.start().await;

    // (B) Submit work: one flaky export with a completion callback, a few
    // lookups polled by hand.
    let mut ids = vec![
        manager
            .submit(
                TaskCategory::ExportPdf,
                serde_json::json!({ "report": "annual-2025" }),
                Some(Arc::new(LogCallback)),
            )
            .await?,
    ];
    for n in ["7701234567", "5044002119", "7812003110"] {
        ids.push(
            manager
                .submit(
                    TaskCategory::CompanyLookup,
                    serde_json::json!({ "registry_number": n }),
                    None,
                )
                .await?,
        );
    }

    // (C) Fire-and-forget API: poll until everything settles.
    loop {
        let mut done = 0;
        for id in &ids {
            if let Some(snap) = manager.status(*id).await
                && snap.status.is_terminal()
            {
                done += 1;
            }
        }
        if done == ids.len() {
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }

    for id in &ids {
        if let Some(snap) = manager.status(*id).await {
            info!(task_id = %snap.id, status = ?snap.status, retries = snap.retry_count, "final status");
        }
    }
    info!(counts = ?manager.counts().await, "queue totals");

    manager.stop().await;
    Ok(())
}
