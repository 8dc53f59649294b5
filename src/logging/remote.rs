//! Remote log shipping (Better Stack / Logtail HTTP ingestion)
//!
//! Records are queued on an unbounded channel and shipped by a background
//! task in batches (`batch_size` records or every `flush_interval_ms`).
//! Writing to the sink never blocks and never fails; delivery problems are
//! reported as local warnings. [`RemoteSink::flush`] drains the queue on
//! shutdown.

use std::time::Duration;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use super::record::LogRecord;
use super::sink::Sink;
use crate::config::RemoteConfig;
use crate::error::LoggingError;

const MODULE: &str = module_path!();

/// Crates whose records would be produced by shipping itself
const TRANSPORT_TARGETS: &[&str] = &[MODULE, "reqwest", "hyper", "hyper_util", "h2", "rustls"];

enum Command {
    Ship(Value),
    /// Ship the pending batch now and acknowledge once the request is done
    Flush(oneshot::Sender<()>),
}

/// Ships records to a remote ingestion endpoint
#[derive(Clone)]
pub struct RemoteSink {
    sender: mpsc::UnboundedSender<Command>,
}

impl RemoteSink {
    /// Start the shipper on the current Tokio runtime
    pub fn spawn(config: &RemoteConfig) -> Result<Self, LoggingError> {
        let handle = Handle::try_current().map_err(|e| {
            LoggingError::OptionalSinkUnavailable(format!("no async runtime for remote shipping: {}", e))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LoggingError::OptionalSinkUnavailable(e.to_string()))?;

        let shipper = Shipper {
            client,
            endpoint: config.endpoint.clone(),
            token: config.token.clone(),
        };
        let batch_size = config.batch_size.max(1);
        let flush_interval = Duration::from_millis(config.flush_interval_ms.max(1));

        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(async move {
            shipper_task(shipper, rx, batch_size, flush_interval).await;
        });

        Ok(Self { sender: tx })
    }

    /// Ship every record written so far and wait for the delivery attempt.
    ///
    /// The global dispatcher keeps a sender alive for the life of the
    /// process, so this is the only way queued records reach the endpoint
    /// before the runtime shuts down.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(Command::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

impl Sink for RemoteSink {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn accepts(&self, record: &LogRecord) -> bool {
        !is_transport_record(&record.name)
    }

    fn write(&self, record: &LogRecord, _line: &str) {
        let mut doc = record.to_value();
        if let Value::Object(map) = &mut doc {
            map.insert("dt".to_string(), Value::String(record.iso_time()));
        }
        // Receiver gone means the runtime shut down; nothing left to ship to
        let _ = self.sender.send(Command::Ship(doc));
    }
}

fn is_transport_record(name: &str) -> bool {
    TRANSPORT_TARGETS.iter().any(|target| {
        name.strip_prefix(target)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

struct Shipper {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl Shipper {
    async fn ship(&self, batch: &[Value]) -> Result<(), reqwest::Error> {
        self.client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(batch)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

async fn shipper_task(
    shipper: Shipper,
    mut rx: mpsc::UnboundedReceiver<Command>,
    batch_size: usize,
    flush_interval: Duration,
) {
    let mut batch: Vec<Value> = Vec::with_capacity(batch_size);

    let start = tokio::time::Instant::now() + flush_interval;
    let mut flush_timer = tokio::time::interval_at(start, flush_interval);
    flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            Some(command) = rx.recv() => match command {
                Command::Ship(doc) => {
                    batch.push(doc);
                    if batch.len() >= batch_size {
                        flush(&shipper, &mut batch).await;
                    }
                }
                Command::Flush(ack) => {
                    flush(&shipper, &mut batch).await;
                    let _ = ack.send(());
                }
            },

            _ = flush_timer.tick() => {
                flush(&shipper, &mut batch).await;
            }

            // Every sender dropped
            else => {
                flush(&shipper, &mut batch).await;
                break;
            }
        }
    }
}

async fn flush(shipper: &Shipper, batch: &mut Vec<Value>) {
    if batch.is_empty() {
        return;
    }

    let count = batch.len();
    if let Err(e) = shipper.ship(batch).await {
        tracing::warn!(error = %e, count, "Failed to ship log batch");
    }
    batch.clear();
}
