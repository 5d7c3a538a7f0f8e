//! Publishing boundary
//!
//! The pipeline only talks to the [`Publisher`] capability. Implementations
//! must never block the caller: the ingest path publishes synchronously from
//! worker tasks.
//!
//! - [`ChannelPublisher`]: bounded channel drained by a [`JsonLineSink`] task
//! - [`MemoryPublisher`]: in-process collector for tests and embedding

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::defaults::{EARLY_FAULT_TOPIC_PREFIX, HEARTBEAT_TOPIC, L2_RESULT_TOPIC_PREFIX};
use crate::types::{EarlyFaultEvent, Heartbeat, L2ResultEvent, SensorKey};

/// Output capability consumed by the pipeline.
pub trait Publisher: Send + Sync {
    fn publish_early_fault(&self, key: &SensorKey, event: &EarlyFaultEvent);
    fn publish_l2_result(&self, key: &SensorKey, event: &L2ResultEvent);
    fn publish_heartbeat(&self, heartbeat: &Heartbeat);
}

// ============================================================================
// Outbound Message
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    EarlyFault { key: SensorKey, event: EarlyFaultEvent },
    L2Result { key: SensorKey, event: L2ResultEvent },
    Heartbeat(Heartbeat),
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    topic: String,
    payload: &'a T,
}

impl OutboundMessage {
    /// `vibration/early_fault/<asset>/<point>`, `vibration/l2_result/<asset>/<point>`
    /// or `vibration/heartbeat`.
    pub fn topic(&self) -> String {
        match self {
            Self::EarlyFault { key, .. } => {
                format!("{EARLY_FAULT_TOPIC_PREFIX}/{}/{}", key.asset, key.point)
            }
            Self::L2Result { key, .. } => {
                format!("{L2_RESULT_TOPIC_PREFIX}/{}/{}", key.asset, key.point)
            }
            Self::Heartbeat(_) => HEARTBEAT_TOPIC.to_string(),
        }
    }

    /// One `{"topic": ..., "payload": ...}` JSON line, without the newline.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let topic = self.topic();
        match self {
            Self::EarlyFault { event, .. } => serde_json::to_string(&Envelope { topic, payload: event }),
            Self::L2Result { event, .. } => serde_json::to_string(&Envelope { topic, payload: event }),
            Self::Heartbeat(hb) => serde_json::to_string(&Envelope { topic, payload: hb }),
        }
    }
}

// ============================================================================
// Channel Publisher
// ============================================================================

/// Non-blocking publisher backed by a bounded channel.
///
/// When the sink falls behind, messages are dropped and counted rather than
/// stalling ingestion.
pub struct ChannelPublisher {
    tx: mpsc::Sender<OutboundMessage>,
    dropped: AtomicU64,
}

impl ChannelPublisher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn send(&self, msg: OutboundMessage) {
        if let Err(e) = self.tx.try_send(msg) {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            match e {
                mpsc::error::TrySendError::Full(m) => {
                    warn!(topic = %m.topic(), dropped, "Output channel full, message dropped");
                }
                mpsc::error::TrySendError::Closed(m) => {
                    debug!(topic = %m.topic(), "Output channel closed, message dropped");
                }
            }
        }
    }
}

impl Publisher for ChannelPublisher {
    fn publish_early_fault(&self, key: &SensorKey, event: &EarlyFaultEvent) {
        self.send(OutboundMessage::EarlyFault {
            key: key.clone(),
            event: event.clone(),
        });
    }

    fn publish_l2_result(&self, key: &SensorKey, event: &L2ResultEvent) {
        self.send(OutboundMessage::L2Result {
            key: key.clone(),
            event: event.clone(),
        });
    }

    fn publish_heartbeat(&self, heartbeat: &Heartbeat) {
        self.send(OutboundMessage::Heartbeat(heartbeat.clone()));
    }
}

// ============================================================================
// JSON Line Sink
// ============================================================================

/// Writes every outbound message as a JSON line to an async writer.
pub struct JsonLineSink<W> {
    rx: mpsc::Receiver<OutboundMessage>,
    writer: W,
}

impl<W: AsyncWrite + Unpin> JsonLineSink<W> {
    pub const fn new(rx: mpsc::Receiver<OutboundMessage>, writer: W) -> Self {
        Self { rx, writer }
    }

    /// Run until all senders are gone or `cancel` fires.
    ///
    /// On cancel, messages already queued are still written. Returns the
    /// number of lines written.
    pub async fn run(mut self, cancel: CancellationToken) -> std::io::Result<u64> {
        let mut written = 0u64;
        loop {
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(m) => {
                        self.write(&m).await?;
                        written += 1;
                    }
                    None => break,
                },
                () = cancel.cancelled() => {
                    while let Ok(m) = self.rx.try_recv() {
                        self.write(&m).await?;
                        written += 1;
                    }
                    break;
                }
            }
        }
        self.writer.flush().await?;
        info!(written, "Output sink stopped");
        Ok(written)
    }

    async fn write(&mut self, msg: &OutboundMessage) -> std::io::Result<()> {
        match msg.to_json_line() {
            Ok(mut line) => {
                line.push('\n');
                self.writer.write_all(line.as_bytes()).await?;
                // Line-oriented consumers read as we go
                self.writer.flush().await
            }
            Err(e) => {
                warn!(topic = %msg.topic(), error = %e, "Failed to serialize outbound message");
                Ok(())
            }
        }
    }
}

// ============================================================================
// Memory Publisher
// ============================================================================

/// Collects every message in memory.
#[derive(Default)]
pub struct MemoryPublisher {
    messages: Mutex<Vec<OutboundMessage>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages.lock().clone()
    }

    pub fn early_faults(&self, key: &SensorKey) -> Vec<EarlyFaultEvent> {
        self.messages
            .lock()
            .iter()
            .filter_map(|m| match m {
                OutboundMessage::EarlyFault { key: k, event } if k == key => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn l2_results(&self) -> Vec<(SensorKey, L2ResultEvent)> {
        self.messages
            .lock()
            .iter()
            .filter_map(|m| match m {
                OutboundMessage::L2Result { key, event } => Some((key.clone(), event.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

impl Publisher for MemoryPublisher {
    fn publish_early_fault(&self, key: &SensorKey, event: &EarlyFaultEvent) {
        self.messages.lock().push(OutboundMessage::EarlyFault {
            key: key.clone(),
            event: event.clone(),
        });
    }

    fn publish_l2_result(&self, key: &SensorKey, event: &L2ResultEvent) {
        self.messages.lock().push(OutboundMessage::L2Result {
            key: key.clone(),
            event: event.clone(),
        });
    }

    fn publish_heartbeat(&self, heartbeat: &Heartbeat) {
        self.messages.lock().push(OutboundMessage::Heartbeat(heartbeat.clone()));
    }
}
