//! Batch source abstraction for raw vibration ingestion.
//!
//! Provides a unified trait for reading raw sample batches from stdin
//! (JSON lines) or from the built-in bearing-fault generator.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::config::defaults::RAW_TOPIC_PREFIX;
use crate::simulation::{BearingFaultGenerator, FaultSchedule, FaultSeverity};
use crate::types::{RawBatch, SensorKey};

/// Events produced by a batch source.
#[derive(Debug)]
pub enum BatchEvent {
    /// One raw batch for one sensor key.
    Batch(SensorKey, RawBatch),
    /// Source reached end of data.
    Eof,
}

/// Trait abstracting where raw batches come from.
///
/// The processing loop calls [`next_batch`](BatchSource::next_batch) in a
/// `select!` with cancellation.
#[async_trait]
pub trait BatchSource: Send + 'static {
    /// Returns `BatchEvent::Eof` when no more data is available and `Err`
    /// on unrecoverable read errors.
    async fn next_batch(&mut self) -> Result<BatchEvent>;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;
}

// ============================================================================
// JSON Line Parsing
// ============================================================================

/// Batch body as it appears on the wire. Producer timestamps come in
/// several encodings and are not used, so they are ignored here.
#[derive(Deserialize)]
struct WirePayload {
    #[serde(alias = "samples")]
    acceleration: Vec<f64>,
    #[serde(default)]
    temperature_alarm: bool,
}

impl From<WirePayload> for RawBatch {
    fn from(p: WirePayload) -> Self {
        Self::new(p.acceleration).with_temperature_alarm(p.temperature_alarm)
    }
}

#[derive(Deserialize)]
struct FlatLine {
    asset: String,
    point: String,
    #[serde(alias = "samples")]
    acceleration: Vec<f64>,
    #[serde(default)]
    temperature_alarm: bool,
}

#[derive(Deserialize)]
struct TopicLine {
    topic: String,
    payload: WirePayload,
}

/// `vibration/raw/<asset>/<point>` → key. Any other topic is rejected.
pub fn parse_raw_topic(topic: &str) -> Option<SensorKey> {
    let rest = topic.strip_prefix(RAW_TOPIC_PREFIX)?.strip_prefix('/')?;
    let (asset, point) = rest.split_once('/')?;
    if asset.is_empty() || point.is_empty() || point.contains('/') {
        return None;
    }
    Some(SensorKey::new(asset, point))
}

/// Parse one input line in either the flat or the topic/payload form.
pub fn parse_line(line: &str) -> Result<(SensorKey, RawBatch)> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    if value.get("topic").is_some() {
        let t: TopicLine = serde_json::from_value(value)?;
        let key = parse_raw_topic(&t.topic)
            .ok_or_else(|| anyhow::anyhow!("not a raw vibration topic: {}", t.topic))?;
        Ok((key, t.payload.into()))
    } else {
        let f: FlatLine = serde_json::from_value(value)?;
        let batch = RawBatch::new(f.acceleration).with_temperature_alarm(f.temperature_alarm);
        Ok((SensorKey::new(f.asset, f.point), batch))
    }
}

// ============================================================================
// Line Source (stdin or any buffered reader)
// ============================================================================

/// Reads JSON raw batches, one per line.
///
/// Used with the generator binary:
/// `fault-generator | vibralyzer --stdin`
pub struct LineSource<R> {
    reader: R,
    line_buffer: Vec<u8>,
    name: &'static str,
}

/// The stdin flavour used by the binary.
pub type StdinSource = LineSource<BufReader<tokio::io::Stdin>>;

impl StdinSource {
    pub fn stdin() -> Self {
        LineSource::new(BufReader::new(tokio::io::stdin()), "stdin")
    }
}

impl<R: AsyncBufRead + Unpin + Send + 'static> LineSource<R> {
    pub fn new(reader: R, name: &'static str) -> Self {
        Self {
            reader,
            line_buffer: Vec::with_capacity(64 * 1024),
            name,
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send + 'static> BatchSource for LineSource<R> {
    async fn next_batch(&mut self) -> Result<BatchEvent> {
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_until(b'\n', &mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(BatchEvent::Eof);
            }
            // A bad encoding is a bad line, not a dead stream
            let line = match std::str::from_utf8(&self.line_buffer) {
                Ok(line) => line.trim(),
                Err(e) => {
                    tracing::warn!(source = self.name, error = %e, "Skipping non-UTF-8 line");
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }
            match parse_line(line) {
                Ok((key, batch)) => return Ok(BatchEvent::Batch(key, batch)),
                Err(e) => {
                    // Skip malformed lines and keep reading
                    tracing::warn!(source = self.name, error = %e, "Failed to parse raw batch");
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        self.name
    }
}

// ============================================================================
// Synthetic Source
// ============================================================================

/// Feeds generator batches for one key following a severity schedule.
pub struct SyntheticSource {
    key: SensorKey,
    generator: BearingFaultGenerator,
    schedule: std::vec::IntoIter<FaultSeverity>,
    delay: Duration,
    yielded_first: bool,
}

impl SyntheticSource {
    pub fn new(key: SensorKey, schedule: FaultSchedule, seed: Option<u64>, delay_ms: u64) -> Self {
        Self {
            key,
            generator: BearingFaultGenerator::new(seed),
            schedule: schedule.into_batches(),
            delay: Duration::from_millis(delay_ms),
            yielded_first: false,
        }
    }
}

#[async_trait]
impl BatchSource for SyntheticSource {
    async fn next_batch(&mut self) -> Result<BatchEvent> {
        // No delay before the first batch
        if self.yielded_first && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.schedule.next() {
            Some(severity) => {
                self.yielded_first = true;
                let samples = self.generator.next_batch(severity);
                tracing::trace!(key = %self.key, %severity, "Synthetic batch");
                Ok(BatchEvent::Batch(self.key.clone(), RawBatch::new(samples)))
            }
            None => Ok(BatchEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "synthetic"
    }
}
