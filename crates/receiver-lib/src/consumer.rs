//! Downstream sinks for metric batches

use crate::error::{ReceiverError, Result};
use crate::models::MetricBatch;
use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};

/// Receives one batch per scrape cycle
#[async_trait]
pub trait MetricsConsumer: Send + Sync {
    async fn consume(&self, batch: MetricBatch) -> Result<()>;
}

/// Forwards batches over a bounded channel
pub struct ChannelConsumer {
    tx: mpsc::Sender<MetricBatch>,
}

impl ChannelConsumer {
    pub fn new(buffer_size: usize) -> (Self, mpsc::Receiver<MetricBatch>) {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl MetricsConsumer for ChannelConsumer {
    async fn consume(&self, batch: MetricBatch) -> Result<()> {
        self.tx
            .send(batch)
            .await
            .map_err(|_| ReceiverError::Consumer("batch channel closed".to_string()))
    }
}

/// Writes each batch as one JSON line
pub struct JsonLinesConsumer<W> {
    writer: Mutex<W>,
}

impl JsonLinesConsumer<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesConsumer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> MetricsConsumer for JsonLinesConsumer<W> {
    async fn consume(&self, batch: MetricBatch) -> Result<()> {
        let mut line = serde_json::to_vec(&batch)
            .map_err(|e| ReceiverError::Consumer(format!("encode batch: {}", e)))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|e| ReceiverError::Consumer(format!("write batch: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| ReceiverError::Consumer(format!("flush batch: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DataPoint, Metric, ResourceMetrics};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn batch() -> MetricBatch {
        let mut attributes = BTreeMap::new();
        attributes.insert("upcloud.resource.uuid".to_string(), "db-1".to_string());

        MetricBatch {
            resource_metrics: vec![ResourceMetrics {
                attributes,
                scope: "upcloud-receiver".to_string(),
                metrics: vec![Metric {
                    name: "upcloud.managed_database.cpu.utilization".to_string(),
                    description: "CPU usage %".to_string(),
                    unit: "1".to_string(),
                    data_points: vec![DataPoint {
                        timestamp: Utc.with_ymd_and_hms(2026, 2, 21, 8, 0, 0).unwrap(),
                        value: 0.022,
                        attributes: BTreeMap::new(),
                    }],
                }],
            }],
        }
    }

    #[tokio::test]
    async fn test_channel_consumer_forwards() {
        let (consumer, mut rx) = ChannelConsumer::new(4);
        consumer.consume(batch()).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.data_point_count(), 1);
    }

    #[tokio::test]
    async fn test_channel_consumer_closed() {
        let (consumer, rx) = ChannelConsumer::new(1);
        drop(rx);

        let err = consumer.consume(batch()).await.unwrap_err();
        assert!(matches!(err, ReceiverError::Consumer(_)));
    }

    #[tokio::test]
    async fn test_json_lines_consumer_writes_one_line_per_batch() {
        let consumer = JsonLinesConsumer::new(Vec::new());
        consumer.consume(batch()).await.unwrap();
        consumer.consume(batch()).await.unwrap();

        let out = String::from_utf8(consumer.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        let metric = &parsed["resource_metrics"][0]["metrics"][0];
        assert_eq!(metric["name"], "upcloud.managed_database.cpu.utilization");
        assert_eq!(metric["data_points"][0]["timestamp"], "2026-02-21T08:00:00Z");
    }
}
