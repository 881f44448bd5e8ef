//! The default `Sink` implementation: fans out each produced topic (§6)
//! over one `tokio::sync::broadcast::Sender<String>`, JSON-encoded. This
//! stands in for the real message-broker client, which stays an external
//! collaborator per spec §1 — any consumer subscribes over the debug
//! WebSocket bridge in `ws.rs` instead.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::trace;
use velotrain_core::emission::EmissionRecord;
use velotrain_core::passing::RawPassingRecord;
use velotrain_core::sink::{PassingSink, RawSink, ReplaySink, StatusSink};
use velotrain_core::status::StatusSnapshot;

/// Topic channel capacity: a slow WS subscriber can fall behind by this
/// many messages before it starts missing them (a `RecvError::Lagged`).
const TOPIC_CAPACITY: usize = 1024;

pub struct BroadcastSink {
    pub passing: broadcast::Sender<String>,
    pub rawpass: broadcast::Sender<String>,
    pub status: broadcast::Sender<String>,
    pub replay: broadcast::Sender<String>,
}

impl Default for BroadcastSink {
    fn default() -> Self {
        BroadcastSink {
            passing: broadcast::channel(TOPIC_CAPACITY).0,
            rawpass: broadcast::channel(TOPIC_CAPACITY).0,
            status: broadcast::channel(TOPIC_CAPACITY).0,
            replay: broadcast::channel(TOPIC_CAPACITY).0,
        }
    }
}

impl BroadcastSink {
    /// Subscribes to one of the four produced topics by its §6 basename
    /// (`passing`, `rawpass`, `status`, `replay`). `None` for an unknown name.
    pub fn subscribe(&self, topic: &str) -> Option<broadcast::Receiver<String>> {
        match topic {
            "passing" => Some(self.passing.subscribe()),
            "rawpass" => Some(self.rawpass.subscribe()),
            "status" => Some(self.status.subscribe()),
            "replay" => Some(self.replay.subscribe()),
            _ => None,
        }
    }
}

#[async_trait]
impl RawSink for BroadcastSink {
    async fn publish_raw(&self, raw: &RawPassingRecord) {
        if let Ok(json) = serde_json::to_string(raw) {
            trace!(channel = %raw.channel, "publish rawpass");
            let _ = self.rawpass.send(json);
        }
    }
}

#[async_trait]
impl PassingSink for BroadcastSink {
    async fn publish_passing(&self, record: &EmissionRecord) {
        if let Ok(json) = serde_json::to_string(record) {
            trace!(index = record.index, "publish passing");
            let _ = self.passing.send(json);
        }
    }
}

#[async_trait]
impl StatusSink for BroadcastSink {
    async fn publish_status(&self, status: &StatusSnapshot) {
        if let Ok(json) = serde_json::to_string(status) {
            let _ = self.status.send(json);
        }
    }
}

#[async_trait]
impl ReplaySink for BroadcastSink {
    async fn publish_replay(&self, serial: Option<&str>, records: &[EmissionRecord]) {
        let payload = serde_json::json!({ "serial": serial, "records": records });
        if let Ok(json) = serde_json::to_string(&payload) {
            let _ = self.replay.send(json);
        }
    }
}
