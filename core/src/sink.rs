//! Output seams (component K). The core produces decorated records and
//! status snapshots through these traits; the concrete message-broker
//! client stays an external collaborator (§1, §6) — `velotrain-server`
//! supplies the default implementation.

use async_trait::async_trait;

use crate::emission::EmissionRecord;
use crate::passing::RawPassingRecord;
use crate::status::StatusSnapshot;

#[async_trait]
pub trait RawSink: Send + Sync {
    async fn publish_raw(&self, raw: &RawPassingRecord);
}

#[async_trait]
pub trait PassingSink: Send + Sync {
    async fn publish_passing(&self, record: &EmissionRecord);
}

#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn publish_status(&self, status: &StatusSnapshot);
}

#[async_trait]
pub trait ReplaySink: Send + Sync {
    async fn publish_replay(&self, serial: Option<&str>, records: &[EmissionRecord]);
}

/// Bundles the four output seams the engine writes to. A concrete sink
/// (e.g. `velotrain-server`'s broadcast-channel bridge) implements all four.
pub trait Sink: RawSink + PassingSink + StatusSink + ReplaySink {}
impl<T: RawSink + PassingSink + StatusSink + ReplaySink> Sink for T {}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// An in-memory sink recording everything published, for scenario tests.
    #[derive(Default)]
    pub struct RecordingSink {
        pub raw: Mutex<Vec<RawPassingRecord>>,
        pub passings: Mutex<Vec<EmissionRecord>>,
        pub statuses: Mutex<Vec<StatusSnapshot>>,
        pub replays: Mutex<Vec<(Option<String>, Vec<EmissionRecord>)>>,
    }

    #[async_trait]
    impl RawSink for RecordingSink {
        async fn publish_raw(&self, raw: &RawPassingRecord) {
            self.raw.lock().unwrap().push(raw.clone());
        }
    }

    #[async_trait]
    impl PassingSink for RecordingSink {
        async fn publish_passing(&self, record: &EmissionRecord) {
            self.passings.lock().unwrap().push(record.clone());
        }
    }

    #[async_trait]
    impl StatusSink for RecordingSink {
        async fn publish_status(&self, status: &StatusSnapshot) {
            self.statuses.lock().unwrap().push(status.clone());
        }
    }

    #[async_trait]
    impl ReplaySink for RecordingSink {
        async fn publish_replay(&self, serial: Option<&str>, records: &[EmissionRecord]) {
            self.replays.lock().unwrap().push((serial.map(String::from), records.to_vec()));
        }
    }
}
