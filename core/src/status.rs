//! Status ticker (component I): assembles the top-of-minute snapshot from
//! session and tracker state and hands it to the status sink.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::decoder::SessionTable;
use crate::tod::Tod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Info {
    Running,
    Resetting,
    Offline,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub mpid: Option<u8>,
    pub channel: String,
    pub noise: f64,
    pub offset_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub tod: Tod,
    pub utc_offset_secs: f64,
    pub daily_count: u64,
    pub last_gate_tod: Option<Tod>,
    pub low_battery_refids: Vec<String>,
    pub sessions: Vec<SessionStatus>,
    pub info: Info,
}

pub struct StatusTicker {
    /// Raw input silence longer than this promotes `info` to `error`.
    input_silence_threshold_secs: f64,
}

impl Default for StatusTicker {
    fn default() -> Self {
        StatusTicker { input_silence_threshold_secs: 30.0 }
    }
}

impl StatusTicker {
    pub fn snapshot(
        &self,
        now: Tod,
        sessions: &SessionTable,
        mpid_by_channel: impl Fn(&str) -> Option<u8>,
        daily_count: u64,
        last_gate_tod: Option<Tod>,
        last_raw_input_at: Option<Tod>,
        resetting: bool,
    ) -> StatusSnapshot {
        let mut low_battery: HashSet<String> = HashSet::new();
        let mut session_statuses = Vec::new();
        for s in sessions.channels() {
            for refid in &s.low_battery {
                low_battery.insert(refid.clone());
            }
            session_statuses.push(SessionStatus {
                mpid: mpid_by_channel(&s.channel),
                channel: s.channel.clone(),
                noise: s.noise,
                offset_secs: s.offset.as_seconds(),
            });
        }
        session_statuses.sort_by(|a, b| a.channel.cmp(&b.channel));
        let mut low_battery_refids: Vec<String> = low_battery.into_iter().collect();
        low_battery_refids.sort();

        let info = if resetting {
            Info::Resetting
        } else if let Some(last) = last_raw_input_at {
            if now.delta(last).as_seconds() > self.input_silence_threshold_secs {
                Info::Error
            } else {
                Info::Running
            }
        } else {
            Info::Running
        };

        // UTC offset is not observable without a timezone database in this
        // workspace; hosts are expected to run in UTC, so this is 0 unless
        // a future server-side config supplies it.
        StatusSnapshot {
            tod: now,
            utc_offset_secs: 0.0,
            daily_count,
            last_gate_tod,
            low_battery_refids,
            sessions: session_statuses,
            info,
        }
    }

    pub fn offline_snapshot(&self, now: Tod, daily_count: u64) -> StatusSnapshot {
        StatusSnapshot {
            tod: now,
            utc_offset_secs: 0.0,
            daily_count,
            last_gate_tod: None,
            low_battery_refids: Vec::new(),
            sessions: Vec::new(),
            info: Info::Offline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::SessionTable;

    #[test]
    fn flags_error_after_prolonged_silence() {
        let ticker = StatusTicker::default();
        let sessions = SessionTable::new(vec!["C1".to_string()], None);
        let now = Tod::parse("12:01:00.0").unwrap();
        let last_input = Tod::parse("12:00:00.0").unwrap();
        let snap = ticker.snapshot(now, &sessions, |_| Some(1), 0, None, Some(last_input), false);
        assert_eq!(snap.info, Info::Error);
    }

    #[test]
    fn resetting_overrides_silence() {
        let ticker = StatusTicker::default();
        let sessions = SessionTable::new(vec!["C1".to_string()], None);
        let now = Tod::parse("12:01:00.0").unwrap();
        let snap = ticker.snapshot(now, &sessions, |_| Some(1), 0, None, None, true);
        assert_eq!(snap.info, Info::Resetting);
    }
}
