//! Decorated output record and the in-memory replay store (Design Notes §9:
//! a contiguous ordered vector, truncated at day reset, filtered linearly).

use serde::{Deserialize, Serialize};

use crate::tod::Tod;

/// Soft cap on a day's emission log, per spec §5 memory bounds.
pub const REPLAY_LOG_SOFT_CAP: usize = 200_000;

/// Assigns the strict monotone nondecreasing `index` sequence shared by
/// every emission (rider passings, gate, markers), reset at local midnight
/// or on control-plane reset.
#[derive(Debug, Default)]
pub struct DailyIndex {
    next: u64,
}

impl DailyIndex {
    pub fn next(&mut self) -> u64 {
        let i = self.next;
        self.next += 1;
        i
    }

    pub fn peek(&self) -> u64 {
        self.next
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Splits {
    pub lap: Option<String>,
    pub half: Option<String>,
    pub qtr: Option<String>,
    #[serde(rename = "200")]
    pub s200: Option<String>,
    #[serde(rename = "100")]
    pub s100: Option<String>,
    #[serde(rename = "50")]
    pub s50: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmissionRecord {
    pub index: u64,
    pub mpid: u8,
    pub refid: String,
    pub time: String,
    pub elap: Option<String>,
    #[serde(flatten)]
    pub splits: Splits,
    pub moto: Option<String>,
    pub env: Option<[f64; 3]>,
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub out_of_order: bool,
    /// Not serialized to the wire — kept for replay tod-range filtering.
    #[serde(skip)]
    pub tod: Tod,
}

/// Linear-scan replay log, capped and truncated at each daily reset.
#[derive(Debug, Default)]
pub struct ReplayStore {
    records: Vec<EmissionRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayFilter {
    pub index_range: Option<(u64, u64)>,
    pub tod_range: Option<(Tod, Tod)>,
    pub mpid: Option<Vec<u8>>,
    pub refid: Option<Vec<String>>,
    /// Returns records strictly after the last occurrence of any listed
    /// marker text, up to (excluding) the next listed marker.
    pub marker: Option<Vec<String>>,
}

impl ReplayStore {
    pub fn push(&mut self, record: EmissionRecord) {
        if self.records.len() >= REPLAY_LOG_SOFT_CAP {
            self.records.remove(0);
        }
        self.records.push(record);
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn all(&self) -> &[EmissionRecord] {
        &self.records
    }

    /// Inclusion intervals for the `marker` filter: (start_index_exclusive,
    /// end_index_exclusive) pairs spanning from each named marker to the
    /// next marker emission (of any text), or to the end of the log.
    fn marker_intervals(&self, names: &[String]) -> Vec<(u64, u64)> {
        let mut intervals = Vec::new();
        let mut iter = self.records.iter().enumerate().peekable();
        while let Some((i, rec)) = iter.next() {
            let is_named_marker =
                rec.mpid == crate::track::GATE_MPID && rec.refid == "marker" && rec
                    .text
                    .as_deref()
                    .map(|t| names.iter().any(|n| n == t))
                    .unwrap_or(false);
            if !is_named_marker {
                continue;
            }
            // Find the next marker emission of any text after this one.
            let mut end = self.records.len() as u64;
            for (j, later) in self.records.iter().enumerate().skip(i + 1) {
                if later.mpid == crate::track::GATE_MPID && later.refid == "marker" {
                    end = j as u64;
                    break;
                }
            }
            intervals.push(((i as u64) + 1, end));
            let _ = iter.peek(); // keep scanning; markers may repeat
        }
        intervals
    }

    pub fn query(&self, filter: &ReplayFilter) -> Vec<EmissionRecord> {
        let marker_intervals = filter.marker.as_ref().map(|names| self.marker_intervals(names));

        self.records
            .iter()
            .enumerate()
            .filter(|(i, rec)| {
                let idx = *i as u64;
                if let Some((lo, hi)) = filter.index_range {
                    if rec.index < lo || rec.index > hi {
                        return false;
                    }
                }
                if let Some((lo, hi)) = filter.tod_range {
                    if rec.tod < lo || rec.tod > hi {
                        return false;
                    }
                }
                if let Some(mpids) = &filter.mpid {
                    if !mpids.contains(&rec.mpid) {
                        return false;
                    }
                }
                if let Some(refids) = &filter.refid {
                    if !refids.contains(&rec.refid) {
                        return false;
                    }
                }
                if let Some(intervals) = &marker_intervals {
                    if !intervals.iter().any(|(lo, hi)| idx >= *lo && idx < *hi) {
                        return false;
                    }
                }
                true
            })
            .map(|(_, rec)| rec.clone())
            .collect()
    }
}
