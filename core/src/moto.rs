//! Moto annotator (component G): tracks the most recent accepted passing
//! by a configured moto transponder at each measurement point, and
//! annotates every other passing with its proximity to that moto.

use std::collections::{HashMap, HashSet};

use crate::tod::Tod;

/// Moto proximity is only reported within this many seconds (§4.7).
const PROXIMITY_THRESHOLD_SECS: f64 = 5.0;

#[derive(Debug, Default)]
pub struct MotoAnnotator {
    moto_refids: HashSet<String>,
    /// Most recent accepted moto passing per mpid.
    last_by_mpid: HashMap<u8, Tod>,
}

impl MotoAnnotator {
    pub fn new(moto_refids: impl IntoIterator<Item = String>) -> Self {
        MotoAnnotator {
            moto_refids: moto_refids.into_iter().collect(),
            last_by_mpid: HashMap::new(),
        }
    }

    pub fn is_moto(&self, refid: &str) -> bool {
        self.moto_refids.contains(refid)
    }

    /// Records an accepted moto passing and returns its own `moto` field
    /// (always `"0.00"` per §4.7).
    pub fn record_moto_passing(&mut self, mpid: u8, tod: Tod) -> String {
        self.last_by_mpid.insert(mpid, tod);
        "0.00".to_string()
    }

    /// Proximity annotation for a non-moto passing at `mpid`/`tod`, or
    /// `None` if no moto has passed there within the threshold.
    pub fn annotate(&self, mpid: u8, tod: Tod) -> Option<String> {
        let last = self.last_by_mpid.get(&mpid)?;
        let diff = tod.delta(*last).as_seconds().abs();
        if diff <= PROXIMITY_THRESHOLD_SECS {
            Some(Tod::from_ticks((diff * crate::tod::TICKS_PER_SECOND as f64).round() as i64).format_dc())
        } else {
            None
        }
    }
}
