//! Rider tracker (component F): the per-transponder sector history, the
//! in-run/isolated classifier, and split computation. The largest and
//! most spec-dense component — see §4.6.
//!
//! `Subject` is the tagged variant suggested by Design Notes §9: rider,
//! moto, and gate passings share the same history interface, markers are
//! handled entirely by the control plane (H) and never reach the tracker.

use std::collections::HashMap;

use crate::emission::{EmissionRecord, Splits};
use crate::moto::MotoAnnotator;
use crate::passing::CorrectedPassing;
use crate::tod::Tod;
use crate::track::{SplitKind, TrackModel, GATE_MPID};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    Rider(String),
    Moto(String),
    Gate(String),
}

#[derive(Debug, Clone, Copy)]
pub struct HistoryEntry {
    pub mpid: u8,
    pub tod: Tod,
}

#[derive(Debug, Default)]
pub struct RiderHistory {
    pub entries: Vec<HistoryEntry>,
    pub in_run: bool,
    pub run_start_tod: Option<Tod>,
    pub last_gate_tod: Option<Tod>,
}

impl RiderHistory {
    fn prune(&mut self, now: Tod, retention_secs: f64) {
        self.entries.retain(|e| now.delta(e.tod).as_seconds() <= retention_secs);
    }

    /// Most recent entry at `mpid`, strictly before `before`.
    fn most_recent_at(&self, mpid: u8, before: Tod) -> Option<&HistoryEntry> {
        self.entries.iter().rev().find(|e| e.mpid == mpid && e.tod < before)
    }

    fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }
}

pub struct RiderTracker {
    histories: HashMap<String, RiderHistory>,
    pub minspeed: f64,
    pub maxspeed: f64,
    pub mingate: f64,
    pub maxgate: f64,
    laplen: f64,
}

fn classify_subject(refid: &str, mpid: u8, moto: &MotoAnnotator) -> Subject {
    if mpid == GATE_MPID {
        Subject::Gate(refid.to_string())
    } else if moto.is_moto(refid) {
        Subject::Moto(refid.to_string())
    } else {
        Subject::Rider(refid.to_string())
    }
}

impl RiderTracker {
    pub fn new(laplen: f64, minspeed: f64, maxspeed: f64, mingate: f64, maxgate: f64) -> Self {
        RiderTracker { histories: HashMap::new(), minspeed, maxspeed, mingate, maxgate, laplen }
    }

    fn retention_secs(&self) -> f64 {
        (self.laplen / self.minspeed) * 2.0
    }

    pub fn clear_all(&mut self) {
        self.histories.clear();
    }

    pub fn history(&self, refid: &str) -> Option<&RiderHistory> {
        self.histories.get(refid)
    }

    /// Processes one released event (from E) and produces its decorated
    /// emission record. `index` is assigned by the caller so markers and
    /// passings share one monotone sequence.
    pub fn process(
        &mut self,
        track: &TrackModel,
        moto: &mut MotoAnnotator,
        index: u64,
        event: CorrectedPassing,
    ) -> EmissionRecord {
        let subject = classify_subject(&event.refid, event.mpid, moto);

        if let Subject::Moto(refid) = &subject {
            let moto_field = moto.record_moto_passing(event.mpid, event.tod);
            return EmissionRecord {
                index,
                mpid: event.mpid,
                refid: refid.clone(),
                time: event.tod.format_dcm(),
                elap: None,
                splits: Splits::default(),
                moto: Some(moto_field),
                env: event.env,
                text: event.info,
                out_of_order: event.out_of_order,
                tod: event.tod,
            };
        }

        let refid = event.refid.clone();
        let retention = self.retention_secs();
        let history = self.histories.entry(refid.clone()).or_default();
        history.prune(event.tod, retention);

        if event.out_of_order {
            // Never mutate history from a late-late arrival; always isolated.
            let moto_annotation = moto.annotate(event.mpid, event.tod);
            return EmissionRecord {
                index,
                mpid: event.mpid,
                refid,
                time: event.tod.format_dcm(),
                elap: None,
                splits: Splits::default(),
                moto: moto_annotation,
                env: event.env,
                text: event.info,
                out_of_order: true,
                tod: event.tod,
            };
        }

        if matches!(subject, Subject::Gate(_)) {
            history.run_start_tod = Some(event.tod);
            history.last_gate_tod = Some(event.tod);
            history.entries.push(HistoryEntry { mpid: event.mpid, tod: event.tod });
            let elap = Some("0.00".to_string());
            let moto_annotation = moto.annotate(event.mpid, event.tod);
            return EmissionRecord {
                index,
                mpid: event.mpid,
                refid,
                time: event.tod.format_dcm(),
                elap,
                splits: Splits::default(),
                moto: moto_annotation,
                env: event.env,
                text: event.info,
                out_of_order: false,
                tod: event.tod,
            };
        }

        // Subject::Rider at a real measurement point.
        let prev = history.last().copied();
        if prev.is_none() {
            // First accepted sector entry for this refid: starts a run
            // reference in the absence of a gate passing (§3 RiderHistory
            // `run_start_tod`).
            history.run_start_tod = Some(event.tod);
        }
        let in_run = self.classify(track, prev, event.mpid, event.tod);
        let history = self.histories.get_mut(&refid).expect("entry inserted above");
        history.in_run = in_run;
        history.entries.push(HistoryEntry { mpid: event.mpid, tod: event.tod });

        let splits = if in_run {
            self.compute_splits(track, &refid, event.mpid, event.tod)
        } else {
            Splits::default()
        };

        let history = self.histories.get(&refid).unwrap();
        let elap = if in_run {
            match (history.last_gate_tod, history.run_start_tod) {
                (None, None) => None,
                (lg, rs) => {
                    let reference = match (lg, rs) {
                        (Some(a), Some(b)) => Some(if a > b { a } else { b }),
                        (Some(a), None) => Some(a),
                        (None, Some(b)) => Some(b),
                        (None, None) => None,
                    };
                    reference.map(|r| Tod::from_ticks(event.tod.delta(r).0.max(0)).format_dc())
                }
            }
        } else {
            None
        };

        let moto_annotation = moto.annotate(event.mpid, event.tod);

        EmissionRecord {
            index,
            mpid: event.mpid,
            refid,
            time: event.tod.format_dcm(),
            elap,
            splits,
            moto: moto_annotation,
            env: event.env,
            text: event.info,
            out_of_order: false,
            tod: event.tod,
        }
    }

    /// Classification per §4.6: fresh entry, in-run, or isolated.
    fn classify(&self, track: &TrackModel, prev: Option<HistoryEntry>, mpid: u8, tod: Tod) -> bool {
        let Some(prev) = prev else { return false };

        let gap_secs = tod.delta(prev.tod).as_seconds();
        if gap_secs > (self.laplen / self.minspeed) * 2.0 || gap_secs <= 0.0 {
            return false;
        }

        let prev_was_gate = prev.mpid == GATE_MPID;

        // Same channel as the previous entry: this is a full lap closing
        // the loop back on itself, not a short intermediate sector.
        if !prev_was_gate && mpid == prev.mpid {
            let speed = TrackModel::speed_kmh(self.laplen, gap_secs);
            return speed >= self.minspeed && speed <= self.maxspeed;
        }

        let from_mpid = if prev_was_gate {
            match track.predecessor_mpid(mpid) {
                Some(m) => m,
                None => return false,
            }
        } else {
            prev.mpid
        };

        if !prev_was_gate {
            match track.next_mpid(prev.mpid) {
                Some(expected) if expected == mpid => {}
                _ => return false,
            }
        }

        let Ok(length) = track.sector_length(from_mpid, mpid) else { return false };
        let speed = TrackModel::speed_kmh(length, gap_secs);

        let (lo, hi) = if prev_was_gate { (self.mingate, self.maxgate) } else { (self.minspeed, self.maxspeed) };
        speed >= lo && speed <= hi
    }

    fn compute_splits(&self, track: &TrackModel, refid: &str, mpid: u8, tod: Tod) -> Splits {
        let history = match self.histories.get(refid) {
            Some(h) => h,
            None => return Splits::default(),
        };
        let Some(mp) = track.get(mpid) else { return Splits::default() };

        let mut splits = Splits::default();

        for kind in SplitKind::ALL {
            let (ancestor_mpid, nominal) = match kind {
                SplitKind::Lap => (Some(mpid), None),
                other => match mp.ancestors.get(&other) {
                    Some(&a) => (Some(a), other.nominal_length_m(self.laplen)),
                    None => (None, None),
                },
            };
            let Some(ancestor_mpid) = ancestor_mpid else { continue };

            let nominal_len = match kind {
                SplitKind::Lap => self.laplen,
                _ => match nominal {
                    Some(n) => n,
                    None => continue,
                },
            };

            let formatted = history
                .entries
                .iter()
                .rev()
                .filter(|e| e.mpid == ancestor_mpid && e.tod < tod)
                .find_map(|e| {
                    let d = tod.delta(e.tod).as_seconds();
                    if d <= 0.0 {
                        return None;
                    }
                    let speed = TrackModel::speed_kmh(nominal_len, d);
                    if speed >= self.minspeed && speed <= self.maxspeed {
                        Some(Tod::from_ticks((d * crate::tod::TICKS_PER_SECOND as f64).round() as i64).format_dc())
                    } else {
                        None
                    }
                });

            match kind {
                SplitKind::Lap => splits.lap = formatted,
                SplitKind::Half => splits.half = formatted,
                SplitKind::Qtr => splits.qtr = formatted,
                SplitKind::S200 => splits.s200 = formatted,
                SplitKind::S100 => splits.s100 = formatted,
                SplitKind::S50 => splits.s50 = formatted,
            }
        }

        splits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn track() -> TrackModel {
        let mut mps = Map::new();
        mps.insert(
            "C1".to_string(),
            crate::track::MpConfig { name: "Finish".into(), offset_m: 0.0, ..Default::default() },
        );
        mps.insert(
            "C9".to_string(),
            crate::track::MpConfig { name: "Quarter".into(), offset_m: 62.5, ..Default::default() },
        );
        mps.insert(
            "C4".to_string(),
            crate::track::MpConfig {
                name: "Half".into(),
                offset_m: 125.0,
                half: Some("C1".into()),
                ..Default::default()
            },
        );
        mps.insert(
            "C6".to_string(),
            crate::track::MpConfig { name: "Three-quarter".into(), offset_m: 187.5, ..Default::default() },
        );
        TrackModel::build(250.0, &["C1", "C9", "C4", "C6"].map(String::from), &mps).unwrap()
    }

    fn cp(mpid: u8, refid: &str, tod: &str) -> CorrectedPassing {
        CorrectedPassing {
            mpid,
            refid: refid.to_string(),
            tod: Tod::parse(tod).unwrap(),
            env: None,
            info: None,
            arrival_wall: Tod::parse(tod).unwrap(),
            out_of_order: false,
        }
    }

    #[test]
    fn full_lap_is_in_run_with_lap_split() {
        let track = track();
        let mut tracker = RiderTracker::new(250.0, 38.0, 90.0, 9.0, 22.5);
        let mut moto = MotoAnnotator::default();

        let e1 = tracker.process(&track, &mut moto, 0, cp(1, "100000", "12:00:00.000"));
        assert!(e1.splits.lap.is_none());

        let e2 = tracker.process(&track, &mut moto, 1, cp(1, "100000", "12:00:18.000"));
        assert_eq!(e2.splits.lap.as_deref(), Some("18.00"));
        assert_eq!(e2.elap.as_deref(), Some("18.00"));
    }

    #[test]
    fn isolated_slow_passing_has_no_splits() {
        let track = track();
        let mut tracker = RiderTracker::new(250.0, 38.0, 90.0, 9.0, 22.5);
        let mut moto = MotoAnnotator::default();

        tracker.process(&track, &mut moto, 0, cp(1, "100000", "12:00:00.000"));
        let e2 = tracker.process(&track, &mut moto, 1, cp(1, "100000", "12:00:30.000"));
        assert!(e2.splits.lap.is_none());
        assert!(e2.elap.is_none());
    }

    #[test]
    fn gate_start_sets_elap_with_null_lap() {
        let track = track();
        let mut tracker = RiderTracker::new(250.0, 38.0, 90.0, 9.0, 22.5);
        let mut moto = MotoAnnotator::default();

        tracker.process(&track, &mut moto, 0, cp(GATE_MPID, "100000", "12:10:00.000"));
        let e2 = tracker.process(&track, &mut moto, 1, cp(1, "100000", "12:10:25.000"));
        assert_eq!(e2.elap.as_deref(), Some("25.00"));
        assert!(e2.splits.lap.is_none());
    }

    #[test]
    fn out_of_order_event_is_always_isolated() {
        let track = track();
        let mut tracker = RiderTracker::new(250.0, 38.0, 90.0, 9.0, 22.5);
        let mut moto = MotoAnnotator::default();

        tracker.process(&track, &mut moto, 0, cp(1, "100000", "12:00:00.000"));
        let mut late = cp(1, "100000", "12:00:10.000");
        late.out_of_order = true;
        let e2 = tracker.process(&track, &mut moto, 1, late);
        assert!(e2.out_of_order);
        assert!(e2.splits.lap.is_none());
    }
}
