//! End-to-end scenarios from spec §8, driven synchronously against the
//! D -> C -> E -> F chain with a virtual clock — no tokio runtime needed
//! since nothing here actually suspends.

use std::collections::HashMap;

use velotrain_core::clock::{Clock, VirtualClock};
use velotrain_core::control::ControlPlane;
use velotrain_core::decoder::SessionTable;
use velotrain_core::emission::{DailyIndex, EmissionRecord, ReplayFilter, ReplayStore};
use velotrain_core::intake::{stamp_raw, IntakeOutcome, RawIntake};
use velotrain_core::moto::MotoAnnotator;
use velotrain_core::reorder::{EnqueueOutcome, ReorderBuffer};
use velotrain_core::tod::Tod;
use velotrain_core::track::{MpConfig, TrackModel, GATE_MPID};
use velotrain_core::tracker::RiderTracker;

struct Harness {
    track: TrackModel,
    sessions: SessionTable,
    reorder: ReorderBuffer,
    intake: RawIntake,
    tracker: RiderTracker,
    moto: MotoAnnotator,
    index: DailyIndex,
    replay: ReplayStore,
    clock: VirtualClock,
}

fn default_track() -> TrackModel {
    let mut mps = HashMap::new();
    mps.insert("C1".to_string(), MpConfig { name: "Finish".into(), offset_m: 0.0, ..Default::default() });
    mps.insert("C9".to_string(), MpConfig { name: "Quarter".into(), offset_m: 62.5, ..Default::default() });
    mps.insert(
        "C4".to_string(),
        MpConfig { name: "Half".into(), offset_m: 125.0, half: Some("C1".into()), ..Default::default() },
    );
    mps.insert("C6".to_string(), MpConfig { name: "Three-quarter".into(), offset_m: 187.5, ..Default::default() });
    TrackModel::build(250.0, &["C1", "C9", "C4", "C6"].map(String::from), &mps).unwrap()
}

impl Harness {
    fn new() -> Self {
        let track = default_track();
        let channels = vec!["C1".to_string(), "C9".to_string(), "C4".to_string(), "C6".to_string()];
        let mut lookup = HashMap::new();
        for ch in &channels {
            lookup.insert(ch.clone(), track.mpid_for_channel(ch).unwrap());
        }
        Harness {
            sessions: SessionTable::new(channels, None),
            reorder: ReorderBuffer::with_defaults(),
            intake: RawIntake::new("255".to_string(), lookup),
            tracker: RiderTracker::new(250.0, 38.0, 90.0, 9.0, 22.5),
            moto: MotoAnnotator::new(vec!["900001".to_string()]),
            index: DailyIndex::default(),
            replay: ReplayStore::default(),
            clock: VirtualClock::at(Tod::parse("12:00:00.000").unwrap()),
            track,
        }
    }

    /// Brings a channel online by feeding two agreeing top-of-minute triggers.
    fn bring_online(&mut self, channel: &str, around: Tod) {
        let session = self.sessions.get_mut(channel).unwrap();
        session.on_trigger(around, around).unwrap();
        session
            .on_trigger(
                around.checked_add(velotrain_core::tod::TodDelta(60 * velotrain_core::tod::TICKS_PER_SECOND)).unwrap(),
                around.checked_add(velotrain_core::tod::TodDelta(60 * velotrain_core::tod::TICKS_PER_SECOND)).unwrap(),
            )
            .unwrap();
    }

    fn feed(&mut self, channel: &str, refid: &str, tod: &str) -> Vec<EmissionRecord> {
        self.clock.set(Tod::parse(tod).unwrap());
        let raw = stamp_raw(channel.to_string(), refid.to_string(), Tod::parse(tod).unwrap(), Tod::parse(tod).unwrap(), None, None, false);
        let mut out = Vec::new();
        match self.intake.handle(&mut self.sessions, &mut self.reorder, &self.clock, &raw).unwrap() {
            Some(IntakeOutcome::ReleaseImmediately(passing)) => {
                let idx = self.index.next();
                let rec = self.tracker.process(&self.track, &mut self.moto, idx, passing);
                self.replay.push(rec.clone());
                out.push(rec);
            }
            _ => {}
        }
        out
    }

    fn release(&mut self, now: &str) -> Vec<EmissionRecord> {
        self.clock.set(Tod::parse(now).unwrap());
        let released = self.reorder.release_ready(self.clock.now());
        released
            .into_iter()
            .map(|p| {
                let idx = self.index.next();
                let rec = self.tracker.process(&self.track, &mut self.moto, idx, p);
                self.replay.push(rec.clone());
                rec
            })
            .collect()
    }
}

#[test]
fn scenario_1_full_lap() {
    let mut h = Harness::new();
    for ch in ["C1", "C9", "C4", "C6"] {
        h.bring_online(ch, Tod::parse("11:59:00.0").unwrap());
    }

    h.feed("C1", "100000", "12:00:00.000");
    h.release("12:00:03.100");
    let released = h.feed("C1", "100000", "12:00:18.000");
    assert!(released.is_empty());
    let emitted = h.release("12:00:21.100");

    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].index, 1);
    assert_eq!(emitted[0].splits.lap.as_deref(), Some("18.00"));
    assert_eq!(emitted[0].elap.as_deref(), Some("18.00"));
}

#[test]
fn scenario_2_isolated_slow_passing() {
    let mut h = Harness::new();
    h.bring_online("C1", Tod::parse("11:59:00.0").unwrap());

    h.feed("C1", "100000", "12:00:00.000");
    h.release("12:00:03.100");
    h.feed("C1", "100000", "12:00:30.000");
    let emitted = h.release("12:00:33.100");

    assert_eq!(emitted.len(), 1);
    assert!(emitted[0].splits.lap.is_none());
    assert!(emitted[0].elap.is_none());
}

#[test]
fn scenario_3_reorder_within_window() {
    let mut h = Harness::new();
    h.bring_online("C1", Tod::parse("11:59:00.0").unwrap());
    h.bring_online("C9", Tod::parse("11:59:00.0").unwrap());

    // Arrive in wall order C1 then C9, but C9's corrected tod is earlier.
    h.feed("C1", "100000", "12:00:00.100");
    h.feed("C9", "100000", "12:00:00.050");

    let emitted = h.release("12:00:03.200");
    assert_eq!(emitted.len(), 2);
    assert_eq!(emitted[0].mpid, h.track.mpid_for_channel("C9").unwrap());
    assert_eq!(emitted[1].mpid, h.track.mpid_for_channel("C1").unwrap());
    assert_eq!(emitted[0].index, 0);
    assert_eq!(emitted[1].index, 1);
}

#[test]
fn scenario_4_late_late_event_marked_out_of_order() {
    let mut h = Harness::new();
    h.bring_online("C1", Tod::parse("11:59:00.0").unwrap());

    h.clock.set(Tod::parse("12:00:10.000").unwrap());
    let emitted = h.feed("C1", "100000", "12:00:00.000");
    assert_eq!(emitted.len(), 1);
    assert!(emitted[0].out_of_order);
    assert!(h.tracker.history("100000").map(|hist| hist.entries.is_empty()).unwrap_or(true));
}

#[test]
fn scenario_5_gate_start() {
    let mut h = Harness::new();
    h.bring_online("C1", Tod::parse("11:59:00.0").unwrap());

    let gate_session_channel = "C1".to_string();
    let _ = gate_session_channel;
    h.clock.set(Tod::parse("12:10:00.000").unwrap());
    let raw = stamp_raw(
        "C1".to_string(),
        "100000".to_string(),
        Tod::parse("12:10:00.000").unwrap(),
        Tod::parse("12:10:00.000").unwrap(),
        None,
        None,
        false,
    );
    // Directly exercise the tracker's gate handling: mpid 0 is synthetic
    // and doesn't belong to any configured channel, so we bypass intake's
    // channel lookup and hand the corrected passing straight to F.
    let gate_passing = velotrain_core::passing::CorrectedPassing {
        mpid: GATE_MPID,
        refid: raw.refid.clone(),
        tod: Tod::parse("12:10:00.000").unwrap(),
        env: None,
        info: None,
        arrival_wall: Tod::parse("12:10:00.000").unwrap(),
        out_of_order: false,
    };
    let idx = h.index.next();
    h.tracker.process(&h.track, &mut h.moto, idx, gate_passing);

    let emitted = h.feed("C1", "100000", "12:10:25.000");
    assert!(emitted.is_empty());
    let released = h.release("12:10:28.100");
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].elap.as_deref(), Some("25.00"));
    assert!(released[0].splits.lap.is_none());
}

#[test]
fn scenario_6_marker_replay_window() {
    let mut h = Harness::new();
    let plane = ControlPlane::new(None);

    let idx0 = h.index.next();
    let one = plane.marker(idx0, Some("one".into()), Tod::parse("12:00:00.0").unwrap());
    h.replay.push(one);

    let passing_idx = h.index.next();
    let rec = h.tracker.process(
        &h.track,
        &mut h.moto,
        passing_idx,
        velotrain_core::passing::CorrectedPassing {
            mpid: 1,
            refid: "100000".into(),
            tod: Tod::parse("12:00:05.0").unwrap(),
            env: None,
            info: None,
            arrival_wall: Tod::parse("12:00:05.0").unwrap(),
            out_of_order: false,
        },
    );
    h.replay.push(rec);

    let idx_two = h.index.next();
    let two = plane.marker(idx_two, Some("two".into()), Tod::parse("12:00:10.0").unwrap());
    h.replay.push(two);

    let filter = ReplayFilter { marker: Some(vec!["one".to_string()]), ..Default::default() };
    let results = plane.replay(&h.replay, &filter);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].refid, "100000");
}

#[test]
fn scenario_7_reset_clears_state() {
    let mut h = Harness::new();
    let plane = ControlPlane::new(Some("secret".to_string()));

    h.bring_online("C1", Tod::parse("11:59:00.0").unwrap());
    h.feed("C1", "100000", "12:00:00.000");
    h.release("12:00:03.100");
    assert_eq!(h.index.peek(), 1);

    let wrong = plane.reset("nope", &mut h.reorder, &mut h.tracker, &mut h.sessions, &mut h.index, &mut h.replay);
    assert!(wrong.is_err());
    assert_eq!(h.index.peek(), 1);

    plane.reset("secret", &mut h.reorder, &mut h.tracker, &mut h.sessions, &mut h.index, &mut h.replay).unwrap();
    assert_eq!(h.index.peek(), 0);
    assert!(h.replay.is_empty());
}
