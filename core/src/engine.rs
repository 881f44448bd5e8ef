//! The cooperative event loop (component M, §5): one task multiplexing
//! raw input, the reorder-release ticker, the top-of-minute status
//! ticker, and the control plane. The UDP socket and wire decoding are
//! owned by `velotrain-server` (§1 out-of-scope) and fed in as already
//! decoded [`RawPassingRecord`]s over a channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::control::ControlPlane;
use crate::decoder::SessionTable;
use crate::emission::{DailyIndex, EmissionRecord, ReplayFilter, ReplayStore};
use crate::error::CoreError;
use crate::intake::{GateSource, IntakeOutcome, RawIntake};
use crate::moto::MotoAnnotator;
use crate::passing::RawPassingRecord;
use crate::reorder::ReorderBuffer;
use crate::sink::Sink;
use crate::status::StatusTicker;
use crate::tod::Tod;
use crate::track::{TrackModel, GATE_MPID};
use crate::tracker::RiderTracker;

const REORDER_TICK: Duration = Duration::from_millis(100);
const STATUS_POLL_TICK: Duration = Duration::from_secs(1);

pub enum ControlMessage {
    Marker(Option<String>),
    Reset(String),
    ResetUnit(String),
    Replay { serial: Option<String>, filter: ReplayFilter, respond_to: oneshot::Sender<Vec<EmissionRecord>> },
}

pub struct EngineHandles {
    pub raw_tx: mpsc::Sender<RawPassingRecord>,
    pub control_tx: mpsc::Sender<ControlMessage>,
}

pub struct Engine<S: Sink> {
    track: TrackModel,
    sessions: SessionTable,
    reorder: ReorderBuffer,
    tracker: RiderTracker,
    moto: MotoAnnotator,
    control: ControlPlane,
    replay: ReplayStore,
    daily_index: DailyIndex,
    status_ticker: StatusTicker,
    intake: RawIntake,
    clock: Arc<dyn Clock>,
    sink: Arc<S>,
    raw_rx: mpsc::Receiver<RawPassingRecord>,
    control_rx: mpsc::Receiver<ControlMessage>,
    resetting: bool,
    last_raw_input_at: Option<Tod>,
    last_gate_tod: Option<Tod>,
    daily_count: u64,
    last_minute_boundary: Option<i64>,
    last_observed_tod_ticks: Option<i64>,
}

impl<S: Sink + 'static> Engine<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        track: TrackModel,
        channels: Vec<String>,
        master_channel: Option<String>,
        trig_refid: String,
        moto_refids: Vec<String>,
        minspeed: f64,
        maxspeed: f64,
        mingate: f64,
        maxgate: f64,
        laplen: f64,
        authkey: Option<String>,
        reorder_window_secs: f64,
        reorder_capacity: usize,
        gate: Option<GateSource>,
        clock: Arc<dyn Clock>,
        sink: Arc<S>,
    ) -> (Self, EngineHandles) {
        let mut mpseq_lookup = HashMap::new();
        for ch in &channels {
            if let Some(mpid) = track.mpid_for_channel(ch) {
                mpseq_lookup.insert(ch.clone(), mpid);
            }
        }

        let mut all_channels = channels;
        if let Some(g) = &gate {
            if !all_channels.contains(&g.channel) {
                all_channels.push(g.channel.clone());
            }
        }

        let (raw_tx, raw_rx) = mpsc::channel(1024);
        let (control_tx, control_rx) = mpsc::channel(64);

        let engine = Engine {
            sessions: SessionTable::new(all_channels, master_channel),
            reorder: ReorderBuffer::new(reorder_window_secs, reorder_capacity),
            tracker: RiderTracker::new(laplen, minspeed, maxspeed, mingate, maxgate),
            moto: MotoAnnotator::new(moto_refids),
            control: ControlPlane::new(authkey),
            replay: ReplayStore::default(),
            daily_index: DailyIndex::default(),
            status_ticker: StatusTicker::default(),
            intake: RawIntake::new(trig_refid, mpseq_lookup).with_gate(gate),
            track,
            clock,
            sink,
            raw_rx,
            control_rx,
            resetting: false,
            last_raw_input_at: None,
            last_gate_tod: None,
            daily_count: 0,
            last_minute_boundary: None,
            last_observed_tod_ticks: None,
        };
        (engine, EngineHandles { raw_tx, control_tx })
    }

    pub async fn run(mut self) -> Result<(), CoreError> {
        info!("velotrain-core engine starting");
        let mut reorder_ticker = tokio::time::interval(REORDER_TICK);
        reorder_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut status_poll = tokio::time::interval(STATUS_POLL_TICK);
        status_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_raw = self.raw_rx.recv() => {
                    match maybe_raw {
                        Some(raw) => self.handle_raw(raw).await,
                        None => return Err(CoreError::Restart),
                    }
                }
                _ = reorder_ticker.tick() => {
                    self.release_ready().await;
                }
                _ = status_poll.tick() => {
                    self.maybe_tick_minute().await;
                }
                maybe_msg = self.control_rx.recv() => {
                    match maybe_msg {
                        Some(msg) => self.handle_control(msg).await,
                        None => return Err(CoreError::Restart),
                    }
                }
            }
        }
    }

    async fn handle_raw(&mut self, raw: RawPassingRecord) {
        self.last_raw_input_at = Some(raw.recv_tod);
        self.sink.publish_raw(&raw).await;

        if !self.resetting {
            match self.intake.handle(&mut self.sessions, &mut self.reorder, self.clock.as_ref(), &raw) {
                Ok(Some(IntakeOutcome::Enqueued)) | Ok(Some(IntakeOutcome::TriggerProcessed)) => {}
                Ok(Some(IntakeOutcome::ReleaseImmediately(passing))) => {
                    let index = self.daily_index.next();
                    let record = self.tracker.process(&self.track, &mut self.moto, index, passing);
                    self.emit(record).await;
                }
                Ok(None) => debug!(channel = %raw.channel, "dropped raw event on unknown channel"),
                Err(err) => warn!(error = %err, channel = %raw.channel, "raw intake error"),
            }
        }
    }

    async fn release_ready(&mut self) {
        if self.resetting {
            return;
        }
        let now = self.clock.now();
        let released = self.reorder.release_ready(now);
        for passing in released {
            let index = self.daily_index.next();
            if passing.mpid == GATE_MPID {
                self.last_gate_tod = Some(passing.tod);
            }
            let record = self.tracker.process(&self.track, &mut self.moto, index, passing);
            self.emit(record).await;
        }
    }

    async fn emit(&mut self, record: EmissionRecord) {
        self.daily_count += 1;
        self.sink.publish_passing(&record).await;
        self.replay.push(record);
    }

    /// `Tod` is a time-of-day value with no notion of the calendar date, so
    /// local midnight is detected the only way available to it: the wall
    /// clock reading drops sharply instead of advancing (§3's "reset at
    /// local midnight" invariant). A half-day threshold distinguishes this
    /// from the 100ms/1s forward ticks the loop normally observes.
    async fn check_day_rollover(&mut self, now: Tod) {
        let ticks = now.ticks();
        if let Some(prev) = self.last_observed_tod_ticks {
            let half_day = 12 * 3600 * crate::tod::TICKS_PER_SECOND;
            if ticks < prev - half_day {
                info!("local midnight rollover detected, resetting daily state");
                self.control.daily_reset(
                    &mut self.reorder,
                    &mut self.tracker,
                    &mut self.sessions,
                    &mut self.daily_index,
                    &mut self.replay,
                );
                self.daily_count = 0;
                self.last_gate_tod = None;
                self.last_raw_input_at = None;
                self.last_minute_boundary = None;
            }
        }
        self.last_observed_tod_ticks = Some(ticks);
    }

    async fn maybe_tick_minute(&mut self) {
        let now = self.clock.now();
        self.check_day_rollover(now).await;
        let per_minute = 60 * crate::tod::TICKS_PER_SECOND;
        let boundary = now.ticks() / per_minute;
        if self.last_minute_boundary == Some(boundary) {
            self.sessions.check_staleness_all(self.clock.as_ref());
            return;
        }
        self.last_minute_boundary = Some(boundary);
        self.sessions.tick_minute_all();
        self.sessions.check_staleness_all(self.clock.as_ref());

        let snapshot = self.status_ticker.snapshot(
            now,
            &self.sessions,
            |ch| self.track.mpid_for_channel(ch),
            self.daily_count,
            self.last_gate_tod,
            self.last_raw_input_at,
            self.resetting,
        );
        self.sink.publish_status(&snapshot).await;
    }

    async fn handle_control(&mut self, msg: ControlMessage) {
        match msg {
            ControlMessage::Marker(payload) => {
                let index = self.daily_index.next();
                let record = self.control.marker(index, payload, self.clock.now());
                self.emit(record).await;
            }
            ControlMessage::Reset(key) => {
                self.resetting = true;
                let resetting_snapshot = self.status_ticker.snapshot(
                    self.clock.now(),
                    &self.sessions,
                    |ch| self.track.mpid_for_channel(ch),
                    self.daily_count,
                    self.last_gate_tod,
                    self.last_raw_input_at,
                    true,
                );
                self.sink.publish_status(&resetting_snapshot).await;

                let result = self.control.reset(
                    &key,
                    &mut self.reorder,
                    &mut self.tracker,
                    &mut self.sessions,
                    &mut self.daily_index,
                    &mut self.replay,
                );
                self.resetting = false;
                match result {
                    Ok(()) => {
                        self.daily_count = 0;
                        self.last_gate_tod = None;
                        self.last_raw_input_at = None;
                        info!("reset completed");
                        let running_snapshot = self.status_ticker.snapshot(
                            self.clock.now(),
                            &self.sessions,
                            |ch| self.track.mpid_for_channel(ch),
                            self.daily_count,
                            self.last_gate_tod,
                            self.last_raw_input_at,
                            false,
                        );
                        self.sink.publish_status(&running_snapshot).await;
                    }
                    Err(CoreError::AuthFailure) => debug!("reset rejected: authkey mismatch"),
                    Err(err) => warn!(error = %err, "reset failed"),
                }
            }
            ControlMessage::ResetUnit(channel) => {
                if let Err(err) = self.control.reset_unit(&channel, &self.track, &mut self.sessions, &mut self.reorder) {
                    warn!(error = %err, channel = %channel, "reset-unit rejected");
                }
            }
            ControlMessage::Replay { serial, filter, respond_to } => {
                let records = self.control.replay(&self.replay, &filter);
                self.sink.publish_replay(serial.as_deref(), &records).await;
                let _ = respond_to.send(records);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::sink::test_support::RecordingSink;
    use crate::track::MpConfig;
    use std::collections::HashMap;

    fn track() -> TrackModel {
        let mut mps = HashMap::new();
        mps.insert("C1".to_string(), MpConfig { name: "Finish".into(), offset_m: 0.0, ..Default::default() });
        TrackModel::build(250.0, &["C1".to_string()], &mps).unwrap()
    }

    fn test_engine(clock: Arc<VirtualClock>) -> Engine<RecordingSink> {
        let sink = Arc::new(RecordingSink::default());
        let (engine, _handles) = Engine::new(
            track(),
            vec!["C1".to_string()],
            None,
            "255".to_string(),
            vec![],
            38.0,
            90.0,
            9.0,
            22.5,
            250.0,
            None,
            crate::reorder::DEFAULT_WINDOW_SECS,
            crate::reorder::DEFAULT_CAPACITY,
            None,
            clock,
            sink,
        );
        engine
    }

    #[tokio::test]
    async fn midnight_rollover_resets_daily_index() {
        let clock = Arc::new(VirtualClock::at(Tod::parse("23:59:59.900").unwrap()));
        let mut engine = test_engine(clock.clone());
        engine.daily_index.next();
        engine.daily_index.next();
        assert_eq!(engine.daily_index.peek(), 2);

        engine.check_day_rollover(clock.now()).await;
        clock.set(Tod::parse("0:00:00.100").unwrap());
        engine.check_day_rollover(clock.now()).await;

        assert_eq!(engine.daily_index.peek(), 0);
    }

    #[tokio::test]
    async fn ordinary_forward_tick_does_not_reset() {
        let clock = Arc::new(VirtualClock::at(Tod::parse("12:00:00.000").unwrap()));
        let mut engine = test_engine(clock.clone());
        engine.daily_index.next();

        engine.check_day_rollover(clock.now()).await;
        clock.set(Tod::parse("12:00:01.000").unwrap());
        engine.check_day_rollover(clock.now()).await;

        assert_eq!(engine.daily_index.peek(), 1);
    }
}
