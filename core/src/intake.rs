//! Raw intake (component D): dispatches inbound raw events to the correct
//! decoder session, publishes them verbatim to the raw sink, and either
//! forwards triggers to C or enqueues corrected passings in E.

use crate::clock::Clock;
use crate::decoder::SessionTable;
use crate::error::CoreError;
use crate::passing::{CorrectedPassing, RawPassingRecord};
use crate::reorder::{EnqueueOutcome, ReorderBuffer};
use crate::tod::{Tod, TodDelta};
use crate::track::GATE_MPID;

pub enum IntakeOutcome {
    /// The event was a trigger; C's offset estimate was updated (or
    /// rejected with a desync error, still logged and continued).
    TriggerProcessed,
    /// The event was enqueued in E for later release.
    Enqueued,
    /// The event was a late-late arrival and must be released immediately.
    ReleaseImmediately(CorrectedPassing),
}

/// Gate wiring, configured by `gatesrc`/`gate`/`gatedelay` (§6): `channel`
/// names the decoder channel the start-gate system reports on; when set,
/// `refid` restricts acceptance to that one system id — other refids
/// arriving on the gate channel are noise, not gate passings. `delay_secs`
/// compensates for the gate's mechanical release latency (§9 resolves
/// this ambiguity by adding the configured delay to the reported tod).
pub struct GateSource {
    pub channel: String,
    pub refid: Option<String>,
    pub delay_secs: f64,
}

pub struct RawIntake {
    pub trig_refid: String,
    pub mpseq_lookup: std::collections::HashMap<String, u8>,
    pub gate: Option<GateSource>,
}

impl RawIntake {
    pub fn new(trig_refid: String, mpseq_lookup: std::collections::HashMap<String, u8>) -> Self {
        RawIntake { trig_refid, mpseq_lookup, gate: None }
    }

    pub fn with_gate(mut self, gate: Option<GateSource>) -> Self {
        self.gate = gate;
        self
    }

    /// Processes one raw record already stamped with `recv_tod`. Returns
    /// `None` (dropped) if the channel is unknown — callers should still
    /// have already logged the drop via the caller's tracing span.
    #[allow(clippy::too_many_arguments)]
    pub fn handle(
        &self,
        sessions: &mut SessionTable,
        reorder: &mut ReorderBuffer,
        clock: &dyn Clock,
        raw: &RawPassingRecord,
    ) -> Result<Option<IntakeOutcome>, CoreError> {
        let is_gate_channel = self.gate.as_ref().map(|g| g.channel == raw.channel).unwrap_or(false);

        let mpid = if is_gate_channel {
            GATE_MPID
        } else {
            match self.mpseq_lookup.get(&raw.channel) {
                Some(&mpid) => mpid,
                None => return Ok(None),
            }
        };

        if raw.low_battery {
            if let Some(session) = sessions.get_mut(&raw.channel) {
                session.low_battery.insert(raw.refid.clone());
            }
        }

        if raw.refid == self.trig_refid {
            let session = sessions
                .get_mut(&raw.channel)
                .ok_or_else(|| CoreError::TransientInput(format!("unknown channel {}", raw.channel)))?;
            session.on_trigger(raw.recv_tod, raw.raw_tod)?;
            return Ok(Some(IntakeOutcome::TriggerProcessed));
        }

        if is_gate_channel {
            let gate = self.gate.as_ref().expect("is_gate_channel implies gate is set");
            if let Some(expected_refid) = &gate.refid {
                if &raw.refid != expected_refid {
                    if let Some(session) = sessions.get_mut(&raw.channel) {
                        session.note_spurious();
                    }
                    return Ok(None);
                }
            }
        }

        let session = sessions
            .get_mut(&raw.channel)
            .ok_or_else(|| CoreError::TransientInput(format!("unknown channel {}", raw.channel)))?;
        session.note_event(raw.recv_tod);

        let Some(mut corrected_tod) = session.corrected(raw.raw_tod) else {
            return Err(CoreError::TransientInput(format!(
                "channel {} produced a negative corrected tod",
                raw.channel
            )));
        };

        if is_gate_channel {
            let delay = self.gate.as_ref().expect("is_gate_channel implies gate is set").delay_secs;
            if let Some(adjusted) = corrected_tod.checked_add(TodDelta::from_seconds(delay)) {
                corrected_tod = adjusted;
            }
        }

        let corrected = CorrectedPassing {
            mpid,
            refid: raw.refid.clone(),
            tod: corrected_tod,
            env: raw.env,
            info: raw.info.clone(),
            arrival_wall: raw.recv_tod,
            out_of_order: false,
        };

        match reorder.enqueue(corrected, clock.now()) {
            EnqueueOutcome::Queued => Ok(Some(IntakeOutcome::Enqueued)),
            EnqueueOutcome::ReleaseImmediately(p) => Ok(Some(IntakeOutcome::ReleaseImmediately(p))),
            EnqueueOutcome::Overflowed => Err(CoreError::QueueOverflow),
        }
    }

    pub fn is_trigger(&self, refid: &str) -> bool {
        refid == self.trig_refid
    }
}

/// Builds a `RawPassingRecord` for a datagram arriving at `recv_tod`, prior
/// to session lookup. The UDP/text decoding itself lives in `timing-wire`
/// and `velotrain-server`; this is the point where the core's view of a
/// raw passing begins.
pub fn stamp_raw(
    channel: String,
    refid: String,
    raw_tod: Tod,
    recv_tod: Tod,
    env: Option<[f64; 3]>,
    info: Option<String>,
    low_battery: bool,
) -> RawPassingRecord {
    RawPassingRecord { channel, mpid: 0, refid, raw_tod, recv_tod, env, info, low_battery }
}
