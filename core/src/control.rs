//! Control plane (component H): marker insertion, reset sequencing,
//! unit reset, and replay query. Coexists with the realtime path per §1(e).

use crate::decoder::SessionTable;
use crate::emission::{DailyIndex, EmissionRecord, ReplayFilter, ReplayStore, Splits};
use crate::error::CoreError;
use crate::reorder::ReorderBuffer;
use crate::tod::Tod;
use crate::track::{TrackModel, GATE_MPID};
use crate::tracker::RiderTracker;

pub struct ControlPlane {
    authkey: Option<String>,
}

impl ControlPlane {
    pub fn new(authkey: Option<String>) -> Self {
        ControlPlane { authkey }
    }

    /// Creates a synthetic marker emission. Bypasses E entirely; the
    /// caller assigns it the next index.
    pub fn marker(&self, index: u64, payload: Option<String>, host_now: Tod) -> EmissionRecord {
        let text = match payload {
            Some(p) if !p.is_empty() => p,
            _ => "marker".to_string(),
        };
        EmissionRecord {
            index,
            mpid: GATE_MPID,
            refid: "marker".to_string(),
            time: host_now.format_dcm(),
            elap: None,
            splits: Splits::default(),
            moto: None,
            env: None,
            text: Some(text),
            out_of_order: false,
            tod: host_now,
        }
    }

    /// Verifies `key` against the configured `authkey` (byte-equal
    /// comparison, §1 Non-goals: no authentication beyond this).
    /// An unconfigured authkey accepts any key — there is no secret to
    /// violate.
    fn check_key(&self, key: &str) -> Result<(), CoreError> {
        match &self.authkey {
            Some(expected) if expected == key => Ok(()),
            Some(_) => Err(CoreError::AuthFailure),
            None => Ok(()),
        }
    }

    /// Full daily reset (§4.8 Reset). Returns `Err(AuthFailure)` without
    /// any state change on a wrong key — idempotent under repetition.
    #[allow(clippy::too_many_arguments)]
    pub fn reset(
        &self,
        key: &str,
        reorder: &mut ReorderBuffer,
        tracker: &mut RiderTracker,
        sessions: &mut SessionTable,
        daily_index: &mut DailyIndex,
        replay: &mut ReplayStore,
    ) -> Result<(), CoreError> {
        self.check_key(key)?;
        self.daily_reset(reorder, tracker, sessions, daily_index, replay);
        Ok(())
    }

    /// The state-clearing half of [`Self::reset`], without the authkey
    /// check — used both by the authenticated `/reset` op and by the
    /// automatic local-midnight rollover (§3: "reset at local midnight"),
    /// which has no operator behind it to supply a key.
    pub fn daily_reset(
        &self,
        reorder: &mut ReorderBuffer,
        tracker: &mut RiderTracker,
        sessions: &mut SessionTable,
        daily_index: &mut DailyIndex,
        replay: &mut ReplayStore,
    ) {
        reorder.drain_all();
        tracker.clear_all();
        daily_index.reset();
        replay.clear();
        sessions.reset_all_daily();
    }

    /// Pushes a single channel's session back to `offline` and drops its
    /// pending events. Refuses the synchronisation master.
    pub fn reset_unit(
        &self,
        channel: &str,
        track: &TrackModel,
        sessions: &mut SessionTable,
        reorder: &mut ReorderBuffer,
    ) -> Result<(), CoreError> {
        let session = sessions
            .get_mut(channel)
            .ok_or_else(|| CoreError::TransientInput(format!("unknown channel {channel}")))?;
        session.reset_unit()?;
        if let Some(mpid) = track.mpid_for_channel(channel) {
            reorder.drop_mpid(mpid);
        }
        Ok(())
    }

    pub fn replay<'a>(&self, store: &'a ReplayStore, filter: &ReplayFilter) -> Vec<EmissionRecord> {
        store.query(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::emission::EmissionRecord as _Rec;

    #[test]
    fn wrong_authkey_is_rejected_with_no_state_change() {
        let plane = ControlPlane::new(Some("secret".into()));
        let mut reorder = ReorderBuffer::with_defaults();
        let mut tracker = RiderTracker::new(250.0, 38.0, 90.0, 9.0, 22.5);
        let mut sessions = SessionTable::new(vec!["C1".to_string()], None);
        let mut daily_index = DailyIndex::default();
        daily_index.next();
        let mut replay = ReplayStore::default();

        let err = plane.reset("wrong", &mut reorder, &mut tracker, &mut sessions, &mut daily_index, &mut replay);
        assert!(matches!(err, Err(CoreError::AuthFailure)));
        assert_eq!(daily_index.peek(), 1);
    }

    #[test]
    fn correct_authkey_resets_index() {
        let plane = ControlPlane::new(Some("secret".into()));
        let mut reorder = ReorderBuffer::with_defaults();
        let mut tracker = RiderTracker::new(250.0, 38.0, 90.0, 9.0, 22.5);
        let mut sessions = SessionTable::new(vec!["C1".to_string()], None);
        let mut daily_index = DailyIndex::default();
        daily_index.next();
        let mut replay = ReplayStore::default();

        plane.reset("secret", &mut reorder, &mut tracker, &mut sessions, &mut daily_index, &mut replay).unwrap();
        assert_eq!(daily_index.peek(), 0);
    }

    #[test]
    fn reset_unit_refuses_master_channel() {
        let plane = ControlPlane::new(None);
        let mut mps = std::collections::HashMap::new();
        mps.insert("C1".to_string(), crate::track::MpConfig { name: "Finish".into(), offset_m: 0.0, ..Default::default() });
        let track = TrackModel::build(250.0, &["C1".to_string()], &mps).unwrap();
        let mut sessions = SessionTable::new(vec!["C1".to_string()], Some("C1".to_string()));
        let mut reorder = ReorderBuffer::with_defaults();

        let err = plane.reset_unit("C1", &track, &mut sessions, &mut reorder);
        assert!(err.is_err());
    }

    #[test]
    fn marker_uses_default_text_when_empty() {
        let plane = ControlPlane::new(None);
        let clock = VirtualClock::at(Tod::parse("12:00:00.0").unwrap());
        let rec: _Rec = plane.marker(5, None, clock.now());
        assert_eq!(rec.text.as_deref(), Some("marker"));
        assert_eq!(rec.mpid, GATE_MPID);
    }
}
