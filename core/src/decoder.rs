//! Per-channel decoder session (component C): clock-offset estimation
//! driven by top-of-minute trigger pulses, liveness tracking, and the
//! noise/low-battery bookkeeping reported in status snapshots.

use std::collections::{HashMap, HashSet};

use crate::clock::Clock;
use crate::error::CoreError;
use crate::tod::{Tod, TodDelta};

/// Trigger offset estimates within this many ticks of each other are
/// considered agreeing (50 ms, spec §4.3's K=2 rule).
const AGREEMENT_TOLERANCE_TICKS: i64 = 500;
const CONSECUTIVE_AGREEING_REQUIRED: u32 = 2;
const STALE_AFTER_SECS: f64 = 180.0;
const NOISE_EMA_ALPHA: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Offline,
    Syncing,
    Online,
    Stale,
}

#[derive(Debug, Clone)]
pub struct DecoderSession {
    pub channel: String,
    pub is_master: bool,
    pub state: SessionState,
    /// Host-minus-unit offset at the last accepted trigger. Corrected tod
    /// is `raw_tod + offset`.
    pub offset: TodDelta,
    pending_offset: Option<TodDelta>,
    agree_count: u32,
    pub noise: f64,
    spurious_this_minute: u32,
    pub last_seen: Option<Tod>,
    pub low_battery: HashSet<String>,
}

impl DecoderSession {
    pub fn new(channel: impl Into<String>, is_master: bool) -> Self {
        DecoderSession {
            channel: channel.into(),
            is_master,
            state: SessionState::Offline,
            offset: TodDelta(0),
            pending_offset: None,
            agree_count: 0,
            noise: 0.0,
            spurious_this_minute: 0,
            last_seen: None,
            low_battery: HashSet::new(),
        }
    }

    pub fn corrected(&self, raw_tod: Tod) -> Option<Tod> {
        raw_tod.checked_add(self.offset)
    }

    /// Snaps `host_recv_tod` to the nearest whole minute, as used for
    /// trigger offset estimation.
    fn snap_to_minute(host_recv_tod: Tod) -> Tod {
        let ticks = host_recv_tod.ticks();
        let per_minute = 60 * crate::tod::TICKS_PER_SECOND;
        let snapped = ((ticks as f64 / per_minute as f64).round() as i64) * per_minute;
        Tod::from_ticks(snapped)
    }

    /// Feeds a trigger passing (`refid == trig`) into the offset estimator.
    /// Returns `Err(SessionDesync)` if an online session's estimate
    /// suddenly disagrees with its established offset.
    pub fn on_trigger(&mut self, host_recv_tod: Tod, unit_tod: Tod) -> Result<(), CoreError> {
        self.last_seen = Some(host_recv_tod);
        let host_snapped = Self::snap_to_minute(host_recv_tod);
        let candidate = host_snapped.delta(unit_tod);

        match self.state {
            SessionState::Offline | SessionState::Stale => {
                self.state = SessionState::Syncing;
                self.pending_offset = Some(candidate);
                self.agree_count = 1;
                Ok(())
            }
            SessionState::Syncing => {
                if let Some(prev) = self.pending_offset {
                    if (candidate.0 - prev.0).abs() <= AGREEMENT_TOLERANCE_TICKS {
                        self.agree_count += 1;
                        self.pending_offset = Some(candidate);
                        if self.agree_count >= CONSECUTIVE_AGREEING_REQUIRED {
                            self.state = SessionState::Online;
                            self.offset = candidate;
                        }
                    } else {
                        self.pending_offset = Some(candidate);
                        self.agree_count = 1;
                    }
                } else {
                    self.pending_offset = Some(candidate);
                    self.agree_count = 1;
                }
                Ok(())
            }
            SessionState::Online => {
                if (candidate.0 - self.offset.0).abs() <= AGREEMENT_TOLERANCE_TICKS {
                    self.offset = candidate;
                    Ok(())
                } else {
                    self.state = SessionState::Syncing;
                    self.pending_offset = Some(candidate);
                    self.agree_count = 1;
                    Err(CoreError::SessionDesync { channel: self.channel.clone() })
                }
            }
        }
    }

    pub fn note_event(&mut self, host_recv_tod: Tod) {
        self.last_seen = Some(host_recv_tod);
    }

    pub fn note_spurious(&mut self) {
        self.spurious_this_minute += 1;
    }

    /// Called once per host top-of-minute boundary to fold this minute's
    /// spurious count into the noise EMA.
    pub fn tick_minute(&mut self) {
        let sample = (self.spurious_this_minute as f64).min(100.0);
        self.noise = (NOISE_EMA_ALPHA * sample + (1.0 - NOISE_EMA_ALPHA) * self.noise).clamp(0.0, 100.0);
        self.spurious_this_minute = 0;
    }

    /// Demotes this session to `stale` if it has not seen any event for
    /// more than `STALE_AFTER_SECS`.
    pub fn check_staleness(&mut self, clock: &dyn Clock) {
        if self.state != SessionState::Online {
            return;
        }
        if let Some(last) = self.last_seen {
            if clock.now().delta(last).as_seconds() > STALE_AFTER_SECS {
                self.state = SessionState::Stale;
            }
        }
    }

    /// Unit-reset: drop to offline and schedule resync. The synchronisation
    /// master refuses this (§4.8 ResetUnit).
    pub fn reset_unit(&mut self) -> Result<(), CoreError> {
        if self.is_master {
            return Err(CoreError::TransientInput(format!(
                "cannot reset synchronisation master channel {}",
                self.channel
            )));
        }
        self.state = SessionState::Offline;
        self.pending_offset = None;
        self.agree_count = 0;
        Ok(())
    }

    /// Daily reset: sessions drop to offline and resync, but low-battery
    /// history is cleared too (§4.8 Reset).
    pub fn reset_daily(&mut self) {
        self.state = SessionState::Offline;
        self.pending_offset = None;
        self.agree_count = 0;
        self.low_battery.clear();
    }
}

/// Live per-channel session state, keyed by channel id. Read-only track
/// geometry lives separately in [`crate::track::TrackModel`] (Design Notes §9).
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<String, DecoderSession>,
    master_channel: Option<String>,
}

impl SessionTable {
    pub fn new(channels: impl IntoIterator<Item = String>, master_channel: Option<String>) -> Self {
        let mut sessions = HashMap::new();
        for ch in channels {
            let is_master = master_channel.as_deref() == Some(ch.as_str());
            sessions.insert(ch.clone(), DecoderSession::new(ch, is_master));
        }
        SessionTable { sessions, master_channel }
    }

    pub fn get(&self, channel: &str) -> Option<&DecoderSession> {
        self.sessions.get(channel)
    }

    pub fn get_mut(&mut self, channel: &str) -> Option<&mut DecoderSession> {
        self.sessions.get_mut(channel)
    }

    pub fn channels(&self) -> impl Iterator<Item = &DecoderSession> {
        self.sessions.values()
    }

    /// If the synchronisation master has gone `stale`, every other session
    /// is forced back to `syncing` until the master recovers (§9 Open
    /// Question policy).
    pub fn enforce_master_staleness_policy(&mut self) {
        let Some(master) = &self.master_channel else { return };
        let master_stale = self
            .sessions
            .get(master)
            .map(|s| s.state == SessionState::Stale)
            .unwrap_or(false);
        if !master_stale {
            return;
        }
        for (ch, session) in self.sessions.iter_mut() {
            if ch != master && session.state == SessionState::Online {
                session.state = SessionState::Syncing;
            }
        }
    }

    pub fn tick_minute_all(&mut self) {
        for s in self.sessions.values_mut() {
            s.tick_minute();
        }
    }

    pub fn check_staleness_all(&mut self, clock: &dyn Clock) {
        for s in self.sessions.values_mut() {
            s.check_staleness(clock);
        }
        self.enforce_master_staleness_policy();
    }

    pub fn reset_all_daily(&mut self) {
        for s in self.sessions.values_mut() {
            s.reset_daily();
        }
    }
}
