//! One synthetic rider (or moto) circulating the track. Each tick computes
//! the wall-clock delay to its next measurement point from the track's
//! sector geometry and a randomized speed, so the emitted traffic exercises
//! the same split math the core computes on receipt.

use std::time::Duration;

use rand::Rng;
use rand_distr::{Distribution, Normal};
use velotrain_core::track::TrackModel;

pub struct Rider {
    pub refid: String,
    /// Index into `track.order`; the mpid the rider is about to pass.
    next_pos: usize,
    base_speed_kmh: f64,
    jitter: Normal<f64>,
}

impl Rider {
    pub fn new(refid: String, base_speed_kmh: f64, jitter_stddev_kmh: f64) -> Self {
        let jitter = Normal::new(0.0, jitter_stddev_kmh.max(0.01)).expect("valid stddev");
        Rider { refid, next_pos: 0, base_speed_kmh, jitter }
    }

    /// The mpid the rider is about to reach, and how long until it gets
    /// there given the sector length and jittered speed.
    pub fn advance(&mut self, track: &TrackModel, rng: &mut impl Rng) -> (u8, Duration) {
        let from = track.order[self.next_pos];
        let to_idx = (self.next_pos + 1) % track.order.len();
        let to = track.order[to_idx];

        let sector_m = track.sector_length(from, to).unwrap_or(track.laplen / track.order.len() as f64);
        let speed = (self.base_speed_kmh + self.jitter.sample(rng)).max(1.0);
        let speed_mps = speed / 3.6;
        let secs = sector_m / speed_mps;

        self.next_pos = to_idx;
        (to, Duration::from_secs_f64(secs))
    }

    pub fn current_mpid(&self, track: &TrackModel) -> u8 {
        track.order[self.next_pos]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use velotrain_core::track::MpConfig;

    fn sample_track() -> TrackModel {
        let mut mps = HashMap::new();
        mps.insert("C1".to_string(), MpConfig { name: "Finish".into(), offset_m: 0.0, ..Default::default() });
        mps.insert("C2".to_string(), MpConfig { name: "Half".into(), offset_m: 125.0, ..Default::default() });
        TrackModel::build(250.0, &["C1".to_string(), "C2".to_string()], &mps).unwrap()
    }

    #[test]
    fn advance_cycles_through_mpids_and_wraps() {
        let track = sample_track();
        let mut rider = Rider::new("100000".into(), 45.0, 0.0);
        let mut rng = rand::thread_rng();
        let (first, d1) = rider.advance(&track, &mut rng);
        assert_eq!(first, 2);
        assert!(d1.as_secs_f64() > 0.0);
        let (second, _) = rider.advance(&track, &mut rng);
        assert_eq!(second, 1);
    }
}
