//! Static track geometry (component B): measurement points, sector
//! lengths, and the ancestor channel used to compute each split kind.
//! Built once at startup and never mutated afterwards — live session
//! metrics live in `SessionTable` (see `decoder.rs`), not here.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// mpid 0 is reserved for synthetic events (gate, marker).
pub const GATE_MPID: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SplitKind {
    Lap,
    Half,
    Qtr,
    S200,
    S100,
    S50,
}

impl SplitKind {
    pub const ALL: [SplitKind; 6] = [
        SplitKind::Lap,
        SplitKind::Half,
        SplitKind::Qtr,
        SplitKind::S200,
        SplitKind::S100,
        SplitKind::S50,
    ];

    pub fn field_name(&self) -> &'static str {
        match self {
            SplitKind::Lap => "lap",
            SplitKind::Half => "half",
            SplitKind::Qtr => "qtr",
            SplitKind::S200 => "200",
            SplitKind::S100 => "100",
            SplitKind::S50 => "50",
        }
    }

    /// Nominal split distance in meters, given the lap length. `Lap` has
    /// no fixed nominal distance here — its ancestor is the same channel
    /// one lap earlier, handled specially by the rider tracker.
    pub fn nominal_length_m(&self, laplen: f64) -> Option<f64> {
        match self {
            SplitKind::Lap => None,
            SplitKind::Half => Some(laplen / 2.0),
            SplitKind::Qtr => Some(laplen / 4.0),
            SplitKind::S200 => Some(200.0),
            SplitKind::S100 => Some(100.0),
            SplitKind::S50 => Some(50.0),
        }
    }
}

/// Per-channel configuration as read from `mps` in the recognized config
/// keys (§6). Ancestor fields name the *channel* supplying that split's
/// earlier passing, e.g. `half: Some("C5".into())`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MpConfig {
    pub name: String,
    pub offset_m: f64,
    #[serde(default)]
    pub half: Option<String>,
    #[serde(default)]
    pub qtr: Option<String>,
    #[serde(default, rename = "200")]
    pub s200: Option<String>,
    #[serde(default, rename = "100")]
    pub s100: Option<String>,
    #[serde(default, rename = "50")]
    pub s50: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MeasurementPoint {
    pub channel: String,
    pub mpid: u8,
    pub name: String,
    pub offset_m: f64,
    /// Resolved ancestor mpid per split kind, when configured.
    pub ancestors: HashMap<SplitKind, u8>,
}

#[derive(Debug, Clone)]
pub struct TrackModel {
    pub laplen: f64,
    /// Measurement points indexed by mpid (1-based; index 0 unused).
    points: Vec<Option<MeasurementPoint>>,
    channel_to_mpid: HashMap<String, u8>,
    /// Order of mpids around the loop in travel direction, as configured
    /// by `mpseq`.
    pub order: Vec<u8>,
}

impl TrackModel {
    pub fn build(
        laplen: f64,
        mpseq: &[String],
        mps: &HashMap<String, MpConfig>,
    ) -> Result<TrackModel, CoreError> {
        if laplen <= 0.0 {
            return Err(CoreError::ConfigInvalid("laplen must be positive".into()));
        }
        if mpseq.is_empty() {
            return Err(CoreError::ConfigInvalid("mpseq must not be empty".into()));
        }

        // Every configured channel must appear exactly once in mpseq.
        let mut seen = HashMap::new();
        for ch in mpseq {
            *seen.entry(ch.clone()).or_insert(0) += 1;
        }
        for (ch, count) in &seen {
            if *count != 1 {
                return Err(CoreError::ConfigInvalid(format!(
                    "channel {ch} appears {count} times in mpseq"
                )));
            }
        }
        for ch in mps.keys() {
            if !seen.contains_key(ch) {
                return Err(CoreError::ConfigInvalid(format!(
                    "channel {ch} configured in mps but missing from mpseq"
                )));
            }
        }

        let mut channel_to_mpid = HashMap::new();
        for (i, ch) in mpseq.iter().enumerate() {
            channel_to_mpid.insert(ch.clone(), (i + 1) as u8);
        }

        let mut points: Vec<Option<MeasurementPoint>> = vec![None; mpseq.len() + 1];
        for (ch, mpid) in &channel_to_mpid {
            let cfg = mps.get(ch).ok_or_else(|| {
                CoreError::ConfigInvalid(format!("channel {ch} listed in mpseq but not in mps"))
            })?;
            if !(0.0..laplen).contains(&cfg.offset_m) {
                return Err(CoreError::ConfigInvalid(format!(
                    "channel {ch} offset_m {} out of [0, {laplen})",
                    cfg.offset_m
                )));
            }

            let mut ancestors = HashMap::new();
            for (kind, ancestor_ch) in [
                (SplitKind::Half, &cfg.half),
                (SplitKind::Qtr, &cfg.qtr),
                (SplitKind::S200, &cfg.s200),
                (SplitKind::S100, &cfg.s100),
                (SplitKind::S50, &cfg.s50),
            ] {
                if let Some(ancestor_ch) = ancestor_ch {
                    if ancestor_ch == ch {
                        return Err(CoreError::ConfigInvalid(format!(
                            "channel {ch} names itself as its own {:?} ancestor",
                            kind
                        )));
                    }
                    let ancestor_mpid = *channel_to_mpid.get(ancestor_ch).ok_or_else(|| {
                        CoreError::ConfigInvalid(format!(
                            "channel {ch} names unconfigured ancestor {ancestor_ch} for {:?}",
                            kind
                        ))
                    })?;
                    ancestors.insert(kind, ancestor_mpid);
                }
            }

            points[*mpid as usize] = Some(MeasurementPoint {
                channel: ch.clone(),
                mpid: *mpid,
                name: cfg.name.clone(),
                offset_m: cfg.offset_m,
                ancestors,
            });
        }

        let model = TrackModel {
            laplen,
            points,
            channel_to_mpid,
            order: (1..=(mpseq.len() as u8)).collect(),
        };
        model.validate_ancestor_distances()?;
        model.validate_sector_sum()?;
        Ok(model)
    }

    fn validate_ancestor_distances(&self) -> Result<(), CoreError> {
        for mp in self.points.iter().flatten() {
            for (kind, ancestor_mpid) in &mp.ancestors {
                let Some(nominal) = kind.nominal_length_m(self.laplen) else {
                    continue;
                };
                let ancestor = self
                    .get(*ancestor_mpid)
                    .expect("ancestor mpid resolved from channel_to_mpid during build");
                let actual = (mp.offset_m - ancestor.offset_m).rem_euclid(self.laplen);
                if (actual - nominal).abs() > 1e-6 {
                    return Err(CoreError::ConfigInvalid(format!(
                        "{:?} ancestor of {} is {actual}m away, expected {nominal}m",
                        kind, mp.channel
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_sector_sum(&self) -> Result<(), CoreError> {
        let mut total = 0.0;
        for w in self.order.windows(2) {
            total += self.sector_length(w[0], w[1])?;
        }
        if let (Some(&last), Some(&first)) = (self.order.last(), self.order.first()) {
            total += self.sector_length(last, first)?;
        }
        if (total - self.laplen).abs() > 1e-6 {
            return Err(CoreError::ConfigInvalid(format!(
                "sector lengths sum to {total}m, expected laplen {}m",
                self.laplen
            )));
        }
        Ok(())
    }

    pub fn get(&self, mpid: u8) -> Option<&MeasurementPoint> {
        self.points.get(mpid as usize).and_then(|p| p.as_ref())
    }

    pub fn mpid_for_channel(&self, channel: &str) -> Option<u8> {
        self.channel_to_mpid.get(channel).copied()
    }

    /// Length of the forward sector `from -> to`, wrapping at `laplen`.
    pub fn sector_length(&self, from: u8, to: u8) -> Result<f64, CoreError> {
        let from_mp = self
            .get(from)
            .ok_or_else(|| CoreError::ConfigInvalid(format!("unknown mpid {from}")))?;
        let to_mp = self
            .get(to)
            .ok_or_else(|| CoreError::ConfigInvalid(format!("unknown mpid {to}")))?;
        Ok((to_mp.offset_m - from_mp.offset_m).rem_euclid(self.laplen))
    }

    /// km/h for a sector of the given length covered in `duration_s` seconds.
    pub fn speed_kmh(length_m: f64, duration_s: f64) -> f64 {
        if duration_s <= 0.0 {
            return f64::INFINITY;
        }
        (length_m / duration_s) * 3.6
    }

    /// The mpid immediately following `mpid` in travel direction.
    pub fn next_mpid(&self, mpid: u8) -> Option<u8> {
        let pos = self.order.iter().position(|&m| m == mpid)?;
        Some(self.order[(pos + 1) % self.order.len()])
    }

    /// The mpid immediately preceding `mpid` in travel direction.
    pub fn predecessor_mpid(&self, mpid: u8) -> Option<u8> {
        let pos = self.order.iter().position(|&m| m == mpid)?;
        Some(self.order[(pos + self.order.len() - 1) % self.order.len()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mps() -> HashMap<String, MpConfig> {
        let mut mps = HashMap::new();
        mps.insert(
            "C1".to_string(),
            MpConfig { name: "Finish".into(), offset_m: 0.0, ..Default::default() },
        );
        mps.insert(
            "C9".to_string(),
            MpConfig { name: "Quarter".into(), offset_m: 62.5, ..Default::default() },
        );
        mps.insert(
            "C4".to_string(),
            MpConfig {
                name: "Half".into(),
                offset_m: 125.0,
                half: Some("C1".into()),
                ..Default::default()
            },
        );
        mps.insert(
            "C6".to_string(),
            MpConfig { name: "Three-quarter".into(), offset_m: 187.5, ..Default::default() },
        );
        mps
    }

    fn sample_mpseq() -> Vec<String> {
        vec!["C1".into(), "C9".into(), "C4".into(), "C6".into()]
    }

    #[test]
    fn builds_valid_track() {
        let model = TrackModel::build(250.0, &sample_mpseq(), &sample_mps()).unwrap();
        assert_eq!(model.sector_length(1, 2).unwrap(), 62.5);
        assert_eq!(model.sector_length(3, 1).unwrap(), 125.0);
    }

    #[test]
    fn rejects_duplicate_mpseq_entry() {
        let mpseq = vec!["C1".into(), "C1".into()];
        let err = TrackModel::build(250.0, &mpseq, &sample_mps());
        assert!(err.is_err());
    }

    #[test]
    fn rejects_mismatched_ancestor_distance() {
        let mut mps = sample_mps();
        mps.get_mut("C4").unwrap().half = Some("C9".into()); // wrong distance
        let err = TrackModel::build(250.0, &sample_mpseq(), &mps);
        assert!(err.is_err());
    }

    #[test]
    fn speed_formula() {
        assert!((TrackModel::speed_kmh(250.0, 18.0) - 50.0).abs() < 1e-9);
    }
}
