//! Wire-level types shared between `velotrain-server` and `passing-sim`:
//! the JSON envelope carried over UDP for raw passings, and the
//! `INDEX;SOURCE;CHANNEL;REFID;TOD` text format used by the control-plane
//! `/timer` topic (spec §4.4, §6). Neither the UDP framing nor the message
//! broker belongs to `velotrain-core` — this crate is the shared seam.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use velotrain_core::tod::Tod;

/// One raw passing as it appears on the wire, before intake stamps it
/// with `recv_tod` and resolves its channel to an mpid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub channel: String,
    pub refid: String,
    pub unit_tod: String,
    #[serde(default)]
    pub env: Option<[f64; 3]>,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub low_battery: bool,
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid tod field: {0}")]
    InvalidTod(String),
    #[error("malformed foreign-timer record: {0}")]
    MalformedTimer(String),
}

impl WireEnvelope {
    pub fn decode(bytes: &[u8]) -> Result<WireEnvelope, WireError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn unit_tod(&self) -> Result<Tod, WireError> {
        Tod::parse(&self.unit_tod).ok_or_else(|| WireError::InvalidTod(self.unit_tod.clone()))
    }
}

/// A parsed `/timer` control-plane record: `INDEX;SOURCE;CHANNEL;REFID;TOD`.
/// Per spec §4.4, `SOURCE` — not `CHANNEL` — is the field that names the
/// decoder channel used for session lookup; `CHANNEL` is carried through
/// for logging/diagnostics but otherwise unused by the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignTimerRecord {
    pub index: i64,
    pub source: String,
    pub channel: String,
    pub refid: String,
    pub tod_field: String,
}

pub fn parse_foreign_timer(line: &str) -> Result<ForeignTimerRecord, WireError> {
    let fields: Vec<&str> = line.trim().split(';').collect();
    if fields.len() != 5 {
        return Err(WireError::MalformedTimer(format!(
            "expected 5 fields, got {}: {line}",
            fields.len()
        )));
    }
    let index: i64 = fields[0]
        .parse()
        .map_err(|_| WireError::MalformedTimer(format!("non-numeric index: {}", fields[0])))?;
    Ok(ForeignTimerRecord {
        index,
        source: fields[1].to_string(),
        channel: fields[2].to_string(),
        refid: fields[3].to_string(),
        tod_field: fields[4].to_string(),
    })
}

/// Resolves a `TOD` field from a foreign-timer record. `now` resolves to
/// host wall time; `0` resolves to the most recent minute boundary when
/// the record is a trigger (`refid == trig`), or to midnight otherwise.
pub fn resolve_tod_field(field: &str, is_trigger: bool, host_now: Tod) -> Option<Tod> {
    if field.eq_ignore_ascii_case("now") {
        return Some(host_now);
    }
    if field == "0" {
        if is_trigger {
            let ticks = host_now.ticks();
            let per_minute = 60 * velotrain_core::tod::TICKS_PER_SECOND;
            return Some(Tod::from_ticks((ticks / per_minute) * per_minute));
        }
        return Some(Tod::ZERO);
    }
    Tod::parse(field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_timer_record() {
        let rec = parse_foreign_timer("12;ext1;C4;255;now").unwrap();
        assert_eq!(rec.index, 12);
        assert_eq!(rec.source, "ext1");
        assert_eq!(rec.channel, "C4");
        assert_eq!(rec.refid, "255");
        assert_eq!(rec.tod_field, "now");
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(parse_foreign_timer("12;ext1;C4;255").is_err());
    }

    #[test]
    fn zero_resolves_to_minute_boundary_for_triggers() {
        let now = Tod::parse("12:04:37.250").unwrap();
        let resolved = resolve_tod_field("0", true, now).unwrap();
        assert_eq!(resolved, Tod::parse("12:04:00.000").unwrap());
    }

    #[test]
    fn now_resolves_to_host_wall_time() {
        let now = Tod::parse("12:04:37.250").unwrap();
        assert_eq!(resolve_tod_field("now", false, now).unwrap(), now);
    }

    #[test]
    fn decodes_json_envelope() {
        let json = br#"{"channel":"C1","refid":"100000","unit_tod":"12:00:00.000"}"#;
        let env = WireEnvelope::decode(json).unwrap();
        assert_eq!(env.channel, "C1");
        assert_eq!(env.unit_tod().unwrap(), Tod::parse("12:00:00.000").unwrap());
    }
}
