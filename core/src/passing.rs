//! Wire-adjacent passing records (component D's inputs/outputs): the raw
//! record as it arrives from intake, and the corrected record queued in
//! the reorder buffer. The opaque stream shape itself — UDP framing, the
//! text control-plane format — belongs to `timing-wire` and `intake.rs`;
//! this module only holds the data that crosses component boundaries.

use serde::{Deserialize, Serialize};

use crate::tod::Tod;

/// `(channel, refid, unit_tod, recv_tod, env?, info?, low_battery?)` per §6,
/// after D has stamped it with the host receive time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPassingRecord {
    pub channel: String,
    pub mpid: u8,
    pub refid: String,
    pub raw_tod: Tod,
    pub recv_tod: Tod,
    pub env: Option<[f64; 3]>,
    pub info: Option<String>,
    #[serde(default)]
    pub low_battery: bool,
}

/// A raw passing after C applies the session's clock offset. Queued in E.
#[derive(Debug, Clone)]
pub struct CorrectedPassing {
    pub mpid: u8,
    pub refid: String,
    pub tod: Tod,
    pub env: Option<[f64; 3]>,
    pub info: Option<String>,
    pub arrival_wall: Tod,
    pub out_of_order: bool,
}
