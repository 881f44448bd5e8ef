//! Control-plane HTTP handlers (§6): marker insertion, reset, unit reset,
//! foreign-timer ingest, and replay query. Each forwards to the engine over
//! `EngineHandles::control_tx`/`raw_tx` and never touches engine state
//! directly — the same shape as the teacher's handlers module, minus the
//! Socket.IO transport.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::warn;
use velotrain_core::emission::{EmissionRecord, ReplayFilter};
use velotrain_core::engine::{ControlMessage, EngineHandles};
use velotrain_core::passing::RawPassingRecord;
use velotrain_core::tod::Tod;

use crate::AppState;

pub async fn marker(State(state): State<Arc<AppState>>, body: String) -> StatusCode {
    let payload = if body.trim().is_empty() { None } else { Some(body) };
    if send_control(&state.handles, ControlMessage::Marker(payload)).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::ACCEPTED
}

pub async fn reset(State(state): State<Arc<AppState>>, body: String) -> StatusCode {
    if send_control(&state.handles, ControlMessage::Reset(body.trim().to_string())).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::ACCEPTED
}

pub async fn reset_unit(State(state): State<Arc<AppState>>, body: String) -> StatusCode {
    let channel = body.trim().to_string();
    if channel.is_empty() {
        return StatusCode::BAD_REQUEST;
    }
    if send_control(&state.handles, ControlMessage::ResetUnit(channel)).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::ACCEPTED
}

/// `INDEX;SOURCE;CHANNEL;REFID;TOD` text ingest (§4.4, §6 `/timer`). `SOURCE`
/// is used as the decoder channel; `now`/`0` tod sentinels resolve against
/// host wall time per `timing_wire::resolve_tod_field`.
pub async fn timer(State(state): State<Arc<AppState>>, body: String) -> StatusCode {
    let record = match timing_wire::parse_foreign_timer(&body) {
        Ok(r) => r,
        Err(err) => {
            warn!(error = %err, "malformed /timer payload");
            return StatusCode::BAD_REQUEST;
        }
    };

    let is_trigger = record.refid == state.trig_refid;
    let host_now = state.clock.now();
    let Some(raw_tod) = timing_wire::resolve_tod_field(&record.tod_field, is_trigger, host_now) else {
        return StatusCode::BAD_REQUEST;
    };

    let raw = RawPassingRecord {
        channel: record.source,
        mpid: 0,
        refid: record.refid,
        raw_tod,
        recv_tod: host_now,
        env: None,
        info: None,
        low_battery: false,
    };

    if state.handles.raw_tx.send(raw).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::ACCEPTED
}

#[derive(Debug, Deserialize, Default)]
pub struct ReplayRequest {
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub index_range: Option<(u64, u64)>,
    #[serde(default)]
    pub tod_range: Option<(String, String)>,
    #[serde(default)]
    pub mpid: Option<Vec<u8>>,
    #[serde(default)]
    pub refid: Option<Vec<String>>,
    #[serde(default)]
    pub marker: Option<Vec<String>>,
}

pub async fn request(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ReplayRequest>,
) -> Result<Json<Vec<EmissionRecord>>, StatusCode> {
    let tod_range = match body.tod_range {
        Some((lo, hi)) => {
            let (Some(lo), Some(hi)) = (Tod::parse(&lo), Tod::parse(&hi)) else {
                return Err(StatusCode::BAD_REQUEST);
            };
            Some((lo, hi))
        }
        None => None,
    };

    let filter = ReplayFilter {
        index_range: body.index_range,
        tod_range,
        mpid: body.mpid,
        refid: body.refid,
        marker: body.marker,
    };

    let (respond_to, response) = oneshot::channel();
    let msg = ControlMessage::Replay { serial: body.serial, filter, respond_to };
    if state.handles.control_tx.send(msg).await.is_err() {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    match response.await {
        Ok(records) => Ok(Json(records)),
        Err(_) => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

async fn send_control(handles: &EngineHandles, msg: ControlMessage) -> Result<(), ()> {
    handles.control_tx.send(msg).await.map_err(|_| ())
}
