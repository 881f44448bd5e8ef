//! Raw UDP intake: binds the decoder port (`uport`, default 2008),
//! decodes each datagram as a `timing_wire::WireEnvelope`, stamps it with
//! host receive time, and forwards it into the engine's raw channel.
//! Grounded on the teacher's UDP hub task (`uwb_hub.rs`): one task, never
//! crashes on a malformed packet, logs and continues.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use velotrain_core::clock::Clock;
use velotrain_core::passing::RawPassingRecord;
use velotrain_core::track::{TrackModel, GATE_MPID};
use velotrain_core::Tod;

const MAX_DATAGRAM: usize = 4096;

pub struct UdpIntakeConfig {
    pub port: u16,
    pub gate_channel: Option<String>,
}

/// Resolves the wire envelope's channel to an mpid for the raw record's
/// own `mpid` field (published verbatim, §4.4) — the gate channel maps to
/// mpid 0; an unconfigured channel is passed through as 0 and dropped
/// downstream by intake, which only trusts its own channel lookup.
fn resolve_mpid(track: &TrackModel, gate_channel: Option<&str>, channel: &str) -> u8 {
    if gate_channel == Some(channel) {
        return GATE_MPID;
    }
    track.mpid_for_channel(channel).unwrap_or(0)
}

pub async fn run(
    config: UdpIntakeConfig,
    track: Arc<TrackModel>,
    clock: Arc<dyn Clock>,
    raw_tx: mpsc::Sender<RawPassingRecord>,
) {
    let addr = format!("0.0.0.0:{}", config.port);
    let socket = match UdpSocket::bind(&addr).await {
        Ok(s) => {
            tracing::info!("raw intake listening on udp {addr}");
            s
        }
        Err(err) => {
            warn!(%addr, error = %err, "could not bind raw intake socket");
            return;
        }
    };

    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(error = %err, "raw intake recv error");
                continue;
            }
        };

        let envelope = match timing_wire::WireEnvelope::decode(&buf[..len]) {
            Ok(e) => e,
            Err(err) => {
                debug!(%src, error = %err, "malformed raw datagram");
                continue;
            }
        };

        let raw_tod = match envelope.unit_tod() {
            Ok(t) => t,
            Err(err) => {
                debug!(%src, error = %err, "malformed unit_tod field");
                continue;
            }
        };

        let recv_tod: Tod = clock.now();
        let mpid = resolve_mpid(&track, config.gate_channel.as_deref(), &envelope.channel);

        let record = RawPassingRecord {
            channel: envelope.channel,
            mpid,
            refid: envelope.refid,
            raw_tod,
            recv_tod,
            env: envelope.env,
            info: envelope.info,
            low_battery: envelope.low_battery,
        };

        if raw_tx.send(record).await.is_err() {
            warn!("engine raw channel closed, stopping udp intake");
            return;
        }
    }
}
