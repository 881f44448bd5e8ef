//! UDP transmitter for synthetic raw passings. Mirrors the teacher
//! simulator's `udp_tx.rs`: a single non-blocking socket, JSON envelopes,
//! send failures logged and never fatal.

use tokio::net::UdpSocket;
use tracing::warn;

pub struct UdpTransmitter {
    socket: UdpSocket,
    hub_addr: String,
}

impl UdpTransmitter {
    pub async fn bind(hub_addr: String) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        Ok(UdpTransmitter { socket, hub_addr })
    }

    pub async fn send(&self, envelope: &timing_wire::WireEnvelope) {
        let bytes = match serde_json::to_vec(envelope) {
            Ok(b) => b,
            Err(err) => {
                warn!(error = %err, "failed to serialize envelope");
                return;
            }
        };
        if let Err(err) = self.socket.send_to(&bytes, &self.hub_addr).await {
            warn!(error = %err, addr = %self.hub_addr, "udp send failed");
        }
    }
}
