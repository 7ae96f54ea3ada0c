//! The battle-ping driver: once a client starts a battle, the server
//! owes it a ~30 Hz heartbeat and tracks echoes to detect a dead peer.
//!
//! Modeled as a per-client task that selects on an echo channel, a timeout,
//! and a cancellation channel. This mirrors the
//! shape of `packet_io.rs`'s per-connection reader/writer tasks
//! (`reader_task`/`writer_task`), each an independent
//! `tokio::spawn` wired to the rest of the connection only through channels.

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, warn};

use crate::session::OutboundHandle;

const PING_INTERVAL: Duration = Duration::from_millis(33);
const ECHO_TIMEOUT: Duration = Duration::from_secs(5);

/// A live battle-ping driver for one client. Dropping or calling
/// [`BattlePingHandle::shutdown`] aborts its task; there is nothing left to
/// await afterward, matching the disconnect path's policy of cancelling any
/// pending timeout and releasing state.
pub struct BattlePingHandle {
    echo_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl BattlePingHandle {
    /// Starts the driver for a client whose `begin_battle` just arrived.
    /// `initial_packet_counter` is the connection's outbound counter nibble
    /// captured at that moment; `outbound` is the client's write
    /// handle, used to send every `battle_ping1` frame.
    pub fn spawn(client_id: u64, initial_packet_counter: u32, outbound: OutboundHandle) -> Self {
        let (echo_tx, echo_rx) = mpsc::channel(1);
        let task = tokio::spawn(run(client_id, initial_packet_counter, outbound, echo_rx));
        Self { echo_tx, task }
    }

    /// Notifies the driver that a `battle_ping1` echo arrived. Returns
    /// `false` if the driver has already exited (e.g. a stray echo arriving
    /// after the battle ended some other way).
    pub fn notify_echo(&self) -> bool {
        self.echo_tx.try_send(()).is_ok()
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

async fn run(
    client_id: u64,
    initial_packet_counter: u32,
    outbound: OutboundHandle,
    mut echo_rx: mpsc::Receiver<()>,
) {
    let mut sequence: u32 = 0;

    loop {
        let send_time = Instant::now();
        let payload = ping_payload(sequence, initial_packet_counter);
        if let Err(err) = outbound.send_command(&payload) {
            warn!(client_id, ?err, "failed to send battle_ping1, stopping driver");
            return;
        }

        tokio::select! {
            received = echo_rx.recv() => {
                if received.is_none() {
                    return;
                }
                sequence = sequence.wrapping_add(1);
                sleep_until(send_time + PING_INTERVAL).await;
            }
            _ = sleep_until(send_time + ECHO_TIMEOUT) => {
                warn!(client_id, sequence, "battle_ping1 echo timed out, resending");
                sequence = sequence.wrapping_add(1);
            }
        }
    }
}

fn ping_payload(sequence: u32, initial_packet_counter: u32) -> [u8; 8] {
    let mut payload = [0u8; 8];
    payload[0..4].copy_from_slice(&sequence.to_le_bytes());
    payload[4..8].copy_from_slice(&initial_packet_counter.wrapping_add(sequence).to_le_bytes());
    debug!(sequence, "sent battle_ping1");
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_layout_starts_with_sequence_then_counter() {
        // payload starts `00 00 00 00 <init_counter_le>` at sequence 0.
        let payload = ping_payload(0, 7);
        assert_eq!(&payload[0..4], &[0, 0, 0, 0]);
        assert_eq!(&payload[4..8], &7u32.to_le_bytes());
    }

    #[test]
    fn payload_ack_is_counter_plus_sequence() {
        let payload = ping_payload(3, 10);
        assert_eq!(&payload[0..4], &3u32.to_le_bytes());
        assert_eq!(&payload[4..8], &13u32.to_le_bytes());
    }
}
