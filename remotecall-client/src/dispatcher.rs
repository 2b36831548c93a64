//! Outbound dispatcher.

use crate::error::ClientError;
use crate::event::{report, SessionEvent};
use remotecall_protocol::{ContentLengthStatus, Packet};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

/// A queued packet.
#[derive(Debug)]
pub(crate) struct Outbound {
    pub(crate) packet: Packet,
    /// Connection the packet was negotiated on. `None` means any logged-in
    /// connection.
    pub(crate) generation: Option<u64>,
    /// Receives the `ContentLengthResult` answering this announcement.
    pub(crate) ack: Option<oneshot::Sender<ContentLengthStatus>>,
}

impl Outbound {
    pub(crate) fn new(packet: Packet) -> Self {
        Self {
            packet,
            generation: None,
            ack: None,
        }
    }

    /// A packet bound to one connection generation.
    pub(crate) fn bound(packet: Packet, generation: u64) -> Self {
        Self {
            packet,
            generation: Some(generation),
            ack: None,
        }
    }

    pub(crate) fn with_ack(mut self, ack: oneshot::Sender<ContentLengthStatus>) -> Self {
        self.ack = Some(ack);
        self
    }

    /// Returns whether the packet belongs to a connection other than
    /// `generation`.
    pub(crate) fn is_stale(&self, generation: u64) -> bool {
        self.generation.is_some_and(|g| g != generation)
    }
}

/// Single consumer of the outbound queue.
///
/// Packets leave the queue in submission order and each one is fully written
/// before the next is taken, which is what lets the server reassemble
/// chunked content.
pub(crate) struct Dispatcher {
    outbound: mpsc::Receiver<Outbound>,
    events: mpsc::Sender<SessionEvent>,
}

impl Dispatcher {
    pub(crate) fn new(
        outbound: mpsc::Receiver<Outbound>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self { outbound, events }
    }

    /// Takes the next queued packet. Returns `None` once every client handle
    /// has been dropped and the queue is empty.
    pub(crate) async fn next(&mut self) -> Option<Outbound> {
        self.outbound.recv().await
    }

    /// Drops a packet queued for an earlier connection and reports it.
    pub(crate) async fn discard(&self, item: Outbound) {
        let packet_type = item.packet.packet_type();
        tracing::warn!("dropping stale {} packet", packet_type);
        report(
            &self.events,
            SessionEvent::Error(ClientError::StalePacket(packet_type)),
        )
        .await;
    }

    /// Encodes and writes one packet.
    ///
    /// An encoding failure is reported and the packet skipped. A write failure
    /// is returned to the caller, which owns reconnecting.
    pub(crate) async fn write<W>(&self, writer: &mut W, packet: &Packet) -> Result<(), ClientError>
    where
        W: AsyncWrite + Unpin,
    {
        let frame = match packet.encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("dropping {} packet: {}", packet.packet_type(), e);
                report(&self.events, SessionEvent::Error(e.into())).await;
                return Ok(());
            }
        };

        tracing::debug!(
            "writing {} frame ({} bytes)",
            packet.packet_type(),
            frame.len()
        );
        writer.write_all(&frame).await?;
        Ok(())
    }
}
