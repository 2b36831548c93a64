//! Client handle.

use crate::chunked;
use crate::dispatcher::Outbound;
use crate::error::ClientError;
use crate::session::{Link, SessionState};
use bytes::Bytes;
use remotecall_protocol::{ContentLengthStatus, Packet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};

/// Cloneable handle to a running session.
///
/// Submitting never touches the socket: packets go onto the session's
/// outbound queue and are written, in order, once the session is logged in.
/// Packets submitted while disconnected wait in the queue.
#[derive(Debug, Clone)]
pub struct Client {
    outbound: mpsc::Sender<Outbound>,
    acks: broadcast::Sender<ContentLengthStatus>,
    link: watch::Receiver<Link>,
    /// Held for the whole of a chunked send, and by every query submit, so
    /// the chunks of one send reach the wire back to back.
    send_lock: Arc<Mutex<()>>,
    chunk_size: usize,
    negotiation_timeout: Duration,
}

impl Client {
    pub(crate) fn new(
        outbound: mpsc::Sender<Outbound>,
        acks: broadcast::Sender<ContentLengthStatus>,
        link: watch::Receiver<Link>,
        chunk_size: usize,
        negotiation_timeout: Duration,
    ) -> Self {
        Self {
            outbound,
            acks,
            link,
            send_lock: Arc::new(Mutex::new(())),
            chunk_size,
            negotiation_timeout,
        }
    }

    /// Returns the current session state.
    pub fn state(&self) -> SessionState {
        self.link.borrow().state
    }

    /// Waits until the session is logged in.
    ///
    /// Fails with [`ClientError::SessionClosed`] if the session terminates
    /// first.
    pub async fn wait_until_ready(&self) -> Result<(), ClientError> {
        self.wait_for_login().await.map(|_| ())
    }

    /// Waits for login and returns the generation of that connection.
    async fn wait_for_login(&self) -> Result<u64, ClientError> {
        let mut link = self.link.clone();
        let reached = link
            .wait_for(|l| matches!(l.state, SessionState::Ready | SessionState::Terminated))
            .await
            .map_err(|_| ClientError::SessionClosed)?;
        match reached.state {
            SessionState::Ready => Ok(reached.generation),
            _ => Err(ClientError::SessionClosed),
        }
    }

    /// Subscribes to content length results as they arrive.
    pub fn subscribe_acks(&self) -> broadcast::Receiver<ContentLengthStatus> {
        self.acks.subscribe()
    }

    /// Queues a packet for sending.
    ///
    /// Server-direction packets are rejected with
    /// [`ClientError::UnexpectedPacket`]. Query packets wait for any chunked
    /// send in progress to finish queueing.
    pub async fn submit(&self, packet: Packet) -> Result<(), ClientError> {
        let packet_type = packet.packet_type();
        if packet_type.is_server_packet() {
            return Err(ClientError::UnexpectedPacket(packet_type));
        }

        let _guard = match packet {
            Packet::Query { .. } | Packet::QueryContentLength { .. } => {
                Some(self.send_lock.lock().await)
            }
            _ => None,
        };
        self.enqueue(Outbound::new(packet)).await
    }

    async fn enqueue(&self, item: Outbound) -> Result<(), ClientError> {
        tracing::debug!("queueing {} packet", item.packet.packet_type());
        self.outbound
            .send(item)
            .await
            .map_err(|_| ClientError::SessionClosed)
    }

    /// Queues an extra handshake. The session already sends one on every
    /// connection.
    pub async fn submit_handshake(&self, password: impl Into<String>) -> Result<(), ClientError> {
        self.submit(Packet::handshake(password)).await
    }

    /// Queues a single `Query` frame.
    pub async fn submit_query(&self, content: impl Into<String>) -> Result<(), ClientError> {
        self.submit(Packet::query(content.into())).await
    }

    /// Queues a content length announcement without waiting for its result.
    pub async fn submit_query_content_length(&self, content_length: u16) -> Result<(), ClientError> {
        self.submit(Packet::content_length(content_length)).await
    }

    /// Sends a payload in chunks after the server has accepted its length.
    ///
    /// Waits for login, announces the total length, waits for the result
    /// and, if it is `OK`, queues the payload as consecutive `Query` frames.
    /// Returns the number of chunks queued. An empty payload sends nothing
    /// and returns `Ok(0)`.
    ///
    /// Every packet is bound to the connection the length was negotiated
    /// on. If that connection is lost the send fails with
    /// [`ClientError::ConnectionLost`], and chunks still queued are dropped
    /// rather than written to the next connection.
    pub async fn send_content(&self, content: impl Into<Bytes>) -> Result<usize, ClientError> {
        let content: Bytes = content.into();
        let content_length = chunked::content_length(content.len())?;
        if content.is_empty() {
            return Ok(0);
        }

        let _guard = self.send_lock.lock().await;
        let generation = self.wait_for_login().await?;

        let (ack, waiter) = oneshot::channel();
        let announce = Outbound::bound(Packet::content_length(content_length), generation);
        self.enqueue(announce.with_ack(ack)).await?;

        let result = tokio::time::timeout(self.negotiation_timeout, waiter)
            .await
            .map_err(|_| ClientError::Timeout)?
            .map_err(|_| self.lost_or_closed())?;

        if !result.is_ok() {
            tracing::warn!("content length {} rejected: {}", content_length, result);
            return Err(ClientError::ContentNegotiation(result));
        }

        let chunks = chunked::chunks(&content, self.chunk_size);
        let count = chunks.len();
        for chunk in chunks {
            if !self.link.borrow().is_ready_on(generation) {
                return Err(self.lost_or_closed());
            }
            self.enqueue(Outbound::bound(Packet::query(chunk), generation))
                .await?;
        }

        tracing::debug!("queued {} bytes in {} chunks", content.len(), count);
        Ok(count)
    }

    fn lost_or_closed(&self) -> ClientError {
        match self.state() {
            SessionState::Terminated => ClientError::SessionClosed,
            _ => ClientError::ConnectionLost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remotecall_protocol::PacketType;

    struct Harness {
        client: Client,
        outbound: mpsc::Receiver<Outbound>,
        acks: broadcast::Sender<ContentLengthStatus>,
        link: watch::Sender<Link>,
    }

    fn ready(generation: u64) -> Link {
        Link {
            state: SessionState::Ready,
            generation,
        }
    }

    fn harness_with_capacity(
        capacity: usize,
        chunk_size: usize,
        negotiation_timeout: Duration,
    ) -> Harness {
        let (outbound_tx, outbound) = mpsc::channel(capacity);
        let (acks, _) = broadcast::channel(16);
        let (link, link_rx) = watch::channel(ready(1));
        let client = Client::new(
            outbound_tx,
            acks.clone(),
            link_rx,
            chunk_size,
            negotiation_timeout,
        );
        Harness {
            client,
            outbound,
            acks,
            link,
        }
    }

    fn harness(chunk_size: usize, negotiation_timeout: Duration) -> Harness {
        harness_with_capacity(64, chunk_size, negotiation_timeout)
    }

    /// Answers the next content length announcement with `result`.
    async fn answer(h: &mut Harness, result: ContentLengthStatus) -> Packet {
        let mut announced = h.outbound.recv().await.unwrap();
        announced.ack.take().unwrap().send(result).unwrap();
        announced.packet
    }

    fn drain(h: &mut Harness) -> Vec<Outbound> {
        let mut items = Vec::new();
        while let Ok(item) = h.outbound.try_recv() {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn test_send_content_waits_for_ack() {
        let mut h = harness(4, Duration::from_secs(5));
        let client = h.client.clone();
        let send = tokio::spawn(async move { client.send_content("abcdefghij").await });

        let announced = answer(&mut h, ContentLengthStatus::Ok).await;
        assert_eq!(announced, Packet::content_length(10));
        assert_eq!(send.await.unwrap().unwrap(), 3);

        let chunks = drain(&mut h);
        assert!(chunks.iter().all(|item| item.generation == Some(1)));
        let packets: Vec<_> = chunks.into_iter().map(|item| item.packet).collect();
        assert_eq!(
            packets,
            vec![
                Packet::query(&b"abcd"[..]),
                Packet::query(&b"efgh"[..]),
                Packet::query(&b"ij"[..]),
            ]
        );
    }

    #[tokio::test]
    async fn test_nothing_sent_before_ack() {
        let mut h = harness(4, Duration::from_secs(5));
        let client = h.client.clone();
        let send = tokio::spawn(async move { client.send_content("abcdefgh").await });

        let mut announced = h.outbound.recv().await.unwrap();
        assert_eq!(announced.packet, Packet::content_length(8));
        tokio::task::yield_now().await;
        assert!(h.outbound.try_recv().is_err());

        announced.ack.take().unwrap().send(ContentLengthStatus::Ok).unwrap();
        assert_eq!(send.await.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_broadcast_ack_does_not_answer_send() {
        let mut h = harness(4, Duration::from_millis(100));
        let client = h.client.clone();
        let send = tokio::spawn(async move { client.send_content("abcdefgh").await });

        let _announced = h.outbound.recv().await.unwrap();
        // Results only count when the session routes them to this send.
        let mut acks = h.client.subscribe_acks();
        h.acks.send(ContentLengthStatus::Ok).unwrap();
        assert_eq!(acks.recv().await.unwrap(), ContentLengthStatus::Ok);

        assert!(matches!(send.await.unwrap(), Err(ClientError::Timeout)));
        assert!(h.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rejected_length_sends_no_chunks() {
        let mut h = harness(4, Duration::from_secs(5));
        let client = h.client.clone();
        let send = tokio::spawn(async move { client.send_content("abcdefgh").await });

        answer(&mut h, ContentLengthStatus::AlreadyPending).await;
        assert!(matches!(
            send.await.unwrap(),
            Err(ClientError::ContentNegotiation(ContentLengthStatus::AlreadyPending))
        ));
        assert!(h.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_payload_too_large() {
        let mut h = harness(1019, Duration::from_secs(5));
        let result = h.client.send_content(vec![0u8; 70_000]).await;
        assert!(matches!(
            result,
            Err(ClientError::PayloadTooLarge { size: 70_000, .. })
        ));
        assert!(h.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_payload_sends_nothing() {
        let mut h = harness(1019, Duration::from_secs(5));
        assert_eq!(h.client.send_content(Bytes::new()).await.unwrap(), 0);
        assert!(h.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_negotiation_timeout() {
        let mut h = harness(1019, Duration::from_millis(50));
        let result = h.client.send_content("abc").await;
        assert!(matches!(result, Err(ClientError::Timeout)));

        let announced = h.outbound.recv().await.unwrap();
        assert_eq!(announced.packet, Packet::content_length(3));
        // The late result has nowhere to go.
        assert!(announced.ack.unwrap().send(ContentLengthStatus::Ok).is_err());
        assert!(h.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_announcement_is_connection_lost() {
        let mut h = harness(1019, Duration::from_secs(5));
        let client = h.client.clone();
        let send = tokio::spawn(async move { client.send_content("abc").await });

        let announced = h.outbound.recv().await.unwrap();
        h.link.send_replace(Link::new(SessionState::Disconnected));
        drop(announced);

        assert!(matches!(send.await.unwrap(), Err(ClientError::ConnectionLost)));
    }

    #[tokio::test]
    async fn test_termination_aborts_negotiation() {
        let mut h = harness(1019, Duration::from_secs(5));
        let client = h.client.clone();
        let send = tokio::spawn(async move { client.send_content("abc").await });

        let announced = h.outbound.recv().await.unwrap();
        h.link.send_replace(Link::new(SessionState::Terminated));
        drop(announced);

        assert!(matches!(send.await.unwrap(), Err(ClientError::SessionClosed)));
    }

    #[tokio::test]
    async fn test_reconnect_stops_chunk_queueing() {
        let mut h = harness_with_capacity(1, 1, Duration::from_secs(5));
        let client = h.client.clone();
        let send = tokio::spawn(async move { client.send_content("0123456789").await });

        answer(&mut h, ContentLengthStatus::Ok).await;
        let first = h.outbound.recv().await.unwrap();
        h.link.send_replace(ready(2));

        assert!(matches!(send.await.unwrap(), Err(ClientError::ConnectionLost)));

        let mut queued = vec![first];
        queued.extend(drain(&mut h));
        assert!(queued.len() < 10);
        // Everything that did get queued is bound to the old connection.
        assert!(queued.iter().all(|item| item.is_stale(2)));
    }

    #[tokio::test]
    async fn test_send_content_waits_for_login() {
        let mut h = harness(1019, Duration::from_secs(5));
        h.link.send_replace(Link::new(SessionState::Connecting));

        let client = h.client.clone();
        let send = tokio::spawn(async move { client.send_content("abc").await });
        tokio::task::yield_now().await;
        assert!(h.outbound.try_recv().is_err());

        h.link.send_replace(ready(5));
        let mut announced = h.outbound.recv().await.unwrap();
        assert_eq!(announced.generation, Some(5));
        announced.ack.take().unwrap().send(ContentLengthStatus::Ok).unwrap();
        assert_eq!(send.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_query_waits_for_chunked_send() {
        let mut h = harness(4, Duration::from_secs(5));
        let client = h.client.clone();
        let send = tokio::spawn(async move { client.send_content("abcdefgh").await });

        let mut announced = h.outbound.recv().await.unwrap();

        let client = h.client.clone();
        let query = tokio::spawn(async move { client.submit_query("status").await });
        tokio::task::yield_now().await;
        assert!(h.outbound.try_recv().is_err());

        announced.ack.take().unwrap().send(ContentLengthStatus::Ok).unwrap();
        assert_eq!(send.await.unwrap().unwrap(), 2);
        query.await.unwrap().unwrap();

        let packets: Vec<_> = drain(&mut h).into_iter().map(|item| item.packet).collect();
        assert_eq!(
            packets,
            vec![
                Packet::query(&b"abcd"[..]),
                Packet::query(&b"efgh"[..]),
                Packet::query(&b"status"[..]),
            ]
        );
    }

    #[tokio::test]
    async fn test_submit_rejects_server_packets() {
        let mut h = harness(1019, Duration::from_secs(5));
        let result = h
            .client
            .submit(Packet::QueryAccepted { query_id: 1 })
            .await;
        assert!(matches!(
            result,
            Err(ClientError::UnexpectedPacket(PacketType::QueryAccepted))
        ));
        assert!(h.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_submit_after_session_gone() {
        let h = harness(1019, Duration::from_secs(5));
        drop(h.outbound);
        assert!(matches!(
            h.client.submit_query("x").await,
            Err(ClientError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_wait_until_ready() {
        let h = harness(1019, Duration::from_secs(5));
        h.link.send_replace(Link::new(SessionState::Connecting));

        let client = h.client.clone();
        let wait = tokio::spawn(async move { client.wait_until_ready().await });
        tokio::task::yield_now().await;
        h.link.send_replace(ready(1));
        wait.await.unwrap().unwrap();

        h.link.send_replace(Link::new(SessionState::Terminated));
        assert!(h.client.wait_until_ready().await.is_err());
        assert_eq!(h.client.state(), SessionState::Terminated);
    }
}
