//! Correlated request pipeline over one broker transport.
//!
//! A [`KafkaConnection`] owns the single socket this process holds to a
//! broker endpoint and multiplexes every caller's requests over it. A
//! writer task serializes requests onto the wire and records who is
//! waiting; a reader task matches each arriving frame against the head
//! of that in-flight queue, which is sound because the broker answers
//! strictly in request order on one connection.
//!
//! Correlation ids are assigned here, starting at 0 and incrementing
//! once per request, never by callers. A response frame whose id does
//! not match the head of the queue means the stream is unusable and the
//! pipeline tears down.
//!
//! Teardown fails every pending request with
//! [`Error::ConnectionClosed`]; the connection then sits in a
//! reconnect-on-next-request state and the next caller dials afresh.

use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::{
    error::{Error, Result},
    network::{BrokerAddress, BrokerConnection},
    protocol::{self, KafkaRequest},
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a response should land.
///
/// Both shapes collapse to one `deliver` capability: a `Once` sink
/// wakes a suspended caller, a `Mailbox` sink appends to a channel the
/// receiver drains at its own pace.
#[derive(Debug)]
pub enum ResponseSink {
    Once(oneshot::Sender<Result<Bytes>>),
    Mailbox(mpsc::UnboundedSender<Result<Bytes>>),
}

impl ResponseSink {
    pub fn deliver(self, response: Result<Bytes>) {
        match self {
            ResponseSink::Once(tx) => {
                if tx.send(response).is_err() {
                    tracing::trace!("Response receiver went away");
                }
            }
            ResponseSink::Mailbox(tx) => {
                if tx.send(response).is_err() {
                    tracing::trace!("Response mailbox went away");
                }
            }
        }
    }
}

struct InFlight {
    correlation_id: i32,
    sink: ResponseSink,
}

struct Dispatch {
    payload: Bytes,
    entry: Option<InFlight>,
}

#[derive(Debug)]
struct Pipe<T: BrokerConnection> {
    transport: T,
    dispatch_tx: mpsc::UnboundedSender<Dispatch>,
    next_correlation_id: AtomicI32,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl<T: BrokerConnection> Pipe<T> {
    fn spawn(transport: T) -> Self {
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let (pending_tx, pending_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(run_writer(transport.clone(), dispatch_rx, pending_tx));
        let reader = tokio::spawn(run_reader(transport.clone(), pending_rx));

        Self {
            transport,
            dispatch_tx,
            next_correlation_id: AtomicI32::new(0),
            writer,
            reader,
        }
    }

    fn is_dead(&self) -> bool {
        self.dispatch_tx.is_closed() || self.writer.is_finished() || self.reader.is_finished()
    }

    async fn shutdown(self) {
        self.transport.close().await;
        self.writer.abort();
        self.reader.abort();
    }
}

async fn run_writer<T: BrokerConnection>(
    transport: T,
    mut dispatch_rx: mpsc::UnboundedReceiver<Dispatch>,
    pending_tx: mpsc::UnboundedSender<InFlight>,
) {
    while let Some(dispatch) = dispatch_rx.recv().await {
        // record the waiter before the bytes hit the wire so the reader
        // can never see a response it has no entry for
        if let Some(entry) = dispatch.entry {
            if pending_tx.send(entry).is_err() {
                tracing::debug!("Reader gone, stopping writer");
                break;
            }
        }

        if let Err(err) = transport.send_frame(dispatch.payload).await {
            tracing::error!("ERROR: Send failed, tearing down connection {:?}", err);
            break;
        }
    }

    // Closing the transport unblocks the reader, which then fails
    // whatever is still pending.
    transport.close().await;
}

async fn run_reader<T: BrokerConnection>(
    transport: T,
    mut pending_rx: mpsc::UnboundedReceiver<InFlight>,
) {
    while let Some(entry) = pending_rx.recv().await {
        match transport.receive_frame().await {
            Ok(frame) => {
                let frame = frame.freeze();
                match protocol::response_correlation_id(&frame) {
                    Ok(id) if id == entry.correlation_id => {
                        entry.sink.deliver(Ok(frame));
                    }
                    Ok(id) => {
                        tracing::error!(
                            "ERROR: Correlation mismatch, expected {} got {}",
                            entry.correlation_id,
                            id
                        );
                        entry.sink.deliver(Err(Error::CorrelationMismatch {
                            expected: entry.correlation_id,
                            got: id,
                        }));
                        break;
                    }
                    Err(err) => {
                        entry.sink.deliver(Err(err));
                        break;
                    }
                }
            }
            Err(err) => {
                tracing::debug!("Receive failed, tearing down connection {:?}", err);
                entry.sink.deliver(Err(err));
                break;
            }
        }
    }

    // fail everything that was still waiting for a response
    pending_rx.close();
    while let Ok(entry) = pending_rx.try_recv() {
        entry.sink.deliver(Err(Error::ConnectionClosed));
    }
    transport.close().await;
}

/// Handle to the request pipeline for one broker endpoint.
///
/// Cheap to clone; all clones share the pipeline. Dialing is lazy: the
/// socket opens on the first request, and reopens on the request after
/// a teardown.
#[derive(Clone, Debug)]
pub struct KafkaConnection<T: BrokerConnection> {
    addr: BrokerAddress,
    request_timeout: Duration,
    inner: Arc<Mutex<Option<Pipe<T>>>>,
}

impl<T: BrokerConnection> KafkaConnection<T> {
    pub fn new(addr: BrokerAddress) -> Self {
        Self {
            addr,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            inner: Arc::new(Mutex::new(None)),
        }
    }

    /// Build a connection over an already-open transport. The address
    /// is kept for reconnects.
    pub fn from_transport(addr: BrokerAddress, transport: T) -> Self {
        Self {
            addr,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            inner: Arc::new(Mutex::new(Some(Pipe::spawn(transport)))),
        }
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn addr(&self) -> &BrokerAddress {
        &self.addr
    }

    /// Send a request and suspend until its response arrives.
    ///
    /// Returns `Ok(None)` immediately for requests the broker never
    /// answers (produce with `required_acks = 0`).
    pub async fn request<R: KafkaRequest>(&self, req: R) -> Result<Option<Bytes>> {
        if !req.has_response() {
            self.enqueue(req, None).await?;
            return Ok(None);
        }

        let (tx, rx) = oneshot::channel();
        self.enqueue(req, Some(ResponseSink::Once(tx))).await?;

        match tokio::time::timeout(self.request_timeout, rx).await {
            Err(_) => Err(Error::TimedOut),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Ok(Ok(response)) => response.map(Some),
        }
    }

    /// Send a request, delivering the response to `sink` instead of
    /// suspending the caller. Returns once the request is enqueued.
    ///
    /// For a request with no response the sink is dropped unused.
    pub async fn async_request<R: KafkaRequest>(&self, req: R, sink: ResponseSink) -> Result<()> {
        let sink = req.has_response().then_some(sink);
        self.enqueue(req, sink).await
    }

    /// Graceful teardown. Pending requests fail with
    /// [`Error::ConnectionClosed`]; a later request dials afresh.
    pub async fn close(&self) {
        let pipe = self.inner.lock().await.take();
        if let Some(pipe) = pipe {
            pipe.shutdown().await;
        }
    }

    async fn enqueue<R: KafkaRequest>(&self, mut req: R, sink: Option<ResponseSink>) -> Result<()> {
        let mut guard = self.inner.lock().await;

        if guard.as_ref().map(Pipe::is_dead).unwrap_or(true) {
            if let Some(stale) = guard.take() {
                stale.shutdown().await;
            }
            tracing::debug!("Dialing {}", self.addr);
            let transport = T::connect(&self.addr).await?;
            *guard = Some(Pipe::spawn(transport));
        }

        let pipe = guard
            .as_ref()
            .ok_or(Error::Internal("connection pipe missing after dial"))?;

        // Assigning the id and queueing happen under the same lock, so
        // ids hit the wire in issue order: a contiguous run from 0. The
        // counter only advances once the request actually encodes.
        let correlation_id = pipe.next_correlation_id.load(Ordering::Relaxed);
        req.correlate(correlation_id);

        let mut payload = Vec::with_capacity(256);
        req.encode(&mut payload)?;
        pipe.next_correlation_id
            .store(correlation_id + 1, Ordering::Relaxed);

        let entry = sink.map(|sink| InFlight {
            correlation_id,
            sink,
        });

        pipe.dispatch_tx
            .send(Dispatch {
                payload: Bytes::from(payload),
                entry,
            })
            .map_err(|_| Error::ConnectionClosed)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use bytes::BytesMut;

    use super::*;
    use crate::protocol::MetadataRequest;

    /// Transport that answers every frame with an empty response
    /// carrying the request's own correlation id, optionally skewed.
    #[derive(Clone, Debug)]
    struct EchoTransport {
        sent: Arc<StdMutex<Vec<Bytes>>>,
        responses_tx: mpsc::UnboundedSender<Bytes>,
        responses_rx: Arc<Mutex<mpsc::UnboundedReceiver<Bytes>>>,
        correlation_skew: i32,
        closed: Arc<std::sync::atomic::AtomicBool>,
    }

    impl EchoTransport {
        fn new(correlation_skew: i32) -> Self {
            let (responses_tx, responses_rx) = mpsc::unbounded_channel();
            Self {
                sent: Arc::new(StdMutex::new(vec![])),
                responses_tx,
                responses_rx: Arc::new(Mutex::new(responses_rx)),
                correlation_skew,
                closed: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            }
        }

        fn sent_correlation_ids(&self) -> Vec<i32> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|payload| {
                    i32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]])
                })
                .collect()
        }
    }

    #[async_trait]
    impl BrokerConnection for EchoTransport {
        async fn connect(_addr: &BrokerAddress) -> Result<Self> {
            Err(Error::IoError(std::io::ErrorKind::ConnectionRefused))
        }

        async fn send_frame(&self, payload: Bytes) -> Result<()> {
            if self.closed.load(Ordering::Acquire) {
                return Err(Error::ConnectionClosed);
            }
            // correlation id sits after api key and version in the header
            let id = i32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
            self.sent.lock().unwrap().push(payload);
            let response = Bytes::from((id + self.correlation_skew).to_be_bytes().to_vec());
            let _ = self.responses_tx.send(response);
            Ok(())
        }

        async fn receive_frame(&self) -> Result<BytesMut> {
            if self.closed.load(Ordering::Acquire) {
                return Err(Error::ConnectionClosed);
            }
            match self.responses_rx.lock().await.recv().await {
                Some(frame) => Ok(BytesMut::from(frame.as_ref())),
                None => Err(Error::ConnectionClosed),
            }
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::Release);
        }
    }

    fn test_addr() -> BrokerAddress {
        BrokerAddress {
            host: "localhost".into(),
            port: 9092,
        }
    }

    #[tokio::test]
    async fn correlation_ids_are_contiguous_from_zero() {
        let transport = EchoTransport::new(0);
        let conn = KafkaConnection::from_transport(test_addr(), transport.clone());

        let topics: Vec<&str> = vec![];
        for expected in 0..4 {
            let response = conn
                .request(MetadataRequest::new(0, "test", &topics))
                .await
                .unwrap()
                .unwrap();
            let got = protocol::response_correlation_id(&response).unwrap();
            assert_eq!(got, expected);
        }

        assert_eq!(transport.sent_correlation_ids(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn correlation_mismatch_tears_down() {
        let transport = EchoTransport::new(7);
        let conn = KafkaConnection::from_transport(test_addr(), transport);

        let topics: Vec<&str> = vec![];
        let err = conn
            .request(MetadataRequest::new(0, "test", &topics))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::CorrelationMismatch {
                expected: 0,
                got: 7
            }
        );
    }

    #[tokio::test]
    async fn closed_connection_redials_on_next_request() {
        let transport = EchoTransport::new(0);
        let conn = KafkaConnection::from_transport(test_addr(), transport);

        let topics: Vec<&str> = vec![];
        conn.request(MetadataRequest::new(0, "test", &topics))
            .await
            .unwrap();

        conn.close().await;

        // the pipe is gone, so the next request redials; the test
        // transport refuses, proving the dial happened
        let err = conn
            .request(MetadataRequest::new(0, "test", &topics))
            .await
            .unwrap_err();
        assert_eq!(err, Error::IoError(std::io::ErrorKind::ConnectionRefused));
    }

    #[tokio::test]
    async fn async_request_delivers_to_mailbox() {
        let transport = EchoTransport::new(0);
        let conn = KafkaConnection::from_transport(test_addr(), transport);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let topics: Vec<&str> = vec![];
        conn.async_request(
            MetadataRequest::new(0, "test", &topics),
            ResponseSink::Mailbox(tx),
        )
        .await
        .unwrap();

        let response = rx.recv().await.unwrap().unwrap();
        assert_eq!(protocol::response_correlation_id(&response).unwrap(), 0);
    }
}
