use crate::{CommandConnection, Reply, Result, TelemetryConnector, TelemetryLink, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
struct CommandLog {
    targets: Vec<String>,
    replies: VecDeque<Result<Reply>>,
}

/// In-process command channel. Replies come from a scripted queue, falling
/// back to `200 OK` with an empty body.
pub struct MockConnection {
    log: MockCommandHandle,
}

/// Shared view of a [`MockConnection`], usable after the connection has been
/// moved into a resourcer.
#[derive(Clone, Default)]
pub struct MockCommandHandle {
    inner: Arc<Mutex<CommandLog>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            log: MockCommandHandle::default(),
        }
    }

    pub fn handle(&self) -> MockCommandHandle {
        self.log.clone()
    }
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCommandHandle {
    pub fn push_reply(&self, reply: Reply) {
        self.inner.lock().replies.push_back(Ok(reply));
    }

    pub fn push_error(&self, err: TransportError) {
        self.inner.lock().replies.push_back(Err(err));
    }

    /// Every target sent so far, oldest first.
    pub fn targets(&self) -> Vec<String> {
        self.inner.lock().targets.clone()
    }
}

impl CommandConnection for MockConnection {
    fn send(&mut self, target: &str) -> Result<Reply> {
        let mut log = self.log.inner.lock();
        log.targets.push(target.to_string());
        log.replies
            .pop_front()
            .unwrap_or_else(|| Ok(Reply::new(200, "\n")))
    }

    fn backend(&self) -> &'static str {
        "mock"
    }
}

#[derive(Default)]
struct TelemetryState {
    inbound: Option<mpsc::UnboundedSender<String>>,
    pending: Vec<String>,
    outbound: Vec<String>,
    connects: usize,
    closes: usize,
    fail_next: bool,
    connect_delay: Duration,
    send_delay: Duration,
}

/// In-process telemetry channel. Clones share state, so a test keeps one
/// clone as a handle and gives the other to the resourcer.
#[derive(Clone, Default)]
pub struct MockTelemetry {
    state: Arc<Mutex<TelemetryState>>,
}

impl MockTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message to the open link, or hold it until the next connect.
    pub fn push(&self, message: impl Into<String>) {
        let message = message.into();
        let mut guard = self.state.lock();
        let st = &mut *guard;
        match &st.inbound {
            Some(tx) if !tx.is_closed() => {
                let _ = tx.send(message);
            }
            _ => st.pending.push(message),
        }
    }

    /// Drop the device side of the current link.
    pub fn disconnect(&self) {
        self.state.lock().inbound = None;
    }

    pub fn fail_next_connect(&self) {
        self.state.lock().fail_next = true;
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.state.lock().connect_delay = delay;
    }

    /// Stall every link `send` by `delay`, like a peer that stops reading.
    pub fn set_send_delay(&self, delay: Duration) {
        self.state.lock().send_delay = delay;
    }

    /// Messages the resourcer has sent, oldest first.
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().outbound.clone()
    }

    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    pub fn closes(&self) -> usize {
        self.state.lock().closes
    }
}

#[async_trait]
impl TelemetryConnector for MockTelemetry {
    async fn connect(&self) -> Result<Box<dyn TelemetryLink>> {
        let delay = self.state.lock().connect_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut st = self.state.lock();
        if st.fail_next {
            st.fail_next = false;
            return Err(TransportError::Connect("mock refused".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        for message in st.pending.drain(..) {
            let _ = tx.send(message);
        }
        st.inbound = Some(tx);
        st.connects += 1;
        Ok(Box::new(MockLink {
            rx,
            state: Arc::clone(&self.state),
        }))
    }

    fn backend(&self) -> &'static str {
        "mock"
    }
}

struct MockLink {
    rx: mpsc::UnboundedReceiver<String>,
    state: Arc<Mutex<TelemetryState>>,
}

#[async_trait]
impl TelemetryLink for MockLink {
    async fn recv(&mut self) -> Option<Result<String>> {
        self.rx.recv().await.map(Ok)
    }

    async fn send(&mut self, text: String) -> Result<()> {
        let delay = self.state.lock().send_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.state.lock().outbound.push(text);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut st = self.state.lock();
        st.inbound = None;
        st.closes += 1;
        self.rx.close();
        Ok(())
    }
}
