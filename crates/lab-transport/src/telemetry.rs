//! Telemetry resourcer: a background worker keeps one stream open, caches
//! the latest value of each routed field and forwards queued writes.
//!
//! Callers stay synchronous. The worker runs on a small runtime owned by the
//! resourcer, so a resourcer must be created and dropped outside any tokio
//! runtime.

use crate::{from_hex, to_hex, Result, TelemetryConnector, TelemetryLink, TransportError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// What to do on a call after the stream has closed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ReconnectPolicy {
    /// Reopen the stream on the next `get`/`post`.
    #[default]
    OnDemand,
    /// Open once; later calls fail with [`TransportError::Disconnected`].
    Never,
}

#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Bounded wait per receive attempt. Expiry just re-polls.
    pub recv_timeout: Duration,
    /// Longest a queued write may wait for the stream before it is dropped.
    pub send_timeout: Duration,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            recv_timeout: Duration::from_secs(1),
            send_timeout: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(1),
            reconnect: ReconnectPolicy::OnDemand,
        }
    }
}

impl TelemetryConfig {
    /// Same timeout for every wait, as the device description specifies it.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            recv_timeout: timeout,
            send_timeout: timeout,
            connect_timeout: timeout,
            reconnect: ReconnectPolicy::OnDemand,
        }
    }
}

/// Counters for the lifetime of one resourcer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TelemetryStats {
    pub connects: u64,
    pub received: u64,
    pub sent: u64,
    pub dropped: u64,
}

/// A field value as it arrived. Registers travel as hex strings; anything
/// else is kept so that `get` can report it.
#[derive(Debug, Clone)]
enum Wire {
    Hex(String),
    Invalid(String),
}

#[derive(Debug)]
struct Slot {
    field: String,
    raw: Option<Wire>,
    received_at: Option<OffsetDateTime>,
}

#[derive(Debug, Default)]
struct TelemetryCache {
    slots: HashMap<String, Slot>,
    by_field: HashMap<String, String>,
    unread: bool,
}

struct Shared {
    cache: Mutex<TelemetryCache>,
    connected: watch::Sender<bool>,
    connects: AtomicU64,
    received: AtomicU64,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    fn store(&self, text: &str) {
        let record: serde_json::Map<String, Value> = match serde_json::from_str(text) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "skipping malformed telemetry message");
                return;
            }
        };
        self.received.fetch_add(1, Ordering::Relaxed);
        let now = OffsetDateTime::now_utc();
        let mut guard = self.cache.lock();
        let cache = &mut *guard;
        let mut updated = false;
        for (field, value) in record {
            let Some(path) = cache.by_field.get(&field) else {
                trace!(field = %field, "unrouted telemetry field");
                continue;
            };
            if let Some(slot) = cache.slots.get_mut(path) {
                slot.raw = Some(match value {
                    Value::String(s) => Wire::Hex(s),
                    other => {
                        warn!(field = %field, value = %other, "non-string telemetry value");
                        Wire::Invalid(other.to_string())
                    }
                });
                slot.received_at = Some(now);
                updated = true;
            }
        }
        if updated {
            cache.unread = true;
        }
    }
}

struct Outgoing {
    payload: String,
    queued_at: Instant,
}

struct Worker {
    outbox: mpsc::UnboundedSender<Outgoing>,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

pub struct TelemetryResourcer {
    config: TelemetryConfig,
    connector: Arc<dyn TelemetryConnector>,
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
    opened: AtomicBool,
    runtime: Runtime,
}

impl TelemetryResourcer {
    pub fn new(connector: impl TelemetryConnector + 'static, config: TelemetryConfig) -> Result<Self> {
        Self::from_shared(Arc::new(connector), config)
    }

    pub fn from_shared(
        connector: Arc<dyn TelemetryConnector>,
        config: TelemetryConfig,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("telemetry-rx")
            .enable_all()
            .build()
            .map_err(|e| TransportError::Io(e.to_string()))?;
        let (connected, _) = watch::channel(false);
        Ok(Self {
            config,
            connector,
            shared: Arc::new(Shared {
                cache: Mutex::new(TelemetryCache::default()),
                connected,
                connects: AtomicU64::new(0),
                received: AtomicU64::new(0),
                sent: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
            worker: Mutex::new(None),
            opened: AtomicBool::new(false),
            runtime,
        })
    }

    /// Route record key `field` to resource `path`.
    ///
    /// A field feeds exactly one path; routing it to a second path fails.
    pub fn route(&self, path: &str, field: &str) -> Result<()> {
        let mut cache = self.shared.cache.lock();
        if let Some(existing) = cache.by_field.get(field) {
            if existing != path {
                return Err(TransportError::FieldInUse {
                    field: field.to_string(),
                    path: existing.clone(),
                });
            }
        }
        if let Some(old) = cache.slots.get(path).map(|s| s.field.clone()) {
            cache.by_field.remove(&old);
        }
        cache.by_field.insert(field.to_string(), path.to_string());
        cache.slots.insert(
            path.to_string(),
            Slot {
                field: field.to_string(),
                raw: None,
                received_at: None,
            },
        );
        Ok(())
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Latest register value for `path`, or `None` before its first message.
    ///
    /// Clears the unread flag, so a caller can tell a fresh sample from a
    /// repeat via [`has_new_message`](Self::has_new_message).
    pub fn get(&self, path: &str) -> Result<Option<u32>> {
        if !self.shared.cache.lock().slots.contains_key(path) {
            return Err(TransportError::UnsupportedResource(path.to_string()));
        }
        self.ensure_started()?;
        let raw = {
            let mut cache = self.shared.cache.lock();
            let raw = cache.slots.get(path).and_then(|s| s.raw.clone());
            cache.unread = false;
            raw
        };
        match raw {
            None => Ok(None),
            Some(Wire::Hex(s)) => from_hex(&s).map(Some).ok_or(TransportError::Decode(s)),
            Some(Wire::Invalid(s)) => Err(TransportError::Decode(s)),
        }
    }

    /// Queue `raw` for `path` and return without waiting for the stream.
    pub fn post(&self, path: &str, raw: u32) -> Result<()> {
        let field = self
            .shared
            .cache
            .lock()
            .slots
            .get(path)
            .map(|s| s.field.clone())
            .ok_or_else(|| TransportError::UnsupportedResource(path.to_string()))?;
        let mut record = serde_json::Map::new();
        record.insert(field, Value::String(to_hex(raw)));
        let payload = Value::Object(record).to_string();

        let mut msg = Outgoing {
            payload,
            queued_at: Instant::now(),
        };
        // The worker can exit between the liveness check and the send.
        for _ in 0..2 {
            match self.ensure_started()?.send(msg) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(back)) => msg = back,
            }
        }
        Err(TransportError::Disconnected)
    }

    /// Block until the stream is open, starting it if needed.
    pub fn wait_connected(&self, timeout: Duration) -> Result<()> {
        self.ensure_started()?;
        let mut rx = self.shared.connected.subscribe();
        let waited = self.runtime.block_on(async move {
            tokio::time::timeout(timeout, async { rx.wait_for(|c| *c).await.map(|_| ()) }).await
        });
        match waited {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(TransportError::Disconnected),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.shared.connected.borrow()
    }

    /// True if a message arrived since the last `get`.
    pub fn has_new_message(&self) -> bool {
        self.shared.cache.lock().unread
    }

    pub fn last_update(&self, path: &str) -> Option<OffsetDateTime> {
        self.shared
            .cache
            .lock()
            .slots
            .get(path)
            .and_then(|s| s.received_at)
    }

    pub fn stats(&self) -> TelemetryStats {
        TelemetryStats {
            connects: self.shared.connects.load(Ordering::Relaxed),
            received: self.shared.received.load(Ordering::Relaxed),
            sent: self.shared.sent.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
        }
    }

    /// Stop the worker, close the stream and wait for the worker to exit.
    pub fn close(&self) {
        let Some(mut worker) = self.worker.lock().take() else {
            return;
        };
        if let Some(stop) = worker.stop.take() {
            let _ = stop.send(());
        }
        let bound = self.config.connect_timeout + self.config.recv_timeout;
        let joined = self
            .runtime
            .block_on(async { tokio::time::timeout(bound, &mut worker.handle).await });
        match joined {
            Ok(Ok(())) => debug!("telemetry worker joined"),
            Ok(Err(e)) => warn!(error = %e, "telemetry worker ended abnormally"),
            Err(_) => {
                warn!(?bound, "telemetry worker did not stop in time, aborting");
                worker.handle.abort();
            }
        }
    }

    fn ensure_started(&self) -> Result<mpsc::UnboundedSender<Outgoing>> {
        let mut slot = self.worker.lock();
        if let Some(w) = slot.as_ref() {
            // A closed outbox means the worker is already on its way out.
            if !w.outbox.is_closed() && !w.handle.is_finished() {
                return Ok(w.outbox.clone());
            }
        }
        if self.config.reconnect == ReconnectPolicy::Never && self.opened.load(Ordering::Acquire)
        {
            return Err(TransportError::Disconnected);
        }
        if slot.take().is_some() {
            debug!("telemetry worker finished, reopening");
        }

        let (outbox, rx) = mpsc::unbounded_channel();
        let (stop, stop_rx) = oneshot::channel();
        let handle = self.runtime.spawn(run_worker(
            Arc::clone(&self.connector),
            Arc::clone(&self.shared),
            self.config.clone(),
            rx,
            stop_rx,
        ));
        self.opened.store(true, Ordering::Release);
        *slot = Some(Worker {
            outbox: outbox.clone(),
            stop: Some(stop),
            handle,
        });
        Ok(outbox)
    }
}

impl Drop for TelemetryResourcer {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_worker(
    connector: Arc<dyn TelemetryConnector>,
    shared: Arc<Shared>,
    config: TelemetryConfig,
    mut outbox: mpsc::UnboundedReceiver<Outgoing>,
    mut stop: oneshot::Receiver<()>,
) {
    let backend = connector.backend();
    let connecting = tokio::time::timeout(config.connect_timeout, connector.connect());
    let mut link: Box<dyn TelemetryLink> = tokio::select! {
        _ = &mut stop => return,
        res = connecting => match res {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => {
                warn!(backend, error = %e, "telemetry connect failed");
                discard_queued(&shared, &mut outbox);
                return;
            }
            Err(_) => {
                warn!(backend, timeout = ?config.connect_timeout, "telemetry connect timed out");
                discard_queued(&shared, &mut outbox);
                return;
            }
        },
    };

    shared.connects.fetch_add(1, Ordering::Relaxed);
    shared.connected.send_replace(true);
    info!(backend, "telemetry stream open");

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            Some(msg) = outbox.recv() => {
                let waited = msg.queued_at.elapsed();
                if waited > config.send_timeout {
                    shared.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(?waited, payload = %msg.payload, "dropping stale telemetry write");
                    continue;
                }
                match tokio::time::timeout(config.send_timeout, link.send(msg.payload)).await {
                    Ok(Ok(())) => {
                        shared.sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "telemetry send failed");
                        break;
                    }
                    Err(_) => {
                        shared.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(timeout = ?config.send_timeout, "telemetry send stalled, dropping link");
                        break;
                    }
                }
            }
            res = tokio::time::timeout(config.recv_timeout, link.recv()) => match res {
                Err(_) => trace!("telemetry receive wait elapsed"),
                Ok(None) => {
                    info!(backend, "telemetry stream closed by device");
                    break;
                }
                Ok(Some(Err(e))) => {
                    warn!(backend, error = %e, "telemetry receive failed");
                    break;
                }
                Ok(Some(Ok(text))) => shared.store(&text),
            },
        }
    }

    shared.connected.send_replace(false);
    // The device may have closed first; a final closed observation is fine.
    if let Err(e) = link.close().await {
        debug!(error = %e, "telemetry link close");
    }
    discard_queued(&shared, &mut outbox);
}

fn discard_queued(shared: &Shared, outbox: &mut mpsc::UnboundedReceiver<Outgoing>) {
    outbox.close();
    let mut n = 0u64;
    while outbox.try_recv().is_ok() {
        n += 1;
    }
    if n > 0 {
        shared.dropped.fetch_add(n, Ordering::Relaxed);
        warn!(count = n, "telemetry writes dropped without a stream");
    }
}
