//! # Event Engine
//!
//! One engine per event class. It owns the published registry, the remote
//! connector, the per-type counters and the background threads, and exposes
//! the collaborator contract (`raise`/`query`) plus the admin operations.
//!
//! ```text
//! raise(publisher, event, payload)
//!     -> category + payload kind check
//!     -> outbound authorization
//!     -> Notify Dispatch on the caller's thread
//!
//! query(publisher, event, &mut payload)
//!     -> Request-Response Dispatch, result written back into `payload`
//! ```

use crate::codec::{EventRecord, Handshake};
use crate::config::EngineConfig;
use crate::dispatch;
use crate::envelope::{Envelope, EventHandler};
use crate::error::{AdminError, DispatchError, HandshakeError, TransportError};
use crate::meta::{EventCounters, MetaAction, MetaMonitor, NoopMetaAction};
use crate::registry::{
    HandlerTable, Registry, RegistryHandle, Subscriber, SubscriberDetail, SubscriberSummary,
};
use crate::transport::{Connector, TcpConnector};
use crate::workers;
use nos_types::{
    EventCategory, EventKind, EventPayload, OdpEntry, RegistryError, Site, SubscriberConfig,
};
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Poll interval for loops that wait on the running flag.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The event routing engine of one event class.
pub struct EventEngine<K: EventKind> {
    config: EngineConfig,
    registry: RegistryHandle<K>,
    handlers: RwLock<HandlerTable<K>>,
    connector: Arc<dyn Connector>,
    counters: EventCounters<K>,
    monitor: MetaMonitor<K>,
    running: AtomicBool,
    threads: Mutex<Vec<JoinHandle<()>>>,
    bound: Mutex<BoundEndpoints>,
}

/// Addresses the inbound endpoints actually bound to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundEndpoints {
    pub pull: Option<SocketAddr>,
    pub reply: Option<SocketAddr>,
}

impl<K: EventKind> EventEngine<K> {
    /// Engine with an empty registry, the TCP connector and no meta action.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let connector = Arc::new(TcpConnector::new(config.connect_timeout));
        let monitor = MetaMonitor::new(&config.triggers, Arc::new(NoopMetaAction));
        Self {
            config,
            registry: RegistryHandle::default(),
            handlers: RwLock::new(HandlerTable::new()),
            connector,
            counters: EventCounters::new(),
            monitor,
            running: AtomicBool::new(false),
            threads: Mutex::new(Vec::new()),
            bound: Mutex::new(BoundEndpoints::default()),
        }
    }

    /// Replace the connector used to reach remote subscribers.
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Install the action run when a meta trigger fires.
    #[must_use]
    pub fn with_meta_action(mut self, action: Arc<dyn MetaAction<K>>) -> Self {
        self.monitor = MetaMonitor::new(&self.config.triggers, action);
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Registry
    // =========================================================================

    /// Make `handler` available to the local subscriber called `name`.
    /// Takes effect at the next [`reload`](Self::reload).
    pub fn register_handler(&self, name: impl Into<String>, handler: Arc<dyn EventHandler<K>>) {
        self.handlers.write().insert(name.into(), handler);
    }

    /// Build a registry from `configs` and publish it. Returns the new
    /// generation. On error the current registry stays in place.
    pub fn reload(&self, configs: &[SubscriberConfig]) -> Result<u64, RegistryError> {
        let handlers = self.handlers.read().clone();
        let registry = self.registry.reload(configs, &handlers).map_err(|e| {
            warn!("[{}] Registry rejected: {}", K::CLASS.tag(), e);
            e
        })?;
        Ok(registry.generation())
    }

    /// The registry currently in use.
    #[must_use]
    pub fn registry(&self) -> Arc<Registry<K>> {
        self.registry.current()
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    fn check_payload(event: K, payload: &EventPayload) -> Result<(), DispatchError> {
        let expected = event.payload_kind();
        let given = payload.kind();
        if expected == given {
            Ok(())
        } else {
            Err(DispatchError::PayloadMismatch {
                event: event.to_string(),
                expected,
                given,
            })
        }
    }

    fn unauthorized(publisher: u32, event: K) -> DispatchError {
        warn!(
            publisher,
            event = %event,
            "[{}] Unauthorized raise rejected",
            K::CLASS.tag()
        );
        DispatchError::Unauthorized {
            publisher,
            event: event.to_string(),
        }
    }

    /// Publish `payload` as `event` on behalf of `publisher`. Returns the
    /// code of the last delivery.
    pub fn raise(&self, publisher: u32, event: K, payload: EventPayload) -> Result<i32, DispatchError> {
        if !event.category().is_notify_dispatched() {
            return Err(DispatchError::WrongCategory {
                event: event.to_string(),
            });
        }
        Self::check_payload(event, &payload)?;

        let registry = self.registry.current();
        if !registry.may_raise(publisher, event) {
            return Err(Self::unauthorized(publisher, event));
        }

        self.counters.incr(event);
        let mut env = Envelope::new(publisher, event, payload);
        Ok(dispatch::notify(&registry, self.connector.as_ref(), &mut env))
    }

    /// Ask the subscribers of a request-response `event` to fill in
    /// `payload`.
    pub fn query(&self, publisher: u32, event: K, payload: &mut EventPayload) -> Result<i32, DispatchError> {
        if event.category() != EventCategory::RequestResponse {
            return Err(DispatchError::WrongCategory {
                event: event.to_string(),
            });
        }
        Self::check_payload(event, payload)?;

        let registry = self.registry.current();
        if !registry.any_publishes(event) {
            return Err(Self::unauthorized(publisher, event));
        }

        self.counters.incr(event);
        let taken = std::mem::replace(payload, EventPayload::empty(event.payload_kind()));
        let mut env = Envelope::new(publisher, event, taken);
        let ret = dispatch::request_response(&registry, self.connector.as_ref(), &mut env);
        *payload = env.payload;
        Ok(ret)
    }

    /// Dispatch a record received from a remote peer. Request-response
    /// types go through [`query`](Self::query), everything else through
    /// [`raise`](Self::raise). Returns the code and the resulting payload.
    pub fn dispatch_record(&self, record: EventRecord<K>) -> Result<(i32, EventPayload), DispatchError> {
        let EventRecord {
            publisher,
            event,
            mut payload,
        } = record;
        if event.category() == EventCategory::RequestResponse {
            let ret = self.query(publisher, event, &mut payload)?;
            Ok((ret, payload))
        } else {
            let ret = self.raise(publisher, event, payload.clone())?;
            Ok((ret, payload))
        }
    }

    /// Events counted since the last meta tick.
    #[must_use]
    pub fn event_count(&self, event: K) -> u64 {
        self.counters.get(event)
    }

    /// Run one meta-monitor pass now. Returns the number of triggers fired.
    pub fn meta_tick(&self) -> usize {
        self.monitor.tick(&self.counters)
    }

    // =========================================================================
    // Handshake
    // =========================================================================

    /// Accept a remote peer presenting `handshake` and activate its
    /// subscriber. Rejections leave every subscriber untouched.
    pub fn handshake(&self, handshake: &Handshake) -> Result<(), HandshakeError> {
        let result = self.check_handshake(handshake);
        match &result {
            Ok(sub) => {
                // A reconnecting peer gets fresh channels.
                sub.reset_endpoint();
                sub.mark_activated();
                info!(
                    "[{}] {} (id {}) activated by handshake",
                    K::CLASS.tag(),
                    sub.name,
                    sub.id
                );
            }
            Err(e) => warn!("[{}] Handshake rejected: {}", K::CLASS.tag(), e),
        }
        result.map(|_| ())
    }

    fn check_handshake(&self, hs: &Handshake) -> Result<Arc<Subscriber<K>>, HandshakeError> {
        if hs.id == 0 || hs.name.is_empty() {
            return Err(HandshakeError::EmptyIdentity {
                id: hs.id,
                name: hs.name.clone(),
            });
        }
        let registry = self.registry.current();
        let sub = registry
            .get(hs.id)
            .filter(|s| s.is_remote())
            .ok_or_else(|| HandshakeError::UnknownId {
                id: hs.id,
                name: hs.name.clone(),
            })?;
        if sub.name != hs.name {
            return Err(HandshakeError::NameMismatch {
                id: hs.id,
                expected: sub.name.clone(),
                given: hs.name.clone(),
            });
        }
        if !sub.is_enabled() {
            return Err(HandshakeError::Disabled(sub.name.clone()));
        }
        Ok(Arc::clone(sub))
    }

    // =========================================================================
    // Administration
    // =========================================================================

    fn subscriber(&self, name: &str) -> Result<Arc<Subscriber<K>>, AdminError> {
        self.registry
            .current()
            .by_name(name)
            .cloned()
            .ok_or_else(|| AdminError::UnknownSubscriber(name.to_string()))
    }

    pub fn enable(&self, name: &str) -> Result<(), AdminError> {
        self.subscriber(name)?.set_enabled(true);
        info!("[{}] {} enabled", K::CLASS.tag(), name);
        Ok(())
    }

    /// Disable and deactivate.
    pub fn disable(&self, name: &str) -> Result<(), AdminError> {
        let sub = self.subscriber(name)?;
        sub.set_enabled(false);
        sub.deactivate();
        info!("[{}] {} disabled", K::CLASS.tag(), name);
        Ok(())
    }

    /// Activate a local subscriber. Remote subscribers activate by handshake.
    pub fn activate(&self, name: &str) -> Result<(), AdminError> {
        let sub = self.subscriber(name)?;
        if sub.site == Site::Remote {
            return Err(AdminError::RemoteActivation(name.to_string()));
        }
        sub.activate()?;
        info!("[{}] {} activated", K::CLASS.tag(), name);
        Ok(())
    }

    /// Returns whether the subscriber was active.
    pub fn deactivate(&self, name: &str) -> Result<bool, AdminError> {
        let was_active = self.subscriber(name)?.deactivate();
        info!("[{}] {} deactivated", K::CLASS.tag(), name);
        Ok(was_active)
    }

    /// Activate every enabled local subscriber. Returns how many are active
    /// afterwards.
    pub fn start_all(&self) -> usize {
        let registry = self.registry.current();
        let mut active = 0;
        for sub in registry.subscribers() {
            if sub.site != Site::Local || !sub.is_enabled() {
                continue;
            }
            match sub.activate() {
                Ok(()) => active += 1,
                Err(e) => warn!("[{}] {}", K::CLASS.tag(), e),
            }
        }
        info!("[{}] {} local subscribers active", K::CLASS.tag(), active);
        active
    }

    /// Deactivate everything. Returns how many were active.
    pub fn stop_all(&self) -> usize {
        let stopped = self
            .registry
            .current()
            .subscribers()
            .iter()
            .filter(|s| s.deactivate())
            .count();
        info!("[{}] {} subscribers deactivated", K::CLASS.tag(), stopped);
        stopped
    }

    /// Parse and append a policy. Returns the number of policies held.
    pub fn add_policy(&self, name: &str, policy: &str) -> Result<usize, AdminError> {
        let entry: OdpEntry = policy.parse()?;
        let count = self.subscriber(name)?.add_policy(entry)?;
        info!("[{}] {} policy #{} added: {}", K::CLASS.tag(), name, count, policy);
        Ok(count)
    }

    /// Remove policy number `index` (1-based).
    pub fn del_policy(&self, name: &str, index: usize) -> Result<OdpEntry, AdminError> {
        let removed = self.subscriber(name)?.remove_policy(index)?;
        info!("[{}] {} policy #{} removed", K::CLASS.tag(), name, index);
        Ok(removed)
    }

    /// Policies of `name` in text form.
    pub fn policies(&self, name: &str) -> Result<Vec<String>, AdminError> {
        Ok(self
            .subscriber(name)?
            .policies()
            .iter()
            .map(ToString::to_string)
            .collect())
    }

    #[must_use]
    pub fn list(&self) -> Vec<SubscriberSummary> {
        self.registry
            .current()
            .subscribers()
            .iter()
            .map(|s| s.summary())
            .collect()
    }

    pub fn show(&self, name: &str) -> Result<SubscriberDetail, AdminError> {
        Ok(self.subscriber(name)?.detail())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Bind the inbound endpoints and start the worker and monitor threads.
    pub fn start(self: &Arc<Self>) -> Result<(), TransportError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut threads = Vec::new();
        let mut bound = BoundEndpoints::default();
        let started = (|| -> Result<(), TransportError> {
            if let Some(addr) = &self.config.pull_addr {
                let listener = workers::bind(addr)?;
                bound.pull = Some(listener.local_addr()?);
                threads.push(workers::spawn_pull(Arc::clone(self), listener)?);
            }
            if let Some(addr) = &self.config.reply_addr {
                let listener = workers::bind(addr)?;
                bound.reply = Some(listener.local_addr()?);
                threads.push(workers::spawn_reply(Arc::clone(self), listener)?);
            }
            threads.push(self.spawn_monitor()?);
            Ok(())
        })();

        self.threads.lock().extend(threads);
        *self.bound.lock() = bound;
        if let Err(e) = started {
            warn!("[{}] Failed to start: {}", K::CLASS.tag(), e);
            self.shutdown();
            return Err(e);
        }
        info!("[{}] Event engine started", K::CLASS.tag());
        Ok(())
    }

    /// Where the inbound endpoints listen. Useful when binding port 0.
    #[must_use]
    pub fn bound_endpoints(&self) -> BoundEndpoints {
        *self.bound.lock()
    }

    fn spawn_monitor(self: &Arc<Self>) -> Result<JoinHandle<()>, TransportError> {
        let engine = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("{}-meta", K::CLASS.tag()))
            .spawn(move || {
                debug!("[{}] Meta monitor running", K::CLASS.tag());
                while engine.is_running() {
                    let deadline = Instant::now() + engine.config.meta_tick;
                    while engine.is_running() && Instant::now() < deadline {
                        thread::sleep(POLL_INTERVAL.min(engine.config.meta_tick));
                    }
                    if engine.is_running() {
                        engine.meta_tick();
                    }
                }
            })?;
        Ok(handle)
    }

    /// Stop the workers, release every remote channel and wait up to the
    /// grace period for the threads to finish.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        self.stop_all();

        let threads: Vec<_> = self.threads.lock().drain(..).collect();
        let deadline = Instant::now() + self.config.shutdown_grace;
        while Instant::now() < deadline && !threads.iter().all(JoinHandle::is_finished) {
            thread::sleep(POLL_INTERVAL);
        }
        for handle in threads {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!("[{}] Worker did not stop within the grace period", K::CLASS.tag());
            }
        }
        *self.bound.lock() = BoundEndpoints::default();
        info!("[{}] Event engine stopped", K::CLASS.tag());
    }
}
