//! # Registry
//!
//! Per event type, the ordered list of subscribers a dispatch walks.
//!
//! ## Ordering
//!
//! Priority descending, then role descending, then the global permission
//! mask descending. Inbound entries narrowing the permission on one event
//! do not move the subscriber. Full ties keep configuration order.
//!
//! ## Reload
//!
//! A new registry is built off to the side from fresh descriptors and then
//! published by swapping an `Arc`. Dispatches already running keep the
//! registry they started with. Runtime state (status, activation, open
//! transport) follows a subscriber across reloads when the new descriptors
//! contain the same name at the same site; everything else is deactivated.
//!
//! ## Remote endpoints
//!
//! A delivery leases the subscriber's endpoint out of its slot and returns
//! it when done, so no lock is held during network I/O. Releasing the
//! endpoint (deactivation, a repeat handshake) bumps an epoch so leases
//! taken earlier are discarded instead of returned, and interrupts their
//! I/O.

use crate::envelope::EventHandler;
use crate::error::{AdminError, TransportError};
use crate::transport::{Interrupter, RemoteEndpoint};
use nos_types::policy::MAX_POLICIES;
use nos_types::{
    component_id, EventCategory, EventKind, OdpEntry, Permission, RegistryError, Role, Site,
    Status, SubscriberConfig, SubscriberType,
};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// In-process handlers by subscriber name.
pub type HandlerTable<K> = HashMap<String, Arc<dyn EventHandler<K>>>;

/// Mutable runtime state of a subscriber, shared across registry versions.
pub struct SubscriberState {
    enabled: AtomicBool,
    activated: AtomicBool,
    endpoint: Mutex<Option<Box<dyn RemoteEndpoint>>>,
    epoch: AtomicU64,
    in_flight: Mutex<Vec<Interrupter>>,
}

impl SubscriberState {
    fn new(status: Status) -> Self {
        Self {
            enabled: AtomicBool::new(status == Status::Enabled),
            activated: AtomicBool::new(false),
            endpoint: Mutex::new(None),
            epoch: AtomicU64::new(0),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    /// Drop the idle endpoint and abort every call using a leased one.
    fn release_endpoint(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let idle = self.endpoint.lock().take();
        drop(idle);
        let leased: Vec<Interrupter> = self.in_flight.lock().drain(..).collect();
        for interrupter in leased {
            interrupter.interrupt();
        }
    }
}

/// An endpoint taken out of its subscriber's slot for one delivery. Dropping
/// the lease puts the endpoint back unless it was released meanwhile.
pub(crate) struct EndpointLease<'a> {
    state: &'a SubscriberState,
    endpoint: Option<Box<dyn RemoteEndpoint>>,
    interrupter: Option<Interrupter>,
    epoch: u64,
}

impl EndpointLease<'_> {
    pub(crate) fn endpoint(&mut self) -> Result<&mut (dyn RemoteEndpoint + 'static), TransportError> {
        self.endpoint.as_deref_mut().ok_or(TransportError::Closed)
    }

    /// Whether the endpoint was released after this lease was taken.
    pub(crate) fn is_released(&self) -> bool {
        self.state.epoch.load(Ordering::Acquire) != self.epoch
    }
}

impl Drop for EndpointLease<'_> {
    fn drop(&mut self) {
        if let Some(mine) = &self.interrupter {
            self.state.in_flight.lock().retain(|other| !other.same(mine));
        }
        if self.is_released() {
            return;
        }
        let mut slot = self.state.endpoint.lock();
        if slot.is_none() {
            *slot = self.endpoint.take();
        }
    }
}

impl fmt::Debug for SubscriberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberState")
            .field("enabled", &self.enabled.load(Ordering::Relaxed))
            .field("activated", &self.activated.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// A registered subscriber.
pub struct Subscriber<K: EventKind> {
    pub id: u32,
    pub name: String,
    pub kind: SubscriberType,
    pub site: Site,
    pub role: Role,
    pub perm: Permission,
    pub priority: i32,
    inbound: HashMap<K, Permission>,
    inbound_order: Vec<K>,
    outbound: HashSet<K>,
    policies: RwLock<Vec<OdpEntry>>,
    handler: Option<Arc<dyn EventHandler<K>>>,
    push_addr: Option<String>,
    req_addr: Option<String>,
    delivered: Vec<AtomicU64>,
    state: Arc<SubscriberState>,
}

impl<K: EventKind> Subscriber<K> {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_activated(&self) -> bool {
        self.state.activated.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.site == Site::Remote
    }

    /// Effective permission on `event`, if subscribed.
    #[must_use]
    pub fn inbound_perm(&self, event: K) -> Option<Permission> {
        self.inbound.get(&event).copied()
    }

    /// Whether this subscriber may raise `event`.
    #[must_use]
    pub fn publishes(&self, event: K) -> bool {
        self.outbound.contains(&event)
    }

    #[must_use]
    pub fn handler(&self) -> Option<&Arc<dyn EventHandler<K>>> {
        self.handler.as_ref()
    }

    #[must_use]
    pub fn push_addr(&self) -> Option<&str> {
        self.push_addr.as_deref()
    }

    #[must_use]
    pub fn req_addr(&self) -> Option<&str> {
        self.req_addr.as_deref()
    }

    /// Read guard over the policy entries.
    pub fn policies(&self) -> RwLockReadGuard<'_, Vec<OdpEntry>> {
        self.policies.read()
    }

    /// Append a policy entry.
    pub fn add_policy(&self, entry: OdpEntry) -> Result<usize, AdminError> {
        let mut policies = self.policies.write();
        if policies.len() >= MAX_POLICIES {
            return Err(AdminError::TooManyPolicies(self.name.clone()));
        }
        policies.push(entry);
        Ok(policies.len())
    }

    /// Remove the policy at 1-based `index`.
    pub fn remove_policy(&self, index: usize) -> Result<OdpEntry, AdminError> {
        let mut policies = self.policies.write();
        if index == 0 || index > policies.len() {
            return Err(AdminError::PolicyIndex {
                name: self.name.clone(),
                index,
                count: policies.len(),
            });
        }
        Ok(policies.remove(index - 1))
    }

    /// Count one delivery of `event`.
    pub(crate) fn count(&self, event: K) {
        if let Some(counter) = self.delivered.get(event.id() as usize) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Deliveries of `event` so far.
    #[must_use]
    pub fn delivered(&self, event: K) -> u64 {
        self.delivered
            .get(event.id() as usize)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Take the endpoint for one delivery, opening it with `connect` when
    /// the slot is empty. Concurrent deliveries each get their own.
    pub(crate) fn lease_endpoint(
        &self,
        connect: impl FnOnce() -> Result<Box<dyn RemoteEndpoint>, TransportError>,
    ) -> Result<EndpointLease<'_>, TransportError> {
        let state: &SubscriberState = &self.state;
        let epoch = state.epoch.load(Ordering::Acquire);
        let idle = state.endpoint.lock().take();
        let endpoint = match idle {
            Some(endpoint) => endpoint,
            None => connect()?,
        };
        let interrupter = endpoint.interrupter();
        if let Some(i) = &interrupter {
            state.in_flight.lock().push(i.clone());
        }
        let lease = EndpointLease {
            state,
            endpoint: Some(endpoint),
            interrupter,
            epoch,
        };
        // Released while we were connecting.
        if lease.is_released() {
            return Err(TransportError::Released);
        }
        Ok(lease)
    }

    /// Forget the current endpoint, aborting calls in progress on it.
    pub(crate) fn reset_endpoint(&self) {
        self.state.release_endpoint();
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.state.enabled.store(enabled, Ordering::Release);
    }

    /// Mark a remote subscriber activated after a successful handshake.
    pub(crate) fn mark_activated(&self) {
        self.state.activated.store(true, Ordering::Release);
    }

    /// Activate. Local subscribers run their handler's `activate` hook.
    pub fn activate(&self) -> Result<(), AdminError> {
        if !self.is_enabled() {
            return Err(AdminError::Disabled(self.name.clone()));
        }
        if self.is_activated() {
            return Ok(());
        }
        if let Some(handler) = &self.handler {
            handler.activate().map_err(|reason| AdminError::Activation {
                name: self.name.clone(),
                reason,
            })?;
        }
        self.state.activated.store(true, Ordering::Release);
        Ok(())
    }

    /// Deactivate and release any open transport. Returns whether the
    /// subscriber was active.
    pub fn deactivate(&self) -> bool {
        let was_active = self.state.activated.swap(false, Ordering::AcqRel);
        if was_active {
            if let Some(handler) = &self.handler {
                handler.deactivate();
            }
        }
        self.state.release_endpoint();
        was_active
    }

    /// Listing entry.
    #[must_use]
    pub fn summary(&self) -> SubscriberSummary {
        SubscriberSummary {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind,
            site: self.site,
            role: self.role,
            perm: self.perm,
            priority: self.priority,
            status: if self.is_enabled() {
                Status::Enabled
            } else {
                Status::Disabled
            },
            activated: self.is_activated(),
            policies: self.policies.read().len(),
        }
    }

    /// Full description including per-event delivery counters.
    #[must_use]
    pub fn detail(&self) -> SubscriberDetail {
        SubscriberDetail {
            summary: self.summary(),
            inbounds: self
                .inbound_order
                .iter()
                .map(|e| InboundDetail {
                    event: e.to_string(),
                    perm: self.inbound[e],
                    delivered: self.delivered(*e),
                })
                .collect(),
            outbounds: {
                let mut out: Vec<K> = self.outbound.iter().copied().collect();
                out.sort_by_key(|e| e.id());
                out.iter().map(ToString::to_string).collect()
            },
            policies: self.policies.read().iter().map(ToString::to_string).collect(),
        }
    }
}

impl<K: EventKind> fmt::Debug for Subscriber<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("site", &self.site)
            .field("role", &self.role)
            .field("perm", &self.perm)
            .field("priority", &self.priority)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// One line of `list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriberSummary {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SubscriberType,
    pub site: Site,
    pub role: Role,
    pub perm: Permission,
    pub priority: i32,
    pub status: Status,
    pub activated: bool,
    pub policies: usize,
}

/// Inbound subscription with its counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundDetail {
    pub event: String,
    pub perm: Permission,
    pub delivered: u64,
}

/// Output of `show`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriberDetail {
    #[serde(flatten)]
    pub summary: SubscriberSummary,
    pub inbounds: Vec<InboundDetail>,
    pub outbounds: Vec<String>,
    pub policies: Vec<String>,
}

/// One immutable registry version.
pub struct Registry<K: EventKind> {
    subscribers: Vec<Arc<Subscriber<K>>>,
    routes: Vec<Vec<Arc<Subscriber<K>>>>,
    by_id: HashMap<u32, Arc<Subscriber<K>>>,
    by_name: HashMap<String, Arc<Subscriber<K>>>,
    generation: u64,
}

impl<K: EventKind> Registry<K> {
    /// A registry without subscribers.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            subscribers: Vec::new(),
            routes: vec![Vec::new(); K::slots()],
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            generation: 0,
        }
    }

    /// Build a registry from descriptors.
    ///
    /// `previous` supplies runtime state to carry forward. Local descriptors
    /// without a handler in `handlers` are skipped with a warning.
    pub fn build(
        configs: &[SubscriberConfig],
        handlers: &HandlerTable<K>,
        previous: Option<&Registry<K>>,
    ) -> Result<Self, RegistryError> {
        let mut subscribers: Vec<Arc<Subscriber<K>>> = Vec::with_capacity(configs.len());
        let mut by_id: HashMap<u32, Arc<Subscriber<K>>> = HashMap::new();
        let mut by_name: HashMap<String, Arc<Subscriber<K>>> = HashMap::new();
        let mut seen_names: HashSet<&str> = HashSet::new();

        for cfg in configs {
            if cfg.name.is_empty() {
                return Err(RegistryError::MissingName);
            }
            if !seen_names.insert(cfg.name.as_str()) {
                return Err(RegistryError::DuplicateName(cfg.name.clone()));
            }

            let handler = match cfg.site {
                Site::Local => match handlers.get(&cfg.name) {
                    Some(h) => Some(Arc::clone(h)),
                    None => {
                        warn!(
                            "[{}] No handler for local subscriber {}, skipping",
                            K::CLASS.tag(),
                            cfg.name
                        );
                        continue;
                    }
                },
                Site::Remote => {
                    if cfg.push_addr.is_none() || cfg.req_addr.is_none() {
                        return Err(RegistryError::MissingAddress(cfg.name.clone()));
                    }
                    None
                }
            };

            let id = component_id(&cfg.name);
            if let Some(other) = by_id.get(&id) {
                return Err(RegistryError::IdCollision {
                    first: other.name.clone(),
                    second: cfg.name.clone(),
                    id,
                });
            }

            let (inbound, inbound_order) = resolve_inbounds::<K>(cfg)?;
            let outbound = resolve_outbounds::<K>(cfg)?;
            let policies = cfg
                .policies
                .iter()
                .map(|text| {
                    text.parse::<OdpEntry>().map_err(|source| RegistryError::Policy {
                        subscriber: cfg.name.clone(),
                        source,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let state = previous
                .and_then(|prev| prev.by_name(&cfg.name))
                .filter(|prev| prev.site == cfg.site)
                .map_or_else(
                    || Arc::new(SubscriberState::new(cfg.status)),
                    |prev| Arc::clone(&prev.state),
                );

            let sub = Arc::new(Subscriber {
                id,
                name: cfg.name.clone(),
                kind: cfg.kind,
                site: cfg.site,
                role: cfg.role,
                perm: cfg.perm,
                priority: cfg.priority,
                inbound,
                inbound_order,
                outbound,
                policies: RwLock::new(policies),
                handler,
                push_addr: cfg.push_addr.clone(),
                req_addr: cfg.req_addr.clone(),
                delivered: (0..K::slots()).map(|_| AtomicU64::new(0)).collect(),
                state,
            });

            by_id.insert(id, Arc::clone(&sub));
            by_name.insert(sub.name.clone(), Arc::clone(&sub));
            subscribers.push(sub);
        }

        let mut routes: Vec<Vec<Arc<Subscriber<K>>>> = vec![Vec::new(); K::slots()];
        for event in K::ALL {
            let route = &mut routes[event.id() as usize];
            route.extend(
                subscribers
                    .iter()
                    .filter(|s| s.inbound.contains_key(event))
                    .cloned(),
            );
            route.sort_by_key(|s| (Reverse(s.priority), Reverse(s.role), Reverse(s.perm)));
        }

        Ok(Self {
            subscribers,
            routes,
            by_id,
            by_name,
            generation: previous.map_or(1, |p| p.generation + 1),
        })
    }

    /// Subscribers of `event` in delivery order.
    #[must_use]
    pub fn subscribers_of(&self, event: K) -> &[Arc<Subscriber<K>>] {
        self.routes
            .get(event.id() as usize)
            .map_or(&[], Vec::as_slice)
    }

    /// All subscribers in configuration order.
    #[must_use]
    pub fn subscribers(&self) -> &[Arc<Subscriber<K>>] {
        &self.subscribers
    }

    #[must_use]
    pub fn get(&self, id: u32) -> Option<&Arc<Subscriber<K>>> {
        self.by_id.get(&id)
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Arc<Subscriber<K>>> {
        self.by_name.get(name)
    }

    /// Whether the subscriber `publisher` lists `event` as outbound.
    #[must_use]
    pub fn may_raise(&self, publisher: u32, event: K) -> bool {
        self.by_id.get(&publisher).is_some_and(|s| s.publishes(event))
    }

    /// Whether any subscriber lists `event` as outbound.
    #[must_use]
    pub fn any_publishes(&self, event: K) -> bool {
        self.subscribers.iter().any(|s| s.publishes(event))
    }

    /// Version number, incremented on every reload.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Subscribers of `self` whose state does not carry into `next`.
    fn released_by(&self, next: &Registry<K>) -> Vec<Arc<Subscriber<K>>> {
        self.subscribers
            .iter()
            .filter(|old| {
                next.by_name(&old.name)
                    .map_or(true, |new| !Arc::ptr_eq(&new.state, &old.state))
            })
            .cloned()
            .collect()
    }
}

fn resolve_inbounds<K: EventKind>(
    cfg: &SubscriberConfig,
) -> Result<(HashMap<K, Permission>, Vec<K>), RegistryError> {
    let mut inbound = HashMap::new();
    let mut order = Vec::new();

    for entry in &cfg.inbounds {
        let perm = entry.perm().map_or(cfg.perm, |p| p & cfg.perm);
        let events = match EventCategory::from_wildcard(entry.event()) {
            Some(category) => {
                if cfg.role < Role::Security {
                    return Err(RegistryError::WildcardNotPermitted {
                        subscriber: cfg.name.clone(),
                        event: entry.event().to_string(),
                    });
                }
                K::in_category(category)
            }
            None => vec![K::from_name(entry.event()).ok_or_else(|| RegistryError::UnknownEvent {
                subscriber: cfg.name.clone(),
                event: entry.event().to_string(),
            })?],
        };
        for event in events {
            if inbound.insert(event, perm).is_none() {
                order.push(event);
            }
        }
    }
    Ok((inbound, order))
}

fn resolve_outbounds<K: EventKind>(cfg: &SubscriberConfig) -> Result<HashSet<K>, RegistryError> {
    cfg.outbounds
        .iter()
        .map(|name| {
            if EventCategory::from_wildcard(name).is_some() {
                return Err(RegistryError::WildcardOutbound {
                    subscriber: cfg.name.clone(),
                    event: name.clone(),
                });
            }
            K::from_name(name).ok_or_else(|| RegistryError::UnknownEvent {
                subscriber: cfg.name.clone(),
                event: name.clone(),
            })
        })
        .collect()
}

/// The published registry of one engine.
pub struct RegistryHandle<K: EventKind> {
    current: RwLock<Arc<Registry<K>>>,
    reload_lock: Mutex<()>,
}

impl<K: EventKind> RegistryHandle<K> {
    #[must_use]
    pub fn new(registry: Registry<K>) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
            reload_lock: Mutex::new(()),
        }
    }

    /// The registry new dispatches should use.
    #[must_use]
    pub fn current(&self) -> Arc<Registry<K>> {
        Arc::clone(&self.current.read())
    }

    /// Build a registry from `configs` and publish it. On error the current
    /// registry stays in place.
    pub fn reload(
        &self,
        configs: &[SubscriberConfig],
        handlers: &HandlerTable<K>,
    ) -> Result<Arc<Registry<K>>, RegistryError> {
        let _guard = self.reload_lock.lock();
        let old = self.current();
        let next = Arc::new(Registry::build(configs, handlers, Some(&old))?);

        *self.current.write() = Arc::clone(&next);

        for gone in old.released_by(&next) {
            if gone.deactivate() {
                info!("[{}] {} deactivated by reload", K::CLASS.tag(), gone.name);
            }
        }
        info!(
            "[{}] Registry generation {} published ({} subscribers)",
            K::CLASS.tag(),
            next.generation(),
            next.subscribers().len()
        );
        Ok(next)
    }
}

impl<K: EventKind> Default for RegistryHandle<K> {
    fn default() -> Self {
        Self::new(Registry::empty())
    }
}
