//! The arbitration service: registry, gate and resolver behind one handle
//!
//! Most callers use the process-wide instance from [`global`]. Independent
//! instances can be built with [`Hotplugger::new`] for embedding and tests.

use std::sync::OnceLock;

use hp_error::{HotplugError, Result};
use tracing::debug;

use super::gate::ArbitrationGate;
use super::registry::Registry;
use super::resolver::{ConflictResolver, LockPolicy, ResolutionReport};
use super::state::{change_state, Transition};
use crate::driver::DescriptorRef;
use crate::settings::ArbiterSettings;

static GLOBAL: OnceLock<Hotplugger> = OnceLock::new();

/// Process-wide instance, created with default settings on first use
pub fn global() -> &'static Hotplugger {
    GLOBAL.get_or_init(Hotplugger::default)
}

/// Create the process-wide instance from `settings`.
///
/// Only the first initialisation takes effect; later calls return the
/// existing instance unchanged.
pub fn init_global(settings: &ArbiterSettings) -> &'static Hotplugger {
    GLOBAL.get_or_init(|| Hotplugger::with_settings(settings))
}

#[derive(Debug)]
pub struct Hotplugger {
    registry: Registry,
    gate: ArbitrationGate,
    policy: LockPolicy,
}

impl Hotplugger {
    pub fn new(policy: LockPolicy) -> Self {
        Self {
            registry: Registry::new(),
            gate: ArbitrationGate::default(),
            policy,
        }
    }

    pub fn with_settings(settings: &ArbiterSettings) -> Self {
        let hp = Self::new(settings.lock_policy());
        hp.gate.set_open(settings.gate_open_on_start);
        hp
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gate(&self) -> &ArbitrationGate {
        &self.gate
    }

    pub fn policy(&self) -> LockPolicy {
        self.policy
    }

    pub fn register(&self, descriptor: &DescriptorRef) -> Result<()> {
        self.registry.register(descriptor)
    }

    /// Force the driver off and drop it from the registry. Unknown
    /// descriptors are ignored.
    pub fn unregister(&self, descriptor: &DescriptorRef) {
        self.registry.unregister(descriptor);
    }

    pub fn count_registered(&self) -> usize {
        self.registry.count()
    }

    pub fn find(&self, name: &str) -> Option<DescriptorRef> {
        self.registry.find_by_name(name)
    }

    pub fn resolve_conflicts(&self, requester: &DescriptorRef) -> Result<ResolutionReport> {
        ConflictResolver::new(&self.registry, &self.gate, self.policy).resolve(requester)
    }

    /// Resolve conflicts on behalf of the driver registered as `name`
    pub fn resolve_conflicts_for(&self, name: &str) -> Result<ResolutionReport> {
        self.gate.ensure_open("resolve_conflicts")?;
        let requester = self
            .find(name)
            .ok_or_else(|| HotplugError::NotFound(name.to_string()))?;
        self.resolve_conflicts(&requester)
    }

    /// Switch one driver on without resolving conflicts
    pub fn enable_one(&self, name: &str) -> Result<Transition> {
        self.set_one(name, true)
    }

    /// Switch one driver off
    pub fn disable_one(&self, name: &str) -> Result<Transition> {
        self.set_one(name, false)
    }

    fn set_one(&self, name: &str, enabled: bool) -> Result<Transition> {
        let op = if enabled { "enable_one" } else { "disable_one" };
        self.gate.ensure_open(op)?;

        let guard = self.registry.lock();
        let target = guard
            .find_by_name(name)
            .ok_or_else(|| HotplugError::NotFound(name.to_string()))?;
        debug!("{}: \"{}\" driver found!", op, target.name());

        change_state(None, &target, enabled)
            .map_err(|e| HotplugError::controller(target.name().as_str(), e))
    }

    pub fn is_open(&self) -> bool {
        self.gate.is_open()
    }

    /// Returns the previous gate state
    pub fn set_open(&self, open: bool) -> bool {
        self.gate.set_open(open)
    }
}

impl Default for Hotplugger {
    fn default() -> Self {
        Self::new(LockPolicy::default())
    }
}
