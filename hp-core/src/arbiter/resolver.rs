//! Conflict resolution: make room for a requesting driver
//!
//! Walks the registry in registration order and switches off every running
//! peer that is not mutually whitelisted with the requester. The walk is
//! best-effort: a peer that refuses to turn off is recorded and the walk
//! moves on.
//!
//! Lock acquisition never blocks. The resolver try-locks the registry a
//! bounded number of times and reports `Busy` when the budget runs out,
//! so a caller stuck behind a long walk (or re-entering from inside one)
//! fails fast instead of deadlocking.

use std::thread;
use std::time::Duration;

use hp_error::{HotplugError, PeerFailure, Result};
use tracing::{debug, warn};

use super::gate::ArbitrationGate;
use super::registry::{Registry, RegistryGuard};
use super::state::{change_state, Transition};
use super::whitelist::{evaluate, Verdict};
use crate::constants::lock::{DEFAULT_BACKOFF, DEFAULT_RETRY_BUDGET};
use crate::driver::{ControllerDescriptor, DescriptorRef};

/// How hard a resolution tries to get the registry lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    /// Try-lock attempts before giving up with `Busy` (at least one is made)
    pub retry_budget: u32,
    /// Sleep between contended attempts
    pub backoff: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            retry_budget: DEFAULT_RETRY_BUDGET,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// What a successful resolution did, by peer name in registration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    pub requester: String,
    /// Peers switched off by this walk
    pub disabled: Vec<String>,
    /// Peers left running because of a mutual whitelist
    pub exempt: Vec<String>,
    /// Peers that were already off or cannot change state
    pub untouched: Vec<String>,
}

impl ResolutionReport {
    fn new(requester: &ControllerDescriptor) -> Self {
        Self {
            requester: requester.name().to_string(),
            ..Self::default()
        }
    }
}

pub struct ConflictResolver<'a> {
    registry: &'a Registry,
    gate: &'a ArbitrationGate,
    policy: LockPolicy,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(registry: &'a Registry, gate: &'a ArbitrationGate, policy: LockPolicy) -> Self {
        Self {
            registry,
            gate,
            policy,
        }
    }

    fn acquire(&self) -> Result<RegistryGuard<'a>> {
        let attempts = self.policy.retry_budget.max(1);
        for attempt in 1..=attempts {
            if let Some(guard) = self.registry.try_lock() {
                return Ok(guard);
            }
            debug!(
                "another \"disabling\" is in progress (attempt {}/{})",
                attempt, attempts
            );
            if attempt < attempts && !self.policy.backoff.is_zero() {
                thread::sleep(self.policy.backoff);
            }
        }
        Err(HotplugError::Busy { attempts })
    }

    /// Disable every running peer of `requester` that is not mutually
    /// whitelisted with it.
    ///
    /// Fails with `Disabled` when the gate is closed (checked before and
    /// after taking the lock, and before each transition), `Busy` when the
    /// lock stays contended, `InvalidArgument` when `requester` is not
    /// registered, and `Unresolved` when at least one peer failed to turn
    /// off. Every peer is visited regardless of individual failures.
    pub fn resolve(&self, requester: &DescriptorRef) -> Result<ResolutionReport> {
        self.gate.ensure_open("resolve_conflicts")?;

        let guard = self.acquire()?;
        self.gate.ensure_open("resolve_conflicts")?;

        if !guard.contains(requester) {
            debug!(
                "driver \"{}\" is unregistered, aborting...",
                requester.name()
            );
            return Err(HotplugError::invalid_argument(format!(
                "driver \"{}\" is not registered",
                requester.name()
            )));
        }

        debug!(
            "driver \"{}\" requests conflict resolution",
            requester.name()
        );

        let mut report = ResolutionReport::new(requester);
        let mut failures: Vec<PeerFailure> = Vec::new();

        for peer in guard.iter() {
            if ControllerDescriptor::same(peer, requester) {
                continue;
            }

            match evaluate(requester, peer) {
                Verdict::Exempt => {
                    debug!(
                        "driver \"{}\" and \"{}\" whitelist each other",
                        peer.name(),
                        requester.name()
                    );
                    report.exempt.push(peer.name().to_string());
                    continue;
                }
                Verdict::OneSided => {
                    debug!(
                        "driver \"{}\" is whitelisted in \"{}\" but not the other way around",
                        peer.name(),
                        requester.name()
                    );
                }
                _ => {}
            }

            // emergency stop: honour a gate closed mid-walk
            if let Err(e) = self.gate.ensure_open("resolve_conflicts") {
                warn!(
                    "resolution for \"{}\" stopped before \"{}\": disabled [{}], failed [{}]",
                    requester.name(),
                    peer.name(),
                    report.disabled.join(", "),
                    failures
                        .iter()
                        .map(|f| f.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                return Err(e);
            }

            match change_state(Some(requester), peer, false) {
                Ok(Transition::Applied) => report.disabled.push(peer.name().to_string()),
                Ok(Transition::NotApplicable(_)) => report.untouched.push(peer.name().to_string()),
                Err(error) => {
                    warn!(
                        "driver \"{}\" could not be disabled for \"{}\": {}",
                        peer.name(),
                        requester.name(),
                        error
                    );
                    failures.push(PeerFailure {
                        name: peer.name().to_string(),
                        error,
                    });
                }
            }
        }
        drop(guard);

        debug!("disable_conflicts is done for \"{}\"", requester.name());

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(HotplugError::Unresolved {
                requester: report.requester,
                failures,
            })
        }
    }
}
