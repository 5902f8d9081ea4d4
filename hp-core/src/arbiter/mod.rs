//! Arbitration: registry, transitions, whitelists, conflict resolution, gate

pub mod gate;
pub mod hotplugger;
pub mod registry;
pub mod resolver;
pub mod state;
pub mod whitelist;

pub use gate::ArbitrationGate;
pub use hotplugger::{global, init_global, Hotplugger};
pub use registry::{Registry, RegistryGuard};
pub use resolver::{ConflictResolver, LockPolicy, ResolutionReport};
pub use state::{change_state, SkipReason, Transition};
pub use whitelist::{evaluate, is_exempt, Verdict};
