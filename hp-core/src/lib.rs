//! Hotplugger Core Library
//!
//! Keeps hardware feature drivers that must not run together from running
//! together. Drivers register a descriptor; when one of them needs the
//! hardware to itself it asks the arbiter to resolve conflicts, and every
//! running peer that has not mutually whitelisted it is switched off.
//!
//! # Module Structure
//!
//! - `driver/` - Driver names, descriptors and ready-made controllers
//! - `arbiter/` - Registry, state transitions, whitelists, resolution, gate
//! - `surface` - Show/store attribute group for operators
//! - `settings` - Persistent arbiter settings
//!
//! # Example
//!
//! ```
//! use hp_core::{ControllerDescriptor, FlagController, Hotplugger};
//!
//! let hp = Hotplugger::default();
//! let a = ControllerDescriptor::new("alucard", FlagController::new(true)).into_ref();
//! let b = ControllerDescriptor::new("msm_hotplug", FlagController::new(true)).into_ref();
//! hp.register(&a).unwrap();
//! hp.register(&b).unwrap();
//!
//! let report = hp.resolve_conflicts(&a).unwrap();
//! assert_eq!(report.disabled, vec!["msm_hotplug"]);
//! assert!(!b.is_enabled());
//! ```

// Grouped modules
pub mod arbiter;
pub mod driver;

// Standalone modules
pub mod constants;
pub mod settings;
pub mod surface;

// Re-export error types
pub use hp_error::{ControllerError, ErrorKind, HotplugError, PeerFailure, Result};

// Re-export arbitration types
pub use arbiter::{
    change_state, evaluate, global, init_global, is_exempt, ArbitrationGate, ConflictResolver,
    Hotplugger, LockPolicy, Registry, RegistryGuard, ResolutionReport, SkipReason, Transition,
    Verdict,
};

// Re-export driver types
pub use driver::{
    names_match, Controller, ControllerDescriptor, DescriptorRef, DriverName, FlagController,
    SysfsController,
};

// Re-export settings and control surface
pub use settings::{
    get_settings_path, load_settings, load_settings_from, save_settings_to, ArbiterSettings,
    ControllerSettings,
};
pub use surface::{Attribute, ControlSurface};
