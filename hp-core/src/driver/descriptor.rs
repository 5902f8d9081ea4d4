//! Controller capabilities and the descriptor a driver registers with
//!
//! A driver hands the registry a [`ControllerDescriptor`]: its name, the
//! peers it declares compatible, and a [`Controller`] implementation that
//! owns the actual hardware state. The registry never mutates a descriptor
//! after registration.

use std::fmt;
use std::sync::Arc;

use hp_error::ControllerError;

use super::name::DriverName;

/// State capabilities a driver exposes to the arbiter
#[cfg_attr(test, mockall::automock)]
pub trait Controller: Send + Sync {
    /// Attempt to switch the driver on or off
    fn set_state(&self, enabled: bool) -> Result<(), ControllerError>;

    /// Current state. Must be side-effect free.
    fn is_enabled(&self) -> bool;

    /// Query-only controllers return false; the arbiter then never calls
    /// [`Controller::set_state`] on them.
    fn can_transition(&self) -> bool {
        true
    }
}

/// Shared handle to a registered descriptor. Identity is pointer identity.
pub type DescriptorRef = Arc<ControllerDescriptor>;

pub struct ControllerDescriptor {
    name: DriverName,
    whitelist: Vec<DriverName>,
    controller: Box<dyn Controller>,
}

impl ControllerDescriptor {
    pub fn new(name: &str, controller: impl Controller + 'static) -> Self {
        Self {
            name: DriverName::new(name),
            whitelist: Vec::new(),
            controller: Box::new(controller),
        }
    }

    /// Declare the peers this driver can run alongside
    pub fn with_whitelist<I, S>(mut self, peers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.whitelist = peers
            .into_iter()
            .map(|p| DriverName::new(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        self
    }

    pub fn into_ref(self) -> DescriptorRef {
        Arc::new(self)
    }

    pub fn name(&self) -> &DriverName {
        &self.name
    }

    pub fn whitelist(&self) -> &[DriverName] {
        &self.whitelist
    }

    pub fn has_whitelist(&self) -> bool {
        !self.whitelist.is_empty()
    }

    /// Whether this driver lists `peer` as compatible
    pub fn declares(&self, peer: &str) -> bool {
        self.whitelist.iter().any(|w| w.matches(peer))
    }

    pub fn is_enabled(&self) -> bool {
        self.controller.is_enabled()
    }

    pub fn can_transition(&self) -> bool {
        self.controller.can_transition()
    }

    pub(crate) fn set_state(&self, enabled: bool) -> Result<(), ControllerError> {
        self.controller.set_state(enabled)
    }

    /// Whether two handles refer to the same registered descriptor
    pub fn same(a: &DescriptorRef, b: &DescriptorRef) -> bool {
        Arc::ptr_eq(a, b)
    }

    /// Multi-line diagnostic dump
    pub fn inspect(&self) -> String {
        let whitelist = if self.whitelist.is_empty() {
            "none".to_string()
        } else {
            self.whitelist
                .iter()
                .map(|w| w.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "---------------- {} ----------------\n\
             address: {:p}\n\
             name: {}\n\
             can_transition: {}\n\
             enabled: {}\n\
             whitelist: {}",
            self.name,
            self as *const Self,
            self.name,
            self.can_transition(),
            self.is_enabled(),
            whitelist
        )
    }
}

impl fmt::Debug for ControllerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerDescriptor")
            .field("name", &self.name)
            .field("whitelist", &self.whitelist)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_mock(enabled: bool) -> MockController {
        let mut mock = MockController::new();
        mock.expect_is_enabled().return_const(enabled);
        mock.expect_can_transition().return_const(true);
        mock
    }

    #[test]
    fn test_whitelist_drops_empty_entries() {
        let d = ControllerDescriptor::new("alpha", quiet_mock(false))
            .with_whitelist(["beta", "", "Gamma"]);
        assert_eq!(d.whitelist().len(), 2);
        assert!(d.declares("BETA"));
        assert!(d.declares("gamma"));
        assert!(!d.declares("delta"));
    }

    #[test]
    fn test_identity_is_pointer_identity() {
        let a = ControllerDescriptor::new("same", quiet_mock(false)).into_ref();
        let b = ControllerDescriptor::new("same", quiet_mock(false)).into_ref();
        assert!(ControllerDescriptor::same(&a, &a.clone()));
        assert!(!ControllerDescriptor::same(&a, &b));
    }

    #[test]
    fn test_inspect_lists_capabilities() {
        let d = ControllerDescriptor::new("alpha", quiet_mock(true)).with_whitelist(["beta"]);
        let dump = d.inspect();
        assert!(dump.contains("name: alpha"));
        assert!(dump.contains("enabled: true"));
        assert!(dump.contains("whitelist: beta"));
    }
}
