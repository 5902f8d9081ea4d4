//! Ordered, lock-guarded collection of registered drivers
//!
//! Entries keep registration order. Every mutation and every walk that may
//! change driver state runs under the single registry lock.

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use hp_error::{HotplugError, Result};

use super::state::change_state;
use crate::driver::{ControllerDescriptor, DescriptorRef};

#[derive(Debug, Default)]
pub struct Registry {
    entries: Mutex<Vec<DescriptorRef>>,
}

/// Exclusive view of the registry, held for the duration of a walk
pub struct RegistryGuard<'a> {
    entries: MutexGuard<'a, Vec<DescriptorRef>>,
}

impl<'a> RegistryGuard<'a> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in registration order
    pub fn iter(&self) -> impl Iterator<Item = &DescriptorRef> {
        self.entries.iter()
    }

    /// Case-insensitive lookup over the bounded name prefix
    pub fn find_by_name(&self, name: &str) -> Option<DescriptorRef> {
        let found = self.entries.iter().find(|d| d.name().matches(name)).cloned();
        if found.is_none() {
            debug!("No driver matches \"{}\"", name);
        }
        found
    }

    pub fn find_by_identity(&self, descriptor: &DescriptorRef) -> Option<DescriptorRef> {
        self.entries
            .iter()
            .find(|d| ControllerDescriptor::same(d, descriptor))
            .cloned()
    }

    pub fn contains(&self, descriptor: &DescriptorRef) -> bool {
        self.find_by_identity(descriptor).is_some()
    }

    /// Invoke `action` on every entry satisfying `predicate`, in order
    pub fn for_each<P, A>(&self, mut predicate: P, mut action: A)
    where
        P: FnMut(&DescriptorRef) -> bool,
        A: FnMut(&DescriptorRef),
    {
        for d in self.entries.iter() {
            if predicate(d) {
                action(d);
            }
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the registry lock is available
    pub fn lock(&self) -> RegistryGuard<'_> {
        RegistryGuard {
            entries: self.entries.lock(),
        }
    }

    /// Take the registry lock only if it is free right now
    pub fn try_lock(&self) -> Option<RegistryGuard<'_>> {
        self.entries
            .try_lock()
            .map(|entries| RegistryGuard { entries })
    }

    /// Append a descriptor.
    ///
    /// Re-registering the same descriptor is a no-op. A different descriptor
    /// under an existing name is rejected.
    pub fn register(&self, descriptor: &DescriptorRef) -> Result<()> {
        if descriptor.name().is_empty() {
            return Err(HotplugError::invalid_argument("driver name is empty"));
        }
        debug!("{}", descriptor.inspect());

        let mut entries = self.entries.lock();
        if let Some(existing) = entries.iter().find(|d| d.name() == descriptor.name()) {
            if ControllerDescriptor::same(existing, descriptor) {
                debug!("Driver \"{}\" already registered", descriptor.name());
                return Ok(());
            }
            debug!("A driver with name \"{}\" exists!", descriptor.name());
            return Err(HotplugError::DuplicateName(descriptor.name().to_string()));
        }

        entries.push(descriptor.clone());
        info!("Driver \"{}\" registered", descriptor.name());
        Ok(())
    }

    /// Force the driver off and remove it. Returns false if it was not
    /// registered.
    ///
    /// Only the exact descriptor is removed; another driver that happens to
    /// share its name stays.
    pub fn unregister(&self, descriptor: &DescriptorRef) -> bool {
        let mut entries = self.entries.lock();
        let Some(pos) = entries
            .iter()
            .position(|d| ControllerDescriptor::same(d, descriptor))
        else {
            if entries.iter().any(|d| d.name() == descriptor.name()) {
                warn!(
                    "Refusing to unregister \"{}\": the registered driver with that name is a different instance",
                    descriptor.name()
                );
            }
            return false;
        };

        if let Err(e) = change_state(None, descriptor, false) {
            warn!(
                "Driver \"{}\" failed to disable on removal: {}",
                descriptor.name(),
                e
            );
        }
        entries.remove(pos);
        info!("Removing \"{}\" driver from list", descriptor.name());
        true
    }

    pub fn find_by_name(&self, name: &str) -> Option<DescriptorRef> {
        self.lock().find_by_name(name)
    }

    pub fn find_by_identity(&self, descriptor: &DescriptorRef) -> Option<DescriptorRef> {
        self.lock().find_by_identity(descriptor)
    }

    pub fn count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Locked, ordered iteration. See [`RegistryGuard::for_each`].
    pub fn for_each<P, A>(&self, predicate: P, action: A)
    where
        P: FnMut(&DescriptorRef) -> bool,
        A: FnMut(&DescriptorRef),
    {
        self.lock().for_each(predicate, action)
    }

    /// Names in registration order
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.for_each(|_| true, |d| names.push(d.name().to_string()));
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{FlagController, MockController};
    use hp_error::ControllerError;

    fn flag(name: &str, enabled: bool) -> (DescriptorRef, FlagController) {
        let f = FlagController::new(enabled);
        (ControllerDescriptor::new(name, f.clone()).into_ref(), f)
    }

    #[test]
    fn test_register_keeps_insertion_order() {
        let reg = Registry::new();
        for name in ["c", "a", "b"] {
            reg.register(&flag(name, false).0).unwrap();
        }
        assert_eq!(reg.names(), vec!["c", "a", "b"]);
        assert_eq!(reg.count(), 3);
    }

    #[test]
    fn test_register_same_descriptor_twice_is_noop() {
        let reg = Registry::new();
        let (d, _) = flag("alpha", false);
        reg.register(&d).unwrap();
        reg.register(&d).unwrap();
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn test_register_rejects_different_descriptor_same_name() {
        let reg = Registry::new();
        let (a, _) = flag("alpha", false);
        let (b, _) = flag("ALPHA", false);
        reg.register(&a).unwrap();
        assert!(matches!(reg.register(&b), Err(HotplugError::DuplicateName(_))));
        assert_eq!(reg.count(), 1);
        assert!(ControllerDescriptor::same(&reg.find_by_name("alpha").unwrap(), &a));
    }

    #[test]
    fn test_find_by_identity_ignores_namesakes() {
        let reg = Registry::new();
        let (registered, _) = flag("alpha", true);
        let (namesake, _) = flag("alpha", true);
        reg.register(&registered).unwrap();

        let found = reg.find_by_identity(&registered).unwrap();
        assert!(ControllerDescriptor::same(&found, &registered));
        assert!(reg.find_by_identity(&namesake).is_none());
        assert!(reg.find_by_name("ALPHA").is_some());

        reg.unregister(&registered);
        assert!(reg.find_by_identity(&registered).is_none());
    }

    #[test]
    fn test_register_rejects_empty_name() {
        let reg = Registry::new();
        let (d, _) = flag("", false);
        assert!(matches!(reg.register(&d), Err(HotplugError::InvalidArgument(_))));
    }

    #[test]
    fn test_unregister_disables_then_removes() {
        let reg = Registry::new();
        let (a, fa) = flag("alpha", true);
        let (b, _) = flag("beta", false);
        reg.register(&a).unwrap();
        reg.register(&b).unwrap();

        assert!(reg.unregister(&a));
        assert!(!fa.is_enabled());
        assert_eq!(reg.count(), 1);
        assert!(reg.find_by_name("alpha").is_none());
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let reg = Registry::new();
        let (a, fa) = flag("alpha", true);
        assert!(!reg.unregister(&a));
        assert!(fa.is_enabled());
    }

    #[test]
    fn test_unregister_never_removes_other_instance() {
        let reg = Registry::new();
        let (registered, fr) = flag("alpha", true);
        let (impostor, fi) = flag("alpha", true);
        reg.register(&registered).unwrap();

        assert!(!reg.unregister(&impostor));
        assert_eq!(reg.count(), 1);
        assert!(fr.is_enabled());
        assert!(fi.is_enabled());
    }

    #[test]
    fn test_unregister_removes_even_if_disable_fails() {
        let mut mock = MockController::new();
        mock.expect_can_transition().return_const(true);
        mock.expect_is_enabled().return_const(true);
        mock.expect_set_state()
            .returning(|_| Err(ControllerError::hardware("busy")));
        let d = ControllerDescriptor::new("flaky", mock).into_ref();

        let reg = Registry::new();
        reg.register(&d).unwrap();
        assert!(reg.unregister(&d));
        assert_eq!(reg.count(), 0);
    }

    #[test]
    fn test_find_by_name_is_case_insensitive_and_bounded() {
        let reg = Registry::new();
        let long = "n".repeat(40);
        let (d, _) = flag(&long, false);
        reg.register(&d).unwrap();

        assert!(reg.find_by_name(&long.to_uppercase()).is_some());
        assert!(reg.find_by_name(&"n".repeat(31)).is_some());
        assert!(reg.find_by_name("n").is_none());
    }

    #[test]
    fn test_for_each_filters() {
        let reg = Registry::new();
        reg.register(&flag("on1", true).0).unwrap();
        reg.register(&flag("off", false).0).unwrap();
        reg.register(&flag("on2", true).0).unwrap();

        let mut seen = Vec::new();
        reg.for_each(|d| d.is_enabled(), |d| seen.push(d.name().to_string()));
        assert_eq!(seen, vec!["on1", "on2"]);
    }

    #[test]
    fn test_try_lock_fails_while_held() {
        let reg = Registry::new();
        let guard = reg.lock();
        assert!(reg.try_lock().is_none());
        drop(guard);
        assert!(reg.try_lock().is_some());
    }
}
