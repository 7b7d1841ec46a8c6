#![forbid(unsafe_code)]

//! Explicit "in use" marks for value objects.
//!
//! Signals only hold weak references to method receivers. An object whose
//! only owners are weak handlers would be dropped immediately; pinning it in
//! a [`PinRegistry`] keeps a strong reference until the returned
//! [`PinGuard`] is released or dropped.
//!
//! The registry is owned by whoever builds the value objects and passed
//! down, rather than being process-wide.
//!
//! # Invariants
//!
//! 1. An object is pinned at most once per registry; a second `pin` is
//!    [`Error::AlreadyPinned`].
//! 2. Each pin is undone exactly once, by its guard.

use std::any::{Any, type_name};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use tracing::debug;

use crate::error::{Error, Result};

type Pins = RefCell<AHashMap<usize, Rc<dyn Any>>>;

#[derive(Clone, Default)]
pub struct PinRegistry {
    pins: Rc<Pins>,
}

fn pin_key<V>(object: &Rc<V>) -> usize {
    Rc::as_ptr(object).cast::<()>() as usize
}

impl PinRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `object` alive until the returned guard goes away.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyPinned`] if `object` is pinned in this registry.
    pub fn pin<V: Any>(&self, object: &Rc<V>) -> Result<PinGuard> {
        let key = pin_key(object);
        let mut pins = self.pins.borrow_mut();
        if pins.contains_key(&key) {
            return Err(Error::AlreadyPinned {
                type_name: type_name::<V>(),
            });
        }
        pins.insert(key, Rc::clone(object) as Rc<dyn Any>);
        debug!(object = type_name::<V>(), pinned = pins.len(), "pinned");
        Ok(PinGuard {
            pins: Rc::downgrade(&self.pins),
            key,
            type_name: type_name::<V>(),
        })
    }

    #[must_use]
    pub fn is_pinned<V: Any>(&self, object: &Rc<V>) -> bool {
        self.pins.borrow().contains_key(&pin_key(object))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pins.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pins.borrow().is_empty()
    }
}

impl fmt::Debug for PinRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinRegistry")
            .field("pinned", &self.pins.borrow().len())
            .finish()
    }
}

/// Holds one pin. Releasing or dropping it unpins the object.
#[must_use = "dropping a PinGuard unpins the object immediately"]
pub struct PinGuard {
    pins: Weak<Pins>,
    key: usize,
    type_name: &'static str,
}

impl PinGuard {
    /// Unpin now. Same as dropping the guard.
    pub fn release(self) {}

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        let Some(pins) = self.pins.upgrade() else {
            return;
        };
        let removed = pins.borrow_mut().remove(&self.key);
        debug!(object = self.type_name, "unpinned");
        // Dropping the object may release other guards.
        drop(removed);
    }
}

impl fmt::Debug for PinGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinGuard")
            .field("type_name", &self.type_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn pin_keeps_object_alive() {
        let registry = PinRegistry::new();
        let object = Rc::new(5u32);
        let weak = Rc::downgrade(&object);

        let guard = registry.pin(&object).unwrap();
        drop(object);
        assert!(weak.upgrade().is_some());
        assert_eq!(registry.len(), 1);

        guard.release();
        assert!(weak.upgrade().is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn double_pin_is_rejected() {
        let registry = PinRegistry::new();
        let object = Rc::new("x");
        let _guard = registry.pin(&object).unwrap();

        assert!(matches!(
            registry.pin(&object),
            Err(Error::AlreadyPinned { .. })
        ));
        assert!(registry.is_pinned(&object));
    }

    #[test]
    fn repin_after_release() {
        let registry = PinRegistry::new();
        let object = Rc::new(1i64);
        registry.pin(&object).unwrap().release();
        assert!(!registry.is_pinned(&object));

        let _again = registry.pin(&object).unwrap();
        assert!(registry.is_pinned(&object));
    }

    #[test]
    fn guard_outliving_registry_is_harmless() {
        let registry = PinRegistry::new();
        let object = Rc::new(7u32);
        let guard = registry.pin(&object).unwrap();
        drop(registry);
        drop(guard);
        assert_eq!(Rc::strong_count(&object), 1);
    }

    #[test]
    fn registries_are_independent() {
        let first = PinRegistry::new();
        let second = PinRegistry::new();
        let object = Rc::new(0u8);

        let _a = first.pin(&object).unwrap();
        let _b = second.pin(&object).unwrap();
        assert!(first.is_pinned(&object));
        assert!(second.is_pinned(&object));
    }

    #[test]
    #[traced_test]
    fn pin_and_unpin_are_logged() {
        let registry = PinRegistry::new();
        let object = Rc::new(3u16);
        registry.pin(&object).unwrap().release();
        assert!(logs_contain("pinned"));
        assert!(logs_contain("unpinned"));
    }
}
