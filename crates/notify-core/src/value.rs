#![forbid(unsafe_code)]

//! Value objects: a current value plus a lazily created "changed" signal.
//!
//! # Design
//!
//! Implementors of [`ValueObject`] own a [`ChangedChannel`] and call
//! [`ValueObject::changed`] exactly when their value really changes. The
//! channel allocates its [`Signal`] on first access, so objects nobody
//! observes never pay for one.
//!
//! Mutability is an explicit capability ([`ValueObject::is_mutable`]); the
//! default `set` reports [`Error::NotMutable`].
//!
//! # Synchronization
//!
//! [`Synchronize::synchronize`] couples two mutable objects held in `Rc`:
//!
//! 1. `self` takes `other`'s current value (through the mediator's forward
//!    transform, if any);
//! 2. `other`'s signal gets a handler calling `self.set`;
//! 3. only then does `self`'s signal get a handler calling `other.set`
//!    (through the back transform).
//!
//! Both handlers are weak bindings, so the pair never keeps each other
//! alive. Feedback stops because `set` with the current value is a no-op
//! that does not call `changed`.
//!
//! # Failure Modes
//!
//! - **Handler error during `changed`**: propagates to the caller of `set`.
//!   The new value is already stored and earlier handlers have seen it;
//!   `changed` is not transactional across handlers.
//! - **Mediator rejects a value**: the error surfaces from `set` or
//!   `synchronize` unchanged and the target keeps its value.

use std::any::{Any, type_name};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::bind::Callable;
use crate::error::{Error, Result};
use crate::mediator::Mediator;
use crate::signal::{Handler, Signal, SignalConfig};

/// Lazily created "changed" signal of a value object.
///
/// # Invariants
///
/// 1. At most one signal exists at a time and it is reused until removed.
/// 2. A signal with handlers is never removed.
pub struct ChangedChannel<T> {
    signal: RefCell<Option<Rc<Signal<T>>>>,
    config: SignalConfig,
}

impl<T: Clone + 'static> Default for ChangedChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> ChangedChannel<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SignalConfig::default())
    }

    /// Channel whose signal will be created with `config`.
    #[must_use]
    pub fn with_config(config: SignalConfig) -> Self {
        Self {
            signal: RefCell::new(None),
            config,
        }
    }

    /// The signal, created on first call.
    pub fn signal(&self) -> Rc<Signal<T>> {
        let mut slot = self.signal.borrow_mut();
        let signal = slot.get_or_insert_with(|| {
            debug!("creating changed signal");
            Rc::new(Signal::with_config(self.config))
        });
        Rc::clone(signal)
    }

    #[must_use]
    pub fn has_signal(&self) -> bool {
        self.signal.borrow().is_some()
    }

    /// Drop the current signal if it is `signal` and has no handlers.
    /// Returns whether it was removed.
    pub fn remove_signal(&self, signal: &Rc<Signal<T>>) -> bool {
        let mut slot = self.signal.borrow_mut();
        match slot.as_ref() {
            Some(current) if Rc::ptr_eq(current, signal) && !current.has_handlers() => {
                *slot = None;
                debug!("removed changed signal");
                true
            }
            _ => false,
        }
    }

    /// Fire the signal, if one exists. Always `Ok(true)` unless a handler
    /// fails.
    ///
    /// # Errors
    ///
    /// The first handler error.
    pub fn emit(&self, new_value: &T) -> Result<bool> {
        // Release the borrow first: handlers may touch this channel.
        let signal = self.signal.borrow().clone();
        if let Some(signal) = signal {
            signal.emit(new_value)?;
        }
        Ok(true)
    }

    /// Handler count; 0 if no signal has been created.
    #[must_use]
    pub fn count_handlers(&self) -> usize {
        let signal = self.signal.borrow().clone();
        signal.map_or(0, |s| s.count_handlers())
    }
}

impl<T> fmt::Debug for ChangedChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangedChannel")
            .field("signal", &self.signal.borrow())
            .finish()
    }
}

/// An object with a current value and change notification.
pub trait ValueObject: Any {
    type Value: Clone + PartialEq + fmt::Debug + 'static;

    fn channel(&self) -> &ChangedChannel<Self::Value>;

    fn get(&self) -> Self::Value;

    /// Set the value. Returns whether it changed.
    ///
    /// Implementations must return `Ok(false)` without calling
    /// [`ValueObject::changed`] when `value` equals the current value.
    ///
    /// # Errors
    ///
    /// [`Error::NotMutable`] unless overridden; [`Error::InvalidValue`] if
    /// `value` is unsuitable; handler errors from `changed`.
    fn set(&self, value: Self::Value) -> Result<bool> {
        let _ = value;
        Err(Error::not_mutable(self.describe()))
    }

    fn is_mutable(&self) -> bool {
        false
    }

    fn signal_changed(&self) -> Rc<Signal<Self::Value>> {
        self.channel().signal()
    }

    /// Notify observers of `new_value`. Call exactly when the value changed.
    ///
    /// # Errors
    ///
    /// The first handler error.
    fn changed(&self, new_value: &Self::Value) -> Result<bool> {
        self.channel().emit(new_value)
    }

    /// Call `handler` with the current value now, then on every change.
    ///
    /// # Errors
    ///
    /// Errors from the immediate call or from connecting.
    fn store(&self, handler: Handler<Self::Value>) -> Result<()> {
        handler.call(&self.get())?;
        self.signal_changed().connect(handler)
    }

    /// [`ValueObject::store`] with pre-bound arguments.
    ///
    /// # Errors
    ///
    /// Same as [`ValueObject::store`].
    fn store_with<X>(&self, handler: Handler<(X, Self::Value)>, args: X) -> Result<()>
    where
        X: Clone + PartialEq + 'static,
    {
        handler.call(&(args.clone(), self.get()))?;
        self.signal_changed().connect_with(handler, args)
    }

    /// Like [`ValueObject::store`], but does nothing if `handler` is already
    /// connected. Returns whether it connected.
    ///
    /// # Errors
    ///
    /// Same as [`ValueObject::store`].
    fn store_safe(&self, handler: Handler<Self::Value>) -> Result<bool> {
        let signal = self.signal_changed();
        if signal.is_connected(&handler) {
            return Ok(false);
        }
        handler.call(&self.get())?;
        signal.connect(handler)?;
        Ok(true)
    }

    /// [`ValueObject::store_safe`] with pre-bound arguments.
    ///
    /// # Errors
    ///
    /// Same as [`ValueObject::store`].
    fn store_safe_with<X>(&self, handler: Handler<(X, Self::Value)>, args: X) -> Result<bool>
    where
        X: Clone + PartialEq + 'static,
    {
        let signal = self.signal_changed();
        if signal.is_connected_with(&handler, &args) {
            return Ok(false);
        }
        handler.call(&(args.clone(), self.get()))?;
        signal.connect_with(handler, args)?;
        Ok(true)
    }

    /// Short type name used by [`ValueObject::describe`].
    fn type_label(&self) -> &'static str {
        let full = type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base)
    }

    /// `<Label: value>`, plus the handler count when there are handlers.
    fn describe(&self) -> String {
        let value = self.get();
        match self.channel().count_handlers() {
            0 => format!("<{}: {:?}>", self.type_label(), value),
            1 => format!("<{}: {:?} (1 handler)>", self.type_label(), value),
            n => format!("<{}: {:?} ({n} handlers)>", self.type_label(), value),
        }
    }
}

// ---------------------------------------------------------------------------
// Synchronization edges
// ---------------------------------------------------------------------------

fn set_from<V: ValueObject>(target: &V, value: &V::Value) -> Result<()> {
    target.set(value.clone()).map(|_| ())
}

fn set_forward<V: ValueObject, X: 'static>(
    target: &V,
    (mediator, value): &(Mediator<X, V::Value>, X),
) -> Result<()> {
    target.set(mediator.forward(value)?).map(|_| ())
}

fn set_back<V: ValueObject, Y: 'static>(
    target: &V,
    (mediator, value): &(Mediator<V::Value, Y>, Y),
) -> Result<()> {
    target.set(mediator.back(value)?).map(|_| ())
}

fn setter<V: ValueObject>(target: &Rc<V>) -> Handler<V::Value> {
    Callable::method(target, set_from::<V>)
}

fn forward_setter<V: ValueObject, X: 'static>(
    target: &Rc<V>,
) -> Handler<(Mediator<X, V::Value>, X)> {
    Callable::method(target, set_forward::<V, X>)
}

fn back_setter<V: ValueObject, Y: 'static>(target: &Rc<V>) -> Handler<(Mediator<V::Value, Y>, Y)> {
    Callable::method(target, set_back::<V, Y>)
}

fn require_mutable<V: ValueObject + ?Sized>(object: &V) -> Result<()> {
    if object.is_mutable() {
        Ok(())
    } else {
        Err(Error::not_mutable(object.describe()))
    }
}

/// Two-way synchronization between shared value objects.
pub trait Synchronize {
    type Value: Clone + PartialEq + fmt::Debug + 'static;

    /// Keep `self` and `other` at the same value, starting from `other`'s.
    ///
    /// # Errors
    ///
    /// [`Error::NotMutable`] if either side is not mutable; errors from
    /// setting `self` to `other`'s value.
    fn synchronize<W>(&self, other: &Rc<W>) -> Result<()>
    where
        W: ValueObject<Value = Self::Value>;

    /// Like [`Synchronize::synchronize`], with values from `other` passed
    /// through `mediator.forward` and values from `self` through
    /// `mediator.back`.
    ///
    /// # Errors
    ///
    /// As [`Synchronize::synchronize`], plus transform errors.
    fn synchronize_with<W>(&self, other: &Rc<W>, mediator: &Mediator<W::Value, Self::Value>) -> Result<()>
    where
        W: ValueObject;

    /// Like [`Synchronize::synchronize`], but does not add feedback edges
    /// that already exist.
    ///
    /// # Errors
    ///
    /// Same as [`Synchronize::synchronize`].
    fn synchronize_safe<W>(&self, other: &Rc<W>) -> Result<()>
    where
        W: ValueObject<Value = Self::Value>;

    /// # Errors
    ///
    /// Same as [`Synchronize::synchronize_with`].
    fn synchronize_safe_with<W>(
        &self,
        other: &Rc<W>,
        mediator: &Mediator<W::Value, Self::Value>,
    ) -> Result<()>
    where
        W: ValueObject;

    /// Remove both edges added by [`Synchronize::synchronize`]. Returns
    /// whether anything was disconnected.
    fn desynchronize<W>(&self, other: &Rc<W>) -> bool
    where
        W: ValueObject<Value = Self::Value>;

    fn desynchronize_with<W>(&self, other: &Rc<W>, mediator: &Mediator<W::Value, Self::Value>) -> bool
    where
        W: ValueObject;
}

impl<V: ValueObject> Synchronize for Rc<V> {
    type Value = V::Value;

    fn synchronize<W>(&self, other: &Rc<W>) -> Result<()>
    where
        W: ValueObject<Value = V::Value>,
    {
        require_mutable(&**self)?;
        require_mutable(&**other)?;
        debug!(this = self.type_label(), other = other.type_label(), "synchronizing");

        // Order matters: other -> self must be wired before self -> other.
        other.store(setter(self))?;
        self.signal_changed().connect(setter(other))
    }

    fn synchronize_with<W>(&self, other: &Rc<W>, mediator: &Mediator<W::Value, V::Value>) -> Result<()>
    where
        W: ValueObject,
    {
        require_mutable(&**self)?;
        require_mutable(&**other)?;
        debug!(this = self.type_label(), other = other.type_label(), "synchronizing through mediator");

        other.store_with(forward_setter(self), mediator.clone())?;
        self.signal_changed()
            .connect_with(back_setter(other), mediator.clone())
    }

    fn synchronize_safe<W>(&self, other: &Rc<W>) -> Result<()>
    where
        W: ValueObject<Value = V::Value>,
    {
        require_mutable(&**self)?;
        require_mutable(&**other)?;

        let forward = other.store_safe(setter(self))?;
        let back = self.signal_changed().connect_safe(setter(other))?;
        debug!(forward, back, "synchronized (safe)");
        Ok(())
    }

    fn synchronize_safe_with<W>(
        &self,
        other: &Rc<W>,
        mediator: &Mediator<W::Value, V::Value>,
    ) -> Result<()>
    where
        W: ValueObject,
    {
        require_mutable(&**self)?;
        require_mutable(&**other)?;

        let forward = other.store_safe_with(forward_setter(self), mediator.clone())?;
        let back = self
            .signal_changed()
            .connect_safe_with(back_setter(other), mediator.clone())?;
        debug!(forward, back, "synchronized through mediator (safe)");
        Ok(())
    }

    fn desynchronize<W>(&self, other: &Rc<W>) -> bool
    where
        W: ValueObject<Value = V::Value>,
    {
        let forward = other.signal_changed().disconnect(&setter(self));
        let back = self.signal_changed().disconnect(&setter(other));
        forward || back
    }

    fn desynchronize_with<W>(&self, other: &Rc<W>, mediator: &Mediator<W::Value, V::Value>) -> bool
    where
        W: ValueObject,
    {
        let forward = other
            .signal_changed()
            .disconnect_with(&forward_setter(self), mediator);
        let back = self
            .signal_changed()
            .disconnect_with(&back_setter(other), mediator);
        forward || back
    }
}
