#![forbid(unsafe_code)]

//! Ordered multicast dispatch.
//!
//! # Design
//!
//! A [`Signal<T, R>`] keeps an ordered list of registrations. Each one holds
//! a handler wrapped according to [`SignalConfig::binding`] (weak by
//! default, so connecting a method never keeps its receiver alive), optional
//! pre-bound arguments, and a block counter.
//!
//! Handlers have the shape [`Handler<T, R>`]: they receive the emitted value
//! by reference and return `Result<R>`. Handlers connected with extra
//! arguments receive `&(args, value)`.
//!
//! # Invariants
//!
//! 1. Dispatch order is registration order.
//! 2. An emit dispatches to the registrations present and unblocked when it
//!    started; registrations added during the emit wait for the next one.
//! 3. A registration is called at most once per emit.
//! 4. Registrations whose receiver is gone are removed permanently, either
//!    when an emit reaches them or on [`Signal::count_handlers`].
//! 5. No `RefCell` borrow is held while a handler runs, so handlers may
//!    connect, disconnect, block, and emit re-entrantly.
//!
//! # Failure Modes
//!
//! - **Handler error**: the remaining handlers of that emit are skipped and
//!   the error is returned to the emitter. Registrations are left intact;
//!   handlers that ran before the failure have already observed the value.
//! - **Inline receiver with a weak policy**: `connect` fails with
//!   [`Error::CannotWeakReference`](crate::Error::CannotWeakReference) and nothing is registered.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::ControlFlow;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::bind::{Binding, BindingKey, Callable, RaisingWeakBinding, Target, WeakBinding};
use crate::error::Result;

/// The shape of a signal handler.
pub type Handler<T, R = ()> = Callable<T, Result<R>>;

/// How a [`Signal`] holds on to method receivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingPolicy {
    /// Keep receivers alive.
    Strong,
    /// Drop the registration silently once the receiver is gone.
    #[default]
    Weak,
    /// Like `Weak`, but direct invocation of a dead binding is an error.
    RaisingWeak,
}

/// Configuration for a [`Signal`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalConfig {
    pub binding: BindingPolicy,
}

impl SignalConfig {
    #[must_use]
    pub fn with_binding(mut self, binding: BindingPolicy) -> Self {
        self.binding = binding;
        self
    }
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

type Fold<R> = Rc<dyn Fn(Option<R>, R) -> ControlFlow<R, R>>;

/// Folds handler results during an emit.
///
/// The fold receives the accumulated value (`None` before the first handler)
/// and the latest result. `Break` stops the emit early.
pub struct Accumulator<R> {
    fold: Fold<R>,
}

impl<R> Clone for Accumulator<R> {
    fn clone(&self) -> Self {
        Self {
            fold: Rc::clone(&self.fold),
        }
    }
}

impl<R: 'static> Accumulator<R> {
    pub fn new(fold: impl Fn(Option<R>, R) -> ControlFlow<R, R> + 'static) -> Self {
        Self {
            fold: Rc::new(fold),
        }
    }

    /// Result of the last handler called.
    #[must_use]
    pub fn last_value() -> Self {
        Self::new(|_, value| ControlFlow::Continue(value))
    }

    fn fold(&self, acc: Option<R>, value: R) -> ControlFlow<R, R> {
        (self.fold)(acc, value)
    }
}

impl Accumulator<bool> {
    /// `true` as soon as one handler returns `true`; stops the emit there.
    #[must_use]
    pub fn any_accepts() -> Self {
        Self::new(|_, accepted| {
            if accepted {
                ControlFlow::Break(true)
            } else {
                ControlFlow::Continue(false)
            }
        })
    }

    /// `false` as soon as one handler returns `false`; stops the emit there.
    #[must_use]
    pub fn all_accept() -> Self {
        Self::new(|_, accepted| {
            if accepted {
                ControlFlow::Continue(true)
            } else {
                ControlFlow::Break(false)
            }
        })
    }
}

impl<R> fmt::Debug for Accumulator<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accumulator").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Registrations
// ---------------------------------------------------------------------------

/// A wrapped handler plus its bound arguments, with the argument type erased.
trait Slot<T, R> {
    /// `Ok(None)` means the receiver is gone.
    fn invoke(&self, value: &T) -> Result<Option<R>>;
    fn is_alive(&self) -> bool;
    fn matches(&self, key: BindingKey, args: Option<&dyn Any>) -> bool;
}

struct PlainSlot<T, R> {
    target: Target<T, Result<R>>,
}

struct ArgSlot<X, T, R> {
    target: Target<(X, T), Result<R>>,
    args: X,
}

impl<T: 'static, R: 'static> Slot<T, R> for PlainSlot<T, R> {
    fn invoke(&self, value: &T) -> Result<Option<R>> {
        self.target.invoke(value)?.transpose()
    }

    fn is_alive(&self) -> bool {
        self.target.is_alive()
    }

    fn matches(&self, key: BindingKey, args: Option<&dyn Any>) -> bool {
        args.is_none() && self.target.key() == key
    }
}

impl<X, T, R> Slot<T, R> for ArgSlot<X, T, R>
where
    X: Clone + PartialEq + 'static,
    T: Clone + 'static,
    R: 'static,
{
    fn invoke(&self, value: &T) -> Result<Option<R>> {
        self.target
            .invoke(&(self.args.clone(), value.clone()))?
            .transpose()
    }

    fn is_alive(&self) -> bool {
        self.target.is_alive()
    }

    fn matches(&self, key: BindingKey, args: Option<&dyn Any>) -> bool {
        self.target.key() == key
            && args.and_then(|a| a.downcast_ref::<X>()) == Some(&self.args)
    }
}

struct Registration<T, R> {
    id: u64,
    slot: Box<dyn Slot<T, R>>,
    blocks: Cell<u32>,
}

impl<T, R> Registration<T, R> {
    fn is_blocked(&self) -> bool {
        self.blocks.get() > 0
    }
}

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// An ordered multicast dispatcher.
///
/// # Invariants
///
/// 1. Each emit calls every live, unblocked registration once, in order.
/// 2. Blocking is counted: two `block` calls need two `unblock` calls.
/// 3. `disconnect` and `block` affect later emits only.
pub struct Signal<T, R = ()> {
    config: SignalConfig,
    accumulator: Option<Accumulator<R>>,
    registrations: RefCell<Vec<Rc<Registration<T, R>>>>,
    next_id: Cell<u64>,
}

impl<T: Clone + 'static, R: 'static> Default for Signal<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static, R: 'static> Signal<T, R> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SignalConfig::default())
    }

    #[must_use]
    pub fn with_config(config: SignalConfig) -> Self {
        Self {
            config,
            accumulator: None,
            registrations: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    #[must_use]
    pub fn with_accumulator(mut self, accumulator: Accumulator<R>) -> Self {
        self.accumulator = Some(accumulator);
        self
    }

    #[must_use]
    pub fn config(&self) -> SignalConfig {
        self.config
    }

    fn wrap<A: 'static>(&self, handler: Callable<A, Result<R>>) -> Result<Target<A, Result<R>>> {
        match self.config.binding {
            BindingPolicy::Strong => Ok(Binding::wrap(handler)),
            BindingPolicy::Weak => WeakBinding::wrap(handler),
            BindingPolicy::RaisingWeak => RaisingWeakBinding::wrap(handler),
        }
    }

    fn push(&self, slot: Box<dyn Slot<T, R>>) {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let mut registrations = self.registrations.borrow_mut();
        registrations.push(Rc::new(Registration {
            id,
            slot,
            blocks: Cell::new(0),
        }));
        trace!(id, handlers = registrations.len(), "handler connected");
    }

    fn find(&self, key: BindingKey, args: Option<&dyn Any>) -> Option<Rc<Registration<T, R>>> {
        self.registrations
            .borrow()
            .iter()
            .find(|r| r.slot.matches(key, args))
            .cloned()
    }

    fn remove_first(&self, key: BindingKey, args: Option<&dyn Any>) -> bool {
        let mut registrations = self.registrations.borrow_mut();
        match registrations.iter().position(|r| r.slot.matches(key, args)) {
            Some(index) => {
                let removed = registrations.remove(index);
                trace!(id = removed.id, "handler disconnected");
                true
            }
            None => false,
        }
    }

    fn remove_id(&self, id: u64) {
        self.registrations.borrow_mut().retain(|r| r.id != id);
    }

    /// Append `handler`. Connecting the same handler twice registers it
    /// twice.
    ///
    /// # Errors
    ///
    /// [`Error::CannotWeakReference`](crate::Error::CannotWeakReference) if
    /// the policy is weak and the receiver cannot be weak-referenced.
    pub fn connect(&self, handler: Handler<T, R>) -> Result<()> {
        let target = self.wrap(handler)?;
        self.push(Box::new(PlainSlot { target }));
        Ok(())
    }

    /// Append `handler` with pre-bound `args`; each emit calls it with
    /// `&(args, value)`.
    ///
    /// # Errors
    ///
    /// Same as [`Signal::connect`].
    pub fn connect_with<X>(&self, handler: Handler<(X, T), R>, args: X) -> Result<()>
    where
        X: Clone + PartialEq + 'static,
    {
        let target = self.wrap(handler)?;
        self.push(Box::new(ArgSlot { target, args }));
        Ok(())
    }

    /// Connect unless an equal registration already exists. Returns whether
    /// it connected.
    ///
    /// # Errors
    ///
    /// Same as [`Signal::connect`].
    pub fn connect_safe(&self, handler: Handler<T, R>) -> Result<bool> {
        if self.is_connected(&handler) {
            return Ok(false);
        }
        self.connect(handler)?;
        Ok(true)
    }

    /// [`Signal::connect_safe`] with pre-bound arguments.
    ///
    /// # Errors
    ///
    /// Same as [`Signal::connect`].
    pub fn connect_safe_with<X>(&self, handler: Handler<(X, T), R>, args: X) -> Result<bool>
    where
        X: Clone + PartialEq + 'static,
    {
        if self.is_connected_with(&handler, &args) {
            return Ok(false);
        }
        self.connect_with(handler, args)?;
        Ok(true)
    }

    /// Remove the first registration of `handler` (without arguments).
    /// Returns whether one was found.
    pub fn disconnect(&self, handler: &Handler<T, R>) -> bool {
        self.remove_first(handler.key(), None)
    }

    pub fn disconnect_with<X>(&self, handler: &Handler<(X, T), R>, args: &X) -> bool
    where
        X: Clone + PartialEq + 'static,
    {
        self.remove_first(handler.key(), Some(args as &dyn Any))
    }

    pub fn disconnect_all(&self) {
        let removed = std::mem::take(&mut *self.registrations.borrow_mut());
        trace!(handlers = removed.len(), "all handlers disconnected");
    }

    #[must_use]
    pub fn is_connected(&self, handler: &Handler<T, R>) -> bool {
        self.find(handler.key(), None).is_some()
    }

    #[must_use]
    pub fn is_connected_with<X>(&self, handler: &Handler<(X, T), R>, args: &X) -> bool
    where
        X: Clone + PartialEq + 'static,
    {
        self.find(handler.key(), Some(args as &dyn Any)).is_some()
    }

    fn block_registration(&self, registration: Option<Rc<Registration<T, R>>>) -> bool {
        match registration {
            Some(r) => {
                r.blocks.set(r.blocks.get() + 1);
                trace!(id = r.id, blocks = r.blocks.get(), "handler blocked");
                true
            }
            None => false,
        }
    }

    fn unblock_registration(&self, registration: Option<Rc<Registration<T, R>>>) -> bool {
        match registration {
            Some(r) if r.is_blocked() => {
                r.blocks.set(r.blocks.get() - 1);
                trace!(id = r.id, blocks = r.blocks.get(), "handler unblocked");
                true
            }
            Some(r) => {
                warn!(id = r.id, "unblock on a handler that is not blocked");
                false
            }
            None => false,
        }
    }

    /// Suspend `handler` until a matching [`Signal::unblock`]. Returns
    /// whether it is connected.
    pub fn block(&self, handler: &Handler<T, R>) -> bool {
        self.block_registration(self.find(handler.key(), None))
    }

    pub fn block_with<X>(&self, handler: &Handler<(X, T), R>, args: &X) -> bool
    where
        X: Clone + PartialEq + 'static,
    {
        self.block_registration(self.find(handler.key(), Some(args as &dyn Any)))
    }

    /// Undo one [`Signal::block`]. Returns `false` if `handler` is not
    /// connected or not blocked.
    pub fn unblock(&self, handler: &Handler<T, R>) -> bool {
        self.unblock_registration(self.find(handler.key(), None))
    }

    pub fn unblock_with<X>(&self, handler: &Handler<(X, T), R>, args: &X) -> bool
    where
        X: Clone + PartialEq + 'static,
    {
        self.unblock_registration(self.find(handler.key(), Some(args as &dyn Any)))
    }

    /// Dispatch `value` to every live, unblocked handler in order.
    ///
    /// Returns the accumulated result if an [`Accumulator`] is configured,
    /// `None` otherwise.
    ///
    /// # Errors
    ///
    /// The first error returned by a handler. Handlers after it are not
    /// called during this emit.
    pub fn emit(&self, value: &T) -> Result<Option<R>> {
        let snapshot: Vec<Rc<Registration<T, R>>> = self
            .registrations
            .borrow()
            .iter()
            .filter(|r| !r.is_blocked())
            .cloned()
            .collect();
        trace!(handlers = snapshot.len(), "emitting");

        let mut accumulated: Option<R> = None;
        for registration in &snapshot {
            if !registration.slot.is_alive() {
                debug!(id = registration.id, "pruning dead handler");
                self.remove_id(registration.id);
                continue;
            }
            let Some(result) = registration.slot.invoke(value)? else {
                debug!(id = registration.id, "pruning dead handler");
                self.remove_id(registration.id);
                continue;
            };
            if let Some(accumulator) = &self.accumulator {
                match accumulator.fold(accumulated.take(), result) {
                    ControlFlow::Continue(acc) => accumulated = Some(acc),
                    ControlFlow::Break(acc) => {
                        accumulated = Some(acc);
                        break;
                    }
                }
            }
        }
        Ok(accumulated)
    }

    /// Remove registrations whose receiver is gone. Returns how many were
    /// removed.
    pub fn prune(&self) -> usize {
        let mut registrations = self.registrations.borrow_mut();
        let before = registrations.len();
        registrations.retain(|r| r.slot.is_alive());
        let pruned = before - registrations.len();
        if pruned > 0 {
            debug!(pruned, "pruning dead handlers");
        }
        pruned
    }

    /// Number of registered handlers, blocked ones included. Dead ones are
    /// pruned first.
    #[must_use]
    pub fn count_handlers(&self) -> usize {
        self.prune();
        self.registrations.borrow().len()
    }

    #[must_use]
    pub fn has_handlers(&self) -> bool {
        self.count_handlers() > 0
    }
}

impl<T, R> fmt::Debug for Signal<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registrations = self.registrations.borrow();
        f.debug_struct("Signal")
            .field("config", &self.config)
            .field("handlers", &registrations.len())
            .field(
                "blocked",
                &registrations.iter().filter(|r| r.is_blocked()).count(),
            )
            .field("accumulator", &self.accumulator.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
