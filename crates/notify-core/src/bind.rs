#![forbid(unsafe_code)]

//! Lifetime-aware wrappers around callables.
//!
//! # Design
//!
//! A [`Callable`] is either a free function (no receiver) or a bound method:
//! a receiver held in an `Rc<S>` plus a function `Fn(&S, &A) -> R`. Only bound
//! methods can be tied to an object's lifetime, so only they are ever wrapped:
//!
//! - [`Binding`] keeps the receiver alive (strong `Rc`).
//! - [`WeakBinding`] holds a `Weak` receiver. Calling it after the receiver is
//!   dropped returns `None`.
//! - [`RaisingWeakBinding`] holds a `Weak` receiver. Calling it after the
//!   receiver is dropped returns [`Error::GarbageCollected`].
//!
//! `wrap` on any of them returns [`Target::Unwrapped`] with the original
//! callable when there is nothing to track.
//!
//! # Identity
//!
//! Every callable and binding has a [`BindingKey`]: the receiver allocation
//! address and the function's identity. Equality and hashing go through the
//! key, so `WeakBinding::wrap(method) == method` and both hash identically.
//!
//! Methods and [`Callable::from_fn`] take a fn item or a non-capturing
//! closure and are identified by its type, which is unique per item. Code
//! addresses are not used: the compiler may merge functions with identical
//! bodies. Passing a fn pointer or a capturing closure there is a compile
//! error; wrap those with [`Callable::function`] instead.
//!
//! A weak binding captures its key at construction. A live `Weak` keeps the
//! receiver's allocation reserved, so the address cannot be handed to a new
//! object: a dead binding keeps equal to itself and its clones, keeps its
//! hash, and never equals a callable over some other live receiver.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use crate::error::{Error, Result};

/// Identity of a callable: receiver allocation plus function identity.
///
/// `receiver` is 0 for callables without a receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingKey {
    receiver: usize,
    function: FunctionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FunctionId {
    /// A fn item or non-capturing closure, by type.
    Item(TypeId),
    /// A closure allocation made by `Callable::function`.
    Closure(usize),
}

impl BindingKey {
    /// Receiver allocation address, if the callable has a receiver.
    #[must_use]
    pub fn receiver(&self) -> Option<usize> {
        (self.receiver != 0).then_some(self.receiver)
    }
}

fn address_of<T: ?Sized>(ptr: *const T) -> usize {
    ptr.cast::<()>() as usize
}

/// Identity of the function item `F`. `F` carries no data, so its type
/// alone determines what it calls.
fn item_id<F: 'static>() -> FunctionId {
    const {
        assert!(
            size_of::<F>() == 0,
            "expected a fn item or non-capturing closure; use Callable::function for others"
        );
    }
    FunctionId::Item(TypeId::of::<F>())
}

// ---------------------------------------------------------------------------
// Method targets
// ---------------------------------------------------------------------------

/// Strongly-held receiver + method, with `S` erased.
trait MethodTarget<A, R> {
    fn call(&self, arg: &A) -> R;
    fn receiver(&self) -> Rc<dyn Any>;
    fn downgrade(&self) -> Rc<dyn WeakMethodTarget<A, R>>;
}

/// Weakly-held receiver + method, with `S` erased.
trait WeakMethodTarget<A, R> {
    fn call(&self, arg: &A) -> Option<R>;
    fn receiver(&self) -> Option<Rc<dyn Any>>;
    fn is_alive(&self) -> bool;
}

struct StrongMethod<S, F> {
    receiver: Rc<S>,
    func: F,
}

struct WeakMethod<S, F> {
    receiver: Weak<S>,
    func: F,
}

impl<S, F, A, R> MethodTarget<A, R> for StrongMethod<S, F>
where
    S: Any,
    F: Fn(&S, &A) -> R + Copy + 'static,
    A: 'static,
    R: 'static,
{
    fn call(&self, arg: &A) -> R {
        (self.func)(&*self.receiver, arg)
    }

    fn receiver(&self) -> Rc<dyn Any> {
        Rc::clone(&self.receiver) as Rc<dyn Any>
    }

    fn downgrade(&self) -> Rc<dyn WeakMethodTarget<A, R>> {
        Rc::new(WeakMethod {
            receiver: Rc::downgrade(&self.receiver),
            func: self.func,
        })
    }
}

impl<S, F, A, R> WeakMethodTarget<A, R> for WeakMethod<S, F>
where
    S: Any,
    F: Fn(&S, &A) -> R + Copy + 'static,
    A: 'static,
    R: 'static,
{
    fn call(&self, arg: &A) -> Option<R> {
        // Upgrade and call in one step: the receiver stays alive for the
        // whole invocation.
        let receiver = self.receiver.upgrade()?;
        Some((self.func)(&*receiver, arg))
    }

    fn receiver(&self) -> Option<Rc<dyn Any>> {
        self.receiver.upgrade().map(|r| r as Rc<dyn Any>)
    }

    fn is_alive(&self) -> bool {
        self.receiver.strong_count() > 0
    }
}

// ---------------------------------------------------------------------------
// Callable
// ---------------------------------------------------------------------------

/// A free function or closure, invoked with a single argument by reference.
pub struct Function<A, R> {
    call: Rc<dyn Fn(&A) -> R>,
    key: BindingKey,
}

impl<A, R> Clone for Function<A, R> {
    fn clone(&self) -> Self {
        Self {
            call: Rc::clone(&self.call),
            key: self.key,
        }
    }
}

/// A method bound to a live receiver.
pub struct BoundMethod<A, R> {
    target: Rc<dyn MethodTarget<A, R>>,
    key: BindingKey,
    type_name: &'static str,
    weak_referenceable: bool,
}

impl<A, R> Clone for BoundMethod<A, R> {
    fn clone(&self) -> Self {
        Self {
            target: Rc::clone(&self.target),
            key: self.key,
            type_name: self.type_name,
            weak_referenceable: self.weak_referenceable,
        }
    }
}

impl<A: 'static, R: 'static> BoundMethod<A, R> {
    fn new<S, F>(receiver: Rc<S>, func: F, weak_referenceable: bool) -> Self
    where
        S: Any,
        F: Fn(&S, &A) -> R + Copy + 'static,
    {
        let key = BindingKey {
            receiver: address_of(Rc::as_ptr(&receiver)),
            function: item_id::<F>(),
        };
        Self {
            target: Rc::new(StrongMethod { receiver, func }),
            key,
            type_name: type_name::<S>(),
            weak_referenceable,
        }
    }

    /// Type name of the receiver, e.g. for diagnostics.
    #[must_use]
    pub fn receiver_type(&self) -> &'static str {
        self.type_name
    }

    /// The receiver, kept alive by this method.
    #[must_use]
    pub fn receiver(&self) -> Rc<dyn Any> {
        self.target.receiver()
    }

    /// Whether a non-owning reference to the receiver can be taken.
    /// `false` for [`Callable::method_inline`].
    #[must_use]
    pub fn is_weak_referenceable(&self) -> bool {
        self.weak_referenceable
    }
}

/// Anything that can be stored as a handler.
///
/// The closed set of shapes a handler can take: a free function or a method
/// bound to a receiver.
pub enum Callable<A, R = ()> {
    Function(Function<A, R>),
    Method(BoundMethod<A, R>),
}

impl<A, R> Clone for Callable<A, R> {
    fn clone(&self) -> Self {
        match self {
            Self::Function(f) => Self::Function(f.clone()),
            Self::Method(m) => Self::Method(m.clone()),
        }
    }
}

impl<A: 'static, R: 'static> Callable<A, R> {
    /// Wrap a closure. Identity is the closure allocation, so clones of the
    /// returned callable compare equal but two separate `function` calls do
    /// not.
    pub fn function(f: impl Fn(&A) -> R + 'static) -> Self {
        let call: Rc<dyn Fn(&A) -> R> = Rc::new(f);
        let key = BindingKey {
            receiver: 0,
            function: FunctionId::Closure(address_of(Rc::as_ptr(&call))),
        };
        Self::Function(Function { call, key })
    }

    /// Wrap a fn item or non-capturing closure. Identity is the item, so
    /// two separate `from_fn` calls over the same item are equal.
    #[must_use]
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&A) -> R + Copy + 'static,
    {
        let key = BindingKey {
            receiver: 0,
            function: item_id::<F>(),
        };
        Self::Function(Function {
            call: Rc::new(f),
            key,
        })
    }

    /// Bind `func` to a shared receiver.
    #[must_use]
    pub fn method<S, F>(receiver: &Rc<S>, func: F) -> Self
    where
        S: Any,
        F: Fn(&S, &A) -> R + Copy + 'static,
    {
        Self::Method(BoundMethod::new(Rc::clone(receiver), func, true))
    }

    /// Bind `func` to a receiver owned exclusively by the callable.
    ///
    /// Nothing else can hold the receiver, so the weak binding variants
    /// refuse to wrap it.
    #[must_use]
    pub fn method_inline<S, F>(receiver: S, func: F) -> Self
    where
        S: Any,
        F: Fn(&S, &A) -> R + Copy + 'static,
    {
        Self::Method(BoundMethod::new(Rc::new(receiver), func, false))
    }

    /// Call the function, or the method on its receiver.
    pub fn call(&self, arg: &A) -> R {
        match self {
            Self::Function(f) => (f.call)(arg),
            Self::Method(m) => m.target.call(arg),
        }
    }

    /// Identity used for equality and hashing.
    #[must_use]
    pub fn key(&self) -> BindingKey {
        match self {
            Self::Function(f) => f.key,
            Self::Method(m) => m.key,
        }
    }

    #[must_use]
    pub fn receiver(&self) -> Option<Rc<dyn Any>> {
        match self {
            Self::Function(_) => None,
            Self::Method(m) => Some(m.receiver()),
        }
    }

    /// A plain callable is always alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        true
    }
}

impl<A, R> fmt::Debug for Callable<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(func) => f
                .debug_struct("Callable::Function")
                .field("key", &func.key)
                .finish(),
            Self::Method(m) => f
                .debug_struct("Callable::Method")
                .field("receiver_type", &m.type_name)
                .field("key", &m.key)
                .finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

/// Strong binding: keeps the receiver alive for as long as it exists.
pub struct Binding<A, R = ()> {
    method: BoundMethod<A, R>,
}

impl<A, R> Clone for Binding<A, R> {
    fn clone(&self) -> Self {
        Self {
            method: self.method.clone(),
        }
    }
}

impl<A: 'static, R: 'static> Binding<A, R> {
    #[must_use]
    pub fn new<S, F>(receiver: &Rc<S>, func: F) -> Self
    where
        S: Any,
        F: Fn(&S, &A) -> R + Copy + 'static,
    {
        Self {
            method: BoundMethod::new(Rc::clone(receiver), func, true),
        }
    }

    /// Wrap `callable` if it has a receiver; return it unchanged otherwise.
    #[must_use]
    pub fn wrap(callable: Callable<A, R>) -> Target<A, R> {
        match callable {
            Callable::Method(method) => Target::Strong(Self { method }),
            unwrapped @ Callable::Function(_) => Target::Unwrapped(unwrapped),
        }
    }

    /// Call the method. The receiver is always alive.
    pub fn call(&self, arg: &A) -> R {
        self.method.target.call(arg)
    }

    #[must_use]
    pub fn receiver(&self) -> Rc<dyn Any> {
        self.method.receiver()
    }

    #[must_use]
    pub fn key(&self) -> BindingKey {
        self.method.key
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        true
    }
}

/// Non-owning binding. Calls become no-ops once the receiver is dropped.
pub struct WeakBinding<A, R = ()> {
    target: Rc<dyn WeakMethodTarget<A, R>>,
    key: BindingKey,
    type_name: &'static str,
}

impl<A, R> Clone for WeakBinding<A, R> {
    fn clone(&self) -> Self {
        Self {
            target: Rc::clone(&self.target),
            key: self.key,
            type_name: self.type_name,
        }
    }
}

impl<A: 'static, R: 'static> WeakBinding<A, R> {
    #[must_use]
    pub fn new<S, F>(receiver: &Rc<S>, func: F) -> Self
    where
        S: Any,
        F: Fn(&S, &A) -> R + Copy + 'static,
    {
        Self::from_method(&BoundMethod::new(Rc::clone(receiver), func, true))
    }

    fn from_method(method: &BoundMethod<A, R>) -> Self {
        Self {
            target: method.target.downgrade(),
            key: method.key,
            type_name: method.type_name,
        }
    }

    fn try_from_method(method: &BoundMethod<A, R>) -> Result<Self> {
        if !method.is_weak_referenceable() {
            return Err(Error::CannotWeakReference {
                type_name: method.type_name,
            });
        }
        Ok(Self::from_method(method))
    }

    /// Wrap `callable` if it has a receiver; return it unchanged otherwise.
    ///
    /// # Errors
    ///
    /// [`Error::CannotWeakReference`] if the receiver is owned inline by the
    /// callable.
    pub fn wrap(callable: Callable<A, R>) -> Result<Target<A, R>> {
        match callable {
            Callable::Method(method) => Self::try_from_method(&method).map(Target::Weak),
            unwrapped @ Callable::Function(_) => Ok(Target::Unwrapped(unwrapped)),
        }
    }

    /// Call the method if the receiver is still alive.
    pub fn call(&self, arg: &A) -> Option<R> {
        self.target.call(arg)
    }

    #[must_use]
    pub fn receiver(&self) -> Option<Rc<dyn Any>> {
        self.target.receiver()
    }

    #[must_use]
    pub fn key(&self) -> BindingKey {
        self.key
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.target.is_alive()
    }
}

/// Non-owning binding that reports calls after the receiver is dropped.
pub struct RaisingWeakBinding<A, R = ()> {
    inner: WeakBinding<A, R>,
}

impl<A, R> Clone for RaisingWeakBinding<A, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: 'static, R: 'static> RaisingWeakBinding<A, R> {
    #[must_use]
    pub fn new<S, F>(receiver: &Rc<S>, func: F) -> Self
    where
        S: Any,
        F: Fn(&S, &A) -> R + Copy + 'static,
    {
        Self {
            inner: WeakBinding::new(receiver, func),
        }
    }

    /// Wrap `callable` if it has a receiver; return it unchanged otherwise.
    ///
    /// # Errors
    ///
    /// [`Error::CannotWeakReference`] if the receiver is owned inline by the
    /// callable.
    pub fn wrap(callable: Callable<A, R>) -> Result<Target<A, R>> {
        match callable {
            Callable::Method(method) => WeakBinding::try_from_method(&method)
                .map(|inner| Target::RaisingWeak(Self { inner })),
            unwrapped @ Callable::Function(_) => Ok(Target::Unwrapped(unwrapped)),
        }
    }

    /// Call the method.
    ///
    /// # Errors
    ///
    /// [`Error::GarbageCollected`] if the receiver has been dropped.
    pub fn call(&self, arg: &A) -> Result<R> {
        self.inner.call(arg).ok_or(Error::GarbageCollected)
    }

    #[must_use]
    pub fn receiver(&self) -> Option<Rc<dyn Any>> {
        self.inner.receiver()
    }

    #[must_use]
    pub fn key(&self) -> BindingKey {
        self.inner.key
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }
}

impl<A, R> fmt::Debug for Binding<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("receiver_type", &self.method.type_name)
            .field("key", &self.method.key)
            .finish()
    }
}

impl<A, R> fmt::Debug for WeakBinding<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakBinding")
            .field("receiver_type", &self.type_name)
            .field("key", &self.key)
            .field("alive", &self.target.is_alive())
            .finish()
    }
}

impl<A, R> fmt::Debug for RaisingWeakBinding<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RaisingWeakBinding")
            .field("receiver_type", &self.inner.type_name)
            .field("key", &self.inner.key)
            .field("alive", &self.inner.target.is_alive())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// Result of wrapping a callable: either the callable itself or a binding.
pub enum Target<A, R = ()> {
    Unwrapped(Callable<A, R>),
    Strong(Binding<A, R>),
    Weak(WeakBinding<A, R>),
    RaisingWeak(RaisingWeakBinding<A, R>),
}

impl<A, R> Clone for Target<A, R> {
    fn clone(&self) -> Self {
        match self {
            Self::Unwrapped(c) => Self::Unwrapped(c.clone()),
            Self::Strong(b) => Self::Strong(b.clone()),
            Self::Weak(b) => Self::Weak(b.clone()),
            Self::RaisingWeak(b) => Self::RaisingWeak(b.clone()),
        }
    }
}

impl<A: 'static, R: 'static> Target<A, R> {
    /// Invoke whatever is wrapped.
    ///
    /// `Ok(None)` means a [`WeakBinding`] whose receiver is gone.
    ///
    /// # Errors
    ///
    /// [`Error::GarbageCollected`] from a dead [`RaisingWeakBinding`].
    pub fn invoke(&self, arg: &A) -> Result<Option<R>> {
        match self {
            Self::Unwrapped(c) => Ok(Some(c.call(arg))),
            Self::Strong(b) => Ok(Some(b.call(arg))),
            Self::Weak(b) => Ok(b.call(arg)),
            Self::RaisingWeak(b) => b.call(arg).map(Some),
        }
    }

    #[must_use]
    pub fn key(&self) -> BindingKey {
        match self {
            Self::Unwrapped(c) => c.key(),
            Self::Strong(b) => b.key(),
            Self::Weak(b) => b.key(),
            Self::RaisingWeak(b) => b.key(),
        }
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        match self {
            Self::Unwrapped(_) | Self::Strong(_) => true,
            Self::Weak(b) => b.is_alive(),
            Self::RaisingWeak(b) => b.is_alive(),
        }
    }
}

impl<A, R> fmt::Debug for Target<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unwrapped(c) => f.debug_tuple("Unwrapped").field(c).finish(),
            Self::Strong(b) => b.fmt(f),
            Self::Weak(b) => b.fmt(f),
            Self::RaisingWeak(b) => b.fmt(f),
        }
    }
}

// ---------------------------------------------------------------------------
// Equality and hashing through BindingKey
// ---------------------------------------------------------------------------

macro_rules! key_identity {
    ($($ty:ident),* $(,)?) => {
        $(
            impl<A: 'static, R: 'static> Hash for $ty<A, R> {
                fn hash<H: Hasher>(&self, state: &mut H) {
                    self.key().hash(state);
                }
            }

            impl<A: 'static, R: 'static> Eq for $ty<A, R> {}
        )*
        key_identity!(@eq [$($ty),*] [$($ty),*]);
    };
    (@eq [$($lhs:ident),*] $rhs:tt) => {
        $( key_identity!(@eq_one $lhs $rhs); )*
    };
    (@eq_one $lhs:ident [$($rhs:ident),*]) => {
        $(
            impl<A: 'static, R: 'static> PartialEq<$rhs<A, R>> for $lhs<A, R> {
                fn eq(&self, other: &$rhs<A, R>) -> bool {
                    self.key() == other.key()
                }
            }
        )*
    };
}

key_identity!(Callable, Binding, WeakBinding, RaisingWeakBinding, Target);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    #[derive(Default)]
    struct Dummy {
        offset: i32,
    }

    impl Dummy {
        fn identity(&self, arg: &(i32, &'static str)) -> (i32, &'static str) {
            (arg.0 + self.offset, arg.1)
        }

        fn add(&self, arg: &i32) -> i32 {
            arg + self.offset
        }

        fn add_again(&self, arg: &i32) -> i32 {
            arg + self.offset
        }
    }

    fn double(value: &i32) -> i32 {
        value * 2
    }

    fn twice(value: &i32) -> i32 {
        value * 2
    }

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn creation_and_invocation() {
        let dummy = Rc::new(Dummy::default());
        let arg = (33, "test");

        assert_eq!(Binding::new(&dummy, Dummy::identity).call(&arg), (33, "test"));
        assert_eq!(
            WeakBinding::new(&dummy, Dummy::identity).call(&arg),
            Some((33, "test"))
        );
        assert_eq!(
            RaisingWeakBinding::new(&dummy, Dummy::identity).call(&arg),
            Ok((33, "test"))
        );
    }

    #[test]
    fn inline_receiver_cannot_be_weak_referenced() {
        let callable = Callable::method_inline(Dummy::default(), Dummy::add);

        assert!(matches!(
            WeakBinding::wrap(callable.clone()),
            Err(Error::CannotWeakReference { .. })
        ));
        assert!(matches!(
            RaisingWeakBinding::wrap(callable.clone()),
            Err(Error::CannotWeakReference { .. })
        ));
        // The strong variant never refuses.
        let strong = Binding::wrap(callable);
        assert!(matches!(strong, Target::Strong(_)));
        assert_eq!(strong.invoke(&4).unwrap(), Some(4));
    }

    #[test]
    fn weak_binding_is_noop_after_drop() {
        let dummy = Rc::new(Dummy { offset: 0 });
        let method = WeakBinding::new(&dummy, Dummy::add);
        assert_eq!(method.call(&15), Some(15));
        assert!(method.is_alive());

        drop(dummy);

        assert!(!method.is_alive());
        assert_eq!(method.call(&15), None);
        assert!(method.receiver().is_none());
    }

    #[test]
    fn raising_weak_binding_errors_after_drop() {
        let dummy = Rc::new(Dummy { offset: 0 });
        let method = RaisingWeakBinding::new(&dummy, Dummy::add);
        assert_eq!(method.call(&15), Ok(15));

        drop(dummy);

        assert!(!method.is_alive());
        assert_eq!(method.call(&15), Err(Error::GarbageCollected));
    }

    #[test]
    fn weak_binding_does_not_extend_lifetime() {
        let dummy = Rc::new(Dummy::default());
        let _weak = WeakBinding::new(&dummy, Dummy::add);
        let _raising = RaisingWeakBinding::new(&dummy, Dummy::add);
        assert_eq!(Rc::strong_count(&dummy), 1);
    }

    #[test]
    fn wrap_returns_closure_unchanged() {
        let callable: Callable<i32, i32> = Callable::function(|v: &i32| v + 1);

        for target in [
            Binding::wrap(callable.clone()),
            WeakBinding::wrap(callable.clone()).unwrap(),
            RaisingWeakBinding::wrap(callable.clone()).unwrap(),
        ] {
            match target {
                Target::Unwrapped(inner) => {
                    assert_eq!(inner, callable);
                    assert_eq!(inner.call(&1), 2);
                }
                other => panic!("closure was wrapped: {other:?}"),
            }
        }
    }

    #[test]
    fn wrap_returns_plain_function_unchanged() {
        let callable = Callable::from_fn(double);
        let target = WeakBinding::wrap(callable.clone()).unwrap();
        assert!(matches!(target, Target::Unwrapped(_)));
        assert_eq!(target, callable);
        // Two separate constructions over the same fn are the same callable.
        assert_eq!(Callable::from_fn(double), callable);
    }

    #[test]
    fn wrapped_method_equals_and_hashes_like_method() {
        let dummy = Rc::new(Dummy::default());
        let callable = Callable::method(&dummy, Dummy::add);

        let strong = Binding::wrap(callable.clone());
        let weak = WeakBinding::wrap(callable.clone()).unwrap();
        let raising = RaisingWeakBinding::wrap(callable.clone()).unwrap();

        for target in [&strong, &weak, &raising] {
            assert_eq!(*target, callable);
            assert_eq!(callable, *target);
            assert_eq!(hash_of(target), hash_of(&callable));
            assert!(target.is_alive());
        }
        assert!(matches!(weak, Target::Weak(_)));
        assert!(matches!(raising, Target::RaisingWeak(_)));

        // A freshly bound method over the same receiver is the same callable.
        assert_eq!(Callable::method(&dummy, Dummy::add), weak);
        assert_eq!(
            WeakBinding::wrap(callable.clone()).unwrap(),
            WeakBinding::wrap(callable).unwrap()
        );
    }

    #[test]
    fn different_receivers_or_functions_differ() {
        let a = Rc::new(Dummy::default());
        let b = Rc::new(Dummy::default());

        assert_ne!(
            WeakBinding::new(&a, Dummy::add),
            WeakBinding::new(&b, Dummy::add)
        );
        assert_ne!(
            Callable::method(&a, Dummy::add),
            Callable::from_fn(double)
        );
    }

    #[test]
    fn identical_bodies_keep_distinct_identities() {
        let dummy = Rc::new(Dummy::default());
        let add = Callable::method(&dummy, Dummy::add);
        let add_again = Callable::method(&dummy, Dummy::add_again);

        assert_ne!(add, add_again);
        assert_ne!(hash_of(&add), hash_of(&add_again));
        assert_ne!(
            WeakBinding::wrap(add.clone()).unwrap(),
            WeakBinding::wrap(add_again).unwrap()
        );
        assert_eq!(WeakBinding::wrap(add.clone()).unwrap(), add);

        assert_ne!(Callable::from_fn(double), Callable::from_fn(twice));
        // Non-capturing closures are items too; each expression is its own.
        assert_ne!(
            Callable::from_fn(|v: &i32| v * 2),
            Callable::from_fn(|v: &i32| v * 2)
        );
    }

    #[test]
    fn dead_binding_identity_is_stable() {
        let dummy = Rc::new(Dummy::default());
        let weak = WeakBinding::new(&dummy, Dummy::add);
        let copy = weak.clone();
        let hash_before = hash_of(&weak);

        drop(dummy);
        let fresh = Rc::new(Dummy::default());

        assert_eq!(weak, copy);
        assert_eq!(hash_of(&weak), hash_before);
        assert_ne!(weak, Callable::method(&fresh, Dummy::add));
    }

    #[test]
    fn receiver_accessors() {
        let dummy = Rc::new(Dummy { offset: 7 });
        let binding = Binding::new(&dummy, Dummy::add);
        let receiver = binding.receiver();
        assert_eq!(receiver.downcast_ref::<Dummy>().map(|d| d.offset), Some(7));
        assert_eq!(
            binding.key().receiver(),
            Some(address_of(Rc::as_ptr(&dummy)))
        );
        assert_eq!(Callable::<i32, i32>::from_fn(double).key().receiver(), None);
    }

    #[test]
    fn bound_method_reports_receiver_details() {
        let shared = Callable::method(&Rc::new(Dummy::default()), Dummy::add);
        let inline = Callable::method_inline(Dummy::default(), Dummy::add);

        match (shared, inline) {
            (Callable::Method(shared), Callable::Method(inline)) => {
                assert!(shared.receiver_type().ends_with("Dummy"));
                assert!(shared.is_weak_referenceable());
                assert!(!inline.is_weak_referenceable());
                assert!(inline.receiver().downcast_ref::<Dummy>().is_some());
            }
            _ => panic!("methods were not bound"),
        }
    }
}
