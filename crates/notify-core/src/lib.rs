#![forbid(unsafe_code)]

//! Notify core: lifetime-safe bindings, ordered signals, and observable
//! value objects that can be synchronized with each other.
//!
//! # Quick start
//!
//! ```
//! use std::rc::Rc;
//! use notify_core::{Synchronize, ValueObject, Variable};
//!
//! let a = Rc::new(Variable::new(0));
//! let b = Rc::new(Variable::new(0));
//! a.synchronize(&b).unwrap();
//!
//! a.set(5).unwrap();
//! assert_eq!(b.get(), 5);
//! ```
//!
//! Everything here is single-threaded (`Rc`, `RefCell`). Handlers may
//! re-enter the signal that is calling them.

pub mod bind;
pub mod error;
pub mod mediator;
pub mod pin;
pub mod signal;
pub mod value;
pub mod variable;

pub use bind::{Binding, BindingKey, Callable, RaisingWeakBinding, Target, WeakBinding};
pub use error::{Error, Result};
pub use mediator::Mediator;
pub use pin::{PinGuard, PinRegistry};
pub use signal::{Accumulator, BindingPolicy, Handler, Signal, SignalConfig};
pub use value::{ChangedChannel, Synchronize, ValueObject};
pub use variable::{Constant, Variable};
