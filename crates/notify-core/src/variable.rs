#![forbid(unsafe_code)]

//! Ready-made value objects.
//!
//! - [`Variable`]: a mutable cell, optionally guarded by a validator.
//! - [`Constant`]: an immutable value that can still be observed.

use std::cell::RefCell;
use std::fmt;

use crate::error::{Error, Result};
use crate::signal::SignalConfig;
use crate::value::{ChangedChannel, ValueObject};

type Validator<T> = Box<dyn Fn(&T) -> bool>;

/// A mutable value object.
///
/// # Invariants
///
/// 1. `set(v)` where `v == current` is a no-op and fires nothing.
/// 2. The stored value always satisfies the validator, if any.
pub struct Variable<T> {
    value: RefCell<T>,
    validator: Option<Validator<T>>,
    channel: ChangedChannel<T>,
}

impl<T: Clone + PartialEq + fmt::Debug + 'static> Variable<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::with_config(value, SignalConfig::default())
    }

    /// Variable whose "changed" signal uses `config`.
    #[must_use]
    pub fn with_config(value: T, config: SignalConfig) -> Self {
        Self {
            value: RefCell::new(value),
            validator: None,
            channel: ChangedChannel::with_config(config),
        }
    }

    /// Variable that only accepts values passing `validator`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidValue`] if `value` itself does not pass.
    pub fn with_validator(value: T, validator: impl Fn(&T) -> bool + 'static) -> Result<Self> {
        Self::with_validator_and_config(value, validator, SignalConfig::default())
    }

    /// [`Variable::with_validator`] whose "changed" signal uses `config`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidValue`] if `value` itself does not pass.
    pub fn with_validator_and_config(
        value: T,
        validator: impl Fn(&T) -> bool + 'static,
        config: SignalConfig,
    ) -> Result<Self> {
        if !validator(&value) {
            return Err(Error::invalid_value(format!(
                "initial value {value:?} is not accepted"
            )));
        }
        Ok(Self {
            value: RefCell::new(value),
            validator: Some(Box::new(validator)),
            channel: ChangedChannel::with_config(config),
        })
    }

    /// Whether `value` is acceptable for this variable.
    #[must_use]
    pub fn is_allowed_value(&self, value: &T) -> bool {
        self.validator.as_ref().is_none_or(|accepts| accepts(value))
    }
}

impl<T: Clone + PartialEq + fmt::Debug + 'static> ValueObject for Variable<T> {
    type Value = T;

    fn channel(&self) -> &ChangedChannel<T> {
        &self.channel
    }

    fn get(&self) -> T {
        self.value.borrow().clone()
    }

    fn set(&self, value: T) -> Result<bool> {
        if !self.is_allowed_value(&value) {
            return Err(Error::invalid_value(format!(
                "{value:?} is not accepted by {}",
                self.describe()
            )));
        }
        if *self.value.borrow() == value {
            return Ok(false);
        }
        // Store before notifying so handlers that read back see the new
        // value and re-entrant sets of the same value stop here.
        self.value.replace(value.clone());
        self.changed(&value)
    }

    fn is_mutable(&self) -> bool {
        true
    }
}

impl<T: Clone + PartialEq + fmt::Debug + 'static> fmt::Display for Variable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl<T: Clone + PartialEq + fmt::Debug + 'static> fmt::Debug for Variable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("value", &*self.value.borrow())
            .field("validated", &self.validator.is_some())
            .field("handlers", &self.channel.count_handlers())
            .finish()
    }
}

/// An immutable value object. `set` always fails with
/// [`Error::NotMutable`].
pub struct Constant<T> {
    value: T,
    channel: ChangedChannel<T>,
}

impl<T: Clone + PartialEq + fmt::Debug + 'static> Constant<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            value,
            channel: ChangedChannel::new(),
        }
    }
}

impl<T: Clone + PartialEq + fmt::Debug + 'static> ValueObject for Constant<T> {
    type Value = T;

    fn channel(&self) -> &ChangedChannel<T> {
        &self.channel
    }

    fn get(&self) -> T {
        self.value.clone()
    }
}

impl<T: Clone + PartialEq + fmt::Debug + 'static> fmt::Display for Constant<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl<T: fmt::Debug> fmt::Debug for Constant<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constant")
            .field("value", &self.value)
            .finish()
    }
}
