//! Two-way value transforms used by synchronization.
//!
//! A [`Mediator<X, Y>`] converts values travelling between two synchronized
//! value objects: `forward` maps `X` to `Y`, `back` maps `Y` to `X`. Either
//! transform may reject a value with [`Error::InvalidValue`]; the error
//! reaches the caller of `set`/`synchronize` unchanged.
//!
//! Mediators compare by identity: two handles are equal only if they were
//! cloned from the same `Mediator::new` call.
//!
//! [`Error::InvalidValue`]: crate::Error::InvalidValue

use std::fmt;
use std::rc::Rc;

use crate::error::Result;

type Transform<X, Y> = Rc<dyn Fn(&X) -> Result<Y>>;

pub struct Mediator<X, Y> {
    inner: Rc<MediatorInner<X, Y>>,
}

struct MediatorInner<X, Y> {
    forward: Transform<X, Y>,
    back: Transform<Y, X>,
}

impl<X, Y> Clone for Mediator<X, Y> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<X: 'static, Y: 'static> Mediator<X, Y> {
    pub fn new(
        forward: impl Fn(&X) -> Result<Y> + 'static,
        back: impl Fn(&Y) -> Result<X> + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(MediatorInner {
                forward: Rc::new(forward),
                back: Rc::new(back),
            }),
        }
    }

    /// Mediator whose transforms cannot fail.
    pub fn infallible(
        forward: impl Fn(&X) -> Y + 'static,
        back: impl Fn(&Y) -> X + 'static,
    ) -> Self {
        Self::new(move |x| Ok(forward(x)), move |y| Ok(back(y)))
    }

    /// # Errors
    ///
    /// Whatever the forward transform reports for `value`.
    pub fn forward(&self, value: &X) -> Result<Y> {
        (self.inner.forward)(value)
    }

    /// # Errors
    ///
    /// Whatever the back transform reports for `value`.
    pub fn back(&self, value: &Y) -> Result<X> {
        (self.inner.back)(value)
    }

    /// The same transforms with directions swapped.
    #[must_use]
    pub fn reversed(&self) -> Mediator<Y, X> {
        Mediator {
            inner: Rc::new(MediatorInner {
                forward: Rc::clone(&self.inner.back),
                back: Rc::clone(&self.inner.forward),
            }),
        }
    }
}

impl<X, Y> PartialEq for Mediator<X, Y> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<X, Y> Eq for Mediator<X, Y> {}

impl<X, Y> fmt::Debug for Mediator<X, Y> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mediator")
            .field("id", &Rc::as_ptr(&self.inner))
            .finish()
    }
}
