use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("`{object}' is not mutable")]
    NotMutable { object: String },

    #[error("invalid value: {message}")]
    InvalidValue { message: String },

    #[error("cannot weak-reference receiver of type `{type_name}'")]
    CannotWeakReference { type_name: &'static str },

    #[error("binding target has been garbage-collected")]
    GarbageCollected,

    #[error("value object of type `{type_name}' is already pinned")]
    AlreadyPinned { type_name: &'static str },

    #[error("handler failed: {message}")]
    Handler { message: String },
}

impl Error {
    #[must_use]
    pub fn not_mutable(object: impl Into<String>) -> Self {
        Self::NotMutable {
            object: object.into(),
        }
    }

    #[must_use]
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValue {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }
}
