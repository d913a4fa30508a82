//! Error type and Return values used by the Serialization.

use serde::ser;

/// Represents all possible errors that can happen during Serialization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The value contains a type that has no packed representation.
    ///
    /// For example floating point numbers, options, maps and enums with data.
    /// Map such values to one of the fixed width types (or implement a custom
    /// serialize method) before hashing them.
    #[error("type is not representable in packed encoding: {0}")]
    TypeNotRepresentable(&'static str),
    /// Raised by `Serialize` implementations through [ser::Error::custom].
    #[error("{0}")]
    Custom(String),
}

impl ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: core::fmt::Display,
    {
        Error::Custom(msg.to_string())
    }
}

/// Alias for `Result` using the [Error] returned by the Serializer.
pub type Result<T> = core::result::Result<T, Error>;
