//! Field constraints shared by all message types.
//!
//! Constrained primitives are newtypes whose only constructors check the
//! constraint; serde deserialization goes through the same `TryFrom`, so a
//! value that exists is always valid.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::constants::{MAX_IDENTIFIER_LEN, MAX_METER_ID_LEN, MAX_NAME_LEN};

/// A field failed its schema constraint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Cross-field validation of a whole message or record.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

impl<T: Validate> Validate for Option<T> {
    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Some(v) => v.validate(),
            None => Ok(()),
        }
    }
}

impl<T: Validate> Validate for Vec<T> {
    fn validate(&self) -> Result<(), ValidationError> {
        self.iter().try_for_each(Validate::validate)
    }
}

pub fn check_max_len(field: &'static str, len: usize, max: usize) -> Result<(), ValidationError> {
    if len > max {
        return Err(ValidationError::new(
            field,
            format!("length {len} exceeds maximum {max}"),
        ));
    }
    Ok(())
}

pub fn check_exact_len(field: &'static str, len: usize, expected: usize) -> Result<(), ValidationError> {
    if len != expected {
        return Err(ValidationError::new(
            field,
            format!("length {len}, expected {expected}"),
        ));
    }
    Ok(())
}

pub fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::new(
            field,
            format!("{value} outside {min}..={max}"),
        ));
    }
    Ok(())
}

pub fn check_hex(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::new(
            field,
            format!("'{value}' is not hexadecimal"),
        ));
    }
    Ok(())
}

macro_rules! bounded_string {
    ($(#[$meta:meta])* $name:ident, $field:literal, $max:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
                let value = value.into();
                check_max_len($field, value.chars().count(), $max)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

bounded_string!(
    /// identifierType (at most 255 characters).
    Identifier,
    "identifier",
    MAX_IDENTIFIER_LEN
);
bounded_string!(
    /// nameType (at most 80 characters).
    Name,
    "name",
    MAX_NAME_LEN
);
bounded_string!(MeterId, "meter_id", MAX_METER_ID_LEN);

/// A percentage in `0..=100` (state of charge).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct Percent(u8);

impl Percent {
    pub fn new(value: u8) -> Result<Self, ValidationError> {
        if value > 100 {
            return Err(ValidationError::new(
                "percent",
                format!("{value} outside 0..=100"),
            ));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Percent {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Percent> for u8 {
    fn from(value: Percent) -> Self {
        value.0
    }
}

/// A list holding at most `N` items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<T>", into = "Vec<T>")]
#[serde(bound(
    serialize = "T: Serialize + Clone",
    deserialize = "T: Deserialize<'de>"
))]
pub struct BoundedList<T, const N: usize>(Vec<T>);

impl<T, const N: usize> BoundedList<T, N> {
    pub fn new(items: Vec<T>) -> Result<Self, ValidationError> {
        check_max_len("list", items.len(), N)?;
        Ok(Self(items))
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub const fn capacity() -> usize {
        N
    }

    pub fn into_inner(self) -> Vec<T> {
        self.0
    }
}

impl<T, const N: usize> Default for BoundedList<T, N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T, const N: usize> Deref for BoundedList<T, N> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.0
    }
}

impl<T, const N: usize> TryFrom<Vec<T>> for BoundedList<T, N> {
    type Error = ValidationError;

    fn try_from(items: Vec<T>) -> Result<Self, Self::Error> {
        Self::new(items)
    }
}

impl<T: Clone, const N: usize> From<BoundedList<T, N>> for Vec<T> {
    fn from(list: BoundedList<T, N>) -> Self {
        list.0
    }
}

impl<T: Validate, const N: usize> Validate for BoundedList<T, N> {
    fn validate(&self) -> Result<(), ValidationError> {
        self.0.iter().try_for_each(Validate::validate)
    }
}

/// `Validate` for records whose fields are all constrained by their types.
macro_rules! no_cross_field_constraints {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::protocol::validation::Validate for $ty {
                fn validate(&self) -> Result<(), $crate::protocol::validation::ValidationError> {
                    Ok(())
                }
            }
        )*
    };
}
pub(crate) use no_cross_field_constraints;

/// `Validate` for -20 messages whose only nested constraint is the header.
macro_rules! header_only_constraints {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::protocol::validation::Validate for $ty {
                fn validate(&self) -> Result<(), $crate::protocol::validation::ValidationError> {
                    self.header.validate()
                }
            }
        )*
    };
}
pub(crate) use header_only_constraints;
