//! Error type shared by node constructors, property setters and DSP configuration.
//!
//! Errors only ever come out of construction and control-side calls. Nothing on
//! the audio path returns an [`Error`]; by the time `process()` runs every value
//! it reads has already passed through the validators that produce these.

use core::fmt;

use crate::property::ValueType;

/// Everything that can go wrong while building or configuring a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The sample rate handed to [`ProcessContext`](crate::ProcessContext) was zero.
    InvalidSampleRate(u32),
    /// A node was asked for zero channels (or zero inputs).
    InvalidChannelCount(usize),
    /// A value fell outside its allowed range.
    Range {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    /// A float was written to an int property or the other way around.
    WrongType {
        name: &'static str,
        expected: ValueType,
    },
    /// The property can only be set at construction time.
    ReadOnly(&'static str),
    /// No property with this index exists on the node.
    UnknownProperty(usize),
    /// The node's control queue is full; the write was not delivered.
    QueueFull,
}

impl Error {
    pub(crate) fn range(name: &'static str, value: impl Into<f64>, min: impl Into<f64>, max: impl Into<f64>) -> Self {
        Error::Range {
            name,
            value: value.into(),
            min: min.into(),
            max: max.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidSampleRate(sr) => write!(f, "sample rate must be greater than 0 (got {})", sr),
            Error::InvalidChannelCount(n) => write!(f, "channel count must be greater than 0 (got {})", n),
            Error::Range { name, value, min, max } => {
                write!(f, "{} = {} is out of range [{}, {}]", name, value, min, max)
            }
            Error::WrongType { name, expected } => {
                write!(f, "property {} expects a value of type {}", name, expected)
            }
            Error::ReadOnly(name) => write!(f, "property {} is read-only", name),
            Error::UnknownProperty(index) => write!(f, "no property with index {}", index),
            Error::QueueFull => write!(f, "control queue is full"),
        }
    }
}

impl std::error::Error for Error {}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
