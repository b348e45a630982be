//! DSP primitives the nodes are built from.
//!
//! Everything here allocates at construction (or on an explicit resize) and
//! never afterwards, so the types can be embedded directly in nodes that run on
//! the audio thread.

/// Second-order IIR filter and its coefficient designs.
pub mod biquad;
/// Ring-buffer delay line with click-free length changes.
pub mod delay_line;
/// Per-channel filter container.
pub mod filter_bank;

pub use biquad::{BiquadCoefficients, BiquadFilter, BiquadType};
pub use delay_line::CrossfadingDelayLine;
pub use filter_bank::{Filter, MultichannelFilterBank};
