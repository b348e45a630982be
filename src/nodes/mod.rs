//! Built-in audio nodes.
//!
//! Every node implements [`AudioNode`](crate::AudioNode) and takes a
//! [`ProcessContext`](crate::ProcessContext) plus its channel count at
//! construction. Channel counts are fixed for the lifetime of the node.
//!
//! - [`BiquadNode`] - One biquad filter per channel
//! - [`FilteredDelayNode`] - Delay line with a filter in the (optional) feedback loop
//! - [`ThreeBandEqNode`] - Low gain, mid peak and high shelf in series
//! - [`CrossfaderNode`] - Linear crossfade between several multichannel inputs
//!
//! # Properties
//!
//! Each node exports its property ids as associated constants (e.g.
//! [`FilteredDelayNode::FEEDBACK`]). The property tables can also be browsed by
//! name through [`Properties::find`](crate::Properties::find).
//!
//! # Message Types
//!
//! Nodes without anything beyond properties use `()` as their message type.
//! [`CrossfaderMessage`] starts and finishes crossfades.

pub mod biquad;
pub mod crossfader;
pub mod filtered_delay;
pub mod three_band_eq;

pub use biquad::BiquadNode;
pub use crossfader::{CrossfaderMessage, CrossfaderNode, FinishedCallback};
pub use filtered_delay::FilteredDelayNode;
pub use three_band_eq::ThreeBandEqNode;

use tracing::{trace, warn};

use crate::dsp::{BiquadFilter, BiquadType, MultichannelFilterBank};
use crate::error::Result;
use crate::node::ProcessContext;
use crate::property::{Properties, PropertyDescriptor, PropertyId};

pub(crate) const FILTER_TYPE: PropertyDescriptor =
    PropertyDescriptor::int("filter_type", BiquadType::Lowpass as i32, BiquadType::MIN, BiquadType::MAX);
/// Upper bound is narrowed to just below Nyquist at construction.
pub(crate) const FREQUENCY: PropertyDescriptor = PropertyDescriptor::float("frequency", 2_000.0, 1.0, f32::MAX);
pub(crate) const Q: PropertyDescriptor = PropertyDescriptor::float("q", 0.5, 0.001, f32::MAX);
pub(crate) const DBGAIN: PropertyDescriptor = PropertyDescriptor::float("dbgain", 0.0, -120.0, 60.0);

/// Keep a frequency property strictly between 0 and Nyquist.
///
/// A default that the sample rate cannot represent is moved to a quarter of
/// the sample rate first.
pub(crate) fn limit_to_nyquist(properties: &mut Properties, id: PropertyId, ctx: &ProcessContext) -> Result<()> {
    let max = ctx.nyquist() - 1.0;
    if properties.float(id) > max {
        properties.init(id, ctx.nyquist() / 2.0)?;
    }
    properties.set_float_range(id, 1.0, max)
}

/// Where a node keeps the four biquad parameters in its property table.
pub(crate) struct FilterControls {
    pub filter_type: PropertyId,
    pub frequency: PropertyId,
    pub q: PropertyId,
    pub dbgain: PropertyId,
}

impl FilterControls {
    /// Reconfigure every filter of `bank` from the current property values.
    ///
    /// Filters are reset when the type differs from `previous`, which is then
    /// updated. Histories from one response family make no sense in another.
    pub(crate) fn apply(
        &self,
        properties: &Properties,
        bank: &mut MultichannelFilterBank<BiquadFilter>,
        previous: &mut BiquadType,
    ) {
        let Some(filter_type) = BiquadType::from_index(properties.int(self.filter_type)) else {
            warn!(value = properties.int(self.filter_type), "unknown filter type");
            return;
        };
        let frequency = properties.float(self.frequency);
        let q = properties.float(self.q);
        let db_gain = properties.float(self.dbgain);

        if let Err(e) = bank.configure_each(|f| f.configure(filter_type, frequency, db_gain, q)) {
            warn!(error = %e, "keeping previous filter coefficients");
            return;
        }
        if filter_type != *previous {
            trace!(from = ?*previous, to = ?filter_type, "filter type changed");
            bank.reset();
            *previous = filter_type;
        }
    }
}
