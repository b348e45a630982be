//! Biquad filter node

use dasp_graph::Buffer;
use tracing::debug;

use super::{limit_to_nyquist, FilterControls, DBGAIN, FILTER_TYPE, FREQUENCY, Q};
use crate::dsp::{BiquadFilter, BiquadType, MultichannelFilterBank};
use crate::error::Result;
use crate::node::{check_channels, AudioNode, ProcessContext};
use crate::property::{Properties, PropertyDescriptor, PropertyId};

const DESCRIPTORS: [PropertyDescriptor; 4] = [FILTER_TYPE, FREQUENCY, Q, DBGAIN];

const FILTER: FilterControls = FilterControls {
    filter_type: BiquadNode::FILTER_TYPE,
    frequency: BiquadNode::FREQUENCY,
    q: BiquadNode::Q,
    dbgain: BiquadNode::DBGAIN,
};

/// One [`BiquadFilter`] per channel, all sharing the same settings.
pub struct BiquadNode {
    channels: usize,
    properties: Properties,
    seen: u64,
    filters: MultichannelFilterBank<BiquadFilter>,
    filter_type: BiquadType,
}

impl BiquadNode {
    /// A [`BiquadType`] discriminant. Changing it clears the filter history.
    pub const FILTER_TYPE: PropertyId = PropertyId::new(0);
    /// Cutoff or centre frequency in Hz, below Nyquist.
    pub const FREQUENCY: PropertyId = PropertyId::new(1);
    pub const Q: PropertyId = PropertyId::new(2);
    /// Gain in dB, used by the peaking and shelving types.
    pub const DBGAIN: PropertyId = PropertyId::new(3);

    const ALL: [PropertyId; 4] = [Self::FILTER_TYPE, Self::FREQUENCY, Self::Q, Self::DBGAIN];

    pub fn new(ctx: &ProcessContext, channels: usize) -> Result<Self> {
        let channels = check_channels(channels)?;
        let mut properties = Properties::new(&DESCRIPTORS);
        limit_to_nyquist(&mut properties, Self::FREQUENCY, ctx)?;

        let mut filter_type = BiquadType::try_from(properties.int(Self::FILTER_TYPE))?;
        let mut filters = MultichannelFilterBank::with_channels(ctx.sample_rate_f64(), channels);
        FILTER.apply(&properties, &mut filters, &mut filter_type);

        debug!(channels, "created biquad");
        Ok(Self {
            channels,
            seen: properties.generation(),
            properties,
            filters,
            filter_type,
        })
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Coefficients and history of channel `channel`.
    pub fn filter(&self, channel: usize) -> Option<&BiquadFilter> {
        self.filters.iter().nth(channel)
    }
}

impl AudioNode for BiquadNode {
    type Message = ();

    fn process(&mut self, _ctx: &ProcessContext, inputs: &[Buffer], outputs: &mut [Buffer]) {
        if self.properties.any_changed_since(&Self::ALL, self.seen) {
            FILTER.apply(&self.properties, &mut self.filters, &mut self.filter_type);
            self.seen = self.properties.generation();
        }
        self.filters.process(inputs, outputs);
    }

    fn reset(&mut self) {
        self.filters.reset();
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        self.channels
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        self.channels
    }
}
