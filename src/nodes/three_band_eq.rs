//! Three-band equalizer

use dasp_graph::Buffer;
use itertools::izip;
use tracing::{debug, trace, warn};

use super::limit_to_nyquist;
use crate::dsp::{BiquadFilter, BiquadType, MultichannelFilterBank};
use crate::error::Result;
use crate::node::{check_channels, AudioNode, ProcessContext};
use crate::property::{Properties, PropertyDescriptor, PropertyId};

const DESCRIPTORS: [PropertyDescriptor; 5] = [
    PropertyDescriptor::float("lowband_dbgain", 0.0, -120.0, 60.0),
    PropertyDescriptor::float("midband_dbgain", 0.0, -120.0, 60.0),
    PropertyDescriptor::float("highband_dbgain", 0.0, -120.0, 60.0),
    PropertyDescriptor::float("lowband_frequency", 300.0, 1.0, f32::MAX),
    PropertyDescriptor::float("highband_frequency", 4_000.0, 1.0, f32::MAX),
];

const HIGH_SHELF_Q: f32 = core::f32::consts::FRAC_1_SQRT_2;

/// Splits each channel into low, mid and high bands with separate gains.
///
/// The bands are realised in series: the whole signal is scaled by the low
/// band gain, a peaking filter centred between the two corner frequencies
/// adds the difference between the mid and low gains, and a high shelf at
/// `highband_frequency` adds the difference between the high and low gains.
pub struct ThreeBandEqNode {
    channels: usize,
    properties: Properties,
    seen: u64,

    lowband_gain: f32,
    midband_peaks: MultichannelFilterBank<BiquadFilter>,
    highband_shelves: MultichannelFilterBank<BiquadFilter>,
}

impl ThreeBandEqNode {
    pub const LOWBAND_DBGAIN: PropertyId = PropertyId::new(0);
    pub const MIDBAND_DBGAIN: PropertyId = PropertyId::new(1);
    pub const HIGHBAND_DBGAIN: PropertyId = PropertyId::new(2);
    /// Upper edge of the low band in Hz.
    pub const LOWBAND_FREQUENCY: PropertyId = PropertyId::new(3);
    /// Lower edge of the high band in Hz.
    pub const HIGHBAND_FREQUENCY: PropertyId = PropertyId::new(4);

    const ALL: [PropertyId; 5] = [
        Self::LOWBAND_DBGAIN,
        Self::MIDBAND_DBGAIN,
        Self::HIGHBAND_DBGAIN,
        Self::LOWBAND_FREQUENCY,
        Self::HIGHBAND_FREQUENCY,
    ];

    pub fn new(ctx: &ProcessContext, channels: usize) -> Result<Self> {
        let channels = check_channels(channels)?;
        let sample_rate = ctx.sample_rate_f64();

        let mut properties = Properties::new(&DESCRIPTORS);
        limit_to_nyquist(&mut properties, Self::LOWBAND_FREQUENCY, ctx)?;
        limit_to_nyquist(&mut properties, Self::HIGHBAND_FREQUENCY, ctx)?;

        let mut node = Self {
            channels,
            seen: properties.generation(),
            properties,
            lowband_gain: 1.0,
            midband_peaks: MultichannelFilterBank::with_channels(sample_rate, channels),
            highband_shelves: MultichannelFilterBank::with_channels(sample_rate, channels),
        };
        node.recompute()?;
        debug!(channels, "created three band eq");
        Ok(node)
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Linear gain applied to the whole signal.
    #[inline]
    pub fn lowband_gain(&self) -> f32 {
        self.lowband_gain
    }

    /// Re-derive the gain and both filter banks from the properties.
    pub fn recompute(&mut self) -> Result<()> {
        let p = &self.properties;
        let low_db = p.float(Self::LOWBAND_DBGAIN);
        let mid_db = p.float(Self::MIDBAND_DBGAIN);
        let high_db = p.float(Self::HIGHBAND_DBGAIN);
        let low_freq = p.float(Self::LOWBAND_FREQUENCY);
        let high_freq = p.float(Self::HIGHBAND_FREQUENCY);

        let center = (low_freq + high_freq) / 2.0;
        let width = (high_freq - low_freq).abs().max(1.0);
        let mid_q = center / width;

        self.midband_peaks
            .configure_each(|f| f.configure(BiquadType::Peaking, center, mid_db - low_db, mid_q))?;
        self.highband_shelves
            .configure_each(|f| f.configure(BiquadType::Highshelf, high_freq, high_db - low_db, HIGH_SHELF_Q))?;
        self.lowband_gain = 10f32.powf(low_db / 20.0);

        self.seen = self.properties.generation();
        trace!(low_db, mid_db, high_db, center, mid_q, "eq recomputed");
        Ok(())
    }
}

impl AudioNode for ThreeBandEqNode {
    type Message = ();

    fn process(&mut self, _ctx: &ProcessContext, inputs: &[Buffer], outputs: &mut [Buffer]) {
        if self.properties.any_changed_since(&Self::ALL, self.seen) {
            if let Err(e) = self.recompute() {
                warn!(error = %e, "keeping previous eq settings");
                self.seen = self.properties.generation();
            }
        }

        let gain = self.lowband_gain;
        for (peak, shelf, input, output) in izip!(
            self.midband_peaks.iter_mut(),
            self.highband_shelves.iter_mut(),
            inputs,
            outputs.iter_mut()
        ) {
            for (out, &x) in output.iter_mut().zip(input.iter()) {
                *out = shelf.tick(peak.tick(x * gain));
            }
        }
    }

    /// Clears filter history. Coefficients stay.
    fn reset(&mut self) {
        self.midband_peaks.reset();
        self.highband_shelves.reset();
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
