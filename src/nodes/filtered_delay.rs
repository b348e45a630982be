//! Delay with a biquad in the signal path and optional feedback.

use alloc::vec::Vec;

use dasp_graph::Buffer;
use itertools::izip;
use tracing::{debug, trace, warn};

use super::{limit_to_nyquist, FilterControls, DBGAIN, FILTER_TYPE, FREQUENCY, Q};
use crate::dsp::delay_line::DEFAULT_INTERPOLATION_TIME;
use crate::dsp::{BiquadFilter, BiquadType, CrossfadingDelayLine, MultichannelFilterBank};
use crate::error::Result;
use crate::node::{check_channels, AudioNode, ProcessContext};
use crate::property::{Properties, PropertyDescriptor, PropertyId};

const DESCRIPTORS: [PropertyDescriptor; 8] = [
    // range narrowed to [0, delay_max] at construction
    PropertyDescriptor::float("delay", 0.0, 0.0, f32::MAX),
    PropertyDescriptor::float("delay_max", 0.0, 0.0, f32::MAX).read_only(),
    PropertyDescriptor::float("feedback", 0.0, -1.0, 1.0),
    PropertyDescriptor::float("interpolation_time", DEFAULT_INTERPOLATION_TIME, 0.0, f32::MAX),
    FILTER_TYPE,
    FREQUENCY,
    Q,
    DBGAIN,
];

const FILTER: FilterControls = FilterControls {
    filter_type: FilteredDelayNode::FILTER_TYPE,
    frequency: FilteredDelayNode::FREQUENCY,
    q: FilteredDelayNode::Q,
    dbgain: FilteredDelayNode::DBGAIN,
};

/// A delay line per channel whose output runs through a biquad filter.
///
/// With non-zero `feedback` the filtered output is scaled and mixed back into
/// the line, so every repeat is filtered again:
///
/// ```text
/// out[t] = H(in[t - d] + feedback * out[t - d])
/// ```
///
/// Changing `delay` crossfades between the old and new read positions over
/// `interpolation_time` seconds. The filter is retuned from its properties on
/// every block; retuning is cheap and does not click.
pub struct FilteredDelayNode {
    channels: usize,
    max_delay: f32,
    properties: Properties,
    /// Generation of `properties` at the end of the last block.
    seen: u64,

    lines: Vec<CrossfadingDelayLine>,
    filters: MultichannelFilterBank<BiquadFilter>,
    filter_type: BiquadType,
}

impl FilteredDelayNode {
    /// Delay in seconds, `[0, delay_max]`.
    pub const DELAY: PropertyId = PropertyId::new(0);
    /// Longest possible delay, fixed at construction (read-only).
    pub const DELAY_MAX: PropertyId = PropertyId::new(1);
    /// Amount of filtered output fed back into the line, `[-1, 1]`.
    pub const FEEDBACK: PropertyId = PropertyId::new(2);
    /// Seconds a delay change takes.
    pub const INTERPOLATION_TIME: PropertyId = PropertyId::new(3);
    /// A [`BiquadType`] discriminant.
    pub const FILTER_TYPE: PropertyId = PropertyId::new(4);
    pub const FREQUENCY: PropertyId = PropertyId::new(5);
    pub const Q: PropertyId = PropertyId::new(6);
    pub const DBGAIN: PropertyId = PropertyId::new(7);

    pub fn new(ctx: &ProcessContext, max_delay: f32, channels: usize) -> Result<Self> {
        let channels = check_channels(channels)?;
        let sample_rate = ctx.sample_rate_f64();
        let lines = (0..channels)
            .map(|_| CrossfadingDelayLine::new(max_delay, sample_rate))
            .collect::<Result<Vec<_>>>()?;

        let mut properties = Properties::new(&DESCRIPTORS);
        properties.set_float_range(Self::DELAY, 0.0, max_delay)?;
        properties.init(Self::DELAY_MAX, max_delay)?;
        limit_to_nyquist(&mut properties, Self::FREQUENCY, ctx)?;

        let mut filter_type = BiquadType::try_from(properties.int(Self::FILTER_TYPE))?;
        let mut filters = MultichannelFilterBank::with_channels(sample_rate, channels);
        FILTER.apply(&properties, &mut filters, &mut filter_type);

        debug!(channels, max_delay, "created filtered delay");
        let seen = properties.generation();
        Ok(Self {
            channels,
            max_delay,
            properties,
            seen,
            lines,
            filters,
            filter_type,
        })
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn max_delay(&self) -> f32 {
        self.max_delay
    }

    /// Delay of the first channel in samples, or the one it is heading to.
    pub fn delay_samples(&self) -> usize {
        self.lines.first().map_or(0, CrossfadingDelayLine::delay_samples)
    }

    /// Push changed properties into the lines and retune the filters.
    fn update(&mut self) {
        let seen = self.seen;
        let properties = &self.properties;

        if properties.changed_since(Self::INTERPOLATION_TIME, seen) {
            let time = properties.float(Self::INTERPOLATION_TIME);
            trace!(time, "interpolation time changed");
            for line in self.lines.iter_mut() {
                if let Err(e) = line.set_interpolation_time(time) {
                    warn!(error = %e, "ignoring interpolation time");
                }
            }
        }

        if properties.changed_since(Self::DELAY, seen) {
            let delay = properties.float(Self::DELAY);
            trace!(delay, "delay changed");
            for line in self.lines.iter_mut() {
                if let Err(e) = line.set_delay(delay) {
                    warn!(error = %e, "ignoring delay");
                }
            }
        }

        FILTER.apply(properties, &mut self.filters, &mut self.filter_type);
        self.seen = properties.generation();
    }
}

impl AudioNode for FilteredDelayNode {
    type Message = ();

    fn process(&mut self, _ctx: &ProcessContext, inputs: &[Buffer], outputs: &mut [Buffer]) {
        self.update();

        let channels = self.channels;
        if inputs.len() < channels || outputs.len() < channels {
            outputs.iter_mut().for_each(Buffer::silence);
            return;
        }
        let feedback = self.properties.float(Self::FEEDBACK);

        if feedback == 0.0 {
            for (line, input, output) in izip!(self.lines.iter_mut(), inputs, outputs.iter_mut()) {
                line.process_buffer(input, output);
            }
            self.filters.process_in_place(&mut outputs[..channels]);
        } else {
            // Each write depends on the sample just read, so this has to go
            // one sample at a time.
            for (line, filter, input, output) in
                izip!(self.lines.iter_mut(), self.filters.iter_mut(), inputs, outputs.iter_mut())
            {
                for (out, &x) in output.iter_mut().zip(input.iter()) {
                    let y = filter.tick(line.compute_sample());
                    line.advance(x + y * feedback);
                    *out = y;
                }
            }
        }
    }

    fn reset(&mut self) {
        self.lines.iter_mut().for_each(CrossfadingDelayLine::reset);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    const SR: u32 = 48_000;

    fn ctx() -> ProcessContext {
        ProcessContext::new(SR).unwrap()
    }

    /// Deterministic white-ish noise in [-1, 1).
    fn noise(len: usize, mut state: u32) -> Vec<f32> {
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 23) as f32 - 1.0
            })
            .collect()
    }

    /// Feed a mono signal through `node` block by block, calling `before`
    /// ahead of every block with its index.
    fn render(
        node: &mut FilteredDelayNode,
        signal: &[f32],
        mut before: impl FnMut(usize, &mut FilteredDelayNode),
    ) -> Vec<f32> {
        let mut out = Vec::with_capacity(signal.len());
        let mut input = vec![Buffer::SILENT; 1];
        let mut output = vec![Buffer::SILENT; 1];
        for (block, chunk) in signal.chunks(Buffer::LEN).enumerate() {
            before(block, node);
            input[0].silence();
            input[0][..chunk.len()].copy_from_slice(chunk);
            node.process(&ctx(), &input, &mut output);
            out.extend_from_slice(&output[0][..chunk.len()]);
        }
        out
    }

    fn samples(n: usize) -> f32 {
        n as f32 / SR as f32
    }

    #[test]
    fn construction_errors() {
        assert_eq!(FilteredDelayNode::new(&ctx(), 1.0, 0).err(), Some(Error::InvalidChannelCount(0)));
        assert!(matches!(
            FilteredDelayNode::new(&ctx(), 0.0, 2),
            Err(Error::Range { name: "max_delay", .. })
        ));
        for max_delay in [1e30, f32::MAX] {
            assert!(matches!(
                FilteredDelayNode::new(&ctx(), max_delay, 2),
                Err(Error::Range { name: "max_delay", .. })
            ));
        }
    }

    #[test]
    fn delay_range_follows_max_delay() {
        let mut node = FilteredDelayNode::new(&ctx(), 0.5, 2).unwrap();
        let props = node.properties_mut();
        assert_eq!(props.float(FilteredDelayNode::DELAY_MAX), 0.5);
        assert_eq!(props.set_float(FilteredDelayNode::DELAY_MAX, 1.0), Err(Error::ReadOnly("delay_max")));
        assert!(matches!(
            props.set_float(FilteredDelayNode::DELAY, 0.75),
            Err(Error::Range { name: "delay", .. })
        ));
        assert!(props.set_float(FilteredDelayNode::DELAY, 0.5).is_ok());
        assert!(props.set_float(FilteredDelayNode::FREQUENCY, 24_000.0).is_err());
        assert!(props.set_float(FilteredDelayNode::FREQUENCY, 23_999.0).is_ok());
    }

    #[test]
    fn without_feedback_bulk_matches_sample_wise() {
        let mut node = FilteredDelayNode::new(&ctx(), 0.1, 1).unwrap();
        let mut line = CrossfadingDelayLine::new(0.1, SR as f64).unwrap();
        let mut filter = BiquadFilter::new(SR as f64);
        filter.configure(BiquadType::Lowpass, 2_000.0, 0.0, 0.5).unwrap();

        let signal = noise(Buffer::LEN * 40, 7);
        let out = render(&mut node, &signal, |block, node| {
            if block == 5 {
                node.properties_mut().set_float(FilteredDelayNode::DELAY, 0.01).unwrap();
            }
            if block == 20 {
                node.properties_mut().set_float(FilteredDelayNode::DELAY, 0.004).unwrap();
            }
        });

        for (t, (&x, &y)) in signal.iter().zip(&out).enumerate() {
            if t == 5 * Buffer::LEN {
                line.set_delay(0.01).unwrap();
            }
            if t == 20 * Buffer::LEN {
                line.set_delay(0.004).unwrap();
            }
            let expected = filter.tick(line.compute_sample());
            line.advance(x);
            assert_eq!(y, expected, "sample {}", t);
        }
        assert_eq!(node.delay_samples(), 192);
    }

    #[test]
    fn feedback_follows_recurrence_with_identity_filter() {
        let d = 10;
        let fb = 0.5;
        let mut node = FilteredDelayNode::new(&ctx(), 0.1, 1).unwrap();
        {
            let props = node.properties_mut();
            props.set_int(FilteredDelayNode::FILTER_TYPE, BiquadType::Identity as i32).unwrap();
            props.set_float(FilteredDelayNode::INTERPOLATION_TIME, 0.0).unwrap();
            props.set_float(FilteredDelayNode::DELAY, samples(d)).unwrap();
            props.set_float(FilteredDelayNode::FEEDBACK, fb).unwrap();
        }

        let signal = noise(Buffer::LEN * 8, 11);
        let out = render(&mut node, &signal, |_, _| {});
        for t in 0..out.len() {
            let expected = if t >= d { signal[t - d] + fb * out[t - d] } else { 0.0 };
            assert!((out[t] - expected).abs() < 1e-6, "sample {}: {} vs {}", t, out[t], expected);
        }
    }

    #[test]
    fn feedback_is_filtered_on_every_pass() {
        let d = 37;
        let fb = -0.7;
        let mut node = FilteredDelayNode::new(&ctx(), 0.1, 1).unwrap();
        {
            let props = node.properties_mut();
            props.set_float(FilteredDelayNode::INTERPOLATION_TIME, 0.0).unwrap();
            props.set_float(FilteredDelayNode::DELAY, samples(d)).unwrap();
            props.set_float(FilteredDelayNode::FEEDBACK, fb).unwrap();
            props.set_float(FilteredDelayNode::FREQUENCY, 3_000.0).unwrap();
        }
        let mut reference = BiquadFilter::new(SR as f64);
        reference.configure(BiquadType::Lowpass, 3_000.0, 0.0, 0.5).unwrap();

        let signal = noise(Buffer::LEN * 10, 3);
        let out = render(&mut node, &signal, |_, _| {});
        let mut written = Vec::with_capacity(signal.len());
        for t in 0..out.len() {
            let delayed = if t >= d { written[t - d] } else { 0.0 };
            let expected = reference.tick(delayed);
            written.push(signal[t] + fb * expected);
            assert!((out[t] - expected).abs() < 1e-5, "sample {}: {} vs {}", t, out[t], expected);
        }
    }

    #[test]
    fn changing_filter_type_resets_history() {
        let mut node = FilteredDelayNode::new(&ctx(), 0.1, 1).unwrap();
        let signal = noise(Buffer::LEN * 3, 5);
        let out = render(&mut node, &signal, |block, node| {
            if block == 2 {
                node.properties_mut()
                    .set_int(FilteredDelayNode::FILTER_TYPE, BiquadType::Highpass as i32)
                    .unwrap();
            }
        });

        let mut line = CrossfadingDelayLine::new(0.1, SR as f64).unwrap();
        let mut delayed = vec![0.0; signal.len()];
        line.process_buffer(&signal, &mut delayed);
        let mut fresh = BiquadFilter::new(SR as f64);
        fresh.configure(BiquadType::Highpass, 2_000.0, 0.0, 0.5).unwrap();
        for t in 2 * Buffer::LEN..signal.len() {
            assert_eq!(out[t], fresh.tick(delayed[t]), "sample {}", t);
        }
    }

    #[test]
    fn reset_clears_memory_and_keeps_delay() {
        let mut node = FilteredDelayNode::new(&ctx(), 0.1, 1).unwrap();
        {
            let props = node.properties_mut();
            props.set_int(FilteredDelayNode::FILTER_TYPE, BiquadType::Identity as i32).unwrap();
            props.set_float(FilteredDelayNode::DELAY, samples(48)).unwrap();
            props.set_float(FilteredDelayNode::FEEDBACK, 0.5).unwrap();
        }
        render(&mut node, &noise(Buffer::LEN * 4, 1), |_, _| {});
        node.reset();

        let mut impulse = vec![0.0; Buffer::LEN * 2];
        impulse[0] = 1.0;
        let out = render(&mut node, &impulse, |_, _| {});
        assert_eq!(out[48], 1.0);
        assert!(out.iter().enumerate().all(|(t, &s)| t == 48 || t == 96 || s == 0.0));
        assert_eq!(out[96], 0.5);
    }

    #[test]
    fn channels_are_independent() {
        let mut node = FilteredDelayNode::new(&ctx(), 0.1, 2).unwrap();
        let mut inputs = vec![Buffer::SILENT; 2];
        inputs[0][0] = 1.0;
        let mut outputs = vec![Buffer::SILENT; 2];
        node.process(&ctx(), &inputs, &mut outputs);
        assert!(outputs[0].iter().any(|&s| s != 0.0));
        assert!(outputs[1].iter().all(|&s| s == 0.0));
    }
}
