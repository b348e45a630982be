//! Linear crossfade between inputs

use alloc::boxed::Box;

use dasp_graph::Buffer;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::node::{check_channels, AudioNode, ProcessContext};
use crate::property::{Properties, PropertyDescriptor, PropertyId};

/// Called on the audio thread when a crossfade completes. Must be realtime-safe.
pub type FinishedCallback = Box<dyn FnMut() + Send>;

/// Messages to control a crossfader
pub enum CrossfaderMessage {
    /// Fade to `input` over `duration` seconds (instantly if `duration <= 0`,
    /// rejected if it is not finite)
    Crossfade { duration: f32, input: usize },
    /// Jump to the end of the running crossfade
    FinishCrossfade,
    /// Replace (or clear) the completion callback
    SetFinishedCallback(Option<FinishedCallback>),
}

/// Blends between `inputs` multichannel inputs, two at a time.
///
/// While idle the output is a copy of the current input. A crossfade moves the
/// weight linearly from the current input to the target; the weights always
/// sum to one. When the target weight reaches one the target becomes the
/// current input and the finished callback fires, once, inside the block in
/// which that happened.
///
/// Requesting a new crossfade while one is running keeps the weights where
/// they are and continues from there towards the new target, finishing after
/// the new duration. The weights never jump, but only two inputs are mixed at
/// a time: if the new target differs from the old one, the old target's
/// share is handed to the new target at once, so the output can step.
///
/// The callback fires once per completed transition. A retarget replaces the
/// running transition, so two overlapping `crossfade` calls give one callback.
pub struct CrossfaderNode {
    channels: usize,
    inputs: usize,
    sample_rate: f32,
    properties: Properties,

    current: usize,
    target: usize,
    current_weight: f32,
    target_weight: f32,
    delta: f32,
    crossfading: bool,
    finished_callback: Option<FinishedCallback>,
}

impl CrossfaderNode {
    /// Input currently at full weight when idle (read-only).
    pub const CURRENT_INPUT: PropertyId = PropertyId::new(0);
    /// Input being faded to (read-only).
    pub const TARGET_INPUT: PropertyId = PropertyId::new(1);
    /// 1 while a crossfade is running (read-only).
    pub const IS_CROSSFADING: PropertyId = PropertyId::new(2);

    pub fn new(ctx: &ProcessContext, channels: usize, inputs: usize) -> Result<Self> {
        let channels = check_channels(channels)?;
        if inputs == 0 {
            return Err(Error::range("inputs", 0u32, 1u32, u32::MAX));
        }
        let last = (inputs - 1) as i32;
        let properties = Properties::new(&[
            PropertyDescriptor::int("current_input", 0, 0, last).read_only(),
            PropertyDescriptor::int("target_input", 0, 0, last).read_only(),
            PropertyDescriptor::int("is_crossfading", 0, 0, 1).read_only(),
        ]);

        debug!(channels, inputs, "created crossfader");
        Ok(Self {
            channels,
            inputs,
            sample_rate: ctx.sample_rate as f32,
            properties,
            current: 0,
            target: 0,
            current_weight: 1.0,
            target_weight: 0.0,
            delta: 0.0,
            crossfading: false,
            finished_callback: None,
        })
    }

    /// Attach a completion callback.
    pub fn with_finished_callback(mut self, callback: impl FnMut() + Send + 'static) -> Self {
        self.finished_callback = Some(Box::new(callback));
        self
    }

    /// Replace the completion callback, returning the previous one.
    pub fn set_finished_callback(&mut self, callback: Option<FinishedCallback>) -> Option<FinishedCallback> {
        core::mem::replace(&mut self.finished_callback, callback)
    }

    /// Start fading towards `input`.
    pub fn crossfade(&mut self, duration: f32, input: usize) -> Result<()> {
        if input >= self.inputs {
            return Err(Error::range("input", input as u32, 0u32, (self.inputs - 1) as u32));
        }
        if !duration.is_finite() {
            return Err(Error::range("duration", duration, 0.0, f32::MAX));
        }
        let delta = if duration > 0.0 {
            // Cover what is left of the current weight, not a full 1.0, so a
            // retarget keeps going from where the weights are now.
            (self.current_weight as f64 / (duration as f64 * self.sample_rate as f64)) as f32
        } else {
            // completes on the first sample of the next block
            1.0
        };
        // a step that rounds to zero would never finish
        if !(delta > 0.0) {
            return Err(Error::range("duration", duration, 0.0, f32::MAX));
        }
        self.target = input;
        self.delta = delta;
        self.target_weight = 1.0 - self.current_weight;
        self.crossfading = true;
        self.properties.publish(Self::TARGET_INPUT, input as i32);
        self.properties.publish(Self::IS_CROSSFADING, true);
        trace!(from = self.current, to = input, duration, "crossfade started");
        Ok(())
    }

    /// Complete the running crossfade now. Does nothing when idle.
    pub fn finish_crossfade(&mut self) {
        if self.crossfading {
            self.complete();
        }
    }

    fn complete(&mut self) {
        self.current = self.target;
        self.current_weight = 1.0;
        self.target_weight = 0.0;
        self.delta = 0.0;
        self.crossfading = false;
        self.properties.publish(Self::CURRENT_INPUT, self.current as i32);
        self.properties.publish(Self::IS_CROSSFADING, false);
        trace!(input = self.current, "crossfade finished");
        if let Some(callback) = self.finished_callback.as_mut() {
            callback();
        }
    }

    #[inline]
    fn step(&mut self) {
        self.current_weight -= self.delta;
        if self.current_weight <= 0.0 {
            self.complete();
        } else {
            self.target_weight = 1.0 - self.current_weight;
        }
    }

    #[inline]
    pub fn current_input(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn target_input(&self) -> usize {
        self.target
    }

    #[inline]
    pub fn current_weight(&self) -> f32 {
        self.current_weight
    }

    #[inline]
    pub fn target_weight(&self) -> f32 {
        self.target_weight
    }

    #[inline]
    pub fn is_crossfading(&self) -> bool {
        self.crossfading
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn inputs(&self) -> usize {
        self.inputs
    }
}

impl AudioNode for CrossfaderNode {
    type Message = CrossfaderMessage;

    fn process(&mut self, _ctx: &ProcessContext, inputs: &[Buffer], outputs: &mut [Buffer]) {
        let channels = self.channels;
        if outputs.len() < channels {
            return;
        }
        if inputs.len() < channels * self.inputs {
            outputs.iter_mut().for_each(Buffer::silence);
            return;
        }
        let outputs = &mut outputs[..channels];
        let block = outputs[0].len();

        let mut i = 0;
        while i < block && self.crossfading {
            self.step();
            let cur = self.current * channels;
            let tgt = self.target * channels;
            let (cw, tw) = (self.current_weight, self.target_weight);
            for (ch, out) in outputs.iter_mut().enumerate() {
                out[i] = inputs[cur + ch][i] * cw + inputs[tgt + ch][i] * tw;
            }
            i += 1;
        }

        if i < block {
            let cur = self.current * channels;
            for (out, input) in outputs.iter_mut().zip(&inputs[cur..cur + channels]) {
                out[i..].copy_from_slice(&input[i..]);
            }
        }
    }

    /// No signal memory to clear; an in-flight crossfade keeps running.
    fn reset(&mut self) {}

    fn handle_message(&mut self, message: CrossfaderMessage) {
        match message {
            CrossfaderMessage::Crossfade { duration, input } => {
                if let Err(e) = self.crossfade(duration, input) {
                    warn!(error = %e, "dropping crossfade request");
                }
            }
            CrossfaderMessage::FinishCrossfade => self.finish_crossfade(),
            CrossfaderMessage::SetFinishedCallback(callback) => {
                self.set_finished_callback(callback);
            }
        }
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        self.channels * self.inputs
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        self.channels
    }
}
