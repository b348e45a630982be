//! Core node trait and context types.

use dasp_graph::Buffer;

use crate::error::{Error, Result};
use crate::property::{Properties, PropertyId, PropertyValue};

/// Information shared by every node of one host.
///
/// Passed to node constructors (which size their filters and delay lines from
/// it) and to every [`AudioNode::process`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessContext {
    /// Sample rate of the host in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,
    /// Number of samples per buffer (always [`Buffer::LEN`], 64)
    pub block_size: usize,
}

impl ProcessContext {
    pub fn new(sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::InvalidSampleRate(sample_rate));
        }
        Ok(Self {
            sample_rate,
            block_size: Buffer::LEN,
        })
    }

    #[inline]
    pub fn sample_rate_f64(&self) -> f64 {
        self.sample_rate as f64
    }

    /// Highest frequency a filter may be tuned to.
    #[inline]
    pub fn nyquist(&self) -> f32 {
        self.sample_rate as f32 / 2.0
    }
}

/// A control-side request, applied by a [`NodeRunner`](crate::NodeRunner) at
/// the top of the next block.
pub enum Control<M> {
    /// Write an already-validated value into the property table.
    SetProperty(PropertyId, PropertyValue),
    /// Call [`AudioNode::reset`].
    Reset,
    /// Node-specific message, see [`AudioNode::Message`].
    Node(M),
}

/// The core trait for audio processing nodes.
///
/// A scheduler outside this crate calls [`process`](Self::process) exactly once
/// per block, in dependency order. The node:
/// 1. compares the revisions of the properties it cares about with the
///    generation it saw last block and reconfigures its DSP state if needed,
/// 2. reads `inputs`,
/// 3. writes every sample of `outputs`.
///
/// Inputs and outputs are flat channel lists. A node with two stereo inputs
/// sees four input buffers: input 0 left, input 0 right, input 1 left, input 1
/// right.
///
/// `process` must not allocate, lock or fail. Everything it reads was validated
/// when it was written.
pub trait AudioNode: Send + 'static {
    /// Node-specific messages (use `()` if none are needed).
    type Message: Send + 'static;

    /// Process one block of audio.
    fn process(&mut self, ctx: &ProcessContext, inputs: &[Buffer], outputs: &mut [Buffer]);

    /// Clear filter and delay memory without reallocating.
    fn reset(&mut self);

    /// Apply a node-specific message. Called between blocks.
    fn handle_message(&mut self, _message: Self::Message) {}

    fn properties(&self) -> &Properties;

    fn properties_mut(&mut self) -> &mut Properties;

    /// Number of input channels, summed over all inputs.
    fn num_inputs(&self) -> usize;

    /// Number of output channels.
    fn num_outputs(&self) -> usize;
}

/// Reject zero channel counts before anything gets allocated.
pub(crate) fn check_channels(channels: usize) -> Result<usize> {
    if channels == 0 {
        Err(Error::InvalidChannelCount(channels))
    } else {
        Ok(channels)
    }
}
