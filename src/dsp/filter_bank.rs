//! One filter instance per channel.

use alloc::vec::Vec;
use core::ops::{Index, IndexMut};

use dasp_graph::Buffer;
use delegate::delegate;
use itertools::izip;

/// A per-sample filter that can live in a [`MultichannelFilterBank`].
pub trait Filter: Send {
    /// A freshly constructed filter with empty history.
    fn new(sample_rate: f64) -> Self
    where
        Self: Sized;

    fn tick(&mut self, sample: f32) -> f32;

    /// Filter a whole block in place.
    fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.tick(*sample);
        }
    }

    fn reset(&mut self);
}

/// Independent filter state for every channel of a node, configured together.
///
/// ```
/// use klangkern::dsp::{BiquadFilter, BiquadType, MultichannelFilterBank};
///
/// let mut bank = MultichannelFilterBank::<BiquadFilter>::with_channels(48_000.0, 2);
/// bank.configure_each(|f| f.configure(BiquadType::Lowpass, 1_000.0, 0.0, 0.707)).unwrap();
/// let left = bank[0].tick(1.0);
/// let right = bank[1].tick(0.0);
/// assert!(left > 0.0);
/// assert_eq!(right, 0.0);
/// ```
#[derive(Clone, Debug)]
pub struct MultichannelFilterBank<T> {
    filters: Vec<T>,
    sample_rate: f64,
}

impl<T: Filter> MultichannelFilterBank<T> {
    /// An empty bank. Use [`resize`](Self::resize) to add channels.
    pub fn new(sample_rate: f64) -> Self {
        Self {
            filters: Vec::new(),
            sample_rate,
        }
    }

    pub fn with_channels(sample_rate: f64, channels: usize) -> Self {
        let mut bank = Self::new(sample_rate);
        bank.resize(channels);
        bank
    }

    delegate! {
        to self.filters {
            pub fn len(&self) -> usize;
            pub fn is_empty(&self) -> bool;
            pub fn iter(&self) -> core::slice::Iter<'_, T>;
            pub fn iter_mut(&mut self) -> core::slice::IterMut<'_, T>;
        }
    }

    /// Grow or shrink to exactly `channels` filters.
    ///
    /// Retained filters keep their state, new ones start empty, and trailing
    /// ones are dropped. Resizing to the current size does nothing.
    pub fn resize(&mut self, channels: usize) {
        if channels == self.filters.len() {
            return;
        }
        let sample_rate = self.sample_rate;
        self.filters.resize_with(channels, || T::new(sample_rate));
    }

    /// Run `configure` on every filter, stopping at the first error.
    pub fn configure_each<E>(&mut self, mut configure: impl FnMut(&mut T) -> Result<(), E>) -> Result<(), E> {
        self.filters.iter_mut().try_for_each(|f| configure(f))
    }

    pub fn reset(&mut self) {
        self.filters.iter_mut().for_each(Filter::reset);
    }

    /// Filter channel `i` of `inputs` into channel `i` of `outputs`.
    ///
    /// Channels beyond the shortest of the three are left alone.
    pub fn process(&mut self, inputs: &[Buffer], outputs: &mut [Buffer]) {
        for (filter, input, output) in izip!(self.filters.iter_mut(), inputs, outputs.iter_mut()) {
            for (o, &i) in output.iter_mut().zip(input.iter()) {
                *o = filter.tick(i);
            }
        }
    }

    pub fn process_in_place(&mut self, buffers: &mut [Buffer]) {
        for (filter, buffer) in self.filters.iter_mut().zip(buffers.iter_mut()) {
            filter.process(buffer);
        }
    }
}

impl<T> Index<usize> for MultichannelFilterBank<T> {
    type Output = T;

    fn index(&self, channel: usize) -> &T {
        &self.filters[channel]
    }
}

impl<T> IndexMut<usize> for MultichannelFilterBank<T> {
    fn index_mut(&mut self, channel: usize) -> &mut T {
        &mut self.filters[channel]
    }
}
