//! Ring-buffer delay line that changes length without clicking.
//!
//! Jumping the read position of a delay line produces a discontinuity in its
//! output. [`CrossfadingDelayLine`] instead keeps reading from the old position
//! while it fades in a second cursor at the new position, over the configured
//! interpolation time. When the fade completes only the new cursor is read.
//!
//! Delays are whole samples. The shortest delay is one sample: the read happens
//! before the write so that a feedback loop can route the output back into the
//! input of the same sample frame.

use alloc::vec;
use alloc::vec::Vec;

use crate::error::{Error, Result};

/// Interpolation time a new line starts with, in seconds.
pub const DEFAULT_INTERPOLATION_TIME: f32 = 0.001;

/// Longest line that will be allocated, in samples (1 GiB of `f32`).
pub const MAX_DELAY_SAMPLES: usize = 1 << 28;

pub struct CrossfadingDelayLine {
    line: Vec<f32>,
    sample_rate: f64,
    max_delay: f32,
    write_head: usize,

    /// Offset of the cursor being read (the "old" one during a transition).
    current_delay: usize,
    /// Offset being faded in.
    new_delay: usize,
    /// Requested while a transition was running; starts when it ends.
    queued_delay: Option<usize>,

    old_weight: f32,
    new_weight: f32,
    delta: f32,
    interpolation_time: f32,
    interpolating: bool,
}

impl CrossfadingDelayLine {
    /// Allocate a line able to hold `max_delay` seconds at `sample_rate`.
    ///
    /// This is the only allocation the line ever makes.
    pub fn new(max_delay: f32, sample_rate: f64) -> Result<Self> {
        if !(max_delay > 0.0 && max_delay.is_finite()) {
            return Err(Error::range("max_delay", max_delay, 0.0, f32::MAX));
        }
        if !(sample_rate > 0.0 && sample_rate.is_finite()) {
            return Err(Error::range("sample_rate", sample_rate, 0.0, f64::MAX));
        }
        let max_samples = (max_delay as f64 * sample_rate).round();
        if max_samples >= MAX_DELAY_SAMPLES as f64 {
            let limit = (MAX_DELAY_SAMPLES - 1) as f64 / sample_rate;
            return Err(Error::range("max_delay", max_delay, 0.0, limit));
        }
        let max_samples = (max_samples as usize).max(1);

        let mut line = Self {
            line: vec![0.0; max_samples + 1],
            sample_rate,
            max_delay,
            write_head: 0,
            current_delay: 1,
            new_delay: 1,
            queued_delay: None,
            old_weight: 1.0,
            new_weight: 0.0,
            delta: 1.0,
            interpolation_time: DEFAULT_INTERPOLATION_TIME,
            interpolating: false,
        };
        line.set_interpolation_time(DEFAULT_INTERPOLATION_TIME)?;
        Ok(line)
    }

    pub fn max_delay(&self) -> f32 {
        self.max_delay
    }

    /// Ring size in samples (longest delay plus one).
    pub fn capacity(&self) -> usize {
        self.line.len()
    }

    /// Delay the line is at, or heading towards, in samples.
    pub fn delay_samples(&self) -> usize {
        match (self.interpolating, self.queued_delay) {
            (true, Some(queued)) => queued,
            (true, None) => self.new_delay,
            (false, _) => self.current_delay,
        }
    }

    pub fn interpolation_time(&self) -> f32 {
        self.interpolation_time
    }

    pub fn is_interpolating(&self) -> bool {
        self.interpolating
    }

    fn to_samples(&self, seconds: f32) -> usize {
        let samples = (seconds as f64 * self.sample_rate).round() as usize;
        samples.clamp(1, self.line.len() - 1)
    }

    /// Change the delay, crossfading from the current read position.
    ///
    /// A request equal to the delay the line is already heading to does
    /// nothing. A request that arrives mid-transition is held and started as
    /// soon as the running transition completes.
    pub fn set_delay(&mut self, seconds: f32) -> Result<()> {
        if !(seconds >= 0.0 && seconds <= self.max_delay) {
            return Err(Error::range("delay", seconds, 0.0, self.max_delay));
        }
        let samples = self.to_samples(seconds);

        if self.interpolating {
            self.queued_delay = if samples == self.new_delay { None } else { Some(samples) };
            return Ok(());
        }
        if samples != self.current_delay {
            self.begin_transition(samples);
        }
        Ok(())
    }

    /// How long a delay change takes. Zero switches on the next sample.
    pub fn set_interpolation_time(&mut self, seconds: f32) -> Result<()> {
        if !(seconds >= 0.0 && seconds.is_finite()) {
            return Err(Error::range("interpolation_time", seconds, 0.0, f32::MAX));
        }
        let samples = seconds as f64 * self.sample_rate;
        self.delta = if samples <= 1.0 { 1.0 } else { (1.0 / samples) as f32 };
        self.interpolation_time = seconds;
        Ok(())
    }

    fn begin_transition(&mut self, samples: usize) {
        self.new_delay = samples;
        self.old_weight = 1.0;
        self.new_weight = 0.0;
        self.interpolating = true;
    }

    fn finish_transition(&mut self) {
        self.current_delay = self.new_delay;
        self.old_weight = 1.0;
        self.new_weight = 0.0;
        self.interpolating = false;
        if let Some(queued) = self.queued_delay.take() {
            if queued != self.current_delay {
                self.begin_transition(queued);
            }
        }
    }

    #[inline]
    fn read_index(&self, delay: usize) -> usize {
        let len = self.line.len();
        let i = self.write_head + len - delay;
        if i >= len {
            i - len
        } else {
            i
        }
    }

    /// The delayed sample for the current frame. Does not advance.
    #[inline]
    pub fn compute_sample(&self) -> f32 {
        let current = self.line[self.read_index(self.current_delay)];
        if !self.interpolating {
            return current;
        }
        let new = self.line[self.read_index(self.new_delay)];
        self.old_weight * current + self.new_weight * new
    }

    /// Write `sample` and move to the next frame.
    #[inline]
    pub fn advance(&mut self, sample: f32) {
        self.line[self.write_head] = sample;
        self.write_head += 1;
        if self.write_head == self.line.len() {
            self.write_head = 0;
        }

        if self.interpolating {
            self.new_weight += self.delta;
            if self.new_weight >= 1.0 {
                self.finish_transition();
            } else {
                self.old_weight = 1.0 - self.new_weight;
            }
        }
    }

    /// Delay `input` into `output` in one pass. Only valid without feedback.
    ///
    /// Produces exactly what interleaved [`compute_sample`](Self::compute_sample)
    /// / [`advance`](Self::advance) calls would.
    pub fn process_buffer(&mut self, input: &[f32], output: &mut [f32]) {
        let n = input.len().min(output.len());
        let mut i = 0;

        while i < n && self.interpolating {
            output[i] = self.compute_sample();
            self.advance(input[i]);
            i += 1;
        }

        let len = self.line.len();
        let mut w = self.write_head;
        let mut r = self.read_index(self.current_delay);
        for (o, &x) in output[i..n].iter_mut().zip(&input[i..n]) {
            *o = self.line[r];
            self.line[w] = x;
            w += 1;
            if w == len {
                w = 0;
            }
            r += 1;
            if r == len {
                r = 0;
            }
        }
        self.write_head = w;
    }

    /// Zero the contents and cursors. Any pending transition is collapsed onto
    /// its destination so the configured delay is kept.
    pub fn reset(&mut self) {
        self.line.fill(0.0);
        self.write_head = 0;
        if self.interpolating {
            self.current_delay = self.queued_delay.take().unwrap_or(self.new_delay);
        }
        self.new_delay = self.current_delay;
        self.queued_delay = None;
        self.old_weight = 1.0;
        self.new_weight = 0.0;
        self.interpolating = false;
    }
}
