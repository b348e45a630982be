//! Second-order IIR filter cell.
//!
//! Coefficients come from the Audio EQ Cookbook
//! (<https://www.w3.org/TR/audio-eq-cookbook/>). Both the coefficients and the
//! two-sample history are kept in `f64`: long-running cascades in `f32` drift
//! audibly, especially at low corner frequencies where the poles sit close to
//! the unit circle.

use core::f64::consts::PI;

use crate::dsp::filter_bank::Filter;
use crate::error::{Error, Result};

/// Response families a [`BiquadFilter`] can be configured for.
///
/// The discriminants are the integer values of the `filter_type` property.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum BiquadType {
    Lowpass = 0,
    Highpass = 1,
    Bandpass = 2,
    Notch = 3,
    Allpass = 4,
    Peaking = 5,
    Lowshelf = 6,
    Highshelf = 7,
    Identity = 8,
}

impl BiquadType {
    pub const MIN: i32 = BiquadType::Lowpass as i32;
    pub const MAX: i32 = BiquadType::Identity as i32;

    pub fn from_index(index: i32) -> Option<Self> {
        use BiquadType::*;
        Some(match index {
            0 => Lowpass,
            1 => Highpass,
            2 => Bandpass,
            3 => Notch,
            4 => Allpass,
            5 => Peaking,
            6 => Lowshelf,
            7 => Highshelf,
            8 => Identity,
            _ => return None,
        })
    }
}

impl TryFrom<i32> for BiquadType {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        BiquadType::from_index(value).ok_or_else(|| Error::range("filter_type", value, Self::MIN, Self::MAX))
    }
}

/// Normalized coefficients (`a0` divided out).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoefficients {
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Cookbook design. Inputs are assumed valid; see [`BiquadFilter::configure`].
    pub fn design(filter_type: BiquadType, sample_rate: f64, frequency: f64, db_gain: f64, q: f64) -> Self {
        let w0 = 2.0 * PI * frequency / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);
        let a = 10f64.powf(db_gain / 40.0);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        // (b0, b1, b2, a0, a1, a2)
        let (b0, b1, b2, a0, a1, a2) = match filter_type {
            BiquadType::Lowpass => {
                let b1 = 1.0 - cos_w0;
                (b1 / 2.0, b1, b1 / 2.0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            BiquadType::Highpass => {
                let b0 = (1.0 + cos_w0) / 2.0;
                (b0, -(1.0 + cos_w0), b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            BiquadType::Bandpass => (alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha),
            BiquadType::Notch => (1.0, -2.0 * cos_w0, 1.0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha),
            BiquadType::Allpass => (
                1.0 - alpha,
                -2.0 * cos_w0,
                1.0 + alpha,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            BiquadType::Peaking => (
                1.0 + alpha * a,
                -2.0 * cos_w0,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * cos_w0,
                1.0 - alpha / a,
            ),
            BiquadType::Lowshelf => (
                a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
            ),
            BiquadType::Highshelf => (
                a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
            ),
            BiquadType::Identity => return Self::IDENTITY,
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Magnitude of the transfer function at `frequency` Hz.
    pub fn magnitude(&self, sample_rate: f64, frequency: f64) -> f64 {
        let w = 2.0 * PI * frequency / sample_rate;
        let (s1, c1) = w.sin_cos();
        let (s2, c2) = (2.0 * w).sin_cos();
        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = -(self.b1 * s1 + self.b2 * s2);
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = -(self.a1 * s1 + self.a2 * s2);
        (num_re.hypot(num_im)) / (den_re.hypot(den_im))
    }
}

/// One biquad section in Direct Form I.
#[derive(Clone, Debug)]
pub struct BiquadFilter {
    sample_rate: f64,
    coefs: BiquadCoefficients,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadFilter {
    /// A pass-through filter. Call [`configure`](Self::configure) to shape it.
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            coefs: BiquadCoefficients::IDENTITY,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Recompute coefficients. History is kept, so retuning a running filter
    /// does not click.
    ///
    /// Fails, leaving the current coefficients in place, if `frequency` is not
    /// inside `(0, nyquist)` or `q` is not positive.
    pub fn configure(&mut self, filter_type: BiquadType, frequency: f32, db_gain: f32, q: f32) -> Result<()> {
        let nyquist = self.sample_rate / 2.0;
        let frequency = frequency as f64;
        if !(frequency > 0.0 && frequency < nyquist) {
            return Err(Error::range("frequency", frequency, 0.0, nyquist));
        }
        if !(q > 0.0) || !q.is_finite() {
            return Err(Error::range("q", q, 0.0, f32::MAX));
        }
        if !db_gain.is_finite() {
            return Err(Error::range("dbgain", db_gain, f32::MIN, f32::MAX));
        }
        self.coefs = BiquadCoefficients::design(filter_type, self.sample_rate, frequency, db_gain as f64, q as f64);
        Ok(())
    }

    pub fn coefficients(&self) -> &BiquadCoefficients {
        &self.coefs
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Magnitude response of the current configuration at `frequency` Hz.
    pub fn response(&self, frequency: f64) -> f64 {
        self.coefs.magnitude(self.sample_rate, frequency)
    }

    #[inline]
    pub fn tick(&mut self, sample: f32) -> f32 {
        let c = &self.coefs;
        let x = sample as f64;
        let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y as f32
    }

    /// Filter `buffer` in place.
    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.tick(*sample);
        }
    }

    /// Zero the history taps. Coefficients are untouched.
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

impl Filter for BiquadFilter {
    fn new(sample_rate: f64) -> Self {
        BiquadFilter::new(sample_rate)
    }

    #[inline]
    fn tick(&mut self, sample: f32) -> f32 {
        BiquadFilter::tick(self, sample)
    }

    fn process(&mut self, buffer: &mut [f32]) {
        BiquadFilter::process(self, buffer)
    }

    fn reset(&mut self) {
        BiquadFilter::reset(self)
    }
}
