//! Octave buffer pyramid: one circular buffer per decimation level,
//! anti-alias filtered and decimated from the raw input, sharing one
//! filter bank across levels.
//!
//! The per-level anti-alias cascade reuses the teacher's
//! `eq_processor.rs` idiom of two cascaded Butterworth biquads per band
//! (there: two lowpass sections at 250 Hz forming the low band; here:
//! two lowpass sections at a fixed ~0.4 Nyquist cutoff forming the
//! decimation anti-alias filter for every level `k >= 1`).

use crate::biquad::{Biquad, BiquadCoefficients};
use crate::buffer::CircularBuffer;
use crate::error::Result;
use crate::filter_bank::FilterBank;
use std::f32::consts::PI;

/// Parameters driving the octave pyramid's geometry, independent of the
/// filter bank's own parameters (which share `num_filters`,
/// `percent_overlap`, `filter_order`).
#[derive(Clone, Copy, Debug)]
pub struct OctaveParams {
  pub input_rate: f32,
  pub period_min: f32,
  pub period_max: f32,
  pub min_periods_in_buffer: f32,
  pub num_filters: usize,
  pub percent_overlap: f32,
  pub filter_order: usize,
}

fn decimation_lowpass_coeffs(input_rate: f32) -> BiquadCoefficients {
  // Fixed cutoff near 0.4 * Nyquist, independent of level (spec Open
  // Question 1): approximates the original's simplification rather than
  // computing a per-level cutoff.
  let cutoff = 0.4 * (input_rate / 2.0);
  let q = std::f32::consts::FRAC_1_SQRT_2;
  let w0 = 2.0 * PI * cutoff / input_rate;
  let cos_w0 = w0.cos();
  let sin_w0 = w0.sin();
  let alpha = sin_w0 / (2.0 * q);
  let a0 = 1.0 + alpha;
  let b1 = 1.0 - cos_w0;
  BiquadCoefficients {
    b0: (b1 / 2.0) / a0,
    b1: b1 / a0,
    b2: (b1 / 2.0) / a0,
    a1: (-2.0 * cos_w0) / a0,
    a2: (1.0 - alpha) / a0,
  }
}

/// One level's anti-alias cascade: two independent lowpass biquads.
#[derive(Clone)]
struct LevelLowpass {
  first: Biquad,
  second: Biquad,
}

impl LevelLowpass {
  fn new(coeffs: BiquadCoefficients) -> Self {
    Self { first: Biquad::new(coeffs), second: Biquad::new(coeffs) }
  }

  #[inline]
  fn process(&mut self, x: f32) -> f32 {
    self.second.process(self.first.process(x))
  }

  fn reset(&mut self) {
    self.first.reset();
    self.second.reset();
  }
}

/// Owns the `K` circular buffers, the per-level decimation anti-alias
/// state, and the single shared [`FilterBank`].
pub struct OctaveManager {
  params: OctaveParams,
  levels: usize,
  buffer_capacity: usize,
  buffers: Vec<CircularBuffer>,
  lowpass: Vec<Option<LevelLowpass>>,
  counters: Vec<u64>,
  bank: FilterBank,
}

fn level_count(period_min: f32, period_max: f32) -> usize {
  let k = (period_max / period_min).log2().ceil() as i64 + 1;
  k.max(1) as usize
}

impl OctaveManager {
  pub fn new(params: OctaveParams) -> Result<Self> {
    let levels = level_count(params.period_min, params.period_max);
    let buffer_capacity = Self::capacity_for(&params);
    let bank = FilterBank::new(
      params.period_min,
      params.period_max,
      params.num_filters,
      params.percent_overlap,
      params.filter_order,
    )?;

    let mut buffers = Vec::with_capacity(levels);
    for _ in 0..levels {
      buffers.push(CircularBuffer::new(buffer_capacity)?);
    }

    let lowpass_coeffs = decimation_lowpass_coeffs(params.input_rate);
    let mut lowpass = Vec::with_capacity(levels);
    lowpass.push(None); // level 0 has no anti-alias stage
    for _ in 1..levels {
      lowpass.push(Some(LevelLowpass::new(lowpass_coeffs)));
    }

    Ok(Self {
      params,
      levels,
      buffer_capacity,
      buffers,
      lowpass,
      counters: vec![0; levels],
      bank,
    })
  }

  fn capacity_for(params: &OctaveParams) -> usize {
    ((2.0 * params.period_min * params.min_periods_in_buffer).round() as usize).max(1)
  }

  pub fn levels(&self) -> usize {
    self.levels
  }

  pub fn buffer_capacity(&self) -> usize {
    self.buffer_capacity
  }

  pub fn params(&self) -> OctaveParams {
    self.params
  }

  pub fn effective_rate(&self, level: usize) -> f32 {
    self.params.input_rate / (1u32 << level) as f32
  }

  pub fn buffer(&self, level: usize) -> &CircularBuffer {
    &self.buffers[level]
  }

  pub fn bank(&self) -> &FilterBank {
    &self.bank
  }

  pub fn bank_mut(&mut self) -> &mut FilterBank {
    &mut self.bank
  }

  /// Rebuilds every level, buffer, and filter from new parameters.
  /// State returns to warming.
  pub fn rebuild(&mut self, params: OctaveParams) -> Result<()> {
    *self = Self::new(params)?;
    eprintln!("[OctaveManager] rebuilding: parameter change requires full rebuild");
    Ok(())
  }

  /// Clears every buffer, zeros every lowpass state, and resets every
  /// decimation counter. Geometry is unchanged.
  pub fn reset(&mut self) {
    for buf in &mut self.buffers {
      buf.clear();
    }
    for lp in self.lowpass.iter_mut().flatten() {
      lp.reset();
    }
    for c in &mut self.counters {
      *c = 0;
    }
  }

  /// Feeds a block of raw input samples through the pyramid.
  ///
  /// Level 0 always receives the raw sample. Level `k > 0` writes
  /// exactly one (optionally anti-alias filtered) sample per `2^k` input
  /// samples, at the correct decimation phase.
  pub fn process_block(&mut self, xs: &[f32], use_lowpass: bool) {
    for &x in xs {
      self.buffers[0].write(x);
      for k in 1..self.levels {
        let filtered = if use_lowpass {
          self.lowpass[k].as_mut().expect("level >= 1 has anti-alias state").process(x)
        } else {
          x
        };
        let stride = 1u64 << k;
        if self.counters[k] % stride == 0 {
          self.buffers[k].write(filtered);
        }
        self.counters[k] += 1;
      }
    }
  }
}
