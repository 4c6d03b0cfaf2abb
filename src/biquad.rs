//! Biquad direct-form-II sections and Butterworth cascades built from them.
//!
//! The per-section coefficient formulas generalize the teacher's
//! `eq_processor.rs` (`calculate_butterworth_lowpass`/`_highpass`, fixed
//! at order 2) to an arbitrary even order by sweeping the pole angle
//! across `N/2` sections, the way a standard cascaded-biquad Butterworth
//! design does.

use crate::error::{AnalysisError, Result};
use std::f32::consts::PI;

/// Normalized biquad coefficients (`a0` already divided out).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BiquadCoefficients {
  pub b0: f32,
  pub b1: f32,
  pub b2: f32,
  pub a1: f32,
  pub a2: f32,
}

/// A single second-order direct-form-II section.
///
/// No allocation in `process`; state advances one sample at a time.
#[derive(Clone, Copy, Debug, Default)]
pub struct Biquad {
  coeffs: BiquadCoefficients,
  z1: f32,
  z2: f32,
}

impl Biquad {
  pub fn new(coeffs: BiquadCoefficients) -> Self {
    Self { coeffs, z1: 0.0, z2: 0.0 }
  }

  pub fn set_coefficients(&mut self, coeffs: BiquadCoefficients) {
    self.coeffs = coeffs;
  }

  #[inline]
  pub fn process(&mut self, x: f32) -> f32 {
    let BiquadCoefficients { b0, b1, b2, a1, a2 } = self.coeffs;
    let w = x - a1 * self.z1 - a2 * self.z2;
    let y = b0 * w + b1 * self.z1 + b2 * self.z2;
    self.z2 = self.z1;
    self.z1 = w;
    y
  }

  pub fn reset(&mut self) {
    self.z1 = 0.0;
    self.z2 = 0.0;
  }
}

/// Which response shape a [`ButterworthFilter`] cascade implements.
///
/// Represented as a tagged value computed once at coefficient time: the
/// hot path (`process`) is a single straight cascade with no branching
/// on type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKind {
  Lowpass,
  Highpass,
  Bandpass,
}

/// A cascade of `order / 2` biquad sections forming one Butterworth
/// filter at a given target period.
///
/// Coefficients are a pure function of `(kind, period, base_q, order)`;
/// changing either recomputes every section's coefficients and discards
/// all state.
#[derive(Clone)]
pub struct ButterworthFilter {
  kind: FilterKind,
  period: f32,
  base_q: f32,
  order: usize,
  sections: Vec<Biquad>,
}

impl ButterworthFilter {
  /// Builds a cascade for `(kind, period, base_q, order)`.
  ///
  /// Fails if `order` is odd, `order < 2`, `period <= 0`, or
  /// `base_q <= 0`.
  pub fn new(kind: FilterKind, period: f32, base_q: f32, order: usize) -> Result<Self> {
    let mut filter = Self { kind, period, base_q, order: 0, sections: Vec::new() };
    filter.reconfigure(kind, period, base_q, order)?;
    Ok(filter)
  }

  pub fn period(&self) -> f32 {
    self.period
  }

  pub fn base_q(&self) -> f32 {
    self.base_q
  }

  pub fn order(&self) -> usize {
    self.order
  }

  /// Recomputes every section's coefficients for new design parameters
  /// and discards all filter state.
  pub fn reconfigure(&mut self, kind: FilterKind, period: f32, base_q: f32, order: usize) -> Result<()> {
    if order < 2 || order % 2 != 0 {
      return Err(AnalysisError::InvalidArgument(format!(
        "butterworth order must be even and >= 2, got {order}"
      )));
    }
    if period <= 0.0 {
      return Err(AnalysisError::InvalidArgument(format!(
        "butterworth target period must be > 0, got {period}"
      )));
    }
    if base_q <= 0.0 {
      return Err(AnalysisError::InvalidArgument(format!(
        "butterworth base Q must be > 0, got {base_q}"
      )));
    }

    let num_sections = order / 2;
    let w0 = 2.0 * PI / period;
    let cos_w0 = w0.cos();
    let sin_w0 = w0.sin();

    let mut sections = Vec::with_capacity(num_sections);
    for s in 0..num_sections {
      let theta_s = PI * (2 * s + 1) as f32 / (2 * order) as f32;
      let qs = match kind {
        FilterKind::Lowpass | FilterKind::Highpass => {
          (1.0 / (2.0 * theta_s.cos())) * (base_q / std::f32::consts::FRAC_1_SQRT_2)
        }
        FilterKind::Bandpass => base_q * (1.0 + 0.1 * s as f32),
      };
      let alpha = sin_w0 / (2.0 * qs);
      let a0 = 1.0 + alpha;
      let a1 = -2.0 * cos_w0;
      let a2 = 1.0 - alpha;

      let (b0, b1, b2) = match kind {
        FilterKind::Lowpass => {
          let b1 = 1.0 - cos_w0;
          (b1 / 2.0, b1, b1 / 2.0)
        }
        FilterKind::Highpass => {
          let b1 = 1.0 + cos_w0;
          (b1 / 2.0, -b1, b1 / 2.0)
        }
        FilterKind::Bandpass => (alpha, 0.0, -alpha),
      };

      sections.push(Biquad::new(BiquadCoefficients {
        b0: b0 / a0,
        b1: b1 / a0,
        b2: b2 / a0,
        a1: a1 / a0,
        a2: a2 / a0,
      }));
    }

    self.kind = kind;
    self.period = period;
    self.base_q = base_q;
    self.order = order;
    self.sections = sections;
    Ok(())
  }

  #[inline]
  pub fn process(&mut self, x: f32) -> f32 {
    let mut y = x;
    for section in &mut self.sections {
      y = section.process(y);
    }
    y
  }

  pub fn reset(&mut self) {
    for section in &mut self.sections {
      section.reset();
    }
  }

  pub fn kind(&self) -> FilterKind {
    self.kind
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_odd_order() {
    assert!(ButterworthFilter::new(FilterKind::Bandpass, 100.0, 10.0, 3).is_err());
  }

  #[test]
  fn rejects_non_positive_period() {
    assert!(ButterworthFilter::new(FilterKind::Lowpass, 0.0, 1.0, 2).is_err());
  }

  #[test]
  fn section_count_matches_half_order() {
    let f = ButterworthFilter::new(FilterKind::Bandpass, 100.0, 10.0, 6).unwrap();
    assert_eq!(f.sections.len(), 3);
  }

  #[test]
  fn linear_in_repeated_resets() {
    // process(a*x + b*y) == a*process(x) + b*process(y), modulo float tolerance,
    // when state is reset between independent evaluations.
    let mut f = ButterworthFilter::new(FilterKind::Bandpass, 50.0, 8.0, 4).unwrap();
    let xs: Vec<f32> = (0..64).map(|i| (i as f32 * 0.37).sin()).collect();
    let ys: Vec<f32> = (0..64).map(|i| (i as f32 * 0.11).cos()).collect();
    let a = 1.7_f32;
    let b = -0.4_f32;

    let combined: Vec<f32> = xs.iter().zip(&ys).map(|(&x, &y)| a * x + b * y).collect();
    f.reset();
    let out_combined: Vec<f32> = combined.iter().map(|&v| f.process(v)).collect();

    f.reset();
    let out_x: Vec<f32> = xs.iter().map(|&v| f.process(v)).collect();
    f.reset();
    let out_y: Vec<f32> = ys.iter().map(|&v| f.process(v)).collect();

    for i in 0..64 {
      let expected = a * out_x[i] + b * out_y[i];
      assert!((out_combined[i] - expected).abs() < 1e-3, "index {i}: {} vs {}", out_combined[i], expected);
    }
  }

  fn steady_state_amplitude(period_filter: f32, period_input: f32) -> f32 {
    let mut f = ButterworthFilter::new(FilterKind::Bandpass, period_filter, 10.0, 4).unwrap();
    let n = 4000;
    let warmup = n - (period_input as usize) * 8;
    let mut max_amp = 0.0f32;
    for i in 0..n {
      let x = (2.0 * PI * i as f32 / period_input).sin();
      let y = f.process(x);
      if i > warmup {
        max_amp = max_amp.max(y.abs());
      }
    }
    max_amp
  }

  #[test]
  fn gain_falls_off_away_from_center_period() {
    let center = 80.0_f32;
    let at_center = steady_state_amplitude(center, center);
    let far_off = steady_state_amplitude(center, center * 4.0);
    assert!(at_center > far_off, "center={at_center} far={far_off}");
  }
}
