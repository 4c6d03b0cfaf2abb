//! Logarithmically spaced bandpass filter bank and peak picking.
//!
//! Generalizes the teacher's `beat_detector.rs` peak-picking over a
//! scalar envelope (strict local maximum, two-neighbor comparison) to a
//! full bank of geometrically spaced Butterworth bandpass filters
//! sharing one design, reused across every octave level.

use crate::biquad::{ButterworthFilter, FilterKind};
use crate::error::{AnalysisError, Result};

/// One detected local energy maximum.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Peak {
  /// Index of the filter in the bank that produced this peak.
  pub index: usize,
  /// Center period of the detecting filter, in samples, at the
  /// detecting level's effective sample rate.
  pub period: f32,
  /// Energy at the peak.
  pub energy: f32,
  /// Octave level that produced this peak. Filled in by the caller
  /// (the bank itself has no notion of levels); defaults to 0.
  pub level: usize,
}

/// An ordered set of bandpass Butterworth filters with center periods in
/// geometric progression between `period_min` and `period_max`.
pub struct FilterBank {
  period_min: f32,
  period_max: f32,
  count: usize,
  percent_overlap: f32,
  order: usize,
  q: f32,
  filters: Vec<ButterworthFilter>,
}

impl FilterBank {
  /// Builds a bank of `count` bandpass filters spanning
  /// `[period_min, period_max]`.
  ///
  /// Fails if `period_min >= period_max`, `count < 2`, or `order` is odd.
  pub fn new(period_min: f32, period_max: f32, count: usize, percent_overlap: f32, order: usize) -> Result<Self> {
    let mut bank = Self {
      period_min,
      period_max,
      count: 0,
      percent_overlap,
      order,
      q: 1.0,
      filters: Vec::new(),
    };
    bank.reconfigure(period_min, period_max, count, percent_overlap, order)?;
    Ok(bank)
  }

  /// Recomputes center periods, derived `Q`, and every filter's cascade.
  pub fn reconfigure(
    &mut self,
    period_min: f32,
    period_max: f32,
    count: usize,
    percent_overlap: f32,
    order: usize,
  ) -> Result<()> {
    if !(period_min < period_max) {
      return Err(AnalysisError::InvalidArgument(format!(
        "period_min ({period_min}) must be < period_max ({period_max})"
      )));
    }
    if count < 2 {
      return Err(AnalysisError::InvalidArgument(format!("filter count must be >= 2, got {count}")));
    }
    if order < 2 || order % 2 != 0 {
      return Err(AnalysisError::InvalidArgument(format!(
        "filter order must be even and >= 2, got {order}"
      )));
    }

    let overlap = percent_overlap.clamp(0.0, 99.0);
    let ratio = (period_max / period_min).powf(1.0 / (count - 1) as f32);
    let q = 1.0 / ((ratio - 1.0) * (1.0 + overlap / 100.0));

    let mut filters = Vec::with_capacity(count);
    for i in 0..count {
      let period = period_min * ratio.powi(i as i32);
      filters.push(ButterworthFilter::new(FilterKind::Bandpass, period, q, order)?);
    }

    self.period_min = period_min;
    self.period_max = period_max;
    self.count = count;
    self.percent_overlap = overlap;
    self.order = order;
    self.q = q;
    self.filters = filters;
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.count
  }

  pub fn is_empty(&self) -> bool {
    self.count == 0
  }

  pub fn q(&self) -> f32 {
    self.q
  }

  pub fn center_period(&self, index: usize) -> f32 {
    self.filters[index].period()
  }

  pub fn filter_q(&self, index: usize) -> f32 {
    self.filters[index].base_q()
  }

  pub fn order(&self) -> usize {
    self.order
  }

  /// Builds a fresh, independent bandpass filter at this bank's design
  /// `Q` and order, at an arbitrary period (used by the analyzer to
  /// isolate one peak's component without disturbing the bank).
  pub fn build_isolation_filter(&self, period: f32) -> Result<ButterworthFilter> {
    ButterworthFilter::new(FilterKind::Bandpass, period, self.q, self.order)
  }

  /// Runs `xs` through every filter in the bank and returns the
  /// per-filter mean squared output ("energy").
  ///
  /// Resets every filter first, so the result depends only on `xs`.
  pub fn process_buffer(&mut self, xs: &[f32]) -> Vec<f32> {
    if xs.is_empty() {
      return vec![0.0; self.count];
    }
    let mut energies = Vec::with_capacity(self.count);
    for filter in &mut self.filters {
      filter.reset();
      let sum_sq: f32 = xs.iter().map(|&x| {
        let y = filter.process(x);
        y * y
      }).sum();
      energies.push(sum_sq / xs.len() as f32);
    }
    energies
  }

  /// Strict local maxima of `energies` above `threshold`, excluding the
  /// first and last filter (they have no second neighbor to compare
  /// against).
  pub fn find_peaks(&self, energies: &[f32], threshold: f32) -> Vec<Peak> {
    let mut peaks = Vec::new();
    if energies.len() < 3 {
      return peaks;
    }
    for i in 1..energies.len() - 1 {
      let e = energies[i];
      if e > threshold && e > energies[i - 1] && e > energies[i + 1] {
        peaks.push(Peak {
          index: i,
          period: self.center_period(i),
          energy: e,
          level: 0,
        });
      }
    }
    peaks
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_bad_bounds() {
    assert!(FilterBank::new(100.0, 10.0, 8, 50.0, 4).is_err());
    assert!(FilterBank::new(10.0, 100.0, 1, 50.0, 4).is_err());
    assert!(FilterBank::new(10.0, 100.0, 8, 50.0, 3).is_err());
  }

  #[test]
  fn centers_strictly_increasing_and_span_matches_ratio() {
    let bank = FilterBank::new(24.0, 4800.0, 48, 50.0, 4).unwrap();
    let mut prev = bank.center_period(0);
    for i in 1..bank.len() {
      let cur = bank.center_period(i);
      assert!(cur > prev, "centers must strictly increase");
      prev = cur;
    }
    let ratio = bank.center_period(bank.len() - 1) / bank.center_period(0);
    assert!((ratio - (4800.0 / 24.0)).abs() < 1e-2, "ratio={ratio}");
  }

  #[test]
  fn find_peaks_excludes_endpoints() {
    let bank = FilterBank::new(24.0, 4800.0, 8, 50.0, 4).unwrap();
    // A monotonically increasing envelope has its only maximum at the
    // last index, which is excluded from peak detection.
    let energies = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
    assert!(bank.find_peaks(&energies, 0.0).is_empty());

    let energies = vec![0.0, 1.0, 5.0, 1.0, 0.0, 1.0, 5.0, 1.0];
    let peaks = bank.find_peaks(&energies, 0.5);
    let idxs: Vec<usize> = peaks.iter().map(|p| p.index).collect();
    assert_eq!(idxs, vec![2, 6]);
  }

  #[test]
  fn dc_input_yields_near_zero_energy() {
    let mut bank = FilterBank::new(24.0, 4800.0, 16, 50.0, 4).unwrap();
    let xs = vec![1.0f32; 48000];
    let energies = bank.process_buffer(&xs);
    for e in energies {
      assert!(e <= 1e-10, "dc energy leaked through: {e}");
    }
  }
}
