//! The analysis tick: peak selection, per-peak frequency refinement by
//! targeted autocorrelation, and harmonic-summed phase-locked waveform
//! extraction.
//!
//! The autocorrelation-and-parabolic-interpolation refinement mirrors
//! the teacher's own tempo estimator (`audio_engine.rs::find_tempo` and
//! `beat_detector.rs::estimate_tempo_from_odf`), retargeted from a BPM
//! lag search over an onset envelope to a per-peak frequency lag search
//! over an isolated bandpass signal. Because the shared filter bank's
//! period range is reused unchanged at every octave level, the same
//! physical tone routinely crosses threshold at several levels at once;
//! `merge_cross_level_peaks` collapses those before the tick result is
//! assembled.

use crate::biquad::{ButterworthFilter, FilterKind};
use crate::octave::OctaveManager;
use std::f32::consts::PI;
use std::time::{Duration, Instant};

const HARMONIC_Q: f32 = 8.7;
const HARMONIC_ORDER: usize = 4;
const MAX_HARMONIC: usize = 5;

/// Relative frequency tolerance for judging two peaks detected at
/// different octave levels to be the same physical component. Adjacent
/// filters within one bank differ by a few percent in center period,
/// while distinct tones a level apart differ by roughly an octave
/// (~100%), so this generous a window merges cross-level duplicates
/// without conflating separate tones.
const CROSS_LEVEL_MERGE_TOLERANCE: f32 = 0.08;

/// One refined, phase-aligned frequency component.
#[derive(Clone, Debug)]
pub struct RefinedPeak {
  pub frequency: f32,
  pub energy: f32,
  /// Fundamental period at the input sample rate.
  pub period: f32,
  /// Harmonic-summed, phase-locked waveform; length is
  /// `floor(input_rate / frequency)`.
  pub waveform: Vec<f32>,
  /// Octave level that detected this component.
  pub level: usize,
}

/// The output of one analysis tick: every refined peak, sorted by
/// frequency ascending, plus the wall-clock interval since the previous
/// tick.
#[derive(Clone, Debug)]
pub struct AnalysisResult {
  pub peaks: Vec<RefinedPeak>,
  pub frame_time: Duration,
}

/// Drives one analysis tick against a borrowed [`OctaveManager`].
///
/// Holds no state of its own beyond the previous tick's timestamp; all
/// buffers, filter banks, and decimation state live in the manager it
/// borrows mutably for the duration of each tick.
pub struct Analyzer {
  prev_tick: Option<Instant>,
}

impl Analyzer {
  pub fn new() -> Self {
    Self { prev_tick: None }
  }

  /// Forgets the previous tick's timestamp, so the next tick reports a
  /// zero `frame_time` rather than spanning the reset.
  pub fn reset(&mut self) {
    self.prev_tick = None;
  }

  /// Runs one analysis tick: every filled octave level is run through
  /// the shared filter bank, peaks are detected, and each peak's
  /// frequency and waveform are refined.
  pub fn tick(&mut self, manager: &mut OctaveManager, threshold: f32) -> AnalysisResult {
    let now = Instant::now();
    let frame_time = match self.prev_tick {
      Some(prev) => now.duration_since(prev),
      None => Duration::ZERO,
    };
    self.prev_tick = Some(now);

    let input_rate = manager.effective_rate(0);

    let mut refined = Vec::new();
    for level in 0..manager.levels() {
      if !manager.buffer(level).is_filled() {
        continue;
      }
      let snapshot = manager.buffer(level).ordered();
      let effective_rate = manager.effective_rate(level);

      let energies = manager.bank_mut().process_buffer(&snapshot);
      let threshold_peaks = manager.bank().find_peaks(&energies, threshold);

      for peak in threshold_peaks {
        let Ok(mut isolation) = manager.bank().build_isolation_filter(peak.period) else {
          continue;
        };
        isolation.reset();
        let isolated: Vec<f32> = snapshot.iter().map(|&x| isolation.process(x)).collect();

        let f_hat = effective_rate / peak.period;
        let q = manager.bank().q();
        let settled = settle_trim(&isolated, peak.period, q);
        let f_star = refine_frequency(settled, f_hat, effective_rate, q);

        let period_at_level = effective_rate / f_star;
        let period_at_input_rate = period_at_level * (1u32 << level) as f32;

        // Per spec §3's AnalysisResult row, W's length is always
        // floor(input_rate / f), not floor(level_rate / f): the input
        // rate is used even when the detecting level is decimated.
        let waveform = harmonic_waveform(&snapshot, f_star, input_rate);

        refined.push(RefinedPeak {
          frequency: f_star,
          energy: peak.energy,
          period: period_at_input_rate,
          waveform,
          level,
        });
      }
    }

    let merged = merge_cross_level_peaks(refined);

    AnalysisResult { peaks: merged, frame_time }
  }
}

impl Default for Analyzer {
  fn default() -> Self {
    Self::new()
  }
}

/// Collapses peaks that more than one octave level detected for the
/// same physical tone, keeping the instance from the highest level.
///
/// The shared filter bank's period range is reused unchanged at every
/// level, so its absolute-frequency coverage only halves with `k` — it
/// never shrinks to exclude a tone a lower level already saw. A higher
/// level also packs more periods of that tone into the same
/// fixed-capacity buffer, making its autocorrelation refinement the
/// more reliable of the two, so ties are broken in its favor.
fn merge_cross_level_peaks(mut peaks: Vec<RefinedPeak>) -> Vec<RefinedPeak> {
  peaks.sort_by(|a, b| a.frequency.partial_cmp(&b.frequency).expect("frequencies are always finite"));
  let mut merged: Vec<RefinedPeak> = Vec::with_capacity(peaks.len());
  for peak in peaks {
    match merged.last_mut() {
      Some(last) if (peak.frequency - last.frequency).abs() <= last.frequency * CROSS_LEVEL_MERGE_TOLERANCE => {
        if peak.level > last.level {
          *last = peak;
        }
      }
      _ => merged.push(peak),
    }
  }
  merged
}

/// Drops the isolation filter's startup transient before autocorrelation.
///
/// `isolation` is reset and then run over the snapshot from its very
/// first sample (§4.6), so the early part of `y` is still ringing from
/// that cold start rather than settled into the steady-state tone the
/// autocorrelation is meant to measure. A resonant second-order section
/// settles in roughly `5Q/pi` periods; trimming that many samples off
/// the front (never more than half of `y`, so short buffers still get a
/// search range) keeps §4.7's lag-0-anchored window on the settled
/// signal.
fn settle_trim(y: &[f32], period: f32, q: f32) -> &[f32] {
  let settle = ((5.0 * q * period) / PI).ceil().max(0.0) as usize;
  let cap = y.len() / 2;
  &y[settle.min(cap)..]
}

/// Refines an estimated frequency by searching for the autocorrelation
/// peak near the expected lag, with parabolic sub-sample interpolation.
///
/// Falls back to `f_hat` unchanged whenever the search is degenerate —
/// this is never a fatal condition (§4.10).
fn refine_frequency(y: &[f32], f_hat: f32, sample_rate: f32, q: f32) -> f32 {
  if f_hat <= 0.0 || !f_hat.is_finite() {
    return f_hat;
  }
  let l = y.len();
  let l_hat = (sample_rate / f_hat).floor() as i64;
  if l_hat <= 0 || (l_hat as usize) * 3 >= l {
    return f_hat;
  }

  let rho_s = (100.0 / q).clamp(5.0, 25.0);
  let delta = ((l_hat as f32 * rho_s / 100.0).ceil()) as i64;

  let l_lo = (l_hat - delta).max(1);
  let l_hi = (l_hat + delta).min((l / 2) as i64);
  if l_lo > l_hi {
    return f_hat;
  }

  let mut correlations: Vec<(i64, f64)> = Vec::with_capacity((l_hi - l_lo + 1) as usize);
  for lag in l_lo..=l_hi {
    let m = (l as i64 - lag).min(3 * l_hat);
    if m < l_hat / 2 {
      return f_hat;
    }
    let m = m.max(0) as usize;
    let lag_u = lag as usize;
    let r: f64 = (0..m).map(|i| y[i] as f64 * y[i + lag_u] as f64).sum();
    correlations.push((lag, r));
  }

  let (best_idx, &(best_lag, _)) = correlations
    .iter()
    .enumerate()
    .max_by(|a, b| a.1.1.partial_cmp(&b.1.1).expect("autocorrelation values are always finite"))
    .expect("search range is non-empty");

  let interior = best_idx > 0 && best_idx + 1 < correlations.len();
  if interior {
    let y1 = correlations[best_idx - 1].1;
    let y2 = correlations[best_idx].1;
    let y3 = correlations[best_idx + 1].1;
    let den = y1 - 2.0 * y2 + y3;
    if den.abs() > 1e-6 * y2.abs() {
      let offset = 0.5 * (y1 - y3) / den;
      if offset.abs() < 1.0 {
        return sample_rate / (best_lag as f64 + offset) as f32;
      }
    }
  }

  sample_rate / best_lag as f32
}

#[inline]
fn sample_at(x: &[f32], idx: usize) -> f32 {
  x.get(idx).copied().unwrap_or(0.0)
}

/// Builds the harmonic-summed, phase-locked waveform for a refined
/// fundamental `f_star`, from the tail window of `snapshot` (§4.8).
fn harmonic_waveform(snapshot: &[f32], f_star: f32, sample_rate: f32) -> Vec<f32> {
  if f_star <= 0.0 || !f_star.is_finite() {
    return Vec::new();
  }
  let p0 = (sample_rate / f_star).floor() as usize;
  if p0 == 0 {
    return Vec::new();
  }

  let Ok(mut fundamental_filter) = ButterworthFilter::new(FilterKind::Bandpass, p0 as f32, HARMONIC_Q, HARMONIC_ORDER)
  else {
    return vec![0.0; p0];
  };
  let x1: Vec<f32> = snapshot.iter().map(|&x| fundamental_filter.process(x)).collect();

  let window = snapshot.len().min(5 * p0);
  let s0 = x1.len().saturating_sub(window);

  let mut best_delta = 0usize;
  let mut best_corr = f32::MIN;
  for delta in 0..p0 {
    let mut corr = 0.0f32;
    for i in 0..p0 {
      let idx = s0 + delta + i;
      if idx < x1.len() {
        corr += sample_at(&x1, idx) * (2.0 * PI * i as f32 / p0 as f32).sin();
      }
    }
    if corr > best_corr {
      best_corr = corr;
      best_delta = delta;
    }
  }

  let mut w = vec![0.0f32; p0];
  for (i, slot) in w.iter_mut().enumerate() {
    *slot = sample_at(&x1, s0 + best_delta + i);
  }

  let max_harmonic = MAX_HARMONIC.min((sample_rate / (2.0 * f_star)).floor() as usize);
  for h in 2..=max_harmonic {
    let harmonic_period = sample_rate / (h as f32 * f_star);
    if harmonic_period <= 0.0 {
      continue;
    }
    let Ok(mut harmonic_filter) = ButterworthFilter::new(FilterKind::Bandpass, harmonic_period, HARMONIC_Q, HARMONIC_ORDER)
    else {
      continue;
    };
    let xh: Vec<f32> = snapshot.iter().map(|&x| harmonic_filter.process(x)).collect();
    for (i, slot) in w.iter_mut().enumerate() {
      *slot += sample_at(&xh, s0 + best_delta + i);
    }
  }

  w
}
