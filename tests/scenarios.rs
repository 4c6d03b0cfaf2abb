//! End-to-end scenario tests (spec §8 "End-to-end scenarios"), exercised
//! against the whole `Engine` rather than one module, the way the
//! example pack's DSP crates place integration-level regression tests
//! under `tests/` alongside their per-module `#[cfg(test)]` suites.

use octant::{AnalyzerConfig, Engine};
use std::f32::consts::PI;

const SAMPLE_RATE: f32 = 48_000.0;

fn base_config() -> AnalyzerConfig {
  AnalyzerConfig {
    min_samples_per_period: 24.0,
    max_samples_per_period: 4800.0,
    min_periods_in_buffer: 4.0,
    num_filters: 48,
    percent_overlap: 50.0,
    filter_order: 4,
    threshold: 1e-6,
    use_low_pass_filter: true,
    analysis_interval: 1,
  }
}

fn sine(freq: f32, n: usize) -> Vec<f32> {
  (0..n).map(|i| (2.0 * PI * freq * i as f32 / SAMPLE_RATE).sin()).collect()
}

fn closest(peaks: &[octant::RefinedPeak], freq: f32) -> octant::RefinedPeak {
  peaks
    .iter()
    .min_by(|a, b| {
      (a.frequency - freq)
        .abs()
        .partial_cmp(&(b.frequency - freq).abs())
        .unwrap()
    })
    .cloned()
    .unwrap()
}

/// S1: constant input must produce zero active frequencies — bandpass
/// filters reject DC entirely.
#[test]
fn s1_dc_rejection() {
  let (mut engine, _tx) = Engine::new(base_config(), SAMPLE_RATE).unwrap();
  let block = vec![1.0f32; SAMPLE_RATE as usize];
  let result = engine.process_block(&block).unwrap().unwrap();
  assert!(result.peaks.is_empty(), "DC input produced peaks: {:?}", result.peaks);
}

/// S2: a single 440 Hz tone, once the buffer fills, yields exactly one
/// peak within 0.25 Hz.
#[test]
fn s2_pure_tone() {
  let (mut engine, _tx) = Engine::new(base_config(), SAMPLE_RATE).unwrap();
  let xs = sine(440.0, (SAMPLE_RATE as usize) * 2);
  let result = engine.process_block(&xs).unwrap().unwrap();

  assert_eq!(result.peaks.len(), 1, "peaks: {:?}", result.peaks);
  assert!((result.peaks[0].frequency - 440.0).abs() <= 0.25, "frequency={}", result.peaks[0].frequency);
}

/// S3: two simultaneous tones yield two peaks sorted ascending, each
/// close to its source frequency.
#[test]
fn s3_two_tones() {
  let (mut engine, _tx) = Engine::new(base_config(), SAMPLE_RATE).unwrap();
  let n = (SAMPLE_RATE as usize) * 2;
  let xs: Vec<f32> = sine(220.0, n).iter().zip(sine(880.0, n).iter()).map(|(&a, &b)| a + b).collect();
  let result = engine.process_block(&xs).unwrap().unwrap();

  assert!(result.peaks.len() >= 2, "peaks: {:?}", result.peaks);
  for w in result.peaks.windows(2) {
    assert!(w[0].frequency <= w[1].frequency, "peaks not sorted ascending: {:?}", result.peaks);
  }
  let near_220 = closest(&result.peaks, 220.0);
  let near_880 = closest(&result.peaks, 880.0);
  assert!((near_220.frequency - 220.0).abs() <= 0.5, "near_220={}", near_220.frequency);
  assert!((near_880.frequency - 880.0).abs() <= 0.5, "near_880={}", near_880.frequency);
}

/// S4: with the anti-alias cascade disabled, decimated levels hold
/// exactly every `2^k`-th raw sample.
#[test]
fn s4_decimation_without_lowpass() {
  use octant::OctaveManager;
  use octant::OctaveParams;

  let params = OctaveParams {
    input_rate: SAMPLE_RATE,
    period_min: 8.0,
    period_max: 32.0,
    min_periods_in_buffer: 32.0,
    num_filters: 16,
    percent_overlap: 50.0,
    filter_order: 4,
  };
  let mut manager = OctaveManager::new(params).unwrap();
  assert!(manager.levels() >= 3);

  let xs: Vec<f32> = (0u32..256).map(|i| i as f32).collect();
  manager.process_block(&xs, false);

  let expected1: Vec<f32> = (0u32..256).step_by(2).map(|i| i as f32).collect();
  let expected2: Vec<f32> = (0u32..256).step_by(4).map(|i| i as f32).collect();
  assert_eq!(manager.buffer(1).ordered(), expected1);
  assert_eq!(manager.buffer(2).ordered(), expected2);
}

/// S5: after a full run and a reset, feeding a short silent block
/// produces no peaks (the buffers are not yet refilled) and no tick
/// panics.
#[test]
fn s5_reset_returns_to_warming() {
  let (mut engine, _tx) = Engine::new(base_config(), SAMPLE_RATE).unwrap();
  let xs = sine(440.0, (SAMPLE_RATE as usize) * 2);
  let warm = engine.process_block(&xs).unwrap().unwrap();
  assert!(!warm.peaks.is_empty());

  engine.reset();
  let result = engine.process_block(&vec![0.0f32; 100]).unwrap().unwrap();
  assert!(result.peaks.is_empty(), "peaks after reset: {:?}", result.peaks);
  for p in &result.peaks {
    assert!(p.frequency.is_finite());
    for w in &p.waveform {
      assert!(w.is_finite());
    }
  }
}

/// S6: the harmonic waveform length matches the fundamental period at
/// the input rate.
#[test]
fn s6_harmonic_waveform_length() {
  let (mut engine, _tx) = Engine::new(base_config(), SAMPLE_RATE).unwrap();
  let xs = sine(440.0, (SAMPLE_RATE as usize) * 2);
  let result = engine.process_block(&xs).unwrap().unwrap();

  assert!(!result.peaks.is_empty());
  for peak in &result.peaks {
    let expected_len = (SAMPLE_RATE / peak.frequency).floor() as usize;
    assert_eq!(peak.waveform.len(), expected_len, "peak frequency={}", peak.frequency);
  }
}
