//! Runtime configuration: the consumer-facing record (§6), a partial
//! patch type, and the message-style command enum used to apply changes
//! atomically between ticks (§9).
//!
//! The setter/validate pattern mirrors the teacher's `EqCutState` +
//! `EqProcessor::set_cut` (`eq_processor.rs`): a small struct of
//! independently settable fields, validated at the edge rather than
//! deep in the hot path.

use crate::error::{AnalysisError, Result};

/// Consumer-facing configuration (§6). All fields are changeable at
/// runtime through [`ConfigPatch`]/[`ConfigCommand`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnalyzerConfig {
  /// Smallest detectable period, in samples, at the current level.
  pub min_samples_per_period: f32,
  /// Largest detectable period, in samples.
  pub max_samples_per_period: f32,
  /// Minimum number of periods the buffer must hold, sets capacity.
  pub min_periods_in_buffer: f32,
  /// Number of bandpass filters in the shared bank.
  pub num_filters: usize,
  /// Percent overlap between adjacent filters.
  pub percent_overlap: f32,
  /// Butterworth cascade order (must be even).
  pub filter_order: usize,
  /// Raw energy threshold. The consumer is responsible for applying the
  /// `threshold.powf(3.3)` sensitivity transform before setting this —
  /// the core never reinterprets it.
  pub threshold: f32,
  /// Whether the decimation anti-alias cascade runs.
  pub use_low_pass_filter: bool,
  /// Run analysis once every this many input blocks.
  pub analysis_interval: u32,
}

impl Default for AnalyzerConfig {
  fn default() -> Self {
    Self {
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
}

impl AnalyzerConfig {
  /// Validates field ranges per §6. Does not check cross-field
  /// consistency (e.g. `min < max`) — callers that build an
  /// [`OctaveManager`](crate::octave::OctaveManager) get that check for
  /// free from the manager's own constructor.
  pub fn validate(&self) -> Result<()> {
    let AnalyzerConfig {
      min_samples_per_period,
      max_samples_per_period,
      min_periods_in_buffer,
      num_filters,
      percent_overlap,
      filter_order,
      threshold,
      analysis_interval,
      ..
    } = *self;

    if !(4.0..=100.0).contains(&min_samples_per_period) {
      return Err(AnalysisError::InvalidArgument(format!(
        "min_samples_per_period must be in [4,100], got {min_samples_per_period}"
      )));
    }
    if !(20.0..=10000.0).contains(&max_samples_per_period) {
      return Err(AnalysisError::InvalidArgument(format!(
        "max_samples_per_period must be in [20,10000], got {max_samples_per_period}"
      )));
    }
    if !(2.0..=100.0).contains(&min_periods_in_buffer) {
      return Err(AnalysisError::InvalidArgument(format!(
        "min_periods_in_buffer must be in [2,100], got {min_periods_in_buffer}"
      )));
    }
    if !(12..=200).contains(&num_filters) {
      return Err(AnalysisError::InvalidArgument(format!("num_filters must be in [12,200], got {num_filters}")));
    }
    if !(0.0..=90.0).contains(&percent_overlap) {
      return Err(AnalysisError::InvalidArgument(format!(
        "percent_overlap must be in [0,90], got {percent_overlap}"
      )));
    }
    if !matches!(filter_order, 2 | 4 | 6 | 8) {
      return Err(AnalysisError::InvalidArgument(format!(
        "filter_order must be one of 2,4,6,8, got {filter_order}"
      )));
    }
    if !(0.0..=1.0).contains(&threshold) {
      return Err(AnalysisError::InvalidArgument(format!("threshold must be in [0,1], got {threshold}")));
    }
    if !(1..=10).contains(&analysis_interval) {
      return Err(AnalysisError::InvalidArgument(format!(
        "analysis_interval must be in [1,10], got {analysis_interval}"
      )));
    }
    Ok(())
  }
}

/// A partial update: every field is optional, absent fields leave the
/// current configuration untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConfigPatch {
  pub min_samples_per_period: Option<f32>,
  pub max_samples_per_period: Option<f32>,
  pub min_periods_in_buffer: Option<f32>,
  pub num_filters: Option<usize>,
  pub percent_overlap: Option<f32>,
  pub filter_order: Option<usize>,
  pub threshold: Option<f32>,
  pub use_low_pass_filter: Option<bool>,
  pub analysis_interval: Option<u32>,
}

impl ConfigPatch {
  /// `true` if this patch touches no field: applying it is a no-op.
  pub fn is_empty(&self) -> bool {
    let ConfigPatch {
      min_samples_per_period,
      max_samples_per_period,
      min_periods_in_buffer,
      num_filters,
      percent_overlap,
      filter_order,
      threshold,
      use_low_pass_filter,
      analysis_interval,
    } = self;
    min_samples_per_period.is_none()
      && max_samples_per_period.is_none()
      && min_periods_in_buffer.is_none()
      && num_filters.is_none()
      && percent_overlap.is_none()
      && filter_order.is_none()
      && threshold.is_none()
      && use_low_pass_filter.is_none()
      && analysis_interval.is_none()
  }

  fn touches_manager_geometry(&self) -> bool {
    self.min_samples_per_period.is_some() || self.max_samples_per_period.is_some() || self.min_periods_in_buffer.is_some()
  }

  fn touches_filter_bank(&self) -> bool {
    self.num_filters.is_some() || self.percent_overlap.is_some() || self.filter_order.is_some()
  }

  /// Applies this patch over `base`, returning the merged config and how
  /// much rebuilding it requires.
  pub fn apply(&self, base: AnalyzerConfig) -> (AnalyzerConfig, RebuildLevel) {
    let merged = AnalyzerConfig {
      min_samples_per_period: self.min_samples_per_period.unwrap_or(base.min_samples_per_period),
      max_samples_per_period: self.max_samples_per_period.unwrap_or(base.max_samples_per_period),
      min_periods_in_buffer: self.min_periods_in_buffer.unwrap_or(base.min_periods_in_buffer),
      num_filters: self.num_filters.unwrap_or(base.num_filters),
      percent_overlap: self.percent_overlap.unwrap_or(base.percent_overlap),
      filter_order: self.filter_order.unwrap_or(base.filter_order),
      threshold: self.threshold.unwrap_or(base.threshold),
      use_low_pass_filter: self.use_low_pass_filter.unwrap_or(base.use_low_pass_filter),
      analysis_interval: self.analysis_interval.unwrap_or(base.analysis_interval),
    };

    let level = if self.is_empty() {
      RebuildLevel::None
    } else if self.touches_manager_geometry() {
      RebuildLevel::Manager
    } else if self.touches_filter_bank() {
      RebuildLevel::FilterBank
    } else {
      RebuildLevel::None
    };

    (merged, level)
  }
}

/// How much of the pipeline a configuration change requires rebuilding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebuildLevel {
  /// Apply in place; no geometry changed.
  None,
  /// Rebuild only the shared filter bank.
  FilterBank,
  /// Rebuild the whole octave manager; state returns to warming.
  Manager,
}

/// A command delivered to the engine between ticks (§9 "message-style
/// control"). Sent over a bounded `crossbeam-channel` from the producer
/// thread, drained once per `process_block` call before any new samples
/// are processed.
pub enum ConfigCommand {
  SetConfig(AnalyzerConfig),
  Patch(ConfigPatch),
  Reset,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_patch_is_noop() {
    let base = AnalyzerConfig::default();
    let (merged, level) = ConfigPatch::default().apply(base);
    assert_eq!(merged, base);
    assert_eq!(level, RebuildLevel::None);
  }

  #[test]
  fn threshold_only_patch_requires_no_rebuild() {
    let base = AnalyzerConfig::default();
    let patch = ConfigPatch { threshold: Some(0.5), ..Default::default() };
    let (merged, level) = patch.apply(base);
    assert_eq!(merged.threshold, 0.5);
    assert_eq!(level, RebuildLevel::None);
  }

  #[test]
  fn num_filters_patch_requires_filter_bank_rebuild() {
    let base = AnalyzerConfig::default();
    let patch = ConfigPatch { num_filters: Some(64), ..Default::default() };
    let (_, level) = patch.apply(base);
    assert_eq!(level, RebuildLevel::FilterBank);
  }

  #[test]
  fn max_period_patch_requires_manager_rebuild() {
    let base = AnalyzerConfig::default();
    let patch = ConfigPatch { max_samples_per_period: Some(9000.0), ..Default::default() };
    let (_, level) = patch.apply(base);
    assert_eq!(level, RebuildLevel::Manager);
  }

  #[test]
  fn default_config_validates() {
    assert!(AnalyzerConfig::default().validate().is_ok());
  }

  #[test]
  fn out_of_range_threshold_rejected() {
    let mut cfg = AnalyzerConfig::default();
    cfg.threshold = 1.5;
    assert!(cfg.validate().is_err());
  }

  #[test]
  fn odd_filter_order_rejected() {
    let mut cfg = AnalyzerConfig::default();
    cfg.filter_order = 5;
    assert!(cfg.validate().is_err());
  }
}
