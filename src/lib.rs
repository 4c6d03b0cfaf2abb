//! Real-time multi-resolution bandpass analysis engine.
//!
//! Feeds mono real-valued audio blocks into a pyramid of octave-spaced
//! circular buffers ([`octave::OctaveManager`]), runs a shared
//! logarithmically-spaced Butterworth bandpass filter bank
//! ([`filter_bank::FilterBank`]) against each filled level, and refines
//! detected peaks into frequency, energy, and harmonic-summed
//! phase-locked waveform entries ([`analyzer::Analyzer`]).
//!
//! [`Engine`] is the single entry point: it owns one [`octave::OctaveManager`]
//! and one [`analyzer::Analyzer`] in the hierarchical, back-pointer-free
//! relationship the design calls for, plus the command channel used to
//! apply configuration changes atomically between ticks.

pub mod analyzer;
pub mod biquad;
pub mod buffer;
pub mod config;
pub mod error;
pub mod filter_bank;
pub mod octave;

pub use analyzer::{Analyzer, AnalysisResult, RefinedPeak};
pub use biquad::{Biquad, BiquadCoefficients, ButterworthFilter, FilterKind};
pub use buffer::CircularBuffer;
pub use config::{AnalyzerConfig, ConfigCommand, ConfigPatch, RebuildLevel};
pub use error::{AnalysisError, Result};
pub use filter_bank::{FilterBank, Peak};
pub use octave::{OctaveManager, OctaveParams};

use crossbeam_channel::{Receiver, Sender};

fn octave_params(cfg: &AnalyzerConfig, input_rate: f32) -> OctaveParams {
  OctaveParams {
    input_rate,
    period_min: cfg.min_samples_per_period,
    period_max: cfg.max_samples_per_period,
    min_periods_in_buffer: cfg.min_periods_in_buffer,
    num_filters: cfg.num_filters,
    percent_overlap: cfg.percent_overlap,
    filter_order: cfg.filter_order,
  }
}

/// Owns the octave pyramid, the analyzer, and the command channel; the
/// single facade a caller drives per audio block.
///
/// Mirrors the teacher's `AudioEngine`, which owns its decks and
/// cross-fade state and is mutated from exactly one audio thread: this
/// engine likewise assumes a single producer thread drives
/// [`Engine::process_block`], with configuration changes arriving from
/// any other thread over the bounded command channel.
pub struct Engine {
  config: AnalyzerConfig,
  input_rate: f32,
  manager: OctaveManager,
  analyzer: Analyzer,
  blocks_since_tick: u32,
  commands: Receiver<ConfigCommand>,
}

impl Engine {
  /// Builds a new engine for a fixed nominal input sample rate `S0` and
  /// starting configuration. Returns the paired [`Sender`] the producer
  /// hands to any other thread that needs to change configuration.
  pub fn new(cfg: AnalyzerConfig, input_rate: f32) -> Result<(Self, Sender<ConfigCommand>)> {
    cfg.validate()?;
    let manager = OctaveManager::new(octave_params(&cfg, input_rate))?;
    let (tx, rx) = crossbeam_channel::bounded(16);
    Ok((
      Self {
        config: cfg,
        input_rate,
        manager,
        analyzer: Analyzer::new(),
        blocks_since_tick: 0,
        commands: rx,
      },
      tx,
    ))
  }

  pub fn config(&self) -> AnalyzerConfig {
    self.config
  }

  /// Feeds one block of raw input samples through the octave pyramid,
  /// draining any pending configuration commands first, and runs an
  /// analysis tick every `analysis_interval` blocks.
  ///
  /// Returns `Some(AnalysisResult)` on blocks where a tick ran, `None`
  /// otherwise.
  pub fn process_block(&mut self, xs: &[f32]) -> Result<Option<AnalysisResult>> {
    self.drain_commands()?;

    self.manager.process_block(xs, self.config.use_low_pass_filter);

    self.blocks_since_tick += 1;
    if self.blocks_since_tick < self.config.analysis_interval {
      return Ok(None);
    }
    self.blocks_since_tick = 0;

    Ok(Some(self.analyzer.tick(&mut self.manager, self.config.threshold)))
  }

  /// Clears the octave pyramid and the analyzer's tick clock. Geometry
  /// is unchanged; the manager returns to warming.
  pub fn reset(&mut self) {
    self.manager.reset();
    self.analyzer.reset();
    self.blocks_since_tick = 0;
  }

  fn drain_commands(&mut self) -> Result<()> {
    while let Ok(cmd) = self.commands.try_recv() {
      self.apply(cmd)?;
    }
    Ok(())
  }

  fn apply(&mut self, cmd: ConfigCommand) -> Result<()> {
    match cmd {
      ConfigCommand::SetConfig(cfg) => {
        cfg.validate()?;
        self.rebuild_for(self.config, cfg)?;
      }
      ConfigCommand::Patch(patch) => {
        let (merged, level) = patch.apply(self.config);
        merged.validate()?;
        self.apply_rebuild(merged, level)?;
      }
      ConfigCommand::Reset => self.reset(),
    }
    Ok(())
  }

  fn rebuild_for(&mut self, old: AnalyzerConfig, new: AnalyzerConfig) -> Result<()> {
    let patch = ConfigPatch {
      min_samples_per_period: Some(new.min_samples_per_period),
      max_samples_per_period: Some(new.max_samples_per_period),
      min_periods_in_buffer: Some(new.min_periods_in_buffer),
      num_filters: Some(new.num_filters),
      percent_overlap: Some(new.percent_overlap),
      filter_order: Some(new.filter_order),
      threshold: Some(new.threshold),
      use_low_pass_filter: Some(new.use_low_pass_filter),
      analysis_interval: Some(new.analysis_interval),
    };
    let (_, level) = patch.apply(old);
    self.apply_rebuild(new, level)
  }

  fn apply_rebuild(&mut self, merged: AnalyzerConfig, level: RebuildLevel) -> Result<()> {
    match level {
      RebuildLevel::None => {
        self.config = merged;
      }
      RebuildLevel::FilterBank => {
        self.manager.bank_mut().reconfigure(
          merged.min_samples_per_period,
          merged.max_samples_per_period,
          merged.num_filters,
          merged.percent_overlap,
          merged.filter_order,
        )?;
        self.config = merged;
        eprintln!("[Engine] filter bank rebuilt: parameter change");
      }
      RebuildLevel::Manager => {
        self.manager.rebuild(octave_params(&merged, self.input_rate))?;
        self.analyzer.reset();
        self.blocks_since_tick = 0;
        self.config = merged;
      }
    }
    Ok(())
  }
}
