//! Synthetic-signal driver for `octant::Engine`.
//!
//! Feeds a sine tone that sweeps from 220 Hz to 880 Hz through the
//! engine in fixed-size blocks, the way a real caller would feed
//! successive audio callback buffers, and prints each tick's refined
//! peaks to stdout. Replaces the teacher's hardware-bound
//! `mic_passthrough.rs`: this binary captures nothing and opens no
//! device, it only demonstrates the `Engine::process_block` contract.

use octant::{AnalyzerConfig, Engine};
use std::f32::consts::PI;

const SAMPLE_RATE: f32 = 48_000.0;
const BLOCK_SIZE: usize = 256;
const BLOCKS: usize = 400;

fn main() -> octant::Result<()> {
  let cfg = AnalyzerConfig {
    min_samples_per_period: 24.0,
    max_samples_per_period: 4800.0,
    min_periods_in_buffer: 4.0,
    num_filters: 48,
    percent_overlap: 50.0,
    filter_order: 4,
    threshold: 1e-6,
    use_low_pass_filter: true,
    analysis_interval: 1,
  };

  let (mut engine, _commands) = Engine::new(cfg, SAMPLE_RATE)?;

  let mut phase = 0.0f32;
  for block_idx in 0..BLOCKS {
    let sweep_t = block_idx as f32 / BLOCKS as f32;
    let freq = 220.0 + sweep_t * (880.0 - 220.0);

    let mut block = vec![0.0f32; BLOCK_SIZE];
    for sample in &mut block {
      *sample = phase.sin();
      phase += 2.0 * PI * freq / SAMPLE_RATE;
      if phase > 2.0 * PI {
        phase -= 2.0 * PI;
      }
    }

    if let Some(result) = engine.process_block(&block)? {
      if result.peaks.is_empty() {
        continue;
      }
      let summary: Vec<String> = result
        .peaks
        .iter()
        .map(|p| format!("{:.1}Hz (e={:.4e}, level={})", p.frequency, p.energy, p.level))
        .collect();
      println!("block {block_idx:4}: {}", summary.join(", "));
    }
  }

  Ok(())
}
