//! Fixed-capacity circular buffer of real samples.
//!
//! Generalizes the teacher's hand-rolled stereo `RingBuffer` (see the
//! deleted `mic_passthrough.rs`) into a typed, age-indexed ring with
//! aggregate statistics, used as the sample store for every octave
//! level.

use crate::error::{AnalysisError, Result};

/// A fixed-capacity ring of `f32` samples, written by one producer.
///
/// Writes are O(1) and never allocate after construction. Reads are by
/// "age": `read_age(0)` is the most recently written sample,
/// `read_age(valid_count() - 1)` is the oldest still held.
#[derive(Clone)]
pub struct CircularBuffer {
  storage: Vec<f32>,
  capacity: usize,
  write_pos: usize,
  filled: bool,
}

impl CircularBuffer {
  /// Creates a buffer of the given capacity, zero-filled.
  ///
  /// Fails with [`AnalysisError::InvalidArgument`] if `capacity == 0`.
  pub fn new(capacity: usize) -> Result<Self> {
    if capacity == 0 {
      return Err(AnalysisError::InvalidArgument(
        "circular buffer capacity must be > 0".into(),
      ));
    }
    Ok(Self {
      storage: vec![0.0; capacity],
      capacity,
      write_pos: 0,
      filled: false,
    })
  }

  #[inline]
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  #[inline]
  pub fn is_filled(&self) -> bool {
    self.filled
  }

  /// Writes one sample, advancing the ring. Never fails and never
  /// allocates.
  #[inline]
  pub fn write(&mut self, x: f32) {
    self.storage[self.write_pos] = x;
    self.write_pos += 1;
    if self.write_pos == self.capacity {
      self.write_pos = 0;
      self.filled = true;
    }
  }

  /// Number of samples currently held: `capacity` once filled, else the
  /// number of writes so far.
  #[inline]
  pub fn valid_count(&self) -> usize {
    if self.filled {
      self.capacity
    } else {
      self.write_pos
    }
  }

  /// The element written `age` writes ago (`age == 0` is the newest).
  ///
  /// Fails if `age >= valid_count()`.
  pub fn read_age(&self, age: usize) -> Result<f32> {
    let valid = self.valid_count();
    if age >= valid {
      return Err(AnalysisError::InvalidArgument(format!(
        "age {age} out of range for {valid} valid samples"
      )));
    }
    // write_pos points one past the newest sample; age 0 is write_pos - 1.
    let idx = (self.write_pos + self.capacity - 1 - age) % self.capacity;
    Ok(self.storage[idx])
  }

  /// The valid samples in chronological order, oldest first.
  ///
  /// When filled, this is `buf[write_pos..capacity] ++ buf[0..write_pos]`.
  pub fn ordered(&self) -> Vec<f32> {
    let valid = self.valid_count();
    let mut out = Vec::with_capacity(valid);
    if self.filled {
      out.extend_from_slice(&self.storage[self.write_pos..self.capacity]);
      out.extend_from_slice(&self.storage[..self.write_pos]);
    } else {
      out.extend_from_slice(&self.storage[..self.write_pos]);
    }
    out
  }

  /// Resets to the just-constructed state: no samples held, not filled.
  pub fn clear(&mut self) {
    self.storage.iter_mut().for_each(|s| *s = 0.0);
    self.write_pos = 0;
    self.filled = false;
  }

  fn valid_slice_iter(&self) -> impl Iterator<Item = f32> + '_ {
    let valid = self.valid_count();
    (0..valid).map(move |age| self.read_age(age).expect("age within valid_count"))
  }

  pub fn max(&self) -> f32 {
    if self.valid_count() == 0 {
      return 0.0;
    }
    self.valid_slice_iter().fold(f32::MIN, f32::max)
  }

  pub fn min(&self) -> f32 {
    if self.valid_count() == 0 {
      return 0.0;
    }
    self.valid_slice_iter().fold(f32::MAX, f32::min)
  }

  pub fn mean(&self) -> f32 {
    let valid = self.valid_count();
    if valid == 0 {
      return 0.0;
    }
    self.valid_slice_iter().sum::<f32>() / valid as f32
  }

  pub fn rms(&self) -> f32 {
    let valid = self.valid_count();
    if valid == 0 {
      return 0.0;
    }
    (self.valid_slice_iter().map(|x| x * x).sum::<f32>() / valid as f32).sqrt()
  }
}
