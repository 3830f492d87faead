/// Samples per RMS window; every envelope follower in the engine shares it.
pub const RMS_SIZE: usize = 48;

/// Fixed-window RMS accumulator. Callers feed one squared-energy value per
/// sample and gate `process_rms` on their own modulo-`RMS_SIZE` counter, so
/// the window is normally full when it is read out.
pub struct Averager {
  buffer: [f32; RMS_SIZE],
  cursor: usize,
}

impl Averager {
  pub fn new() -> Self {
    Self { buffer: [0.0; RMS_SIZE], cursor: 0 }
  }

  pub fn add(&mut self, sample: f32) {
    if self.cursor < RMS_SIZE {
      self.buffer[self.cursor] = sample;
      self.cursor += 1;
    }
  }

  /// RMS over whatever has accumulated, then clear. An empty window reads
  /// as silence rather than 0/0.
  pub fn process_rms(&mut self) -> f32 {
    if self.cursor == 0 {
      return 0.0;
    }
    let sum: f32 = self.buffer[..self.cursor].iter().sum();
    let result = (sum / self.cursor as f32).sqrt();
    self.clear();
    result
  }

  pub fn clear(&mut self) {
    self.buffer = [0.0; RMS_SIZE];
    self.cursor = 0;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rms_of_constant_energy() {
    let mut avg = Averager::new();
    for _ in 0..RMS_SIZE {
      avg.add(0.25);
    }
    assert!((avg.process_rms() - 0.5).abs() < 1e-6);
  }

  #[test]
  fn empty_window_is_silent() {
    let mut avg = Averager::new();
    assert_eq!(avg.process_rms(), 0.0);
  }

  #[test]
  fn clears_after_process() {
    let mut avg = Averager::new();
    for _ in 0..RMS_SIZE {
      avg.add(1.0);
    }
    let first = avg.process_rms();
    assert!((first - 1.0).abs() < 1e-6);
    avg.add(0.0);
    assert_eq!(avg.process_rms(), 0.0);
  }

  #[test]
  fn partial_window_uses_filled_prefix() {
    let mut avg = Averager::new();
    for _ in 0..10 {
      avg.add(4.0);
    }
    assert!((avg.process_rms() - 2.0).abs() < 1e-6);
  }
}
