/// Fixed-capacity delay line with a fractional read tap. The write cursor
/// advances by exactly one slot per `write`; `read` interpolates at
/// `write_pos - delay`, so reads must happen before the write of the same
/// sample.
pub struct DelayLine {
  buffer: Vec<f32>,
  write_pos: usize,
  delay: f32,
}

impl DelayLine {
  pub fn new(max_length: usize) -> Self {
    Self {
      buffer: vec![0.0; max_length.max(4)],
      write_pos: 0,
      delay: 1.0,
    }
  }

  pub fn reset(&mut self) {
    self.buffer.fill(0.0);
    self.write_pos = 0;
  }

  pub fn set_delay(&mut self, delay: f32) {
    let max = (self.buffer.len() - 2) as f32;
    self.delay = delay.clamp(1.0, max);
  }

  #[inline]
  fn wrap(&self, i: i32) -> usize {
    let m = self.buffer.len() as i32;
    let mut k = i % m;
    if k < 0 {
      k += m;
    }
    k as usize
  }

  #[inline]
  pub fn read(&self) -> f32 {
    let pos = self.write_pos as f32 - self.delay;
    let i0 = pos.floor() as i32;
    let frac = pos - i0 as f32;
    let a = self.buffer[self.wrap(i0)];
    let b = self.buffer[self.wrap(i0 + 1)];
    a + (b - a) * frac
  }

  #[inline]
  pub fn write(&mut self, sample: f32) {
    self.buffer[self.write_pos] = sample;
    self.write_pos = (self.write_pos + 1) % self.buffer.len();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn integer_delay_returns_past_sample() {
    let mut dl = DelayLine::new(64);
    dl.set_delay(10.0);
    for i in 0..40 {
      let out = dl.read();
      if i >= 10 {
        assert!((out - (i - 10) as f32).abs() < 1e-5, "i={i} out={out}");
      }
      dl.write(i as f32);
    }
  }

  #[test]
  fn fractional_delay_interpolates() {
    let mut dl = DelayLine::new(64);
    dl.set_delay(2.5);
    // ramp input: interpolated read sits halfway between neighbors
    for i in 0..20 {
      dl.write(i as f32);
    }
    let out = dl.read();
    assert!((out - 17.5).abs() < 1e-4, "out={out}");
  }

  #[test]
  fn wraps_cleanly_past_capacity() {
    let mut dl = DelayLine::new(16);
    dl.set_delay(4.0);
    for i in 0..200 {
      dl.write(i as f32);
    }
    assert!((dl.read() - 196.0).abs() < 1e-3);
  }
}
