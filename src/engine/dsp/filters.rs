use std::f32::consts::PI;

/// Chamberlin-style state variable filter. `process` returns all four
/// responses at once; callers pick the output they need.
#[derive(Clone)]
pub struct Svf {
  ic1eq: f32,
  ic2eq: f32,
  g: f32,
  k: f32,
}

impl Svf {
  pub fn new() -> Self {
    Self { ic1eq: 0.0, ic2eq: 0.0, g: 0.1, k: 0.5 }
  }

  pub fn set_params(&mut self, cutoff: f32, q: f32, sr: f32) {
    let g = (PI * (cutoff / sr).clamp(0.0, 0.49)).tan();
    self.g = g;
    self.k = 1.0 / q.max(0.001);
  }

  /// Returns (lp, hp, bp, notch).
  #[inline]
  pub fn process(&mut self, x: f32) -> (f32, f32, f32, f32) {
    let g = self.g;
    let k = self.k;
    let v0 = x;
    let v1 = (self.ic1eq + g * (v0 - self.ic2eq)) / (1.0 + g * (g + k));
    let v2 = self.ic2eq + g * v1;
    self.ic1eq = 2.0 * v1 - self.ic1eq;
    self.ic2eq = 2.0 * v2 - self.ic2eq;
    let lp = v2;
    let bp = v1;
    let hp = v0 - k * bp - lp;
    let notch = hp + lp;
    (lp, hp, bp, notch)
  }
}

/// SVF with a continuous LP -> BP -> HP morph, the contract of the dual
/// filter effect's block-mode primitive. Cutoff is set as a normalized
/// frequency so control code can work in f/sr directly.
#[derive(Clone)]
pub struct MultiSvf {
  svf: Svf,
}

impl MultiSvf {
  pub fn new() -> Self {
    Self { svf: Svf::new() }
  }

  pub fn set_f_q(&mut self, f_norm: f32, q: f32) {
    let g = (PI * f_norm.clamp(0.0001, 0.49)).tan();
    self.svf.g = g;
    self.svf.k = 1.0 / q.max(0.001);
  }

  #[inline]
  pub fn process_lp(&mut self, x: f32) -> f32 {
    self.svf.process(x).0
  }

  /// Block multimode: `mode` 0 is low-pass, 0.5 band-pass, 1 high-pass.
  pub fn process_multimode(&mut self, input: &[f32], output: &mut [f32], mode: f32) {
    let m = mode.clamp(0.0, 1.0) * 2.0;
    for (x, y) in input.iter().zip(output.iter_mut()) {
      let (lp, hp, bp, _) = self.svf.process(*x);
      *y = if m < 1.0 {
        lp * (1.0 - m) + bp * m
      } else {
        bp * (2.0 - m) + hp * (m - 1.0)
      };
    }
  }
}

/// One-pole low-pass tone control, sample-in sample-out.
#[derive(Clone)]
pub struct Tone {
  y1: f32,
  a: f32,
  sr: f32,
}

impl Tone {
  pub fn new(sr: f32) -> Self {
    Self { y1: 0.0, a: 0.5, sr }
  }

  pub fn set_freq(&mut self, cutoff: f32) {
    let normalized = (cutoff / self.sr).clamp(0.0001, 0.4);
    self.a = (2.0 * PI * normalized).clamp(0.0001, 0.9);
  }

  #[inline]
  pub fn process(&mut self, input: f32) -> f32 {
    self.y1 = self.a * input + (1.0 - self.a) * self.y1;
    self.y1
  }
}

/// Pole/zero DC blocker for feedback paths.
#[derive(Clone)]
pub struct DcBlock {
  x1: f32,
  y1: f32,
}

impl DcBlock {
  pub fn new() -> Self {
    Self { x1: 0.0, y1: 0.0 }
  }

  #[inline]
  pub fn process(&mut self, x: f32) -> f32 {
    let y = x - self.x1 + 0.995 * self.y1;
    self.x1 = x;
    self.y1 = y;
    y
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn svf_lowpass_passes_dc() {
    let mut svf = Svf::new();
    svf.set_params(1000.0, 0.707, 48000.0);
    let mut lp = 0.0;
    for _ in 0..4000 {
      lp = svf.process(1.0).0;
    }
    assert!((lp - 1.0).abs() < 1e-2);
  }

  #[test]
  fn svf_highpass_rejects_dc() {
    let mut svf = Svf::new();
    svf.set_params(1000.0, 0.707, 48000.0);
    let mut hp = 0.0;
    for _ in 0..4000 {
      hp = svf.process(1.0).1;
    }
    assert!(hp.abs() < 1e-2);
  }

  #[test]
  fn multimode_endpoints_match_lp_and_hp() {
    let input: Vec<f32> = (0..256).map(|i| (i as f32 * 0.1).sin()).collect();
    let mut a = MultiSvf::new();
    let mut b = Svf::new();
    a.set_f_q(0.05, 1.0);
    b.set_params(0.05 * 48000.0, 1.0, 48000.0);
    let mut out = vec![0.0f32; 256];
    a.process_multimode(&input, &mut out, 0.0);
    let mut expect = Vec::with_capacity(256);
    for x in &input {
      expect.push(b.process(*x).0);
    }
    for (y, e) in out.iter().zip(expect.iter()) {
      assert!((y - e).abs() < 1e-5);
    }
  }

  #[test]
  fn dcblock_removes_offset() {
    let mut dc = DcBlock::new();
    let mut y = 1.0;
    for _ in 0..20_000 {
      y = dc.process(1.0);
    }
    assert!(y.abs() < 1e-3);
  }
}
