use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Transform size shared by the whole spectral subsystem.
pub const FFT_LENGTH: usize = 1024;

/// Forward transform wrapper. Output layout: `out[0..N/2)` holds the real
/// parts and `out[N/2..N)` the imaginary parts of bins `0..N/2`, in
/// increasing frequency order. Planned once; `direct` does no allocation.
pub struct ForwardFft {
  fft: Arc<dyn Fft<f32>>,
  work: Vec<Complex32>,
  scratch: Vec<Complex32>,
}

impl ForwardFft {
  pub fn new() -> Self {
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FFT_LENGTH);
    let scratch_len = fft.get_inplace_scratch_len();
    Self {
      fft,
      work: vec![Complex32::new(0.0, 0.0); FFT_LENGTH],
      scratch: vec![Complex32::new(0.0, 0.0); scratch_len],
    }
  }

  pub fn direct(&mut self, input: &[f32; FFT_LENGTH], output: &mut [f32; FFT_LENGTH]) {
    for (w, x) in self.work.iter_mut().zip(input.iter()) {
      *w = Complex32::new(*x, 0.0);
    }
    self.fft.process_with_scratch(&mut self.work, &mut self.scratch);
    for i in 0..FFT_LENGTH / 2 {
      output[i] = self.work[i].re;
      output[i + FFT_LENGTH / 2] = self.work[i].im;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::f32::consts::TAU;

  #[test]
  fn cosine_lands_on_its_bin() {
    let mut fft = ForwardFft::new();
    let bin = 64usize;
    let mut input = [0.0f32; FFT_LENGTH];
    for (i, x) in input.iter_mut().enumerate() {
      *x = (TAU * bin as f32 * i as f32 / FFT_LENGTH as f32).cos();
    }
    let mut output = [0.0f32; FFT_LENGTH];
    fft.direct(&input, &mut output);
    let mut best = 0usize;
    let mut best_mag = 0.0f32;
    for i in 0..FFT_LENGTH / 2 {
      let re = output[i];
      let im = output[i + FFT_LENGTH / 2];
      let mag = (re * re + im * im).sqrt();
      if mag > best_mag {
        best_mag = mag;
        best = i;
      }
    }
    assert_eq!(best, bin);
    // a unit cosine concentrates N/2 of energy in its bin
    assert!((best_mag - (FFT_LENGTH / 2) as f32).abs() < 1.0);
  }
}
