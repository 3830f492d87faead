use serde::Deserialize;

/// Active effect, derived from the two 3-position switches. The ninth
/// switch combination has no effect assigned and renders silence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum Mode {
  Reverb,
  Resonator,
  Filter,
  LoFi,
  MicroLooper,
  Delay,
  Spectra,
  Spectrings,
  None,
}

impl Mode {
  /// `sw1 + 3*sw2`, each switch reading 0..=2.
  pub fn from_switches(sw1: u8, sw2: u8) -> Self {
    match sw1.min(2) + 3 * sw2.min(2) {
      0 => Mode::Reverb,
      1 => Mode::Resonator,
      2 => Mode::Filter,
      3 => Mode::LoFi,
      4 => Mode::MicroLooper,
      5 => Mode::Delay,
      6 => Mode::Spectra,
      7 => Mode::Spectrings,
      _ => Mode::None,
    }
  }
}

/// One control-rate snapshot: seven knobs in [0,1], both switches, and the
/// edge flags for the gate and tap inputs. Refreshed once per audio block.
#[derive(Clone, Debug)]
pub struct ControlFrame {
  pub knobs: [f32; 7],
  pub switch1: u8,
  pub switch2: u8,
  pub gate_trig: bool,
  pub tap_trig: bool,
}

impl ControlFrame {
  pub fn new() -> Self {
    Self {
      knobs: [0.5; 7],
      switch1: 0,
      switch2: 0,
      gate_trig: false,
      tap_trig: false,
    }
  }
}

/// Named knob values for one block, in panel order.
#[derive(Clone, Copy)]
pub struct Knobs {
  pub blend: f32,
  pub speed: f32,
  pub tone: f32,
  pub index: f32,
  pub regen: f32,
  pub size: f32,
  pub dense: f32,
}

impl Knobs {
  pub fn from_frame(frame: &ControlFrame) -> Self {
    let k = &frame.knobs;
    Self {
      blend: k[0].clamp(0.0, 1.0),
      speed: k[1].clamp(0.0, 1.0),
      tone: k[2].clamp(0.0, 1.0),
      index: k[3].clamp(0.0, 1.0),
      regen: k[4].clamp(0.0, 1.0),
      size: k[5].clamp(0.0, 1.0),
      dense: k[6].clamp(0.0, 1.0),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn switch_combinations_cover_all_modes() {
    assert_eq!(Mode::from_switches(0, 0), Mode::Reverb);
    assert_eq!(Mode::from_switches(1, 0), Mode::Resonator);
    assert_eq!(Mode::from_switches(2, 0), Mode::Filter);
    assert_eq!(Mode::from_switches(0, 1), Mode::LoFi);
    assert_eq!(Mode::from_switches(1, 1), Mode::MicroLooper);
    assert_eq!(Mode::from_switches(2, 1), Mode::Delay);
    assert_eq!(Mode::from_switches(0, 2), Mode::Spectra);
    assert_eq!(Mode::from_switches(1, 2), Mode::Spectrings);
    assert_eq!(Mode::from_switches(2, 2), Mode::None);
  }

  #[test]
  fn out_of_range_switches_clamp() {
    assert_eq!(Mode::from_switches(9, 9), Mode::None);
  }

  #[test]
  fn knobs_clamp_to_unit_range() {
    let mut frame = ControlFrame::new();
    frame.knobs = [1.5, -0.5, 0.2, 0.3, 0.4, 0.5, 0.6];
    let knobs = Knobs::from_frame(&frame);
    assert_eq!(knobs.blend, 1.0);
    assert_eq!(knobs.speed, 0.0);
  }
}
