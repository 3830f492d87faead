use serde::Deserialize;

/// Control-plane messages, drained non-blockingly at the top of each audio
/// callback. Knobs and switches set state; gate and tap are one-shot edges
/// consumed by the next block's control pass.
#[derive(Clone, Debug, Deserialize)]
pub enum EngineMsg {
  SetKnob { index: usize, value: f32 },
  SetSwitches { sw1: u8, sw2: u8 },
  GatePulse,
  TapPress,
  Transport { playing: bool },
  Quit,
}
