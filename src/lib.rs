pub mod engine {
  pub mod audio;
  pub mod buffers;
  pub mod controls;
  pub mod dsp;
  pub mod fx;
  pub mod graph;
  pub mod leds;
  pub mod messages;
  pub mod oscbank;
}

pub use engine::audio::{AudioEngine, AudioError};
pub use engine::controls::{ControlFrame, Mode};
pub use engine::graph::Graph;
pub use engine::messages::EngineMsg;
