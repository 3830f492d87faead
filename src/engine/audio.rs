use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use thiserror::Error;

use super::controls::ControlFrame;
use super::graph::Graph;
use super::messages::EngineMsg;

#[derive(Debug, Error)]
pub enum AudioError {
  #[error("no output device")]
  NoOutputDevice,
  #[error("no input device")]
  NoInputDevice,
  #[error("stream config: {0}")]
  Config(String),
  #[error("stream build: {0}")]
  Build(#[from] cpal::BuildStreamError),
  #[error("stream play: {0}")]
  Play(#[from] cpal::PlayStreamError),
}

/// Pick a stereo f32 config near the platform rate: 48 kHz preferred,
/// 44.1 kHz fallback, then anything stereo f32.
fn pick_config(device: &cpal::Device, input: bool) -> Result<cpal::SupportedStreamConfig, AudioError> {
  let ranges = |d: &cpal::Device| -> Vec<cpal::SupportedStreamConfigRange> {
    if input {
      d.supported_input_configs().map(|c| c.collect()).unwrap_or_default()
    } else {
      d.supported_output_configs().map(|c| c.collect()).unwrap_or_default()
    }
  };
  for sr in [48_000u32, 44_100u32] {
    for cfg_range in ranges(device) {
      if cfg_range.channels() != 2 { continue; }
      if cfg_range.sample_format() != cpal::SampleFormat::F32 { continue; }
      if cfg_range.min_sample_rate().0 <= sr && cfg_range.max_sample_rate().0 >= sr {
        return Ok(cfg_range.with_sample_rate(cpal::SampleRate(sr)));
      }
    }
  }
  for cfg_range in ranges(device) {
    if cfg_range.channels() == 2 && cfg_range.sample_format() == cpal::SampleFormat::F32 {
      return Ok(cfg_range.with_max_sample_rate());
    }
  }
  if input {
    device.default_input_config().map_err(|e| AudioError::Config(e.to_string()))
  } else {
    device.default_output_config().map_err(|e| AudioError::Config(e.to_string()))
  }
}

pub struct AudioEngine {
  tx: Sender<EngineMsg>,
  rx: Receiver<EngineMsg>,
  pub sr: f32,
  graph: Option<Graph>,
  output_stream: Option<cpal::Stream>,
  input_stream: Option<cpal::Stream>,
}

impl AudioEngine {
  pub fn new() -> Result<Self, AudioError> {
    let (tx, rx) = unbounded();
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(AudioError::NoOutputDevice)?;
    let config = pick_config(&device, false)?;
    let sr = config.sample_rate().0 as f32;

    Ok(Self {
      tx,
      rx,
      sr,
      graph: Some(Graph::new(sr)),
      output_stream: None,
      input_stream: None,
    })
  }

  pub fn start(&mut self) -> Result<(), AudioError> {
    if self.output_stream.is_some() {
      return Ok(());
    }
    let host = cpal::default_host();
    let out_device = host.default_output_device().ok_or(AudioError::NoOutputDevice)?;
    let out_config = pick_config(&out_device, false)?;
    let mut out_cfg: cpal::StreamConfig = out_config.into();
    // larger buffer for stability; reduces underruns
    out_cfg.buffer_size = cpal::BufferSize::Fixed(1024);
    self.sr = out_cfg.sample_rate.0 as f32;
    log::info!("audio out at {} Hz", self.sr);

    // audio input ships to the render callback through a bounded channel;
    // if it runs dry the engine hears silence rather than blocking
    let (in_tx, in_rx) = bounded::<Vec<f32>>(64);
    if let Some(in_device) = host.default_input_device() {
      let in_config = pick_config(&in_device, true)?;
      let in_cfg: cpal::StreamConfig = in_config.into();
      let err_fn = |e: cpal::StreamError| log::error!("input stream error: {e}");
      let stream = in_device.build_input_stream(
        &in_cfg,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
          let _ = in_tx.try_send(data.to_vec());
        },
        err_fn,
        None,
      )?;
      stream.play()?;
      self.input_stream = Some(stream);
    } else {
      log::warn!("no input device; processing silence");
    }

    let rx = self.rx.clone();
    // Move engine state into the audio thread. Keep None in self.
    let mut graph = self.graph.take().unwrap_or_else(|| Graph::new(self.sr));
    let mut frame = ControlFrame::new();
    let mut playing = true;
    let mut pending_in: Vec<f32> = Vec::with_capacity(8192);
    let mut in_l: Vec<f32> = Vec::with_capacity(4096);
    let mut in_r: Vec<f32> = Vec::with_capacity(4096);
    let mut out_l: Vec<f32> = Vec::with_capacity(4096);
    let mut out_r: Vec<f32> = Vec::with_capacity(4096);

    let err_fn = |e: cpal::StreamError| log::error!("output stream error: {e}");
    let stream = out_device.build_output_stream(
      &out_cfg,
      move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        // Drain messages without blocking (tight cap to avoid starving audio)
        let mut drained = 0usize;
        loop {
          match rx.try_recv() {
            Ok(msg) => apply_msg(&mut frame, &mut playing, msg),
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => break,
          }
          drained += 1;
          if drained >= 24 {
            break;
          }
        }

        if !playing {
          data.fill(0.0);
          return;
        }

        let frames = data.len() / 2;
        while pending_in.len() < data.len() {
          match in_rx.try_recv() {
            Ok(chunk) => pending_in.extend_from_slice(&chunk),
            Err(_) => break,
          }
        }

        in_l.clear();
        in_r.clear();
        for i in 0..frames {
          let l = pending_in.get(i * 2).copied().unwrap_or(0.0);
          let r = pending_in.get(i * 2 + 1).copied().unwrap_or(0.0);
          in_l.push(l);
          in_r.push(r);
        }
        let consumed = (frames * 2).min(pending_in.len());
        pending_in.drain(..consumed);

        out_l.clear();
        out_l.resize(frames, 0.0);
        out_r.clear();
        out_r.resize(frames, 0.0);

        graph.process_block(&frame, &in_l, &in_r, &mut out_l, &mut out_r);
        // edges are one-shot, consumed by the control pass above
        frame.gate_trig = false;
        frame.tap_trig = false;

        for (i, chunk) in data.chunks_mut(2).take(frames).enumerate() {
          chunk[0] = out_l[i];
          if chunk.len() > 1 {
            chunk[1] = out_r[i];
          }
        }
      },
      err_fn,
      None,
    )?;
    stream.play()?;
    self.output_stream = Some(stream);
    Ok(())
  }

  pub fn stop(&mut self) {
    self.output_stream.take();
    self.input_stream.take();
  }

  pub fn sender(&self) -> Sender<EngineMsg> {
    self.tx.clone()
  }
}

fn apply_msg(frame: &mut ControlFrame, playing: &mut bool, msg: EngineMsg) {
  match msg {
    EngineMsg::SetKnob { index, value } => {
      if index < frame.knobs.len() {
        frame.knobs[index] = value.clamp(0.0, 1.0);
      }
    }
    EngineMsg::SetSwitches { sw1, sw2 } => {
      frame.switch1 = sw1;
      frame.switch2 = sw2;
    }
    EngineMsg::GatePulse => frame.gate_trig = true,
    EngineMsg::TapPress => frame.tap_trig = true,
    EngineMsg::Transport { playing: p } => *playing = p,
    EngineMsg::Quit => {}
  }
}

// Intentionally not Clone; engine state moves into the audio callback.
