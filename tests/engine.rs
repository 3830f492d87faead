// End-to-end scenarios through the public engine surface: one control
// frame per block, stereo in, stereo out.

use multifx::{ControlFrame, Graph, Mode};

const SR: f32 = 48000.0;
const BLOCK: usize = 96;

fn sine_block(t: &mut usize, freq: f32, amp: f32) -> (Vec<f32>, Vec<f32>) {
  let l: Vec<f32> = (0..BLOCK)
    .map(|i| ((*t + i) as f32 * std::f32::consts::TAU * freq / SR).sin() * amp)
    .collect();
  *t += BLOCK;
  let r = l.clone();
  (l, r)
}

fn process(graph: &mut Graph, frame: &ControlFrame, in_l: &[f32], in_r: &[f32]) -> (Vec<f32>, Vec<f32>) {
  let mut out_l = vec![0.0f32; in_l.len()];
  let mut out_r = vec![0.0f32; in_r.len()];
  graph.process_block(frame, in_l, in_r, &mut out_l, &mut out_r);
  (out_l, out_r)
}

#[test]
fn frozen_looper_replays_captured_material() {
  let mut graph = Graph::new(SR);
  let mut frame = ControlFrame::new();
  // micro-looper: division 1/1, unity speed, fully wet
  frame.switch1 = 1;
  frame.switch2 = 1;
  frame.knobs = [0.1, 0.5, 0.5, 0.0, 0.1, 0.5, 1.0];

  let mut t = 0usize;

  // capture exactly 4800 samples of a 1 kHz tone between two gate edges
  frame.gate_trig = true;
  let (l, r) = sine_block(&mut t, 1000.0, 0.5);
  process(&mut graph, &frame, &l, &r);
  frame.gate_trig = false;
  for _ in 0..49 {
    let (l, r) = sine_block(&mut t, 1000.0, 0.5);
    process(&mut graph, &frame, &l, &r);
  }
  frame.gate_trig = true;
  let (l, r) = sine_block(&mut t, 1000.0, 0.5);
  process(&mut graph, &frame, &l, &r);
  frame.gate_trig = false;

  // freeze, then feed silence: the snapshot keeps playing
  frame.knobs[3] = 1.0;
  let silence = vec![0.0f32; BLOCK];
  // let the frozen cursors wrap at least once
  let mut energy = 0.0f32;
  for _ in 0..100 {
    let (out_l, out_r) = process(&mut graph, &frame, &silence, &silence);
    energy += out_l.iter().chain(out_r.iter()).map(|s| s.abs()).sum::<f32>();
  }
  assert!(energy > 10.0, "frozen loop should keep sounding, got {energy}");
}

#[test]
fn unfrozen_looper_decays_as_silence_overwrites() {
  let mut graph = Graph::new(SR);
  let mut frame = ControlFrame::new();
  frame.switch1 = 1;
  frame.switch2 = 1;
  frame.knobs = [0.1, 0.5, 0.5, 0.0, 0.1, 0.5, 1.0];

  let mut t = 0usize;
  frame.gate_trig = true;
  let (l, r) = sine_block(&mut t, 1000.0, 0.5);
  process(&mut graph, &frame, &l, &r);
  frame.gate_trig = false;
  for _ in 0..49 {
    let (l, r) = sine_block(&mut t, 1000.0, 0.5);
    process(&mut graph, &frame, &l, &r);
  }
  frame.gate_trig = true;
  let (l, r) = sine_block(&mut t, 1000.0, 0.5);
  process(&mut graph, &frame, &l, &r);
  frame.gate_trig = false;

  let silence = vec![0.0f32; BLOCK];
  // first pass over the loop still reads the captured tone
  let mut early = 0.0f32;
  for _ in 0..25 {
    let (out_l, _) = process(&mut graph, &frame, &silence, &silence);
    early += out_l.iter().map(|s| s.abs()).sum::<f32>();
  }
  // once the write cursor has lapped the loop, only silence remains
  for _ in 0..50 {
    process(&mut graph, &frame, &silence, &silence);
  }
  let mut late = 0.0f32;
  for _ in 0..25 {
    let (out_l, _) = process(&mut graph, &frame, &silence, &silence);
    late += out_l.iter().map(|s| s.abs()).sum::<f32>();
  }
  assert!(early > 1.0);
  assert!(late < early * 0.01, "early {early} late {late}");
}

#[test]
fn delay_division_change_never_clicks() {
  let mut graph = Graph::new(SR);
  let mut frame = ControlFrame::new();
  frame.switch1 = 2;
  frame.switch2 = 1;
  assert_eq!(Mode::from_switches(2, 1), Mode::Delay);
  // moderate feedback and mix, no freeze
  frame.knobs = [0.3, 0.5, 0.4, 0.0, 0.3, 0.2, 0.6];

  let mut t = 0usize;

  // tap twice to establish a delay time
  frame.gate_trig = true;
  let (l, r) = sine_block(&mut t, 330.0, 0.4);
  process(&mut graph, &frame, &l, &r);
  frame.gate_trig = false;
  for _ in 0..100 {
    let (l, r) = sine_block(&mut t, 330.0, 0.4);
    process(&mut graph, &frame, &l, &r);
  }
  frame.gate_trig = true;
  let (l, r) = sine_block(&mut t, 330.0, 0.4);
  process(&mut graph, &frame, &l, &r);
  frame.gate_trig = false;

  // shove both division knobs to a new setting mid-playback
  frame.knobs[0] = 0.7;
  frame.knobs[4] = 0.7;
  let mut prev: Option<f32> = None;
  for _ in 0..300 {
    let (l, r) = sine_block(&mut t, 330.0, 0.4);
    let (out_l, _) = process(&mut graph, &frame, &l, &r);
    for &s in &out_l {
      assert!(s.is_finite());
      if let Some(p) = prev {
        assert!((s - p).abs() < 0.5, "discontinuity {p} -> {s}");
      }
      prev = Some(s);
    }
  }
}

#[test]
fn extreme_knob_values_never_break_any_mode() {
  let mut graph = Graph::new(SR);
  let mut t = 0usize;
  for sw2 in 0..3u8 {
    for sw1 in 0..3u8 {
      for step in 0..12 {
        let mut frame = ControlFrame::new();
        frame.switch1 = sw1;
        frame.switch2 = sw2;
        let v = if step % 2 == 0 { 1.0 } else { 0.0 };
        frame.knobs = [v, 1.0 - v, v, v, 1.0 - v, v, 1.0 - v];
        frame.gate_trig = step % 3 == 0;
        frame.tap_trig = step % 4 == 0;
        let (l, r) = sine_block(&mut t, 220.0, 0.9);
        let (out_l, out_r) = process(&mut graph, &frame, &l, &r);
        for s in out_l.iter().chain(out_r.iter()) {
          assert!(s.is_finite(), "mode ({sw1},{sw2}) step {step}");
        }
      }
    }
  }
}
