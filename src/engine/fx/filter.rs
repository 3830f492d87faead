use crate::engine::controls::Knobs;
use crate::engine::dsp::filters::MultiSvf;
use crate::engine::dsp::helpers::{fonepole, log_knob};
use crate::engine::leds::Leds;

/// Block size headroom for the routing scratch buffer.
const MAX_BLOCK: usize = 4096;

/// Dual morphing filter. Each channel has its own cutoff, resonance and
/// LP->BP->HP morph; the routing knob crossfades from parallel stereo into
/// a series path where the left output feeds the right input. This is the
/// only effect that processes whole blocks, because the underlying
/// multimode primitive is block-based.
pub struct FilterFx {
    sample_rate: f32,
    svf_l: MultiSvf,
    svf_r: MultiSvf,
    target_l_freq: f32,
    target_r_freq: f32,
    current_l_freq: f32,
    current_r_freq: f32,
    mode_l: f32,
    mode_r: f32,
    path: f32,
    routed: Vec<f32>,
}

impl FilterFx {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            svf_l: MultiSvf::new(),
            svf_r: MultiSvf::new(),
            target_l_freq: 0.5,
            target_r_freq: 0.5,
            current_l_freq: 0.5,
            current_r_freq: 0.5,
            mode_l: 0.0,
            mode_r: 0.0,
            path: 0.0,
            routed: vec![0.0; MAX_BLOCK],
        }
    }

    pub fn run(&mut self, knobs: &Knobs, leds: &mut Leds) {
        self.target_l_freq = log_knob(knobs.blend, 60.0, 20000.0) / self.sample_rate;
        self.target_r_freq = log_knob(knobs.regen, 60.0, 20000.0) / self.sample_rate;

        fonepole(&mut self.current_l_freq, self.target_l_freq, 0.1);
        fonepole(&mut self.current_r_freq, self.target_r_freq, 0.1);

        self.svf_l
            .set_f_q(self.current_l_freq, 1.0 + knobs.speed * knobs.speed * 49.0);
        self.svf_r
            .set_f_q(self.current_r_freq, 1.0 + knobs.size * knobs.size * 49.0);

        self.mode_l = knobs.tone;
        self.mode_r = knobs.index;
        self.path = knobs.dense;

        leds.set_base_color(0, knobs.blend * 0.8, 0.0, 0.0);
        leds.set_base_color(1, knobs.tone, 0.0, 1.0 - knobs.tone);
        leds.set_base_color(2, knobs.index, 0.0, 1.0 - knobs.index);
        leds.set_base_color(3, knobs.regen * 0.8, 0.0, 0.0);
    }

    pub fn process_block(
        &mut self,
        out_l: &mut [f32],
        out_r: &mut [f32],
        in_l: &[f32],
        in_r: &[f32],
    ) {
        let size = out_l.len().min(MAX_BLOCK);
        self.svf_l
            .process_multimode(&in_l[..size], &mut out_l[..size], self.mode_l);

        // parallel -> series routing: fold the left output into the right
        // channel's input before its filter
        let series = ((self.path - 0.05).clamp(0.0, 1.0) * 2.0).max(0.0);
        let wet = (0.5 * series).sqrt();
        let dry = (1.0 * (2.0 - self.path * 2.0)).max(0.0).sqrt();
        for i in 0..size {
            self.routed[i] = wet * out_l[i] + dry * in_r[i];
        }
        let routed = &self.routed[..size];
        self.svf_r
            .process_multimode(routed, &mut out_r[..size], self.mode_r);
    }
}
