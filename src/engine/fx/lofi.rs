use crate::engine::buffers::SharedDelays;
use crate::engine::controls::Knobs;
use crate::engine::dsp::averager::{Averager, RMS_SIZE};
use crate::engine::dsp::filters::{MultiSvf, Svf, Tone};
use crate::engine::dsp::helpers::{fonepole, log_knob};
use crate::engine::dsp::rng::XorShift32;
use crate::engine::leds::Leds;

use super::reverb::ReverbFx;

/// Lo-fi degrader: an RMS-driven low-pass gate, a randomly retuned pair of
/// short delay lines for tape-style pitch wobble, a makeup compressor that
/// leans in as the cutoff falls, and progressive mono collapse. Designed to
/// sit after the reverb pass, degrading the whole tail.
pub struct LofiFx {
    sample_rate: f32,
    current_rms: f32,
    target_rms: f32,
    damp_speed: f32,
    depth: f32,
    mod_interval: usize,
    rate_count: usize,
    rms_count: usize,
    cutoff: f32,
    target_lfo_freq: f32,
    current_lfo_freq: f32,
    previous_variable_compressor: f32,
    previous_left_saturation: f32,
    previous_right_saturation: f32,
    drywet: f32,
    lpg_amount: f32,
    lpg_decay: f32,
    averager: Averager,
    lpg_l: MultiSvf,
    lpg_r: MultiSvf,
    hipass_l: Svf,
    hipass_r: Svf,
    tone_l: Tone,
    tone_r: Tone,
    rng: XorShift32,
}

impl LofiFx {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            current_rms: 0.0,
            target_rms: 0.0,
            damp_speed: sample_rate,
            depth: 0.0,
            mod_interval: sample_rate as usize,
            rate_count: 0,
            rms_count: 0,
            cutoff: 20000.0,
            target_lfo_freq: sample_rate,
            current_lfo_freq: sample_rate,
            previous_variable_compressor: 0.0,
            previous_left_saturation: 0.5,
            previous_right_saturation: 0.5,
            drywet: 0.0,
            lpg_amount: 1.0,
            lpg_decay: 1.0,
            averager: Averager::new(),
            lpg_l: MultiSvf::new(),
            lpg_r: MultiSvf::new(),
            hipass_l: Svf::new(),
            hipass_r: Svf::new(),
            tone_l: Tone::new(sample_rate),
            tone_r: Tone::new(sample_rate),
            rng: XorShift32::new(0x10f1_c0de),
        }
    }

    pub fn run(&mut self, knobs: &Knobs, reverb: &mut ReverbFx) {
        self.cutoff = log_knob(knobs.tone, 20.0, 20000.0);
        self.depth = knobs.index * 2.0;
        self.tone_l.set_freq(self.cutoff);
        self.tone_r.set_freq(self.cutoff);
        self.mod_interval = log_knob(
            knobs.speed,
            self.sample_rate * 4.0,
            self.sample_rate / 16.0,
        ) as usize;
        self.drywet = knobs.blend * 1.01;

        reverb.set_lp_freq(self.cutoff);
        reverb.set_feedback(
            0.7 + ((10.0 + knobs.regen * 90.0).log10() - 1.000001) * 0.3,
        );

        self.lpg_amount = knobs.size * knobs.size * 3.0;
        self.lpg_decay = ((1.0
            - (((10.0 + knobs.dense * 90.0).log10() - 0.999991) * 0.4 + 0.6))
            * 0.05)
            .clamp(0.0001, 0.99999);

        reverb.shimmer = 0.0;
        reverb.compression = 0.5;
        reverb.drywet = knobs.regen * 0.8;
    }

    pub fn process_sample(
        &mut self,
        delays: &mut SharedDelays,
        reverb: &mut ReverbFx,
        leds: &mut Leds,
        in_l: f32,
        in_r: f32,
    ) -> (f32, f32) {
        let in_l = in_l * 0.8;
        let in_r = in_r * 0.8;

        self.rms_count = (self.rms_count + 1) % RMS_SIZE;
        if self.rms_count == 0 {
            self.target_rms = self.averager.process_rms() * self.lpg_amount * 10.0;
        }
        // fast attack, knob-controlled release
        if self.target_rms < self.current_rms {
            fonepole(
                &mut self.current_rms,
                self.target_rms,
                0.005 * self.lpg_decay * 10.0,
            );
        } else {
            fonepole(&mut self.current_rms, self.target_rms, 0.05);
        }
        self.averager.add((in_l * in_l + in_r * in_r) / 2.0);

        // the envelope follower opens the low-pass gate
        let envelope = (self.current_rms * self.cutoff * 13.0).clamp(20.0, 20000.0);
        let rms = self.current_rms;
        leds.set_base_color(1, rms, 0.0, 0.0);
        leds.set_base_color(0, rms * rms, 0.0, 0.0);
        leds.set_base_color(3, rms * rms, 0.0, 0.0);
        leds.set_base_color(2, rms, 0.0, 0.0);

        self.tone_l.set_freq(envelope);
        self.tone_r.set_freq(envelope);
        reverb.set_lp_freq(envelope * 0.6 + self.sample_rate * 0.3);
        self.lpg_l.set_f_q(envelope / self.sample_rate, 1.0);
        self.lpg_r.set_f_q(envelope / self.sample_rate, 1.0);

        // with the cutoff low a high-pass creeps in for a more distant sound
        let hipass_freq = (200.0 - self.cutoff * 2.0).clamp(0.0, 200.0);
        self.hipass_l.set_params(hipass_freq, 0.7, self.sample_rate);
        self.hipass_r.set_params(hipass_freq, 0.7, self.sample_rate);

        // random retune of the delay pair, at a random interval
        let interval = self.mod_interval.max(1);
        self.rate_count = (self.rate_count + 1) % interval;
        if self.rate_count == 0 {
            leds.set_for_x_cycles(1, 10, 0.0, 0.0, 0.0);
            leds.set_for_x_cycles(2, 10, 0.0, 0.0, 0.0);
            let r = self.rng.below(interval as u32) as f32;
            self.rate_count = self.rng.below(interval as u32) as usize;
            self.target_lfo_freq = 0.001 + (r * self.depth) / 5.0;
            self.damp_speed = self.rate_count as f32;
        }
        // slow slew keeps the retune a wobble instead of a click
        fonepole(
            &mut self.current_lfo_freq,
            self.target_lfo_freq,
            1.0 / (1.2 * (self.damp_speed + (interval as f32 * 3.0) / 2.0)),
        );
        delays.left.set_delay(self.current_lfo_freq);
        delays.right.set_delay(self.current_lfo_freq);

        if self.drywet > 0.98 {
            self.drywet = 1.0;
        }
        let wet = (0.5 * (self.drywet * 2.0)).sqrt();
        let dry = (0.95 * (2.0 - self.drywet * 2.0)).sqrt();
        let out_l = wet * delays.left.read() + dry * in_l;
        let out_r = wet * delays.right.read() + dry * in_r;

        // low-pass gate then the creeping high-pass
        let filter_l = self.lpg_l.process_lp(in_l);
        let filter_r = self.lpg_r.process_lp(in_r);
        let left_filter = self
            .hipass_l
            .process(self.tone_l.process(filter_l))
            .1;
        let right_filter = self
            .hipass_r
            .process(self.tone_r.process(filter_r))
            .1;

        // makeup compression grows as the cutoff falls and the signal quiets
        let variable_compressor = (2.0 * self.previous_variable_compressor
            + ((300.0 - self.cutoff.clamp(30.0, 300.0)) / 300.0)
                * (1.0 - self.current_rms))
            * 0.33;
        self.previous_variable_compressor = variable_compressor;

        let left_saturation = (in_l * in_l).abs();
        self.previous_left_saturation =
            (left_saturation + self.previous_left_saturation * 9.0) / 10.0;
        let right_saturation = (in_r * in_r).abs();
        self.previous_right_saturation =
            (right_saturation + self.previous_right_saturation * 9.0) / 10.0;

        let mono_amount = (200.0 - self.cutoff.clamp(20.0, 200.0)) / 200.0;
        let mut left = left_filter
            + mono_amount * right_filter
            + left_filter * variable_compressor
            + left_filter * variable_compressor * left_saturation * 0.01;
        let mut right = right_filter
            + mono_amount * left_filter
            + right_filter * variable_compressor
            + right_filter * variable_compressor * right_saturation * 0.01;

        left += right * mono_amount;
        right += left * mono_amount;

        if left > 0.4 {
            left = (left - ((left - 0.4) / 9.6) * 0.6).clamp(0.0, 1.0);
        }
        if right > 0.4 {
            right = (right - ((right - 0.4) / 9.6) * 0.6).clamp(0.0, 1.0);
        }
        if left < -0.4 {
            left = (left - ((left + 0.4) / 9.6) * 0.6).clamp(-1.0, 0.0);
        }
        if right < -0.4 {
            right = (right - ((right + 0.4) / 9.6) * 0.6).clamp(-1.0, 0.0);
        }

        delays.left.write(left);
        delays.right.write(right);

        (out_l, out_r)
    }
}
