use freeverb::Freeverb;

use crate::engine::buffers::SharedBuffers;
use crate::engine::controls::{Knobs, Mode};
use crate::engine::dsp::averager::{Averager, RMS_SIZE};
use crate::engine::dsp::helpers::{fonepole, map};
use crate::engine::leds::Leds;

/// Two-knee soft limiter applied ahead of the reverb core.
pub fn compress_sample(sample: f32) -> f32 {
    let mut sample = sample;
    if sample > 0.4 {
        sample = (sample - map(sample, 0.4, 5.0, 0.0, 0.6)).clamp(0.0, 2.0);
    }
    if sample < -0.4 {
        sample = (sample - map(sample, -5.0, -0.4, -0.6, 0.0)).clamp(-2.0, 0.0);
    }
    if sample > 0.8 {
        sample = (sample - map(sample, 0.8, 2.0, 0.0, 0.1)).clamp(0.0, 0.9);
    }
    if sample < -0.8 {
        sample = (sample - map(sample, -2.0, -0.8, -0.1, 0.0)).clamp(-0.9, 0.0);
    }
    sample
}

/// Freeverb behind the feedback/lowpass parameter surface the effects set:
/// feedback maps to room size, the lowpass corner to inverted dampening.
struct ReverbCore {
    rev: Freeverb,
    sample_rate: f32,
}

impl ReverbCore {
    fn new(sample_rate: f32) -> Self {
        let mut rev = Freeverb::new(sample_rate as usize);
        rev.set_wet(1.0);
        rev.set_dry(0.0);
        rev.set_width(0.9);
        rev.set_room_size(0.85);
        Self { rev, sample_rate }
    }

    fn set_feedback(&mut self, feedback: f32) {
        self.rev.set_room_size(feedback.clamp(0.0, 1.0) as f64);
    }

    fn set_lp_freq(&mut self, freq: f32) {
        let damp = 1.0 - (freq / (self.sample_rate * 0.5)).clamp(0.0, 1.0);
        self.rev.set_dampening(damp as f64);
    }

    #[inline]
    fn process(&mut self, in_l: f32, in_r: f32) -> (f32, f32) {
        let (l, r) = self.rev.tick((in_l as f64, in_r as f64));
        (l as f32, r as f32)
    }
}

/// Reverb state machine plus the shimmer voices it feeds from the shared
/// buffers. Several other effects drive the public parameter fields from
/// their own control passes before chaining their audio through here.
pub struct ReverbFx {
    core: ReverbCore,
    pub drywet: f32,
    pub feedback: f32,
    pub lowpass: f32,
    pub shimmer: f32,
    pub compression: f32,

    write_pos1l: usize,
    write_pos1r: usize,
    write_pos2: usize,
    play_pos1l: usize,
    play_pos1r: usize,
    play_pos2: f32,
    buffer_size1l: usize,
    buffer_size1r: usize,
    buffer_size2: usize,

    rms_count: usize,
    current_rms: f32,
    target_rms: f32,
    feedback_rms: f32,
    target_compression: f32,
    averager: Averager,
}

impl ReverbFx {
    pub fn new(sample_rate: f32) -> Self {
        let mut core = ReverbCore::new(sample_rate);
        core.set_lp_freq(9000.0);
        core.set_feedback(0.85);
        Self {
            core,
            drywet: 0.0,
            feedback: 0.85,
            lowpass: 9000.0,
            shimmer: 0.0,
            compression: 1.0,
            write_pos1l: 0,
            write_pos1r: 0,
            write_pos2: 0,
            play_pos1l: 0,
            play_pos1r: 0,
            play_pos2: 0.0,
            // detuned tap lengths so the two shimmer octaves never phase-lock
            buffer_size1l: (24_000.0 * 0.773) as usize,
            buffer_size1r: (24_000.0 * 0.802) as usize,
            buffer_size2: (48_000.0 * 0.753 * 2.0) as usize,
            rms_count: 0,
            current_rms: 0.0,
            target_rms: 0.0,
            feedback_rms: 0.0,
            target_compression: 1.0,
            averager: Averager::new(),
        }
    }

    pub fn set_lp_freq(&mut self, freq: f32) {
        self.lowpass = freq;
        self.core.set_lp_freq(freq);
    }

    pub fn set_feedback(&mut self, feedback: f32) {
        self.feedback = feedback;
        self.core.set_feedback(feedback);
    }

    /// Control pass for the dedicated reverb mode.
    pub fn run(&mut self, knobs: &Knobs, sample_rate: f32) {
        self.set_lp_freq(sample_rate * knobs.tone / 2.0);
        self.shimmer = knobs.index;
        let feedback = 0.8 + ((10.0 + knobs.regen * 90.0).log10() - 1.000001) * 0.4;
        self.set_feedback(feedback);
        self.compression = knobs.dense + 0.5;
        self.drywet = knobs.blend;
    }

    /// One reverb sample. `mode` selects which shimmer taps run: the
    /// reverb and resonator modes read the live pair an octave up, the
    /// reverb mode adds two octaves from the frozen-left buffer and the
    /// resonator an octave down from the same tap.
    pub fn process_sample(
        &mut self,
        mode: Mode,
        bufs: &mut SharedBuffers,
        leds: &mut Leds,
        in_l: f32,
        in_r: f32,
    ) -> (f32, f32) {
        let mut shimmer_l = 0.0;
        let mut shimmer_r = 0.0;

        if mode == Mode::Reverb || mode == Mode::Resonator {
            shimmer_l = bufs.live_l_at(self.play_pos1l);
            shimmer_r = bufs.live_r_at(self.play_pos1r);
            self.play_pos1l = (self.play_pos1l + 2) % self.buffer_size1l;
            self.play_pos1r = (self.play_pos1r + 2) % self.buffer_size1r;
            bufs.write_live_l(self.write_pos1l, in_l);
            bufs.write_live_r(self.write_pos1r, in_r);
            self.write_pos1l = (self.write_pos1l + 1) % self.buffer_size1l;
            self.write_pos1r = (self.write_pos1r + 1) % self.buffer_size1r;
        }

        if mode == Mode::Reverb {
            let octave2 = bufs.frozen_l_at(self.play_pos2 as usize) * 0.5;
            shimmer_l += octave2;
            shimmer_r += octave2;
            self.play_pos2 += 4.0;
            if self.play_pos2 > self.buffer_size2 as f32 {
                self.play_pos2 -= self.buffer_size2 as f32;
            }
            self.write_shimmer2(bufs, in_l, in_r);
        }

        if mode == Mode::Resonator {
            let octave2 = bufs.frozen_l_at(self.play_pos2 as usize);
            shimmer_l += octave2;
            shimmer_r += octave2;
            self.play_pos2 += 0.5;
            if self.play_pos2 > self.buffer_size2 as f32 {
                self.play_pos2 -= self.buffer_size2 as f32;
            }
            self.write_shimmer2(bufs, in_l, in_r);
        }

        self.rms_count = (self.rms_count + 1) % RMS_SIZE;
        if self.rms_count == 0 {
            self.target_rms = self.averager.process_rms();
        }
        fonepole(&mut self.current_rms, self.target_rms, 0.1);
        fonepole(&mut self.feedback_rms, self.target_rms, 0.01);

        if mode == Mode::Reverb {
            let cur = self.current_rms.clamp(0.0, 1.0);
            let tgt = self.target_rms.clamp(0.0, 1.0);
            leds.set_base_color(0, cur, tgt, cur * cur);
            leds.set_base_color(1, tgt, tgt, tgt * tgt);
            leds.set_base_color(3, cur, tgt, cur * cur);
            leds.set_base_color(2, tgt, tgt, tgt * tgt);
        }

        // duck the tail feedback as the output gets loud
        self.core
            .set_feedback(self.feedback - self.feedback_rms * 0.75);

        let shimmer_gain =
            self.shimmer * (self.feedback * 0.5 + 0.5) * (0.5 + self.current_rms * 0.5);
        let sum_l = (in_l + shimmer_l * shimmer_gain) * 0.5;
        let sum_r = (in_r + shimmer_r * shimmer_gain) * 0.5;

        fonepole(&mut self.target_compression, self.compression, 0.001);
        let sum_l = compress_sample(sum_l * self.target_compression);
        let sum_r = compress_sample(sum_r * self.target_compression);

        let (out_l, out_r) = self.core.process(sum_l, sum_r);

        self.averager
            .add((out_l * out_l + out_r * out_r) / 2.0);

        if self.drywet > 0.98 {
            self.drywet = 1.0;
        }
        let wet = (0.5 * (self.drywet * 2.0)).sqrt();
        let dry = (0.95 * (2.0 - self.drywet * 2.0)).sqrt();
        (
            (wet * out_l + dry * in_l) * 0.7,
            (wet * out_r + dry * in_r) * 0.7,
        )
    }

    fn write_shimmer2(&mut self, bufs: &mut SharedBuffers, in_l: f32, in_r: f32) {
        // mono by design: both channels fold into the frozen-left buffer
        bufs.write_frozen_l(self.write_pos2, (in_r + in_l) / 2.0);
        self.write_pos2 = (self.write_pos2 + 1) % self.buffer_size2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::controls::ControlFrame;

    fn knobs(values: [f32; 7]) -> Knobs {
        let mut frame = ControlFrame::new();
        frame.knobs = values;
        Knobs::from_frame(&frame)
    }

    #[test]
    fn compressor_bounds_extremes() {
        assert!(compress_sample(5.0) <= 0.9);
        assert!(compress_sample(-5.0) >= -0.9);
        assert_eq!(compress_sample(0.2), 0.2);
    }

    #[test]
    fn drywet_clamps_above_098() {
        let mut rv = ReverbFx::new(48000.0);
        let mut bufs = SharedBuffers::new();
        let mut leds = Leds::new();
        rv.run(&knobs([0.985, 0.5, 0.5, 0.0, 0.5, 0.5, 0.5]), 48000.0);
        rv.process_sample(Mode::Reverb, &mut bufs, &mut leds, 0.1, 0.1);
        assert_eq!(rv.drywet, 1.0);
    }

    #[test]
    fn output_stays_finite_under_sustained_input() {
        let mut rv = ReverbFx::new(48000.0);
        let mut bufs = SharedBuffers::new();
        let mut leds = Leds::new();
        rv.run(&knobs([0.5, 0.5, 0.6, 0.8, 1.0, 0.5, 1.0]), 48000.0);
        for i in 0..10_000 {
            let x = (i as f32 * 0.05).sin() * 0.9;
            let (l, r) = rv.process_sample(Mode::Reverb, &mut bufs, &mut leds, x, x);
            assert!(l.is_finite() && r.is_finite());
        }
    }

    #[test]
    fn feedback_knob_maps_through_log_curve() {
        let mut rv = ReverbFx::new(48000.0);
        rv.run(&knobs([0.0, 0.0, 0.5, 0.0, 0.0, 0.0, 0.0]), 48000.0);
        assert!((rv.feedback - 0.8).abs() < 1e-4);
        rv.run(&knobs([0.0, 0.0, 0.5, 0.0, 1.0, 0.0, 0.0]), 48000.0);
        assert!((rv.feedback - 1.2).abs() < 1e-3);
    }
}
