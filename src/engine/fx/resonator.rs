use crate::engine::buffers::{SharedBuffers, SharedDelays};
use crate::engine::controls::{Knobs, Mode};
use crate::engine::dsp::averager::{Averager, RMS_SIZE};
use crate::engine::dsp::filters::{DcBlock, Svf, Tone};
use crate::engine::dsp::helpers::{fonepole, mtof};
use crate::engine::leds::Leds;

use super::reverb::{compress_sample, ReverbFx};

/// Pitched resonator: the two shared delay lines are tuned to a note and
/// fed back through tone shaping, with the reverb mixed into the feedback
/// path. Feedback polarity flips with the regen knob around its middle,
/// and the RMS follower ducks it either way to keep it from running off.
pub struct ResonatorFx {
    sample_rate: f32,
    note: f32,
    octave: f32,
    glide: f32,
    glide_mode: usize,
    current_regen: f32,
    pub feedback: f32,
    drywet: f32,
    current_delay: f32,

    rms_count: usize,
    current_rms: f32,
    target_rms: f32,
    feedback_rms: f32,
    previous_l: f32,
    previous_r: f32,
    averager: Averager,

    dcblock_l: DcBlock,
    dcblock_r: DcBlock,
    svf_l: Svf,
    svf_r: Svf,
    tone_l: Tone,
    tone_r: Tone,
}

impl ResonatorFx {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            note: 20.0,
            octave: 1.0,
            glide: 0.0,
            glide_mode: 0,
            current_regen: 0.5,
            feedback: 0.0,
            drywet: 0.0,
            current_delay: sample_rate * 0.75,
            rms_count: 0,
            current_rms: 0.0,
            target_rms: 0.0,
            feedback_rms: 0.0,
            previous_l: 0.0,
            previous_r: 0.0,
            averager: Averager::new(),
            dcblock_l: DcBlock::new(),
            dcblock_r: DcBlock::new(),
            svf_l: Svf::new(),
            svf_r: Svf::new(),
            tone_l: Tone::new(sample_rate),
            tone_r: Tone::new(sample_rate),
        }
    }

    fn select_octave(&mut self, knob: f32) {
        self.octave = if knob < 0.2 {
            1.0
        } else if knob < 0.4 {
            2.0
        } else if knob < 0.6 {
            4.0
        } else if knob < 0.8 {
            8.0
        } else {
            16.0
        };
    }

    pub fn run(&mut self, knobs: &Knobs, tap: bool, reverb: &mut ReverbFx) {
        if tap {
            self.glide_mode = (self.glide_mode + 1) % 10;
            self.glide = (self.glide_mode * self.glide_mode * self.glide_mode) as f32;
        }

        self.select_octave(knobs.speed);
        // quantized to semitones
        self.note = (12.0 + knobs.index * 60.0).floor();

        let resonator_tone = self.sample_rate * knobs.tone / 4.0;
        let tone_freq = resonator_tone / 2.0;

        reverb.set_lp_freq(resonator_tone * 2.0);
        reverb.shimmer = knobs.size * 2.0;
        reverb.set_feedback(
            0.8 + ((10.0 + knobs.dense * 90.0).log10() - 1.000001) * 1.4,
        );
        reverb.drywet = knobs.dense;
        reverb.compression = knobs.dense * 2.0 + 0.5;

        self.tone_l.set_freq(tone_freq);
        self.tone_r.set_freq(tone_freq);
        self.svf_l.set_params(resonator_tone, 0.5, self.sample_rate);
        self.svf_r.set_params(resonator_tone, 0.5, self.sample_rate);

        fonepole(&mut self.current_regen, knobs.regen, 0.008);
        let up = ((self.current_regen - 0.5) * 2.0).clamp(0.0, 1.0);
        let down = (1.0 - self.current_regen * 2.0).clamp(0.0, 1.0);
        self.feedback = ((10.0 + up * 90.0).log10() - 1.000001) * 1.5
            - ((10.0 + down * 90.0).log10() - 1.000001) * 1.5;

        self.drywet = knobs.blend * 1.01;
    }

    pub fn process_sample(
        &mut self,
        reverb: &mut ReverbFx,
        delays: &mut SharedDelays,
        bufs: &mut SharedBuffers,
        leds: &mut Leds,
        in_l: f32,
        in_r: f32,
    ) -> (f32, f32) {
        let target = self.sample_rate / mtof(self.note);
        // glide slows the approach to the new tuning
        fonepole(
            &mut self.current_delay,
            target / self.octave,
            1.0 / (1.0 + self.glide * 25.0),
        );
        delays.left.set_delay(self.current_delay);
        delays.right.set_delay(self.current_delay);

        self.rms_count = (self.rms_count + 1) % RMS_SIZE;
        if self.rms_count == 0 {
            self.target_rms = self.averager.process_rms();
        }
        fonepole(&mut self.current_rms, self.target_rms, 0.0001);
        fonepole(&mut self.feedback_rms, self.target_rms, 0.001);

        let cur = self.current_rms.clamp(0.0, 1.0);
        let fbr = self.feedback_rms.clamp(0.0, 1.0);
        let glide_b = self.glide_mode as f32 / 10.0;
        leds.set_base_color(0, cur, cur * self.current_rms.clamp(0.0, 0.1), glide_b);
        leds.set_base_color(1, fbr, fbr * self.feedback_rms.clamp(0.0, 0.1), glide_b);
        leds.set_base_color(3, cur, cur * self.current_rms.clamp(0.0, 0.1), glide_b);
        leds.set_base_color(2, fbr, fbr * self.feedback_rms.clamp(0.0, 0.1), glide_b);

        // read before write
        let out_l = delays.left.read();
        let out_r = delays.right.read();

        let reso_l = self.svf_l.process(self.tone_l.process(out_l)).0;
        let reso_r = self.svf_r.process(self.tone_r.process(out_r)).0;

        let wet = self.drywet;
        let (rev_l, rev_r) = reverb.process_sample(
            Mode::Resonator,
            bufs,
            leds,
            (in_l * 0.01 + self.previous_l * 0.7) * wet
                + (in_l * 0.999 + self.previous_l * 0.001) * (1.0 - wet),
            (in_r * 0.01 + self.previous_r * 0.7) * wet
                + (in_r * 0.999 + self.previous_r * 0.001) * (1.0 - wet),
        );

        self.averager
            .add((reso_l * reso_l + reso_r * reso_r) / 2.0);

        let duck = self.current_rms * 0.85;
        let gain = if self.feedback > 0.0 {
            self.feedback - duck
        } else {
            self.feedback + duck
        };
        let rev_mix = 0.15 + 0.85 * (1.0 - self.drywet);
        let delay_in_l = self.dcblock_l.process(gain * (reso_l + rev_l * rev_mix));
        let delay_in_r = self.dcblock_r.process(gain * (reso_r + rev_r * rev_mix));

        if self.drywet > 0.98 {
            self.drywet = 1.0;
        }
        delays.left.write(delay_in_l);
        delays.right.write(delay_in_r);

        self.previous_l = reso_l;
        self.previous_r = reso_r;

        (
            compress_sample(reso_l * 0.1),
            compress_sample(reso_r * 0.1),
        )
    }
}
