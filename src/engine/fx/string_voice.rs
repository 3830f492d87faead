use crate::engine::dsp::delay_line::DelayLine;
use crate::engine::dsp::filters::Tone;
use crate::engine::dsp::rng::XorShift32;

/// Plucked-string voice: a tuned feedback delay with a one-pole damping
/// filter and a noise-burst exciter, plus an in-loop allpass whose
/// coefficient follows the structure control for mild inharmonicity.
pub struct StringVoice {
    sr: f32,
    delay_line: DelayLine,
    damp_filter: Tone,
    freq: f32,
    brightness: f32,
    accent: f32,
    structure: f32,
    damping: f32,
    excite_counter: u32,
    excite_length: u32,
    ap_z: f32,
    rng: XorShift32,
}

impl StringVoice {
    pub fn new(sr: f32) -> Self {
        // enough delay to reach ~25 Hz fundamentals
        let max_delay_samples = (sr / 25.0) as usize;
        Self {
            sr,
            delay_line: DelayLine::new(max_delay_samples),
            damp_filter: Tone::new(sr),
            freq: 110.0,
            brightness: 0.5,
            accent: 0.5,
            structure: 0.0,
            damping: 0.5,
            excite_counter: 0,
            excite_length: 0,
            ap_z: 0.0,
            rng: XorShift32::new(0x5eed_5711),
        }
    }

    pub fn set_freq(&mut self, freq: f32) {
        self.freq = freq.clamp(25.0, self.sr * 0.45);
        self.delay_line.set_delay(self.sr / self.freq);
    }

    pub fn set_brightness(&mut self, brightness: f32) {
        self.brightness = brightness.clamp(0.0, 1.0);
    }

    pub fn set_accent(&mut self, accent: f32) {
        self.accent = accent.clamp(0.0, 1.0);
    }

    pub fn set_structure(&mut self, structure: f32) {
        self.structure = structure.clamp(0.0, 1.0);
    }

    pub fn set_damping(&mut self, damping: f32) {
        self.damping = damping.clamp(0.0, 1.0);
    }

    /// Start a new excitation burst; the ringing tail keeps decaying
    /// underneath so retriggers do not click.
    pub fn trig(&mut self) {
        self.delay_line.set_delay(self.sr / self.freq);
        self.excite_counter = 0;
        self.excite_length = (20.0 + self.accent * 100.0) as u32;
    }

    pub fn process(&mut self) -> f32 {
        let feedback = 0.85 + self.damping * 0.14;
        let cutoff = 500.0 + self.brightness * 9500.0;
        self.damp_filter.set_freq(cutoff);

        let delayed = self.delay_line.read();

        let excitation = if self.excite_counter < self.excite_length {
            self.excite_counter += 1;
            (self.rng.rand01() * 2.0 - 1.0) * (0.2 + 0.6 * self.accent)
        } else {
            0.0
        };

        let filtered = self.damp_filter.process(delayed * feedback + excitation);

        // first-order allpass detunes the upper partials
        let c = self.structure * 0.5;
        let ap_out = -c * filtered + self.ap_z;
        self.ap_z = filtered + c * ap_out;
        self.delay_line.write(ap_out);

        delayed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trig_produces_sound_that_decays() {
        let mut voice = StringVoice::new(48000.0);
        voice.set_freq(220.0);
        voice.set_accent(0.8);
        voice.set_damping(0.3);
        voice.trig();
        let early: f32 = (0..2400).map(|_| voice.process().abs()).sum();
        let late: f32 = (0..2400)
            .map(|_| {
                for _ in 0..20 {
                    voice.process();
                }
                voice.process().abs()
            })
            .sum();
        assert!(early > 0.0);
        assert!(late < early);
    }

    #[test]
    fn silent_until_triggered() {
        let mut voice = StringVoice::new(48000.0);
        voice.set_freq(110.0);
        for _ in 0..1000 {
            assert_eq!(voice.process(), 0.0);
        }
    }

    #[test]
    fn output_bounded_at_full_sustain() {
        let mut voice = StringVoice::new(48000.0);
        voice.set_freq(110.0);
        voice.set_damping(1.0);
        voice.set_brightness(1.0);
        voice.set_accent(1.0);
        voice.trig();
        for _ in 0..48000 {
            assert!(voice.process().abs() < 4.0);
        }
    }
}
