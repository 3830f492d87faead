use crate::engine::controls::Knobs;
use crate::engine::leds::Leds;
use crate::engine::oscbank::{AnalysisParams, OscBank, ATTACK_LUT};

use super::reverb::ReverbFx;
use super::spectra::SpectraFx;
use super::string_voice::StringVoice;

pub const NUM_STRINGS: usize = 2;

/// Spectral string resonator: the analyzed peaks tune a pair of plucked
/// string voices, triggered round-robin on every gate edge. The voice
/// selected by a gate is trigged on the *following* block so its freshly
/// analyzed frequency has landed first. Output chains through the reverb.
pub struct SpectringsFx {
    voices: [StringVoice; NUM_STRINGS],
    current_voice: usize,
    trigger_next_cycle: bool,
    drywet: f32,
    attack_step: [usize; NUM_STRINGS],
    accent_amount: [f32; NUM_STRINGS],
    decay_amount: [f32; NUM_STRINGS],
    pan_spread: f32,
}

impl SpectringsFx {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            voices: std::array::from_fn(|_| StringVoice::new(sample_rate)),
            current_voice: 0,
            trigger_next_cycle: false,
            drywet: 0.0,
            attack_step: [0; NUM_STRINGS],
            accent_amount: [0.0; NUM_STRINGS],
            decay_amount: [0.5; NUM_STRINGS],
            pan_spread: 0.0,
        }
    }

    pub fn run(
        &mut self,
        knobs: &Knobs,
        gate: bool,
        tap: bool,
        oscbank: &mut OscBank,
        params: &mut AnalysisParams,
        reverb: &mut ReverbFx,
        leds: &mut Leds,
        sample_rate: f32,
    ) {
        params.transpose = (knobs.index * 12.0).round() as usize;
        if tap {
            SpectraFx::cycle_quantize(params, leds);
        }

        oscbank.calculated_suggested_hop();

        for (i, voice) in self.voices.iter_mut().enumerate() {
            voice.set_brightness(oscbank.get_magnitudo(i) * knobs.regen);
            voice.set_accent(oscbank.get_magnitudo(i));
            voice.set_structure(knobs.dense);
        }

        params.spread = 4.0;
        params.lower_harmonics = 0.0;
        oscbank.set_num_active(NUM_STRINGS);

        params.oct_mult = if knobs.tone < 0.2 {
            0.25
        } else if knobs.tone < 0.4 {
            0.5
        } else if knobs.tone < 0.6 {
            1.0
        } else if knobs.tone < 0.8 {
            2.0
        } else {
            4.0
        };

        // deferred trig from the previous gate, now that the analysis ran
        if self.trigger_next_cycle {
            let v = self.current_voice;
            self.voices[v].set_damping(self.decay_amount[v]);
            self.voices[v].trig();
            self.trigger_next_cycle = false;
        }

        if gate {
            params.do_analysis = true;
            self.current_voice = (self.current_voice + 1) % NUM_STRINGS;
            self.trigger_next_cycle = true;
            self.accent_amount[self.current_voice] =
                oscbank.get_magnitudo(self.current_voice);
            self.decay_amount[self.current_voice] = knobs.size;
            self.attack_step[self.current_voice] = 0;

            if self.current_voice == 0 {
                leds.set_for_x_cycles(1, 10, 1.0, 1.0, 1.0);
            } else {
                leds.set_for_x_cycles(2, 10, 1.0, 1.0, 1.0);
            }
        }

        self.drywet = knobs.blend;
        self.pan_spread = 1.0;
        reverb.set_lp_freq(
            sample_rate * 0.4 * (1.0 - knobs.speed * knobs.speed * 0.6) / 2.0,
        );
        reverb.shimmer = 0.0;
        reverb.set_feedback(
            0.7 + ((10.0 + knobs.speed * 90.0).log10() - 1.000001) * 0.299,
        );
        reverb.compression = 0.5;
        reverb.drywet = crate::engine::dsp::helpers::map(
            (knobs.speed * 1.1).clamp(0.0, 1.0) * 0.95,
            0.0,
            0.95,
            0.7,
            0.95,
        )
        .clamp(0.0, 0.95);
    }

    /// Retune the active voice from the freshest analysis, once per block.
    pub fn pre_process(&mut self, oscbank: &OscBank) {
        let freq = oscbank.get_frequency(self.current_voice);
        if freq > 0.0 {
            self.voices[self.current_voice].set_freq(freq);
        }
    }

    pub fn process_sample(
        &mut self,
        oscbank: &mut OscBank,
        in_l: f32,
        in_r: f32,
    ) -> (f32, f32) {
        oscbank.update_freq_and_magn();

        let ring_1 = self.voices[0].process()
            * (self.accent_amount[0] * ATTACK_LUT[self.attack_step[0]]
                + (1.0 - self.accent_amount[0]));
        let ring_2 = self.voices[1].process()
            * (self.accent_amount[1] * ATTACK_LUT[self.attack_step[1]]
                + (1.0 - self.accent_amount[1]));

        let width = 0.7 + (1.0 - self.pan_spread) * 0.3;
        let out_l = (ring_1 + ring_2 * self.pan_spread) * width;
        let out_r = (ring_2 + ring_1 * self.pan_spread) * width;

        self.attack_step[0] = (self.attack_step[0] + 1).min(299);
        self.attack_step[1] = (self.attack_step[1] + 1).min(299);

        if self.drywet > 0.98 {
            self.drywet = 1.0;
        }
        let wet = (0.5 * (self.drywet * 2.0)).sqrt();
        let dry = (0.95 * (2.0 - self.drywet * 2.0)).sqrt();
        (
            (wet * out_l + dry * in_l) * 0.5,
            (wet * out_r + dry * in_r) * 0.5,
        )
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

    fn run_once(fx: &mut SpectringsFx, gate: bool) {
        let mut bank = OscBank::new(48000.0);
        let mut params = AnalysisParams::new();
        let mut rv = ReverbFx::new(48000.0);
        let mut leds = Leds::new();
        fx.run(
            &knobs([1.0, 0.2, 0.5, 0.0, 0.5, 0.5, 0.3]),
            gate,
            false,
            &mut bank,
            &mut params,
            &mut rv,
            &mut leds,
            48000.0,
        );
    }

    #[test]
    fn gate_advances_round_robin_and_defers_trig() {
        let mut fx = SpectringsFx::new(48000.0);
        assert_eq!(fx.current_voice, 0);
        run_once(&mut fx, true);
        assert_eq!(fx.current_voice, 1);
        assert!(fx.trigger_next_cycle);
        assert_eq!(fx.attack_step[1], 0);
        // the trig itself lands on the next control pass
        run_once(&mut fx, false);
        assert!(!fx.trigger_next_cycle);
    }

    #[test]
    fn voices_ring_after_gate() {
        let mut fx = SpectringsFx::new(48000.0);
        let mut bank = OscBank::new(48000.0);
        run_once(&mut fx, true);
        run_once(&mut fx, false);
        let energy: f32 = (0..4800)
            .map(|_| {
                let (l, r) = fx.process_sample(&mut bank, 0.0, 0.0);
                l.abs() + r.abs()
            })
            .sum();
        assert!(energy > 0.0);
    }

    #[test]
    fn attack_steps_saturate() {
        let mut fx = SpectringsFx::new(48000.0);
        let mut bank = OscBank::new(48000.0);
        for _ in 0..400 {
            fx.process_sample(&mut bank, 0.0, 0.0);
        }
        assert_eq!(fx.attack_step, [299, 299]);
    }
}
