use crate::engine::controls::Knobs;
use crate::engine::dsp::rng::XorShift32;
use crate::engine::leds::Leds;
use crate::engine::oscbank::{AnalysisParams, OscBank, MAX_PEAKS};
use crate::engine::dsp::helpers::map;

use super::reverb::ReverbFx;

/// Additive resynthesis mode: the oscillator bank replays the analyzed
/// peaks; every gate edge requests a fresh analysis, the tap button cycles
/// the quantizer scale. Output chains through the reverb.
pub struct SpectraFx {
    drywet: f32,
    prev_wave_knob: f32,
    num_active: usize,
    rng: XorShift32,
}

impl SpectraFx {
    pub fn new() -> Self {
        Self {
            drywet: 0.0,
            prev_wave_knob: 0.0,
            num_active: MAX_PEAKS,
            rng: XorShift32::new(0x5bec_42a1),
        }
    }

    fn select_quality(oscbank: &mut OscBank, knob: f32) {
        oscbank.hop = if knob < 0.25 {
            2
        } else if knob < 0.5 {
            4
        } else if knob < 0.75 {
            8
        } else {
            16
        };
    }

    fn select_octave(knob: f32) -> f32 {
        if knob < 0.2 {
            0.25
        } else if knob < 0.4 {
            0.5
        } else if knob < 0.6 {
            1.0
        } else if knob < 0.8 {
            2.0
        } else {
            4.0
        }
    }

    /// Cycle the quantize scale and mirror it on the LEDs.
    pub(crate) fn cycle_quantize(params: &mut AnalysisParams, leds: &mut Leds) {
        params.quantize = (params.quantize + 1) % 9;
        if params.quantize > 0 {
            leds.set_base_color(0, 0.0, 1.0, 0.0);
            let color = match params.quantize {
                1 => [0.0, 0.0, 1.0],
                2 => [0.0, 0.0, 0.8],
                3 => [0.0, 0.3, 0.6],
                4 => [0.0, 0.4, 0.4],
                5 => [0.0, 0.6, 0.3],
                6 => [0.0, 0.7, 0.2],
                7 => [0.0, 0.4, 0.1],
                _ => [0.4, 0.4, 0.0],
            };
            leds.set_base_color(3, color[0], color[1], color[2]);
        } else {
            leds.set_base_color(0, 0.0, 0.0, 0.0);
            leds.set_base_color(3, 0.0, 0.0, 0.0);
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
        Self::select_quality(oscbank, 1.0 - knobs.speed);

        // waveform select smoothed through the slot-centre feedback value
        self.prev_wave_knob = oscbank
            .set_all_waveforms(((knobs.dense * 9.0 + self.prev_wave_knob) * 0.1 * 9.0) as usize);

        self.num_active =
            (1.0 + (knobs.size * 2.0).clamp(0.0, 1.0) * (MAX_PEAKS as f32 - 0.5)) as usize;
        params.spread = map(knobs.size - 0.5, 0.0, 0.5, 1.0, 4.0).clamp(1.0, 4.0);
        params.lower_harmonics = params.spread * 0.25;
        oscbank.set_num_active(self.num_active);

        params.oct_mult = Self::select_octave(knobs.tone);

        if gate {
            params.do_analysis = true;
            let r = self.rng.rand01();
            let g = self.rng.rand01();
            let b = self.rng.rand01();
            leds.set_base_color(1, r, g, b);
            leds.set_base_color(2, r, g, g);
        }

        reverb.set_lp_freq(sample_rate * 0.5 / 2.0);
        reverb.shimmer = 0.0;
        reverb.set_feedback(
            0.2 + ((10.0 + knobs.regen * 90.0).log10() - 1.000001) * 1.0,
        );
        reverb.compression = 0.5;
        self.drywet = knobs.blend;
        reverb.drywet = (knobs.regen * 1.1).clamp(0.0, 1.0);

        params.transpose = (knobs.index * 12.0).round() as usize;
        if tap {
            Self::cycle_quantize(params, leds);
        }
    }

    pub fn process_sample(
        &mut self,
        oscbank: &mut OscBank,
        in_l: f32,
        in_r: f32,
    ) -> (f32, f32) {
        oscbank.update_freq_and_magn();
        let output = oscbank.process();

        // unlike the other modes the top of the wet range approaches 1
        // asymptotically instead of clamping
        if self.drywet > 0.98 {
            self.drywet = (1.0 + self.drywet) * 0.5;
        }
        let wet = (0.5 * (self.drywet * 2.0)).sqrt();
        let dry = (0.95 * (2.0 - self.drywet * 2.0)).max(0.0).sqrt();
        (
            (wet * output + dry * in_l) * 0.5,
            (wet * output + dry * in_r) * 0.5,
        )
    }
}
