// Spectral analysis / additive resynthesis engine. A hop-decimated sliding
// window feeds a 1024-point transform; on demand the spectrum is reduced to
// at most six (frequency, magnitude) peaks which drive a bank of smoothed
// oscillators through a shared attack envelope table.

use once_cell::sync::Lazy;

use crate::engine::dsp::fft::{ForwardFft, FFT_LENGTH};
use crate::engine::dsp::filters::Svf;
use crate::engine::dsp::helpers::{map, mtof};
use crate::engine::dsp::osc::Oscillator;

pub const MAX_PEAKS: usize = 6;

/// 300-step fade envelope: 1 -> 0 over the first 48 entries, 0 -> 1 over
/// the rest. Oscillators and string voices index it with a per-voice step
/// counter so every (re)trigger dips to silence before fading back in.
pub static ATTACK_LUT: Lazy<[f32; 300]> = Lazy::new(|| {
    let mut lut = [0.0f32; 300];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = if i < 48 {
            map(i as f32, 0.0, 48.0, 1.0, 0.0)
        } else {
            map(i as f32, 48.0, 300.0, 0.0, 1.0)
        };
    }
    lut
});

/// 128 equal-tempered note frequencies in millihertz, C-1 upward.
const CHRM_SCALE: [i32; 128] = [
    8176, 8662, 9177, 9723, 10301, 10913, 11562, 12250, 12978, 13750, 14568,
    15434, 16352, 17324, 18354, 19445, 20602, 21827, 23125, 24500, 25957,
    27500, 29135, 30868, 32703, 34648, 36708, 38891, 41203, 43654, 46249,
    48999, 51913, 55000, 58270, 61735, 65406, 69296, 73416, 77782, 82407,
    87307, 92499, 97999, 103826, 110000, 116541, 123471, 130813, 138591,
    146832, 155563, 164814, 174614, 184997, 195998, 207652, 220000, 233082,
    246942, 261626, 277183, 293665, 311127, 329628, 349228, 369994, 391995,
    415305, 440000, 466164, 493883, 523251, 554365, 587330, 622254, 659255,
    698456, 739989, 783991, 830609, 880000, 932328, 987767, 1046502,
    1108731, 1174659, 1244508, 1318510, 1396913, 1479978, 1567982, 1661219,
    1760000, 1864655, 1975533, 2093005, 2217461, 2349318, 2489016, 2637020,
    2793826, 2959955, 3135963, 3322438, 3520000, 3729310, 3951066, 4186009,
    4434922, 4698636, 4978032, 5274041, 5587652, 5919911, 6271927, 6644875,
    7040000, 7458620, 7902133, 8372018, 8869844, 9397273, 9956063, 10548080,
    11175300, 11839820, 12543850,
];

const SCALE_12: [bool; 12] = [true; 12];
const SCALE_7: [bool; 12] = [
    true, false, true, false, true, true, false, true, false, true, false,
    true,
];
const SCALE_6: [bool; 12] = [
    true, false, true, false, true, true, false, true, false, true, false,
    false,
];
const SCALE_5: [bool; 12] = [
    true, false, true, false, false, true, false, true, false, true, false,
    false,
];
const SCALE_4: [bool; 12] = [
    true, false, true, false, false, true, false, true, false, false, false,
    false,
];
const SCALE_3: [bool; 12] = [
    true, false, false, false, false, true, false, true, false, false,
    false, false,
];
const SCALE_2: [bool; 12] = [
    true, false, false, false, false, false, false, true, false, false,
    false, false,
];
const SCALE_1: [bool; 12] = [
    true, false, false, false, false, false, false, false, false, false,
    false, false,
];

/// Scale mask for quantize settings 1..=8 (1 = chromatic, 8 = root only).
pub fn scale_mask(quantize: usize) -> &'static [bool; 12] {
    match quantize {
        1 => &SCALE_12,
        2 => &SCALE_7,
        3 => &SCALE_6,
        4 => &SCALE_5,
        5 => &SCALE_4,
        6 => &SCALE_3,
        7 => &SCALE_2,
        _ => &SCALE_1,
    }
}

fn get_closest(val1: i32, val2: i32, target: i32) -> i32 {
    // ties resolve toward the higher note
    if target - val1 >= val2 - target {
        val2
    } else {
        val1
    }
}

/// Nearest allowed note (millihertz) to `target`, restricted to mask
/// entries rotated by `offset` semitones.
pub fn find_closest(filter: &[bool; 12], target: i32, offset: usize) -> i32 {
    let n = CHRM_SCALE.len();
    let mut lower = 0;
    let mut higher = n as i32;
    for i in 0..n {
        if CHRM_SCALE[i] < target && filter[(i + offset) % 12] {
            lower = CHRM_SCALE[i];
        }
        let rev = (n - 1) - i;
        if CHRM_SCALE[rev] > target && filter[(rev + offset) % 12] {
            higher = CHRM_SCALE[rev];
        }
    }
    get_closest(lower, higher, target)
}

/// Analysis-time parameters, owned by the dispatcher and shared between the
/// two spectral modes (the quantizer setting deliberately survives mode
/// switches).
pub struct AnalysisParams {
    pub quantize: usize,
    pub transpose: usize,
    pub oct_mult: f32,
    pub spread: f32,
    pub lower_harmonics: f32,
    pub do_analysis: bool,
}

impl AnalysisParams {
    pub fn new() -> Self {
        Self {
            quantize: 0,
            transpose: 0,
            oct_mult: 1.0,
            spread: 1.0,
            lower_harmonics: 0.0,
            do_analysis: false,
        }
    }
}

/// Waveform changes are two-phase: a change request only marks the
/// oscillator and resets its attack; the waveform actually swaps on the
/// next selection pass, once the envelope has dipped to its floor.
#[derive(Clone, Copy, PartialEq)]
enum SwapState {
    Active,
    Pending,
}

pub struct OscBank {
    osc: [Oscillator; MAX_PEAKS],
    freq: [f32; MAX_PEAKS],
    magn: [f32; MAX_PEAKS],
    current_freq: [f32; MAX_PEAKS],
    current_magn: [f32; MAX_PEAKS],
    attack_step: [usize; MAX_PEAKS],
    swap: [SwapState; MAX_PEAKS],
    fft: ForwardFft,
    fft_in: [f32; FFT_LENGTH],
    window: [f32; FFT_LENGTH],
    windowed: [f32; FFT_LENGTH],
    spectrum: [f32; FFT_LENGTH],
    magnitudes: [f32; FFT_LENGTH / 2],
    band_size: f32,
    num_active: usize,
    output_mult: f32,
    prev_output_mult: f32,
    amp_attenuation: f32,
    previous_wave: usize,
    current_wave: usize,
    pub hop: usize,
    pre_lp: Svf,
    pre_hp: Svf,
    sample_rate: f32,
}

impl OscBank {
    pub fn new(sample_rate: f32) -> Self {
        let mut window = [0.0f32; FFT_LENGTH];
        for (i, w) in window.iter_mut().enumerate() {
            // Hann
            *w = 0.5
                * (1.0
                    - (2.0 * std::f32::consts::PI * i as f32
                        / (FFT_LENGTH - 1) as f32)
                        .cos());
        }
        let hop = 8;
        Self {
            osc: std::array::from_fn(|_| Oscillator::new(sample_rate)),
            freq: [0.0; MAX_PEAKS],
            magn: [0.0; MAX_PEAKS],
            current_freq: [0.0; MAX_PEAKS],
            current_magn: [0.0; MAX_PEAKS],
            attack_step: [0; MAX_PEAKS],
            swap: [SwapState::Active; MAX_PEAKS],
            fft: ForwardFft::new(),
            fft_in: [0.0; FFT_LENGTH],
            window,
            windowed: [0.0; FFT_LENGTH],
            spectrum: [0.0; FFT_LENGTH],
            magnitudes: [0.0; FFT_LENGTH / 2],
            band_size: sample_rate / (FFT_LENGTH * hop) as f32,
            num_active: MAX_PEAKS,
            output_mult: 0.0,
            prev_output_mult: 0.0,
            amp_attenuation: 1.0,
            previous_wave: 0,
            current_wave: 0,
            hop,
            pre_lp: Svf::new(),
            pre_hp: Svf::new(),
            sample_rate,
        }
    }

    pub fn set_num_active(&mut self, value: usize) {
        self.num_active = value.clamp(1, MAX_PEAKS);
    }

    pub fn band_size(&self) -> f32 {
        self.band_size
    }

    /// Raw analyzed peak (frequency, magnitude) before smoothing.
    pub fn analyzed_peak(&self, index: usize) -> (f32, f32) {
        (self.freq[index], self.magn[index])
    }

    pub fn get_frequency(&self, index: usize) -> f32 {
        self.current_freq[index]
    }

    pub fn get_magnitudo(&self, index: usize) -> f32 {
        self.current_magn[index]
    }

    /// Select a waveform slot for the whole bank. Returns the slot's knob
    /// centre position, fed back into the selection smoothing upstream.
    pub fn set_all_waveforms(&mut self, waveform: usize) -> f32 {
        // (oscillator waveform, amplitude attenuation, knob centre)
        let (wave, attenuation, centre) = match waveform {
            0 => (0, 1.0, 0.5 / 9.0),
            1 => (8, 1.0, 1.5 / 9.0),
            2 => (1, 0.9, 2.5 / 9.0),
            3 => (5, 0.9, 3.5 / 9.0),
            4 => (7, 0.35, 4.5 / 9.0),
            5 => (2, 0.40, 5.5 / 9.0),
            6 => (3, 0.45, 6.5 / 9.0),
            7 => (6, 0.45, 7.5 / 9.0),
            8 => (4, 0.4, 8.5 / 9.0),
            _ => (self.current_wave, self.amp_attenuation, 0.0),
        };
        self.current_wave = wave;
        self.amp_attenuation = attenuation;

        for i in 0..MAX_PEAKS {
            // second pass: actually swap, the attack lut has reached its floor
            if self.swap[i] == SwapState::Pending {
                self.osc[i].set_waveform(self.current_wave);
                self.swap[i] = SwapState::Active;
            }
            // first pass: only mark and restart the fade
            if self.previous_wave != self.current_wave {
                self.swap[i] = SwapState::Pending;
                self.attack_step[i] = 0;
            }
        }
        if self.previous_wave != self.current_wave {
            self.previous_wave = self.current_wave;
        }
        centre
    }

    /// One resynthesis sample: sum of all oscillators, each weighted by the
    /// smoothed bank gain and its own attack envelope position.
    pub fn process(&mut self) -> f32 {
        let mut output = 0.0;
        for i in 0..MAX_PEAKS {
            self.output_mult = ((0.5 + 0.2 / self.num_active as f32)
                + self.prev_output_mult * 47.0)
                / 48.0;
            output += self.osc[i].process()
                * self.output_mult
                * ATTACK_LUT[self.attack_step[i]];
            self.attack_step[i] = (self.attack_step[i] + 1).min(299);
            self.prev_output_mult = self.output_mult;
        }
        output
    }

    /// Slide the analysis window forward by one block of input. The stereo
    /// input is collapsed at equal power, band-limited, decimated by `hop`
    /// and appended; the windowed transform runs every call so a triggered
    /// analysis always sees the freshest spectrum.
    pub fn fill_input_buffer(&mut self, in_l: &[f32], in_r: &[f32]) {
        self.band_size = self.sample_rate / (FFT_LENGTH * self.hop) as f32;
        let real_size = in_l.len() / self.hop;
        if real_size == 0 || real_size > FFT_LENGTH {
            return;
        }

        self.pre_lp.set_params(
            self.sample_rate / (2 * self.hop) as f32,
            0.6,
            self.sample_rate,
        );
        self.pre_hp.set_params(
            self.band_size * (32 / self.hop) as f32,
            0.6,
            self.sample_rate,
        );

        self.fft_in.copy_within(real_size.., 0);
        for i in 0..real_size {
            let mut sum = 0.0;
            for j in 0..self.hop {
                let sample = (in_l[i * self.hop + j] + in_r[i * self.hop + j]) * 0.707;
                let (lp, _, _, _) = self.pre_lp.process(sample);
                let (_, hp, _, _) = self.pre_hp.process(lp);
                sum += hp / self.hop as f32;
            }
            self.fft_in[i + FFT_LENGTH - real_size] = sum;
        }
        for i in 0..FFT_LENGTH {
            self.windowed[i] = self.window[i] * self.fft_in[i];
        }
        self.fft.direct(&self.windowed, &mut self.spectrum);
    }

    /// Reduce the current spectrum to `MAX_PEAKS` band-excluded peaks.
    /// Runs only when explicitly triggered, never on the per-sample path.
    pub fn calculate_spectral_analysis(&mut self, params: &AnalysisParams) {
        let half = FFT_LENGTH / 2;
        for i in 0..half {
            let re = self.spectrum[i];
            let im = self.spectrum[i + half];
            let mut mag = (re * re + im * im).sqrt();
            if i < 32 / self.hop {
                // DC / rumble bleed
                mag *= 0.5;
            }
            self.magnitudes[i] = mag;
        }

        let mut max_amp = 20.0f32;
        for i in 0..MAX_PEAKS {
            // peaks are picked from the lower half of the usable spectrum
            let mut a = 0usize;
            let mut best = self.magnitudes[0];
            for (j, &m) in self.magnitudes[..half / 2].iter().enumerate() {
                if m > best {
                    best = m;
                    a = j;
                }
            }

            self.freq[i] = a as f32 * self.band_size * params.oct_mult;
            if params.quantize > 0 {
                self.freq[i] = find_closest(
                    scale_mask(params.quantize),
                    (self.freq[i] as i32) * 1000,
                    params.transpose,
                ) as f32
                    / 1000.0;
            }
            max_amp = max_amp.max(self.magnitudes[a]);
            self.magn[i] = (self.magnitudes[a] / max_amp)
                * (1.0 - params.lower_harmonics)
                + params.lower_harmonics;
            if self.freq[i] > self.sample_rate / 2.0 {
                self.freq[i] = 0.0;
                self.magn[i] = 0.0;
            }

            self.remove_nearest_bands(a as f32 * self.band_size, a, params.spread);
        }

        for i in self.num_active..MAX_PEAKS {
            self.magn[i] = 0.0;
        }
    }

    /// Suppress the neighborhood of a picked peak: zero the bin itself,
    /// then ramp multipliers 0 -> 1 up to one musical half-step above the
    /// peak frequency. A peak at bin 0 has no neighborhood; the mirrored
    /// negative-index slots do not exist and are left untouched.
    fn remove_nearest_bands(&mut self, frequency: f32, start_band: usize, spread: f32) {
        self.magnitudes[start_band] = 0.0;
        if start_band == 0 {
            return;
        }
        let upper_frequency =
            mtof((12.0 * (frequency / 440.0).log2() + 69.0 + 1.0) as i32 as f32);
        let mut i = start_band;
        while (i as f32 * self.band_size / spread) < upper_frequency
            && i < FFT_LENGTH / 2
        {
            let mult = map(
                i as f32 * self.band_size / spread,
                self.band_size / spread,
                upper_frequency,
                0.0,
                1.0,
            );
            self.magnitudes[i] *= mult;
            i += 1;
        }
    }

    /// Per-sample 47/48 smoothing of every oscillator toward its analyzed
    /// peak. The amplitude applies the pre-update magnitude so a freshly
    /// analyzed peak fades in over the next window.
    pub fn update_freq_and_magn(&mut self) {
        for i in 0..MAX_PEAKS {
            let new_freq = (self.freq[i] + self.current_freq[i] * 47.0) / 48.0;
            self.osc[i].set_freq(new_freq);
            self.current_freq[i] = new_freq;

            let new_magn = (self.magn[i] + self.current_magn[i] * 47.0) / 48.0;
            self.osc[i].set_amp(self.current_magn[i] * self.amp_attenuation);
            self.current_magn[i] = new_magn;
        }
    }

    /// The adaptive-quality heuristic collapsed to its fixed point in the
    /// source; string resonator mode always analyzes at the largest hop.
    pub fn calculated_suggested_hop(&mut self) {
        self.hop = 16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    #[test]
    fn attack_lut_shape() {
        for i in 0..47 {
            assert!(ATTACK_LUT[i] > ATTACK_LUT[i + 1], "decay at {i}");
        }
        for i in 48..299 {
            assert!(ATTACK_LUT[i] < ATTACK_LUT[i + 1], "rise at {i}");
        }
        assert!((ATTACK_LUT[0] - 1.0).abs() < 1e-6);
        assert!(ATTACK_LUT[48].abs() < 1e-6);
        assert!(1.0 - ATTACK_LUT[299] < 0.005);
    }

    #[test]
    fn quantize_is_idempotent_on_scale() {
        // every chromatic note round-trips through the full mask
        for &mhz in CHRM_SCALE.iter() {
            assert_eq!(find_closest(&SCALE_12, mhz, 0), mhz);
        }
    }

    #[test]
    fn quantize_ties_resolve_upward() {
        assert_eq!(get_closest(100, 200, 150), 200);
        assert_eq!(get_closest(100, 200, 149), 100);
    }

    #[test]
    fn quantize_respects_scale_mask() {
        // root-only mask with no offset snaps everything to some C
        let snapped = find_closest(&SCALE_1, 450_000, 0);
        let note = CHRM_SCALE.iter().position(|&v| v == snapped).unwrap();
        assert_eq!(note % 12, 0);
    }

    fn feed_tone(bank: &mut OscBank, freqs: &[(f32, f32)], blocks: usize, block: usize) {
        let sr = 48000.0;
        let mut t = 0usize;
        for _ in 0..blocks {
            let mut l = vec![0.0f32; block];
            for (i, s) in l.iter_mut().enumerate() {
                let n = (t + i) as f32;
                *s = freqs
                    .iter()
                    .map(|&(f, a)| a * (TAU * f * n / sr).sin())
                    .sum();
            }
            t += block;
            let r = l.clone();
            bank.fill_input_buffer(&l, &r);
        }
    }

    #[test]
    fn recovers_a_pure_tone_within_one_bin() {
        let mut bank = OscBank::new(48000.0);
        assert_eq!(bank.hop, 8);
        // enough blocks to fill the 1024-sample decimated window
        feed_tone(&mut bank, &[(440.0, 0.5)], 96, 96);
        let params = AnalysisParams::new();
        bank.calculate_spectral_analysis(&params);
        let (freq, magn) = bank.analyzed_peak(0);
        let band = bank.band_size();
        assert!((freq - 440.0).abs() <= band, "freq={freq} band={band}");
        assert!((magn - 1.0).abs() < 1e-3, "magn={magn}");
    }

    #[test]
    fn recovers_six_separated_tones() {
        let mut bank = OscBank::new(48000.0);
        let tones = [
            (100.0, 1.0),
            (300.0, 0.9),
            (500.0, 0.8),
            (800.0, 0.7),
            (1100.0, 0.6),
            (1400.0, 0.5),
        ];
        feed_tone(&mut bank, &tones, 96, 96);
        let params = AnalysisParams::new();
        bank.calculate_spectral_analysis(&params);
        let band = bank.band_size();
        for &(f, _) in tones.iter() {
            let hit = (0..MAX_PEAKS).any(|i| {
                let (pf, pm) = bank.analyzed_peak(i);
                pm > 0.0 && (pf - f).abs() <= band
            });
            assert!(hit, "missing tone {f}");
        }
    }

    #[test]
    fn waveform_change_is_two_phase() {
        let mut bank = OscBank::new(48000.0);
        // run the attack envelopes forward so a reset is observable
        for i in 0..MAX_PEAKS {
            bank.attack_step[i] = 200;
        }
        bank.set_all_waveforms(5);
        // first pass: marked, attack reset, not yet swapped
        assert!(bank.swap.iter().all(|&s| s == SwapState::Pending));
        assert!(bank.attack_step.iter().all(|&s| s == 0));
        bank.set_all_waveforms(5);
        assert!(bank.swap.iter().all(|&s| s == SwapState::Active));
    }

    #[test]
    fn peaks_beyond_active_count_are_zeroed() {
        let mut bank = OscBank::new(48000.0);
        bank.set_num_active(2);
        feed_tone(&mut bank, &[(440.0, 0.5), (660.0, 0.4)], 96, 96);
        let params = AnalysisParams::new();
        bank.calculate_spectral_analysis(&params);
        for i in 2..MAX_PEAKS {
            assert_eq!(bank.analyzed_peak(i).1, 0.0);
        }
    }
}
