use crate::engine::buffers::{SharedBuffers, LOOPER_MAX_SIZE};
use crate::engine::controls::{Knobs, Mode};
use crate::engine::dsp::averager::{Averager, RMS_SIZE};
use crate::engine::dsp::filters::{DcBlock, Tone};
use crate::engine::dsp::helpers::{fonepole, log_knob};
use crate::engine::leds::Leds;

use super::reverb::ReverbFx;

/// Tempo divisions of the tapped base time.
const NUM_DELAY_TIMES: usize = 17;
const DELAY_TIMES: [f32; NUM_DELAY_TIMES] = [
    0.0078125,
    0.015625,
    0.03125,
    0.25 / 6.0,
    0.046875,
    0.0625,
    0.25 / 3.0,
    0.09375,
    0.125,
    0.5 / 3.0,
    0.1875,
    0.25,
    1.0 / 3.0,
    0.375,
    0.5,
    0.75,
    1.0,
];

/// Control passes per slot update; at a ~1 ms block rate this gives time
/// changes a 20 ms settling window.
const CONTROL_LATENCY: usize = 20;

/// Per-sample crossfade step; a full ramp spans 47 * CONTROL_LATENCY
/// samples, comfortably inside one slot-update window.
const XFADE_STEP: f32 = 1.0 / (47.0 * CONTROL_LATENCY as f32);

/// Tempo-synced delay over the shared buffers. Two (time, multiplier)
/// slots crossfade into each other whenever the tap interval or a division
/// knob changes, so the delay time never jumps audibly. Freeze pins the
/// read window to a captured span of the buffer.
pub struct DelayFx {
    mult_l: [f32; 2],
    mult_r: [f32; 2],
    time: [i32; 2],
    pub(crate) active: usize,
    pub(crate) inactive: usize,
    pub(crate) xfade_current: f32,
    xfade_target: f32,

    time_count: usize,
    time_trig: usize,
    write_pos: usize,
    control_counter: usize,
    main_counter: usize,
    pos_l: [usize; 2],
    pos_r: [usize; 2],
    out_l: [f32; 2],
    out_r: [f32; 2],
    left_counter: i32,
    right_counter: i32,
    left_counter_4: usize,
    right_counter_4: usize,

    frozen: bool,
    frozen_start: usize,
    frozen_end: usize,
    frozen_pos: usize,

    feedback: f32,
    drywet: f32,
    cutoff: f32,
    target_cutoff: f32,
    prev_sample_l: f32,
    prev_sample_r: f32,

    rms_count: usize,
    target_rms: f32,
    feedback_rms: f32,
    fast_feedback_rms: f32,
    averager: Averager,

    dcblock_l: DcBlock,
    dcblock_r: DcBlock,
    dcblock_2l: DcBlock,
    dcblock_2r: DcBlock,
    tone_l: Tone,
    tone_r: Tone,
}

impl DelayFx {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            mult_l: [1.0; 2],
            mult_r: [1.0; 2],
            time: [-1; 2],
            active: 0,
            inactive: 1,
            xfade_current: 0.0,
            xfade_target: 0.0,
            time_count: 0,
            time_trig: 0,
            write_pos: 0,
            control_counter: 0,
            main_counter: 0,
            pos_l: [0; 2],
            pos_r: [0; 2],
            out_l: [0.0; 2],
            out_r: [0.0; 2],
            left_counter: 0,
            right_counter: 0,
            left_counter_4: 0,
            right_counter_4: 0,
            frozen: false,
            frozen_start: 0,
            frozen_end: 0,
            frozen_pos: 0,
            feedback: 0.0,
            drywet: 0.0,
            cutoff: 10000.0,
            target_cutoff: 10000.0,
            prev_sample_l: 0.0,
            prev_sample_r: 0.0,
            rms_count: 0,
            target_rms: 0.0,
            feedback_rms: 0.0,
            fast_feedback_rms: 0.0,
            averager: Averager::new(),
            dcblock_l: DcBlock::new(),
            dcblock_r: DcBlock::new(),
            dcblock_2l: DcBlock::new(),
            dcblock_2r: DcBlock::new(),
            tone_l: Tone::new(sample_rate),
            tone_r: Tone::new(sample_rate),
        }
    }

    /// Division changes land in the inactive slot and arm the crossfade.
    fn select_division(&mut self, knob1: f32, knob2: f32) {
        let idx1 = ((knob1 * NUM_DELAY_TIMES as f32) as usize).min(NUM_DELAY_TIMES - 1);
        let idx2 = ((knob2 * NUM_DELAY_TIMES as f32) as usize).min(NUM_DELAY_TIMES - 1);
        let new_mult_l = DELAY_TIMES[idx1];
        let new_mult_r = DELAY_TIMES[idx2];

        if new_mult_l != self.mult_l[self.active] || new_mult_r != self.mult_r[self.active] {
            self.mult_l[self.inactive] = new_mult_l;
            self.mult_r[self.inactive] = new_mult_r;
            self.xfade_target = self.inactive as f32;
        }
    }

    pub fn run(
        &mut self,
        knobs: &Knobs,
        gate: bool,
        reverb: &mut ReverbFx,
        leds: &mut Leds,
        sample_rate: f32,
    ) {
        if gate {
            self.time_trig = self.time_count;
            self.time_count = 0;
            leds.set_for_x_cycles(1, 10, 1.0, 0.5, 0.5);
            leds.set_for_x_cycles(2, 10, 1.0, 0.5, 0.5);
        }

        // slot updates only once per control latency window
        if self.control_counter == 0 {
            self.time[self.inactive] = self.time[self.active];
            self.mult_l[self.inactive] = self.mult_l[self.active];
            self.mult_r[self.inactive] = self.mult_r[self.active];

            if self.time_trig > 0 {
                self.time[self.inactive] = ((self.time_trig * 4) % LOOPER_MAX_SIZE) as i32;
                self.xfade_target = self.inactive as f32;
                self.time_trig = 0;
                log::debug!("delay time captured: {} samples", self.time[self.inactive]);

                if self.main_counter == 0 {
                    self.left_counter =
                        (self.write_pos as i32 - self.pos_l[self.active] as i32) / 4;
                    self.right_counter =
                        (self.write_pos as i32 - self.pos_r[self.active] as i32) / 4;
                    self.left_counter_4 = 0;
                    self.right_counter_4 = 0;
                }
                self.main_counter = (self.main_counter + 1) % 4;
            }

            if knobs.index > 0.5 {
                if !self.frozen {
                    self.frozen = true;
                    self.frozen_end = self.write_pos;
                    self.frozen_start = (self.write_pos + LOOPER_MAX_SIZE
                        - self.time[self.active].max(0) as usize)
                        % LOOPER_MAX_SIZE;
                    self.frozen_pos = self.frozen_start;
                }
            } else {
                self.frozen = false;
            }

            self.select_division(knobs.blend, knobs.regen);
        }
        self.control_counter = (self.control_counter + 1) % CONTROL_LATENCY;

        self.feedback =
            knobs.size * 0.1 + ((10.0 + knobs.tone * 90.0).log10() - 1.000001) * 0.9;
        self.drywet = ((10.0 + knobs.dense * 90.0).log10() - 1.0) * 1.01;

        self.target_cutoff = log_knob(knobs.speed, 400.0, 20000.0);
        fonepole(&mut self.cutoff, self.target_cutoff, 0.1);
        self.tone_l.set_freq(self.cutoff);
        self.tone_r.set_freq(self.cutoff);

        reverb.set_lp_freq((sample_rate + sample_rate * knobs.size) / 4.0);
        reverb.set_feedback(
            0.65 + ((10.0 + knobs.size * 90.0).log10() - 1.000001) * 0.20,
        );
        reverb.shimmer = 0.0;
        reverb.compression = 1.0;
        reverb.drywet = knobs.size * 0.75;
    }

    pub fn process_sample(
        &mut self,
        bufs: &mut SharedBuffers,
        reverb: &mut ReverbFx,
        leds: &mut Leds,
        in_l: f32,
        in_r: f32,
    ) -> (f32, f32) {
        self.rms_count = (self.rms_count + 1) % RMS_SIZE;
        if self.rms_count == 0 {
            self.target_rms = self.averager.process_rms();
        }
        // both followers slow down as they rise, taming feedback spikes
        let feedback_rms_coeff = 0.001 * (1.0 / (0.5 + self.feedback_rms));
        fonepole(
            &mut self.feedback_rms,
            self.target_rms,
            feedback_rms_coeff,
        );
        let fast_feedback_rms_coeff = 0.0005 * (1.0 / (0.7 + self.fast_feedback_rms));
        fonepole(
            &mut self.fast_feedback_rms,
            self.target_rms,
            fast_feedback_rms_coeff,
        );

        let input_l = self.dcblock_2l.process(
            self.prev_sample_l * self.feedback * (1.0 - self.feedback_rms * 0.3)
                + in_l * (1.0 - self.feedback).clamp(0.5, 1.0),
        ) * (1.0 - self.fast_feedback_rms * 0.4);
        let input_r = self.dcblock_2r.process(
            self.prev_sample_r * self.feedback * (1.0 - self.feedback_rms * 0.3)
                + in_r * (1.0 - self.feedback).clamp(0.5, 1.0),
        ) * (1.0 - self.fast_feedback_rms * 0.4);

        bufs.write_live(self.write_pos, input_l, input_r);
        if !self.frozen {
            bufs.write_frozen(self.write_pos, input_l, input_r);
        }

        if self.time[self.inactive] > 0 {
            let read_origin = if self.frozen { self.frozen_pos } else { self.write_pos };
            for slot in 0..2 {
                let t = self.time[slot].max(0) as f32;
                let off_l = (t * self.mult_l[slot]) as usize;
                let off_r = (t * self.mult_r[slot]) as usize;
                self.pos_l[slot] = (read_origin + LOOPER_MAX_SIZE - off_l) % LOOPER_MAX_SIZE;
                self.pos_r[slot] = (read_origin + LOOPER_MAX_SIZE - off_r) % LOOPER_MAX_SIZE;
                if self.frozen {
                    self.out_l[slot] = bufs.frozen_l_at(self.pos_l[slot]);
                    self.out_r[slot] = bufs.frozen_r_at(self.pos_r[slot]);
                } else {
                    self.out_l[slot] = bufs.live_l_at(self.pos_l[slot]);
                    self.out_r[slot] = bufs.live_r_at(self.pos_r[slot]);
                }
            }

            if self.frozen {
                self.frozen_pos = (self.frozen_pos + 1) % LOOPER_MAX_SIZE;
                if self.frozen_pos == self.frozen_end {
                    self.frozen_pos = self.frozen_start;
                }
            }

            // bounded crossfade ramp; roles swap only once fully settled
            if self.xfade_current > self.xfade_target {
                self.xfade_current = (self.xfade_current - XFADE_STEP).clamp(0.0, 1.0);
            } else if self.xfade_current < self.xfade_target {
                self.xfade_current = (self.xfade_current + XFADE_STEP).clamp(0.0, 1.0);
            } else {
                self.active = self.xfade_target as usize;
                self.inactive = (self.active + 1) % 2;
            }
        }

        // wrap-progress display
        self.left_counter -= 1;
        if self.left_counter <= 0 {
            if self.left_counter_4 == 0 {
                let on = if self.frozen { 0.0 } else { 1.0 };
                leds.set_for_x_cycles(0, 3, on, 0.0, 1.0 - on);
            }
            self.left_counter_4 = (self.left_counter_4 + 1) % 4;
            self.left_counter =
                (self.write_pos as i32 - self.pos_l[self.active] as i32) / 4;
        }
        self.right_counter -= 1;
        if self.right_counter <= 0 {
            if self.right_counter_4 == 0 {
                let on = if self.frozen { 0.0 } else { 1.0 };
                leds.set_for_x_cycles(3, 3, on, 0.0, 1.0 - on);
            }
            self.right_counter_4 = (self.right_counter_4 + 1) % 4;
            self.right_counter =
                (self.write_pos as i32 - self.pos_r[self.active] as i32) / 4;
        }

        self.time_count += 1;
        self.write_pos = (self.write_pos + 1) % LOOPER_MAX_SIZE;

        let xf = self.xfade_current;
        let wet = (0.5 * (xf * 2.0)).sqrt();
        let dry = (0.95 * (2.0 - xf * 2.0)).sqrt();
        let mut output_l = wet * self.out_l[1] + dry * self.out_l[0];
        let mut output_r = wet * self.out_r[1] + dry * self.out_r[0];

        output_l = self.tone_l.process(self.dcblock_l.process(output_l));
        output_r = self.tone_r.process(self.dcblock_r.process(output_r));

        let (reverb_l, reverb_r) =
            reverb.process_sample(Mode::Delay, bufs, leds, output_l, output_r);

        self.prev_sample_l = reverb_l * 0.85;
        self.prev_sample_r = reverb_r * 0.85;

        self.averager.add(
            (self.prev_sample_l * self.prev_sample_l
                + self.prev_sample_r * self.prev_sample_r)
                / 2.0,
        );

        if self.drywet > 0.99 {
            self.drywet = 1.0;
        }
        let wet = (0.5 * (self.drywet * 2.0)).sqrt();
        let dry = (0.7 * (2.0 - self.drywet * 2.0)).max(0.0).sqrt();
        (
            wet * self.prev_sample_l + dry * in_l,
            wet * self.prev_sample_r + dry * in_r,
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

    fn block(
        fx: &mut DelayFx,
        bufs: &mut SharedBuffers,
        rv: &mut ReverbFx,
        leds: &mut Leds,
        k: &Knobs,
        gate: bool,
        n: usize,
        t: &mut usize,
    ) -> Vec<f32> {
        fx.run(k, gate, rv, leds, 48000.0);
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let x = (*t as f32 * 0.11).sin() * 0.5;
            *t += 1;
            let (l, _) = fx.process_sample(bufs, rv, leds, x, x);
            out.push(l);
        }
        out
    }

    #[test]
    fn crossfade_stays_in_unit_range_with_bounded_steps() {
        let mut fx = DelayFx::new(48000.0);
        let mut bufs = SharedBuffers::new();
        let mut rv = ReverbFx::new(48000.0);
        let mut leds = Leds::new();
        let mut t = 0usize;

        let base = knobs([0.0, 0.5, 0.5, 0.0, 0.0, 0.3, 0.8]);
        // tap a base time, then slam both division knobs around
        block(&mut fx, &mut bufs, &mut rv, &mut leds, &base, true, 48, &mut t);
        for _ in 0..100 {
            block(&mut fx, &mut bufs, &mut rv, &mut leds, &base, false, 48, &mut t);
        }
        block(&mut fx, &mut bufs, &mut rv, &mut leds, &base, true, 48, &mut t);

        let mut prev = fx.xfade_current;
        for i in 0..400 {
            let wild = knobs([
                if i % 2 == 0 { 1.0 } else { 0.0 },
                0.5,
                1.0,
                0.0,
                if i % 3 == 0 { 1.0 } else { 0.0 },
                1.0,
                1.0,
            ]);
            block(&mut fx, &mut bufs, &mut rv, &mut leds, &wild, false, 48, &mut t);
            let xf = fx.xfade_current;
            assert!((0.0..=1.0).contains(&xf), "xfade {xf}");
            assert!(
                (xf - prev).abs() <= XFADE_STEP * 48.0 + 1e-6,
                "step too large: {} -> {}",
                prev,
                xf
            );
            prev = xf;
        }
    }

    #[test]
    fn roles_swap_when_ramp_settles() {
        let mut fx = DelayFx::new(48000.0);
        let mut bufs = SharedBuffers::new();
        let mut rv = ReverbFx::new(48000.0);
        let mut leds = Leds::new();
        let mut t = 0usize;

        let base = knobs([0.0, 0.5, 0.5, 0.0, 0.0, 0.3, 0.8]);
        block(&mut fx, &mut bufs, &mut rv, &mut leds, &base, true, 48, &mut t);
        for _ in 0..50 {
            block(&mut fx, &mut bufs, &mut rv, &mut leds, &base, false, 48, &mut t);
        }
        block(&mut fx, &mut bufs, &mut rv, &mut leds, &base, true, 48, &mut t);
        assert_eq!(fx.active, 0);

        // a division change arms a fade toward the other slot; once the
        // ramp settles the roles swap and the ramp sits on a rail
        let moved = knobs([0.9, 0.5, 0.5, 0.0, 0.9, 0.3, 0.8]);
        for _ in 0..2000 {
            block(&mut fx, &mut bufs, &mut rv, &mut leds, &moved, false, 48, &mut t);
        }
        assert!(fx.xfade_current == 0.0 || fx.xfade_current == 1.0);
        assert_eq!(fx.active as f32, fx.xfade_current);
        // the new division is live in the active slot
        assert_eq!(fx.mult_l[fx.active], DELAY_TIMES[15]);
    }

    #[test]
    fn output_continuity_over_a_time_change() {
        let mut fx = DelayFx::new(48000.0);
        let mut bufs = SharedBuffers::new();
        let mut rv = ReverbFx::new(48000.0);
        let mut leds = Leds::new();
        let mut t = 0usize;

        let base = knobs([0.3, 0.5, 0.4, 0.0, 0.3, 0.2, 0.6]);
        block(&mut fx, &mut bufs, &mut rv, &mut leds, &base, true, 48, &mut t);
        for _ in 0..200 {
            block(&mut fx, &mut bufs, &mut rv, &mut leds, &base, false, 48, &mut t);
        }
        block(&mut fx, &mut bufs, &mut rv, &mut leds, &base, true, 48, &mut t);

        // change the division mid-playback and watch for discontinuities
        let moved = knobs([0.7, 0.5, 0.4, 0.0, 0.7, 0.2, 0.6]);
        let mut prev = None::<f32>;
        for _ in 0..200 {
            let out = block(&mut fx, &mut bufs, &mut rv, &mut leds, &moved, false, 48, &mut t);
            for &s in &out {
                assert!(s.is_finite());
                if let Some(p) = prev {
                    assert!((s - p).abs() < 0.5, "jump {p} -> {s}");
                }
                prev = Some(s);
            }
        }
    }
}
