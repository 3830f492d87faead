use crate::engine::buffers::{SharedBuffers, LOOPER_MAX_SIZE};
use crate::engine::controls::Knobs;
use crate::engine::leds::Leds;

/// Micro-looper over the shared buffers. The loop length is learned from
/// the sample count between two gate triggers; two independent fractional
/// play cursors run at their own speed and wrap at their own division of
/// the loop. Freeze latches the mirrored pair as a read-only snapshot.
pub struct MLooperFx {
    pub(crate) play: bool,
    pub(crate) pos_1: f32,
    pub(crate) pos_2: f32,
    pub(crate) frozen_pos_1: f32,
    pub(crate) frozen_pos_2: f32,
    pub(crate) writer_pos: usize,
    writer_outside_pos: usize,
    pub(crate) len: usize,
    pub(crate) frozen_len: usize,
    len_count: usize,
    pub(crate) frozen: bool,
    division_1: f32,
    division_2: f32,
    play_speed_1: f32,
    play_speed_2: f32,
    volume_att_1: f32,
    volume_att_2: f32,
    drywet: f32,
}

impl MLooperFx {
    pub fn new() -> Self {
        Self {
            play: false,
            pos_1: 0.0,
            pos_2: 0.0,
            frozen_pos_1: 0.0,
            frozen_pos_2: 0.0,
            writer_pos: 0,
            writer_outside_pos: 0,
            len: 0,
            frozen_len: 0,
            len_count: 0,
            frozen: false,
            division_1: 1.0,
            division_2: 1.0,
            play_speed_1: 1.0,
            play_speed_2: 1.0,
            volume_att_1: 1.0,
            volume_att_2: 1.0,
            drywet: 0.0,
        }
    }

    fn division_for(knob: f32) -> f32 {
        if knob < 0.2 {
            1.0
        } else if knob < 0.4 {
            0.5
        } else if knob < 0.6 {
            0.25
        } else if knob < 0.8 {
            0.125
        } else {
            0.0625
        }
    }

    // faster playback trades level for brightness
    fn speed_for(knob: f32) -> (f32, f32) {
        if knob < 0.2 {
            (0.25, 1.0)
        } else if knob < 0.4 {
            (0.5, 1.0)
        } else if knob < 0.6 {
            (1.0, 1.0)
        } else if knob < 0.8 {
            (2.0, 0.7)
        } else {
            (4.0, 0.5)
        }
    }

    pub fn run(&mut self, knobs: &Knobs, gate: bool, leds: &mut Leds) {
        if gate {
            self.len = self.len_count % LOOPER_MAX_SIZE;
            self.len_count = 0;
            self.play = true;
            self.pos_1 = self.writer_pos as f32 - self.len as f32;
            self.pos_2 = self.writer_pos as f32 - self.len as f32;
            leds.set_for_x_cycles(1, 10, 1.0, 1.0, 1.0);
            leds.set_for_x_cycles(2, 10, 1.0, 1.0, 1.0);
            log::debug!("looper captured {} samples", self.len);
        }

        if knobs.index > 0.5 {
            if !self.frozen {
                self.frozen = true;
                self.freeze();
            }
        } else {
            self.frozen = false;
        }

        self.division_1 = Self::division_for(knobs.blend);
        self.division_2 = Self::division_for(knobs.regen);
        let (speed_1, att_1) = Self::speed_for(knobs.speed);
        let (speed_2, att_2) = Self::speed_for(knobs.size);
        self.play_speed_1 = speed_1;
        self.volume_att_1 = att_1;
        self.play_speed_2 = speed_2;
        self.volume_att_2 = att_2;

        self.drywet = knobs.dense * 1.01;
    }

    /// Snapshot: the frozen pair stops mirroring and inherits length and
    /// both cursors as they stand.
    fn freeze(&mut self) {
        self.frozen_len = self.len;
        self.frozen_pos_1 = self.pos_1;
        self.frozen_pos_2 = self.pos_2;
    }

    fn write_buffers(&mut self, bufs: &mut SharedBuffers, in_l: f32, in_r: f32) {
        bufs.write_live(self.writer_pos, in_l, in_r);

        // keep filling past the loop end so a longer next capture is seamless
        if self.writer_outside_pos > self.len {
            bufs.write_live(self.writer_outside_pos, in_l, in_r);
        }

        if !self.frozen {
            bufs.write_frozen(self.writer_pos, in_l, in_r);
        }
    }

    pub fn process_sample(
        &mut self,
        bufs: &mut SharedBuffers,
        leds: &mut Leds,
        in_l: f32,
        in_r: f32,
    ) -> (f32, f32) {
        let mut out_l = 0.0;
        let mut out_r = 0.0;

        self.write_buffers(bufs, in_l, in_r);
        // the write cursor wraps at the learned loop length once one exists
        self.writer_pos += 1;
        if self.len > 0 {
            self.writer_pos %= self.len;
        } else {
            self.writer_pos %= LOOPER_MAX_SIZE;
        }

        if self.play {
            if !self.frozen {
                self.pos_1 += self.play_speed_1;
                let loop_len_l = (self.len as f32 * self.division_1).floor();
                if self.pos_1 > loop_len_l {
                    leds.set_for_x_cycles(0, 10, 1.0, 0.0, 0.0);
                    self.pos_1 = (self.pos_1 - loop_len_l).clamp(0.0, self.len as f32);
                } else if self.pos_1 < 0.0 {
                    self.pos_1 = (self.pos_1 + loop_len_l).clamp(0.0, self.len as f32);
                }

                self.pos_2 += self.play_speed_2;
                let loop_len_r = (self.len as f32 * self.division_2).floor();
                if self.pos_2 > loop_len_r {
                    leds.set_for_x_cycles(3, 10, 1.0, 0.0, 0.0);
                    self.pos_2 = (self.pos_2 - loop_len_r).clamp(0.0, self.len as f32);
                } else if self.pos_2 < 0.0 {
                    self.pos_2 = (self.pos_2 + loop_len_r).clamp(0.0, self.len as f32);
                }

                out_l = bufs.read_live_l(self.pos_1) * self.volume_att_1;
                out_r = bufs.read_live_r(self.pos_2) * self.volume_att_2;
            } else {
                self.frozen_pos_1 += self.play_speed_1;
                let loop_len_l = (self.frozen_len as f32 * self.division_1).floor();
                if self.frozen_pos_1 > loop_len_l {
                    leds.set_for_x_cycles(0, 10, 0.0, 0.0, 1.0);
                    self.frozen_pos_1 =
                        (self.frozen_pos_1 - loop_len_l).clamp(0.0, self.len as f32);
                } else if self.frozen_pos_1 < 0.0 {
                    self.frozen_pos_1 =
                        (self.frozen_pos_1 + loop_len_l).clamp(0.0, self.len as f32);
                }

                self.frozen_pos_2 += self.play_speed_2;
                let loop_len_r = (self.frozen_len as f32 * self.division_2).floor();
                if self.frozen_pos_2 > loop_len_r {
                    leds.set_for_x_cycles(3, 10, 0.0, 0.0, 1.0);
                    self.frozen_pos_2 =
                        (self.frozen_pos_2 - loop_len_r).clamp(0.0, self.len as f32);
                } else if self.frozen_pos_2 < 0.0 {
                    self.frozen_pos_2 =
                        (self.frozen_pos_2 + loop_len_r).clamp(0.0, self.len as f32);
                }

                out_l = bufs.read_frozen_l(self.frozen_pos_1) * self.volume_att_1;
                out_r = bufs.read_frozen_r(self.frozen_pos_2) * self.volume_att_2;
            }
        }

        // length of the next capture keeps counting regardless of playback;
        // the outside cursor trails it so it restarts with every capture
        self.len_count += 1;
        self.writer_outside_pos = (self.len_count - 1) % LOOPER_MAX_SIZE;

        if self.len >= LOOPER_MAX_SIZE {
            self.len = LOOPER_MAX_SIZE - 1;
        }

        if self.drywet > 0.98 {
            self.drywet = 1.0;
        }
        let wet = (0.5 * (self.drywet * 2.0)).sqrt();
        let dry = (0.95 * (2.0 - self.drywet * 2.0)).sqrt();
        (wet * out_l + dry * in_l, wet * out_r + dry * in_r)
    }
}
