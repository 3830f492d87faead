pub const NUM_LEDS: usize = 4;

/// Base color plus per-LED flash color lasting a number of update cycles.
/// Purely cosmetic; the dispatcher resets this wholesale on mode change and
/// the host reads the composed frame whenever it likes.
pub struct Leds {
    times: [i32; NUM_LEDS],
    flash_color: [[f32; 3]; NUM_LEDS],
    base_color: [[f32; 3]; NUM_LEDS],
    frame: [[f32; 3]; NUM_LEDS],
}

impl Leds {
    pub fn new() -> Self {
        let mut leds = Self {
            times: [0; NUM_LEDS],
            flash_color: [[0.0; 3]; NUM_LEDS],
            base_color: [[0.0; 3]; NUM_LEDS],
            frame: [[0.0; 3]; NUM_LEDS],
        };
        leds.reset();
        leds
    }

    pub fn reset(&mut self) {
        self.switch_all_off();
        for i in 0..NUM_LEDS {
            self.set_for_x_cycles(i, -1, 0.0, 0.0, 0.0);
        }
    }

    pub fn set_for_x_cycles(&mut self, idx: usize, times: i32, r: f32, g: f32, b: f32) {
        self.flash_color[idx] = [r, g, b];
        self.times[idx] = times;
    }

    pub fn switch_all_off(&mut self) {
        self.set_all(0.0, 0.0, 0.0);
    }

    pub fn set_all(&mut self, r: f32, g: f32, b: f32) {
        for i in 0..NUM_LEDS {
            self.set_base_color(i, r, g, b);
        }
    }

    pub fn set_base_color(&mut self, idx: usize, r: f32, g: f32, b: f32) {
        self.base_color[idx] = [r, g, b];
    }

    /// Compose one display frame, counting down active flashes.
    pub fn update(&mut self) {
        for i in 0..NUM_LEDS {
            self.frame[i] = self.base_color[i];
            if self.times[i] > 0 {
                self.times[i] -= 1;
                self.frame[i] = self.flash_color[i];
            }
        }
    }

    pub fn frame(&self) -> &[[f32; 3]; NUM_LEDS] {
        &self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_overrides_base_then_expires() {
        let mut leds = Leds::new();
        leds.set_base_color(0, 0.1, 0.2, 0.3);
        leds.set_for_x_cycles(0, 2, 1.0, 0.0, 0.0);
        leds.update();
        assert_eq!(leds.frame()[0], [1.0, 0.0, 0.0]);
        leds.update();
        assert_eq!(leds.frame()[0], [1.0, 0.0, 0.0]);
        leds.update();
        assert_eq!(leds.frame()[0], [0.1, 0.2, 0.3]);
    }

    #[test]
    fn reset_clears_flashes_and_base() {
        let mut leds = Leds::new();
        leds.set_base_color(2, 1.0, 1.0, 1.0);
        leds.set_for_x_cycles(2, 10, 0.5, 0.5, 0.5);
        leds.reset();
        leds.update();
        assert_eq!(leds.frame()[2], [0.0, 0.0, 0.0]);
    }
}
