use crate::engine::buffers::{SharedBuffers, SharedDelays};
use crate::engine::controls::{ControlFrame, Knobs, Mode};
use crate::engine::fx::delay::DelayFx;
use crate::engine::fx::filter::FilterFx;
use crate::engine::fx::lofi::LofiFx;
use crate::engine::fx::mlooper::MLooperFx;
use crate::engine::fx::resonator::ResonatorFx;
use crate::engine::fx::reverb::ReverbFx;
use crate::engine::fx::spectra::SpectraFx;
use crate::engine::fx::spectrings::SpectringsFx;
use crate::engine::leds::Leds;
use crate::engine::oscbank::{AnalysisParams, OscBank};

/// The whole engine: one owned state struct per effect, the shared buffer
/// storage, the LED frame and the spectral machinery, dispatched by the
/// mode derived from the two switches. Everything is allocated here, once;
/// the audio path allocates nothing.
pub struct Graph {
  sample_rate: f32,
  mode: Mode,
  previous_mode: Mode,

  buffers: SharedBuffers,
  delays: SharedDelays,
  leds: Leds,
  oscbank: OscBank,
  analysis: AnalysisParams,

  reverb: ReverbFx,
  resonator: ResonatorFx,
  filter: FilterFx,
  lofi: LofiFx,
  mlooper: MLooperFx,
  delay: DelayFx,
  spectra: SpectraFx,
  spectrings: SpectringsFx,
}

impl Graph {
  pub fn new(sample_rate: f32) -> Self {
    Self {
      sample_rate,
      mode: Mode::Reverb,
      previous_mode: Mode::Reverb,
      buffers: SharedBuffers::new(),
      delays: SharedDelays::new(),
      leds: Leds::new(),
      oscbank: OscBank::new(sample_rate),
      analysis: AnalysisParams::new(),
      reverb: ReverbFx::new(sample_rate),
      resonator: ResonatorFx::new(sample_rate),
      filter: FilterFx::new(sample_rate),
      lofi: LofiFx::new(sample_rate),
      mlooper: MLooperFx::new(),
      delay: DelayFx::new(sample_rate),
      spectra: SpectraFx::new(),
      spectrings: SpectringsFx::new(sample_rate),
    }
  }

  pub fn mode(&self) -> Mode {
    self.mode
  }

  /// Current 4x RGB LED frame for the host to display.
  pub fn led_frame(&self) -> &[[f32; 3]; 4] {
    self.leds.frame()
  }

  fn run_controls(&mut self, frame: &ControlFrame) {
    // re-asserted each pass by whichever mode owns them
    self.reverb.drywet = 0.0;
    self.resonator.feedback = 0.0;

    self.mode = Mode::from_switches(frame.switch1, frame.switch2);
    if self.mode != self.previous_mode {
      log::debug!("mode change: {:?} -> {:?}", self.previous_mode, self.mode);
      self.previous_mode = self.mode;
      // display state resets; audio state deliberately persists
      self.leds.reset();
    }

    let knobs = Knobs::from_frame(frame);
    let gate = frame.gate_trig;
    let tap = frame.tap_trig;

    match self.mode {
      Mode::Reverb => self.reverb.run(&knobs, self.sample_rate),
      Mode::Resonator => self.resonator.run(&knobs, tap, &mut self.reverb),
      Mode::Filter => self.filter.run(&knobs, &mut self.leds),
      Mode::LoFi => self.lofi.run(&knobs, &mut self.reverb),
      Mode::MicroLooper => self.mlooper.run(&knobs, gate, &mut self.leds),
      Mode::Delay => self.delay.run(
        &knobs,
        gate,
        &mut self.reverb,
        &mut self.leds,
        self.sample_rate,
      ),
      Mode::Spectra => self.spectra.run(
        &knobs,
        gate,
        tap,
        &mut self.oscbank,
        &mut self.analysis,
        &mut self.reverb,
        &mut self.leds,
        self.sample_rate,
      ),
      Mode::Spectrings => self.spectrings.run(
        &knobs,
        gate,
        tap,
        &mut self.oscbank,
        &mut self.analysis,
        &mut self.reverb,
        &mut self.leds,
        self.sample_rate,
      ),
      Mode::None => {}
    }
  }

  /// Process one audio block: control pass first, then the per-sample
  /// path of the active mode, then the filter's block pass if selected.
  pub fn process_block(
    &mut self,
    frame: &ControlFrame,
    in_l: &[f32],
    in_r: &[f32],
    out_l: &mut [f32],
    out_r: &mut [f32],
  ) {
    let size = in_l.len().min(in_r.len()).min(out_l.len()).min(out_r.len());

    self.run_controls(frame);
    self.leds.update();

    // spectral modes accumulate the analysis window at block rate; the
    // heavy analysis itself runs only when a gate edge requested it
    if self.mode == Mode::Spectra || self.mode == Mode::Spectrings {
      self.oscbank.fill_input_buffer(&in_l[..size], &in_r[..size]);
      if self.analysis.do_analysis {
        self.analysis.do_analysis = false;
        self.oscbank.calculate_spectral_analysis(&self.analysis);
      }
      if self.mode == Mode::Spectrings {
        self.spectrings.pre_process(&self.oscbank);
      }
    }

    for i in 0..size {
      let in1 = in_l[i];
      let in2 = in_r[i];

      let (out1, out2) = match self.mode {
        Mode::Reverb => self.reverb.process_sample(
          Mode::Reverb,
          &mut self.buffers,
          &mut self.leds,
          in1,
          in2,
        ),
        Mode::Resonator => self.resonator.process_sample(
          &mut self.reverb,
          &mut self.delays,
          &mut self.buffers,
          &mut self.leds,
          in1,
          in2,
        ),
        Mode::LoFi => {
          // reverb first, degrade the whole tail
          let (l, r) = self.reverb.process_sample(
            Mode::LoFi,
            &mut self.buffers,
            &mut self.leds,
            in1,
            in2,
          );
          self
            .lofi
            .process_sample(&mut self.delays, &mut self.reverb, &mut self.leds, l, r)
        }
        Mode::MicroLooper => {
          self
            .mlooper
            .process_sample(&mut self.buffers, &mut self.leds, in1, in2)
        }
        Mode::Delay => self.delay.process_sample(
          &mut self.buffers,
          &mut self.reverb,
          &mut self.leds,
          in1,
          in2,
        ),
        Mode::Spectra => {
          let (l, r) = self.spectra.process_sample(&mut self.oscbank, in1, in2);
          self.reverb.process_sample(
            Mode::Spectra,
            &mut self.buffers,
            &mut self.leds,
            l,
            r,
          )
        }
        Mode::Spectrings => {
          let (l, r) = self.spectrings.process_sample(&mut self.oscbank, in1, in2);
          self.reverb.process_sample(
            Mode::Spectrings,
            &mut self.buffers,
            &mut self.leds,
            l,
            r,
          )
        }
        // the filter runs as a block below; all else is silence
        Mode::Filter | Mode::None => (0.0, 0.0),
      };

      out_l[i] = out1;
      out_r[i] = out2;
    }

    if self.mode == Mode::Filter {
      self.filter.process_block(
        &mut out_l[..size],
        &mut out_r[..size],
        &in_l[..size],
        &in_r[..size],
      );
    }
  }
}
