pub mod delay;
pub mod filter;
pub mod lofi;
pub mod mlooper;
pub mod resonator;
pub mod reverb;
pub mod spectra;
pub mod spectrings;
pub mod string_voice;
