#![doc = include_str!("../README.md")]

// private mods (will be partly re-exported)
mod bank;
mod context;
mod envelope;
mod error;
mod granulizer;
mod options;
mod output;
mod scheduler;
mod source;
mod ticker;

// public, flat re-exports
pub use error::Error;

pub use options::GranulizerOptions;

pub use granulizer::{Granulizer, PlaybackState};

pub use bank::{SampleBank, SampleBuffer, SampleResource};

pub use context::{AudioContext, GrainDestination, OutputContext};

pub use envelope::{grain_envelope, GrainEnvelope, GRAIN_ENVELOPE_SIZE};

pub use scheduler::{Cursor, GrainJitter, GrainParams, GrainScheduler};

pub use ticker::Ticker;

pub use output::OutputDevice;

#[cfg(feature = "cpal-output")]
pub use output::DefaultOutputDevice;

pub use source::{
    amplified::AmplifiedSource,
    empty::EmptySource,
    grain::{GrainSource, GrainVoice},
    mixed::{MixedSource, MixerHandle},
    panned::{PannedSource, SpatialGains},
    Source, SourceTime,
};

// public mods
pub mod utils;

pub mod outputs {
    //! Available audio output device implementations.

    #[cfg(feature = "cpal-output")]
    pub use super::output::cpal::CpalOutput;
    #[cfg(feature = "wav-output")]
    pub use super::output::wav::WavOutput;
}
