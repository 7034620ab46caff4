//! Audio output devices which play back the grain mixer's output.

#[cfg(feature = "cpal-output")]
pub mod cpal;
#[cfg(feature = "wav-output")]
pub mod wav;

/// The enabled default realtime audio output type.
#[cfg(feature = "cpal-output")]
pub type DefaultOutputDevice = cpal::CpalOutput;

use crate::source::Source;

// -------------------------------------------------------------------------------------------------

/// Audio output device controller.
pub trait OutputDevice: Send {
    /// Actual device's output sample buffer channel count.
    fn channel_count(&self) -> usize;
    /// Actual device's output sample rate.
    fn sample_rate(&self) -> u32;
    /// Actual device's output playhead position in **samples** (NOT frames).
    fn sample_position(&self) -> u64;

    /// Get actual output volume.
    fn volume(&self) -> f32;
    /// Set a new output volume.
    fn set_volume(&mut self, volume: f32);

    /// Returns true if the device currently is running, playing back its source.
    fn is_running(&self) -> bool;
    /// Pause playback without dropping the output source.
    fn pause(&mut self);
    /// Resume from paused playback.
    fn resume(&mut self);

    /// Play given source as main output source.
    fn play(&mut self, source: Box<dyn Source>);
    /// Drop actual source, replacing it with silence.
    fn stop(&mut self);

    /// Release audio device.
    fn close(&mut self);
}
