use std::time::Instant;

pub mod amplified;
pub mod empty;
pub mod grain;
pub mod mixed;
pub mod panned;

// -------------------------------------------------------------------------------------------------

/// Timing info for [`Source`] impls.
#[derive(Clone, Copy, Debug)]
pub struct SourceTime {
    /// Source's absolute playback position in sample frames.
    pub pos_in_frames: u64,
    /// Time instant when the output buffer got requested.
    pub pos_instant: Instant,
}

impl SourceTime {
    /// Copy of this time, moved forward by the given number of frames.
    pub fn with_added_frames(&self, frames: u64) -> Self {
        Self {
            pos_in_frames: self.pos_in_frames + frames,
            pos_instant: self.pos_instant,
        }
    }
}

impl Default for SourceTime {
    fn default() -> Self {
        Self {
            pos_in_frames: 0,
            pos_instant: Instant::now(),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Types that can produce interleaved audio samples in `f32` format. `Send`able across
/// threads, so they can be created in the scheduler thread and played in the audio thread.
pub trait Source: Send + Sync + 'static {
    /// Write at most of `output.len()` samples into the interleaved `output`. Returns the
    /// number of written samples. Should take care to always output a full frame, and should
    /// _never_ block.
    fn write(&mut self, output: &mut [f32], time: &SourceTime) -> usize;

    /// The source's output channel layout.
    fn channel_count(&self) -> usize;

    /// The source's output sample rate.
    fn sample_rate(&self) -> u32;

    /// returns true if the source will produce no more samples: it has finished playing.
    fn is_exhausted(&self) -> bool;
}

impl Source for Box<dyn Source> {
    fn write(&mut self, output: &mut [f32], time: &SourceTime) -> usize {
        (**self).write(output, time)
    }

    fn channel_count(&self) -> usize {
        (**self).channel_count()
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn is_exhausted(&self) -> bool {
        (**self).is_exhausted()
    }
}
