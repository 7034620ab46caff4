//! Grain scheduling: buffer rotation, read cursors, grain parameter jitter and timing.

use std::sync::Arc;

use rand::Rng;

use crate::{bank::SampleBuffer, options::GranulizerOptions};

// -------------------------------------------------------------------------------------------------

/// Next read position of a single sample buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cursor {
    /// Read position in seconds, within `[0, buffer.duration()]`.
    Position(f64),
    /// The cursor ran past the buffer's end without wrapping around: the buffer no longer
    /// emits any grains.
    Exhausted,
}

impl Cursor {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }

    pub fn position(&self) -> Option<f64> {
        match self {
            Self::Position(position) => Some(*position),
            Self::Exhausted => None,
        }
    }

    /// Move the cursor by `spacing` seconds. Wraps around when `forever` is set, else
    /// exhausts when moving past `duration`.
    fn advance(&mut self, spacing: f64, duration: f64, forever: bool) {
        if let Self::Position(position) = *self {
            let mut next = position + spacing;
            if next > duration {
                if forever && duration > 0.0 {
                    while next > duration {
                        next -= duration;
                    }
                } else {
                    *self = Self::Exhausted;
                    return;
                }
            }
            *self = Self::Position(next);
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Fully resolved parameters of a single grain. Constructed by a scheduling pass and consumed
/// immediately to emit a playback unit.
#[derive(Debug, Clone)]
pub struct GrainParams {
    /// Index of the source buffer in the loaded buffer list.
    pub buffer_index: usize,
    /// The source buffer the grain reads from.
    pub buffer: Arc<SampleBuffer>,
    /// Read start position in the source buffer in seconds.
    pub read_offset: f64,
    /// Grain length in seconds: attack + hold.
    pub duration: f64,
    /// Playback rate of the grain, centered around 1.0.
    pub pitch_ratio: f64,
    /// Grain gain factor in range `(1 - gain_coefficient, 1.0]`.
    pub gain_scale: f32,
    /// Spatial x offset in range `[-10 * pan_coefficient, 10 * pan_coefficient]`.
    pub pan_offset: f32,
    /// Absolute start time on the output timeline in seconds.
    pub start_time: f64,
}

// -------------------------------------------------------------------------------------------------

/// Per grain random variation of pitch, gain and spatial position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainJitter {
    pub pitch_coefficient: f32,
    pub gain_coefficient: f32,
    pub pan_coefficient: f32,
}

impl GrainJitter {
    pub fn from_options(options: &GranulizerOptions) -> Self {
        Self {
            pitch_coefficient: options.pitch_coefficient,
            gain_coefficient: options.gain_coefficient,
            pan_coefficient: options.pan_coefficient,
        }
    }

    /// Uniform jitter centered at 1.0 with a range width of `pitch_coefficient`.
    pub fn pitch_ratio<R: Rng>(&self, rng: &mut R) -> f64 {
        let coefficient = self.pitch_coefficient as f64;
        1.0 + coefficient / 2.0 - rng.random::<f64>() * coefficient
    }

    /// Uniform attenuation: never boosts.
    pub fn gain_scale<R: Rng>(&self, rng: &mut R) -> f32 {
        1.0 - rng.random::<f32>() * self.gain_coefficient
    }

    /// Uniform offset in `[-10 * pan_coefficient, 10 * pan_coefficient]`.
    pub fn pan_offset<R: Rng>(&self, rng: &mut R) -> f32 {
        10.0 * self.pan_coefficient - rng.random::<f32>() * 20.0 * self.pan_coefficient
    }
}

// -------------------------------------------------------------------------------------------------

/// Owns the mutable grain scheduling state: one read cursor per buffer, the round-robin
/// buffer rotation index and the timeline position of the next grain.
///
/// Scheduling passes are plain function calls which get all their inputs passed in, so the
/// scheduler can be driven by a timer thread as well as synchronously in tests or offline
/// renderers.
#[derive(Debug, Clone)]
pub struct GrainScheduler {
    cursors: Vec<Cursor>,
    rotation_index: usize,
    schedule_clock: f64,
}

impl GrainScheduler {
    /// Create a new scheduler for `buffer_count` buffers with all cursors at 0.
    pub fn new(buffer_count: usize) -> Self {
        debug_assert!(buffer_count > 0, "Need at least one buffer to schedule");
        Self {
            cursors: vec![Cursor::Position(0.0); buffer_count],
            rotation_index: 0,
            schedule_clock: 0.0,
        }
    }

    /// Read cursors of all buffers, in buffer order.
    pub fn cursors(&self) -> &[Cursor] {
        &self.cursors
    }

    /// Index of the buffer which is considered next.
    pub fn rotation_index(&self) -> usize {
        self.rotation_index
    }

    /// Start time of the next grain attempt on the output timeline in seconds.
    pub fn schedule_clock(&self) -> f64 {
        self.schedule_clock
    }

    /// True when all buffers are exhausted, so passes no longer emit anything.
    pub fn is_exhausted(&self) -> bool {
        self.cursors.iter().all(Cursor::is_exhausted)
    }

    /// Restart the timeline at the given output time and the rotation at the first buffer.
    /// Cursors are kept, so exhausted buffers stay exhausted.
    pub fn reset(&mut self, current_time: f64) {
        self.rotation_index = 0;
        self.schedule_clock = current_time;
    }

    /// Run a single scheduling pass: makes `options.grains_per_pass()` grain attempts,
    /// passing all resolved grains to `emit`. Returns the number of emitted grains.
    ///
    /// Exhausted buffers are skipped, but still advance rotation and timeline, so the spacing
    /// of all other buffers' grains stays regular.
    pub fn run_pass<R, F>(
        &mut self,
        buffers: &[Arc<SampleBuffer>],
        options: &GranulizerOptions,
        rng: &mut R,
        mut emit: F,
    ) -> usize
    where
        R: Rng,
        F: FnMut(GrainParams),
    {
        debug_assert_eq!(
            buffers.len(),
            self.cursors.len(),
            "Buffer and cursor count mismatch"
        );
        let jitter = GrainJitter::from_options(options);
        let duration = options.grain_duration();
        let grain_spacing = options.grain_spacing_secs();
        let wave_spacing = options.wave_spacing_secs();

        let mut emitted = 0;
        for _ in 0..options.grains_per_pass() {
            let buffer_index = self.rotation_index;
            let buffer = &buffers[buffer_index];
            let cursor = &mut self.cursors[buffer_index];

            if let Cursor::Position(read_offset) = *cursor {
                emit(GrainParams {
                    buffer_index,
                    buffer: Arc::clone(buffer),
                    read_offset,
                    duration,
                    pitch_ratio: jitter.pitch_ratio(rng),
                    gain_scale: jitter.gain_scale(rng),
                    pan_offset: jitter.pan_offset(rng),
                    start_time: self.schedule_clock,
                });
                emitted += 1;

                cursor.advance(wave_spacing, buffer.duration(), options.forever);
                if cursor.is_exhausted() {
                    log::debug!("Sample buffer #{buffer_index} got exhausted");
                }
            }

            self.rotation_index = (self.rotation_index + 1) % self.cursors.len();
            self.schedule_clock += grain_spacing;
        }
        emitted
    }
}

// -------------------------------------------------------------------------------------------------
