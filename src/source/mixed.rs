use std::{collections::VecDeque, sync::Arc};

use crossbeam_queue::ArrayQueue;

use crate::{
    context::GrainDestination,
    source::{grain::GrainVoice, Source, SourceTime},
    utils::{
        buffer::{add_buffers, clear_buffer},
        time::SampleTime,
    },
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Mixer internal struct to keep track of currently playing sources.
struct PlayingSource {
    is_active: bool,
    source: Box<dyn Source>,
    start_time: SampleTime,
}

// -------------------------------------------------------------------------------------------------

/// Messages send from the scheduler or main thread to the mixer in the audio thread.
pub(crate) enum MixerMessage {
    AddSource {
        source: Box<dyn Source>,
        sample_time: SampleTime,
    },
    RemoveAllSources,
}

// -------------------------------------------------------------------------------------------------

/// A [`Source`] which mixes down other sources, starting each of them at its own sample time.
///
/// Sources are added via the mixer's [`MixerHandle`] and get dropped as soon as they are
/// exhausted. Sources which got added with a start time that already passed start playing
/// immediately. A mixer never is exhausted, as new sources may be added at any time, so mixers
/// can also be added to other mixers, acting as sub buses.
pub struct MixedSource {
    playing_sources: VecDeque<PlayingSource>,
    message_queue: Arc<ArrayQueue<MixerMessage>>,
    channel_count: usize,
    sample_rate: u32,
    temp_out: Vec<f32>,
}

impl MixedSource {
    /// The size of the temporary buffer used for mixing, in samples.
    /// Sources will never be requested to produce more samples than this const.
    pub const MAX_MIX_BUFFER_SAMPLES: usize = 8 * 1024;

    /// Default size of the mixer's message queue: max number of sources which can be added
    /// between two `write` calls.
    pub const DEFAULT_MESSAGE_QUEUE_SIZE: usize = 4096;

    /// Create a new mixer source with the given signal specs.
    pub fn new(channel_count: usize, sample_rate: u32) -> Self {
        Self::with_capacity(channel_count, sample_rate, Self::DEFAULT_MESSAGE_QUEUE_SIZE)
    }

    /// Create a new mixer source with the given signal specs, which accepts up to
    /// `message_queue_size` new sources between two `write` calls.
    pub fn with_capacity(channel_count: usize, sample_rate: u32, message_queue_size: usize) -> Self {
        debug_assert!(channel_count > 0, "Invalid channel count");
        debug_assert!(sample_rate > 0, "Invalid sample rate");

        // prealloc playing source list
        const PLAYING_SOURCES_CAPACITY: usize = 1024;
        let playing_sources = VecDeque::with_capacity(PLAYING_SOURCES_CAPACITY);

        // prealloc message queue
        let message_queue = Arc::new(ArrayQueue::new(message_queue_size.max(1)));

        // create temp mix buffer
        let temp_out = vec![0.0; Self::MAX_MIX_BUFFER_SAMPLES];

        Self {
            playing_sources,
            message_queue,
            channel_count,
            sample_rate,
            temp_out,
        }
    }

    /// Allows controlling the mixer from other threads.
    pub fn handle(&self) -> MixerHandle {
        MixerHandle {
            message_queue: Arc::clone(&self.message_queue),
            channel_count: self.channel_count,
            sample_rate: self.sample_rate,
        }
    }

    /// Number of sources which are currently playing or waiting to be played.
    pub fn playing_source_count(&self) -> usize {
        self.playing_sources.len()
    }

    /// Process pending mixer messages
    fn process_messages(&mut self) {
        while let Some(message) = self.message_queue.pop() {
            match message {
                MixerMessage::AddSource {
                    source,
                    sample_time,
                } => {
                    debug_assert_eq!(
                        source.channel_count(),
                        self.channel_count,
                        "adjust source's channel layout before adding it"
                    );
                    debug_assert_eq!(
                        source.sample_rate(),
                        self.sample_rate,
                        "adjust source's sample rate before adding it"
                    );
                    // sort playing_sources by start time
                    let playing_sources = &mut self.playing_sources;
                    let insert_pos = playing_sources
                        .make_contiguous()
                        .partition_point(|s| s.start_time <= sample_time);
                    playing_sources.insert(
                        insert_pos,
                        PlayingSource {
                            is_active: true,
                            source,
                            start_time: sample_time,
                        },
                    );
                }
                MixerMessage::RemoveAllSources => {
                    self.playing_sources.clear();
                }
            }
        }
    }

    /// Run all due sources and add their output to the given output buffer.
    fn process_sources(&mut self, output: &mut [f32], time: &SourceTime) {
        let output_frame_count = output.len() / self.channel_count;
        'all_sources: for playing_source in self.playing_sources.iter_mut() {
            let mut total_written = 0;

            // apply source's sample start time
            if playing_source.start_time > time.pos_in_frames {
                let frames_until_source_starts =
                    (playing_source.start_time - time.pos_in_frames) as usize;
                if frames_until_source_starts >= output_frame_count {
                    // playing_sources are sorted by sample time: all following sources will
                    // start after this source, and thus can be skipped too
                    break 'all_sources;
                }
                total_written += frames_until_source_starts * self.channel_count;
            }

            // run and mix down the source
            let source = &mut playing_source.source;
            while total_written < output.len() {
                let source_time =
                    time.with_added_frames((total_written / self.channel_count) as u64);

                // run source on temp_out until we've filled up the whole slice
                let remaining = output.len() - total_written;
                let to_write = remaining.min(self.temp_out.len());
                let written = source.write(&mut self.temp_out[..to_write], &source_time);

                // add output of the source to the final output slice
                let remaining_out = &mut output[total_written..total_written + written];
                add_buffers(remaining_out, &self.temp_out[..written]);
                total_written += written;

                // stop processing sources which are now exhausted
                if source.is_exhausted() {
                    playing_source.is_active = false;
                    break;
                }
                // silent, but not yet exhausted sources (sub mixers)
                if written == 0 {
                    break;
                }
            }
        }
    }
}

impl Source for MixedSource {
    fn write(&mut self, output: &mut [f32], time: &SourceTime) -> usize {
        // Process all pending messages
        self.process_messages();

        // Return early and avoid touching the buffer if there's nothing to do
        if self.playing_sources.is_empty() {
            return 0;
        }

        // Clear entire output first: output should be silent when there are no due sources
        clear_buffer(output);

        let output_frame_count = output.len() / self.channel_count;
        let frames_in_temp_out = self.temp_out.len() / self.channel_count;
        let mut total_frames_written = 0;
        while total_frames_written < output_frame_count {
            let frames_to_process =
                (output_frame_count - total_frames_written).min(frames_in_temp_out);
            let chunk_time = time.with_added_frames(total_frames_written as u64);
            let chunk_output = &mut output[total_frames_written * self.channel_count
                ..(total_frames_written + frames_to_process) * self.channel_count];
            self.process_sources(chunk_output, &chunk_time);
            total_frames_written += frames_to_process;
        }

        // drop all sources which finished playing in this iteration
        self.playing_sources.retain(|s| s.is_active);

        // Return output len as we've cleared the entire output before processing
        output.len()
    }

    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_exhausted(&self) -> bool {
        // mixer never is exhausted, as we may get new sources added any time
        false
    }
}

// -------------------------------------------------------------------------------------------------

/// Thread-safe handle to a [`MixedSource`], which adds new sources to the mixer without
/// blocking the audio thread.
#[derive(Clone)]
pub struct MixerHandle {
    message_queue: Arc<ArrayQueue<MixerMessage>>,
    channel_count: usize,
    sample_rate: u32,
}

impl MixerHandle {
    /// The mixer's output channel layout.
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// The mixer's output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Max number of sources which can be added between two mixer `write` calls.
    pub fn capacity(&self) -> usize {
        self.message_queue.capacity()
    }

    /// Add a source which starts playing at the given absolute sample time.
    /// NB: The source must match the mixer's sample rate and channel layout.
    pub fn add_source(&self, source: Box<dyn Source>, sample_time: SampleTime) -> Result<(), Error> {
        if source.channel_count() != self.channel_count || source.sample_rate() != self.sample_rate
        {
            return Err(Error::ConfigurationError(format!(
                "Source specs ({} channels, {} Hz) don't match the mixer specs ({} channels, {} Hz)",
                source.channel_count(),
                source.sample_rate(),
                self.channel_count,
                self.sample_rate
            )));
        }
        self.message_queue
            .push(MixerMessage::AddSource {
                source,
                sample_time,
            })
            .map_err(|_| Error::SendError("Mixer message queue is full".to_string()))
    }

    /// Stop and drop all playing and pending sources.
    pub fn remove_all_sources(&self) -> Result<(), Error> {
        self.message_queue
            .push(MixerMessage::RemoveAllSources)
            .map_err(|_| Error::SendError("Mixer message queue is full".to_string()))
    }
}

impl GrainDestination for MixerHandle {
    fn play_grain(&self, grain: GrainVoice) {
        let sample_time = grain.start_frame(self.sample_rate);
        if let Err(err) = self.add_source(grain.into_source(), sample_time) {
            log::warn!("Failed to schedule grain: {err}");
        }
    }

    fn capacity(&self) -> Option<usize> {
        Some(MixerHandle::capacity(self))
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Produces a constant value for a fixed number of frames.
    struct ConstantSource {
        value: f32,
        frames_left: usize,
        channel_count: usize,
    }

    impl Source for ConstantSource {
        fn write(&mut self, output: &mut [f32], _time: &SourceTime) -> usize {
            let frames = (output.len() / self.channel_count).min(self.frames_left);
            let written = frames * self.channel_count;
            output[..written].fill(self.value);
            self.frames_left -= frames;
            written
        }

        fn channel_count(&self) -> usize {
            self.channel_count
        }

        fn sample_rate(&self) -> u32 {
            1000
        }

        fn is_exhausted(&self) -> bool {
            self.frames_left == 0
        }
    }

    fn constant(value: f32, frames: usize) -> Box<dyn Source> {
        Box::new(ConstantSource {
            value,
            frames_left: frames,
            channel_count: 1,
        })
    }

    fn time(pos_in_frames: u64) -> SourceTime {
        SourceTime {
            pos_in_frames,
            ..SourceTime::default()
        }
    }

    #[test]
    fn sources_start_at_their_sample_time() {
        let mut mixer = MixedSource::new(1, 1000);
        let handle = mixer.handle();
        handle.add_source(constant(1.0, 4), 2).unwrap();
        handle.add_source(constant(0.5, 4), 4).unwrap();

        let mut output = vec![0.0; 8];
        assert_eq!(mixer.write(&mut output, &time(0)), 8);
        assert_eq!(output, vec![0.0, 0.0, 1.0, 1.0, 1.5, 1.5, 0.5, 0.5]);
        // exhausted sources got dropped
        assert_eq!(mixer.playing_source_count(), 0);
        assert_eq!(mixer.write(&mut output, &time(8)), 0);
    }

    #[test]
    fn late_sources_start_immediately() {
        let mut mixer = MixedSource::new(1, 1000);
        let handle = mixer.handle();
        handle.add_source(constant(1.0, 2), 10).unwrap();

        let mut output = vec![0.0; 4];
        mixer.write(&mut output, &time(100));
        assert_eq!(output, vec![1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn pending_sources_span_buffers() {
        let mut mixer = MixedSource::new(1, 1000);
        let handle = mixer.handle();
        handle.add_source(constant(1.0, 4), 6).unwrap();

        let mut output = vec![0.0; 4];
        mixer.write(&mut output, &time(0));
        assert_eq!(output, vec![0.0; 4]);
        assert_eq!(mixer.playing_source_count(), 1);
        mixer.write(&mut output, &time(4));
        assert_eq!(output, vec![0.0, 0.0, 1.0, 1.0]);
        mixer.write(&mut output, &time(8));
        assert_eq!(output, vec![1.0, 1.0, 0.0, 0.0]);
        assert_eq!(mixer.playing_source_count(), 0);
    }

    #[test]
    fn sub_mixers() {
        let mut mixer = MixedSource::new(1, 1000);
        let sub_mixer = MixedSource::new(1, 1000);
        let sub_handle = sub_mixer.handle();
        mixer.handle().add_source(Box::new(sub_mixer), 0).unwrap();

        // silent sub mixers don't stall the main mixer
        let mut output = vec![1.0; 4];
        assert_eq!(mixer.write(&mut output, &time(0)), 4);
        assert_eq!(output, vec![0.0; 4]);

        sub_handle.add_source(constant(0.25, 2), 5).unwrap();
        mixer.write(&mut output, &time(4));
        assert_eq!(output, vec![0.0, 0.25, 0.25, 0.0]);
        // sub mixers never get dropped
        assert_eq!(mixer.playing_source_count(), 1);
    }

    #[test]
    fn mismatching_specs_are_rejected() {
        let mixer = MixedSource::new(2, 1000);
        assert!(matches!(
            mixer.handle().add_source(constant(1.0, 2), 0),
            Err(Error::ConfigurationError(_))
        ));
    }

    #[test]
    fn full_pass_of_grains_fits_into_the_queue() {
        use crate::{bank::SampleBuffer, scheduler::GrainParams};

        let buffer = Arc::new(SampleBuffer::from_samples(vec![0.5; 1000], 1, 1000));
        let voice = |index: usize| {
            let params = GrainParams {
                buffer_index: 0,
                buffer: Arc::clone(&buffer),
                read_offset: 0.0,
                duration: 0.01,
                pitch_ratio: 1.0,
                gain_scale: 1.0,
                pan_offset: 0.0,
                start_time: index as f64 * 0.001,
            };
            GrainVoice::new(params, 1, 1000)
        };

        let grain_count = 5000;
        let mut mixer = MixedSource::with_capacity(1, 1000, grain_count);
        let handle = mixer.handle();
        assert_eq!(GrainDestination::capacity(&handle), Some(grain_count));
        for index in 0..grain_count {
            handle.play_grain(voice(index));
        }
        let mut output = vec![0.0; 4];
        mixer.write(&mut output, &time(0));
        assert_eq!(mixer.playing_source_count(), grain_count);

        // grains beyond the capacity are rejected
        let mixer = MixedSource::with_capacity(1, 1000, 2);
        let handle = mixer.handle();
        assert!(handle.add_source(constant(1.0, 1), 0).is_ok());
        assert!(handle.add_source(constant(1.0, 1), 0).is_ok());
        assert!(matches!(
            handle.add_source(constant(1.0, 1), 0),
            Err(Error::SendError(_))
        ));
    }

    #[test]
    fn remove_all_sources() {
        let mut mixer = MixedSource::new(1, 1000);
        let handle = mixer.handle();
        handle.add_source(constant(1.0, 100), 0).unwrap();
        handle.remove_all_sources().unwrap();
        let mut output = vec![0.0; 4];
        assert_eq!(mixer.write(&mut output, &time(0)), 0);
    }
}
