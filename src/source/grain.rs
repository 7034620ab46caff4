use std::sync::Arc;

use assume::assume;

use crate::{
    bank::SampleBuffer,
    envelope::{grain_envelope, GrainEnvelope, GRAIN_ENVELOPE_SIZE},
    scheduler::GrainParams,
    utils::time::seconds_to_sample_time,
};

use super::{amplified::AmplifiedSource, panned::PannedSource, Source, SourceTime};

// -------------------------------------------------------------------------------------------------

/// A source which plays a short, enveloped excerpt of a sample buffer.
///
/// Reads the buffer from a start offset with the given playback rate, using cubic
/// interpolation, and applies the shared half-sine grain envelope over the grain's length.
/// Reading past the buffer's end produces silence.
pub struct GrainSource {
    buffer: Arc<SampleBuffer>,
    envelope: &'static GrainEnvelope<GRAIN_ENVELOPE_SIZE>,
    /// Current read position in buffer frames.
    position: f64,
    /// Read position increment per output frame.
    increment: f64,
    /// Grain length in output frames.
    frame_count: u64,
    /// Number of already written output frames.
    frames_written: u64,
    channel_count: usize,
    sample_rate: u32,
}

impl GrainSource {
    /// Create a new grain source reading `buffer` from `read_offset` seconds on, for
    /// `duration` seconds at the given playback rate.
    pub fn new(
        buffer: Arc<SampleBuffer>,
        read_offset: f64,
        duration: f64,
        pitch_ratio: f64,
        channel_count: usize,
        sample_rate: u32,
    ) -> Self {
        debug_assert!(read_offset >= 0.0, "Invalid read offset");
        debug_assert!(duration >= 0.0, "Invalid grain duration");
        debug_assert!(pitch_ratio > 0.0, "Invalid pitch ratio");
        debug_assert!(channel_count > 0 && sample_rate > 0, "Invalid output specs");

        let position = read_offset * buffer.sample_rate() as f64;
        let increment = pitch_ratio * buffer.sample_rate() as f64 / sample_rate as f64;
        let frame_count = seconds_to_sample_time(duration, sample_rate).max(1);
        Self {
            buffer,
            envelope: grain_envelope(),
            position,
            increment,
            frame_count,
            frames_written: 0,
            channel_count,
            sample_rate,
        }
    }

    /// Grain length in output sample frames.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Buffer sample at the given frame and channel. Out of range frames are silent.
    #[inline]
    fn frame_sample(&self, frame: i64, channel: usize) -> f32 {
        let frame_count = self.buffer.frame_count() as i64;
        if frame < 0 || frame >= frame_count {
            return 0.0;
        }
        let samples = self.buffer.samples();
        let index = frame as usize * self.buffer.channel_count() + channel;
        assume!(unsafe: index < samples.len(), "Frame index is checked above");
        samples[index]
    }

    /// Sample a buffer channel at a fractional frame position using cubic interpolation.
    #[inline]
    fn sample_at_position(&self, position: f64, channel: usize) -> f32 {
        let index = position.floor() as i64;
        let fraction = (position - index as f64) as f32;

        let y0 = self.frame_sample(index - 1, channel);
        let y1 = self.frame_sample(index, channel);
        let y2 = self.frame_sample(index + 1, channel);
        let y3 = self.frame_sample(index + 2, channel);

        // Cubic interpolation (Catmull-Rom)
        let a = -0.5 * y0 + 1.5 * y1 - 1.5 * y2 + 0.5 * y3;
        let b = y0 - 2.5 * y1 + 2.0 * y2 - 0.5 * y3;
        let c = -0.5 * y0 + 0.5 * y2;
        let d = y1;

        a * fraction * fraction * fraction + b * fraction * fraction + c * fraction + d
    }

    /// Sample the buffer for the given output channel, mapping the buffer's channel layout.
    #[inline]
    fn sample_for_channel(&self, position: f64, output_channel: usize) -> f32 {
        let buffer_channels = self.buffer.channel_count();
        if self.channel_count == 1 && buffer_channels > 1 {
            // downmix
            let sum = (0..buffer_channels)
                .map(|channel| self.sample_at_position(position, channel))
                .sum::<f32>();
            sum / buffer_channels as f32
        } else {
            self.sample_at_position(position, output_channel % buffer_channels)
        }
    }
}

impl Source for GrainSource {
    fn write(&mut self, output: &mut [f32], _time: &SourceTime) -> usize {
        let mut written = 0;
        for frame in output.chunks_exact_mut(self.channel_count) {
            if self.frames_written >= self.frame_count {
                break;
            }
            let phase = self.frames_written as f64 / self.frame_count as f64;
            let envelope = self.envelope.sample(phase);
            for (channel, sample) in frame.iter_mut().enumerate() {
                *sample = self.sample_for_channel(self.position, channel) * envelope;
            }
            self.position += self.increment;
            self.frames_written += 1;
            written += self.channel_count;
        }
        written
    }

    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_exhausted(&self) -> bool {
        self.frames_written >= self.frame_count
    }
}

// -------------------------------------------------------------------------------------------------

/// A single fire-and-forget grain playback unit: the grain's buffer reader, routed through a
/// gain stage and a spatial pan stage, together with the parameters it got created from.
pub struct GrainVoice {
    params: GrainParams,
    source: PannedSource<AmplifiedSource<GrainSource>>,
}

impl GrainVoice {
    /// Build a fully configured playback unit for the given grain parameters and output specs.
    pub fn new(params: GrainParams, channel_count: usize, sample_rate: u32) -> Self {
        let grain = GrainSource::new(
            Arc::clone(&params.buffer),
            params.read_offset,
            params.duration,
            params.pitch_ratio,
            channel_count,
            sample_rate,
        );
        let amplified = AmplifiedSource::new(grain, params.gain_scale);
        let panned = PannedSource::new(amplified, params.pan_offset);
        Self {
            params,
            source: panned,
        }
    }

    /// Parameters the voice got created with.
    pub fn params(&self) -> &GrainParams {
        &self.params
    }

    /// Absolute start time of the voice in sample frames at the given sample rate.
    pub fn start_frame(&self, sample_rate: u32) -> u64 {
        seconds_to_sample_time(self.params.start_time.max(0.0), sample_rate)
    }

    /// Convert the voice into a playable source.
    pub fn into_source(self) -> Box<dyn Source> {
        Box::new(self.source)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_buffer(frames: usize, channel_count: usize, sample_rate: u32) -> Arc<SampleBuffer> {
        let samples = (0..frames)
            .flat_map(|frame| {
                (0..channel_count).map(move |channel| {
                    if channel == 0 {
                        frame as f32 / frames as f32
                    } else {
                        -(frame as f32 / frames as f32)
                    }
                })
            })
            .collect();
        Arc::new(SampleBuffer::from_samples(samples, channel_count, sample_rate))
    }

    #[test]
    fn grain_length_and_envelope() {
        let buffer = Arc::new(SampleBuffer::from_samples(vec![1.0; 1000], 1, 1000));
        let mut grain = GrainSource::new(buffer, 0.1, 0.1, 1.0, 1, 1000);
        assert_eq!(grain.frame_count(), 100);

        let mut output = vec![0.0; 256];
        let written = grain.write(&mut output, &SourceTime::default());
        assert_eq!(written, 100);
        assert!(grain.is_exhausted());
        // starts silent, peaks in the middle
        assert_eq!(output[0], 0.0);
        assert!((output[50] - 1.0).abs() < 0.01);
        assert!(output[99] < 0.05);
        assert!(output[..50].windows(2).all(|w| w[1] >= w[0]));

        // nothing more to write
        assert_eq!(grain.write(&mut output, &SourceTime::default()), 0);
    }

    #[test]
    fn read_offset_and_pitch() {
        let buffer = ramp_buffer(1000, 1, 1000);
        let mut normal = GrainSource::new(Arc::clone(&buffer), 0.5, 0.2, 1.0, 1, 1000);
        let mut octave_up = GrainSource::new(Arc::clone(&buffer), 0.5, 0.2, 2.0, 1, 1000);
        assert_eq!(normal.position, 500.0);
        assert_eq!(normal.increment, 1.0);
        assert_eq!(octave_up.increment, 2.0);

        let mut output = vec![0.0; 200];
        normal.write(&mut output, &SourceTime::default());
        assert!(normal.position > 699.0);
        octave_up.write(&mut output, &SourceTime::default());
        assert!(octave_up.position > 899.0);
    }

    #[test]
    fn resamples_buffer_rate() {
        let buffer = ramp_buffer(4410, 1, 44100);
        let grain = GrainSource::new(buffer, 0.0, 0.05, 1.0, 2, 48000);
        assert!((grain.increment - 44100.0 / 48000.0).abs() < 1e-12);
        assert_eq!(grain.frame_count(), 2400);
    }

    #[test]
    fn silent_past_buffer_end() {
        let buffer = Arc::new(SampleBuffer::from_samples(vec![1.0; 100], 1, 1000));
        let mut grain = GrainSource::new(buffer, 0.1, 0.1, 1.0, 1, 1000);
        let mut output = vec![1.0; 100];
        let written = grain.write(&mut output, &SourceTime::default());
        assert_eq!(written, 100);
        assert!(output.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn channel_mapping() {
        // mono buffer to stereo output: both channels equal
        let buffer = ramp_buffer(1000, 1, 1000);
        let mut grain = GrainSource::new(buffer, 0.2, 0.1, 1.0, 2, 1000);
        let mut output = vec![0.0; 200];
        assert_eq!(grain.write(&mut output, &SourceTime::default()), 200);
        for frame in output.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }

        // stereo buffer to mono output: downmixed, inverted channels cancel out
        let buffer = ramp_buffer(1000, 2, 1000);
        let mut grain = GrainSource::new(buffer, 0.2, 0.1, 1.0, 1, 1000);
        let mut output = vec![0.0; 100];
        assert_eq!(grain.write(&mut output, &SourceTime::default()), 100);
        assert!(output.iter().all(|s| s.abs() < 1e-6));
    }
}
