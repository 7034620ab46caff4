//! Seams between the grain scheduler and the audio system it schedules grains in.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{
    output::OutputDevice,
    source::{
        grain::GrainVoice,
        mixed::{MixedSource, MixerHandle},
    },
    utils::time::sample_time_to_seconds,
    Error,
};

// -------------------------------------------------------------------------------------------------

/// A sink for fully configured grain voices, e.g. a mixer bus.
///
/// Destinations take ownership of the voice and play it back at the voice's start time. They
/// must never block, as they get invoked from the scheduler's timer thread.
pub trait GrainDestination: Send + Sync {
    fn play_grain(&self, grain: GrainVoice);

    /// Max number of grains the destination accepts within a single scheduling pass, or
    /// `None` when it's unbounded.
    fn capacity(&self) -> Option<usize> {
        None
    }
}

// -------------------------------------------------------------------------------------------------

/// The audio environment grains get scheduled in: provides the output timeline's clock, the
/// output specs and the default destination for new grains.
pub trait AudioContext: Send + Sync + 'static {
    /// Output sample rate of grain voices.
    fn sample_rate(&self) -> u32;
    /// Output channel layout of grain voices.
    fn channel_count(&self) -> usize;
    /// Current playback position of the output timeline in seconds.
    fn current_time(&self) -> f64;
    /// Default destination for new grain voices.
    fn destination(&self) -> Arc<dyn GrainDestination>;
}

// -------------------------------------------------------------------------------------------------

/// An [`AudioContext`] which plays back grains via an [`OutputDevice`].
///
/// Owns the device and a main mixer which got set as the device's source. Grains which are sent
/// to the context's destination or to one of its buses get mixed into the device's output.
pub struct OutputContext {
    device: Mutex<Box<dyn OutputDevice>>,
    mixer: Arc<MixerHandle>,
    channel_count: usize,
    sample_rate: u32,
}

impl OutputContext {
    /// Create a new context which plays into the given output device and start the device.
    pub fn new<D: OutputDevice + 'static>(device: D) -> Result<Self, Error> {
        Self::with_mixer_capacity(device, MixedSource::DEFAULT_MESSAGE_QUEUE_SIZE)
    }

    /// Create a new context with mixers which accept up to `capacity` grains between two
    /// rendered audio blocks.
    pub fn with_mixer_capacity<D: OutputDevice + 'static>(
        device: D,
        capacity: usize,
    ) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::ConfigurationError(
                "Mixer capacity must not be zero".to_string(),
            ));
        }
        let mut device: Box<dyn OutputDevice> = Box::new(device);
        let channel_count = device.channel_count();
        let sample_rate = device.sample_rate();
        if channel_count == 0 || sample_rate == 0 {
            return Err(Error::ConfigurationError(format!(
                "Invalid output device specs: {channel_count} channels, {sample_rate} Hz"
            )));
        }
        log::info!("Creating output context with {channel_count} channels, {sample_rate} Hz");

        let mixer = MixedSource::with_capacity(channel_count, sample_rate, capacity);
        let mixer_handle = Arc::new(mixer.handle());
        device.play(Box::new(mixer));
        device.resume();

        Ok(Self {
            device: Mutex::new(device),
            mixer: mixer_handle,
            channel_count,
            sample_rate,
        })
    }

    /// Create a new sub mixer bus which feeds into the context's main mixer.
    pub fn new_bus(&self) -> Result<Arc<MixerHandle>, Error> {
        let bus =
            MixedSource::with_capacity(self.channel_count, self.sample_rate, self.mixer.capacity());
        let bus_handle = Arc::new(bus.handle());
        self.mixer.add_source(Box::new(bus), 0)?;
        Ok(bus_handle)
    }

    /// Handle to the context's main mixer.
    pub fn mixer(&self) -> Arc<MixerHandle> {
        Arc::clone(&self.mixer)
    }

    /// Actual output volume.
    pub fn volume(&self) -> f32 {
        self.device().volume()
    }

    /// Set a new output volume.
    pub fn set_volume(&self, volume: f32) {
        self.device().set_volume(volume);
    }

    /// Pause the output device. Grains get queued until the device resumes: grains which
    /// exceed the mixer capacity while suspended get dropped.
    pub fn suspend(&self) {
        self.device().pause();
    }

    /// Resume a suspended output device.
    pub fn resume(&self) {
        self.device().resume();
    }

    /// Stop all playing grains and release the output device.
    pub fn close(&self) {
        let mut device = self.device();
        device.stop();
        device.close();
    }

    fn device(&self) -> MutexGuard<'_, Box<dyn OutputDevice>> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AudioContext for OutputContext {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn current_time(&self) -> f64 {
        let sample_position = self.device().sample_position();
        sample_time_to_seconds(sample_position / self.channel_count as u64, self.sample_rate)
    }

    fn destination(&self) -> Arc<dyn GrainDestination> {
        self.mixer.clone()
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;
    use crate::{
        bank::SampleBuffer,
        scheduler::GrainParams,
        source::{Source, SourceTime},
    };

    /// A fake device which renders its source on request only.
    #[derive(Clone, Default)]
    struct FakeDevice {
        source: Arc<Mutex<Option<Box<dyn Source>>>>,
        position: Arc<AtomicU64>,
    }

    impl FakeDevice {
        fn render(&self, frames: usize) -> Vec<f32> {
            let mut output = vec![0.0; frames * 2];
            let pos = self.position.fetch_add(output.len() as u64, Ordering::Relaxed);
            let time = SourceTime {
                pos_in_frames: pos / 2,
                ..SourceTime::default()
            };
            if let Some(source) = self.source.lock().unwrap().as_mut() {
                let written = source.write(&mut output, &time);
                output[written..].fill(0.0);
            }
            output
        }
    }

    impl OutputDevice for FakeDevice {
        fn channel_count(&self) -> usize {
            2
        }
        fn sample_rate(&self) -> u32 {
            1000
        }
        fn sample_position(&self) -> u64 {
            self.position.load(Ordering::Relaxed)
        }
        fn volume(&self) -> f32 {
            1.0
        }
        fn set_volume(&mut self, _volume: f32) {}
        fn is_running(&self) -> bool {
            true
        }
        fn pause(&mut self) {}
        fn resume(&mut self) {}
        fn play(&mut self, source: Box<dyn Source>) {
            *self.source.lock().unwrap() = Some(source);
        }
        fn stop(&mut self) {
            *self.source.lock().unwrap() = None;
        }
        fn close(&mut self) {}
    }

    fn voice(start_time: f64) -> GrainVoice {
        let buffer = Arc::new(SampleBuffer::from_samples(vec![1.0; 1000], 1, 1000));
        let params = GrainParams {
            buffer_index: 0,
            buffer,
            read_offset: 0.0,
            duration: 0.01,
            pitch_ratio: 1.0,
            gain_scale: 1.0,
            pan_offset: 0.0,
            start_time,
        };
        GrainVoice::new(params, 2, 1000)
    }

    #[test]
    fn clock_follows_device_position() {
        let device = FakeDevice::default();
        let context = OutputContext::new(device.clone()).unwrap();
        assert_eq!(context.current_time(), 0.0);
        device.render(500);
        assert_eq!(context.current_time(), 0.5);
    }

    #[test]
    fn grains_play_at_their_start_time() {
        let device = FakeDevice::default();
        let context = OutputContext::new(device.clone()).unwrap();
        context.destination().play_grain(voice(0.05));

        let output = device.render(100);
        assert!(output[..100].iter().all(|s| *s == 0.0));
        assert!(output[100..120].iter().any(|s| *s != 0.0));
        assert!(output[120..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn buses_feed_the_main_mixer() {
        let device = FakeDevice::default();
        let context = OutputContext::new(device.clone()).unwrap();
        let bus = context.new_bus().unwrap();
        bus.play_grain(voice(0.0));
        let output = device.render(20);
        assert!(output.iter().any(|s| *s != 0.0));
    }

    #[test]
    fn mixer_capacity() {
        let context = OutputContext::new(FakeDevice::default()).unwrap();
        assert_eq!(
            context.destination().capacity(),
            Some(MixedSource::DEFAULT_MESSAGE_QUEUE_SIZE)
        );

        let context = OutputContext::with_mixer_capacity(FakeDevice::default(), 5000).unwrap();
        assert_eq!(context.destination().capacity(), Some(5000));
        assert_eq!(context.new_bus().unwrap().capacity(), 5000);

        assert!(matches!(
            OutputContext::with_mixer_capacity(FakeDevice::default(), 0),
            Err(Error::ConfigurationError(_))
        ));
    }
}
