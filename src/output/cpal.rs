use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::Instant,
};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    StreamConfig,
};
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::{
    error::Error,
    output::OutputDevice,
    source::{empty::EmptySource, Source, SourceTime},
    utils::buffer::{clear_buffer, scale_buffer},
};

// -------------------------------------------------------------------------------------------------

const PREFERRED_SAMPLE_FORMAT: cpal::SampleFormat = cpal::SampleFormat::F32;
const PREFERRED_SAMPLE_RATE: cpal::SampleRate = cpal::SampleRate(44100);
const PREFERRED_CHANNELS: cpal::ChannelCount = 2;
const PREFERRED_BUFFER_SIZE: cpal::BufferSize = if cfg!(debug_assertions) {
    cpal::BufferSize::Default
} else {
    cpal::BufferSize::Fixed(2048)
};

// -------------------------------------------------------------------------------------------------

/// Realtime audio output device, playing back via the system's default cpal host and device.
///
/// The cpal stream lives in its own thread, as streams are not `Send` on all platforms.
pub struct CpalOutput {
    channel_count: usize,
    sample_rate: u32,
    volume: f32,
    is_running: bool,
    playback_pos: Arc<AtomicU64>,
    callback_send: Sender<CallbackMsg>,
    stream_send: Sender<StreamMsg>,
    stream_thread: Option<thread::JoinHandle<()>>,
}

impl CpalOutput {
    /// Open the default output device of the default host.
    pub fn open() -> Result<Self, Error> {
        let host = cpal::default_host();

        // Open the default output device.
        let device = host
            .default_output_device()
            .ok_or(cpal::DefaultStreamConfigError::DeviceNotAvailable)?;

        if let Ok(name) = device.name() {
            log::info!("Using audio device: {name}");
        }

        // Get the default device config, so we know what sample format and sample rate
        // the device supports.
        let supported = Self::preferred_output_config(&device)?;
        let config = StreamConfig {
            buffer_size: PREFERRED_BUFFER_SIZE,
            ..supported.config()
        };
        // Shared playback position counter
        let playback_pos = Arc::new(AtomicU64::new(0));

        let (callback_send, callback_recv) = bounded(16);
        let (stream_send, stream_recv) = bounded(16);
        let (opened_send, opened_recv) = bounded(1);

        let stream_thread = thread::Builder::new()
            .name("audio_output".to_string())
            .spawn({
                let playback_pos = Arc::clone(&playback_pos);
                move || {
                    let stream = match Stream::open(device, config, playback_pos, callback_recv)
                    {
                        Ok(stream) => {
                            let _ = opened_send.send(Ok(()));
                            stream
                        }
                        Err(err) => {
                            let _ = opened_send.send(Err(err));
                            return;
                        }
                    };
                    stream.run(stream_recv);
                }
            })?;

        // wait until the stream got opened in the stream thread
        opened_recv.recv().map_err(|err| {
            Error::OutputDeviceError(format!("Audio output thread died: {err}").into())
        })??;

        Ok(Self {
            channel_count: supported.channels() as usize,
            sample_rate: supported.sample_rate().0,
            volume: 1.0,
            is_running: false,
            playback_pos,
            callback_send,
            stream_send,
            stream_thread: Some(stream_thread),
        })
    }

    fn preferred_output_config(
        device: &cpal::Device,
    ) -> Result<cpal::SupportedStreamConfig, Error> {
        for s in device.supported_output_configs()? {
            let rates = s.min_sample_rate()..=s.max_sample_rate();
            if s.channels() == PREFERRED_CHANNELS
                && s.sample_format() == PREFERRED_SAMPLE_FORMAT
                && rates.contains(&PREFERRED_SAMPLE_RATE)
            {
                return Ok(s.with_sample_rate(PREFERRED_SAMPLE_RATE));
            }
        }

        Ok(device.default_output_config()?)
    }

    fn send_to_callback(&self, msg: CallbackMsg) {
        if self.callback_send.send(msg).is_err() {
            log::error!("Output stream callback is dead");
        }
    }

    fn send_to_stream(&self, msg: StreamMsg) {
        if self.stream_send.send(msg).is_err() {
            log::error!("Output stream thread is dead");
        }
    }
}

impl OutputDevice for CpalOutput {
    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn sample_position(&self) -> u64 {
        self.playback_pos.load(Ordering::Relaxed)
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        self.send_to_callback(CallbackMsg::SetVolume(volume));
    }

    fn is_running(&self) -> bool {
        self.is_running
    }

    fn pause(&mut self) {
        self.is_running = false;
        self.send_to_stream(StreamMsg::Pause);
        self.send_to_callback(CallbackMsg::Pause);
    }

    fn resume(&mut self) {
        self.is_running = true;
        self.send_to_stream(StreamMsg::Resume);
        self.send_to_callback(CallbackMsg::Resume);
    }

    fn play(&mut self, source: Box<dyn Source>) {
        // ensure source has our sample rate and channel layout
        assert_eq!(source.channel_count(), self.channel_count);
        assert_eq!(source.sample_rate(), self.sample_rate);
        // send message to activate it in the writer
        self.send_to_callback(CallbackMsg::PlaySource(source));
    }

    fn stop(&mut self) {
        self.send_to_callback(CallbackMsg::PlaySource(Box::new(EmptySource)));
    }

    fn close(&mut self) {
        if let Some(thread) = self.stream_thread.take() {
            self.is_running = false;
            self.send_to_stream(StreamMsg::Close);
            if thread.join().is_err() {
                log::error!("Audio output thread panicked");
            }
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}

// -------------------------------------------------------------------------------------------------

struct Stream {
    stream: cpal::Stream,
    _device: cpal::Device,
}

impl Stream {
    fn open(
        device: cpal::Device,
        config: cpal::StreamConfig,
        playback_pos: Arc<AtomicU64>,
        callback_recv: Receiver<CallbackMsg>,
    ) -> Result<Self, Error> {
        let mut callback = StreamCallback {
            callback_recv,
            source: Box::new(EmptySource),
            volume: 1.0,
            playback_pos,
            state: CallbackState::Paused,
        };

        log::info!("Opening output stream: {config:?}");
        let stream = device.build_output_stream(
            &config,
            move |output, _| {
                callback.write_samples(output);
            },
            |err| {
                log::error!("Audio output error: {err}");
            },
            None,
        )?;

        Ok(Self {
            _device: device,
            stream,
        })
    }

    fn run(self, stream_recv: Receiver<StreamMsg>) {
        while let Ok(msg) = stream_recv.recv() {
            match msg {
                StreamMsg::Pause => {
                    log::debug!("Pausing audio output stream");
                    if let Err(err) = self.stream.pause() {
                        log::error!("Failed to stop stream: {err}");
                    }
                }
                StreamMsg::Resume => {
                    log::debug!("Resuming audio output stream");
                    if let Err(err) = self.stream.play() {
                        log::error!("Failed to start stream: {err}");
                    }
                }
                StreamMsg::Close => {
                    log::debug!("Closing audio output stream");
                    let _ = self.stream.pause();
                    break;
                }
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

enum StreamMsg {
    Pause,
    Resume,
    Close,
}

enum CallbackMsg {
    PlaySource(Box<dyn Source>),
    SetVolume(f32),
    Pause,
    Resume,
}

enum CallbackState {
    Playing,
    Paused,
}

struct StreamCallback {
    callback_recv: Receiver<CallbackMsg>,
    source: Box<dyn Source>,
    playback_pos: Arc<AtomicU64>,
    state: CallbackState,
    volume: f32,
}

impl StreamCallback {
    fn write_samples(&mut self, output: &mut [f32]) {
        // Process any pending data messages.
        while let Ok(msg) = self.callback_recv.try_recv() {
            match msg {
                CallbackMsg::PlaySource(src) => {
                    self.source = src;
                }
                CallbackMsg::SetVolume(volume) => {
                    self.volume = volume;
                }
                CallbackMsg::Pause => {
                    self.state = CallbackState::Paused;
                }
                CallbackMsg::Resume => {
                    self.state = CallbackState::Playing;
                }
            }
        }

        let written = if matches!(self.state, CallbackState::Playing) {
            // Write out as many samples as possible from the audio source to the output buffer.
            let time = SourceTime {
                pos_in_frames: self.playback_pos.load(Ordering::Relaxed)
                    / self.source.channel_count().max(1) as u64,
                pos_instant: Instant::now(),
            };
            let written = self.source.write(output, &time);

            // Apply the global volume level.
            scale_buffer(&mut output[..written], self.volume);

            // Advance playback pos
            self.playback_pos
                .fetch_add(output.len() as u64, Ordering::Relaxed);

            written
        } else {
            0
        };

        // Mute any remaining samples.
        clear_buffer(&mut output[written..]);
    }
}

// -------------------------------------------------------------------------------------------------

impl From<cpal::DefaultStreamConfigError> for Error {
    fn from(err: cpal::DefaultStreamConfigError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::SupportedStreamConfigsError> for Error {
    fn from(err: cpal::SupportedStreamConfigsError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::BuildStreamError> for Error {
    fn from(err: cpal::BuildStreamError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}
