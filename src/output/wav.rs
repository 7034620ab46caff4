use std::{
    fs::File,
    io::BufWriter,
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
    time::{Duration, Instant},
};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::{
    error::Error,
    output::OutputDevice,
    source::{empty::EmptySource, Source, SourceTime},
    utils::buffer::{clear_buffer, scale_buffer},
};

// -------------------------------------------------------------------------------------------------

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNEL_COUNT: usize = 2;

const BUFFER_SIZE_FRAMES: usize = 1024;

// -------------------------------------------------------------------------------------------------

/// Audio output device, which writes audio into a wav file instead of playing it back.
///
/// The writer thread renders in realtime: the file's content advances with the wall clock, so
/// grains that got scheduled against the device's sample position land where they would when
/// playing back via an audio device. Silent periods of the source are written as silence.
///
/// NOTE: Unlike realtime audio devices, the wav writer device is initially paused, so it must
/// be resumed manually after everything you want to write got set up.
pub struct WavOutput {
    stream: Arc<Mutex<WavStream>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WavOutput {
    /// Open a wav output device to write at the given file using default specs.
    pub fn open<P: AsRef<Path>>(file_path: P, duration: Duration) -> Result<Self, Error> {
        Self::open_with_specs(
            file_path,
            DEFAULT_SAMPLE_RATE,
            DEFAULT_CHANNEL_COUNT,
            duration,
        )
    }

    /// Create a new wav output device with the given parameters.
    ///
    /// * `file_path`: Target file path. Should end with ".wav" extension.
    /// * `sample_rate`: The wav file's target sample rate.
    /// * `channel_count`: The wav file's channel layout.
    /// * `duration`: Max length of written content. When reached, the wav file gets
    ///   finalized and closed automatically.
    ///
    /// Wav files contents are always saved as 32bit floats.
    pub fn open_with_specs<P: AsRef<Path>>(
        file_path: P,
        sample_rate: u32,
        channel_count: usize,
        duration: Duration,
    ) -> Result<Self, Error> {
        if channel_count == 0 || sample_rate == 0 {
            return Err(Error::ConfigurationError(format!(
                "Invalid wav output specs: {channel_count} channels, {sample_rate} Hz"
            )));
        }
        let spec = WavSpec {
            channels: channel_count as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };

        let writer = WavWriter::create(file_path, spec)
            .map_err(|err| Error::OutputDeviceError(Box::new(err)))?;

        let stream = Arc::new(Mutex::new(WavStream {
            writer: Some(writer),
            channel_count,
            sample_rate,
            source: Box::new(EmptySource),
            volume: 1.0,
            buffer: vec![0.0; BUFFER_SIZE_FRAMES * channel_count],
            started: false,
            finished: false,
            playback_pos: 0,
            clock: None,
            duration,
        }));

        // Start the stream in a new thread
        let thread = thread::Builder::new()
            .name("wav_output".to_string())
            .spawn({
                let stream = Arc::clone(&stream);
                move || {
                    loop {
                        // process all due audio slices
                        {
                            let mut stream = stream.lock().unwrap_or_else(PoisonError::into_inner);
                            if let Err(err) = stream.process() {
                                log::error!("Error processing wav output: {err}");
                                stream.finished = true;
                            }
                            // Stop write loop when duration elapsed
                            if stream.finished {
                                stream.started = false;
                                stream.finalize();
                                break;
                            }
                        }
                        // sleep for a short time to avoid busy waiting
                        thread::sleep(Duration::from_millis(1));
                    }
                }
            })?;

        Ok(Self {
            stream,
            thread: Some(thread),
        })
    }

    /// Block until the configured duration got written and the file got finalized.
    pub fn wait(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Wav output thread panicked");
            }
        }
    }

    fn stream(&self) -> MutexGuard<'_, WavStream> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OutputDevice for WavOutput {
    fn channel_count(&self) -> usize {
        self.stream().channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.stream().sample_rate
    }

    fn sample_position(&self) -> u64 {
        self.stream().playback_pos
    }

    fn volume(&self) -> f32 {
        self.stream().volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.stream().volume = volume;
    }

    fn is_running(&self) -> bool {
        self.stream().started
    }

    fn pause(&mut self) {
        let mut stream = self.stream();
        stream.started = false;
        stream.clock = None;
    }

    fn resume(&mut self) {
        let mut stream = self.stream();
        if !stream.finished {
            stream.started = true;
        }
    }

    fn play(&mut self, source: Box<dyn Source>) {
        let mut stream = self.stream();
        // ensure source has our sample rate and channel layout
        assert_eq!(source.channel_count(), stream.channel_count);
        assert_eq!(source.sample_rate(), stream.sample_rate);
        stream.source = source;
    }

    fn stop(&mut self) {
        self.stream().source = Box::new(EmptySource);
    }

    fn close(&mut self) {
        self.stream().finished = true;
        self.wait();
    }
}

impl Drop for WavOutput {
    fn drop(&mut self) {
        self.close();
    }
}

// -------------------------------------------------------------------------------------------------

struct WavStream {
    writer: Option<WavWriter<BufWriter<File>>>,
    channel_count: usize,
    sample_rate: u32,
    source: Box<dyn Source>,
    volume: f32,
    buffer: Vec<f32>,
    started: bool,
    finished: bool,
    /// Written samples (not frames).
    playback_pos: u64,
    /// Wall clock start time and playback position of the current run.
    clock: Option<(Instant, u64)>,
    duration: Duration,
}

impl WavStream {
    fn process(&mut self) -> Result<(), Error> {
        // Do nothing when we didn't start yet
        if !self.started || self.finished {
            return Ok(());
        }
        let channel_count = self.channel_count as u64;
        let (clock_start, clock_start_pos) =
            *self.clock.get_or_insert((Instant::now(), self.playback_pos));

        // Write all buffers which are due by now
        let elapsed_frames =
            (clock_start.elapsed().as_secs_f64() * self.sample_rate as f64) as u64;
        while self.playback_pos < clock_start_pos + elapsed_frames * channel_count {
            let time = SourceTime {
                pos_in_frames: self.playback_pos / channel_count,
                pos_instant: Instant::now(),
            };

            // Stop running when we've exceeded the duration
            let max_frames = (self.duration.as_secs_f64() * self.sample_rate as f64) as u64;
            if time.pos_in_frames >= max_frames {
                self.finished = true;
                return Ok(());
            }

            // Write out as many samples as possible from the audio source to the buffer
            let written = self.source.write(&mut self.buffer, &time);
            clear_buffer(&mut self.buffer[written..]);

            // Apply the global volume level
            scale_buffer(&mut self.buffer, self.volume);

            // Write to wav file
            if let Some(writer) = self.writer.as_mut() {
                for sample in &self.buffer {
                    writer
                        .write_sample(*sample)
                        .map_err(|err| Error::OutputDeviceError(Box::new(err)))?;
                }
            }

            self.playback_pos += self.buffer.len() as u64;
        }
        Ok(())
    }

    fn finalize(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(err) = writer.finalize() {
                log::error!("Failed to finalize wav file: {err}");
            }
        }
    }
}

impl Drop for WavStream {
    fn drop(&mut self) {
        self.finalize();
    }
}
