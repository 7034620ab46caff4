//! Loading and decoding of the sample buffers grains are read from.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Instant,
};

use crossbeam_channel::bounded;

use crate::{utils::decoder::AudioDecoder, Error};

// -------------------------------------------------------------------------------------------------

/// An immutable, decoded buffer of interleaved PCM samples.
pub struct SampleBuffer {
    name: String,
    samples: Box<[f32]>,
    channel_count: usize,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Create a new buffer from raw interleaved samples.
    pub fn from_samples(samples: Vec<f32>, channel_count: usize, sample_rate: u32) -> Self {
        Self::with_name("buffer", samples, channel_count, sample_rate)
    }

    /// Create a new named buffer from raw interleaved samples.
    pub fn with_name<S: Into<String>>(
        name: S,
        samples: Vec<f32>,
        channel_count: usize,
        sample_rate: u32,
    ) -> Self {
        assert!(channel_count > 0, "Invalid channel count");
        assert!(sample_rate > 0, "Invalid sample rate");
        debug_assert!(
            samples.len() % channel_count == 0,
            "Sample count must be a multiple of the channel count"
        );
        Self {
            name: name.into(),
            samples: samples.into_boxed_slice(),
            channel_count,
            sample_rate,
        }
    }

    /// Name of the resource the buffer got loaded from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw interleaved sample data.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channel_count
    }

    /// Buffer length in seconds.
    pub fn duration(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }
}

impl fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("name", &self.name)
            .field("channel_count", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .field("frame_count", &self.frame_count())
            .finish()
    }
}

// -------------------------------------------------------------------------------------------------

/// An encoded audio resource which can be loaded into a [`SampleBuffer`].
#[derive(Debug, Clone)]
pub enum SampleResource {
    /// An audio file on the local file system.
    File(PathBuf),
    /// Encoded audio file content which already got fetched into memory.
    Memory { name: String, bytes: Vec<u8> },
}

impl SampleResource {
    /// Display name of the resource, used in errors and logs.
    pub fn name(&self) -> String {
        match self {
            Self::File(path) => path.to_string_lossy().into_owned(),
            Self::Memory { name, .. } => name.clone(),
        }
    }

    fn decode(&self) -> Result<SampleBuffer, Error> {
        let mut decoder = match self {
            Self::File(path) => AudioDecoder::from_file(path)?,
            Self::Memory { bytes, .. } => AudioDecoder::from_buffer(bytes.clone())?,
        };
        let spec = decoder.signal_spec()?;
        let samples = decoder.decode_all()?;
        if samples.is_empty() {
            return Err(Error::AudioDecodingError(Box::new(
                symphonia::core::errors::Error::DecodeError("file contains no audio data"),
            )));
        }
        Ok(SampleBuffer::with_name(
            self.name(),
            samples,
            spec.channels.count(),
            spec.rate,
        ))
    }
}

impl From<PathBuf> for SampleResource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

impl From<&Path> for SampleResource {
    fn from(path: &Path) -> Self {
        Self::File(path.to_path_buf())
    }
}

impl From<&str> for SampleResource {
    fn from(path: &str) -> Self {
        Self::File(PathBuf::from(path))
    }
}

// -------------------------------------------------------------------------------------------------

/// Loads a fixed, ordered set of sample resources into decoded sample buffers.
///
/// All resources are decoded in parallel. The resulting buffer list always has the order of
/// the requested resources. Any failing resource fails the whole load: no partial buffer
/// lists are returned.
pub struct SampleBank;

impl SampleBank {
    /// Load and decode all given resources, blocking until all are decoded or one failed.
    pub fn load(resources: &[SampleResource]) -> Result<Vec<Arc<SampleBuffer>>, Error> {
        if resources.is_empty() {
            return Err(Error::EmptyResourceList);
        }
        let load_start = Instant::now();

        // decode all resources in worker threads
        let (result_sender, result_receiver) = bounded(resources.len());
        for (index, resource) in resources.iter().enumerate() {
            let resource = resource.clone();
            let result_sender = result_sender.clone();
            thread::Builder::new()
                .name(format!("sample_bank_decoder_{index}"))
                .spawn(move || {
                    log::info!("Loading sample resource '{}'...", resource.name());
                    let result = resource.decode().map_err(|err| Error::LoadError {
                        resource: resource.name(),
                        error: Box::new(err),
                    });
                    // NB: the receiver is gone when a load already failed
                    let _ = result_sender.send((index, result));
                })?;
        }
        drop(result_sender);

        // collect results in request order
        let mut buffers: Vec<Option<Arc<SampleBuffer>>> = vec![None; resources.len()];
        for (index, result) in result_receiver.iter() {
            match result {
                Ok(buffer) => {
                    log::debug!(
                        "Decoded sample resource '{}': {} channels, {} Hz, {:.3} seconds",
                        buffer.name(),
                        buffer.channel_count(),
                        buffer.sample_rate(),
                        buffer.duration()
                    );
                    buffers[index] = Some(Arc::new(buffer));
                }
                Err(err) => {
                    log::error!("Sample bank load failed: {err}");
                    return Err(err);
                }
            }
        }

        let buffers = buffers.into_iter().collect::<Option<Vec<_>>>().ok_or_else(|| {
            Error::SendError("sample decoder thread terminated unexpectedly".to_string())
        })?;
        log::info!(
            "Loaded {} sample resources in {} ms",
            buffers.len(),
            load_start.elapsed().as_millis()
        );
        Ok(buffers)
    }

    /// Load and decode all given resources in a background thread, then invoke the given
    /// completion handler exactly once with the ordered buffers or the first load error.
    pub fn load_async<F>(resources: Vec<SampleResource>, completion: F) -> Result<(), Error>
    where
        F: FnOnce(Result<Vec<Arc<SampleBuffer>>, Error>) + Send + 'static,
    {
        thread::Builder::new()
            .name("sample_bank_loader".to_string())
            .spawn(move || completion(Self::load(&resources)))?;
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------
