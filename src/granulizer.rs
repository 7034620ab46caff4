//! The granular synthesis engine: drives the grain scheduler in fixed intervals and routes
//! emitted grains to a destination.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::{rngs::SmallRng, SeedableRng};

use crate::{
    bank::{SampleBank, SampleBuffer, SampleResource},
    context::{AudioContext, GrainDestination},
    options::GranulizerOptions,
    scheduler::{Cursor, GrainScheduler},
    source::grain::GrainVoice,
    ticker::Ticker,
    utils::unique_usize_id,
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Lifecycle state of a [`Granulizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum PlaybackState {
    /// Created, but never started.
    Unstarted,
    /// Scheduling passes are running periodically.
    Running,
    /// Stopped after running. Can be started again.
    Stopped,
}

// -------------------------------------------------------------------------------------------------

/// Mutable engine state, shared with the ticker thread.
struct GranulizerState {
    playback_state: PlaybackState,
    scheduler: GrainScheduler,
    destination: Option<Arc<dyn GrainDestination>>,
    rng: SmallRng,
    pass_count: usize,
}

/// Immutable engine setup, shared with the ticker thread.
struct GranulizerSetup {
    id: usize,
    context: Arc<dyn AudioContext>,
    buffers: Vec<Arc<SampleBuffer>>,
    options: GranulizerOptions,
}

impl GranulizerSetup {
    /// Run a single scheduling pass and emit all resolved grains to the current destination.
    fn run_pass(&self, state: &mut GranulizerState) {
        let current_time = self.context.current_time();
        let channel_count = self.context.channel_count();
        let sample_rate = self.context.sample_rate();

        let destination = state.destination.as_ref();
        let mut late_grains = 0;
        let mut earliest_start_time = current_time;
        let emitted =
            state
                .scheduler
                .run_pass(&self.buffers, &self.options, &mut state.rng, |params| {
                    if params.start_time < current_time {
                        late_grains += 1;
                        earliest_start_time = earliest_start_time.min(params.start_time);
                    }
                    let voice = GrainVoice::new(params, channel_count, sample_rate);
                    if let Some(destination) = destination {
                        destination.play_grain(voice);
                    }
                });
        state.pass_count += 1;

        if late_grains > 0 {
            log::debug!(
                "Granulizer #{}: {late_grains} grains are late by up to {:.3} seconds",
                self.id,
                current_time - earliest_start_time
            );
        }
        log::trace!(
            "Granulizer #{}: pass #{} emitted {emitted} grains",
            self.id,
            state.pass_count
        );
    }
}

// -------------------------------------------------------------------------------------------------

/// A granular synthesis engine, which continuously emits short, enveloped and jittered grains
/// from a fixed set of sample buffers into an [`AudioContext`].
///
/// Buffers are visited in round-robin order, each with its own read cursor which advances by
/// the configured wave spacing whenever a grain got emitted from the buffer. Grains are
/// scheduled ahead of time in passes which cover one tick interval each, so the grain timeline
/// stays regular even when the tick timer itself drifts.
///
/// Example:
/// ```no_run
/// use std::{sync::Arc, time::Duration};
/// use granulizer::{
///     Error, Granulizer, GranulizerOptions, OutputContext, SampleBank, SampleResource,
/// };
///
/// # #[cfg(feature = "wav-output")]
/// # fn main() -> Result<(), Error> {
/// use granulizer::outputs::WavOutput;
///
/// let context = Arc::new(OutputContext::new(WavOutput::open(
///     "grains.wav",
///     Duration::from_secs(10),
/// )?)?);
/// let buffers = SampleBank::load(&[
///     SampleResource::from("samples/voice.wav"),
///     SampleResource::from("samples/drums.wav"),
/// ])?;
/// let options = GranulizerOptions::default()
///     .attack(Duration::from_millis(30))
///     .hold(Duration::from_millis(5))
///     .grain_spacing(Duration::from_millis(12))
///     .wave_spacing(Duration::from_millis(24))
///     .forever(true);
/// let granulizer = Granulizer::new(context, buffers, options)?;
/// granulizer.start()?;
/// std::thread::sleep(Duration::from_secs(10));
/// granulizer.stop();
/// # Ok(())
/// # }
/// # #[cfg(not(feature = "wav-output"))]
/// # fn main() {}
/// ```
pub struct Granulizer {
    setup: Arc<GranulizerSetup>,
    state: Arc<Mutex<GranulizerState>>,
    ticker: Mutex<Option<Ticker>>,
}

impl Granulizer {
    /// Create a new engine for the given, already loaded sample buffers. Grains get routed to
    /// the context's default destination until connected elsewhere.
    pub fn new(
        context: Arc<dyn AudioContext>,
        buffers: Vec<Arc<SampleBuffer>>,
        options: GranulizerOptions,
    ) -> Result<Self, Error> {
        options.validate()?;
        if buffers.is_empty() {
            return Err(Error::EmptyResourceList);
        }
        let destination = context.destination();
        if let Some(capacity) = destination.capacity() {
            if options.grains_per_pass() > capacity {
                return Err(Error::ConfigurationError(format!(
                    "{} grains per pass exceed the destination's capacity of {} grains: \
                    increase 'grain_spacing' or lower 'tick_interval'",
                    options.grains_per_pass(),
                    capacity
                )));
            }
        }
        let rng = match options.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        let state = GranulizerState {
            playback_state: PlaybackState::Unstarted,
            scheduler: GrainScheduler::new(buffers.len()),
            destination: Some(destination),
            rng,
            pass_count: 0,
        };
        let setup = GranulizerSetup {
            id: unique_usize_id(),
            context,
            buffers,
            options,
        };
        log::debug!(
            "Created granulizer #{} with {} sample buffers",
            setup.id,
            setup.buffers.len()
        );
        Ok(Self {
            setup: Arc::new(setup),
            state: Arc::new(Mutex::new(state)),
            ticker: Mutex::new(None),
        })
    }

    /// Validate the options, then load the given resources in the background and invoke
    /// `completion` exactly once with the new engine or the first load error.
    ///
    /// Invalid options are reported immediately: the resources are not loaded and the
    /// completion handler is never invoked then.
    pub fn create<F>(
        context: Arc<dyn AudioContext>,
        resources: Vec<SampleResource>,
        options: GranulizerOptions,
        completion: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(Result<Granulizer, Error>) + Send + 'static,
    {
        options.validate()?;
        SampleBank::load_async(resources, move |result| {
            completion(result.and_then(|buffers| Self::new(context, buffers, options)))
        })
    }

    /// Unique id of this engine instance, as used in log messages.
    pub fn id(&self) -> usize {
        self.setup.id
    }

    /// The engine's immutable options.
    pub fn options(&self) -> &GranulizerOptions {
        &self.setup.options
    }

    /// The loaded sample buffers, in resource order.
    pub fn buffers(&self) -> &[Arc<SampleBuffer>] {
        &self.setup.buffers
    }

    /// Actual lifecycle state.
    pub fn state(&self) -> PlaybackState {
        self.lock_state().playback_state
    }

    /// Number of scheduling passes which ran so far.
    pub fn pass_count(&self) -> usize {
        self.lock_state().pass_count
    }

    /// Snapshot of all buffer read cursors, in buffer order.
    pub fn cursors(&self) -> Vec<Cursor> {
        self.lock_state().scheduler.cursors().to_vec()
    }

    /// True when all buffers are exhausted, so no more grains will ever be emitted.
    pub fn is_exhausted(&self) -> bool {
        self.lock_state().scheduler.is_exhausted()
    }

    /// Start scheduling grains: restarts the grain timeline at the context's current time,
    /// runs a first scheduling pass immediately, then runs passes in the configured tick
    /// interval until stopped.
    ///
    /// Returns `Error::InvalidState` when already running.
    pub fn start(&self) -> Result<(), Error> {
        let mut ticker = self.lock_ticker();
        {
            let mut state = self.lock_state();
            if state.playback_state == PlaybackState::Running {
                return Err(Error::InvalidState(format!(
                    "Granulizer #{} already is running",
                    self.setup.id
                )));
            }
            let current_time = self.setup.context.current_time();
            log::info!(
                "Starting granulizer #{} at {current_time:.3} seconds",
                self.setup.id
            );
            state.playback_state = PlaybackState::Running;
            state.scheduler.reset(current_time);
            self.setup.run_pass(&mut state);
        }

        let new_ticker = Ticker::start(
            &format!("granulizer_{}", self.setup.id),
            self.setup.options.tick_interval,
            {
                let setup = Arc::clone(&self.setup);
                let state = Arc::clone(&self.state);
                move || {
                    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                    // stop got requested while waiting for the lock
                    if state.playback_state != PlaybackState::Running {
                        return;
                    }
                    setup.run_pass(&mut state);
                }
            },
        );
        match new_ticker {
            Ok(new_ticker) => {
                *ticker = Some(new_ticker);
                Ok(())
            }
            Err(err) => {
                log::error!(
                    "Failed to start granulizer #{} ticker: {err}",
                    self.setup.id
                );
                self.lock_state().playback_state = PlaybackState::Stopped;
                Err(err)
            }
        }
    }

    /// Stop scheduling grains. Already emitted grains keep on playing.
    ///
    /// No scheduling pass runs after this returned. Stopping a stopped or never started engine
    /// does nothing.
    pub fn stop(&self) {
        let mut ticker = self.lock_ticker();
        {
            let mut state = self.lock_state();
            if state.playback_state == PlaybackState::Running {
                log::info!("Stopping granulizer #{}", self.setup.id);
                state.playback_state = PlaybackState::Stopped;
            }
        }
        if let Some(mut ticker) = ticker.take() {
            ticker.stop();
        }
    }

    /// Route all grains which get emitted from now on to the given destination.
    /// Destinations which can't take a full pass of grains will drop the surplus grains.
    pub fn connect(&self, destination: Arc<dyn GrainDestination>) {
        log::debug!("Connecting granulizer #{}", self.setup.id);
        if let Some(capacity) = destination.capacity() {
            let grains_per_pass = self.setup.options.grains_per_pass();
            if grains_per_pass > capacity {
                log::warn!(
                    "Granulizer #{} emits up to {} grains per pass, but the destination only \
                    accepts {}: surplus grains will be dropped",
                    self.setup.id,
                    grains_per_pass,
                    capacity
                );
            }
        }
        self.lock_state().destination = Some(destination);
    }

    /// Remove the destination: grains emitted from now on are silently dropped, while
    /// scheduling continues as usual.
    pub fn disconnect(&self) {
        log::debug!("Disconnecting granulizer #{}", self.setup.id);
        self.lock_state().destination = None;
    }

    fn lock_state(&self) -> MutexGuard<'_, GranulizerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_ticker(&self) -> MutexGuard<'_, Option<Ticker>> {
        self.ticker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Granulizer {
    fn drop(&mut self) {
        self.stop();
    }
}

// -------------------------------------------------------------------------------------------------
