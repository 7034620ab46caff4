//! Granulizes the given sample files with the classic granulizer settings, playing back via
//! the default audio device or recording into a wav file.

use std::{
    path::PathBuf,
    sync::{mpsc, Arc},
    time::Duration,
};

use arg::{parse_args, Args};

use granulizer::{
    outputs::WavOutput, Error, Granulizer, GranulizerOptions, OutputContext, SampleResource,
};

// -------------------------------------------------------------------------------------------------

const DEFAULT_LOG_LEVEL: log::Level = if cfg!(debug_assertions) {
    log::Level::Debug
} else {
    log::Level::Warn
};

const DEFAULT_DURATION_SECS: u64 = 10;

// -------------------------------------------------------------------------------------------------

/// Granulizes sample files.
#[derive(Args, Debug, Default)]
struct Arguments {
    #[arg(short = "o", long = "output")]
    /// Write audio output into the given wav file, instead of using the default audio device.
    output_path: Option<PathBuf>,
    #[arg(short = "l", long = "log-level")]
    /// Set logging level to \"debug\", \"info\", \"warn\" or \"error\".
    /// By default \"debug\" in dev builds and \"warn\" in release builds.
    log_level: Option<log::Level>,
    #[arg(short = "d", long = "duration")]
    /// Playback duration in seconds. By default 10 seconds.
    duration: Option<u64>,
    /// Sample files to granulize.
    samples: Vec<String>,
}

// -------------------------------------------------------------------------------------------------

fn create_logger(log_level: Option<log::Level>) {
    simple_logger::SimpleLogger::new()
        // use default or arg level by default
        .with_level(log_level.unwrap_or(DEFAULT_LOG_LEVEL).to_level_filter())
        // disable logging in chatty modules
        .with_module_level("symphonia_core", log::LevelFilter::Warn)
        .with_module_level("symphonia_format", log::LevelFilter::Warn)
        .init()
        .expect("Failed to set logger");
}

fn new_context(args: &Arguments, duration: Duration) -> Result<OutputContext, Error> {
    if let Some(output_path) = &args.output_path {
        // record a little longer, so the last grains fade out
        return OutputContext::new(WavOutput::open(
            output_path,
            duration + Duration::from_secs(1),
        )?);
    }
    #[cfg(feature = "cpal-output")]
    {
        OutputContext::new(granulizer::outputs::CpalOutput::open()?)
    }
    #[cfg(not(feature = "cpal-output"))]
    {
        Err(Error::ConfigurationError(
            "No realtime audio output available: pass an output file path".to_string(),
        ))
    }
}

// -------------------------------------------------------------------------------------------------

fn main() -> Result<(), Error> {
    let args = parse_args::<Arguments>();
    create_logger(args.log_level);

    if args.samples.is_empty() {
        return Err(Error::EmptyResourceList);
    }
    let duration = Duration::from_secs(args.duration.unwrap_or(DEFAULT_DURATION_SECS));

    let context = Arc::new(new_context(&args, duration)?);

    let options = GranulizerOptions::default()
        .attack(Duration::from_millis(30))
        .hold(Duration::from_millis(5))
        .grain_spacing(Duration::from_millis(12))
        .wave_spacing(Duration::from_millis(24))
        .forever(true)
        .gain_coefficient(0.4)
        .pan_coefficient(0.2)
        .pitch_coefficient(0.01);

    let resources = args
        .samples
        .iter()
        .map(|path| SampleResource::from(path.as_str()))
        .collect::<Vec<_>>();

    // load samples in the background, then start granulizing
    let (sender, receiver) = mpsc::sync_channel(1);
    Granulizer::create(context.clone(), resources, options, move |result| {
        let _ = sender.send(result);
    })?;
    let granulizer = receiver.recv().map_err(|err| Error::SendError(err.to_string()))??;

    granulizer.start()?;
    std::thread::sleep(duration);
    granulizer.stop();

    // let the last grains play out
    std::thread::sleep(Duration::from_secs(1));
    context.close();

    Ok(())
}
