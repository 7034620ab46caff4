#![cfg(feature = "wav-output")]

use std::{io, sync::Arc, thread, time::Duration};

use granulizer::{
    outputs::WavOutput, AudioContext, Error, Granulizer, GranulizerOptions, OutputContext,
    PlaybackState, SampleBank, SampleResource,
};

mod common;

// -------------------------------------------------------------------------------------------------

#[test]
fn granulize_into_wav_file() -> Result<(), Error> {
    const SAMPLE_RATE: u32 = 8000;

    let path = common::temp_path("granulize_into_wav_file.wav");
    let device = WavOutput::open_with_specs(&path, SAMPLE_RATE, 2, Duration::from_millis(400))?;
    let context = Arc::new(OutputContext::new(device)?);
    assert_eq!(context.sample_rate(), SAMPLE_RATE);
    assert_eq!(context.channel_count(), 2);

    let buffers = SampleBank::load(&[
        SampleResource::Memory {
            name: "low".to_string(),
            bytes: common::sine_wav(220.0, 0.5, 1, 22050),
        },
        SampleResource::Memory {
            name: "high".to_string(),
            bytes: common::sine_wav(880.0, 0.3, 2, 44100),
        },
    ])?;

    let options = GranulizerOptions::default()
        .attack(Duration::from_millis(30))
        .hold(Duration::from_millis(5))
        .grain_spacing(Duration::from_millis(12))
        .wave_spacing(Duration::from_millis(24))
        .forever(true)
        .gain_coefficient(0.4)
        .pan_coefficient(0.2)
        .pitch_coefficient(0.01)
        .tick_interval(Duration::from_millis(100))
        .seed(42);
    let granulizer = Granulizer::new(context.clone(), buffers, options)?;
    granulizer.start()?;
    assert_eq!(granulizer.state(), PlaybackState::Running);

    thread::sleep(Duration::from_millis(250));
    granulizer.stop();
    assert!(granulizer.pass_count() >= 2);
    assert!(!granulizer.is_exhausted());

    // finalize the file
    context.close();

    let reader =
        hound::WavReader::open(&path).map_err(|err| Error::IoError(io::Error::other(err)))?;
    let spec = reader.spec();
    let samples = reader
        .into_samples::<f32>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| Error::IoError(io::Error::other(err)));
    std::fs::remove_file(&path)?;
    let samples = samples?;

    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert!(!samples.is_empty());
    assert!(samples.iter().any(|s| s.abs() > 0.01));
    assert!(samples.iter().all(|s| s.is_finite()));
    Ok(())
}
