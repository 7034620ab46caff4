use granulizer::{Error, SampleBank, SampleResource};

mod common;

// -------------------------------------------------------------------------------------------------

#[test]
fn load_preserves_request_order() -> Result<(), Error> {
    let resources = vec![
        SampleResource::Memory {
            name: "long".to_string(),
            bytes: common::sine_wav(440.0, 1.0, 2, 44100),
        },
        SampleResource::Memory {
            name: "short".to_string(),
            bytes: common::sine_wav(220.0, 0.25, 1, 22050),
        },
        SampleResource::Memory {
            name: "medium".to_string(),
            bytes: common::sine_wav(880.0, 0.5, 1, 48000),
        },
    ];
    let buffers = SampleBank::load(&resources)?;
    assert_eq!(buffers.len(), 3);

    assert_eq!(buffers[0].name(), "long");
    assert_eq!(buffers[0].channel_count(), 2);
    assert_eq!(buffers[0].sample_rate(), 44100);
    assert_eq!(buffers[0].frame_count(), 44100);

    assert_eq!(buffers[1].name(), "short");
    assert_eq!(buffers[1].channel_count(), 1);
    assert_eq!(buffers[1].sample_rate(), 22050);
    assert!((buffers[1].duration() - 0.25).abs() < 0.001);

    assert_eq!(buffers[2].name(), "medium");
    assert_eq!(buffers[2].sample_rate(), 48000);
    assert!((buffers[2].duration() - 0.5).abs() < 0.001);

    // decoded content is the encoded sine
    let peak = buffers[2]
        .samples()
        .iter()
        .fold(0.0f32, |peak, s| peak.max(s.abs()));
    assert!((peak - 0.5).abs() < 0.01);
    Ok(())
}

#[test]
fn load_from_files() -> Result<(), Error> {
    let path = common::temp_path("load_from_files.wav");
    std::fs::write(&path, common::sine_wav(440.0, 0.1, 1, 44100))?;
    let result = SampleBank::load(&[SampleResource::from(path.as_path())]);
    std::fs::remove_file(&path)?;

    let buffers = result?;
    assert_eq!(buffers.len(), 1);
    assert_eq!(buffers[0].frame_count(), 4410);
    assert_eq!(buffers[0].name(), path.to_string_lossy());
    Ok(())
}

#[test]
fn any_failure_fails_the_whole_load() {
    let resources = vec![
        SampleResource::Memory {
            name: "valid".to_string(),
            bytes: common::sine_wav(440.0, 0.1, 1, 44100),
        },
        SampleResource::Memory {
            name: "broken".to_string(),
            bytes: b"RIFF garbage which is not a wave file".to_vec(),
        },
    ];
    match SampleBank::load(&resources) {
        Err(Error::LoadError { resource, .. }) => assert_eq!(resource, "broken"),
        Err(err) => panic!("unexpected error: {err}"),
        Ok(_) => panic!("load must fail"),
    }
}

#[test]
fn async_load_completes_once() {
    let (sender, receiver) = std::sync::mpsc::channel();
    let resources = vec![SampleResource::Memory {
        name: "sine".to_string(),
        bytes: common::sine_wav(440.0, 0.1, 1, 44100),
    }];
    SampleBank::load_async(resources, move |result| {
        sender.send(result.map(|buffers| buffers.len())).unwrap();
    })
    .unwrap();

    let result = receiver.recv().unwrap();
    assert!(matches!(result, Ok(1)));
    // sender got dropped after the single completion call
    assert!(receiver.recv().is_err());
}
