use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

// -------------------------------------------------------------------------------------------------

/// Encode a sine wave with the given specs into in-memory wav file bytes.
#[allow(unused)]
pub fn sine_wav(frequency: f32, duration: f32, channel_count: u16, sample_rate: u32) -> Vec<u8> {
    let spec = WavSpec {
        channels: channel_count,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut bytes = Vec::new();
    {
        let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
        let frame_count = (duration * sample_rate as f32).round() as usize;
        for frame in 0..frame_count {
            let phase = frame as f32 / sample_rate as f32 * frequency;
            let value = (phase * std::f32::consts::TAU).sin() * 0.5;
            for _ in 0..channel_count {
                writer
                    .write_sample((value * i16::MAX as f32) as i16)
                    .unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    bytes
}

/// A unique path in the system's temp directory.
#[allow(unused)]
pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("granulizer_test_{}_{name}", std::process::id()))
}
