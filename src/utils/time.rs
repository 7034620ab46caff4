// -------------------------------------------------------------------------------------------------

/// Absolute time on the output timeline in sample frames.
pub type SampleTime = u64;

// -------------------------------------------------------------------------------------------------

/// Convert a time in seconds to sample frames with the given sample rate.
/// Negative times are clamped to zero.
pub fn seconds_to_sample_time(seconds: f64, sample_rate: u32) -> SampleTime {
    debug_assert!(sample_rate > 0, "Invalid sample rate");
    (seconds.max(0.0) * sample_rate as f64).round() as SampleTime
}

/// Convert sample frames to a time in seconds with the given sample rate.
pub fn sample_time_to_seconds(sample_time: SampleTime, sample_rate: u32) -> f64 {
    debug_assert!(sample_rate > 0, "Invalid sample rate");
    sample_time as f64 / sample_rate as f64
}

// -------------------------------------------------------------------------------------------------
