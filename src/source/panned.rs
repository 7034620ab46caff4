use crate::utils::buffer::scale_buffer;

use super::{Source, SourceTime};

// -------------------------------------------------------------------------------------------------

/// Distance of the source to the listener on the z axis (slightly behind the listener).
const SOURCE_DEPTH: f32 = 0.1;
/// Distance at which the distance attenuation starts.
const REF_DISTANCE: f32 = 1.0;
/// Rolloff factor of the inverse distance model.
const ROLLOFF_FACTOR: f32 = 1.0;

// -------------------------------------------------------------------------------------------------

/// Stereo gains of a source placed in 3D space, relative to a listener at the origin.
///
/// Uses an equal-power panning law based on the source's azimuth, and an inverse distance
/// model for the distance attenuation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialGains {
    /// Normalized pan position: 0.0 = full left, 0.5 = center, 1.0 = full right
    pub azimuth: f32,
    /// Distance attenuation factor (0.0..=1.0)
    pub distance_gain: f32,
}

impl SpatialGains {
    /// Calculate gains for a source at position (x, 0, `SOURCE_DEPTH`).
    pub fn from_offset(x: f32) -> Self {
        // sources behind the listener are mirrored to the front
        let azimuth_degrees = x.atan2(SOURCE_DEPTH.abs()).to_degrees().clamp(-90.0, 90.0);
        let azimuth = (azimuth_degrees + 90.0) / 180.0;

        let distance = (x * x + SOURCE_DEPTH * SOURCE_DEPTH).sqrt().max(REF_DISTANCE);
        let distance_gain =
            REF_DISTANCE / (REF_DISTANCE + ROLLOFF_FACTOR * (distance - REF_DISTANCE));

        Self {
            azimuth,
            distance_gain,
        }
    }

    /// Apply the gains to a single stereo frame.
    #[inline]
    pub fn apply_stereo(&self, left: f32, right: f32) -> (f32, f32) {
        let half_pi = std::f32::consts::FRAC_PI_2;
        let (left, right) = if self.azimuth <= 0.5 {
            // pan towards left: mix some of the right channel into the left one
            let x = self.azimuth * 2.0;
            (left + right * (x * half_pi).cos(), right * (x * half_pi).sin())
        } else {
            // pan towards right: mix some of the left channel into the right one
            let x = self.azimuth * 2.0 - 1.0;
            (left * (x * half_pi).cos(), right + left * (x * half_pi).sin())
        };
        (left * self.distance_gain, right * self.distance_gain)
    }
}

// -------------------------------------------------------------------------------------------------

/// A source which places some other source's output in space, offset on the x axis.
///
/// The first two channels are panned as a stereo pair. Any further channels only get the
/// distance attenuation applied. Mono sources only get attenuated.
pub struct PannedSource<InputSource: Source> {
    source: InputSource,
    offset: f32,
    gains: SpatialGains,
}

impl<InputSource: Source> PannedSource<InputSource> {
    pub fn new(source: InputSource, offset: f32) -> Self {
        debug_assert!(offset.is_finite(), "Invalid spatial offset");
        let gains = SpatialGains::from_offset(offset);
        Self {
            source,
            offset,
            gains,
        }
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }
}

impl<InputSource: Source> Source for PannedSource<InputSource> {
    fn write(&mut self, output: &mut [f32], time: &SourceTime) -> usize {
        // write input source
        let written = self.source.write(output, time);
        let written_out = &mut output[0..written];
        let channel_count = self.source.channel_count();
        if channel_count >= 2 {
            for o in written_out.chunks_exact_mut(channel_count) {
                let (left, right) = self.gains.apply_stereo(o[0], o[1]);
                o[0] = left;
                o[1] = right;
                scale_buffer(&mut o[2..], self.gains.distance_gain);
            }
        } else {
            scale_buffer(written_out, self.gains.distance_gain);
        }
        written
    }

    fn channel_count(&self) -> usize {
        self.source.channel_count()
    }

    fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }

    fn is_exhausted(&self) -> bool {
        self.source.is_exhausted()
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_source_is_transparent() {
        let gains = SpatialGains::from_offset(0.0);
        assert!((gains.azimuth - 0.5).abs() < 1e-6);
        assert_eq!(gains.distance_gain, 1.0);
        let (l, r) = gains.apply_stereo(0.5, 0.5);
        assert!((l - 0.5).abs() < 1e-6);
        assert!((r - 0.5).abs() < 1e-6);
    }

    #[test]
    fn offsets_move_source_sideways() {
        let right = SpatialGains::from_offset(2.0);
        let (l, r) = right.apply_stereo(1.0, 1.0);
        assert!(r > l);
        let left = SpatialGains::from_offset(-2.0);
        let (l, r) = left.apply_stereo(1.0, 1.0);
        assert!(l > r);
        // mirrored offsets produce mirrored gains
        assert!((right.azimuth - (1.0 - left.azimuth)).abs() < 1e-6);
    }

    #[test]
    fn distance_attenuation() {
        // within the reference distance: no attenuation
        assert_eq!(SpatialGains::from_offset(0.5).distance_gain, 1.0);
        // inverse distance beyond it
        let far = SpatialGains::from_offset(4.0);
        let distance = (16.0f32 + SOURCE_DEPTH * SOURCE_DEPTH).sqrt();
        assert!((far.distance_gain - 1.0 / distance).abs() < 1e-6);
    }

    /// Produces a constant value on all channels.
    struct ConstantSource {
        channel_count: usize,
    }

    impl Source for ConstantSource {
        fn write(&mut self, output: &mut [f32], _time: &SourceTime) -> usize {
            output.fill(1.0);
            output.len()
        }

        fn channel_count(&self) -> usize {
            self.channel_count
        }

        fn sample_rate(&self) -> u32 {
            1000
        }

        fn is_exhausted(&self) -> bool {
            false
        }
    }

    #[test]
    fn surround_channels_get_attenuated() {
        let offset = 4.0;
        let gains = SpatialGains::from_offset(offset);
        let mut source = PannedSource::new(ConstantSource { channel_count: 4 }, offset);

        let mut output = vec![0.0; 8];
        assert_eq!(source.write(&mut output, &SourceTime::default()), 8);
        let (left, right) = gains.apply_stereo(1.0, 1.0);
        for frame in output.chunks_exact(4) {
            assert!((frame[0] - left).abs() < 1e-6);
            assert!((frame[1] - right).abs() < 1e-6);
            assert!((frame[2] - gains.distance_gain).abs() < 1e-6);
            assert!((frame[3] - gains.distance_gain).abs() < 1e-6);
        }
        assert!(gains.distance_gain < 1.0);

        // mono sources only get attenuated
        let mut source = PannedSource::new(ConstantSource { channel_count: 1 }, offset);
        let mut output = vec![0.0; 2];
        source.write(&mut output, &SourceTime::default());
        assert!(output.iter().all(|s| (s - gains.distance_gain).abs() < 1e-6));
    }
}
