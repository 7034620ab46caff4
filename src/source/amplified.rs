use crate::utils::buffer::scale_buffer;

use super::{Source, SourceTime};

// -------------------------------------------------------------------------------------------------

/// A source which applies a constant volume factor to some other source's output
pub struct AmplifiedSource<InputSource: Source> {
    source: InputSource,
    volume: f32,
}

impl<InputSource: Source> AmplifiedSource<InputSource> {
    pub fn new(source: InputSource, volume: f32) -> Self {
        debug_assert!(volume >= 0.0, "Invalid volume factor");
        Self { source, volume }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }
}

impl<InputSource: Source> Source for AmplifiedSource<InputSource> {
    fn write(&mut self, output: &mut [f32], time: &SourceTime) -> usize {
        // write input source
        let written = self.source.write(output, time);
        // apply volume
        scale_buffer(&mut output[..written], self.volume);
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
