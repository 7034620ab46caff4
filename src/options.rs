use std::time::Duration;

use crate::Error;

// -------------------------------------------------------------------------------------------------

/// Options to control the grain scheduling of a [`Granulizer`](crate::Granulizer).
///
/// `attack`, `hold`, `grain_spacing` and `wave_spacing` have no defaults and must be set to
/// non zero durations, else [`validate`](Self::validate) fails with a configuration error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GranulizerOptions {
    /// Rise time of each grain. Together with `hold` this defines the grain duration.
    pub attack: Option<Duration>,
    /// Sustain time of each grain. Together with `attack` this defines the grain duration.
    pub hold: Option<Duration>,
    /// Time between two successive grain starts: controls the density/overlap of grains.
    pub grain_spacing: Option<Duration>,
    /// Read cursor advance of a buffer whenever a grain got emitted from it: controls the
    /// effective playback speed through the sample material.
    pub wave_spacing: Option<Duration>,
    /// By default false: when enabled, buffer cursors wrap around at the end of the buffer,
    /// else buffers get exhausted and are skipped from then on.
    pub forever: bool,
    /// By default 0.0: random attenuation amount of each grain's gain.
    pub gain_coefficient: f32,
    /// By default 0.0: random spatial offset amount of each grain.
    pub pan_coefficient: f32,
    /// By default 0.0: random pitch variation width of each grain, centered around 1.0.
    pub pitch_coefficient: f32,
    /// By default 1 second: the interval in which scheduling passes are invoked. Each pass
    /// schedules enough grains to cover one full interval.
    pub tick_interval: Duration,
    /// By default None: when set, the grain parameter jitter uses a deterministic random
    /// number generator with the given seed.
    pub seed: Option<u64>,
}

impl Default for GranulizerOptions {
    fn default() -> Self {
        Self {
            attack: None,
            hold: None,
            grain_spacing: None,
            wave_spacing: None,
            forever: false,
            gain_coefficient: 0.0,
            pan_coefficient: 0.0,
            pitch_coefficient: 0.0,
            tick_interval: Duration::from_secs(1),
            seed: None,
        }
    }
}

impl GranulizerOptions {
    pub fn attack(mut self, attack: Duration) -> Self {
        self.attack = Some(attack);
        self
    }
    pub fn hold(mut self, hold: Duration) -> Self {
        self.hold = Some(hold);
        self
    }
    pub fn grain_spacing(mut self, spacing: Duration) -> Self {
        self.grain_spacing = Some(spacing);
        self
    }
    pub fn wave_spacing(mut self, spacing: Duration) -> Self {
        self.wave_spacing = Some(spacing);
        self
    }
    pub fn forever(mut self, forever: bool) -> Self {
        self.forever = forever;
        self
    }
    pub fn gain_coefficient(mut self, coefficient: f32) -> Self {
        self.gain_coefficient = coefficient;
        self
    }
    pub fn pan_coefficient(mut self, coefficient: f32) -> Self {
        self.pan_coefficient = coefficient;
        self
    }
    pub fn pitch_coefficient(mut self, coefficient: f32) -> Self {
        self.pitch_coefficient = coefficient;
        self
    }
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Grain duration in seconds: attack + hold.
    pub fn grain_duration(&self) -> f64 {
        Self::seconds(self.attack) + Self::seconds(self.hold)
    }

    /// Grain spacing in seconds.
    pub fn grain_spacing_secs(&self) -> f64 {
        Self::seconds(self.grain_spacing)
    }

    /// Wave spacing in seconds.
    pub fn wave_spacing_secs(&self) -> f64 {
        Self::seconds(self.wave_spacing)
    }

    /// Number of grain attempts a single scheduling pass has to make to cover one tick.
    pub fn grains_per_pass(&self) -> usize {
        let spacing = self.grain_spacing_secs();
        if spacing <= 0.0 {
            return 0;
        }
        (self.tick_interval.as_secs_f64() / spacing).ceil() as usize
    }

    /// Validate all options. Returns Error::ConfigurationError on errors.
    pub fn validate(&self) -> Result<(), Error> {
        for (name, value) in [
            ("attack", self.attack),
            ("hold", self.hold),
            ("grain_spacing", self.grain_spacing),
            ("wave_spacing", self.wave_spacing),
        ] {
            if value.is_none_or(|duration| duration.is_zero()) {
                return Err(Error::ConfigurationError(format!(
                    "option '{name}' is missing or zero"
                )));
            }
        }
        for (name, value) in [
            ("gain_coefficient", self.gain_coefficient),
            ("pan_coefficient", self.pan_coefficient),
            ("pitch_coefficient", self.pitch_coefficient),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::ConfigurationError(format!(
                    "option '{name}' value is '{value}'"
                )));
            }
        }
        // gain scales must not invert the phase, pitch ratios must stay positive
        if self.gain_coefficient > 1.0 {
            return Err(Error::ConfigurationError(format!(
                "option 'gain_coefficient' must be <= 1.0, but is '{}'",
                self.gain_coefficient
            )));
        }
        if self.pitch_coefficient >= 2.0 {
            return Err(Error::ConfigurationError(format!(
                "option 'pitch_coefficient' must be < 2.0, but is '{}'",
                self.pitch_coefficient
            )));
        }
        if self.tick_interval.is_zero() {
            return Err(Error::ConfigurationError(
                "option 'tick_interval' must not be zero".to_string(),
            ));
        }
        Ok(())
    }

    fn seconds(duration: Option<Duration>) -> f64 {
        duration.map_or(0.0, |d| d.as_secs_f64())
    }
}

// -------------------------------------------------------------------------------------------------
