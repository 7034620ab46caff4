//! Grain amplitude envelope.

use std::sync::LazyLock;

// -------------------------------------------------------------------------------------------------

/// Resolution of the shared grain envelope table.
pub const GRAIN_ENVELOPE_SIZE: usize = 16384;

/// Precomputed half-sine amplitude curve, applied to every grain to avoid clicks at grain
/// boundaries. `N` must be a pow2 value.
pub struct GrainEnvelope<const N: usize> {
    lut: Box<[f32]>,
}

impl<const N: usize> GrainEnvelope<N> {
    const _VERIFY_N: () = assert!(
        N.is_power_of_two(),
        "Grain envelope size must be a pow2 value"
    );

    /// Precompute the envelope table: `sin(PI * i / N)` for `i` in `0..N`.
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let _ = Self::_VERIFY_N;
        let lut = (0..N)
            .map(|i| (std::f64::consts::PI * i as f64 / N as f64).sin() as f32)
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { lut }
    }

    /// Number of entries in the table.
    pub const fn len(&self) -> usize {
        N
    }

    /// Raw table values.
    pub fn table(&self) -> &[f32] {
        &self.lut
    }

    /// Evaluate the envelope at normalized grain progress [0.0, 1.0].
    /// The table gets stretched over the whole range, interpolating linearly between entries.
    #[inline]
    pub fn sample(&self, phase: f64) -> f32 {
        if !(0.0..1.0).contains(&phase) {
            return if phase >= 1.0 { self.lut[N - 1] } else { 0.0 };
        }
        let index_float = phase * (N - 1) as f64;
        let index = index_float as usize;
        let fraction = index_float.fract() as f32;
        if index < N - 1 {
            self.lut[index] * (1.0 - fraction) + self.lut[index + 1] * fraction
        } else {
            self.lut[N - 1]
        }
    }
}

impl<const N: usize> Default for GrainEnvelope<N> {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------

/// Static, shared envelope table for all grains.
static GRAIN_ENVELOPE: LazyLock<GrainEnvelope<GRAIN_ENVELOPE_SIZE>> =
    LazyLock::new(GrainEnvelope::new);

/// Access the process wide grain envelope. The table is computed on first access.
pub fn grain_envelope() -> &'static GrainEnvelope<GRAIN_ENVELOPE_SIZE> {
    &GRAIN_ENVELOPE
}

// -------------------------------------------------------------------------------------------------
