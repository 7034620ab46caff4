// -------------------------------------------------------------------------------------------------

/// Fill the given buffer with silence.
pub fn clear_buffer(buffer: &mut [f32]) {
    buffer.fill(0.0);
}

// -------------------------------------------------------------------------------------------------

/// Add `source` to `destination`, sample by sample. Both buffers must have the same length.
pub fn add_buffers(destination: &mut [f32], source: &[f32]) {
    debug_assert_eq!(destination.len(), source.len(), "Buffer length mismatch");
    for (d, s) in destination.iter_mut().zip(source) {
        *d += *s;
    }
}

// -------------------------------------------------------------------------------------------------

/// Multiply all samples in the given buffer by `gain`.
pub fn scale_buffer(buffer: &mut [f32], gain: f32) {
    if (gain - 1.0).abs() > 0.0001 {
        for sample in buffer.iter_mut() {
            *sample *= gain;
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_ops() {
        let mut buffer = vec![1.0, 2.0, 3.0, 4.0];
        add_buffers(&mut buffer, &[1.0, 1.0, -1.0, 0.5]);
        assert_eq!(buffer, vec![2.0, 3.0, 2.0, 4.5]);

        scale_buffer(&mut buffer, 2.0);
        assert_eq!(buffer, vec![4.0, 6.0, 4.0, 9.0]);
        scale_buffer(&mut buffer, 1.0);
        assert_eq!(buffer, vec![4.0, 6.0, 4.0, 9.0]);

        clear_buffer(&mut buffer);
        assert!(buffer.iter().all(|s| *s == 0.0));
    }
}
