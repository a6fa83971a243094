// src/spectrum.rs
//! Conversion from a spectral sample to a block's colour channels.
//!
//! The actual response curves belong to the renderer; blocks only need to
//! know how many channels a response produces.

/// Maps `(wavelengths, value)` to output channels.
pub trait SpectralResponse: Send + Sync {
    /// Number of colour channels written by [`to_channels`](Self::to_channels).
    fn channel_count(&self) -> usize;

    /// Write the colour channels for one sample into `out`, which holds
    /// exactly `channel_count()` values.
    fn to_channels(&self, wavelengths: &[f32], value: &[f32], out: &mut [f32]);
}

/// Copies the spectral value through unchanged; wavelengths are ignored.
///
/// This is the right response when the renderer already works in the
/// block's colour space, e.g. RGB rendering into an RGB block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Passthrough {
    channels: usize,
}

impl Passthrough {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }

    pub fn rgb() -> Self {
        Self::new(3)
    }

    pub fn mono() -> Self {
        Self::new(1)
    }
}

impl SpectralResponse for Passthrough {
    fn channel_count(&self) -> usize {
        self.channels
    }

    fn to_channels(&self, _wavelengths: &[f32], value: &[f32], out: &mut [f32]) {
        for (dst, src) in out.iter_mut().zip(value.iter().chain(std::iter::repeat(&0.0))) {
            *dst = *src;
        }
    }
}
