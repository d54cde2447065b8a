//! Transform-size selection policy.

/// How to choose the transform size `FS` for a signal of length `n`.
///
/// The spectral operations accept either the signal length itself or a
/// power-of-two size with optional oversampling headroom. Power-of-two
/// sizes take the engine's radix-2 fast path; the extra headroom reduces
/// circular-aliasing artifacts in cepstral processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Oversampling {
    /// `FS = n`, no padding beyond the signal itself.
    #[default]
    None,
    /// `FS` is the smallest power of two greater than `n`, multiplied by
    /// `2^m`.
    Pow2(u32),
}

impl Oversampling {
    /// Transform size for a signal of `n` samples.
    pub fn transform_size(self, n: usize) -> usize {
        match self {
            Self::None => n,
            Self::Pow2(m) => {
                let mut fs = 1usize;
                while fs <= n {
                    fs <<= 1;
                }
                fs << m
            }
        }
    }
}
