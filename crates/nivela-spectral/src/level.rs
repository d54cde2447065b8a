//! Signal level measurement and normalization.
//!
//! Levels here are Euclidean norms (root of the sum of squared samples),
//! accumulated with compensated summation so that the long, mostly-tiny
//! tails of impulse responses do not lose low-order bits. The band-limited
//! variant measures over a frequency interval of an already computed
//! spectrum, with an optional `1/f^w` weighting normalized through
//! generalized harmonic numbers.

use nivela_fft::{Complex64, Fft, Oversampling};
use tracing::trace;

use crate::SpectralError;

/// Euler-Mascheroni constant, used by the asymptotic harmonic-number
/// expansion.
const EULER_MASCHERONI: f64 = 0.577_215_664_901_532_9;

/// Below this many terms the harmonic number is summed directly.
const HARMONIC_DIRECT_LIMIT: usize = 256;

/// Compensated (Kahan) accumulator.
#[derive(Debug, Default)]
struct KahanSum {
    sum: f64,
    carry: f64,
}

impl KahanSum {
    fn add(&mut self, v: f64) {
        let y = v - self.carry;
        let t = self.sum + y;
        self.carry = (t - self.sum) - y;
        self.sum = t;
    }

    fn value(&self) -> f64 {
        self.sum
    }
}

/// Frequency band and weighting for band-limited level measurement.
#[derive(Debug, Clone, Copy)]
pub struct Band {
    /// Sample rate of the measured signal, in Hz.
    pub sample_rate: u32,
    /// Lower band edge, in Hz.
    pub low: f64,
    /// Upper band edge, in Hz.
    pub high: f64,
    /// Spectral weighting exponent: bin `k` is weighted by `k^-w`.
    /// Zero means flat weighting.
    pub weight: f64,
}

/// Euclidean norm of `sig`, with compensated summation.
pub fn rms(sig: &[f64]) -> f64 {
    let mut acc = KahanSum::default();
    for &x in sig {
        acc.add(x * x);
    }
    acc.value().sqrt()
}

/// Band-limited weighted level of an already computed spectrum.
///
/// `spectrum` is the full complex spectrum of a real signal; only the
/// positive-frequency half contributes, doubled to account for the
/// conjugate half. The DC bin participates when the band starts at 0 Hz.
/// With a nonzero weight each bin's power is scaled by `k^-w` and the
/// total is normalized by the generalized harmonic number of the
/// half-spectrum, so the weighted and unweighted levels are comparable.
pub fn band_rms_spectrum(spectrum: &[Complex64], band: &Band) -> f64 {
    let fft_size = spectrum.len();
    let rate = f64::from(band.sample_rate);
    let hs = fft_size / 2;

    let mut fs = (0.5 + fft_size as f64 * band.low / rate).floor() as usize;
    let fe = ((0.5 + fft_size as f64 * band.high / rate).floor() as usize).min(fft_size);

    let mut acc = KahanSum::default();
    if band.weight == 0.0 {
        if fs == 0 {
            acc.add(spectrum[0].re * spectrum[0].re);
            fs = 1;
        }
        for bin in spectrum.iter().take(fe).skip(fs) {
            acc.add(bin.norm_sqr());
        }
        (2.0 * acc.value() / fft_size as f64).sqrt()
    } else {
        // The DC bin, when included, gets the same weight as the first
        // useful component.
        let mut cf = 0.0;
        if fs == 0 {
            cf = 1.0;
            acc.add(spectrum[0].re * spectrum[0].re);
            fs = 1;
        }
        for (k, bin) in spectrum.iter().enumerate().take(fe).skip(fs) {
            acc.add(bin.norm_sqr() * (k as f64).powf(-band.weight));
        }
        (acc.value() / (cf + harmonic_number(hs, band.weight))).sqrt()
    }
}

/// Band-limited weighted level of a time-domain signal.
///
/// Transforms `sig` at the size given by `os` and measures the resulting
/// spectrum with [`band_rms_spectrum`].
pub fn band_rms(
    fft: &Fft,
    sig: &[f64],
    band: &Band,
    os: Oversampling,
) -> Result<f64, SpectralError> {
    let fs = os.transform_size(sig.len());
    let spectrum = fft.real_forward(sig, fs)?;
    Ok(band_rms_spectrum(&spectrum, band))
}

/// Generalized harmonic number `sum_{k=1..n} k^-w`.
///
/// Small orders are summed directly; beyond [`HARMONIC_DIRECT_LIMIT`] the
/// Euler-Maclaurin asymptotic expansion is used instead.
fn harmonic_number(n: usize, w: f64) -> f64 {
    if n < HARMONIC_DIRECT_LIMIT {
        let mut acc = KahanSum::default();
        for k in 1..=n {
            acc.add((k as f64).powf(-w));
        }
        acc.value()
    } else {
        let nf = n as f64;
        EULER_MASCHERONI + nf.ln() + 1.0 / (2.0 * nf) - 1.0 / (12.0 * nf * nf)
            + 1.0 / (120.0 * nf.powi(4))
    }
}

/// Target norm for signal normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormMethod {
    /// Euclidean norm of the samples.
    Euclidean,
    /// Largest absolute sample value.
    Max,
    /// Sum of absolute sample values.
    Sum,
    /// Largest spectral magnitude.
    SpectrumPeak,
}

/// Scales `sig` in place so its norm under `method` equals `factor`.
///
/// Returns [`SpectralError::DegenerateNorm`] when the measured norm is not
/// positive, which happens only for an all-zero signal.
pub fn normalize(
    fft: &Fft,
    sig: &mut [f64],
    factor: f64,
    method: NormMethod,
) -> Result<(), SpectralError> {
    let base = match method {
        NormMethod::Euclidean => rms(sig),
        NormMethod::Max => sig.iter().fold(0.0f64, |m, &x| m.max(x.abs())),
        NormMethod::Sum => {
            let mut acc = KahanSum::default();
            for &x in sig.iter() {
                acc.add(x.abs());
            }
            acc.value()
        }
        NormMethod::SpectrumPeak => {
            let spectrum = fft.real_forward(sig, sig.len())?;
            spectrum.iter().fold(0.0f64, |m, c| m.max(c.norm()))
        }
    };
    if base <= 0.0 {
        return Err(SpectralError::DegenerateNorm);
    }
    trace!(base, factor, "normalizing signal");
    let scale = factor / base;
    for x in sig.iter_mut() {
        *x *= scale;
    }
    Ok(())
}
