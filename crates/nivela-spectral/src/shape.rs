//! Spectral magnitude shaping.
//!
//! Dip and peak limiting compress the magnitude response toward a
//! band-referenced threshold, either linear phase (magnitudes move, phase
//! stays) or minimum phase (the correction itself is a minimum-phase
//! filter convolved onto the signal, so its phase stays physically
//! consistent). Norm flattening blends the response toward a constant
//! level with the same two phase treatments.
//!
//! The limit threshold is the band-limited level of the signal scaled by
//! the requested gain and renormalized to the fraction of the spectrum the
//! band occupies, so a gain of 1 sits at the average in-band level.

use nivela_fft::{Complex64, Fft, Oversampling, try_buffer};
use tracing::{debug, warn};

use crate::SpectralError;
use crate::homomorphic::{cepstral_filter, hilbert_phase};
use crate::level::{Band, band_rms_spectrum, rms};

/// How the minimum-phase correction spectrum is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStrategy {
    /// Causal windowing of the complex cepstrum.
    Cepstrum,
    /// Hilbert transform of the log magnitude.
    Hilbert,
}

/// Phase treatment of a magnitude correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseMode {
    /// Change magnitudes in place, keep the phase of every bin.
    Linear,
    /// Apply the correction as a minimum-phase filter.
    Minimum(PhaseStrategy),
}

/// Shape of the gain curve where limiting sets in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
    /// Rational blend with a continuous first derivative at the limit
    /// boundary.
    Smooth,
    /// Compression factor recomputed from each below-threshold run's local
    /// extremum.
    LocalExtremum,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Dip,
    Peak,
}

/// Raises spectral dips toward `min_gain` times the band level of `sig`.
///
/// `start` in `(0, 1)` sets where the compression region begins, at
/// `threshold / start`; values `>= 1` clamp magnitudes below the
/// threshold outright.
#[allow(clippy::too_many_arguments)]
pub fn dip_limit(
    fft: &Fft,
    sig: &mut [f64],
    min_gain: f64,
    start: f64,
    band: &Band,
    os: Oversampling,
    mode: PhaseMode,
    continuity: Continuity,
) -> Result<(), SpectralError> {
    limit(fft, sig, min_gain, start, band, os, mode, continuity, Kind::Dip)
}

/// Compresses spectral peaks toward `max_gain` times the band level of
/// `sig`.
///
/// `start` in `(0, 1)` sets where the compression region begins, at
/// `start * threshold`; values `>= 1` clamp magnitudes above the
/// threshold outright.
#[allow(clippy::too_many_arguments)]
pub fn peak_limit(
    fft: &Fft,
    sig: &mut [f64],
    max_gain: f64,
    start: f64,
    band: &Band,
    os: Oversampling,
    mode: PhaseMode,
    continuity: Continuity,
) -> Result<(), SpectralError> {
    limit(fft, sig, max_gain, start, band, os, mode, continuity, Kind::Peak)
}

#[allow(clippy::too_many_arguments)]
fn limit(
    fft: &Fft,
    sig: &mut [f64],
    gain: f64,
    start: f64,
    band: &Band,
    os: Oversampling,
    mode: PhaseMode,
    continuity: Continuity,
    kind: Kind,
) -> Result<(), SpectralError> {
    let fs = os.transform_size(sig.len());
    let mut spectrum = fft.real_forward(sig, fs)?;

    let band_level = band_rms_spectrum(&spectrum, band);
    let band_fraction =
        (2.0 * (band.high - band.low) / f64::from(band.sample_rate)).sqrt();
    let threshold = band_level * gain / band_fraction;
    debug!(band_level, threshold, "limiting spectrum");

    let mags: Vec<f64> = spectrum.iter().map(|c| c.norm()).collect();
    let targets = limit_targets(&mags, threshold, start, continuity, kind);

    match mode {
        PhaseMode::Linear => {
            for ((bin, &m), &t) in spectrum.iter_mut().zip(mags.iter()).zip(targets.iter()) {
                if t != m {
                    *bin = Complex64::from_polar(t, bin.arg());
                }
            }
        }
        PhaseMode::Minimum(strategy) => {
            let (ratios, log_gain) = correction_ratios(&mags, &targets, fs)?;
            apply_minimum_phase(fft, &mut spectrum, &ratios, log_gain, strategy)?;
        }
    }

    fft.inverse(&mut spectrum)?;
    for (out, bin) in sig.iter_mut().zip(spectrum.iter()) {
        *out = bin.re;
    }
    Ok(())
}

/// Target magnitude per bin. Untouched bins hold the measured magnitude
/// bit for bit, so the caller can tell them apart by exact comparison.
fn limit_targets(
    mags: &[f64],
    threshold: f64,
    start: f64,
    continuity: Continuity,
    kind: Kind,
) -> Vec<f64> {
    let fs = mags.len();
    let mut targets = mags.to_vec();

    if start >= 1.0 {
        for (t, &m) in targets.iter_mut().zip(mags.iter()) {
            let clamp = match kind {
                Kind::Dip => m < threshold,
                Kind::Peak => m > threshold,
            };
            if clamp {
                *t = threshold;
            }
        }
        return targets;
    }

    // Compression region boundary and its span down (or up) to the
    // threshold.
    let (sl, g) = match kind {
        Kind::Dip => (threshold / start, threshold / start - threshold),
        Kind::Peak => (start * threshold, threshold - start * threshold),
    };

    match continuity {
        Continuity::Smooth => {
            for (t, &m) in targets.iter_mut().zip(mags.iter()) {
                match kind {
                    Kind::Dip if m < sl => *t = smooth_dip(m, sl, g),
                    Kind::Peak if m > sl => *t = smooth_peak(m, sl, g),
                    _ => {}
                }
            }
        }
        Continuity::LocalExtremum => {
            // The compression factor is recomputed at the start of each
            // run of bins inside the limit region, from the run's own
            // extremum, so shallow excursions are compressed less.
            let mut extremum = -1.0f64;
            let mut mfactor = g;
            for i in 0..fs {
                let m = mags[i];
                let inside = match kind {
                    Kind::Dip => m < sl,
                    Kind::Peak => m > sl,
                };
                if inside {
                    if extremum < 0.0 {
                        extremum = m;
                        let mut level = m;
                        let mut j = i + 1;
                        while j < fs {
                            match kind {
                                Kind::Dip => {
                                    if level >= sl {
                                        break;
                                    }
                                    extremum = extremum.min(level);
                                }
                                Kind::Peak => {
                                    if level <= sl {
                                        break;
                                    }
                                    extremum = extremum.max(level);
                                }
                            }
                            level = mags[j];
                            j += 1;
                        }
                        mfactor = match kind {
                            Kind::Dip if extremum < threshold => sl - extremum,
                            Kind::Dip => sl - threshold,
                            Kind::Peak if extremum > threshold => extremum - sl,
                            Kind::Peak => threshold - sl,
                        };
                    }
                    let level = match kind {
                        Kind::Dip => (sl - m) / mfactor,
                        Kind::Peak => (m - sl) / mfactor,
                    };
                    targets[i] = match kind {
                        Kind::Dip => sl - g * level,
                        Kind::Peak => sl + g * level,
                    };
                } else {
                    extremum = -1.0;
                }
            }
        }
    }
    targets
}

/// Smooth dip gain curve below the compression boundary `sl`.
///
/// Maps magnitude `m < sl` to a level in `(threshold, sl]` with unit
/// derivative at `sl`, where `g = sl - threshold`.
fn smooth_dip(m: f64, sl: f64, g: f64) -> f64 {
    let l = (sl - m) / g;
    sl - g * (l / (1.0 + l))
}

/// Smooth peak gain curve above the compression boundary `sl`, with
/// `g = threshold - sl`.
fn smooth_peak(m: f64, sl: f64, g: f64) -> f64 {
    let l = (m - sl) / g;
    sl + g * (l / (1.0 + l))
}

/// Per-bin gain ratios and their logs for the minimum-phase correction.
///
/// A vanished magnitude cannot be corrected by a finite gain; such bins
/// saturate at the largest representable ratio.
fn correction_ratios(
    mags: &[f64],
    targets: &[f64],
    fs: usize,
) -> Result<(Vec<f64>, Vec<Complex64>), SpectralError> {
    let mut ratios = try_buffer::<f64>(fs)?;
    let mut log_gain = try_buffer::<Complex64>(fs)?;
    let mut saturated = false;
    for i in 0..fs {
        if mags[i] <= 0.0 {
            saturated = true;
            ratios[i] = f64::MAX;
            log_gain[i] = Complex64::new(f64::MAX.ln(), 0.0);
        } else {
            let r = targets[i] / mags[i];
            ratios[i] = r;
            log_gain[i] = Complex64::new(r.ln(), 0.0);
        }
    }
    if saturated {
        warn!("limit reached in minimum-phase filter computation");
    }
    Ok((ratios, log_gain))
}

/// Convolves the minimum-phase correction described by `ratios` and
/// `log_gain` onto `spectrum`, in place.
fn apply_minimum_phase(
    fft: &Fft,
    spectrum: &mut [Complex64],
    ratios: &[f64],
    log_gain: Vec<Complex64>,
    strategy: PhaseStrategy,
) -> Result<(), SpectralError> {
    match strategy {
        PhaseStrategy::Cepstrum => {
            let filter = cepstral_filter(fft, log_gain)?;
            for (bin, f) in spectrum.iter_mut().zip(filter.iter()) {
                *bin *= f;
            }
        }
        PhaseStrategy::Hilbert => {
            let phase = hilbert_phase(fft, log_gain)?;
            for ((bin, &r), p) in spectrum.iter_mut().zip(ratios.iter()).zip(phase.iter()) {
                *bin *= r * p.exp();
            }
        }
    }
    Ok(())
}

/// Blends the magnitude response of `sig` toward a constant level.
///
/// `flatness` in `[0, 1]`: 0 leaves only the constant level scaled by
/// `gain`, 1 leaves the response untouched apart from `gain`. The
/// constant level is the Euclidean norm of the signal. In minimum-phase
/// mode the flattening is applied as an inverse-magnitude minimum-phase
/// filter, so a fully flattened signal collapses toward an impulse.
pub fn norm_flatten(
    fft: &Fft,
    sig: &mut [f64],
    gain: f64,
    flatness: f64,
    mode: PhaseMode,
    os: Oversampling,
) -> Result<(), SpectralError> {
    let fs = os.transform_size(sig.len());
    let mut spectrum = fft.real_forward(sig, fs)?;
    let level = rms(sig);

    match mode {
        PhaseMode::Linear => {
            let g = (1.0 - flatness) * level;
            for bin in spectrum.iter_mut() {
                *bin = Complex64::from_polar(gain * (g + flatness * bin.norm()), bin.arg());
            }
        }
        PhaseMode::Minimum(strategy) => {
            let g = flatness * level;
            let mut ratios = try_buffer::<f64>(fs)?;
            let mut log_gain = try_buffer::<Complex64>(fs)?;
            let mut saturated = false;
            for i in 0..fs {
                let m = spectrum[i].norm();
                if m <= 0.0 {
                    saturated = true;
                    ratios[i] = f64::MAX;
                    log_gain[i] = Complex64::new(f64::MAX.ln(), 0.0);
                } else {
                    let r = gain / (g + (1.0 - flatness) * m);
                    ratios[i] = r;
                    log_gain[i] = Complex64::new(r.ln(), 0.0);
                }
            }
            if saturated {
                warn!("limit reached in minimum-phase filter computation");
            }
            apply_minimum_phase(fft, &mut spectrum, &ratios, log_gain, strategy)?;
        }
    }

    fft.inverse(&mut spectrum)?;
    for (out, bin) in sig.iter_mut().zip(spectrum.iter()) {
        *out = bin.re;
    }
    Ok(())
}
