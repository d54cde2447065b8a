//! Homomorphic deconvolution.
//!
//! Splits a real signal into a minimum-phase component, which carries the
//! full magnitude response, and an excess-phase all-pass component, which
//! carries whatever phase the minimum-phase part cannot. Circularly
//! convolving the two recovers the original signal.
//!
//! Two routes to the minimum-phase spectrum are provided. The cepstral
//! route windows the complex cepstrum to its causal half and exponentiates
//! back. The Hilbert route derives the minimum phase from the log
//! magnitude alone and reattaches the measured magnitude, which keeps it
//! exact even where the cepstral exponential saturates.

use nivela_fft::{Complex64, Fft, Oversampling, try_buffer};
use tracing::warn;

use crate::SpectralError;

/// Result of a full minimum-phase / excess-phase split.
#[derive(Debug, Clone)]
pub struct Decomposition {
    /// Minimum-phase component, same length as the input signal.
    pub minimum_phase: Vec<f64>,
    /// Excess-phase all-pass component, same length as the input signal.
    pub excess_phase: Vec<f64>,
}

/// Floor used in place of `ln(0)` when a spectral magnitude vanishes.
fn log_floor() -> f64 {
    f64::MIN_POSITIVE.ln()
}

/// Cepstral decomposition of `sig` into both components.
pub fn cepstral_decompose(
    fft: &Fft,
    sig: &[f64],
    os: Oversampling,
) -> Result<Decomposition, SpectralError> {
    let (mp, ep) = cepstral_parts(fft, sig, os, true, true)?;
    Ok(Decomposition {
        minimum_phase: mp.unwrap_or_default(),
        excess_phase: ep.unwrap_or_default(),
    })
}

/// Cepstral extraction of the minimum-phase component only.
pub fn cepstral_minimum_phase(
    fft: &Fft,
    sig: &[f64],
    os: Oversampling,
) -> Result<Vec<f64>, SpectralError> {
    let (mp, _) = cepstral_parts(fft, sig, os, true, false)?;
    Ok(mp.unwrap_or_default())
}

/// Cepstral extraction of the excess-phase component only.
pub fn cepstral_excess_phase(
    fft: &Fft,
    sig: &[f64],
    os: Oversampling,
) -> Result<Vec<f64>, SpectralError> {
    let (_, ep) = cepstral_parts(fft, sig, os, false, true)?;
    Ok(ep.unwrap_or_default())
}

/// Hilbert-transform decomposition of `sig` into both components.
pub fn hilbert_decompose(
    fft: &Fft,
    sig: &[f64],
    os: Oversampling,
) -> Result<Decomposition, SpectralError> {
    let (mp, ep) = hilbert_parts(fft, sig, os, true, true)?;
    Ok(Decomposition {
        minimum_phase: mp.unwrap_or_default(),
        excess_phase: ep.unwrap_or_default(),
    })
}

/// Hilbert-transform extraction of the minimum-phase component only.
pub fn hilbert_minimum_phase(
    fft: &Fft,
    sig: &[f64],
    os: Oversampling,
) -> Result<Vec<f64>, SpectralError> {
    let (mp, _) = hilbert_parts(fft, sig, os, true, false)?;
    Ok(mp.unwrap_or_default())
}

type Parts = (Option<Vec<f64>>, Option<Vec<f64>>);

fn cepstral_parts(
    fft: &Fft,
    sig: &[f64],
    os: Oversampling,
    want_mp: bool,
    want_ep: bool,
) -> Result<Parts, SpectralError> {
    let n = sig.len();
    let fs = os.transform_size(n);
    let spectrum = fft.real_forward(sig, fs)?;

    let mut log_mag = try_buffer::<Complex64>(fs)?;
    let mut log_limit = false;
    for (l, v) in log_mag.iter_mut().zip(spectrum.iter()) {
        let cv = v.norm();
        if cv <= 0.0 {
            log_limit = true;
            *l = Complex64::new(log_floor(), 0.0);
        } else {
            *l = Complex64::new(cv.ln(), 0.0);
        }
    }
    if log_limit {
        warn!("log limit reached in cepstrum computation");
    }

    let mut mp_spectrum = cepstral_filter(fft, log_mag)?;

    let ep = if want_ep {
        let mut ep_spectrum = try_buffer::<Complex64>(fs)?;
        for ((e, h), m) in ep_spectrum
            .iter_mut()
            .zip(spectrum.iter())
            .zip(mp_spectrum.iter())
        {
            *e = Complex64::from_polar(1.0, h.arg() - m.arg());
        }
        fft.inverse(&mut ep_spectrum)?;
        Some(ep_spectrum[..n].iter().map(|c| c.re).collect())
    } else {
        None
    };

    let mp = if want_mp {
        fft.inverse(&mut mp_spectrum)?;
        Some(mp_spectrum[..n].iter().map(|c| c.re).collect())
    } else {
        None
    };

    Ok((mp, ep))
}

fn hilbert_parts(
    fft: &Fft,
    sig: &[f64],
    os: Oversampling,
    want_mp: bool,
    want_ep: bool,
) -> Result<Parts, SpectralError> {
    let n = sig.len();
    let fs = os.transform_size(n);
    let spectrum = fft.real_forward(sig, fs)?;

    let mut log_mag = try_buffer::<Complex64>(fs)?;
    let mut mag = try_buffer::<f64>(fs)?;
    let mut log_limit = false;
    for ((l, m), v) in log_mag.iter_mut().zip(mag.iter_mut()).zip(spectrum.iter()) {
        let cv = v.norm();
        if cv <= f64::MIN_POSITIVE {
            log_limit = true;
            *l = Complex64::new(log_floor(), 0.0);
            *m = f64::MIN_POSITIVE;
        } else {
            *l = Complex64::new(cv.ln(), 0.0);
            *m = cv;
        }
    }
    if log_limit {
        warn!("log limit reached in Hilbert computation");
    }

    let phase = hilbert_phase(fft, log_mag)?;
    let mut mp_spectrum = phase;
    for (p, &m) in mp_spectrum.iter_mut().zip(mag.iter()) {
        *p = m * p.exp();
    }

    let ep = if want_ep {
        let mut ep_spectrum = try_buffer::<Complex64>(fs)?;
        for ((e, h), m) in ep_spectrum
            .iter_mut()
            .zip(spectrum.iter())
            .zip(mp_spectrum.iter())
        {
            *e = Complex64::from_polar(1.0, h.arg() - m.arg());
        }
        fft.inverse(&mut ep_spectrum)?;
        Some(ep_spectrum[..n].iter().map(|c| c.re).collect())
    } else {
        None
    };

    let mp = if want_mp {
        fft.inverse(&mut mp_spectrum)?;
        Some(mp_spectrum[..n].iter().map(|c| c.re).collect())
    } else {
        None
    };

    Ok((mp, ep))
}

/// Minimum-phase spectrum from a log-magnitude spectrum, cepstral route.
///
/// Takes the complex cepstrum of `log_spec`, windows it to its causal
/// half (doubling the strictly positive quefrencies, zeroing the negative
/// ones), transforms back and exponentiates. The input must be purely
/// real and even-symmetric for the result to be a valid spectrum.
pub(crate) fn cepstral_filter(
    fft: &Fft,
    mut log_spec: Vec<Complex64>,
) -> Result<Vec<Complex64>, SpectralError> {
    let fs = log_spec.len();
    fft.inverse(&mut log_spec)?;
    for v in log_spec.iter_mut().take(fs / 2).skip(1) {
        *v *= 2.0;
    }
    for v in log_spec.iter_mut().skip(fs / 2 + 1) {
        *v = Complex64::new(0.0, 0.0);
    }
    fft.forward(&mut log_spec)?;
    for v in log_spec.iter_mut() {
        *v = v.exp();
    }
    Ok(log_spec)
}

/// Minimum-phase rotation from a log-magnitude spectrum, Hilbert route.
///
/// Returns per bin `i·phi[k]` where `phi` is the minimum phase implied by
/// `log_spec`; exponentiating gives a pure phase factor, the magnitude is
/// reattached by the caller.
pub(crate) fn hilbert_phase(
    fft: &Fft,
    mut log_spec: Vec<Complex64>,
) -> Result<Vec<Complex64>, SpectralError> {
    let fs = log_spec.len();
    fft.inverse(&mut log_spec)?;
    for v in log_spec.iter_mut().skip(1 + fs / 2) {
        *v = -*v;
    }
    log_spec[0] = Complex64::new(0.0, 0.0);
    log_spec[fs / 2] = Complex64::new(0.0, 0.0);
    fft.forward(&mut log_spec)?;
    Ok(log_spec)
}
