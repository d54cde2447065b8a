//! Selective inversion of a minimum-phase / excess-phase pair.
//!
//! Inverting the excess-phase (all-pass) part of a response time-reverses
//! it, which turns room reflections into energy arriving before the main
//! impulse. Pre-echo is far more audible than the tail it corrects, so
//! every strategy here inverts the excess phase only selectively: fully
//! where it is safe, backing off toward a plain delay where inversion
//! would smear energy ahead of the arrival.
//!
//! All strategies share the same composition: the final spectrum is the
//! selectively inverted excess phase divided by the minimum-phase
//! spectrum, and the filter is extracted from the circular result
//! centered on the combined group delay.

use std::f64::consts::PI;

use nivela_fft::{Complex64, Fft, Oversampling, try_buffer};
use nivela_spectral::shape::{PhaseMode, PhaseStrategy, norm_flatten};
use tracing::debug;

use crate::InvertError;

/// Which edge of a window region a taper falls off over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Fade in over the leading edge.
    Left,
    /// Fade out over the trailing edge.
    Right,
    /// Fade on both edges.
    Both,
}

/// A smooth taper applied over the edges of a buffer region.
///
/// `space` samples in the middle of the region pass unmodified; the
/// remaining samples are scaled down toward zero at the region edges
/// named by `side`.
pub trait Taper {
    /// Tapers `region` in place.
    ///
    /// When `space >= region.len()` the taper has no room and
    /// implementations must leave `region` unchanged.
    fn apply(&self, region: &mut [f64], space: usize, side: Side);
}

/// Frequency-dependent smoothing of a pre-echo boundary.
///
/// Instead of cutting the pre-echo region with a single window, the
/// boundary can be filtered so low frequencies keep a wider aperture than
/// highs, trading inaudible low-frequency pre-echo for better correction.
pub trait SlidingLowpass {
    /// Filter length in taps; always odd.
    fn filter_len(&self) -> usize;

    /// Filters `input` with the aperture narrowing from `input.len()`
    /// down to `transition` samples toward the edge named by `side`.
    /// The output is `input.len() + filter_len() - 1` samples with the
    /// input centered.
    fn prefilter(&self, input: &[f64], transition: usize, side: Side) -> Vec<f64>;
}

/// Pre-echo truncation of an inverted excess-phase component.
///
/// `lower_window` is the full pre-echo aperture kept ahead of the
/// arrival, `upper_window` the part of it preserved untouched; the span
/// between them is tapered or prefiltered away. Requires
/// `upper_window <= lower_window <= ep_len / 2`.
pub struct TruncationPolicy<'a> {
    /// Pre-echo aperture in samples.
    pub lower_window: usize,
    /// Untouched inner aperture in samples.
    pub upper_window: usize,
    /// Edge taper for the removal boundary.
    pub taper: &'a dyn Taper,
    /// Optional sliding-lowpass boundary smoothing; `None` cuts hard at
    /// the taper.
    pub prefilter: Option<&'a dyn SlidingLowpass>,
    /// When set, re-flatten the truncated inverse to minimum phase with
    /// this flatness factor in `[0, 1]`.
    pub flatness: Option<f64>,
}

/// Strategy for the selective excess-phase inversion.
pub enum EpInversion<'a> {
    /// Weight each bin by its normalized excess-phase magnitude: bins the
    /// all-pass barely touches are inverted fully, heavily smeared bins
    /// fall back toward a plain half-length delay. `effort` biases the
    /// weighting, positive toward inversion, negative toward the delay.
    Indirect {
        /// Weighting bias.
        effort: f64,
    },
    /// Measure the actual pre-echo of the inverted excess phase in the
    /// time domain and weight the inversion by the measured spectrum.
    Direct {
        /// Weighting bias, as in `Indirect`.
        effort: f64,
        /// Samples ahead of the arrival where the pre-echo region ends.
        start: usize,
        /// Taper transition length in samples.
        transition: usize,
        /// Edge taper for the measured pre-echo window.
        taper: &'a dyn Taper,
    },
    /// Truncate the pre-echo of the time-reversed excess phase directly.
    Truncation(TruncationPolicy<'a>),
    /// Truncate relative to an external all-pass reference: the inverse
    /// is convolved with the reference, truncated, and the reference
    /// phase deconvolved back out, so pre-echo is bounded relative to the
    /// reference rather than to a pure impulse.
    ReferenceTruncation {
        /// Zero-delay-aligned all-pass reference response.
        reference: &'a [f64],
        /// Truncation against the reference.
        reference_policy: TruncationPolicy<'a>,
        /// Final truncation of the deconvolved result.
        policy: TruncationPolicy<'a>,
    },
}

/// Derives an `inv_len`-tap inverse filter from a minimum-phase /
/// excess-phase pair, bounding pre-echo per `policy`.
///
/// `mp` must already be shaped to an invertible magnitude (dips limited);
/// its inverse is composed exactly. The extraction is centered on the
/// combined length of the components and the filter.
pub fn selective_invert(
    fft: &Fft,
    mp: &[f64],
    ep: &[f64],
    inv_len: usize,
    policy: &EpInversion<'_>,
    os: Oversampling,
) -> Result<Vec<f64>, InvertError> {
    let sig_len = mp.len().max(ep.len()).max(inv_len);
    let fs = os.transform_size(sig_len);

    let ep_spec = match policy {
        EpInversion::Indirect { effort } => indirect_spectrum(fft, ep, fs, *effort)?,
        EpInversion::Direct {
            effort,
            start,
            transition,
            taper,
        } => direct_spectrum(fft, ep, fs, *effort, *start, *transition, *taper)?,
        EpInversion::Truncation(policy) => {
            let mut inverse = reversed_ep(ep, fs)?;
            truncate(fft, &mut inverse, ep.len(), policy, true)?;
            let mut spec = try_buffer::<Complex64>(fs)?;
            for (c, &x) in spec.iter_mut().zip(inverse.iter()) {
                *c = Complex64::new(x, 0.0);
            }
            fft.forward(&mut spec)?;
            spec
        }
        EpInversion::ReferenceTruncation {
            reference,
            reference_policy,
            policy,
        } => reference_truncation_spectrum(fft, ep, fs, reference, reference_policy, policy)?,
    };

    let mut composed = fft.real_forward(mp, fs)?;
    let phase_only = matches!(
        policy,
        EpInversion::Indirect { .. } | EpInversion::Direct { .. }
    );
    for (bin, e) in composed.iter_mut().zip(ep_spec.iter()) {
        let num = if phase_only {
            Complex64::from_polar(1.0, e.arg())
        } else {
            *e
        };
        *bin = num / *bin;
    }

    fft.inverse(&mut composed)?;

    let span = (mp.len() + ep.len() + inv_len) as isize;
    let mut j = (1 + 2 * fs as isize - span / 2).rem_euclid(fs as isize) as usize;
    let mut out = try_buffer::<f64>(inv_len)?;
    for o in out.iter_mut() {
        *o = composed[j].re;
        j = (j + 1) % fs;
    }
    Ok(out)
}

/// Signed rational remapping of the effort bias into a blend coefficient
/// in `(-1, 0]`.
fn effort_coefficient(effort: f64) -> f64 {
    if effort >= 0.0 {
        -effort / (1.0 + effort)
    } else {
        effort / (effort - 1.0)
    }
}

/// Blended selective spectrum: magnitude-`w` inversion of the
/// excess-phase bin plus a `(1 - w)` share of a half-length linear-phase
/// delay.
fn blend_bin(ep_bin: Complex64, w: f64, k: usize, ep_len: usize, fs: usize) -> Complex64 {
    Complex64::from_polar(w, -ep_bin.arg())
        + Complex64::from_polar(1.0 - w, (k as f64 * PI * ep_len as f64) / fs as f64)
}

fn indirect_spectrum(
    fft: &Fft,
    ep: &[f64],
    fs: usize,
    effort: f64,
) -> Result<Vec<Complex64>, InvertError> {
    let mut spec = fft.real_forward(ep, fs)?;
    let emax = spec.iter().map(|c| c.norm()).fold(0.0, f64::max);
    let ef = effort_coefficient(effort);
    debug!(ef, "indirect selective inversion");

    let ep_len = ep.len();
    for (k, bin) in spec.iter_mut().enumerate() {
        let normalized = if emax > 0.0 { bin.norm() / emax } else { 0.0 };
        let w = if normalized <= 0.0 {
            0.0
        } else if normalized >= 1.0 {
            1.0
        } else {
            let r = normalized.sqrt();
            (r * (1.0 + ef)) / (1.0 + r * ef)
        };
        *bin = blend_bin(*bin, w, k, ep_len, fs);
    }
    Ok(spec)
}

fn direct_spectrum(
    fft: &Fft,
    ep: &[f64],
    fs: usize,
    effort: f64,
    start: usize,
    transition: usize,
    taper: &dyn Taper,
) -> Result<Vec<Complex64>, InvertError> {
    let ep_len = ep.len();

    // Inverting an all-pass is conjugating its phase; in time that is the
    // reversal, so its pre-echo sits at the tail of the circular buffer.
    let mut inverse = fft.real_forward(ep, fs)?;
    for bin in inverse.iter_mut() {
        *bin = Complex64::from_polar(1.0, -bin.arg());
    }
    fft.inverse(&mut inverse)?;

    // Isolate the pre-echo region, everything earlier than `start`
    // samples ahead of the arrival. A `start` at or past half the
    // excess-phase length leaves nothing to measure; the weighting then
    // falls back to full inversion.
    let half = ep_len / 2;
    let mut pre = try_buffer::<f64>(fs)?;
    if start < half {
        for i in (fs - ep_len)..fs - (start + half) {
            pre[i] = inverse[i].re;
        }
        let region = half - start;
        let space = half.saturating_sub(2 * transition);
        taper.apply(&mut pre[fs - ep_len..fs - ep_len + region], space, Side::Both);
    }

    // Measured pre-echo spectrum drives the weighting.
    let mut pre_spec = try_buffer::<Complex64>(fs)?;
    for (c, &x) in pre_spec.iter_mut().zip(pre.iter()) {
        *c = Complex64::new(x, 0.0);
    }
    fft.forward(&mut pre_spec)?;
    let emax = pre_spec.iter().map(|c| c.norm()).fold(0.0, f64::max);
    let ef = effort_coefficient(effort);
    debug!(ef, "direct selective inversion");

    let mut spec = fft.real_forward(ep, fs)?;
    for (k, (bin, pre_bin)) in spec.iter_mut().zip(pre_spec.iter()).enumerate() {
        let normalized = if emax > 0.0 { pre_bin.norm() / emax } else { 0.0 };
        // Inverted sense: bins with heavy measured pre-echo get the
        // delay, clean bins get the full inversion.
        let w = if normalized <= 0.0 {
            1.0
        } else if normalized >= 1.0 {
            0.0
        } else {
            let r = 1.0 - normalized.sqrt();
            (r * (1.0 + ef)) / (1.0 + r * ef)
        };
        *bin = blend_bin(*bin, w, k, ep_len, fs);
    }
    Ok(spec)
}

/// Excess phase reversed into the tail of an `fs`-sample buffer, which is
/// its circular inverse up to the phase-only approximation.
fn reversed_ep(ep: &[f64], fs: usize) -> Result<Vec<f64>, InvertError> {
    let mut buf = try_buffer::<f64>(fs)?;
    for (i, &x) in ep.iter().enumerate() {
        buf[fs - 1 - i] = x;
    }
    Ok(buf)
}

/// Removes the pre-echo region of a reversed excess-phase inverse in
/// place, hard or through the policy's sliding-lowpass boundary.
fn truncate(
    fft: &Fft,
    buf: &mut [f64],
    ep_len: usize,
    policy: &TruncationPolicy<'_>,
    flatten: bool,
) -> Result<(), InvertError> {
    let fs = buf.len();
    let window = policy.lower_window + ep_len / 2;
    let begin = fs - window;
    let space = window - 2 * (policy.lower_window - policy.upper_window);

    match policy.prefilter {
        None => {
            for x in &mut buf[..begin] {
                *x = 0.0;
            }
            policy.taper.apply(&mut buf[begin..], space, Side::Left);
        }
        Some(pf) => {
            debug!("inverted EP sliding lowpass pre-echo windowing");
            let mut filtered = pf.prefilter(
                &buf[begin..begin + 2 * policy.lower_window],
                2 * policy.upper_window,
                Side::Left,
            );
            let half = filtered.len() / 2;
            policy.taper.apply(
                &mut filtered[half - policy.lower_window..half + policy.lower_window],
                2 * policy.upper_window,
                Side::Left,
            );
            for x in &mut buf[..begin] {
                *x = 0.0;
            }
            buf[begin..begin + policy.lower_window]
                .copy_from_slice(&filtered[half - policy.lower_window..half]);
            debug!("pre-echo truncation inversion completion");
        }
    }

    if flatten
        && let Some(flatness) = policy.flatness
    {
        norm_flatten(
            fft,
            buf,
            1.0,
            flatness,
            PhaseMode::Minimum(PhaseStrategy::Cepstrum),
            Oversampling::None,
        )?;
    }
    Ok(())
}

fn reference_truncation_spectrum(
    fft: &Fft,
    ep: &[f64],
    fs: usize,
    reference: &[f64],
    reference_policy: &TruncationPolicy<'_>,
    policy: &TruncationPolicy<'_>,
) -> Result<Vec<Complex64>, InvertError> {
    let ep_len = ep.len();
    let mut inverse = reversed_ep(ep, fs)?;

    // Reference spectrum, aligned for zero delay: the second half wraps
    // to the front of the buffer.
    let half = reference.len() / 2;
    let mut ref_spec = try_buffer::<Complex64>(fs)?;
    for i in 0..half {
        ref_spec[fs - half + i] = Complex64::new(reference[i], 0.0);
        ref_spec[i] = Complex64::new(reference[half + i], 0.0);
    }
    fft.forward(&mut ref_spec)?;

    // Convolve the inverse with the reference, truncate against it, then
    // deconvolve the reference phase back out.
    let mut work = try_buffer::<Complex64>(fs)?;
    for (c, &x) in work.iter_mut().zip(inverse.iter()) {
        *c = Complex64::new(x, 0.0);
    }
    fft.forward(&mut work)?;
    for (bin, r) in work.iter_mut().zip(ref_spec.iter()) {
        *bin *= r;
    }
    fft.inverse(&mut work)?;
    for (x, bin) in inverse.iter_mut().zip(work.iter()) {
        *x = bin.re;
    }

    truncate(
        fft,
        &mut inverse,
        ep_len,
        reference_policy,
        reference_policy.prefilter.is_some(),
    )?;

    for (c, &x) in work.iter_mut().zip(inverse.iter()) {
        *c = Complex64::new(x, 0.0);
    }
    fft.forward(&mut work)?;
    for (bin, r) in work.iter_mut().zip(ref_spec.iter()) {
        *bin *= Complex64::from_polar(1.0, -r.arg());
    }
    fft.inverse(&mut work)?;
    for (x, bin) in inverse.iter_mut().zip(work.iter()) {
        *x = bin.re;
    }

    truncate(fft, &mut inverse, ep_len, policy, true)?;

    for (c, &x) in work.iter_mut().zip(inverse.iter()) {
        *c = Complex64::new(x, 0.0);
    }
    fft.forward(&mut work)?;
    Ok(work)
}
