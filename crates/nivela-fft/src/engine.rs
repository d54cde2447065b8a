//! In-place mixed-radix FFT with a per-size twiddle-factor cache.

use std::cell::{Ref, RefCell};
use std::f64::consts::PI;

use num_complex::Complex64;

use crate::buffer::try_buffer;
use crate::FftError;

/// Transform direction; selects the twiddle conjugation and the final
/// 1/n normalization.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Inverse,
}

/// Precomputed roots of unity for one transform size.
///
/// `roots[k] = e^{+2πik/size}`. Every sub-transform inside a size-`size`
/// decomposition works on a length `m` dividing `size`, so its roots are
/// the same table read at stride `size / m` and the cached values are
/// identical to direct computation.
struct TwiddleTable {
    size: usize,
    roots: Vec<Complex64>,
}

impl TwiddleTable {
    fn new(size: usize) -> Self {
        let step = 2.0 * PI / size as f64;
        let roots = (0..size)
            .map(|k| {
                let arg = step * k as f64;
                Complex64::new(arg.cos(), arg.sin())
            })
            .collect();
        Self { size, roots }
    }

    /// `e^{+2πi·i/m}` for `m` dividing the table size.
    fn root(&self, i: usize, m: usize) -> Complex64 {
        self.roots[(i % m) * (self.size / m)]
    }
}

/// Complex FFT engine.
///
/// Stateless over its inputs; the only state is a cache of trigonometric
/// tables for the most recently used transform size, rebuilt lazily when a
/// different size is requested. Construct one engine and share it by
/// reference; the reference pipeline is single-threaded, so the cache uses
/// a `RefCell` rather than a lock.
pub struct Fft {
    cache: RefCell<TwiddleTable>,
}

impl Default for Fft {
    fn default() -> Self {
        Self::new()
    }
}

impl Fft {
    /// Create a new engine with an empty twiddle cache.
    pub fn new() -> Self {
        Self {
            cache: RefCell::new(TwiddleTable::new(1)),
        }
    }

    fn table(&self, n: usize) -> Ref<'_, TwiddleTable> {
        if self.cache.borrow().size != n {
            *self.cache.borrow_mut() = TwiddleTable::new(n);
        }
        self.cache.borrow()
    }

    /// Forward transform of `p` in place, any length. Unnormalized.
    pub fn forward(&self, p: &mut [Complex64]) -> Result<(), FftError> {
        let n = p.len();
        if n < 2 {
            return Ok(());
        }
        if n.is_power_of_two() {
            self.forward_pow2(p);
            Ok(())
        } else {
            self.mixed_radix(p, Direction::Forward)
        }
    }

    /// Inverse transform of `p` in place, any length. Divides by the
    /// transform length, so `inverse(forward(x)) ≈ x`.
    pub fn inverse(&self, p: &mut [Complex64]) -> Result<(), FftError> {
        let n = p.len();
        if n < 2 {
            return Ok(());
        }
        if n.is_power_of_two() {
            self.inverse_pow2(p);
            Ok(())
        } else {
            self.mixed_radix(p, Direction::Inverse)
        }
    }

    /// Forward transform for power-of-two lengths.
    ///
    /// Pure radix-2 butterflies, no scratch allocation, slightly faster
    /// than the generic [`Fft::forward`].
    ///
    /// # Panics
    ///
    /// Panics if the length is not a power of two.
    pub fn forward_pow2(&self, p: &mut [Complex64]) {
        self.radix2(p, Direction::Forward);
    }

    /// Inverse transform for power-of-two lengths; divides by the length.
    ///
    /// # Panics
    ///
    /// Panics if the length is not a power of two.
    pub fn inverse_pow2(&self, p: &mut [Complex64]) {
        self.radix2(p, Direction::Inverse);
        let scale = 1.0 / p.len() as f64;
        for v in p.iter_mut() {
            *v *= scale;
        }
    }

    /// Zero-pad a real signal to `fs` samples and forward-transform it.
    ///
    /// Convenience entry point for the spectral crates: every operation
    /// there starts by lifting a real signal into a padded complex
    /// spectrum.
    pub fn real_forward(&self, sig: &[f64], fs: usize) -> Result<Vec<Complex64>, FftError> {
        let mut buf = try_buffer::<Complex64>(fs)?;
        for (out, &x) in buf.iter_mut().zip(sig.iter()) {
            *out = Complex64::new(x, 0.0);
        }
        self.forward(&mut buf)?;
        Ok(buf)
    }

    /// Direct O(n²) forward transform: polynomial evaluation at all n-th
    /// roots of unity. Exists as a reference path and for lengths where a
    /// fast decomposition is not worth the bookkeeping.
    pub fn dft(&self, p: &mut [Complex64]) -> Result<(), FftError> {
        let n = p.len();
        let table = self.table(n);
        let mut r = try_buffer::<Complex64>(n)?;
        for (i, out) in r.iter_mut().enumerate() {
            *out = poly_eval(p, table.root(i, n).conj());
        }
        p.copy_from_slice(&r);
        Ok(())
    }

    /// Direct O(n²) inverse transform; divides by the length.
    pub fn idft(&self, p: &mut [Complex64]) -> Result<(), FftError> {
        let n = p.len();
        let table = self.table(n);
        let mut r = try_buffer::<Complex64>(n)?;
        let scale = 1.0 / n as f64;
        for (i, out) in r.iter_mut().enumerate() {
            *out = poly_eval(p, table.root(i, n)) * scale;
        }
        p.copy_from_slice(&r);
        Ok(())
    }

    /// Radix-2 decimation-in-frequency with a final bit-reversal shuffle.
    fn radix2(&self, p: &mut [Complex64], dir: Direction) {
        let n = p.len();
        assert!(n.is_power_of_two(), "radix-2 transform requires a power-of-two length");
        if n < 2 {
            return;
        }
        let table = self.table(n);

        let mut span = n >> 1;
        for k in 0..span {
            let p0 = p[span + k];
            p[span + k] = p[k] - p0;
            p[k] += p0;
        }

        let mut i = 2;
        span >>= 1;
        while i < n {
            for j in 0..i {
                let root = match dir {
                    Direction::Forward => table.root(j, i << 1).conj(),
                    Direction::Inverse => table.root(j, i << 1),
                };
                let start = (radix2_reverse(j, i) << 1) * span;
                for k in start..start + span {
                    let p0 = root * p[span + k];
                    p[span + k] = p[k] - p0;
                    p[k] += p0;
                }
            }
            i <<= 1;
            span >>= 1;
        }

        radix2_shuffle(p);
    }

    /// Cooley-Tukey decomposition by the smallest prime factor of the
    /// remaining length. Radix-2 stages run as butterflies; larger radixes
    /// combine through Horner evaluation at the stage's roots of unity and
    /// need a radix-sized scratch buffer. A prime length collapses to a
    /// single direct-evaluation stage.
    fn mixed_radix(&self, p: &mut [Complex64], dir: Direction) -> Result<(), FftError> {
        let n = p.len();
        let table = self.table(n);

        let mut radix = first_factor(n);
        let mut i = 1;
        let mut span = n / radix;
        while i < n {
            let rp = i * radix;

            if radix == 2 {
                if i == 1 {
                    for k in 0..span {
                        let p0 = p[span + k];
                        p[span + k] = p[k] - p0;
                        p[k] += p0;
                    }
                } else {
                    for j in 0..i {
                        let root = match dir {
                            Direction::Forward => table.root(j, rp).conj(),
                            Direction::Inverse => table.root(j, rp),
                        };
                        let start = mixed_reverse(j, i) * radix * span;
                        for k in start..start + span {
                            let p0 = root * p[span + k];
                            p[span + k] = p[k] - p0;
                            p[k] += p0;
                        }
                    }
                }
            } else {
                let mut pt = try_buffer::<Complex64>(radix)?;
                for j in 0..i {
                    let start = mixed_reverse(j, i) * radix * span;
                    for k in start..start + span {
                        for (l, t) in pt.iter_mut().enumerate() {
                            *t = p[span * l + k];
                        }
                        for l in 0..radix {
                            let root = match dir {
                                Direction::Forward => table.root(l * i + j, rp).conj(),
                                Direction::Inverse => table.root(l * i + j, rp),
                            };
                            p[span * l + k] = poly_eval(&pt, root);
                        }
                    }
                }
            }

            i *= radix;
            radix = first_factor(span);
            span /= radix;
        }

        mixed_shuffle(p);

        if dir == Direction::Inverse {
            let scale = 1.0 / n as f64;
            for v in p.iter_mut() {
                *v *= scale;
            }
        }

        Ok(())
    }
}

/// Smallest prime factor of `n` by trial division up to √n; returns `n`
/// itself when prime and 1 when `n < 2`.
fn first_factor(n: usize) -> usize {
    if n < 2 {
        return 1;
    }
    if n % 2 == 0 {
        return 2;
    }
    let mut i = 3;
    while i <= n / i {
        if n % i == 0 {
            return i;
        }
        i += 2;
    }
    n
}

/// Horner evaluation of the polynomial with coefficients `p` at `x`.
fn poly_eval(p: &[Complex64], x: Complex64) -> Complex64 {
    let mut y = Complex64::new(0.0, 0.0);
    for &c in p.iter().rev() {
        y = x * y + c;
    }
    y
}

/// Bit reversal of `i` within the log2(n) digits of a power-of-two `n`.
fn radix2_reverse(i: usize, n: usize) -> usize {
    let mut ir = 0;
    let mut j = 1;
    let mut bit = n >> 1;
    while j < n {
        if i & j != 0 {
            ir |= bit;
        }
        j <<= 1;
        bit >>= 1;
    }
    ir
}

fn radix2_shuffle(p: &mut [Complex64]) {
    let n = p.len();
    for i in 0..n {
        let ir = radix2_reverse(i, n);
        if i < ir {
            p.swap(i, ir);
        }
    }
}

/// Mixed-radix digit reversal: the index permutation left behind by the
/// decimation stages. Reverses the digits of `i` in the mixed-radix
/// positional system given by the successive smallest prime factors of `n`.
fn mixed_reverse(i: usize, n: usize) -> usize {
    if n < 2 {
        return i;
    }
    let mut ir = 0;
    let mut radix = first_factor(n);
    let mut j = 1;
    let mut digit = n / radix;
    while j < n {
        ir += ((i / j) % radix) * digit;
        j *= radix;
        radix = first_factor(digit);
        digit /= radix;
    }
    ir
}

/// Reorder into natural order by following each element's orbit under
/// repeated digit reversal, swapping exactly once per orbit. The orbit is
/// entered only from its smallest index so no element moves twice.
fn mixed_shuffle(p: &mut [Complex64]) {
    let n = p.len();
    if n < 3 {
        return;
    }
    for i in 1..n - 1 {
        let mut ir = mixed_reverse(i, n);
        while i > ir {
            ir = mixed_reverse(ir, n);
        }
        if i == ir {
            let mut j = i;
            let mut ir = mixed_reverse(i, n);
            let temp = p[j];
            while i != ir {
                p[j] = p[ir];
                j = ir;
                ir = mixed_reverse(ir, n);
            }
            p[j] = temp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complex_buf(re: &[f64]) -> Vec<Complex64> {
        re.iter().map(|&x| Complex64::new(x, 0.0)).collect()
    }

    fn assert_close(a: &[Complex64], b: &[Complex64], tol: f64) {
        assert_eq!(a.len(), b.len());
        for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            assert!(
                (x - y).norm() < tol,
                "mismatch at {}: {} vs {}",
                i,
                x,
                y
            );
        }
    }

    #[test]
    fn first_factor_basics() {
        assert_eq!(first_factor(0), 1);
        assert_eq!(first_factor(1), 1);
        assert_eq!(first_factor(2), 2);
        assert_eq!(first_factor(9), 3);
        assert_eq!(first_factor(13), 13);
        assert_eq!(first_factor(35), 5);
    }

    #[test]
    fn impulse_transforms_to_flat_spectrum() {
        let fft = Fft::new();
        for n in [4usize, 6, 7, 12] {
            let mut p = complex_buf(&[1.0]);
            p.resize(n, Complex64::new(0.0, 0.0));
            fft.forward(&mut p).unwrap();
            for v in &p {
                assert!((v - Complex64::new(1.0, 0.0)).norm() < 1e-12);
            }
        }
    }

    #[test]
    fn dc_transforms_to_single_bin() {
        let fft = Fft::new();
        let mut p = complex_buf(&[1.0; 8]);
        fft.forward(&mut p).unwrap();
        assert!((p[0] - Complex64::new(8.0, 0.0)).norm() < 1e-12);
        for v in &p[1..] {
            assert!(v.norm() < 1e-12);
        }
    }

    #[test]
    fn roundtrip_assorted_lengths() {
        let fft = Fft::new();
        for n in [1usize, 2, 3, 5, 8, 9, 15, 16, 30, 31, 60, 101] {
            let orig: Vec<Complex64> = (0..n)
                .map(|i| Complex64::new((i as f64 * 0.7).sin(), (i as f64 * 1.3).cos()))
                .collect();
            let mut p = orig.clone();
            fft.forward(&mut p).unwrap();
            fft.inverse(&mut p).unwrap();
            assert_close(&p, &orig, 1e-9 * n as f64);
        }
    }

    #[test]
    fn pow2_path_matches_generic_dft() {
        let fft = Fft::new();
        let n = 32;
        let orig: Vec<Complex64> = (0..n)
            .map(|i| Complex64::new((i as f64).sin(), (i as f64 * 0.5).cos()))
            .collect();

        let mut fast = orig.clone();
        fft.forward_pow2(&mut fast);

        let mut direct = orig.clone();
        fft.dft(&mut direct).unwrap();

        assert_close(&fast, &direct, 1e-9);
    }

    #[test]
    fn mixed_radix_matches_direct_dft_for_prime_and_composite() {
        let fft = Fft::new();
        for n in [7usize, 12, 18, 45] {
            let orig: Vec<Complex64> = (0..n)
                .map(|i| Complex64::new((i as f64 * 0.9).cos(), (i as f64 * 0.2).sin()))
                .collect();

            let mut fast = orig.clone();
            fft.forward(&mut fast).unwrap();

            let mut direct = orig.clone();
            fft.dft(&mut direct).unwrap();

            assert_close(&fast, &direct, 1e-9);
        }
    }

    #[test]
    fn cache_reuse_across_sizes_is_transparent() {
        let fft = Fft::new();
        let run = |fft: &Fft, n: usize| {
            let mut p: Vec<Complex64> =
                (0..n).map(|i| Complex64::new(i as f64, 0.0)).collect();
            fft.forward(&mut p).unwrap();
            p
        };

        // Same size computed after an intervening different size must be
        // bit-identical.
        let a = run(&fft, 24);
        let _ = run(&fft, 64);
        let b = run(&fft, 24);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x, y);
        }
    }

    #[test]
    fn trivial_lengths_are_noops() {
        let fft = Fft::new();
        let mut empty: Vec<Complex64> = Vec::new();
        fft.forward(&mut empty).unwrap();

        let mut one = complex_buf(&[3.5]);
        fft.forward(&mut one).unwrap();
        assert_eq!(one[0], Complex64::new(3.5, 0.0));
        fft.inverse(&mut one).unwrap();
        assert_eq!(one[0], Complex64::new(3.5, 0.0));
    }
}
