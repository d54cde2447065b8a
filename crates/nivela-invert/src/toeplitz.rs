//! Symmetric Toeplitz solver.
//!
//! Levinson recursion in O(n²) time and O(n) scratch. The system matrix
//! is given by its first row; it must be positive definite, which for the
//! autocorrelation matrices arising in least-squares inverse filter
//! design holds whenever the signal has any energy.

use nivela_fft::try_buffer;

use crate::InvertError;

/// Solves `T x = b` where `T` is the symmetric Toeplitz matrix with first
/// row `first`.
///
/// Returns [`InvertError::Indefinite`] as soon as the prediction-error
/// power goes non-positive, which means a reflection coefficient left the
/// unit circle and the matrix is not positive definite.
pub fn solve(first: &[f64], rhs: &[f64]) -> Result<Vec<f64>, InvertError> {
    debug_assert_eq!(first.len(), rhs.len());
    let n = first.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut p_error = first[0];
    if p_error <= 0.0 {
        return Err(InvertError::Indefinite);
    }

    let mut x = try_buffer::<f64>(n)?;
    // Backward prediction filter of the current order.
    let mut ta = try_buffer::<f64>(n)?;

    x[0] = rhs[0] / p_error;
    for k in 0..n - 1 {
        let mut sum = first[k + 1];
        for i in 0..k {
            sum -= first[k - i] * ta[i];
        }
        let rc = -sum / p_error;

        // Equivalent to p_error * (1 - rc²); a sign change means rc has
        // magnitude above one.
        p_error += rc * sum;
        if p_error <= 0.0 {
            return Err(InvertError::Indefinite);
        }

        ta[k] = -rc;
        if k >= 1 {
            let (mut i, mut j) = (0, k - 1);
            while i < j {
                let tmp = ta[i] + rc * ta[j];
                ta[j] += rc * ta[i];
                ta[i] = tmp;
                i += 1;
                j -= 1;
            }
            if i == j {
                ta[i] += rc * ta[i];
            }
        }

        let mut sum = rhs[k + 1];
        for i in 0..=k {
            sum -= x[i] * first[k + 1 - i];
        }
        x[k + 1] = sum / p_error;
        for i in 0..=k {
            x[i] -= x[k + 1] * ta[k - i];
        }
    }

    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Dense multiply by the symmetric Toeplitz matrix with first row
    /// `first`.
    fn toeplitz_mul(first: &[f64], x: &[f64]) -> Vec<f64> {
        let n = first.len();
        (0..n)
            .map(|i| (0..n).map(|j| first[i.abs_diff(j)] * x[j]).sum())
            .collect()
    }

    #[test]
    fn solves_known_system() {
        let first = [2.0, 1.0, 0.0, 0.0];
        let rhs = [1.0, 0.0, 0.0, 0.0];
        let x = solve(&first, &rhs).unwrap();
        let b = toeplitz_mul(&first, &x);
        for (got, want) in b.iter().zip(rhs.iter()) {
            assert!((got - want).abs() < 1e-12, "residual {got} vs {want}");
        }
    }

    #[test]
    fn identity_system_returns_rhs() {
        let first = [1.0, 0.0, 0.0];
        let rhs = [0.3, -0.5, 2.0];
        let x = solve(&first, &rhs).unwrap();
        for (got, want) in x.iter().zip(rhs.iter()) {
            assert!((got - want).abs() < 1e-15);
        }
    }

    #[test]
    fn rejects_zero_diagonal() {
        assert!(matches!(
            solve(&[0.0, 1.0], &[1.0, 0.0]),
            Err(InvertError::Indefinite)
        ));
    }

    #[test]
    fn rejects_indefinite_system() {
        // Off-diagonal dominating the diagonal: reflection coefficient
        // leaves the unit circle at the first order update.
        assert!(matches!(
            solve(&[1.0, 2.0, 0.0], &[1.0, 0.0, 0.0]),
            Err(InvertError::Indefinite)
        ));
    }

    #[test]
    fn empty_system() {
        assert!(solve(&[], &[]).unwrap().is_empty());
    }
}
