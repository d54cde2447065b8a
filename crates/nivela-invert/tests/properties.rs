//! Property tests for filter synthesis.

use nivela_fft::{Fft, Oversampling};
use nivela_invert::kirkeby::{self, Effort};
use nivela_invert::toeplitz;
use proptest::prelude::*;

/// First rows of diagonally dominant symmetric Toeplitz matrices, which
/// are always positive definite.
fn dominant_first_row() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-0.1..0.1f64, 1..24).prop_map(|mut row| {
        row[0] = 4.0;
        row
    })
}

fn toeplitz_mul(first: &[f64], x: &[f64]) -> Vec<f64> {
    let n = first.len();
    (0..n)
        .map(|i| (0..n).map(|j| first[i.abs_diff(j)] * x[j]).sum())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn toeplitz_solution_satisfies_the_system(
        first in dominant_first_row(),
        seed in 0u64..1000,
    ) {
        // Deterministic rhs derived from the seed.
        let n = first.len();
        let rhs: Vec<f64> = (0..n)
            .map(|i| (((seed + i as u64) * 2_654_435_761) % 1000) as f64 / 500.0 - 1.0)
            .collect();

        let x = toeplitz::solve(&first, &rhs).unwrap();
        let b = toeplitz_mul(&first, &x);
        for (got, want) in b.iter().zip(rhs.iter()) {
            prop_assert!((got - want).abs() < 1e-8, "residual {} vs {}", got, want);
        }
    }

    #[test]
    fn unregularized_kirkeby_inverts_dominant_edge_signals(
        tail in prop::collection::vec(-0.02..0.02f64, 7..32),
    ) {
        let mut sig = vec![1.0];
        sig.extend_from_slice(&tail);
        let n = sig.len();

        let fft = Fft::new();
        let inv = kirkeby::invert(
            &fft,
            &sig,
            n,
            &Effort { factor: 0.0, shape: None },
            Oversampling::None,
        )
        .unwrap();

        let h = fft.real_forward(&sig, n).unwrap();
        let hi = fft.real_forward(&inv, n).unwrap();
        for k in 0..n {
            let p = h[k] * hi[k];
            prop_assert!((p.re - 1.0).abs() < 1e-8, "bin {} product {}", k, p);
            prop_assert!(p.im.abs() < 1e-8, "bin {} product {}", k, p);
        }
    }

    #[test]
    fn regularization_never_raises_peak_gain(
        tail in prop::collection::vec(-1.0..1.0f64, 7..32),
        factor in 0.001..1.0f64,
    ) {
        let mut sig = vec![1.0];
        sig.extend_from_slice(&tail);
        let n = sig.len();

        let fft = Fft::new();
        let free = kirkeby::invert(
            &fft,
            &sig,
            n,
            &Effort { factor: 0.0, shape: None },
            Oversampling::None,
        )
        .unwrap();
        let tamed = kirkeby::invert(
            &fft,
            &sig,
            n,
            &Effort { factor, shape: None },
            Oversampling::None,
        )
        .unwrap();

        let peak = |f: &[f64]| {
            fft.real_forward(f, n)
                .unwrap()
                .iter()
                .map(|c| c.norm())
                .fold(0.0, f64::max)
        };
        prop_assert!(peak(&tamed) <= peak(&free) * (1.0 + 1e-9));
    }
}
