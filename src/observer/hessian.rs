//! Hessian-proxy accumulation and damped inversion
//!
//! The Hessian proxy for a layer is `H = (2/n) Σ x xᵀ` over observed input
//! activations, an approximation of the loss curvature with respect to the
//! layer's weights. Accumulation renormalizes by sample count each update
//! so the magnitude stays bounded over arbitrarily many samples.
//!
//! Everything here runs in f64 regardless of the model's native precision;
//! the reconstruction engines cast back to f32 only when emitting weights.

use ndarray::Array2;

/// Running outer-product accumulator for one layer's input activations.
///
/// Owned exclusively by the engine processing the layer; dropped after
/// finalize. Never persisted.
#[derive(Clone, Debug)]
pub struct HessianAccumulator {
    h: Array2<f64>,
    dim: usize,
    samples: usize,
}

impl HessianAccumulator {
    /// Create an accumulator for input activations of width `dim`.
    pub fn new(dim: usize) -> Self {
        Self { h: Array2::zeros((dim, dim)), dim, samples: 0 }
    }

    /// Input activation width.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of samples folded in.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Fold one sample's input activation row into the accumulator.
    ///
    /// # Panics
    ///
    /// Panics if `x.len()` does not match the accumulator dimension.
    pub fn update(&mut self, x: &[f32]) {
        assert_eq!(x.len(), self.dim, "activation width {} does not match {}", x.len(), self.dim);

        // Renormalize the running sum, then add the scaled outer product:
        // H <- H * n/(n+1); H += (2/(n+1)) x x^T
        let n = self.samples as f64;
        self.h.mapv_inplace(|v| v * (n / (n + 1.0)));
        self.samples += 1;

        let scale = (2.0 / self.samples as f64).sqrt();
        let row: Vec<f64> = x.iter().map(|&v| f64::from(v) * scale).collect();
        for (i, &xi) in row.iter().enumerate() {
            for (j, &xj) in row.iter().enumerate() {
                self.h[[i, j]] += xi * xj;
            }
        }
    }

    /// Borrow the raw accumulator.
    pub fn matrix(&self) -> &Array2<f64> {
        &self.h
    }

    /// Consume the accumulator, returning the raw matrix.
    pub fn into_matrix(self) -> Array2<f64> {
        self.h
    }
}

/// Lower-triangular Cholesky factor of a symmetric positive-definite
/// matrix, or `None` if the matrix is singular (a non-positive pivot).
pub(crate) fn cholesky_lower(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[[i, j]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }
    Some(l)
}

/// Invert a symmetric positive-definite matrix from its lower Cholesky
/// factor: `A^{-1} = L^{-T} L^{-1}`.
fn invert_from_cholesky(l: &Array2<f64>) -> Array2<f64> {
    let n = l.nrows();

    // Forward-substitute L^{-1} column by column
    let mut l_inv = Array2::<f64>::zeros((n, n));
    for col in 0..n {
        l_inv[[col, col]] = 1.0 / l[[col, col]];
        for i in col + 1..n {
            let mut sum = 0.0;
            for k in col..i {
                sum -= l[[i, k]] * l_inv[[k, col]];
            }
            l_inv[[i, col]] = sum / l[[i, i]];
        }
    }

    // A^{-1} = L^{-T} L^{-1}; exploit that L^{-1} is lower triangular
    let mut inv = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            let start = i.max(j);
            let mut sum = 0.0;
            for k in start..n {
                sum += l_inv[[k, i]] * l_inv[[k, j]];
            }
            inv[[i, j]] = sum;
        }
    }
    inv
}

/// Upper-triangular Cholesky factor of the damped inverse Hessian.
///
/// Applies `H' = H + λ·mean(diag(H))·I`, inverts via Cholesky, then
/// factors the inverse as `H'^{-1} = Uᵀ U`. The reconstruction engines
/// consume `U`: its diagonal carries the per-column error denominators and
/// its rows carry the correction directions.
///
/// Returns `None` if the damped matrix is still singular.
pub(crate) fn damped_inverse_cholesky(h: &Array2<f64>, damp_percent: f64) -> Option<Array2<f64>> {
    let n = h.nrows();
    if n == 0 {
        return None;
    }

    let mean_diag = (0..n).map(|i| h[[i, i]]).sum::<f64>() / n as f64;
    let damp = damp_percent * mean_diag;

    let mut damped = h.clone();
    for i in 0..n {
        damped[[i, i]] += damp;
    }

    let l = cholesky_lower(&damped)?;
    let inv = invert_from_cholesky(&l);
    let l_inv = cholesky_lower(&inv)?;
    Some(l_inv.reversed_axes())
}
