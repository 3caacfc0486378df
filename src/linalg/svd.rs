//! Dense singular value decomposition (one-sided Golub–Reinsch).
//!
//! Householder reduction to bidiagonal form followed by implicit-shift QR
//! diagonalization, accumulating the left and right transforms in place.
//! For an `m × n` input with `m ≥ n` the result satisfies
//! `A ≈ U · diag(S) · Vᵀ` with `U: m×n`, `S: n`, `V: n×n`.
//!
//! Numerical policy:
//! - `eps = 2⁻⁵²`, Householder tolerance `1e-64 / eps`;
//! - singular values below `eps · max|qᵢ + eᵢ|` are snapped to zero;
//! - each singular value gets at most [`MAX_SWEEPS`] QR sweeps. Running out is
//!   not fatal: the best-so-far value is kept and [`Svd::converged`] is false.
//!
//! Inputs with more columns than rows go through the "robust" path: `Aᵀ` is
//! decomposed instead and [`Svd::transposed`] tells the caller so.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::error::{LocalizeError, Result};

/// Maximum implicit QR sweeps spent on one singular value.
pub const MAX_SWEEPS: usize = 50;

const EPSILON: f64 = f64::EPSILON; // 2^-52
const TOLERANCE: f64 = 1.0e-64 / EPSILON;

/// Result of [`svd`].
#[derive(Debug, Clone)]
pub struct Svd {
    /// Left singular vectors, one per column (`m × n`).
    pub u: DMatrix<f64>,
    /// Singular values in descending order.
    pub s: DVector<f64>,
    /// Right singular vectors, one per column (`n × n`).
    pub v: DMatrix<f64>,
    /// `order[r]` is the column index, before sorting, of the `r`-th largest
    /// singular value.
    pub order: Vec<usize>,
    /// True when the decomposition is of `Aᵀ` because `A` had fewer rows than
    /// columns. In that case `Aᵀ ≈ U · diag(S) · Vᵀ`.
    pub transposed: bool,
    /// False if some singular value hit the sweep cap.
    pub converged: bool,
}

impl Svd {
    /// Rebuild `U · diag(S) · Vᵀ` (the decomposed matrix, i.e. `Aᵀ` when
    /// [`transposed`](Self::transposed) is set).
    pub fn reconstruct(&self) -> DMatrix<f64> {
        let mut us = self.u.clone();
        for (c, &sv) in self.s.iter().enumerate() {
            us.column_mut(c).scale_mut(sv);
        }
        us * self.v.transpose()
    }

    /// Number of singular values above `tol`.
    pub fn rank(&self, tol: f64) -> usize {
        self.s.iter().filter(|&&v| v > tol).count()
    }

    /// Strict form: [`LocalizeError::NonConvergence`] when some singular value
    /// hit the sweep cap.
    pub fn ensure_converged(&self) -> Result<()> {
        if self.converged {
            Ok(())
        } else {
            Err(LocalizeError::NonConvergence {
                iterations: MAX_SWEEPS,
            })
        }
    }
}

/// `sqrt(a² + b²)` without destructive overflow or underflow.
#[inline]
fn pythag(a: f64, b: f64) -> f64 {
    let a = a.abs();
    let b = b.abs();
    if a > b {
        a * (1.0 + (b * b / a / a)).sqrt()
    } else if b == 0.0 {
        a
    } else {
        b * (1.0 + (a * a / b / b)).sqrt()
    }
}

/// Decompose `a`. See the module documentation for the contract.
pub fn svd(a: &DMatrix<f64>) -> Svd {
    if a.nrows() < a.ncols() {
        debug!(
            "SVD: {}x{} input has fewer rows than columns, decomposing the transpose",
            a.nrows(),
            a.ncols()
        );
        let mut out = golub_reinsch(&a.transpose());
        out.transposed = true;
        return out;
    }
    golub_reinsch(a)
}

fn golub_reinsch(a: &DMatrix<f64>) -> Svd {
    let m = a.nrows();
    let n = a.ncols();
    let mut u = a.clone();
    let mut e = vec![0.0f64; n];
    let mut q = vec![0.0f64; n];
    let mut v = DMatrix::<f64>::zeros(n, n);

    if n == 0 {
        return Svd {
            u,
            s: DVector::zeros(0),
            v,
            order: Vec::new(),
            transposed: false,
            converged: true,
        };
    }

    let mut f: f64;
    let mut g = 0.0f64;
    let mut h: f64;
    let mut x = 0.0f64;
    let mut y: f64;
    let mut z: f64;
    let mut s: f64;
    let mut l = 0usize;

    // ── Householder reduction to bidiagonal form ──
    for i in 0..n {
        e[i] = g;
        s = 0.0;
        l = i + 1;
        for j in i..m {
            s += u[(j, i)] * u[(j, i)];
        }
        if s <= TOLERANCE {
            g = 0.0;
        } else {
            f = u[(i, i)];
            g = s.sqrt();
            if f >= 0.0 {
                g = -g;
            }
            h = f * g - s;
            u[(i, i)] = f - g;
            for j in l..n {
                s = 0.0;
                for k in i..m {
                    s += u[(k, i)] * u[(k, j)];
                }
                f = s / h;
                for k in i..m {
                    u[(k, j)] += f * u[(k, i)];
                }
            }
        }
        q[i] = g;

        s = 0.0;
        for j in l..n {
            s += u[(i, j)] * u[(i, j)];
        }
        if s <= TOLERANCE {
            g = 0.0;
        } else {
            f = u[(i, i + 1)];
            g = s.sqrt();
            if f >= 0.0 {
                g = -g;
            }
            h = f * g - s;
            u[(i, i + 1)] = f - g;
            for j in l..n {
                e[j] = u[(i, j)] / h;
            }
            for j in l..m {
                s = 0.0;
                for k in l..n {
                    s += u[(j, k)] * u[(i, k)];
                }
                for k in l..n {
                    u[(j, k)] += s * e[k];
                }
            }
        }
        y = q[i].abs() + e[i].abs();
        if y > x {
            x = y;
        }
    }

    // ── Accumulate right-hand transformations ──
    for i in (0..n).rev() {
        if g != 0.0 {
            h = g * u[(i, i + 1)];
            for j in l..n {
                v[(j, i)] = u[(i, j)] / h;
            }
            for j in l..n {
                s = 0.0;
                for k in l..n {
                    s += u[(i, k)] * v[(k, j)];
                }
                for k in l..n {
                    v[(k, j)] += s * v[(k, i)];
                }
            }
        }
        for j in l..n {
            v[(i, j)] = 0.0;
            v[(j, i)] = 0.0;
        }
        v[(i, i)] = 1.0;
        g = e[i];
        l = i;
    }

    // ── Accumulate left-hand transformations ──
    for i in (0..n).rev() {
        l = i + 1;
        g = q[i];
        for j in l..n {
            u[(i, j)] = 0.0;
        }
        if g != 0.0 {
            h = u[(i, i)] * g;
            for j in l..n {
                s = 0.0;
                for k in l..m {
                    s += u[(k, i)] * u[(k, j)];
                }
                f = s / h;
                for k in i..m {
                    u[(k, j)] += f * u[(k, i)];
                }
            }
            for j in i..m {
                u[(j, i)] /= g;
            }
        } else {
            for j in i..m {
                u[(j, i)] = 0.0;
            }
        }
        u[(i, i)] += 1.0;
    }

    // ── Diagonalize the bidiagonal form ──
    let prec = EPSILON * x;
    let mut converged = true;
    for k in (0..n).rev() {
        for iteration in 0..MAX_SWEEPS {
            // Test for splitting. e[0] is always zero so the scan stops at l = 0.
            let mut split = false;
            let mut ll = k;
            loop {
                if e[ll].abs() <= prec {
                    split = true;
                    break;
                }
                if ll > 0 && q[ll - 1].abs() <= prec {
                    break;
                }
                if ll == 0 {
                    split = true;
                    break;
                }
                ll -= 1;
            }
            l = ll;

            if !split {
                // Cancel e[l]; l > 0 here.
                let mut c = 0.0;
                let mut sn = 1.0;
                let l1 = l - 1;
                for i in l..=k {
                    f = sn * e[i];
                    e[i] *= c;
                    if f.abs() <= prec {
                        break;
                    }
                    g = q[i];
                    h = pythag(f, g);
                    q[i] = h;
                    c = g / h;
                    sn = -f / h;
                    for j in 0..m {
                        y = u[(j, l1)];
                        z = u[(j, i)];
                        u[(j, l1)] = y * c + z * sn;
                        u[(j, i)] = -y * sn + z * c;
                    }
                }
            }

            z = q[k];
            if l == k {
                // Converged: make the singular value non-negative.
                if z < 0.0 {
                    q[k] = -z;
                    for j in 0..n {
                        v[(j, k)] = -v[(j, k)];
                    }
                }
                break;
            }

            if iteration + 1 >= MAX_SWEEPS {
                debug!(
                    "SVD: singular value {} did not converge after {} sweeps, keeping {:.3e}",
                    k, MAX_SWEEPS, q[k]
                );
                converged = false;
                if q[k] < 0.0 {
                    q[k] = -q[k];
                    for j in 0..n {
                        v[(j, k)] = -v[(j, k)];
                    }
                }
                break;
            }

            // Shift from the bottom 2×2 minor.
            x = q[l];
            y = q[k - 1];
            g = e[k - 1];
            h = e[k];
            f = ((y - z) * (y + z) + (g - h) * (g + h)) / (2.0 * h * y);
            g = pythag(f, 1.0);
            f = if f < 0.0 {
                ((x - z) * (x + z) + h * (y / (f - g) - h)) / x
            } else {
                ((x - z) * (x + z) + h * (y / (f + g) - h)) / x
            };

            // Next QR transformation.
            let mut c = 1.0;
            let mut sn = 1.0;
            for i in (l + 1)..=k {
                g = e[i];
                y = q[i];
                h = sn * g;
                g *= c;
                z = pythag(f, h);
                e[i - 1] = z;
                c = f / z;
                sn = h / z;
                f = x * c + g * sn;
                g = -x * sn + g * c;
                h = y * sn;
                y *= c;
                for j in 0..n {
                    x = v[(j, i - 1)];
                    z = v[(j, i)];
                    v[(j, i - 1)] = x * c + z * sn;
                    v[(j, i)] = -x * sn + z * c;
                }
                z = pythag(f, h);
                q[i - 1] = z;
                c = f / z;
                sn = h / z;
                f = c * g + sn * y;
                x = -sn * g + c * y;
                for j in 0..m {
                    y = u[(j, i - 1)];
                    z = u[(j, i)];
                    u[(j, i - 1)] = y * c + z * sn;
                    u[(j, i)] = -y * sn + z * c;
                }
            }
            e[l] = 0.0;
            e[k] = f;
            q[k] = x;
        }
    }

    for qi in q.iter_mut() {
        if *qi < prec {
            *qi = 0.0;
        }
    }

    // Descending order; stable so equal values keep their column order.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| q[b].partial_cmp(&q[a]).unwrap_or(std::cmp::Ordering::Equal));

    let s_sorted = DVector::from_iterator(n, order.iter().map(|&c| q[c]));
    let u_sorted = DMatrix::from_fn(m, n, |r, c| u[(r, order[c])]);
    let v_sorted = DMatrix::from_fn(n, n, |r, c| v[(r, order[c])]);

    Svd {
        u: u_sorted,
        s: s_sorted,
        v: v_sorted,
        order,
        transposed: false,
        converged,
    }
}
