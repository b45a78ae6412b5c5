//! The Durbin matrix algorithm (Marsaglia, Tsang and Wong), used for small
//! `n` and for `x` close to 0 up to `NKOLMO`.

const NORM: f64 = 1.0e140;
const INORM: f64 = 1.0e-140;
const LOGNORM: i32 = 140;

/// `Prob(D_n < d)` via the exact matrix-power method.
pub fn durbin_matrix(n: i64, d: f64) -> f64 {
    let k = (n as f64 * d) as i64 + 1;
    let m = (2 * k - 1) as usize;
    let h = k as f64 - n as f64 * d;

    let mut mat = vec![0.0f64; m * m];
    for i in 0..m {
        for j in 0..m {
            mat[i * m + j] = if (i as i64) - (j as i64) + 1 < 0 { 0.0 } else { 1.0 };
        }
    }
    for i in 0..m {
        mat[i * m] -= h.powi((i + 1) as i32);
        mat[(m - 1) * m + i] -= h.powi((m - i) as i32);
    }
    mat[(m - 1) * m] += if 2.0 * h - 1.0 > 0.0 { (2.0 * h - 1.0).powi(m as i32) } else { 0.0 };

    for i in 0..m {
        for j in 0..m {
            if (i as i64) - (j as i64) + 1 > 0 {
                for g in 1..=((i as i64) - (j as i64) + 1) {
                    mat[i * m + j] /= g as f64;
                }
            }
        }
    }

    let (q, mut e_q) = matrix_power(&mat, 0, m, n);
    let mut s = q[(k as usize - 1) * m + (k as usize - 1)];

    for i in 1..=n {
        s *= i as f64 / n as f64;
        if s < INORM {
            s *= NORM;
            e_q -= LOGNORM;
        }
    }
    s * 10f64.powi(e_q)
}

fn matrix_multiply(a: &[f64], b: &[f64], m: usize) -> Vec<f64> {
    let mut c = vec![0.0f64; m * m];
    for i in 0..m {
        for j in 0..m {
            let mut s = 0.0;
            for k in 0..m {
                s += a[i * m + k] * b[k * m + j];
            }
            c[i * m + j] = s;
        }
    }
    c
}

fn renormalize(v: &mut [f64], p: &mut i32) {
    for x in v.iter_mut() {
        *x *= INORM;
    }
    *p += LOGNORM;
}

/// Square-and-multiply matrix exponentiation with dynamic-range tracking via
/// a base-10 exponent, exactly as the reference recursion does.
fn matrix_power(a: &[f64], e_a: i32, m: usize, n: i64) -> (Vec<f64>, i32) {
    if n == 1 {
        return (a.to_vec(), e_a);
    }
    let (v, e_v) = matrix_power(a, e_a, m, n / 2);
    let mut b = matrix_multiply(&v, &v, m);
    let mut e_b = 2 * e_v;
    if b[(m / 2) * m + (m / 2)] > NORM {
        renormalize(&mut b, &mut e_b);
    }

    let (mut result, mut e_result) = if n % 2 == 0 {
        (b, e_b)
    } else {
        (matrix_multiply(a, &b, m), e_a + e_b)
    };

    if result[(m / 2) * m + (m / 2)] > NORM {
        renormalize(&mut result, &mut e_result);
    }
    (result, e_result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durbin_matrix_is_a_probability() {
        let p = durbin_matrix(30, 0.1);
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn durbin_matrix_increases_with_d() {
        let p1 = durbin_matrix(30, 0.05);
        let p2 = durbin_matrix(30, 0.2);
        assert!(p2 > p1);
    }
}
