//! Smirnov's stable formula for the upper tail of the KS+ one-sided
//! statistic, plus the cruder asymptotic it falls back to for very large `n`.

use super::special::log_factorial;

fn log1p(x: f64) -> f64 {
    (1.0 + x).ln()
}

/// Asymptotic approximation used only when `n > 200_000` — unreachable in
/// practice given the oracle's own `NKOLMO` bound, kept for completeness.
pub fn ks_plusbar_asymp(n: i64, x: f64) -> f64 {
    let t = 6.0 * n as f64 * x + 1.0;
    let z = t * t / (18.0 * n as f64);
    let mut v = 1.0 - (2.0 * z * z - 4.0 * z - 1.0) / (18.0 * n as f64);
    if v <= 0.0 {
        return 0.0;
    }
    v *= (-z).exp();
    if v >= 1.0 {
        1.0
    } else {
        v
    }
}

/// `Prob(D_n^+ >= x)` via Smirnov's numerically stable tail sum.
pub fn ks_plusbar_upper(n: i64, x: f64) -> f64 {
    const EPSILON: f64 = 1.0E-12;

    if n > 200_000 {
        return ks_plusbar_asymp(n, x);
    }

    let mut jmax = (n as f64 * (1.0 - x)) as i64;
    if 1.0 - x - jmax as f64 / n as f64 <= 0.0 {
        jmax -= 1;
    }

    let jdiv = if n > 3000 { 2 } else { 3 };

    let mut sum = 0.0f64;

    let mut j = jmax / jdiv + 1;
    let mut log_com = log_factorial(n) - log_factorial(j) - log_factorial(n - j);
    let log_jmax = log_com;

    while j <= jmax {
        let q = j as f64 / n as f64 + x;
        let term = log_com + (j - 1) as f64 * q.ln() + (n - j) as f64 * log1p(-q);
        let t = term.exp();
        sum += t;
        log_com += ((n - j) as f64 / (j + 1) as f64).ln();
        if t <= sum * EPSILON {
            break;
        }
        j += 1;
    }

    j = jmax / jdiv;
    log_com = log_jmax + ((j + 1) as f64 / (n - j) as f64).ln();

    while j > 0 {
        let q = j as f64 / n as f64 + x;
        let term = log_com + (j - 1) as f64 * q.ln() + (n - j) as f64 * log1p(-q);
        let t = term.exp();
        sum += t;
        log_com += (j as f64 / (n - j + 1) as f64).ln();
        if t <= sum * EPSILON {
            break;
        }
        j -= 1;
    }

    sum *= x;
    sum += (n as f64 * log1p(-x)).exp();
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ks_plusbar_upper_is_a_probability() {
        let p = ks_plusbar_upper(200, 0.2);
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn ks_plusbar_upper_decreases_with_x() {
        let p1 = ks_plusbar_upper(200, 0.1);
        let p2 = ks_plusbar_upper(200, 0.3);
        assert!(p2 < p1);
    }
}
