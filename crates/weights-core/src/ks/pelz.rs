//! Pelz-Good asymptotic approximation of the lower tail of the KS
//! one-sample statistic, used for large `n` away from `x = 0`.
//!
//! Pelz, W. and Good, I.J. (1976), "Approximating the Lower Tail-Areas of
//! the Kolmogorov-Smirnov One-Sample Statistic", JRSS B, 38(2), 152-156.

use std::f64::consts::PI;

const JMAX: i32 = 20;
const EPS: f64 = 1.0e-10;
const C: f64 = 2.506628274631001; // sqrt(2*pi)
const C2: f64 = 1.2533141373155001; // sqrt(pi/2)

pub fn pelz(n: i64, x: f64) -> f64 {
    let pi2 = PI * PI;
    let pi4 = pi2 * pi2;
    let racn = (n as f64).sqrt();
    let z = racn * x;
    let z2 = z * z;
    let z4 = z2 * z2;
    let z6 = z4 * z2;
    let w = pi2 / (2.0 * z * z);

    let mut sum = 0.0;
    let mut term = 1.0f64;
    let mut j = 0;
    while j <= JMAX && term > EPS * sum {
        let ti = j as f64 + 0.5;
        term = (-ti * ti * w).exp();
        sum += term;
        j += 1;
    }
    sum *= C / z;

    let mut tom = 0.0;
    term = 1.0;
    j = 0;
    while j <= JMAX && term.abs() > EPS * tom.abs() {
        let ti = j as f64 + 0.5;
        term = (pi2 * ti * ti - z2) * (-ti * ti * w).exp();
        tom += term;
        j += 1;
    }
    sum += tom * C2 / (racn * 3.0 * z4);

    tom = 0.0;
    term = 1.0;
    j = 0;
    while j <= JMAX && term.abs() > EPS * tom.abs() {
        let ti = j as f64 + 0.5;
        let ti2 = ti * ti;
        term = 6.0 * z6 + 2.0 * z4 + pi2 * (2.0 * z4 - 5.0 * z2) * ti2
            + pi4 * (1.0 - 2.0 * z2) * ti2 * ti2;
        term *= (-ti2 * w).exp();
        tom += term;
        j += 1;
    }
    sum += tom * C2 / (n as f64 * 36.0 * z * z6);

    tom = 0.0;
    term = 1.0;
    j = 1;
    while j <= JMAX && term > EPS * tom {
        let ti = j as f64;
        term = pi2 * ti * ti * (-ti * ti * w).exp();
        tom += term;
        j += 1;
    }
    sum -= tom * C2 / (n as f64 * 18.0 * z * z2);

    tom = 0.0;
    term = 1.0;
    j = 0;
    while j <= JMAX && term.abs() > EPS * tom.abs() {
        let mut ti = j as f64 + 0.5;
        ti *= ti;
        term = -30.0 * z6 - 90.0 * z6 * z2 + pi2 * (135.0 * z4 - 96.0 * z6) * ti
            + pi4 * (212.0 * z4 - 60.0 * z2) * ti * ti
            + pi2 * pi4 * ti * ti * ti * (5.0 - 30.0 * z2);
        term *= (-ti * w).exp();
        tom += term;
        j += 1;
    }
    sum += tom * C2 / (racn * n as f64 * 3240.0 * z4 * z6);

    tom = 0.0;
    term = 1.0;
    j = 1;
    while j <= JMAX && term.abs() > EPS * tom.abs() {
        let ti = (j * j) as f64;
        term = (3.0 * pi2 * ti * z2 - pi4 * ti * ti) * (-ti * w).exp();
        tom += term;
        j += 1;
    }
    sum += tom * C2 / (racn * n as f64 * 108.0 * z6);

    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pelz_is_close_to_one_far_from_zero() {
        let p = pelz(10_000, 0.05);
        assert!(p > 0.9 && p <= 1.000_001);
    }
}
