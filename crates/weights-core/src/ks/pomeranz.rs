//! The Pomeranz algorithm: exact KS CDF for mid-range `n*x^2`.

use super::special::log_factorial;

const EPS: f64 = 1.0e-15;
const ENO: i32 = 350;

/// Precomputes `A_i`, `floor(A_i - t)` and `ceil(A_i + t)`, the limits of the
/// sums used by the recursion below. Index 0 is unused; arrays are sized
/// `2n+3` to match the reference's 1-based layout.
fn calc_floor_ceil(n: i64, t: f64, a: &mut [f64], at_flo: &mut [f64], at_cei: &mut [f64]) {
    let ell = t as i64;
    let z = t - ell as f64;
    let w = t.ceil() - t;
    let n2 = (2 * n + 2) as usize;

    if z > 0.5 {
        let mut i = 2usize;
        while i <= n2 {
            at_flo[i] = (i / 2) as f64 - 2.0 - ell as f64;
            i += 2;
        }
        let mut i = 1usize;
        while i <= n2 {
            at_flo[i] = (i / 2) as f64 - 1.0 - ell as f64;
            i += 2;
        }
        let mut i = 2usize;
        while i <= n2 {
            at_cei[i] = (i / 2) as f64 + ell as f64;
            i += 2;
        }
        let mut i = 1usize;
        while i <= n2 {
            at_cei[i] = (i / 2) as f64 + 1.0 + ell as f64;
            i += 2;
        }
    } else if z > 0.0 {
        for i in 1..=n2 {
            at_flo[i] = (i / 2) as f64 - 1.0 - ell as f64;
        }
        for i in 2..=n2 {
            at_cei[i] = (i / 2) as f64 + ell as f64;
        }
        at_cei[1] = 1.0 + ell as f64;
    } else {
        let mut i = 2usize;
        while i <= n2 {
            at_flo[i] = (i / 2) as f64 - 1.0 - ell as f64;
            i += 2;
        }
        let mut i = 1usize;
        while i <= n2 {
            at_flo[i] = (i / 2) as f64 - ell as f64;
            i += 2;
        }
        let mut i = 2usize;
        while i <= n2 {
            at_cei[i] = (i / 2) as f64 - 1.0 + ell as f64;
            i += 2;
        }
        let mut i = 1usize;
        while i <= n2 {
            at_cei[i] = (i / 2) as f64 + ell as f64;
            i += 2;
        }
    }

    let zw = if w < z { w } else { z };
    a[0] = 0.0;
    a[1] = 0.0;
    a[2] = zw;
    a[3] = 1.0 - a[2];
    for i in 4..=(2 * n + 1) as usize {
        a[i] = a[i - 2] + 1.0;
    }
    a[(2 * n + 2) as usize] = n as f64;
}

/// `Prob(D_n < x)` via the Pomeranz recursion, used where `0.754693 <= n*x^2
/// < 4.0` for `n <= NEXACT`.
pub fn pomeranz(n: i64, x: f64) -> f64 {
    let reno = 2f64.powi(ENO);
    let t = n as f64 * x;
    let len = (2 * n + 3) as usize;

    let mut a = vec![0.0f64; len];
    let mut at_flo = vec![0.0f64; len];
    let mut at_cei = vec![0.0f64; len];
    calc_floor_ceil(n, t, &mut a, &mut at_flo, &mut at_cei);

    let np2 = (n + 2) as usize;
    let mut v = vec![vec![0.0f64; np2]; 2];
    let mut h = vec![vec![0.0f64; np2]; 4];

    for j in 1..=(n + 1) as usize {
        v[0][j] = 0.0;
    }
    for j in 2..=(n + 1) as usize {
        v[1][j] = 0.0;
    }
    v[1][1] = reno;
    let mut coreno: i32 = 1;

    h[0][0] = 1.0;
    let mut w = 2.0 * a[2] / n as f64;
    for j in 1..=(n + 1) as usize {
        h[0][j] = w * h[0][j - 1] / j as f64;
    }

    h[1][0] = 1.0;
    w = (1.0 - 2.0 * a[2]) / n as f64;
    for j in 1..=(n + 1) as usize {
        h[1][j] = w * h[1][j - 1] / j as f64;
    }

    h[2][0] = 1.0;
    w = a[2] / n as f64;
    for j in 1..=(n + 1) as usize {
        h[2][j] = w * h[2][j - 1] / j as f64;
    }

    h[3][0] = 1.0;
    for j in 1..=(n + 1) as usize {
        h[3][j] = 0.0;
    }

    let mut r1 = 0usize;
    let mut r2 = 1usize;

    for i in 2..=(2 * n + 2) as usize {
        let mut jlow = 2 + at_flo[i] as i64;
        if jlow < 1 {
            jlow = 1;
        }
        let mut jup = at_cei[i] as i64;
        if jup > n + 1 {
            jup = n + 1;
        }

        let mut klow = 2 + at_flo[i - 1] as i64;
        if klow < 1 {
            klow = 1;
        }
        let kup0 = at_cei[i - 1] as i64;

        let step = (a[i] - a[i - 1]) / n as f64;
        let mut s: i32 = -1;
        for (j, row) in h.iter().enumerate().take(4) {
            if (step - row[1]).abs() <= EPS {
                s = j as i32;
                break;
            }
        }
        debug_assert!(s >= 0, "pomeranz: no matching H kernel for step width");
        let s = s.max(0) as usize;

        let mut minsum = reno;
        r1 = (r1 + 1) & 1;
        r2 = (r2 + 1) & 1;

        let mut j = jlow;
        while j <= jup {
            let mut kup = kup0;
            if kup > j {
                kup = j;
            }
            let mut sum = 0.0;
            let mut k = kup;
            while k >= klow {
                sum += v[r1][k as usize] * h[s][(j - k) as usize];
                k -= 1;
            }
            v[r2][j as usize] = sum;
            if sum < minsum {
                minsum = sum;
            }
            j += 1;
        }

        if minsum < 1.0e-280 {
            let mut j = jlow;
            while j <= jup {
                v[r2][j as usize] *= reno;
                j += 1;
            }
            coreno += 1;
        }
    }

    let sum = v[r2][(n + 1) as usize];
    let w = log_factorial(n) - coreno as f64 * ENO as f64 * std::f64::consts::LN_2 + sum.ln();
    if w >= 0.0 {
        1.0
    } else {
        w.exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pomeranz_is_a_probability() {
        let p = pomeranz(50, 0.15);
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn pomeranz_increases_with_x() {
        let p1 = pomeranz(50, 0.1);
        let p2 = pomeranz(50, 0.2);
        assert!(p2 >= p1);
    }
}
