/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Shared numeric helpers and random variates for the prior and the sampler.
//
// Created on: 18 Oct 2026
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Utilities
//!
//! Shared numeric helpers: log-space accumulation, bracketed root finding,
//! and the random variates used by the midpoint and branch-length samplers.

use rand::RngExt;
use rand::rngs::StdRng;

#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    f64::from(u32::try_from(value).unwrap_or(u32::MAX))
}

/// Numerically stable `ln(exp(a) + exp(b))`.
#[must_use]
pub fn log_add(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (high, low) = if a >= b { (a, b) } else { (b, a) };
    high + (low - high).exp().ln_1p()
}

/// Outcome of a bisection search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bisection {
    /// A sign change was bracketed and refined to the requested tolerance.
    Root(f64),
    /// `f(lower)` and `f(upper)` share a sign; both values are reported.
    NotBracketed { lower_value: f64, upper_value: f64 },
}

/// Bisection root finder on `[lower, upper]`, stopping once the bracket is
/// narrower than `tolerance`.
pub fn bisect_root<F>(mut f: F, lower: f64, upper: f64, tolerance: f64) -> Bisection
where
    F: FnMut(f64) -> f64,
{
    let mut lo = lower;
    let mut hi = upper;
    let mut f_lo = f(lo);
    let f_hi = f(hi);

    if f_lo == 0.0 {
        return Bisection::Root(lo);
    }
    if f_hi == 0.0 {
        return Bisection::Root(hi);
    }
    if f_lo.signum() == f_hi.signum() || f_lo.is_nan() || f_hi.is_nan() {
        return Bisection::NotBracketed {
            lower_value: f_lo,
            upper_value: f_hi,
        };
    }

    let tolerance = tolerance.max(f64::EPSILON);
    while hi - lo > tolerance {
        let mid = 0.5 * (lo + hi);
        let f_mid = f(mid);
        if f_mid == 0.0 {
            return Bisection::Root(mid);
        }
        if f_mid.signum() == f_lo.signum() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }
    Bisection::Root(0.5 * (lo + hi))
}

/// Uniform draw on `[low, high)`.
pub fn sample_uniform(rng: &mut StdRng, low: f64, high: f64) -> f64 {
    (high - low).mul_add(rng.random::<f64>(), low)
}

/// Standard normal variate by the Box-Muller transform.
pub fn sample_standard_normal(rng: &mut StdRng) -> f64 {
    let radius = (-2.0 * open_unit(rng).ln()).sqrt();
    radius * (std::f64::consts::TAU * rng.random::<f64>()).cos()
}

/// Uniform draw on `(0, 1]`, safe to take the logarithm of.
fn open_unit(rng: &mut StdRng) -> f64 {
    (1.0 - rng.random::<f64>()).max(f64::MIN_POSITIVE)
}

/// Gamma variate with the given shape and scale (Marsaglia-Tsang).
///
/// Shapes below one are boosted by one and scaled back with `U^(1/shape)`.
/// Returns `NaN` for non-positive parameters.
pub fn sample_gamma(rng: &mut StdRng, shape: f64, scale: f64) -> f64 {
    if !(shape > 0.0 && scale > 0.0) {
        return f64::NAN;
    }
    if shape < 1.0 {
        let boost = open_unit(rng).powf(shape.recip());
        return sample_gamma(rng, shape + 1.0, scale) * boost;
    }

    let base = shape - 1.0 / 3.0;
    let width = (9.0 * base).sqrt().recip();
    loop {
        let x = sample_standard_normal(rng);
        let v = width.mul_add(x, 1.0);
        if v <= 0.0 {
            continue;
        }
        let v = v * v * v;
        let x2 = x * x;
        let u = rng.random::<f64>();
        // squeeze first, then the exact log test
        if u < 1.0 - 0.0331 * x2 * x2 || u.ln() < 0.5 * x2 + base * (1.0 - v + v.ln()) {
            return scale * base * v;
        }
    }
}
