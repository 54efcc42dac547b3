//! Positivity-preserving parameter transforms
//!
//! The estimator searches an unconstrained space and maps dispersion
//! coefficients back through [`safe_softplus`], so a dispersion coefficient
//! can never leave `(0, ∞)` no matter where the optimizer wanders.

/// Above this input `ln(1 + exp(x))` equals `x` to f64 precision.
const SOFTPLUS_CUTOFF: f64 = 20.0;

/// Numerically stable softplus: `ln(1 + exp(x))`, mapping ℝ → (0, ∞).
///
/// Large positive inputs are returned as-is instead of overflowing `exp`.
pub fn safe_softplus(x: f64) -> f64 {
    if x > SOFTPLUS_CUTOFF {
        x
    } else {
        x.exp().ln_1p()
    }
}

/// Inverse of [`safe_softplus`] on `(0, ∞)`: `ln(exp(x) - 1)`.
///
/// Non-positive inputs have no preimage; they are clamped to the smallest
/// positive normal f64 so callers always get a finite value back.
pub fn safe_softplus_inv(x: f64) -> f64 {
    let x = x.max(f64::MIN_POSITIVE);
    if x > SOFTPLUS_CUTOFF {
        x
    } else {
        x.exp_m1().ln()
    }
}
