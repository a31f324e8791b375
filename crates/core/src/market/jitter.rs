//! Reproducible daily price variation.
//!
//! The seed is a 32-bit polynomial string hash (`h * 31 + unit`, wrapping) over the
//! UTF-16 code units of the cache key. The hash is mapped through `sin(h) * 10000`
//! and its fractional part is used as a uniform-looking value in `[0, 1)`.

/// Wrapping `(h << 5) - h + unit` over UTF-16 code units.
pub fn polynomial_hash(seed: &str) -> i32 {
    seed.encode_utf16().fold(0_i32, |hash, unit| {
        hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(i32::from(unit))
    })
}

/// Fractional part of `sin(hash) * 10000`, in `[0, 1)`.
pub fn seeded_fraction(seed: &str) -> f64 {
    let x = f64::from(polynomial_hash(seed)).sin() * 10_000.0;
    let fraction = x - x.floor();
    // guards the rounding edge where x - floor(x) == 1.0
    if fraction >= 1.0 {
        0.0
    } else {
        fraction
    }
}

/// Integer offset in `[-bound, bound]` derived from `seed`.
pub fn price_offset(seed: &str, bound: u32) -> i64 {
    let bound = f64::from(bound);
    (seeded_fraction(seed) * 2.0 * bound - bound).floor() as i64
}
