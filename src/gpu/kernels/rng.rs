//! Per-invocation random number generation for the path tracing kernels.
//!
//! Every shading step reseeds from `(iteration, pixel index, depth)`, so the
//! scheduler is free to reorder or compact paths without changing any sample.
//!
//! Multiplication and addition go through 16-bit chunks: the results are
//! bit-identical to wrapping arithmetic, and the intermediate products stay
//! inside u32 range on every backend (including the host, where these
//! functions also run as plain Rust under overflow checks).

use cubecl::prelude::*;

/// Low 32 bits of `a * b` without intermediate overflow.
#[cube]
pub(crate) fn mul_wrap(a: u32, b: u32) -> u32 {
    let mask = u32::new(0xffff);
    let a0 = a & mask;
    let a1 = a >> 16;
    let b0 = b & mask;
    let b1 = b >> 16;
    let low = a0 * b0;
    let mid = ((a0 * b1) & mask) + ((a1 * b0) & mask);
    let high = (low >> 16) + mid;
    (low & mask) | ((high & mask) << 16)
}

/// `a + b` modulo 2^32 without intermediate overflow.
#[cube]
pub(crate) fn add_wrap(a: u32, b: u32) -> u32 {
    let mask = u32::new(0xffff);
    let low = (a & mask) + (b & mask);
    let high = (a >> 16) + (b >> 16) + (low >> 16);
    (low & mask) | ((high & mask) << 16)
}

/// Wang hash; decorrelates consecutive integer seeds.
#[cube]
pub(crate) fn wang_hash(seed: u32) -> u32 {
    let mut v = (seed ^ u32::new(61)) ^ (seed >> 16);
    v = mul_wrap(v, u32::new(9));
    v = v ^ (v >> 4);
    v = mul_wrap(v, u32::new(0x27d4_eb2d));
    v ^ (v >> 15)
}

/// Build the PCG state for one shading invocation.
#[cube]
pub(crate) fn rng_seed(iteration: u32, pixel_index: u32, depth: u32, seed: u32) -> u32 {
    let a = wang_hash(iteration ^ mul_wrap(seed, u32::new(0x9e37_79b9)));
    let b = wang_hash(add_wrap(mul_wrap(pixel_index, u32::new(0x85eb_ca6b)), depth));
    wang_hash(a ^ b)
}

/// Advance the 32-bit PCG (RXS-M-XS output permutation) and return the next
/// random word.
#[cube]
pub(crate) fn rng_next_u32(state: &mut u32) -> u32 {
    *state = add_wrap(
        mul_wrap(*state, u32::new(747_796_405)),
        u32::new(2_891_336_453),
    );
    let s = *state;
    let word = mul_wrap((s >> ((s >> 28) + u32::new(4))) ^ s, u32::new(277_803_737));
    (word >> 22) ^ word
}

/// Uniform float in [0, 1) built from the top 23 random bits.
#[cube]
pub(crate) fn rng_next_f32(state: &mut u32) -> f32 {
    let word = rng_next_u32(state);
    f32::cast_from(word >> 9) * f32::new(1.0 / 8_388_608.0)
}
