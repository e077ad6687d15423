//! Final gather into the radiance accumulator and buffer copies.

use cubecl::prelude::*;
use crate::gpu::constants::*;
use super::math::*;

/// Scatter every path's accumulated color into the framebuffer. The stable
/// partition keeps pixel indices unique across the array, so the
/// read-modify-write per pixel needs no atomics.
#[cube(launch_unchecked)]
pub(crate) fn final_gather(
    path_f32: &Array<f32>,
    path_u32: &Array<u32>,
    num_paths: u32,
    accum: &mut Array<f32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= num_paths {
        terminate!();
    }

    let base = idx * PATH_F32_STRIDE;
    let r = path_f32[base + 9];
    let g = path_f32[base + 10];
    let b = path_f32[base + 11];
    if !vec3_is_finite(r, g, b) {
        terminate!();
    }

    let pixel = path_u32[idx * PATH_U32_STRIDE];
    let out = (pixel * u32::new(3));
    accum[out] += r;
    accum[out + 1] += g;
    accum[out + 2] += b;
}

/// Copy intersection records between the working buffers and the
/// first-bounce cache.
#[cube(launch_unchecked)]
pub(crate) fn copy_intersections(
    src_f32: &Array<f32>,
    src_u32: &Array<u32>,
    num_paths: u32,
    dst_f32: &mut Array<f32>,
    dst_u32: &mut Array<u32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= num_paths {
        terminate!();
    }

    let base_f = idx * ISECT_F32_STRIDE;
    let mut i = 0u32;
    while i < ISECT_F32_STRIDE {
        dst_f32[base_f + i] = src_f32[base_f + i];
        i += 1;
    }

    let base_u = idx * ISECT_U32_STRIDE;
    let mut j = 0u32;
    while j < ISECT_U32_STRIDE {
        dst_u32[base_u + j] = src_u32[base_u + j];
        j += 1;
    }
}
