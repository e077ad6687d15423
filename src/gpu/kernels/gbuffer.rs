//! G-buffer capture at the primary hit.

use cubecl::prelude::*;
use crate::gpu::constants::*;
use super::math::*;

/// Record the oct-encoded surface normal and the primary-hit distance for
/// every pixel. Runs right after the depth-0 intersection, while
/// `pixel_index == idx` still holds for the whole array. Miss pixels store
/// zeros (`t == 0` marks them for the denoiser).
#[cube(launch_unchecked)]
pub(crate) fn capture_gbuffer(
    isect_f32: &Array<f32>,
    num_paths: u32,
    gbuffer: &mut Array<f32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= num_paths {
        terminate!();
    }

    let isect_base = idx * ISECT_F32_STRIDE;
    let t = isect_f32[isect_base];
    let out_base = idx * GBUFFER_STRIDE;

    if t > f32::new(0.0) {
        let enc = oct_encode(
            isect_f32[isect_base + 1],
            isect_f32[isect_base + 2],
            isect_f32[isect_base + 3],
        );
        gbuffer[out_base] = enc[0];
        gbuffer[out_base + 1] = enc[1];
        gbuffer[out_base + 2] = t;
    } else {
        gbuffer[out_base] = f32::new(0.0);
        gbuffer[out_base + 1] = f32::new(0.0);
        gbuffer[out_base + 2] = f32::new(0.0);
    }
}
