//! Primary ray generation.

use cubecl::prelude::*;
use crate::gpu::constants::*;
use super::math::*;
use super::rng::*;
use super::sampling::*;

/// One worker per pixel: build the camera ray, optionally jittered inside
/// the pixel footprint and pushed through a thin lens, and reset the path
/// segment for a fresh iteration.
///
/// Pixel (0, 0) is the top-left corner; `up` points toward row 0.
#[cube(launch_unchecked)]
#[allow(clippy::too_many_arguments)]
pub(crate) fn generate_primary_paths(
    width: u32,
    height: u32,
    iteration: u32,
    seed: u32,
    trace_depth: u32,
    antialiasing: u32,
    cam_px: f32,
    cam_py: f32,
    cam_pz: f32,
    view_x: f32,
    view_y: f32,
    view_z: f32,
    up_x: f32,
    up_y: f32,
    up_z: f32,
    right_x: f32,
    right_y: f32,
    right_z: f32,
    pixel_len_x: f32,
    pixel_len_y: f32,
    lens_radius: f32,
    focal_distance: f32,
    path_f32: &mut Array<f32>,
    path_u32: &mut Array<u32>,
) {
    let idx = ABSOLUTE_POS;
    let num_pixels = width * height;
    if idx >= num_pixels {
        terminate!();
    }

    let pixel = idx as u32;
    let x = pixel % width;
    let y = pixel / width;

    // The camera draws from its own stream (depth slot `trace_depth`), so
    // shading steps never replay the lens samples.
    let mut rng = rng_seed(iteration, pixel, trace_depth, seed);

    let half = f32::new(0.5);
    let mut jx = f32::new(0.0);
    let mut jy = f32::new(0.0);
    if antialiasing != u32::new(0) {
        jx = rng_next_f32(&mut rng) - half;
        jy = rng_next_f32(&mut rng) - half;
    }

    let sx = (f32::cast_from(x) - f32::cast_from(width) * half + half + jx) * pixel_len_x;
    let sy = (f32::cast_from(y) - f32::cast_from(height) * half + half + jy) * pixel_len_y;

    let dir = vec3_normalize(
        view_x - right_x * sx - up_x * sy,
        view_y - right_y * sx - up_y * sy,
        view_z - right_z * sx - up_z * sy,
    );

    let mut ox = cam_px;
    let mut oy = cam_py;
    let mut oz = cam_pz;
    let mut dx = dir[0];
    let mut dy = dir[1];
    let mut dz = dir[2];

    if lens_radius > f32::new(0.0) {
        let u1 = rng_next_f32(&mut rng);
        let u2 = rng_next_f32(&mut rng);
        let disk = concentric_disk(u1, u2);
        let lx = disk[0] * lens_radius;
        let ly = disk[1] * lens_radius;
        let fx = cam_px + dir[0] * focal_distance;
        let fy = cam_py + dir[1] * focal_distance;
        let fz = cam_pz + dir[2] * focal_distance;
        ox = cam_px + right_x * lx + up_x * ly;
        oy = cam_py + right_y * lx + up_y * ly;
        oz = cam_pz + right_z * lx + up_z * ly;
        let refocus = vec3_normalize(fx - ox, fy - oy, fz - oz);
        dx = refocus[0];
        dy = refocus[1];
        dz = refocus[2];
    }

    let base = idx * PATH_F32_STRIDE;
    path_f32[base] = ox;
    path_f32[base + 1] = oy;
    path_f32[base + 2] = oz;
    path_f32[base + 3] = dx;
    path_f32[base + 4] = dy;
    path_f32[base + 5] = dz;
    path_f32[base + 6] = f32::new(1.0);
    path_f32[base + 7] = f32::new(1.0);
    path_f32[base + 8] = f32::new(1.0);
    path_f32[base + 9] = f32::new(0.0);
    path_f32[base + 10] = f32::new(0.0);
    path_f32[base + 11] = f32::new(0.0);

    let state = idx * PATH_U32_STRIDE;
    path_u32[state] = pixel;
    path_u32[state + 1] = trace_depth;
    path_u32[state + 2] = FLAG_FROM_CAMERA;
    path_u32[state + 3] = NONE_U32;
}
