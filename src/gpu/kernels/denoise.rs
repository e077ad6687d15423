//! Edge-aware A-Trous wavelet denoiser and the Gaussian fallback.

use cubecl::prelude::*;
use crate::gpu::constants::*;
use super::math::*;

/// B3-spline kernel weight for a tap offset in [-2, 2].
#[cube]
pub(crate) fn b3_weight(d: i32) -> f32 {
    let mut a = d;
    if a < 0 {
        a = -a;
    }
    let mut w = f32::new(0.375);
    if a == 1 {
        w = f32::new(0.25);
    } else if a == 2 {
        w = f32::new(0.0625);
    }
    w
}

/// Primary ray direction through a pixel center; must match the generation
/// kernel so G-buffer depths reconstruct the correct world positions.
#[cube]
#[allow(clippy::too_many_arguments)]
pub(crate) fn primary_ray_dir(
    x: u32,
    y: u32,
    width: u32,
    height: u32,
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
) -> Line<f32> {
    let half = f32::new(0.5);
    let sx = (f32::cast_from(x) - f32::cast_from(width) * half + half) * pixel_len_x;
    let sy = (f32::cast_from(y) - f32::cast_from(height) * half + half) * pixel_len_y;
    vec3_normalize(
        view_x - right_x * sx - up_x * sy,
        view_y - right_y * sx - up_y * sy,
        view_z - right_z * sx - up_z * sy,
    )
}

/// Divide the accumulator by the iteration count to get the mean radiance
/// image the wavelet passes filter.
#[cube(launch_unchecked)]
pub(crate) fn prepare_denoise_input(
    accum: &Array<f32>,
    num_pixels: u32,
    iteration: u32,
    out: &mut Array<f32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= num_pixels {
        terminate!();
    }
    let inv = f32::new(1.0) / max_f32(f32::cast_from(iteration), f32::new(1.0));
    let base = idx * 3;
    out[base] = accum[base] * inv;
    out[base + 1] = accum[base + 1] * inv;
    out[base + 2] = accum[base + 2] * inv;
}

/// Multiply the filtered mean back by the iteration count so display code
/// can keep dividing uniformly.
#[cube(launch_unchecked)]
pub(crate) fn finalize_denoise_output(
    filtered: &Array<f32>,
    num_pixels: u32,
    iteration: u32,
    out: &mut Array<f32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= num_pixels {
        terminate!();
    }
    let scale = max_f32(f32::cast_from(iteration), f32::new(1.0));
    let base = idx * 3;
    out[base] = filtered[base] * scale;
    out[base + 1] = filtered[base + 1] * scale;
    out[base + 2] = filtered[base + 2] * scale;
}

/// One A-Trous wavelet pass: a 5x5 B3-spline stencil with tap stride
/// `2^k`, each tap weighted by Gaussian edge-stopping factors on color,
/// oct-decoded G-buffer normal, and reconstructed world position.
#[cube(launch_unchecked)]
#[allow(clippy::too_many_arguments)]
pub(crate) fn atrous_pass(
    input: &Array<f32>,
    gbuffer: &Array<f32>,
    width: u32,
    height: u32,
    stride: u32,
    sigma_color: f32,
    sigma_normal: f32,
    sigma_position: f32,
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
    output: &mut Array<f32>,
) {
    let idx = ABSOLUTE_POS;
    let num_pixels = width * height;
    if idx >= num_pixels {
        terminate!();
    }

    let pixel = idx as u32;
    let x = pixel % width;
    let y = pixel / width;

    let center_base = idx * 3;
    let c_r = input[center_base];
    let c_g = input[center_base + 1];
    let c_b = input[center_base + 2];

    let g_base = idx * GBUFFER_STRIDE;
    let c_n = oct_decode(gbuffer[g_base], gbuffer[g_base + 1]);
    let c_t = gbuffer[g_base + 2];
    let c_dir = primary_ray_dir(
        x,
        y,
        width,
        height,
        view_x,
        view_y,
        view_z,
        up_x,
        up_y,
        up_z,
        right_x,
        right_y,
        right_z,
        pixel_len_x,
        pixel_len_y,
    );
    let c_pos_x = cam_px + c_t * c_dir[0];
    let c_pos_y = cam_py + c_t * c_dir[1];
    let c_pos_z = cam_pz + c_t * c_dir[2];

    let sc = max_f32(sigma_color, f32::new(1.0e-10));
    let sn = max_f32(sigma_normal, f32::new(1.0e-10));
    let sp = max_f32(sigma_position, f32::new(1.0e-10));

    let mut sum_r = f32::new(0.0);
    let mut sum_g = f32::new(0.0);
    let mut sum_b = f32::new(0.0);
    let mut sum_w = f32::new(0.0);

    let step = stride as i32;
    for dy in -2..=2 {
        for dx in -2..=2 {
            // Taps clamp to the image bounds.
            let mut tx = x as i32 + dx * step;
            let mut ty = y as i32 + dy * step;
            if tx < 0 {
                tx = 0;
            } else if tx >= width as i32 {
                tx = width as i32 - 1;
            }
            if ty < 0 {
                ty = 0;
            } else if ty >= height as i32 {
                ty = height as i32 - 1;
            }

            let tap = (ty as u32 * width + tx as u32);
            let tap_base = tap * 3;
            let t_r = input[tap_base];
            let t_g = input[tap_base + 1];
            let t_b = input[tap_base + 2];

            let tg_base = tap * GBUFFER_STRIDE;
            let t_n = oct_decode(gbuffer[tg_base], gbuffer[tg_base + 1]);
            let t_t = gbuffer[tg_base + 2];
            let t_dir = primary_ray_dir(
                tx as u32,
                ty as u32,
                width,
                height,
                view_x,
                view_y,
                view_z,
                up_x,
                up_y,
                up_z,
                right_x,
                right_y,
                right_z,
                pixel_len_x,
                pixel_len_y,
            );
            let t_pos_x = cam_px + t_t * t_dir[0];
            let t_pos_y = cam_py + t_t * t_dir[1];
            let t_pos_z = cam_pz + t_t * t_dir[2];

            let dc_r = t_r - c_r;
            let dc_g = t_g - c_g;
            let dc_b = t_b - c_b;
            let dist_c = dc_r * dc_r + dc_g * dc_g + dc_b * dc_b;

            let dn_x = t_n[0] - c_n[0];
            let dn_y = t_n[1] - c_n[1];
            let dn_z = t_n[2] - c_n[2];
            let dist_n = max_f32(dn_x * dn_x + dn_y * dn_y + dn_z * dn_z, f32::new(0.0));

            let dp_x = t_pos_x - c_pos_x;
            let dp_y = t_pos_y - c_pos_y;
            let dp_z = t_pos_z - c_pos_z;
            let dist_p = dp_x * dp_x + dp_y * dp_y + dp_z * dp_z;

            let h = b3_weight(dx) * b3_weight(dy);
            let w = h
                * (-dist_c / sc).exp()
                * (-dist_n / sn).exp()
                * (-dist_p / sp).exp();

            sum_r += t_r * w;
            sum_g += t_g * w;
            sum_b += t_b * w;
            sum_w += w;
        }
    }

    let out_base = idx * 3;
    if sum_w > f32::new(0.0) {
        output[out_base] = sum_r / sum_w;
        output[out_base + 1] = sum_g / sum_w;
        output[out_base + 2] = sum_b / sum_w;
    } else {
        output[out_base] = c_r;
        output[out_base + 1] = c_g;
        output[out_base + 2] = c_b;
    }
}

/// Isotropic Gaussian fallback. `quarter_kernel` holds the 1-D half kernel
/// (index 0 = center), mirror-indexed by |offset|.
#[cube(launch_unchecked)]
pub(crate) fn gaussian_pass(
    input: &Array<f32>,
    width: u32,
    height: u32,
    radius: u32,
    quarter_kernel: &Array<f32>,
    output: &mut Array<f32>,
) {
    let idx = ABSOLUTE_POS;
    let num_pixels = width * height;
    if idx >= num_pixels {
        terminate!();
    }

    let pixel = idx as u32;
    let x = pixel % width;
    let y = pixel / width;

    let r = radius as i32;
    let mut sum_r = f32::new(0.0);
    let mut sum_g = f32::new(0.0);
    let mut sum_b = f32::new(0.0);
    let mut sum_w = f32::new(0.0);

    for dy in -r..=r {
        for dx in -r..=r {
            let tx = x as i32 + dx;
            let ty = y as i32 + dy;
            if tx >= 0 && ty >= 0 && tx < width as i32 && ty < height as i32 {
                let mut ax = dx;
                if ax < 0 {
                    ax = -ax;
                }
                let mut ay = dy;
                if ay < 0 {
                    ay = -ay;
                }
                let w = quarter_kernel[ax] * quarter_kernel[ay];
                let tap = (ty as u32 * width + tx as u32) * 3;
                sum_r += input[tap] * w;
                sum_g += input[tap + 1] * w;
                sum_b += input[tap + 2] * w;
                sum_w += w;
            }
        }
    }

    let out_base = idx * 3;
    if sum_w > f32::new(0.0) {
        output[out_base] = sum_r / sum_w;
        output[out_base + 1] = sum_g / sum_w;
        output[out_base + 2] = sum_b / sum_w;
    } else {
        output[out_base] = input[out_base];
        output[out_base + 1] = input[out_base + 1];
        output[out_base + 2] = input[out_base + 2];
    }
}
