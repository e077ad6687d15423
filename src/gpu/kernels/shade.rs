//! Shading kernels for the three integrators.
//!
//! Each kernel runs one worker per live path, consumes the intersection
//! record produced by the traversal stage, and rewrites the path segment in
//! place: accumulated color, throughput, continuation ray, flags, and the
//! remaining-bounce counter. A path with `remaining_bounces == 0` is final
//! and will be moved behind the live range by the compaction stage.

use cubecl::prelude::*;
use crate::gpu::constants::*;
use super::bsdf::*;
use super::light::*;
use super::math::*;
use super::rng::*;
use super::sampling::*;

/// Distance sampling through the active participating medium.
///
/// With probability `exp(-sigma_t * t)` the ray reaches the surface
/// unhindered; otherwise it scatters isotropically at a distance drawn from
/// the truncated exponential, with throughput scaled by the scattering
/// albedo `sigma_s / sigma_t`. Returns true when a medium event replaced the
/// surface interaction.
#[cube]
#[allow(clippy::too_many_arguments)]
pub(crate) fn sample_medium_event(
    material_f32: &Array<f32>,
    medium_id: u32,
    t_surface: f32,
    rng: &mut u32,
    ray_o: &mut Line<f32>,
    ray_d: &mut Line<f32>,
    throughput: &mut Line<f32>,
) -> bool {
    let mut scattered = false;
    if medium_id != NONE_U32 && t_surface > f32::new(0.0) {
        let base_f = (medium_id * MATERIAL_F32_STRIDE);
        let sigma_t = material_f32[base_f + 9];
        let sigma_s = material_f32[base_f + 10];
        if sigma_t > f32::new(0.0) {
            let transmit = (-sigma_t * t_surface).exp();
            let u = rng_next_f32(rng);
            if u >= transmit {
                // Scatter inside the medium: truncated-exponential distance.
                let u2 = rng_next_f32(rng);
                let s = -(f32::new(1.0) - u2 * (f32::new(1.0) - transmit)).ln() / sigma_t;
                let px = ray_o[0] + s * ray_d[0];
                let py = ray_o[1] + s * ray_d[1];
                let pz = ray_o[2] + s * ray_d[2];
                let u3 = rng_next_f32(rng);
                let u4 = rng_next_f32(rng);
                let dir = uniform_sphere(u3, u4);
                let albedo = sigma_s / sigma_t;
                throughput[0] *= albedo;
                throughput[1] *= albedo;
                throughput[2] *= albedo;
                ray_o[0] = px;
                ray_o[1] = py;
                ray_o[2] = pz;
                ray_d[0] = dir[0];
                ray_d[1] = dir[1];
                ray_d[2] = dir[2];
                scattered = true;
            }
        }
    }
    scattered
}

/// Naive integrator: gather emission on hit, scatter otherwise, add the
/// environment on miss.
#[cube(launch_unchecked)]
#[allow(clippy::too_many_arguments)]
pub(crate) fn shade_naive(
    iteration: u32,
    depth: u32,
    seed: u32,
    num_paths: u32,
    path_f32: &mut Array<f32>,
    path_u32: &mut Array<u32>,
    isect_f32: &Array<f32>,
    isect_u32: &Array<u32>,
    material_f32: &Array<f32>,
    material_u32: &Array<u32>,
    tex_data: &Array<f32>,
    tex_desc: &Array<u32>,
    env_data: &Array<f32>,
    env_width: u32,
    env_height: u32,
    env_present: u32,
) {
    let idx = ABSOLUTE_POS;
    if idx >= num_paths {
        terminate!();
    }

    let state = idx * PATH_U32_STRIDE;
    let mut remaining = path_u32[state + 1];
    if remaining == u32::new(0) {
        terminate!();
    }
    let pixel = path_u32[state];
    let mut flags = path_u32[state + 2];
    let mut medium = path_u32[state + 3];

    let base = idx * PATH_F32_STRIDE;
    let mut ray_o = Line::empty(3u32);
    let mut ray_d = Line::empty(3u32);
    let mut throughput = Line::empty(3u32);
    let mut color = Line::empty(3u32);
    ray_o[0] = path_f32[base];
    ray_o[1] = path_f32[base + 1];
    ray_o[2] = path_f32[base + 2];
    ray_d[0] = path_f32[base + 3];
    ray_d[1] = path_f32[base + 4];
    ray_d[2] = path_f32[base + 5];
    throughput[0] = path_f32[base + 6];
    throughput[1] = path_f32[base + 7];
    throughput[2] = path_f32[base + 8];
    color[0] = path_f32[base + 9];
    color[1] = path_f32[base + 10];
    color[2] = path_f32[base + 11];

    let isect_base = idx * ISECT_F32_STRIDE;
    let t = isect_f32[isect_base];

    let mut rng = rng_seed(iteration, pixel, depth, seed);

    let medium_event = sample_medium_event(
        material_f32,
        medium,
        t,
        &mut rng,
        &mut ray_o,
        &mut ray_d,
        &mut throughput,
    );

    if medium_event {
        flags &= FLAG_IN_MEDIUM;
        remaining -= u32::new(1);
    } else if t <= f32::new(0.0) {
        if env_present != u32::new(0) {
            let le = env_radiance(env_data, env_width, env_height, ray_d[0], ray_d[1], ray_d[2]);
            color[0] += throughput[0] * le[0];
            color[1] += throughput[1] * le[1];
            color[2] += throughput[2] * le[2];
        }
        remaining = u32::new(0);
    } else {
        let isect_state = idx * ISECT_U32_STRIDE;
        let material_id = isect_u32[isect_state];
        let mat_base_f = (material_id * MATERIAL_F32_STRIDE);
        let emittance = material_f32[mat_base_f + 8];

        if emittance > f32::new(0.0) {
            let le = light_emission(material_f32, material_id);
            color[0] += throughput[0] * le[0];
            color[1] += throughput[1] * le[1];
            color[2] += throughput[2] * le[2];
            remaining = u32::new(0);
        } else {
            remaining -= u32::new(1);
            if remaining > u32::new(0) {
                let px = ray_o[0] + t * ray_d[0];
                let py = ray_o[1] + t * ray_d[1];
                let pz = ray_o[2] + t * ray_d[2];
                let mut event_flags = u32::new(0);
                let alive = scatter(
                    material_f32,
                    material_u32,
                    tex_data,
                    tex_desc,
                    material_id,
                    px,
                    py,
                    pz,
                    isect_f32[isect_base + 1],
                    isect_f32[isect_base + 2],
                    isect_f32[isect_base + 3],
                    ray_d[0],
                    ray_d[1],
                    ray_d[2],
                    isect_f32[isect_base + 7],
                    isect_f32[isect_base + 8],
                    &mut rng,
                    &mut ray_o,
                    &mut ray_d,
                    &mut throughput,
                    &mut event_flags,
                    &mut medium,
                );
                if alive {
                    flags = event_flags & FLAG_SPECULAR_BOUNCE;
                    if medium != NONE_U32 {
                        flags |= FLAG_IN_MEDIUM;
                    }
                } else {
                    remaining = u32::new(0);
                }
            }
        }
    }

    if !vec3_is_finite(color[0], color[1], color[2]) {
        color[0] = f32::new(0.0);
        color[1] = f32::new(0.0);
        color[2] = f32::new(0.0);
        remaining = u32::new(0);
    }

    path_f32[base] = ray_o[0];
    path_f32[base + 1] = ray_o[1];
    path_f32[base + 2] = ray_o[2];
    path_f32[base + 3] = ray_d[0];
    path_f32[base + 4] = ray_d[1];
    path_f32[base + 5] = ray_d[2];
    path_f32[base + 6] = throughput[0];
    path_f32[base + 7] = throughput[1];
    path_f32[base + 8] = throughput[2];
    path_f32[base + 9] = color[0];
    path_f32[base + 10] = color[1];
    path_f32[base + 11] = color[2];
    path_u32[state + 1] = remaining;
    path_u32[state + 2] = flags;
    path_u32[state + 3] = medium;
}

/// Direct-lighting reference integrator: one MIS estimate at the first
/// diffuse hit, specular chains passed through, then terminate.
#[cube(launch_unchecked)]
#[allow(clippy::too_many_arguments)]
pub(crate) fn shade_direct_mis(
    iteration: u32,
    depth: u32,
    seed: u32,
    num_paths: u32,
    path_f32: &mut Array<f32>,
    path_u32: &mut Array<u32>,
    isect_f32: &Array<f32>,
    isect_u32: &Array<u32>,
    material_f32: &Array<f32>,
    material_u32: &Array<u32>,
    tex_data: &Array<f32>,
    tex_desc: &Array<u32>,
    kd_nodes: &Array<u32>,
    kd_splits: &Array<f32>,
    kd_prim_geoms: &Array<u32>,
    kd_prim_tris: &Array<u32>,
    num_kd_nodes: u32,
    geom_f32: &Array<f32>,
    geom_u32: &Array<u32>,
    num_geoms: u32,
    tri_positions: &Array<f32>,
    tri_normals: &Array<f32>,
    tri_uvs: &Array<f32>,
    tri_indices: &Array<u32>,
    light_f32: &Array<f32>,
    light_u32: &Array<u32>,
    light_tri_cdf: &Array<f32>,
    num_lights: u32,
    env_data: &Array<f32>,
    env_width: u32,
    env_height: u32,
    env_present: u32,
) {
    let idx = ABSOLUTE_POS;
    if idx >= num_paths {
        terminate!();
    }

    let state = idx * PATH_U32_STRIDE;
    let mut remaining = path_u32[state + 1];
    if remaining == u32::new(0) {
        terminate!();
    }
    let pixel = path_u32[state];
    let mut flags = path_u32[state + 2];
    let mut medium = path_u32[state + 3];

    let base = idx * PATH_F32_STRIDE;
    let mut ray_o = Line::empty(3u32);
    let mut ray_d = Line::empty(3u32);
    let mut throughput = Line::empty(3u32);
    let mut color = Line::empty(3u32);
    ray_o[0] = path_f32[base];
    ray_o[1] = path_f32[base + 1];
    ray_o[2] = path_f32[base + 2];
    ray_d[0] = path_f32[base + 3];
    ray_d[1] = path_f32[base + 4];
    ray_d[2] = path_f32[base + 5];
    throughput[0] = path_f32[base + 6];
    throughput[1] = path_f32[base + 7];
    throughput[2] = path_f32[base + 8];
    color[0] = path_f32[base + 9];
    color[1] = path_f32[base + 10];
    color[2] = path_f32[base + 11];

    let isect_base = idx * ISECT_F32_STRIDE;
    let t = isect_f32[isect_base];
    let from_camera = (flags & FLAG_FROM_CAMERA) != u32::new(0);

    let mut rng = rng_seed(iteration, pixel, depth, seed);

    if t <= f32::new(0.0) {
        if from_camera && env_present != u32::new(0) {
            let le = env_radiance(env_data, env_width, env_height, ray_d[0], ray_d[1], ray_d[2]);
            color[0] += throughput[0] * le[0];
            color[1] += throughput[1] * le[1];
            color[2] += throughput[2] * le[2];
        }
        remaining = u32::new(0);
    } else {
        let isect_state = idx * ISECT_U32_STRIDE;
        let material_id = isect_u32[isect_state];
        let mat_base_f = (material_id * MATERIAL_F32_STRIDE);
        let mat_base_u = (material_id * MATERIAL_U32_STRIDE);
        let emittance = material_f32[mat_base_f + 8];
        let kind = material_u32[mat_base_u];

        if emittance > f32::new(0.0) {
            if from_camera {
                let le = light_emission(material_f32, material_id);
                color[0] += throughput[0] * le[0];
                color[1] += throughput[1] * le[1];
                color[2] += throughput[2] * le[2];
            }
            remaining = u32::new(0);
        } else if kind == MAT_SPEC_REFL || kind == MAT_SPEC_TRANS || kind == MAT_SPEC_FRESNEL {
            // Pass specular chains through so mirrors see the direct-lit
            // scene; emission stays first-hit-only.
            remaining -= u32::new(1);
            if remaining > u32::new(0) {
                let px = ray_o[0] + t * ray_d[0];
                let py = ray_o[1] + t * ray_d[1];
                let pz = ray_o[2] + t * ray_d[2];
                let mut event_flags = u32::new(0);
                let alive = scatter(
                    material_f32,
                    material_u32,
                    tex_data,
                    tex_desc,
                    material_id,
                    px,
                    py,
                    pz,
                    isect_f32[isect_base + 1],
                    isect_f32[isect_base + 2],
                    isect_f32[isect_base + 3],
                    ray_d[0],
                    ray_d[1],
                    ray_d[2],
                    isect_f32[isect_base + 7],
                    isect_f32[isect_base + 8],
                    &mut rng,
                    &mut ray_o,
                    &mut ray_d,
                    &mut throughput,
                    &mut event_flags,
                    &mut medium,
                );
                if !alive {
                    remaining = u32::new(0);
                }
            }
        } else {
            let px = ray_o[0] + t * ray_d[0];
            let py = ray_o[1] + t * ray_d[1];
            let pz = ray_o[2] + t * ray_d[2];
            let nx = isect_f32[isect_base + 1];
            let ny = isect_f32[isect_base + 2];
            let nz = isect_f32[isect_base + 3];
            let mut snx = nx;
            let mut sny = ny;
            let mut snz = nz;
            if vec3_dot(ray_d[0], ray_d[1], ray_d[2], nx, ny, nz) > f32::new(0.0) {
                snx = -nx;
                sny = -ny;
                snz = -nz;
            }
            let albedo = material_albedo(
                material_f32,
                material_u32,
                tex_data,
                tex_desc,
                material_id,
                isect_f32[isect_base + 7],
                isect_f32[isect_base + 8],
            );
            let ld = sample_uniform_light(
                kd_nodes,
                kd_splits,
                kd_prim_geoms,
                kd_prim_tris,
                num_kd_nodes,
                geom_f32,
                geom_u32,
                num_geoms,
                tri_positions,
                tri_normals,
                tri_uvs,
                tri_indices,
                material_f32,
                material_u32,
                light_f32,
                light_u32,
                light_tri_cdf,
                num_lights,
                env_data,
                env_width,
                env_height,
                env_present,
                material_id,
                albedo[0],
                albedo[1],
                albedo[2],
                px,
                py,
                pz,
                snx,
                sny,
                snz,
                -ray_d[0],
                -ray_d[1],
                -ray_d[2],
                &mut rng,
            );
            color[0] += throughput[0] * ld[0];
            color[1] += throughput[1] * ld[1];
            color[2] += throughput[2] * ld[2];
            remaining = u32::new(0);
        }
    }

    if !vec3_is_finite(color[0], color[1], color[2]) {
        color[0] = f32::new(0.0);
        color[1] = f32::new(0.0);
        color[2] = f32::new(0.0);
        remaining = u32::new(0);
    }

    flags &= FLAG_SPECULAR_BOUNCE | FLAG_IN_MEDIUM;
    path_f32[base] = ray_o[0];
    path_f32[base + 1] = ray_o[1];
    path_f32[base + 2] = ray_o[2];
    path_f32[base + 3] = ray_d[0];
    path_f32[base + 4] = ray_d[1];
    path_f32[base + 5] = ray_d[2];
    path_f32[base + 6] = throughput[0];
    path_f32[base + 7] = throughput[1];
    path_f32[base + 8] = throughput[2];
    path_f32[base + 9] = color[0];
    path_f32[base + 10] = color[1];
    path_f32[base + 11] = color[2];
    path_u32[state + 1] = remaining;
    path_u32[state + 2] = flags;
    path_u32[state + 3] = medium;
}

/// Full integrator: gated emission, MIS direct lighting on rough surfaces,
/// BSDF continuation, and Russian roulette below the threshold depth.
#[cube(launch_unchecked)]
#[allow(clippy::too_many_arguments)]
pub(crate) fn shade_full(
    iteration: u32,
    depth: u32,
    seed: u32,
    num_paths: u32,
    trace_depth: u32,
    russian_roulette: u32,
    path_f32: &mut Array<f32>,
    path_u32: &mut Array<u32>,
    isect_f32: &Array<f32>,
    isect_u32: &Array<u32>,
    material_f32: &Array<f32>,
    material_u32: &Array<u32>,
    tex_data: &Array<f32>,
    tex_desc: &Array<u32>,
    kd_nodes: &Array<u32>,
    kd_splits: &Array<f32>,
    kd_prim_geoms: &Array<u32>,
    kd_prim_tris: &Array<u32>,
    num_kd_nodes: u32,
    geom_f32: &Array<f32>,
    geom_u32: &Array<u32>,
    num_geoms: u32,
    tri_positions: &Array<f32>,
    tri_normals: &Array<f32>,
    tri_uvs: &Array<f32>,
    tri_indices: &Array<u32>,
    light_f32: &Array<f32>,
    light_u32: &Array<u32>,
    light_tri_cdf: &Array<f32>,
    num_lights: u32,
    env_data: &Array<f32>,
    env_width: u32,
    env_height: u32,
    env_present: u32,
) {
    let idx = ABSOLUTE_POS;
    if idx >= num_paths {
        terminate!();
    }

    let state = idx * PATH_U32_STRIDE;
    let mut remaining = path_u32[state + 1];
    if remaining == u32::new(0) {
        terminate!();
    }
    let pixel = path_u32[state];
    let mut flags = path_u32[state + 2];
    let mut medium = path_u32[state + 3];

    let base = idx * PATH_F32_STRIDE;
    let mut ray_o = Line::empty(3u32);
    let mut ray_d = Line::empty(3u32);
    let mut throughput = Line::empty(3u32);
    let mut color = Line::empty(3u32);
    ray_o[0] = path_f32[base];
    ray_o[1] = path_f32[base + 1];
    ray_o[2] = path_f32[base + 2];
    ray_d[0] = path_f32[base + 3];
    ray_d[1] = path_f32[base + 4];
    ray_d[2] = path_f32[base + 5];
    throughput[0] = path_f32[base + 6];
    throughput[1] = path_f32[base + 7];
    throughput[2] = path_f32[base + 8];
    color[0] = path_f32[base + 9];
    color[1] = path_f32[base + 10];
    color[2] = path_f32[base + 11];

    let isect_base = idx * ISECT_F32_STRIDE;
    let t = isect_f32[isect_base];
    let gathers_emission =
        (flags & (FLAG_FROM_CAMERA | FLAG_SPECULAR_BOUNCE)) != u32::new(0);

    let mut rng = rng_seed(iteration, pixel, depth, seed);

    let medium_event = sample_medium_event(
        material_f32,
        medium,
        t,
        &mut rng,
        &mut ray_o,
        &mut ray_d,
        &mut throughput,
    );

    if medium_event {
        flags &= FLAG_IN_MEDIUM;
        remaining -= u32::new(1);
    } else if t <= f32::new(0.0) {
        // The MIS estimate at the previous rough hit already accounted for
        // the environment, so only camera and specular paths gather it here.
        if gathers_emission && env_present != u32::new(0) {
            let le = env_radiance(env_data, env_width, env_height, ray_d[0], ray_d[1], ray_d[2]);
            color[0] += throughput[0] * le[0];
            color[1] += throughput[1] * le[1];
            color[2] += throughput[2] * le[2];
        }
        remaining = u32::new(0);
    } else {
        let isect_state = idx * ISECT_U32_STRIDE;
        let material_id = isect_u32[isect_state];
        let mat_base_f = (material_id * MATERIAL_F32_STRIDE);
        let mat_base_u = (material_id * MATERIAL_U32_STRIDE);
        let emittance = material_f32[mat_base_f + 8];
        let kind = material_u32[mat_base_u];

        if emittance > f32::new(0.0) {
            if gathers_emission {
                let le = light_emission(material_f32, material_id);
                color[0] += throughput[0] * le[0];
                color[1] += throughput[1] * le[1];
                color[2] += throughput[2] * le[2];
            }
            remaining = u32::new(0);
        } else {
            let px = ray_o[0] + t * ray_d[0];
            let py = ray_o[1] + t * ray_d[1];
            let pz = ray_o[2] + t * ray_d[2];
            let nx = isect_f32[isect_base + 1];
            let ny = isect_f32[isect_base + 2];
            let nz = isect_f32[isect_base + 3];
            let u = isect_f32[isect_base + 7];
            let v = isect_f32[isect_base + 8];

            if kind == MAT_DIFFUSE || kind == MAT_MICROFACET {
                let mut snx = nx;
                let mut sny = ny;
                let mut snz = nz;
                if vec3_dot(ray_d[0], ray_d[1], ray_d[2], nx, ny, nz) > f32::new(0.0) {
                    snx = -nx;
                    sny = -ny;
                    snz = -nz;
                }
                let albedo = material_albedo(
                    material_f32,
                    material_u32,
                    tex_data,
                    tex_desc,
                    material_id,
                    u,
                    v,
                );
                let ld = sample_uniform_light(
                    kd_nodes,
                    kd_splits,
                    kd_prim_geoms,
                    kd_prim_tris,
                    num_kd_nodes,
                    geom_f32,
                    geom_u32,
                    num_geoms,
                    tri_positions,
                    tri_normals,
                    tri_uvs,
                    tri_indices,
                    material_f32,
                    material_u32,
                    light_f32,
                    light_u32,
                    light_tri_cdf,
                    num_lights,
                    env_data,
                    env_width,
                    env_height,
                    env_present,
                    material_id,
                    albedo[0],
                    albedo[1],
                    albedo[2],
                    px,
                    py,
                    pz,
                    snx,
                    sny,
                    snz,
                    -ray_d[0],
                    -ray_d[1],
                    -ray_d[2],
                    &mut rng,
                );
                color[0] += throughput[0] * ld[0];
                color[1] += throughput[1] * ld[1];
                color[2] += throughput[2] * ld[2];
            }

            remaining -= u32::new(1);
            if remaining > u32::new(0) {
                let mut event_flags = u32::new(0);
                let alive = scatter(
                    material_f32,
                    material_u32,
                    tex_data,
                    tex_desc,
                    material_id,
                    px,
                    py,
                    pz,
                    nx,
                    ny,
                    nz,
                    ray_d[0],
                    ray_d[1],
                    ray_d[2],
                    u,
                    v,
                    &mut rng,
                    &mut ray_o,
                    &mut ray_d,
                    &mut throughput,
                    &mut event_flags,
                    &mut medium,
                );
                if alive {
                    flags = event_flags & FLAG_SPECULAR_BOUNCE;
                    if medium != NONE_U32 {
                        flags |= FLAG_IN_MEDIUM;
                    }

                    // Russian roulette below the threshold depth.
                    let rr_threshold = trace_depth - min_u32(trace_depth, u32::new(3));
                    if russian_roulette != u32::new(0) && remaining < rr_threshold {
                        let q = clamp_f32(
                            vec3_max_component(throughput[0], throughput[1], throughput[2]),
                            f32::new(0.05),
                            f32::new(1.0),
                        );
                        if rng_next_f32(&mut rng) > q {
                            remaining = u32::new(0);
                        } else {
                            throughput[0] /= q;
                            throughput[1] /= q;
                            throughput[2] /= q;
                        }
                    }
                } else {
                    remaining = u32::new(0);
                }
            }
        }
    }

    if !vec3_is_finite(color[0], color[1], color[2]) {
        color[0] = f32::new(0.0);
        color[1] = f32::new(0.0);
        color[2] = f32::new(0.0);
        remaining = u32::new(0);
    }

    path_f32[base] = ray_o[0];
    path_f32[base + 1] = ray_o[1];
    path_f32[base + 2] = ray_o[2];
    path_f32[base + 3] = ray_d[0];
    path_f32[base + 4] = ray_d[1];
    path_f32[base + 5] = ray_d[2];
    path_f32[base + 6] = throughput[0];
    path_f32[base + 7] = throughput[1];
    path_f32[base + 8] = throughput[2];
    path_f32[base + 9] = color[0];
    path_f32[base + 10] = color[1];
    path_f32[base + 11] = color[2];
    path_u32[state + 1] = remaining;
    path_u32[state + 2] = flags;
    path_u32[state + 3] = medium;
}
