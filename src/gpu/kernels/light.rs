//! Light selection, area/environment sampling, and the MIS direct estimate.

use cubecl::prelude::*;
use crate::gpu::constants::*;
use super::bsdf::*;
use super::intersect::*;
use super::math::*;
use super::rng::*;
use super::sampling::*;

/// Lat-long lookup of the environment radiance for a world direction.
#[cube]
pub(crate) fn env_radiance(
    env_data: &Array<f32>,
    env_width: u32,
    env_height: u32,
    dx: f32,
    dy: f32,
    dz: f32,
) -> Line<f32> {
    let mut out = Line::empty(3u32);
    out[0] = f32::new(0.0);
    out[1] = f32::new(0.0);
    out[2] = f32::new(0.0);
    if env_width > u32::new(0) && env_height > u32::new(0) {
        let u = f32::new(0.5) + dz.atan2(dx) * f32::new(INV_PI) * f32::new(0.5);
        let horiz = (dx * dx + dz * dz).sqrt();
        let v = horiz.atan2(dy) * f32::new(INV_PI);
        let mut x = (u * f32::cast_from(env_width)) as u32;
        let mut y = (v * f32::cast_from(env_height)) as u32;
        if x >= env_width {
            x = env_width - u32::new(1);
        }
        if y >= env_height {
            y = env_height - u32::new(1);
        }
        let texel = ((y * env_width + x) * u32::new(3));
        out[0] = env_data[texel];
        out[1] = env_data[texel + 1];
        out[2] = env_data[texel + 2];
    }
    out
}

/// Emitted radiance of an area light's material.
#[cube]
pub(crate) fn light_emission(
    material_f32: &Array<f32>,
    material_id: u32,
) -> Line<f32> {
    let base_f = (material_id * MATERIAL_F32_STRIDE);
    let emittance = material_f32[base_f + 8];
    let mut out = Line::empty(3u32);
    out[0] = material_f32[base_f] * emittance;
    out[1] = material_f32[base_f + 1] * emittance;
    out[2] = material_f32[base_f + 2] * emittance;
    out
}

/// Draw a uniform point on an area light's surface. Writes the world-space
/// point into `out_point` and the light normal into `out_normal`; returns the
/// area-measure pdf (1 / surface area).
#[cube]
#[allow(clippy::too_many_arguments)]
pub(crate) fn sample_light_point(
    geom_f32: &Array<f32>,
    geom_u32: &Array<u32>,
    tri_positions: &Array<f32>,
    tri_indices: &Array<u32>,
    light_f32: &Array<f32>,
    light_u32: &Array<u32>,
    light_tri_cdf: &Array<f32>,
    light_index: u32,
    rng: &mut u32,
    out_point: &mut Line<f32>,
    out_normal: &mut Line<f32>,
) -> f32 {
    let light_base_u = (light_index * LIGHT_U32_STRIDE);
    let light_base_f = (light_index * LIGHT_F32_STRIDE);
    let geom_id = light_u32[light_base_u];
    let area = light_f32[light_base_f];

    let base_f = geom_id * GEOM_F32_STRIDE;
    let bf = base_f;
    let base_u = (geom_id * GEOM_U32_STRIDE);
    let kind = geom_u32[base_u];

    let u1 = rng_next_f32(rng);
    let u2 = rng_next_f32(rng);
    let u3 = rng_next_f32(rng);

    if kind == GEOM_SPHERE {
        let dir = uniform_sphere(u1, u2);
        let half = f32::new(0.5);
        let p = xform_point(geom_f32, base_f, dir[0] * half, dir[1] * half, dir[2] * half);
        let n = xform_normal(geom_f32, base_f + 24, dir[0], dir[1], dir[2]);
        out_point[0] = p[0];
        out_point[1] = p[1];
        out_point[2] = p[2];
        out_normal[0] = n[0];
        out_normal[1] = n[1];
        out_normal[2] = n[2];
    } else if kind == GEOM_CUBE {
        // World-space face areas from the transformed unit axes.
        let exx = geom_f32[bf];
        let exy = geom_f32[bf + 4];
        let exz = geom_f32[bf + 8];
        let eyx = geom_f32[bf + 1];
        let eyy = geom_f32[bf + 5];
        let eyz = geom_f32[bf + 9];
        let ezx = geom_f32[bf + 2];
        let ezy = geom_f32[bf + 6];
        let ezz = geom_f32[bf + 10];
        let cx = vec3_cross(eyx, eyy, eyz, ezx, ezy, ezz);
        let cy = vec3_cross(ezx, ezy, ezz, exx, exy, exz);
        let cz = vec3_cross(exx, exy, exz, eyx, eyy, eyz);
        let ax = vec3_length(cx[0], cx[1], cx[2]);
        let ay = vec3_length(cy[0], cy[1], cy[2]);
        let az = vec3_length(cz[0], cz[1], cz[2]);
        let total = ax + ay + az;

        let half = f32::new(0.5);
        let a = u1 - half;
        let b = u2 - half;
        let pick = u3 * total;
        let side = rng_next_f32(rng);
        let mut s = half;
        if side < half {
            s = -half;
        }

        let mut lx = s;
        let mut ly = a;
        let mut lz = b;
        let mut onx = sign_f32(s);
        let mut ony = f32::new(0.0);
        let mut onz = f32::new(0.0);
        if pick >= ax && pick < ax + ay {
            lx = a;
            ly = s;
            lz = b;
            onx = f32::new(0.0);
            ony = sign_f32(s);
        } else if pick >= ax + ay {
            lx = a;
            ly = b;
            lz = s;
            onx = f32::new(0.0);
            onz = sign_f32(s);
        }

        let p = xform_point(geom_f32, base_f, lx, ly, lz);
        let n = xform_normal(geom_f32, base_f + 24, onx, ony, onz);
        out_point[0] = p[0];
        out_point[1] = p[1];
        out_point[2] = p[2];
        out_normal[0] = n[0];
        out_normal[1] = n[1];
        out_normal[2] = n[2];
    } else {
        // Area-weighted triangle pick through the prefix-sum table, so the
        // area pdf stays uniform over the whole emitter.
        let cdf_offset = light_u32[light_base_u + 2];
        let cdf_count = light_u32[light_base_u + 3];
        let mut tri = u32::new(0);
        let mut i = u32::new(0);
        while i < cdf_count {
            if u3 <= light_tri_cdf[(cdf_offset + i)] {
                tri = i;
                i = cdf_count;
            } else {
                i += u32::new(1);
            }
        }

        let tri_start = geom_u32[base_u + 2];
        let tri_base = ((tri_start + tri) * 3);
        let i0 = (tri_indices[tri_base] * 3);
        let i1 = (tri_indices[tri_base + 1] * 3);
        let i2 = (tri_indices[tri_base + 2] * 3);

        let bary = uniform_triangle(u1, u2);
        let b0 = bary[0];
        let b1 = bary[1];
        let b2 = f32::new(1.0) - b0 - b1;
        let lx = b0 * tri_positions[i0] + b1 * tri_positions[i1] + b2 * tri_positions[i2];
        let ly = b0 * tri_positions[i0 + 1] + b1 * tri_positions[i1 + 1] + b2 * tri_positions[i2 + 1];
        let lz = b0 * tri_positions[i0 + 2] + b1 * tri_positions[i1 + 2] + b2 * tri_positions[i2 + 2];
        let p = xform_point(geom_f32, base_f, lx, ly, lz);

        let e1 = xform_dir(
            geom_f32,
            base_f,
            tri_positions[i1] - tri_positions[i0],
            tri_positions[i1 + 1] - tri_positions[i0 + 1],
            tri_positions[i1 + 2] - tri_positions[i0 + 2],
        );
        let e2 = xform_dir(
            geom_f32,
            base_f,
            tri_positions[i2] - tri_positions[i0],
            tri_positions[i2 + 1] - tri_positions[i0 + 1],
            tri_positions[i2 + 2] - tri_positions[i0 + 2],
        );
        let c = vec3_cross(e1[0], e1[1], e1[2], e2[0], e2[1], e2[2]);
        let n = vec3_normalize(c[0], c[1], c[2]);
        out_point[0] = p[0];
        out_point[1] = p[1];
        out_point[2] = p[2];
        out_normal[0] = n[0];
        out_normal[1] = n[1];
        out_normal[2] = n[2];
    }

    f32::new(1.0) / max_f32(area, f32::new(1.0e-8))
}

/// Direct-lighting estimate at one shading point with multiple importance
/// sampling (power heuristic) over the light-sample and BSDF-sample
/// strategies. Pure specular materials must not call this.
///
/// Picks one source uniformly from the area lights plus the environment (if
/// present), evaluates both strategies against it, and scales by the number
/// of sources.
#[cube]
#[allow(clippy::too_many_arguments)]
pub(crate) fn sample_uniform_light(
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
    material_f32: &Array<f32>,
    material_u32: &Array<u32>,
    light_f32: &Array<f32>,
    light_u32: &Array<u32>,
    light_tri_cdf: &Array<f32>,
    num_lights: u32,
    env_data: &Array<f32>,
    env_width: u32,
    env_height: u32,
    env_present: u32,
    material_id: u32,
    albedo_r: f32,
    albedo_g: f32,
    albedo_b: f32,
    px: f32,
    py: f32,
    pz: f32,
    nx: f32,
    ny: f32,
    nz: f32,
    wox: f32,
    woy: f32,
    woz: f32,
    rng: &mut u32,
) -> Line<f32> {
    let mut ld = Line::empty(3u32);
    ld[0] = f32::new(0.0);
    ld[1] = f32::new(0.0);
    ld[2] = f32::new(0.0);

    let num_sources = num_lights + env_present;
    if num_sources > u32::new(0) {
        let eps = f32::new(RAY_EPSILON);
        let pick = rng_next_u32(rng) % num_sources;
        let picked_env = pick >= num_lights;

        // Scratch reused by both visibility queries.
        let mut vis_normal = Line::empty(3u32);
        let mut vis_tangent = Line::empty(3u32);
        let mut vis_uv = Line::empty(2u32);
        let mut vis_material = NONE_U32;
        let mut vis_geom = NONE_U32;

        if picked_env {
            // Light-sampling strategy: cosine-weighted about the normal.
            let u1 = rng_next_f32(rng);
            let u2 = rng_next_f32(rng);
            let local = cosine_hemisphere(u1, u2);
            if local[2] > f32::new(0.0) {
                let wi = local_to_world(local[0], local[1], local[2], nx, ny, nz);
                let pdf_light = cosine_hemisphere_pdf(local[2]);
                let t = scene_intersect(
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
                    px + eps * wi[0],
                    py + eps * wi[1],
                    pz + eps * wi[2],
                    wi[0],
                    wi[1],
                    wi[2],
                    &mut vis_normal,
                    &mut vis_tangent,
                    &mut vis_uv,
                    &mut vis_material,
                    &mut vis_geom,
                );
                if t <= f32::new(0.0) {
                    let le = env_radiance(env_data, env_width, env_height, wi[0], wi[1], wi[2]);
                    let fe = bsdf_eval(
                        material_f32,
                        material_u32,
                        material_id,
                        albedo_r,
                        albedo_g,
                        albedo_b,
                        nx,
                        ny,
                        nz,
                        wox,
                        woy,
                        woz,
                        wi[0],
                        wi[1],
                        wi[2],
                    );
                    let cos_s = local[2];
                    let weight = power_heuristic(pdf_light, fe[3]);
                    let scale = weight * cos_s / pdf_light;
                    ld[0] += fe[0] * le[0] * scale;
                    ld[1] += fe[1] * le[1] * scale;
                    ld[2] += fe[2] * le[2] * scale;
                }
            }

            // BSDF-sampling strategy against the same source.
            let dir = bsdf_sample_dir(
                material_f32,
                material_u32,
                material_id,
                nx,
                ny,
                nz,
                wox,
                woy,
                woz,
                rng,
            );
            if dir[3] != f32::new(0.0) {
                let fe = bsdf_eval(
                    material_f32,
                    material_u32,
                    material_id,
                    albedo_r,
                    albedo_g,
                    albedo_b,
                    nx,
                    ny,
                    nz,
                    wox,
                    woy,
                    woz,
                    dir[0],
                    dir[1],
                    dir[2],
                );
                if fe[3] > f32::new(0.0) {
                    let t = scene_intersect(
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
                        px + eps * dir[0],
                        py + eps * dir[1],
                        pz + eps * dir[2],
                        dir[0],
                        dir[1],
                        dir[2],
                        &mut vis_normal,
                        &mut vis_tangent,
                        &mut vis_uv,
                        &mut vis_material,
                        &mut vis_geom,
                    );
                    if t <= f32::new(0.0) {
                        let le = env_radiance(env_data, env_width, env_height, dir[0], dir[1], dir[2]);
                        let cos_s = vec3_dot(dir[0], dir[1], dir[2], nx, ny, nz);
                        let pdf_light = cosine_hemisphere_pdf(cos_s);
                        let weight = power_heuristic(fe[3], pdf_light);
                        let scale = weight * max_f32(cos_s, f32::new(0.0)) / fe[3];
                        ld[0] += fe[0] * le[0] * scale;
                        ld[1] += fe[1] * le[1] * scale;
                        ld[2] += fe[2] * le[2] * scale;
                    }
                }
            }
        } else {
            let light_base_u = (pick * LIGHT_U32_STRIDE);
            let light_geom = light_u32[light_base_u];
            let light_material = geom_u32[(light_geom * GEOM_U32_STRIDE + u32::new(1))];
            let le = light_emission(material_f32, light_material);
            let light_area = light_f32[(pick * LIGHT_F32_STRIDE)];
            let pdf_area = f32::new(1.0) / max_f32(light_area, f32::new(1.0e-8));

            // Light-sampling strategy: uniform point on the emitter surface.
            let mut lp = Line::empty(3u32);
            let mut ln = Line::empty(3u32);
            let pdf_a = sample_light_point(
                geom_f32,
                geom_u32,
                tri_positions,
                tri_indices,
                light_f32,
                light_u32,
                light_tri_cdf,
                pick,
                rng,
                &mut lp,
                &mut ln,
            );
            let dxv = lp[0] - px;
            let dyv = lp[1] - py;
            let dzv = lp[2] - pz;
            let dist2 = vec3_dot(dxv, dyv, dzv, dxv, dyv, dzv);
            let dist = dist2.sqrt();
            if dist > f32::new(1.0e-5) {
                let wix = dxv / dist;
                let wiy = dyv / dist;
                let wiz = dzv / dist;
                // Two-sided emitter.
                let cos_l = abs_f32(vec3_dot(ln[0], ln[1], ln[2], -wix, -wiy, -wiz));
                let cos_s = vec3_dot(wix, wiy, wiz, nx, ny, nz);
                if cos_l > f32::new(1.0e-6) && cos_s > f32::new(0.0) {
                    let t = scene_intersect(
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
                        px + eps * wix,
                        py + eps * wiy,
                        pz + eps * wiz,
                        wix,
                        wiy,
                        wiz,
                        &mut vis_normal,
                        &mut vis_tangent,
                        &mut vis_uv,
                        &mut vis_material,
                        &mut vis_geom,
                    );
                    let visible = vis_geom == light_geom
                        && t > f32::new(0.0)
                        && abs_f32(t - dist) < f32::new(0.01) * dist + f32::new(0.01);
                    if visible {
                        let pdf_light = pdf_area_to_solid_angle(pdf_a, dist2, cos_l);
                        let fe = bsdf_eval(
                            material_f32,
                            material_u32,
                            material_id,
                            albedo_r,
                            albedo_g,
                            albedo_b,
                            nx,
                            ny,
                            nz,
                            wox,
                            woy,
                            woz,
                            wix,
                            wiy,
                            wiz,
                        );
                        if pdf_light > f32::new(0.0) {
                            let weight = power_heuristic(pdf_light, fe[3]);
                            let scale = weight * cos_s / pdf_light;
                            ld[0] += fe[0] * le[0] * scale;
                            ld[1] += fe[1] * le[1] * scale;
                            ld[2] += fe[2] * le[2] * scale;
                        }
                    }
                }
            }

            // BSDF-sampling strategy against the same emitter.
            let dir = bsdf_sample_dir(
                material_f32,
                material_u32,
                material_id,
                nx,
                ny,
                nz,
                wox,
                woy,
                woz,
                rng,
            );
            if dir[3] != f32::new(0.0) {
                let fe = bsdf_eval(
                    material_f32,
                    material_u32,
                    material_id,
                    albedo_r,
                    albedo_g,
                    albedo_b,
                    nx,
                    ny,
                    nz,
                    wox,
                    woy,
                    woz,
                    dir[0],
                    dir[1],
                    dir[2],
                );
                if fe[3] > f32::new(0.0) {
                    let t = scene_intersect(
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
                        px + eps * dir[0],
                        py + eps * dir[1],
                        pz + eps * dir[2],
                        dir[0],
                        dir[1],
                        dir[2],
                        &mut vis_normal,
                        &mut vis_tangent,
                        &mut vis_uv,
                        &mut vis_material,
                        &mut vis_geom,
                    );
                    if t > f32::new(0.0) && vis_geom == light_geom {
                        let cos_l = abs_f32(vec3_dot(
                            vis_normal[0],
                            vis_normal[1],
                            vis_normal[2],
                            -dir[0],
                            -dir[1],
                            -dir[2],
                        ));
                        let cos_s = vec3_dot(dir[0], dir[1], dir[2], nx, ny, nz);
                        if cos_l > f32::new(1.0e-6) && cos_s > f32::new(0.0) {
                            let pdf_light = pdf_area_to_solid_angle(pdf_area, t * t, cos_l);
                            let weight = power_heuristic(fe[3], pdf_light);
                            let scale = weight * cos_s / fe[3];
                            ld[0] += fe[0] * le[0] * scale;
                            ld[1] += fe[1] * le[1] * scale;
                            ld[2] += fe[2] * le[2] * scale;
                        }
                    }
                }
            }
        }

        // Undo the 1/N selection probability.
        let n_l = f32::cast_from(num_sources);
        ld[0] *= n_l;
        ld[1] *= n_l;
        ld[2] *= n_l;
    }
    ld
}
