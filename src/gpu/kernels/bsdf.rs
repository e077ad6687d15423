//! BSDF evaluation and scatter for the material variants.
//!
//! `scatter` advances a path across one surface event: it rewrites the ray,
//! multiplies the throughput by `f * |cos| / pdf`, and reports the specular /
//! medium flags. Sampled texture colors stay in kernel locals; shared
//! material records are never written from a kernel.

use cubecl::prelude::*;
use crate::gpu::constants::*;
use super::math::*;
use super::rng::*;
use super::sampling::*;

/// Resolve the base color of a material at a surface point, applying the
/// nearest-neighbor albedo texture when one is attached.
#[cube]
pub(crate) fn material_albedo(
    material_f32: &Array<f32>,
    material_u32: &Array<u32>,
    tex_data: &Array<f32>,
    tex_desc: &Array<u32>,
    material_id: u32,
    u: f32,
    v: f32,
) -> Line<f32> {
    let base_f = (material_id * MATERIAL_F32_STRIDE);
    let base_u = (material_id * MATERIAL_U32_STRIDE);
    let mut out = Line::empty(3u32);
    out[0] = material_f32[base_f];
    out[1] = material_f32[base_f + 1];
    out[2] = material_f32[base_f + 2];

    let tex_index = material_u32[base_u + 1];
    if tex_index != NONE_U32 {
        let desc_base = (tex_index * TEXTURE_DESC_STRIDE);
        let offset = tex_desc[desc_base];
        let width = tex_desc[desc_base + 1];
        let height = tex_desc[desc_base + 2];
        let uu = u - u.floor();
        let vv = v - v.floor();
        let tx_f = uu * f32::cast_from(width);
        let ty_f = vv * f32::cast_from(height);
        let mut tx = tx_f as u32;
        let mut ty = ty_f as u32;
        if tx >= width {
            tx = width - u32::new(1);
        }
        if ty >= height {
            ty = height - u32::new(1);
        }
        let texel = (offset + (ty * width + tx) * u32::new(3));
        out[0] = tex_data[texel];
        out[1] = tex_data[texel + 1];
        out[2] = tex_data[texel + 2];
    }
    out
}

/// Evaluate the BSDF and its solid-angle pdf for a non-specular material.
/// Returns [f_r, f_g, f_b, pdf]; zero for specular variants or directions in
/// the wrong hemisphere. `n` is the shading normal oriented toward `wo`.
#[cube]
#[allow(clippy::too_many_arguments)]
pub(crate) fn bsdf_eval(
    material_f32: &Array<f32>,
    material_u32: &Array<u32>,
    material_id: u32,
    albedo_r: f32,
    albedo_g: f32,
    albedo_b: f32,
    nx: f32,
    ny: f32,
    nz: f32,
    wox: f32,
    woy: f32,
    woz: f32,
    wix: f32,
    wiy: f32,
    wiz: f32,
) -> Line<f32> {
    let base_f = (material_id * MATERIAL_F32_STRIDE);
    let base_u = (material_id * MATERIAL_U32_STRIDE);
    let kind = material_u32[base_u];

    let mut out = Line::empty(4u32);
    out[0] = f32::new(0.0);
    out[1] = f32::new(0.0);
    out[2] = f32::new(0.0);
    out[3] = f32::new(0.0);

    let cos_o = vec3_dot(wox, woy, woz, nx, ny, nz);
    let cos_i = vec3_dot(wix, wiy, wiz, nx, ny, nz);

    if cos_o > f32::new(0.0) && cos_i > f32::new(0.0) {
        if kind == MAT_DIFFUSE {
            out[0] = albedo_r * f32::new(INV_PI);
            out[1] = albedo_g * f32::new(INV_PI);
            out[2] = albedo_b * f32::new(INV_PI);
            out[3] = cosine_hemisphere_pdf(cos_i);
        } else if kind == MAT_MICROFACET {
            let hraw = vec3_normalize(wox + wix, woy + wiy, woz + wiz);
            let cos_h = vec3_dot(hraw[0], hraw[1], hraw[2], nx, ny, nz);
            let cos_oh = vec3_dot(wox, woy, woz, hraw[0], hraw[1], hraw[2]);
            if cos_h > f32::new(0.0) && cos_oh > f32::new(0.0) {
                let roughness = material_f32[base_f + 7];
                let alpha = max_f32(roughness * roughness, f32::new(1.0e-3));
                let ior = material_f32[base_f + 6];
                let fresnel = schlick_fresnel(cos_oh, f32::new(1.0), ior);
                let d = ggx_d(cos_h, alpha);
                let g = smith_g(cos_o, cos_i, alpha);
                let denom = f32::new(4.0) * cos_o * cos_i;
                let spec = fresnel * d * g / max_f32(denom, f32::new(1.0e-8));
                out[0] = material_f32[base_f + 3] * spec;
                out[1] = material_f32[base_f + 4] * spec;
                out[2] = material_f32[base_f + 5] * spec;
                out[3] = ggx_vndf_pdf(cos_o, cos_h, alpha);
            }
        }
    }
    out
}

/// Sample a continuation direction for a non-specular material. Returns
/// [wix, wiy, wiz, valid]; pair with `bsdf_eval` for the value and pdf.
#[cube]
#[allow(clippy::too_many_arguments)]
pub(crate) fn bsdf_sample_dir(
    material_f32: &Array<f32>,
    material_u32: &Array<u32>,
    material_id: u32,
    nx: f32,
    ny: f32,
    nz: f32,
    wox: f32,
    woy: f32,
    woz: f32,
    rng: &mut u32,
) -> Line<f32> {
    let base_f = (material_id * MATERIAL_F32_STRIDE);
    let base_u = (material_id * MATERIAL_U32_STRIDE);
    let kind = material_u32[base_u];

    let mut out = Line::empty(4u32);
    out[0] = f32::new(0.0);
    out[1] = f32::new(0.0);
    out[2] = f32::new(0.0);
    out[3] = f32::new(0.0);

    let u1 = rng_next_f32(rng);
    let u2 = rng_next_f32(rng);

    if kind == MAT_DIFFUSE {
        let local = cosine_hemisphere(u1, u2);
        if local[2] > f32::new(0.0) {
            let world = local_to_world(local[0], local[1], local[2], nx, ny, nz);
            out[0] = world[0];
            out[1] = world[1];
            out[2] = world[2];
            out[3] = f32::new(1.0);
        }
    } else if kind == MAT_MICROFACET {
        // Express wo in the shading frame, sample a visible microfacet
        // normal, and mirror wo about it.
        let mut tangent = Line::empty(3u32);
        let mut bitangent = Line::empty(3u32);
        build_frame(nx, ny, nz, &mut tangent, &mut bitangent);
        let lo_x = vec3_dot(wox, woy, woz, tangent[0], tangent[1], tangent[2]);
        let lo_y = vec3_dot(wox, woy, woz, bitangent[0], bitangent[1], bitangent[2]);
        let lo_z = vec3_dot(wox, woy, woz, nx, ny, nz);
        if lo_z > f32::new(0.0) {
            let roughness = material_f32[base_f + 7];
            let alpha = max_f32(roughness * roughness, f32::new(1.0e-3));
            let h = ggx_sample_vndf(lo_x, lo_y, lo_z, alpha, u1, u2);
            let oh = lo_x * h[0] + lo_y * h[1] + lo_z * h[2];
            let li_x = f32::new(2.0) * oh * h[0] - lo_x;
            let li_y = f32::new(2.0) * oh * h[1] - lo_y;
            let li_z = f32::new(2.0) * oh * h[2] - lo_z;
            if li_z > f32::new(0.0) {
                let wx = li_x * tangent[0] + li_y * bitangent[0] + li_z * nx;
                let wy = li_x * tangent[1] + li_y * bitangent[1] + li_z * ny;
                let wz = li_x * tangent[2] + li_y * bitangent[2] + li_z * nz;
                out[0] = wx;
                out[1] = wy;
                out[2] = wz;
                out[3] = f32::new(1.0);
            }
        }
    }
    out
}

/// Scatter one path across a surface event.
///
/// `dx..dz` is the current (unit) ray direction, `n` the outward geometric
/// normal. On success the ray origin/direction and throughput lines are
/// rewritten in place; `out_flags` reports the event kind and `out_medium`
/// (seeded by the caller with the path's current medium) is updated on
/// refraction through a medium boundary. Returns false when the path must
/// terminate (emissive hit reached here, degenerate sample, wrong
/// hemisphere).
#[cube]
#[allow(clippy::too_many_arguments)]
pub(crate) fn scatter(
    material_f32: &Array<f32>,
    material_u32: &Array<u32>,
    tex_data: &Array<f32>,
    tex_desc: &Array<u32>,
    material_id: u32,
    px: f32,
    py: f32,
    pz: f32,
    nx: f32,
    ny: f32,
    nz: f32,
    dx: f32,
    dy: f32,
    dz: f32,
    u: f32,
    v: f32,
    rng: &mut u32,
    ray_o: &mut Line<f32>,
    ray_d: &mut Line<f32>,
    throughput: &mut Line<f32>,
    out_flags: &mut u32,
    out_medium: &mut u32,
) -> bool {
    let base_f = (material_id * MATERIAL_F32_STRIDE);
    let base_u = (material_id * MATERIAL_U32_STRIDE);
    let kind = material_u32[base_u];
    let has_medium = material_u32[base_u + 2];

    let eps = f32::new(RAY_EPSILON);
    let mut alive = true;
    *out_flags = u32::new(0);

    // Shading normal oriented against the incident ray; `entering` is true
    // when the ray arrives from the outside of a closed surface.
    let entering = vec3_dot(dx, dy, dz, nx, ny, nz) < f32::new(0.0);
    let mut snx = nx;
    let mut sny = ny;
    let mut snz = nz;
    if !entering {
        snx = -nx;
        sny = -ny;
        snz = -nz;
    }

    if kind == MAT_DIFFUSE {
        let albedo = material_albedo(material_f32, material_u32, tex_data, tex_desc, material_id, u, v);
        let u1 = rng_next_f32(rng);
        let u2 = rng_next_f32(rng);
        let local = cosine_hemisphere(u1, u2);
        if local[2] <= f32::new(0.0) {
            alive = false;
        } else {
            let world = local_to_world(local[0], local[1], local[2], snx, sny, snz);
            // f * cos / pdf collapses to the albedo for a Lambertian lobe.
            throughput[0] *= albedo[0];
            throughput[1] *= albedo[1];
            throughput[2] *= albedo[2];
            ray_d[0] = world[0];
            ray_d[1] = world[1];
            ray_d[2] = world[2];
            ray_o[0] = px + eps * world[0];
            ray_o[1] = py + eps * world[1];
            ray_o[2] = pz + eps * world[2];
        }
    } else if kind == MAT_SPEC_REFL {
        let refl = reflect(dx, dy, dz, snx, sny, snz);
        throughput[0] *= material_f32[base_f + 3];
        throughput[1] *= material_f32[base_f + 4];
        throughput[2] *= material_f32[base_f + 5];
        ray_d[0] = refl[0];
        ray_d[1] = refl[1];
        ray_d[2] = refl[2];
        ray_o[0] = px + eps * refl[0];
        ray_o[1] = py + eps * refl[1];
        ray_o[2] = pz + eps * refl[2];
        *out_flags = FLAG_SPECULAR_BOUNCE;
    } else if kind == MAT_SPEC_TRANS || kind == MAT_SPEC_FRESNEL {
        let ior = material_f32[base_f + 6];
        let mut eta_i = f32::new(1.0);
        let mut eta_t = ior;
        if !entering {
            eta_i = ior;
            eta_t = f32::new(1.0);
        }

        let cos_i = -vec3_dot(dx, dy, dz, snx, sny, snz);
        let mut choose_reflect = false;
        if kind == MAT_SPEC_FRESNEL {
            let fresnel = schlick_fresnel(cos_i, eta_i, eta_t);
            if rng_next_f32(rng) < fresnel {
                choose_reflect = true;
            }
        }

        let mut refr = Line::empty(4u32);
        refr[3] = f32::new(1.0);
        if !choose_reflect {
            refr = refract(dx, dy, dz, snx, sny, snz, eta_i / eta_t);
        }

        throughput[0] *= material_f32[base_f + 3];
        throughput[1] *= material_f32[base_f + 4];
        throughput[2] *= material_f32[base_f + 5];

        if choose_reflect || refr[3] != f32::new(0.0) {
            // Fresnel-selected or total internal reflection.
            let refl = reflect(dx, dy, dz, snx, sny, snz);
            ray_d[0] = refl[0];
            ray_d[1] = refl[1];
            ray_d[2] = refl[2];
            ray_o[0] = px + eps * refl[0];
            ray_o[1] = py + eps * refl[1];
            ray_o[2] = pz + eps * refl[2];
        } else {
            let dir = vec3_normalize(refr[0], refr[1], refr[2]);
            ray_d[0] = dir[0];
            ray_d[1] = dir[1];
            ray_d[2] = dir[2];
            // Offset through the surface, against the shading normal.
            ray_o[0] = px - eps * snx;
            ray_o[1] = py - eps * sny;
            ray_o[2] = pz - eps * snz;
            if has_medium != u32::new(0) {
                if entering {
                    *out_medium = material_id;
                } else {
                    *out_medium = NONE_U32;
                }
            }
        }
        *out_flags |= FLAG_SPECULAR_BOUNCE;
    } else if kind == MAT_MICROFACET {
        let wox = -dx;
        let woy = -dy;
        let woz = -dz;
        let dir = bsdf_sample_dir(
            material_f32,
            material_u32,
            material_id,
            snx,
            sny,
            snz,
            wox,
            woy,
            woz,
            rng,
        );
        if dir[3] == f32::new(0.0) {
            alive = false;
        } else {
            // f * cos / pdf for the VNDF sampler reduces to F * G1(wi).
            let hraw = vec3_normalize(wox + dir[0], woy + dir[1], woz + dir[2]);
            let cos_oh = vec3_dot(wox, woy, woz, hraw[0], hraw[1], hraw[2]);
            let cos_i = vec3_dot(dir[0], dir[1], dir[2], snx, sny, snz);
            let roughness = material_f32[base_f + 7];
            let alpha = max_f32(roughness * roughness, f32::new(1.0e-3));
            let ior = material_f32[base_f + 6];
            let fresnel = schlick_fresnel(cos_oh, f32::new(1.0), ior);
            let weight = fresnel * smith_g1(cos_i, alpha);
            throughput[0] *= material_f32[base_f + 3] * weight;
            throughput[1] *= material_f32[base_f + 4] * weight;
            throughput[2] *= material_f32[base_f + 5] * weight;
            ray_d[0] = dir[0];
            ray_d[1] = dir[1];
            ray_d[2] = dir[2];
            ray_o[0] = px + eps * dir[0];
            ray_o[1] = py + eps * dir[1];
            ray_o[2] = pz + eps * dir[2];
        }
    } else {
        // Emission is handled by the integrators, never scattered.
        alive = false;
    }

    if alive && !vec3_is_finite(throughput[0], throughput[1], throughput[2]) {
        alive = false;
    }
    alive
}
