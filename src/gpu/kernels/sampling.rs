//! Sampling routines and pdf conversions used by BSDF and light kernels.

use cubecl::prelude::*;
use crate::gpu::constants::*;
use super::math::*;

/// Concentric map of the unit square onto the unit disk.
#[cube]
pub(crate) fn concentric_disk(u1: f32, u2: f32) -> Line<f32> {
    let mut out = Line::empty(2u32);
    let ox = f32::new(2.0) * u1 - f32::new(1.0);
    let oy = f32::new(2.0) * u2 - f32::new(1.0);
    if ox == f32::new(0.0) && oy == f32::new(0.0) {
        out[0] = f32::new(0.0);
        out[1] = f32::new(0.0);
    } else {
        let quarter_pi = f32::new(PI) * f32::new(0.25);
        let mut r = oy;
        let mut theta = f32::new(PI) * f32::new(0.5) - quarter_pi * (ox / oy);
        if abs_f32(ox) > abs_f32(oy) {
            r = ox;
            theta = quarter_pi * (oy / ox);
        }
        out[0] = r * theta.cos();
        out[1] = r * theta.sin();
    }
    out
}

/// Cosine-weighted hemisphere sample in the local frame (z up), built by
/// lifting a concentric disk sample.
#[cube]
pub(crate) fn cosine_hemisphere(u1: f32, u2: f32) -> Line<f32> {
    let disk = concentric_disk(u1, u2);
    let mut out = Line::empty(3u32);
    let r2 = disk[0] * disk[0] + disk[1] * disk[1];
    out[0] = disk[0];
    out[1] = disk[1];
    out[2] = max_f32(f32::new(0.0), f32::new(1.0) - r2).sqrt();
    out
}

/// Pdf of `cosine_hemisphere` in solid-angle measure.
#[cube]
pub(crate) fn cosine_hemisphere_pdf(cos_theta: f32) -> f32 {
    max_f32(cos_theta, f32::new(0.0)) * f32::new(INV_PI)
}

/// Uniform direction on the unit sphere.
#[cube]
pub(crate) fn uniform_sphere(u1: f32, u2: f32) -> Line<f32> {
    let mut out = Line::empty(3u32);
    let z = f32::new(1.0) - f32::new(2.0) * u1;
    let r = max_f32(f32::new(0.0), f32::new(1.0) - z * z).sqrt();
    let phi = f32::new(TWO_PI) * u2;
    out[0] = r * phi.cos();
    out[1] = r * phi.sin();
    out[2] = z;
    out
}

/// Uniform barycentric sample of a triangle; returns (b0, b1), b2 implied.
#[cube]
pub(crate) fn uniform_triangle(u1: f32, u2: f32) -> Line<f32> {
    let mut out = Line::empty(2u32);
    let su = u1.sqrt();
    out[0] = f32::new(1.0) - su;
    out[1] = u2 * su;
    out
}

/// GGX normal distribution evaluated at `cos_h = n . h`.
#[cube]
pub(crate) fn ggx_d(cos_h: f32, alpha: f32) -> f32 {
    let a2 = alpha * alpha;
    let c = max_f32(cos_h, f32::new(0.0));
    let d = c * c * (a2 - f32::new(1.0)) + f32::new(1.0);
    a2 / max_f32(f32::new(PI) * d * d, f32::new(1.0e-8))
}

/// Smith height-correlated masking term for one direction.
#[cube]
pub(crate) fn smith_g1(cos_v: f32, alpha: f32) -> f32 {
    let a2 = alpha * alpha;
    let c = abs_f32(cos_v);
    let denom = c + (a2 + (f32::new(1.0) - a2) * c * c).sqrt();
    f32::new(2.0) * c / max_f32(denom, f32::new(1.0e-8))
}

/// Separable Smith shadowing-masking for view and light directions.
#[cube]
pub(crate) fn smith_g(cos_o: f32, cos_i: f32, alpha: f32) -> f32 {
    smith_g1(cos_o, alpha) * smith_g1(cos_i, alpha)
}

/// Sample a GGX microfacet normal from the visible-normal distribution
/// (Heitz 2018). `wo` is the outgoing direction in the local frame with
/// z > 0; the returned half vector is in the same frame.
#[cube]
pub(crate) fn ggx_sample_vndf(
    wox: f32,
    woy: f32,
    woz: f32,
    alpha: f32,
    u1: f32,
    u2: f32,
) -> Line<f32> {
    // Stretch the view direction into the hemisphere configuration.
    let vh = vec3_normalize(alpha * wox, alpha * woy, woz);

    // Orthonormal basis around vh; fall back near the pole.
    let lensq = vh[0] * vh[0] + vh[1] * vh[1];
    let mut t1x = f32::new(1.0);
    let mut t1y = f32::new(0.0);
    let mut t1z = f32::new(0.0);
    if lensq > f32::new(1.0e-7) {
        let inv = f32::new(1.0) / lensq.sqrt();
        t1x = -vh[1] * inv;
        t1y = vh[0] * inv;
        t1z = f32::new(0.0);
    }
    let t2 = vec3_cross(vh[0], vh[1], vh[2], t1x, t1y, t1z);

    // Parameterize the projected area.
    let r = u1.sqrt();
    let phi = f32::new(TWO_PI) * u2;
    let p1 = r * phi.cos();
    let mut p2 = r * phi.sin();
    let s = f32::new(0.5) * (f32::new(1.0) + vh[2]);
    p2 = (f32::new(1.0) - s) * max_f32(f32::new(0.0), f32::new(1.0) - p1 * p1).sqrt() + s * p2;

    let pz = max_f32(f32::new(0.0), f32::new(1.0) - p1 * p1 - p2 * p2).sqrt();
    let nx = p1 * t1x + p2 * t2[0] + pz * vh[0];
    let ny = p1 * t1y + p2 * t2[1] + pz * vh[1];
    let nz = p1 * t1z + p2 * t2[2] + pz * vh[2];

    // Unstretch back to the ellipsoid configuration.
    vec3_normalize(alpha * nx, alpha * ny, max_f32(f32::new(0.0), nz))
}

/// Pdf of `ggx_sample_vndf` converted to incident-direction measure:
/// `G1(wo) * D(h) / (4 |n.wo|)`.
#[cube]
pub(crate) fn ggx_vndf_pdf(cos_o: f32, cos_h: f32, alpha: f32) -> f32 {
    smith_g1(cos_o, alpha) * ggx_d(cos_h, alpha)
        / max_f32(f32::new(4.0) * abs_f32(cos_o), f32::new(1.0e-8))
}

/// Convert an area-measure pdf at a light sample to solid-angle measure at
/// the shading point: `pdf_w = pdf_A * d^2 / |cos_l|`.
#[cube]
pub(crate) fn pdf_area_to_solid_angle(pdf_area: f32, dist2: f32, cos_light: f32) -> f32 {
    pdf_area * dist2 / max_f32(abs_f32(cos_light), f32::new(1.0e-6))
}

/// Power heuristic (beta = 2) for combining two sampling strategies.
#[cube]
pub(crate) fn power_heuristic(pdf_a: f32, pdf_b: f32) -> f32 {
    let a2 = pdf_a * pdf_a;
    let b2 = pdf_b * pdf_b;
    let denom = a2 + b2;
    let mut out = f32::new(0.0);
    if denom > f32::new(0.0) {
        out = a2 / denom;
    }
    out
}
