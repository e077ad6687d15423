//! Scalar 3D math helpers shared by the path tracing kernels.

use cubecl::prelude::*;

#[cube]
pub(crate) fn min_f32(a: f32, b: f32) -> f32 {
    if a < b { a } else { b }
}

#[cube]
pub(crate) fn max_f32(a: f32, b: f32) -> f32 {
    if a > b { a } else { b }
}

#[cube]
pub(crate) fn min_u32(a: u32, b: u32) -> u32 {
    if a < b { a } else { b }
}

#[cube]
pub(crate) fn abs_f32(a: f32) -> f32 {
    let zero = f32::new(0.0);
    if a < zero { -a } else { a }
}

#[cube]
pub(crate) fn clamp_f32(v: f32, min_v: f32, max_v: f32) -> f32 {
    if v < min_v {
        min_v
    } else if v > max_v {
        max_v
    } else {
        v
    }
}

#[cube]
pub(crate) fn sign_f32(v: f32) -> f32 {
    if v < f32::new(0.0) { f32::new(-1.0) } else { f32::new(1.0) }
}

#[cube]
pub(crate) fn vec3_dot(ax: f32, ay: f32, az: f32, bx: f32, by: f32, bz: f32) -> f32 {
    ax * bx + ay * by + az * bz
}

#[cube]
pub(crate) fn vec3_length(ax: f32, ay: f32, az: f32) -> f32 {
    vec3_dot(ax, ay, az, ax, ay, az).sqrt()
}

#[cube]
pub(crate) fn vec3_cross(ax: f32, ay: f32, az: f32, bx: f32, by: f32, bz: f32) -> Line<f32> {
    let mut out = Line::empty(3u32);
    out[0] = ay * bz - az * by;
    out[1] = az * bx - ax * bz;
    out[2] = ax * by - ay * bx;
    out
}

#[cube]
pub(crate) fn vec3_normalize(ax: f32, ay: f32, az: f32) -> Line<f32> {
    let mut out = Line::empty(3u32);
    let len = vec3_length(ax, ay, az);
    if len > f32::new(0.0) {
        out[0] = ax / len;
        out[1] = ay / len;
        out[2] = az / len;
    } else {
        out[0] = f32::new(0.0);
        out[1] = f32::new(0.0);
        out[2] = f32::new(0.0);
    }
    out
}

/// Largest component of an RGB triple, used for Russian roulette.
#[cube]
pub(crate) fn vec3_max_component(ax: f32, ay: f32, az: f32) -> f32 {
    max_f32(ax, max_f32(ay, az))
}

/// True when every component is finite. NaN throughput must never reach the
/// accumulator.
#[cube]
pub(crate) fn vec3_is_finite(ax: f32, ay: f32, az: f32) -> bool {
    let s = ax + ay + az;
    s == s && abs_f32(s) < f32::new(1.0e30)
}

/// Mirror reflection of `w` about the unit normal `n`.
#[cube]
pub(crate) fn reflect(wx: f32, wy: f32, wz: f32, nx: f32, ny: f32, nz: f32) -> Line<f32> {
    let d = f32::new(2.0) * vec3_dot(wx, wy, wz, nx, ny, nz);
    let mut out = Line::empty(3u32);
    out[0] = wx - d * nx;
    out[1] = wy - d * ny;
    out[2] = wz - d * nz;
    out
}

/// Snell refraction of the incident direction `w` (pointing into the surface)
/// about the unit normal `n` with relative index `eta = eta_i / eta_t`.
/// Returns the refracted direction in slots 0..3 and a total-internal-reflection
/// flag in slot 3 (1 = TIR, direction slots undefined).
#[cube]
pub(crate) fn refract(
    wx: f32,
    wy: f32,
    wz: f32,
    nx: f32,
    ny: f32,
    nz: f32,
    eta: f32,
) -> Line<f32> {
    let mut out = Line::empty(4u32);
    let cos_i = -vec3_dot(wx, wy, wz, nx, ny, nz);
    let sin2_t = eta * eta * max_f32(f32::new(0.0), f32::new(1.0) - cos_i * cos_i);
    if sin2_t >= f32::new(1.0) {
        out[0] = f32::new(0.0);
        out[1] = f32::new(0.0);
        out[2] = f32::new(0.0);
        out[3] = f32::new(1.0);
    } else {
        let cos_t = (f32::new(1.0) - sin2_t).sqrt();
        out[0] = eta * wx + (eta * cos_i - cos_t) * nx;
        out[1] = eta * wy + (eta * cos_i - cos_t) * ny;
        out[2] = eta * wz + (eta * cos_i - cos_t) * nz;
        out[3] = f32::new(0.0);
    }
    out
}

/// Schlick approximation of the Fresnel reflectance at incidence cosine
/// `cos_i` for the interface `eta_i` -> `eta_t`.
#[cube]
pub(crate) fn schlick_fresnel(cos_i: f32, eta_i: f32, eta_t: f32) -> f32 {
    let r0_sqrt = (eta_i - eta_t) / (eta_i + eta_t);
    let r0 = r0_sqrt * r0_sqrt;
    let m = f32::new(1.0) - abs_f32(cos_i);
    let m2 = m * m;
    r0 + (f32::new(1.0) - r0) * m2 * m2 * m
}

/// Orthonormal tangent/bitangent frame around the unit normal `n`
/// (branchless Duff et al. construction).
#[cube]
pub(crate) fn build_frame(
    nx: f32,
    ny: f32,
    nz: f32,
    tangent: &mut Line<f32>,
    bitangent: &mut Line<f32>,
) {
    let s = sign_f32(nz);
    let a = f32::new(-1.0) / (s + nz);
    let b = nx * ny * a;
    tangent[0] = f32::new(1.0) + s * nx * nx * a;
    tangent[1] = s * b;
    tangent[2] = -s * nx;
    bitangent[0] = b;
    bitangent[1] = s + ny * ny * a;
    bitangent[2] = -ny;
}

/// Map a local direction (z along the normal) into world space.
#[cube]
pub(crate) fn local_to_world(
    lx: f32,
    ly: f32,
    lz: f32,
    nx: f32,
    ny: f32,
    nz: f32,
) -> Line<f32> {
    let mut tangent = Line::empty(3u32);
    let mut bitangent = Line::empty(3u32);
    build_frame(nx, ny, nz, &mut tangent, &mut bitangent);
    let mut out = Line::empty(3u32);
    out[0] = lx * tangent[0] + ly * bitangent[0] + lz * nx;
    out[1] = lx * tangent[1] + ly * bitangent[1] + lz * ny;
    out[2] = lx * tangent[2] + ly * bitangent[2] + lz * nz;
    out
}

/// Signed-octahedron encoding of a unit normal into two floats in [-1, 1].
#[cube]
pub(crate) fn oct_encode(nx: f32, ny: f32, nz: f32) -> Line<f32> {
    let mut out = Line::empty(2u32);
    let inv_l1 = f32::new(1.0) / (abs_f32(nx) + abs_f32(ny) + abs_f32(nz));
    let px = nx * inv_l1;
    let py = ny * inv_l1;
    if nz >= f32::new(0.0) {
        out[0] = px;
        out[1] = py;
    } else {
        out[0] = (f32::new(1.0) - abs_f32(py)) * sign_f32(px);
        out[1] = (f32::new(1.0) - abs_f32(px)) * sign_f32(py);
    }
    out
}

/// Inverse of `oct_encode`; returns a renormalized unit vector.
#[cube]
pub(crate) fn oct_decode(ex: f32, ey: f32) -> Line<f32> {
    let mut x = ex;
    let mut y = ey;
    let z = f32::new(1.0) - abs_f32(ex) - abs_f32(ey);
    if z < f32::new(0.0) {
        x = (f32::new(1.0) - abs_f32(ey)) * sign_f32(ex);
        y = (f32::new(1.0) - abs_f32(ex)) * sign_f32(ey);
    }
    vec3_normalize(x, y, z)
}

/// Transform a point by a 3x4 row-major affine matrix stored in `data` at
/// element offset `base`.
#[cube]
pub(crate) fn xform_point(data: &Array<f32>, base: u32, px: f32, py: f32, pz: f32) -> Line<f32> {
    let b = base;
    let mut out = Line::empty(3u32);
    out[0] = data[b] * px + data[b + 1] * py + data[b + 2] * pz + data[b + 3];
    out[1] = data[b + 4] * px + data[b + 5] * py + data[b + 6] * pz + data[b + 7];
    out[2] = data[b + 8] * px + data[b + 9] * py + data[b + 10] * pz + data[b + 11];
    out
}

/// Transform a direction by the linear part of a 3x4 row-major matrix.
#[cube]
pub(crate) fn xform_dir(data: &Array<f32>, base: u32, dx: f32, dy: f32, dz: f32) -> Line<f32> {
    let b = base;
    let mut out = Line::empty(3u32);
    out[0] = data[b] * dx + data[b + 1] * dy + data[b + 2] * dz;
    out[1] = data[b + 4] * dx + data[b + 5] * dy + data[b + 6] * dz;
    out[2] = data[b + 8] * dx + data[b + 9] * dy + data[b + 10] * dz;
    out
}

/// Transform a normal by a 3x3 row-major inverse-transpose stored at `base`
/// and renormalize.
#[cube]
pub(crate) fn xform_normal(data: &Array<f32>, base: u32, nx: f32, ny: f32, nz: f32) -> Line<f32> {
    let b = base;
    let x = data[b] * nx + data[b + 1] * ny + data[b + 2] * nz;
    let y = data[b + 3] * nx + data[b + 4] * ny + data[b + 5] * nz;
    let z = data[b + 6] * nx + data[b + 7] * ny + data[b + 8] * nz;
    vec3_normalize(x, y, z)
}
