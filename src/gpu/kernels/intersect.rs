//! Ray/primitive intersection and k-d tree traversal.
//!
//! Primitives live in object space (unit sphere of radius 0.5, unit cube,
//! object-space triangle pools); rays are pulled through each instance's
//! inverse transform, so the returned `t` stays in the world-space ray
//! parameterization and nearest-hit comparisons across instances are valid.

use cubecl::prelude::*;
use crate::gpu::constants::*;
use super::math::*;

/// Guard against division by a near-zero direction component.
#[cube]
pub(crate) fn safe_rcp(d: f32) -> f32 {
    let tiny = f32::new(1.0e-12);
    let mut s = d;
    if abs_f32(d) < tiny {
        s = tiny * sign_f32(d);
    }
    f32::new(1.0) / s
}

/// Intersect a ray with the object-space unit sphere (radius 0.5, origin
/// centered). The direction need not be unit length. Returns the nearest
/// positive root, or -1 on miss.
#[cube]
pub(crate) fn ray_sphere(ox: f32, oy: f32, oz: f32, dx: f32, dy: f32, dz: f32) -> f32 {
    let radius = f32::new(0.5);
    let a = vec3_dot(dx, dy, dz, dx, dy, dz);
    let b = f32::new(2.0) * vec3_dot(ox, oy, oz, dx, dy, dz);
    let c = vec3_dot(ox, oy, oz, ox, oy, oz) - radius * radius;
    let disc = b * b - f32::new(4.0) * a * c;
    let mut t = f32::new(-1.0);
    if disc >= f32::new(0.0) && a > f32::new(0.0) {
        let sq = disc.sqrt();
        let t0 = (-b - sq) / (f32::new(2.0) * a);
        let t1 = (-b + sq) / (f32::new(2.0) * a);
        if t0 > f32::new(0.0) {
            t = t0;
        } else if t1 > f32::new(0.0) {
            t = t1;
        }
    }
    t
}

/// Intersect a ray with the object-space unit cube ([-0.5, 0.5]^3) by slab
/// clipping. Returns [t, nx, ny, nz] with the outward normal of the hit
/// face in object space; t = -1 on miss. Rays starting inside hit the exit
/// face.
#[cube]
pub(crate) fn ray_cube(ox: f32, oy: f32, oz: f32, dx: f32, dy: f32, dz: f32) -> Line<f32> {
    let mut out = Line::empty(4u32);
    let half = f32::new(0.5);

    let inv_x = safe_rcp(dx);
    let inv_y = safe_rcp(dy);
    let inv_z = safe_rcp(dz);

    let tx0 = (-half - ox) * inv_x;
    let tx1 = (half - ox) * inv_x;
    let ty0 = (-half - oy) * inv_y;
    let ty1 = (half - oy) * inv_y;
    let tz0 = (-half - oz) * inv_z;
    let tz1 = (half - oz) * inv_z;

    let tx_min = min_f32(tx0, tx1);
    let tx_max = max_f32(tx0, tx1);
    let ty_min = min_f32(ty0, ty1);
    let ty_max = max_f32(ty0, ty1);
    let tz_min = min_f32(tz0, tz1);
    let tz_max = max_f32(tz0, tz1);

    let t_min = max_f32(tx_min, max_f32(ty_min, tz_min));
    let t_max = min_f32(tx_max, min_f32(ty_max, tz_max));

    out[0] = f32::new(-1.0);
    out[1] = f32::new(0.0);
    out[2] = f32::new(0.0);
    out[3] = f32::new(0.0);

    if t_min <= t_max && t_max > f32::new(0.0) {
        let mut t = t_min;
        if t_min <= f32::new(0.0) {
            t = t_max;
        }
        out[0] = t;
        // Outward normal of the face containing the hit point.
        if t == tx0 || t == tx1 {
            out[1] = sign_f32(ox + t * dx);
        } else if t == ty0 || t == ty1 {
            out[2] = sign_f32(oy + t * dy);
        } else {
            out[3] = sign_f32(oz + t * dz);
        }
    }
    out
}

/// Moller-Trumbore ray/triangle intersection. Returns [t, b1, b2, 0] with
/// the barycentric weights of v1 and v2; t = -1 on miss.
#[cube]
pub(crate) fn ray_triangle(
    ox: f32,
    oy: f32,
    oz: f32,
    dx: f32,
    dy: f32,
    dz: f32,
    v0x: f32,
    v0y: f32,
    v0z: f32,
    v1x: f32,
    v1y: f32,
    v1z: f32,
    v2x: f32,
    v2y: f32,
    v2z: f32,
) -> Line<f32> {
    let mut out = Line::empty(4u32);
    out[0] = f32::new(-1.0);
    out[1] = f32::new(0.0);
    out[2] = f32::new(0.0);
    out[3] = f32::new(0.0);

    let e1x = v1x - v0x;
    let e1y = v1y - v0y;
    let e1z = v1z - v0z;
    let e2x = v2x - v0x;
    let e2y = v2y - v0y;
    let e2z = v2z - v0z;

    let p = vec3_cross(dx, dy, dz, e2x, e2y, e2z);
    let det = vec3_dot(e1x, e1y, e1z, p[0], p[1], p[2]);
    if abs_f32(det) > f32::new(1.0e-12) {
        let inv_det = f32::new(1.0) / det;
        let sx = ox - v0x;
        let sy = oy - v0y;
        let sz = oz - v0z;
        let b1 = vec3_dot(sx, sy, sz, p[0], p[1], p[2]) * inv_det;
        if b1 >= f32::new(0.0) && b1 <= f32::new(1.0) {
            let q = vec3_cross(sx, sy, sz, e1x, e1y, e1z);
            let b2 = vec3_dot(dx, dy, dz, q[0], q[1], q[2]) * inv_det;
            if b2 >= f32::new(0.0) && b1 + b2 <= f32::new(1.0) {
                let t = vec3_dot(e2x, e2y, e2z, q[0], q[1], q[2]) * inv_det;
                if t > f32::new(0.0) {
                    out[0] = t;
                    out[1] = b1;
                    out[2] = b2;
                }
            }
        }
    }
    out
}

/// Intersect one k-d primitive (a sphere/cube instance, or one triangle of a
/// mesh instance) and fold the result into the current best record.
#[cube]
#[allow(clippy::too_many_arguments)]
pub(crate) fn intersect_prim(
    geom_f32: &Array<f32>,
    geom_u32: &Array<u32>,
    tri_positions: &Array<f32>,
    tri_normals: &Array<f32>,
    tri_uvs: &Array<f32>,
    tri_indices: &Array<u32>,
    geom_id: u32,
    tri_index: u32,
    ox: f32,
    oy: f32,
    oz: f32,
    dx: f32,
    dy: f32,
    dz: f32,
    best_t: &mut f32,
    out_normal: &mut Line<f32>,
    out_tangent: &mut Line<f32>,
    out_uv: &mut Line<f32>,
    out_material: &mut u32,
    out_geom: &mut u32,
) {
    let base_f = geom_id * GEOM_F32_STRIDE;
    let base_u = (geom_id * GEOM_U32_STRIDE);
    let kind = geom_u32[base_u];

    // Pull the ray into object space; `t` stays in world parameterization
    // because the direction is left unnormalized.
    let obj_o = xform_point(geom_f32, base_f + 12, ox, oy, oz);
    let obj_d = xform_dir(geom_f32, base_f + 12, dx, dy, dz);

    if kind == GEOM_SPHERE {
        let t = ray_sphere(obj_o[0], obj_o[1], obj_o[2], obj_d[0], obj_d[1], obj_d[2]);
        if t > f32::new(0.0) && t < *best_t {
            let px = obj_o[0] + t * obj_d[0];
            let py = obj_o[1] + t * obj_d[1];
            let pz = obj_o[2] + t * obj_d[2];
            let n_obj = vec3_normalize(px, py, pz);
            let n = xform_normal(geom_f32, base_f + 24, n_obj[0], n_obj[1], n_obj[2]);
            let mut tangent = Line::empty(3u32);
            let mut bitangent = Line::empty(3u32);
            build_frame(n[0], n[1], n[2], &mut tangent, &mut bitangent);
            *best_t = t;
            out_normal[0] = n[0];
            out_normal[1] = n[1];
            out_normal[2] = n[2];
            out_tangent[0] = tangent[0];
            out_tangent[1] = tangent[1];
            out_tangent[2] = tangent[2];
            out_uv[0] = f32::new(0.5) + pz.atan2(px) * f32::new(INV_PI) * f32::new(0.5);
            out_uv[1] = py + f32::new(0.5);
            *out_material = geom_u32[base_u + 1];
            *out_geom = geom_id;
        }
    } else if kind == GEOM_CUBE {
        let hit = ray_cube(obj_o[0], obj_o[1], obj_o[2], obj_d[0], obj_d[1], obj_d[2]);
        let t = hit[0];
        if t > f32::new(0.0) && t < *best_t {
            let n = xform_normal(geom_f32, base_f + 24, hit[1], hit[2], hit[3]);
            let mut tangent = Line::empty(3u32);
            let mut bitangent = Line::empty(3u32);
            build_frame(n[0], n[1], n[2], &mut tangent, &mut bitangent);
            let px = obj_o[0] + t * obj_d[0];
            let py = obj_o[1] + t * obj_d[1];
            let pz = obj_o[2] + t * obj_d[2];
            // Planar uv over the two axes orthogonal to the hit face.
            let mut u = px + f32::new(0.5);
            let mut v = py + f32::new(0.5);
            if abs_f32(hit[1]) > f32::new(0.5) {
                u = pz + f32::new(0.5);
            } else if abs_f32(hit[2]) > f32::new(0.5) {
                v = pz + f32::new(0.5);
            }
            *best_t = t;
            out_normal[0] = n[0];
            out_normal[1] = n[1];
            out_normal[2] = n[2];
            out_tangent[0] = tangent[0];
            out_tangent[1] = tangent[1];
            out_tangent[2] = tangent[2];
            out_uv[0] = u;
            out_uv[1] = v;
            *out_material = geom_u32[base_u + 1];
            *out_geom = geom_id;
        }
    } else {
        let tri_base = (tri_index * 3);
        let i0 = (tri_indices[tri_base] * 3);
        let i1 = (tri_indices[tri_base + 1] * 3);
        let i2 = (tri_indices[tri_base + 2] * 3);
        let hit = ray_triangle(
            obj_o[0],
            obj_o[1],
            obj_o[2],
            obj_d[0],
            obj_d[1],
            obj_d[2],
            tri_positions[i0],
            tri_positions[i0 + 1],
            tri_positions[i0 + 2],
            tri_positions[i1],
            tri_positions[i1 + 1],
            tri_positions[i1 + 2],
            tri_positions[i2],
            tri_positions[i2 + 1],
            tri_positions[i2 + 2],
        );
        let t = hit[0];
        if t > f32::new(0.0) && t < *best_t {
            let b1 = hit[1];
            let b2 = hit[2];
            let b0 = f32::new(1.0) - b1 - b2;
            let nx = b0 * tri_normals[i0] + b1 * tri_normals[i1] + b2 * tri_normals[i2];
            let ny = b0 * tri_normals[i0 + 1] + b1 * tri_normals[i1 + 1] + b2 * tri_normals[i2 + 1];
            let nz = b0 * tri_normals[i0 + 2] + b1 * tri_normals[i1 + 2] + b2 * tri_normals[i2 + 2];
            let n = xform_normal(geom_f32, base_f + 24, nx, ny, nz);

            // Tangent from the first edge, orthogonalized against the normal.
            let e1 = xform_dir(
                geom_f32,
                base_f,
                tri_positions[i1] - tri_positions[i0],
                tri_positions[i1 + 1] - tri_positions[i0 + 1],
                tri_positions[i1 + 2] - tri_positions[i0 + 2],
            );
            let proj = vec3_dot(e1[0], e1[1], e1[2], n[0], n[1], n[2]);
            let tan_raw_x = e1[0] - proj * n[0];
            let tan_raw_y = e1[1] - proj * n[1];
            let tan_raw_z = e1[2] - proj * n[2];
            let mut tangent = vec3_normalize(tan_raw_x, tan_raw_y, tan_raw_z);
            if vec3_length(tangent[0], tangent[1], tangent[2]) < f32::new(0.5) {
                let mut frame_tan = Line::empty(3u32);
                let mut frame_bit = Line::empty(3u32);
                build_frame(n[0], n[1], n[2], &mut frame_tan, &mut frame_bit);
                tangent = frame_tan;
            }

            let u0 = (tri_indices[tri_base] * 2);
            let u1 = (tri_indices[tri_base + 1] * 2);
            let u2 = (tri_indices[tri_base + 2] * 2);
            *best_t = t;
            out_normal[0] = n[0];
            out_normal[1] = n[1];
            out_normal[2] = n[2];
            out_tangent[0] = tangent[0];
            out_tangent[1] = tangent[1];
            out_tangent[2] = tangent[2];
            out_uv[0] = b0 * tri_uvs[u0] + b1 * tri_uvs[u1] + b2 * tri_uvs[u2];
            out_uv[1] = b0 * tri_uvs[u0 + 1] + b1 * tri_uvs[u1 + 1] + b2 * tri_uvs[u2 + 1];
            *out_material = geom_u32[base_u + 1];
            *out_geom = geom_id;
        }
    }
}

/// Nearest-hit query against the whole scene.
///
/// Uses stackless kd-restart over the prebuilt node array: descend from the
/// root clipping `(t_min, t_max)` at every split, take the near child first,
/// and after an unsuccessful leaf restart from the root with `t_min` pushed
/// past the leaf interval. Falls back to a brute-force walk when the scene
/// was uploaded without a tree.
#[cube]
#[allow(clippy::too_many_arguments)]
pub(crate) fn scene_intersect(
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
    ox: f32,
    oy: f32,
    oz: f32,
    dx: f32,
    dy: f32,
    dz: f32,
    out_normal: &mut Line<f32>,
    out_tangent: &mut Line<f32>,
    out_uv: &mut Line<f32>,
    out_material: &mut u32,
    out_geom: &mut u32,
) -> f32 {
    let big = f32::new(1.0e30);
    let mut best_t = big;
    *out_material = NONE_U32;
    *out_geom = NONE_U32;

    if num_kd_nodes == u32::new(0) {
        // Brute-force list walk over every instance.
        let mut geom_id = u32::new(0);
        while geom_id < num_geoms {
            let base_u = (geom_id * GEOM_U32_STRIDE);
            let kind = geom_u32[base_u];
            if kind == GEOM_MESH {
                let start = geom_u32[base_u + 2];
                let count = geom_u32[base_u + 3];
                let mut i = u32::new(0);
                while i < count {
                    intersect_prim(
                        geom_f32,
                        geom_u32,
                        tri_positions,
                        tri_normals,
                        tri_uvs,
                        tri_indices,
                        geom_id,
                        start + i,
                        ox,
                        oy,
                        oz,
                        dx,
                        dy,
                        dz,
                        &mut best_t,
                        out_normal,
                        out_tangent,
                        out_uv,
                        out_material,
                        out_geom,
                    );
                    i += u32::new(1);
                }
            } else {
                intersect_prim(
                    geom_f32,
                    geom_u32,
                    tri_positions,
                    tri_normals,
                    tri_uvs,
                    tri_indices,
                    geom_id,
                    u32::new(0),
                    ox,
                    oy,
                    oz,
                    dx,
                    dy,
                    dz,
                    &mut best_t,
                    out_normal,
                    out_tangent,
                    out_uv,
                    out_material,
                    out_geom,
                );
            }
            geom_id += u32::new(1);
        }
    } else {
        let mut t_entry = f32::new(0.0);
        let mut done = false;
        // Each restart pushes `t_entry` past one leaf interval, so the walk
        // visits every leaf along the ray at most once.
        let mut guard = u32::new(0);
        while !done && guard < u32::new(16384) {
            guard += u32::new(1);

            let mut node_id = u32::new(0);
            let mut t_max_local = best_t;

            // Descend to the leaf containing the current entry point.
            let mut descending = true;
            while descending {
                let node_base = (node_id * KD_U32_STRIDE);
                let word0 = kd_nodes[node_base];
                let is_leaf = (word0 & u32::new(4)) != u32::new(0);
                if is_leaf {
                    descending = false;
                } else {
                    let axis = word0 & u32::new(3);
                    let split = kd_splits[node_id];
                    let mut o_axis = ox;
                    let mut d_axis = dx;
                    if axis == u32::new(1) {
                        o_axis = oy;
                        d_axis = dy;
                    } else if axis == u32::new(2) {
                        o_axis = oz;
                        d_axis = dz;
                    }
                    let left = kd_nodes[node_base + 1];
                    let right = kd_nodes[node_base + 2];

                    // Near child contains the entry point of the clipped ray;
                    // the far side is reached through a later restart.
                    let p_entry = o_axis + t_entry * d_axis;
                    let mut near = left;
                    if p_entry > split || (p_entry == split && d_axis > f32::new(0.0)) {
                        near = right;
                    }
                    node_id = near;

                    if abs_f32(d_axis) >= f32::new(1.0e-12) {
                        let t_split = (split - o_axis) / d_axis;
                        if t_split > t_entry && t_split < t_max_local {
                            t_max_local = t_split;
                        }
                    }
                }
            }

            // Test the leaf's primitive range.
            let leaf_base = (node_id * KD_U32_STRIDE);
            let start = kd_nodes[leaf_base + 1];
            let count = kd_nodes[leaf_base + 2];
            let mut i = u32::new(0);
            while i < count {
                let prim = (start + i);
                intersect_prim(
                    geom_f32,
                    geom_u32,
                    tri_positions,
                    tri_normals,
                    tri_uvs,
                    tri_indices,
                    kd_prim_geoms[prim],
                    kd_prim_tris[prim],
                    ox,
                    oy,
                    oz,
                    dx,
                    dy,
                    dz,
                    &mut best_t,
                    out_normal,
                    out_tangent,
                    out_uv,
                    out_material,
                    out_geom,
                );
                i += u32::new(1);
            }

            if best_t <= t_max_local {
                // Nearest hit lies inside the interval already searched.
                done = true;
            } else {
                // Push the entry point past this leaf and restart.
                let next = t_max_local * f32::new(1.0001) + f32::new(1.0e-5);
                if next >= best_t || next >= big {
                    done = true;
                } else {
                    t_entry = next;
                }
            }
        }
    }

    let mut t_out = best_t;
    if best_t >= big {
        t_out = f32::new(-1.0);
    }
    t_out
}

/// Per-path intersection kernel. Fully writes every record, so the driver
/// never needs to clear the intersection buffers between launches.
#[cube(launch_unchecked)]
#[allow(clippy::too_many_arguments)]
pub(crate) fn compute_intersections(
    path_f32: &Array<f32>,
    num_paths: u32,
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
    isect_f32: &mut Array<f32>,
    isect_u32: &mut Array<u32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= num_paths {
        terminate!();
    }

    let path_base = idx * PATH_F32_STRIDE;
    let ox = path_f32[path_base];
    let oy = path_f32[path_base + 1];
    let oz = path_f32[path_base + 2];
    let dx = path_f32[path_base + 3];
    let dy = path_f32[path_base + 4];
    let dz = path_f32[path_base + 5];

    let mut normal = Line::empty(3u32);
    let mut tangent = Line::empty(3u32);
    let mut uv = Line::empty(2u32);
    let mut material = NONE_U32;
    let mut geom = NONE_U32;
    normal[0] = f32::new(0.0);
    normal[1] = f32::new(0.0);
    normal[2] = f32::new(0.0);
    tangent[0] = f32::new(0.0);
    tangent[1] = f32::new(0.0);
    tangent[2] = f32::new(0.0);
    uv[0] = f32::new(0.0);
    uv[1] = f32::new(0.0);

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
        ox,
        oy,
        oz,
        dx,
        dy,
        dz,
        &mut normal,
        &mut tangent,
        &mut uv,
        &mut material,
        &mut geom,
    );

    let isect_base = idx * ISECT_F32_STRIDE;
    isect_f32[isect_base] = t;
    isect_f32[isect_base + 1] = normal[0];
    isect_f32[isect_base + 2] = normal[1];
    isect_f32[isect_base + 3] = normal[2];
    isect_f32[isect_base + 4] = tangent[0];
    isect_f32[isect_base + 5] = tangent[1];
    isect_f32[isect_base + 6] = tangent[2];
    isect_f32[isect_base + 7] = uv[0];
    isect_f32[isect_base + 8] = uv[1];

    let state_base = idx * ISECT_U32_STRIDE;
    isect_u32[state_base] = material;
    isect_u32[state_base + 1] = geom;
}
