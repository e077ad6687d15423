//! CPU tests of the scalar kernel helpers.
//!
//! `#[cube]` functions compile to ordinary Rust as well, so the math the
//! GPU runs is pinned here without a device.

use super::intersect::{ray_cube, ray_sphere, ray_triangle};
use super::math::*;
use super::rng::{rng_next_f32, rng_seed, wang_hash};
use super::sampling::*;
use crate::renderer::rng::Pcg32;

fn unit_vectors(count: usize) -> Vec<[f32; 3]> {
    let mut rng = Pcg32::from_invocation(1, 7, 0, 42);
    (0..count)
        .map(|_| {
            let u1 = rng.next_f32();
            let u2 = rng.next_f32();
            let v = uniform_sphere(u1, u2);
            [v[0], v[1], v[2]]
        })
        .collect()
}

#[test]
fn test_oct_normal_round_trip() {
    for n in unit_vectors(10_000) {
        let enc = oct_encode(n[0], n[1], n[2]);
        assert!(enc[0] >= -1.0 && enc[0] <= 1.0);
        assert!(enc[1] >= -1.0 && enc[1] <= 1.0);
        let dec = oct_decode(enc[0], enc[1]);
        for axis in 0..3 {
            assert!(
                (dec[axis] - n[axis]).abs() < 1.0e-6,
                "axis {axis}: {} vs {}",
                dec[axis],
                n[axis]
            );
        }
    }
}

#[test]
fn test_power_heuristic_weights_sum_to_one() {
    let pdfs = [0.01f32, 0.5, 1.0, 7.0, 300.0];
    for &a in &pdfs {
        for &b in &pdfs {
            let w = power_heuristic(a, b) + power_heuristic(b, a);
            assert!((w - 1.0).abs() < 1.0e-6, "{a} {b} -> {w}");
        }
    }
    assert_eq!(power_heuristic(0.0, 0.0), 0.0);
}

#[test]
fn test_cosine_hemisphere_stays_above_plane() {
    let mut rng = Pcg32::from_invocation(3, 11, 2, 0);
    let mut mean_cos = 0.0f64;
    let count = 20_000;
    for _ in 0..count {
        let s = cosine_hemisphere(rng.next_f32(), rng.next_f32());
        let len = (s[0] * s[0] + s[1] * s[1] + s[2] * s[2]).sqrt();
        assert!(s[2] >= 0.0);
        assert!((len - 1.0).abs() < 1.0e-4);
        mean_cos += s[2] as f64;
    }
    // E[cos] = 2/3 for a cosine-weighted hemisphere.
    mean_cos /= count as f64;
    assert!((mean_cos - 2.0 / 3.0).abs() < 0.01, "mean cos {mean_cos}");
}

#[test]
fn test_cosine_hemisphere_pdf_matches_density() {
    assert!((cosine_hemisphere_pdf(1.0) - 1.0 / std::f32::consts::PI).abs() < 1.0e-6);
    assert_eq!(cosine_hemisphere_pdf(-0.5), 0.0);
}

#[test]
fn test_concentric_disk_maps_into_unit_disk() {
    let mut rng = Pcg32::from_invocation(5, 23, 1, 9);
    for _ in 0..10_000 {
        let d = concentric_disk(rng.next_f32(), rng.next_f32());
        assert!(d[0] * d[0] + d[1] * d[1] <= 1.0 + 1.0e-5);
    }
    let center = concentric_disk(0.5, 0.5);
    assert_eq!((center[0], center[1]), (0.0, 0.0));
}

#[test]
fn test_uniform_triangle_barycentrics_are_valid() {
    let mut rng = Pcg32::from_invocation(2, 2, 2, 2);
    for _ in 0..5_000 {
        let b = uniform_triangle(rng.next_f32(), rng.next_f32());
        assert!(b[0] >= 0.0 && b[1] >= 0.0);
        assert!(b[0] + b[1] <= 1.0 + 1.0e-6);
    }
}

#[test]
fn test_ray_sphere_hit_distance() {
    // Unit-radius-0.5 sphere at origin, ray from z = 5 toward it.
    let t = ray_sphere(0.0, 0.0, 5.0, 0.0, 0.0, -1.0);
    assert!((t - 4.5).abs() < 1.0e-5);

    // From inside, the exit point is at radius 0.5.
    let t_inside = ray_sphere(0.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    assert!((t_inside - 0.5).abs() < 1.0e-5);

    // Miss.
    assert!(ray_sphere(2.0, 0.0, 5.0, 0.0, 0.0, -1.0) < 0.0);
}

#[test]
fn test_ray_sphere_unnormalized_direction_keeps_parameterization() {
    // Doubling the direction length must halve t (world hit unchanged).
    let t_unit = ray_sphere(0.0, 0.0, 5.0, 0.0, 0.0, -1.0);
    let t_double = ray_sphere(0.0, 0.0, 5.0, 0.0, 0.0, -2.0);
    assert!((t_unit - 2.0 * t_double).abs() < 1.0e-5);
}

#[test]
fn test_ray_cube_face_normal() {
    let hit = ray_cube(0.0, 0.0, 5.0, 0.0, 0.0, -1.0);
    assert!((hit[0] - 4.5).abs() < 1.0e-5);
    assert_eq!((hit[1], hit[2]), (0.0, 0.0));
    assert!((hit[3] - 1.0).abs() < 1.0e-6, "outward +z face");

    // From inside, the exit face is reported.
    let inside = ray_cube(0.0, 0.0, 0.0, 1.0, 0.0, 0.0);
    assert!((inside[0] - 0.5).abs() < 1.0e-5);
    assert!((inside[1] - 1.0).abs() < 1.0e-6);

    // Graze past the corner.
    let miss = ray_cube(1.0, 1.0, 5.0, 0.0, 0.0, -1.0);
    assert!(miss[0] < 0.0);
}

#[test]
fn test_ray_triangle_barycentrics() {
    // Right triangle in the z = 0 plane.
    let hit = ray_triangle(
        0.25, 0.25, 1.0, 0.0, 0.0, -1.0, // ray
        0.0, 0.0, 0.0, // v0
        1.0, 0.0, 0.0, // v1
        0.0, 1.0, 0.0, // v2
    );
    assert!((hit[0] - 1.0).abs() < 1.0e-5);
    assert!((hit[1] - 0.25).abs() < 1.0e-5);
    assert!((hit[2] - 0.25).abs() < 1.0e-5);

    // Two-sided: hit from behind as well.
    let back = ray_triangle(
        0.25, 0.25, -1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0,
    );
    assert!(back[0] > 0.0);

    // Outside the edge.
    let miss = ray_triangle(
        0.9, 0.9, 1.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0,
    );
    assert!(miss[0] < 0.0);
}

#[test]
fn test_refract_straight_through_at_matched_ior() {
    let r = refract(0.0, 0.0, -1.0, 0.0, 0.0, 1.0, 1.0);
    assert_eq!(r[3], 0.0);
    assert!((r[2] + 1.0).abs() < 1.0e-6);
}

#[test]
fn test_refract_reports_total_internal_reflection() {
    // Glass to air at grazing incidence: beyond the critical angle.
    let grazing = (0.9f32, (1.0f32 - 0.81).sqrt());
    let r = refract(grazing.0, 0.0, -grazing.1, 0.0, 0.0, 1.0, 1.5);
    assert_eq!(r[3], 1.0);
}

#[test]
fn test_refract_bends_toward_normal_entering_glass() {
    let dir_in = vec3_normalize(0.5, 0.0, -0.5);
    let r = refract(dir_in[0], dir_in[1], dir_in[2], 0.0, 0.0, 1.0, 1.0 / 1.5);
    assert_eq!(r[3], 0.0);
    let sin_in = dir_in[0].abs();
    let len = vec3_length(r[0], r[1], r[2]);
    let sin_out = (r[0] / len).abs();
    assert!((sin_out - sin_in / 1.5).abs() < 1.0e-4, "Snell ratio");
}

#[test]
fn test_reflect_preserves_angle() {
    let r = reflect(0.7071, 0.0, -0.7071, 0.0, 0.0, 1.0);
    assert!((r[0] - 0.7071).abs() < 1.0e-4);
    assert!((r[2] - 0.7071).abs() < 1.0e-4);
}

#[test]
fn test_schlick_fresnel_limits() {
    // Normal incidence equals the r0 reflectance of the interface.
    let r0 = ((1.0f32 - 1.5) / (1.0 + 1.5)).powi(2);
    assert!((schlick_fresnel(1.0, 1.0, 1.5) - r0).abs() < 1.0e-6);
    // Grazing incidence tends to 1.
    assert!(schlick_fresnel(0.0, 1.0, 1.5) > 0.99);
}

#[test]
fn test_build_frame_is_orthonormal() {
    for n in unit_vectors(500) {
        let mut t = cubecl::prelude::Line::empty(3u32);
        let mut b = cubecl::prelude::Line::empty(3u32);
        build_frame(n[0], n[1], n[2], &mut t, &mut b);
        let tl = vec3_length(t[0], t[1], t[2]);
        let bl = vec3_length(b[0], b[1], b[2]);
        assert!((tl - 1.0).abs() < 1.0e-4);
        assert!((bl - 1.0).abs() < 1.0e-4);
        assert!(vec3_dot(t[0], t[1], t[2], n[0], n[1], n[2]).abs() < 1.0e-4);
        assert!(vec3_dot(b[0], b[1], b[2], n[0], n[1], n[2]).abs() < 1.0e-4);
        assert!(vec3_dot(t[0], t[1], t[2], b[0], b[1], b[2]).abs() < 1.0e-4);
    }
}

#[test]
fn test_local_to_world_maps_z_to_normal() {
    for n in unit_vectors(200) {
        let w = local_to_world(0.0, 0.0, 1.0, n[0], n[1], n[2]);
        for axis in 0..3 {
            assert!((w[axis] - n[axis]).abs() < 1.0e-4);
        }
    }
}

#[test]
fn test_ggx_vndf_half_vectors_stay_in_upper_hemisphere() {
    let mut rng = Pcg32::from_invocation(8, 3, 4, 1);
    let wo = vec3_normalize(0.4, -0.2, 0.8);
    for &alpha in &[0.05f32, 0.3, 0.9] {
        for _ in 0..2_000 {
            let h = ggx_sample_vndf(wo[0], wo[1], wo[2], alpha, rng.next_f32(), rng.next_f32());
            assert!(h[2] >= 0.0, "half vector below the surface");
            let len = vec3_length(h[0], h[1], h[2]);
            assert!((len - 1.0).abs() < 1.0e-3);
            // The sampled facet must face the viewer.
            assert!(vec3_dot(h[0], h[1], h[2], wo[0], wo[1], wo[2]) >= -1.0e-4);
            assert!(ggx_vndf_pdf(wo[2], h[2], alpha) > 0.0);
        }
    }
}

#[test]
fn test_ggx_d_integrates_projected_area() {
    // Integral of D(h) cos(h) over the hemisphere is 1 for any roughness.
    for &alpha in &[0.1f32, 0.5, 1.0] {
        let steps = 2_000;
        let mut sum = 0.0f64;
        for i in 0..steps {
            let theta = (i as f32 + 0.5) / steps as f32 * std::f32::consts::FRAC_PI_2;
            let d = ggx_d(theta.cos(), alpha);
            sum += (d * theta.cos() * theta.sin()) as f64
                * (std::f32::consts::FRAC_PI_2 / steps as f32) as f64
                * (2.0 * std::f64::consts::PI);
        }
        assert!((sum - 1.0).abs() < 0.02, "alpha {alpha}: integral {sum}");
    }
}

#[test]
fn test_smith_g1_bounds() {
    for &alpha in &[0.05f32, 0.4, 1.0] {
        for i in 1..20 {
            let c = i as f32 / 20.0;
            let g = smith_g1(c, alpha);
            assert!(g > 0.0 && g <= 1.0 + 1.0e-5);
        }
        // Smooth surfaces at normal incidence have no masking.
        assert!((smith_g1(1.0, 0.0) - 1.0).abs() < 1.0e-5);
    }
}

#[test]
fn test_pdf_measure_conversion() {
    // pdf_w = pdf_A * d^2 / |cos|.
    let pdf = pdf_area_to_solid_angle(0.25, 9.0, 0.5);
    assert!((pdf - 0.25 * 9.0 / 0.5).abs() < 1.0e-5);
}

#[test]
fn test_kernel_rng_matches_host_mirror() {
    for (iteration, pixel, depth, seed) in [(1, 0, 0, 0), (7, 1234, 3, 99), (500, 639_999, 7, 42)] {
        let mut kernel_state = rng_seed(iteration, pixel, depth, seed);
        let mut host = Pcg32::from_invocation(iteration, pixel, depth, seed);
        for _ in 0..16 {
            let a = rng_next_f32(&mut kernel_state);
            let b = host.next_f32();
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }
}

#[test]
fn test_wang_hash_decorrelates_neighbors() {
    let a = wang_hash(1);
    let b = wang_hash(2);
    assert_ne!(a, b);
    assert_ne!(a ^ b, 0);
    // Same input, same hash: reseeding per step is deterministic.
    assert_eq!(wang_hash(1), a);
}

#[test]
fn test_rng_unit_interval() {
    let mut state = rng_seed(9, 9, 9, 9);
    for _ in 0..10_000 {
        let v = rng_next_f32(&mut state);
        assert!((0.0..1.0).contains(&v));
    }
}

#[test]
fn test_vec3_is_finite_rejects_nan_and_inf() {
    assert!(vec3_is_finite(0.0, 1.0, -2.0));
    assert!(!vec3_is_finite(f32::NAN, 0.0, 0.0));
    assert!(!vec3_is_finite(0.0, f32::INFINITY, 0.0));
}

#[test]
fn test_b3_spline_taps_sum_to_one() {
    let one_d: f32 = (-2..=2).map(super::denoise::b3_weight).sum();
    assert!((one_d - 1.0).abs() < 1.0e-6);
    let mut two_d = 0.0f32;
    for dy in -2..=2 {
        for dx in -2..=2 {
            two_d += super::denoise::b3_weight(dx) * super::denoise::b3_weight(dy);
        }
    }
    assert!((two_d - 1.0).abs() < 1.0e-6);
}

#[test]
fn test_safe_rcp_guards_zero() {
    let inv = super::intersect::safe_rcp(0.0);
    assert!(inv.is_finite());
    assert!(super::intersect::safe_rcp(2.0) == 0.5);
}
