//! Scene validation and packing into flat device buffers.

use glam::{Mat3, Mat4, Vec3};

use crate::scene::{GeomKind, Scene};

use super::constants::{
    GEOM_F32_STRIDE, GEOM_U32_STRIDE, LIGHT_U32_STRIDE, MATERIAL_F32_STRIDE, MATERIAL_U32_STRIDE,
    NONE_U32, TEXTURE_DESC_STRIDE,
};
use super::kdtree::{build_kd_tree, collect_primitives, KdTree};
use super::types::RenderError;

/// Camera quantities derived once per `init` and passed to kernels as
/// scalars.
#[derive(Debug, Copy, Clone)]
pub(crate) struct CameraParams {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) position: Vec3,
    pub(crate) view: Vec3,
    pub(crate) up: Vec3,
    pub(crate) right: Vec3,
    pub(crate) pixel_len_x: f32,
    pub(crate) pixel_len_y: f32,
    pub(crate) lens_radius: f32,
    pub(crate) focal_distance: f32,
}

/// GPU-ready buffers and metadata produced by scene preprocessing.
pub(crate) struct PreparedScene {
    /// Per-geom transforms: object-to-world 3x4, world-to-object 3x4,
    /// inverse-transpose 3x3.
    pub(crate) geom_f32: Vec<f32>,
    /// Per-geom kind, material id, triangle range.
    pub(crate) geom_u32: Vec<u32>,
    /// Per-material scalar block.
    pub(crate) material_f32: Vec<f32>,
    /// Per-material kind, texture index, medium flag.
    pub(crate) material_u32: Vec<u32>,
    /// Per-light surface area.
    pub(crate) light_f32: Vec<f32>,
    /// Per-light geom id, kind, triangle-cdf range.
    pub(crate) light_u32: Vec<u32>,
    /// Concatenated normalized triangle-area prefix sums for mesh lights.
    pub(crate) light_tri_cdf: Vec<f32>,
    /// Mesh vertex positions (3 per vertex).
    pub(crate) tri_positions: Vec<f32>,
    /// Mesh vertex normals (3 per vertex).
    pub(crate) tri_normals: Vec<f32>,
    /// Mesh vertex uvs (2 per vertex).
    pub(crate) tri_uvs: Vec<f32>,
    /// Triangle vertex indices (3 per triangle).
    pub(crate) tri_indices: Vec<u32>,
    /// Concatenated RGB texture texels.
    pub(crate) tex_data: Vec<f32>,
    /// Per-texture offset, width, height.
    pub(crate) tex_desc: Vec<u32>,
    /// Environment radiance texels (RGB).
    pub(crate) env_data: Vec<f32>,
    /// Environment resolution; zero when absent.
    pub(crate) env_width: u32,
    pub(crate) env_height: u32,
    pub(crate) env_present: bool,
    /// Flat k-d tree over the scene primitives.
    pub(crate) kd: KdTree,
    /// Derived camera quantities.
    pub(crate) camera: CameraParams,
    pub(crate) num_geoms: u32,
    pub(crate) num_lights: u32,
    pub(crate) num_materials: u32,
}

fn invalid(message: impl Into<String>) -> RenderError {
    RenderError::InvalidScene(message.into())
}

fn validate_scene(scene: &Scene) -> Result<(), RenderError> {
    let (width, height) = scene.camera.resolution;
    if width == 0 || height == 0 {
        return Err(invalid("camera resolution is zero"));
    }
    if scene.geoms.is_empty() {
        return Err(invalid("scene contains no geometry"));
    }
    if scene.camera.fov_y <= 0.0 || scene.camera.fov_y >= 180.0 {
        return Err(invalid(format!(
            "camera field of view {} is outside (0, 180)",
            scene.camera.fov_y
        )));
    }

    let vertex_count = scene.mesh.positions.len();
    if scene.mesh.normals.len() != vertex_count || scene.mesh.uvs.len() != vertex_count {
        return Err(invalid("mesh normal/uv arrays do not match vertex count"));
    }
    for (i, idx) in scene.mesh.indices.iter().enumerate() {
        if idx.iter().any(|&v| v as usize >= vertex_count) {
            return Err(invalid(format!("triangle {i} references a missing vertex")));
        }
    }

    for (i, geom) in scene.geoms.iter().enumerate() {
        if geom.material >= scene.materials.len() {
            return Err(invalid(format!(
                "object {i} references missing material {}",
                geom.material
            )));
        }
        if let GeomKind::Mesh {
            triangle_start,
            triangle_count,
        } = geom.kind
        {
            if triangle_count == 0 {
                return Err(invalid(format!("mesh object {i} has an empty triangle range")));
            }
            if triangle_start + triangle_count > scene.mesh.triangle_count() {
                return Err(invalid(format!(
                    "mesh object {i} range exceeds the triangle pool"
                )));
            }
        }
    }

    for (i, material) in scene.materials.iter().enumerate() {
        if let Some(texture) = material.texture {
            if texture >= scene.textures.len() {
                return Err(invalid(format!(
                    "material {i} references missing texture {texture}"
                )));
            }
        }
    }

    for (i, texture) in scene.textures.iter().enumerate() {
        let expected = texture.width as usize * texture.height as usize * 3;
        if texture.pixels.len() != expected {
            return Err(invalid(format!("texture {i} pixel data length mismatch")));
        }
    }

    if let Some(env) = &scene.environment {
        let expected = env.width as usize * env.height as usize * 3;
        if env.width == 0 || env.height == 0 || env.pixels.len() != expected {
            return Err(invalid("environment map dimensions/pixels mismatch"));
        }
    }

    let has_light = scene
        .geoms
        .iter()
        .any(|g| scene.materials[g.material].emittance > 0.0);
    if !has_light && scene.environment.is_none() {
        return Err(invalid("scene has no emissive geometry and no environment map"));
    }

    Ok(())
}

fn push_mat3x4(out: &mut Vec<f32>, m: Mat4) {
    for row in 0..3 {
        let r = m.row(row);
        out.extend_from_slice(&[r.x, r.y, r.z, r.w]);
    }
}

fn push_mat3(out: &mut Vec<f32>, m: Mat3) {
    for row in 0..3 {
        let r = m.row(row);
        out.extend_from_slice(&[r.x, r.y, r.z]);
    }
}

fn world_triangle_area(scene: &Scene, transform: &Mat4, tri: usize) -> f32 {
    let idx = scene.mesh.indices[tri];
    let a = transform.transform_point3(scene.mesh.positions[idx[0] as usize]);
    let b = transform.transform_point3(scene.mesh.positions[idx[1] as usize]);
    let c = transform.transform_point3(scene.mesh.positions[idx[2] as usize]);
    (b - a).cross(c - a).length() * 0.5
}

fn light_surface_area(scene: &Scene, geom_index: usize) -> (f32, Vec<f32>) {
    let geom = &scene.geoms[geom_index];
    let transform = geom.transform();
    match geom.kind {
        GeomKind::Sphere => {
            let radius = 0.5 * (geom.scale.x + geom.scale.y + geom.scale.z) / 3.0;
            (4.0 * std::f32::consts::PI * radius * radius, Vec::new())
        }
        GeomKind::Cube => {
            let ex = transform.transform_vector3(Vec3::X);
            let ey = transform.transform_vector3(Vec3::Y);
            let ez = transform.transform_vector3(Vec3::Z);
            let area = 2.0
                * (ey.cross(ez).length() + ez.cross(ex).length() + ex.cross(ey).length());
            (area, Vec::new())
        }
        GeomKind::Mesh {
            triangle_start,
            triangle_count,
        } => {
            let mut areas = Vec::with_capacity(triangle_count);
            let mut total = 0.0f32;
            for tri in triangle_start..triangle_start + triangle_count {
                let area = world_triangle_area(scene, &transform, tri);
                total += area;
                areas.push(total);
            }
            let norm = if total > 0.0 { total } else { 1.0 };
            for value in &mut areas {
                *value /= norm;
            }
            if let Some(last) = areas.last_mut() {
                *last = 1.0;
            }
            (total, areas)
        }
    }
}

fn derive_camera(scene: &Scene) -> CameraParams {
    let camera = &scene.camera;
    let (width, height) = camera.resolution;
    let view = (camera.look_at - camera.position).normalize();
    let right = view.cross(camera.up).normalize();
    let up = right.cross(view).normalize();

    let y_scaled = (camera.fov_y.to_radians() * 0.5).tan();
    let x_scaled = y_scaled * width as f32 / height as f32;

    CameraParams {
        width,
        height,
        position: camera.position,
        view,
        up,
        right,
        pixel_len_x: 2.0 * x_scaled / width as f32,
        pixel_len_y: 2.0 * y_scaled / height as f32,
        lens_radius: camera.lens_radius,
        focal_distance: camera.focal_distance,
    }
}

/// Validate the scene and pack every device buffer.
pub(crate) fn prepare_scene(scene: &Scene) -> Result<PreparedScene, RenderError> {
    validate_scene(scene)?;

    let mut geom_f32 = Vec::with_capacity(scene.geoms.len() * GEOM_F32_STRIDE);
    let mut geom_u32 = Vec::with_capacity(scene.geoms.len() * GEOM_U32_STRIDE);
    for geom in &scene.geoms {
        let transform = geom.transform();
        let inverse = transform.inverse();
        let inv_transpose = Mat3::from_mat4(inverse).transpose();
        push_mat3x4(&mut geom_f32, transform);
        push_mat3x4(&mut geom_f32, inverse);
        push_mat3(&mut geom_f32, inv_transpose);

        let (kind, tri_start, tri_count) = match geom.kind {
            GeomKind::Sphere => (0, 0, 0),
            GeomKind::Cube => (1, 0, 0),
            GeomKind::Mesh {
                triangle_start,
                triangle_count,
            } => (2, triangle_start as u32, triangle_count as u32),
        };
        geom_u32.extend_from_slice(&[kind, geom.material as u32, tri_start, tri_count]);
    }

    let mut material_f32 = Vec::with_capacity(scene.materials.len() * MATERIAL_F32_STRIDE);
    let mut material_u32 = Vec::with_capacity(scene.materials.len() * MATERIAL_U32_STRIDE);
    for material in &scene.materials {
        let medium = material.medium.unwrap_or(crate::scene::Medium {
            sigma_t: 0.0,
            sigma_s: 0.0,
        });
        material_f32.extend_from_slice(&[
            material.albedo.x,
            material.albedo.y,
            material.albedo.z,
            material.specular.x,
            material.specular.y,
            material.specular.z,
            material.ior,
            material.roughness,
            material.emittance,
            medium.sigma_t,
            medium.sigma_s,
            0.0,
        ]);
        material_u32.extend_from_slice(&[
            material.kind.as_u32(),
            material.texture.map_or(NONE_U32, |t| t as u32),
            u32::from(material.medium.is_some()),
            0,
        ]);
    }

    let mut light_f32 = Vec::new();
    let mut light_u32 = Vec::new();
    let mut light_tri_cdf = Vec::new();
    for (geom_index, geom) in scene.geoms.iter().enumerate() {
        if scene.materials[geom.material].emittance <= 0.0 {
            continue;
        }
        let (area, cdf) = light_surface_area(scene, geom_index);
        let cdf_offset = light_tri_cdf.len() as u32;
        let cdf_count = cdf.len() as u32;
        light_tri_cdf.extend_from_slice(&cdf);
        light_f32.push(area.max(1.0e-8));
        light_u32.extend_from_slice(&[geom_index as u32, 0, cdf_offset, cdf_count]);
    }

    let mut tri_positions = Vec::with_capacity(scene.mesh.positions.len() * 3);
    let mut tri_normals = Vec::with_capacity(scene.mesh.normals.len() * 3);
    let mut tri_uvs = Vec::with_capacity(scene.mesh.uvs.len() * 2);
    for p in &scene.mesh.positions {
        tri_positions.extend_from_slice(&[p.x, p.y, p.z]);
    }
    for n in &scene.mesh.normals {
        tri_normals.extend_from_slice(&[n.x, n.y, n.z]);
    }
    for uv in &scene.mesh.uvs {
        tri_uvs.extend_from_slice(&[uv.x, uv.y]);
    }
    let mut tri_indices = Vec::with_capacity(scene.mesh.indices.len() * 3);
    for idx in &scene.mesh.indices {
        tri_indices.extend_from_slice(idx);
    }

    let mut tex_data = Vec::new();
    let mut tex_desc = Vec::with_capacity(scene.textures.len() * TEXTURE_DESC_STRIDE);
    for texture in &scene.textures {
        tex_desc.extend_from_slice(&[tex_data.len() as u32, texture.width, texture.height]);
        tex_data.extend_from_slice(&texture.pixels);
    }

    let (env_data, env_width, env_height, env_present) = match &scene.environment {
        Some(env) => (env.pixels.clone(), env.width, env.height, true),
        None => (Vec::new(), 0, 0, false),
    };

    let prims = collect_primitives(scene);
    let kd = build_kd_tree(&prims);

    Ok(PreparedScene {
        geom_f32,
        geom_u32,
        material_f32,
        material_u32,
        num_lights: (light_u32.len() / LIGHT_U32_STRIDE) as u32,
        light_f32,
        light_u32,
        light_tri_cdf,
        tri_positions,
        tri_normals,
        tri_uvs,
        tri_indices,
        tex_data,
        tex_desc,
        env_data,
        env_width,
        env_height,
        env_present,
        kd,
        camera: derive_camera(scene),
        num_geoms: scene.geoms.len() as u32,
        num_materials: scene.materials.len() as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::constants::LIGHT_F32_STRIDE;
    use crate::scene::{Camera, EnvironmentMap, Geom, GeomKind, Material, Scene};
    use glam::Vec3;

    fn cornell() -> Scene {
        let camera = Camera::new((32, 32), Vec3::new(0.0, 5.0, 10.0), Vec3::new(0.0, 5.0, 0.0));
        let mut scene = Scene::new(camera);
        scene.materials.push(Material::emissive(Vec3::ONE, 5.0));
        scene.materials.push(Material::diffuse(Vec3::splat(0.98)));
        let mut light = Geom::new(GeomKind::Cube, 0);
        light.translation = Vec3::new(0.0, 10.0, 0.0);
        light.scale = Vec3::new(3.0, 0.3, 3.0);
        scene.geoms.push(light);
        let mut floor = Geom::new(GeomKind::Cube, 1);
        floor.scale = Vec3::new(10.0, 0.01, 10.0);
        scene.geoms.push(floor);
        scene
    }

    #[test]
    fn test_prepare_strides() {
        let scene = cornell();
        let prepared = prepare_scene(&scene).unwrap();
        assert_eq!(prepared.geom_f32.len(), scene.geoms.len() * GEOM_F32_STRIDE);
        assert_eq!(prepared.geom_u32.len(), scene.geoms.len() * GEOM_U32_STRIDE);
        assert_eq!(
            prepared.material_f32.len(),
            scene.materials.len() * MATERIAL_F32_STRIDE
        );
        assert_eq!(prepared.num_lights, 1);
        assert_eq!(prepared.light_u32.len(), LIGHT_U32_STRIDE);
        assert_eq!(prepared.light_f32.len(), LIGHT_F32_STRIDE);
    }

    #[test]
    fn test_cube_light_area_matches_analytic() {
        let scene = cornell();
        let prepared = prepare_scene(&scene).unwrap();
        // 2 * (3*0.3 + 0.3*3 + 3*3) = 21.6
        assert!((prepared.light_f32[0] - 21.6).abs() < 1.0e-3);
    }

    #[test]
    fn test_rejects_empty_scene() {
        let camera = Camera::new((4, 4), Vec3::ZERO, Vec3::Z);
        let scene = Scene::new(camera);
        assert!(matches!(
            prepare_scene(&scene),
            Err(RenderError::InvalidScene(_))
        ));
    }

    #[test]
    fn test_rejects_missing_material() {
        let mut scene = cornell();
        scene.geoms[1].material = 9;
        assert!(matches!(
            prepare_scene(&scene),
            Err(RenderError::InvalidScene(_))
        ));
    }

    #[test]
    fn test_rejects_lightless_scene_without_environment() {
        let mut scene = cornell();
        scene.materials[0].emittance = 0.0;
        assert!(matches!(
            prepare_scene(&scene),
            Err(RenderError::InvalidScene(_))
        ));
    }

    #[test]
    fn test_environment_counts_as_light_source() {
        let mut scene = cornell();
        scene.materials[0].emittance = 0.0;
        scene.environment = Some(EnvironmentMap {
            width: 4,
            height: 2,
            pixels: vec![0.5; 4 * 2 * 3],
        });
        let prepared = prepare_scene(&scene).unwrap();
        assert!(prepared.env_present);
        assert_eq!(prepared.num_lights, 0);
    }

    #[test]
    fn test_camera_basis_is_orthonormal() {
        let scene = cornell();
        let prepared = prepare_scene(&scene).unwrap();
        let cam = prepared.camera;
        assert!(cam.view.dot(cam.right).abs() < 1.0e-5);
        assert!(cam.view.dot(cam.up).abs() < 1.0e-5);
        assert!((cam.right.length() - 1.0).abs() < 1.0e-5);
    }

    #[test]
    fn test_mesh_light_cdf_is_normalized() {
        let camera = Camera::new((8, 8), Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        let mut scene = Scene::new(camera);
        scene.materials.push(Material::emissive(Vec3::ONE, 2.0));
        scene.mesh.positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(2.0, 1.0, 0.0),
        ];
        scene.mesh.normals = vec![Vec3::Z; 4];
        scene.mesh.uvs = vec![glam::Vec2::ZERO; 4];
        scene.mesh.indices = vec![[0, 1, 2], [1, 3, 2]];
        scene.geoms.push(Geom::new(
            GeomKind::Mesh {
                triangle_start: 0,
                triangle_count: 2,
            },
            0,
        ));
        let prepared = prepare_scene(&scene).unwrap();
        assert_eq!(prepared.light_tri_cdf.len(), 2);
        assert!((prepared.light_tri_cdf[1] - 1.0).abs() < 1.0e-6);
        assert!(prepared.light_tri_cdf[0] > 0.0 && prepared.light_tri_cdf[0] < 1.0);
        assert!((prepared.light_f32[0] - 2.0).abs() < 1.0e-4);
    }
}
