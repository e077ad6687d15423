//! Scene model consumed by the renderer at `init`.

use glam::{EulerRot, Mat4, Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

pub mod parse;

/// Material dispatch tag. A tag plus a flat field block keeps per-thread
/// divergence predictable and admits the optional material sort.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialKind {
    /// Lambertian surface.
    Diffuse,
    /// Perfect mirror.
    SpecularReflect,
    /// Perfect refraction with total-internal-reflection fallback.
    SpecularTransmit,
    /// Fresnel-weighted mix of reflection and refraction.
    SpecularFresnel,
    /// Cook-Torrance GGX microfacet.
    Microfacet,
    /// Pure emitter; handled by the integrators, never scattered.
    Emissive,
}

impl MaterialKind {
    /// Convert the material kind to the GPU enum value.
    pub(crate) fn as_u32(self) -> u32 {
        match self {
            MaterialKind::Diffuse => 0,
            MaterialKind::SpecularReflect => 1,
            MaterialKind::SpecularTransmit => 2,
            MaterialKind::SpecularFresnel => 3,
            MaterialKind::Microfacet => 4,
            MaterialKind::Emissive => 5,
        }
    }
}

/// Homogeneous participating medium attached to a transmissive material.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medium {
    /// Extinction coefficient (1/m).
    pub sigma_t: f32,
    /// Scattering coefficient (1/m).
    pub sigma_s: f32,
}

/// Surface (and optional medium) description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Dispatch tag.
    pub kind: MaterialKind,
    /// Base color / albedo in linear RGB.
    pub albedo: Vec3,
    /// Specular color for mirror, transmissive, and microfacet lobes.
    pub specular: Vec3,
    /// Index of refraction.
    pub ior: f32,
    /// GGX roughness in [0, 1].
    pub roughness: f32,
    /// Emitted radiance scale; non-zero makes the surface a light.
    pub emittance: f32,
    /// Optional albedo texture index into `Scene::textures`.
    pub texture: Option<usize>,
    /// Optional participating medium entered on refraction.
    pub medium: Option<Medium>,
}

impl Material {
    /// Lambertian material with the given albedo.
    pub fn diffuse(albedo: Vec3) -> Self {
        Self {
            kind: MaterialKind::Diffuse,
            albedo,
            specular: Vec3::ZERO,
            ior: 1.0,
            roughness: 1.0,
            emittance: 0.0,
            texture: None,
            medium: None,
        }
    }

    /// Perfect mirror with the given specular color.
    pub fn mirror(specular: Vec3) -> Self {
        Self {
            kind: MaterialKind::SpecularReflect,
            albedo: Vec3::ZERO,
            specular,
            ior: 1.0,
            roughness: 0.0,
            emittance: 0.0,
            texture: None,
            medium: None,
        }
    }

    /// Area-light material emitting `albedo * emittance`.
    pub fn emissive(albedo: Vec3, emittance: f32) -> Self {
        Self {
            kind: MaterialKind::Emissive,
            albedo,
            specular: Vec3::ZERO,
            ior: 1.0,
            roughness: 0.0,
            emittance,
            texture: None,
            medium: None,
        }
    }
}

/// Geometry variants supported by the tracer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeomKind {
    /// Unit sphere (radius 0.5) in object space.
    Sphere,
    /// Unit cube ([-0.5, 0.5]^3) in object space.
    Cube,
    /// Instance of a triangle range in the shared mesh pool.
    Mesh {
        /// First triangle in `Scene::mesh`.
        triangle_start: usize,
        /// Number of triangles.
        triangle_count: usize,
    },
}

/// A scene object: a primitive plus its affine placement.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geom {
    /// Primitive variant.
    pub kind: GeomKind,
    /// Index into `Scene::materials`.
    pub material: usize,
    /// World-space translation in meters.
    pub translation: Vec3,
    /// Euler rotation in degrees (XYZ order).
    pub rotation: Vec3,
    /// Non-uniform scale.
    pub scale: Vec3,
}

impl Geom {
    /// Object with identity placement.
    pub fn new(kind: GeomKind, material: usize) -> Self {
        Self {
            kind,
            material,
            translation: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }

    /// Object-to-world transform.
    pub fn transform(&self) -> Mat4 {
        let rot = Quat::from_euler(
            EulerRot::XYZ,
            self.rotation.x.to_radians(),
            self.rotation.y.to_radians(),
            self.rotation.z.to_radians(),
        );
        Mat4::from_scale_rotation_translation(self.scale, rot, self.translation)
    }
}

/// Shared triangle pool referenced by mesh instances. Vertices are stored in
/// object space; instances place them through the geom transform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    /// Vertex positions.
    pub positions: Vec<Vec3>,
    /// Per-vertex shading normals (unit length, same count as positions).
    pub normals: Vec<Vec3>,
    /// Per-vertex texture coordinates (same count as positions).
    pub uvs: Vec<Vec2>,
    /// Triangle vertex indices.
    pub indices: Vec<[u32; 3]>,
}

impl MeshData {
    /// Number of triangles in the pool.
    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }
}

/// Nearest-sampled RGB texture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Texture {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Linear RGB texels, row-major, length = width * height * 3.
    pub pixels: Vec<f32>,
}

/// Lat-long HDR environment map queried by world direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentMap {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Linear RGB radiance, row-major, length = width * height * 3.
    pub pixels: Vec<f32>,
}

/// Pinhole / thin-lens camera.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Image resolution in pixels (width, height).
    pub resolution: (u32, u32),
    /// Eye position in world space.
    pub position: Vec3,
    /// Point the camera looks at.
    pub look_at: Vec3,
    /// Up vector.
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov_y: f32,
    /// Thin-lens aperture radius; 0 disables depth of field.
    pub lens_radius: f32,
    /// Distance to the focal plane when the lens is open.
    pub focal_distance: f32,
}

impl Camera {
    /// Camera at `position` looking at `look_at` with the given resolution.
    pub fn new(resolution: (u32, u32), position: Vec3, look_at: Vec3) -> Self {
        Self {
            resolution,
            position,
            look_at,
            up: Vec3::Y,
            fov_y: 45.0,
            lens_radius: 0.0,
            focal_distance: 10.0,
        }
    }
}

/// Root scene container, consumed read-only by `Renderer::init`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    /// Camera used for primary ray generation.
    pub camera: Camera,
    /// All objects in the scene.
    pub geoms: Vec<Geom>,
    /// Materials referenced by the objects.
    pub materials: Vec<Material>,
    /// Shared triangle pool for mesh instances.
    pub mesh: MeshData,
    /// Albedo textures referenced by materials.
    pub textures: Vec<Texture>,
    /// Optional environment map; misses gather radiance from it.
    pub environment: Option<EnvironmentMap>,
}

impl Scene {
    /// Empty scene for the given camera.
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            geoms: Vec::new(),
            materials: Vec::new(),
            mesh: MeshData::default(),
            textures: Vec::new(),
            environment: None,
        }
    }
}
