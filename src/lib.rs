//! raywave: a wavefront Monte Carlo path tracer on CubeCL/WGPU.
//!
//! The crate traces large ray batches per iteration through a depth loop of
//! intersection, shading, and stream compaction kernels, accumulates
//! radiance into a floating-point framebuffer, and can denoise the result
//! with an edge-aware A-Trous wavelet filter guided by a geometric
//! G-buffer.
//!
//! ## Usage
//! ```ignore
//! let scene = raywave::scene::parse::parse_scene(text)?;
//! let mut renderer = Renderer::new(RenderSettings::default());
//! renderer.init(&scene)?;
//! for iter in 1..=500 {
//!     renderer.render_iteration(iter)?;
//! }
//! let raw = renderer.read_framebuffer()?;
//! let filtered = renderer.denoise(&DenoiseParams::default(), 500)?;
//! renderer.free();
//! ```

mod gpu;
mod renderer;
pub mod scene;

pub use renderer::{
    DenoiseParams, Framebuffer, IntegratorKind, RenderError, RenderSettings, Renderer,
};
pub use scene::{
    Camera, EnvironmentMap, Geom, GeomKind, Material, MaterialKind, Medium, MeshData, Scene,
    Texture,
};
