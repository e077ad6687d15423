//! Renderer context, scene preparation, and host-side acceleration build.

pub(crate) mod constants;
mod kdtree;
mod prepare;
mod renderer;
pub(crate) mod rng;
mod types;
mod utils;

pub use renderer::Renderer;
pub use types::{DenoiseParams, Framebuffer, IntegratorKind, RenderError, RenderSettings};
