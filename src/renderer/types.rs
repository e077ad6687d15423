//! Public renderer configuration and output types.

use cubecl::prelude::LaunchError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shading policy used by the depth loop.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegratorKind {
    /// Emission gathering only; the reference for convergence tests.
    Naive,
    /// Single MIS direct-lighting estimate; reference/debug integrator.
    DirectMis,
    /// Emission gating + MIS direct + indirect continuation.
    Full,
}

/// Rendering configuration, fixed between `init` and `free`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Maximum path length in surface events.
    pub trace_depth: u32,
    /// Shading policy.
    pub integrator: IntegratorKind,
    /// Sub-pixel jitter for primary rays.
    pub antialiasing: bool,
    /// Reuse depth-0 intersections across iterations. Only honored when
    /// anti-aliasing and depth of field are both off.
    pub first_bounce_cache: bool,
    /// Group shading work by material id before the shade launch.
    pub sort_by_material: bool,
    /// Probabilistic termination of long paths (full integrator only).
    pub russian_roulette: bool,
    /// Extra entropy mixed into every per-invocation RNG seed.
    pub seed: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            trace_depth: 8,
            integrator: IntegratorKind::Full,
            antialiasing: true,
            first_bounce_cache: false,
            sort_by_material: false,
            russian_roulette: true,
            seed: 0,
        }
    }
}

/// Edge-stopping weights and footprint for the A-Trous denoiser.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenoiseParams {
    /// Color edge-stopping weight.
    pub sigma_color: f32,
    /// Normal edge-stopping weight.
    pub sigma_normal: f32,
    /// Position edge-stopping weight.
    pub sigma_position: f32,
    /// Desired maximum filter footprint in pixels.
    pub filter_size: u32,
}

impl Default for DenoiseParams {
    fn default() -> Self {
        Self {
            sigma_color: 0.45,
            sigma_normal: 0.35,
            sigma_position: 0.2,
            filter_size: 80,
        }
    }
}

/// Host-visible RGB image read back from the device.
#[derive(Debug, Clone)]
pub struct Framebuffer {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Linear RGB values, row-major from the top-left, length =
    /// width * height * 3.
    pub pixels: Vec<f32>,
}

/// Renderer error conditions.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The scene failed validation at `init`; the context stays
    /// uninitialized.
    #[error("invalid scene: {0}")]
    InvalidScene(String),
    /// An operation ran before `init` or after `free`.
    #[error("renderer is not initialized")]
    Uninitialized,
    /// `init` was called twice without an intervening `free`.
    #[error("renderer is already initialized; call free() first")]
    AlreadyInitialized,
    /// A GPU kernel launch failed; the context must be freed and
    /// re-initialized.
    #[error("GPU kernel launch failed: {0:?}")]
    Launch(LaunchError),
}
