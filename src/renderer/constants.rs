//! Renderer-side constants shared with the GPU packing code.

use crate::gpu::constants as gpu_constants;

pub(crate) const PATH_F32_STRIDE: usize = gpu_constants::PATH_F32_STRIDE as usize;
pub(crate) const PATH_U32_STRIDE: usize = gpu_constants::PATH_U32_STRIDE as usize;
pub(crate) const ISECT_F32_STRIDE: usize = gpu_constants::ISECT_F32_STRIDE as usize;
pub(crate) const ISECT_U32_STRIDE: usize = gpu_constants::ISECT_U32_STRIDE as usize;
pub(crate) const GEOM_F32_STRIDE: usize = gpu_constants::GEOM_F32_STRIDE as usize;
pub(crate) const GEOM_U32_STRIDE: usize = gpu_constants::GEOM_U32_STRIDE as usize;
pub(crate) const MATERIAL_F32_STRIDE: usize = gpu_constants::MATERIAL_F32_STRIDE as usize;
pub(crate) const MATERIAL_U32_STRIDE: usize = gpu_constants::MATERIAL_U32_STRIDE as usize;
pub(crate) const LIGHT_F32_STRIDE: usize = gpu_constants::LIGHT_F32_STRIDE as usize;
pub(crate) const LIGHT_U32_STRIDE: usize = gpu_constants::LIGHT_U32_STRIDE as usize;
pub(crate) const TEXTURE_DESC_STRIDE: usize = gpu_constants::TEXTURE_DESC_STRIDE as usize;
pub(crate) const GBUFFER_STRIDE: usize = gpu_constants::GBUFFER_STRIDE as usize;
pub(crate) const NONE_U32: u32 = gpu_constants::NONE_U32;

// K-d tree construction limits.
pub(crate) const KD_LEAF_SIZE: usize = 4;
pub(crate) const KD_MAX_DEPTH: usize = 24;

// Kernel launch shape.
pub(crate) const WORKGROUP_SIZE: u32 = 256;
