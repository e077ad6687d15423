//! GPU kernels for wavefront path tracing and denoising.

pub(crate) mod constants;
mod kernels;

pub(crate) use kernels::*;
