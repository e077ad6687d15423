//! GPU kernel entrypoints.

#![allow(unused_imports)]

pub(crate) use super::camera::generate_primary_paths;
pub(crate) use super::compact::{
    count_material_buckets,
    init_bucket_cursors,
    init_bucket_offsets,
    init_live_offsets,
    scan_offsets,
    scatter_by_material,
    scatter_partition,
};
pub(crate) use super::denoise::{
    atrous_pass,
    finalize_denoise_output,
    gaussian_pass,
    prepare_denoise_input,
};
pub(crate) use super::framebuffer::{copy_intersections, final_gather};
pub(crate) use super::gbuffer::capture_gbuffer;
pub(crate) use super::intersect::compute_intersections;
pub(crate) use super::shade::{shade_direct_mis, shade_full, shade_naive};
