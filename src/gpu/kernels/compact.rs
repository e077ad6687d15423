//! Stream compaction and the optional material sort.
//!
//! Compaction is a stable partition of the full path array: an exclusive
//! prefix over the liveness flags (Hillis-Steele scan, ping-ponged by the
//! host) gives every live path its packed slot and every dead path a slot
//! behind the live range. The host reads the scan total back to learn the
//! new live count.

use cubecl::prelude::*;
use crate::gpu::constants::*;

/// Seed the scan input: `offsets[0] = 0`, `offsets[i + 1] = liveness(i)`.
#[cube(launch_unchecked)]
pub(crate) fn init_live_offsets(
    path_u32: &Array<u32>,
    num_paths: u32,
    offsets: &mut Array<u32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= num_paths {
        terminate!();
    }
    if idx == 0 {
        offsets[0] = u32::new(0);
    }
    let remaining = path_u32[idx * PATH_U32_STRIDE + 1];
    let mut live = u32::new(0);
    if remaining > u32::new(0) {
        live = u32::new(1);
    }
    offsets[idx + 1] = live;
}

/// One Hillis-Steele scan step with the given stride:
/// `out[i] = in[i] + in[i - stride]` when in range.
#[cube(launch_unchecked)]
pub(crate) fn scan_offsets(
    offsets_in: &Array<u32>,
    offsets_out: &mut Array<u32>,
    num_entries: u32,
    stride: u32,
) {
    let idx = ABSOLUTE_POS;
    if idx >= num_entries {
        terminate!();
    }

    let idx_u32 = idx as u32;
    if idx_u32 >= stride {
        offsets_out[idx] = offsets_in[idx] + offsets_in[(idx_u32 - stride)];
    } else {
        offsets_out[idx] = offsets_in[idx];
    }
}

/// Stable partition scatter over the whole path array. After the scan,
/// `offsets[i]` counts the live paths in `[0, i)` and `offsets[num_paths]`
/// is the total; dead paths land behind the live block in original order,
/// keeping their final colors resident for the gather stage.
#[cube(launch_unchecked)]
pub(crate) fn scatter_partition(
    path_f32_in: &Array<f32>,
    path_u32_in: &Array<u32>,
    offsets: &Array<u32>,
    num_paths: u32,
    path_f32_out: &mut Array<f32>,
    path_u32_out: &mut Array<u32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= num_paths {
        terminate!();
    }

    let idx_u32 = idx as u32;
    let live_before = offsets[idx];
    let total_live = offsets[num_paths];
    let remaining = path_u32_in[idx * PATH_U32_STRIDE + 1];

    let mut dest = total_live + (idx_u32 - live_before);
    if remaining > u32::new(0) {
        dest = live_before;
    }

    let src_f = idx * PATH_F32_STRIDE;
    let dst_f = (dest * PATH_F32_STRIDE);
    let mut i = 0u32;
    while i < PATH_F32_STRIDE {
        path_f32_out[dst_f + i] = path_f32_in[src_f + i];
        i += 1;
    }

    let src_u = idx * PATH_U32_STRIDE;
    let dst_u = (dest * PATH_U32_STRIDE);
    let mut j = 0u32;
    while j < PATH_U32_STRIDE {
        path_u32_out[dst_u + j] = path_u32_in[src_u + j];
        j += 1;
    }
}

/// Count paths per material bucket; misses fall in the last bucket so they
/// shade together.
#[cube(launch_unchecked)]
pub(crate) fn count_material_buckets(
    path_u32: &Array<u32>,
    isect_u32: &Array<u32>,
    num_paths: u32,
    num_materials: u32,
    bucket_counts: &mut Array<Atomic<u32>>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= num_paths {
        terminate!();
    }
    let remaining = path_u32[idx * PATH_U32_STRIDE + 1];
    if remaining == u32::new(0) {
        terminate!();
    }

    let material = isect_u32[idx * ISECT_U32_STRIDE];
    let mut bucket = num_materials;
    if material != NONE_U32 {
        bucket = material;
    }
    bucket_counts[bucket].fetch_add(u32::new(1));
}

/// Seed the bucket scan input from the atomic counters.
#[cube(launch_unchecked)]
pub(crate) fn init_bucket_offsets(
    bucket_counts: &Array<Atomic<u32>>,
    num_buckets: u32,
    offsets: &mut Array<u32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= num_buckets {
        terminate!();
    }
    if idx == 0 {
        offsets[0] = u32::new(0);
    }
    offsets[idx + 1] = bucket_counts[idx].load();
}

/// Initialize the per-bucket write cursors from the scanned offsets.
#[cube(launch_unchecked)]
pub(crate) fn init_bucket_cursors(
    offsets: &Array<u32>,
    num_buckets: u32,
    cursors: &mut Array<Atomic<u32>>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= num_buckets {
        terminate!();
    }
    cursors[idx].fetch_add(offsets[idx]);
}

/// Scatter paths (and their intersection records) grouped by material
/// bucket so same-material threads shade together. Only the live range
/// `[0, num_live)` is bucketed; the dead tail behind it is copied through
/// unchanged so its final colors stay resident for the gather.
#[cube(launch_unchecked)]
#[allow(clippy::too_many_arguments)]
pub(crate) fn scatter_by_material(
    path_f32_in: &Array<f32>,
    path_u32_in: &Array<u32>,
    isect_f32_in: &Array<f32>,
    isect_u32_in: &Array<u32>,
    num_live: u32,
    num_paths: u32,
    num_materials: u32,
    cursors: &mut Array<Atomic<u32>>,
    path_f32_out: &mut Array<f32>,
    path_u32_out: &mut Array<u32>,
    isect_f32_out: &mut Array<f32>,
    isect_u32_out: &mut Array<u32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= num_paths {
        terminate!();
    }

    let mut dest = idx as u32;
    if (idx as u32) < num_live {
        let material = isect_u32_in[idx * ISECT_U32_STRIDE];
        let mut bucket = num_materials;
        if material != NONE_U32 {
            bucket = material;
        }
        dest = cursors[bucket].fetch_add(u32::new(1));
    }

    let src_f = idx * PATH_F32_STRIDE;
    let dst_f = (dest * PATH_F32_STRIDE);
    let mut i = 0u32;
    while i < PATH_F32_STRIDE {
        path_f32_out[dst_f + i] = path_f32_in[src_f + i];
        i += 1;
    }

    let src_u = idx * PATH_U32_STRIDE;
    let dst_u = (dest * PATH_U32_STRIDE);
    let mut j = 0u32;
    while j < PATH_U32_STRIDE {
        path_u32_out[dst_u + j] = path_u32_in[src_u + j];
        j += 1;
    }

    let src_if = idx * ISECT_F32_STRIDE;
    let dst_if = (dest * ISECT_F32_STRIDE);
    let mut k = 0u32;
    while k < ISECT_F32_STRIDE {
        isect_f32_out[dst_if + k] = isect_f32_in[src_if + k];
        k += 1;
    }

    let src_iu = idx * ISECT_U32_STRIDE;
    let dst_iu = (dest * ISECT_U32_STRIDE);
    let mut m = 0u32;
    while m < ISECT_U32_STRIDE {
        isect_u32_out[dst_iu + m] = isect_u32_in[src_iu + m];
        m += 1;
    }
}
