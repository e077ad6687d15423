//! Renderer context: device lifecycle and the per-iteration wavefront loop.

use cubecl::prelude::*;
use cubecl::server::Handle;
use cubecl::wgpu::{WgpuDevice, WgpuRuntime};
use log::{debug, info};

use crate::gpu;
use crate::scene::Scene;

use super::constants::{
    GBUFFER_STRIDE, ISECT_F32_STRIDE, ISECT_U32_STRIDE, PATH_F32_STRIDE, PATH_U32_STRIDE,
    WORKGROUP_SIZE,
};
use super::prepare::{prepare_scene, CameraParams};
use super::types::{DenoiseParams, Framebuffer, IntegratorKind, RenderError, RenderSettings};
use super::utils::{div_ceil, ensure_nonempty, ensure_nonempty_u32};

type Client = ComputeClient<<WgpuRuntime as Runtime>::Server, <WgpuRuntime as Runtime>::Channel>;

/// A device buffer handle plus its logical element count.
struct GpuBuffer {
    handle: Handle,
    len: usize,
}

impl GpuBuffer {
    fn from_f32(client: &Client, data: Vec<f32>) -> Self {
        let data = ensure_nonempty(data, 0.0);
        Self {
            handle: client.create_from_slice(f32::as_bytes(&data)),
            len: data.len(),
        }
    }

    fn from_u32(client: &Client, data: Vec<u32>) -> Self {
        let data = ensure_nonempty_u32(data, 0);
        Self {
            handle: client.create_from_slice(u32::as_bytes(&data)),
            len: data.len(),
        }
    }

    fn zeros_f32(client: &Client, len: usize) -> Self {
        Self::from_f32(client, vec![0.0; len])
    }

    fn zeros_u32(client: &Client, len: usize) -> Self {
        Self::from_u32(client, vec![0; len])
    }

    fn arg<E: CubePrimitive>(&self) -> ArrayArg<'_, WgpuRuntime> {
        ArrayArg::from_raw_parts::<E>(&self.handle, self.len, 1)
    }
}

/// Everything `init` allocates; dropped wholesale by `free`.
struct RenderState {
    // Scene-constant buffers.
    geom_f32: GpuBuffer,
    geom_u32: GpuBuffer,
    material_f32: GpuBuffer,
    material_u32: GpuBuffer,
    light_f32: GpuBuffer,
    light_u32: GpuBuffer,
    light_tri_cdf: GpuBuffer,
    tri_positions: GpuBuffer,
    tri_normals: GpuBuffer,
    tri_uvs: GpuBuffer,
    tri_indices: GpuBuffer,
    tex_data: GpuBuffer,
    tex_desc: GpuBuffer,
    env_data: GpuBuffer,
    kd_nodes: GpuBuffer,
    kd_splits: GpuBuffer,
    kd_prim_geoms: GpuBuffer,
    kd_prim_tris: GpuBuffer,

    // Per-iteration scratch, ping-ponged by compaction and the sort.
    path_f32_a: GpuBuffer,
    path_f32_b: GpuBuffer,
    path_u32_a: GpuBuffer,
    path_u32_b: GpuBuffer,
    isect_f32_a: GpuBuffer,
    isect_f32_b: GpuBuffer,
    isect_u32_a: GpuBuffer,
    isect_u32_b: GpuBuffer,
    cache_f32: GpuBuffer,
    cache_u32: GpuBuffer,
    offsets_a: GpuBuffer,
    offsets_b: GpuBuffer,

    // Images.
    gbuffer: GpuBuffer,
    accum: GpuBuffer,
    denoise_a: GpuBuffer,
    denoise_b: GpuBuffer,

    camera: CameraParams,
    num_pixels: u32,
    num_geoms: u32,
    num_lights: u32,
    num_materials: u32,
    num_kd_nodes: u32,
    env_width: u32,
    env_height: u32,
    env_present: u32,
    cache_enabled: bool,
    cache_valid: bool,
}

/// Wavefront path tracing context with a two-phase `init` / `free`
/// lifecycle. Scene data is read-only after `init`; the accumulator is
/// append-only across `render_iteration` calls.
pub struct Renderer {
    device: WgpuDevice,
    settings: RenderSettings,
    state: Option<RenderState>,
}

impl Renderer {
    /// Construct a renderer on the default WGPU device.
    pub fn new(settings: RenderSettings) -> Self {
        Self {
            device: WgpuDevice::default(),
            settings,
            state: None,
        }
    }

    /// Construct a renderer with a caller-provided device.
    pub fn with_device(device: WgpuDevice, settings: RenderSettings) -> Self {
        Self {
            device,
            settings,
            state: None,
        }
    }

    /// Settings fixed at construction.
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Validate the scene and allocate every device buffer. Fails without
    /// touching the context if the scene is invalid; fails with
    /// `AlreadyInitialized` if `free` was not called first.
    pub fn init(&mut self, scene: &Scene) -> Result<(), RenderError> {
        if self.state.is_some() {
            return Err(RenderError::AlreadyInitialized);
        }

        let prepared = prepare_scene(scene)?;
        let client = WgpuRuntime::client(&self.device);

        let num_pixels = prepared.camera.width * prepared.camera.height;
        let n = num_pixels as usize;

        let cache_enabled = self.settings.first_bounce_cache
            && !self.settings.antialiasing
            && prepared.camera.lens_radius == 0.0;

        info!(
            "path tracer init: {}x{} pixels, {} geoms, {} lights, {} materials, {} kd nodes",
            prepared.camera.width,
            prepared.camera.height,
            prepared.num_geoms,
            prepared.num_lights,
            prepared.num_materials,
            prepared.kd.node_count(),
        );

        let state = RenderState {
            num_kd_nodes: prepared.kd.node_count() as u32,
            geom_f32: GpuBuffer::from_f32(&client, prepared.geom_f32),
            geom_u32: GpuBuffer::from_u32(&client, prepared.geom_u32),
            material_f32: GpuBuffer::from_f32(&client, prepared.material_f32),
            material_u32: GpuBuffer::from_u32(&client, prepared.material_u32),
            light_f32: GpuBuffer::from_f32(&client, prepared.light_f32),
            light_u32: GpuBuffer::from_u32(&client, prepared.light_u32),
            light_tri_cdf: GpuBuffer::from_f32(&client, prepared.light_tri_cdf),
            tri_positions: GpuBuffer::from_f32(&client, prepared.tri_positions),
            tri_normals: GpuBuffer::from_f32(&client, prepared.tri_normals),
            tri_uvs: GpuBuffer::from_f32(&client, prepared.tri_uvs),
            tri_indices: GpuBuffer::from_u32(&client, prepared.tri_indices),
            tex_data: GpuBuffer::from_f32(&client, prepared.tex_data),
            tex_desc: GpuBuffer::from_u32(&client, prepared.tex_desc),
            env_data: GpuBuffer::from_f32(&client, prepared.env_data),
            kd_nodes: GpuBuffer::from_u32(&client, prepared.kd.nodes),
            kd_splits: GpuBuffer::from_f32(&client, prepared.kd.splits),
            kd_prim_geoms: GpuBuffer::from_u32(&client, prepared.kd.prim_geoms),
            kd_prim_tris: GpuBuffer::from_u32(&client, prepared.kd.prim_tris),
            path_f32_a: GpuBuffer::zeros_f32(&client, n * PATH_F32_STRIDE),
            path_f32_b: GpuBuffer::zeros_f32(&client, n * PATH_F32_STRIDE),
            path_u32_a: GpuBuffer::zeros_u32(&client, n * PATH_U32_STRIDE),
            path_u32_b: GpuBuffer::zeros_u32(&client, n * PATH_U32_STRIDE),
            isect_f32_a: GpuBuffer::zeros_f32(&client, n * ISECT_F32_STRIDE),
            isect_f32_b: GpuBuffer::zeros_f32(&client, n * ISECT_F32_STRIDE),
            isect_u32_a: GpuBuffer::zeros_u32(&client, n * ISECT_U32_STRIDE),
            isect_u32_b: GpuBuffer::zeros_u32(&client, n * ISECT_U32_STRIDE),
            cache_f32: GpuBuffer::zeros_f32(&client, n * ISECT_F32_STRIDE),
            cache_u32: GpuBuffer::zeros_u32(&client, n * ISECT_U32_STRIDE),
            offsets_a: GpuBuffer::zeros_u32(&client, n + 1),
            offsets_b: GpuBuffer::zeros_u32(&client, n + 1),
            gbuffer: GpuBuffer::zeros_f32(&client, n * GBUFFER_STRIDE),
            accum: GpuBuffer::zeros_f32(&client, n * 3),
            denoise_a: GpuBuffer::zeros_f32(&client, n * 3),
            denoise_b: GpuBuffer::zeros_f32(&client, n * 3),
            camera: prepared.camera,
            num_pixels,
            num_geoms: prepared.num_geoms,
            num_lights: prepared.num_lights,
            num_materials: prepared.num_materials,
            env_width: prepared.env_width,
            env_height: prepared.env_height,
            env_present: u32::from(prepared.env_present),
            cache_enabled,
            cache_valid: false,
        };

        self.state = Some(state);
        Ok(())
    }

    /// Release all device state. Safe to call repeatedly.
    pub fn free(&mut self) {
        if self.state.take().is_some() {
            info!("path tracer freed device buffers");
        }
    }

    /// Advance the accumulator by one sample per pixel. `iteration` starts
    /// at 1 and must increase monotonically between calls.
    pub fn render_iteration(&mut self, iteration: u32) -> Result<(), RenderError> {
        let settings = self.settings;
        let state = self.state.as_mut().ok_or(RenderError::Uninitialized)?;
        let client = WgpuRuntime::client(&self.device);

        let n = state.num_pixels;
        let dim = CubeDim::new_1d(WORKGROUP_SIZE);
        let full_count = CubeCount::new_1d(div_ceil(n, WORKGROUP_SIZE));
        let cam = state.camera;

        unsafe {
            gpu::generate_primary_paths::launch_unchecked::<WgpuRuntime>(
                &client,
                full_count.clone(),
                dim,
                ScalarArg::new(cam.width),
                ScalarArg::new(cam.height),
                ScalarArg::new(iteration),
                ScalarArg::new(settings.seed),
                ScalarArg::new(settings.trace_depth),
                ScalarArg::new(u32::from(settings.antialiasing)),
                ScalarArg::new(cam.position.x),
                ScalarArg::new(cam.position.y),
                ScalarArg::new(cam.position.z),
                ScalarArg::new(cam.view.x),
                ScalarArg::new(cam.view.y),
                ScalarArg::new(cam.view.z),
                ScalarArg::new(cam.up.x),
                ScalarArg::new(cam.up.y),
                ScalarArg::new(cam.up.z),
                ScalarArg::new(cam.right.x),
                ScalarArg::new(cam.right.y),
                ScalarArg::new(cam.right.z),
                ScalarArg::new(cam.pixel_len_x),
                ScalarArg::new(cam.pixel_len_y),
                ScalarArg::new(cam.lens_radius),
                ScalarArg::new(cam.focal_distance),
                state.path_f32_a.arg::<f32>(),
                state.path_u32_a.arg::<u32>(),
            )
            .map_err(RenderError::Launch)?;
        }

        let mut num_live = n;
        for depth in 0..settings.trace_depth {
            let use_cache = depth == 0 && state.cache_enabled;
            if use_cache && state.cache_valid {
                launch_copy_intersections(
                    &client,
                    n,
                    &state.cache_f32,
                    &state.cache_u32,
                    &state.isect_f32_a,
                    &state.isect_u32_a,
                )?;
            } else {
                launch_intersections(&client, state, num_live)?;
                if use_cache {
                    launch_copy_intersections(
                        &client,
                        n,
                        &state.isect_f32_a,
                        &state.isect_u32_a,
                        &state.cache_f32,
                        &state.cache_u32,
                    )?;
                    state.cache_valid = true;
                }
            }

            if depth == 0 {
                unsafe {
                    gpu::capture_gbuffer::launch_unchecked::<WgpuRuntime>(
                        &client,
                        full_count.clone(),
                        dim,
                        state.isect_f32_a.arg::<f32>(),
                        ScalarArg::new(n),
                        state.gbuffer.arg::<f32>(),
                    )
                    .map_err(RenderError::Launch)?;
                }
            }

            if settings.sort_by_material && num_live > 0 {
                sort_paths_by_material(&client, state, num_live)?;
            }

            launch_shade(&client, state, &settings, iteration, depth, num_live)?;

            num_live = compact_paths(&client, state)?;
            debug!("iteration {iteration} depth {depth}: {num_live} live paths");
            if num_live == 0 {
                break;
            }
        }

        unsafe {
            gpu::final_gather::launch_unchecked::<WgpuRuntime>(
                &client,
                full_count,
                dim,
                state.path_f32_a.arg::<f32>(),
                state.path_u32_a.arg::<u32>(),
                ScalarArg::new(n),
                state.accum.arg::<f32>(),
            )
            .map_err(RenderError::Launch)?;
        }

        Ok(())
    }

    /// Host-visible copy of the raw radiance accumulator (sums, not means).
    pub fn read_framebuffer(&self) -> Result<Framebuffer, RenderError> {
        let state = self.state.as_ref().ok_or(RenderError::Uninitialized)?;
        let client = WgpuRuntime::client(&self.device);
        let bytes = client.read_one(state.accum.handle.clone());
        let pixels = f32::from_bytes(&bytes)[..state.num_pixels as usize * 3].to_vec();
        Ok(Framebuffer {
            width: state.camera.width,
            height: state.camera.height,
            pixels,
        })
    }

    /// Run the edge-aware A-Trous filter over the current accumulator and
    /// return the filtered image, rescaled by `iteration` so display code
    /// can divide uniformly.
    pub fn denoise(
        &mut self,
        params: &DenoiseParams,
        iteration: u32,
    ) -> Result<Framebuffer, RenderError> {
        let state = self.state.as_mut().ok_or(RenderError::Uninitialized)?;
        let client = WgpuRuntime::client(&self.device);

        let n = state.num_pixels;
        let dim = CubeDim::new_1d(WORKGROUP_SIZE);
        let count = CubeCount::new_1d(div_ceil(n, WORKGROUP_SIZE));
        let cam = state.camera;

        unsafe {
            gpu::prepare_denoise_input::launch_unchecked::<WgpuRuntime>(
                &client,
                count.clone(),
                dim,
                state.accum.arg::<f32>(),
                ScalarArg::new(n),
                ScalarArg::new(iteration),
                state.denoise_a.arg::<f32>(),
            )
            .map_err(RenderError::Launch)?;
        }

        // Iterate the 5x5 stencil with doubling tap stride until the
        // footprint reaches the requested filter size.
        let mut passes = 0u32;
        while (4u32 << passes) <= params.filter_size {
            passes += 1;
        }
        let passes = passes.max(1);

        let mut input_is_a = true;
        for k in 0..passes {
            let (input, output) = if input_is_a {
                (&state.denoise_a, &state.denoise_b)
            } else {
                (&state.denoise_b, &state.denoise_a)
            };
            unsafe {
                gpu::atrous_pass::launch_unchecked::<WgpuRuntime>(
                    &client,
                    count.clone(),
                    dim,
                    input.arg::<f32>(),
                    state.gbuffer.arg::<f32>(),
                    ScalarArg::new(cam.width),
                    ScalarArg::new(cam.height),
                    ScalarArg::new(1u32 << k),
                    ScalarArg::new(params.sigma_color),
                    ScalarArg::new(params.sigma_normal),
                    ScalarArg::new(params.sigma_position),
                    ScalarArg::new(cam.position.x),
                    ScalarArg::new(cam.position.y),
                    ScalarArg::new(cam.position.z),
                    ScalarArg::new(cam.view.x),
                    ScalarArg::new(cam.view.y),
                    ScalarArg::new(cam.view.z),
                    ScalarArg::new(cam.up.x),
                    ScalarArg::new(cam.up.y),
                    ScalarArg::new(cam.up.z),
                    ScalarArg::new(cam.right.x),
                    ScalarArg::new(cam.right.y),
                    ScalarArg::new(cam.right.z),
                    ScalarArg::new(cam.pixel_len_x),
                    ScalarArg::new(cam.pixel_len_y),
                    output.arg::<f32>(),
                )
                .map_err(RenderError::Launch)?;
            }
            input_is_a = !input_is_a;
        }

        let (filtered, scratch) = if input_is_a {
            (&state.denoise_a, &state.denoise_b)
        } else {
            (&state.denoise_b, &state.denoise_a)
        };
        unsafe {
            gpu::finalize_denoise_output::launch_unchecked::<WgpuRuntime>(
                &client,
                count,
                dim,
                filtered.arg::<f32>(),
                ScalarArg::new(n),
                ScalarArg::new(iteration),
                scratch.arg::<f32>(),
            )
            .map_err(RenderError::Launch)?;
        }

        let bytes = client.read_one(scratch.handle.clone());
        let pixels = f32::from_bytes(&bytes)[..n as usize * 3].to_vec();
        Ok(Framebuffer {
            width: cam.width,
            height: cam.height,
            pixels,
        })
    }

    /// Isotropic Gaussian fallback filter, kept for comparison runs.
    pub fn denoise_gaussian(
        &mut self,
        sigma: f32,
        radius: u32,
        iteration: u32,
    ) -> Result<Framebuffer, RenderError> {
        let state = self.state.as_mut().ok_or(RenderError::Uninitialized)?;
        let client = WgpuRuntime::client(&self.device);

        let n = state.num_pixels;
        let dim = CubeDim::new_1d(WORKGROUP_SIZE);
        let count = CubeCount::new_1d(div_ceil(n, WORKGROUP_SIZE));

        // Quarter kernel: one octant of the separable Gaussian, mirror
        // indexed by |offset|.
        let denom = 2.0 * sigma.max(1.0e-6) * sigma.max(1.0e-6);
        let quarter: Vec<f32> = (0..=radius)
            .map(|i| (-((i * i) as f32) / denom).exp())
            .collect();
        let quarter_kernel = GpuBuffer::from_f32(&client, quarter);

        unsafe {
            gpu::prepare_denoise_input::launch_unchecked::<WgpuRuntime>(
                &client,
                count.clone(),
                dim,
                state.accum.arg::<f32>(),
                ScalarArg::new(n),
                ScalarArg::new(iteration),
                state.denoise_a.arg::<f32>(),
            )
            .map_err(RenderError::Launch)?;

            gpu::gaussian_pass::launch_unchecked::<WgpuRuntime>(
                &client,
                count.clone(),
                dim,
                state.denoise_a.arg::<f32>(),
                ScalarArg::new(state.camera.width),
                ScalarArg::new(state.camera.height),
                ScalarArg::new(radius),
                quarter_kernel.arg::<f32>(),
                state.denoise_b.arg::<f32>(),
            )
            .map_err(RenderError::Launch)?;

            gpu::finalize_denoise_output::launch_unchecked::<WgpuRuntime>(
                &client,
                count,
                dim,
                state.denoise_b.arg::<f32>(),
                ScalarArg::new(n),
                ScalarArg::new(iteration),
                state.denoise_a.arg::<f32>(),
            )
            .map_err(RenderError::Launch)?;
        }

        let bytes = client.read_one(state.denoise_a.handle.clone());
        let pixels = f32::from_bytes(&bytes)[..n as usize * 3].to_vec();
        Ok(Framebuffer {
            width: state.camera.width,
            height: state.camera.height,
            pixels,
        })
    }
}

fn launch_intersections(
    client: &Client,
    state: &RenderState,
    num_live: u32,
) -> Result<(), RenderError> {
    if num_live == 0 {
        return Ok(());
    }
    let dim = CubeDim::new_1d(WORKGROUP_SIZE);
    let count = CubeCount::new_1d(div_ceil(num_live, WORKGROUP_SIZE));
    unsafe {
        gpu::compute_intersections::launch_unchecked::<WgpuRuntime>(
            client,
            count,
            dim,
            state.path_f32_a.arg::<f32>(),
            ScalarArg::new(num_live),
            state.kd_nodes.arg::<u32>(),
            state.kd_splits.arg::<f32>(),
            state.kd_prim_geoms.arg::<u32>(),
            state.kd_prim_tris.arg::<u32>(),
            ScalarArg::new(state.num_kd_nodes),
            state.geom_f32.arg::<f32>(),
            state.geom_u32.arg::<u32>(),
            ScalarArg::new(state.num_geoms),
            state.tri_positions.arg::<f32>(),
            state.tri_normals.arg::<f32>(),
            state.tri_uvs.arg::<f32>(),
            state.tri_indices.arg::<u32>(),
            state.isect_f32_a.arg::<f32>(),
            state.isect_u32_a.arg::<u32>(),
        )
        .map_err(RenderError::Launch)?;
    }
    Ok(())
}

fn launch_copy_intersections(
    client: &Client,
    num_paths: u32,
    src_f32: &GpuBuffer,
    src_u32: &GpuBuffer,
    dst_f32: &GpuBuffer,
    dst_u32: &GpuBuffer,
) -> Result<(), RenderError> {
    let dim = CubeDim::new_1d(WORKGROUP_SIZE);
    let count = CubeCount::new_1d(div_ceil(num_paths, WORKGROUP_SIZE));
    unsafe {
        gpu::copy_intersections::launch_unchecked::<WgpuRuntime>(
            client,
            count,
            dim,
            src_f32.arg::<f32>(),
            src_u32.arg::<u32>(),
            ScalarArg::new(num_paths),
            dst_f32.arg::<f32>(),
            dst_u32.arg::<u32>(),
        )
        .map_err(RenderError::Launch)?;
    }
    Ok(())
}

fn launch_shade(
    client: &Client,
    state: &RenderState,
    settings: &RenderSettings,
    iteration: u32,
    depth: u32,
    num_live: u32,
) -> Result<(), RenderError> {
    if num_live == 0 {
        return Ok(());
    }
    let dim = CubeDim::new_1d(WORKGROUP_SIZE);
    let count = CubeCount::new_1d(div_ceil(num_live, WORKGROUP_SIZE));
    unsafe {
        match settings.integrator {
            IntegratorKind::Naive => gpu::shade_naive::launch_unchecked::<WgpuRuntime>(
                client,
                count,
                dim,
                ScalarArg::new(iteration),
                ScalarArg::new(depth),
                ScalarArg::new(settings.seed),
                ScalarArg::new(num_live),
                state.path_f32_a.arg::<f32>(),
                state.path_u32_a.arg::<u32>(),
                state.isect_f32_a.arg::<f32>(),
                state.isect_u32_a.arg::<u32>(),
                state.material_f32.arg::<f32>(),
                state.material_u32.arg::<u32>(),
                state.tex_data.arg::<f32>(),
                state.tex_desc.arg::<u32>(),
                state.env_data.arg::<f32>(),
                ScalarArg::new(state.env_width),
                ScalarArg::new(state.env_height),
                ScalarArg::new(state.env_present),
            ),
            IntegratorKind::DirectMis => gpu::shade_direct_mis::launch_unchecked::<WgpuRuntime>(
                client,
                count,
                dim,
                ScalarArg::new(iteration),
                ScalarArg::new(depth),
                ScalarArg::new(settings.seed),
                ScalarArg::new(num_live),
                state.path_f32_a.arg::<f32>(),
                state.path_u32_a.arg::<u32>(),
                state.isect_f32_a.arg::<f32>(),
                state.isect_u32_a.arg::<u32>(),
                state.material_f32.arg::<f32>(),
                state.material_u32.arg::<u32>(),
                state.tex_data.arg::<f32>(),
                state.tex_desc.arg::<u32>(),
                state.kd_nodes.arg::<u32>(),
                state.kd_splits.arg::<f32>(),
                state.kd_prim_geoms.arg::<u32>(),
                state.kd_prim_tris.arg::<u32>(),
                ScalarArg::new(state.num_kd_nodes),
                state.geom_f32.arg::<f32>(),
                state.geom_u32.arg::<u32>(),
                ScalarArg::new(state.num_geoms),
                state.tri_positions.arg::<f32>(),
                state.tri_normals.arg::<f32>(),
                state.tri_uvs.arg::<f32>(),
                state.tri_indices.arg::<u32>(),
                state.light_f32.arg::<f32>(),
                state.light_u32.arg::<u32>(),
                state.light_tri_cdf.arg::<f32>(),
                ScalarArg::new(state.num_lights),
                state.env_data.arg::<f32>(),
                ScalarArg::new(state.env_width),
                ScalarArg::new(state.env_height),
                ScalarArg::new(state.env_present),
            ),
            IntegratorKind::Full => gpu::shade_full::launch_unchecked::<WgpuRuntime>(
                client,
                count,
                dim,
                ScalarArg::new(iteration),
                ScalarArg::new(depth),
                ScalarArg::new(settings.seed),
                ScalarArg::new(num_live),
                ScalarArg::new(settings.trace_depth),
                ScalarArg::new(u32::from(settings.russian_roulette)),
                state.path_f32_a.arg::<f32>(),
                state.path_u32_a.arg::<u32>(),
                state.isect_f32_a.arg::<f32>(),
                state.isect_u32_a.arg::<u32>(),
                state.material_f32.arg::<f32>(),
                state.material_u32.arg::<u32>(),
                state.tex_data.arg::<f32>(),
                state.tex_desc.arg::<u32>(),
                state.kd_nodes.arg::<u32>(),
                state.kd_splits.arg::<f32>(),
                state.kd_prim_geoms.arg::<u32>(),
                state.kd_prim_tris.arg::<u32>(),
                ScalarArg::new(state.num_kd_nodes),
                state.geom_f32.arg::<f32>(),
                state.geom_u32.arg::<u32>(),
                ScalarArg::new(state.num_geoms),
                state.tri_positions.arg::<f32>(),
                state.tri_normals.arg::<f32>(),
                state.tri_uvs.arg::<f32>(),
                state.tri_indices.arg::<u32>(),
                state.light_f32.arg::<f32>(),
                state.light_u32.arg::<u32>(),
                state.light_tri_cdf.arg::<f32>(),
                ScalarArg::new(state.num_lights),
                state.env_data.arg::<f32>(),
                ScalarArg::new(state.env_width),
                ScalarArg::new(state.env_height),
                ScalarArg::new(state.env_present),
            ),
        }
        .map_err(RenderError::Launch)?;
    }
    Ok(())
}

/// Stable partition of the whole path array; returns the new live count.
fn compact_paths(client: &Client, state: &mut RenderState) -> Result<u32, RenderError> {
    let n = state.num_pixels;
    let num_entries = n + 1;
    let dim = CubeDim::new_1d(WORKGROUP_SIZE);
    let full_count = CubeCount::new_1d(div_ceil(n, WORKGROUP_SIZE));
    let entry_count = CubeCount::new_1d(div_ceil(num_entries, WORKGROUP_SIZE));

    unsafe {
        gpu::init_live_offsets::launch_unchecked::<WgpuRuntime>(
            client,
            full_count.clone(),
            dim,
            state.path_u32_a.arg::<u32>(),
            ScalarArg::new(n),
            state.offsets_a.arg::<u32>(),
        )
        .map_err(RenderError::Launch)?;

        let mut offsets_in_a = true;
        let mut stride = 1u32;
        while stride < num_entries {
            let (src, dst) = if offsets_in_a {
                (&state.offsets_a, &state.offsets_b)
            } else {
                (&state.offsets_b, &state.offsets_a)
            };
            gpu::scan_offsets::launch_unchecked::<WgpuRuntime>(
                client,
                entry_count.clone(),
                dim,
                src.arg::<u32>(),
                dst.arg::<u32>(),
                ScalarArg::new(num_entries),
                ScalarArg::new(stride),
            )
            .map_err(RenderError::Launch)?;
            offsets_in_a = !offsets_in_a;
            stride = stride.saturating_mul(2);
        }

        let scanned = if offsets_in_a {
            &state.offsets_a
        } else {
            &state.offsets_b
        };

        gpu::scatter_partition::launch_unchecked::<WgpuRuntime>(
            client,
            full_count,
            dim,
            state.path_f32_a.arg::<f32>(),
            state.path_u32_a.arg::<u32>(),
            scanned.arg::<u32>(),
            ScalarArg::new(n),
            state.path_f32_b.arg::<f32>(),
            state.path_u32_b.arg::<u32>(),
        )
        .map_err(RenderError::Launch)?;

        let bytes = client.read_one(scanned.handle.clone());
        let totals = u32::from_bytes(&bytes);
        let num_live = totals[n as usize];

        std::mem::swap(&mut state.path_f32_a, &mut state.path_f32_b);
        std::mem::swap(&mut state.path_u32_a, &mut state.path_u32_b);

        Ok(num_live)
    }
}

/// Optional material sort: bucket live paths (and their intersections) by
/// hit material so warps shade coherently.
fn sort_paths_by_material(
    client: &Client,
    state: &mut RenderState,
    num_live: u32,
) -> Result<(), RenderError> {
    let n = state.num_pixels;
    let num_buckets = state.num_materials + 1;
    let num_entries = num_buckets + 1;
    let dim = CubeDim::new_1d(WORKGROUP_SIZE);
    let live_count = CubeCount::new_1d(div_ceil(num_live, WORKGROUP_SIZE));
    let full_count = CubeCount::new_1d(div_ceil(n, WORKGROUP_SIZE));
    let bucket_count = CubeCount::new_1d(div_ceil(num_entries, WORKGROUP_SIZE));

    let counts = GpuBuffer::zeros_u32(client, num_buckets as usize);
    let offsets_a = GpuBuffer::zeros_u32(client, num_entries as usize);
    let offsets_b = GpuBuffer::zeros_u32(client, num_entries as usize);
    let cursors = GpuBuffer::zeros_u32(client, num_buckets as usize);

    unsafe {
        gpu::count_material_buckets::launch_unchecked::<WgpuRuntime>(
            client,
            live_count.clone(),
            dim,
            state.path_u32_a.arg::<u32>(),
            state.isect_u32_a.arg::<u32>(),
            ScalarArg::new(num_live),
            ScalarArg::new(state.num_materials),
            counts.arg::<u32>(),
        )
        .map_err(RenderError::Launch)?;

        gpu::init_bucket_offsets::launch_unchecked::<WgpuRuntime>(
            client,
            bucket_count.clone(),
            dim,
            counts.arg::<u32>(),
            ScalarArg::new(num_buckets),
            offsets_a.arg::<u32>(),
        )
        .map_err(RenderError::Launch)?;

        let mut offsets_in_a = true;
        let mut stride = 1u32;
        while stride < num_entries {
            let (src, dst) = if offsets_in_a {
                (&offsets_a, &offsets_b)
            } else {
                (&offsets_b, &offsets_a)
            };
            gpu::scan_offsets::launch_unchecked::<WgpuRuntime>(
                client,
                bucket_count.clone(),
                dim,
                src.arg::<u32>(),
                dst.arg::<u32>(),
                ScalarArg::new(num_entries),
                ScalarArg::new(stride),
            )
            .map_err(RenderError::Launch)?;
            offsets_in_a = !offsets_in_a;
            stride = stride.saturating_mul(2);
        }
        let scanned = if offsets_in_a { &offsets_a } else { &offsets_b };

        gpu::init_bucket_cursors::launch_unchecked::<WgpuRuntime>(
            client,
            bucket_count,
            dim,
            scanned.arg::<u32>(),
            ScalarArg::new(num_buckets),
            cursors.arg::<u32>(),
        )
        .map_err(RenderError::Launch)?;

        gpu::scatter_by_material::launch_unchecked::<WgpuRuntime>(
            client,
            full_count,
            dim,
            state.path_f32_a.arg::<f32>(),
            state.path_u32_a.arg::<u32>(),
            state.isect_f32_a.arg::<f32>(),
            state.isect_u32_a.arg::<u32>(),
            ScalarArg::new(num_live),
            ScalarArg::new(n),
            ScalarArg::new(state.num_materials),
            cursors.arg::<u32>(),
            state.path_f32_b.arg::<f32>(),
            state.path_u32_b.arg::<u32>(),
            state.isect_f32_b.arg::<f32>(),
            state.isect_u32_b.arg::<u32>(),
        )
        .map_err(RenderError::Launch)?;
    }

    std::mem::swap(&mut state.path_f32_a, &mut state.path_f32_b);
    std::mem::swap(&mut state.path_u32_a, &mut state.path_u32_b);
    std::mem::swap(&mut state.isect_f32_a, &mut state.isect_f32_b);
    std::mem::swap(&mut state.isect_u32_a, &mut state.isect_u32_b);
    Ok(())
}
