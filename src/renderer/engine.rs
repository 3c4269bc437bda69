//! Render Engine
//!
//! [`RenderEngine`] owns the scene, camera and output target of one view and
//! turns them into an ordered list of [`RenderPass`]es. The list is rebuilt
//! whenever one of the three inputs is replaced, or when a structural setting
//! (render scale, shadow offset, bloom iterations, tonemapping, gizmos)
//! changes.
//!
//! # Pass list
//!
//! ```text
//!  Shadow Map #0..N   depth-only, one per shadow-casting directional light
//!  Opaque Scene       scene drawables → working target (HDR + bright)
//!  Skybox             sky cubemap, depth test ≤, no depth write
//!  Bloom              highpass → downsample → blur × N → additive blend
//!  Tonemap            working target → output (or plain copy)
//!  Gizmos             axes, light markers, bounds → output
//! ```
//!
//! Every stage whose setup fails is logged and left out; the remaining
//! stages still run.
//!
//! # Frame
//!
//! ```rust,ignore
//! engine.update(&mut device, dt); // light matrices, uniform blocks, pass updates
//! engine.render(&mut device);     // every pass in order
//! ```

use std::sync::Arc;

use glam::{UVec2, Vec2, Vec4};
use rustc_hash::FxHashSet;
use smallvec::smallvec;

use crate::api::{Allocate, Device, check_errors};
use crate::errors::Result;
use crate::renderer::Renderer;
use crate::renderer::drawable::{Drawable, Primitive, SceneDrawable};
use crate::renderer::gizmo::setup_gizmos;
use crate::renderer::ibl::{self, IblMaps};
use crate::renderer::passes::{
    BloomControls, BloomPass, FrameContext, GeometryPass, RenderPass, TonemapPass, UpdateContext,
};
use crate::renderer::resource_manager::{ResourceManager, scaled_size};
use crate::renderer::settings::EngineSettings;
use crate::renderer::shadow::{SHADOW_UNIFORM_PREFIX, ShadowData};
use crate::renderer::state::{CullMode, DepthTest, RendererState};
use crate::renderer::stats::RenderStatistics;
use crate::resources::material::MaterialLayer;
use crate::resources::material_library::{MaterialLibrary, programs};
use crate::resources::primitives::MeshBuilder;
use crate::resources::render_target::{DepthAttachment, DepthFormat, RenderTarget};
use crate::resources::shader::ShaderProgram;
use crate::resources::texture::{Sampler, Texture, TextureFormat, TextureKind};
use crate::resources::uniforms::{
    CAMERA_BLOCK_BINDING, CAMERA_BLOCK_NAME, CameraUniforms, LIGHTS_BLOCK_BINDING,
    LIGHTS_BLOCK_NAME, LightsUniforms, MAX_LIGHT_COUNT, UniformBlock,
};
use crate::scene::{Camera, Scene};

/// Color attachment 1 of the working target receives the bright pixels.
const WORKING_DRAW_BUFFERS: [u32; 2] = [0, 1];

pub struct RenderEngine {
    settings: EngineSettings,
    renderer: Renderer,
    resources: ResourceManager,

    scene: Option<Scene>,
    camera: Option<Camera>,
    output: Option<Arc<RenderTarget>>,
    working: Option<Arc<RenderTarget>>,

    passes: Vec<Box<dyn RenderPass>>,
    shadows: Vec<ShadowData>,
    bloom: Option<BloomControls>,
    /// Maps of the last sky they were computed from.
    ibl: Option<(Arc<Texture>, IblMaps)>,

    camera_block: UniformBlock<CameraUniforms>,
    lights_block: UniformBlock<LightsUniforms>,

    wireframe: bool,
    needs_rebuild: bool,
}

impl RenderEngine {
    #[must_use]
    pub fn new(library: MaterialLibrary, mut settings: EngineSettings) -> Self {
        settings.sanitize();
        Self {
            settings,
            renderer: Renderer::new(),
            resources: ResourceManager::new(library),
            scene: None,
            camera: None,
            output: None,
            working: None,
            passes: Vec::new(),
            shadows: Vec::new(),
            bloom: None,
            ibl: None,
            camera_block: UniformBlock::new(
                CAMERA_BLOCK_NAME,
                CAMERA_BLOCK_BINDING,
                CameraUniforms::default(),
            ),
            lights_block: UniformBlock::new(
                LIGHTS_BLOCK_NAME,
                LIGHTS_BLOCK_BINDING,
                LightsUniforms::default(),
            ),
            wireframe: false,
            needs_rebuild: false,
        }
    }

    // ========================================================================
    // Triggers
    // ========================================================================

    pub fn set_scene(&mut self, device: &mut dyn Device, scene: Option<Scene>) {
        self.scene = scene;
        self.rebuild(device);
    }

    pub fn set_camera(&mut self, device: &mut dyn Device, camera: Option<Camera>) {
        self.camera = camera;
        self.rebuild(device);
    }

    pub fn set_output(&mut self, device: &mut dyn Device, output: Option<Arc<RenderTarget>>) {
        self.output = output;
        self.rebuild(device);
    }

    /// Discards the pass list and builds it again from the current inputs.
    ///
    /// Call after structural scene edits (nodes or lights added or removed,
    /// sky replaced). Transform edits need no rebuild.
    pub fn rebuild(&mut self, device: &mut dyn Device) {
        self.needs_rebuild = false;
        self.passes.clear();
        self.shadows.clear();
        self.bloom = None;

        let (Some(camera), Some(output)) = (self.camera.as_mut(), self.output.clone()) else {
            log::debug!("Pass list left empty: camera or output target missing");
            return;
        };

        // Working target
        let size = scaled_size(output.size(), self.settings.render_scale);
        if self.working.as_ref().is_none_or(|w| w.size() != size) {
            self.working = create_working_target(device, &self.resources, size);
        }
        let Some(working) = self.working.clone() else {
            log::error!("Working target {size} unavailable, nothing will be rendered");
            return;
        };
        camera.set_resolution(size);

        // Programs and shared blocks
        self.resources.library().compile_all(device);
        let drawables = self
            .scene
            .as_ref()
            .map(SceneDrawable::collect)
            .unwrap_or_default();
        let used = used_programs(&drawables);
        {
            let library_programs = self.resources.library().programs();
            for program in library_programs.into_iter().chain(used.iter()) {
                self.camera_block.attach(program, device);
                self.lights_block.attach(program, device);
            }
        }

        // Image-based lighting
        if self.settings.ibl {
            let sky = self.scene.as_ref().and_then(|s| s.sky().cloned());
            self.refresh_ibl(device, sky);
            if let Some((_, maps)) = &self.ibl {
                for program in &used {
                    maps.register(program);
                }
            }
        }

        if let Some(scene) = &self.scene {
            // Only opaque geometry casts shadows and samples the maps.
            let opaque: Vec<Arc<dyn Drawable>> = drawables
                .iter()
                .filter(|d| d.material().read().layer() == MaterialLayer::Opaque)
                .cloned()
                .collect();

            // Shadows
            if self.settings.shadows.enabled {
                let bounds = scene.scene_bounds();
                let casters: Vec<Arc<dyn Drawable>> = opaque
                    .iter()
                    .filter(|d| d.casts_shadows())
                    .cloned()
                    .collect();

                for (key, light) in scene.lights().take(MAX_LIGHT_COUNT) {
                    let Some(direction) = light.direction().filter(|_| light.is_shadow_caster())
                    else {
                        continue;
                    };
                    let index = self.shadows.len();
                    let mut shadow = match ShadowData::new(
                        device,
                        &self.resources,
                        key,
                        index,
                        self.settings.shadows.map_size,
                    ) {
                        Ok(shadow) => shadow,
                        Err(err) => {
                            log::warn!("Shadow map #{index} omitted: {err}");
                            continue;
                        }
                    };
                    shadow.update(direction, &bounds);

                    self.passes.push(Box::new(
                        GeometryPass::new(
                            format!("Shadow Map #{index}"),
                            Arc::clone(&shadow.target),
                            RendererState::shadow_map(self.settings.shadows.depth_offset()),
                            casters.clone(),
                        )
                        .with_override_material(Arc::clone(&shadow.material)),
                    ));
                    self.shadows.push(shadow);
                }
            }

            for program in &used {
                program.clear_defaults_with_prefix(SHADOW_UNIFORM_PREFIX);
            }
            for program in &used_programs(&opaque) {
                for shadow in &self.shadows {
                    shadow.register(program);
                }
            }

            // Opaque geometry
            let opaque_state = RendererState {
                clear_color_value: Vec4::new(0.0, 0.0, 0.0, 1.0),
                draw_buffers: smallvec![WORKING_DRAW_BUFFERS[0], WORKING_DRAW_BUFFERS[1]],
                ..RendererState::default()
            };
            self.passes.push(Box::new(GeometryPass::new(
                "Opaque Scene",
                Arc::clone(&working),
                opaque_state,
                drawables,
            )));

            // Sky
            if let Some(sky) = scene.sky() {
                match create_skybox_pass(device, &self.resources, &working, sky) {
                    Ok(pass) => self.passes.push(Box::new(pass)),
                    Err(err) => log::warn!("Skybox omitted: {err}"),
                }
            }
        }

        // Post-processing
        if self.settings.bloom.enabled {
            match BloomPass::new(device, &self.resources, Arc::clone(&working), &self.settings.bloom) {
                Ok(pass) => {
                    self.bloom = Some(pass.controls());
                    self.passes.push(Box::new(pass));
                }
                Err(err) => log::warn!("Bloom omitted: {err}"),
            }
        }
        match TonemapPass::new(
            &self.resources,
            &working,
            Arc::clone(&output),
            self.settings.tonemapping,
        ) {
            Ok(pass) => self.passes.push(Box::new(pass)),
            Err(err) => log::error!("Tonemapping omitted, output stays empty: {err}"),
        }

        if self.settings.gizmos {
            match setup_gizmos(
                device,
                &self.resources,
                self.scene.as_ref(),
                output,
                self.settings.gizmo_bounds,
            ) {
                Ok(pass) => self.passes.push(Box::new(pass)),
                Err(err) => log::warn!("Gizmos omitted: {err}"),
            }
        }

        if self.wireframe {
            for pass in &mut self.passes {
                pass.set_wireframe(true);
            }
        }

        log::info!(
            "Pass list rebuilt: {}",
            self.passes
                .iter()
                .map(|p| p.name())
                .collect::<Vec<_>>()
                .join(" → ")
        );
    }

    fn refresh_ibl(&mut self, device: &mut dyn Device, sky: Option<Arc<Texture>>) {
        let Some(sky) = sky.filter(|s| s.kind() == TextureKind::Cubemap) else {
            self.ibl = None;
            return;
        };
        if self
            .ibl
            .as_ref()
            .is_some_and(|(source, _)| Arc::ptr_eq(source, &sky))
        {
            return;
        }
        let library = self.resources.library();
        if ![programs::IBL_DIFFUSE, programs::IBL_SPECULAR, programs::INTEGRATED_BRDF]
            .iter()
            .all(|name| library.has_program(name))
        {
            log::debug!("IBL programs not registered, image-based lighting skipped");
            self.ibl = None;
            return;
        }

        let mut ctx = FrameContext {
            device,
            renderer: &mut self.renderer,
            resources: &mut self.resources,
            scene: None,
        };
        self.ibl = match ibl::compute_ibl(&mut ctx, &sky) {
            Ok(maps) => Some((sky, maps)),
            Err(err) => {
                log::warn!("Image-based lighting unavailable: {err}");
                None
            }
        };
    }

    // ========================================================================
    // Frame
    // ========================================================================

    /// Refreshes light matrices and uniform blocks, then updates every pass.
    pub fn update(&mut self, device: &mut dyn Device, delta_time: f32) {
        if let (Some(output), Some(working)) = (&self.output, &self.working)
            && scaled_size(output.size(), self.settings.render_scale) != working.size()
        {
            self.needs_rebuild = true;
        }
        if self.needs_rebuild {
            self.rebuild(device);
        }

        if let Some(scene) = &self.scene {
            let bounds = scene.scene_bounds();
            for shadow in &mut self.shadows {
                if let Some(direction) = scene.light(shadow.light).and_then(|l| l.direction()) {
                    shadow.update(direction, &bounds);
                }
            }
        }

        self.update_lights_block();
        if let Some(camera) = &self.camera {
            self.camera_block.set(camera.uniforms());
        }
        for result in [
            self.camera_block.upload(device),
            self.lights_block.upload(device),
        ] {
            if let Err(err) = result {
                log::error!("Uniform block upload failed: {err}");
            }
        }

        let ctx = UpdateContext {
            scene: self.scene.as_ref(),
            delta_time,
        };
        for pass in &mut self.passes {
            pass.update(&ctx);
        }
    }

    fn update_lights_block(&mut self) {
        let data = self.lights_block.data_mut();
        data.clear();
        let Some(scene) = &self.scene else {
            return;
        };
        for (key, light) in scene.lights() {
            let mut entry = light.to_uniform();
            if let Some(shadow) = self.shadows.iter().find(|s| s.light == key) {
                entry = entry.with_shadow(shadow.index as i32, shadow.biased_matrix());
            }
            if !data.push(entry) {
                log::trace!("Light count above {MAX_LIGHT_COUNT}, remaining lights ignored");
                break;
            }
        }
    }

    /// Runs every pass in order.
    pub fn render(&mut self, device: &mut dyn Device) {
        device.collect_garbage();
        let mut ctx = FrameContext {
            device,
            renderer: &mut self.renderer,
            resources: &mut self.resources,
            scene: self.scene.as_ref(),
        };
        for pass in &mut self.passes {
            pass.render(&mut ctx);
        }
        check_errors(ctx.device);
    }

    /// Per-pass measurements of the last frame. Blocks on GPU timers.
    pub fn statistics(&mut self, device: &mut dyn Device) -> Vec<(String, RenderStatistics)> {
        self.passes
            .iter_mut()
            .map(|pass| (pass.name().to_owned(), pass.statistics(device)))
            .collect()
    }

    /// Projects a 2:1 panorama onto a new cubemap usable as a sky.
    pub fn project_equirectangular_to_cubemap(
        &mut self,
        device: &mut dyn Device,
        source: &Arc<Texture>,
        size: u32,
    ) -> Result<Arc<Texture>> {
        let mut ctx = FrameContext {
            device,
            renderer: &mut self.renderer,
            resources: &mut self.resources,
            scene: None,
        };
        ibl::project_equirectangular_to_cubemap(&mut ctx, source, size)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Replaces every setting; the pass list is rebuilt on the next update.
    pub fn set_settings(&mut self, mut settings: EngineSettings) {
        settings.sanitize();
        self.settings = settings;
        self.needs_rebuild = true;
    }

    #[inline]
    #[must_use]
    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    /// Transform and uniform edits take effect on the next frame. Structural
    /// edits need [`rebuild`](Self::rebuild).
    #[inline]
    pub fn scene_mut(&mut self) -> Option<&mut Scene> {
        self.scene.as_mut()
    }

    #[inline]
    #[must_use]
    pub fn camera(&self) -> Option<&Camera> {
        self.camera.as_ref()
    }

    #[inline]
    pub fn camera_mut(&mut self) -> Option<&mut Camera> {
        self.camera.as_mut()
    }

    #[inline]
    #[must_use]
    pub fn output(&self) -> Option<&Arc<RenderTarget>> {
        self.output.as_ref()
    }

    /// HDR target the scene is rendered into before tonemapping.
    #[inline]
    #[must_use]
    pub fn working_target(&self) -> Option<&Arc<RenderTarget>> {
        self.working.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn passes(&self) -> &[Box<dyn RenderPass>] {
        &self.passes
    }

    #[inline]
    pub fn passes_mut(&mut self) -> &mut [Box<dyn RenderPass>] {
        &mut self.passes
    }

    pub fn find_pass_mut(&mut self, name: &str) -> Option<&mut Box<dyn RenderPass>> {
        self.passes.iter_mut().find(|p| p.name() == name)
    }

    #[inline]
    #[must_use]
    pub fn shadows(&self) -> &[ShadowData] {
        &self.shadows
    }

    #[inline]
    #[must_use]
    pub fn ibl_maps(&self) -> Option<&IblMaps> {
        self.ibl.as_ref().map(|(_, maps)| maps)
    }

    #[inline]
    #[must_use]
    pub fn camera_block(&self) -> &UniformBlock<CameraUniforms> {
        &self.camera_block
    }

    #[inline]
    #[must_use]
    pub fn lights_block(&self) -> &UniformBlock<LightsUniforms> {
        &self.lights_block
    }

    #[inline]
    #[must_use]
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    #[inline]
    #[must_use]
    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    #[inline]
    pub fn resources_mut(&mut self) -> &mut ResourceManager {
        &mut self.resources
    }

    #[inline]
    #[must_use]
    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    // ========================================================================
    // Runtime settings
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn render_scale(&self) -> f32 {
        self.settings.render_scale
    }

    /// Working target size relative to the output. Non-positive values are
    /// ignored.
    pub fn set_render_scale(&mut self, scale: f32) {
        if !(scale > 0.0) {
            log::warn!("Ignoring render scale {scale}");
            return;
        }
        if scale != self.settings.render_scale {
            self.settings.render_scale = scale;
            self.needs_rebuild = true;
        }
    }

    /// (factor, units)
    #[inline]
    #[must_use]
    pub fn shadow_depth_offset(&self) -> Vec2 {
        self.settings.shadows.depth_offset()
    }

    pub fn set_shadow_depth_offset(&mut self, factor: f32, units: f32) {
        self.settings.shadows.depth_offset_factor = factor;
        self.settings.shadows.depth_offset_units = units;
        self.needs_rebuild = true;
    }

    pub fn set_bloom_threshold(&mut self, threshold: f32) {
        self.settings.bloom.threshold = threshold;
        if let Some(bloom) = &self.bloom {
            bloom.set_threshold(threshold);
        }
    }

    pub fn set_bloom_intensity(&mut self, intensity: f32) {
        self.settings.bloom.intensity = intensity;
        if let Some(bloom) = &self.bloom {
            bloom.set_intensity(intensity);
        }
    }

    pub fn set_bloom_iterations(&mut self, iterations: u32) {
        if iterations != self.settings.bloom.iterations {
            self.settings.bloom.iterations = iterations;
            self.needs_rebuild = true;
        }
    }

    pub fn set_tonemapping(&mut self, tonemapping: bool) {
        if tonemapping != self.settings.tonemapping {
            self.settings.tonemapping = tonemapping;
            self.needs_rebuild = true;
        }
    }

    pub fn set_gizmos(&mut self, gizmos: bool) {
        if gizmos != self.settings.gizmos {
            self.settings.gizmos = gizmos;
            self.needs_rebuild = true;
        }
    }

    /// Applies to every pass, including ones built later.
    pub fn set_wireframe(&mut self, wireframe: bool) {
        self.wireframe = wireframe;
        for pass in &mut self.passes {
            pass.set_wireframe(wireframe);
        }
    }
}

impl std::fmt::Debug for RenderEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderEngine")
            .field("settings", &self.settings)
            .field("passes", &self.passes.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("shadows", &self.shadows.len())
            .field("needs_rebuild", &self.needs_rebuild)
            .finish_non_exhaustive()
    }
}

/// HDR color, bright color and a packed depth-stencil buffer.
fn create_working_target(
    device: &mut dyn Device,
    resources: &ResourceManager,
    size: UVec2,
) -> Option<Arc<RenderTarget>> {
    let colors = ["Scene Color", "Scene Bright"]
        .into_iter()
        .map(|name| {
            Arc::new(
                Texture::new_2d(size.x, size.y, TextureFormat::RGBAFloat, Sampler::screen())
                    .with_name(name),
            )
        })
        .collect();
    let target = RenderTarget::new(
        colors,
        Some(DepthAttachment::Buffer(DepthFormat::Depth24Stencil8)),
    )
    .with_name("Working Target");
    resources.create_render_target(device, target)
}

fn create_skybox_pass(
    device: &mut dyn Device,
    resources: &ResourceManager,
    working: &Arc<RenderTarget>,
    sky: &Arc<Texture>,
) -> Result<GeometryPass> {
    let material = resources.instantiate(programs::SKYBOX, "Skybox")?;
    material.write().set_texture("skybox", Arc::clone(sky));
    let geometry = Arc::new(MeshBuilder::skybox().with_name("Skybox"));
    geometry.allocate(device)?;

    let state = RendererState {
        clear_color: false,
        clear_depth: false,
        clear_stencil: false,
        write_depth: false,
        depth_test: DepthTest::LessEqual,
        cull_mode: CullMode::None,
        ..RendererState::default()
    };
    let drawables: Vec<Arc<dyn Drawable>> = vec![Arc::new(Primitive::new(geometry, material))];
    Ok(GeometryPass::new("Skybox", Arc::clone(working), state, drawables))
}

/// Distinct programs of `drawables`, in first-use order.
fn used_programs(drawables: &[Arc<dyn Drawable>]) -> Vec<Arc<ShaderProgram>> {
    let mut seen = FxHashSet::default();
    let mut programs = Vec::new();
    for drawable in drawables {
        let program = Arc::clone(drawable.material().read().program());
        if seen.insert(Arc::as_ptr(&program) as usize) {
            programs.push(program);
        }
    }
    programs
}
