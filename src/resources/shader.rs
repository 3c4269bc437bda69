//! Shader sources and programs.
//!
//! A [`ShaderProgram`] collects one [`ShaderSource`] per stage. Compiling
//! validates the stage set against [`VALID_STAGE_COMBINATIONS`] before any
//! device call, compiles every stage, links, and keeps only the program.
//!
//! Programs are shared (`Arc`) between materials, so per-program state that
//! changes after linking (default uniforms, cached locations) sits behind
//! `parking_lot` locks.

use std::sync::{Arc, OnceLock};

use bitflags::bitflags;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::api::{Allocate, Device, Handle, SharedResource, UniformLocation};
use crate::errors::{Result, SquareError};
use crate::resources::material::UniformValue;
use crate::resources::texture::Texture;

bitflags! {
    /// Pipeline stages attached to a program.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStages: u8 {
        const VERTEX          = 1 << 0;
        const TESS_CONTROL    = 1 << 1;
        const TESS_EVALUATION = 1 << 2;
        const GEOMETRY        = 1 << 3;
        const FRAGMENT        = 1 << 4;
        const COMPUTE         = 1 << 5;
    }
}

/// Stage sets a program may be linked from.
pub const VALID_STAGE_COMBINATIONS: [ShaderStages; 4] = [
    ShaderStages::VERTEX.union(ShaderStages::FRAGMENT),
    ShaderStages::VERTEX
        .union(ShaderStages::GEOMETRY)
        .union(ShaderStages::FRAGMENT),
    ShaderStages::VERTEX
        .union(ShaderStages::TESS_CONTROL)
        .union(ShaderStages::TESS_EVALUATION)
        .union(ShaderStages::FRAGMENT),
    ShaderStages::COMPUTE,
];

/// Whether `stages` is one of [`VALID_STAGE_COMBINATIONS`].
#[must_use]
pub fn is_valid_combination(stages: ShaderStages) -> bool {
    VALID_STAGE_COMBINATIONS.contains(&stages)
}

/// Preprocessed source text of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub stage: ShaderStages,
    pub source: String,
}

impl ShaderSource {
    #[must_use]
    pub fn new(stage: ShaderStages, source: impl Into<String>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}

/// Linked GPU program plus its default bindings.
#[derive(Debug)]
pub struct ShaderProgram {
    name: String,
    sources: SmallVec<[ShaderSource; 3]>,
    link: OnceLock<SharedResource>,
    locations: RwLock<FxHashMap<String, Option<UniformLocation>>>,
    default_uniforms: RwLock<FxHashMap<String, UniformValue>>,
    default_textures: RwLock<FxHashMap<String, Arc<Texture>>>,
}

impl ShaderProgram {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: SmallVec::new(),
            link: OnceLock::new(),
            locations: RwLock::new(FxHashMap::default()),
            default_uniforms: RwLock::new(FxHashMap::default()),
            default_textures: RwLock::new(FxHashMap::default()),
        }
    }

    /// Builder form of [`add_source`](Self::add_source).
    #[must_use]
    pub fn with_source(mut self, stage: ShaderStages, source: impl Into<String>) -> Self {
        self.add_source(ShaderSource::new(stage, source));
        self
    }

    /// Adds a stage, replacing an earlier source of the same stage.
    pub fn add_source(&mut self, source: ShaderSource) {
        if let Some(existing) = self.sources.iter_mut().find(|s| s.stage == source.stage) {
            *existing = source;
        } else {
            self.sources.push(source);
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn sources(&self) -> &[ShaderSource] {
        &self.sources
    }

    #[must_use]
    pub fn stages(&self) -> ShaderStages {
        self.sources
            .iter()
            .fold(ShaderStages::empty(), |acc, s| acc | s.stage)
    }

    /// Draws through this program must be submitted as patches.
    #[must_use]
    pub fn has_tessellation(&self) -> bool {
        self.stages().contains(ShaderStages::TESS_EVALUATION)
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> Option<Handle> {
        self.link.get().map(SharedResource::handle)
    }

    // ========================================================================
    // Compilation
    // ========================================================================

    /// Validates, compiles and links the program. Idempotent.
    pub fn compile(&self, device: &mut dyn Device) -> Result<()> {
        if self.link.get().is_some() {
            return Ok(());
        }

        let stages = self.stages();
        if !is_valid_combination(stages) {
            return Err(SquareError::InvalidShaderCombination {
                program: self.name.clone(),
                stages,
            });
        }

        // Stage objects are dropped (and released) once the program is linked.
        let mut shaders: SmallVec<[SharedResource; 5]> = SmallVec::new();
        for source in &self.sources {
            let shader = device
                .compile_shader(source.stage, &source.source)
                .map_err(|err| SquareError::ShaderCompile {
                    program: self.name.clone(),
                    stage: source.stage,
                    log: err.to_string(),
                })?;
            shaders.push(shader);
        }

        let handles: SmallVec<[Handle; 5]> = shaders.iter().map(SharedResource::handle).collect();
        let program = device
            .link_program(&handles)
            .map_err(|err| SquareError::ProgramLink {
                program: self.name.clone(),
                log: err.to_string(),
            })?;

        log::debug!("Linked shader program '{}' ({:?})", self.name, stages);
        let _ = self.link.set(program);
        Ok(())
    }

    /// Connects a named uniform block to a binding point.
    pub fn bind_uniform_block(&self, device: &mut dyn Device, name: &str, binding: u32) -> bool {
        match self.handle() {
            Some(program) => device.bind_uniform_block(program, name, binding),
            None => false,
        }
    }

    // ========================================================================
    // Binding & Uniforms
    // ========================================================================

    /// Makes the program current and re-applies every default uniform.
    /// Returns `false` when the program is not linked.
    pub fn bind(&self, device: &mut dyn Device) -> bool {
        let Some(program) = self.handle() else {
            return false;
        };
        device.use_program(Some(program));

        let defaults = self.default_uniforms.read();
        for (name, value) in defaults.iter() {
            self.set_uniform(device, name, value);
        }
        true
    }

    pub fn unbind(&self, device: &mut dyn Device) {
        device.use_program(None);
    }

    /// Uploads a uniform to the bound program. Unknown names are ignored.
    pub fn set_uniform(&self, device: &mut dyn Device, name: &str, value: &UniformValue) -> bool {
        match self.uniform_location(device, name) {
            Some(location) => {
                device.set_uniform(location, value);
                true
            }
            None => false,
        }
    }

    /// Cached lookup of a uniform location.
    pub fn uniform_location(&self, device: &mut dyn Device, name: &str) -> Option<UniformLocation> {
        if let Some(cached) = self.locations.read().get(name) {
            return *cached;
        }
        let program = self.handle()?;
        let location = device.uniform_location(program, name);
        self.locations.write().insert(name.to_owned(), location);
        location
    }

    /// Value re-applied on every bind unless a material overrides it.
    pub fn set_uniform_default(&self, name: impl Into<String>, value: impl Into<UniformValue>) {
        self.default_uniforms.write().insert(name.into(), value.into());
    }

    /// Array element form of [`set_uniform_default`](Self::set_uniform_default).
    pub fn set_uniform_default_at(&self, name: &str, index: usize, value: impl Into<UniformValue>) {
        self.set_uniform_default(format!("{name}[{index}]"), value);
    }

    /// Texture bound on every draw unless a material overrides the name.
    pub fn set_texture_default(&self, name: impl Into<String>, texture: Arc<Texture>) {
        self.default_textures.write().insert(name.into(), texture);
    }

    pub fn set_texture_default_at(&self, name: &str, index: usize, texture: Arc<Texture>) {
        self.set_texture_default(format!("{name}[{index}]"), texture);
    }

    #[must_use]
    pub fn default_uniform(&self, name: &str) -> Option<UniformValue> {
        self.default_uniforms.read().get(name).copied()
    }

    #[must_use]
    pub fn default_texture(&self, name: &str) -> Option<Arc<Texture>> {
        self.default_textures.read().get(name).cloned()
    }

    /// Runs `f` over the default textures under the read lock.
    pub fn with_default_textures<R>(
        &self,
        f: impl FnOnce(&FxHashMap<String, Arc<Texture>>) -> R,
    ) -> R {
        f(&self.default_textures.read())
    }

    /// Drops defaults whose name starts with `prefix` (e.g. stale shadow maps).
    pub fn clear_defaults_with_prefix(&self, prefix: &str) {
        self.default_uniforms.write().retain(|name, _| !name.starts_with(prefix));
        self.default_textures.write().retain(|name, _| !name.starts_with(prefix));
    }
}

impl Allocate for ShaderProgram {
    fn allocate(&self, device: &mut dyn Device) -> Result<()> {
        self.compile(device)
    }

    fn is_linked(&self) -> bool {
        self.link.get().is_some()
    }
}
