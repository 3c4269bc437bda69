use std::sync::Arc;

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::api::Device;
use crate::resources::shader::ShaderProgram;
use crate::resources::texture::Texture;

// ============================================================================
// Uniform Values
// ============================================================================

/// A single uniform value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    UInt(u32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
}

macro_rules! impl_uniform_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for UniformValue {
                #[inline]
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_uniform_from! {
    i32 => Int,
    u32 => UInt,
    f32 => Float,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    Mat3 => Mat3,
    Mat4 => Mat4,
}

// ============================================================================
// Material
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MaterialLayer {
    #[default]
    Opaque,
    Transparent,
}

/// Materials are shared between drawables and passes.
pub type SharedMaterial = Arc<RwLock<Material>>;

/// A program plus the uniform values and textures it is drawn with.
///
/// Uniforms set through [`set_uniform`](Self::set_uniform) are buffered and
/// reach the device when the material is bound; while bound, they are also
/// forwarded at once through [`set_uniform_now`](Self::set_uniform_now).
/// Because programs are shared,
/// every bind uploads the full buffered set after the program defaults, so a
/// material entry always overrides a program default of the same name.
#[derive(Debug)]
pub struct Material {
    name: String,
    program: Arc<ShaderProgram>,
    layer: MaterialLayer,
    uniforms: FxHashMap<String, UniformValue>,
    textures: FxHashMap<String, Arc<Texture>>,
    bound: bool,
}

impl Material {
    #[must_use]
    pub fn new(name: impl Into<String>, program: Arc<ShaderProgram>) -> Self {
        Self {
            name: name.into(),
            program,
            layer: MaterialLayer::Opaque,
            uniforms: FxHashMap::default(),
            textures: FxHashMap::default(),
            bound: false,
        }
    }

    /// Wraps the material for sharing.
    #[must_use]
    pub fn into_shared(self) -> SharedMaterial {
        Arc::new(RwLock::new(self))
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn program(&self) -> &Arc<ShaderProgram> {
        &self.program
    }

    #[inline]
    #[must_use]
    pub fn layer(&self) -> MaterialLayer {
        self.layer
    }

    pub fn set_layer(&mut self, layer: MaterialLayer) {
        self.layer = layer;
    }

    #[inline]
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    // ========================================================================
    // Uniforms
    // ========================================================================

    /// Buffers a uniform for the next bind. Use
    /// [`set_uniform_now`](Self::set_uniform_now) to also reach a bound program.
    pub fn set_uniform(&mut self, name: impl Into<String>, value: impl Into<UniformValue>) {
        self.uniforms.insert(name.into(), value.into());
    }

    /// Buffers a uniform and, if the material is bound, uploads it now.
    pub fn set_uniform_now(
        &mut self,
        device: &mut dyn Device,
        name: impl Into<String>,
        value: impl Into<UniformValue>,
    ) {
        let name = name.into();
        let value = value.into();
        if self.bound {
            self.program.set_uniform(device, &name, &value);
        }
        self.uniforms.insert(name, value);
    }

    /// Sets element `index` of a uniform array.
    pub fn set_uniform_at(&mut self, name: &str, index: usize, value: impl Into<UniformValue>) {
        self.set_uniform(format!("{name}[{index}]"), value);
    }

    #[must_use]
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.get(name).copied()
    }

    pub fn uniforms(&self) -> impl Iterator<Item = (&str, &UniformValue)> {
        self.uniforms.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn set_texture(&mut self, name: impl Into<String>, texture: Arc<Texture>) {
        self.textures.insert(name.into(), texture);
    }

    #[must_use]
    pub fn texture(&self, name: &str) -> Option<&Arc<Texture>> {
        self.textures.get(name)
    }

    /// Runs `f` over the textures to bind for a draw: program defaults
    /// overlaid by this material's own entries, ordered by sampler name.
    pub fn with_bound_textures<R>(&self, f: impl FnOnce(&[(&str, &Arc<Texture>)]) -> R) -> R {
        self.program.with_default_textures(|defaults| {
            let mut list: SmallVec<[(&str, &Arc<Texture>); 8]> = defaults
                .iter()
                .filter(|(name, _)| !self.textures.contains_key(name.as_str()))
                .chain(self.textures.iter())
                .map(|(name, texture)| (name.as_str(), texture))
                .collect();
            list.sort_unstable_by(|a, b| a.0.cmp(b.0));
            f(&list)
        })
    }

    // ========================================================================
    // Binding
    // ========================================================================

    /// Binds the program (re-applying its defaults) and flushes every
    /// buffered uniform. Returns `false` if the program is not linked.
    pub fn bind(&mut self, device: &mut dyn Device) -> bool {
        if self.bound {
            return true;
        }
        if !self.program.bind(device) {
            return false;
        }
        self.bound = true;
        for (name, value) in &self.uniforms {
            self.program.set_uniform(device, name, value);
        }
        true
    }

    pub fn unbind(&mut self, device: &mut dyn Device) {
        if self.bound {
            self.program.unbind(device);
            self.bound = false;
        }
    }
}
