//! Named shader programs and materials.
//!
//! The importer fills the library; the engine looks up the utility programs it
//! needs for its internal passes by the names in [`programs`].

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::api::{Allocate, Device};
use crate::errors::{Result, SquareError};
use crate::resources::material::{Material, SharedMaterial};
use crate::resources::shader::ShaderProgram;

/// Names of the programs used by engine-internal passes.
pub mod programs {
    pub const SHADOW_MAPPING: &str = "Util.ShadowMapping";
    pub const SKYBOX: &str = "Util.Skybox";
    pub const GIZMO: &str = "Util.Gizmo";
    pub const HIGHPASS_FILTER: &str = "Util.HighpassFilter";
    pub const VERTICAL_BLUR: &str = "Util.VerticalBlur";
    pub const HORIZONTAL_BLUR: &str = "Util.HorizontalBlur";
    pub const BLIT: &str = "PP.Blit";
    pub const TONEMAPPING: &str = "PP.Tonemapping";
    pub const IBL_DIFFUSE: &str = "Util.IBLDiffuse";
    pub const IBL_SPECULAR: &str = "Util.IBLSpecular";
    pub const INTEGRATED_BRDF: &str = "Util.IntegratedBRDF";
    pub const PROJECT_EQR_TO_CUBE: &str = "Util.ProjectEqr2Cube";
}

#[derive(Debug, Default)]
pub struct MaterialLibrary {
    programs: FxHashMap<String, Arc<ShaderProgram>>,
    materials: FxHashMap<String, SharedMaterial>,
}

impl MaterialLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a program under its own name, replacing any earlier one.
    pub fn add_program(&mut self, program: ShaderProgram) -> Arc<ShaderProgram> {
        let program = Arc::new(program);
        self.programs
            .insert(program.name().to_owned(), Arc::clone(&program));
        program
    }

    pub fn add_material(&mut self, material: Material) -> SharedMaterial {
        let name = material.name().to_owned();
        let shared = material.into_shared();
        self.materials.insert(name, Arc::clone(&shared));
        shared
    }

    #[must_use]
    pub fn program(&self, name: &str) -> Option<&Arc<ShaderProgram>> {
        self.programs.get(name)
    }

    #[must_use]
    pub fn material(&self, name: &str) -> Option<&SharedMaterial> {
        self.materials.get(name)
    }

    #[must_use]
    pub fn has_program(&self, name: &str) -> bool {
        self.programs.contains_key(name)
    }

    /// Fresh material on the named program. Not registered in the library.
    pub fn instantiate(&self, program: &str, material_name: &str) -> Result<SharedMaterial> {
        let program = self
            .programs
            .get(program)
            .ok_or_else(|| SquareError::MissingProgram(program.to_owned()))?;
        Ok(Material::new(material_name, Arc::clone(program)).into_shared())
    }

    /// Programs ordered by name.
    #[must_use]
    pub fn programs(&self) -> Vec<&Arc<ShaderProgram>> {
        let mut list: Vec<_> = self.programs.values().collect();
        list.sort_by(|a, b| a.name().cmp(b.name()));
        list
    }

    /// Compiles every program, logging failures. Returns the failure count.
    pub fn compile_all(&self, device: &mut dyn Device) -> usize {
        let mut failures = 0;
        for program in self.programs() {
            if let Err(err) = program.allocate(device) {
                log::error!("{err}");
                failures += 1;
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instantiate_requires_program() {
        let mut lib = MaterialLibrary::new();
        lib.add_program(ShaderProgram::new(programs::BLIT));
        assert!(lib.instantiate(programs::BLIT, "Blit").is_ok());
        assert!(matches!(
            lib.instantiate(programs::TONEMAPPING, "Tonemap"),
            Err(SquareError::MissingProgram(_))
        ));
    }
}
