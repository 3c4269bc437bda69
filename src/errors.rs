//! Error Types
//!
//! This module defines the error types used throughout the engine.
//!
//! # Overview
//!
//! The main error type [`SquareError`] covers every recoverable failure mode:
//! - Resource allocation failures reported by the device
//! - Shader stage validation, compilation and linking errors
//! - Missing programs or invalid arguments during pass setup
//! - Settings parsing errors
//!
//! Nothing in the core is fatal. Callers receive a [`Result`], log it and
//! decide whether the dependent pass is dropped from the frame.
//!
//! ```rust,ignore
//! use square::errors::Result;
//!
//! fn setup(device: &mut dyn Device, target: &RenderTarget) -> Result<()> {
//!     target.allocate(device)?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::api::ResourceKind;
use crate::resources::shader::ShaderStages;
use crate::resources::texture::TextureFormat;

/// The main error type for the Square engine.
#[derive(Error, Debug)]
pub enum SquareError {
    // ========================================================================
    // Allocation Errors
    // ========================================================================
    /// The device refused to create a resource.
    #[error("Failed to allocate {kind:?}: {reason}")]
    AllocationFailed {
        /// Kind of device object that was requested
        kind: ResourceKind,
        /// Device supplied reason
        reason: String,
    },

    /// The render target attachment set is not usable.
    #[error("Invalid render target: {0}")]
    InvalidRenderTarget(String),

    /// The device does not support the requested texture format.
    #[error("Unsupported texture format: {0:?}")]
    UnsupportedFormat(TextureFormat),

    /// A description was used before it was linked to a device resource.
    #[error("'{0}' is not linked to a device resource")]
    NotLinked(String),

    // ========================================================================
    // Shader Errors
    // ========================================================================
    /// The attached stages do not form a valid pipeline.
    #[error("Invalid shader combination.")]
    InvalidShaderCombination {
        /// Program that failed validation
        program: String,
        /// Stages that were attached
        stages: ShaderStages,
    },

    /// A single shader stage failed to compile.
    #[error("Failed to compile {stage:?} shader of '{program}': {log}")]
    ShaderCompile {
        /// Program that owns the stage
        program: String,
        /// Failing stage
        stage: ShaderStages,
        /// Compiler output
        log: String,
    },

    /// Linking the compiled stages failed.
    #[error("Failed to link program '{program}': {log}")]
    ProgramLink {
        /// Program that failed to link
        program: String,
        /// Linker output
        log: String,
    },

    // ========================================================================
    // Engine Errors
    // ========================================================================
    /// A pass requires a program that is not registered in the library.
    #[error("Shader program '{0}' is not registered")]
    MissingProgram(String),

    /// An argument violated a precondition.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ========================================================================
    // Device & Configuration Errors
    // ========================================================================
    /// An error reported through the device error queue.
    #[error("Device error: {0}")]
    Device(String),

    /// Engine settings could not be parsed.
    #[error("Settings error: {0}")]
    Config(#[from] serde_json::Error),
}

impl SquareError {
    pub(crate) fn allocation(kind: ResourceKind, reason: impl Into<String>) -> Self {
        Self::AllocationFailed {
            kind,
            reason: reason.into(),
        }
    }
}

/// Alias for `Result<T, SquareError>`.
pub type Result<T> = std::result::Result<T, SquareError>;
