//! # Void Lit
//!
//! Lighting code composer for Void Engine's lit materials:
//! - Per-light evaluation and shadow blocks for up to eight light slots
//! - Shadow coordinate resolution and sampler dispatch per light type
//! - Canonical permutation keys for variant caching
//! - GLSL and WGSL output from one dialect-neutral IR
//! - Frame coalescing and parallel pre-warming of variants
//!
//! ## Architecture
//!
//! ```text
//! LightDescriptor[] + LitOptions
//!        │
//!        ├──► PermutationKey ──────────────────────────────┐
//!        │                                                 ▼
//!        └──► expand (per slot) ──► LightBlock ──► assemble ──► ComposedShader ──► ShaderVariantCache
//!                  │                                  │
//!                  ▼                                  ▼
//!          shadow::{coord, dispatch, cascade}   BlockValidator
//! ```
//!
//! The composer emits text only; compiling and binding belong to the
//! [`ShaderVariantCache`] implementation.

pub mod assemble;
pub mod batch;
pub mod cache;
pub mod coalesce;
pub mod emit;
pub mod expand;
pub mod ir;
pub mod key;
pub mod light;
pub mod shadow;
pub mod validator;
pub mod variants;

pub use assemble::ComposedShader;
pub use batch::{BatchComposer, ComposeRequest};
pub use cache::{ShaderVariantCache, VariantRegistry, VariantState};
pub use coalesce::{FrameCoalescer, FrameOutcome, LightSetChange};
pub use emit::ShaderDialect;
pub use expand::LightBlock;
pub use key::{PermutationKey, MAX_LIGHTS};
pub use light::{
    CookieChannels, CookieSettings, FalloffMode, FresnelModel, LightDescriptor, LightShape,
    LightType, LitFlags, LitOptions, ShadowAlgorithm, ShadowSettings,
};
pub use shadow::MAX_CASCADES;
pub use validator::{BlockValidator, ValidationError, ValidationResult};
pub use variants::{LightVariantBuilder, ShaderDefine};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Composer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Output dialect for [`LightComposer::compose`]
    pub dialect: ShaderDialect,
    /// Light slots accepted per permutation, at most [`MAX_LIGHTS`]
    pub max_lights: usize,
    /// Keep descriptive comments in generated code
    pub comments: bool,
    /// Worker threads for batch composition
    pub workers: usize,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            dialect: ShaderDialect::Glsl,
            max_lights: MAX_LIGHTS,
            comments: true,
            workers: 4,
        }
    }
}

impl ComposerConfig {
    /// Clamp values to supported ranges
    pub fn validate(&mut self) {
        self.max_lights = self.max_lights.min(MAX_LIGHTS);
        self.workers = self.workers.clamp(1, 64);
    }

    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, ComposeError> {
        let mut config: Self =
            serde_json::from_str(json).map_err(|e| ComposeError::Config(e.to_string()))?;
        config.validate();
        Ok(config)
    }
}

/// Errors from light composition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    #[error("Invalid light combination in slot {slot}: {combination}")]
    InvalidCombination { slot: usize, combination: String },

    #[error("Light block {slot} failed self-check: {detail}")]
    InternalConsistency { slot: usize, detail: String },

    #[error("Too many lights: {count} (limit {limit})")]
    TooManyLights { limit: usize, count: usize },

    #[error("Invalid material options: {0}")]
    InvalidOptions(String),

    #[error("Batch request {request} produced no result")]
    MissingResult { request: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// The light composer
///
/// Stateless apart from its configuration; every call is a pure function of
/// its inputs and may run on any thread.
#[derive(Debug, Clone)]
pub struct LightComposer {
    config: ComposerConfig,
}

impl LightComposer {
    /// Create a composer, clamping the configuration
    pub fn new(mut config: ComposerConfig) -> Self {
        config.validate();
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Validate the inputs and compute their key without composing
    pub fn permutation_key(
        &self,
        lights: &[LightDescriptor],
        options: &LitOptions,
    ) -> Result<PermutationKey, ComposeError> {
        self.key_for(lights, options, self.config.dialect)
    }

    fn key_for(
        &self,
        lights: &[LightDescriptor],
        options: &LitOptions,
        dialect: ShaderDialect,
    ) -> Result<PermutationKey, ComposeError> {
        let key = PermutationKey::build(lights, options, dialect, self.config.max_lights)?;
        Ok(if self.config.comments {
            key
        } else {
            key.without_comments()
        })
    }

    /// Compose in the configured dialect
    pub fn compose(
        &self,
        lights: &[LightDescriptor],
        options: &LitOptions,
    ) -> Result<ComposedShader, ComposeError> {
        self.compose_for(lights, options, self.config.dialect)
    }

    /// Compose in an explicit dialect
    pub fn compose_for(
        &self,
        lights: &[LightDescriptor],
        options: &LitOptions,
        dialect: ShaderDialect,
    ) -> Result<ComposedShader, ComposeError> {
        let options = options.resolved_for(lights);
        let key = self.key_for(lights, &options, dialect).map_err(|e| {
            log::warn!("Rejected light set: {}", e);
            e
        })?;

        // Slots keep their index when the clustered loop takes over others
        let blocks = lights
            .iter()
            .enumerate()
            .filter_map(|(slot, light)| options.effective_light(light).map(|light| (slot, light)))
            .map(|(slot, light)| expand::expand_light(slot, &light, &options))
            .collect::<Result<Vec<_>, _>>()?;

        let shader = assemble::assemble(&blocks, &options, dialect, key, self.config.comments)?;
        log::debug!(
            "Composed {} light(s) as {} -> {:016x} ({} bytes)",
            shader.light_count,
            dialect,
            shader.key.digest(),
            shader.source.len()
        );
        Ok(shader)
    }

    /// Compose and submit unless the cache already has the variant
    pub fn compose_cached(
        &self,
        lights: &[LightDescriptor],
        options: &LitOptions,
        cache: &dyn ShaderVariantCache,
    ) -> Result<PermutationKey, ComposeError> {
        let key = self.permutation_key(lights, options)?;
        if !cache.contains(&key) {
            let shader = self.compose(lights, options)?;
            cache.submit(shader);
        }
        Ok(key)
    }
}

impl Default for LightComposer {
    fn default() -> Self {
        Self::new(ComposerConfig::default())
    }
}
