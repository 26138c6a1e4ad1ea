//! Shadow sampling dispatch
//!
//! Maps (light type, shadow algorithm) to the helper that samples the map.
//! Pairs missing from the table are reported as invalid combinations
//! instead of silently producing no shadow.

use crate::ir::{Expr, SlotScope, TextureKind, Ty};
use crate::light::{LightShape, LightType, ShadowAlgorithm, ShadowSettings};
use crate::ComposeError;

/// Exponent of 16-bit exponential variance maps
pub const VSM16_EXPONENT: f32 = 5.54;

/// Exponent of 32-bit exponential variance maps
pub const VSM32_EXPONENT: f32 = 15.0;

/// Source of the blocker search area for soft shadows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchArea {
    /// Derived from the emitter's half extents (area lights)
    HalfExtents,
    /// Fixed per-light softness uniform (punctual lights)
    Softness,
}

/// Selected shadow sampling helper for one light
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowSampler {
    pub light_type: LightType,
    pub algorithm: ShadowAlgorithm,
    /// Helper function called with the resolved coordinate
    pub function: &'static str,
    /// Binding type of the shadow map
    pub texture: TextureKind,
    /// Chunk that defines `function`
    pub chunk: &'static str,
    /// Exponent passed to variance sampling
    pub vsm_exponent: Option<f32>,
    /// Blocker search area passed to soft shadow sampling
    pub search_area: Option<SearchArea>,
    /// Cube map helpers also take the light-to-surface vector
    pub takes_light_dir: bool,
}

fn function_name(light_type: LightType, algorithm: ShadowAlgorithm) -> Option<&'static str> {
    use LightType::*;
    use ShadowAlgorithm::*;

    let name = match (light_type, algorithm) {
        (Directional, Vsm16) => "getShadowVSM16",
        (Directional, Vsm32) => "getShadowVSM32",
        (Directional, Pcf1) => "getShadowPCF1x1",
        (Directional, Pcf3) => "getShadowPCF3x3",
        (Directional, Pcf5) => "getShadowPCF5x5",
        (Directional, Pcss32) => "getShadowPCSS",

        (Spot, Vsm16) => "getShadowSpotVSM16",
        (Spot, Vsm32) => "getShadowSpotVSM32",
        (Spot, Pcf1) => "getShadowSpotPCF1x1",
        (Spot, Pcf3) => "getShadowSpotPCF3x3",
        (Spot, Pcf5) => "getShadowSpotPCF5x5",
        (Spot, Pcss32) => "getShadowSpotPCSS",

        (Omni, Pcf1) => "getShadowOmniPCF1x1",
        (Omni, Pcf3) => "getShadowOmniPCF3x3",
        (Omni, Pcss32) => "getShadowOmniPCSS",
        (Omni, Vsm16 | Vsm32 | Pcf5) => return None,
    };
    Some(name)
}

/// Whether the light type has a sampler for the algorithm
pub fn is_supported(light_type: LightType, algorithm: ShadowAlgorithm) -> bool {
    function_name(light_type, algorithm).is_some()
}

/// Select the sampling helper for a shadow-casting light
pub fn select_sampler(
    slot: usize,
    light_type: LightType,
    shape: LightShape,
    settings: &ShadowSettings,
) -> Result<ShadowSampler, ComposeError> {
    let algorithm = settings.algorithm;
    let function =
        function_name(light_type, algorithm).ok_or_else(|| ComposeError::InvalidCombination {
            slot,
            combination: format!(
                "{} shadows on {} light",
                algorithm.name(),
                light_type.name()
            ),
        })?;

    let cube = light_type == LightType::Omni;
    let texture = match algorithm {
        ShadowAlgorithm::Vsm16 | ShadowAlgorithm::Vsm32 => TextureKind::Color2D,
        ShadowAlgorithm::Pcss32 if cube => TextureKind::DepthCube,
        ShadowAlgorithm::Pcss32 => TextureKind::Depth2D,
        _ if cube => TextureKind::ShadowCube,
        _ => TextureKind::Shadow2D,
    };

    let chunk = match algorithm {
        ShadowAlgorithm::Vsm16 | ShadowAlgorithm::Vsm32 => "shadowEVSMPS",
        ShadowAlgorithm::Pcf1 => "shadowPCF1PS",
        ShadowAlgorithm::Pcf3 => "shadowPCF3PS",
        ShadowAlgorithm::Pcf5 => "shadowPCF5PS",
        ShadowAlgorithm::Pcss32 => "shadowPCSSPS",
    };

    let vsm_exponent = match algorithm {
        ShadowAlgorithm::Vsm16 => Some(VSM16_EXPONENT),
        ShadowAlgorithm::Vsm32 => Some(VSM32_EXPONENT),
        _ => None,
    };

    let search_area = algorithm.is_pcss().then(|| {
        if shape.is_area() {
            SearchArea::HalfExtents
        } else {
            SearchArea::Softness
        }
    });

    Ok(ShadowSampler {
        light_type,
        algorithm,
        function,
        texture,
        chunk,
        vsm_exponent,
        search_area,
        takes_light_dir: cube,
    })
}

impl ShadowSampler {
    /// Build the sampling call for a resolved coordinate
    pub fn call(&self, scope: &mut SlotScope, coord: Expr, light_dir: Expr) -> Expr {
        scope.require(self.chunk);

        let mut args = vec![
            scope.texture("shadowMap", self.texture),
            coord,
            scope.uniform("shadowParams", Ty::Vec4),
        ];
        if let Some(exponent) = self.vsm_exponent {
            args.push(Expr::float(exponent));
        }
        match self.search_area {
            Some(SearchArea::HalfExtents) => {
                let width = scope.uniform("halfWidth", Ty::Vec3);
                let height = scope.uniform("halfHeight", Ty::Vec3);
                args.push(Expr::Construct(
                    Ty::Vec2,
                    vec![
                        Expr::call("length", vec![width]),
                        Expr::call("length", vec![height]),
                    ],
                ));
            }
            Some(SearchArea::Softness) => {
                let softness = scope.uniform("shadowSearchArea", Ty::Float);
                args.push(Expr::Construct(Ty::Vec2, vec![softness]));
            }
            None => {}
        }
        if self.takes_light_dir {
            args.push(light_dir);
        }
        Expr::call(self.function, args)
    }
}
