//! Shadow-map render pass defines
//!
//! The pass that renders a shadow map must store what the sampling side
//! compares against: rasterizer depth, or linear distance to the light.

use crate::light::{LightType, ShadowAlgorithm};
use crate::shadow::dispatch::{VSM16_EXPONENT, VSM32_EXPONENT};
use crate::variants::ShaderDefine;

/// Whether the pass keeps rasterizer depth
///
/// Directional maps always do. Spot maps do unless they are variance maps,
/// which store linear distance. Omni cube maps always store linear distance.
pub fn uses_perspective_depth(light_type: LightType, algorithm: ShadowAlgorithm) -> bool {
    match light_type {
        LightType::Directional => true,
        LightType::Spot => !algorithm.is_vsm(),
        LightType::Omni => false,
    }
}

/// Defines for the shadow-map render pass of a light
pub fn shadow_pass_defines(light_type: LightType, algorithm: ShadowAlgorithm) -> Vec<ShaderDefine> {
    let mut defines = vec![
        ShaderDefine::new(format!("LIGHT_TYPE_{}", light_type.name().to_uppercase())),
        ShaderDefine::new(format!("SHADOW_KIND_{}", algorithm.kind())),
    ];
    if uses_perspective_depth(light_type, algorithm) {
        defines.push(ShaderDefine::new("PERSPECTIVE_DEPTH"));
    }
    match algorithm {
        ShadowAlgorithm::Vsm16 => defines.push(ShaderDefine::with_value(
            "VSM_EXPONENT",
            crate::emit::float_literal(VSM16_EXPONENT),
        )),
        ShadowAlgorithm::Vsm32 => defines.push(ShaderDefine::with_value(
            "VSM_EXPONENT",
            crate::emit::float_literal(VSM32_EXPONENT),
        )),
        _ => {}
    }
    defines
}
