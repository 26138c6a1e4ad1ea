//! Defines and light variant enumeration
//!
//! [`LightVariantBuilder`] walks the cartesian product of descriptor axes and
//! keeps only the combinations the composer accepts, one per fingerprint.
//! It is used to pre-warm caches and to sweep the composer in tests.

use std::collections::BTreeSet;

use crate::key::{fingerprint, validate_light};
use crate::light::{
    CookieChannels, CookieSettings, FalloffMode, LightDescriptor, LightShape, LightType,
    ShadowAlgorithm, ShadowSettings,
};
use crate::shadow::cascade::MAX_CASCADES;

/// Shader preprocessor define
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderDefine {
    /// Define name
    pub name: String,
    /// Optional value (None = just defined, Some = value)
    pub value: Option<String>,
}

impl ShaderDefine {
    /// Create a simple define (no value)
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Create a define with a value
    pub fn with_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// Convert to preprocessor directive
    pub fn to_directive(&self) -> String {
        if let Some(value) = &self.value {
            format!("#define {} {}", self.name, value)
        } else {
            format!("#define {}", self.name)
        }
    }
}

/// Every shadow configuration that changes generated code
pub fn shadow_axis() -> Vec<Option<ShadowSettings>> {
    let mut axis = vec![None];
    for algorithm in ShadowAlgorithm::ALL {
        for normal_offset in [false, true] {
            let single = ShadowSettings::new(algorithm).with_normal_offset(normal_offset);
            let cascaded = single.with_cascades(MAX_CASCADES);
            axis.push(Some(single));
            axis.push(Some(cascaded));
            axis.push(Some(cascaded.with_dithered_blend()));
        }
    }
    axis
}

/// Every cookie configuration that changes generated code
pub fn cookie_axis() -> Vec<Option<CookieSettings>> {
    let plain = CookieSettings::new(CookieChannels::RGB);
    vec![
        None,
        Some(plain),
        Some(plain.with_transform()),
        Some(plain.coupled()),
        Some(plain.coupled().with_transform()),
    ]
}

/// Light variant builder
pub struct LightVariantBuilder {
    types: Vec<LightType>,
    shapes: Vec<LightShape>,
    falloffs: Vec<FalloffMode>,
    shadows: Vec<Option<ShadowSettings>>,
    cookies: Vec<Option<CookieSettings>>,
    specular: Vec<bool>,
}

impl LightVariantBuilder {
    /// Punctual, unshadowed, cookie-less lights of every type
    pub fn new() -> Self {
        Self {
            types: LightType::ALL.to_vec(),
            shapes: vec![LightShape::Punctual],
            falloffs: vec![FalloffMode::Linear],
            shadows: vec![None],
            cookies: vec![None],
            specular: vec![true],
        }
    }

    /// Every axis fully populated
    pub fn exhaustive() -> Self {
        Self::new()
            .with_shapes(&LightShape::ALL)
            .with_falloffs(&[FalloffMode::Linear, FalloffMode::InverseSquared])
            .with_shadows(shadow_axis())
            .with_cookies(cookie_axis())
            .with_specular(&[true, false])
    }

    pub fn with_types(mut self, types: &[LightType]) -> Self {
        self.types = types.to_vec();
        self
    }

    pub fn with_shapes(mut self, shapes: &[LightShape]) -> Self {
        self.shapes = shapes.to_vec();
        self
    }

    pub fn with_falloffs(mut self, falloffs: &[FalloffMode]) -> Self {
        self.falloffs = falloffs.to_vec();
        self
    }

    pub fn with_shadows(mut self, shadows: Vec<Option<ShadowSettings>>) -> Self {
        self.shadows = shadows;
        self
    }

    pub fn with_cookies(mut self, cookies: Vec<Option<CookieSettings>>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn with_specular(mut self, specular: &[bool]) -> Self {
        self.specular = specular.to_vec();
        self
    }

    /// Build all accepted permutations, one per fingerprint, in axis order
    pub fn build(self) -> Vec<LightDescriptor> {
        let mut seen = BTreeSet::new();
        let mut variants = Vec::new();

        for &light_type in &self.types {
            for &shape in &self.shapes {
                for &falloff in &self.falloffs {
                    for &shadow in &self.shadows {
                        for &cookie in &self.cookies {
                            for &affects_specularity in &self.specular {
                                let light = LightDescriptor {
                                    light_type,
                                    shape,
                                    falloff,
                                    shadow,
                                    cookie,
                                    affects_specularity,
                                };
                                if validate_light(0, &light).is_err() {
                                    continue;
                                }
                                if seen.insert(fingerprint(&light)) {
                                    variants.push(light);
                                }
                            }
                        }
                    }
                }
            }
        }

        variants
    }
}

impl Default for LightVariantBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_define() {
        let define = ShaderDefine::new("AREA_LIGHTS");
        assert_eq!(define.to_directive(), "#define AREA_LIGHTS");

        let define = ShaderDefine::with_value("LIGHT_COUNT", "4");
        assert_eq!(define.to_directive(), "#define LIGHT_COUNT 4");
    }

    #[test]
    fn test_default_builder() {
        let variants = LightVariantBuilder::new().build();
        assert_eq!(variants.len(), 3);
    }

    #[test]
    fn test_builder_drops_invalid_combinations() {
        let variants = LightVariantBuilder::new()
            .with_types(&[LightType::Omni])
            .with_shadows(shadow_axis())
            .build();

        // no shadow, plus pcf1/pcf3/pcss32 each with and without normal offset
        assert_eq!(variants.len(), 7);
        assert!(variants.iter().all(|l| l.shadow.map_or(true, |s| !s.cascaded)));
    }

    #[test]
    fn test_builder_dedups_by_fingerprint() {
        // Area shapes ignore the falloff mode
        let variants = LightVariantBuilder::new()
            .with_types(&[LightType::Spot])
            .with_shapes(&[LightShape::Rect])
            .with_falloffs(&[FalloffMode::Linear, FalloffMode::InverseSquared])
            .build();
        assert_eq!(variants.len(), 1);
    }

    #[test]
    fn test_exhaustive_covers_every_type_and_shape() {
        let variants = LightVariantBuilder::exhaustive().build();
        for light_type in LightType::ALL {
            assert!(variants.iter().any(|l| l.light_type == light_type));
        }
        for shape in LightShape::ALL {
            assert!(variants.iter().any(|l| l.shape == shape));
            assert!(variants
                .iter()
                .any(|l| l.light_type == LightType::Directional && l.shape == shape));
        }
        assert!(variants.iter().all(|l| validate_light(0, l).is_ok()));
    }
}
