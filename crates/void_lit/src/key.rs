//! Permutation keys
//!
//! A key is the canonical text of everything that changes generated code:
//! the dialect, the global capability flags and one fingerprint per slot in
//! slot order. Keys of programs printed without comments carry a
//! `/nocomments` suffix. Values bound at runtime as uniforms (cascade count, cookie
//! channel mask, colors, ranges) never appear in a key.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::emit::ShaderDialect;
use crate::light::{LightDescriptor, LightType, LitFlags, LitOptions};
use crate::shadow::cascade::MAX_CASCADES;
use crate::shadow::dispatch::select_sampler;
use crate::ComposeError;

/// Maximum number of light slots in one permutation
pub const MAX_LIGHTS: usize = 8;

/// Reject descriptor combinations no code path exists for
pub fn validate_light(slot: usize, light: &LightDescriptor) -> Result<(), ComposeError> {
    let invalid = |combination: String| ComposeError::InvalidCombination { slot, combination };
    let kind = light.light_type.name();

    if let Some(cookie) = &light.cookie {
        match light.light_type {
            LightType::Directional => return Err(invalid("cookie on directional light".into())),
            LightType::Omni if cookie.has_transform => {
                return Err(invalid("cookie transform on omni light".into()))
            }
            LightType::Omni if cookie.coupled_to_falloff => {
                return Err(invalid("cookie coupled to falloff on omni light".into()))
            }
            _ => {}
        }
    }

    if let Some(shadow) = &light.shadow {
        if !(1..=MAX_CASCADES).contains(&shadow.cascade_count) {
            return Err(invalid(format!(
                "{} cascades (supported: 1..={})",
                shadow.cascade_count, MAX_CASCADES
            )));
        }
        if shadow.cascaded != (shadow.cascade_count > 1) {
            return Err(invalid(format!(
                "cascaded flag {} with {} cascade(s)",
                shadow.cascaded, shadow.cascade_count
            )));
        }
        if shadow.cascaded && light.light_type != LightType::Directional {
            return Err(invalid(format!("cascades on {} light", kind)));
        }
        select_sampler(slot, light.light_type, light.shape, shadow)?;
    }

    Ok(())
}

/// Canonical text of one slot's compile-time configuration
///
/// Fields that cannot reach the generated code are normalized so equivalent
/// descriptors share a fingerprint.
pub fn fingerprint(light: &LightDescriptor) -> String {
    let mut parts: Vec<&str> = vec![light.light_type.name(), light.shape.name()];

    match &light.shadow {
        Some(shadow) => {
            parts.push(shadow.algorithm.name());
            parts.push(if shadow.cascaded { "csm" } else { "single" });
            parts.push(if shadow.dithers_cascades() { "dither" } else { "nodither" });
            parts.push(if shadow.uses_normal_offset() { "offset" } else { "nooffset" });
        }
        None => parts.extend(["noshadow", "single", "nodither", "nooffset"]),
    }

    match &light.cookie {
        Some(cookie) => {
            parts.push("cookie");
            parts.push(if cookie.coupled_to_falloff { "coupled" } else { "free" });
            parts.push(if cookie.has_transform { "xform" } else { "noxform" });
        }
        None => parts.extend(["nocookie", "free", "noxform"]),
    }

    parts.push(if light.affects_specularity { "spec" } else { "diffuse" });
    parts.push(match (light.light_type, light.effective_falloff()) {
        (LightType::Directional, _) => "nofalloff",
        (_, Some(falloff)) => falloff.name(),
        (_, None) => "window",
    });

    parts.join("|")
}

/// Canonical identity of a composed shader
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermutationKey(String);

impl PermutationKey {
    /// Validate the inputs and build their key
    ///
    /// Flags are resolved first, so `AREA_LIGHTS` is derived from the light
    /// list whatever the caller set. Slots left to the clustered loop and
    /// shadows dropped by `NO_SHADOW` do not split keys.
    pub fn build(
        lights: &[LightDescriptor],
        options: &LitOptions,
        dialect: ShaderDialect,
        limit: usize,
    ) -> Result<Self, ComposeError> {
        let limit = limit.min(MAX_LIGHTS);
        if lights.len() > limit {
            return Err(ComposeError::TooManyLights {
                limit,
                count: lights.len(),
            });
        }
        for (slot, light) in lights.iter().enumerate() {
            validate_light(slot, light)?;
        }

        let options = options.resolved_for(lights);
        if options.has(LitFlags::CLUSTER_SHADOWS) && options.cluster_shadow.is_vsm() {
            return Err(ComposeError::InvalidOptions(format!(
                "clustered shadows do not support {}",
                options.cluster_shadow.name()
            )));
        }

        let mut text = format!(
            "{}/{:010b}/{}",
            dialect.name(),
            options.flags,
            options.fresnel.name()
        );
        if options.has(LitFlags::CLUSTER_SHADOWS) {
            text.push_str(&format!("/cluster-{}", options.cluster_shadow.name()));
        }
        for (slot, light) in lights.iter().enumerate() {
            match options.effective_light(light) {
                Some(light) => text.push_str(&format!("/{}:{}", slot, fingerprint(&light))),
                None => text.push_str(&format!("/{}:clustered", slot)),
            }
        }
        Ok(Self(text))
    }

    /// Key of the same program printed without comments
    pub fn without_comments(self) -> Self {
        Self(format!("{}/nocomments", self.0))
    }

    /// Key text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 64-bit digest of the key text, for logs and compact tables
    pub fn digest(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.0.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Display for PermutationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::{
        CookieChannels, CookieSettings, FalloffMode, FresnelModel, LightShape, ShadowAlgorithm,
        ShadowSettings,
    };

    fn key(lights: &[LightDescriptor]) -> PermutationKey {
        PermutationKey::build(lights, &LitOptions::default(), ShaderDialect::Glsl, MAX_LIGHTS).unwrap()
    }

    #[test]
    fn test_key_is_deterministic() {
        let lights = [
            LightDescriptor::directional().with_shadow(ShadowSettings::new(ShadowAlgorithm::Pcf3)),
            LightDescriptor::spot(),
        ];
        assert_eq!(key(&lights), key(&lights));
        assert_eq!(key(&lights).digest(), key(&lights).digest());
    }

    #[test]
    fn test_key_depends_on_slot_order() {
        let a = LightDescriptor::directional();
        let b = LightDescriptor::omni();
        assert_ne!(key(&[a, b]), key(&[b, a]));
    }

    #[test]
    fn test_runtime_values_not_keyed() {
        let r = LightDescriptor::spot().with_cookie(CookieSettings::new(CookieChannels::R));
        let a = LightDescriptor::spot().with_cookie(CookieSettings::new(CookieChannels::A));
        assert_eq!(key(&[r]), key(&[a]));

        let two = LightDescriptor::directional()
            .with_shadow(ShadowSettings::new(ShadowAlgorithm::Pcf3).with_cascades(2));
        let four = LightDescriptor::directional()
            .with_shadow(ShadowSettings::new(ShadowAlgorithm::Pcf3).with_cascades(4));
        assert_eq!(key(&[two]), key(&[four]));
    }

    #[test]
    fn test_code_affecting_fields_keyed() {
        let base = LightDescriptor::spot();
        let variants = [
            base.with_falloff(FalloffMode::InverseSquared),
            base.with_cookie(CookieSettings::default().with_transform()),
            base.with_cookie(CookieSettings::default().coupled()),
            base.with_shadow(ShadowSettings::new(ShadowAlgorithm::Pcf1).with_normal_offset(true)),
            base.with_shape(LightShape::Sphere),
            base.diffuse_only(),
        ];
        for variant in variants {
            assert_ne!(key(&[base]), key(&[variant]), "{:?}", variant);
        }
    }

    #[test]
    fn test_normalized_fields_share_key() {
        let rect = LightDescriptor::spot().with_shape(LightShape::Rect);
        assert_eq!(key(&[rect]), key(&[rect.with_falloff(FalloffMode::InverseSquared)]));

        let vsm = ShadowSettings::new(ShadowAlgorithm::Vsm16);
        let spot = LightDescriptor::spot();
        assert_eq!(
            key(&[spot.with_shadow(vsm)]),
            key(&[spot.with_shadow(vsm.with_normal_offset(true))])
        );
    }

    #[test]
    fn test_flags_and_dialect_keyed() {
        let lights = [LightDescriptor::omni()];
        let glsl = key(&lights);
        let wgsl =
            PermutationKey::build(&lights, &LitOptions::default(), ShaderDialect::Wgsl, MAX_LIGHTS).unwrap();
        let clearcoat = PermutationKey::build(
            &lights,
            &LitOptions::new(LitFlags::SPECULAR | LitFlags::CLEARCOAT, FresnelModel::Schlick),
            ShaderDialect::Glsl,
            MAX_LIGHTS,
        )
        .unwrap();
        assert_ne!(glsl, wgsl);
        assert_ne!(glsl, clearcoat);
        assert!(glsl.as_str().starts_with("glsl/0000000001/schlick/0:omni|punctual|"));
    }

    #[test]
    fn test_directional_area_shapes_accepted() {
        for shape in [LightShape::Rect, LightShape::Disk, LightShape::Sphere] {
            let light = LightDescriptor::directional().with_shape(shape);
            assert!(validate_light(0, &light).is_ok(), "{:?}", shape);
            assert!(validate_light(0, &light.with_shadow(ShadowSettings::new(ShadowAlgorithm::Pcss32))).is_ok());
            assert_ne!(key(&[light]), key(&[LightDescriptor::directional()]));
        }
    }

    #[test]
    fn test_clustered_slots_share_key() {
        let options = LitOptions::new(LitFlags::SPECULAR | LitFlags::CLUSTERED_LIGHTS, FresnelModel::Schlick);
        let build = |lights: &[LightDescriptor]| {
            PermutationKey::build(lights, &options, ShaderDialect::Glsl, MAX_LIGHTS).unwrap()
        };
        let sun = LightDescriptor::directional();
        let spot = LightDescriptor::spot().with_shadow(ShadowSettings::new(ShadowAlgorithm::Pcf3));

        assert_eq!(build(&[sun, spot]), build(&[sun, LightDescriptor::omni()]));
        assert_ne!(build(&[sun, spot]), build(&[spot, sun]));
        assert!(build(&[sun, spot]).as_str().ends_with("/1:clustered"));
        assert_ne!(build(&[sun]), key(&[sun]));
    }

    #[test]
    fn test_no_shadow_normalizes_shadows() {
        let options = LitOptions::new(LitFlags::SPECULAR | LitFlags::NO_SHADOW, FresnelModel::Schlick);
        let build = |light: LightDescriptor| {
            PermutationKey::build(&[light], &options, ShaderDialect::Glsl, MAX_LIGHTS).unwrap()
        };
        let spot = LightDescriptor::spot();
        assert_eq!(
            build(spot),
            build(spot.with_shadow(ShadowSettings::new(ShadowAlgorithm::Pcss32)))
        );
        assert_ne!(build(spot), key(&[spot]));
    }

    #[test]
    fn test_cluster_shadow_keyed() {
        let flags = LitFlags::CLUSTERED_LIGHTS | LitFlags::CLUSTER_SHADOWS;
        let build = |algorithm| {
            let options = LitOptions::new(flags, FresnelModel::Schlick).with_cluster_shadow(algorithm);
            PermutationKey::build(&[], &options, ShaderDialect::Glsl, MAX_LIGHTS)
        };
        let pcf1 = build(ShadowAlgorithm::Pcf1).unwrap();
        let pcss = build(ShadowAlgorithm::Pcss32).unwrap();
        assert_ne!(pcf1, pcss);
        assert!(pcf1.as_str().ends_with("/cluster-pcf1"));

        let err = build(ShadowAlgorithm::Vsm16).unwrap_err();
        assert!(matches!(err, ComposeError::InvalidOptions(_)));
    }

    #[test]
    fn test_without_comments_differs() {
        let lights = [LightDescriptor::spot()];
        assert_ne!(key(&lights), key(&lights).without_comments());
        assert!(key(&lights).without_comments().as_str().ends_with("/nocomments"));
    }

    #[test]
    fn test_too_many_lights() {
        let lights = vec![LightDescriptor::omni(); MAX_LIGHTS + 1];
        let err = PermutationKey::build(&lights, &LitOptions::default(), ShaderDialect::Glsl, 32).unwrap_err();
        assert_eq!(err, ComposeError::TooManyLights { limit: MAX_LIGHTS, count: MAX_LIGHTS + 1 });

        let err = PermutationKey::build(&lights[..3], &LitOptions::default(), ShaderDialect::Glsl, 2).unwrap_err();
        assert_eq!(err, ComposeError::TooManyLights { limit: 2, count: 3 });
    }

    #[test]
    fn test_invalid_combinations() {
        let cases = [
            LightDescriptor::omni().with_shadow(ShadowSettings::new(ShadowAlgorithm::Vsm32)),
            LightDescriptor::omni().with_shadow(ShadowSettings::new(ShadowAlgorithm::Pcf5)),
            LightDescriptor::spot().with_shadow(ShadowSettings::new(ShadowAlgorithm::Pcf3).with_cascades(2)),
            LightDescriptor::directional().with_shadow(ShadowSettings::new(ShadowAlgorithm::Pcf3).with_cascades(5)),
            LightDescriptor::directional().with_cookie(CookieSettings::default()),
            LightDescriptor::omni().with_cookie(CookieSettings::default().with_transform()),
            LightDescriptor::omni().with_cookie(CookieSettings::default().coupled()),
        ];
        for light in cases {
            let err = PermutationKey::build(
                &[LightDescriptor::directional(), light],
                &LitOptions::default(),
                ShaderDialect::Glsl,
                MAX_LIGHTS,
            )
            .unwrap_err();
            assert!(
                matches!(err, ComposeError::InvalidCombination { slot: 1, .. }),
                "{:?}",
                light
            );
        }
    }
}
