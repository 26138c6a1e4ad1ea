//! Light descriptor model
//!
//! Compile-time relevant description of a single light slot, plus the global
//! material capability flags the composer is keyed on. Runtime values that are
//! bound as uniforms (color, range, cone angles, cascade distances) are not
//! part of this model.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Kind of light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightType {
    /// Infinitely distant light (sun)
    Directional,
    /// Point light radiating in all directions
    Omni,
    /// Cone light
    Spot,
}

impl LightType {
    /// All light types
    pub const ALL: [LightType; 3] = [Self::Directional, Self::Omni, Self::Spot];

    /// Name used in fingerprints and defines
    pub fn name(self) -> &'static str {
        match self {
            Self::Directional => "directional",
            Self::Omni => "omni",
            Self::Spot => "spot",
        }
    }
}

/// Geometric shape of the light emitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightShape {
    /// Infinitesimally small emitter
    Punctual,
    /// Rectangle area light
    Rect,
    /// Disk area light
    Disk,
    /// Sphere area light
    Sphere,
}

impl LightShape {
    /// All shapes
    pub const ALL: [LightShape; 4] = [Self::Punctual, Self::Rect, Self::Disk, Self::Sphere];

    /// Name used in fingerprints and defines
    pub fn name(self) -> &'static str {
        match self {
            Self::Punctual => "punctual",
            Self::Rect => "rect",
            Self::Disk => "disk",
            Self::Sphere => "sphere",
        }
    }

    /// Whether this is an area shape
    pub fn is_area(self) -> bool {
        !matches!(self, Self::Punctual)
    }
}

impl Default for LightShape {
    fn default() -> Self {
        Self::Punctual
    }
}

/// Distance attenuation curve for punctual lights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FalloffMode {
    /// Linear falloff to the light radius
    Linear,
    /// Physically based inverse-square falloff windowed by the radius
    InverseSquared,
}

impl FalloffMode {
    /// Name used in fingerprints
    pub fn name(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::InverseSquared => "inv_squared",
        }
    }
}

impl Default for FalloffMode {
    fn default() -> Self {
        Self::Linear
    }
}

/// Shadow filtering algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadowAlgorithm {
    /// 16-bit exponential variance shadow map
    Vsm16,
    /// 32-bit exponential variance shadow map
    Vsm32,
    /// Single hardware comparison
    Pcf1,
    /// 3x3 percentage-closer filtering
    Pcf3,
    /// 5x5 percentage-closer filtering
    Pcf5,
    /// Percentage-closer soft shadows on a 32-bit depth map
    Pcss32,
}

impl ShadowAlgorithm {
    /// All algorithms
    pub const ALL: [ShadowAlgorithm; 6] = [
        Self::Vsm16,
        Self::Vsm32,
        Self::Pcf1,
        Self::Pcf3,
        Self::Pcf5,
        Self::Pcss32,
    ];

    /// Name used in fingerprints and defines
    pub fn name(self) -> &'static str {
        match self {
            Self::Vsm16 => "vsm16",
            Self::Vsm32 => "vsm32",
            Self::Pcf1 => "pcf1",
            Self::Pcf3 => "pcf3",
            Self::Pcf5 => "pcf5",
            Self::Pcss32 => "pcss32",
        }
    }

    /// Shadow kind suffix used by `SHADOW_KIND_*` defines
    pub fn kind(self) -> &'static str {
        match self {
            Self::Vsm16 | Self::Vsm32 => "VSM",
            Self::Pcf1 => "PCF1",
            Self::Pcf3 => "PCF3",
            Self::Pcf5 => "PCF5",
            Self::Pcss32 => "PCSS",
        }
    }

    /// Variance shadow map
    pub fn is_vsm(self) -> bool {
        matches!(self, Self::Vsm16 | Self::Vsm32)
    }

    /// Percentage-closer filtering of any kernel size
    pub fn is_pcf(self) -> bool {
        matches!(self, Self::Pcf1 | Self::Pcf3 | Self::Pcf5)
    }

    /// Percentage-closer soft shadows
    pub fn is_pcss(self) -> bool {
        matches!(self, Self::Pcss32)
    }

    /// Whether the shadow map stores rasterizer depth (as opposed to linear distance)
    pub fn samples_source_depth(self) -> bool {
        self.is_pcf() || self.is_pcss()
    }
}

/// Shadow configuration for a shadow-casting light
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadowSettings {
    /// Filtering algorithm
    pub algorithm: ShadowAlgorithm,
    /// Cascaded shadow maps (directional only)
    #[serde(default)]
    pub cascaded: bool,
    /// Number of cascades, bound at runtime
    #[serde(default = "default_cascade_count")]
    pub cascade_count: u32,
    /// Dither the boundary between adjacent cascades
    #[serde(default)]
    pub dither_cascade_blend: bool,
    /// Offset the sampled position along the surface normal
    #[serde(default)]
    pub normal_offset: bool,
}

fn default_cascade_count() -> u32 {
    1
}

impl ShadowSettings {
    /// Shadow settings with the given algorithm and no cascades
    pub fn new(algorithm: ShadowAlgorithm) -> Self {
        Self {
            algorithm,
            cascaded: false,
            cascade_count: 1,
            dither_cascade_blend: false,
            normal_offset: false,
        }
    }

    /// Use `count` cascades; a single cascade is not cascaded
    pub fn with_cascades(mut self, count: u32) -> Self {
        self.cascade_count = count;
        self.cascaded = count > 1;
        self
    }

    /// Dither between cascades
    pub fn with_dithered_blend(mut self) -> Self {
        self.dither_cascade_blend = true;
        self
    }

    /// Enable or disable normal offset bias
    pub fn with_normal_offset(mut self, enabled: bool) -> Self {
        self.normal_offset = enabled;
        self
    }

    /// Cascade dithering only exists when there are cascades to blend
    pub fn dithers_cascades(&self) -> bool {
        self.cascaded && self.dither_cascade_blend
    }

    /// Variance maps are never normal-offset
    pub fn uses_normal_offset(&self) -> bool {
        self.normal_offset && !self.algorithm.is_vsm()
    }
}

/// Channels of a cookie texture that modulate the light
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CookieChannels(u8);

impl CookieChannels {
    /// Red channel
    pub const R: Self = Self(1 << 0);
    /// Green channel
    pub const G: Self = Self(1 << 1);
    /// Blue channel
    pub const B: Self = Self(1 << 2);
    /// Alpha channel
    pub const A: Self = Self(1 << 3);
    /// Color channels
    pub const RGB: Self = Self(Self::R.0 | Self::G.0 | Self::B.0);

    /// Create from raw bits
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x0F)
    }

    /// Raw bits
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Mask vector uploaded to `lightN_cookieChannelMask`
    pub fn mask(self) -> [f32; 4] {
        let mut mask = [0.0; 4];
        for (i, m) in mask.iter_mut().enumerate() {
            if self.0 & (1 << i) != 0 {
                *m = 1.0;
            }
        }
        mask
    }
}

impl Default for CookieChannels {
    fn default() -> Self {
        Self::RGB
    }
}

/// Projected texture modulating a light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CookieSettings {
    /// Sampled channels
    #[serde(default)]
    pub channels: CookieChannels,
    /// Cookie UVs are transformed by a per-light 2D transform
    #[serde(default)]
    pub has_transform: bool,
    /// Angular falloff is folded into the cookie sample (spot only)
    #[serde(default)]
    pub coupled_to_falloff: bool,
}

impl CookieSettings {
    /// Cookie sampling the given channels
    pub fn new(channels: CookieChannels) -> Self {
        Self {
            channels,
            has_transform: false,
            coupled_to_falloff: false,
        }
    }

    /// Apply the per-light UV transform
    pub fn with_transform(mut self) -> Self {
        self.has_transform = true;
        self
    }

    /// Fold angular falloff into the cookie sample
    pub fn coupled(mut self) -> Self {
        self.coupled_to_falloff = true;
        self
    }
}

/// Compile-time description of one light slot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightDescriptor {
    /// Light type
    pub light_type: LightType,
    /// Emitter shape
    #[serde(default)]
    pub shape: LightShape,
    /// Falloff mode for punctual lights
    #[serde(default)]
    pub falloff: FalloffMode,
    /// Shadow settings, `None` when the light casts no shadow
    #[serde(default)]
    pub shadow: Option<ShadowSettings>,
    /// Cookie settings
    #[serde(default)]
    pub cookie: Option<CookieSettings>,
    /// Whether the light contributes specular lighting
    #[serde(default = "default_true")]
    pub affects_specularity: bool,
}

fn default_true() -> bool {
    true
}

impl LightDescriptor {
    /// Punctual light of the given type
    pub fn new(light_type: LightType) -> Self {
        Self {
            light_type,
            shape: LightShape::Punctual,
            falloff: FalloffMode::Linear,
            shadow: None,
            cookie: None,
            affects_specularity: true,
        }
    }

    /// Directional light
    pub fn directional() -> Self {
        Self::new(LightType::Directional)
    }

    /// Omni light
    pub fn omni() -> Self {
        Self::new(LightType::Omni)
    }

    /// Spot light
    pub fn spot() -> Self {
        Self::new(LightType::Spot)
    }

    /// Set the emitter shape
    pub fn with_shape(mut self, shape: LightShape) -> Self {
        self.shape = shape;
        self
    }

    /// Set the punctual falloff mode
    pub fn with_falloff(mut self, falloff: FalloffMode) -> Self {
        self.falloff = falloff;
        self
    }

    /// Cast shadows
    pub fn with_shadow(mut self, shadow: ShadowSettings) -> Self {
        self.shadow = Some(shadow);
        self
    }

    /// Attach a cookie
    pub fn with_cookie(mut self, cookie: CookieSettings) -> Self {
        self.cookie = Some(cookie);
        self
    }

    /// Contribute diffuse lighting only
    pub fn diffuse_only(mut self) -> Self {
        self.affects_specularity = false;
        self
    }

    /// Whether the light casts shadows
    pub fn casts_shadow(&self) -> bool {
        self.shadow.is_some()
    }

    /// Whether the emitter is an area shape
    pub fn is_area(&self) -> bool {
        self.shape.is_area()
    }

    /// The falloff mode that actually reaches the generated code
    ///
    /// Area lights always use the range window, so their mode is irrelevant.
    pub fn effective_falloff(&self) -> Option<FalloffMode> {
        if self.is_area() {
            None
        } else {
            Some(self.falloff)
        }
    }

    /// Whether specular for this light re-derives Fresnel from the half vector
    ///
    /// Only directional lights do; spot and omni lights reuse the precomputed
    /// per-surface specularity.
    pub fn uses_per_light_fresnel(&self, fresnel: FresnelModel) -> bool {
        self.light_type == LightType::Directional && fresnel != FresnelModel::None
    }
}

/// Fresnel reflectance model of the material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FresnelModel {
    /// No Fresnel
    None,
    /// Schlick approximation
    Schlick,
}

impl FresnelModel {
    /// Name used in keys and defines
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Schlick => "schlick",
        }
    }
}

impl Default for FresnelModel {
    fn default() -> Self {
        Self::Schlick
    }
}

/// Global material capability flags
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LitFlags(u32);

impl LitFlags {
    /// No capabilities
    pub const NONE: Self = Self(0);

    /// Base specular lobe
    pub const SPECULAR: Self = Self(1 << 0);

    /// Clearcoat lobe
    pub const CLEARCOAT: Self = Self(1 << 1);

    /// Sheen lobe
    pub const SHEEN: Self = Self(1 << 2);

    /// Iridescence term in the Fresnel evaluation
    pub const IRIDESCENCE: Self = Self(1 << 3);

    /// At least one light has an area shape
    pub const AREA_LIGHTS: Self = Self(1 << 4);

    /// Omni and spot lights are evaluated by the clustered light loop
    pub const CLUSTERED_LIGHTS: Self = Self(1 << 5);

    /// Clustered lights may carry cookies
    pub const CLUSTER_COOKIES: Self = Self(1 << 6);

    /// Clustered lights may have area shapes
    pub const CLUSTER_AREA_LIGHTS: Self = Self(1 << 7);

    /// Clustered lights may cast shadows
    pub const CLUSTER_SHADOWS: Self = Self(1 << 8);

    /// Ignore every light's shadow settings
    pub const NO_SHADOW: Self = Self(1 << 9);

    /// Create flags from raw bits
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Get raw bits
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Check if all flags in `other` are set
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Set or clear the flags in `other`
    #[inline]
    pub fn set(&mut self, other: Self, value: bool) {
        if value {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }

    /// Copy with the flags in `other` set or cleared
    #[inline]
    pub fn with(mut self, other: Self, value: bool) -> Self {
        self.set(other, value);
        self
    }
}

impl BitOr for LitFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for LitFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Binary for LitFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Binary::fmt(&self.0, f)
    }
}

/// Global inputs shared by every light of a material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LitOptions {
    /// Capability flags
    pub flags: LitFlags,
    /// Fresnel model
    pub fresnel: FresnelModel,
    /// Shadow filtering of clustered lights, used with `CLUSTER_SHADOWS`
    #[serde(default = "default_cluster_shadow")]
    pub cluster_shadow: ShadowAlgorithm,
}

fn default_cluster_shadow() -> ShadowAlgorithm {
    ShadowAlgorithm::Pcf3
}

impl LitOptions {
    /// Options with explicit flags and Fresnel model
    pub fn new(flags: LitFlags, fresnel: FresnelModel) -> Self {
        Self {
            flags,
            fresnel,
            cluster_shadow: default_cluster_shadow(),
        }
    }

    /// Diffuse-only material
    pub fn diffuse() -> Self {
        Self::new(LitFlags::NONE, FresnelModel::None)
    }

    /// Set the shadow filtering of clustered lights
    pub fn with_cluster_shadow(mut self, algorithm: ShadowAlgorithm) -> Self {
        self.cluster_shadow = algorithm;
        self
    }

    /// Whether a capability is enabled
    pub fn has(&self, flag: LitFlags) -> bool {
        self.flags.contains(flag)
    }

    /// The descriptor a slot is expanded from
    ///
    /// `None` when the clustered loop evaluates the light instead. With
    /// `NO_SHADOW` the shadow settings are dropped.
    pub fn effective_light(&self, light: &LightDescriptor) -> Option<LightDescriptor> {
        if self.has(LitFlags::CLUSTERED_LIGHTS) && light.light_type != LightType::Directional {
            return None;
        }
        let mut light = *light;
        if self.has(LitFlags::NO_SHADOW) {
            light.shadow = None;
        }
        Some(light)
    }

    /// Copy with derived flags resolved against the light list
    ///
    /// `AREA_LIGHTS` is set when any light has an area shape or clustered
    /// area lights are enabled. Cluster flags without `CLUSTERED_LIGHTS`,
    /// and cluster shadows under `NO_SHADOW`, are cleared. The cluster
    /// shadow algorithm is reset when cluster shadows are off.
    pub fn resolved_for(&self, lights: &[LightDescriptor]) -> Self {
        let mut flags = self.flags;
        if !flags.contains(LitFlags::CLUSTERED_LIGHTS) {
            flags.set(
                LitFlags::CLUSTER_COOKIES | LitFlags::CLUSTER_AREA_LIGHTS | LitFlags::CLUSTER_SHADOWS,
                false,
            );
        }
        if flags.contains(LitFlags::NO_SHADOW) {
            flags.set(LitFlags::CLUSTER_SHADOWS, false);
        }
        let any_area =
            lights.iter().any(LightDescriptor::is_area) || flags.contains(LitFlags::CLUSTER_AREA_LIGHTS);
        flags.set(LitFlags::AREA_LIGHTS, any_area);

        Self {
            flags,
            fresnel: self.fresnel,
            cluster_shadow: if flags.contains(LitFlags::CLUSTER_SHADOWS) {
                self.cluster_shadow
            } else {
                default_cluster_shadow()
            },
        }
    }
}

impl Default for LitOptions {
    fn default() -> Self {
        Self::new(LitFlags::SPECULAR, FresnelModel::Schlick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_light_fresnel_only_for_directional() {
        let dir = LightDescriptor::directional();
        let spot = LightDescriptor::spot();
        let omni = LightDescriptor::omni();

        assert!(dir.uses_per_light_fresnel(FresnelModel::Schlick));
        assert!(!dir.uses_per_light_fresnel(FresnelModel::None));
        assert!(!spot.uses_per_light_fresnel(FresnelModel::Schlick));
        assert!(!omni.uses_per_light_fresnel(FresnelModel::Schlick));
    }

    #[test]
    fn test_area_lights_ignore_falloff_mode() {
        let rect = LightDescriptor::spot()
            .with_shape(LightShape::Rect)
            .with_falloff(FalloffMode::InverseSquared);
        assert_eq!(rect.effective_falloff(), None);

        let punctual = LightDescriptor::omni().with_falloff(FalloffMode::InverseSquared);
        assert_eq!(punctual.effective_falloff(), Some(FalloffMode::InverseSquared));
    }

    #[test]
    fn test_shadow_settings_normalization() {
        let single = ShadowSettings::new(ShadowAlgorithm::Pcf3)
            .with_cascades(1)
            .with_dithered_blend();
        assert!(!single.cascaded);
        assert!(!single.dithers_cascades());

        let cascaded = ShadowSettings::new(ShadowAlgorithm::Pcf3)
            .with_cascades(4)
            .with_dithered_blend();
        assert!(cascaded.dithers_cascades());

        let vsm = ShadowSettings::new(ShadowAlgorithm::Vsm16).with_normal_offset(true);
        assert!(!vsm.uses_normal_offset());
    }

    #[test]
    fn test_lit_flags() {
        let mut flags = LitFlags::SPECULAR | LitFlags::SHEEN;
        assert!(flags.contains(LitFlags::SPECULAR));
        assert!(!flags.contains(LitFlags::CLEARCOAT));

        flags.set(LitFlags::SHEEN, false);
        assert_eq!(flags, LitFlags::SPECULAR);
    }

    #[test]
    fn test_area_flag_derived_from_lights() {
        let options = LitOptions::default().resolved_for(&[
            LightDescriptor::directional(),
            LightDescriptor::spot().with_shape(LightShape::Disk),
        ]);
        assert!(options.has(LitFlags::AREA_LIGHTS));

        let options = LitOptions::new(LitFlags::AREA_LIGHTS, FresnelModel::None)
            .resolved_for(&[LightDescriptor::omni()]);
        assert!(!options.has(LitFlags::AREA_LIGHTS));
    }

    #[test]
    fn test_cluster_flags_resolved() {
        let cluster = LitFlags::CLUSTER_COOKIES | LitFlags::CLUSTER_AREA_LIGHTS | LitFlags::CLUSTER_SHADOWS;

        let options = LitOptions::new(LitFlags::SPECULAR | cluster, FresnelModel::Schlick)
            .with_cluster_shadow(ShadowAlgorithm::Pcf5)
            .resolved_for(&[]);
        assert_eq!(options, LitOptions::default());

        let clustered = LitOptions::new(LitFlags::CLUSTERED_LIGHTS | cluster, FresnelModel::Schlick)
            .with_cluster_shadow(ShadowAlgorithm::Pcf5)
            .resolved_for(&[LightDescriptor::omni()]);
        assert!(clustered.has(LitFlags::AREA_LIGHTS));
        assert!(clustered.has(LitFlags::CLUSTER_SHADOWS));
        assert_eq!(clustered.cluster_shadow, ShadowAlgorithm::Pcf5);

        let unshadowed = LitOptions::new(
            LitFlags::CLUSTERED_LIGHTS | LitFlags::CLUSTER_SHADOWS | LitFlags::NO_SHADOW,
            FresnelModel::Schlick,
        )
        .with_cluster_shadow(ShadowAlgorithm::Pcf5)
        .resolved_for(&[]);
        assert!(!unshadowed.has(LitFlags::CLUSTER_SHADOWS));
        assert_eq!(unshadowed.cluster_shadow, ShadowAlgorithm::Pcf3);
    }

    #[test]
    fn test_effective_light() {
        let shadowed = ShadowSettings::new(ShadowAlgorithm::Pcf3);
        let spot = LightDescriptor::spot().with_shadow(shadowed);
        let sun = LightDescriptor::directional().with_shadow(shadowed);

        let options = LitOptions::new(LitFlags::CLUSTERED_LIGHTS, FresnelModel::Schlick);
        assert_eq!(options.effective_light(&spot), None);
        assert_eq!(options.effective_light(&sun), Some(sun));

        let options = LitOptions::new(LitFlags::NO_SHADOW, FresnelModel::Schlick);
        let spot = options.effective_light(&spot).unwrap();
        assert!(!spot.casts_shadow());
        assert_eq!(spot.light_type, LightType::Spot);
    }

    #[test]
    fn test_cookie_channel_mask() {
        assert_eq!(CookieChannels::A.mask(), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(CookieChannels::RGB.mask(), [1.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_descriptor_deserialize_defaults() {
        let json = r#"{ "light_type": "spot", "shadow": { "algorithm": "pcf3" } }"#;
        let light: LightDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(light.shape, LightShape::Punctual);
        assert!(light.affects_specularity);
        assert_eq!(light.shadow.unwrap().cascade_count, 1);
    }
}
