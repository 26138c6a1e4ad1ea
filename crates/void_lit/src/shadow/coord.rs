//! Shadow coordinate resolution
//!
//! Four orthogonal capabilities select one of four strategies. The strategy
//! is emitted as shading IR by [`emit_shadow_coord`] and mirrored on the CPU
//! by [`resolve_shadow_coord`], which is the reference the emitted code is
//! tested against.

use glam::{Mat4, Vec3};

use crate::ir::{Block, Expr, SlotScope, Ty};
use crate::light::{LightType, ShadowSettings};

/// Upper clamp for orthographic depth so the far plane never self-shadows
pub const ORTHO_DEPTH_MAX: f32 = 0.99999;

/// Capabilities that drive coordinate resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShadowCoordCaps {
    /// Cube map indexed by direction (omni)
    pub point: bool,
    /// Orthographic projection (directional)
    pub ortho: bool,
    /// Map stores rasterizer depth instead of linear distance
    pub source_zbuffer: bool,
    /// Offset the sampled position along the geometric normal
    pub normal_offset: bool,
}

impl ShadowCoordCaps {
    /// Capabilities of a shadow-casting light
    pub fn for_light(light_type: LightType, settings: &ShadowSettings) -> Self {
        Self {
            point: light_type == LightType::Omni,
            ortho: light_type == LightType::Directional,
            source_zbuffer: settings.algorithm.samples_source_depth(),
            normal_offset: settings.uses_normal_offset(),
        }
    }
}

/// How the shadow-map lookup coordinate is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordStrategy {
    /// Light-to-surface vector indexes a cube map
    Point,
    /// Orthographic projection, depth clamped below the far plane
    Ortho,
    /// Perspective projection, depth is normalized light distance
    PerspectiveLinear,
    /// Perspective projection, depth from the perspective divide
    PerspectiveZBuffer,
}

impl CoordStrategy {
    /// Pick the strategy; `point` wins, then `ortho`, then the depth source
    pub fn select(caps: ShadowCoordCaps) -> Self {
        if caps.point {
            Self::Point
        } else if caps.ortho {
            Self::Ortho
        } else if caps.source_zbuffer {
            Self::PerspectiveZBuffer
        } else {
            Self::PerspectiveLinear
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Ortho => "ortho",
            Self::PerspectiveLinear => "perspective_linear",
            Self::PerspectiveZBuffer => "perspective_zbuffer",
        }
    }

    /// Whether the map is compared against a linear light distance
    pub fn compares_linear_distance(self) -> bool {
        matches!(self, Self::Point | Self::PerspectiveLinear)
    }
}

/// Per-fragment inputs of the CPU resolver
#[derive(Debug, Clone, Copy)]
pub struct ShadowCoordInput {
    /// World-space surface position
    pub position: Vec3,
    /// World-space geometric normal
    pub normal: Vec3,
    /// Light-to-surface vector (omni/spot) or light direction (directional)
    pub light_dir: Vec3,
    /// World-space light position
    pub light_position: Vec3,
    /// World-to-shadow-map matrix
    pub shadow_matrix: Mat4,
    /// `shadowParams.y`
    pub normal_bias: f32,
    /// `shadowParams.w`
    pub inverse_range: f32,
}

fn distance_scale(strategy: CoordStrategy, input: &ShadowCoordInput) -> f32 {
    match strategy {
        CoordStrategy::Ortho => 1.0,
        _ => input.light_dir.length(),
    }
}

/// Surface position pushed along the normal, more at grazing angles
pub fn normal_offset_position(input: &ShadowCoordInput, distance_scale: f32) -> Vec3 {
    let dir_norm = input.light_dir.normalize_or_zero();
    let grazing = (1.0 - input.normal.dot(-dir_norm)).clamp(0.0, 1.0);
    input.position + input.normal * (input.normal_bias * grazing * distance_scale)
}

/// CPU reference of the emitted coordinate computation
pub fn resolve_shadow_coord(caps: ShadowCoordCaps, input: &ShadowCoordInput) -> Vec3 {
    let strategy = CoordStrategy::select(caps);
    let position = if caps.normal_offset {
        normal_offset_position(input, distance_scale(strategy, input))
    } else {
        input.position
    };

    match strategy {
        CoordStrategy::Point => {
            if caps.normal_offset {
                position - input.light_position
            } else {
                input.light_dir
            }
        }
        CoordStrategy::Ortho => {
            let proj = input.shadow_matrix * position.extend(1.0);
            Vec3::new(proj.x, proj.y, proj.z.clamp(0.0, ORTHO_DEPTH_MAX))
        }
        CoordStrategy::PerspectiveLinear => {
            let proj = input.shadow_matrix * position.extend(1.0);
            Vec3::new(
                proj.x / proj.w,
                proj.y / proj.w,
                input.light_dir.length() * input.inverse_range,
            )
        }
        CoordStrategy::PerspectiveZBuffer => {
            let proj = input.shadow_matrix * position.extend(1.0);
            proj.truncate() / proj.w
        }
    }
}

/// Emit the coordinate computation into `body`, returning the `shadowCoord` variable
///
/// `shadow_matrix` overrides the light's single matrix uniform, which is how
/// cascades feed in the palette entry they selected.
pub fn emit_shadow_coord(
    caps: ShadowCoordCaps,
    body: &mut Block,
    scope: &mut SlotScope,
    light_dir: Expr,
    light_dir_norm: Expr,
    shadow_matrix: Option<Expr>,
) -> Expr {
    let strategy = CoordStrategy::select(caps);
    let params = scope.uniform("shadowParams", Ty::Vec4);

    let position = if caps.normal_offset {
        let normal = Expr::var("dVertexNormalW");
        let grazing = Expr::call(
            "clamp",
            vec![
                Expr::float(1.0)
                    - Expr::call("dot", vec![normal.clone(), -light_dir_norm]),
                Expr::float(0.0),
                Expr::float(1.0),
            ],
        );
        let mut amount = params.clone().swizzle("y") * grazing;
        if strategy != CoordStrategy::Ortho {
            amount = amount * Expr::call("length", vec![light_dir.clone()]);
        }
        body.let_("shadowPosW", Ty::Vec3, Expr::var("vPositionW") + normal * amount)
    } else {
        Expr::var("vPositionW")
    };

    if strategy == CoordStrategy::Point {
        let value = if caps.normal_offset {
            position - scope.uniform("position", Ty::Vec3)
        } else {
            light_dir
        };
        return body.var("shadowCoord", Ty::Vec3, value);
    }

    let matrix = shadow_matrix.unwrap_or_else(|| scope.uniform("shadowMatrix", Ty::Mat4));
    let proj = body.let_(
        "projPos",
        Ty::Vec4,
        matrix * Expr::Construct(Ty::Vec4, vec![position, Expr::float(1.0)]),
    );

    let value = match strategy {
        CoordStrategy::Ortho => Expr::Construct(
            Ty::Vec3,
            vec![
                proj.clone().swizzle("xy"),
                Expr::call(
                    "clamp",
                    vec![proj.swizzle("z"), Expr::float(0.0), Expr::float(ORTHO_DEPTH_MAX)],
                ),
            ],
        ),
        CoordStrategy::PerspectiveLinear => Expr::Construct(
            Ty::Vec3,
            vec![
                proj.clone().swizzle("xy") / proj.swizzle("w"),
                Expr::call("length", vec![light_dir]) * params.swizzle("w"),
            ],
        ),
        _ => proj.clone().swizzle("xyz") / proj.swizzle("w"),
    };
    body.var("shadowCoord", Ty::Vec3, value)
}
