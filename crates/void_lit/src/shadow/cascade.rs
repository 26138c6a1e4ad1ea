//! Cascaded shadow maps for directional lights

use glam::Vec3;

use crate::ir::{Block, Expr, SlotScope, Ty};

/// Maximum number of cascades per light
pub const MAX_CASCADES: u32 = 4;

/// Depth written into faded coordinates; always in front of the stored depth
pub const FADED_DEPTH: f32 = -9_999_999.0;

const CHUNK: &str = "shadowCascadesPS";

/// Index of the cascade covering `view_depth`
///
/// `distances` holds the far split distance of each cascade. Depths past the
/// last split stay in the last cascade; fading handles them.
pub fn select_cascade(distances: &[f32], count: usize, view_depth: f32) -> usize {
    let count = count.clamp(1, distances.len().min(MAX_CASCADES as usize).max(1));
    distances
        .iter()
        .take(count)
        .position(|&far| view_depth < far)
        .unwrap_or(count - 1)
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Move to the next cascade near a split, stochastically
///
/// The transition band starts at `blend * distances[index]`. `noise` is a
/// per-pixel value in [0, 1).
pub fn dither_cascade(
    index: usize,
    distances: &[f32],
    count: usize,
    view_depth: f32,
    blend: f32,
    noise: f32,
) -> usize {
    if index + 1 >= count.min(distances.len()) {
        return index;
    }
    let range_end = distances[index];
    let start = blend * range_end;
    if view_depth > start && noise < smoothstep(start, range_end, view_depth) {
        index + 1
    } else {
        index
    }
}

/// Push coordinates beyond the shadow distance in front of every occluder
pub fn fade_shadow_coord(coord: Vec3, view_depth: f32, shadow_distance: f32) -> Vec3 {
    if view_depth > shadow_distance {
        Vec3::new(coord.x, coord.y, FADED_DEPTH)
    } else {
        coord
    }
}

/// Emit cascade selection, returning the selected palette matrix
pub fn emit_cascade_matrix(body: &mut Block, scope: &mut SlotScope, dither: bool) -> Expr {
    scope.require(CHUNK);
    let distances = scope.uniform("shadowCascadeDistances", Ty::Vec4);
    let count = scope.uniform("shadowCascadeCount", Ty::Float);

    let index = body.var(
        "cascadeIndex",
        Ty::Int,
        Expr::call("getShadowCascadeIndex", vec![distances.clone(), count.clone()]),
    );
    if dither {
        let blend = scope.uniform("shadowCascadeBlend", Ty::Float);
        body.set(
            index.clone(),
            Expr::call(
                "ditherShadowCascadeIndex",
                vec![index.clone(), distances, count, blend],
            ),
        );
    }

    let palette = scope.uniform("shadowMatrixPalette", Ty::Mat4Array(MAX_CASCADES));
    body.let_("shadowMatrix", Ty::Mat4, palette.index(index))
}

/// Emit fading of `coord` past the light's shadow distance
pub fn emit_fade(body: &mut Block, scope: &mut SlotScope, coord: Expr) {
    scope.require(CHUNK);
    let distance = scope.uniform("shadowDistance", Ty::Float);
    body.set(coord.clone(), Expr::call("fadeShadow", vec![coord, distance]));
}
