//! Per-light block expansion
//!
//! Turns one [`LightDescriptor`] into an evaluation function and, for shadow
//! casters, a shadow function. Both are IR; the assembler prints them. All
//! names a block declares are slot-qualified through [`SlotScope`], so blocks
//! compose in any order without collisions.
//!
//! Evaluation order inside `evaluateLight{slot}`:
//!
//! 1. color, direction and normalized direction
//! 2. distance falloff, spot cone, cookie (omni and spot only)
//! 3. early-out on attenuation (omni and spot only)
//! 4. shadow, diffuse, then each enabled specular lobe
//! 5. lightmapper outputs

use std::collections::BTreeSet;

use crate::ir::{Block, Expr, Function, Param, SlotScope, Stmt, TextureKind, Ty, UniformDecl};
use crate::key::validate_light;
use crate::light::{
    CookieSettings, FalloffMode, LightDescriptor, LightShape, LightType, LitFlags, LitOptions,
    ShadowSettings,
};
use crate::shadow::cascade::{emit_cascade_matrix, emit_fade};
use crate::shadow::coord::{emit_shadow_coord, CoordStrategy, ShadowCoordCaps};
use crate::shadow::dispatch::{select_sampler, ShadowSampler};
use crate::ComposeError;

/// Attenuation at or below which a light is skipped
pub const ATTENUATION_EPSILON: f32 = 0.00001;

/// Normalization of LTC diffuse for area lights
pub const AREA_DIFFUSE_SCALE: f32 = 16.0;

/// Symbol guarding lightmapper outputs
pub const LIGHTMAPPER_SYMBOL: &str = "LIT_LIGHTMAPPER";

/// Generated code for one light slot
#[derive(Debug, Clone)]
pub struct LightBlock {
    pub slot: usize,
    pub light: LightDescriptor,
    /// Uniforms and textures, slot-qualified, in first-use order
    pub uniforms: Vec<UniformDecl>,
    /// Helper chunks the block calls into
    pub chunks: BTreeSet<&'static str>,
    /// `getShadow{slot}`, for shadow casters
    pub shadow: Option<Function>,
    /// `evaluateLight{slot}`
    pub evaluation: Function,
}

impl LightBlock {
    /// Name of the shadow function of `slot`
    pub fn shadow_function_name(slot: usize) -> String {
        format!("getShadow{}", slot)
    }

    /// Name of the evaluation function of `slot`
    pub fn evaluation_function_name(slot: usize) -> String {
        format!("evaluateLight{}", slot)
    }

    /// Functions in definition order
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.shadow.iter().chain(std::iter::once(&self.evaluation))
    }
}

/// Expand one light slot
pub fn expand_light(
    slot: usize,
    light: &LightDescriptor,
    options: &LitOptions,
) -> Result<LightBlock, ComposeError> {
    validate_light(slot, light)?;
    let mut scope = SlotScope::new(slot);

    let shadow = match &light.shadow {
        Some(settings) => {
            let sampler = select_sampler(slot, light.light_type, light.shape, settings)?;
            Some(shadow_function(&mut scope, light, settings, &sampler))
        }
        None => None,
    };
    let evaluation = evaluation_function(
        &mut scope,
        light,
        options,
        shadow.as_ref().map(|f| f.name.as_str()),
    );

    let (uniforms, chunks) = scope.into_parts();
    log::trace!(
        "Expanded slot {} ({} {}): {} uniforms, {} chunks",
        slot,
        light.shape.name(),
        light.light_type.name(),
        uniforms.len(),
        chunks.len()
    );
    Ok(LightBlock {
        slot,
        light: *light,
        uniforms,
        chunks,
        shadow,
        evaluation,
    })
}

fn shadow_function(
    scope: &mut SlotScope,
    light: &LightDescriptor,
    settings: &ShadowSettings,
    sampler: &ShadowSampler,
) -> Function {
    let light_dir = Expr::var("lightDirW");
    let light_dir_norm = Expr::var("lightDirNormW");
    let caps = ShadowCoordCaps::for_light(light.light_type, settings);

    let mut body = Block::new();
    body.comment(format!(
        "{} shadow, {} coordinates",
        settings.algorithm.name(),
        CoordStrategy::select(caps).name()
    ));

    let matrix = if settings.cascaded {
        Some(emit_cascade_matrix(&mut body, scope, settings.dithers_cascades()))
    } else {
        None
    };
    let coord = emit_shadow_coord(caps, &mut body, scope, light_dir.clone(), light_dir_norm, matrix);
    if light.light_type == LightType::Directional {
        emit_fade(&mut body, scope, coord.clone());
    }
    body.push(Stmt::Return(sampler.call(scope, coord, light_dir)));

    Function {
        name: LightBlock::shadow_function_name(scope.slot()),
        params: vec![
            Param::new("lightDirW", Ty::Vec3),
            Param::new("lightDirNormW", Ty::Vec3),
        ],
        ret: Some(Ty::Float),
        body,
    }
}

/// Values shared by every stage of one evaluation function
struct LightTerms {
    color: Expr,
    attenuation: Expr,
    light_dir: Expr,
    light_dir_norm: Expr,
}

fn evaluation_function(
    scope: &mut SlotScope,
    light: &LightDescriptor,
    options: &LitOptions,
    shadow: Option<&str>,
) -> Function {
    let mut body = Block::new();
    body.comment(format!("{} {} light", light.shape.name(), light.light_type.name()));

    let color_value = scope.uniform("color", Ty::Vec3);
    let color = if light.cookie.is_some() {
        body.var("lightColor", Ty::Vec3, color_value)
    } else {
        body.let_("lightColor", Ty::Vec3, color_value)
    };

    let light_dir = match light.light_type {
        LightType::Directional => {
            body.let_("lightDirW", Ty::Vec3, scope.uniform("direction", Ty::Vec3))
        }
        LightType::Omni | LightType::Spot => {
            scope.require("lightDirPointPS");
            let position = scope.uniform("position", Ty::Vec3);
            body.let_("lightDirW", Ty::Vec3, Expr::call("getLightDirPoint", vec![position]))
        }
    };
    let light_dir_norm = body.let_(
        "lightDirNormW",
        Ty::Vec3,
        Expr::call("normalize", vec![light_dir.clone()]),
    );

    if light.light_type == LightType::Directional {
        let attenuation = body.var("attenuation", Ty::Float, Expr::float(1.0));
        let terms = LightTerms {
            color,
            attenuation,
            light_dir,
            light_dir_norm,
        };
        lit_section(&mut body, scope, light, options, shadow, &terms);
        lightmapper_outputs(&mut body, &terms);
    } else {
        let falloff = distance_falloff(scope, light, light_dir.clone());
        let attenuation = body.var("attenuation", Ty::Float, falloff);

        let coupled = light.cookie.map_or(false, |c| c.coupled_to_falloff);
        if light.light_type == LightType::Spot && !coupled {
            scope.require("spotPS");
            let effect = Expr::call(
                "getSpotEffect",
                vec![
                    scope.uniform("direction", Ty::Vec3),
                    scope.uniform("innerConeAngle", Ty::Float),
                    scope.uniform("outerConeAngle", Ty::Float),
                    light_dir_norm.clone(),
                ],
            );
            body.mul_assign(attenuation.clone(), effect);
        }

        if let Some(cookie) = &light.cookie {
            let sample = cookie_sample(scope, light.light_type, cookie, light_dir.clone());
            body.mul_assign(color.clone(), sample);
        }

        let terms = LightTerms {
            color,
            attenuation,
            light_dir,
            light_dir_norm,
        };
        let mut lit = Block::new();
        lit_section(&mut lit, scope, light, options, shadow, &terms);
        body.push(Stmt::If {
            cond: terms.attenuation.clone().gt(Expr::float(ATTENUATION_EPSILON)),
            body: lit,
        });
        lightmapper_outputs(&mut body, &terms);
    }

    Function::procedure(LightBlock::evaluation_function_name(scope.slot()), body)
}

fn distance_falloff(scope: &mut SlotScope, light: &LightDescriptor, light_dir: Expr) -> Expr {
    let (function, chunk) = match light.effective_falloff() {
        None => ("getFalloffWindow", "falloffWindowPS"),
        Some(FalloffMode::Linear) => ("getFalloffLinear", "falloffLinearPS"),
        Some(FalloffMode::InverseSquared) => ("getFalloffInvSquared", "falloffInvSquaredPS"),
    };
    scope.require(chunk);
    Expr::call(function, vec![scope.uniform("radius", Ty::Float), light_dir])
}

fn cookie_sample(
    scope: &mut SlotScope,
    light_type: LightType,
    cookie: &CookieSettings,
    light_dir: Expr,
) -> Expr {
    scope.require("cookiePS");
    if light_type == LightType::Omni {
        return Expr::call(
            "getCookieCube",
            vec![
                scope.texture("cookie", TextureKind::ColorCube),
                scope.uniform("cookieMatrix", Ty::Mat4),
                light_dir,
                scope.uniform("cookieIntensity", Ty::Float),
                scope.uniform("cookieChannelMask", Ty::Vec4),
            ],
        );
    }

    let function = match (cookie.coupled_to_falloff, cookie.has_transform) {
        (false, false) => "getCookie2D",
        (false, true) => "getCookie2DXform",
        (true, false) => "getCookie2DFalloff",
        (true, true) => "getCookie2DFalloffXform",
    };
    let mut args = vec![
        scope.texture("cookie", TextureKind::Color2D),
        scope.uniform("cookieMatrix", Ty::Mat4),
        Expr::var("vPositionW"),
        scope.uniform("cookieIntensity", Ty::Float),
        scope.uniform("cookieChannelMask", Ty::Vec4),
    ];
    if cookie.has_transform {
        args.push(scope.uniform("cookieTransform", Ty::Vec4));
        args.push(scope.uniform("cookieOffset", Ty::Vec2));
    }
    Expr::call(function, args)
}

fn area_title(shape: LightShape) -> &'static str {
    match shape {
        LightShape::Rect => "Rect",
        LightShape::Disk => "Disk",
        LightShape::Sphere | LightShape::Punctual => "Sphere",
    }
}

fn lit_section(
    body: &mut Block,
    scope: &mut SlotScope,
    light: &LightDescriptor,
    options: &LitOptions,
    shadow: Option<&str>,
    terms: &LightTerms,
) {
    let LightTerms {
        color,
        attenuation,
        light_dir,
        light_dir_norm,
    } = terms;

    if let Some(function) = shadow {
        let value = body.let_(
            "shadow",
            Ty::Float,
            Expr::call(function, vec![light_dir.clone(), light_dir_norm.clone()]),
        );
        let intensity = scope.uniform("shadowIntensity", Ty::Float);
        body.mul_assign(
            attenuation.clone(),
            Expr::call("mix", vec![Expr::float(1.0), value, intensity]),
        );
    }

    if light.is_area() {
        area_lighting(body, scope, light, options, terms);
        return;
    }

    scope.require("lightDiffuseLambertPS");
    body.mul_assign(
        attenuation.clone(),
        Expr::call(
            "getLightDiffuse",
            vec![
                Expr::var("dNormalW"),
                Expr::var("dViewDirW"),
                light_dir.clone(),
                light_dir_norm.clone(),
            ],
        ),
    );
    body.add_assign(Expr::var("dDiffuseLight"), attenuation.clone() * color.clone());

    let lobes = LitFlags::SPECULAR | LitFlags::CLEARCOAT | LitFlags::SHEEN;
    if !light.affects_specularity || options.flags.bits() & lobes.bits() == 0 {
        return;
    }

    let view = Expr::var("dViewDirW");
    let half = body.let_(
        "halfDirW",
        Ty::Vec3,
        Expr::call("normalize", vec![-light_dir_norm.clone() + view.clone()]),
    );
    let per_light_fresnel = light.uses_per_light_fresnel(options.fresnel);
    let v_dot_h = Expr::call("dot", vec![view.clone(), half.clone()]);

    if options.has(LitFlags::SPECULAR) {
        scope.require("lightSpecularPS");
        let mut term = Expr::call(
            "getLightSpecular",
            vec![
                half.clone(),
                Expr::var("dReflDirW"),
                Expr::var("dNormalW"),
                view.clone(),
                light_dir_norm.clone(),
                Expr::var("dGlossiness"),
                Expr::var("dTBN"),
            ],
        ) * attenuation.clone()
            * color.clone();
        if per_light_fresnel {
            scope.require("fresnelSchlickPS");
            let mut args = vec![v_dot_h.clone(), Expr::var("dGlossiness"), Expr::var("dSpecularity")];
            if options.has(LitFlags::IRIDESCENCE) {
                scope.require("iridescenceDiffractionPS");
                args.push(Expr::var("dIridescenceFresnel"));
                args.push(Expr::var("dIridescence"));
            }
            term = term * Expr::call("getFresnel", args);
        } else {
            term = term * Expr::var("dSpecularity");
        }
        body.add_assign(Expr::var("dSpecularLight"), term);
    }

    if options.has(LitFlags::CLEARCOAT) {
        scope.require("lightSpecularPS");
        let mut term = Expr::call(
            "getLightSpecular",
            vec![
                half.clone(),
                Expr::var("ccReflDirW"),
                Expr::var("ccNormalW"),
                view.clone(),
                light_dir_norm.clone(),
                Expr::var("ccGlossiness"),
                Expr::var("dTBN"),
            ],
        ) * attenuation.clone()
            * color.clone();
        if per_light_fresnel {
            scope.require("fresnelSchlickPS");
            term = term * Expr::call("getFresnelCC", vec![v_dot_h]);
        } else {
            term = term * Expr::var("ccSpecularity");
        }
        body.add_assign(Expr::var("ccSpecularLight"), term);
    }

    if options.has(LitFlags::SHEEN) {
        scope.require("lightSheenPS");
        let term = Expr::call(
            "getLightSpecularSheen",
            vec![
                half,
                Expr::var("dNormalW"),
                view,
                light_dir_norm.clone(),
                Expr::var("sGlossiness"),
            ],
        ) * attenuation.clone()
            * color.clone();
        body.add_assign(Expr::var("sSpecularLight"), term);
    }
}

/// LTC diffuse and specular; sheen has no area form
fn area_lighting(
    body: &mut Block,
    scope: &mut SlotScope,
    light: &LightDescriptor,
    options: &LitOptions,
    terms: &LightTerms,
) {
    scope.require("ltcPS");
    let title = area_title(light.shape);
    let view = Expr::var("dViewDirW");

    body.eval(Expr::call(
        format!("calc{}LightValues", title),
        vec![
            scope.uniform("position", Ty::Vec3),
            scope.uniform("halfWidth", Ty::Vec3),
            scope.uniform("halfHeight", Ty::Vec3),
        ],
    ));

    let mut diffuse = terms.attenuation.clone()
        * Expr::call(
            format!("get{}LightDiffuse", title),
            vec![
                Expr::var("dNormalW"),
                view.clone(),
                terms.light_dir.clone(),
                terms.light_dir_norm.clone(),
            ],
        )
        * Expr::float(AREA_DIFFUSE_SCALE)
        * terms.color.clone();
    if options.has(LitFlags::SPECULAR) {
        diffuse = Expr::call(
            "mix",
            vec![
                diffuse,
                Expr::Construct(Ty::Vec3, vec![Expr::float(0.0)]),
                Expr::var("dLTCSpecFres"),
            ],
        );
    }
    body.add_assign(Expr::var("dDiffuseLight"), diffuse);

    if !light.affects_specularity {
        return;
    }

    if options.has(LitFlags::CLEARCOAT) {
        let term = Expr::var("ccLTCSpecFres")
            * Expr::call(
                format!("get{}LightSpecular", title),
                vec![Expr::var("ccNormalW"), view.clone()],
            )
            * terms.attenuation.clone()
            * terms.color.clone();
        body.add_assign(Expr::var("ccSpecularLight"), term);
    }

    if options.has(LitFlags::SPECULAR) {
        let term = Expr::var("dLTCSpecFres")
            * Expr::call(
                format!("get{}LightSpecular", title),
                vec![Expr::var("dNormalW"), view],
            )
            * terms.attenuation.clone()
            * terms.color.clone();
        body.add_assign(Expr::var("dSpecularLight"), term);
    }
}

fn lightmapper_outputs(body: &mut Block, terms: &LightTerms) {
    let mut outputs = Block::new();
    outputs.set(Expr::var("dAtten"), terms.attenuation.clone());
    outputs.set(Expr::var("dLightDirNormW"), terms.light_dir_norm.clone());
    body.push(Stmt::IfDef {
        symbol: LIGHTMAPPER_SYMBOL.to_string(),
        body: outputs,
    });
}
