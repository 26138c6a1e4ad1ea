//! Program assembly
//!
//! Stitches expanded light blocks into one lighting program:
//!
//! ```text
//! #define ...            capability and shadow-kind defines
//! #include "..."         helper chunks, sorted
//! uniform ...            per slot, slot order
//! accumulators           dDiffuseLight, lobe accumulators, LTC Fresnel
//! getShadowN / evaluateLightN
//! evaluateLights()       clears accumulators, LTC setup, calls each slot,
//!                        then the clustered loop when enabled
//! ```

use std::collections::BTreeSet;

use crate::emit::{Emitter, ShaderDialect};
use crate::expand::{LightBlock, LIGHTMAPPER_SYMBOL};
use crate::ir::{Block, Expr, Function, GlobalDecl, Ty, UniformDecl};
use crate::key::PermutationKey;
use crate::light::{LitFlags, LitOptions};
use crate::validator::{BlockValidator, SlotIsolationRule};
use crate::variants::ShaderDefine;
use crate::ComposeError;

/// Chunk providing the surface inputs every block reads
pub const SURFACE_INPUTS_CHUNK: &str = "litSurfaceInputsPS";

/// Entry point that evaluates every light
pub const ENTRY_POINT: &str = "evaluateLights";

/// Chunk with the clustered light loop
pub const CLUSTERED_LIGHTS_CHUNK: &str = "clusteredLightPS";

/// Clustered loop called after the per-slot blocks
pub const CLUSTERED_LIGHTS_ENTRY: &str = "addClusteredLights";

/// A composed lighting program, ready for the external compile step
#[derive(Debug, Clone)]
pub struct ComposedShader {
    pub key: PermutationKey,
    pub dialect: ShaderDialect,
    /// Full program text
    pub source: String,
    /// Defines at the head of `source`
    pub defines: Vec<ShaderDefine>,
    /// Included helper chunks in include order
    pub chunks: Vec<&'static str>,
    /// Every uniform and texture the program binds
    pub uniforms: Vec<UniformDecl>,
    pub light_count: usize,
}

impl ComposedShader {
    /// Whether the program binds a uniform or texture of this name
    pub fn binds(&self, name: &str) -> bool {
        self.uniforms.iter().any(|u| u.name == name)
    }
}

/// Accumulator globals enabled by the flags
fn accumulators(flags: LitFlags) -> Vec<GlobalDecl> {
    let mut globals = vec![GlobalDecl::new("dDiffuseLight", Ty::Vec3)];
    if flags.contains(LitFlags::SPECULAR) {
        globals.push(GlobalDecl::new("dSpecularLight", Ty::Vec3));
    }
    if flags.contains(LitFlags::CLEARCOAT) {
        globals.push(GlobalDecl::new("ccSpecularLight", Ty::Vec3));
    }
    if flags.contains(LitFlags::SHEEN) {
        globals.push(GlobalDecl::new("sSpecularLight", Ty::Vec3));
    }
    globals
}

fn ltc_globals(flags: LitFlags) -> Vec<GlobalDecl> {
    let mut globals = Vec::new();
    if !flags.contains(LitFlags::AREA_LIGHTS) {
        return globals;
    }
    if flags.contains(LitFlags::SPECULAR) {
        globals.push(GlobalDecl::new("dLTCSpecFres", Ty::Vec3));
    }
    if flags.contains(LitFlags::CLEARCOAT) {
        globals.push(GlobalDecl::new("ccLTCSpecFres", Ty::Vec3));
    }
    globals
}

fn program_defines(blocks: &[LightBlock], options: &LitOptions) -> Vec<ShaderDefine> {
    let mut defines = vec![ShaderDefine::with_value("LIGHT_COUNT", blocks.len().to_string())];

    let named = [
        (LitFlags::SPECULAR, "LIT_SPECULAR"),
        (LitFlags::CLEARCOAT, "LIT_CLEARCOAT"),
        (LitFlags::SHEEN, "LIT_SHEEN"),
        (LitFlags::IRIDESCENCE, "LIT_IRIDESCENCE"),
        (LitFlags::AREA_LIGHTS, "AREA_LIGHTS"),
    ];
    for (flag, name) in named {
        if options.has(flag) {
            defines.push(ShaderDefine::new(name));
        }
    }
    defines.push(ShaderDefine::with_value(
        "LIT_FRESNEL_MODEL",
        options.fresnel.name().to_uppercase(),
    ));

    let mut kinds: BTreeSet<&str> = blocks
        .iter()
        .filter_map(|b| b.light.shadow.map(|s| s.algorithm.kind()))
        .collect();

    if options.has(LitFlags::CLUSTERED_LIGHTS) {
        defines.push(ShaderDefine::new("LIT_CLUSTERED_LIGHTS"));
        if options.has(LitFlags::CLUSTER_COOKIES) {
            defines.push(ShaderDefine::new("CLUSTER_COOKIES"));
        }
        if options.has(LitFlags::CLUSTER_AREA_LIGHTS) {
            defines.push(ShaderDefine::new("CLUSTER_AREALIGHTS"));
        }
        // resolved options never carry cluster shadows under NO_SHADOW
        if options.has(LitFlags::CLUSTER_SHADOWS) {
            let kind = options.cluster_shadow.kind();
            defines.push(ShaderDefine::new("CLUSTER_SHADOWS"));
            defines.push(ShaderDefine::new(format!("CLUSTER_SHADOW_TYPE_{}", kind)));
            kinds.insert(kind);
        }
    }

    for kind in kinds {
        defines.push(ShaderDefine::new(format!("SHADOW_KIND_{}", kind)));
    }
    if blocks.iter().any(|b| b.light.shadow.map_or(false, |s| s.cascaded)) {
        defines.push(ShaderDefine::new("LIT_SHADOW_CASCADES"));
    }
    if blocks.iter().any(|b| b.light.cookie.is_some()) {
        defines.push(ShaderDefine::new("LIT_COOKIES"));
    }
    defines
}

fn entry_point(blocks: &[LightBlock], options: &LitOptions) -> Function {
    let mut body = Block::new();
    for global in accumulators(options.flags) {
        body.set(
            Expr::var(global.name),
            Expr::Construct(Ty::Vec3, vec![Expr::float(0.0)]),
        );
    }
    if options.has(LitFlags::AREA_LIGHTS) {
        body.eval(Expr::call(
            "calcLTCLightValues",
            ["dGlossiness", "dNormalW", "dViewDirW", "dSpecularity", "ccGlossiness", "ccNormalW", "ccSpecularity"]
                .into_iter()
                .map(Expr::var)
                .collect(),
        ));
    }
    for block in blocks {
        body.eval(Expr::call(block.evaluation.name.clone(), Vec::new()));
    }
    if options.has(LitFlags::CLUSTERED_LIGHTS) {
        body.eval(Expr::call(CLUSTERED_LIGHTS_ENTRY, Vec::new()));
    }
    Function::procedure(ENTRY_POINT, body)
}

/// Printed uniform and function sections of one block
struct PrintedBlock {
    uniforms: String,
    functions: String,
}

fn print_block(block: &LightBlock, dialect: ShaderDialect, comments: bool) -> PrintedBlock {
    let emitter = || {
        let emitter = Emitter::new(dialect);
        if comments {
            emitter
        } else {
            emitter.without_comments()
        }
    };

    let mut uniforms = emitter();
    for decl in &block.uniforms {
        uniforms.uniform(decl);
    }

    let mut functions = emitter();
    for function in block.functions() {
        functions.function(function);
        functions.blank();
    }

    PrintedBlock {
        uniforms: uniforms.finish(),
        functions: functions.finish(),
    }
}

/// Assemble expanded blocks into one program
///
/// Every block's printed text is checked for balanced scopes and for names
/// leaking across slots before it is spliced in.
pub fn assemble(
    blocks: &[LightBlock],
    options: &LitOptions,
    dialect: ShaderDialect,
    key: PermutationKey,
    comments: bool,
) -> Result<ComposedShader, ComposeError> {
    let mut printed = Vec::with_capacity(blocks.len());
    for block in blocks {
        let text = print_block(block, dialect, comments);
        let validator =
            BlockValidator::new().with_rule(Box::new(SlotIsolationRule { slot: block.slot }));
        let checked = format!("{}{}", text.uniforms, text.functions);
        if let Err(e) = validator.validate(&checked) {
            log::error!("Light block {} failed self-check: {}", block.slot, e);
            return Err(ComposeError::InternalConsistency {
                slot: block.slot,
                detail: e.to_string(),
            });
        }
        printed.push(text);
    }

    let defines = program_defines(blocks, options);
    let mut chunks = vec![SURFACE_INPUTS_CHUNK];
    let mut helpers: BTreeSet<&'static str> = blocks.iter().flat_map(|b| b.chunks.iter().copied()).collect();
    if options.has(LitFlags::CLUSTERED_LIGHTS) {
        helpers.insert(CLUSTERED_LIGHTS_CHUNK);
    }
    chunks.extend(helpers);

    let mut out = Emitter::new(dialect);
    if comments {
        out.line(&format!("// lighting for {}", key));
    }
    for define in &defines {
        out.define(define);
    }
    out.blank();
    for chunk in &chunks {
        out.include(chunk);
    }
    out.blank();

    let mut source = out.finish();
    for text in &printed {
        source.push_str(&text.uniforms);
    }
    source.push('\n');

    let mut out = Emitter::new(dialect);
    for global in accumulators(options.flags).iter().chain(ltc_globals(options.flags).iter()) {
        out.global(global);
    }
    out.line(&format!("#ifdef {}", LIGHTMAPPER_SYMBOL));
    out.global(&GlobalDecl::new("dAtten", Ty::Float));
    out.global(&GlobalDecl::new("dLightDirNormW", Ty::Vec3));
    out.line("#endif");
    out.blank();
    source.push_str(&out.finish());

    for text in &printed {
        source.push_str(&text.functions);
    }

    let mut out = Emitter::new(dialect);
    out.function(&entry_point(blocks, options));
    source.push_str(&out.finish());

    Ok(ComposedShader {
        key,
        dialect,
        source,
        defines,
        chunks,
        uniforms: blocks.iter().flat_map(|b| b.uniforms.iter().cloned()).collect(),
        light_count: blocks.len(),
    })
}
