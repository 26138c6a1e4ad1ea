//! Dialect printers for the shading IR
//!
//! The same tree prints as GLSL or as WGSL. Differences handled here:
//! type names, declaration syntax, uniform access (`uniform.` prefix in
//! WGSL) and texture arguments (WGSL passes the sampler explicitly).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ir::{
    Block, Expr, Function, GlobalDecl, Stmt, TextureKind, Ty, UniformDecl, UniformTy,
};
use crate::variants::ShaderDefine;

/// Target shading language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderDialect {
    /// GLSL ES 3.0 style source
    Glsl,
    /// WGSL with engine preprocessor extensions
    Wgsl,
}

impl ShaderDialect {
    /// Name used in permutation keys
    pub fn name(self) -> &'static str {
        match self {
            Self::Glsl => "glsl",
            Self::Wgsl => "wgsl",
        }
    }
}

impl Default for ShaderDialect {
    fn default() -> Self {
        Self::Glsl
    }
}

impl fmt::Display for ShaderDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const INDENT: &str = "    ";

/// Accumulates printed source for one dialect
pub struct Emitter {
    dialect: ShaderDialect,
    out: String,
    depth: usize,
    comments: bool,
}

impl Emitter {
    /// Create an empty emitter
    pub fn new(dialect: ShaderDialect) -> Self {
        Self {
            dialect,
            out: String::new(),
            depth: 0,
            comments: true,
        }
    }

    /// Drop comment statements from the output
    pub fn without_comments(mut self) -> Self {
        self.comments = false;
        self
    }

    /// Target dialect
    pub fn dialect(&self) -> ShaderDialect {
        self.dialect
    }

    /// Take the printed source
    pub fn finish(self) -> String {
        self.out
    }

    /// Raw line at the current indentation
    pub fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// Empty line
    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// `#define` directive
    pub fn define(&mut self, define: &ShaderDefine) {
        self.line(&define.to_directive());
    }

    /// `#include` directive for an external chunk
    pub fn include(&mut self, chunk: &str) {
        self.line(&format!("#include \"{}\"", chunk));
    }

    /// Uniform or texture declaration
    pub fn uniform(&mut self, decl: &UniformDecl) {
        match (self.dialect, decl.ty) {
            (ShaderDialect::Glsl, UniformTy::Value(ty)) => {
                let line = format!("uniform {};", glsl_declarator(ty, &decl.name));
                self.line(&line);
            }
            (ShaderDialect::Wgsl, UniformTy::Value(ty)) => {
                let line = format!("uniform {}: {};", decl.name, wgsl_type(ty));
                self.line(&line);
            }
            (ShaderDialect::Glsl, UniformTy::Texture(kind)) => {
                let line = format!("uniform {} {};", glsl_sampler(kind), decl.name);
                self.line(&line);
            }
            (ShaderDialect::Wgsl, UniformTy::Texture(kind)) => {
                let (texture, sampler) = wgsl_texture(kind);
                let texture_line = format!("var {}: {};", decl.name, texture);
                let sampler_line = format!("var {}Sampler: {};", decl.name, sampler);
                self.line(&texture_line);
                self.line(&sampler_line);
            }
        }
    }

    /// Module-level mutable variable
    pub fn global(&mut self, decl: &GlobalDecl) {
        let line = match self.dialect {
            ShaderDialect::Glsl => format!("{};", glsl_declarator(decl.ty, &decl.name)),
            ShaderDialect::Wgsl => format!("var<private> {}: {};", decl.name, wgsl_type(decl.ty)),
        };
        self.line(&line);
    }

    /// Function definition
    pub fn function(&mut self, function: &Function) {
        let header = match self.dialect {
            ShaderDialect::Glsl => {
                let params: Vec<String> = function
                    .params
                    .iter()
                    .map(|p| glsl_declarator(p.ty, &p.name))
                    .collect();
                let ret = function.ret.map(glsl_type).unwrap_or_else(|| "void".to_string());
                format!("{} {}({}) {{", ret, function.name, params.join(", "))
            }
            ShaderDialect::Wgsl => {
                let params: Vec<String> = function
                    .params
                    .iter()
                    .map(|p| format!("{}: {}", p.name, wgsl_type(p.ty)))
                    .collect();
                match function.ret {
                    Some(ret) => format!(
                        "fn {}({}) -> {} {{",
                        function.name,
                        params.join(", "),
                        wgsl_type(ret)
                    ),
                    None => format!("fn {}({}) {{", function.name, params.join(", ")),
                }
            }
        };
        self.line(&header);
        self.block(&function.body);
        self.line("}");
    }

    /// Statements of a block, one level deeper
    pub fn block(&mut self, block: &Block) {
        self.depth += 1;
        for stmt in &block.stmts {
            self.stmt(stmt);
        }
        self.depth -= 1;
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Comment(text) => {
                if self.comments {
                    self.line(&format!("// {}", text));
                }
            }
            Stmt::Let { name, ty, value } => {
                let value = self.expr(value);
                let line = match self.dialect {
                    ShaderDialect::Glsl => format!("{} = {};", glsl_declarator(*ty, name), value),
                    ShaderDialect::Wgsl => format!("let {}: {} = {};", name, wgsl_type(*ty), value),
                };
                self.line(&line);
            }
            Stmt::Var { name, ty, value } => {
                let value = self.expr(value);
                let line = match self.dialect {
                    ShaderDialect::Glsl => format!("{} = {};", glsl_declarator(*ty, name), value),
                    ShaderDialect::Wgsl => format!("var {}: {} = {};", name, wgsl_type(*ty), value),
                };
                self.line(&line);
            }
            Stmt::Assign { target, op, value } => {
                let line = format!("{} {} {};", self.expr(target), op.token(), self.expr(value));
                self.line(&line);
            }
            Stmt::If { cond, body } => {
                let line = format!("if ({}) {{", self.expr(cond));
                self.line(&line);
                self.block(body);
                self.line("}");
            }
            Stmt::IfDef { symbol, body } => {
                self.line(&format!("#ifdef {}", symbol));
                for stmt in &body.stmts {
                    self.stmt(stmt);
                }
                self.line("#endif");
            }
            Stmt::Eval(value) => {
                let line = format!("{};", self.expr(value));
                self.line(&line);
            }
            Stmt::Return(value) => {
                let line = format!("return {};", self.expr(value));
                self.line(&line);
            }
        }
    }

    /// Print an expression
    pub fn expr(&self, expr: &Expr) -> String {
        match expr {
            Expr::Float(v) => float_literal(*v),
            Expr::Int(v) => v.to_string(),
            Expr::Var(name) => name.clone(),
            Expr::Uniform(name) => match self.dialect {
                ShaderDialect::Glsl => name.clone(),
                ShaderDialect::Wgsl => format!("uniform.{}", name),
            },
            Expr::Texture(name) => match self.dialect {
                ShaderDialect::Glsl => name.clone(),
                ShaderDialect::Wgsl => format!("{}, {}Sampler", name, name),
            },
            Expr::Construct(ty, args) => {
                let ty = match self.dialect {
                    ShaderDialect::Glsl => glsl_type(*ty),
                    ShaderDialect::Wgsl => wgsl_type(*ty),
                };
                format!("{}({})", ty, self.args(args))
            }
            Expr::Call(name, args) => format!("{}({})", name, self.args(args)),
            Expr::Binary(op, lhs, rhs) => {
                let prec = op.precedence();
                let lhs = self.operand(lhs, prec, false);
                let rhs = self.operand(rhs, prec, true);
                format!("{} {} {}", lhs, op.token(), rhs)
            }
            Expr::Neg(inner) => format!("-{}", self.operand(inner, u8::MAX, false)),
            Expr::Swizzle(inner, components) => {
                format!("{}.{}", self.operand(inner, u8::MAX, false), components)
            }
            Expr::Index(array, index) => {
                format!("{}[{}]", self.operand(array, u8::MAX, false), self.expr(index))
            }
        }
    }

    fn args(&self, args: &[Expr]) -> String {
        args.iter().map(|a| self.expr(a)).collect::<Vec<_>>().join(", ")
    }

    /// Print an operand, parenthesized when it binds looser than its parent
    fn operand(&self, expr: &Expr, parent: u8, right: bool) -> String {
        let own = match expr {
            Expr::Binary(op, ..) => op.precedence(),
            Expr::Neg(_) => 4,
            _ => u8::MAX,
        };
        let printed = self.expr(expr);
        if own < parent || (right && own == parent) {
            format!("({})", printed)
        } else {
            printed
        }
    }
}

/// Float literal that always carries a decimal point
pub fn float_literal(value: f32) -> String {
    let text = format!("{}", value);
    if text.contains('.') || text.contains("inf") || text.contains("NaN") {
        text
    } else {
        format!("{}.0", text)
    }
}

fn glsl_type(ty: Ty) -> String {
    match ty {
        Ty::Float => "float".into(),
        Ty::Int => "int".into(),
        Ty::Vec2 => "vec2".into(),
        Ty::Vec3 => "vec3".into(),
        Ty::Vec4 => "vec4".into(),
        Ty::Mat3 => "mat3".into(),
        Ty::Mat4 => "mat4".into(),
        Ty::Mat4Array(len) => format!("mat4[{}]", len),
    }
}

/// GLSL puts array extents after the declared name
fn glsl_declarator(ty: Ty, name: &str) -> String {
    match ty {
        Ty::Mat4Array(len) => format!("mat4 {}[{}]", name, len),
        other => format!("{} {}", glsl_type(other), name),
    }
}

fn wgsl_type(ty: Ty) -> String {
    match ty {
        Ty::Float => "f32".into(),
        Ty::Int => "i32".into(),
        Ty::Vec2 => "vec2f".into(),
        Ty::Vec3 => "vec3f".into(),
        Ty::Vec4 => "vec4f".into(),
        Ty::Mat3 => "mat3x3f".into(),
        Ty::Mat4 => "mat4x4f".into(),
        Ty::Mat4Array(len) => format!("array<mat4x4f, {}>", len),
    }
}

fn glsl_sampler(kind: TextureKind) -> &'static str {
    match kind {
        TextureKind::Shadow2D => "sampler2DShadow",
        TextureKind::ShadowCube => "samplerCubeShadow",
        TextureKind::Depth2D | TextureKind::Color2D => "sampler2D",
        TextureKind::DepthCube | TextureKind::ColorCube => "samplerCube",
    }
}

fn wgsl_texture(kind: TextureKind) -> (&'static str, &'static str) {
    match kind {
        TextureKind::Shadow2D => ("texture_depth_2d", "sampler_comparison"),
        TextureKind::ShadowCube => ("texture_depth_cube", "sampler_comparison"),
        TextureKind::Depth2D => ("texture_depth_2d", "sampler"),
        TextureKind::DepthCube => ("texture_depth_cube", "sampler"),
        TextureKind::Color2D => ("texture_2d<f32>", "sampler"),
        TextureKind::ColorCube => ("texture_cube<f32>", "sampler"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Param;

    fn sample_function() -> Function {
        let mut body = Block::new();
        let atten = body.var("attenuation", Ty::Float, Expr::float(1.0));
        body.mul_assign(
            atten.clone(),
            Expr::call("getFalloffLinear", vec![Expr::Uniform("light0_radius".into()), Expr::var("lightDirW")]),
        );
        body.push(Stmt::Return(atten));
        Function {
            name: "falloff0".into(),
            params: vec![Param::new("lightDirW", Ty::Vec3)],
            ret: Some(Ty::Float),
            body,
        }
    }

    #[test]
    fn test_glsl_function() {
        let mut emitter = Emitter::new(ShaderDialect::Glsl);
        emitter.function(&sample_function());
        let source = emitter.finish();

        assert!(source.contains("float falloff0(vec3 lightDirW) {"));
        assert!(source.contains("float attenuation = 1.0;"));
        assert!(source.contains("attenuation *= getFalloffLinear(light0_radius, lightDirW);"));
    }

    #[test]
    fn test_wgsl_function() {
        let mut emitter = Emitter::new(ShaderDialect::Wgsl);
        emitter.function(&sample_function());
        let source = emitter.finish();

        assert!(source.contains("fn falloff0(lightDirW: vec3f) -> f32 {"));
        assert!(source.contains("var attenuation: f32 = 1.0;"));
        assert!(source.contains("getFalloffLinear(uniform.light0_radius, lightDirW)"));
    }

    #[test]
    fn test_precedence_parentheses() {
        let emitter = Emitter::new(ShaderDialect::Glsl);
        let a = Expr::var("a");
        let b = Expr::var("b");
        let c = Expr::var("c");

        assert_eq!(emitter.expr(&((a.clone() + b.clone()) * c.clone())), "(a + b) * c");
        assert_eq!(emitter.expr(&(a.clone() * b.clone() + c.clone())), "a * b + c");
        assert_eq!(emitter.expr(&(a.clone() - (b.clone() - c.clone()))), "a - (b - c)");
        assert_eq!(emitter.expr(&(a + b).swizzle("xy")), "(a + b).xy");
    }

    #[test]
    fn test_texture_declarations() {
        let decl = UniformDecl {
            name: "light0_shadowMap".into(),
            ty: UniformTy::Texture(TextureKind::Shadow2D),
        };

        let mut glsl = Emitter::new(ShaderDialect::Glsl);
        glsl.uniform(&decl);
        assert_eq!(glsl.finish(), "uniform sampler2DShadow light0_shadowMap;\n");

        let mut wgsl = Emitter::new(ShaderDialect::Wgsl);
        wgsl.uniform(&decl);
        let source = wgsl.finish();
        assert!(source.contains("var light0_shadowMap: texture_depth_2d;"));
        assert!(source.contains("var light0_shadowMapSampler: sampler_comparison;"));
    }

    #[test]
    fn test_array_uniforms() {
        let decl = UniformDecl {
            name: "light0_shadowMatrixPalette".into(),
            ty: UniformTy::Value(Ty::Mat4Array(4)),
        };

        let mut glsl = Emitter::new(ShaderDialect::Glsl);
        glsl.uniform(&decl);
        assert_eq!(glsl.finish(), "uniform mat4 light0_shadowMatrixPalette[4];\n");

        let mut wgsl = Emitter::new(ShaderDialect::Wgsl);
        wgsl.uniform(&decl);
        assert_eq!(wgsl.finish(), "uniform light0_shadowMatrixPalette: array<mat4x4f, 4>;\n");
    }

    #[test]
    fn test_float_literals() {
        assert_eq!(float_literal(1.0), "1.0");
        assert_eq!(float_literal(5.54), "5.54");
        assert_eq!(float_literal(0.00001), "0.00001");
        assert_eq!(float_literal(16.0), "16.0");
    }
}
