//! Shading code IR
//!
//! A small expression/statement tree that light blocks are built from. Every
//! scope is a nested [`Block`], so a tree can never describe unbalanced
//! braces or conditional-compilation sections. The tree is dialect neutral;
//! [`crate::emit`] prints it.

use std::collections::BTreeSet;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Value types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ty {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
    /// Fixed-size array of 4x4 matrices
    Mat4Array(u32),
}

/// Texture bindings; each one is printed together with its sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    /// 2D depth map sampled with hardware comparison
    Shadow2D,
    /// Cube depth map sampled with hardware comparison
    ShadowCube,
    /// 2D depth map read as raw depth (blocker search)
    Depth2D,
    /// Cube depth map read as raw depth (blocker search)
    DepthCube,
    /// 2D float texture (variance moments, cookies)
    Color2D,
    /// Cube float texture (omni cookies)
    ColorCube,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Greater,
}

impl BinOp {
    /// Operator token, identical in both dialects
    pub fn token(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Greater => ">",
        }
    }

    /// Binding strength, higher binds tighter
    pub fn precedence(self) -> u8 {
        match self {
            Self::Greater => 1,
            Self::Add | Self::Sub => 2,
            Self::Mul | Self::Div => 3,
        }
    }
}

/// Compound assignment operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Mul,
}

impl AssignOp {
    /// Operator token
    pub fn token(self) -> &'static str {
        match self {
            Self::Set => "=",
            Self::Add => "+=",
            Self::Mul => "*=",
        }
    }
}

/// Expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Float(f32),
    Int(i32),
    /// Local, parameter or module-level variable
    Var(String),
    /// Uniform value
    Uniform(String),
    /// Texture argument (texture plus its sampler)
    Texture(String),
    /// Type constructor, e.g. `vec3(x)`
    Construct(Ty, Vec<Expr>),
    /// Function call
    Call(String, Vec<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    /// Component access, e.g. `.xy`
    Swizzle(Box<Expr>, &'static str),
    /// Array element access
    Index(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Variable reference
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    /// Function call
    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call(name.into(), args)
    }

    /// Float literal
    pub fn float(value: f32) -> Self {
        Self::Float(value)
    }

    /// Component access
    pub fn swizzle(self, components: &'static str) -> Self {
        Self::Swizzle(Box::new(self), components)
    }

    /// Array element access
    pub fn index(self, index: Expr) -> Self {
        Self::Index(Box::new(self), Box::new(index))
    }

    /// `self > rhs`
    pub fn gt(self, rhs: Expr) -> Self {
        Self::Binary(BinOp::Greater, Box::new(self), Box::new(rhs))
    }

    fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    /// Whether the expression references `name` as a variable or uniform
    pub fn references(&self, name: &str) -> bool {
        match self {
            Self::Var(n) | Self::Uniform(n) | Self::Texture(n) => n == name,
            Self::Float(_) | Self::Int(_) => false,
            Self::Construct(_, args) | Self::Call(_, args) => args.iter().any(|a| a.references(name)),
            Self::Binary(_, l, r) | Self::Index(l, r) => l.references(name) || r.references(name),
            Self::Neg(e) | Self::Swizzle(e, _) => e.references(name),
        }
    }

    /// Collect the names of every function called in this expression
    pub fn collect_calls<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Call(name, args) => {
                out.push(name);
                for a in args {
                    a.collect_calls(out);
                }
            }
            Self::Construct(_, args) => {
                for a in args {
                    a.collect_calls(out);
                }
            }
            Self::Binary(_, l, r) | Self::Index(l, r) => {
                l.collect_calls(out);
                r.collect_calls(out);
            }
            Self::Neg(e) | Self::Swizzle(e, _) => e.collect_calls(out),
            Self::Float(_) | Self::Int(_) | Self::Var(_) | Self::Uniform(_) | Self::Texture(_) => {}
        }
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        Expr::binary(BinOp::Add, self, rhs)
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        Expr::binary(BinOp::Sub, self, rhs)
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        Expr::binary(BinOp::Mul, self, rhs)
    }
}

impl Div for Expr {
    type Output = Expr;

    fn div(self, rhs: Expr) -> Expr {
        Expr::binary(BinOp::Div, self, rhs)
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

/// Statements
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Comment(String),
    /// Immutable binding
    Let { name: String, ty: Ty, value: Expr },
    /// Mutable binding
    Var { name: String, ty: Ty, value: Expr },
    Assign { target: Expr, op: AssignOp, value: Expr },
    /// Runtime branch
    If { cond: Expr, body: Block },
    /// Conditional compilation section
    IfDef { symbol: String, body: Block },
    /// Expression evaluated for its side effects
    Eval(Expr),
    Return(Expr),
}

/// Sequence of statements forming one scope
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

impl Block {
    /// Empty block
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a statement
    pub fn push(&mut self, stmt: Stmt) {
        self.stmts.push(stmt);
    }

    /// Append a comment line
    pub fn comment(&mut self, text: impl Into<String>) {
        self.push(Stmt::Comment(text.into()));
    }

    /// `let name: ty = value;`
    pub fn let_(&mut self, name: impl Into<String>, ty: Ty, value: Expr) -> Expr {
        let name = name.into();
        self.push(Stmt::Let { name: name.clone(), ty, value });
        Expr::Var(name)
    }

    /// `var name: ty = value;`
    pub fn var(&mut self, name: impl Into<String>, ty: Ty, value: Expr) -> Expr {
        let name = name.into();
        self.push(Stmt::Var { name: name.clone(), ty, value });
        Expr::Var(name)
    }

    /// `target = value;`
    pub fn set(&mut self, target: Expr, value: Expr) {
        self.push(Stmt::Assign { target, op: AssignOp::Set, value });
    }

    /// `target += value;`
    pub fn add_assign(&mut self, target: Expr, value: Expr) {
        self.push(Stmt::Assign { target, op: AssignOp::Add, value });
    }

    /// `target *= value;`
    pub fn mul_assign(&mut self, target: Expr, value: Expr) {
        self.push(Stmt::Assign { target, op: AssignOp::Mul, value });
    }

    /// Evaluate a call for its side effects
    pub fn eval(&mut self, expr: Expr) {
        self.push(Stmt::Eval(expr));
    }

    /// Append all statements of another block
    pub fn extend(&mut self, other: Block) {
        self.stmts.extend(other.stmts);
    }

    /// Whether the block has no statements
    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// Visit every statement, including nested ones, in program order
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Stmt)) {
        for stmt in &self.stmts {
            visit(stmt);
            match stmt {
                Stmt::If { body, .. } | Stmt::IfDef { body, .. } => body.walk(visit),
                _ => {}
            }
        }
    }

    /// Names of every function called in the block, in program order
    pub fn calls(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |stmt| match stmt {
            Stmt::Let { value, .. } | Stmt::Var { value, .. } | Stmt::Eval(value) | Stmt::Return(value) => {
                value.collect_calls(&mut out)
            }
            Stmt::Assign { target, value, .. } => {
                target.collect_calls(&mut out);
                value.collect_calls(&mut out);
            }
            Stmt::If { cond, .. } => cond.collect_calls(&mut out),
            Stmt::Comment(_) | Stmt::IfDef { .. } => {}
        });
        out
    }
}

/// Function parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Ty,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Ty) -> Self {
        Self { name: name.into(), ty }
    }
}

/// Function definition
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    /// `None` for functions returning nothing
    pub ret: Option<Ty>,
    pub body: Block,
}

impl Function {
    /// Function without parameters or return value
    pub fn procedure(name: impl Into<String>, body: Block) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            ret: None,
            body,
        }
    }
}

/// Type of a uniform declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformTy {
    Value(Ty),
    Texture(TextureKind),
}

/// Uniform or texture declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniformDecl {
    pub name: String,
    pub ty: UniformTy,
}

/// Module-level mutable variable
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GlobalDecl {
    pub name: String,
    pub ty: Ty,
}

impl GlobalDecl {
    pub fn new(name: impl Into<String>, ty: Ty) -> Self {
        Self { name: name.into(), ty }
    }
}

/// Uniforms and helper chunks referenced by one light slot
///
/// Every name handed out is qualified with the slot index, so blocks for
/// different slots never collide.
#[derive(Debug, Clone)]
pub struct SlotScope {
    slot: usize,
    uniforms: Vec<UniformDecl>,
    chunks: BTreeSet<&'static str>,
}

impl SlotScope {
    pub fn new(slot: usize) -> Self {
        Self {
            slot,
            uniforms: Vec::new(),
            chunks: BTreeSet::new(),
        }
    }

    /// Slot index
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Slot-qualified name, e.g. `light2_color`
    pub fn name(&self, field: &str) -> String {
        format!("light{}_{}", self.slot, field)
    }

    /// Reference a value uniform, declaring it on first use
    pub fn uniform(&mut self, field: &str, ty: Ty) -> Expr {
        let name = self.name(field);
        self.declare(&name, UniformTy::Value(ty));
        Expr::Uniform(name)
    }

    /// Reference a texture, declaring it on first use
    pub fn texture(&mut self, field: &str, kind: TextureKind) -> Expr {
        let name = self.name(field);
        self.declare(&name, UniformTy::Texture(kind));
        Expr::Texture(name)
    }

    fn declare(&mut self, name: &str, ty: UniformTy) {
        if !self.uniforms.iter().any(|u| u.name == name) {
            self.uniforms.push(UniformDecl { name: name.to_string(), ty });
        }
    }

    /// Record a helper chunk the generated code calls into
    pub fn require(&mut self, chunk: &'static str) {
        self.chunks.insert(chunk);
    }

    /// Declared uniforms in first-use order
    pub fn uniforms(&self) -> &[UniformDecl] {
        &self.uniforms
    }

    /// Required helper chunks
    pub fn chunks(&self) -> &BTreeSet<&'static str> {
        &self.chunks
    }

    pub fn into_parts(self) -> (Vec<UniformDecl>, BTreeSet<&'static str>) {
        (self.uniforms, self.chunks)
    }
}
