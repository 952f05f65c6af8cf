//! DAISY abstract syntax tree.
//!
//! Both concrete surfaces construct these nodes; nothing downstream of the
//! parser knows which surface a construct was written in.

use crate::span::Span;

/// Parser-assigned id used to key per-expression side tables.
pub type ExprId = u32;

#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct TypeParam {
    pub name: String,
    pub bounds: Vec<String>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub type_ref: TypeRef,
    pub span: Span,
}

/// A surface-level type reference, possibly generic (`Result<int, int>`).
#[derive(Debug, Clone)]
pub struct TypeRef {
    pub name: String,
    pub args: Vec<TypeRef>,
    pub span: Span,
}

impl TypeRef {
    pub fn named(name: impl Into<String>, span: Span) -> Self {
        Self { name: name.into(), args: Vec::new(), span }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<Param>,
    pub return_type: TypeRef,
    pub body: Vec<Stmt>,
    pub is_public: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ExternFunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: TypeRef,
    pub is_public: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct StructField {
    pub name: String,
    pub type_ref: TypeRef,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub fields: Vec<StructField>,
    pub is_public: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct EnumCase {
    pub name: String,
    pub payload: Option<TypeRef>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub cases: Vec<EnumCase>,
    pub is_public: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct TraitMethod {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: TypeRef,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct TraitDef {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub methods: Vec<TraitMethod>,
    pub is_public: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ImplDef {
    pub trait_name: Option<String>,
    pub for_type: TypeRef,
    pub methods: Vec<FunctionDef>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Import {
    pub module: String,
    pub alias: Option<String>,
    pub is_use: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Pattern {
    Wildcard {
        span: Span,
    },
    Literal {
        value: Expr,
    },
    Bind {
        name: String,
        span: Span,
    },
    Struct {
        name: String,
        fields: Vec<Pattern>,
        span: Span,
    },
    /// `Enum.Case`, `Enum.Case(binding)` or `Enum.Case(pattern)`.
    EnumVariant {
        enum_name: String,
        case_name: String,
        payload: Option<Box<Pattern>>,
        binding: Option<String>,
        span: Span,
    },
}

impl Pattern {
    pub fn span(&self) -> Span {
        match self {
            Pattern::Wildcard { span }
            | Pattern::Bind { span, .. }
            | Pattern::Struct { span, .. }
            | Pattern::EnumVariant { span, .. } => *span,
            Pattern::Literal { value } => value.span,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Stmt {
    /// `let X [: T] = E` ≡ `X를 E로 설정한다`; shadowing re-binds.
    Let {
        name: String,
        ty: Option<TypeRef>,
        init: Expr,
        span: Span,
    },
    /// Field assignment: `set X.f = E`.
    Assign {
        target: Expr,
        value: Expr,
        span: Span,
    },
    /// `add V to X` ≡ `X에 V를 더한다`.
    AddAssign {
        target: Expr,
        value: Expr,
        span: Span,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
        span: Span,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    /// `repeat N:` ≡ `N번 반복한다:` — the bound is always explicit.
    Repeat {
        count: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    Match {
        scrutinee: Expr,
        arms: Vec<MatchArm>,
        else_body: Option<Vec<Stmt>>,
        span: Span,
    },
    Print {
        value: Expr,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Break {
        span: Span,
    },
    Continue {
        span: Span,
    },
    /// `release R` ≡ `R을 해제한다`.
    Release {
        target: Expr,
        span: Span,
    },
    /// `unsafe "reason":` — justification required.
    Unsafe {
        reason: Option<String>,
        body: Vec<Stmt>,
        span: Span,
    },
    Func(FunctionDef),
    Extern(ExternFunctionDef),
    Struct(StructDef),
    Enum(EnumDef),
    Trait(TraitDef),
    Impl(ImplDef),
    Import(Import),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Let { span, .. }
            | Stmt::Assign { span, .. }
            | Stmt::AddAssign { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::Repeat { span, .. }
            | Stmt::Match { span, .. }
            | Stmt::Print { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Break { span }
            | Stmt::Continue { span }
            | Stmt::Release { span, .. }
            | Stmt::Unsafe { span, .. } => *span,
            Stmt::Func(f) => f.span,
            Stmt::Extern(e) => e.span,
            Stmt::Struct(s) => s.span,
            Stmt::Enum(e) => e.span,
            Stmt::Trait(t) => t.span,
            Stmt::Impl(i) => i.span,
            Stmt::Import(i) => i.span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl BinOp {
    pub fn is_comparison(&self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub id: ExprId,
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Int(i64),
    Str(String),
    Bool(bool),
    Name(String),
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    Member {
        value: Box<Expr>,
        name: String,
    },
    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnOp,
        value: Box<Expr>,
    },
    /// Short-circuit `and` / `or`.
    Logical {
        left: Box<Expr>,
        op: LogicalOp,
        right: Box<Expr>,
    },
    Try {
        value: Box<Expr>,
    },
    Move {
        value: Box<Expr>,
    },
    Copy {
        value: Box<Expr>,
    },
    /// Whole-value borrow: `borrow [mut] E`.
    Borrow {
        value: Box<Expr>,
        mutable: bool,
    },
    /// `buffer(N)` ≡ `...를 N바이트로 생성한다`.
    BufferCreate {
        size: Box<Expr>,
    },
    /// `borrow [mut] B[A..C]` ≡ `...를 B의 A부터 C까지로 빌려온다(...)`.
    BorrowRange {
        buffer: Box<Expr>,
        start: Box<Expr>,
        end: Box<Expr>,
        mutable: bool,
    },
}

impl Expr {
    /// The plain name behind this expression, if it is one.
    pub fn as_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Name(name) => Some(name),
            _ => None,
        }
    }
}
