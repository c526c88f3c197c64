//! AST and closed type universe for the Koi language.
//!
//! Every node the parser hands to the compiler is owned (`Vec`/`Box`, no
//! arena lifetimes): Pass 1.6 deep-clones function bodies while
//! monomorphizing, which is far simpler against an owned
//! tree than an arena-allocated one with borrowed lifetimes.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;

pub mod span;
pub use span::SourceSpan;

/// Root of a parsed translation unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Program {
    pub uses: Vec<Use>,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Use {
    pub path: Vec<String>,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Item {
    Function(Function),
    Struct(StructDef),
    Enum(EnumDef),
    Perk(PerkDef),
    PerkImpl(PerkImpl),
    Extension(Extension),
    Const(ConstDef),
}

/// Generic type parameter with optional perk (trait) bounds: `T: Hashable + Eq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeParam {
    pub name: String,
    pub bounds: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

/// A function. Every function implicitly returns `Result<T, E>` (the language definition
/// Invariant 2); `err_type` is `None` when the declaration omits an error
/// type, in which case the default `StdError` applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub is_pub: bool,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub err_type: Option<Type>,
    pub body: Block,
    /// Set for extension/perk-impl method bodies; carries the implicit
    /// `self` receiver type. `None` for free functions.
    pub receiver: Option<Type>,
}

impl Function {
    /// The function's error type, defaulting to `StdError` (the canonical-naming invariant).
    pub fn effective_err_type(&self) -> Type {
        self.err_type.clone().unwrap_or_else(Type::std_error)
    }

    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDef {
    pub name: String,
    pub is_pub: bool,
    pub type_params: Vec<TypeParam>,
    pub fields: Vec<Field>,
}

impl StructDef {
    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumVariant {
    pub name: String,
    pub associated_types: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: String,
    pub is_pub: bool,
    pub type_params: Vec<TypeParam>,
    pub variants: Vec<EnumVariant>,
}

impl EnumDef {
    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }
}

/// A perk (trait): required method signatures only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerkMethodSig {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Type,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerkDef {
    pub name: String,
    pub methods: Vec<PerkMethodSig>,
}

/// `extend T with Perk { ... }` — explicit perk implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerkImpl {
    pub target_type: Type,
    pub perk_name: String,
    pub methods: Vec<Function>,
}

/// `extend T { ... }` — plain extension methods, not tied to a perk.
/// `type_params` is non-empty for a generic extension (e.g. `extend List<T>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extension {
    pub type_params: Vec<TypeParam>,
    pub target_type: Type,
    pub methods: Vec<Function>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstDef {
    pub name: String,
    pub ty: Option<Type>,
    pub value: Expr,
}

/// Shared vs. exclusive borrow mode (the language definition Glossary: peek/poke).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BorrowMode {
    Peek,
    Poke,
}

/// The closed type universe.
///
/// `Struct`/`Enum` here are *references by name* plus already-resolved
/// generic arguments; the field/variant layout itself lives in
/// `StructTable`/`EnumTable` in `koi-compiler`, keyed by that name. This
/// avoids inlining a struct's full field list into every occurrence of its
/// type (which would blow up recursively for container types) while still
/// satisfying Invariant 3: one cache entry per `(base, args)` tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    String,
    /// The unit type `~`.
    Blank,
    Stdin,
    Stdout,
    Stderr,
    FileStream,

    Array(Box<Type>, usize),
    DynamicArray(Box<Type>),

    Struct {
        name: String,
        generic_args: Vec<Type>,
    },
    Enum {
        name: String,
        generic_args: Vec<Type>,
    },

    Reference {
        referenced: Box<Type>,
        mode: BorrowMode,
    },
    /// Internal pointer type; never user-written, only produced inside
    /// built-in generic collection lowering.
    Pointer(Box<Type>),
    Iterator(Box<Type>),

    /// Pre-monomorphization reference to a generic template, e.g.
    /// `Result<i32>` before Pass 1.6 resolves it to `Type::Enum`.
    GenericRef {
        base_name: String,
        type_args: Vec<Type>,
    },
    /// A generic template's own type parameter, e.g. `T` inside `fn id<T>`.
    TypeParameter(String),

    /// Semantic convenience: resolves to `Type::Enum{name:
    /// "Result", ...}` in the enum table once monomorphized.
    Result {
        ok: Box<Type>,
        err: Box<Type>,
    },

    /// Name-only placeholder for a struct/enum reference the AST builder
    /// has not yet resolved. Must not survive Pass 0/1.6 except as a type
    /// error (the canonical-naming invariant).
    Unknown(String),
}

impl Type {
    pub fn std_error() -> Type {
        Type::Struct {
            name: "StdError".to_string(),
            generic_args: Vec::new(),
        }
    }

    pub fn result_of(ok: Type, err: Type) -> Type {
        Type::Result {
            ok: Box::new(ok),
            err: Box::new(err),
        }
    }

    pub fn maybe_of(inner: Type) -> Type {
        Type::GenericRef {
            base_name: "Maybe".to_string(),
            type_args: vec![inner],
        }
    }

    pub fn own_of(inner: Type) -> Type {
        Type::GenericRef {
            base_name: "Own".to_string(),
            type_args: vec![inner],
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Type::I8
                | Type::I16
                | Type::I32
                | Type::I64
                | Type::U8
                | Type::U16
                | Type::U32
                | Type::U64
                | Type::F32
                | Type::F64
        )
    }

    pub fn is_signed_int(&self) -> bool {
        matches!(self, Type::I8 | Type::I16 | Type::I32 | Type::I64)
    }

    pub fn is_unsigned_int(&self) -> bool {
        matches!(self, Type::U8 | Type::U16 | Type::U32 | Type::U64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }

    pub fn is_integer(&self) -> bool {
        self.is_signed_int() || self.is_unsigned_int()
    }

    /// Whether `Type::Unknown`/`Type::GenericRef`/`Type::TypeParameter`
    /// remain anywhere in this type (the canonical-naming invariant).
    pub fn contains_unresolved(&self) -> bool {
        match self {
            Type::Unknown(_) | Type::GenericRef { .. } | Type::TypeParameter(_) => true,
            Type::Array(inner, _) | Type::DynamicArray(inner) => inner.contains_unresolved(),
            Type::Struct { generic_args, .. } | Type::Enum { generic_args, .. } => {
                generic_args.iter().any(Type::contains_unresolved)
            }
            Type::Reference { referenced, .. } | Type::Pointer(referenced) => {
                referenced.contains_unresolved()
            }
            Type::Iterator(inner) => inner.contains_unresolved(),
            Type::Result { ok, err } => ok.contains_unresolved() || err.contains_unresolved(),
            _ => false,
        }
    }
}

pub type Block = Vec<Statement>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Let {
        name: String,
        ty: Option<Type>,
        value: Expr,
    },
    /// `x := v` or `obj.f := v` (field rebind).
    Rebind {
        target: Expr,
        value: Expr,
    },
    Return(Expr),
    If {
        cond: Expr,
        then_block: Block,
        elif_branches: Vec<(Expr, Block)>,
        else_block: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    Foreach {
        var_name: String,
        item_type: Option<Type>,
        iterable: Expr,
        body: Block,
    },
    Match {
        scrutinee: Expr,
        arms: Vec<MatchArm>,
    },
    Expr(Expr),
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    Wildcard,
    Binding(String),
    EnumVariant {
        enum_name: Option<String>,
        variant: String,
        bindings: Vec<Pattern>,
    },
    Own(Box<Pattern>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    Positional(Expr),
    Named { name: String, value: Expr },
}

impl Arg {
    pub fn value(&self) -> &Expr {
        match self {
            Arg::Positional(expr) => expr,
            Arg::Named { value, .. } => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FStringPart {
    Literal(String),
    Expr(Box<Expr>),
}

/// Annotation attached to a `expr??` node by Pass 2, read
/// verbatim by Pass 4 so IR emission never re-derives it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryAnnotation {
    pub inner_type: Type,
    pub ok_tag: u32,
    pub ok_type: Type,
    pub err_tag: u32,
    pub err_type: Type,
    pub enclosing_return_type: Type,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    IntLit(i64),
    FloatLit(f64),
    BoolLit(bool),
    StringLit(String),
    /// The unit literal `~`.
    BlankLit,
    Identifier(String),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Arg>,
    },
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Arg>,
    },
    FieldAccess {
        receiver: Box<Expr>,
        field: String,
    },
    Index {
        receiver: Box<Expr>,
        index: Box<Expr>,
    },
    /// `Point(x, y)` or `Point(x: 1, y: 2)`. Named-form args are rewritten
    /// to positional order in place during Pass 2.
    StructConstruct {
        name: String,
        args: Vec<Arg>,
    },
    /// `EnumName.Variant(args)`; `enum_name` is filled in by Pass 2 once the
    /// receiver's type is known (e.g. bare `Some(x)` with an expected type).
    EnumConstruct {
        enum_name: Option<String>,
        variant: String,
        args: Vec<Expr>,
    },
    Reference {
        mode: BorrowMode,
        expr: Box<Expr>,
    },
    Cast {
        expr: Box<Expr>,
        ty: Type,
    },
    /// `expr??`.
    Try {
        expr: Box<Expr>,
    },
    ArrayLit(Vec<Expr>),
    FString(Vec<FStringPart>),
}

/// An expression node with a slot for Pass 2's resolved-type annotation
/// ("AST annotation vs separate side-table" — this repo takes
/// the AST-annotation option, matching the teacher's `ASTCodeGen`, which
/// reads concrete types off table entries rather than re-inferring).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    #[serde(skip)]
    pub resolved_type: RefCell<Option<Type>>,
    #[serde(skip)]
    pub try_annotation: RefCell<Option<TryAnnotation>>,
    /// Set by the type checker on an `ExprKind::Call` whose callee resolved
    /// to a generic function: the mangled name of the concrete
    /// instantiation codegen should call instead of the template name.
    #[serde(skip)]
    pub mangled_callee: RefCell<Option<String>>,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Expr {
            kind,
            resolved_type: RefCell::new(None),
            try_annotation: RefCell::new(None),
            mangled_callee: RefCell::new(None),
        }
    }

    pub fn resolved_type(&self) -> Option<Type> {
        self.resolved_type.borrow().clone()
    }

    pub fn set_resolved_type(&self, ty: Type) {
        *self.resolved_type.borrow_mut() = Some(ty);
    }

    pub fn mangled_callee(&self) -> Option<String> {
        self.mangled_callee.borrow().clone()
    }

    pub fn set_mangled_callee(&self, name: String) {
        *self.mangled_callee.borrow_mut() = Some(name);
    }
}

// Convenience constructors used pervasively by the parser and by hand-built
// test ASTs (the parser is an external collaborator; compiler
// pass tests build `Program`s directly rather than through source text).
impl Expr {
    pub fn int(v: i64) -> Self {
        Expr::new(ExprKind::IntLit(v))
    }
    pub fn float(v: f64) -> Self {
        Expr::new(ExprKind::FloatLit(v))
    }
    pub fn boolean(v: bool) -> Self {
        Expr::new(ExprKind::BoolLit(v))
    }
    pub fn string(v: impl Into<String>) -> Self {
        Expr::new(ExprKind::StringLit(v.into()))
    }
    pub fn blank() -> Self {
        Expr::new(ExprKind::BlankLit)
    }
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::new(ExprKind::Identifier(name.into()))
    }
    pub fn call(callee: Expr, args: Vec<Arg>) -> Self {
        Expr::new(ExprKind::Call {
            callee: Box::new(callee),
            args,
        })
    }
    pub fn method_call(receiver: Expr, method: impl Into<String>, args: Vec<Arg>) -> Self {
        Expr::new(ExprKind::MethodCall {
            receiver: Box::new(receiver),
            method: method.into(),
            args,
        })
    }
    pub fn enum_construct(
        enum_name: Option<String>,
        variant: impl Into<String>,
        args: Vec<Expr>,
    ) -> Self {
        Expr::new(ExprKind::EnumConstruct {
            enum_name,
            variant: variant.into(),
            args,
        })
    }
    pub fn ok(value: Expr) -> Self {
        Expr::enum_construct(Some("Result".to_string()), "Ok", vec![value])
    }
    pub fn err(value: Expr) -> Self {
        Expr::enum_construct(Some("Result".to_string()), "Err", vec![value])
    }
    pub fn try_propagate(expr: Expr) -> Self {
        Expr::new(ExprKind::Try {
            expr: Box::new(expr),
        })
    }
    pub fn reference(mode: BorrowMode, expr: Expr) -> Self {
        Expr::new(ExprKind::Reference {
            mode,
            expr: Box::new(expr),
        })
    }
    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::new(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_unresolved_detects_generic_ref() {
        let ty = Type::DynamicArray(Box::new(Type::GenericRef {
            base_name: "Own".to_string(),
            type_args: vec![Type::Unknown("Node".to_string())],
        }));
        assert!(ty.contains_unresolved());
    }

    #[test]
    fn concrete_struct_type_has_no_unresolved_parts() {
        let ty = Type::Struct {
            name: "Pair_i32_i32".to_string(),
            generic_args: vec![],
        };
        assert!(!ty.contains_unresolved());
    }

    #[test]
    fn expr_clone_preserves_resolved_type_annotation() {
        let e = Expr::int(42);
        e.set_resolved_type(Type::I32);
        let cloned = e.clone();
        assert_eq!(cloned.resolved_type(), Some(Type::I32));
    }

    #[test]
    fn default_err_type_is_std_error() {
        let f = Function {
            name: "f".to_string(),
            is_pub: false,
            type_params: vec![],
            params: vec![],
            return_type: Type::I32,
            err_type: None,
            body: vec![],
            receiver: None,
        };
        assert_eq!(f.effective_err_type(), Type::std_error());
    }
}
