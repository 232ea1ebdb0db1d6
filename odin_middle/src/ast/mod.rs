//! The syntax tree handed over by the parser.
//!
//! Every expression, statement and identifier carries a [`NodeId`] that is
//! unique within a [`Program`]; the checker's tables are keyed by it.

pub mod build;

use bitflags::bitflags;
use std::fmt;

use odin_types::{BinaryOp, CallingConvention, NodeId, UnaryOp};

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FileId(u32);

impl FileId {
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct TokenPos {
    pub file: FileId,
    pub line: u32,
    pub column: u32,
    /// Byte offset into the file's source.
    pub offset: usize,
}

impl TokenPos {
    pub const fn new(file: FileId, line: u32, column: u32, offset: usize) -> Self {
        Self {
            file,
            line,
            column,
            offset,
        }
    }
}

bitflags! {
    /// Per-statement overrides of the procedure's bounds checking.
    pub struct StmtStateFlags: u8 {
        const BOUNDS_CHECK = 1 << 0;
        const NO_BOUNDS_CHECK = 1 << 1;
    }
}

bitflags! {
    pub struct ProcTags: u16 {
        const FOREIGN = 1 << 0;
        const EXPORT = 1 << 1;
        const LINK_NAME = 1 << 2;
        const INLINE = 1 << 3;
        const NO_INLINE = 1 << 4;
        const BOUNDS_CHECK = 1 << 5;
        const NO_BOUNDS_CHECK = 1 << 6;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ident {
    pub id: NodeId,
    pub name: String,
    pub pos: TokenPos,
}

impl Ident {
    pub fn is_blank(&self) -> bool {
        self.name == "_"
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Integer(i128),
    Float(f64),
    String(String),
    Rune(char),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CastKind {
    Cast,
    Transmute,
    DownCast,
    UnionCast,
}

impl CastKind {
    pub fn keyword(self) -> &'static str {
        match self {
            CastKind::Cast => "cast",
            CastKind::Transmute => "transmute",
            CastKind::DownCast => "down_cast",
            CastKind::UnionCast => "union_cast",
        }
    }
}

/// One line of a struct, union, raw union or parameter list:
/// `a, b: T` or `using a: T`.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDecl {
    pub names: Vec<Ident>,
    pub ty: Expr,
    pub is_using: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumField {
    pub name: Ident,
    pub value: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub pos: TokenPos,
    pub kind: ExprKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Ident(String),
    Literal(Literal),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    AddressOf(Box<Expr>),
    Deref(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Paren(Box<Expr>),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        /// The last argument is spread with `..`.
        ellipsis: bool,
    },
    Selector {
        expr: Box<Expr>,
        name: Ident,
    },
    Index {
        expr: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        expr: Box<Expr>,
        low: Option<Box<Expr>>,
        high: Option<Box<Expr>>,
        max: Option<Box<Expr>>,
    },
    CompoundLit {
        ty: Option<Box<Expr>>,
        elems: Vec<Expr>,
    },
    /// `name = value` inside a compound literal.
    FieldValue {
        name: Ident,
        value: Box<Expr>,
    },
    Cast {
        kind: CastKind,
        ty: Box<Expr>,
        expr: Box<Expr>,
    },
    ProcLit {
        ty: Box<Expr>,
        body: Option<Box<Stmt>>,
        tags: ProcTags,
    },

    // Type expressions
    PointerType(Box<Expr>),
    /// `[N]T`, or `[]T` without a count.
    ArrayType {
        count: Option<Box<Expr>>,
        elem: Box<Expr>,
    },
    DynamicArrayType(Box<Expr>),
    VectorType {
        count: Box<Expr>,
        elem: Box<Expr>,
    },
    StructType {
        fields: Vec<FieldDecl>,
        is_packed: bool,
        is_ordered: bool,
    },
    UnionType(Vec<FieldDecl>),
    RawUnionType(Vec<FieldDecl>),
    EnumType {
        base: Option<Box<Expr>>,
        fields: Vec<EnumField>,
    },
    ProcType {
        params: Vec<FieldDecl>,
        results: Vec<FieldDecl>,
        /// The last parameter is `..T`.
        variadic: bool,
        calling_convention: CallingConvention,
    },
}

impl Expr {
    /// Strips any number of parentheses.
    pub fn unparen(&self) -> &Expr {
        match &self.kind {
            ExprKind::Paren(inner) => inner.unparen(),
            _ => self,
        }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_type_expr(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::PointerType(_)
                | ExprKind::ArrayType { .. }
                | ExprKind::DynamicArrayType(_)
                | ExprKind::VectorType { .. }
                | ExprKind::StructType { .. }
                | ExprKind::UnionType(_)
                | ExprKind::RawUnionType(_)
                | ExprKind::EnumType { .. }
                | ExprKind::ProcType { .. }
        )
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |exprs: &[Expr]| exprs.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        let opt = |expr: &Option<Box<Expr>>| expr.as_ref().map_or_else(String::new, |e| e.to_string());

        match &self.kind {
            ExprKind::Ident(name) => f.write_str(name),
            ExprKind::Literal(Literal::Integer(i)) => write!(f, "{}", i),
            ExprKind::Literal(Literal::Float(x)) => write!(f, "{:?}", x),
            ExprKind::Literal(Literal::String(s)) => write!(f, "{:?}", s),
            ExprKind::Literal(Literal::Rune(c)) => write!(f, "{:?}", c),
            ExprKind::Unary { op, expr } => write!(f, "{}{}", op, expr),
            ExprKind::AddressOf(expr) => write!(f, "&{}", expr),
            ExprKind::Deref(expr) => write!(f, "{}^", expr),
            ExprKind::Binary { op, left, right } => write!(f, "{} {} {}", left, op, right),
            ExprKind::Paren(expr) => write!(f, "({})", expr),
            ExprKind::Call {
                callee,
                args,
                ellipsis,
            } => write!(f, "{}({}{})", callee, list(args), if *ellipsis { ".." } else { "" }),
            ExprKind::Selector { expr, name } => write!(f, "{}.{}", expr, name.name),
            ExprKind::Index { expr, index } => write!(f, "{}[{}]", expr, index),
            ExprKind::Slice { expr, low, high, max } => match max {
                Some(max) => write!(f, "{}[{}:{}:{}]", expr, opt(low), opt(high), max),
                None => write!(f, "{}[{}:{}]", expr, opt(low), opt(high)),
            },
            ExprKind::CompoundLit { ty, elems } => write!(f, "{}{{{}}}", opt(ty), list(elems)),
            ExprKind::FieldValue { name, value } => write!(f, "{} = {}", name.name, value),
            ExprKind::Cast { kind, ty, expr } => write!(f, "{}({}, {})", kind.keyword(), ty, expr),
            ExprKind::ProcLit { ty, .. } => write!(f, "{} {{...}}", ty),
            ExprKind::PointerType(elem) => write!(f, "^{}", elem),
            ExprKind::ArrayType { count, elem } => write!(f, "[{}]{}", opt(count), elem),
            ExprKind::DynamicArrayType(elem) => write!(f, "[dynamic]{}", elem),
            ExprKind::VectorType { count, elem } => write!(f, "[vector {}]{}", count, elem),
            ExprKind::StructType { .. } => f.write_str("struct {...}"),
            ExprKind::UnionType(_) => f.write_str("union {...}"),
            ExprKind::RawUnionType(_) => f.write_str("raw_union {...}"),
            ExprKind::EnumType { .. } => f.write_str("enum {...}"),
            ExprKind::ProcType { .. } => f.write_str("proc(...)"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BranchKind {
    Break,
    Continue,
    Fallthrough,
}

impl BranchKind {
    pub fn keyword(self) -> &'static str {
        match self {
            BranchKind::Break => "break",
            BranchKind::Continue => "continue",
            BranchKind::Fallthrough => "fallthrough",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stmt {
    pub id: NodeId,
    pub pos: TokenPos,
    pub kind: StmtKind,
    pub state_flags: StmtStateFlags,
}

/// `case a, b:` or, without expressions, `default:`.
#[derive(Clone, Debug, PartialEq)]
pub struct CaseClause {
    pub id: NodeId,
    pub pos: TokenPos,
    pub exprs: Vec<Expr>,
    pub body: Vec<Stmt>,
}

impl CaseClause {
    pub fn is_default(&self) -> bool {
        self.exprs.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    Empty,
    Expr(Expr),
    /// `lhs = rhs`, or `lhs op= rhs` when `op` is set.
    Assign {
        op: Option<BinaryOp>,
        lhs: Vec<Expr>,
        rhs: Vec<Expr>,
    },
    /// `x++` (`Add`) or `x--` (`Sub`).
    IncDec {
        op: BinaryOp,
        expr: Expr,
    },
    Block(Vec<Stmt>),
    If {
        init: Option<Box<Stmt>>,
        cond: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
        body: Box<Stmt>,
    },
    Match {
        init: Option<Box<Stmt>>,
        tag: Option<Expr>,
        clauses: Vec<CaseClause>,
    },
    /// `match type var in tag { case T: ... }`
    TypeMatch {
        var: Ident,
        tag: Expr,
        clauses: Vec<CaseClause>,
    },
    Defer(Box<Stmt>),
    Return(Vec<Expr>),
    Branch(BranchKind),
    Using(Vec<Expr>),
    PushAllocator {
        expr: Expr,
        body: Box<Stmt>,
    },
    PushContext {
        expr: Expr,
        body: Box<Stmt>,
    },
    Decl(Decl),
}

impl Stmt {
    pub fn is_decl(&self) -> bool {
        matches!(self.kind, StmtKind::Decl(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProcDecl {
    pub name: Ident,
    /// Always an [`ExprKind::ProcType`].
    pub ty: Expr,
    pub body: Option<Box<Stmt>>,
    pub tags: ProcTags,
    pub foreign_library: Option<Ident>,
    pub foreign_name: Option<String>,
    pub link_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportDecl {
    pub path: String,
    /// The resolved path of the imported file.
    pub fullpath: String,
    /// `None` derives a name from the file name; `.` imports every entity
    /// into the importing scope.
    pub name: Option<Ident>,
    pub cond: Option<Expr>,
    /// `#load`: like a `.` import, but the entities are re-exported.
    pub is_load: bool,
}

impl ImportDecl {
    pub fn is_dot(&self) -> bool {
        self.name.as_ref().map_or(false, |n| n.name == ".")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForeignLibraryDecl {
    pub path: String,
    pub name: Option<Ident>,
    pub is_system: bool,
    pub cond: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Decl {
    Var {
        names: Vec<Ident>,
        ty: Option<Expr>,
        values: Vec<Expr>,
        is_using: bool,
    },
    Const {
        names: Vec<Ident>,
        ty: Option<Expr>,
        values: Vec<Expr>,
    },
    Type {
        name: Ident,
        ty: Expr,
    },
    Proc(ProcDecl),
    Import(ImportDecl),
    ForeignLibrary(ForeignLibraryDecl),
}

#[derive(Clone, Debug, PartialEq)]
pub struct AstFile {
    pub id: FileId,
    pub fullpath: String,
    pub source: Option<String>,
    pub decls: Vec<Stmt>,
    pub is_shared_global_scope: bool,
}

impl AstFile {
    /// The file name without directories or extension.
    pub fn stem(&self) -> &str {
        file_stem(&self.fullpath)
    }

    pub fn dir(&self) -> &str {
        match self.fullpath.rfind(|c| c == '/' || c == '\\') {
            Some(i) => &self.fullpath[..=i],
            None => "",
        }
    }
}

pub fn file_stem(path: &str) -> &str {
    let name = match path.rfind(|c| c == '/' || c == '\\') {
        Some(i) => &path[i + 1..],
        None => path,
    };

    match name.rfind('.') {
        Some(0) | None => name,
        Some(i) => &name[..i],
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub files: Vec<AstFile>,
    pub init_file: FileId,
}

impl Program {
    pub fn file(&self, id: FileId) -> Option<&AstFile> {
        self.files.get(id.index())
    }

    pub fn init_file(&self) -> Option<&AstFile> {
        self.file(self.init_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stems() {
        assert_eq!(file_stem("/core/fmt.odin"), "fmt");
        assert_eq!(file_stem("C:\\odin\\os.odin"), "os");
        assert_eq!(file_stem("main"), "main");
        assert_eq!(file_stem("a.b.odin"), "a.b");
    }

    #[test]
    fn expr_printing() {
        let b = build::AstBuilder::new();
        b.file("main.odin");
        let e = b.binary(BinaryOp::Add, b.ident("x"), b.call(b.ident("f"), vec![b.int(2)]));
        assert_eq!(e.to_string(), "x + f(2)");
        let s = b.slice(b.ident("a"), None, Some(b.int(3)), None);
        assert_eq!(s.to_string(), "a[:3]");
    }
}
