//! Programmatic construction of syntax trees.
//!
//! There is no parser in this crate, so tests (and tools that generate
//! code) build their programs here. All constructors take `&self`, which
//! lets calls nest: `b.call(b.ident("f"), vec![b.int(1)])`.

use std::cell::{Cell, RefCell};

use odin_types::{BinaryOp, CallingConvention, NodeId, UnaryOp};

use super::*;

pub struct AstBuilder {
    next_id: Cell<usize>,
    file: Cell<FileId>,
    line: Cell<u32>,
    files: RefCell<Vec<AstFile>>,
}

impl Default for AstBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AstBuilder {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(0),
            file: Cell::new(FileId::new(0)),
            line: Cell::new(1),
            files: RefCell::new(Vec::new()),
        }
    }

    // Files

    /// Registers a file. Nodes built afterwards belong to it.
    pub fn file(&self, fullpath: &str) -> FileId {
        self.add_file(fullpath, false)
    }

    /// A file that opted into `#shared_global_scope`.
    pub fn shared_file(&self, fullpath: &str) -> FileId {
        self.add_file(fullpath, true)
    }

    fn add_file(&self, fullpath: &str, is_shared_global_scope: bool) -> FileId {
        let mut files = self.files.borrow_mut();
        let id = FileId::new(files.len());
        files.push(AstFile {
            id,
            fullpath: fullpath.to_owned(),
            source: None,
            decls: Vec::new(),
            is_shared_global_scope,
        });

        self.file.set(id);
        self.line.set(1);
        id
    }

    /// Makes `file` current again.
    pub fn switch_to(&self, file: FileId) {
        self.file.set(file);
    }

    pub fn set_decls(&self, file: FileId, decls: Vec<Stmt>) {
        if let Some(f) = self.files.borrow_mut().get_mut(file.index()) {
            f.decls = decls;
        }
    }

    pub fn set_source(&self, file: FileId, source: &str) {
        if let Some(f) = self.files.borrow_mut().get_mut(file.index()) {
            f.source = Some(source.to_owned());
        }
    }

    /// Positions of nodes built from now on report this line.
    pub fn line(&self, line: u32) {
        self.line.set(line);
    }

    pub fn finish(self, init_file: FileId) -> Program {
        Program {
            files: self.files.into_inner(),
            init_file,
        }
    }

    /// Builds a one-file program named `main.odin`.
    pub fn single_file(self, decls: Vec<Stmt>) -> Program {
        if self.files.borrow().is_empty() {
            self.file("main.odin");
        }
        let init = FileId::new(0);
        self.set_decls(init, decls);
        self.finish(init)
    }

    // Plumbing

    fn next_id(&self) -> NodeId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        NodeId::new(id)
    }

    fn pos(&self) -> TokenPos {
        let id = self.next_id.get();
        TokenPos::new(self.file.get(), self.line.get(), id as u32 + 1, id)
    }

    pub fn name(&self, name: &str) -> Ident {
        Ident {
            pos: self.pos(),
            id: self.next_id(),
            name: name.to_owned(),
        }
    }

    fn expr(&self, kind: ExprKind) -> Expr {
        Expr {
            pos: self.pos(),
            id: self.next_id(),
            kind,
        }
    }

    fn stmt(&self, kind: StmtKind) -> Stmt {
        Stmt {
            pos: self.pos(),
            id: self.next_id(),
            kind,
            state_flags: StmtStateFlags::empty(),
        }
    }

    // Expressions

    pub fn ident(&self, name: &str) -> Expr {
        self.expr(ExprKind::Ident(name.to_owned()))
    }

    pub fn int(&self, i: i128) -> Expr {
        self.expr(ExprKind::Literal(Literal::Integer(i)))
    }

    pub fn float(&self, f: f64) -> Expr {
        self.expr(ExprKind::Literal(Literal::Float(f)))
    }

    pub fn string(&self, s: &str) -> Expr {
        self.expr(ExprKind::Literal(Literal::String(s.to_owned())))
    }

    pub fn rune(&self, c: char) -> Expr {
        self.expr(ExprKind::Literal(Literal::Rune(c)))
    }

    pub fn unary(&self, op: UnaryOp, expr: Expr) -> Expr {
        self.expr(ExprKind::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    pub fn address_of(&self, expr: Expr) -> Expr {
        self.expr(ExprKind::AddressOf(Box::new(expr)))
    }

    pub fn deref(&self, expr: Expr) -> Expr {
        self.expr(ExprKind::Deref(Box::new(expr)))
    }

    pub fn binary(&self, op: BinaryOp, left: Expr, right: Expr) -> Expr {
        self.expr(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn paren(&self, expr: Expr) -> Expr {
        self.expr(ExprKind::Paren(Box::new(expr)))
    }

    pub fn call(&self, callee: Expr, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Call {
            callee: Box::new(callee),
            args,
            ellipsis: false,
        })
    }

    /// `callee(args..)`
    pub fn call_spread(&self, callee: Expr, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Call {
            callee: Box::new(callee),
            args,
            ellipsis: true,
        })
    }

    pub fn selector(&self, expr: Expr, name: &str) -> Expr {
        self.expr(ExprKind::Selector {
            expr: Box::new(expr),
            name: self.name(name),
        })
    }

    pub fn index(&self, expr: Expr, index: Expr) -> Expr {
        self.expr(ExprKind::Index {
            expr: Box::new(expr),
            index: Box::new(index),
        })
    }

    pub fn slice(&self, expr: Expr, low: Option<Expr>, high: Option<Expr>, max: Option<Expr>) -> Expr {
        self.expr(ExprKind::Slice {
            expr: Box::new(expr),
            low: low.map(Box::new),
            high: high.map(Box::new),
            max: max.map(Box::new),
        })
    }

    pub fn compound(&self, ty: Expr, elems: Vec<Expr>) -> Expr {
        self.expr(ExprKind::CompoundLit {
            ty: Some(Box::new(ty)),
            elems,
        })
    }

    pub fn field_value(&self, name: &str, value: Expr) -> Expr {
        self.expr(ExprKind::FieldValue {
            name: self.name(name),
            value: Box::new(value),
        })
    }

    pub fn cast(&self, kind: CastKind, ty: Expr, expr: Expr) -> Expr {
        self.expr(ExprKind::Cast {
            kind,
            ty: Box::new(ty),
            expr: Box::new(expr),
        })
    }

    pub fn proc_lit(&self, ty: Expr, body: Vec<Stmt>) -> Expr {
        self.expr(ExprKind::ProcLit {
            ty: Box::new(ty),
            body: Some(Box::new(self.block(body))),
            tags: ProcTags::empty(),
        })
    }

    // Types

    pub fn pointer_type(&self, elem: Expr) -> Expr {
        self.expr(ExprKind::PointerType(Box::new(elem)))
    }

    pub fn array_type(&self, count: Expr, elem: Expr) -> Expr {
        self.expr(ExprKind::ArrayType {
            count: Some(Box::new(count)),
            elem: Box::new(elem),
        })
    }

    pub fn slice_type(&self, elem: Expr) -> Expr {
        self.expr(ExprKind::ArrayType {
            count: None,
            elem: Box::new(elem),
        })
    }

    pub fn dynamic_array_type(&self, elem: Expr) -> Expr {
        self.expr(ExprKind::DynamicArrayType(Box::new(elem)))
    }

    pub fn vector_type(&self, count: Expr, elem: Expr) -> Expr {
        self.expr(ExprKind::VectorType {
            count: Box::new(count),
            elem: Box::new(elem),
        })
    }

    pub fn field(&self, names: &[&str], ty: Expr) -> FieldDecl {
        FieldDecl {
            names: names.iter().map(|n| self.name(n)).collect(),
            ty,
            is_using: false,
        }
    }

    pub fn using_field(&self, name: &str, ty: Expr) -> FieldDecl {
        FieldDecl {
            names: vec![self.name(name)],
            ty,
            is_using: true,
        }
    }

    pub fn struct_type(&self, fields: Vec<FieldDecl>) -> Expr {
        self.expr(ExprKind::StructType {
            fields,
            is_packed: false,
            is_ordered: false,
        })
    }

    pub fn packed_struct_type(&self, fields: Vec<FieldDecl>) -> Expr {
        self.expr(ExprKind::StructType {
            fields,
            is_packed: true,
            is_ordered: false,
        })
    }

    pub fn union_type(&self, variants: Vec<FieldDecl>) -> Expr {
        self.expr(ExprKind::UnionType(variants))
    }

    pub fn raw_union_type(&self, fields: Vec<FieldDecl>) -> Expr {
        self.expr(ExprKind::RawUnionType(fields))
    }

    pub fn enum_type(&self, base: Option<Expr>, fields: Vec<(&str, Option<Expr>)>) -> Expr {
        let fields = fields
            .into_iter()
            .map(|(name, value)| EnumField {
                name: self.name(name),
                value,
            })
            .collect();

        self.expr(ExprKind::EnumType {
            base: base.map(Box::new),
            fields,
        })
    }

    pub fn proc_type(&self, params: Vec<FieldDecl>, results: Vec<FieldDecl>) -> Expr {
        self.expr(ExprKind::ProcType {
            params,
            results,
            variadic: false,
            calling_convention: CallingConvention::Odin,
        })
    }

    pub fn variadic_proc_type(&self, params: Vec<FieldDecl>, results: Vec<FieldDecl>) -> Expr {
        self.expr(ExprKind::ProcType {
            params,
            results,
            variadic: true,
            calling_convention: CallingConvention::Odin,
        })
    }

    /// An unnamed result of type `ty`.
    pub fn result(&self, ty: Expr) -> FieldDecl {
        FieldDecl {
            names: Vec::new(),
            ty,
            is_using: false,
        }
    }

    // Statements

    pub fn empty(&self) -> Stmt {
        self.stmt(StmtKind::Empty)
    }

    pub fn expr_stmt(&self, expr: Expr) -> Stmt {
        self.stmt(StmtKind::Expr(expr))
    }

    pub fn assign(&self, lhs: Vec<Expr>, rhs: Vec<Expr>) -> Stmt {
        self.stmt(StmtKind::Assign { op: None, lhs, rhs })
    }

    pub fn op_assign(&self, op: BinaryOp, lhs: Expr, rhs: Expr) -> Stmt {
        self.stmt(StmtKind::Assign {
            op: Some(op),
            lhs: vec![lhs],
            rhs: vec![rhs],
        })
    }

    pub fn inc(&self, expr: Expr) -> Stmt {
        self.stmt(StmtKind::IncDec { op: BinaryOp::Add, expr })
    }

    pub fn dec(&self, expr: Expr) -> Stmt {
        self.stmt(StmtKind::IncDec { op: BinaryOp::Sub, expr })
    }

    pub fn block(&self, stmts: Vec<Stmt>) -> Stmt {
        self.stmt(StmtKind::Block(stmts))
    }

    pub fn if_stmt(&self, cond: Expr, then: Vec<Stmt>, otherwise: Option<Stmt>) -> Stmt {
        self.stmt(StmtKind::If {
            init: None,
            cond,
            then: Box::new(self.block(then)),
            otherwise: otherwise.map(Box::new),
        })
    }

    pub fn for_stmt(&self, init: Option<Stmt>, cond: Option<Expr>, post: Option<Stmt>, body: Vec<Stmt>) -> Stmt {
        self.stmt(StmtKind::For {
            init: init.map(Box::new),
            cond,
            post: post.map(Box::new),
            body: Box::new(self.block(body)),
        })
    }

    pub fn case(&self, exprs: Vec<Expr>, body: Vec<Stmt>) -> CaseClause {
        CaseClause {
            pos: self.pos(),
            id: self.next_id(),
            exprs,
            body,
        }
    }

    pub fn match_stmt(&self, tag: Option<Expr>, clauses: Vec<CaseClause>) -> Stmt {
        self.stmt(StmtKind::Match {
            init: None,
            tag,
            clauses,
        })
    }

    pub fn type_match(&self, var: &str, tag: Expr, clauses: Vec<CaseClause>) -> Stmt {
        self.stmt(StmtKind::TypeMatch {
            var: self.name(var),
            tag,
            clauses,
        })
    }

    pub fn defer(&self, stmt: Stmt) -> Stmt {
        self.stmt(StmtKind::Defer(Box::new(stmt)))
    }

    pub fn return_stmt(&self, results: Vec<Expr>) -> Stmt {
        self.stmt(StmtKind::Return(results))
    }

    pub fn branch(&self, kind: BranchKind) -> Stmt {
        self.stmt(StmtKind::Branch(kind))
    }

    pub fn using(&self, exprs: Vec<Expr>) -> Stmt {
        self.stmt(StmtKind::Using(exprs))
    }

    pub fn push_allocator(&self, expr: Expr, body: Vec<Stmt>) -> Stmt {
        self.stmt(StmtKind::PushAllocator {
            expr,
            body: Box::new(self.block(body)),
        })
    }

    pub fn push_context(&self, expr: Expr, body: Vec<Stmt>) -> Stmt {
        self.stmt(StmtKind::PushContext {
            expr,
            body: Box::new(self.block(body)),
        })
    }

    /// Overrides bounds checking for one statement.
    pub fn with_flags(&self, mut stmt: Stmt, flags: StmtStateFlags) -> Stmt {
        stmt.state_flags = flags;
        stmt
    }

    // Declarations

    pub fn var(&self, names: &[&str], ty: Option<Expr>, values: Vec<Expr>) -> Stmt {
        self.stmt(StmtKind::Decl(Decl::Var {
            names: names.iter().map(|n| self.name(n)).collect(),
            ty,
            values,
            is_using: false,
        }))
    }

    pub fn using_var(&self, name: &str, ty: Expr) -> Stmt {
        self.stmt(StmtKind::Decl(Decl::Var {
            names: vec![self.name(name)],
            ty: Some(ty),
            values: Vec::new(),
            is_using: true,
        }))
    }

    pub fn constant(&self, names: &[&str], ty: Option<Expr>, values: Vec<Expr>) -> Stmt {
        self.stmt(StmtKind::Decl(Decl::Const {
            names: names.iter().map(|n| self.name(n)).collect(),
            ty,
            values,
        }))
    }

    pub fn type_decl(&self, name: &str, ty: Expr) -> Stmt {
        self.stmt(StmtKind::Decl(Decl::Type {
            name: self.name(name),
            ty,
        }))
    }

    pub fn proc_decl(&self, name: &str, ty: Expr, body: Vec<Stmt>) -> Stmt {
        self.proc_decl_tagged(name, ty, Some(body), ProcTags::empty())
    }

    pub fn proc_decl_tagged(&self, name: &str, ty: Expr, body: Option<Vec<Stmt>>, tags: ProcTags) -> Stmt {
        let name = self.name(name);
        let body = body.map(|b| Box::new(self.block(b)));
        self.stmt(StmtKind::Decl(Decl::Proc(ProcDecl {
            name,
            ty,
            body,
            tags,
            foreign_library: None,
            foreign_name: None,
            link_name: None,
        })))
    }

    /// `name :: proc(...) #foreign library "foreign_name"`
    pub fn foreign_proc(&self, name: &str, ty: Expr, library: Option<&str>, foreign_name: Option<&str>) -> Stmt {
        let name = self.name(name);
        self.stmt(StmtKind::Decl(Decl::Proc(ProcDecl {
            name,
            ty,
            body: None,
            tags: ProcTags::FOREIGN,
            foreign_library: library.map(|l| self.name(l)),
            foreign_name: foreign_name.map(str::to_owned),
            link_name: None,
        })))
    }

    pub fn import(&self, fullpath: &str, name: Option<&str>) -> Stmt {
        self.import_when(fullpath, name, None)
    }

    pub fn import_when(&self, fullpath: &str, name: Option<&str>, cond: Option<Expr>) -> Stmt {
        self.stmt(StmtKind::Decl(Decl::Import(ImportDecl {
            path: fullpath.to_owned(),
            fullpath: fullpath.to_owned(),
            name: name.map(|n| self.name(n)),
            cond,
            is_load: false,
        })))
    }

    pub fn foreign_library(&self, path: &str, name: Option<&str>, is_system: bool) -> Stmt {
        self.stmt(StmtKind::Decl(Decl::ForeignLibrary(ForeignLibraryDecl {
            path: path.to_owned(),
            name: name.map(|n| self.name(n)),
            is_system,
            cond: None,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_across_files() {
        let b = AstBuilder::new();
        let a = b.file("a.odin");
        let x = b.var(&["x"], Some(b.ident("int")), vec![]);
        let c = b.file("c.odin");
        let y = b.var(&["y"], Some(b.ident("int")), vec![]);
        assert_ne!(x.id, y.id);
        assert_eq!(x.pos.file, a);
        assert_eq!(y.pos.file, c);

        b.set_decls(a, vec![x]);
        b.set_decls(c, vec![y]);
        let program = b.finish(a);
        assert_eq!(program.files.len(), 2);
        assert_eq!(program.init_file().map(|f| f.fullpath.as_str()), Some("a.odin"));
    }
}
