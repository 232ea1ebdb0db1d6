//! Programs for the checker and IR builder tests.

use crate::{
    ast::{build::AstBuilder, Program, Stmt},
    checker::{check_parsed_files, CheckerInfo},
};
use odin_types::BuildContext;

/// The declarations the compiler expects from `core/runtime.odin`.
pub(crate) fn runtime_prelude(b: &AstBuilder) -> Vec<Stmt> {
    let int = || b.ident("int");
    let ti_ptr = || b.pointer_type(b.ident("Type_Info"));
    let sized = |extra: Vec<_>| {
        let mut fields = vec![b.field(&["size", "align"], int())];
        fields.extend(extra);
        b.struct_type(fields)
    };
    let members = || b.slice_type(b.ident("Type_Info_Member"));

    let variants = [
        ("Named", sized(vec![b.field(&["name"], b.ident("string")), b.field(&["base"], ti_ptr())])),
        ("Integer", sized(vec![b.field(&["signed"], b.ident("bool"))])),
        ("Float", sized(vec![])),
        ("String", sized(vec![])),
        ("Boolean", sized(vec![])),
        ("Any", sized(vec![])),
        ("Pointer", sized(vec![b.field(&["elem"], ti_ptr())])),
        (
            "Procedure",
            sized(vec![
                b.field(&["params", "results"], ti_ptr()),
                b.field(&["variadic"], b.ident("bool")),
            ]),
        ),
        (
            "Array",
            sized(vec![b.field(&["elem"], ti_ptr()), b.field(&["elem_size", "count"], int())]),
        ),
        ("DynamicArray", sized(vec![b.field(&["elem"], ti_ptr()), b.field(&["elem_size"], int())])),
        ("Slice", sized(vec![b.field(&["elem"], ti_ptr()), b.field(&["elem_size"], int())])),
        (
            "Vector",
            sized(vec![b.field(&["elem"], ti_ptr()), b.field(&["elem_size", "count"], int())]),
        ),
        ("Tuple", sized(vec![b.field(&["members"], members())])),
        (
            "Struct",
            sized(vec![
                b.field(&["members"], members()),
                b.field(&["packed", "ordered"], b.ident("bool")),
            ]),
        ),
        ("Union", sized(vec![])),
        ("RawUnion", sized(vec![b.field(&["members"], members())])),
        ("Enum", sized(vec![b.field(&["base"], ti_ptr())])),
    ];

    let mut decls = vec![b.type_decl(
        "Type_Info_Member",
        b.struct_type(vec![
            b.field(&["name"], b.ident("string")),
            b.field(&["type_info"], ti_ptr()),
            b.field(&["offset"], int()),
        ]),
    )];

    let mut union_variants = Vec::new();
    for (name, ty) in variants {
        let type_name = format!("Type_Info_{}", name);
        decls.push(b.type_decl(&type_name, ty));
        union_variants.push(b.field(&[name], b.ident(&type_name)));
    }
    decls.push(b.type_decl("Type_Info", b.union_type(union_variants)));

    decls.push(b.type_decl(
        "Allocator",
        b.struct_type(vec![b.field(&["procedure", "data"], b.ident("rawptr"))]),
    ));
    decls.push(b.type_decl(
        "Context",
        b.struct_type(vec![
            b.field(&["thread_id"], int()),
            b.field(&["allocator"], b.ident("Allocator")),
            b.field(&["user_data"], b.ident("rawptr")),
            b.field(&["user_index"], int()),
        ]),
    ));
    decls.push(b.var(&["__context"], Some(b.ident("Context")), vec![]));

    let rawptr = || b.ident("rawptr");
    decls.push(b.proc_decl(
        "alloc_align",
        b.proc_type(vec![b.field(&["size", "alignment"], int())], vec![b.result(rawptr())]),
        vec![b.return_stmt(vec![b.ident("nil")])],
    ));
    decls.push(b.proc_decl(
        "free_ptr",
        b.proc_type(vec![b.field(&["ptr"], rawptr())], vec![]),
        vec![],
    ));
    decls.push(b.proc_decl(
        "__mem_copy",
        b.proc_type(vec![b.field(&["dst", "src"], rawptr()), b.field(&["len"], int())], vec![b.result(rawptr())]),
        vec![b.return_stmt(vec![b.ident("dst")])],
    ));
    decls.push(b.proc_decl(
        "__dynamic_array_reserve",
        b.proc_type(
            vec![b.field(&["array_"], rawptr()), b.field(&["elem_size", "elem_align", "capacity"], int())],
            vec![b.result(b.ident("bool"))],
        ),
        vec![b.return_stmt(vec![b.ident("true")])],
    ));
    decls.push(b.proc_decl(
        "__dynamic_array_append",
        b.proc_type(
            vec![
                b.field(&["array_"], rawptr()),
                b.field(&["elem_size", "elem_align"], int()),
                b.field(&["items"], rawptr()),
                b.field(&["item_count"], int()),
            ],
            vec![b.result(int())],
        ),
        vec![b.return_stmt(vec![b.int(0)])],
    ));
    decls.push(b.proc_decl(
        "__assert",
        b.proc_type(
            vec![
                b.field(&["file"], b.ident("string")),
                b.field(&["line", "column"], int()),
                b.field(&["msg"], b.ident("string")),
            ],
            vec![b.result(b.ident("bool"))],
        ),
        vec![b.return_stmt(vec![b.ident("false")])],
    ));
    decls.push(b.proc_decl(
        "__panic",
        b.proc_type(
            vec![
                b.field(&["file"], b.ident("string")),
                b.field(&["line", "column"], int()),
                b.field(&["msg"], b.ident("string")),
            ],
            vec![],
        ),
        vec![],
    ));

    decls
}

/// A two-file program: the runtime, shared into the global scope, and
/// `main.odin` holding whatever `build` returns.
pub(crate) fn program_with(build: impl FnOnce(&AstBuilder) -> Vec<Stmt>) -> Program {
    let b = AstBuilder::new();

    let runtime = b.shared_file("core/runtime.odin");
    let prelude = runtime_prelude(&b);
    b.set_decls(runtime, prelude);

    let main = b.file("main.odin");
    let decls = build(&b);
    b.set_decls(main, decls);

    b.finish(main)
}

/// `main :: proc() { body }`
pub(crate) fn main_proc(b: &AstBuilder, body: Vec<Stmt>) -> Stmt {
    b.proc_decl("main", b.proc_type(vec![], vec![]), body)
}

pub(crate) fn check(program: &Program) -> CheckerInfo<'_> {
    match check_parsed_files(program, BuildContext::default()) {
        Ok(info) => info,
        Err(err) => panic!("compiler error: {}", err),
    }
}

pub(crate) fn error_messages(info: &CheckerInfo<'_>) -> Vec<String> {
    info.diagnostics.errors().map(|d| d.message.clone()).collect()
}

pub(crate) fn warning_messages(info: &CheckerInfo<'_>) -> Vec<String> {
    info.diagnostics
        .iter()
        .filter(|d| d.level == crate::errors::Level::Warning)
        .map(|d| d.message.clone())
        .collect()
}
