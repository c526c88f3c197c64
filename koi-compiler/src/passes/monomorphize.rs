//! Pass 1.6: monomorphization.

use crate::mangling::{canonical_name, mangle_function, type_name};
use crate::passes::instantiate::InstantiationSet;
use crate::tables::{EnumEntry, FunctionEntry, StructEntry, SymbolTables};
use dashmap::DashSet;
use koi_ast::{Block, EnumVariant, Expr, ExprKind, Field, Function, Statement, Type};
use koi_diagnostics::{error_codes, Diagnostic, DiagnosticEngine, Span};
use std::collections::HashMap;

type Bindings = HashMap<String, Type>;

/// Substitution is memoized by canonical name (the canonical-naming invariant); this
/// also breaks recursion for recursive generics ("Recursive
/// generics") by returning the cached partial entry when re-entered.
/// `DashSet` rather than `HashSet`: the monomorphization worklist is a
/// natural fit for a future work-stealing driver, and the insert-returns-
/// false-if-present guard below is exactly `DashSet`'s API.
#[derive(Default)]
struct MonoCache {
    structs_in_progress: DashSet<String>,
    enums_in_progress: DashSet<String>,
    functions_done: DashSet<String>,
}

pub fn run(
    program: &mut koi_ast::Program,
    tables: &mut SymbolTables,
    instantiations: &InstantiationSet,
    diagnostics: &mut DiagnosticEngine,
) {
    let mut cache = MonoCache::default();

    let mut type_worklist: Vec<(String, Vec<Type>)> =
        instantiations.type_instantiations.values().cloned().collect();
    while let Some((base, args)) = type_worklist.pop() {
        monomorphize_type_template(&base, &args, tables, &mut cache, &mut type_worklist, diagnostics);
    }

    let mut fn_worklist: Vec<(String, Vec<Type>)> =
        instantiations.function_instantiations.values().cloned().collect();
    while let Some((base, args)) = fn_worklist.pop() {
        monomorphize_function_template(&base, &args, tables, &mut cache, &mut fn_worklist, diagnostics);
    }

    program.items.extend(
        tables
            .monomorphized_functions
            .iter()
            .cloned()
            .map(koi_ast::Item::Function),
    );
}

fn monomorphize_type_template(
    base: &str,
    args: &[Type],
    tables: &mut SymbolTables,
    cache: &mut MonoCache,
    worklist: &mut Vec<(String, Vec<Type>)>,
    diagnostics: &mut DiagnosticEngine,
) {
    let concrete_name = canonical_name(base, args);
    if tables.structs.contains_key(&concrete_name) || tables.enums.contains_key(&concrete_name) {
        return;
    }

    if let Some(template) = tables.generic_structs.get(base).cloned() {
        if !check_arity(base, &template.type_params, args, diagnostics) {
            return;
        }
        if !cache.structs_in_progress.insert(concrete_name.clone()) {
            return;
        }
        let bindings: Bindings = template
            .type_params
            .iter()
            .zip(args.iter())
            .map(|(p, a)| (p.name.clone(), a.clone()))
            .collect();

        for (param, arg) in template.type_params.iter().zip(args.iter()) {
            check_bounds(param, arg, tables, diagnostics);
        }

        let fields = template
            .def
            .fields
            .iter()
            .map(|f| Field {
                name: f.name.clone(),
                ty: substitute_type(&f.ty, &bindings, worklist, tables),
            })
            .collect();

        tables.structs.insert(
            concrete_name,
            StructEntry {
                def: koi_ast::StructDef {
                    name: base.to_string(),
                    is_pub: template.def.is_pub,
                    type_params: vec![],
                    fields,
                },
                is_pub: template.def.is_pub,
            },
        );
        return;
    }

    if let Some(template) = tables.generic_enums.get(base).cloned() {
        if !check_arity(base, &template.type_params, args, diagnostics) {
            return;
        }
        if !cache.enums_in_progress.insert(concrete_name.clone()) {
            return;
        }
        let bindings: Bindings = template
            .type_params
            .iter()
            .zip(args.iter())
            .map(|(p, a)| (p.name.clone(), a.clone()))
            .collect();

        for (param, arg) in template.type_params.iter().zip(args.iter()) {
            check_bounds(param, arg, tables, diagnostics);
        }

        let variants = template
            .def
            .variants
            .iter()
            .map(|v| EnumVariant {
                name: v.name.clone(),
                associated_types: v
                    .associated_types
                    .iter()
                    .map(|t| substitute_type(t, &bindings, worklist, tables))
                    .collect(),
            })
            .collect();

        tables.enums.insert(
            concrete_name,
            EnumEntry {
                def: koi_ast::EnumDef {
                    name: base.to_string(),
                    is_pub: template.def.is_pub,
                    type_params: vec![],
                    variants,
                },
                is_pub: template.def.is_pub,
            },
        );
    }
}

fn check_arity(
    base: &str,
    type_params: &[koi_ast::TypeParam],
    args: &[Type],
    diagnostics: &mut DiagnosticEngine,
) -> bool {
    if type_params.len() != args.len() {
        diagnostics.emit(Diagnostic::error(
            error_codes::GENERIC_ARITY_MISMATCH,
            format!(
                "`{base}` expects {} type argument(s), found {}",
                type_params.len(),
                args.len()
            ),
            Span::unknown(),
        ));
        false
    } else {
        true
    }
}

/// Verifies a perk bound (`T: Hashable + Eq`) is satisfied by looking up
/// the perk-implementation table for `arg`'s canonical name (
/// "Constraint checking").
fn check_bounds(
    param: &koi_ast::TypeParam,
    arg: &Type,
    tables: &SymbolTables,
    diagnostics: &mut DiagnosticEngine,
) {
    let arg_name = type_name(arg);
    for bound in &param.bounds {
        let satisfied = tables.perk_impls.contains_key(&(arg_name.clone(), bound.clone()))
            || is_builtin_bound_satisfied(bound, arg);
        if !satisfied {
            diagnostics.emit(Diagnostic::error(
                error_codes::TRAIT_BOUNDS_NOT_MET,
                format!("type `{arg_name}` does not implement perk `{bound}`"),
                Span::unknown(),
            ));
        }
    }
}

fn is_builtin_bound_satisfied(bound: &str, arg: &Type) -> bool {
    match bound {
        "Hashable" | "Eq" => matches!(
            arg,
            Type::I8
                | Type::I16
                | Type::I32
                | Type::I64
                | Type::U8
                | Type::U16
                | Type::U32
                | Type::U64
                | Type::Bool
                | Type::String
        ),
        _ => false,
    }
}

/// Recursively substitutes `TypeParameter`/name-matching `Unknown` with the
/// bound concrete type, re-entering monomorphization for nested
/// `GenericRef`s.
fn substitute_type(
    ty: &Type,
    bindings: &Bindings,
    worklist: &mut Vec<(String, Vec<Type>)>,
    tables: &SymbolTables,
) -> Type {
    match ty {
        Type::TypeParameter(name) => bindings.get(name).cloned().unwrap_or_else(|| ty.clone()),
        Type::Unknown(name) => bindings.get(name).cloned().unwrap_or_else(|| ty.clone()),
        Type::Array(elem, size) => {
            Type::Array(Box::new(substitute_type(elem, bindings, worklist, tables)), *size)
        }
        Type::DynamicArray(elem) => {
            Type::DynamicArray(Box::new(substitute_type(elem, bindings, worklist, tables)))
        }
        Type::Iterator(elem) => {
            Type::Iterator(Box::new(substitute_type(elem, bindings, worklist, tables)))
        }
        Type::Reference { referenced, mode } => Type::Reference {
            referenced: Box::new(substitute_type(referenced, bindings, worklist, tables)),
            mode: *mode,
        },
        Type::Pointer(inner) => {
            Type::Pointer(Box::new(substitute_type(inner, bindings, worklist, tables)))
        }
        Type::GenericRef { base_name, type_args } => {
            let substituted: Vec<Type> = type_args
                .iter()
                .map(|a| substitute_type(a, bindings, worklist, tables))
                .collect();
            worklist.push((base_name.clone(), substituted.clone()));
            wrap_as_template_kind(base_name, substituted, tables)
        }
        Type::Result { ok, err } => {
            let ok = substitute_type(ok, bindings, worklist, tables);
            let err = substitute_type(err, bindings, worklist, tables);
            worklist.push(("Result".to_string(), vec![ok.clone(), err.clone()]));
            Type::Enum { name: "Result".to_string(), generic_args: vec![ok, err] }
        }
        Type::Struct { name, generic_args } if !generic_args.is_empty() => {
            let substituted: Vec<Type> = generic_args
                .iter()
                .map(|a| substitute_type(a, bindings, worklist, tables))
                .collect();
            worklist.push((name.clone(), substituted.clone()));
            wrap_as_template_kind(name, substituted, tables)
        }
        Type::Enum { name, generic_args } if !generic_args.is_empty() => {
            let substituted: Vec<Type> = generic_args
                .iter()
                .map(|a| substitute_type(a, bindings, worklist, tables))
                .collect();
            worklist.push((name.clone(), substituted.clone()));
            wrap_as_template_kind(name, substituted, tables)
        }
        other => other.clone(),
    }
}

/// A `GenericRef`/already-generic `Struct`/`Enum` node only carries a base
/// name; which concrete `Type` variant it becomes depends on whether that
/// name names a struct or enum template (`Maybe`/`Result` are enums).
fn wrap_as_template_kind(base_name: &str, generic_args: Vec<Type>, tables: &SymbolTables) -> Type {
    if tables.generic_enums.contains_key(base_name) || tables.enums.contains_key(base_name) {
        Type::Enum { name: base_name.to_string(), generic_args }
    } else {
        Type::Struct { name: base_name.to_string(), generic_args }
    }
}

fn monomorphize_function_template(
    base: &str,
    args: &[Type],
    tables: &mut SymbolTables,
    cache: &mut MonoCache,
    worklist: &mut Vec<(String, Vec<Type>)>,
    diagnostics: &mut DiagnosticEngine,
) {
    let mangled = mangle_function(base, args);
    if !cache.functions_done.insert(mangled.clone()) {
        return;
    }
    let Some(template) = tables.generic_functions.get(base).cloned() else {
        return;
    };
    if !check_arity(base, &template.type_params, args, diagnostics) {
        return;
    }
    let bindings: Bindings = template
        .type_params
        .iter()
        .zip(args.iter())
        .map(|(p, a)| (p.name.clone(), a.clone()))
        .collect();

    let mut type_worklist = Vec::new();
    let mut new_function = Function {
        name: mangled.clone(),
        is_pub: template.def.is_pub,
        type_params: vec![],
        params: template
            .def
            .params
            .iter()
            .map(|p| koi_ast::Param {
                name: p.name.clone(),
                ty: substitute_type(&p.ty, &bindings, &mut type_worklist, tables),
            })
            .collect(),
        return_type: substitute_type(&template.def.return_type, &bindings, &mut type_worklist, tables),
        err_type: template
            .def
            .err_type
            .as_ref()
            .map(|t| substitute_type(t, &bindings, &mut type_worklist, tables)),
        body: substitute_block(&template.def.body, &bindings, &mut type_worklist, tables),
        receiver: template.def.receiver.clone(),
    };
    worklist.extend(type_worklist);

    // Schedule further generic calls reachable from the new body with
    // inferable argument types ("Schedules calls... worklist").
    schedule_nested_calls(&new_function.body, tables, worklist);

    rewrite_call_sites(&mut new_function.body, base, args);

    tables.functions.insert(mangled.clone(), FunctionEntry { def: new_function.clone() });
    tables.monomorphized_functions.push(new_function);
}

fn substitute_block(
    block: &Block,
    bindings: &Bindings,
    worklist: &mut Vec<(String, Vec<Type>)>,
    tables: &SymbolTables,
) -> Block {
    block.iter().map(|s| substitute_statement(s, bindings, worklist, tables)).collect()
}

fn substitute_statement(
    stmt: &Statement,
    bindings: &Bindings,
    worklist: &mut Vec<(String, Vec<Type>)>,
    tables: &SymbolTables,
) -> Statement {
    match stmt {
        Statement::Let { name, ty, value } => Statement::Let {
            name: name.clone(),
            ty: ty.as_ref().map(|t| substitute_type(t, bindings, worklist, tables)),
            value: substitute_expr(value, bindings, worklist, tables),
        },
        Statement::Rebind { target, value } => Statement::Rebind {
            target: substitute_expr(target, bindings, worklist, tables),
            value: substitute_expr(value, bindings, worklist, tables),
        },
        Statement::Return(expr) => Statement::Return(substitute_expr(expr, bindings, worklist, tables)),
        Statement::Expr(expr) => Statement::Expr(substitute_expr(expr, bindings, worklist, tables)),
        Statement::If { cond, then_block, elif_branches, else_block } => Statement::If {
            cond: substitute_expr(cond, bindings, worklist, tables),
            then_block: substitute_block(then_block, bindings, worklist, tables),
            elif_branches: elif_branches
                .iter()
                .map(|(c, b)| {
                    (
                        substitute_expr(c, bindings, worklist, tables),
                        substitute_block(b, bindings, worklist, tables),
                    )
                })
                .collect(),
            else_block: else_block.as_ref().map(|b| substitute_block(b, bindings, worklist, tables)),
        },
        Statement::While { cond, body } => Statement::While {
            cond: substitute_expr(cond, bindings, worklist, tables),
            body: substitute_block(body, bindings, worklist, tables),
        },
        Statement::Foreach { var_name, item_type, iterable, body } => Statement::Foreach {
            var_name: var_name.clone(),
            item_type: item_type.as_ref().map(|t| substitute_type(t, bindings, worklist, tables)),
            iterable: substitute_expr(iterable, bindings, worklist, tables),
            body: substitute_block(body, bindings, worklist, tables),
        },
        Statement::Match { scrutinee, arms } => Statement::Match {
            scrutinee: substitute_expr(scrutinee, bindings, worklist, tables),
            arms: arms
                .iter()
                .map(|arm| koi_ast::MatchArm {
                    pattern: arm.pattern.clone(),
                    body: substitute_block(&arm.body, bindings, worklist, tables),
                })
                .collect(),
        },
        Statement::Break => Statement::Break,
        Statement::Continue => Statement::Continue,
    }
}

fn substitute_expr(
    expr: &Expr,
    bindings: &Bindings,
    worklist: &mut Vec<(String, Vec<Type>)>,
    tables: &SymbolTables,
) -> Expr {
    let kind = match &expr.kind {
        ExprKind::Cast { expr, ty } => ExprKind::Cast {
            expr: Box::new(substitute_expr(expr, bindings, worklist, tables)),
            ty: substitute_type(ty, bindings, worklist, tables),
        },
        ExprKind::Binary { op, left, right } => ExprKind::Binary {
            op: *op,
            left: Box::new(substitute_expr(left, bindings, worklist, tables)),
            right: Box::new(substitute_expr(right, bindings, worklist, tables)),
        },
        ExprKind::Unary { op, expr } => ExprKind::Unary {
            op: *op,
            expr: Box::new(substitute_expr(expr, bindings, worklist, tables)),
        },
        ExprKind::Reference { mode, expr } => ExprKind::Reference {
            mode: *mode,
            expr: Box::new(substitute_expr(expr, bindings, worklist, tables)),
        },
        ExprKind::Call { callee, args } => ExprKind::Call {
            callee: Box::new(substitute_expr(callee, bindings, worklist, tables)),
            args: args.iter().map(|a| substitute_arg(a, bindings, worklist, tables)).collect(),
        },
        ExprKind::MethodCall { receiver, method, args } => ExprKind::MethodCall {
            receiver: Box::new(substitute_expr(receiver, bindings, worklist, tables)),
            method: method.clone(),
            args: args.iter().map(|a| substitute_arg(a, bindings, worklist, tables)).collect(),
        },
        ExprKind::FieldAccess { receiver, field } => ExprKind::FieldAccess {
            receiver: Box::new(substitute_expr(receiver, bindings, worklist, tables)),
            field: field.clone(),
        },
        ExprKind::Index { receiver, index } => ExprKind::Index {
            receiver: Box::new(substitute_expr(receiver, bindings, worklist, tables)),
            index: Box::new(substitute_expr(index, bindings, worklist, tables)),
        },
        ExprKind::Try { expr } => {
            ExprKind::Try { expr: Box::new(substitute_expr(expr, bindings, worklist, tables)) }
        }
        ExprKind::ArrayLit(items) => ExprKind::ArrayLit(
            items.iter().map(|e| substitute_expr(e, bindings, worklist, tables)).collect(),
        ),
        other => other.clone(),
    };
    Expr::new(kind)
}

fn substitute_arg(
    arg: &koi_ast::Arg,
    bindings: &Bindings,
    worklist: &mut Vec<(String, Vec<Type>)>,
    tables: &SymbolTables,
) -> koi_ast::Arg {
    match arg {
        koi_ast::Arg::Positional(e) => {
            koi_ast::Arg::Positional(substitute_expr(e, bindings, worklist, tables))
        }
        koi_ast::Arg::Named { name, value } => koi_ast::Arg::Named {
            name: name.clone(),
            value: substitute_expr(value, bindings, worklist, tables),
        },
    }
}

fn schedule_nested_calls(block: &Block, tables: &SymbolTables, worklist: &mut Vec<(String, Vec<Type>)>) {
    for stmt in block {
        walk_statement_for_calls(stmt, tables, worklist);
    }
}

fn walk_statement_for_calls(stmt: &Statement, tables: &SymbolTables, worklist: &mut Vec<(String, Vec<Type>)>) {
    match stmt {
        Statement::Let { value, .. } | Statement::Return(value) | Statement::Expr(value) => {
            walk_expr_for_calls(value, tables, worklist)
        }
        Statement::Rebind { target, value } => {
            walk_expr_for_calls(target, tables, worklist);
            walk_expr_for_calls(value, tables, worklist);
        }
        Statement::If { cond, then_block, elif_branches, else_block } => {
            walk_expr_for_calls(cond, tables, worklist);
            schedule_nested_calls(then_block, tables, worklist);
            for (c, b) in elif_branches {
                walk_expr_for_calls(c, tables, worklist);
                schedule_nested_calls(b, tables, worklist);
            }
            if let Some(b) = else_block {
                schedule_nested_calls(b, tables, worklist);
            }
        }
        Statement::While { cond, body } => {
            walk_expr_for_calls(cond, tables, worklist);
            schedule_nested_calls(body, tables, worklist);
        }
        Statement::Foreach { iterable, body, .. } => {
            walk_expr_for_calls(iterable, tables, worklist);
            schedule_nested_calls(body, tables, worklist);
        }
        Statement::Match { scrutinee, arms } => {
            walk_expr_for_calls(scrutinee, tables, worklist);
            for arm in arms {
                schedule_nested_calls(&arm.body, tables, worklist);
            }
        }
        Statement::Break | Statement::Continue => {}
    }
}

fn walk_expr_for_calls(expr: &Expr, tables: &SymbolTables, worklist: &mut Vec<(String, Vec<Type>)>) {
    if let ExprKind::Call { callee, args } = &expr.kind {
        if let ExprKind::Identifier(name) = &callee.kind {
            if let Some(entry) = tables.generic_functions.get(name) {
                let mut bindings = HashMap::new();
                for (param, arg) in entry.def.params.iter().zip(args.iter()) {
                    if let Type::TypeParameter(pname) = &param.ty {
                        if let Some(concrete) = arg.value().resolved_type() {
                            bindings.entry(pname.clone()).or_insert(concrete);
                        }
                    }
                }
                if let Some(type_args) = entry
                    .type_params
                    .iter()
                    .map(|tp| bindings.get(&tp.name).cloned())
                    .collect::<Option<Vec<_>>>()
                {
                    worklist.push((name.clone(), type_args));
                }
            }
        }
    }
}

/// Rewrites call sites inside the monomorphized body from the generic name
/// to the mangled name where the callee is itself the template being
/// instantiated (self-recursive calls with the same type arguments).
fn rewrite_call_sites(block: &mut Block, base: &str, args: &[Type]) {
    for stmt in block.iter_mut() {
        rewrite_statement(stmt, base, args);
    }
}

fn rewrite_statement(stmt: &mut Statement, base: &str, args: &[Type]) {
    match stmt {
        Statement::Let { value, .. } | Statement::Return(value) | Statement::Expr(value) => {
            rewrite_expr(value, base, args)
        }
        Statement::Rebind { target, value } => {
            rewrite_expr(target, base, args);
            rewrite_expr(value, base, args);
        }
        Statement::If { cond, then_block, elif_branches, else_block } => {
            rewrite_expr(cond, base, args);
            rewrite_call_sites(then_block, base, args);
            for (c, b) in elif_branches {
                rewrite_expr(c, base, args);
                rewrite_call_sites(b, base, args);
            }
            if let Some(b) = else_block {
                rewrite_call_sites(b, base, args);
            }
        }
        Statement::While { cond, body } => {
            rewrite_expr(cond, base, args);
            rewrite_call_sites(body, base, args);
        }
        Statement::Foreach { iterable, body, .. } => {
            rewrite_expr(iterable, base, args);
            rewrite_call_sites(body, base, args);
        }
        Statement::Match { scrutinee, arms } => {
            rewrite_expr(scrutinee, base, args);
            for arm in arms {
                rewrite_call_sites(&mut arm.body, base, args);
            }
        }
        Statement::Break | Statement::Continue => {}
    }
}

fn rewrite_expr(expr: &mut Expr, base: &str, args: &[Type]) {
    if let ExprKind::Call { callee, args: call_args } = &mut expr.kind {
        if let ExprKind::Identifier(name) = &mut callee.kind {
            if name == base {
                *name = mangle_function(base, args);
            }
        }
        rewrite_expr(callee, base, args);
        for a in call_args {
            match a {
                koi_ast::Arg::Positional(e) => rewrite_expr(e, base, args),
                koi_ast::Arg::Named { value, .. } => rewrite_expr(value, base, args),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::GenericFunctionEntry;
    use koi_ast::{Param, TypeParam};

    #[test]
    fn monomorphizes_identity_for_i32() {
        let mut tables = SymbolTables::new();
        let identity = Function {
            name: "identity".to_string(),
            is_pub: false,
            type_params: vec![TypeParam { name: "T".to_string(), bounds: vec![] }],
            params: vec![Param { name: "x".to_string(), ty: Type::TypeParameter("T".to_string()) }],
            return_type: Type::TypeParameter("T".to_string()),
            err_type: None,
            body: vec![Statement::Return(Expr::ident("x"))],
            receiver: None,
        };
        tables.generic_functions.insert(
            "identity".to_string(),
            GenericFunctionEntry {
                def: identity,
                type_params: vec![TypeParam { name: "T".to_string(), bounds: vec![] }],
            },
        );
        let mut diagnostics = DiagnosticEngine::new();
        let mut worklist = vec![];
        monomorphize_function_template(
            "identity",
            &[Type::I32],
            &mut tables,
            &mut MonoCache::default(),
            &mut worklist,
            &mut diagnostics,
        );
        assert!(tables.functions.contains_key("identity__i32"));
    }
}
