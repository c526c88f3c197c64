//! Pass 2: type validation.
//!
//! Walks every function body with a per-function variable-type environment,
//! annotating each `Expr` with `set_resolved_type` as it goes, rewriting
//! untyped constructor/generic calls in place, and validating returns,
//! rebinds, conditions, matches, casts, and perk implementations.

use crate::mangling;
use crate::stdlib::StdlibRegistry;
use crate::tables::SymbolTables;
use koi_ast::{
    Arg, Block, Expr, ExprKind, Function, Item, MatchArm, Param, Pattern, Program, Statement,
    TryAnnotation, Type,
};
use koi_diagnostics::{error_codes, Diagnostic, DiagnosticEngine, Span};
use std::collections::HashMap;

type Env = HashMap<String, Type>;

pub fn run(program: &Program, tables: &SymbolTables, diagnostics: &mut DiagnosticEngine) {
    let stdlib = StdlibRegistry::new();
    for item in &program.items {
        match item {
            Item::Function(f) => check_function(f, tables, &stdlib, diagnostics),
            Item::PerkImpl(p) => {
                for m in &p.methods {
                    check_function(m, tables, &stdlib, diagnostics);
                }
            }
            Item::Extension(e) => {
                for m in &e.methods {
                    check_function(m, tables, &stdlib, diagnostics);
                }
            }
            _ => {}
        }
    }
    check_perk_implementations(tables, diagnostics);
}

fn check_function(
    func: &Function,
    tables: &SymbolTables,
    stdlib: &StdlibRegistry,
    diagnostics: &mut DiagnosticEngine,
) {
    let mut env: Env = HashMap::new();
    if let Some(receiver) = &func.receiver {
        env.insert("self".to_string(), receiver.clone());
    }
    for param in &func.params {
        env.insert(param.name.clone(), param.ty.clone());
    }

    for ty in func.params.iter().map(|p: &Param| &p.ty).chain(std::iter::once(&func.return_type)) {
        if ty.contains_unresolved() {
            diagnostics.emit(Diagnostic::error(
                error_codes::UNDEFINED_TYPE,
                format!("unresolved type in signature of `{}`", func.name),
                Span::unknown(),
            ));
        }
    }

    check_block(&func.body, &mut env, func, tables, stdlib, diagnostics);

    if !diverges(&func.body) {
        diagnostics.emit(Diagnostic::error(
            error_codes::RETURN_TYPE_MISMATCH,
            format!("function `{}` does not return on all paths", func.name),
            Span::unknown(),
        ));
    }
}

fn check_block(
    block: &Block,
    env: &mut Env,
    func: &Function,
    tables: &SymbolTables,
    stdlib: &StdlibRegistry,
    diagnostics: &mut DiagnosticEngine,
) {
    for stmt in block {
        check_statement(stmt, env, func, tables, stdlib, diagnostics);
    }
}

fn check_statement(
    stmt: &Statement,
    env: &mut Env,
    func: &Function,
    tables: &SymbolTables,
    stdlib: &StdlibRegistry,
    diagnostics: &mut DiagnosticEngine,
) {
    match stmt {
        Statement::Let { name, ty, value } => {
            let expected = ty.clone();
            let inferred = infer_expr(value, expected.as_ref(), env, func, tables, stdlib, diagnostics);
            env.insert(name.clone(), expected.unwrap_or(inferred));
        }
        Statement::Rebind { target, value } => {
            let target_ty = infer_expr(target, None, env, func, tables, stdlib, diagnostics);
            if let ExprKind::Identifier(name) = &target.kind {
                if let Some(Type::Reference { mode: koi_ast::BorrowMode::Peek, .. }) = env.get(name) {
                    diagnostics.emit(Diagnostic::error(
                        error_codes::IMMUTABLE_ASSIGN,
                        format!("cannot rebind through a peek (shared) reference `{name}`"),
                        Span::unknown(),
                    ));
                }
            }
            let value_ty = infer_expr(value, Some(&target_ty), env, func, tables, stdlib, diagnostics);
            if !types_compatible(&target_ty, &value_ty) {
                diagnostics.emit(Diagnostic::error(
                    error_codes::TYPE_MISMATCH,
                    format!(
                        "cannot rebind `{}` of type `{}` with value of type `{}`",
                        expr_label(target),
                        mangling::type_name(&target_ty),
                        mangling::type_name(&value_ty)
                    ),
                    Span::unknown(),
                ));
            }
        }
        Statement::Return(expr) => {
            let expected = Type::result_of(func.return_type.clone(), func.effective_err_type());
            let actual = infer_expr(expr, Some(&expected), env, func, tables, stdlib, diagnostics);
            if !is_result_shaped(&actual, &expected) {
                diagnostics.emit(Diagnostic::error(
                    error_codes::RETURN_TYPE_MISMATCH,
                    format!(
                        "expected `{}`, found `{}`",
                        mangling::type_name(&expected),
                        mangling::type_name(&actual)
                    ),
                    Span::unknown(),
                ));
            }
        }
        Statement::Expr(expr) => {
            infer_expr(expr, None, env, func, tables, stdlib, diagnostics);
        }
        Statement::If { cond, then_block, elif_branches, else_block } => {
            check_condition(cond, env, func, tables, stdlib, diagnostics);
            let mut then_env = env.clone();
            check_block(then_block, &mut then_env, func, tables, stdlib, diagnostics);
            for (c, b) in elif_branches {
                check_condition(c, env, func, tables, stdlib, diagnostics);
                let mut elif_env = env.clone();
                check_block(b, &mut elif_env, func, tables, stdlib, diagnostics);
            }
            if let Some(b) = else_block {
                let mut else_env = env.clone();
                check_block(b, &mut else_env, func, tables, stdlib, diagnostics);
            }
        }
        Statement::While { cond, body } => {
            check_condition(cond, env, func, tables, stdlib, diagnostics);
            let mut body_env = env.clone();
            check_block(body, &mut body_env, func, tables, stdlib, diagnostics);
        }
        Statement::Foreach { var_name, item_type, iterable, body } => {
            let iterable_ty = infer_expr(iterable, None, env, func, tables, stdlib, diagnostics);
            let elem_ty = match &iterable_ty {
                Type::Array(elem, _) | Type::DynamicArray(elem) | Type::Iterator(elem) => {
                    (**elem).clone()
                }
                other => {
                    diagnostics.emit(Diagnostic::error(
                        error_codes::TYPE_MISMATCH,
                        format!("`{}` is not iterable", mangling::type_name(other)),
                        Span::unknown(),
                    ));
                    Type::Unknown(var_name.clone())
                }
            };
            if let Some(declared) = item_type {
                if !types_compatible(declared, &elem_ty) {
                    diagnostics.emit(Diagnostic::error(
                        error_codes::TYPE_MISMATCH,
                        "foreach item type does not match iterable element type".to_string(),
                        Span::unknown(),
                    ));
                }
            }
            let mut body_env = env.clone();
            body_env.insert(var_name.clone(), elem_ty);
            check_block(body, &mut body_env, func, tables, stdlib, diagnostics);
        }
        Statement::Match { scrutinee, arms } => {
            let scrutinee_ty = infer_expr(scrutinee, None, env, func, tables, stdlib, diagnostics);
            check_match_arms(&scrutinee_ty, arms, env, func, tables, stdlib, diagnostics);
        }
        Statement::Break | Statement::Continue => {}
    }
}

fn check_condition(
    cond: &Expr,
    env: &mut Env,
    func: &Function,
    tables: &SymbolTables,
    stdlib: &StdlibRegistry,
    diagnostics: &mut DiagnosticEngine,
) {
    let ty = infer_expr(cond, None, env, func, tables, stdlib, diagnostics);
    let ok = matches!(ty, Type::Bool) || matches!(ty, Type::Enum { ref name, .. } if name == "Result");
    if !ok {
        diagnostics.emit(Diagnostic::error(
            error_codes::TYPE_MISMATCH,
            format!("condition must be `bool` or `Result`, found `{}`", mangling::type_name(&ty)),
            Span::unknown(),
        ));
    }
}

fn check_match_arms(
    scrutinee_ty: &Type,
    arms: &[MatchArm],
    env: &Env,
    func: &Function,
    tables: &SymbolTables,
    stdlib: &StdlibRegistry,
    diagnostics: &mut DiagnosticEngine,
) {
    let enum_name = match scrutinee_ty {
        Type::Enum { name, .. } => Some(name.clone()),
        _ => None,
    };
    let mut seen_wildcard = false;
    for arm in arms {
        if seen_wildcard {
            diagnostics.emit(Diagnostic::warning(
                error_codes::UNREACHABLE_PATTERN,
                "pattern is unreachable after a wildcard arm".to_string(),
                Span::unknown(),
            ));
        }
        if matches!(arm.pattern, Pattern::Wildcard) {
            seen_wildcard = true;
        }
        let mut arm_env = env.clone();
        bind_pattern(&arm.pattern, &enum_name, tables, &mut arm_env);
        check_block(&arm.body, &mut arm_env, func, tables, stdlib, diagnostics);
    }
    if !seen_wildcard && enum_name.is_some() {
        let name = enum_name.unwrap();
        if let Some(entry) = tables.enums.get(&name) {
            let covered: Vec<&str> = arms
                .iter()
                .filter_map(|a| match &a.pattern {
                    Pattern::EnumVariant { variant, .. } => Some(variant.as_str()),
                    _ => None,
                })
                .collect();
            let missing: Vec<&str> = entry
                .def
                .variants
                .iter()
                .map(|v| v.name.as_str())
                .filter(|v| !covered.contains(v))
                .collect();
            if !missing.is_empty() {
                diagnostics.emit(Diagnostic::error(
                    error_codes::NON_EXHAUSTIVE_MATCH,
                    format!("match on `{name}` is missing variant(s): {}", missing.join(", ")),
                    Span::unknown(),
                ));
            }
        }
    }
}

fn bind_pattern(pattern: &Pattern, enum_name: &Option<String>, tables: &SymbolTables, env: &mut Env) {
    match pattern {
        Pattern::Wildcard | Pattern::Binding(_) => {
            if let Pattern::Binding(name) = pattern {
                env.insert(name.clone(), Type::Unknown(name.clone()));
            }
        }
        Pattern::EnumVariant { enum_name: pat_enum, variant, bindings } => {
            let resolved = pat_enum.clone().or_else(|| enum_name.clone());
            let assoc = resolved
                .as_ref()
                .and_then(|n| tables.enums.get(n))
                .and_then(|e| e.def.variants.iter().find(|v| &v.name == variant))
                .map(|v| v.associated_types.clone())
                .unwrap_or_default();
            for (binding, ty) in bindings.iter().zip(assoc.iter()) {
                if let Pattern::Binding(name) = binding {
                    env.insert(name.clone(), ty.clone());
                } else {
                    bind_pattern(binding, enum_name, tables, env);
                }
            }
        }
        Pattern::Own(inner) => bind_pattern(inner, enum_name, tables, env),
    }
}

fn infer_expr(
    expr: &Expr,
    expected: Option<&Type>,
    env: &mut Env,
    func: &Function,
    tables: &SymbolTables,
    stdlib: &StdlibRegistry,
    diagnostics: &mut DiagnosticEngine,
) -> Type {
    let ty = infer_expr_kind(expr, expected, env, func, tables, stdlib, diagnostics);
    expr.set_resolved_type(ty.clone());
    ty
}

fn infer_expr_kind(
    expr: &Expr,
    expected: Option<&Type>,
    env: &mut Env,
    func: &Function,
    tables: &SymbolTables,
    stdlib: &StdlibRegistry,
    diagnostics: &mut DiagnosticEngine,
) -> Type {
    match &expr.kind {
        ExprKind::IntLit(_) => expected.cloned().filter(Type::is_integer).unwrap_or(Type::I32),
        ExprKind::FloatLit(_) => expected.cloned().filter(Type::is_float).unwrap_or(Type::F64),
        ExprKind::BoolLit(_) => Type::Bool,
        ExprKind::StringLit(_) => Type::String,
        ExprKind::BlankLit => Type::Blank,
        ExprKind::Identifier(name) => env.get(name).cloned().unwrap_or_else(|| {
            if let Some(c) = tables.constants.get(name) {
                c.ty.clone().unwrap_or(Type::Unknown(name.clone()))
            } else if matches!(name.as_str(), "stdin") {
                Type::Stdin
            } else if matches!(name.as_str(), "stdout") {
                Type::Stdout
            } else if matches!(name.as_str(), "stderr") {
                Type::Stderr
            } else {
                diagnostics.emit(Diagnostic::error(
                    error_codes::UNDEFINED_VARIABLE,
                    format!("cannot find `{name}` in this scope"),
                    Span::unknown(),
                ));
                Type::Unknown(name.clone())
            }
        }),
        ExprKind::Binary { op, left, right } => {
            let lt = infer_expr(left, None, env, func, tables, stdlib, diagnostics);
            let rt = infer_expr(right, Some(&lt), env, func, tables, stdlib, diagnostics);
            binary_result_type(*op, &lt, &rt, diagnostics)
        }
        ExprKind::Unary { expr: inner, .. } => {
            infer_expr(inner, None, env, func, tables, stdlib, diagnostics)
        }
        ExprKind::Reference { mode, expr: inner } => {
            let inner_ty = infer_expr(inner, None, env, func, tables, stdlib, diagnostics);
            Type::Reference { referenced: Box::new(inner_ty), mode: *mode }
        }
        ExprKind::Call { callee, args } => {
            check_call(callee, args, expected, env, func, tables, stdlib, diagnostics)
        }
        ExprKind::MethodCall { receiver, method, args } => {
            check_method_call(receiver, method, args, env, func, tables, stdlib, diagnostics)
        }
        ExprKind::FieldAccess { receiver, field } => {
            let recv_ty = infer_expr(receiver, None, env, func, tables, stdlib, diagnostics);
            field_type(&recv_ty, field, tables).unwrap_or_else(|| {
                diagnostics.emit(Diagnostic::error(
                    error_codes::NO_SUCH_FIELD,
                    format!("no field `{field}` on `{}`", mangling::type_name(&recv_ty)),
                    Span::unknown(),
                ));
                Type::Unknown(field.clone())
            })
        }
        ExprKind::Index { receiver, index } => {
            let recv_ty = infer_expr(receiver, None, env, func, tables, stdlib, diagnostics);
            infer_expr(index, Some(&Type::I64), env, func, tables, stdlib, diagnostics);
            match recv_ty {
                Type::Array(elem, _) | Type::DynamicArray(elem) => *elem,
                other => {
                    diagnostics.emit(Diagnostic::error(
                        error_codes::TYPE_MISMATCH,
                        format!("cannot index into `{}`", mangling::type_name(&other)),
                        Span::unknown(),
                    ));
                    Type::Unknown("index".to_string())
                }
            }
        }
        ExprKind::StructConstruct { name, args } => {
            check_struct_construct(name, args, env, func, tables, stdlib, diagnostics)
        }
        ExprKind::EnumConstruct { enum_name, variant, args } => check_enum_construct(
            enum_name.clone(),
            variant,
            args,
            expected,
            env,
            func,
            tables,
            stdlib,
            diagnostics,
        ),
        ExprKind::Cast { expr: inner, ty } => {
            let inner_ty = infer_expr(inner, None, env, func, tables, stdlib, diagnostics);
            if !cast_allowed(&inner_ty, ty) {
                diagnostics.emit(Diagnostic::error(
                    error_codes::INVALID_CAST,
                    format!(
                        "cannot cast `{}` to `{}`",
                        mangling::type_name(&inner_ty),
                        mangling::type_name(ty)
                    ),
                    Span::unknown(),
                ));
            }
            ty.clone()
        }
        ExprKind::Try { expr: inner } => {
            let inner_ty = infer_expr(inner, None, env, func, tables, stdlib, diagnostics);
            match &inner_ty {
                Type::Enum { name, generic_args } if name == "Result" && generic_args.len() == 2 => {
                    let ok_ty = generic_args[0].clone();
                    let err_ty = generic_args[1].clone();
                    inner.try_annotation.replace(Some(TryAnnotation {
                        inner_type: inner_ty.clone(),
                        ok_tag: 0,
                        ok_type: ok_ty.clone(),
                        err_tag: 1,
                        err_type: err_ty,
                        enclosing_return_type: func.return_type.clone(),
                    }));
                    ok_ty
                }
                other => {
                    diagnostics.emit(Diagnostic::error(
                        error_codes::INVALID_TRY_TARGET,
                        format!("`??` requires a `Result`, found `{}`", mangling::type_name(other)),
                        Span::unknown(),
                    ));
                    Type::Unknown("try".to_string())
                }
            }
        }
        ExprKind::ArrayLit(items) => {
            let elem_expected = expected.and_then(|t| match t {
                Type::Array(e, _) | Type::DynamicArray(e) => Some((**e).clone()),
                _ => None,
            });
            let mut elem_ty = elem_expected.unwrap_or(Type::Unknown("elem".to_string()));
            for (i, item) in items.iter().enumerate() {
                let t = infer_expr(item, Some(&elem_ty), env, func, tables, stdlib, diagnostics);
                if i == 0 && matches!(elem_ty, Type::Unknown(_)) {
                    elem_ty = t;
                }
            }
            Type::DynamicArray(Box::new(elem_ty))
        }
        ExprKind::FString(parts) => {
            for part in parts {
                if let koi_ast::FStringPart::Expr(e) = part {
                    infer_expr(e, None, env, func, tables, stdlib, diagnostics);
                }
            }
            Type::String
        }
    }
}

fn binary_result_type(
    op: koi_ast::BinOp,
    lt: &Type,
    rt: &Type,
    diagnostics: &mut DiagnosticEngine,
) -> Type {
    use koi_ast::BinOp::*;
    if !types_compatible(lt, rt) {
        diagnostics.emit(Diagnostic::error(
            error_codes::TYPE_MISMATCH,
            format!(
                "mismatched operand types `{}` and `{}`",
                mangling::type_name(lt),
                mangling::type_name(rt)
            ),
            Span::unknown(),
        ));
    }
    match op {
        Eq | Ne | Lt | Le | Gt | Ge | And | Or => Type::Bool,
        _ => lt.clone(),
    }
}

fn check_call(
    callee: &Expr,
    args: &[Arg],
    expected: Option<&Type>,
    env: &mut Env,
    func: &Function,
    tables: &SymbolTables,
    stdlib: &StdlibRegistry,
    diagnostics: &mut DiagnosticEngine,
) -> Type {
    let ExprKind::Identifier(name) = &callee.kind else {
        let callee_ty = infer_expr(callee, None, env, func, tables, stdlib, diagnostics);
        for a in args {
            infer_expr(a.value(), None, env, func, tables, stdlib, diagnostics);
        }
        return callee_ty;
    };

    if tables.structs.contains_key(name) || tables.generic_structs.contains_key(name) {
        return check_struct_construct(name, args, env, func, tables, stdlib, diagnostics);
    }

    if let Some(module_path) = stdlib_path(name) {
        if let Some(entry) = stdlib.lookup(&module_path) {
            if entry.params.len() != args.len() {
                diagnostics.emit(Diagnostic::error(
                    error_codes::ARGUMENT_COUNT,
                    format!(
                        "`{name}` expects {} argument(s), found {}",
                        entry.params.len(),
                        args.len()
                    ),
                    Span::unknown(),
                ));
            }
            for (param_ty, arg) in entry.params.iter().zip(args.iter()) {
                infer_expr(arg.value(), Some(param_ty), env, func, tables, stdlib, diagnostics);
            }
            return entry.return_type.clone();
        }
    }

    if let Some(entry) = tables.generic_functions.get(name) {
        let mut bindings: HashMap<String, Type> = HashMap::new();
        for (param, arg) in entry.def.params.iter().zip(args.iter()) {
            let arg_ty = infer_expr(arg.value(), None, env, func, tables, stdlib, diagnostics);
            if let Type::TypeParameter(p) = &param.ty {
                bindings.entry(p.clone()).or_insert(arg_ty);
            }
        }
        let type_args: Vec<Type> = entry
            .type_params
            .iter()
            .map(|tp| bindings.get(&tp.name).cloned().unwrap_or(Type::Unknown(tp.name.clone())))
            .collect();
        callee.set_mangled_callee(mangling::mangle_function(name, &type_args));
        return substituted_return_type(&entry.def.return_type, &bindings);
    }

    if let Some(entry) = tables.functions.get(name) {
        if entry.def.params.len() != args.len() {
            diagnostics.emit(Diagnostic::error(
                error_codes::ARGUMENT_COUNT,
                format!(
                    "`{name}` expects {} argument(s), found {}",
                    entry.def.params.len(),
                    args.len()
                ),
                Span::unknown(),
            ));
        }
        for (param, arg) in entry.def.params.iter().zip(args.iter()) {
            infer_expr(arg.value(), Some(&param.ty), env, func, tables, stdlib, diagnostics);
        }
        return Type::result_of(entry.def.return_type.clone(), entry.def.effective_err_type());
    }

    // A bare variant constructor, e.g. `None`, is only resolvable through
    // the expected enum type at the call site.
    if let Some(Type::Enum { name: enum_name, .. }) = expected {
        if tables.enums.get(enum_name).map_or(false, |e| e.def.variants.iter().any(|v| v.name == *name)) {
            return check_enum_construct(
                Some(enum_name.clone()),
                name,
                &args.iter().map(|a| a.value().clone()).collect::<Vec<_>>(),
                expected,
                env,
                func,
                tables,
                stdlib,
                diagnostics,
            );
        }
    }

    diagnostics.emit(Diagnostic::error(
        error_codes::UNDEFINED_FUNCTION,
        format!("cannot find function `{name}`"),
        Span::unknown(),
    ));
    Type::Unknown(name.clone())
}

fn substituted_return_type(return_ty: &Type, bindings: &HashMap<String, Type>) -> Type {
    match return_ty {
        Type::TypeParameter(name) => bindings.get(name).cloned().unwrap_or_else(|| return_ty.clone()),
        other => other.clone(),
    }
}

fn stdlib_path(name: &str) -> Option<String> {
    match name {
        "print" | "println" => Some(name.to_string()),
        _ if name.starts_with("math_") => Some(format!("math.{}", &name[5..])),
        _ => None,
    }
}

fn check_struct_construct(
    name: &str,
    args: &[Arg],
    env: &mut Env,
    func: &Function,
    tables: &SymbolTables,
    stdlib: &StdlibRegistry,
    diagnostics: &mut DiagnosticEngine,
) -> Type {
    let Some(entry) = tables.structs.get(name).map(|e| e.def.fields.clone()).or_else(|| {
        tables.generic_structs.get(name).map(|e| e.def.fields.clone())
    }) else {
        diagnostics.emit(Diagnostic::error(
            error_codes::UNDEFINED_TYPE,
            format!("unknown struct `{name}`"),
            Span::unknown(),
        ));
        return Type::Unknown(name.to_string());
    };

    if entry.len() != args.len() {
        diagnostics.emit(Diagnostic::error(
            error_codes::ARGUMENT_COUNT,
            format!("`{name}` has {} field(s), found {} argument(s)", entry.len(), args.len()),
            Span::unknown(),
        ));
    }
    let ordered = order_struct_args(&entry, args);
    for (field, arg) in entry.iter().zip(ordered.into_iter()) {
        infer_expr(arg.value(), Some(&field.ty), env, func, tables, stdlib, diagnostics);
    }
    Type::Struct { name: name.to_string(), generic_args: vec![] }
}

/// Remaps construction args to the struct's declared field order by name
/// whenever any arg is written `field: value` — `Point(y: 2, x: 1)` zips
/// against `[x, y]` the same as `Point(1, 2)` would. Unnamed args fill
/// whatever slots remain, in the order they appear.
fn order_struct_args<'a>(fields: &[koi_ast::Field], args: &'a [Arg]) -> Vec<&'a Arg> {
    if !args.iter().any(|a| matches!(a, Arg::Named { .. })) {
        return args.iter().collect();
    }
    let mut slots: Vec<Option<&Arg>> = vec![None; fields.len()];
    let mut leftover: Vec<&Arg> = Vec::new();
    for arg in args {
        match arg {
            Arg::Named { name, .. } => match fields.iter().position(|f| &f.name == name) {
                Some(idx) => slots[idx] = Some(arg),
                None => leftover.push(arg),
            },
            Arg::Positional(_) => leftover.push(arg),
        }
    }
    let mut leftover = leftover.into_iter();
    slots.into_iter().filter_map(|slot| slot.or_else(|| leftover.next())).collect()
}

fn check_enum_construct(
    enum_name: Option<String>,
    variant: &str,
    args: &[Expr],
    expected: Option<&Type>,
    env: &mut Env,
    func: &Function,
    tables: &SymbolTables,
    stdlib: &StdlibRegistry,
    diagnostics: &mut DiagnosticEngine,
) -> Type {
    let resolved_name = enum_name.or_else(|| match expected {
        Some(Type::Enum { name, .. }) => Some(name.clone()),
        _ => None,
    });

    let Some(name) = resolved_name else {
        diagnostics.emit(Diagnostic::error(
            error_codes::AMBIGUOUS_TYPE,
            format!("cannot determine which enum `{variant}` belongs to"),
            Span::unknown(),
        ));
        return Type::Unknown(variant.to_string());
    };

    let Some(variant_def) = tables
        .enums
        .get(&name)
        .and_then(|e| e.def.variants.iter().find(|v| v.name == variant).cloned())
        .or_else(|| {
            tables
                .generic_enums
                .get(&name)
                .and_then(|e| e.def.variants.iter().find(|v| v.name == variant).cloned())
        })
    else {
        diagnostics.emit(Diagnostic::error(
            error_codes::NO_SUCH_FIELD,
            format!("enum `{name}` has no variant `{variant}`"),
            Span::unknown(),
        ));
        return Type::Unknown(variant.to_string());
    };

    for (expected_ty, arg) in variant_def.associated_types.iter().zip(args.iter()) {
        infer_expr(arg, Some(expected_ty), env, func, tables, stdlib, diagnostics);
    }

    Type::Enum { name, generic_args: vec![] }
}

fn check_method_call(
    receiver: &Expr,
    method: &str,
    args: &[Arg],
    env: &mut Env,
    func: &Function,
    tables: &SymbolTables,
    stdlib: &StdlibRegistry,
    diagnostics: &mut DiagnosticEngine,
) -> Type {
    let recv_ty = infer_expr(receiver, None, env, func, tables, stdlib, diagnostics);
    let target_name = mangling::type_name(&recv_ty);

    if let Some(entry) = tables.lookup_extension(&target_name, method) {
        for (param, arg) in entry.method.params.iter().zip(args.iter()) {
            infer_expr(arg.value(), Some(&param.ty), env, func, tables, stdlib, diagnostics);
        }
        return Type::result_of(entry.method.return_type.clone(), entry.method.effective_err_type());
    }

    for arg in args {
        infer_expr(arg.value(), None, env, func, tables, stdlib, diagnostics);
    }

    match (&recv_ty, method) {
        (Type::Enum { name, .. }, "is_ok" | "is_err") if name == "Result" => Type::Bool,
        (Type::Enum { name, generic_args }, "unwrap") if name == "Result" || name == "Maybe" => {
            generic_args.first().cloned().unwrap_or(Type::Unknown("unwrap".to_string()))
        }
        (Type::Enum { name, generic_args }, "realise") if name == "Maybe" => {
            generic_args.first().cloned().unwrap_or(Type::Unknown("realise".to_string()))
        }
        (Type::DynamicArray(elem), "push") => {
            let _ = elem;
            Type::Blank
        }
        (Type::DynamicArray(elem), "get") => (**elem).clone(),
        (Type::DynamicArray(_), "len") => Type::U64,
        _ => {
            diagnostics.emit(Diagnostic::error(
                error_codes::NO_SUCH_METHOD,
                format!("no method `{method}` on `{target_name}`"),
                Span::unknown(),
            ));
            Type::Unknown(method.to_string())
        }
    }
}

fn field_type(ty: &Type, field: &str, tables: &SymbolTables) -> Option<Type> {
    if let Type::Struct { name, .. } = ty {
        tables.structs.get(name)?.def.fields.iter().find(|f| f.name == field).map(|f| f.ty.clone())
    } else {
        None
    }
}

fn cast_allowed(from: &Type, to: &Type) -> bool {
    if from.is_numeric() && to.is_numeric() {
        return true;
    }
    matches!((from, to), (Type::I32, Type::Bool) | (Type::Bool, Type::I32))
}

fn types_compatible(a: &Type, b: &Type) -> bool {
    a == b || (a.is_numeric() && b.is_numeric()) || matches!(a, Type::Unknown(_)) || matches!(b, Type::Unknown(_))
}

fn is_result_shaped(actual: &Type, expected: &Type) -> bool {
    types_compatible(actual, expected)
        || matches!(actual, Type::Enum { name, .. } if name == "Result")
        || matches!(expected, Type::Enum { name, .. } if name == "Result")
}

fn expr_label(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Identifier(name) => name.clone(),
        ExprKind::FieldAccess { field, .. } => field.clone(),
        _ => "<expr>".to_string(),
    }
}

/// Conservative total-return check: an `if` diverges only if
/// every branch (including an `else`) diverges; a non-empty `match`
/// diverges only if every arm diverges; loops never guarantee divergence.
fn diverges(block: &Block) -> bool {
    block.iter().any(|stmt| stmt_diverges(stmt))
}

fn stmt_diverges(stmt: &Statement) -> bool {
    match stmt {
        Statement::Return(_) | Statement::Break | Statement::Continue => true,
        Statement::If { then_block, elif_branches, else_block, .. } => {
            let Some(else_b) = else_block else { return false };
            diverges(then_block)
                && elif_branches.iter().all(|(_, b)| diverges(b))
                && diverges(else_b)
        }
        Statement::Match { arms, .. } => !arms.is_empty() && arms.iter().all(|a| diverges(&a.body)),
        _ => false,
    }
}

fn check_perk_implementations(tables: &SymbolTables, diagnostics: &mut DiagnosticEngine) {
    for ((target, perk_name), entry) in &tables.perk_impls {
        let Some(perk_def) = tables.perks.get(perk_name) else {
            diagnostics.emit(Diagnostic::error(
                error_codes::UNDEFINED_TYPE,
                format!("unknown perk `{perk_name}`"),
                Span::unknown(),
            ));
            continue;
        };
        for required in &perk_def.methods {
            let implemented = entry.perk_impl.methods.iter().find(|m| m.name == required.name);
            match implemented {
                None => diagnostics.emit(Diagnostic::error(
                    error_codes::MISSING_PERK_METHOD,
                    format!("`{target}` is missing `{}` required by perk `{perk_name}`", required.name),
                    Span::unknown(),
                )),
                Some(m) if m.params.len() != required.params.len() || m.return_type != required.return_type => {
                    diagnostics.emit(Diagnostic::error(
                        error_codes::MISSING_PERK_METHOD,
                        format!(
                            "`{target}`'s `{}` does not match the signature required by perk `{perk_name}`",
                            required.name
                        ),
                        Span::unknown(),
                    ));
                }
                Some(_) => {}
            }
        }
        if tables.extensions.contains_key(&(target.clone(), "hash".to_string()))
            && entry.perk_impl.methods.iter().any(|m| m.name == "hash")
        {
            diagnostics.emit(Diagnostic::error(
                error_codes::CONFLICTING_IMPL,
                format!("`{target}` defines `hash` both via perk `{perk_name}` and a synthesized extension"),
                Span::unknown(),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use koi_ast::{BinOp, Expr};

    fn simple_function(return_type: Type, body: Block) -> Function {
        Function {
            name: "f".to_string(),
            is_pub: false,
            type_params: vec![],
            params: vec![],
            return_type,
            err_type: None,
            body,
            receiver: None,
        }
    }

    #[test]
    fn flags_missing_return_on_all_paths() {
        let tables = SymbolTables::new();
        let mut diagnostics = DiagnosticEngine::new();
        let func = simple_function(Type::I32, vec![Statement::Expr(Expr::int(1))]);
        check_function(&func, &tables, &StdlibRegistry::new(), &mut diagnostics);
        assert!(diagnostics.error_count() >= 1);
    }

    #[test]
    fn accepts_return_on_all_paths() {
        let tables = SymbolTables::new();
        let mut diagnostics = DiagnosticEngine::new();
        let func =
            simple_function(Type::I32, vec![Statement::Return(Expr::ok(Expr::int(1)))]);
        check_function(&func, &tables, &StdlibRegistry::new(), &mut diagnostics);
        assert_eq!(diagnostics.error_count(), 0);
    }

    #[test]
    fn binary_mismatched_types_is_an_error() {
        let tables = SymbolTables::new();
        let mut diagnostics = DiagnosticEngine::new();
        let mut env = Env::new();
        let func = simple_function(Type::Bool, vec![]);
        let expr = Expr::binary(BinOp::Add, Expr::int(1), Expr::string("x"));
        infer_expr(&expr, None, &mut env, &func, &tables, &StdlibRegistry::new(), &mut diagnostics);
        assert!(diagnostics.error_count() >= 1);
    }
}
