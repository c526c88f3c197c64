//! Pass 3: borrow checking.
//!
//! Per-variable state (`moved`) persists across statements within a
//! function; peek/poke borrow counts are recomputed fresh for each
//! statement, since a borrow never outlives the statement that takes it
//! (Koi has no lexical-lifetime borrows, only argument-position ones).
//! Move-only types are exactly `DynamicArray<T>` and `Own<T>` (the language definition
//! Glossary) — everything else is copied freely.

use koi_ast::{
    Block, Expr, ExprKind, FStringPart, Function, Item, Pattern, Program, Statement, Type,
};
use koi_diagnostics::{error_codes, Diagnostic, DiagnosticEngine, Span};
use std::collections::HashMap;

struct VarState {
    ty: Type,
    moved: bool,
    /// Set by an explicit `.destroy()` call, distinct from `moved`: a moved
    /// value's storage was handed to someone else, a destroyed value's
    /// storage was torn down in place. Both forbid further use, but only
    /// the latter is reported as `USE_AFTER_DESTROY`.
    destroyed: bool,
    /// `true` for `Let`/`foreach`/match-arm bindings; `false` for params and
    /// `self`, whose backing storage belongs to the caller.
    is_local: bool,
}

pub fn run(program: &Program, _tables: &crate::tables::SymbolTables, diagnostics: &mut DiagnosticEngine) {
    for item in &program.items {
        match item {
            Item::Function(f) => check_function(f, diagnostics),
            Item::PerkImpl(p) => {
                for m in &p.methods {
                    check_function(m, diagnostics);
                }
            }
            Item::Extension(e) => {
                for m in &e.methods {
                    check_function(m, diagnostics);
                }
            }
            _ => {}
        }
    }
}

fn check_function(func: &Function, diagnostics: &mut DiagnosticEngine) {
    let mut vars: HashMap<String, VarState> = HashMap::new();
    if let Some(receiver) = &func.receiver {
        vars.insert("self".to_string(), VarState { ty: receiver.clone(), moved: false, destroyed: false, is_local: false });
    }
    for param in &func.params {
        vars.insert(param.name.clone(), VarState { ty: param.ty.clone(), moved: false, destroyed: false, is_local: false });
    }
    check_block(&func.body, &mut vars, diagnostics);
}

fn check_block(block: &Block, vars: &mut HashMap<String, VarState>, diagnostics: &mut DiagnosticEngine) {
    for stmt in block {
        check_statement(stmt, vars, diagnostics);
    }
}

fn check_statement(stmt: &Statement, vars: &mut HashMap<String, VarState>, diagnostics: &mut DiagnosticEngine) {
    match stmt {
        Statement::Let { name, ty, value } => {
            check_expr(value, vars, diagnostics);
            vars.insert(
                name.clone(),
                VarState { ty: ty.clone().unwrap_or_else(|| Type::Unknown(name.clone())), moved: false, destroyed: false, is_local: true },
            );
        }
        Statement::Rebind { target, value } => {
            let mut borrows = HashMap::new();
            collect_borrows(target, &mut borrows);
            collect_borrows(value, &mut borrows);
            flag_borrow_conflicts(&borrows, diagnostics);
            check_moves(target, vars, diagnostics);
            check_moves(value, vars, diagnostics);
            if let ExprKind::Identifier(name) = &target.kind {
                if let Some(state) = vars.get_mut(name) {
                    state.moved = false;
                }
            }
        }
        Statement::Return(expr) => {
            check_expr(expr, vars, diagnostics);
            check_dangling_return(expr, vars, diagnostics);
        }
        Statement::Expr(expr) => check_expr(expr, vars, diagnostics),
        Statement::If { cond, then_block, elif_branches, else_block } => {
            check_expr(cond, vars, diagnostics);
            check_block(then_block, vars, diagnostics);
            for (c, b) in elif_branches {
                check_expr(c, vars, diagnostics);
                check_block(b, vars, diagnostics);
            }
            if let Some(b) = else_block {
                check_block(b, vars, diagnostics);
            }
        }
        Statement::While { cond, body } => {
            check_expr(cond, vars, diagnostics);
            check_block(body, vars, diagnostics);
        }
        Statement::Foreach { var_name, item_type, iterable, body } => {
            check_expr(iterable, vars, diagnostics);
            vars.insert(
                var_name.clone(),
                VarState {
                    ty: item_type.clone().unwrap_or_else(|| Type::Unknown(var_name.clone())),
                    moved: false,
                    destroyed: false,
                    is_local: true,
                },
            );
            check_block(body, vars, diagnostics);
        }
        Statement::Match { scrutinee, arms } => {
            check_expr(scrutinee, vars, diagnostics);
            for arm in arms {
                declare_pattern(&arm.pattern, vars);
                check_block(&arm.body, vars, diagnostics);
            }
        }
        Statement::Break | Statement::Continue => {}
    }
}

fn declare_pattern(pattern: &Pattern, vars: &mut HashMap<String, VarState>) {
    match pattern {
        Pattern::Wildcard => {}
        Pattern::Binding(name) => {
            vars.insert(name.clone(), VarState { ty: Type::Unknown(name.clone()), moved: false, destroyed: false, is_local: true });
        }
        Pattern::EnumVariant { bindings, .. } => {
            for b in bindings {
                declare_pattern(b, vars);
            }
        }
        Pattern::Own(inner) => declare_pattern(inner, vars),
    }
}

fn check_expr(expr: &Expr, vars: &mut HashMap<String, VarState>, diagnostics: &mut DiagnosticEngine) {
    let mut borrows = HashMap::new();
    collect_borrows(expr, &mut borrows);
    flag_borrow_conflicts(&borrows, diagnostics);
    check_moves(expr, vars, diagnostics);
}

/// Tallies `(peek, poke)` borrow counts per root variable name within a
/// single statement's expression tree.
fn collect_borrows(expr: &Expr, borrows: &mut HashMap<String, (u32, u32)>) {
    match &expr.kind {
        ExprKind::Reference { mode, expr: inner } => {
            if let Some(name) = root_identifier(inner) {
                let entry = borrows.entry(name).or_insert((0, 0));
                match mode {
                    koi_ast::BorrowMode::Peek => entry.0 += 1,
                    koi_ast::BorrowMode::Poke => entry.1 += 1,
                }
            }
            collect_borrows(inner, borrows);
        }
        ExprKind::Binary { left, right, .. } => {
            collect_borrows(left, borrows);
            collect_borrows(right, borrows);
        }
        ExprKind::Unary { expr: inner, .. } => collect_borrows(inner, borrows),
        ExprKind::Call { callee, args } => {
            collect_borrows(callee, borrows);
            for a in args {
                collect_borrows(a.value(), borrows);
            }
        }
        ExprKind::MethodCall { receiver, args, .. } => {
            collect_borrows(receiver, borrows);
            for a in args {
                collect_borrows(a.value(), borrows);
            }
        }
        ExprKind::FieldAccess { receiver, .. } => collect_borrows(receiver, borrows),
        ExprKind::Index { receiver, index } => {
            collect_borrows(receiver, borrows);
            collect_borrows(index, borrows);
        }
        ExprKind::StructConstruct { args, .. } => {
            for a in args {
                collect_borrows(a.value(), borrows);
            }
        }
        ExprKind::EnumConstruct { args, .. } => {
            for a in args {
                collect_borrows(a, borrows);
            }
        }
        ExprKind::Cast { expr: inner, .. } | ExprKind::Try { expr: inner } => collect_borrows(inner, borrows),
        ExprKind::ArrayLit(items) => {
            for item in items {
                collect_borrows(item, borrows);
            }
        }
        ExprKind::FString(parts) => {
            for part in parts {
                if let FStringPart::Expr(e) = part {
                    collect_borrows(e, borrows);
                }
            }
        }
        _ => {}
    }
}

fn root_identifier(expr: &Expr) -> Option<String> {
    match &expr.kind {
        ExprKind::Identifier(name) => Some(name.clone()),
        ExprKind::FieldAccess { receiver, .. } | ExprKind::Index { receiver, .. } => root_identifier(receiver),
        _ => None,
    }
}

fn flag_borrow_conflicts(borrows: &HashMap<String, (u32, u32)>, diagnostics: &mut DiagnosticEngine) {
    for (name, (peek, poke)) in borrows {
        if *poke > 1 {
            diagnostics.emit(Diagnostic::error(
                error_codes::MULTIPLE_EXCLUSIVE_BORROW,
                format!("`{name}` is poked more than once in the same expression"),
                Span::unknown(),
            ));
        } else if *poke == 1 && *peek > 0 {
            diagnostics.emit(Diagnostic::error(
                error_codes::PEEK_POKE_CONFLICT,
                format!("`{name}` is both peeked and poked in the same expression"),
                Span::unknown(),
            ));
        }
    }
}

/// Walks `expr` in evaluation order, flagging use-after-move/destroy and
/// marking move-only bindings moved the first time they're consumed by
/// value ("move semantics").
fn check_moves(expr: &Expr, vars: &mut HashMap<String, VarState>, diagnostics: &mut DiagnosticEngine) {
    match &expr.kind {
        ExprKind::Identifier(name) => note_use(name, false, vars, diagnostics),
        ExprKind::Reference { expr: inner, .. } => {
            if let ExprKind::Identifier(name) = &inner.kind {
                note_use(name, true, vars, diagnostics);
            } else {
                check_moves(inner, vars, diagnostics);
            }
        }
        ExprKind::Binary { left, right, .. } => {
            check_moves(left, vars, diagnostics);
            check_moves(right, vars, diagnostics);
        }
        ExprKind::Unary { expr: inner, .. } => check_moves(inner, vars, diagnostics),
        ExprKind::Call { callee, args } => {
            check_moves(callee, vars, diagnostics);
            for a in args {
                check_moves(a.value(), vars, diagnostics);
            }
        }
        ExprKind::MethodCall { receiver, method, args } => {
            check_moves(receiver, vars, diagnostics);
            for a in args {
                check_moves(a.value(), vars, diagnostics);
            }
            if method == "destroy" {
                if let ExprKind::Identifier(name) = &receiver.kind {
                    if let Some(state) = vars.get_mut(name) {
                        state.destroyed = true;
                    }
                }
            }
        }
        ExprKind::FieldAccess { receiver, .. } => check_moves(receiver, vars, diagnostics),
        ExprKind::Index { receiver, index } => {
            check_moves(receiver, vars, diagnostics);
            check_moves(index, vars, diagnostics);
        }
        ExprKind::StructConstruct { args, .. } => {
            for a in args {
                check_moves(a.value(), vars, diagnostics);
            }
        }
        ExprKind::EnumConstruct { args, .. } => {
            for a in args {
                check_moves(a, vars, diagnostics);
            }
        }
        ExprKind::Cast { expr: inner, .. } | ExprKind::Try { expr: inner } => check_moves(inner, vars, diagnostics),
        ExprKind::ArrayLit(items) => {
            for item in items {
                check_moves(item, vars, diagnostics);
            }
        }
        ExprKind::FString(parts) => {
            for part in parts {
                if let FStringPart::Expr(e) = part {
                    check_moves(e, vars, diagnostics);
                }
            }
        }
        _ => {}
    }
}

fn note_use(name: &str, via_reference: bool, vars: &mut HashMap<String, VarState>, diagnostics: &mut DiagnosticEngine) {
    let Some(state) = vars.get_mut(name) else { return };
    if state.destroyed {
        diagnostics.emit(Diagnostic::error(
            error_codes::USE_AFTER_DESTROY,
            format!("use of `{name}` after it was destroyed"),
            Span::unknown(),
        ));
        return;
    }
    if state.moved {
        diagnostics.emit(Diagnostic::error(
            error_codes::USE_AFTER_MOVE,
            format!("use of `{name}` after its value was moved out"),
            Span::unknown(),
        ));
        return;
    }
    if !via_reference && is_move_only(&state.ty) {
        state.moved = true;
    }
}

fn check_dangling_return(expr: &Expr, vars: &HashMap<String, VarState>, diagnostics: &mut DiagnosticEngine) {
    if let ExprKind::Reference { expr: inner, .. } = &expr.kind {
        if let ExprKind::Identifier(name) = &inner.kind {
            if vars.get(name).map_or(false, |s| s.is_local) {
                diagnostics.emit(Diagnostic::error(
                    error_codes::RETURN_LOCAL_REF,
                    format!("`{name}` does not live long enough to be returned by reference"),
                    Span::unknown(),
                ));
            }
        }
    }
}

/// Move-only types ("move-only"): dynamic arrays and
/// `Own<T>`, the latter surviving monomorphization as a `Struct`/`Enum`
/// whose canonical name starts with `Own<` (see `mangling::canonical_name`).
fn is_move_only(ty: &Type) -> bool {
    match ty {
        Type::DynamicArray(_) => true,
        Type::GenericRef { base_name, .. } => base_name == "Own",
        Type::Struct { name, .. } | Type::Enum { name, .. } => name == "Own" || name.starts_with("Own<"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use koi_ast::{Arg, Param};

    fn function_with(params: Vec<Param>, body: Block) -> Function {
        Function {
            name: "f".to_string(),
            is_pub: false,
            type_params: vec![],
            params,
            return_type: Type::Blank,
            err_type: None,
            body,
            receiver: None,
        }
    }

    #[test]
    fn flags_use_after_move_of_dynamic_array() {
        let mut diagnostics = DiagnosticEngine::new();
        let param = Param { name: "xs".to_string(), ty: Type::DynamicArray(Box::new(Type::I32)) };
        let consume = Statement::Expr(Expr::call(Expr::ident("consume"), vec![Arg::Positional(Expr::ident("xs"))]));
        let reuse = Statement::Expr(Expr::call(Expr::ident("consume"), vec![Arg::Positional(Expr::ident("xs"))]));
        let func = function_with(vec![param], vec![consume, reuse]);
        check_function(&func, &mut diagnostics);
        assert!(diagnostics.error_count() >= 1);
    }

    #[test]
    fn flags_peek_poke_conflict_in_one_expression() {
        let mut diagnostics = DiagnosticEngine::new();
        let param = Param { name: "x".to_string(), ty: Type::I32 };
        let expr = Expr::call(
            Expr::ident("combine"),
            vec![
                Arg::Positional(Expr::reference(koi_ast::BorrowMode::Peek, Expr::ident("x"))),
                Arg::Positional(Expr::reference(koi_ast::BorrowMode::Poke, Expr::ident("x"))),
            ],
        );
        let func = function_with(vec![param], vec![Statement::Expr(expr)]);
        check_function(&func, &mut diagnostics);
        assert!(diagnostics.error_count() >= 1);
    }

    #[test]
    fn flags_return_of_reference_to_local() {
        let mut diagnostics = DiagnosticEngine::new();
        let let_stmt = Statement::Let { name: "local".to_string(), ty: Some(Type::I32), value: Expr::int(1) };
        let ret = Statement::Return(Expr::reference(koi_ast::BorrowMode::Peek, Expr::ident("local")));
        let func = function_with(vec![], vec![let_stmt, ret]);
        check_function(&func, &mut diagnostics);
        assert!(diagnostics.error_count() >= 1);
    }

    #[test]
    fn flags_use_after_destroy_even_by_reference() {
        let mut diagnostics = DiagnosticEngine::new();
        let param = Param { name: "r".to_string(), ty: Type::Struct { name: "Resource".to_string(), generic_args: vec![] } };
        let destroy = Statement::Expr(Expr::method_call(Expr::ident("r"), "destroy", vec![]));
        let reuse = Statement::Expr(Expr::reference(koi_ast::BorrowMode::Peek, Expr::ident("r")));
        let func = function_with(vec![param], vec![destroy, reuse]);
        check_function(&func, &mut diagnostics);
        assert!(diagnostics.error_count() >= 1);
    }

    #[test]
    fn allows_repeated_peeks() {
        let mut diagnostics = DiagnosticEngine::new();
        let param = Param { name: "x".to_string(), ty: Type::I32 };
        let expr = Expr::call(
            Expr::ident("combine"),
            vec![
                Arg::Positional(Expr::reference(koi_ast::BorrowMode::Peek, Expr::ident("x"))),
                Arg::Positional(Expr::reference(koi_ast::BorrowMode::Peek, Expr::ident("x"))),
            ],
        );
        let func = function_with(vec![param], vec![Statement::Expr(expr)]);
        check_function(&func, &mut diagnostics);
        assert_eq!(diagnostics.error_count(), 0);
    }
}
