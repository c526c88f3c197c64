//! Pass 1: lexical scope, shadowing, unused-variable warnings.

use crate::tables::SymbolTables;
use koi_ast::{Block, Expr, ExprKind, Function, Item, Pattern, Program, Statement};
use koi_diagnostics::{error_codes, Diagnostic, DiagnosticEngine, Span};

struct Binding {
    name: String,
    used: bool,
}

struct ScopeStack {
    scopes: Vec<Vec<Binding>>,
}

impl ScopeStack {
    fn new() -> Self {
        Self { scopes: vec![Vec::new()] }
    }

    fn push(&mut self) {
        self.scopes.push(Vec::new());
    }

    fn pop(&mut self, diagnostics: &mut DiagnosticEngine) {
        let popped = self.scopes.pop().expect("scope underflow");
        for binding in popped {
            if !binding.used && !binding.name.starts_with('_') && binding.name != "self" {
                diagnostics.emit(Diagnostic::warning(
                    error_codes::UNUSED_VARIABLE,
                    format!("unused variable: `{}`", binding.name),
                    Span::unknown(),
                ));
            }
        }
    }

    /// Declares `name`, warning if it shadows a binding in an *enclosing*
    /// (not the current) scope.
    fn declare(&mut self, name: &str, diagnostics: &mut DiagnosticEngine) {
        if name == "_" {
            return;
        }
        let shadows_outer = self
            .scopes
            .iter()
            .rev()
            .skip(1)
            .any(|scope| scope.iter().any(|b| b.name == name));
        if shadows_outer {
            diagnostics.emit(Diagnostic::warning(
                error_codes::SHADOWED_BINDING,
                format!("binding `{name}` shadows an outer variable"),
                Span::unknown(),
            ));
        }
        self.scopes
            .last_mut()
            .unwrap()
            .push(Binding { name: name.to_string(), used: false });
    }

    fn resolve(&mut self, name: &str) -> bool {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(binding) = scope.iter_mut().find(|b| b.name == name) {
                binding.used = true;
                return true;
            }
        }
        false
    }
}

pub fn run(program: &Program, tables: &SymbolTables, diagnostics: &mut DiagnosticEngine) {
    for item in &program.items {
        match item {
            Item::Function(f) => check_function(f, tables, diagnostics),
            Item::PerkImpl(p) => {
                for m in &p.methods {
                    check_function(m, tables, diagnostics);
                }
            }
            Item::Extension(e) => {
                for m in &e.methods {
                    check_function(m, tables, diagnostics);
                }
            }
            _ => {}
        }
    }
}

fn check_function(func: &Function, tables: &SymbolTables, diagnostics: &mut DiagnosticEngine) {
    let mut scopes = ScopeStack::new();

    // Implicit `self` (extension/perk-impl methods) is never warned about.
    if func.receiver.is_some() {
        scopes.scopes[0].push(Binding { name: "self".to_string(), used: true });
    }
    for param in &func.params {
        scopes.declare(&param.name, diagnostics);
    }

    check_block(&func.body, &mut scopes, tables, diagnostics);
    scopes.pop(diagnostics);
}

fn check_block(
    block: &Block,
    scopes: &mut ScopeStack,
    tables: &SymbolTables,
    diagnostics: &mut DiagnosticEngine,
) {
    for stmt in block {
        check_statement(stmt, scopes, tables, diagnostics);
    }
}

fn check_statement(
    stmt: &Statement,
    scopes: &mut ScopeStack,
    tables: &SymbolTables,
    diagnostics: &mut DiagnosticEngine,
) {
    match stmt {
        Statement::Let { name, value, .. } => {
            check_expr(value, scopes, tables, diagnostics);
            scopes.declare(name, diagnostics);
        }
        Statement::Rebind { target, value } => {
            check_expr(target, scopes, tables, diagnostics);
            check_expr(value, scopes, tables, diagnostics);
        }
        Statement::Return(expr) | Statement::Expr(expr) => {
            check_expr(expr, scopes, tables, diagnostics)
        }
        Statement::If { cond, then_block, elif_branches, else_block } => {
            check_expr(cond, scopes, tables, diagnostics);
            scopes.push();
            check_block(then_block, scopes, tables, diagnostics);
            scopes.pop(diagnostics);
            for (elif_cond, elif_block) in elif_branches {
                check_expr(elif_cond, scopes, tables, diagnostics);
                scopes.push();
                check_block(elif_block, scopes, tables, diagnostics);
                scopes.pop(diagnostics);
            }
            if let Some(else_blk) = else_block {
                scopes.push();
                check_block(else_blk, scopes, tables, diagnostics);
                scopes.pop(diagnostics);
            }
        }
        Statement::While { cond, body } => {
            check_expr(cond, scopes, tables, diagnostics);
            scopes.push();
            check_block(body, scopes, tables, diagnostics);
            scopes.pop(diagnostics);
        }
        Statement::Foreach { var_name, iterable, body, .. } => {
            check_expr(iterable, scopes, tables, diagnostics);
            scopes.push();
            scopes.declare(var_name, diagnostics);
            check_block(body, scopes, tables, diagnostics);
            scopes.pop(diagnostics);
        }
        Statement::Match { scrutinee, arms } => {
            check_expr(scrutinee, scopes, tables, diagnostics);
            for arm in arms {
                scopes.push();
                declare_pattern(&arm.pattern, scopes, diagnostics);
                check_block(&arm.body, scopes, tables, diagnostics);
                scopes.pop(diagnostics);
            }
        }
        Statement::Break | Statement::Continue => {}
    }
}

fn declare_pattern(pattern: &Pattern, scopes: &mut ScopeStack, diagnostics: &mut DiagnosticEngine) {
    match pattern {
        Pattern::Wildcard => {}
        Pattern::Binding(name) => scopes.declare(name, diagnostics),
        Pattern::EnumVariant { bindings, .. } => {
            for b in bindings {
                declare_pattern(b, scopes, diagnostics);
            }
        }
        Pattern::Own(inner) => declare_pattern(inner, scopes, diagnostics),
    }
}

fn check_expr(
    expr: &Expr,
    scopes: &mut ScopeStack,
    tables: &SymbolTables,
    diagnostics: &mut DiagnosticEngine,
) {
    match &expr.kind {
        ExprKind::Identifier(name) => {
            // Constants and known stdlib stream names shadow lookup
            // without counting as a variable reference.
            if matches!(name.as_str(), "stdin" | "stdout" | "stderr") {
                return;
            }
            if tables.constants.contains_key(name) {
                return;
            }
            if !scopes.resolve(name) {
                diagnostics.emit(Diagnostic::error(
                    error_codes::UNDEFINED_VARIABLE,
                    format!("cannot find `{name}` in this scope"),
                    Span::unknown(),
                ));
            }
        }
        ExprKind::Binary { left, right, .. } => {
            check_expr(left, scopes, tables, diagnostics);
            check_expr(right, scopes, tables, diagnostics);
        }
        ExprKind::Unary { expr, .. } | ExprKind::Reference { expr, .. } => {
            check_expr(expr, scopes, tables, diagnostics)
        }
        ExprKind::Call { callee, args } => {
            // A bare identifier callee that is a known function/struct/enum
            // name is not a variable reference.
            if let ExprKind::Identifier(name) = &callee.kind {
                if !is_callable_symbol(name, tables) {
                    check_expr(callee, scopes, tables, diagnostics);
                }
            } else {
                check_expr(callee, scopes, tables, diagnostics);
            }
            for arg in args {
                check_expr(arg.value(), scopes, tables, diagnostics);
            }
        }
        ExprKind::MethodCall { receiver, args, .. } => {
            check_expr(receiver, scopes, tables, diagnostics);
            for arg in args {
                check_expr(arg.value(), scopes, tables, diagnostics);
            }
        }
        ExprKind::FieldAccess { receiver, .. } => check_expr(receiver, scopes, tables, diagnostics),
        ExprKind::Index { receiver, index } => {
            check_expr(receiver, scopes, tables, diagnostics);
            check_expr(index, scopes, tables, diagnostics);
        }
        ExprKind::StructConstruct { args, .. } => {
            for arg in args {
                check_expr(arg.value(), scopes, tables, diagnostics);
            }
        }
        ExprKind::EnumConstruct { args, .. } => {
            for arg in args {
                check_expr(arg, scopes, tables, diagnostics);
            }
        }
        ExprKind::Cast { expr, .. } | ExprKind::Try { expr } => {
            check_expr(expr, scopes, tables, diagnostics)
        }
        ExprKind::ArrayLit(items) => {
            for item in items {
                check_expr(item, scopes, tables, diagnostics);
            }
        }
        ExprKind::FString(parts) => {
            for part in parts {
                if let koi_ast::FStringPart::Expr(e) = part {
                    check_expr(e, scopes, tables, diagnostics);
                }
            }
        }
        ExprKind::IntLit(_)
        | ExprKind::FloatLit(_)
        | ExprKind::BoolLit(_)
        | ExprKind::StringLit(_)
        | ExprKind::BlankLit => {}
    }
}

fn is_callable_symbol(name: &str, tables: &SymbolTables) -> bool {
    tables.functions.contains_key(name)
        || tables.generic_functions.contains_key(name)
        || tables.structs.contains_key(name)
        || tables.generic_structs.contains_key(name)
        || tables.enums.contains_key(name)
        || tables.generic_enums.contains_key(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use koi_ast::{Param, Type};

    #[test]
    fn flags_undefined_variable() {
        let tables = SymbolTables::new();
        let mut diagnostics = DiagnosticEngine::new();
        let func = Function {
            name: "f".to_string(),
            is_pub: false,
            type_params: vec![],
            params: vec![],
            return_type: Type::Blank,
            err_type: None,
            body: vec![Statement::Expr(Expr::ident("missing"))],
            receiver: None,
        };
        check_function(&func, &tables, &mut diagnostics);
        assert_eq!(diagnostics.error_count(), 1);
    }

    #[test]
    fn warns_on_unused_parameter() {
        let tables = SymbolTables::new();
        let mut diagnostics = DiagnosticEngine::new();
        let func = Function {
            name: "f".to_string(),
            is_pub: false,
            type_params: vec![],
            params: vec![Param { name: "x".to_string(), ty: Type::I32 }],
            return_type: Type::Blank,
            err_type: None,
            body: vec![],
            receiver: None,
        };
        check_function(&func, &tables, &mut diagnostics);
        assert_eq!(diagnostics.warning_count(), 1);
    }
}
