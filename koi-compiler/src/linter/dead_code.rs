//! Flags private functions, structs, enums, and consts that are never
//! referenced anywhere else in the program.

use super::LintRule;
use koi_ast::{Expr, ExprKind, Item, Program, Statement};
use koi_diagnostics::{error_codes, Diagnostic, Span};
use std::collections::HashSet;

pub struct DeadCodeRule;

impl DeadCodeRule {
    pub fn new() -> Self {
        Self
    }

    fn collect_references(&self, program: &Program, refs: &mut HashSet<String>) {
        for item in &program.items {
            match item {
                Item::Function(f) => self.walk_block(&f.body, refs),
                Item::PerkImpl(p) => {
                    for m in &p.methods {
                        self.walk_block(&m.body, refs);
                    }
                }
                Item::Extension(e) => {
                    for m in &e.methods {
                        self.walk_block(&m.body, refs);
                    }
                }
                Item::Const(c) => self.walk_expr(&c.value, refs),
                _ => {}
            }
        }
    }

    fn walk_block(&self, block: &[Statement], refs: &mut HashSet<String>) {
        for stmt in block {
            match stmt {
                Statement::Let { value, .. } => self.walk_expr(value, refs),
                Statement::Rebind { target, value } => {
                    self.walk_expr(target, refs);
                    self.walk_expr(value, refs);
                }
                Statement::Return(expr) | Statement::Expr(expr) => self.walk_expr(expr, refs),
                Statement::If {
                    cond,
                    then_block,
                    elif_branches,
                    else_block,
                } => {
                    self.walk_expr(cond, refs);
                    self.walk_block(then_block, refs);
                    for (c, b) in elif_branches {
                        self.walk_expr(c, refs);
                        self.walk_block(b, refs);
                    }
                    if let Some(b) = else_block {
                        self.walk_block(b, refs);
                    }
                }
                Statement::While { cond, body } => {
                    self.walk_expr(cond, refs);
                    self.walk_block(body, refs);
                }
                Statement::Foreach { iterable, body, .. } => {
                    self.walk_expr(iterable, refs);
                    self.walk_block(body, refs);
                }
                Statement::Match { scrutinee, arms } => {
                    self.walk_expr(scrutinee, refs);
                    for arm in arms {
                        self.walk_block(&arm.body, refs);
                    }
                }
                Statement::Break | Statement::Continue => {}
            }
        }
    }

    fn walk_expr(&self, expr: &Expr, refs: &mut HashSet<String>) {
        match &expr.kind {
            ExprKind::Identifier(name) => {
                refs.insert(name.clone());
            }
            ExprKind::Binary { left, right, .. } => {
                self.walk_expr(left, refs);
                self.walk_expr(right, refs);
            }
            ExprKind::Unary { expr, .. } | ExprKind::Reference { expr, .. } => {
                self.walk_expr(expr, refs)
            }
            ExprKind::Call { callee, args } => {
                if let ExprKind::Identifier(name) = &callee.kind {
                    refs.insert(name.clone());
                }
                self.walk_expr(callee, refs);
                for arg in args {
                    self.walk_expr(arg.value(), refs);
                }
            }
            ExprKind::MethodCall { receiver, args, .. } => {
                self.walk_expr(receiver, refs);
                for arg in args {
                    self.walk_expr(arg.value(), refs);
                }
            }
            ExprKind::FieldAccess { receiver, .. } => self.walk_expr(receiver, refs),
            ExprKind::Index { receiver, index } => {
                self.walk_expr(receiver, refs);
                self.walk_expr(index, refs);
            }
            ExprKind::StructConstruct { name, args } => {
                refs.insert(name.clone());
                for arg in args {
                    self.walk_expr(arg.value(), refs);
                }
            }
            ExprKind::EnumConstruct {
                enum_name, args, ..
            } => {
                if let Some(name) = enum_name {
                    refs.insert(name.clone());
                }
                for arg in args {
                    self.walk_expr(arg, refs);
                }
            }
            ExprKind::Cast { expr, .. } | ExprKind::Try { expr } => self.walk_expr(expr, refs),
            ExprKind::ArrayLit(items) => {
                for item in items {
                    self.walk_expr(item, refs);
                }
            }
            ExprKind::FString(parts) => {
                for part in parts {
                    if let koi_ast::FStringPart::Expr(e) = part {
                        self.walk_expr(e, refs);
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
}

impl LintRule for DeadCodeRule {
    fn check(&self, program: &Program) -> Vec<Diagnostic> {
        let mut refs = HashSet::new();
        self.collect_references(program, &mut refs);

        let mut diagnostics = Vec::new();
        for item in &program.items {
            let (kind, name, is_pub) = match item {
                Item::Function(f) if f.name != "main" => ("function", &f.name, f.is_pub),
                Item::Struct(s) => ("struct", &s.name, s.is_pub),
                Item::Enum(e) => ("enum", &e.name, e.is_pub),
                Item::Const(c) => ("constant", &c.name, false),
                _ => continue,
            };
            if is_pub || refs.contains(name) {
                continue;
            }
            diagnostics.push(Diagnostic::warning(
                error_codes::DEAD_CODE,
                format!("{} `{}` is never used", kind, name),
                Span::unknown(),
            ));
        }
        diagnostics
    }

    fn name(&self) -> &str {
        "dead_code"
    }
}

impl Default for DeadCodeRule {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_name() {
        assert_eq!(DeadCodeRule::new().name(), "dead_code");
    }
}
