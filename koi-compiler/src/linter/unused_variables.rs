//! Detects `let`-bound variables and parameters that are never read.

use super::LintRule;
use koi_ast::{Block, Expr, ExprKind, Function, Item, Program, Statement};
use koi_diagnostics::{error_codes, Diagnostic, Span};
use std::collections::{HashMap, HashSet};

pub struct UnusedVariableRule {
    ignore_underscore: bool,
}

impl UnusedVariableRule {
    pub fn new() -> Self {
        Self {
            ignore_underscore: true,
        }
    }

    fn check_function(&self, func: &Function) -> Vec<Diagnostic> {
        let mut declared: HashMap<String, usize> = HashMap::new();
        let mut used: HashSet<String> = HashSet::new();

        for param in &func.params {
            if self.ignore_underscore && param.name.starts_with('_') {
                continue;
            }
            *declared.entry(param.name.clone()).or_insert(0) += 1;
        }

        self.collect_declarations(&func.body, &mut declared);
        self.collect_usages(&func.body, &mut used);

        let mut diagnostics = Vec::new();
        for var_name in declared.keys() {
            if !used.contains(var_name) {
                diagnostics.push(Diagnostic::warning(
                    error_codes::UNUSED_VARIABLE,
                    format!("unused variable: `{}`", var_name),
                    Span::unknown(),
                ));
            }
        }
        diagnostics
    }

    fn collect_declarations(&self, block: &Block, declared: &mut HashMap<String, usize>) {
        for stmt in block {
            match stmt {
                Statement::Let { name, .. } => {
                    if self.ignore_underscore && name.starts_with('_') {
                        continue;
                    }
                    *declared.entry(name.clone()).or_insert(0) += 1;
                }
                Statement::If {
                    then_block,
                    elif_branches,
                    else_block,
                    ..
                } => {
                    self.collect_declarations(then_block, declared);
                    for (_, block) in elif_branches {
                        self.collect_declarations(block, declared);
                    }
                    if let Some(else_blk) = else_block {
                        self.collect_declarations(else_blk, declared);
                    }
                }
                Statement::While { body, .. } => self.collect_declarations(body, declared),
                Statement::Foreach { var_name, body, .. } => {
                    if !(self.ignore_underscore && var_name.starts_with('_')) {
                        *declared.entry(var_name.clone()).or_insert(0) += 1;
                    }
                    self.collect_declarations(body, declared);
                }
                Statement::Match { arms, .. } => {
                    for arm in arms {
                        self.collect_declarations(&arm.body, declared);
                    }
                }
                _ => {}
            }
        }
    }

    fn collect_usages(&self, block: &Block, used: &mut HashSet<String>) {
        for stmt in block {
            match stmt {
                Statement::Let { value, .. } => self.collect_usages_expr(value, used),
                Statement::Rebind { target, value } => {
                    self.collect_usages_expr(target, used);
                    self.collect_usages_expr(value, used);
                }
                Statement::Return(expr) | Statement::Expr(expr) => {
                    self.collect_usages_expr(expr, used)
                }
                Statement::If {
                    cond,
                    then_block,
                    elif_branches,
                    else_block,
                } => {
                    self.collect_usages_expr(cond, used);
                    self.collect_usages(then_block, used);
                    for (elif_cond, elif_block) in elif_branches {
                        self.collect_usages_expr(elif_cond, used);
                        self.collect_usages(elif_block, used);
                    }
                    if let Some(else_blk) = else_block {
                        self.collect_usages(else_blk, used);
                    }
                }
                Statement::While { cond, body } => {
                    self.collect_usages_expr(cond, used);
                    self.collect_usages(body, used);
                }
                Statement::Foreach { iterable, body, .. } => {
                    self.collect_usages_expr(iterable, used);
                    self.collect_usages(body, used);
                }
                Statement::Match { scrutinee, arms } => {
                    self.collect_usages_expr(scrutinee, used);
                    for arm in arms {
                        self.collect_usages(&arm.body, used);
                    }
                }
                Statement::Break | Statement::Continue => {}
            }
        }
    }

    fn collect_usages_expr(&self, expr: &Expr, used: &mut HashSet<String>) {
        match &expr.kind {
            ExprKind::Identifier(name) => {
                used.insert(name.clone());
            }
            ExprKind::Binary { left, right, .. } => {
                self.collect_usages_expr(left, used);
                self.collect_usages_expr(right, used);
            }
            ExprKind::Unary { expr, .. } | ExprKind::Reference { expr, .. } => {
                self.collect_usages_expr(expr, used)
            }
            ExprKind::Call { callee, args } => {
                self.collect_usages_expr(callee, used);
                for arg in args {
                    self.collect_usages_expr(arg.value(), used);
                }
            }
            ExprKind::MethodCall { receiver, args, .. } => {
                self.collect_usages_expr(receiver, used);
                for arg in args {
                    self.collect_usages_expr(arg.value(), used);
                }
            }
            ExprKind::FieldAccess { receiver, .. } => self.collect_usages_expr(receiver, used),
            ExprKind::Index { receiver, index } => {
                self.collect_usages_expr(receiver, used);
                self.collect_usages_expr(index, used);
            }
            ExprKind::StructConstruct { args, .. } => {
                for arg in args {
                    self.collect_usages_expr(arg.value(), used);
                }
            }
            ExprKind::EnumConstruct { args, .. } => {
                for arg in args {
                    self.collect_usages_expr(arg, used);
                }
            }
            ExprKind::Cast { expr, .. } | ExprKind::Try { expr } => {
                self.collect_usages_expr(expr, used)
            }
            ExprKind::ArrayLit(items) => {
                for item in items {
                    self.collect_usages_expr(item, used);
                }
            }
            ExprKind::FString(parts) => {
                for part in parts {
                    if let koi_ast::FStringPart::Expr(e) = part {
                        self.collect_usages_expr(e, used);
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

impl LintRule for UnusedVariableRule {
    fn check(&self, program: &Program) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for item in &program.items {
            match item {
                Item::Function(func) => diagnostics.extend(self.check_function(func)),
                Item::PerkImpl(perk_impl) => {
                    for method in &perk_impl.methods {
                        diagnostics.extend(self.check_function(method));
                    }
                }
                Item::Extension(ext) => {
                    for method in &ext.methods {
                        diagnostics.extend(self.check_function(method));
                    }
                }
                _ => {}
            }
        }
        diagnostics
    }

    fn name(&self) -> &str {
        "unused_variables"
    }
}

impl Default for UnusedVariableRule {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_name() {
        let rule = UnusedVariableRule::new();
        assert_eq!(rule.name(), "unused_variables");
    }
}
