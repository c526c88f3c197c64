//! Flags statements following a `return`/`break`/`continue` in the same block.

use super::LintRule;
use koi_ast::{Block, Function, Item, Program, Statement};
use koi_diagnostics::{error_codes, Diagnostic, Span};

pub struct UnreachableCodeRule;

impl UnreachableCodeRule {
    pub fn new() -> Self {
        Self
    }

    fn check_function(&self, func: &Function) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        self.check_block(&func.body, &mut diagnostics);
        diagnostics
    }

    /// Returns true if the block definitely diverges (every path returns/breaks/continues).
    fn check_block(&self, block: &Block, diagnostics: &mut Vec<Diagnostic>) -> bool {
        let mut diverged = false;
        for stmt in block {
            if diverged {
                diagnostics.push(Diagnostic::warning(
                    error_codes::UNREACHABLE_CODE,
                    "unreachable code".to_string(),
                    Span::unknown(),
                ));
                break;
            }
            match stmt {
                Statement::Return(_) | Statement::Break | Statement::Continue => {
                    diverged = true;
                }
                Statement::If {
                    then_block,
                    elif_branches,
                    else_block,
                    ..
                } => {
                    let mut all_diverge = self.check_block(then_block, diagnostics);
                    for (_, b) in elif_branches {
                        all_diverge &= self.check_block(b, diagnostics);
                    }
                    if let Some(b) = else_block {
                        all_diverge &= self.check_block(b, diagnostics);
                    } else {
                        all_diverge = false;
                    }
                    diverged = all_diverge;
                }
                Statement::While { body, .. } => {
                    self.check_block(body, diagnostics);
                }
                Statement::Foreach { body, .. } => {
                    self.check_block(body, diagnostics);
                }
                Statement::Match { arms, .. } => {
                    let mut all_diverge = !arms.is_empty();
                    for arm in arms {
                        all_diverge &= self.check_block(&arm.body, diagnostics);
                    }
                    diverged = all_diverge;
                }
                Statement::Let { .. } | Statement::Rebind { .. } | Statement::Expr(_) => {}
            }
        }
        diverged
    }
}

impl LintRule for UnreachableCodeRule {
    fn check(&self, program: &Program) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for item in &program.items {
            match item {
                Item::Function(f) => diagnostics.extend(self.check_function(f)),
                Item::PerkImpl(p) => {
                    for m in &p.methods {
                        diagnostics.extend(self.check_function(m));
                    }
                }
                Item::Extension(e) => {
                    for m in &e.methods {
                        diagnostics.extend(self.check_function(m));
                    }
                }
                _ => {}
            }
        }
        diagnostics
    }

    fn name(&self) -> &str {
        "unreachable_code"
    }
}

impl Default for UnreachableCodeRule {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_name() {
        assert_eq!(UnreachableCodeRule::new().name(), "unreachable_code");
    }
}
