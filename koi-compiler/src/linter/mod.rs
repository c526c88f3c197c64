//! Lint passes that run after type validation: style/dead-code warnings
//! that don't block codegen (CW90xx in koi_diagnostics::error_codes).

mod dead_code;
mod naming_convention;
mod unreachable_code;
mod unused_variables;

pub use dead_code::DeadCodeRule;
pub use naming_convention::NamingConventionRule;
pub use unreachable_code::UnreachableCodeRule;
pub use unused_variables::UnusedVariableRule;

use koi_ast::Program;
use koi_diagnostics::{Diagnostic, DiagnosticEngine};

pub trait LintRule {
    fn check(&self, program: &Program) -> Vec<Diagnostic>;
    fn name(&self) -> &str;
    fn enabled_by_default(&self) -> bool {
        true
    }
}

pub struct Linter {
    rules: Vec<Box<dyn LintRule>>,
    diagnostics: DiagnosticEngine,
}

impl Linter {
    pub fn new() -> Self {
        let mut linter = Self::empty();
        linter.add_rule(Box::new(UnusedVariableRule::new()));
        linter.add_rule(Box::new(DeadCodeRule::new()));
        linter.add_rule(Box::new(UnreachableCodeRule::new()));
        linter.add_rule(Box::new(NamingConventionRule::new()));
        linter
    }

    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            diagnostics: DiagnosticEngine::new(),
        }
    }

    pub fn add_rule(&mut self, rule: Box<dyn LintRule>) {
        self.rules.push(rule);
    }

    pub fn lint(&mut self, program: &Program) -> Vec<Diagnostic> {
        let mut all = Vec::new();
        for rule in &self.rules {
            if rule.enabled_by_default() {
                all.extend(rule.check(program));
            }
        }
        for diag in all.clone() {
            self.diagnostics.emit(diag);
        }
        all
    }

    pub fn diagnostics(&self) -> &DiagnosticEngine {
        &self.diagnostics
    }

    pub fn has_warnings(&self) -> bool {
        self.diagnostics.warning_count() > 0
    }
}

impl Default for Linter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linter_creation() {
        let linter = Linter::new();
        assert_eq!(linter.rules.len(), 4);
    }

    #[test]
    fn test_empty_linter() {
        let linter = Linter::empty();
        assert!(linter.rules.is_empty());
    }
}
