//! Enforces Koi naming conventions: snake_case functions/params/locals,
//! PascalCase struct/enum/perk names, SCREAMING_SNAKE_CASE constants.

use super::LintRule;
use koi_ast::{Item, Program, Statement};
use koi_diagnostics::{error_codes, Diagnostic, Span};

pub struct NamingConventionRule;

impl NamingConventionRule {
    pub fn new() -> Self {
        Self
    }

    fn is_snake_case(name: &str) -> bool {
        if name.is_empty() || name.starts_with('_') {
            return true;
        }
        name.chars().next().unwrap().is_lowercase()
            && name.chars().all(|c| c.is_lowercase() || c.is_numeric() || c == '_')
    }

    fn is_pascal_case(name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let mut chars = name.chars();
        chars.next().unwrap().is_uppercase() && chars.all(|c| c.is_alphanumeric())
    }

    fn is_screaming_snake_case(name: &str) -> bool {
        if name.is_empty() {
            return true;
        }
        name.chars().all(|c| c.is_uppercase() || c.is_numeric() || c == '_')
    }

    fn warn(message: String) -> Diagnostic {
        Diagnostic::warning(error_codes::NAMING_CONVENTION, message, Span::unknown())
    }
}

impl LintRule for NamingConventionRule {
    fn check(&self, program: &Program) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for item in &program.items {
            match item {
                Item::Function(f) => {
                    if !Self::is_snake_case(&f.name) {
                        diagnostics.push(Self::warn(format!(
                            "function `{}` should be snake_case",
                            f.name
                        )));
                    }
                    for param in &f.params {
                        if !Self::is_snake_case(&param.name) {
                            diagnostics.push(Self::warn(format!(
                                "parameter `{}` should be snake_case",
                                param.name
                            )));
                        }
                    }
                    for stmt in &f.body {
                        if let Statement::Let { name, .. } = stmt {
                            if !Self::is_snake_case(name) {
                                diagnostics.push(Self::warn(format!(
                                    "variable `{}` should be snake_case",
                                    name
                                )));
                            }
                        }
                    }
                }
                Item::Struct(s) => {
                    if !Self::is_pascal_case(&s.name) {
                        diagnostics.push(Self::warn(format!(
                            "struct `{}` should be PascalCase",
                            s.name
                        )));
                    }
                }
                Item::Enum(e) => {
                    if !Self::is_pascal_case(&e.name) {
                        diagnostics.push(Self::warn(format!(
                            "enum `{}` should be PascalCase",
                            e.name
                        )));
                    }
                }
                Item::Perk(p) => {
                    if !Self::is_pascal_case(&p.name) {
                        diagnostics.push(Self::warn(format!(
                            "perk `{}` should be PascalCase",
                            p.name
                        )));
                    }
                }
                Item::Const(c) => {
                    if !Self::is_screaming_snake_case(&c.name) {
                        diagnostics.push(Self::warn(format!(
                            "constant `{}` should be SCREAMING_SNAKE_CASE",
                            c.name
                        )));
                    }
                }
                _ => {}
            }
        }
        diagnostics
    }

    fn name(&self) -> &str {
        "naming_convention"
    }

    fn enabled_by_default(&self) -> bool {
        false
    }
}

impl Default for NamingConventionRule {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_name() {
        assert_eq!(NamingConventionRule::new().name(), "naming_convention");
    }

    #[test]
    fn test_case_helpers() {
        assert!(NamingConventionRule::is_snake_case("do_thing"));
        assert!(!NamingConventionRule::is_snake_case("DoThing"));
        assert!(NamingConventionRule::is_pascal_case("StructName"));
        assert!(NamingConventionRule::is_screaming_snake_case("MAX_SIZE"));
    }
}
