//! Pass 0: symbol collection.

use crate::tables::{
    EnumEntry, ExtensionEntry, FunctionEntry, GenericEnumEntry, GenericFunctionEntry,
    GenericStructEntry, PerkImplEntry, StructEntry, SymbolTables,
};
use koi_ast::{EnumDef, EnumVariant, Item, Program, StructDef, Type, TypeParam};
use koi_diagnostics::{error_codes, Diagnostic, DiagnosticEngine, Span};

pub fn run(program: &Program, tables: &mut SymbolTables, diagnostics: &mut DiagnosticEngine) {
    register_builtin_result_and_maybe(tables);

    for item in &program.items {
        match item {
            Item::Function(f) => {
                if check_duplicate(tables, &f.name, diagnostics) {
                    continue;
                }
                if f.is_generic() {
                    tables.generic_functions.insert(
                        f.name.clone(),
                        GenericFunctionEntry {
                            def: f.clone(),
                            type_params: f.type_params.clone(),
                        },
                    );
                } else {
                    tables
                        .functions
                        .insert(f.name.clone(), FunctionEntry { def: f.clone() });
                }
            }
            Item::Struct(s) => {
                if check_duplicate(tables, &s.name, diagnostics) {
                    continue;
                }
                if s.is_generic() {
                    tables.generic_structs.insert(
                        s.name.clone(),
                        GenericStructEntry {
                            def: s.clone(),
                            type_params: s.type_params.clone(),
                        },
                    );
                } else {
                    tables.structs.insert(
                        s.name.clone(),
                        StructEntry {
                            def: s.clone(),
                            is_pub: s.is_pub,
                        },
                    );
                }
            }
            Item::Enum(e) => {
                if check_duplicate(tables, &e.name, diagnostics) {
                    continue;
                }
                if e.is_generic() {
                    tables.generic_enums.insert(
                        e.name.clone(),
                        GenericEnumEntry {
                            def: e.clone(),
                            type_params: e.type_params.clone(),
                        },
                    );
                } else {
                    tables.enums.insert(
                        e.name.clone(),
                        EnumEntry {
                            def: e.clone(),
                            is_pub: e.is_pub,
                        },
                    );
                }
            }
            Item::Perk(p) => {
                if check_duplicate(tables, &p.name, diagnostics) {
                    continue;
                }
                tables.perks.insert(p.name.clone(), p.clone());
            }
            Item::PerkImpl(impl_) => {
                let target_name = crate::mangling::type_name(&impl_.target_type);
                tables.perk_impls.insert(
                    (target_name, impl_.perk_name.clone()),
                    PerkImplEntry {
                        perk_impl: impl_.clone(),
                    },
                );
            }
            Item::Extension(ext) => {
                let target_name = crate::mangling::type_name(&ext.target_type);
                for method in &ext.methods {
                    tables.extensions.insert(
                        (target_name.clone(), method.name.clone()),
                        ExtensionEntry {
                            target_type: ext.target_type.clone(),
                            method: method.clone(),
                        },
                    );
                }
            }
            Item::Const(c) => {
                if check_duplicate(tables, &c.name, diagnostics) {
                    continue;
                }
                tables.constants.insert(c.name.clone(), c.clone());
            }
        }
    }
}

fn check_duplicate(tables: &SymbolTables, name: &str, diagnostics: &mut DiagnosticEngine) -> bool {
    if tables.is_defined(name) {
        diagnostics.emit(Diagnostic::error(
            error_codes::DUPLICATE_DEFINITION,
            format!("`{name}` is defined more than once"),
            Span::unknown(),
        ));
        true
    } else {
        false
    }
}

/// Registers `Result<Ok, Err>` and `Maybe<T>` as built-in generic enum
/// templates (the canonical-naming invariant), so Pass 1.5/1.6 monomorphize them the
/// same way as user-defined generics rather than special-casing them.
fn register_builtin_result_and_maybe(tables: &mut SymbolTables) {
    tables.generic_enums.insert(
        "Result".to_string(),
        GenericEnumEntry {
            def: EnumDef {
                name: "Result".to_string(),
                is_pub: true,
                type_params: vec![
                    TypeParam { name: "Ok".to_string(), bounds: vec![] },
                    TypeParam { name: "Err".to_string(), bounds: vec![] },
                ],
                variants: vec![
                    EnumVariant {
                        name: "Ok".to_string(),
                        associated_types: vec![Type::TypeParameter("Ok".to_string())],
                    },
                    EnumVariant {
                        name: "Err".to_string(),
                        associated_types: vec![Type::TypeParameter("Err".to_string())],
                    },
                ],
            },
            type_params: vec![
                TypeParam { name: "Ok".to_string(), bounds: vec![] },
                TypeParam { name: "Err".to_string(), bounds: vec![] },
            ],
        },
    );

    tables.generic_enums.insert(
        "Maybe".to_string(),
        GenericEnumEntry {
            def: EnumDef {
                name: "Maybe".to_string(),
                is_pub: true,
                type_params: vec![TypeParam { name: "T".to_string(), bounds: vec![] }],
                variants: vec![
                    EnumVariant {
                        name: "Some".to_string(),
                        associated_types: vec![Type::TypeParameter("T".to_string())],
                    },
                    EnumVariant {
                        name: "None".to_string(),
                        associated_types: vec![],
                    },
                ],
            },
            type_params: vec![TypeParam { name: "T".to_string(), bounds: vec![] }],
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use koi_ast::{Function, Param};

    fn dummy_function(name: &str) -> Function {
        Function {
            name: name.to_string(),
            is_pub: false,
            type_params: vec![],
            params: vec![Param { name: "x".to_string(), ty: Type::I32 }],
            return_type: Type::I32,
            err_type: None,
            body: vec![],
            receiver: None,
        }
    }

    #[test]
    fn registers_builtin_result_and_maybe() {
        let mut tables = SymbolTables::new();
        let mut diagnostics = DiagnosticEngine::new();
        let program = Program { uses: vec![], items: vec![] };
        run(&program, &mut tables, &mut diagnostics);
        assert!(tables.generic_enums.contains_key("Result"));
        assert!(tables.generic_enums.contains_key("Maybe"));
    }

    #[test]
    fn duplicate_function_names_are_rejected() {
        let mut tables = SymbolTables::new();
        let mut diagnostics = DiagnosticEngine::new();
        let program = Program {
            uses: vec![],
            items: vec![
                Item::Function(dummy_function("f")),
                Item::Function(dummy_function("f")),
            ],
        };
        run(&program, &mut tables, &mut diagnostics);
        assert_eq!(diagnostics.error_count(), 1);
    }
}
