//! Pass 1.7: hash-method synthesis, grounded on
//! `sushi_lang/semantics/passes/hash_registration.py`'s topological-order
//! registration (see DESIGN.md).
//!
//! A struct/enum is hashable iff every field/variant-associated type is
//! hashable. Dependencies form a DAG over concrete (monomorphized) struct
//! and enum names; Kahn's algorithm orders registration so a container's
//! `.hash` is synthesized only after its field types' own `.hash`
//! methods exist. A direct self-referential enum cycle without `Own<T>`
//! indirection can't be laid out, so it's rejected outright (CE2510).

use crate::tables::{ExtensionEntry, SymbolTables};
use koi_ast::{BinOp, Expr, Function, MatchArm, Pattern, Statement, Type};
use koi_diagnostics::{error_codes, Diagnostic, DiagnosticEngine, Span};
use std::collections::{HashMap, HashSet, VecDeque};

pub fn run(tables: &mut SymbolTables, diagnostics: &mut DiagnosticEngine) {
    let mut deps: HashMap<String, Vec<String>> = HashMap::new();
    let mut kinds: HashMap<String, Kind> = HashMap::new();

    for (name, entry) in &tables.structs {
        kinds.insert(name.clone(), Kind::Struct);
        deps.insert(
            name.clone(),
            entry.def.fields.iter().filter_map(|f| dep_name(&f.ty)).collect(),
        );
    }
    for (name, entry) in &tables.enums {
        kinds.insert(name.clone(), Kind::Enum);
        let direct_self_cycle = entry
            .def
            .variants
            .iter()
            .flat_map(|v| v.associated_types.iter())
            .any(|t| matches!(t, Type::Struct { name: n, .. } | Type::Enum { name: n, .. } if n == name));
        if direct_self_cycle {
            diagnostics.emit(Diagnostic::error(
                error_codes::HASH_CYCLE,
                format!("`{name}` is directly self-referential without `Own<T>` indirection"),
                Span::unknown(),
            ));
        }
        deps.insert(
            name.clone(),
            entry
                .def
                .variants
                .iter()
                .flat_map(|v| v.associated_types.iter())
                .filter_map(dep_name)
                .collect(),
        );
    }

    let Some(order) = topo_sort(&deps) else {
        diagnostics.emit(Diagnostic::error(
            error_codes::HASH_CYCLE,
            "hash dependency graph contains a cycle".to_string(),
            Span::unknown(),
        ));
        return;
    };

    let mut hashable: HashSet<String> = HashSet::new();
    for name in order {
        let is_hashable = match kinds.get(&name) {
            Some(Kind::Struct) => tables
                .structs
                .get(&name)
                .map(|e| e.def.fields.iter().all(|f| field_is_hashable(&f.ty, &hashable)))
                .unwrap_or(false),
            Some(Kind::Enum) => tables
                .enums
                .get(&name)
                .map(|e| {
                    e.def
                        .variants
                        .iter()
                        .flat_map(|v| v.associated_types.iter())
                        .all(|t| field_is_hashable(t, &hashable))
                })
                .unwrap_or(false),
            None => false,
        };
        if is_hashable {
            hashable.insert(name.clone());
            match kinds.get(&name) {
                Some(Kind::Struct) => register_struct_hash_method(&name, tables),
                Some(Kind::Enum) => register_enum_hash_method(&name, tables),
                None => {}
            }
        } else {
            diagnostics.emit(Diagnostic::error(
                error_codes::UNHASHABLE_FIELD,
                format!("`{name}` has a field that does not implement `Hashable`"),
                Span::unknown(),
            ));
        }
    }
}

enum Kind {
    Struct,
    Enum,
}

fn dep_name(ty: &Type) -> Option<String> {
    match ty {
        Type::Struct { name, .. } | Type::Enum { name, .. } => Some(name.clone()),
        Type::Array(elem, _) | Type::DynamicArray(elem) => dep_name(elem),
        _ => None,
    }
}

fn field_is_hashable(ty: &Type, hashable: &HashSet<String>) -> bool {
    match ty {
        Type::I8
        | Type::I16
        | Type::I32
        | Type::I64
        | Type::U8
        | Type::U16
        | Type::U32
        | Type::U64
        | Type::Bool
        | Type::String => true,
        Type::Array(elem, _) => field_is_hashable(elem, hashable),
        Type::DynamicArray(elem) => field_is_hashable(elem, hashable),
        Type::Struct { name, .. } | Type::Enum { name, .. } => hashable.contains(name),
        _ => false,
    }
}

/// Kahn's algorithm. Returns `None` if the dependency graph is cyclic
/// (beyond the `Own<T>`-broken self-reference case already rejected above).
fn topo_sort(deps: &HashMap<String, Vec<String>>) -> Option<Vec<String>> {
    let mut indegree: HashMap<&str, usize> = deps.keys().map(|k| (k.as_str(), 0)).collect();
    for targets in deps.values() {
        for t in targets {
            if let Some(count) = indegree.get_mut(t.as_str()) {
                *count += 1;
            }
        }
    }

    let mut queue: VecDeque<&str> =
        indegree.iter().filter(|(_, &c)| c == 0).map(|(k, _)| *k).collect();
    let mut order = Vec::with_capacity(deps.len());

    while let Some(name) = queue.pop_front() {
        order.push(name.to_string());
        if let Some(targets) = deps.get(name) {
            for t in targets {
                if let Some(count) = indegree.get_mut(t.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(t.as_str());
                    }
                }
            }
        }
    }

    if order.len() == deps.len() {
        Some(order)
    } else {
        None
    }
}

// FNV-1a's 64-bit offset basis and prime, reused here as a cheap
// field-combining hash. Bit pattern only — `as i64` just carries the u64
// constant through `Expr::int`'s `i64` parameter.
const FNV_OFFSET_BASIS: i64 = 0xcbf29ce484222325u64 as i64;
const FNV_PRIME: i64 = 0x100000001b3u64 as i64;

/// Synthesizes a `.hash u64` extension method for struct `type_name`,
/// registered into `tables.extensions` so Pass 4 treats it exactly like a
/// user-written extension method. Since this bypasses Pass 0/2/3 entirely
/// (those only walk `program.items`), every node the body needs resolved
/// gets its `resolved_type` set here rather than by the type checker.
fn register_struct_hash_method(type_name: &str, tables: &mut SymbolTables) {
    let self_ty = Type::Struct { name: type_name.to_string(), generic_args: vec![] };
    let fields = tables.structs.get(type_name).map(|e| e.def.fields.clone()).unwrap_or_default();

    let mut acc = typed_int(FNV_OFFSET_BASIS);
    for field in &fields {
        let access = typed_field_access(typed_ident("self", self_ty.clone()), &field.name, field.ty.clone());
        let contribution = field_hash_contribution(access, &field.ty);
        let mixed = typed_binary(BinOp::BitXor, acc, contribution);
        acc = typed_binary(BinOp::Mul, mixed, typed_int(FNV_PRIME));
    }

    insert_hash_extension(type_name, self_ty, vec![Statement::Return(acc)], tables);
}

/// Synthesizes `.hash u64` for enum `type_name` as a match over every
/// variant, one distinct constant per variant — it doesn't fold payload
/// contents in, but it's a real per-variant value rather than a single
/// constant shared by every type.
fn register_enum_hash_method(type_name: &str, tables: &mut SymbolTables) {
    let self_ty = Type::Enum { name: type_name.to_string(), generic_args: vec![] };
    let variants = tables.enums.get(type_name).map(|e| e.def.variants.clone()).unwrap_or_default();

    let arms = variants
        .iter()
        .enumerate()
        .map(|(i, v)| MatchArm {
            pattern: Pattern::EnumVariant {
                enum_name: Some(type_name.to_string()),
                variant: v.name.clone(),
                bindings: v.associated_types.iter().map(|_| Pattern::Wildcard).collect(),
            },
            body: vec![Statement::Return(typed_int(i as i64))],
        })
        .collect();

    let scrutinee = typed_ident("self", self_ty.clone());
    insert_hash_extension(type_name, self_ty, vec![Statement::Match { scrutinee, arms }], tables);
}

fn insert_hash_extension(type_name: &str, target_type: Type, body: Vec<Statement>, tables: &mut SymbolTables) {
    let method = Function {
        name: "hash".to_string(),
        is_pub: true,
        type_params: vec![],
        params: vec![],
        return_type: Type::U64,
        err_type: None,
        body,
        receiver: Some(target_type.clone()),
    };
    tables.extensions.insert(
        (type_name.to_string(), "hash".to_string()),
        ExtensionEntry { target_type, method },
    );
}

/// A field's contribution to the combining hash: recursively-hashable
/// struct/enum fields and primitives alike call their own (already
/// registered, by topological order) `.hash()`; arrays have no element-wise
/// hash, so their length stands in, matching the rest of this pass's
/// "deterministic, not production-grade" bar for non-trivial keys.
fn field_hash_contribution(access: Expr, ty: &Type) -> Expr {
    match ty {
        Type::Array(_, len) => typed_int(*len as i64),
        Type::DynamicArray(_) => typed_method_call(access, "len"),
        _ => typed_method_call(access, "hash"),
    }
}

fn typed_int(v: i64) -> Expr {
    let e = Expr::int(v);
    e.set_resolved_type(Type::U64);
    e
}

fn typed_ident(name: &str, ty: Type) -> Expr {
    let e = Expr::ident(name);
    e.set_resolved_type(ty);
    e
}

fn typed_field_access(receiver: Expr, field: &str, ty: Type) -> Expr {
    let e = Expr::new(koi_ast::ExprKind::FieldAccess { receiver: Box::new(receiver), field: field.to_string() });
    e.set_resolved_type(ty);
    e
}

fn typed_method_call(receiver: Expr, method: &str) -> Expr {
    let e = Expr::method_call(receiver, method, vec![]);
    e.set_resolved_type(Type::U64);
    e
}

fn typed_binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    let e = Expr::binary(op, left, right);
    e.set_resolved_type(Type::U64);
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{EnumEntry, StructEntry};
    use koi_ast::{EnumDef, EnumVariant, Field, StructDef};

    #[test]
    fn registers_hash_for_all_primitive_fields() {
        let mut tables = SymbolTables::new();
        tables.structs.insert(
            "Point".to_string(),
            StructEntry {
                def: StructDef {
                    name: "Point".to_string(),
                    is_pub: true,
                    type_params: vec![],
                    fields: vec![
                        Field { name: "x".to_string(), ty: Type::I32 },
                        Field { name: "y".to_string(), ty: Type::I32 },
                    ],
                },
                is_pub: true,
            },
        );
        let mut diagnostics = DiagnosticEngine::new();
        run(&mut tables, &mut diagnostics);
        assert_eq!(diagnostics.error_count(), 0);
        assert!(tables.extensions.contains_key(&("Point".to_string(), "hash".to_string())));
    }

    #[test]
    fn rejects_direct_self_referential_enum() {
        let mut tables = SymbolTables::new();
        tables.enums.insert(
            "Bad".to_string(),
            EnumEntry {
                def: EnumDef {
                    name: "Bad".to_string(),
                    is_pub: true,
                    type_params: vec![],
                    variants: vec![EnumVariant {
                        name: "Wrap".to_string(),
                        associated_types: vec![Type::Enum {
                            name: "Bad".to_string(),
                            generic_args: vec![],
                        }],
                    }],
                },
                is_pub: true,
            },
        );
        let mut diagnostics = DiagnosticEngine::new();
        run(&mut tables, &mut diagnostics);
        assert!(diagnostics.error_count() >= 1);
    }

    #[test]
    fn propagates_hashability_through_nested_structs() {
        let mut tables = SymbolTables::new();
        tables.structs.insert(
            "Inner".to_string(),
            StructEntry {
                def: StructDef {
                    name: "Inner".to_string(),
                    is_pub: true,
                    type_params: vec![],
                    fields: vec![Field { name: "v".to_string(), ty: Type::I32 }],
                },
                is_pub: true,
            },
        );
        tables.structs.insert(
            "Outer".to_string(),
            StructEntry {
                def: StructDef {
                    name: "Outer".to_string(),
                    is_pub: true,
                    type_params: vec![],
                    fields: vec![Field {
                        name: "inner".to_string(),
                        ty: Type::Struct { name: "Inner".to_string(), generic_args: vec![] },
                    }],
                },
                is_pub: true,
            },
        );
        let mut diagnostics = DiagnosticEngine::new();
        run(&mut tables, &mut diagnostics);
        assert_eq!(diagnostics.error_count(), 0);
        assert!(tables.extensions.contains_key(&("Outer".to_string(), "hash".to_string())));
    }
}
