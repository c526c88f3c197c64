//! Pass 1.5: instantiation collection.
//!
//! Scans the AST for every concrete generic-type reference and generic
//! function call site with inferable type arguments, so Pass 1.6
//! monomorphizes only what's reached.

use crate::mangling::canonical_name;
use crate::tables::SymbolTables;
use koi_ast::{Block, Expr, ExprKind, Function, Item, Program, Statement, Type};
use koi_diagnostics::DiagnosticEngine;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct InstantiationSet {
    /// Keyed by canonical name to dedup tuples that aren't `Eq`/`Hash`
    /// themselves (the canonical-naming invariant — canonical name is already the
    /// monomorphization cache key).
    pub type_instantiations: HashMap<String, (String, Vec<Type>)>,
    pub function_instantiations: HashMap<String, (String, Vec<Type>)>,
}

impl InstantiationSet {
    fn record_type(&mut self, base: &str, args: &[Type]) {
        if args.is_empty() {
            return;
        }
        let key = canonical_name(base, args);
        self.type_instantiations
            .entry(key)
            .or_insert_with(|| (base.to_string(), args.to_vec()));
    }

    fn record_function(&mut self, base: &str, args: &[Type]) {
        let key = canonical_name(base, args);
        self.function_instantiations
            .entry(key)
            .or_insert_with(|| (base.to_string(), args.to_vec()));
    }
}

pub fn run(
    program: &Program,
    tables: &SymbolTables,
    _diagnostics: &mut DiagnosticEngine,
) -> InstantiationSet {
    let mut set = InstantiationSet::default();

    for item in &program.items {
        match item {
            Item::Function(f) => scan_function(f, tables, &mut set),
            Item::PerkImpl(p) => {
                for m in &p.methods {
                    scan_function(m, tables, &mut set);
                }
            }
            Item::Extension(e) => {
                for m in &e.methods {
                    scan_function(m, tables, &mut set);
                }
            }
            _ => {}
        }
    }

    set
}

fn scan_function(func: &Function, tables: &SymbolTables, set: &mut InstantiationSet) {
    for param in &func.params {
        scan_type(&param.ty, set);
    }
    scan_type(&func.return_type, set);
    // Every declared return type implicitly forces Result<T, ErrType>
    // ("Result propagation").
    let err = func.effective_err_type();
    set.record_type("Result", &[func.return_type.clone(), err]);
    if let Some(err_ty) = &func.err_type {
        scan_type(err_ty, set);
    }
    scan_block(&func.body, tables, set);
}

fn scan_block(block: &Block, tables: &SymbolTables, set: &mut InstantiationSet) {
    for stmt in block {
        scan_statement(stmt, tables, set);
    }
}

fn scan_statement(stmt: &Statement, tables: &SymbolTables, set: &mut InstantiationSet) {
    match stmt {
        Statement::Let { ty, value, .. } => {
            if let Some(ty) = ty {
                scan_type(ty, set);
            }
            scan_expr(value, tables, set);
        }
        Statement::Rebind { target, value } => {
            scan_expr(target, tables, set);
            scan_expr(value, tables, set);
        }
        Statement::Return(expr) | Statement::Expr(expr) => scan_expr(expr, tables, set),
        Statement::If { cond, then_block, elif_branches, else_block } => {
            scan_expr(cond, tables, set);
            scan_block(then_block, tables, set);
            for (c, b) in elif_branches {
                scan_expr(c, tables, set);
                scan_block(b, tables, set);
            }
            if let Some(b) = else_block {
                scan_block(b, tables, set);
            }
        }
        Statement::While { cond, body } => {
            scan_expr(cond, tables, set);
            scan_block(body, tables, set);
        }
        Statement::Foreach { item_type, iterable, body, .. } => {
            if let Some(ty) = item_type {
                scan_type(ty, set);
            }
            scan_expr(iterable, tables, set);
            scan_block(body, tables, set);
        }
        Statement::Match { scrutinee, arms } => {
            scan_expr(scrutinee, tables, set);
            for arm in arms {
                scan_block(&arm.body, tables, set);
            }
        }
        Statement::Break | Statement::Continue => {}
    }
}

fn scan_expr(expr: &Expr, tables: &SymbolTables, set: &mut InstantiationSet) {
    match &expr.kind {
        ExprKind::Call { callee, args } => {
            if let ExprKind::Identifier(name) = &callee.kind {
                if let Some(entry) = tables.generic_functions.get(name) {
                    if let Some(type_args) = infer_call_args(entry, args, tables) {
                        set.record_function(name, &type_args);
                    }
                }
            }
            scan_expr(callee, tables, set);
            for arg in args {
                scan_expr(arg.value(), tables, set);
            }
        }
        ExprKind::MethodCall { receiver, args, .. } => {
            scan_expr(receiver, tables, set);
            for arg in args {
                scan_expr(arg.value(), tables, set);
            }
        }
        ExprKind::FieldAccess { receiver, .. } => scan_expr(receiver, tables, set),
        ExprKind::Index { receiver, index } => {
            scan_expr(receiver, tables, set);
            scan_expr(index, tables, set);
        }
        ExprKind::Binary { left, right, .. } => {
            scan_expr(left, tables, set);
            scan_expr(right, tables, set);
        }
        ExprKind::Unary { expr, .. } | ExprKind::Reference { expr, .. } => {
            scan_expr(expr, tables, set)
        }
        ExprKind::StructConstruct { args, .. } => {
            for arg in args {
                scan_expr(arg.value(), tables, set);
            }
        }
        ExprKind::EnumConstruct { args, .. } => {
            for arg in args {
                scan_expr(arg, tables, set);
            }
        }
        ExprKind::Cast { expr, ty } => {
            scan_type(ty, set);
            scan_expr(expr, tables, set);
        }
        ExprKind::Try { expr } => scan_expr(expr, tables, set),
        ExprKind::ArrayLit(items) => {
            for item in items {
                scan_expr(item, tables, set);
            }
        }
        ExprKind::FString(parts) => {
            for part in parts {
                if let koi_ast::FStringPart::Expr(e) = part {
                    scan_expr(e, tables, set);
                }
            }
        }
        ExprKind::IntLit(_)
        | ExprKind::FloatLit(_)
        | ExprKind::BoolLit(_)
        | ExprKind::StringLit(_)
        | ExprKind::BlankLit
        | ExprKind::Identifier(_) => {}
    }
}

fn scan_type(ty: &Type, set: &mut InstantiationSet) {
    match ty {
        Type::GenericRef { base_name, type_args } => {
            for arg in type_args {
                scan_type(arg, set);
            }
            set.record_type(base_name, type_args);
        }
        Type::Result { ok, err } => {
            scan_type(ok, set);
            scan_type(err, set);
            set.record_type("Result", &[(**ok).clone(), (**err).clone()]);
        }
        Type::Struct { name, generic_args } | Type::Enum { name, generic_args } => {
            for arg in generic_args {
                scan_type(arg, set);
            }
            if !generic_args.is_empty() {
                set.record_type(name, generic_args);
            }
        }
        Type::Array(elem, _) | Type::DynamicArray(elem) | Type::Iterator(elem) => {
            scan_type(elem, set)
        }
        Type::Reference { referenced, .. } | Type::Pointer(referenced) => {
            scan_type(referenced, set)
        }
        _ => {}
    }
}

/// Unification restricted to `TypeParameter ↦ ConcreteType` over a simple
/// subset of expressions ("simple-expression type inference").
/// Returns `None` (inference silently fails; Pass 2 handles the rest) if any
/// parameter remains unbound.
fn infer_call_args(
    entry: &crate::tables::GenericFunctionEntry,
    args: &[koi_ast::Arg],
    _tables: &SymbolTables,
) -> Option<Vec<Type>> {
    let mut bindings: HashMap<String, Type> = HashMap::new();
    for (param, arg) in entry.def.params.iter().zip(args.iter()) {
        if let Type::TypeParameter(name) = &param.ty {
            if let Some(concrete) = literal_type_of(arg.value()) {
                bindings.entry(name.clone()).or_insert(concrete);
            }
        }
    }
    entry
        .type_params
        .iter()
        .map(|tp| bindings.get(&tp.name).cloned())
        .collect::<Option<Vec<_>>>()
}

/// Obvious types for the literal/simple forms calls out;
/// anything else is left for Pass 2's full type checker.
fn literal_type_of(expr: &Expr) -> Option<Type> {
    match &expr.kind {
        ExprKind::IntLit(_) => Some(Type::I32),
        ExprKind::FloatLit(_) => Some(Type::F64),
        ExprKind::BoolLit(_) => Some(Type::Bool),
        ExprKind::StringLit(_) => Some(Type::String),
        _ => expr.resolved_type(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_result_instantiation_for_every_function() {
        let tables = SymbolTables::new();
        let mut diagnostics = DiagnosticEngine::new();
        let func = Function {
            name: "f".to_string(),
            is_pub: false,
            type_params: vec![],
            params: vec![],
            return_type: Type::I32,
            err_type: None,
            body: vec![],
            receiver: None,
        };
        let program = Program { uses: vec![], items: vec![Item::Function(func)] };
        let set = run(&program, &tables, &mut diagnostics);
        let key = canonical_name("Result", &[Type::I32, Type::std_error()]);
        assert!(set.type_instantiations.contains_key(&key));
    }
}
