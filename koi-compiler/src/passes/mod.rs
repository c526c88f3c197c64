//! The Pass 0-4 middle-end pipeline.

pub mod borrow_checker;
pub mod codegen;
pub mod collect;
pub mod hash_registration;
pub mod instantiate;
pub mod monomorphize;
pub mod scope;
pub mod typecheck;

use crate::tables::SymbolTables;
use koi_ast::Program;
use koi_diagnostics::DiagnosticEngine;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PassError {
    #[error("compilation aborted: {0} error(s) reported")]
    Aborted(usize),
}

/// Configuration threaded through the pipeline (target triple, warning
/// policy, optimizer toggles).
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub target_triple: String,
    pub keep_going_after_warnings: bool,
    pub optimize: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            target_triple: "x86_64-unknown-linux-gnu".to_string(),
            keep_going_after_warnings: true,
            optimize: false,
        }
    }
}

/// Runs Passes 0 through 3 (everything short of IR emission), returning the
/// populated tables and accumulated diagnostics. Pass 4 is driven
/// separately by the caller since it needs an `inkwell::context::Context`
/// with a lifetime the caller controls.
pub fn run_frontend(
    program: &mut Program,
    options: &CompileOptions,
) -> Result<(SymbolTables, DiagnosticEngine), PassError> {
    let mut diagnostics = DiagnosticEngine::new();
    let mut tables = SymbolTables::new();

    log::debug!("pass 0: symbol collection");
    collect::run(program, &mut tables, &mut diagnostics);
    bail_if_errors(&diagnostics)?;

    log::debug!("pass 1: scope analysis");
    scope::run(program, &tables, &mut diagnostics);
    bail_if_errors(&diagnostics)?;

    log::debug!("pass 1.5: instantiation collection");
    let instantiations = instantiate::run(program, &tables, &mut diagnostics);

    log::debug!(
        "pass 1.6: monomorphization ({} type instantiations, {} function instantiations)",
        instantiations.type_instantiations.len(),
        instantiations.function_instantiations.len()
    );
    monomorphize::run(program, &mut tables, &instantiations, &mut diagnostics);
    bail_if_errors(&diagnostics)?;

    log::debug!("pass 1.7: hash registration");
    hash_registration::run(&mut tables, &mut diagnostics);
    bail_if_errors(&diagnostics)?;

    log::debug!("pass 2: type validation");
    typecheck::run(program, &tables, &mut diagnostics);
    if !options.keep_going_after_warnings {
        bail_if_errors(&diagnostics)?;
    }
    bail_if_errors(&diagnostics)?;

    log::debug!("pass 3: borrow check");
    borrow_checker::run(program, &tables, &mut diagnostics);
    bail_if_errors(&diagnostics)?;

    Ok((tables, diagnostics))
}

fn bail_if_errors(diagnostics: &DiagnosticEngine) -> Result<(), PassError> {
    if diagnostics.has_errors() {
        for diagnostic in diagnostics.diagnostics() {
            eprintln!("{diagnostic}");
        }
        Err(PassError::Aborted(diagnostics.error_count()))
    } else {
        Ok(())
    }
}
