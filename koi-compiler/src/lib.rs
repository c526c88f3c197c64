pub mod linter; // Static analysis and code quality warnings
pub mod mangling; // Canonical/mangled names for monomorphized symbols
pub mod passes; // The Pass 0-4 middle-end pipeline
pub mod stdlib; // Stdlib function -> LLVM symbol table
pub mod tables; // Symbol tables threaded through every pass
pub mod utils; // Utility modules (safe arithmetic, etc.)

pub use koi_diagnostics as diagnostics;

pub use diagnostics::{error_codes, Diagnostic, DiagnosticEngine, ErrorLevel, Span};
pub use linter::{LintRule, Linter, UnusedVariableRule};
pub use passes::{run_frontend, CompileOptions, PassError};
pub use tables::SymbolTables;
pub use utils::llvm_safety::{
    emit_bounds_check, emit_null_check, is_pointer_provably_nonnull,
    validate_stack_allocation_size, MAX_STACK_ALLOC_SIZE,
};
pub use utils::safe_arithmetic::{
    safe_array_size, safe_field_index, safe_param_index, CheckedArithmetic, SafeCast,
};
