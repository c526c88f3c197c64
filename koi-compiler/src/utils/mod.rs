// Utility modules for the Koi compiler

pub mod llvm_safety;
pub mod safe_arithmetic;

pub use safe_arithmetic::CheckedArithmetic;
