//! Source location tracking for AST nodes.
//!
//! Kept separate from `koi_diagnostics::Span` (which is a byte-offset range
//! resolved against a loaded source file for rendering) — this is the
//! lightweight line/column handle the parser stamps onto nodes as it goes,
//! cheap to carry on every `Statement`/`Item` without pulling in the
//! diagnostics crate as an `koi-ast` dependency.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub line: u32,
    pub column: u32,
    pub start: u32,
    pub end: u32,
}

impl SourceSpan {
    pub fn new(line: u32, column: u32, start: u32, end: u32) -> Self {
        SourceSpan {
            line,
            column,
            start,
            end,
        }
    }

    pub fn dummy() -> Self {
        SourceSpan {
            line: 0,
            column: 0,
            start: 0,
            end: 0,
        }
    }
}
