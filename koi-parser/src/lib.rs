//! Recursive-descent parser producing `koi_ast::Program`.
//!
//! Sits upstream of the middle-end's pass pipeline, which begins once a
//! `Program` exists; kept small and hand-written rather than
//! grammar-generated.

mod parser;

pub use parser::Parser;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("{message} at byte {pos}")]
    SyntaxError { pos: usize, message: String },
    #[error("unexpected end of input: {0}")]
    UnexpectedEof(String),
    #[error("lexer error: {0}")]
    LexerError(String),
}

pub type ParseResult<T> = Result<T, ParseError>;

pub fn parse(source: &str) -> ParseResult<koi_ast::Program> {
    Parser::new(source)?.parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_empty_program() {
        let program = parse("").unwrap();
        assert!(program.items.is_empty());
    }

    #[test]
    fn parses_simple_function() {
        let src = r#"
            fn add(a: i32, b: i32) i32 {
                return Result.Ok(a + b)
            }
        "#;
        let program = parse(src).unwrap();
        assert_eq!(program.items.len(), 1);
    }
}
