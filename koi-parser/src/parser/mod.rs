mod expressions;
mod items;
mod patterns;
mod statements;
mod types;

use crate::{ParseError, ParseResult};
use koi_ast::{Program, Use};
use koi_lexer::{Lexer, Token, TokenSpan};

/// Recursive-descent parser over a flat token buffer.
pub struct Parser {
    tokens: Vec<TokenSpan>,
    pos: usize,
}

impl Parser {
    pub fn new(source: &str) -> ParseResult<Self> {
        let mut tokens = Vec::new();
        for result in Lexer::new(source) {
            match result {
                Ok(tok) => tokens.push(tok),
                Err(e) => return Err(ParseError::LexerError(format!("{:?}", e))),
            }
        }
        Ok(Parser { tokens, pos: 0 })
    }

    pub fn parse_program(&mut self) -> ParseResult<Program> {
        let mut uses = Vec::new();
        while self.check(&Token::Use) {
            uses.push(self.parse_use()?);
        }

        let mut items = Vec::new();
        while !self.is_at_end() {
            items.push(self.parse_item()?);
        }

        Ok(Program { uses, items })
    }

    fn parse_use(&mut self) -> ParseResult<Use> {
        self.expect(&Token::Use)?;
        let mut path = vec![self.expect_ident()?];
        while self.check(&Token::Dot) {
            self.advance();
            path.push(self.expect_ident()?);
        }
        let alias = if self.check(&Token::As) {
            self.advance();
            Some(self.expect_ident()?)
        } else {
            None
        };
        Ok(Use { path, alias })
    }

    // --- token stream primitives, shared by every sub-parser ---

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|t| &t.token)
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn current_pos(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.span.start)
            .unwrap_or(usize::MAX)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|t| t.token.clone());
        if !self.is_at_end() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, expected: &Token) -> bool {
        self.peek() == Some(expected)
    }

    fn check_at(&self, offset: usize, expected: &Token) -> bool {
        self.peek_at(offset) == Some(expected)
    }

    fn expect(&mut self, expected: &Token) -> ParseResult<()> {
        if self.check(expected) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::SyntaxError {
                pos: self.current_pos(),
                message: format!("expected {:?}, found {:?}", expected, self.peek()),
            })
        }
    }

    fn expect_ident(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some(Token::Ident(_)) => {
                if let Some(Token::Ident(name)) = self.advance() {
                    Ok(name)
                } else {
                    unreachable!()
                }
            }
            other => Err(ParseError::SyntaxError {
                pos: self.current_pos(),
                message: format!("expected identifier, found {:?}", other),
            }),
        }
    }
}
