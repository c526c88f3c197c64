use super::Parser;
use crate::{ParseError, ParseResult};
use koi_ast::Pattern;
use koi_lexer::Token;

impl Parser {
    pub(super) fn parse_pattern(&mut self) -> ParseResult<Pattern> {
        match self.peek() {
            Some(Token::Underscore) => {
                self.advance();
                Ok(Pattern::Wildcard)
            }
            Some(Token::Own) => {
                self.advance();
                self.expect(&Token::LParen)?;
                let inner = self.parse_pattern()?;
                self.expect(&Token::RParen)?;
                Ok(Pattern::Own(Box::new(inner)))
            }
            Some(Token::Ident(_)) => {
                let first = self.expect_ident()?;

                let (enum_name, variant) = if self.check(&Token::Dot) {
                    self.advance();
                    (Some(first), self.expect_ident()?)
                } else {
                    (None, first)
                };

                if self.check(&Token::LParen) {
                    self.advance();
                    let mut bindings = Vec::new();
                    if !self.check(&Token::RParen) {
                        bindings.push(self.parse_pattern()?);
                        while self.check(&Token::Comma) {
                            self.advance();
                            bindings.push(self.parse_pattern()?);
                        }
                    }
                    self.expect(&Token::RParen)?;
                    Ok(Pattern::EnumVariant {
                        enum_name,
                        variant,
                        bindings,
                    })
                } else if enum_name.is_some() {
                    // `Enum.Variant` with no payload
                    Ok(Pattern::EnumVariant {
                        enum_name,
                        variant,
                        bindings: Vec::new(),
                    })
                } else {
                    Ok(Pattern::Binding(variant))
                }
            }
            other => Err(ParseError::SyntaxError {
                pos: self.current_pos(),
                message: format!("expected a pattern, found {:?}", other),
            }),
        }
    }
}
