use super::Parser;
use crate::{ParseError, ParseResult};
use koi_ast::{BorrowMode, Type, TypeParam};
use koi_lexer::Token;

impl Parser {
    pub(super) fn parse_type(&mut self) -> ParseResult<Type> {
        match self.peek() {
            Some(Token::Peek) => {
                self.advance();
                Ok(Type::Reference {
                    referenced: Box::new(self.parse_type()?),
                    mode: BorrowMode::Peek,
                })
            }
            Some(Token::Poke) => {
                self.advance();
                Ok(Type::Reference {
                    referenced: Box::new(self.parse_type()?),
                    mode: BorrowMode::Poke,
                })
            }
            Some(Token::Tilde) => {
                self.advance();
                Ok(Type::Blank)
            }
            Some(Token::LBracket) => self.parse_array_type(),
            Some(Token::I8) => self.primitive(Token::I8, Type::I8),
            Some(Token::I16) => self.primitive(Token::I16, Type::I16),
            Some(Token::I32) => self.primitive(Token::I32, Type::I32),
            Some(Token::I64) => self.primitive(Token::I64, Type::I64),
            Some(Token::U8) => self.primitive(Token::U8, Type::U8),
            Some(Token::U16) => self.primitive(Token::U16, Type::U16),
            Some(Token::U32) => self.primitive(Token::U32, Type::U32),
            Some(Token::U64) => self.primitive(Token::U64, Type::U64),
            Some(Token::F32) => self.primitive(Token::F32, Type::F32),
            Some(Token::F64) => self.primitive(Token::F64, Type::F64),
            Some(Token::Bool) => self.primitive(Token::Bool, Type::Bool),
            Some(Token::StringType) => self.primitive(Token::StringType, Type::String),
            Some(Token::OwnType) => {
                self.advance();
                self.expect(&Token::Lt)?;
                let inner = self.parse_type()?;
                self.expect(&Token::Gt)?;
                Ok(Type::own_of(inner))
            }
            Some(Token::Ident(_)) => self.parse_named_type(),
            other => Err(ParseError::SyntaxError {
                pos: self.current_pos(),
                message: format!("expected a type, found {:?}", other),
            }),
        }
    }

    fn primitive(&mut self, tok: Token, ty: Type) -> ParseResult<Type> {
        self.expect(&tok)?;
        Ok(ty)
    }

    fn parse_array_type(&mut self) -> ParseResult<Type> {
        self.expect(&Token::LBracket)?;
        let elem = self.parse_type()?;
        if self.check(&Token::Semicolon) {
            self.advance();
            let len = self.expect_int_literal()?;
            self.expect(&Token::RBracket)?;
            Ok(Type::Array(Box::new(elem), len as usize))
        } else {
            self.expect(&Token::RBracket)?;
            Ok(Type::DynamicArray(Box::new(elem)))
        }
    }

    fn parse_named_type(&mut self) -> ParseResult<Type> {
        let name = self.expect_ident()?;
        if !self.check(&Token::Lt) {
            return Ok(Type::Unknown(name));
        }
        self.advance();
        let mut args = vec![self.parse_type()?];
        while self.check(&Token::Comma) {
            self.advance();
            args.push(self.parse_type()?);
        }
        self.expect(&Token::Gt)?;

        match name.as_str() {
            "Result" if args.len() == 2 => {
                let err = args.pop().unwrap();
                let ok = args.pop().unwrap();
                Ok(Type::result_of(ok, err))
            }
            "Maybe" if args.len() == 1 => Ok(Type::maybe_of(args.remove(0))),
            "Own" if args.len() == 1 => Ok(Type::own_of(args.remove(0))),
            _ => Ok(Type::GenericRef {
                base_name: name,
                type_args: args,
            }),
        }
    }

    fn expect_int_literal(&mut self) -> ParseResult<i64> {
        match self.advance() {
            Some(Token::IntLiteral(s)) => {
                let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse::<i64>().map_err(|_| ParseError::SyntaxError {
                    pos: self.current_pos(),
                    message: format!("invalid integer literal `{s}`"),
                })
            }
            other => Err(ParseError::SyntaxError {
                pos: self.current_pos(),
                message: format!("expected integer literal, found {:?}", other),
            }),
        }
    }

    pub(super) fn parse_type_params(&mut self) -> ParseResult<Vec<TypeParam>> {
        if !self.check(&Token::Lt) {
            return Ok(Vec::new());
        }
        self.advance();
        let mut params = vec![self.parse_type_param()?];
        while self.check(&Token::Comma) {
            self.advance();
            params.push(self.parse_type_param()?);
        }
        self.expect(&Token::Gt)?;
        Ok(params)
    }

    fn parse_type_param(&mut self) -> ParseResult<TypeParam> {
        let name = self.expect_ident()?;
        let mut bounds = Vec::new();
        if self.check(&Token::Colon) {
            self.advance();
            bounds.push(self.expect_ident()?);
            while self.check(&Token::Plus) {
                self.advance();
                bounds.push(self.expect_ident()?);
            }
        }
        Ok(TypeParam { name, bounds })
    }
}
