use super::Parser;
use crate::{ParseError, ParseResult};
use koi_ast::{
    ConstDef, EnumDef, EnumVariant, Extension, Field, Function, Item, Param, PerkDef, PerkImpl,
    PerkMethodSig, StructDef,
};
use koi_lexer::Token;

impl Parser {
    pub(super) fn parse_item(&mut self) -> ParseResult<Item> {
        let is_pub = if self.check(&Token::Pub) {
            self.advance();
            true
        } else {
            false
        };

        match self.peek() {
            Some(Token::Fn) => Ok(Item::Function(self.parse_function(is_pub)?)),
            Some(Token::Struct) => Ok(Item::Struct(self.parse_struct(is_pub)?)),
            Some(Token::Enum) => Ok(Item::Enum(self.parse_enum(is_pub)?)),
            Some(Token::Perk) => Ok(Item::Perk(self.parse_perk()?)),
            Some(Token::Extend) => self.parse_extend(),
            Some(Token::Const) => Ok(Item::Const(self.parse_const()?)),
            other => Err(ParseError::SyntaxError {
                pos: self.current_pos(),
                message: format!("expected an item, found {:?}", other),
            }),
        }
    }

    fn parse_params(&mut self) -> ParseResult<Vec<Param>> {
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        if !self.check(&Token::RParen) {
            params.push(self.parse_param()?);
            while self.check(&Token::Comma) {
                self.advance();
                params.push(self.parse_param()?);
            }
        }
        self.expect(&Token::RParen)?;
        Ok(params)
    }

    fn parse_param(&mut self) -> ParseResult<Param> {
        let name = self.expect_ident()?;
        self.expect(&Token::Colon)?;
        let ty = self.parse_type()?;
        Ok(Param { name, ty })
    }

    pub(super) fn parse_function(&mut self, is_pub: bool) -> ParseResult<Function> {
        self.expect(&Token::Fn)?;
        let name = self.expect_ident()?;
        let type_params = self.parse_type_params()?;
        let params = self.parse_params()?;

        let return_type = if self.check(&Token::LBrace) {
            koi_ast::Type::Blank
        } else {
            self.parse_type()?
        };

        let err_type = if self.check(&Token::Not) {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };

        let body = self.parse_block()?;

        Ok(Function {
            name,
            is_pub,
            type_params,
            params,
            return_type,
            err_type,
            body,
            receiver: None,
        })
    }

    fn parse_struct(&mut self, is_pub: bool) -> ParseResult<StructDef> {
        self.expect(&Token::Struct)?;
        let name = self.expect_ident()?;
        let type_params = self.parse_type_params()?;
        self.expect(&Token::LBrace)?;
        let mut fields = Vec::new();
        while !self.check(&Token::RBrace) {
            let field_name = self.expect_ident()?;
            self.expect(&Token::Colon)?;
            let ty = self.parse_type()?;
            fields.push(Field {
                name: field_name,
                ty,
            });
            if self.check(&Token::Comma) {
                self.advance();
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(StructDef {
            name,
            is_pub,
            type_params,
            fields,
        })
    }

    fn parse_enum(&mut self, is_pub: bool) -> ParseResult<EnumDef> {
        self.expect(&Token::Enum)?;
        let name = self.expect_ident()?;
        let type_params = self.parse_type_params()?;
        self.expect(&Token::LBrace)?;
        let mut variants = Vec::new();
        while !self.check(&Token::RBrace) {
            let variant_name = self.expect_ident()?;
            let mut associated_types = Vec::new();
            if self.check(&Token::LParen) {
                self.advance();
                if !self.check(&Token::RParen) {
                    associated_types.push(self.parse_type()?);
                    while self.check(&Token::Comma) {
                        self.advance();
                        associated_types.push(self.parse_type()?);
                    }
                }
                self.expect(&Token::RParen)?;
            }
            variants.push(EnumVariant {
                name: variant_name,
                associated_types,
            });
            if self.check(&Token::Comma) {
                self.advance();
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(EnumDef {
            name,
            is_pub,
            type_params,
            variants,
        })
    }

    fn parse_perk(&mut self) -> ParseResult<PerkDef> {
        self.expect(&Token::Perk)?;
        let name = self.expect_ident()?;
        self.expect(&Token::LBrace)?;
        let mut methods = Vec::new();
        while !self.check(&Token::RBrace) {
            self.expect(&Token::Fn)?;
            let method_name = self.expect_ident()?;
            let params = self.parse_params()?;
            let return_type = if self.check(&Token::RBrace) || self.check(&Token::Fn) {
                koi_ast::Type::Blank
            } else {
                self.parse_type()?
            };
            methods.push(PerkMethodSig {
                name: method_name,
                params,
                return_type,
            });
        }
        self.expect(&Token::RBrace)?;
        Ok(PerkDef { name, methods })
    }

    /// Disambiguates `extend T with Perk { .. }` from `extend<T> Container<T> { .. }`.
    fn parse_extend(&mut self) -> ParseResult<Item> {
        self.expect(&Token::Extend)?;
        let type_params = self.parse_type_params()?;
        let target_type = self.parse_type()?;

        if self.check(&Token::With) {
            self.advance();
            let perk_name = self.expect_ident()?;
            let methods = self.parse_method_list()?;
            Ok(Item::PerkImpl(PerkImpl {
                target_type,
                perk_name,
                methods,
            }))
        } else {
            let methods = self.parse_method_list()?;
            Ok(Item::Extension(Extension {
                type_params,
                target_type,
                methods,
            }))
        }
    }

    fn parse_method_list(&mut self) -> ParseResult<Vec<Function>> {
        self.expect(&Token::LBrace)?;
        let mut methods = Vec::new();
        while !self.check(&Token::RBrace) {
            let mut method = self.parse_function(false)?;
            method.receiver = Some(koi_ast::Type::Unknown("Self".to_string()));
            methods.push(method);
        }
        self.expect(&Token::RBrace)?;
        Ok(methods)
    }

    fn parse_const(&mut self) -> ParseResult<ConstDef> {
        self.expect(&Token::Const)?;
        let name = self.expect_ident()?;
        let ty = if self.check(&Token::Colon) {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(&Token::Eq)?;
        let value = self.parse_expr()?;
        Ok(ConstDef { name, ty, value })
    }
}
