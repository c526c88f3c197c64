use super::Parser;
use crate::ParseResult;
use koi_ast::{Block, MatchArm, Statement};
use koi_lexer::Token;

impl Parser {
    pub(super) fn parse_block(&mut self) -> ParseResult<Block> {
        self.expect(&Token::LBrace)?;
        let mut statements = Vec::new();
        while !self.check(&Token::RBrace) {
            statements.push(self.parse_statement()?);
            if self.check(&Token::Semicolon) {
                self.advance();
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(statements)
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        match self.peek() {
            Some(Token::Let) => self.parse_let(),
            Some(Token::Return) => {
                self.advance();
                if self.check(&Token::RBrace) || self.check(&Token::Semicolon) {
                    Ok(Statement::Return(koi_ast::Expr::blank()))
                } else {
                    Ok(Statement::Return(self.parse_expr()?))
                }
            }
            Some(Token::Break) => {
                self.advance();
                Ok(Statement::Break)
            }
            Some(Token::Continue) => {
                self.advance();
                Ok(Statement::Continue)
            }
            Some(Token::If) => self.parse_if(),
            Some(Token::While) => self.parse_while(),
            Some(Token::For) => self.parse_foreach(),
            Some(Token::Match) => self.parse_match(),
            _ => self.parse_expr_or_rebind(),
        }
    }

    fn parse_let(&mut self) -> ParseResult<Statement> {
        self.expect(&Token::Let)?;
        let name = self.expect_ident()?;
        let ty = if self.check(&Token::Colon) {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(&Token::Eq)?;
        let value = self.parse_expr()?;
        Ok(Statement::Let { name, ty, value })
    }

    fn parse_expr_or_rebind(&mut self) -> ParseResult<Statement> {
        let expr = self.parse_expr()?;
        if self.check(&Token::ColonEq) {
            self.advance();
            let value = self.parse_expr()?;
            Ok(Statement::Rebind {
                target: expr,
                value,
            })
        } else {
            Ok(Statement::Expr(expr))
        }
    }

    fn parse_if(&mut self) -> ParseResult<Statement> {
        self.expect(&Token::If)?;
        let cond = self.parse_expr()?;
        let then_block = self.parse_block()?;

        let mut elif_branches = Vec::new();
        while self.check(&Token::Elif) {
            self.advance();
            let elif_cond = self.parse_expr()?;
            let elif_block = self.parse_block()?;
            elif_branches.push((elif_cond, elif_block));
        }

        let else_block = if self.check(&Token::Else) {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(Statement::If {
            cond,
            then_block,
            elif_branches,
            else_block,
        })
    }

    fn parse_while(&mut self) -> ParseResult<Statement> {
        self.expect(&Token::While)?;
        let cond = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(Statement::While { cond, body })
    }

    fn parse_foreach(&mut self) -> ParseResult<Statement> {
        self.expect(&Token::For)?;
        let var_name = self.expect_ident()?;
        let item_type = if self.check(&Token::Colon) {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(&Token::In)?;
        let iterable = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(Statement::Foreach {
            var_name,
            item_type,
            iterable,
            body,
        })
    }

    fn parse_match(&mut self) -> ParseResult<Statement> {
        self.expect(&Token::Match)?;
        let scrutinee = self.parse_expr()?;
        self.expect(&Token::LBrace)?;
        let mut arms = Vec::new();
        while !self.check(&Token::RBrace) {
            let pattern = self.parse_pattern()?;
            self.expect(&Token::FatArrow)?;
            let body = if self.check(&Token::LBrace) {
                self.parse_block()?
            } else {
                let expr = self.parse_expr()?;
                vec![Statement::Expr(expr)]
            };
            arms.push(MatchArm { pattern, body });
            if self.check(&Token::Comma) {
                self.advance();
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(Statement::Match { scrutinee, arms })
    }
}
