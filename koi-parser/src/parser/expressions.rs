use super::Parser;
use crate::{ParseError, ParseResult};
use koi_ast::{Arg, BinOp, BorrowMode, Expr, FStringPart, UnaryOp};
use koi_lexer::Token;

/// Binary operator precedence, lowest first. Each tier is left-associative.
const PRECEDENCE: &[&[(Token, BinOp)]] = &[
    &[(Token::Or, BinOp::Or)],
    &[(Token::And, BinOp::And)],
    &[(Token::EqEq, BinOp::Eq), (Token::NotEq, BinOp::Ne)],
    &[
        (Token::Lt, BinOp::Lt),
        (Token::LtEq, BinOp::Le),
        (Token::Gt, BinOp::Gt),
        (Token::GtEq, BinOp::Ge),
    ],
    &[(Token::Pipe, BinOp::BitOr)],
    &[(Token::Caret, BinOp::BitXor)],
    &[(Token::Ampersand, BinOp::BitAnd)],
    &[(Token::LShift, BinOp::Shl), (Token::RShift, BinOp::Shr)],
    &[(Token::Plus, BinOp::Add), (Token::Minus, BinOp::Sub)],
    &[
        (Token::Star, BinOp::Mul),
        (Token::Slash, BinOp::Div),
        (Token::Percent, BinOp::Mod),
    ],
];

impl Parser {
    pub(super) fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, tier: usize) -> ParseResult<Expr> {
        if tier >= PRECEDENCE.len() {
            return self.parse_unary();
        }

        let mut left = self.parse_binary(tier + 1)?;
        loop {
            let Some(op) = self.match_tier_op(tier) else {
                break;
            };
            let right = self.parse_binary(tier + 1)?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn match_tier_op(&mut self, tier: usize) -> Option<BinOp> {
        for (tok, op) in PRECEDENCE[tier] {
            if self.check(tok) {
                self.advance();
                return Some(*op);
            }
        }
        None
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                Ok(Expr::new(koi_ast::ExprKind::Unary {
                    op: UnaryOp::Neg,
                    expr: Box::new(self.parse_unary()?),
                }))
            }
            Some(Token::Not) => {
                self.advance();
                Ok(Expr::new(koi_ast::ExprKind::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(self.parse_unary()?),
                }))
            }
            Some(Token::Tilde) if self.is_unary_tilde() => {
                self.advance();
                Ok(Expr::new(koi_ast::ExprKind::Unary {
                    op: UnaryOp::BitNot,
                    expr: Box::new(self.parse_unary()?),
                }))
            }
            Some(Token::Peek) => {
                self.advance();
                Ok(Expr::reference(BorrowMode::Peek, self.parse_unary()?))
            }
            Some(Token::Poke) => {
                self.advance();
                Ok(Expr::reference(BorrowMode::Poke, self.parse_unary()?))
            }
            _ => self.parse_postfix(),
        }
    }

    /// `~` is both the blank-unit literal and bitwise-not; a bare `~` at a
    /// primary-expression position is the literal.
    fn is_unary_tilde(&self) -> bool {
        !matches!(
            self.peek_at(1),
            None | Some(Token::RParen)
                | Some(Token::RBrace)
                | Some(Token::RBracket)
                | Some(Token::Comma)
        )
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let field = self.expect_ident()?;
                    if self.check(&Token::LParen) {
                        let args = self.parse_args()?;
                        expr = Expr::method_call(expr, field, args);
                    } else {
                        expr = Expr::new(koi_ast::ExprKind::FieldAccess {
                            receiver: Box::new(expr),
                            field,
                        });
                    }
                }
                Some(Token::LParen) => {
                    let args = self.parse_args()?;
                    expr = Expr::call(expr, args);
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(&Token::RBracket)?;
                    expr = Expr::new(koi_ast::ExprKind::Index {
                        receiver: Box::new(expr),
                        index: Box::new(index),
                    });
                }
                Some(Token::QuestionQuestion) => {
                    self.advance();
                    expr = Expr::try_propagate(expr);
                }
                Some(Token::As) => {
                    self.advance();
                    let ty = self.parse_type()?;
                    expr = Expr::new(koi_ast::ExprKind::Cast {
                        expr: Box::new(expr),
                        ty,
                    });
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> ParseResult<Vec<Arg>> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !self.check(&Token::RParen) {
            args.push(self.parse_arg()?);
            while self.check(&Token::Comma) {
                self.advance();
                args.push(self.parse_arg()?);
            }
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }

    fn parse_arg(&mut self) -> ParseResult<Arg> {
        if let Some(Token::Ident(name)) = self.peek().cloned() {
            if self.check_at(1, &Token::Colon) {
                self.advance();
                self.advance();
                let value = self.parse_expr()?;
                return Ok(Arg::Named { name, value });
            }
        }
        Ok(Arg::Positional(self.parse_expr()?))
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.peek().cloned() {
            Some(Token::IntLiteral(s)) => {
                self.advance();
                let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
                let v = digits.parse::<i64>().map_err(|_| ParseError::SyntaxError {
                    pos: self.current_pos(),
                    message: format!("invalid integer literal `{s}`"),
                })?;
                Ok(Expr::int(v))
            }
            Some(Token::HexLiteral(s)) => {
                self.advance();
                let digits = s.trim_start_matches("0x").trim_start_matches("0X");
                let digits: String = digits.chars().take_while(|c| c.is_ascii_hexdigit()).collect();
                let v =
                    i64::from_str_radix(&digits, 16).map_err(|_| ParseError::SyntaxError {
                        pos: self.current_pos(),
                        message: format!("invalid hex literal `{s}`"),
                    })?;
                Ok(Expr::int(v))
            }
            Some(Token::FloatLiteral(v)) => {
                self.advance();
                Ok(Expr::float(v))
            }
            Some(Token::StringLiteral(s)) => {
                self.advance();
                Ok(Expr::string(s))
            }
            Some(Token::FStringLiteral(s)) => {
                self.advance();
                Ok(Expr::new(koi_ast::ExprKind::FString(
                    Self::parse_fstring_parts(&s),
                )))
            }
            Some(Token::True) => {
                self.advance();
                Ok(Expr::boolean(true))
            }
            Some(Token::False) => {
                self.advance();
                Ok(Expr::boolean(false))
            }
            Some(Token::Tilde) => {
                self.advance();
                Ok(Expr::blank())
            }
            Some(Token::Ident(name)) => {
                self.advance();
                Ok(Expr::ident(name))
            }
            Some(Token::LParen) => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Some(Token::LBracket) => {
                self.advance();
                let mut elems = Vec::new();
                if !self.check(&Token::RBracket) {
                    elems.push(self.parse_expr()?);
                    while self.check(&Token::Comma) {
                        self.advance();
                        elems.push(self.parse_expr()?);
                    }
                }
                self.expect(&Token::RBracket)?;
                Ok(Expr::new(koi_ast::ExprKind::ArrayLit(elems)))
            }
            other => Err(ParseError::SyntaxError {
                pos: self.current_pos(),
                message: format!("expected an expression, found {:?}", other),
            }),
        }
    }

    /// Splits an f-string body on `{ident}` placeholders. Only bare
    /// identifiers are supported inside braces; richer sub-expressions are
    /// out of scope (matches spec's f-string examples, which only
    /// interpolate identifiers).
    fn parse_fstring_parts(body: &str) -> Vec<FStringPart> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = body.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '{' {
                if !literal.is_empty() {
                    parts.push(FStringPart::Literal(std::mem::take(&mut literal)));
                }
                let mut name = String::new();
                for inner in chars.by_ref() {
                    if inner == '}' {
                        break;
                    }
                    name.push(inner);
                }
                parts.push(FStringPart::Expr(Box::new(Expr::ident(name.trim()))));
            } else {
                literal.push(c);
            }
        }
        if !literal.is_empty() {
            parts.push(FStringPart::Literal(literal));
        }
        parts
    }
}
