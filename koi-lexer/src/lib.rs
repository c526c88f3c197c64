use logos::Logos;

/// Unescapes the body of a string literal (between the quotes).
fn unescape_string(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some('b') => result.push('\x08'),
                Some('f') => result.push('\x0C'),
                Some('"') => result.push('"'),
                Some('\\') => result.push('\\'),
                Some('u') => {
                    let hex: String = chars.by_ref().take(4).collect();
                    if let Ok(code) = u32::from_str_radix(&hex, 16) {
                        if let Some(unicode_char) = char::from_u32(code) {
                            result.push(unicode_char);
                        }
                    }
                }
                Some(c) => {
                    result.push('\\');
                    result.push(c);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Token set for the Koi language.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\f]+")]
pub enum Token {
    // Keywords
    #[token("fn")]
    Fn,
    #[token("let")]
    Let,
    #[token("struct")]
    Struct,
    #[token("enum")]
    Enum,
    #[token("perk")]
    Perk,
    #[token("extend")]
    Extend,
    #[token("with")]
    With,
    #[token("return")]
    Return,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("elif")]
    Elif,
    #[token("for")]
    For,
    #[token("while")]
    While,
    #[token("in")]
    In,
    #[token("use")]
    Use,
    #[token("pub")]
    Pub,
    #[token("as")]
    As,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("const")]
    Const,
    #[token("match")]
    Match,
    #[token("peek")]
    Peek,
    #[token("poke")]
    Poke,
    #[token("own")]
    Own,
    #[token("Own")]
    OwnType,

    // Primitive types
    #[token("i8")]
    I8,
    #[token("i16")]
    I16,
    #[token("i32")]
    I32,
    #[token("i64")]
    I64,
    #[token("u8")]
    U8,
    #[token("u16")]
    U16,
    #[token("u32")]
    U32,
    #[token("u64")]
    U64,
    #[token("f32")]
    F32,
    #[token("f64")]
    F64,
    #[token("bool")]
    Bool,
    #[token("string")]
    StringType,

    // Operators
    #[token("=")]
    Eq,
    #[token(":=")]
    ColonEq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("<<")]
    LShift,
    #[token(">>")]
    RShift,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("&&")]
    And,
    #[token("||")]
    Or,
    #[token("!")]
    Not,
    #[token("&")]
    Ampersand,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,

    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token("::")]
    DoubleColon,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("=>")]
    FatArrow,

    #[token("??")]
    QuestionQuestion,
    #[token("?")]
    Question,

    // Compound assignment
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    // Literals
    #[regex(r"0[xX][0-9a-fA-F]+(?:i8|i16|i32|i64|u8|u16|u32|u64)?", |lex| lex.slice().to_string())]
    HexLiteral(String),

    #[regex(r"[0-9]+(?:i8|i16|i32|i64|u8|u16|u32|u64)?", |lex| lex.slice().to_string())]
    IntLiteral(String),

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse().ok())]
    FloatLiteral(f64),

    #[regex(r#""([^"\\]|\\["\\bnfrt]|u[a-fA-F0-9]{4})*""#, |lex| {
        let s = lex.slice();
        unescape_string(&s[1..s.len()-1])
    })]
    StringLiteral(String),

    #[regex(r#"f"([^"\\]|\\["\\bnfrt]|u[a-fA-F0-9]{4})*""#, |lex| {
        let s = lex.slice();
        unescape_string(&s[2..s.len()-1])
    })]
    FStringLiteral(String),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[token("_", priority = 10)]
    Underscore,

    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,

    #[regex(r"/\*([^*]|\*[^/])*\*/", logos::skip)]
    BlockComment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenSpan {
    pub token: Token,
    pub span: std::ops::Range<usize>,
}

pub struct Lexer<'source> {
    inner: logos::Lexer<'source, Token>,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source str) -> Self {
        Self {
            inner: Token::lexer(source),
        }
    }
}

impl<'source> Iterator for Lexer<'source> {
    type Item = Result<TokenSpan, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.inner.next()?;
        let span = self.inner.span();

        match token {
            Ok(tok) => Some(Ok(TokenSpan { token: tok, span })),
            Err(_) => Some(Err(LexError::InvalidToken { span: span.clone() })),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LexError {
    #[error("invalid token at {span:?}")]
    InvalidToken { span: std::ops::Range<usize> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords() {
        let source = "fn let struct enum perk extend with";
        let mut lexer = Lexer::new(source);

        assert_eq!(lexer.next().unwrap().unwrap().token, Token::Fn);
        assert_eq!(lexer.next().unwrap().unwrap().token, Token::Let);
        assert_eq!(lexer.next().unwrap().unwrap().token, Token::Struct);
        assert_eq!(lexer.next().unwrap().unwrap().token, Token::Enum);
        assert_eq!(lexer.next().unwrap().unwrap().token, Token::Perk);
        assert_eq!(lexer.next().unwrap().unwrap().token, Token::Extend);
        assert_eq!(lexer.next().unwrap().unwrap().token, Token::With);
    }

    #[test]
    fn test_rebind_vs_colon() {
        let source = "x := 1; y: i32 = 2";
        let tokens: Vec<_> = Lexer::new(source).map(|r| r.unwrap().token).collect();
        assert_eq!(tokens[1], Token::ColonEq);
        assert_eq!(tokens[5], Token::Colon);
    }

    #[test]
    fn test_try_operator() {
        let source = "do_thing()??";
        let tokens: Vec<_> = Lexer::new(source).map(|r| r.unwrap().token).collect();
        assert_eq!(tokens.last().unwrap(), &Token::QuestionQuestion);
    }

    #[test]
    fn test_peek_poke_borrow_modes() {
        let source = "fn f(x: peek i32, y: poke i32)";
        let tokens: Vec<_> = Lexer::new(source).map(|r| r.unwrap().token).collect();
        assert!(tokens.contains(&Token::Peek));
        assert!(tokens.contains(&Token::Poke));
    }

    #[test]
    fn test_literals() {
        let source = r#"42 3.14 "hello" f"world {x}""#;
        let mut lexer = Lexer::new(source);

        assert_eq!(
            lexer.next().unwrap().unwrap().token,
            Token::IntLiteral("42".to_string())
        );
        assert_eq!(
            lexer.next().unwrap().unwrap().token,
            Token::FloatLiteral(3.14)
        );
        assert_eq!(
            lexer.next().unwrap().unwrap().token,
            Token::StringLiteral("hello".to_string())
        );
        assert_eq!(
            lexer.next().unwrap().unwrap().token,
            Token::FStringLiteral("world {x}".to_string())
        );
    }
}
