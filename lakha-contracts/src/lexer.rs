use lakha_common::error::{NodeError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Let,
    Fn,
    If,
    Else,
    For,
    While,
    In,
    Return,
    True,
    False,
    NoneKw,
    And,
    Or,
    Not,
    // Tokenized (so the parser can recognize and reject them), never given
    // execution semantics — the forbidden-construct list.
    Import,
    With,
    Try,
    Except,
    Lambda,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    Semicolon,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Eof,
}

pub fn tokenize(src: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    let mut tokens = Vec::new();

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '#' {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            let mut is_float = false;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                if chars[i] == '.' {
                    is_float = true;
                }
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            if is_float {
                tokens.push(Token::Float(text.parse().map_err(|_| {
                    NodeError::ContractValidationFailed(format!("bad float literal: {text}"))
                })?));
            } else {
                tokens.push(Token::Int(text.parse().map_err(|_| {
                    NodeError::ContractValidationFailed(format!("bad int literal: {text}"))
                })?));
            }
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            tokens.push(match word.as_str() {
                "let" => Token::Let,
                "fn" => Token::Fn,
                "if" => Token::If,
                "else" => Token::Else,
                "for" => Token::For,
                "while" => Token::While,
                "in" => Token::In,
                "return" => Token::Return,
                "true" => Token::True,
                "false" => Token::False,
                "none" => Token::NoneKw,
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "import" => Token::Import,
                "with" => Token::With,
                "try" => Token::Try,
                "except" => Token::Except,
                "lambda" => Token::Lambda,
                _ => Token::Ident(word),
            });
            continue;
        }
        if c == '"' || c == '\'' {
            let quote = c;
            i += 1;
            let start = i;
            while i < chars.len() && chars[i] != quote {
                i += 1;
            }
            if i >= chars.len() {
                return Err(NodeError::ContractValidationFailed(
                    "unterminated string literal".into(),
                ));
            }
            let text: String = chars[start..i].iter().collect();
            i += 1;
            tokens.push(Token::Str(text));
            continue;
        }
        macro_rules! two_char {
            ($second:expr, $both:expr, $single:expr) => {{
                if i + 1 < chars.len() && chars[i + 1] == $second {
                    i += 2;
                    $both
                } else {
                    i += 1;
                    $single
                }
            }};
        }
        let tok = match c {
            '(' => {
                i += 1;
                Token::LParen
            }
            ')' => {
                i += 1;
                Token::RParen
            }
            '{' => {
                i += 1;
                Token::LBrace
            }
            '}' => {
                i += 1;
                Token::RBrace
            }
            '[' => {
                i += 1;
                Token::LBracket
            }
            ']' => {
                i += 1;
                Token::RBracket
            }
            ',' => {
                i += 1;
                Token::Comma
            }
            '.' => {
                i += 1;
                Token::Dot
            }
            ':' => {
                i += 1;
                Token::Colon
            }
            ';' => {
                i += 1;
                Token::Semicolon
            }
            '+' => {
                i += 1;
                Token::Plus
            }
            '-' => {
                i += 1;
                Token::Minus
            }
            '*' => {
                i += 1;
                Token::Star
            }
            '/' => {
                i += 1;
                Token::Slash
            }
            '=' => two_char!('=', Token::Eq, Token::Assign),
            '!' => two_char!('=', Token::NotEq, {
                return Err(NodeError::ContractValidationFailed("unexpected '!'".into()));
            }),
            '<' => two_char!('=', Token::LtEq, Token::Lt),
            '>' => two_char!('=', Token::GtEq, Token::Gt),
            other => {
                return Err(NodeError::ContractValidationFailed(format!(
                    "unexpected character: {other}"
                )))
            }
        };
        tokens.push(tok);
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}
