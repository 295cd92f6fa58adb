//! Tokenizer for the trace-query language.
//!
//! Every token carries the byte offset where it starts, so parse errors can
//! point at the exact position in the expression.

use baton_contracts::error::{BatonError, BatonResult};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// A field name or keyword: `handoff.status`, `in`, `descendant-of`, `true`.
    Ident(String),
    Str(String),
    Number(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Match,
    Ge,
    Le,
    Gt,
    Lt,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(s) => format!("'{s}'"),
            TokenKind::Str(s) => format!("string \"{s}\""),
            TokenKind::Number(n) => format!("number {n}"),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBracket => "'['".to_string(),
            TokenKind::RBracket => "']'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::And => "'&&'".to_string(),
            TokenKind::Or => "'||'".to_string(),
            TokenKind::Not => "'!'".to_string(),
            TokenKind::Eq => "'='".to_string(),
            TokenKind::Ne => "'!='".to_string(),
            TokenKind::Match => "'=~'".to_string(),
            TokenKind::Ge => "'>='".to_string(),
            TokenKind::Le => "'<='".to_string(),
            TokenKind::Gt => "'>'".to_string(),
            TokenKind::Lt => "'<'".to_string(),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

fn error(reason: impl Into<String>, position: usize) -> BatonError {
    BatonError::Query {
        reason: reason.into(),
        position,
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// Split `input` into tokens, ending with `Eof`.
pub fn tokenize(input: &str) -> BatonResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let two = |second: char| input[pos + c.len_utf8()..].starts_with(second);
        let (kind, width) = match c {
            '(' => (TokenKind::LParen, 1),
            ')' => (TokenKind::RParen, 1),
            '[' => (TokenKind::LBracket, 1),
            ']' => (TokenKind::RBracket, 1),
            ',' => (TokenKind::Comma, 1),
            '&' if two('&') => (TokenKind::And, 2),
            '|' if two('|') => (TokenKind::Or, 2),
            '!' if two('=') => (TokenKind::Ne, 2),
            '!' => (TokenKind::Not, 1),
            '=' if two('~') => (TokenKind::Match, 2),
            '=' if two('=') => (TokenKind::Eq, 2),
            '=' => (TokenKind::Eq, 1),
            '>' if two('=') => (TokenKind::Ge, 2),
            '>' => (TokenKind::Gt, 1),
            '<' if two('=') => (TokenKind::Le, 2),
            '<' => (TokenKind::Lt, 1),
            '"' => {
                chars.next();
                let text = lex_string(&mut chars, pos)?;
                tokens.push(Token {
                    kind: TokenKind::Str(text),
                    position: pos,
                });
                continue;
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut end = pos + c.len_utf8();
                chars.next();
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let raw = &input[pos..end];
                let value = raw
                    .parse::<f64>()
                    .map_err(|_| error(format!("invalid number '{raw}'"), pos))?;
                tokens.push(Token {
                    kind: TokenKind::Number(value),
                    position: pos,
                });
                continue;
            }
            c if is_ident_start(c) => {
                let mut end = pos;
                while let Some(&(i, d)) = chars.peek() {
                    if is_ident_char(d) {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Ident(input[pos..end].to_string()),
                    position: pos,
                });
                continue;
            }
            other => return Err(error(format!("unexpected character '{other}'"), pos)),
        };

        for _ in 0..width {
            chars.next();
        }
        tokens.push(Token {
            kind,
            position: pos,
        });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        position: input.len(),
    });
    Ok(tokens)
}

fn lex_string(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    start: usize,
) -> BatonResult<String> {
    let mut text = String::new();
    while let Some((pos, c)) = chars.next() {
        match c {
            '"' => return Ok(text),
            '\\' => match chars.next() {
                Some((_, '"')) => text.push('"'),
                Some((_, '\\')) => text.push('\\'),
                Some((_, 'n')) => text.push('\n'),
                Some((_, 't')) => text.push('\t'),
                Some((_, other)) => {
                    // Unknown escapes pass through so regexes like "\d" work.
                    text.push('\\');
                    text.push(other);
                }
                None => return Err(error("unterminated escape", pos)),
            },
            other => text.push(other),
        }
    }
    Err(error("unterminated string literal", start))
}
