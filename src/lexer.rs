// Tokenizer for filter scripts.
//
// Produces identifiers (ASCII letters only), double-quoted strings, the
// punctuation characters [ ] , ; ( ) { } : and a terminating Eof token.
// Anything else is a syntax error.

use crate::error::SyntaxError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    String,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Colon,
    Eof,
}

impl TokenKind {
    fn from_punctuation(c: char) -> Option<Self> {
        let kind = match c {
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ':' => TokenKind::Colon,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Identifier => "identifier",
            TokenKind::String => "string",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Colon => ":",
            TokenKind::Eof => "EOF",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Identifier name, unescaped string contents or the punctuation itself.
    pub text: String,
    /// Character offset into the source, for diagnostics.
    pub position: usize,
    /// Character offset just past the token's last source character.
    pub end: usize,
}

impl Token {
    pub fn is_identifier(&self, word: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text == word
    }
}

/// Splits `source` into tokens, always ending with an `Eof` token.
///
/// Inside strings a backslash escapes `\` and `"`; before any other
/// character the backslash is dropped and the character kept.
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let len = source.chars().count();
    let mut tokens = Vec::new();
    let mut chars = source.chars().enumerate().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        // U+FEFF is a byte order mark left by some editors
        if c.is_whitespace() || c == '\u{feff}' {
            chars.next();
            continue;
        }

        if c.is_ascii_alphabetic() {
            let mut ident = String::new();
            while let Some(&(_, ch)) = chars.peek() {
                if !ch.is_ascii_alphabetic() {
                    break;
                }
                ident.push(ch);
                chars.next();
            }
            tokens.push(Token {
                kind: TokenKind::Identifier,
                text: ident,
                position: pos,
                end: chars.peek().map_or(len, |&(end, _)| end),
            });
        } else if c == '"' {
            chars.next();
            let mut s = String::new();
            let mut closed = false;
            while let Some((_, ch)) = chars.next() {
                match ch {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => {
                        if let Some(&(_, esc @ ('\\' | '"'))) = chars.peek() {
                            s.push(esc);
                            chars.next();
                        }
                    }
                    _ => s.push(ch),
                }
            }
            if !closed {
                return Err(SyntaxError::UnterminatedString {
                    start: pos,
                    position: len,
                });
            }
            tokens.push(Token {
                kind: TokenKind::String,
                text: s,
                position: pos,
                end: chars.peek().map_or(len, |&(end, _)| end),
            });
        } else if let Some(kind) = TokenKind::from_punctuation(c) {
            chars.next();
            tokens.push(Token {
                kind,
                text: c.to_string(),
                position: pos,
                end: pos + 1,
            });
        } else {
            return Err(SyntaxError::UnexpectedChar { ch: c, position: pos });
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        text: String::new(),
        position: len,
        end: len,
    });
    Ok(tokens)
}

#[test]
fn test_tokenize_kinds() {
    let tokens = tokenize("if header :contains [\"a\", \"b\"] { keep; }").unwrap();
    let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        [
            TokenKind::Identifier,
            TokenKind::Identifier,
            TokenKind::Colon,
            TokenKind::Identifier,
            TokenKind::LBracket,
            TokenKind::String,
            TokenKind::Comma,
            TokenKind::String,
            TokenKind::RBracket,
            TokenKind::LBrace,
            TokenKind::Identifier,
            TokenKind::Semicolon,
            TokenKind::RBrace,
            TokenKind::Eof,
        ]
    );
    assert_eq!(tokens[3].text, "contains");
    assert_eq!(tokens[3].position, 11);
}

#[test]
fn test_tokenize_escapes() {
    let tokens = tokenize(r#""a\"b\\c\nd""#).unwrap();
    assert_eq!(tokens[0].kind, TokenKind::String);
    assert_eq!(tokens[0].text, r#"a"b\cnd"#);
    assert_eq!(tokens[1].kind, TokenKind::Eof);
}

#[test]
fn test_tokenize_positions_are_chars() {
    let tokens = tokenize("\u{a0}\"ü\" keep").unwrap();
    assert_eq!(tokens[0].position, 1);
    assert_eq!(tokens[1].position, 5);
    assert_eq!(tokens[2].position, 9);
    let ends: Vec<usize> = tokens.iter().map(|t| t.end).collect();
    assert_eq!(ends, [4, 9, 9]);
}

#[test]
fn test_tokenize_string_end_counts_escapes() {
    let tokens = tokenize(r#"x "a\"b" ;"#).unwrap();
    assert_eq!(tokens[1].text, r#"a"b"#);
    assert_eq!((tokens[1].position, tokens[1].end), (2, 8));
    assert_eq!(tokens[2].position, 9);
}

#[test]
fn test_tokenize_skips_byte_order_mark() {
    let tokens = tokenize("\u{feff}keep;").unwrap();
    assert!(tokens[0].is_identifier("keep"));
    assert_eq!(tokens[0].position, 1);
    assert_eq!(tokens[1].kind, TokenKind::Semicolon);
}

#[test]
fn test_tokenize_rejects_digits() {
    let err = tokenize("keep;\nfileinto 1;").unwrap_err();
    assert_eq!(err, SyntaxError::UnexpectedChar { ch: '1', position: 15 });
}

#[test]
fn test_tokenize_unterminated() {
    let err = tokenize("fileinto \"Archive;").unwrap_err();
    assert_eq!(
        err,
        SyntaxError::UnterminatedString {
            start: 9,
            position: 18
        }
    );
    assert!(err.to_string().contains("unexpected end of input"));
}

#[test]
fn test_tokenize_empty() {
    let tokens = tokenize("  \n\t").unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].kind, TokenKind::Eof);
    assert_eq!(tokens[0].position, 4);
}
