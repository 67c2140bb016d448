//! Tokenizer for the programmer/part/memory config grammar.
//!
//! Handles keywords, quoted strings (C-style backslash escapes plus
//! `\uXXXX`/`\UXXXXXXXX`), integers (decimal, `0x` hex, `_`-grouped), bare
//! identifiers, and the punctuation the grammar needs: `=`, `;`, `,`.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Programmer,
    Part,
    Memory,
    Ident(String),
    String(String),
    Integer(u64),
    Equals,
    Semicolon,
    Comma,
    Eof,
}

pub fn tokenize(source: &str, file: &Path) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();
    let mut line = 1usize;

    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            '#' => {
                while let Some(&(_, c)) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '\n' => {
                chars.next();
                line += 1;
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '=' => {
                tokens.push(Token { kind: TokenKind::Equals, line });
                chars.next();
            }
            ';' => {
                tokens.push(Token { kind: TokenKind::Semicolon, line });
                chars.next();
            }
            ',' => {
                tokens.push(Token { kind: TokenKind::Comma, line });
                chars.next();
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((_, '\\')) => match chars.next() {
                            Some((_, 'n')) => s.push('\n'),
                            Some((_, 't')) => s.push('\t'),
                            Some((_, 'r')) => s.push('\r'),
                            Some((_, '\\')) => s.push('\\'),
                            Some((_, '"')) => s.push('"'),
                            Some((_, 'u')) => push_unicode_escape(&mut chars, &mut s, 4)?,
                            Some((_, 'U')) => push_unicode_escape(&mut chars, &mut s, 8)?,
                            Some((_, other)) => s.push(other),
                            None => return Err(format!("{}:{line}: unterminated string", file.display())),
                        },
                        Some((_, '\n')) => {
                            return Err(format!("{}:{line}: unterminated string", file.display()))
                        }
                        Some((_, c)) => s.push(c),
                        None => return Err(format!("{}:{line}: unterminated string", file.display())),
                    }
                }
                tokens.push(Token { kind: TokenKind::String(s), line });
            }
            '0'..='9' => {
                let start = pos;
                chars.next();
                let mut is_hex = false;
                if ch == '0' {
                    if let Some(&(_, 'x' | 'X')) = chars.peek() {
                        chars.next();
                        is_hex = true;
                    }
                }
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        chars.next();
                    } else {
                        break;
                    }
                }
                let end = chars.peek().map_or(source.len(), |&(p, _)| p);
                let raw = &source[start..end];
                let clean = raw.replace('_', "");
                let value = if is_hex {
                    let hex_part = clean.strip_prefix("0x").or_else(|| clean.strip_prefix("0X")).unwrap_or(&clean);
                    u64::from_str_radix(hex_part, 16)
                        .map_err(|_| format!("{}:{line}: invalid hex literal {raw:?}", file.display()))?
                } else {
                    clean
                        .parse::<u64>()
                        .map_err(|_| format!("{}:{line}: invalid integer literal {raw:?}", file.display()))?
                };
                tokens.push(Token { kind: TokenKind::Integer(value), line });
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = pos;
                chars.next();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        chars.next();
                    } else {
                        break;
                    }
                }
                let end = chars.peek().map_or(source.len(), |&(p, _)| p);
                let word = &source[start..end];
                let kind = match word {
                    "programmer" => TokenKind::Programmer,
                    "part" => TokenKind::Part,
                    "memory" => TokenKind::Memory,
                    _ => TokenKind::Ident(word.to_string()),
                };
                tokens.push(Token { kind, line });
            }
            other => return Err(format!("{}:{line}: unexpected character {other:?}", file.display())),
        }
    }
    tokens.push(Token { kind: TokenKind::Eof, line });
    Ok(tokens)
}

fn push_unicode_escape(
    chars: &mut std::iter::Peekable<std::str::CharIndices>,
    out: &mut String,
    digits: usize,
) -> Result<(), String> {
    let mut hex = String::with_capacity(digits);
    for _ in 0..digits {
        match chars.next() {
            Some((_, c)) if c.is_ascii_hexdigit() => hex.push(c),
            _ => return Err("invalid unicode escape".to_string()),
        }
    }
    let code = u32::from_str_radix(&hex, 16).map_err(|_| "invalid unicode escape".to_string())?;
    out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
    Ok(())
}

pub fn tokenize_owned(source: &str, file: PathBuf) -> Result<Vec<Token>, String> {
    tokenize(source, &file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_programmer_block() {
        let src = r#"programmer
  id   = "arduino";
  type = stk500v1;
  baudrate = 115_200;
;"#;
        let toks = tokenize(src, Path::new("test")).unwrap();
        let kinds: Vec<_> = toks.iter().map(|t| &t.kind).collect();
        assert!(kinds.contains(&&TokenKind::Programmer));
        assert!(kinds.contains(&&TokenKind::String("arduino".into())));
        assert!(kinds.contains(&&TokenKind::Integer(115_200)));
    }

    #[test]
    fn hex_signature_triplet() {
        let toks = tokenize("0x1e 0x95 0x0f", Path::new("test")).unwrap();
        let ints: Vec<u64> = toks
            .iter()
            .filter_map(|t| match &t.kind {
                TokenKind::Integer(v) => Some(*v),
                _ => None,
            })
            .collect();
        assert_eq!(ints, vec![0x1e, 0x95, 0x0f]);
    }

    #[test]
    fn string_escapes() {
        let toks = tokenize(r#""a\tbA""#, Path::new("test")).unwrap();
        match &toks[0].kind {
            TokenKind::String(s) => assert_eq!(s, "a\tbA"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
