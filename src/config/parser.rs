//! Recursive-descent parser producing a raw, untyped AST from tokens.
//!
//! Grammar:
//! ```text
//! file       := block*
//! block      := programmer_block | part_block
//! programmer_block := "programmer" prop* ";"
//! part_block := "part" prop* memory_block* ";"
//! memory_block := "memory" string prop* ";"
//! prop       := ident "=" value ("," value)* ";"
//! value      := string | integer | ident
//! ```
//! The builder (`config::build`) turns this into typed `AvrPart`/`Programmer`
//! values and is where required-field and paged-size checks live.

use std::path::PathBuf;

use super::lexer::{Token, TokenKind};

#[derive(Debug, Clone)]
pub enum PropValue {
    Str(String),
    Int(u64),
    Ident(String),
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<u64> {
        match self {
            PropValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            PropValue::Ident(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RawProp {
    pub key: String,
    pub values: Vec<PropValue>,
    pub line: usize,
}

impl RawProp {
    pub fn first(&self) -> Option<&PropValue> {
        self.values.first()
    }
}

#[derive(Debug, Clone)]
pub struct RawMemory {
    pub name: String,
    pub props: Vec<RawProp>,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct RawPart {
    pub props: Vec<RawProp>,
    pub memories: Vec<RawMemory>,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct RawProgrammer {
    pub props: Vec<RawProp>,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub enum RawBlock {
    Programmer(RawProgrammer),
    Part(RawPart),
}

#[derive(Debug, Clone, Default)]
pub struct RawFile {
    pub blocks: Vec<RawBlock>,
}

struct Parser<'a> {
    toks: &'a [Token],
    pos: usize,
    file: PathBuf,
}

type PResult<T> = Result<T, String>;

impl<'a> Parser<'a> {
    fn peek(&self) -> &TokenKind {
        &self.toks[self.pos].kind
    }

    fn line(&self) -> usize {
        self.toks[self.pos].line
    }

    fn bump(&mut self) -> Token {
        let t = self.toks[self.pos].clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn err(&self, msg: impl Into<String>) -> String {
        format!("{}:{}: {}", self.file.display(), self.line(), msg.into())
    }

    fn expect(&mut self, kind: &TokenKind) -> PResult<()> {
        if self.peek() == kind {
            self.bump();
            Ok(())
        } else {
            Err(self.err(format!("expected {kind:?}, found {:?}", self.peek())))
        }
    }

    fn parse_file(&mut self) -> PResult<RawFile> {
        let mut blocks = Vec::new();
        loop {
            match self.peek() {
                TokenKind::Eof => break,
                TokenKind::Programmer => blocks.push(RawBlock::Programmer(self.parse_programmer()?)),
                TokenKind::Part => blocks.push(RawBlock::Part(self.parse_part()?)),
                other => return Err(self.err(format!("expected 'programmer' or 'part', found {other:?}"))),
            }
        }
        Ok(RawFile { blocks })
    }

    fn parse_programmer(&mut self) -> PResult<RawProgrammer> {
        let line = self.line();
        self.expect(&TokenKind::Programmer)?;
        let mut props = Vec::new();
        while !matches!(self.peek(), TokenKind::Semicolon | TokenKind::Eof) {
            props.push(self.parse_prop()?);
        }
        self.expect(&TokenKind::Semicolon)?;
        Ok(RawProgrammer { props, line })
    }

    fn parse_part(&mut self) -> PResult<RawPart> {
        let line = self.line();
        self.expect(&TokenKind::Part)?;
        let mut props = Vec::new();
        let mut memories = Vec::new();
        loop {
            match self.peek() {
                TokenKind::Memory => memories.push(self.parse_memory()?),
                TokenKind::Semicolon | TokenKind::Eof => break,
                _ => props.push(self.parse_prop()?),
            }
        }
        self.expect(&TokenKind::Semicolon)?;
        Ok(RawPart { props, memories, line })
    }

    fn parse_memory(&mut self) -> PResult<RawMemory> {
        let line = self.line();
        self.expect(&TokenKind::Memory)?;
        let name = match self.bump().kind {
            TokenKind::String(s) => s,
            other => return Err(self.err(format!("expected memory name string, found {other:?}"))),
        };
        let mut props = Vec::new();
        while !matches!(self.peek(), TokenKind::Semicolon | TokenKind::Eof) {
            props.push(self.parse_prop()?);
        }
        self.expect(&TokenKind::Semicolon)?;
        Ok(RawMemory { name, props, line })
    }

    fn parse_prop(&mut self) -> PResult<RawProp> {
        let line = self.line();
        let key = match self.bump().kind {
            TokenKind::Ident(s) => s,
            other => return Err(self.err(format!("expected property name, found {other:?}"))),
        };
        self.expect(&TokenKind::Equals)?;
        let mut values = vec![self.parse_value()?];
        while matches!(self.peek(), TokenKind::Comma) {
            self.bump();
            values.push(self.parse_value()?);
        }
        self.expect(&TokenKind::Semicolon)?;
        Ok(RawProp { key, values, line })
    }

    fn parse_value(&mut self) -> PResult<PropValue> {
        match self.bump().kind {
            TokenKind::String(s) => Ok(PropValue::Str(s)),
            TokenKind::Integer(v) => Ok(PropValue::Int(v)),
            TokenKind::Ident(s) => Ok(PropValue::Ident(s)),
            other => Err(self.err(format!("expected a value, found {other:?}"))),
        }
    }
}

pub fn parse(toks: &[Token], file: PathBuf) -> PResult<RawFile> {
    Parser { toks, pos: 0, file }.parse_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::lexer::tokenize;
    use std::path::Path;

    #[test]
    fn parses_programmer_and_part() {
        let src = r#"
programmer
  id   = "arduino";
  type = stk500v1;
;

part
  id   = "m328p";
  signature = 0x1e, 0x95, 0x0f;
  memory "flash"
    size = 32768;
    paged = yes;
  ;
;
"#;
        let toks = tokenize(src, Path::new("test")).unwrap();
        let file = parse(&toks, PathBuf::from("test")).unwrap();
        assert_eq!(file.blocks.len(), 2);
        match &file.blocks[1] {
            RawBlock::Part(p) => {
                assert_eq!(p.memories.len(), 1);
                assert_eq!(p.memories[0].name, "flash");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_semicolon_is_an_error() {
        let src = "programmer id = \"x\";";
        let toks = tokenize(src, Path::new("test")).unwrap();
        assert!(parse(&toks, PathBuf::from("test")).is_err());
    }
}
