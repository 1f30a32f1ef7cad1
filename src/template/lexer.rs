//! Splits template text into literal text and the tokens inside `{{ }}` and
//! `{% %}` tags. Comments and raw blocks are resolved here, as is
//! whitespace control (`{%-` / `-%}`).

use crate::error::{Result, TemplateError};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Text(String),
    VarStart,
    VarEnd,
    BlockStart,
    BlockEnd,
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Tok {
    pub fn describe(&self) -> String {
        match self {
            Tok::Text(_) => "text".to_string(),
            Tok::VarStart => "'{{'".to_string(),
            Tok::VarEnd => "'}}'".to_string(),
            Tok::BlockStart => "'{%'".to_string(),
            Tok::BlockEnd => "'%}'".to_string(),
            Tok::Ident(name) => format!("'{}'", name),
            Tok::Str(s) => format!("string {:?}", s),
            Tok::Int(n) => format!("number {}", n),
            Tok::Float(n) => format!("number {}", n),
            Tok::LParen => "'('".to_string(),
            Tok::RParen => "')'".to_string(),
            Tok::LBracket => "'['".to_string(),
            Tok::RBracket => "']'".to_string(),
            Tok::Comma => "','".to_string(),
            Tok::Dot => "'.'".to_string(),
            Tok::Assign => "'='".to_string(),
            Tok::Eq => "'=='".to_string(),
            Tok::Ne => "'!='".to_string(),
            Tok::Lt => "'<'".to_string(),
            Tok::Le => "'<='".to_string(),
            Tok::Gt => "'>'".to_string(),
            Tok::Ge => "'>='".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
}

pub fn tokenize(src: &str, file: &Path) -> Result<Vec<Token>> {
    let mut lexer = Lexer {
        src,
        file,
        pos: 0,
        line: 1,
        tokens: Vec::new(),
        trim_next: false,
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

struct Lexer<'a> {
    src: &'a str,
    file: &'a Path,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
    /// Set by a `-` before a closing delimiter; strips leading whitespace
    /// from the next text run.
    trim_next: bool,
}

impl<'a> Lexer<'a> {
    fn run(&mut self) -> Result<()> {
        let src = self.src;
        while self.pos < src.len() {
            let rest = &src[self.pos..];
            let (text_len, opener) = match find_tag(rest) {
                Some((at, kind)) => (at, Some(kind)),
                None => (rest.len(), None),
            };

            let trim_before = opener.is_some() && rest[text_len + 2..].starts_with('-');
            self.push_text(&rest[..text_len], trim_before);
            self.pos += text_len;

            let Some(kind) = opener else { break };
            self.pos += if trim_before { 3 } else { 2 };

            match kind {
                '#' => self.skip_comment()?,
                '{' => {
                    self.push(Tok::VarStart);
                    self.lex_tag("}}")?;
                    self.push(Tok::VarEnd);
                }
                _ => {
                    let start = self.tokens.len();
                    self.push(Tok::BlockStart);
                    self.lex_tag("%}")?;
                    self.push(Tok::BlockEnd);
                    if self.tokens.len() == start + 3 && self.tokens[start + 1].tok == Tok::Ident("raw".to_string()) {
                        let line = self.tokens[start].line;
                        self.tokens.truncate(start);
                        self.raw_block(line)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn push(&mut self, tok: Tok) {
        self.tokens.push(Token { tok, line: self.line });
    }

    fn push_text(&mut self, text: &str, trim_end: bool) {
        let line = self.line;
        self.line += text.matches('\n').count();

        let mut text = text;
        if std::mem::take(&mut self.trim_next) {
            text = text.trim_start();
        }
        if trim_end {
            text = text.trim_end();
        }
        if !text.is_empty() {
            self.tokens.push(Token {
                tok: Tok::Text(text.to_string()),
                line,
            });
        }
    }

    fn error(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::syntax(self.file, self.line, message)
    }

    fn skip_comment(&mut self) -> Result<()> {
        let src = self.src;
        let rest = &src[self.pos..];
        let end = rest.find("#}").ok_or_else(|| self.error("unterminated comment"))?;
        self.line += rest[..end].matches('\n').count();
        self.trim_next = rest[..end].ends_with('-');
        self.pos += end + 2;
        Ok(())
    }

    /// Copy everything up to the matching `{% endraw %}` as text.
    fn raw_block(&mut self, open_line: usize) -> Result<()> {
        let src = self.src;
        let rest = &src[self.pos..];
        let mut search = 0;
        while let Some(at) = rest[search..].find("{%") {
            let tag_start = search + at;
            if let Some((tag_len, trim_before, trim_after)) = match_endraw(&rest[tag_start..]) {
                self.push_text(&rest[..tag_start], trim_before);
                self.pos += tag_start + tag_len;
                self.trim_next = trim_after;
                return Ok(());
            }
            search = tag_start + 2;
        }
        Err(TemplateError::syntax(
            self.file,
            open_line,
            "unclosed '{% raw %}' block, expected '{% endraw %}'",
        ))
    }

    fn lex_tag(&mut self, close: &str) -> Result<()> {
        loop {
            self.skip_whitespace();
            let src = self.src;
            let rest = &src[self.pos..];
            if rest.is_empty() {
                return Err(self.error(format!("unterminated tag, expected '{}'", close)));
            }
            if rest.starts_with(close) {
                self.pos += close.len();
                return Ok(());
            }
            if rest.starts_with('-') && rest[1..].starts_with(close) {
                self.trim_next = true;
                self.pos += 1 + close.len();
                return Ok(());
            }
            self.lex_token()?;
        }
    }

    fn skip_whitespace(&mut self) {
        let src = self.src;
        let rest = &src[self.pos..];
        let trimmed = rest.trim_start();
        let skipped = &rest[..rest.len() - trimmed.len()];
        self.line += skipped.matches('\n').count();
        self.pos += skipped.len();
    }

    fn lex_token(&mut self) -> Result<()> {
        let src = self.src;
        let rest = &src[self.pos..];
        let mut chars = rest.chars();
        let Some(c) = chars.next() else {
            return Err(self.error("unexpected end of template"));
        };
        let next = chars.next();

        if c == '"' || c == '\'' {
            return self.lex_string(c);
        }
        if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) {
            return self.lex_number();
        }
        if c.is_alphabetic() || c == '_' {
            let len = rest
                .char_indices()
                .find(|(_, ch)| !(ch.is_alphanumeric() || *ch == '_'))
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            self.push(Tok::Ident(rest[..len].to_string()));
            self.pos += len;
            return Ok(());
        }

        let two = match (c, next) {
            ('=', Some('=')) => Some(Tok::Eq),
            ('!', Some('=')) => Some(Tok::Ne),
            ('<', Some('=')) => Some(Tok::Le),
            ('>', Some('=')) => Some(Tok::Ge),
            _ => None,
        };
        if let Some(tok) = two {
            self.push(tok);
            self.pos += 2;
            return Ok(());
        }

        let one = match c {
            '(' => Tok::LParen,
            ')' => Tok::RParen,
            '[' => Tok::LBracket,
            ']' => Tok::RBracket,
            ',' => Tok::Comma,
            '.' => Tok::Dot,
            '=' => Tok::Assign,
            '<' => Tok::Lt,
            '>' => Tok::Gt,
            other => return Err(self.error(format!("unexpected character '{}'", other))),
        };
        self.push(one);
        self.pos += c.len_utf8();
        Ok(())
    }

    fn lex_string(&mut self, quote: char) -> Result<()> {
        let start_line = self.line;
        let mut value = String::new();
        let src = self.src;
        let mut chars = src[self.pos + 1..].char_indices();

        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => {
                    let (_, escaped) = chars.next().ok_or_else(|| self.error("unterminated string"))?;
                    value.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '\\' => '\\',
                        '"' => '"',
                        '\'' => '\'',
                        other => return Err(self.error(format!("unknown escape '\\{}'", other))),
                    });
                }
                c if c == quote => {
                    self.tokens.push(Token {
                        tok: Tok::Str(value),
                        line: start_line,
                    });
                    self.pos += 1 + i + c.len_utf8();
                    return Ok(());
                }
                '\n' => {
                    self.line += 1;
                    value.push(c);
                }
                c => value.push(c),
            }
        }
        Err(TemplateError::syntax(self.file, start_line, "unterminated string"))
    }

    fn lex_number(&mut self) -> Result<()> {
        let src = self.src;
        let rest = &src[self.pos..];
        let bytes = rest.as_bytes();
        let mut len = usize::from(bytes[0] == b'-');
        while len < bytes.len() && bytes[len].is_ascii_digit() {
            len += 1;
        }
        let is_float = len + 1 < bytes.len() && bytes[len] == b'.' && bytes[len + 1].is_ascii_digit();
        if is_float {
            len += 1;
            while len < bytes.len() && bytes[len].is_ascii_digit() {
                len += 1;
            }
        }

        let text = &rest[..len];
        let tok = if is_float {
            Tok::Float(text.parse().map_err(|_| self.error(format!("invalid number '{}'", text)))?)
        } else {
            Tok::Int(text.parse().map_err(|_| self.error(format!("invalid number '{}'", text)))?)
        };
        self.push(tok);
        self.pos += len;
        Ok(())
    }
}

/// Offset and kind (`{`, `%` or `#`) of the next tag opener.
fn find_tag(s: &str) -> Option<(usize, char)> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' && matches!(bytes[i + 1], b'{' | b'%' | b'#') {
            return Some((i, bytes[i + 1] as char));
        }
        i += 1;
    }
    None
}

/// Match `{% endraw %}` (with optional whitespace control) at the start of
/// `s`; returns its length and the trim flags.
fn match_endraw(s: &str) -> Option<(usize, bool, bool)> {
    let mut rest = s.strip_prefix("{%")?;
    let trim_before = rest.starts_with('-');
    if trim_before {
        rest = &rest[1..];
    }
    rest = rest.trim_start().strip_prefix("endraw")?;
    rest = rest.trim_start();
    let trim_after = rest.starts_with('-');
    if trim_after {
        rest = &rest[1..];
    }
    rest = rest.strip_prefix("%}")?;
    Some((s.len() - rest.len(), trim_before, trim_after))
}
