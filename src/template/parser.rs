//! Recursive-descent parser from tokens to the template tree.

use super::lexer::{Tok, Token, tokenize};
use crate::error::{Result, TemplateError};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Output(Expr),
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    For {
        target: Target,
        iter: Expr,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

/// Loop variable(s) of a `for` block.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Single(String),
    Pair(String, String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Value),
    List(Vec<Expr>),
    Var(String),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    /// `x is defined`, or `x is not defined` when the flag is set.
    Defined(Box<Expr>, bool),
    Call(Call),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

/// The only callable functions.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Reference(Box<Expr>),
    Include(Box<Expr>),
    Template { file: Box<Expr>, args: Vec<(String, Value)> },
}

const KEYWORDS: &[&str] = &["and", "or", "not", "in", "is", "if", "for"];

pub fn parse(src: &str, file: &Path) -> Result<Vec<Node>> {
    let tokens = tokenize(src, file)?;
    let mut parser = Parser { tokens, pos: 0, file };
    let (nodes, _) = parser.body(&[], 1)?;
    Ok(nodes)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    file: &'a Path,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn peek_at(&self, offset: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + offset).map(|t| &t.tok)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::syntax(self.file, self.line(), message)
    }

    fn expect(&mut self, tok: Tok) -> Result<()> {
        match self.peek() {
            Some(t) if *t == tok => {
                self.pos += 1;
                Ok(())
            }
            Some(t) => Err(self.error(format!("expected {}, found {}", tok.describe(), t.describe()))),
            None => Err(self.error(format!("expected {}, found end of template", tok.describe()))),
        }
    }

    fn peek_ident(&self, name: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident(n)) if n == name)
    }

    fn eat_ident(&mut self, name: &str) -> bool {
        if self.peek_ident(name) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_name(&mut self) -> Result<String> {
        match self.peek() {
            Some(Tok::Ident(name)) if !KEYWORDS.contains(&name.as_str()) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            Some(t) => Err(self.error(format!("expected a name, found {}", t.describe()))),
            None => Err(self.error("expected a name, found end of template")),
        }
    }

    /// Parse nodes until one of the `until` block keywords is reached (the
    /// keyword is consumed and returned) or, when `until` is empty, to the
    /// end of input.
    fn body(&mut self, until: &[&'static str], open_line: usize) -> Result<(Vec<Node>, Option<&'static str>)> {
        let mut nodes = Vec::new();
        while let Some(token) = self.next() {
            match token.tok {
                Tok::Text(text) => nodes.push(Node::Text(text)),
                Tok::VarStart => {
                    let expr = self.expr()?;
                    self.expect(Tok::VarEnd)?;
                    nodes.push(Node::Output(expr));
                }
                Tok::BlockStart => {
                    let keyword = match self.peek() {
                        Some(Tok::Ident(k)) => k.clone(),
                        Some(t) => return Err(self.error(format!("expected a block keyword, found {}", t.describe()))),
                        None => return Err(self.error("expected a block keyword")),
                    };
                    if let Some(end) = until.iter().find(|u| **u == keyword) {
                        self.pos += 1;
                        return Ok((nodes, Some(*end)));
                    }
                    self.pos += 1;
                    match keyword.as_str() {
                        "if" => nodes.push(self.if_block(token.line)?),
                        "for" => nodes.push(self.for_block(token.line)?),
                        "elif" | "else" | "endif" | "endfor" | "endraw" => {
                            return Err(TemplateError::syntax(
                                self.file,
                                token.line,
                                format!("unexpected '{{% {} %}}'", keyword),
                            ));
                        }
                        other => {
                            return Err(TemplateError::syntax(
                                self.file,
                                token.line,
                                format!("unknown block '{}'", other),
                            ));
                        }
                    }
                }
                other => return Err(self.error(format!("unexpected {}", other.describe()))),
            }
        }

        if until.is_empty() {
            Ok((nodes, None))
        } else {
            Err(TemplateError::syntax(
                self.file,
                open_line,
                format!(
                    "unclosed block, expected {}",
                    until.iter().map(|u| format!("'{{% {} %}}'", u)).collect::<Vec<_>>().join(" or ")
                ),
            ))
        }
    }

    fn if_block(&mut self, line: usize) -> Result<Node> {
        let mut branches = Vec::new();
        let mut otherwise = Vec::new();

        let mut cond = self.expr()?;
        loop {
            self.expect(Tok::BlockEnd)?;
            let (nodes, end) = self.body(&["elif", "else", "endif"], line)?;
            branches.push((cond, nodes));
            match end {
                Some("elif") => cond = self.expr()?,
                Some("else") => {
                    self.expect(Tok::BlockEnd)?;
                    let (nodes, _) = self.body(&["endif"], line)?;
                    otherwise = nodes;
                    self.expect(Tok::BlockEnd)?;
                    break;
                }
                _ => {
                    self.expect(Tok::BlockEnd)?;
                    break;
                }
            }
        }

        Ok(Node::If { branches, otherwise })
    }

    fn for_block(&mut self, line: usize) -> Result<Node> {
        let first = self.expect_name()?;
        let target = if self.peek() == Some(&Tok::Comma) {
            self.pos += 1;
            Target::Pair(first, self.expect_name()?)
        } else {
            Target::Single(first)
        };
        if !self.eat_ident("in") {
            return Err(self.error("expected 'in' in for loop"));
        }
        let iter = self.expr()?;
        self.expect(Tok::BlockEnd)?;

        let (body, end) = self.body(&["else", "endfor"], line)?;
        let otherwise = if end == Some("else") {
            self.expect(Tok::BlockEnd)?;
            let (nodes, _) = self.body(&["endfor"], line)?;
            nodes
        } else {
            Vec::new()
        };
        self.expect(Tok::BlockEnd)?;

        Ok(Node::For {
            target,
            iter,
            body,
            otherwise,
        })
    }

    fn expr(&mut self) -> Result<Expr> {
        let mut lhs = self.and_expr()?;
        while self.peek_ident("or") {
            let line = self.line();
            self.pos += 1;
            let rhs = self.and_expr()?;
            lhs = Expr {
                kind: ExprKind::Or(Box::new(lhs), Box::new(rhs)),
                line,
            };
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.not_expr()?;
        while self.peek_ident("and") {
            let line = self.line();
            self.pos += 1;
            let rhs = self.not_expr()?;
            lhs = Expr {
                kind: ExprKind::And(Box::new(lhs), Box::new(rhs)),
                line,
            };
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.peek_ident("not") {
            let line = self.line();
            self.pos += 1;
            let inner = self.not_expr()?;
            return Ok(Expr {
                kind: ExprKind::Not(Box::new(inner)),
                line,
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let lhs = self.test()?;
        let line = self.line();
        let op = match self.peek() {
            Some(Tok::Eq) => CmpOp::Eq,
            Some(Tok::Ne) => CmpOp::Ne,
            Some(Tok::Lt) => CmpOp::Lt,
            Some(Tok::Le) => CmpOp::Le,
            Some(Tok::Gt) => CmpOp::Gt,
            Some(Tok::Ge) => CmpOp::Ge,
            Some(Tok::Ident(k)) if k == "in" => CmpOp::In,
            Some(Tok::Ident(k)) if k == "not" && matches!(self.peek_at(1), Some(Tok::Ident(n)) if n == "in") => {
                self.pos += 1;
                CmpOp::NotIn
            }
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.test()?;
        Ok(Expr {
            kind: ExprKind::Compare(op, Box::new(lhs), Box::new(rhs)),
            line,
        })
    }

    fn test(&mut self) -> Result<Expr> {
        let expr = self.postfix()?;
        if !self.peek_ident("is") {
            return Ok(expr);
        }
        let line = self.line();
        self.pos += 1;
        let negated = self.eat_ident("not");
        if !self.eat_ident("defined") {
            return Err(self.error("only the 'defined' test is supported after 'is'"));
        }
        Ok(Expr {
            kind: ExprKind::Defined(Box::new(expr), negated),
            line,
        })
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        loop {
            let line = self.line();
            match self.peek() {
                Some(Tok::Dot) => {
                    self.pos += 1;
                    let name = match self.next() {
                        Some(Token { tok: Tok::Ident(name), .. }) => name,
                        Some(Token { tok: Tok::Int(n), .. }) if n >= 0 => n.to_string(),
                        _ => return Err(TemplateError::syntax(self.file, line, "expected an attribute name after '.'")),
                    };
                    expr = Expr {
                        kind: ExprKind::Attr(Box::new(expr), name),
                        line,
                    };
                }
                Some(Tok::LBracket) => {
                    self.pos += 1;
                    let index = self.expr()?;
                    self.expect(Tok::RBracket)?;
                    expr = Expr {
                        kind: ExprKind::Index(Box::new(expr), Box::new(index)),
                        line,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        let line = self.line();
        let Some(token) = self.next() else {
            return Err(self.error("expected an expression, found end of template"));
        };
        let kind = match token.tok {
            Tok::Str(s) => ExprKind::Literal(Value::String(s)),
            Tok::Int(n) => ExprKind::Literal(Value::from(n)),
            Tok::Float(f) => ExprKind::Literal(Value::from(f)),
            Tok::LParen => {
                let inner = self.expr()?;
                self.expect(Tok::RParen)?;
                return Ok(inner);
            }
            Tok::LBracket => {
                let mut items = Vec::new();
                if self.peek() != Some(&Tok::RBracket) {
                    loop {
                        items.push(self.expr()?);
                        if self.peek() != Some(&Tok::Comma) {
                            break;
                        }
                        self.pos += 1;
                        if self.peek() == Some(&Tok::RBracket) {
                            break;
                        }
                    }
                }
                self.expect(Tok::RBracket)?;
                ExprKind::List(items)
            }
            Tok::Ident(name) => match name.as_str() {
                "true" | "True" => ExprKind::Literal(Value::Bool(true)),
                "false" | "False" => ExprKind::Literal(Value::Bool(false)),
                "none" | "None" => ExprKind::Literal(Value::Null),
                _ if self.peek() == Some(&Tok::LParen) => ExprKind::Call(self.call(&name, line)?),
                k if KEYWORDS.contains(&k) => {
                    return Err(TemplateError::syntax(
                        self.file,
                        line,
                        format!("unexpected keyword '{}'", k),
                    ));
                }
                _ => ExprKind::Var(name.clone()),
            },
            other => {
                return Err(TemplateError::syntax(
                    self.file,
                    line,
                    format!("expected an expression, found {}", other.describe()),
                ));
            }
        };
        Ok(Expr { kind, line })
    }

    fn call(&mut self, name: &str, line: usize) -> Result<Call> {
        if !matches!(name, "reference" | "include" | "template") {
            return Err(TemplateError::syntax(
                self.file,
                line,
                format!("unknown function '{}'; only reference, include and template can be called", name),
            ));
        }
        self.expect(Tok::LParen)?;

        let mut positional = Vec::new();
        let mut kwargs: Vec<(String, Value)> = Vec::new();
        while self.peek() != Some(&Tok::RParen) {
            let is_kwarg = matches!(self.peek(), Some(Tok::Ident(_))) && self.peek_at(1) == Some(&Tok::Assign);
            if is_kwarg {
                let key = self.expect_name()?;
                self.pos += 1;
                let value_expr = self.expr()?;
                let value = literal_value(&value_expr).ok_or_else(|| {
                    TemplateError::syntax(
                        self.file,
                        value_expr.line,
                        format!("argument '{}' of {}() must be a literal", key, name),
                    )
                })?;
                if kwargs.iter().any(|(k, _)| *k == key) {
                    return Err(self.error(format!("duplicate argument '{}' in {}()", key, name)));
                }
                kwargs.push((key, value));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error(format!("positional argument after keyword argument in {}()", name)));
                }
                positional.push(self.expr()?);
            }
            if self.peek() == Some(&Tok::Comma) {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.expect(Tok::RParen)?;

        if positional.len() != 1 {
            return Err(TemplateError::syntax(
                self.file,
                line,
                format!("{}() takes exactly one file argument, got {}", name, positional.len()),
            ));
        }
        let file = Box::new(positional.remove(0));

        match name {
            "template" => Ok(Call::Template { file, args: kwargs }),
            _ if !kwargs.is_empty() => Err(TemplateError::syntax(
                self.file,
                line,
                format!("{}() does not take keyword arguments", name),
            )),
            "reference" => Ok(Call::Reference(file)),
            _ => Ok(Call::Include(file)),
        }
    }
}

/// The value of a literal expression (a scalar or a list of literals).
fn literal_value(expr: &Expr) -> Option<Value> {
    match &expr.kind {
        ExprKind::Literal(v) => Some(v.clone()),
        ExprKind::List(items) => items.iter().map(literal_value).collect::<Option<Vec<_>>>().map(Value::Array),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse_ok(src: &str) -> Vec<Node> {
        parse(src, Path::new("t.md")).unwrap()
    }

    fn parse_err(src: &str) -> String {
        match parse(src, Path::new("t.md")) {
            Err(e @ TemplateError::Syntax { .. }) => e.to_string(),
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_template_call_with_literal_kwargs() {
        let nodes = parse_ok("{{ template('B.md', x='1', n=2, flags=[true, none]) }}");
        let Node::Output(Expr {
            kind: ExprKind::Call(Call::Template { file, args }),
            ..
        }) = &nodes[0]
        else {
            panic!("expected template call, got {:?}", nodes);
        };
        assert_eq!(file.kind, ExprKind::Literal(json!("B.md")));
        assert_eq!(
            args,
            &vec![
                ("x".to_string(), json!("1")),
                ("n".to_string(), json!(2)),
                ("flags".to_string(), json!([true, null])),
            ]
        );
    }

    #[test]
    fn test_template_kwarg_must_be_literal() {
        let msg = parse_err("{{ template('B.md', x=caller_var) }}");
        assert!(msg.contains("argument 'x' of template() must be a literal"));
    }

    #[test]
    fn test_duplicate_kwarg() {
        let msg = parse_err("{{ template('B.md', x=1, x=2) }}");
        assert!(msg.contains("duplicate argument 'x'"));
    }

    #[test]
    fn test_include_rejects_kwargs() {
        let msg = parse_err("{{ include('a.md', x=1) }}");
        assert!(msg.contains("include() does not take keyword arguments"));
    }

    #[test]
    fn test_reference_requires_one_argument() {
        let msg = parse_err("{{ reference() }}");
        assert!(msg.contains("reference() takes exactly one file argument, got 0"));
    }

    #[test]
    fn test_unknown_function() {
        let msg = parse_err("{{ open('x') }}");
        assert!(msg.contains("unknown function 'open'"));
    }

    #[test]
    fn test_if_elif_else() {
        let nodes = parse_ok("{% if a %}A{% elif b %}B{% else %}C{% endif %}");
        let Node::If { branches, otherwise } = &nodes[0] else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[1].1, vec![Node::Text("B".to_string())]);
        assert_eq!(otherwise, &vec![Node::Text("C".to_string())]);
    }

    #[test]
    fn test_for_pair_with_else() {
        let nodes = parse_ok("{% for k, v in items %}{{ k }}{% else %}none{% endfor %}");
        let Node::For { target, otherwise, .. } = &nodes[0] else {
            panic!("expected for");
        };
        assert_eq!(target, &Target::Pair("k".to_string(), "v".to_string()));
        assert_eq!(otherwise, &vec![Node::Text("none".to_string())]);
    }

    #[test]
    fn test_precedence() {
        let nodes = parse_ok("{{ not a and b or c == 1 }}");
        let Node::Output(expr) = &nodes[0] else { panic!() };
        let ExprKind::Or(lhs, rhs) = &expr.kind else {
            panic!("expected or at the top, got {:?}", expr.kind);
        };
        assert!(matches!(lhs.kind, ExprKind::And(..)));
        assert!(matches!(rhs.kind, ExprKind::Compare(CmpOp::Eq, ..)));
    }

    #[test]
    fn test_not_in_and_is_not_defined() {
        let nodes = parse_ok("{{ a not in b }}{{ x.y is not defined }}");
        let Node::Output(first) = &nodes[0] else { panic!() };
        assert!(matches!(first.kind, ExprKind::Compare(CmpOp::NotIn, ..)));
        let Node::Output(second) = &nodes[1] else { panic!() };
        assert!(matches!(second.kind, ExprKind::Defined(_, true)));
    }

    #[test]
    fn test_unclosed_if_reports_opening_line() {
        let err = parse("\n\n{% if a %}never closed", Path::new("t.md")).unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { line: 3, .. }));
        assert!(err.to_string().contains("'{% endif %}'"));
    }

    #[test]
    fn test_stray_endfor() {
        let msg = parse_err("text {% endfor %}");
        assert!(msg.contains("unexpected '{% endfor %}'"));
    }

    #[test]
    fn test_unknown_block() {
        let msg = parse_err("{% set x = 1 %}");
        assert!(msg.contains("unknown block 'set'"));
    }
}
