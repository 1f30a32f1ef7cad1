use super::parser::{self, Call, Expr, ExprKind, Node, Target};
use super::value;
use crate::context::{RenderContext, RenderTrace};
use crate::error::{Result, TemplateError};
use crate::index::{FileEntry, FileIndex, PathSpec};
use crate::resolver;
use crate::source::Source;
use log::debug;
use serde_json::{Value, json};
use std::path::Path;

pub const DEFAULT_REFERENCE_MARKER: &str = "@";

/// Renders template files against a fixed index and source.
pub struct TemplateEngine<'a> {
    index: &'a FileIndex,
    source: &'a dyn Source,
    reference_marker: String,
}

impl<'a> TemplateEngine<'a> {
    pub fn new(index: &'a FileIndex, source: &'a dyn Source) -> Self {
        Self {
            index,
            source,
            reference_marker: DEFAULT_REFERENCE_MARKER.to_string(),
        }
    }

    pub fn with_reference_marker(mut self, marker: impl Into<String>) -> Self {
        self.reference_marker = marker.into();
        self
    }

    /// Render `entry` with `context`.
    ///
    /// `trace` holds the files already being rendered above this one; a file
    /// that is already on it fails with `CyclicReference`. The trace is left
    /// as it was on return, success or not.
    pub fn render(&self, entry: &FileEntry, context: &RenderContext, trace: &mut RenderTrace) -> Result<String> {
        trace.enter(entry.path())?;
        debug!("Rendering {} (depth {})", entry.path().display(), trace.depth());
        let result = self.render_file(entry.path(), context, trace);
        trace.exit();
        result
    }

    fn render_file(&self, path: &Path, context: &RenderContext, trace: &mut RenderTrace) -> Result<String> {
        let Some(text) = self.source.read(path)? else {
            debug!("No content for {}, rendering as empty", path.display());
            return Ok(String::new());
        };
        let nodes = parser::parse(strip_trailing_newline(&text), path)?;

        let mut out = String::new();
        let mut renderer = Renderer {
            engine: self,
            file: path,
            trace,
        };
        renderer.nodes(&nodes, context, &mut out)?;
        Ok(out)
    }
}

/// One trailing line break is dropped so nested templates splice inline.
fn strip_trailing_newline(text: &str) -> &str {
    match text.strip_suffix('\n') {
        Some(rest) => rest.strip_suffix('\r').unwrap_or(rest),
        None => text,
    }
}

/// Evaluation state for a single file.
struct Renderer<'r, 'a> {
    engine: &'r TemplateEngine<'a>,
    file: &'r Path,
    trace: &'r mut RenderTrace,
}

impl<'a> Renderer<'_, 'a> {
    fn nodes(&mut self, nodes: &[Node], ctx: &RenderContext, out: &mut String) -> Result<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Output(expr) => {
                    let v = self.eval(expr, ctx)?;
                    out.push_str(&value::to_text(&v));
                }
                Node::If { branches, otherwise } => {
                    let mut taken = false;
                    for (cond, body) in branches {
                        if value::is_truthy(&self.eval(cond, ctx)?) {
                            self.nodes(body, ctx, out)?;
                            taken = true;
                            break;
                        }
                    }
                    if !taken {
                        self.nodes(otherwise, ctx, out)?;
                    }
                }
                Node::For {
                    target,
                    iter,
                    body,
                    otherwise,
                } => {
                    let items = self.eval(iter, ctx)?;
                    let bindings = self.loop_bindings(target, items, iter.line)?;
                    if bindings.is_empty() {
                        self.nodes(otherwise, ctx, out)?;
                    }
                    let length = bindings.len();
                    for (i, vars) in bindings.into_iter().enumerate() {
                        let mut scope = ctx.with(
                            "loop",
                            json!({
                                "index": i + 1,
                                "index0": i,
                                "first": i == 0,
                                "last": i + 1 == length,
                                "length": length,
                            }),
                        );
                        for (name, v) in vars {
                            scope = scope.with(name, v);
                        }
                        self.nodes(body, &scope, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// The variables bound by each iteration of a `for` loop.
    fn loop_bindings(&self, target: &Target, items: Value, line: usize) -> Result<Vec<Vec<(String, Value)>>> {
        let type_error = |message: String| TemplateError::type_error(self.file, line, message);
        match (target, items) {
            (Target::Single(name), Value::Array(items)) => {
                Ok(items.into_iter().map(|v| vec![(name.clone(), v)]).collect())
            }
            (Target::Single(name), Value::Object(map)) => Ok(map
                .into_iter()
                .map(|(k, _)| vec![(name.clone(), Value::String(k))])
                .collect()),
            (Target::Pair(k, v), Value::Object(map)) => Ok(map
                .into_iter()
                .map(|(key, val)| vec![(k.clone(), Value::String(key)), (v.clone(), val)])
                .collect()),
            (Target::Pair(k, v), Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::Array(pair) if pair.len() == 2 => {
                        let mut pair = pair.into_iter();
                        let first = pair.next().unwrap_or(Value::Null);
                        let second = pair.next().unwrap_or(Value::Null);
                        Ok(vec![(k.clone(), first), (v.clone(), second)])
                    }
                    other => Err(type_error(format!(
                        "cannot unpack {} into '{}, {}'",
                        value::type_name(&other),
                        k,
                        v
                    ))),
                })
                .collect(),
            (_, other) => Err(type_error(format!("cannot iterate over {}", value::type_name(&other)))),
        }
    }

    fn eval(&mut self, expr: &Expr, ctx: &RenderContext) -> Result<Value> {
        match &expr.kind {
            ExprKind::Literal(v) => Ok(v.clone()),
            ExprKind::List(items) => items
                .iter()
                .map(|item| self.eval(item, ctx))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            ExprKind::Var(name) => ctx
                .get(name)
                .cloned()
                .ok_or_else(|| TemplateError::undefined(self.file, expr.line, name)),
            ExprKind::Attr(base, name) => match self.eval(base, ctx)? {
                Value::Object(mut map) => map
                    .remove(name)
                    .ok_or_else(|| TemplateError::undefined(self.file, expr.line, describe(expr))),
                Value::Array(mut items) => match name.parse::<usize>() {
                    Ok(i) if i < items.len() => Ok(items.swap_remove(i)),
                    _ => Err(TemplateError::undefined(self.file, expr.line, describe(expr))),
                },
                other => Err(TemplateError::type_error(
                    self.file,
                    expr.line,
                    format!("cannot read attribute '{}' of {}", name, value::type_name(&other)),
                )),
            },
            ExprKind::Index(base, index) => {
                let base_value = self.eval(base, ctx)?;
                let index_value = self.eval(index, ctx)?;
                self.index(expr, base_value, index_value)
            }
            ExprKind::Not(inner) => Ok(Value::Bool(!value::is_truthy(&self.eval(inner, ctx)?))),
            // `and`/`or` yield the operand that decided the result.
            ExprKind::And(lhs, rhs) => {
                let l = self.eval(lhs, ctx)?;
                if value::is_truthy(&l) {
                    self.eval(rhs, ctx)
                } else {
                    Ok(l)
                }
            }
            ExprKind::Or(lhs, rhs) => {
                let l = self.eval(lhs, ctx)?;
                if value::is_truthy(&l) {
                    Ok(l)
                } else {
                    self.eval(rhs, ctx)
                }
            }
            ExprKind::Compare(op, lhs, rhs) => {
                let l = self.eval(lhs, ctx)?;
                let r = self.eval(rhs, ctx)?;
                value::compare(*op, &l, &r)
                    .map(Value::Bool)
                    .map_err(|message| TemplateError::type_error(self.file, expr.line, message))
            }
            ExprKind::Defined(inner, negated) => match self.eval(inner, ctx) {
                Ok(_) => Ok(Value::Bool(!negated)),
                Err(TemplateError::UndefinedVariable { .. }) => Ok(Value::Bool(*negated)),
                Err(e) => Err(e),
            },
            ExprKind::Call(call) => self.call(call, ctx).map(Value::String),
        }
    }

    fn index(&self, expr: &Expr, base: Value, index: Value) -> Result<Value> {
        match (base, index) {
            (Value::Array(mut items), Value::Number(n)) => {
                let len = items.len() as i64;
                let i = n.as_i64().map(|i| if i < 0 { len + i } else { i });
                match i {
                    Some(i) if (0..len).contains(&i) => Ok(items.swap_remove(i as usize)),
                    _ => Err(TemplateError::undefined(self.file, expr.line, describe(expr))),
                }
            }
            (Value::Object(mut map), Value::String(key)) => map
                .remove(&key)
                .ok_or_else(|| TemplateError::undefined(self.file, expr.line, describe(expr))),
            (base, index) => Err(TemplateError::type_error(
                self.file,
                expr.line,
                format!("cannot index {} with {}", value::type_name(&base), value::type_name(&index)),
            )),
        }
    }

    fn call(&mut self, call: &Call, ctx: &RenderContext) -> Result<String> {
        match call {
            Call::Reference(file) => {
                let entry = self.resolve(file, ctx)?;
                Ok(format!("{}{}", self.engine.reference_marker, entry.path().display()))
            }
            Call::Include(file) => {
                let entry = self.resolve(file, ctx)?;
                Ok(self.engine.source.read(entry.path())?.unwrap_or_default())
            }
            Call::Template { file, args } => {
                let entry = self.resolve(file, ctx)?;
                let nested: RenderContext = args.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                self.engine.render(entry, &nested, self.trace)
            }
        }
    }

    /// Evaluate a file argument and resolve it against the index.
    fn resolve(&mut self, file: &Expr, ctx: &RenderContext) -> Result<&'a FileEntry> {
        let spec = match self.eval(file, ctx)? {
            Value::String(s) => PathSpec::parse(&s)
                .ok_or_else(|| TemplateError::type_error(self.file, file.line, "empty file name"))?,
            other => {
                return Err(TemplateError::type_error(
                    self.file,
                    file.line,
                    format!("file name must be a string, not {}", value::type_name(&other)),
                ));
            }
        };
        resolver::resolve(&spec, self.engine.index)
    }
}

/// Dotted name of a lookup expression, for undefined-variable messages.
fn describe(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Var(name) => name.clone(),
        ExprKind::Attr(base, name) => format!("{}.{}", describe(base), name),
        ExprKind::Index(base, index) => match &index.kind {
            ExprKind::Literal(v) => format!("{}[{}]", describe(base), v),
            _ => format!("{}[...]", describe(base)),
        },
        _ => "<expression>".to_string(),
    }
}
