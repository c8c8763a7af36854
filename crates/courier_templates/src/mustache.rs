//! A small mustache engine over JSON values.
//!
//! Supports escaped `{{x}}` and unescaped `{{{x}}}` / `{{&x}}` variables,
//! dotted names, the implicit iterator `{{.}}`, sections, inverted sections
//! and comments. Partials render as nothing. Tags that sit alone on a line
//! take the whole line with them.
//!
//! Sections can be taken over by [`Helpers`], which receive the raw,
//! unexpanded text of the section body.

use std::borrow::Cow;

use serde_json::Value;

use crate::error::RenderError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Variable {
        name: String,
        escape: bool,
    },
    Section {
        name: String,
        inverted: bool,
        body: String,
        children: Vec<Node>,
    },
}

enum Token {
    Text(String),
    Variable {
        name: String,
        escape: bool,
    },
    Open {
        name: String,
        inverted: bool,
        body_start: usize,
        position: usize,
    },
    Close {
        name: String,
        body_end: usize,
        position: usize,
    },
}

/// Section expansions that replace the regular section semantics for
/// some names.
pub trait Helpers {
    /// Expands section `name` with its raw `body` text.
    ///
    /// Returns `None` when `name` is not a helper, in which case the section
    /// is rendered as usual.
    fn expand(
        &mut self,
        name: &str,
        body: &str,
        scope: &Scope<'_>,
    ) -> Option<Result<String, RenderError>>;

    /// Filters template text and variable output before it is written.
    ///
    /// Helper output is written as returned by [`Helpers::expand`] and does
    /// not pass through here.
    fn guard_text<'t>(&self, text: &'t str) -> Cow<'t, str> {
        Cow::Borrowed(text)
    }
}

/// Renders sections the regular way only.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHelpers;

impl Helpers for NoHelpers {
    fn expand(&mut self, _: &str, _: &str, _: &Scope<'_>) -> Option<Result<String, RenderError>> {
        None
    }
}

/// The stack of context values names are looked up in, innermost last.
#[derive(Debug, Clone)]
pub struct Scope<'a> {
    stack: Vec<&'a Value>,
}

impl<'a> Scope<'a> {
    /// A scope holding only `root`.
    pub fn new(root: &'a Value) -> Self {
        Self { stack: vec![root] }
    }

    /// Makes `value` the innermost context.
    pub fn push(&mut self, value: &'a Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) {
        self.stack.pop();
    }

    /// Resolves `name` against the innermost context that has its first
    /// segment.
    pub fn lookup(&self, name: &str) -> Option<&'a Value> {
        if name == "." {
            return self.stack.last().copied();
        }

        let mut segments = name.split('.');
        let first = segments.next()?;
        let mut value = self
            .stack
            .iter()
            .rev()
            .copied()
            .find_map(|context| context.as_object().and_then(|map| map.get(first)))?;
        for segment in segments {
            value = value.as_object()?.get(segment)?;
        }
        Some(value)
    }
}

/// A parsed template.
///
/// ## Example
///
/// ```rust
/// use courier_templates::mustache::Template;
/// use serde_json::json;
///
/// let template = Template::parse("{{#items}}<li>{{name}}</li>{{/items}}").unwrap();
/// let markup = template
///     .render(&json!({"items": [{"name": "Fish & chips"}, {"name": "Tea"}]}))
///     .unwrap();
///
/// assert_eq!(markup, "<li>Fish &amp; chips</li><li>Tea</li>");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    /// Parses `source`.
    pub fn parse(source: &str) -> Result<Self, RenderError> {
        let tokens = tokenize(source)?;
        Ok(Self {
            nodes: build(tokens, source)?,
        })
    }

    /// Renders against `context` without helpers.
    pub fn render(&self, context: &Value) -> Result<String, RenderError> {
        self.render_with(&mut Scope::new(context), &mut NoHelpers)
    }

    /// Renders against `scope`, letting `helpers` take over sections.
    pub fn render_with<H: Helpers>(
        &self,
        scope: &mut Scope<'_>,
        helpers: &mut H,
    ) -> Result<String, RenderError> {
        let mut out = String::new();
        render_nodes(&self.nodes, scope, helpers, &mut out)?;
        Ok(out)
    }
}

/// Parses and renders `source` in one go.
pub fn render_source<H: Helpers>(
    source: &str,
    scope: &mut Scope<'_>,
    helpers: &mut H,
) -> Result<String, RenderError> {
    Template::parse(source)?.render_with(scope, helpers)
}

/// Escapes text for HTML the way the browser templating library does.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '/' => escaped.push_str("&#x2F;"),
            '`' => escaped.push_str("&#x60;"),
            '=' => escaped.push_str("&#x3D;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn syntax(position: usize, message: impl Into<String>) -> RenderError {
    RenderError::Syntax {
        position,
        message: message.into(),
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, RenderError> {
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut cursor = 0;
    let mut last_tag_end = 0;

    while let Some(offset) = source[cursor..].find(OPEN) {
        let start = cursor + offset;
        text.push_str(&source[cursor..start]);

        let inner_start = start + OPEN.len();
        let (content, end, triple) = if source[inner_start..].starts_with('{') {
            let close = source[inner_start..]
                .find("}}}")
                .ok_or_else(|| syntax(start, "unclosed tag"))?;
            (
                &source[inner_start + 1..inner_start + close],
                inner_start + close + 3,
                true,
            )
        } else {
            let close = source[inner_start..]
                .find(CLOSE)
                .ok_or_else(|| syntax(start, "unclosed tag"))?;
            (
                &source[inner_start..inner_start + close],
                inner_start + close + CLOSE.len(),
                false,
            )
        };

        let sigil = if triple { None } else { content.chars().next() };
        let name = match sigil {
            Some('#' | '^' | '/' | '&' | '>' | '!' | '=') => content[1..].trim(),
            _ => content.trim(),
        };
        if name.is_empty() && sigil != Some('!') {
            return Err(syntax(start, "empty tag"));
        }

        let token = match sigil {
            _ if triple => Some(Token::Variable {
                name: name.to_string(),
                escape: false,
            }),
            Some('=') => return Err(syntax(start, "set delimiter tags are not supported")),
            Some('!') | Some('>') => None,
            Some('&') => Some(Token::Variable {
                name: name.to_string(),
                escape: false,
            }),
            Some('#') | Some('^') => Some(Token::Open {
                name: name.to_string(),
                inverted: sigil == Some('^'),
                body_start: end,
                position: start,
            }),
            Some('/') => Some(Token::Close {
                name: name.to_string(),
                body_end: start,
                position: start,
            }),
            _ => Some(Token::Variable {
                name: name.to_string(),
                escape: true,
            }),
        };

        let is_variable = matches!(token, Some(Token::Variable { .. }));
        cursor = end;
        if !is_variable {
            if let Some(next_line) = standalone(source, start, end, last_tag_end) {
                let indent = start - source[..start].rfind('\n').map_or(0, |nl| nl + 1);
                text.truncate(text.len() - indent);
                cursor = next_line;
            }
        }
        last_tag_end = cursor;

        if !text.is_empty() {
            tokens.push(Token::Text(std::mem::take(&mut text)));
        }
        tokens.extend(token);
    }

    text.push_str(&source[cursor..]);
    if !text.is_empty() {
        tokens.push(Token::Text(text));
    }
    Ok(tokens)
}

/// If the tag at `start..end` is the only thing on its line, returns where
/// the next line begins.
fn standalone(source: &str, start: usize, end: usize, last_tag_end: usize) -> Option<usize> {
    let line_start = source[..start].rfind('\n').map_or(0, |nl| nl + 1);
    if line_start < last_tag_end || !source[line_start..start].trim().is_empty() {
        return None;
    }

    let rest = &source[end..];
    let line_end = rest.find('\n').map_or(rest.len(), |nl| nl + 1);
    if rest[..line_end].trim().is_empty() {
        Some(end + line_end)
    } else {
        None
    }
}

struct Frame {
    name: String,
    inverted: bool,
    body_start: usize,
    position: usize,
    nodes: Vec<Node>,
}

fn current<'a>(stack: &'a mut [Frame], root: &'a mut Vec<Node>) -> &'a mut Vec<Node> {
    match stack.last_mut() {
        Some(frame) => &mut frame.nodes,
        None => root,
    }
}

fn build(tokens: Vec<Token>, source: &str) -> Result<Vec<Node>, RenderError> {
    let mut root = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    for token in tokens {
        match token {
            Token::Text(text) => current(&mut stack, &mut root).push(Node::Text(text)),
            Token::Variable { name, escape } => {
                current(&mut stack, &mut root).push(Node::Variable { name, escape })
            }
            Token::Open {
                name,
                inverted,
                body_start,
                position,
            } => stack.push(Frame {
                name,
                inverted,
                body_start,
                position,
                nodes: Vec::new(),
            }),
            Token::Close {
                name,
                body_end,
                position,
            } => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| syntax(position, format!("unopened section {:?}", name)))?;
                if frame.name != name {
                    return Err(syntax(
                        position,
                        format!("unclosed section {:?}, found {:?}", frame.name, name),
                    ));
                }
                current(&mut stack, &mut root).push(Node::Section {
                    name,
                    inverted: frame.inverted,
                    body: source[frame.body_start..body_end].to_string(),
                    children: frame.nodes,
                });
            }
        }
    }

    match stack.pop() {
        Some(frame) => Err(syntax(
            frame.position,
            format!("unclosed section {:?}", frame.name),
        )),
        None => Ok(root),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::Null | Value::Object(_) => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(display).collect::<Vec<_>>().join(","),
    }
}

fn render_nodes<'a, H: Helpers>(
    nodes: &[Node],
    scope: &mut Scope<'a>,
    helpers: &mut H,
    out: &mut String,
) -> Result<(), RenderError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(&helpers.guard_text(text)),
            Node::Variable { name, escape } => {
                if let Some(value) = scope.lookup(name) {
                    let mut text = display(value);
                    if *escape {
                        text = escape_html(&text);
                    }
                    out.push_str(&helpers.guard_text(&text));
                }
            }
            Node::Section {
                name,
                inverted: false,
                body,
                children,
            } => {
                if let Some(expanded) = helpers.expand(name, body, scope) {
                    out.push_str(&expanded?);
                    continue;
                }
                match scope.lookup(name) {
                    Some(Value::Array(items)) => {
                        for item in items {
                            scope.push(item);
                            let rendered = render_nodes(children, scope, helpers, out);
                            scope.pop();
                            rendered?;
                        }
                    }
                    Some(value) if is_truthy(value) => {
                        scope.push(value);
                        let rendered = render_nodes(children, scope, helpers, out);
                        scope.pop();
                        rendered?;
                    }
                    _ => {}
                }
            }
            Node::Section {
                name,
                inverted: true,
                children,
                ..
            } => {
                if !scope.lookup(name).is_some_and(is_truthy) {
                    render_nodes(children, scope, helpers, out)?;
                }
            }
        }
    }
    Ok(())
}
