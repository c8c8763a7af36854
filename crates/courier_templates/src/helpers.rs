//! The `str`, `pix` and `js` section helpers.
//!
//! All state they collect lives in one [`RenderPass`], created per render, so
//! concurrent renders never see each other's strings or scripts.
//!
//! String placeholders are only recognized where the pass emitted them.
//! Every other `{` written during a pass is prefixed with [`GUARD`], so text
//! from the context or the template can never line up into a placeholder.
//! [`substitute_strings`] drops the guards again.

use std::borrow::Cow;

use courier::StringRequest;
use serde_json::{Value, json};

use crate::error::RenderError;
use crate::images::ImageUrl;
use crate::mustache::{Helpers, Scope, Template, render_source};

const PLACEHOLDER_PREFIX: &str = "{{_s";
const PLACEHOLDER_SUFFIX: &str = "}}";

/// Marks the next character as literal text. A private use code point, so
/// it is guarded itself when it shows up in the input.
const GUARD: char = '\u{E000}';

/// Helper state of one render pass.
pub(crate) struct RenderPass<'r> {
    icon: &'r Template,
    images: &'r ImageUrl,
    icon_class: &'r str,
    /// Strings requested by `{{#str}}`, in placeholder order.
    pub(crate) strings: Vec<StringRequest>,
    /// Bodies of `{{#js}}`, in document order.
    pub(crate) scripts: Vec<String>,
}

impl<'r> RenderPass<'r> {
    pub(crate) fn new(icon: &'r Template, images: &'r ImageUrl, icon_class: &'r str) -> Self {
        Self {
            icon,
            images,
            icon_class,
            strings: Vec::new(),
            scripts: Vec::new(),
        }
    }

    /// `{{#str}}key, component, param{{/str}}`
    ///
    /// Only the param is expanded. A param starting with a single `{` is
    /// parsed as a JSON object. The string itself is resolved after the pass,
    /// so a placeholder is emitted in its place.
    fn string(&mut self, body: &str, scope: &Scope<'_>) -> Result<String, RenderError> {
        let (key, component, param) = arguments(body);
        let param = if param.is_empty() {
            None
        } else {
            let expanded = render_source(param, &mut scope.clone(), self)?;
            parse_param(substitute_strings(&expanded, &[]))?
        };

        let mut request = StringRequest::new(key, component);
        request.param = param;
        let index = self.strings.len();
        self.strings.push(request);
        Ok(placeholder(index))
    }

    /// `{{#pix}}key, component, alt text{{/pix}}`
    fn icon(&mut self, body: &str) -> Result<String, RenderError> {
        let (key, component, alt) = arguments(body);
        let context = json!({
            "src": self.images.url(key, component),
            "alt": alt,
            "class": self.icon_class,
        });
        let markup = self.icon.render(&context)?;
        Ok(guard(markup.trim()).into_owned())
    }

    /// `{{#js}}...{{/js}}` renders to nothing; the expanded body is kept for
    /// the script block.
    fn script(&mut self, body: &str, scope: &Scope<'_>) -> Result<String, RenderError> {
        let script = render_source(body, &mut scope.clone(), self)?;
        self.scripts.push(script);
        Ok(String::new())
    }
}

impl Helpers for RenderPass<'_> {
    fn expand(
        &mut self,
        name: &str,
        body: &str,
        scope: &Scope<'_>,
    ) -> Option<Result<String, RenderError>> {
        match name {
            "str" => Some(self.string(body, scope)),
            "pix" => Some(self.icon(body)),
            "js" => Some(self.script(body, scope)),
            _ => None,
        }
    }

    fn guard_text<'t>(&self, text: &'t str) -> Cow<'t, str> {
        guard(text)
    }
}

fn guard(text: &str) -> Cow<'_, str> {
    if !text.contains(['{', GUARD]) {
        return Cow::Borrowed(text);
    }
    let mut guarded = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if c == '{' || c == GUARD {
            guarded.push(GUARD);
        }
        guarded.push(c);
    }
    Cow::Owned(guarded)
}

/// Splits `key, component, rest` where the rest may contain commas.
fn arguments(body: &str) -> (&str, &str, &str) {
    let mut parts = body.splitn(3, ',');
    let key = parts.next().unwrap_or_default().trim();
    let component = parts.next().unwrap_or_default().trim();
    let rest = parts.next().unwrap_or_default().trim();
    (key, component, rest)
}

fn parse_param(text: String) -> Result<Option<Value>, RenderError> {
    if text.is_empty() {
        return Ok(None);
    }
    if text.starts_with('{') && !text.starts_with("{{") {
        return serde_json::from_str(&text)
            .map(Some)
            .map_err(|err| RenderError::StringArgument {
                param: text.clone(),
                reason: err.to_string(),
            });
    }
    Ok(Some(Value::String(text)))
}

fn placeholder(index: usize) -> String {
    format!("{}{}{}", PLACEHOLDER_PREFIX, index, PLACEHOLDER_SUFFIX)
}

/// Replaces each `{{_s<N>}}` emitted by a pass with `strings[N]` and drops
/// the guards.
///
/// A single left to right scan: every index is substituted at its first
/// occurrence only, and substituted text is never scanned again.
pub(crate) fn substitute_strings(text: &str, strings: &[String]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut used = vec![false; strings.len()];
    let mut rest = text;

    while let Some(start) = rest.find(['{', GUARD]) {
        out.push_str(&rest[..start]);
        let after = &rest[start..];

        if let Some(guarded) = after.strip_prefix(GUARD) {
            let mut chars = guarded.chars();
            out.extend(chars.next());
            rest = chars.as_str();
            continue;
        }

        match placeholder_at(after, strings.len()) {
            Some((index, len)) if !used[index] => {
                used[index] = true;
                out.push_str(&strings[index]);
                rest = &after[len..];
            }
            _ => {
                out.push('{');
                rest = &after[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// The index and length of a canonical placeholder at the start of `text`.
fn placeholder_at(text: &str, count: usize) -> Option<(usize, usize)> {
    let after = text.strip_prefix(PLACEHOLDER_PREFIX)?;
    let digits = after.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 || (digits > 1 && after.starts_with('0')) {
        return None;
    }
    if !after[digits..].starts_with(PLACEHOLDER_SUFFIX) {
        return None;
    }
    let index = after[..digits].parse::<usize>().ok().filter(|&i| i < count)?;
    Some((
        index,
        PLACEHOLDER_PREFIX.len() + digits + PLACEHOLDER_SUFFIX.len(),
    ))
}
