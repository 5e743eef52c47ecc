//! Message template compilation and rendering using Handlebars.
//!
//! The operator-supplied template is compiled once at setup together with a fixed
//! table of helpers. Templates see the build under `Build` (camelCase fields)
//! and resolved bindings under `Params`:
//!
//! ```text
//! {"type": "section", "text": {"type": "mrkdwn", "text": "{{source_kind Build.source}}: {{repo_label Build.source}}"}}
//! ```
//!
//! Output is not escaped; the template is responsible for producing valid JSON
//! (the `json` helper encodes a value as a JSON literal).

use std::collections::BTreeSet;
use std::sync::LazyLock;

use handlebars::{
    no_escape, Context, Handlebars, Helper, HelperDef, RenderContext, RenderError,
    RenderErrorReason, ScopedJson,
};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::bindings::Bindings;
use crate::compose::with_utm_params;
use crate::environment::{deployment_info, is_production, DeploymentInfo};
use crate::error::SetupError;
use crate::events::{BuildEvent, Provenance, Substitutions};
use crate::extract::{
    git_ref_from_substitutions, provenance_kind, ref_label, repo_label, source_kind_label,
};

const MESSAGE_TEMPLATE: &str = "message";

/// Helpers Handlebars ships with.
const BUILTIN_HELPERS: &[&str] = &[
    "if", "unless", "each", "with", "lookup", "raw", "log", "eq", "ne", "gt", "gte", "lt",
    "lte", "and", "or", "not", "len",
];

/// Data a template renders against.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateView<'a> {
    pub build: &'a BuildEvent,
    pub params: &'a Bindings,
}

type HelperFn = fn(&[&Value]) -> Value;

/// A template helper: name, exact argument count, implementation.
struct HelperSpec {
    name: &'static str,
    arity: usize,
    call: HelperFn,
}

const HELPERS: &[HelperSpec] = &[
    HelperSpec { name: "replace", arity: 3, call: replace },
    HelperSpec { name: "contains", arity: 2, call: contains },
    HelperSpec { name: "json", arity: 1, call: json },
    HelperSpec { name: "provenance_kind", arity: 1, call: kind },
    HelperSpec { name: "repo_label", arity: 1, call: repo },
    HelperSpec { name: "ref_label", arity: 1, call: source_ref },
    HelperSpec { name: "source_kind", arity: 1, call: source_kind },
    HelperSpec { name: "git_ref", arity: 1, call: git_ref },
    HelperSpec { name: "deployment_info", arity: 1, call: deployment },
    HelperSpec { name: "is_production", arity: 1, call: production },
    HelperSpec { name: "with_utm", arity: 1, call: utm },
];

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn provenance(value: &Value) -> Option<Provenance> {
    serde_json::from_value(value.clone()).ok()
}

fn substitutions(value: &Value) -> Substitutions {
    serde_json::from_value(value.clone()).unwrap_or_default()
}

fn replace(args: &[&Value]) -> Value {
    Value::String(text(args[0]).replace(&text(args[1]), &text(args[2])))
}

fn contains(args: &[&Value]) -> Value {
    Value::Bool(text(args[0]).contains(&text(args[1])))
}

fn json(args: &[&Value]) -> Value {
    Value::String(args[0].to_string())
}

fn kind(args: &[&Value]) -> Value {
    Value::from(provenance_kind(provenance(args[0]).as_ref()))
}

fn repo(args: &[&Value]) -> Value {
    Value::String(repo_label(provenance(args[0]).as_ref()))
}

fn source_ref(args: &[&Value]) -> Value {
    Value::String(ref_label(provenance(args[0]).as_ref()))
}

fn source_kind(args: &[&Value]) -> Value {
    Value::from(source_kind_label(provenance(args[0]).as_ref()))
}

fn git_ref(args: &[&Value]) -> Value {
    Value::String(git_ref_from_substitutions(&substitutions(args[0])))
}

fn deployment(args: &[&Value]) -> Value {
    serde_json::to_value(deployment_info(&substitutions(args[0]))).unwrap_or(Value::Null)
}

fn production(args: &[&Value]) -> Value {
    let info: DeploymentInfo = serde_json::from_value(args[0].clone()).unwrap_or_default();
    Value::Bool(is_production(&info))
}

fn utm(args: &[&Value]) -> Value {
    let url = text(args[0]);
    Value::String(with_utm_params(&url).unwrap_or(url))
}

/// Handlebars adapter for one entry of [`HELPERS`].
struct TableHelper(&'static HelperSpec);

impl HelperDef for TableHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let args: Vec<&Value> = h.params().iter().map(|param| param.value()).collect();
        let spec = self.0;
        if args.len() != spec.arity {
            return Err(RenderErrorReason::Other(format!(
                "helper {:?} takes {} argument(s), got {}",
                spec.name,
                spec.arity,
                args.len()
            ))
            .into());
        }
        Ok(ScopedJson::Derived((spec.call)(&args)))
    }
}

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{\{?~?(.*?)~?\}?\}\}").expect("valid tag regex"));
static STRING_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'"#).expect("valid string regex")
});
static SUBEXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*([A-Za-z_][\w-]*)").expect("valid subexpression regex"));
static RAW_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{\{\{\{~?\s*([A-Za-z_][\w-]*)[^}]*\}\}\}\}.*?\{\{\{\{/\s*[A-Za-z_][\w-]*\s*~?\}\}\}\}")
        .expect("valid raw block regex")
});
static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][\w-]*$").expect("valid identifier regex"));

/// Names the template invokes as helpers: block openers, calls with arguments,
/// and subexpressions. Bare `{{path}}` lookups are not helper calls, and the
/// body of a `{{{{raw}}}}` block is literal text.
fn referenced_helpers(source: &str) -> BTreeSet<String> {
    let mut found: BTreeSet<String> = RAW_BLOCK
        .captures_iter(source)
        .map(|block| block[1].to_string())
        .collect();
    let source = RAW_BLOCK.replace_all(source, "");

    for tag in TAG.captures_iter(&source) {
        let body = tag[1].trim();
        // comments, closers, partials, decorators
        if body.is_empty()
            || body.starts_with(['!', '/', '>'])
            || body.starts_with("#>")
            || body.starts_with("#*")
        {
            continue;
        }

        let (mut block, body) = match body.strip_prefix(['#', '^']) {
            Some(rest) => (true, rest.trim_start()),
            None => (false, body.strip_prefix('&').unwrap_or(body)),
        };
        let body = STRING_LITERAL.replace_all(body, "\"\"");

        for call in SUBEXPRESSION.captures_iter(&body) {
            found.insert(call[1].to_string());
        }

        let mut words = body.split_whitespace();
        let Some(mut head) = words.next() else {
            continue;
        };
        if head == "else" {
            match words.next() {
                Some(next) => {
                    head = next;
                    block = true;
                }
                None => continue,
            }
        }
        let has_args = words.next().is_some();
        if (block || has_args) && IDENTIFIER.is_match(head) {
            found.insert(head.to_string());
        }
    }

    found
}

/// Compiled message template with its helpers.
pub struct TemplateEngine {
    registry: Handlebars<'static>,
}

impl TemplateEngine {
    /// Compile `source` and check every helper it calls is registered.
    pub fn parse(source: &str) -> Result<Self, SetupError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        registry.register_escape_fn(no_escape);

        for spec in HELPERS {
            registry.register_helper(spec.name, Box::new(TableHelper(spec)));
        }

        registry.register_template_string(MESSAGE_TEMPLATE, source)?;

        for name in referenced_helpers(source) {
            let known = BUILTIN_HELPERS.contains(&name.as_str())
                || HELPERS.iter().any(|spec| spec.name == name);
            if !known {
                return Err(SetupError::UnknownHelper(name));
            }
        }

        debug!(helpers = HELPERS.len(), "Message template compiled");
        Ok(Self { registry })
    }

    /// Render the template for one event into a byte buffer.
    pub fn render(&self, view: &TemplateView<'_>) -> Result<Vec<u8>, RenderError> {
        let mut buf = Vec::new();
        self.registry
            .render_to_write(MESSAGE_TEMPLATE, view, &mut buf)?;
        Ok(buf)
    }
}
