//! Manifest templates and their rendering.
//!
//! Templates use Go `text/template` syntax (via `gtmpl`) and are executed
//! against a unit-specialized [`Context`]. The output is decoded as a YAML
//! stream; every document is validated, tagged for the release and flattened
//! into the resulting [`Manifest`].

use std::collections::BTreeMap;

use gtmpl::{FuncError, Value};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{
	context::Context,
	document::{Document, DocumentError, Resource},
	yaml,
};

#[derive(Debug, Error)]
pub enum TemplateError {
	#[error("instantiating template from `{template}`: {message}")]
	Parse { template: String, message: String },

	#[error("rendering `{template}`: {message}")]
	Execute { template: String, message: String },

	#[error("decoding rendered output from `{template}`")]
	Decode {
		template: String,
		#[source]
		source: serde_yaml::Error,
	},

	#[error("checking rendered output from `{template}`")]
	Check {
		template: String,
		#[source]
		source: DocumentError,
	},
}

/// A named manifest template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
	name: String,
	data: String,
}

/// The documents produced by rendering one template, flattened and tagged.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
	pub name: String,
	pub documents: Vec<Resource>,
}

impl Template {
	pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			data: data.into(),
		}
	}

	/// File name the template was loaded from.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Render the template against `ctx`.
	///
	/// Rendering has no side effects: the same template and context always
	/// produce the same manifest.
	#[instrument(skip_all, fields(template = %self.name))]
	pub fn render(&self, ctx: &Context) -> Result<Manifest, TemplateError> {
		let mut tmpl = gtmpl::Template::default();
		tmpl.add_func("default", tmpl_default);
		tmpl.add_func("quote", tmpl_quote);
		tmpl.add_func("toJson", tmpl_to_json);
		tmpl.add_func("keys", tmpl_keys);
		tmpl.add_func(RANGE_GUARD, tmpl_range_guard);
		tmpl.parse(guard_ranges(&self.data))
			.map_err(|e| TemplateError::Parse {
				template: self.name.clone(),
				message: e.to_string(),
			})?;

		let rendered = tmpl
			.render(&gtmpl::Context::from(ctx.to_template_value()))
			.map_err(|e| TemplateError::Execute {
				template: self.name.clone(),
				message: e.to_string(),
			})?;

		let mut documents = Vec::new();
		for value in yaml::documents(&rendered) {
			let value = value.map_err(|source| TemplateError::Decode {
				template: self.name.clone(),
				source,
			})?;
			let document = Document::from_value(value)
				.and_then(|document| document.prepare_for_release(ctx))
				.map_err(|source| TemplateError::Check {
					template: self.name.clone(),
					source,
				})?;
			documents.extend(document.into_flat_list());
		}
		debug!(documents = documents.len(), "rendered template");

		Ok(Manifest {
			name: self.name.clone(),
			documents,
		})
	}
}

/// Function the pipeline of every `range` action is routed through.
const RANGE_GUARD: &str = "rangeGuard";

/// Rewrite every `range` action so its pipeline goes through [`RANGE_GUARD`]:
/// `{{ range $k, $v := .Parameters }}` becomes
/// `{{ range $k, $v := rangeGuard (.Parameters) }}`.
///
/// Mappings reach the engine as hash maps and `range` walks them in hash
/// order, which changes from one run to the next.
fn guard_ranges(source: &str) -> String {
	let mut out = String::with_capacity(source.len());
	let mut rest = source;
	while let Some(start) = rest.find("{{") {
		out.push_str(&rest[..start]);
		let action = &rest[start..];
		let Some(len) = action_len(action) else {
			// Unterminated, left for the parser to report.
			out.push_str(action);
			return out;
		};
		let (action, tail) = action.split_at(len);
		match guard_range_action(action) {
			Some(guarded) => out.push_str(&guarded),
			None => out.push_str(action),
		}
		rest = tail;
	}
	out.push_str(rest);
	out
}

/// Length of the opening delimiter, including a `-` trim marker.
fn open_len(action: &str) -> usize {
	let bytes = action.as_bytes();
	if bytes.get(2) == Some(&b'-') && bytes.get(3).is_some_and(u8::is_ascii_whitespace) {
		3
	} else {
		2
	}
}

/// Length of the action `action` starts with, delimiters included.
fn action_len(action: &str) -> Option<usize> {
	let open = open_len(action);
	let inner = &action[open..];
	let trimmed = inner.trim_start();
	if trimmed.starts_with("/*") {
		let body = open + (inner.len() - trimmed.len());
		let end = body + action[body..].find("*/")? + 2;
		return action[end..].find("}}").map(|i| end + i + 2);
	}
	find_unquoted(inner, "}}").map(|i| open + i + 2)
}

/// Position of `pattern` in `s`, skipping string and character literals.
fn find_unquoted(s: &str, pattern: &str) -> Option<usize> {
	let bytes = s.as_bytes();
	let mut quote = None;
	let mut i = 0;
	while i < bytes.len() {
		let b = bytes[i];
		match quote {
			Some(q) if b == b'\\' && q != b'`' => i += 1,
			Some(q) if b == q => quote = None,
			Some(_) => {}
			None if matches!(b, b'"' | b'\'' | b'`') => quote = Some(b),
			None if bytes[i..].starts_with(pattern.as_bytes()) => return Some(i),
			None => {}
		}
		i += 1;
	}
	None
}

fn guard_range_action(action: &str) -> Option<String> {
	let open = open_len(action);
	let bytes = action.as_bytes();
	let mut close = action.len() - 2;
	if close > open + 1 && bytes[close - 1] == b'-' && bytes[close - 2].is_ascii_whitespace() {
		close -= 1;
	}
	if close <= open {
		return None;
	}

	let after = action[open..close].trim_start().strip_prefix("range")?;
	if !after.starts_with(|c: char| c.is_ascii_whitespace()) {
		return None;
	}
	let keyword_end = close - after.len();
	let pipeline_start = find_unquoted(after, ":=").map_or(keyword_end, |i| keyword_end + i + 2);
	let pipeline = action[pipeline_start..close].trim();
	if pipeline.is_empty() {
		return None;
	}
	Some(format!(
		"{} {RANGE_GUARD} ({pipeline}) {}",
		&action[..pipeline_start],
		&action[close..]
	))
}

/// Passes arrays, and mappings with at most one key, on to `range`.
fn tmpl_range_guard(args: &[Value]) -> Result<Value, FuncError> {
	let [value] = args else {
		return Err(FuncError::ExactlyXArgs("range".to_string(), 1));
	};
	match value {
		Value::Map(map) | Value::Object(map) if map.len() > 1 => Err(FuncError::Generic(
			"range over a mapping has no stable order, range over `keys` of it instead"
				.to_string(),
		)),
		_ => Ok(value.clone()),
	}
}

/// `keys`: the keys of a mapping, sorted.
fn tmpl_keys(args: &[Value]) -> Result<Value, FuncError> {
	let map = match args {
		[Value::Map(map) | Value::Object(map)] => map,
		[Value::NoValue | Value::Nil] => return Ok(Value::Array(Vec::new())),
		[_] => return Err(FuncError::Generic("keys of a non-mapping value".to_string())),
		_ => return Err(FuncError::ExactlyXArgs("keys".to_string(), 1)),
	};
	let mut keys: Vec<&String> = map.keys().collect();
	keys.sort_unstable();
	Ok(Value::Array(
		keys.into_iter().cloned().map(Value::String).collect(),
	))
}

/// `default`: first non-empty argument.
///
/// Piped values arrive as the last argument, so
/// `{{ .Parameters.port | default 8080 }}` sees `[8080, .Parameters.port]`
/// and the arguments are checked back to front.
fn tmpl_default(args: &[Value]) -> Result<Value, FuncError> {
	Ok(args
		.iter()
		.rev()
		.find(|arg| !is_empty_value(arg))
		.or_else(|| args.first())
		.cloned()
		.unwrap_or(Value::NoValue))
}

fn is_empty_value(v: &Value) -> bool {
	match v {
		Value::NoValue | Value::Nil => true,
		Value::Bool(b) => !b,
		Value::String(s) => s.is_empty(),
		Value::Number(n) => n.as_f64().is_some_and(|f| f == 0.0),
		Value::Array(a) => a.is_empty(),
		Value::Map(m) => m.is_empty(),
		Value::Object(o) => o.is_empty(),
		_ => false,
	}
}

/// `quote`: each non-nil argument as a double-quoted string, space separated.
fn tmpl_quote(args: &[Value]) -> Result<Value, FuncError> {
	let quoted: Vec<String> = args
		.iter()
		.filter(|arg| !matches!(arg, Value::NoValue | Value::Nil))
		.map(|arg| {
			let text = match gtmpl_to_json(arg) {
				JsonValue::String(s) => s,
				other => other.to_string(),
			};
			JsonValue::String(text).to_string()
		})
		.collect();
	Ok(Value::String(quoted.join(" ")))
}

/// `toJson`: compact JSON with object keys sorted.
fn tmpl_to_json(args: &[Value]) -> Result<Value, FuncError> {
	let [value] = args else {
		return Err(FuncError::ExactlyXArgs("toJson".to_string(), 1));
	};
	Ok(Value::String(gtmpl_to_json(value).to_string()))
}

fn gtmpl_to_json(value: &Value) -> JsonValue {
	match value {
		Value::Bool(b) => JsonValue::Bool(*b),
		Value::String(s) => JsonValue::String(s.clone()),
		Value::Number(n) => match n.as_i64() {
			Some(i) => JsonValue::from(i),
			None => n
				.as_f64()
				.and_then(serde_json::Number::from_f64)
				.map_or(JsonValue::Null, JsonValue::Number),
		},
		Value::Array(items) => JsonValue::Array(items.iter().map(gtmpl_to_json).collect()),
		Value::Map(m) => object_to_json(m.iter()),
		Value::Object(o) => object_to_json(o.iter()),
		_ => JsonValue::Null,
	}
}

fn object_to_json<'a>(entries: impl Iterator<Item = (&'a String, &'a Value)>) -> JsonValue {
	let sorted: BTreeMap<&String, &Value> = entries.collect();
	JsonValue::Object(
		sorted
			.into_iter()
			.map(|(k, v)| (k.clone(), gtmpl_to_json(v)))
			.collect(),
	)
}
