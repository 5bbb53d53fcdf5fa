//! Rendering context: release identity plus per-unit parameters.
//!
//! A deployment-wide [`Context`] holds one parameter object per deployment unit,
//! keyed by unit name. Before a unit's templates are rendered the context is
//! narrowed with [`Context::for_unit`], so a template only ever sees the
//! parameters of the unit it belongs to.

use std::{collections::HashMap, sync::LazyLock};

use regex::Regex;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Parameter mapping, either the whole tree (unit name -> unit parameters) or the
/// parameters of a single unit.
pub type Parameters = serde_json::Map<String, JsonValue>;

/// Namespace used when none is given.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Longest accepted release name. Leaves room for the `-<release>` suffix on
/// resource names, which are capped at 63 characters for most kinds.
pub const MAX_RELEASE_LEN: usize = 53;

static RELEASE_NAME: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("release name pattern is valid")
});

#[derive(Debug, Error)]
pub enum ContextError {
	#[error("unknown deployment unit `{0}`")]
	UnknownUnit(String),

	#[error("parameters of deployment unit `{0}` are not a mapping")]
	UnitParametersNotMapping(String),

	#[error(
		"invalid release name `{0}`: must be lowercase alphanumeric characters or `-`, \
		 start and end with an alphanumeric character, and be at most {max} characters long",
		max = MAX_RELEASE_LEN
	)]
	InvalidRelease(String),
}

/// Source of release names, used when a release is not named explicitly.
pub trait NameGenerator {
	fn generate(&self) -> String;
}

impl<F> NameGenerator for F
where
	F: Fn() -> String,
{
	fn generate(&self) -> String {
		self()
	}
}

/// A rendering context.
///
/// Templates address it as `.Release`, `.Namespace` and `.Parameters`.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
	release: String,
	namespace: String,
	parameters: Parameters,
}

impl Context {
	/// Create a context with an empty parameter mapping.
	///
	/// An empty `release` is replaced by a generated name, an empty `namespace`
	/// by [`DEFAULT_NAMESPACE`].
	pub fn new(
		release: &str,
		namespace: &str,
		names: &dyn NameGenerator,
	) -> Result<Self, ContextError> {
		let release = if release.is_empty() {
			let generated = names.generate();
			tracing::debug!(release = %generated, "generated release name");
			generated
		} else {
			release.to_string()
		};
		validate_release(&release)?;

		Ok(Self {
			release,
			namespace: namespace_or_default(namespace).to_string(),
			parameters: Parameters::new(),
		})
	}

	pub fn release(&self) -> &str {
		&self.release
	}

	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	pub fn parameters(&self) -> &Parameters {
		&self.parameters
	}

	pub fn parameters_mut(&mut self) -> &mut Parameters {
		&mut self.parameters
	}

	/// Narrow the context to the parameters of one deployment unit.
	///
	/// The returned context owns a copy of the unit's parameters; changing it
	/// leaves `self` untouched.
	pub fn for_unit(&self, unit: &str) -> Result<Self, ContextError> {
		let parameters = match self.parameters.get(unit) {
			Some(JsonValue::Object(parameters)) => parameters.clone(),
			Some(_) => return Err(ContextError::UnitParametersNotMapping(unit.to_string())),
			None => return Err(ContextError::UnknownUnit(unit.to_string())),
		};

		Ok(Self {
			release: self.release.clone(),
			namespace: self.namespace.clone(),
			parameters,
		})
	}

	/// Suffix appended to every resource name of this release.
	pub fn release_suffix(&self) -> String {
		format!("-{}", self.release)
	}

	/// Value handed to the template engine.
	///
	/// The root is an object, so a misspelled `.Release` fails the render. The
	/// parameters stay a map: a parameter that is not set renders as no value.
	pub fn to_template_value(&self) -> gtmpl::Value {
		let mut map = HashMap::new();
		map.insert(
			"Release".to_string(),
			gtmpl::Value::String(self.release.clone()),
		);
		map.insert(
			"Namespace".to_string(),
			gtmpl::Value::String(self.namespace.clone()),
		);
		map.insert(
			"Parameters".to_string(),
			json_to_gtmpl(&JsonValue::Object(self.parameters.clone())),
		);
		gtmpl::Value::Object(map)
	}
}

/// Check that `release` can be used as a release name.
pub fn validate_release(release: &str) -> Result<(), ContextError> {
	if release.len() > MAX_RELEASE_LEN || !RELEASE_NAME.is_match(release) {
		return Err(ContextError::InvalidRelease(release.to_string()));
	}
	Ok(())
}

/// `namespace`, or [`DEFAULT_NAMESPACE`] when empty.
pub fn namespace_or_default(namespace: &str) -> &str {
	if namespace.is_empty() {
		DEFAULT_NAMESPACE
	} else {
		namespace
	}
}

/// Convert a JSON value into the template engine's value model.
pub(crate) fn json_to_gtmpl(value: &JsonValue) -> gtmpl::Value {
	use gtmpl::Value;

	match value {
		JsonValue::Null => Value::Nil,
		JsonValue::Bool(b) => Value::Bool(*b),
		JsonValue::Number(n) => {
			if let Some(i) = n.as_i64() {
				Value::Number(i.into())
			} else if let Some(f) = n.as_f64() {
				Value::Number(f.into())
			} else {
				Value::Nil
			}
		}
		JsonValue::String(s) => Value::String(s.clone()),
		JsonValue::Array(arr) => Value::Array(arr.iter().map(json_to_gtmpl).collect()),
		JsonValue::Object(obj) => Value::Map(
			obj.iter()
				.map(|(k, v)| (k.clone(), json_to_gtmpl(v)))
				.collect(),
		),
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use rstest::rstest;
	use serde_json::json;

	use super::*;

	fn fixed(name: &'static str) -> impl Fn() -> String {
		move || name.to_string()
	}

	fn unreachable_generator() -> String {
		panic!("name generator must not be called")
	}

	#[test]
	fn test_new_context_keeps_explicit_values() {
		let ctx = Context::new("demo", "staging", &unreachable_generator).unwrap();
		assert_eq!(ctx.release(), "demo");
		assert_eq!(ctx.namespace(), "staging");
		assert!(ctx.parameters().is_empty());
	}

	#[test]
	fn test_new_context_defaults() {
		let ctx = Context::new("", "", &fixed("brave-otter")).unwrap();
		assert_eq!(ctx.release(), "brave-otter");
		assert_eq!(ctx.namespace(), DEFAULT_NAMESPACE);
	}

	#[rstest]
	#[case("Demo")]
	#[case("-demo")]
	#[case("demo-")]
	#[case("demo_1")]
	#[case("a.b")]
	fn test_new_context_rejects_invalid_release(#[case] release: &str) {
		assert_matches!(
			Context::new(release, "", &unreachable_generator),
			Err(ContextError::InvalidRelease(r)) if r == release
		);
	}

	#[test]
	fn test_new_context_rejects_long_release() {
		let release = "a".repeat(MAX_RELEASE_LEN + 1);
		assert_matches!(
			Context::new(&release, "", &unreachable_generator),
			Err(ContextError::InvalidRelease(_))
		);
	}

	#[test]
	fn test_for_unit_narrows_parameters() {
		let mut ctx = Context::new("demo", "", &unreachable_generator).unwrap();
		ctx.parameters_mut()
			.insert("web".to_string(), json!({"replicas": 1}));
		ctx.parameters_mut()
			.insert("db".to_string(), json!({"size": "10Gi"}));

		let mut web = ctx.for_unit("web").unwrap();
		assert_eq!(web.release(), "demo");
		assert_eq!(web.namespace(), DEFAULT_NAMESPACE);
		assert_eq!(JsonValue::Object(web.parameters().clone()), json!({"replicas": 1}));

		web.parameters_mut().insert("replicas".to_string(), json!(3));
		assert_eq!(ctx.parameters()["web"], json!({"replicas": 1}));
	}

	#[test]
	fn test_for_unit_unknown() {
		let ctx = Context::new("demo", "", &unreachable_generator).unwrap();
		assert_matches!(ctx.for_unit("web"), Err(ContextError::UnknownUnit(u)) if u == "web");
	}

	#[test]
	fn test_for_unit_not_a_mapping() {
		let mut ctx = Context::new("demo", "", &unreachable_generator).unwrap();
		ctx.parameters_mut().insert("web".to_string(), json!([1, 2]));
		assert_matches!(
			ctx.for_unit("web"),
			Err(ContextError::UnitParametersNotMapping(u)) if u == "web"
		);
	}

	#[test]
	fn test_release_suffix() {
		let ctx = Context::new("demo", "", &unreachable_generator).unwrap();
		assert_eq!(ctx.release_suffix(), "-demo");
	}

	#[test]
	fn test_template_value_shape() {
		let mut ctx = Context::new("demo", "prod", &unreachable_generator).unwrap();
		ctx.parameters_mut().insert("replicas".to_string(), json!(2));

		let gtmpl::Value::Object(map) = ctx.to_template_value() else {
			panic!("expected an object");
		};
		assert!(matches!(&map["Release"], gtmpl::Value::String(s) if s == "demo"));
		assert!(matches!(&map["Namespace"], gtmpl::Value::String(s) if s == "prod"));
		assert!(matches!(&map["Parameters"], gtmpl::Value::Map(p) if p.contains_key("replicas")));
	}
}
