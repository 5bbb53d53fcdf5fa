//! Kubernetes document model.
//!
//! A [`Document`] is either a single [`Resource`] or a `v1.List` holding further
//! documents. Parsing validates the fields the rest of the pipeline relies on
//! and keeps the original mapping around, so fields this module knows nothing
//! about are written back out untouched.

use serde::{Serialize, Serializer};
use serde_yaml::{Mapping, Value};
use thiserror::Error;

use crate::context::Context;

/// Label marking the release a resource belongs to. Owned by kdeploy.
pub const RELEASE_LABEL: &str = "kdeploy.io/release";

/// Annotation carrying the parameters a resource was rendered with, for humans only.
pub const PARAMETERS_ANNOTATION: &str = "kdeploy.io/parameters";

#[derive(Debug, Error)]
pub enum DocumentError {
	#[error("document has no `{0}`")]
	MissingField(&'static str),

	#[error("document {0} has no `items`")]
	MissingItems(String),

	#[error("sub-document {index} of list document {list} is not a valid document")]
	InvalidItem { index: usize, list: String },

	#[error("in sub-document {index} of list document {list}")]
	Item {
		index: usize,
		list: String,
		#[source]
		source: Box<DocumentError>,
	},

	#[error("document {0} has no `metadata`")]
	MissingMetadata(String),

	#[error("document {0} has no `name`")]
	MissingName(String),

	#[error("document {0} `labels` has an unexpected format")]
	MalformedLabels(String),

	#[error("document {0} `annotations` has an unexpected format")]
	MalformedAnnotations(String),

	#[error(
		"document {doc_type} already has a `{label}` label with value `{value}` which is not allowed",
		label = RELEASE_LABEL
	)]
	ReservedLabel { doc_type: String, value: String },

	#[error(
		"document {doc_type} already has a `{annotation}` annotation with value `{value}` which is not allowed",
		annotation = PARAMETERS_ANNOTATION
	)]
	ReservedAnnotation { doc_type: String, value: String },

	#[error("serializing release parameters")]
	Parameters(#[source] serde_json::Error),
}

/// A parsed and validated Kubernetes document.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
	Resource(Resource),
	List(ResourceList),
}

/// A single, named Kubernetes object.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
	api_version: String,
	kind: String,
	name: String,
	labels: Mapping,
	annotations: Mapping,
	raw: Mapping,
}

/// A `v1.List` document.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceList {
	api_version: String,
	kind: String,
	items: Vec<Document>,
	raw: Mapping,
}

fn is_list(api_version: &str, kind: &str) -> bool {
	api_version == "v1" && kind == "List"
}

fn doc_type(api_version: &str, kind: &str) -> String {
	format!("{api_version}.{kind}")
}

fn get_str<'a>(mapping: &'a Mapping, key: &str) -> Option<&'a str> {
	mapping.get(key).and_then(Value::as_str)
}

/// Optional mapping field: absent means empty, anything but a mapping is an error.
fn optional_mapping(mapping: &Mapping, key: &str) -> Result<Mapping, ()> {
	match mapping.get(key) {
		None => Ok(Mapping::new()),
		Some(Value::Mapping(m)) => Ok(m.clone()),
		Some(_) => Err(()),
	}
}

/// Render a scalar for an error message.
fn display_value(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		other => serde_yaml::to_string(other)
			.map(|s| s.trim_end().to_string())
			.unwrap_or_else(|_| format!("{other:?}")),
	}
}

impl Document {
	/// Parse and validate a document from a YAML value.
	pub fn from_value(value: Value) -> Result<Self, DocumentError> {
		match value {
			Value::Mapping(raw) => Self::from_mapping(raw),
			_ => Err(DocumentError::MissingField("apiVersion")),
		}
	}

	fn from_mapping(raw: Mapping) -> Result<Self, DocumentError> {
		let api_version = get_str(&raw, "apiVersion")
			.ok_or(DocumentError::MissingField("apiVersion"))?
			.to_string();
		let kind = get_str(&raw, "kind")
			.ok_or(DocumentError::MissingField("kind"))?
			.to_string();

		if is_list(&api_version, &kind) {
			ResourceList::from_parts(api_version, kind, raw).map(Document::List)
		} else {
			Resource::from_parts(api_version, kind, raw).map(Document::Resource)
		}
	}

	pub fn api_version(&self) -> &str {
		match self {
			Document::Resource(r) => &r.api_version,
			Document::List(l) => &l.api_version,
		}
	}

	pub fn kind(&self) -> &str {
		match self {
			Document::Resource(r) => &r.kind,
			Document::List(l) => &l.kind,
		}
	}

	/// `<apiVersion>.<kind>`, used in diagnostics.
	pub fn doc_type(&self) -> String {
		doc_type(self.api_version(), self.kind())
	}

	pub fn is_list(&self) -> bool {
		matches!(self, Document::List(_))
	}

	/// All resources contained in this document, lists expanded recursively in
	/// item order.
	pub fn as_flat_list(&self) -> Vec<&Resource> {
		let mut out = Vec::new();
		self.collect_flat(&mut out);
		out
	}

	fn collect_flat<'a>(&'a self, out: &mut Vec<&'a Resource>) {
		match self {
			Document::Resource(r) => out.push(r),
			Document::List(l) => {
				for item in &l.items {
					item.collect_flat(out);
				}
			}
		}
	}

	/// Owned variant of [`Document::as_flat_list`].
	pub fn into_flat_list(self) -> Vec<Resource> {
		let mut out = Vec::new();
		self.collect_flat_owned(&mut out);
		out
	}

	fn collect_flat_owned(self, out: &mut Vec<Resource>) {
		match self {
			Document::Resource(r) => out.push(r),
			Document::List(l) => {
				for item in l.items {
					item.collect_flat_owned(out);
				}
			}
		}
	}

	/// Tag every resource in this document for the release described by `ctx`.
	///
	/// Lists are walked recursively; the list itself carries no metadata.
	pub fn prepare_for_release(&self, ctx: &Context) -> Result<Self, DocumentError> {
		match self {
			Document::Resource(r) => r.prepare_for_release(ctx).map(Document::Resource),
			Document::List(l) => {
				let items = l
					.items
					.iter()
					.map(|item| item.prepare_for_release(ctx))
					.collect::<Result<Vec<_>, _>>()?;
				Ok(Document::List(ResourceList {
					items,
					..l.clone()
				}))
			}
		}
	}

	/// The YAML value this document serializes to.
	pub fn to_value(&self) -> Value {
		match self {
			Document::Resource(r) => Value::Mapping(r.raw.clone()),
			Document::List(l) => l.to_value(),
		}
	}
}

impl TryFrom<Value> for Document {
	type Error = DocumentError;

	fn try_from(value: Value) -> Result<Self, Self::Error> {
		Document::from_value(value)
	}
}

impl Serialize for Document {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			Document::Resource(r) => r.serialize(serializer),
			Document::List(l) => l.to_value().serialize(serializer),
		}
	}
}

impl ResourceList {
	fn from_parts(api_version: String, kind: String, raw: Mapping) -> Result<Self, DocumentError> {
		let list = doc_type(&api_version, &kind);

		let Some(Value::Sequence(items)) = raw.get("items") else {
			return Err(DocumentError::MissingItems(list));
		};

		let items = items
			.iter()
			.enumerate()
			.map(|(index, item)| match item {
				Value::Mapping(m) => {
					Document::from_mapping(m.clone()).map_err(|e| DocumentError::Item {
						index,
						list: list.clone(),
						source: Box::new(e),
					})
				}
				_ => Err(DocumentError::InvalidItem {
					index,
					list: list.clone(),
				}),
			})
			.collect::<Result<Vec<_>, _>>()?;

		Ok(Self {
			api_version,
			kind,
			items,
			raw,
		})
	}

	fn to_value(&self) -> Value {
		let mut raw = self.raw.clone();
		raw.insert(
			Value::from("items"),
			Value::Sequence(self.items.iter().map(Document::to_value).collect()),
		);
		Value::Mapping(raw)
	}
}

impl Resource {
	fn from_parts(api_version: String, kind: String, raw: Mapping) -> Result<Self, DocumentError> {
		let ty = doc_type(&api_version, &kind);

		let Some(Value::Mapping(metadata)) = raw.get("metadata") else {
			return Err(DocumentError::MissingMetadata(ty));
		};
		let name = get_str(metadata, "name")
			.ok_or_else(|| DocumentError::MissingName(ty.clone()))?
			.to_string();
		let labels = optional_mapping(metadata, "labels")
			.map_err(|()| DocumentError::MalformedLabels(ty.clone()))?;
		let annotations = optional_mapping(metadata, "annotations")
			.map_err(|()| DocumentError::MalformedAnnotations(ty))?;

		Ok(Self {
			api_version,
			kind,
			name,
			labels,
			annotations,
			raw,
		})
	}

	pub fn api_version(&self) -> &str {
		&self.api_version
	}

	pub fn kind(&self) -> &str {
		&self.kind
	}

	pub fn doc_type(&self) -> String {
		doc_type(&self.api_version, &self.kind)
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn labels(&self) -> &Mapping {
		&self.labels
	}

	pub fn annotations(&self) -> &Mapping {
		&self.annotations
	}

	/// The release this resource belongs to, if it carries a non-empty release label.
	pub fn release(&self) -> Option<&str> {
		self.labels
			.get(RELEASE_LABEL)
			.and_then(Value::as_str)
			.filter(|release| !release.is_empty())
	}

	/// Return a copy of this resource tagged for the release described by `ctx`:
	/// name suffixed with `-<release>`, release label set and parameters
	/// annotation attached.
	pub fn prepare_for_release(&self, ctx: &Context) -> Result<Self, DocumentError> {
		if let Some(value) = self.labels.get(RELEASE_LABEL) {
			return Err(DocumentError::ReservedLabel {
				doc_type: self.doc_type(),
				value: display_value(value),
			});
		}
		if let Some(value) = self.annotations.get(PARAMETERS_ANNOTATION) {
			return Err(DocumentError::ReservedAnnotation {
				doc_type: self.doc_type(),
				value: display_value(value),
			});
		}

		let parameters =
			serde_json::to_string(ctx.parameters()).map_err(DocumentError::Parameters)?;

		let name = format!("{}{}", self.name, ctx.release_suffix());

		let mut labels = self.labels.clone();
		labels.insert(Value::from(RELEASE_LABEL), Value::from(ctx.release()));

		let mut annotations = self.annotations.clone();
		annotations.insert(Value::from(PARAMETERS_ANNOTATION), Value::from(parameters));

		let mut raw = self.raw.clone();
		// Validation guarantees `metadata` is a mapping.
		if let Some(Value::Mapping(metadata)) = raw.get_mut("metadata") {
			metadata.insert(Value::from("name"), Value::from(name.as_str()));
			metadata.insert(Value::from("labels"), Value::Mapping(labels.clone()));
			metadata.insert(
				Value::from("annotations"),
				Value::Mapping(annotations.clone()),
			);
		}

		Ok(Self {
			api_version: self.api_version.clone(),
			kind: self.kind.clone(),
			name,
			labels,
			annotations,
			raw,
		})
	}
}

impl Serialize for Resource {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		self.raw.serialize(serializer)
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use indoc::indoc;
	use rstest::rstest;
	use serde_json::json;

	use super::*;
	use crate::names::WordPairGenerator;

	fn parse(yaml: &str) -> Result<Document, DocumentError> {
		Document::from_value(serde_yaml::from_str(yaml).unwrap())
	}

	fn ctx() -> Context {
		let mut ctx = Context::new("demo", "", &WordPairGenerator).unwrap();
		ctx.parameters_mut()
			.insert("replicas".to_string(), json!(1));
		ctx
	}

	const CONFIGMAP: &str = indoc! {"
		apiVersion: v1
		kind: ConfigMap
		metadata:
		  name: settings
		  labels:
		    app: web
		data:
		  key: value
	"};

	#[test]
	fn test_parse_resource() {
		let doc = parse(CONFIGMAP).unwrap();
		let Document::Resource(r) = &doc else {
			panic!("expected a resource");
		};
		assert_eq!(r.api_version(), "v1");
		assert_eq!(r.kind(), "ConfigMap");
		assert_eq!(r.name(), "settings");
		assert_eq!(r.labels().get("app").and_then(Value::as_str), Some("web"));
		assert!(r.annotations().is_empty());
		assert_eq!(doc.doc_type(), "v1.ConfigMap");
		assert!(!doc.is_list());
	}

	#[test]
	fn test_parse_missing_labels_defaults_to_empty() {
		let doc = parse(indoc! {"
			apiVersion: v1
			kind: Service
			metadata:
			  name: web
		"})
		.unwrap();
		let [resource] = doc.as_flat_list()[..] else {
			panic!("expected one resource");
		};
		assert!(resource.labels().is_empty());
		assert!(resource.annotations().is_empty());
	}

	#[rstest]
	#[case::not_a_mapping("- a\n- b\n", "document has no `apiVersion`")]
	#[case::no_api_version("kind: Pod\n", "document has no `apiVersion`")]
	#[case::api_version_not_string("apiVersion: 1\nkind: Pod\n", "document has no `apiVersion`")]
	#[case::no_kind("apiVersion: v1\n", "document has no `kind`")]
	#[case::no_metadata("apiVersion: v1\nkind: Pod\n", "document v1.Pod has no `metadata`")]
	#[case::metadata_not_mapping(
		"apiVersion: v1\nkind: Pod\nmetadata: x\n",
		"document v1.Pod has no `metadata`"
	)]
	#[case::no_name("apiVersion: v1\nkind: Pod\nmetadata: {}\n", "document v1.Pod has no `name`")]
	#[case::labels_list(
		"apiVersion: v1\nkind: Pod\nmetadata:\n  name: p\n  labels: [a]\n",
		"document v1.Pod `labels` has an unexpected format"
	)]
	#[case::annotations_string(
		"apiVersion: v1\nkind: Pod\nmetadata:\n  name: p\n  annotations: a\n",
		"document v1.Pod `annotations` has an unexpected format"
	)]
	#[case::list_without_items("apiVersion: v1\nkind: List\n", "document v1.List has no `items`")]
	#[case::list_item_scalar(
		"apiVersion: v1\nkind: List\nitems: [3]\n",
		"sub-document 0 of list document v1.List is not a valid document"
	)]
	fn test_parse_errors(#[case] yaml: &str, #[case] expected: &str) {
		let err = parse(yaml).unwrap_err();
		assert_eq!(err.to_string(), expected);
	}

	#[test]
	fn test_invalid_child_invalidates_list() {
		let err = parse(indoc! {"
			apiVersion: v1
			kind: List
			items:
			  - apiVersion: v1
			    kind: Pod
			    metadata:
			      name: ok
			  - apiVersion: v1
			    kind: Pod
			    metadata: {}
		"})
		.unwrap_err();
		assert_matches!(
			&err,
			DocumentError::Item { index: 1, list, source }
				if list == "v1.List" && matches!(**source, DocumentError::MissingName(_))
		);
	}

	#[test]
	fn test_flatten_nested_lists_in_item_order() {
		let doc = parse(indoc! {"
			apiVersion: v1
			kind: List
			items:
			  - apiVersion: v1
			    kind: Pod
			    metadata: {name: a}
			  - apiVersion: v1
			    kind: List
			    items:
			      - apiVersion: v1
			        kind: Pod
			        metadata: {name: b}
			      - apiVersion: v1
			        kind: List
			        items: []
			      - apiVersion: v1
			        kind: Pod
			        metadata: {name: c}
			  - apiVersion: v1
			    kind: Pod
			    metadata: {name: d}
		"})
		.unwrap();

		assert!(doc.is_list());
		let names: Vec<_> = doc.as_flat_list().iter().map(|r| r.name()).collect();
		assert_eq!(names, ["a", "b", "c", "d"]);

		let owned: Vec<_> = doc
			.into_flat_list()
			.into_iter()
			.map(|r| r.name().to_string())
			.collect();
		assert_eq!(owned, ["a", "b", "c", "d"]);
	}

	#[test]
	fn test_flatten_resource_is_itself() {
		let doc = parse(CONFIGMAP).unwrap();
		let flat = doc.as_flat_list();
		assert_eq!(flat.len(), 1);
		assert_eq!(flat[0].name(), "settings");
	}

	#[test]
	fn test_unknown_fields_round_trip() {
		let doc = parse(CONFIGMAP).unwrap();
		let out: Value = serde_yaml::from_str(&serde_yaml::to_string(&doc).unwrap()).unwrap();
		let original: Value = serde_yaml::from_str(CONFIGMAP).unwrap();
		assert_eq!(out, original);
	}

	#[test]
	fn test_prepare_for_release() {
		let doc = parse(CONFIGMAP).unwrap();
		let prepared = doc.prepare_for_release(&ctx()).unwrap();
		let [resource] = prepared.as_flat_list()[..] else {
			panic!("expected one resource");
		};

		assert_eq!(resource.name(), "settings-demo");
		assert_eq!(resource.release(), Some("demo"));
		assert_eq!(
			resource
				.annotations()
				.get(PARAMETERS_ANNOTATION)
				.and_then(Value::as_str),
			Some(r#"{"replicas":1}"#)
		);

		let value = prepared.to_value();
		assert_eq!(value["metadata"]["name"].as_str(), Some("settings-demo"));
		assert_eq!(value["metadata"]["labels"]["app"].as_str(), Some("web"));
		assert_eq!(
			value["metadata"]["labels"][RELEASE_LABEL].as_str(),
			Some("demo")
		);
		assert_eq!(value["data"]["key"].as_str(), Some("value"));
	}

	#[test]
	fn test_prepare_for_release_leaves_original_untouched() {
		let doc = parse(CONFIGMAP).unwrap();
		let before = doc.clone();
		doc.prepare_for_release(&ctx()).unwrap();
		assert_eq!(doc, before);
	}

	#[test]
	fn test_prepare_for_release_adds_missing_labels_block() {
		let doc = parse(indoc! {"
			apiVersion: v1
			kind: Service
			metadata:
			  name: web
		"})
		.unwrap();
		let value = doc.prepare_for_release(&ctx()).unwrap().to_value();
		assert_eq!(
			value["metadata"]["labels"][RELEASE_LABEL].as_str(),
			Some("demo")
		);
	}

	#[test]
	fn test_prepare_for_release_recurses_into_lists() {
		let doc = parse(indoc! {"
			apiVersion: v1
			kind: List
			items:
			  - apiVersion: v1
			    kind: Pod
			    metadata: {name: a}
			  - apiVersion: v1
			    kind: Pod
			    metadata: {name: b}
		"})
		.unwrap();
		let prepared = doc.prepare_for_release(&ctx()).unwrap();
		let names: Vec<_> = prepared.as_flat_list().iter().map(|r| r.name()).collect();
		assert_eq!(names, ["a-demo", "b-demo"]);

		let value = prepared.to_value();
		assert_eq!(value["items"][1]["metadata"]["name"].as_str(), Some("b-demo"));
	}

	#[test]
	fn test_reserved_label_is_rejected() {
		let doc = parse(&format!(
			"apiVersion: v1\nkind: Pod\nmetadata:\n  name: p\n  labels:\n    {RELEASE_LABEL}: other\n"
		))
		.unwrap();
		let err = doc.prepare_for_release(&ctx()).unwrap_err();
		assert_matches!(
			&err,
			DocumentError::ReservedLabel { doc_type, value } if doc_type == "v1.Pod" && value == "other"
		);
	}

	#[test]
	fn test_reserved_annotation_is_rejected() {
		let doc = parse(&format!(
			"apiVersion: v1\nkind: Pod\nmetadata:\n  name: p\n  annotations:\n    {PARAMETERS_ANNOTATION}: '{{}}'\n"
		))
		.unwrap();
		assert_matches!(
			doc.prepare_for_release(&ctx()),
			Err(DocumentError::ReservedAnnotation { .. })
		);
	}

	#[rstest]
	#[case::labelled("labels: {\"kdeploy.io/release\": a}", Some("a"))]
	#[case::empty("labels: {\"kdeploy.io/release\": ''}", None)]
	#[case::unlabelled("labels: {app: web}", None)]
	#[case::not_a_string("labels: {\"kdeploy.io/release\": 3}", None)]
	fn test_release(#[case] labels: &str, #[case] expected: Option<&str>) {
		let doc = parse(&format!(
			"apiVersion: v1\nkind: Pod\nmetadata:\n  name: p\n  {labels}\n"
		))
		.unwrap();
		assert_eq!(doc.as_flat_list()[0].release(), expected);
	}
}
