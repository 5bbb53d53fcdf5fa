//! Multi-document YAML stream helpers.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// Decode every document of a YAML stream, in order.
///
/// Empty documents (nothing but comments or whitespace between separators)
/// are skipped. Decoding stops at the end of the stream.
pub fn documents(input: &str) -> impl Iterator<Item = Result<Value, serde_yaml::Error>> + '_ {
	serde_yaml::Deserializer::from_str(input)
		.map(Value::deserialize)
		.filter(|document| !matches!(document, Ok(Value::Null)))
}

/// Serialize values as one YAML stream, each document introduced by `---`.
pub fn to_stream<'a, T, I>(documents: I) -> Result<String, serde_yaml::Error>
where
	T: Serialize + 'a,
	I: IntoIterator<Item = &'a T>,
{
	let mut output = String::new();
	for document in documents {
		output.push_str("---\n");
		output.push_str(&serde_yaml::to_string(document)?);
	}
	Ok(output)
}
