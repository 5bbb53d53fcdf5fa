//! Deployment units: a named set of templates plus default parameters, loaded
//! from one flat directory.

use std::{
	fs,
	path::{Path, PathBuf},
};

use rayon::prelude::*;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::{
	context::{Context, Parameters},
	template::{Manifest, Template, TemplateError},
};

/// File holding the unit's name and default parameters. Every other `*.yaml`
/// file in the unit directory is a template.
pub const ATTRIBUTES_FILE: &str = "unit.yaml";

#[derive(Debug, Error)]
pub enum LoadError {
	#[error("listing deployment unit at `{}`", .path.display())]
	Walk {
		path: PathBuf,
		#[source]
		source: walkdir::Error,
	},

	#[error("reading manifest template at `{}`", .path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("parsing deployment attributes file at `{}`", .path.display())]
	Attributes {
		path: PathBuf,
		#[source]
		source: serde_yaml_with_quirks::Error,
	},

	#[error("loading deployment unit at `{}`: no name was defined", .path.display())]
	NoName { path: PathBuf },

	#[error("resolving deployment unit path `{}`", .path.display())]
	Canonicalize {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error(
		"loading deployment unit at `{}`: another deployment unit with the name `{name}` was already loaded",
		.path.display()
	)]
	DuplicateName { path: PathBuf, name: String },
}

/// Contents of [`ATTRIBUTES_FILE`].
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct UnitAttributes {
	#[serde(default)]
	name: String,
	#[serde(default)]
	parameters: Option<Parameters>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentUnit {
	name: String,
	parameters: Parameters,
	templates: Vec<Template>,
	path: PathBuf,
}

impl DeploymentUnit {
	/// Build a unit in memory, without a backing directory.
	pub fn new(name: impl Into<String>, parameters: Parameters, templates: Vec<Template>) -> Self {
		Self {
			name: name.into(),
			parameters,
			templates,
			path: PathBuf::new(),
		}
	}

	/// Load a unit from the `*.yaml` files directly inside `path`.
	///
	/// Subdirectories are not descended into. Templates are ordered by file name.
	#[instrument(skip_all, fields(path = %path.display()))]
	pub fn load(path: &Path) -> Result<Self, LoadError> {
		let mut attributes = UnitAttributes::default();
		let mut templates = Vec::new();

		let entries = WalkDir::new(path)
			.min_depth(1)
			.max_depth(1)
			.follow_links(true)
			.sort_by_file_name();

		for entry in entries {
			let entry = entry.map_err(|source| LoadError::Walk {
				path: path.to_path_buf(),
				source,
			})?;
			if !entry.file_type().is_file() {
				continue;
			}
			let Some(file_name) = entry.file_name().to_str() else {
				continue;
			};
			if !file_name.ends_with(".yaml") {
				continue;
			}

			let data = fs::read_to_string(entry.path()).map_err(|source| LoadError::Read {
				path: entry.path().to_path_buf(),
				source,
			})?;

			if file_name == ATTRIBUTES_FILE {
				attributes = serde_yaml_with_quirks::from_str(&data).map_err(|source| {
					LoadError::Attributes {
						path: entry.path().to_path_buf(),
						source,
					}
				})?;
			} else {
				templates.push(Template::new(file_name, data));
			}
		}

		if attributes.name.is_empty() {
			return Err(LoadError::NoName {
				path: path.to_path_buf(),
			});
		}
		debug!(unit = %attributes.name, templates = templates.len(), "loaded deployment unit");

		Ok(Self {
			name: attributes.name,
			parameters: attributes.parameters.unwrap_or_default(),
			templates,
			path: path.to_path_buf(),
		})
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Default parameters of this unit.
	pub fn parameters(&self) -> &Parameters {
		&self.parameters
	}

	pub fn templates(&self) -> &[Template] {
		&self.templates
	}

	/// Directory the unit was loaded from; empty for in-memory units.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Render every template against a context already narrowed to this unit.
	///
	/// With `parallel` set, templates render on the rayon pool. Manifests are
	/// returned in template order either way, and the first failing template in
	/// that order is the one reported.
	pub fn render_manifests(
		&self,
		ctx: &Context,
		parallel: bool,
	) -> Result<Vec<Manifest>, TemplateError> {
		if parallel {
			let results: Vec<_> = self
				.templates
				.par_iter()
				.map(|template| template.render(ctx))
				.collect();
			results.into_iter().collect()
		} else {
			self.templates
				.iter()
				.map(|template| template.render(ctx))
				.collect()
		}
	}
}
