//! Deployments: an ordered set of uniquely named deployment units.

use std::{collections::HashSet, path::Path};

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{
	context::{Context, ContextError, NameGenerator},
	template::{Manifest, TemplateError},
	unit::{DeploymentUnit, LoadError},
	yaml,
};

#[derive(Debug, Error)]
pub enum RenderError {
	#[error("rendering deployment unit `{unit}`")]
	Unit {
		unit: String,
		#[source]
		source: TemplateError,
	},

	#[error("preparing context for deployment unit `{unit}`")]
	Context {
		unit: String,
		#[source]
		source: ContextError,
	},

	#[error("serializing rendered documents")]
	Serialize(#[source] serde_yaml::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOpts {
	/// Render the templates of each unit on the rayon pool.
	pub parallel: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Deployment {
	units: Vec<DeploymentUnit>,
}

impl Deployment {
	/// Build a deployment from already loaded units, keeping their order.
	pub fn from_units(units: Vec<DeploymentUnit>) -> Result<Self, LoadError> {
		let mut deployment = Self::default();
		for unit in units {
			deployment.push(unit)?;
		}
		Ok(deployment)
	}

	/// Load one deployment unit per path, in argument order.
	///
	/// Paths resolving to the same directory are loaded once. Two units with the
	/// same name fail the whole load.
	#[instrument(skip_all)]
	pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, LoadError> {
		let mut seen = HashSet::new();
		let mut deployment = Self::default();

		for path in paths {
			let path = path.as_ref();
			let canonical = path.canonicalize().map_err(|source| LoadError::Canonicalize {
				path: path.to_path_buf(),
				source,
			})?;
			if !seen.insert(canonical.clone()) {
				debug!(path = %path.display(), "skipping already loaded path");
				continue;
			}
			deployment.push(DeploymentUnit::load(&canonical)?)?;
		}

		debug!(units = deployment.units.len(), "loaded deployment");
		Ok(deployment)
	}

	fn push(&mut self, unit: DeploymentUnit) -> Result<(), LoadError> {
		if self.units.iter().any(|u| u.name() == unit.name()) {
			return Err(LoadError::DuplicateName {
				path: unit.path().to_path_buf(),
				name: unit.name().to_string(),
			});
		}
		self.units.push(unit);
		Ok(())
	}

	pub fn units(&self) -> &[DeploymentUnit] {
		&self.units
	}

	/// Create the deployment-wide context: one parameter entry per unit, copied
	/// from the unit's defaults.
	pub fn context(
		&self,
		release: &str,
		namespace: &str,
		names: &dyn NameGenerator,
	) -> Result<Context, ContextError> {
		let mut ctx = Context::new(release, namespace, names)?;
		for unit in &self.units {
			ctx.parameters_mut().insert(
				unit.name().to_string(),
				JsonValue::Object(unit.parameters().clone()),
			);
		}
		Ok(ctx)
	}

	/// Render every unit with its narrowed context. Manifests come out in unit
	/// order, then template order.
	#[instrument(skip_all, fields(release = %ctx.release(), namespace = %ctx.namespace()))]
	pub fn render_manifests(
		&self,
		ctx: &Context,
		opts: RenderOpts,
	) -> Result<Vec<Manifest>, RenderError> {
		let mut manifests = Vec::new();
		for unit in &self.units {
			let unit_ctx = ctx
				.for_unit(unit.name())
				.map_err(|source| RenderError::Context {
					unit: unit.name().to_string(),
					source,
				})?;
			let rendered = unit
				.render_manifests(&unit_ctx, opts.parallel)
				.map_err(|source| RenderError::Unit {
					unit: unit.name().to_string(),
					source,
				})?;
			manifests.extend(rendered);
		}
		debug!(
			manifests = manifests.len(),
			documents = manifests.iter().map(|m| m.documents.len()).sum::<usize>(),
			"rendered deployment"
		);
		Ok(manifests)
	}

	/// Render the deployment as one multi-document YAML stream.
	pub fn render(&self, ctx: &Context, opts: RenderOpts) -> Result<String, RenderError> {
		let manifests = self.render_manifests(ctx, opts)?;
		yaml::to_stream(manifests.iter().flat_map(|m| m.documents.iter()))
			.map_err(RenderError::Serialize)
	}
}
