//! Release protocol: install, uninstall and list releases through a
//! [`ClusterTool`].
//!
//! No state is kept locally. Which resources belong to which release is
//! recovered from the cluster on every call, through the release label.

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::{
	context::{namespace_or_default, validate_release, Context, ContextError},
	deployment::{Deployment, RenderError, RenderOpts},
	document::{Document, DocumentError},
	kubectl::{release_selector, ClusterTool, KubectlError},
	yaml,
};

#[derive(Debug, Error)]
pub enum ReleaseError {
	#[error("rendering release `{release}`")]
	Render {
		release: String,
		#[source]
		source: RenderError,
	},

	#[error("installing release `{release}`")]
	Install {
		release: String,
		#[source]
		source: KubectlError,
	},

	#[error("uninstalling release `{release}`")]
	Uninstall {
		release: String,
		#[source]
		source: KubectlError,
	},

	#[error("listing releases in namespace `{namespace}`")]
	List {
		namespace: String,
		#[source]
		source: KubectlError,
	},

	#[error(transparent)]
	Context(#[from] ContextError),

	#[error("failed to decode YAML output of kubectl")]
	Decode(#[source] serde_yaml::Error),

	#[error("failed to decode YAML output of kubectl: no document")]
	EmptyOutput,

	#[error("failed to decode YAML output of kubectl")]
	Document(#[source] DocumentError),
}

/// Output of the cluster tool for one uninstalled release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uninstalled {
	pub release: String,
	pub output: String,
}

/// Render `deployment` for `ctx` and apply it, pruning resources of the same
/// release that are no longer rendered. Returns the tool's output.
#[instrument(skip_all, fields(release = %ctx.release(), namespace = %ctx.namespace()))]
pub fn install(
	tool: &dyn ClusterTool,
	deployment: &Deployment,
	ctx: &Context,
	opts: RenderOpts,
) -> Result<String, ReleaseError> {
	let manifests = deployment
		.render(ctx, opts)
		.map_err(|source| ReleaseError::Render {
			release: ctx.release().to_string(),
			source,
		})?;

	let output = tool
		.apply(&manifests, &release_selector(ctx.release()), ctx.namespace())
		.map_err(|source| ReleaseError::Install {
			release: ctx.release().to_string(),
			source,
		})?;
	info!("installed release");
	Ok(output)
}

/// Delete every resource of each named release, one tool call per release.
///
/// Empty names are skipped: an empty selector value would match resources
/// that belong to no release at all.
#[instrument(skip_all, fields(namespace = namespace_or_default(namespace)))]
pub fn uninstall<S: AsRef<str>>(
	tool: &dyn ClusterTool,
	releases: &[S],
	namespace: &str,
) -> Result<Vec<Uninstalled>, ReleaseError> {
	let namespace = namespace_or_default(namespace);

	let mut uninstalled = Vec::new();
	for release in releases {
		let release = release.as_ref();
		if release.is_empty() {
			debug!("skipping empty release name");
			continue;
		}
		validate_release(release)?;

		let output = tool
			.delete(&release_selector(release), namespace)
			.map_err(|source| ReleaseError::Uninstall {
				release: release.to_string(),
				source,
			})?;
		info!(release, "uninstalled release");
		uninstalled.push(Uninstalled {
			release: release.to_string(),
			output,
		});
	}
	Ok(uninstalled)
}

/// Names of the releases with at least one resource in `namespace`.
#[instrument(skip(tool))]
pub fn list(tool: &dyn ClusterTool, namespace: &str) -> Result<BTreeSet<String>, ReleaseError> {
	let namespace = namespace_or_default(namespace);
	let output = tool
		.get_all(namespace)
		.map_err(|source| ReleaseError::List {
			namespace: namespace.to_string(),
			source,
		})?;

	let value = yaml::documents(&output)
		.next()
		.ok_or(ReleaseError::EmptyOutput)?
		.map_err(ReleaseError::Decode)?;
	let document = Document::from_value(value).map_err(ReleaseError::Document)?;

	let releases: BTreeSet<String> = document
		.as_flat_list()
		.into_iter()
		.filter_map(|resource| resource.release())
		.map(str::to_string)
		.collect();
	debug!(releases = releases.len(), "listed releases");
	Ok(releases)
}
