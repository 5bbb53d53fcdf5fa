//! Configuration file support.
//!
//! A `.kdeploy.yaml` file may sit anywhere between the working directory and
//! the filesystem root; the closest one wins. Command-line flags override it.

use std::{
	fs,
	path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const CONFIG_FILE_NAME: &str = ".kdeploy.yaml";

/// Contents of `.kdeploy.yaml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Settings {
	/// Cluster tool executable, `kubectl` when unset.
	#[serde(default)]
	pub kubectl: Option<PathBuf>,

	/// Namespace used when `--namespace` is not given.
	#[serde(default)]
	pub namespace: Option<String>,

	/// Render the templates of each unit in parallel.
	#[serde(default)]
	pub parallel: Option<bool>,
}

impl Settings {
	/// Load settings by searching from `start_dir` upward. Missing file means
	/// default settings.
	pub fn discover(start_dir: &Path) -> Result<Self> {
		match find_config_file(start_dir) {
			Some(path) => {
				tracing::debug!(path = %path.display(), "using config file");
				Self::load_from_file(&path)
			}
			None => Ok(Self::default()),
		}
	}

	pub fn load_from_file(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path)
			.with_context(|| format!("failed to read config file: {}", path.display()))?;
		if content.trim().is_empty() {
			return Ok(Self::default());
		}
		serde_yaml_with_quirks::from_str(&content)
			.with_context(|| format!("failed to parse config file: {}", path.display()))
	}

	pub fn kubectl(&self) -> &Path {
		self.kubectl
			.as_deref()
			.unwrap_or_else(|| Path::new("kubectl"))
	}

	pub fn namespace(&self) -> &str {
		self.namespace.as_deref().unwrap_or_default()
	}

	pub fn parallel(&self) -> bool {
		self.parallel.unwrap_or(false)
	}

	/// Apply command-line overrides on top of the file settings.
	pub fn with_overrides(
		mut self,
		kubectl: Option<PathBuf>,
		namespace: Option<String>,
	) -> Self {
		if kubectl.is_some() {
			self.kubectl = kubectl;
		}
		if namespace.is_some() {
			self.namespace = namespace;
		}
		self
	}
}

/// Search for a config file starting from `start_dir` and walking up to the filesystem root.
pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
	let start = start_dir
		.canonicalize()
		.unwrap_or_else(|_| start_dir.to_path_buf());

	start
		.ancestors()
		.map(|dir| dir.join(CONFIG_FILE_NAME))
		.find(|candidate| candidate.is_file())
}
