//! The cluster-management tool, driven as a subprocess.
//!
//! Nothing here talks to a cluster API. Manifests are piped to `kubectl` on
//! stdin; its stdout is handed back verbatim and its stderr becomes the error
//! message when it exits unsuccessfully.

use std::{
	fmt,
	io::{self, Write},
	path::PathBuf,
	process::{Command, ExitStatus, Stdio},
	thread,
};

use thiserror::Error;
use tracing::{debug, instrument};

use crate::document::RELEASE_LABEL;

#[derive(Debug, Error)]
pub enum KubectlError {
	#[error("failed to execute `{program}`")]
	Spawn {
		program: String,
		#[source]
		source: io::Error,
	},

	#[error("communicating with `{program}`")]
	Io {
		program: String,
		#[source]
		source: io::Error,
	},

	#[error("`{command}` failed ({status}): {stderr}")]
	Failed {
		command: String,
		status: ExitStatus,
		stderr: String,
	},

	#[error("output of `{command}` is not valid UTF-8")]
	Utf8 {
		command: String,
		#[source]
		source: std::string::FromUtf8Error,
	},
}

/// An equality label selector, `key=value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSelector {
	key: String,
	value: String,
}

impl LabelSelector {
	pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			key: key.into(),
			value: value.into(),
		}
	}
}

impl fmt::Display for LabelSelector {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}={}", self.key, self.value)
	}
}

/// Selector matching every resource of `release`.
pub fn release_selector(release: &str) -> LabelSelector {
	LabelSelector::new(RELEASE_LABEL, release)
}

/// Operations the release protocol needs from the cluster tool.
///
/// Each call blocks until the tool exits and returns its standard output.
pub trait ClusterTool {
	/// Apply a YAML stream, pruning resources matched by `selector` that are
	/// no longer part of it.
	fn apply(
		&self,
		manifests: &str,
		selector: &LabelSelector,
		namespace: &str,
	) -> Result<String, KubectlError>;

	/// Delete every resource matched by `selector`.
	fn delete(&self, selector: &LabelSelector, namespace: &str) -> Result<String, KubectlError>;

	/// All resources of the namespace, as one YAML `v1.List`.
	fn get_all(&self, namespace: &str) -> Result<String, KubectlError>;
}

/// [`ClusterTool`] backed by a `kubectl` executable.
#[derive(Debug, Clone)]
pub struct Kubectl {
	program: PathBuf,
}

impl Default for Kubectl {
	fn default() -> Self {
		Self::new("kubectl")
	}
}

impl Kubectl {
	pub fn new(program: impl Into<PathBuf>) -> Self {
		Self {
			program: program.into(),
		}
	}

	pub fn program(&self) -> &std::path::Path {
		&self.program
	}

	fn run(&self, args: &[String], input: Option<&str>) -> Result<String, KubectlError> {
		let program = self.program.display().to_string();
		let command = std::iter::once(program.as_str())
			.chain(args.iter().map(String::as_str))
			.collect::<Vec<_>>()
			.join(" ");
		debug!(%command, "running cluster tool");

		let mut child = Command::new(&self.program)
			.args(args)
			.stdin(if input.is_some() {
				Stdio::piped()
			} else {
				Stdio::null()
			})
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.spawn()
			.map_err(|source| KubectlError::Spawn {
				program: program.clone(),
				source,
			})?;

		// Feed stdin from its own thread so a tool that writes a lot before
		// reading cannot deadlock against us.
		let writer = match (input, child.stdin.take()) {
			(Some(input), Some(mut stdin)) => {
				let input = input.to_owned();
				Some(thread::spawn(move || stdin.write_all(input.as_bytes())))
			}
			_ => None,
		};

		let output = child
			.wait_with_output()
			.map_err(|source| KubectlError::Io {
				program: program.clone(),
				source,
			})?;

		if !output.status.success() {
			return Err(KubectlError::Failed {
				command,
				status: output.status,
				stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
			});
		}

		if let Some(writer) = writer {
			let written = writer
				.join()
				.unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked")));
			match written {
				Err(e) if e.kind() != io::ErrorKind::BrokenPipe => {
					return Err(KubectlError::Io { program, source: e });
				}
				_ => {}
			}
		}

		String::from_utf8(output.stdout).map_err(|source| KubectlError::Utf8 { command, source })
	}
}

fn apply_args(selector: &LabelSelector, namespace: &str) -> Vec<String> {
	vec![
		"apply".to_string(),
		"--prune".to_string(),
		"-f".to_string(),
		"-".to_string(),
		format!("--namespace={namespace}"),
		format!("--selector={selector}"),
	]
}

fn delete_args(selector: &LabelSelector, namespace: &str) -> Vec<String> {
	vec![
		"delete".to_string(),
		"all".to_string(),
		format!("--namespace={namespace}"),
		format!("--selector={selector}"),
	]
}

fn get_all_args(namespace: &str) -> Vec<String> {
	vec![
		"get".to_string(),
		"all".to_string(),
		format!("--namespace={namespace}"),
		"--output=yaml".to_string(),
	]
}

impl ClusterTool for Kubectl {
	#[instrument(skip(self, manifests, selector), fields(selector = %selector))]
	fn apply(
		&self,
		manifests: &str,
		selector: &LabelSelector,
		namespace: &str,
	) -> Result<String, KubectlError> {
		self.run(&apply_args(selector, namespace), Some(manifests))
	}

	#[instrument(skip(self, selector), fields(selector = %selector))]
	fn delete(&self, selector: &LabelSelector, namespace: &str) -> Result<String, KubectlError> {
		self.run(&delete_args(selector, namespace), None)
	}

	#[instrument(skip(self))]
	fn get_all(&self, namespace: &str) -> Result<String, KubectlError> {
		self.run(&get_all_args(namespace), None)
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;

	#[test]
	fn test_release_selector() {
		assert_eq!(release_selector("demo").to_string(), "kdeploy.io/release=demo");
	}

	#[test]
	fn test_apply_args() {
		assert_eq!(
			apply_args(&release_selector("demo"), "prod"),
			[
				"apply",
				"--prune",
				"-f",
				"-",
				"--namespace=prod",
				"--selector=kdeploy.io/release=demo"
			]
		);
	}

	#[test]
	fn test_delete_args() {
		assert_eq!(
			delete_args(&release_selector("demo"), "default"),
			[
				"delete",
				"all",
				"--namespace=default",
				"--selector=kdeploy.io/release=demo"
			]
		);
	}

	#[test]
	fn test_get_all_args() {
		assert_eq!(
			get_all_args("default"),
			["get", "all", "--namespace=default", "--output=yaml"]
		);
	}

	#[test]
	fn test_missing_program() {
		let kubectl = Kubectl::new("kdeploy-test-no-such-program");
		assert_matches!(
			kubectl.get_all("default"),
			Err(KubectlError::Spawn { program, .. }) if program == "kdeploy-test-no-such-program"
		);
	}

	#[cfg(unix)]
	#[test]
	fn test_failure_carries_stderr() {
		// `cat` rejects the kubectl flags and complains on stderr.
		let err = Kubectl::new("cat").get_all("default").unwrap_err();
		let KubectlError::Failed {
			command,
			status,
			stderr,
		} = &err
		else {
			panic!("expected a failure, got {err:?}");
		};
		assert_eq!(command, "cat get all --namespace=default --output=yaml");
		assert!(!status.success());
		assert!(!stderr.is_empty());
	}

	#[cfg(unix)]
	#[test]
	fn test_success_returns_stdout() {
		assert_eq!(Kubectl::new("true").get_all("default").unwrap(), "");
		assert_eq!(
			Kubectl::new("true")
				.apply("kind: Pod\n", &release_selector("demo"), "default")
				.unwrap(),
			""
		);
	}
}
