//! Utilities for command handlers.

use std::{
	io::{self, ErrorKind, Write},
	path::PathBuf,
};

use anyhow::{Context, Result};
use clap::Args;

use crate::deployment::Deployment;

/// Arguments shared by the commands that load and render a deployment.
#[derive(Args, Debug, Clone, Default)]
pub struct DeploymentArgs {
	/// Deployment unit directories, the current directory when none are given
	pub paths: Vec<PathBuf>,

	/// Release name. A random one is generated when omitted
	#[arg(short, long)]
	pub release: Option<String>,

	/// Namespace to deploy to
	#[arg(short, long)]
	pub namespace: Option<String>,
}

impl DeploymentArgs {
	pub fn paths(&self) -> Vec<PathBuf> {
		if self.paths.is_empty() {
			vec![PathBuf::from(".")]
		} else {
			self.paths.clone()
		}
	}

	/// Release name, empty when one should be generated.
	pub fn release(&self) -> &str {
		self.release.as_deref().unwrap_or_default()
	}

	pub fn load(&self) -> Result<Deployment> {
		let paths = self.paths();
		Deployment::load(&paths).context("loading deployment")
	}
}

/// A writer wrapper that silently handles broken pipe errors.
///
/// A broken pipe (EPIPE) from the underlying writer is reported as a successful
/// write, so `kdeploy render | head` exits cleanly.
pub struct BrokenPipeGuard<W> {
	inner: W,
}

impl<W> BrokenPipeGuard<W> {
	pub fn new(inner: W) -> Self {
		Self { inner }
	}
}

impl<W: Write> Write for BrokenPipeGuard<W> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		match self.inner.write(buf) {
			Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(buf.len()),
			other => other,
		}
	}

	fn flush(&mut self) -> io::Result<()> {
		match self.inner.flush() {
			Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
			other => other,
		}
	}
}
