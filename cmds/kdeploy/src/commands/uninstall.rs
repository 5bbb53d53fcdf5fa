//! Uninstall command handler.

use std::io::Write;

use anyhow::Result;
use clap::Args;

use crate::{config::Settings, kubectl::ClusterTool, release};

#[derive(Args)]
pub struct UninstallArgs {
	/// Releases to uninstall
	#[arg(required = true)]
	pub releases: Vec<String>,

	/// Namespace the releases live in
	#[arg(short, long)]
	pub namespace: Option<String>,

	/// Print the output of the cluster tool
	#[arg(short, long)]
	pub verbose: bool,
}

/// Run the uninstall command.
pub fn run<W: Write>(
	args: UninstallArgs,
	tool: &dyn ClusterTool,
	settings: Settings,
	mut writer: W,
) -> Result<()> {
	let settings = settings.with_overrides(None, args.namespace);
	let uninstalled = release::uninstall(tool, args.releases.as_slice(), settings.namespace())?;

	if args.verbose {
		for entry in &uninstalled {
			writer.write_all(entry.output.as_bytes())?;
		}
	}
	writer.flush()?;
	Ok(())
}
