//! Install command handler.

use std::io::Write;

use anyhow::Result;
use clap::Args;

use super::util::DeploymentArgs;
use crate::{
	config::Settings,
	deployment::RenderOpts,
	kubectl::ClusterTool,
	names::WordPairGenerator,
	release,
};

#[derive(Args)]
pub struct InstallArgs {
	#[command(flatten)]
	pub deployment: DeploymentArgs,

	/// Print the output of the cluster tool
	#[arg(short, long)]
	pub verbose: bool,
}

/// Run the install command. Prints the name of the installed release.
pub fn run<W: Write>(
	args: InstallArgs,
	tool: &dyn ClusterTool,
	settings: Settings,
	mut writer: W,
) -> Result<()> {
	let settings = settings.with_overrides(None, args.deployment.namespace.clone());
	let deployment = args.deployment.load()?;
	let ctx = deployment.context(
		args.deployment.release(),
		settings.namespace(),
		&WordPairGenerator,
	)?;

	let output = release::install(
		tool,
		&deployment,
		&ctx,
		RenderOpts {
			parallel: settings.parallel(),
		},
	)?;

	writeln!(writer, "{}", ctx.release())?;
	if args.verbose {
		writer.write_all(output.as_bytes())?;
	}
	writer.flush()?;
	Ok(())
}
