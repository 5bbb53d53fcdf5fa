//! Render command handler.

use std::{fs, io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use super::util::DeploymentArgs;
use crate::{config::Settings, deployment::RenderOpts, names::WordPairGenerator};

#[derive(Args)]
pub struct RenderArgs {
	#[command(flatten)]
	pub deployment: DeploymentArgs,

	/// The file to write the deployment to. Specify `-` to write to the standard output
	#[arg(short = 'o', long, default_value = "-")]
	pub output_file: String,
}

/// Run the render command.
pub fn run<W: Write>(args: RenderArgs, settings: Settings, mut writer: W) -> Result<()> {
	let settings = settings.with_overrides(None, args.deployment.namespace.clone());
	let deployment = args.deployment.load()?;
	let ctx = deployment.context(
		args.deployment.release(),
		settings.namespace(),
		&WordPairGenerator,
	)?;

	let rendered = deployment
		.render(
			&ctx,
			RenderOpts {
				parallel: settings.parallel(),
			},
		)
		.context("failed to render deployment")?;

	if args.output_file == "-" {
		writer.write_all(rendered.as_bytes())?;
		writer.flush()?;
	} else {
		let path = PathBuf::from(&args.output_file);
		fs::write(&path, rendered)
			.with_context(|| format!("failed to write deployment to {}", path.display()))?;
	}
	Ok(())
}
