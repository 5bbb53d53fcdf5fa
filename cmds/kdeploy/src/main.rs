use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kdeploy::{
	commands::{self, util::BrokenPipeGuard},
	config::Settings,
	kubectl::Kubectl,
	telemetry,
};
use tracing::Level;

#[derive(Parser)]
#[command(name = "kdeploy")]
#[command(about = "Deploy applications to Kubernetes", long_about = None)]
#[command(version)]
struct Cli {
	/// Log level (trace, debug, info, warn, error). Overrides RUST_LOG
	#[arg(long, global = true)]
	log_level: Option<Level>,

	/// Cluster tool executable
	#[arg(long, global = true)]
	kubectl: Option<PathBuf>,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Render a deployment to YAML
	Render(commands::render::RenderArgs),

	/// Install a deployment as a new release
	Install(commands::install::InstallArgs),

	/// Uninstall releases
	Uninstall(commands::uninstall::UninstallArgs),

	/// List installed releases
	List(commands::list::ListArgs),
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	telemetry::init(cli.log_level)?;

	let cwd = std::env::current_dir().context("resolving the working directory")?;
	let settings = Settings::discover(&cwd)?.with_overrides(cli.kubectl, None);
	let kubectl = Kubectl::new(settings.kubectl());

	let stdout = BrokenPipeGuard::new(std::io::stdout());

	match cli.command {
		Commands::Render(args) => commands::render::run(args, settings, stdout),
		Commands::Install(args) => commands::install::run(args, &kubectl, settings, stdout),
		Commands::Uninstall(args) => commands::uninstall::run(args, &kubectl, settings, stdout),
		Commands::List(args) => commands::list::run(args, &kubectl, settings, stdout),
	}
}
