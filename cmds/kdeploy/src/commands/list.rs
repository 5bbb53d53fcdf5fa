//! List command handler.

use std::io::Write;

use anyhow::Result;
use clap::Args;
use tabwriter::TabWriter;

use crate::{config::Settings, context::namespace_or_default, kubectl::ClusterTool, release};

#[derive(Args)]
pub struct ListArgs {
	/// Namespace to look for releases in
	#[arg(short, long)]
	pub namespace: Option<String>,
}

/// Run the list command: one `RELEASE  NAMESPACE` row per installed release.
pub fn run<W: Write>(
	args: ListArgs,
	tool: &dyn ClusterTool,
	settings: Settings,
	writer: W,
) -> Result<()> {
	let settings = settings.with_overrides(None, args.namespace);
	let namespace = namespace_or_default(settings.namespace());
	let releases = release::list(tool, namespace)?;

	let mut table = TabWriter::new(writer).padding(2);
	writeln!(table, "RELEASE\tNAMESPACE")?;
	for name in &releases {
		writeln!(table, "{name}\t{namespace}")?;
	}
	table.flush()?;
	Ok(())
}
