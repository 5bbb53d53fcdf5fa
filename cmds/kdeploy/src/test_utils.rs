//! Common test utilities, shared with the integration tests in `tests/`.

use std::{
	fs,
	io::{self, ErrorKind, Write},
	path::{Path, PathBuf},
};

use super::unit::ATTRIBUTES_FILE;

/// A writer that fails every call with `ErrorKind::BrokenPipe`, like stdout
/// connected to a reader that has exited.
pub struct BrokenPipeWriter;

impl Write for BrokenPipeWriter {
	fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
		Err(io::Error::new(ErrorKind::BrokenPipe, "broken pipe"))
	}

	fn flush(&mut self) -> io::Result<()> {
		Err(io::Error::new(ErrorKind::BrokenPipe, "broken pipe"))
	}
}

/// Write a deployment unit directory `root/dir` with the given attributes file
/// content and templates.
pub fn write_unit(root: &Path, dir: &str, attributes: &str, templates: &[(&str, &str)]) -> PathBuf {
	let path = root.join(dir);
	fs::create_dir_all(&path).unwrap();
	fs::write(path.join(ATTRIBUTES_FILE), attributes).unwrap();
	for (name, data) in templates {
		fs::write(path.join(name), data).unwrap();
	}
	path
}

/// Template rendering a single `apps/v1` Deployment named `app`.
pub const APP_DEPLOYMENT: &str = "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: app
spec:
  replicas: {{ .Parameters.replicas }}
";
