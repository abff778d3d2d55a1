use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use gitvend_core::BundleLayout;
use gitvend_core::context::BINARY_NAME;

use crate::error::{ErrorKind, StageError};

/// Render the relocatable launcher script for `layout`.
///
/// Every path is taken relative to the script's own resolved directory, so
/// the bundle works wherever it is copied.
pub fn render_launcher(layout: &BundleLayout) -> String {
    let lib = layout.relative("lib");
    let helpers = layout.relative("libexec/git-core");
    let bin = layout.relative("bin");
    let (lib, helpers, bin) = (lib.display(), helpers.display(), bin.display());

    format!(
        r#"#!/bin/sh
here="$(dirname "$(readlink -f "$0")")"
LD_LIBRARY_PATH="$here/{lib}${{LD_LIBRARY_PATH:+:$LD_LIBRARY_PATH}}"
PATH="$here/{helpers}:$here/{bin}:$PATH"
GIT_EXEC_PATH="$here/{helpers}"
export LD_LIBRARY_PATH PATH GIT_EXEC_PATH
exec "$here/{bin}/{BINARY_NAME}" "$@"
"#
    )
}

/// Write the launcher at the bundle root with mode 0755.
pub fn write_launcher(layout: &BundleLayout) -> Result<PathBuf, StageError> {
    let path = layout.launcher();
    fs::write(&path, render_launcher(layout))
        .map_err(StageError::io(ErrorKind::BundleFinish, "failed to write", &path))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .map_err(StageError::io(ErrorKind::BundleFinish, "failed to chmod", &path))?;
    Ok(path)
}
