use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use gitvend_core::BundleLayout;
use gitvend_core::context::{HTTP_HELPER, HTTPS_HELPER};
use tracing::info;

use crate::error::{ErrorKind, StageError};

/// How the HTTPS helper came to be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelperOrigin {
    /// `make install` produced it.
    Installed,
    /// A wrapper script delegating to `git-remote-http`.
    Wrapped,
    /// The compiled helper copied out of the source tree.
    Copied,
}

fn wrapper_script() -> String {
    format!("#!/bin/sh\nexec \"$(dirname \"$0\")/{HTTP_HELPER}\" \"$@\"\n")
}

/// Add execute bits for everyone, keeping the remaining mode.
pub fn make_executable(path: &Path) -> Result<(), StageError> {
    let mode = fs::metadata(path)
        .map_err(StageError::io(ErrorKind::BundleFinish, "failed to stat", path))?
        .permissions()
        .mode();
    fs::set_permissions(path, fs::Permissions::from_mode(mode | 0o755))
        .map_err(StageError::io(ErrorKind::BundleFinish, "failed to chmod", path))
}

pub fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Make sure `git-remote-https` exists and is executable.
///
/// Preference order: what the install produced, a wrapper around the staged
/// HTTP helper, then a copy of the helper compiled in `source_dir`.
pub fn ensure_https_helper(
    layout: &BundleLayout,
    source_dir: &Path,
) -> Result<HelperOrigin, StageError> {
    let https = layout.https_helper();
    let http = layout.http_helper();
    let compiled = source_dir.join(HTTP_HELPER);

    if https.exists() {
        make_executable(&https)?;
        return Ok(HelperOrigin::Installed);
    }

    if http.is_file() {
        info!(helper = %https.display(), "wrapping {HTTP_HELPER} as {HTTPS_HELPER}");
        fs::write(&https, wrapper_script())
            .map_err(StageError::io(ErrorKind::BundleFinish, "failed to write", &https))?;
        make_executable(&https)?;
        make_executable(&http)?;
        return Ok(HelperOrigin::Wrapped);
    }

    if compiled.is_file() {
        info!(from = %compiled.display(), "copying compiled {HTTP_HELPER} as {HTTPS_HELPER}");
        let helper_dir = layout.helper_dir();
        fs::create_dir_all(&helper_dir).map_err(StageError::io(
            ErrorKind::BundleFinish,
            "failed to create",
            &helper_dir,
        ))?;
        fs::copy(&compiled, &https)
            .map_err(StageError::io(ErrorKind::BundleFinish, "failed to copy", &compiled))?;
        make_executable(&https)?;
        return Ok(HelperOrigin::Copied);
    }

    Err(StageError::MissingTransportHelper {
        helper_dir: layout.helper_dir(),
        searched: vec![https, http, compiled],
    })
}
