use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use gitvend_core::{BuildEnv, BundleLayout};
use gitvend_runner::{CommandSpec, ProcessRunner, Step, StepRunner};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::strip::is_elf;
use crate::error::{ErrorKind, StageError};
use crate::stages::quote_path;

/// Where the dynamic loader found a dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Path(PathBuf),
    NotFound,
    /// Provided by the kernel (vDSO); there is no file.
    Virtual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedLibrary {
    pub name: String,
    pub resolution: Resolution,
}

/// Parse `ldd` output.
///
/// ```text
/// 	linux-vdso.so.1 (0x00007ffc...)
/// 	libcurl.so.4 => /lib/x86_64-linux-gnu/libcurl.so.4 (0x00007f...)
/// 	libfoo.so.1 => not found
/// 	/lib64/ld-linux-x86-64.so.2 (0x00007f...)
/// ```
pub fn parse_ldd(output: &str) -> Vec<LinkedLibrary> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match line.split_once("=>") {
            Some((name, target)) => {
                let target = target.trim();
                let resolution = if target.starts_with("not found") {
                    Resolution::NotFound
                } else {
                    let path = target.split_whitespace().next()?;
                    if path.starts_with('/') {
                        Resolution::Path(PathBuf::from(path))
                    } else {
                        Resolution::Virtual
                    }
                };
                Some(LinkedLibrary {
                    name: name.trim().to_owned(),
                    resolution,
                })
            }
            None => {
                let token = line.split_whitespace().next()?;
                // "statically linked" and similar notes carry no library
                if !token.contains(".so") {
                    return None;
                }
                let path = Path::new(token);
                let name = path.file_name()?.to_string_lossy().into_owned();
                let resolution = if path.is_absolute() {
                    Resolution::Path(path.to_path_buf())
                } else {
                    Resolution::Virtual
                };
                Some(LinkedLibrary { name, resolution })
            }
        })
        .collect()
}

pub fn is_system_library(name: &str, system_prefixes: &[String]) -> bool {
    system_prefixes
        .iter()
        .any(|prefix| name.starts_with(prefix.as_str()))
}

/// The main binary plus every ELF program in the helper directory, sorted.
fn link_targets(layout: &BundleLayout) -> Result<Vec<PathBuf>, StageError> {
    let mut targets = vec![layout.binary()];
    let helper_dir = layout.helper_dir();
    if !helper_dir.is_dir() {
        return Ok(targets);
    }

    let read_err = StageError::io(ErrorKind::BundleFinish, "failed to read", &helper_dir);
    let mut helpers = Vec::new();
    for entry in fs::read_dir(&helper_dir).map_err(read_err)? {
        let path = entry
            .map_err(StageError::io(ErrorKind::BundleFinish, "failed to read", &helper_dir))?
            .path();
        if path.is_file() && !path.is_symlink() && is_elf(&path)? {
            helpers.push(path);
        }
    }
    helpers.sort();
    targets.extend(helpers);
    Ok(targets)
}

/// Copy every non-system shared library the bundle links against into the
/// bundle's library directory. Returns the copied library names, sorted.
pub async fn collect_libraries<R: ProcessRunner>(
    steps: &StepRunner<R>,
    layout: &BundleLayout,
    system_prefixes: &[String],
    env: &BuildEnv,
    cancel: &CancellationToken,
) -> Result<Vec<String>, StageError> {
    let mut wanted: BTreeMap<String, PathBuf> = BTreeMap::new();

    for target in link_targets(layout)? {
        let step = Step::new(
            format!("ldd {}", target.display()),
            CommandSpec::new(format!("ldd {}", quote_path(&target)), layout.root(), env),
            ErrorKind::BundleFinish,
        );
        let output = steps.run(&step, cancel).await?;

        for library in parse_ldd(&output.stdout) {
            if is_system_library(&library.name, system_prefixes) {
                debug!(library = %library.name, "skipping system library");
                continue;
            }
            match library.resolution {
                Resolution::Path(path) => {
                    wanted.entry(library.name).or_insert(path);
                }
                Resolution::NotFound => {
                    return Err(StageError::UnresolvedLibrary {
                        binary: target,
                        library: library.name,
                    });
                }
                Resolution::Virtual => {}
            }
        }
    }

    if wanted.is_empty() {
        return Ok(Vec::new());
    }

    let lib_dir = layout.lib_dir();
    fs::create_dir_all(&lib_dir)
        .map_err(StageError::io(ErrorKind::BundleFinish, "failed to create", &lib_dir))?;

    for (name, path) in &wanted {
        let real = fs::canonicalize(path)
            .map_err(StageError::io(ErrorKind::BundleFinish, "failed to resolve", path))?;
        let dest = lib_dir.join(name);
        fs::copy(&real, &dest)
            .map_err(StageError::io(ErrorKind::BundleFinish, "failed to copy", &real))?;
        info!(library = %name, from = %real.display(), "bundled shared library");
    }

    Ok(wanted.into_keys().collect())
}
