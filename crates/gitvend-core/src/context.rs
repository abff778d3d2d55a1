//! Per-run build state threaded through the pipeline by path.
//!
//! Nothing here outlives a single run: a [`BuildContext`] is created once the
//! [`VersionTag`] is known and is dropped (along with its working directory,
//! when that directory was provisioned) when the pipeline returns.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File name of the main executable inside the bundle's `bin/` directory.
pub const BINARY_NAME: &str = "git";
/// Transport helper the bundle must always ship.
pub const HTTPS_HELPER: &str = "git-remote-https";
/// Plain HTTP helper; `git-remote-https` is an alias of it upstream.
pub const HTTP_HELPER: &str = "git-remote-http";
/// Launcher script written at the bundle root.
pub const LAUNCHER_NAME: &str = "git";

/// Upstream repository coordinates (`owner/name`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

impl FromStr for Repository {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || crate::Error::InvalidRepository {
            value: s.to_owned(),
        };
        let (owner, name) = s.split_once('/').ok_or_else(invalid)?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }
        Ok(Self {
            owner: owner.to_owned(),
            name: name.to_owned(),
        })
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A resolved upstream tag, e.g. `v2.45.0`.
///
/// # Examples
///
/// ```
/// use gitvend_core::VersionTag;
///
/// let tag = VersionTag::new("v2.45.0").unwrap();
/// assert_eq!(tag.as_str(), "v2.45.0");
/// assert_eq!(tag.version(), "2.45.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionTag(String);

impl VersionTag {
    /// Tags end up in URLs and directory names, so separators and
    /// whitespace are rejected.
    pub fn new(value: &str) -> crate::Result<Self> {
        let reason = if value.is_empty() {
            Some("tag is empty")
        } else if value.contains('/') || value.contains('\\') {
            Some("tag contains a path separator")
        } else if value.chars().any(char::is_whitespace) {
            Some("tag contains whitespace")
        } else if value == "." || value == ".." {
            Some("tag is a relative path component")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(crate::Error::InvalidTag {
                value: value.to_owned(),
                reason,
            }),
            None => Ok(Self(value.to_owned())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The tag with one leading `v` removed.
    pub fn version(&self) -> &str {
        self.0.strip_prefix('v').unwrap_or(&self.0)
    }

    /// `{archive_base}/{owner}/{name}/archive/refs/tags/{tag}.tar.gz`
    pub fn archive_url(&self, archive_base: &str, repository: &Repository) -> String {
        format!(
            "{base}/{owner}/{name}/archive/refs/tags/{tag}.tar.gz",
            base = archive_base.trim_end_matches('/'),
            owner = repository.owner,
            name = repository.name,
            tag = self.0,
        )
    }

    /// Top-level directory the upstream archive unpacks into.
    pub fn source_dir_name(&self, repository: &Repository) -> String {
        format!("{}-{}", repository.name, self.version())
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Paths derived for one pipeline run.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub work_dir: PathBuf,
    pub repository: Repository,
    pub tag: VersionTag,
    pub archive_path: PathBuf,
    pub source_dir: PathBuf,
    pub staging_dir: PathBuf,
}

impl BuildContext {
    pub fn new(work_dir: &Path, repository: Repository, tag: VersionTag) -> Self {
        let archive_path = work_dir.join(format!("{}-{}.tar.gz", repository.name, tag));
        let source_dir = work_dir.join(tag.source_dir_name(&repository));
        let staging_dir = work_dir.join("staging");

        Self {
            work_dir: work_dir.to_path_buf(),
            repository,
            tag,
            archive_path,
            source_dir,
            staging_dir,
        }
    }

    /// Throwaway destination for the verification clone.
    pub fn verify_dir(&self) -> PathBuf {
        self.work_dir.join("verify-clone")
    }

    pub fn layout(&self, prefix: &str) -> BundleLayout {
        BundleLayout::new(&self.staging_dir, prefix)
    }
}

/// Fixed layout of a staged bundle.
///
/// ```text
/// <root>/
///   git                          launcher
///   usr/bin/git                  main binary
///   usr/libexec/git-core/        transport helpers
///   usr/lib/                     bundled shared libraries
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLayout {
    root: PathBuf,
    prefix: PathBuf,
}

impl BundleLayout {
    /// `prefix` is the install prefix handed to configure (`/usr`); it is
    /// re-rooted under `root` the same way `make install DESTDIR=` does.
    pub fn new(root: &Path, prefix: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            prefix: PathBuf::from(prefix.trim_start_matches('/')),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn prefixed(&self, dir: &str) -> PathBuf {
        self.root.join(self.relative(dir))
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.prefixed("bin")
    }

    pub fn binary(&self) -> PathBuf {
        self.bin_dir().join(BINARY_NAME)
    }

    pub fn helper_dir(&self) -> PathBuf {
        self.prefixed("libexec/git-core")
    }

    pub fn https_helper(&self) -> PathBuf {
        self.helper_dir().join(HTTPS_HELPER)
    }

    pub fn http_helper(&self) -> PathBuf {
        self.helper_dir().join(HTTP_HELPER)
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.prefixed("lib")
    }

    pub fn launcher(&self) -> PathBuf {
        self.root.join(LAUNCHER_NAME)
    }

    /// Path of a prefixed directory relative to the bundle root, used when
    /// writing the launcher so the bundle stays relocatable.
    pub fn relative(&self, dir: &str) -> PathBuf {
        self.prefix.join(dir)
    }
}
