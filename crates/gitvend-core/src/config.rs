use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// File name looked up in the working directory when no `--config` is given.
pub const CONFIG_FILE: &str = "gitvend.toml";

/// gitvend.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VendConfig {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub reproducibility: ReproducibilityConfig,
    #[serde(default)]
    pub bundle: BundleConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Upstream repository as `owner/name`
    #[serde(default = "default_repository")]
    pub repository: String,
    /// Base URL of the tag listing API
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Base URL source archives are downloaded from
    #[serde(default = "default_archive_base")]
    pub archive_base: String,
    /// Environment variable holding an optional API token
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// User-Agent sent with every upstream request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Install host packages before building
    #[serde(default = "default_true")]
    pub install: bool,
    /// Prefix package manager invocations with sudo
    #[serde(default = "default_true")]
    pub sudo: bool,
    /// Packages passed to `apt-get install`
    #[serde(default = "default_packages")]
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Parallel make jobs (defaults to available parallelism)
    #[serde(default)]
    pub jobs: Option<usize>,
    /// Installation prefix handed to `configure`
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Arguments appended to `./configure --prefix=...`
    #[serde(default = "default_configure_args")]
    pub configure_args: Vec<String>,
    /// Feature flags exported to every make invocation
    #[serde(default = "default_make_flags")]
    pub make_flags: BTreeMap<String, String>,
    /// Programs installed besides the main binary
    #[serde(default = "default_install_programs")]
    pub install_programs: Vec<String>,
    /// Lines of config.log attached to a configure failure
    #[serde(default = "default_configure_log_lines")]
    pub configure_log_lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReproducibilityConfig {
    /// Fixed epoch for SOURCE_DATE_EPOCH and every bundled file's mtime
    #[serde(default = "default_source_date_epoch")]
    pub source_date_epoch: i64,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Compiler flags; `{source_dir}` is replaced with the extracted source path
    #[serde(default = "default_cflags")]
    pub cflags: String,
    #[serde(default = "default_ldflags")]
    pub ldflags: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Library name prefixes provided by every host and never bundled
    #[serde(default = "default_system_libraries")]
    pub system_libraries: Vec<String>,
    /// Paths relative to the bundle root removed after stripping
    #[serde(default = "default_prune")]
    pub prune: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Small public repository cloned through the launcher
    #[serde(default = "default_verify_repository_url")]
    pub repository_url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            repository: default_repository(),
            api_base: default_api_base(),
            archive_base: default_archive_base(),
            token_env: default_token_env(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            install: true,
            sudo: true,
            packages: default_packages(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            jobs: None,
            prefix: default_prefix(),
            configure_args: default_configure_args(),
            make_flags: default_make_flags(),
            install_programs: default_install_programs(),
            configure_log_lines: default_configure_log_lines(),
        }
    }
}

impl Default for ReproducibilityConfig {
    fn default() -> Self {
        Self {
            source_date_epoch: default_source_date_epoch(),
            timezone: default_timezone(),
            locale: default_locale(),
            cflags: default_cflags(),
            ldflags: default_ldflags(),
        }
    }
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            system_libraries: default_system_libraries(),
            prune: default_prune(),
        }
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            repository_url: default_verify_repository_url(),
        }
    }
}

impl VendConfig {
    /// Load from gitvend.toml in the given directory, or return defaults if not found.
    pub fn load(dir: &Path) -> crate::Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load_file(&config_path)
        } else {
            debug!(dir = %dir.display(), "no {CONFIG_FILE}, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from an explicit path. A missing file is an error.
    pub fn load_file(path: &Path) -> crate::Result<Self> {
        debug!(path = %path.display(), "loading config");
        let content = std::fs::read_to_string(path).map_err(|e| crate::Error::ConfigLoad {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

fn default_true() -> bool {
    true
}

fn default_repository() -> String {
    "git/git".to_owned()
}

fn default_api_base() -> String {
    "https://api.github.com".to_owned()
}

fn default_archive_base() -> String {
    "https://github.com".to_owned()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_owned()
}

fn default_user_agent() -> String {
    concat!("gitvend/", env!("CARGO_PKG_VERSION")).to_owned()
}

fn default_packages() -> Vec<String> {
    [
        "build-essential",
        "autoconf",
        "libssl-dev",
        "libcurl4-openssl-dev",
        "zlib1g-dev",
        "gettext",
    ]
    .iter()
    .map(|s| (*s).to_owned())
    .collect()
}

fn default_prefix() -> String {
    "/usr".to_owned()
}

fn default_configure_args() -> Vec<String> {
    [
        "--with-openssl",
        "--with-curl",
        "--with-zlib",
        "--with-iconv",
        "--without-tcltk",
        "--without-python",
        "--without-expat",
    ]
    .iter()
    .map(|s| (*s).to_owned())
    .collect()
}

fn default_make_flags() -> BTreeMap<String, String> {
    [
        "RUNTIME_PREFIX",
        "NO_TCLTK",
        "NO_PERL",
        "NO_PYTHON",
        "NO_GETTEXT",
        "NO_EXPAT",
        "NO_INSTALL_HARDLINKS",
    ]
    .iter()
    .map(|flag| ((*flag).to_owned(), "YesPlease".to_owned()))
    .collect()
}

fn default_install_programs() -> Vec<String> {
    vec!["git-remote-http".to_owned()]
}

fn default_configure_log_lines() -> usize {
    40
}

fn default_source_date_epoch() -> i64 {
    // 1980-01-01T00:00:00Z, the earliest time zip archives can represent
    315_532_800
}

fn default_timezone() -> String {
    "UTC".to_owned()
}

fn default_locale() -> String {
    "C".to_owned()
}

fn default_cflags() -> String {
    "-O2 -g0 -ffile-prefix-map={source_dir}=.".to_owned()
}

fn default_ldflags() -> String {
    "-Wl,--build-id=none".to_owned()
}

fn default_system_libraries() -> Vec<String> {
    [
        "linux-vdso",
        "ld-linux",
        "libc.so",
        "libm.so",
        "libpthread.so",
        "libdl.so",
        "librt.so",
        "libresolv.so",
    ]
    .iter()
    .map(|s| (*s).to_owned())
    .collect()
}

fn default_prune() -> Vec<String> {
    [
        "usr/share/man",
        "usr/share/doc",
        "usr/share/info",
        "usr/share/locale",
        "usr/share/gitk",
        "usr/share/git-gui",
        "usr/share/gitweb",
        "usr/share/perl5",
        "usr/lib/perl5",
        "usr/libexec/git-core/git-gui",
        "usr/libexec/git-core/git-gui--askpass",
        "usr/libexec/git-core/git-citool",
        "usr/libexec/git-core/mergetools",
    ]
    .iter()
    .map(|s| (*s).to_owned())
    .collect()
}

fn default_verify_repository_url() -> String {
    "https://github.com/octocat/Hello-World.git".to_owned()
}
