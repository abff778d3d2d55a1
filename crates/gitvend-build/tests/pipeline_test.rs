use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use filetime::FileTime;
use gitvend_build::{ErrorKind, Pipeline, PipelineOptions, Stage, StageError};
use gitvend_core::{Repository, VendConfig, VersionTag};
use gitvend_runner::{CommandOutput, CommandSpec, ProcessRunner, RunnerError};
use gitvend_upstream::{Tag, Upstream, UpstreamError};
use mockall::mock;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

mock! {
    Host {}

    impl Upstream for Host {
        async fn list_tags(
            &self,
            repository: &Repository,
            cancel: &CancellationToken,
        ) -> Result<Vec<Tag>, UpstreamError>;
        async fn download(
            &self,
            url: &str,
            dest: &Path,
            cancel: &CancellationToken,
        ) -> Result<u64, UpstreamError>;
    }
}

fn elf_bytes() -> Vec<u8> {
    let mut bytes = vec![0x7F, b'E', b'L', b'F', 2, 1, 1, 0];
    bytes.resize(128, 0);
    bytes
}

fn write_file(path: &Path, content: &[u8], mode: u32) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
}

/// Stands in for the shell: records every command line and reproduces the
/// filesystem effects the real tools would have.
struct FakeRunner {
    work: PathBuf,
    /// What the staged binary prints for `--version`.
    reported_version: String,
    /// Fail the first command whose line contains this text.
    fail_on: Option<&'static str>,
    /// Leave `git-remote-http` out of the simulated install.
    skip_helper: bool,
    /// Written into the source tree by the simulated extraction.
    config_log: Option<String>,
    lines: Mutex<Vec<String>>,
}

impl FakeRunner {
    fn new(work: &Path) -> Self {
        Self {
            work: work.to_path_buf(),
            reported_version: "2.45.0".to_owned(),
            fail_on: None,
            skip_helper: false,
            config_log: None,
            lines: Mutex::new(Vec::new()),
        }
    }

    fn failing_on(mut self, needle: &'static str) -> Self {
        self.fail_on = Some(needle);
        self
    }

    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    fn source_dir(&self) -> PathBuf {
        self.work.join("git-2.45.0")
    }

    fn staging(&self) -> PathBuf {
        self.work.join("staging")
    }
}

impl ProcessRunner for FakeRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        _cancel: &CancellationToken,
    ) -> Result<CommandOutput, RunnerError> {
        let line = command.line.clone();
        self.lines.lock().unwrap().push(line.clone());

        if self.fail_on.is_some_and(|needle| line.contains(needle)) {
            // a partial install is what a real failure tends to leave
            if line.starts_with("make install") {
                write_file(&self.staging().join("usr/share/partial"), b"x", 0o644);
            }
            return Err(RunnerError::CommandFailed {
                command: line,
                status: "exit code 2".to_owned(),
                stdout: String::new(),
                stderr: "simulated failure".to_owned(),
            });
        }

        let mut stdout = String::new();
        if line.starts_with("tar ") {
            write_file(&self.source_dir().join("Makefile"), b"all:\n", 0o644);
            if let Some(log) = &self.config_log {
                write_file(&self.source_dir().join("config.log"), log.as_bytes(), 0o644);
            }
        } else if line.starts_with("make install") {
            let usr = self.staging().join("usr");
            write_file(&usr.join("bin/git"), &elf_bytes(), 0o755);
            if !self.skip_helper {
                write_file(&usr.join("libexec/git-core/git-remote-http"), &elf_bytes(), 0o755);
            }
            write_file(&usr.join("share/man/man1/git.1"), b"man", 0o644);
        } else if line.starts_with("ldd ") {
            stdout = "\tlinux-vdso.so.1 (0x0)\n\
                      \tlibc.so.6 => /lib/x86_64-linux-gnu/libc.so.6 (0x0)\n"
                .to_owned();
        } else if line.ends_with(" --version") {
            stdout = format!("git version {}\n", self.reported_version);
        } else if line.contains(" clone --depth 1 ") {
            assert_eq!(command.env.get("GIT_TERMINAL_PROMPT"), Some("0"));
            assert_eq!(command.env.get("GIT_CONFIG_NOSYSTEM"), Some("1"));
            write_file(&self.work.join("verify-clone/README"), b"hello", 0o644);
        }

        Ok(CommandOutput {
            stdout,
            stderr: String::new(),
        })
    }
}

fn archive_host() -> MockHost {
    let mut host = MockHost::new();
    host.expect_download().returning(|_, dest, _| {
        fs::write(dest, b"archive").unwrap();
        Ok(7)
    });
    host
}

fn options(output: &Path) -> PipelineOptions {
    PipelineOptions {
        tag: Some(VersionTag::new("v2.45.0").unwrap()),
        jobs: Some(4),
        skip_host_deps: true,
        output: Some(output.to_path_buf()),
    }
}

fn index_of(lines: &[String], prefix: &str) -> usize {
    lines
        .iter()
        .position(|l| l.starts_with(prefix) || l.contains(prefix))
        .unwrap_or_else(|| panic!("no command matching {prefix:?} in {lines:?}"))
}

// ── Success path ──

#[tokio::test]
async fn pipeline_runs_stages_in_order_and_publishes() {
    let tmp = TempDir::new().unwrap();
    let work = tmp.path().join("work");
    fs::create_dir_all(&work).unwrap();
    let output = tmp.path().join("out");

    let runner = FakeRunner::new(&work);
    let pipeline = Pipeline::new(VendConfig::default(), options(&output), &runner, archive_host());

    let outcome = pipeline.run(&work, &CancellationToken::new()).await.unwrap();

    assert_eq!(
        outcome.stages,
        vec![
            Stage::ResolveVersion,
            Stage::Fetch,
            Stage::Extract,
            Stage::Configure,
            Stage::Compile,
            Stage::Finish,
            Stage::Verify,
            Stage::Publish,
        ]
    );

    let lines = runner.lines();
    assert!(!lines.iter().any(|l| l.contains("apt-get")));
    let order = [
        "tar ",
        "make configure",
        "./configure ",
        "make -j4 all",
        "make install ",
        "ldd ",
        "strip ",
        " --version",
        " clone --depth 1 ",
    ];
    let positions: Vec<_> = order.iter().map(|p| index_of(&lines, p)).collect();
    assert!(
        positions.windows(2).all(|w| w[0] < w[1]),
        "commands out of order: {lines:?}"
    );

    assert!(outcome.verification.version_line.contains("2.45.0"));
    assert!(!work.join("verify-clone").exists());

    assert_eq!(outcome.published, output);
    let launcher = output.join("git");
    assert!(launcher.is_file());
    let mode = fs::metadata(&launcher).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
    let https = output.join("usr/libexec/git-core/git-remote-https");
    assert!(fs::metadata(&https).unwrap().permissions().mode() & 0o111 != 0);
    assert!(!output.join("usr/share/man").exists());
    let stamp = FileTime::from_last_modification_time(&fs::metadata(&launcher).unwrap());
    assert_eq!(stamp.unix_seconds(), 315_532_800);
}

#[tokio::test]
async fn pipeline_installs_host_packages_first() {
    let tmp = TempDir::new().unwrap();
    let work = tmp.path().join("work");
    fs::create_dir_all(&work).unwrap();

    let runner = FakeRunner::new(&work);
    let mut opts = options(&tmp.path().join("out"));
    opts.skip_host_deps = false;
    let pipeline = Pipeline::new(VendConfig::default(), opts, &runner, archive_host());

    let outcome = pipeline.run(&work, &CancellationToken::new()).await.unwrap();

    assert!(outcome.stages.contains(&Stage::PrepareHost));
    let lines = runner.lines();
    assert_eq!(lines[0], "sudo apt-get update");
    assert!(lines[1].contains("apt-get install -y --no-install-recommends"));
    assert!(lines[2].starts_with("tar "));
}

#[tokio::test]
async fn pipeline_resolves_latest_stable_when_not_pinned() {
    let tmp = TempDir::new().unwrap();
    let work = tmp.path().join("work");
    fs::create_dir_all(&work).unwrap();

    let mut host = archive_host();
    host.expect_list_tags().returning(|_, _| {
        Ok(vec![Tag::new("v2.46.0-rc1"), Tag::new("v2.45.0"), Tag::new("v2.44.1")])
    });

    let runner = FakeRunner::new(&work);
    let mut opts = options(&tmp.path().join("out"));
    opts.tag = None;
    let pipeline = Pipeline::new(VendConfig::default(), opts, &runner, host);

    let outcome = pipeline.run(&work, &CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.bundle.tag.as_str(), "v2.45.0");
}

// ── Failure paths ──

#[tokio::test]
async fn http_500_from_tag_api_fails_resolution_without_staging() {
    let tmp = TempDir::new().unwrap();
    let work = tmp.path().join("work");
    fs::create_dir_all(&work).unwrap();

    let mut host = MockHost::new();
    host.expect_list_tags().returning(|_, _| {
        Err(UpstreamError::Status {
            url: "https://api.github.com/repos/git/git/tags?per_page=100".to_owned(),
            status: 500,
        })
    });
    host.expect_download().never();

    let runner = FakeRunner::new(&work);
    let mut opts = options(&tmp.path().join("out"));
    opts.tag = None;
    let pipeline = Pipeline::new(VendConfig::default(), opts, &runner, host);

    let err = pipeline.run(&work, &CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.stage, Stage::ResolveVersion);
    assert_eq!(err.kind(), ErrorKind::VersionResolution);
    assert!(err.is_transient());
    assert!(runner.lines().is_empty());
    assert!(!work.join("staging").exists());
}

#[tokio::test]
async fn configure_failure_carries_config_log_head() {
    let tmp = TempDir::new().unwrap();
    let work = tmp.path().join("work");
    fs::create_dir_all(&work).unwrap();

    let mut config = VendConfig::default();
    config.build.configure_log_lines = 2;
    let mut runner = FakeRunner::new(&work).failing_on("./configure");
    runner.config_log = Some((1..=5).map(|n| format!("config line {n}\n")).collect());

    let pipeline = Pipeline::new(config, options(&tmp.path().join("out")), &runner, archive_host());
    let err = pipeline.run(&work, &CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.stage, Stage::Configure);
    assert_eq!(err.kind(), ErrorKind::Configuration);
    match &err.source {
        StageError::Step { source } => {
            assert_eq!(source.excerpt.as_deref(), Some("config line 1\nconfig line 2"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!runner.lines().iter().any(|l| l.starts_with("make -j")));
}

#[tokio::test]
async fn install_failure_removes_partial_staging() {
    let tmp = TempDir::new().unwrap();
    let work = tmp.path().join("work");
    fs::create_dir_all(&work).unwrap();

    let runner = FakeRunner::new(&work).failing_on("make install");
    let pipeline =
        Pipeline::new(VendConfig::default(), options(&tmp.path().join("out")), &runner, archive_host());

    let err = pipeline.run(&work, &CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.stage, Stage::Compile);
    assert_eq!(err.kind(), ErrorKind::Install);
    assert!(!err.is_transient());
    assert!(!work.join("staging").exists());
}

#[tokio::test]
async fn missing_transport_helper_fails_finishing() {
    let tmp = TempDir::new().unwrap();
    let work = tmp.path().join("work");
    fs::create_dir_all(&work).unwrap();

    let mut runner = FakeRunner::new(&work);
    runner.skip_helper = true;
    let pipeline =
        Pipeline::new(VendConfig::default(), options(&tmp.path().join("out")), &runner, archive_host());

    let err = pipeline.run(&work, &CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.stage, Stage::Finish);
    assert_eq!(err.kind(), ErrorKind::MissingTransportHelper);
    assert!(!work.join("staging").exists());
    assert!(!tmp.path().join("out").exists());
}

#[tokio::test]
async fn version_mismatch_fails_verification() {
    let tmp = TempDir::new().unwrap();
    let work = tmp.path().join("work");
    fs::create_dir_all(&work).unwrap();
    let output = tmp.path().join("out");

    let mut runner = FakeRunner::new(&work);
    runner.reported_version = "2.44.0".to_owned();
    let pipeline = Pipeline::new(VendConfig::default(), options(&output), &runner, archive_host());

    let err = pipeline.run(&work, &CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.stage, Stage::Verify);
    assert_eq!(err.kind(), ErrorKind::Verification);
    assert!(!runner.lines().iter().any(|l| l.contains(" clone ")));
    assert!(!work.join("staging").exists());
    assert!(!output.exists());
}

#[tokio::test]
async fn failed_clone_is_a_verification_error() {
    let tmp = TempDir::new().unwrap();
    let work = tmp.path().join("work");
    fs::create_dir_all(&work).unwrap();

    let runner = FakeRunner::new(&work).failing_on(" clone --depth 1 ");
    let pipeline =
        Pipeline::new(VendConfig::default(), options(&tmp.path().join("out")), &runner, archive_host());

    let err = pipeline.run(&work, &CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.stage, Stage::Verify);
    assert_eq!(err.kind(), ErrorKind::Verification);
    assert!(format!("{:?}", err.source).contains("simulated failure"));
    assert!(!work.join("verify-clone").exists());
}

#[tokio::test]
async fn cancelled_token_stops_before_fetch() {
    let tmp = TempDir::new().unwrap();
    let work = tmp.path().join("work");
    fs::create_dir_all(&work).unwrap();

    let mut host = MockHost::new();
    host.expect_download().never();
    let runner = FakeRunner::new(&work);
    let pipeline = Pipeline::new(VendConfig::default(), options(&tmp.path().join("out")), &runner, host);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = pipeline.run(&work, &cancel).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.stage, Stage::Fetch);
    assert!(runner.lines().is_empty());
}
