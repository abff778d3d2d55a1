use std::path::Path;

use gitvend_build::ErrorKind;
use gitvend_build::stages::{
    compile_steps, configure_steps, extract_steps, host_steps, quote,
};
use gitvend_core::{
    BuildConfig, BuildContext, BuildEnv, HostConfig, ReproducibilityConfig, VersionTag,
};

fn context() -> BuildContext {
    BuildContext::new(
        Path::new("/work"),
        "git/git".parse().unwrap(),
        VersionTag::new("v2.45.0").unwrap(),
    )
}

fn env(ctx: &BuildContext) -> BuildEnv {
    BuildEnv::new(&ReproducibilityConfig::default(), &ctx.source_dir)
}

// ── Quoting ──

#[test]
fn quote_wraps_in_single_quotes() {
    assert_eq!(quote("plain"), "'plain'");
    assert_eq!(quote("with space"), "'with space'");
}

#[test]
fn quote_escapes_embedded_single_quote() {
    assert_eq!(quote("it's"), r"'it'\''s'");
}

// ── Host preparation ──

#[test]
fn host_steps_use_sudo_and_noninteractive_frontend() {
    let steps = host_steps(&HostConfig::default(), Path::new("/work"));

    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].command.line, "sudo apt-get update");
    let install = &steps[1].command.line;
    assert!(install.starts_with("sudo env DEBIAN_FRONTEND=noninteractive"));
    assert!(install.contains("apt-get install -y --no-install-recommends"));
    for package in ["'build-essential'", "'libcurl4-openssl-dev'", "'gettext'"] {
        assert!(install.contains(package), "missing {package} in {install}");
    }
    assert!(steps.iter().all(|s| s.failure == ErrorKind::HostDependencyInstall));
}

#[test]
fn host_steps_without_sudo() {
    let host = HostConfig {
        sudo: false,
        packages: vec!["autoconf".to_owned()],
        ..Default::default()
    };
    let steps = host_steps(&host, Path::new("/work"));

    assert_eq!(steps[0].command.line, "apt-get update");
    assert!(steps[1].command.line.starts_with("env DEBIAN_FRONTEND=noninteractive"));
    assert!(steps[1].command.line.ends_with("'autoconf'"));
}

#[test]
fn host_steps_inherit_environment_only() {
    let steps = host_steps(&HostConfig::default(), Path::new("/work"));
    assert!(steps.iter().all(|s| s.command.env.is_empty()));
}

// ── Extraction ──

#[test]
fn extract_step_is_deterministic_tar() {
    let ctx = context();
    let steps = extract_steps(&ctx, 315_532_800, &env(&ctx));

    assert_eq!(steps.len(), 1);
    let line = &steps[0].command.line;
    assert_eq!(
        line,
        "tar --sort=name --owner=0 --group=0 --numeric-owner --mtime=@315532800 \
         --no-same-owner -xzf '/work/git-v2.45.0.tar.gz' -C '/work'"
    );
    assert_eq!(steps[0].command.cwd, Path::new("/work"));
    assert_eq!(steps[0].failure, ErrorKind::Extraction);
    assert_eq!(steps[0].command.env.get("SOURCE_DATE_EPOCH"), Some("315532800"));
}

// ── Configure ──

#[test]
fn configure_regenerates_then_runs_with_prefix() {
    let ctx = context();
    let steps = configure_steps(&ctx, &BuildConfig::default(), &env(&ctx));

    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].command.line, "make configure");
    assert!(steps[1].command.line.starts_with("./configure --prefix='/usr'"));
    for flag in ["'--with-openssl'", "'--with-curl'", "'--without-tcltk'", "'--without-expat'"] {
        assert!(steps[1].command.line.contains(flag), "missing {flag}");
    }
    assert!(steps.iter().all(|s| s.command.cwd == ctx.source_dir));
    assert!(steps.iter().all(|s| s.failure == ErrorKind::Configuration));
}

#[test]
fn configure_attaches_config_log() {
    let ctx = context();
    let steps = configure_steps(&ctx, &BuildConfig::default(), &env(&ctx));

    assert!(steps[0].diagnostic_log.is_none());
    let log = steps[1].diagnostic_log.as_ref().unwrap();
    assert_eq!(log.path, Path::new("/work/git-2.45.0/config.log"));
    assert_eq!(log.lines, 40);
}

// ── Compile / install ──

#[test]
fn compile_uses_jobs_and_make_flags() {
    let ctx = context();
    let steps = compile_steps(&ctx, &BuildConfig::default(), &env(&ctx), 8);

    assert_eq!(steps[0].command.line, "make -j8 all");
    assert_eq!(steps[0].failure, ErrorKind::Compile);
    for step in &steps {
        assert_eq!(step.command.env.get("RUNTIME_PREFIX"), Some("YesPlease"));
        assert_eq!(step.command.env.get("NO_PERL"), Some("YesPlease"));
        assert_eq!(step.command.env.get("LC_ALL"), Some("C"));
    }
}

#[test]
fn install_is_restricted_to_allow_list() {
    let ctx = context();
    let steps = compile_steps(&ctx, &BuildConfig::default(), &env(&ctx), 2);

    assert_eq!(
        steps[1].command.line,
        "make install DESTDIR='/work/staging' PROGRAMS='git-remote-http' SCRIPTS= BUILT_INS="
    );
    assert_eq!(steps[1].failure, ErrorKind::Install);
}

#[test]
fn cflags_scrub_source_dir() {
    let ctx = context();
    let steps = compile_steps(&ctx, &BuildConfig::default(), &env(&ctx), 1);
    let cflags = steps[0].command.env.get("CFLAGS").unwrap();
    assert!(cflags.contains("-ffile-prefix-map=/work/git-2.45.0=."));
}
