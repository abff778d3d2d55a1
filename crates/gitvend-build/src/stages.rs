//! Step lists for the process-driven stages.
//!
//! Each function only describes what to run; [`crate::Pipeline`] executes the
//! result through a [`gitvend_runner::StepRunner`].

use std::path::Path;

use gitvend_core::{BuildConfig, BuildContext, BuildEnv, HostConfig};
use gitvend_runner::{CommandSpec, Step};

use crate::error::ErrorKind;

/// Single-quote a value for `/bin/sh`.
pub fn quote(value: impl AsRef<str>) -> String {
    format!("'{}'", value.as_ref().replace('\'', r"'\''"))
}

pub fn quote_path(path: &Path) -> String {
    quote(path.display().to_string())
}

/// `apt-get update` and `apt-get install` for the host toolchain.
pub fn host_steps(host: &HostConfig, cwd: &Path) -> Vec<Step<ErrorKind>> {
    let sudo = if host.sudo { "sudo " } else { "" };
    let packages = host
        .packages
        .iter()
        .map(quote)
        .collect::<Vec<_>>()
        .join(" ");
    let env = BuildEnv::default();

    vec![
        Step::new(
            "apt-get update",
            CommandSpec::new(format!("{sudo}apt-get update"), cwd, &env),
            ErrorKind::HostDependencyInstall,
        ),
        Step::new(
            "apt-get install",
            CommandSpec::new(
                format!(
                    "{sudo}env DEBIAN_FRONTEND=noninteractive \
                     apt-get install -y --no-install-recommends {packages}"
                ),
                cwd,
                &env,
            ),
            ErrorKind::HostDependencyInstall,
        ),
    ]
}

/// Unpack the archive with canonical order, owner, and mtime.
pub fn extract_steps(ctx: &BuildContext, epoch: i64, env: &BuildEnv) -> Vec<Step<ErrorKind>> {
    vec![Step::new(
        "extract",
        CommandSpec::new(
            format!(
                "tar --sort=name --owner=0 --group=0 --numeric-owner --mtime=@{epoch} \
                 --no-same-owner -xzf {archive} -C {work}",
                archive = quote_path(&ctx.archive_path),
                work = quote_path(&ctx.work_dir),
            ),
            &ctx.work_dir,
            env,
        ),
        ErrorKind::Extraction,
    )]
}

/// Regenerate `configure` from its template and run it.
///
/// The configure step attaches the head of `config.log` when it fails.
pub fn configure_steps(
    ctx: &BuildContext,
    build: &BuildConfig,
    env: &BuildEnv,
) -> Vec<Step<ErrorKind>> {
    let mut args = vec![format!("--prefix={}", quote(&build.prefix))];
    args.extend(build.configure_args.iter().map(quote));

    vec![
        Step::new(
            "make configure",
            CommandSpec::new("make configure", &ctx.source_dir, env),
            ErrorKind::Configuration,
        ),
        Step::new(
            "configure",
            CommandSpec::new(
                format!("./configure {}", args.join(" ")),
                &ctx.source_dir,
                env,
            ),
            ErrorKind::Configuration,
        )
        .with_diagnostic_log(&ctx.source_dir.join("config.log"), build.configure_log_lines),
    ]
}

/// Parallel build, then an install restricted to the program allow-list.
pub fn compile_steps(
    ctx: &BuildContext,
    build: &BuildConfig,
    env: &BuildEnv,
    jobs: usize,
) -> Vec<Step<ErrorKind>> {
    let make_env = env.with(build.make_flags.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    let programs = build.install_programs.join(" ");

    vec![
        Step::new(
            "make all",
            CommandSpec::new(format!("make -j{jobs} all"), &ctx.source_dir, &make_env),
            ErrorKind::Compile,
        ),
        Step::new(
            "make install",
            CommandSpec::new(
                format!(
                    "make install DESTDIR={staging} PROGRAMS={programs} SCRIPTS= BUILT_INS=",
                    staging = quote_path(&ctx.staging_dir),
                    programs = quote(programs),
                ),
                &ctx.source_dir,
                &make_env,
            ),
            ErrorKind::Install,
        ),
    ]
}
