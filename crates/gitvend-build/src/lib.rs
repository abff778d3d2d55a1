//! Build pipeline for gitvend.
//!
//! # Pipeline
//!
//! ```text
//! gitvend build
//!   1. Resolve    ── GET /repos/{owner}/{name}/tags → first stable tag (or --tag)
//!   2. Fetch      ── archive/refs/tags/{tag}.tar.gz → work/
//!   3. Host       ── apt-get update && apt-get install (skip with --skip-host-deps)
//!   4. Extract    ── tar --sort=name --mtime=@{epoch} ...
//!   5. Configure  ── make configure && ./configure --prefix=/usr ...
//!   6. Compile    ── make -jN all && make install DESTDIR=work/staging
//!   7. Finish     ── helper, libraries, timestamps, strip, prune, launcher
//!   8. Verify     ── ./git --version && ./git clone --depth 1 <url>
//!   9. Publish    ── staging/ → --output
//! ```
//!
//! # Reproducibility
//!
//! Every process from extraction on runs with the same [`gitvend_core::BuildEnv`]
//! (`SOURCE_DATE_EPOCH`, `TZ`, locale, and path-scrubbing flags). Archive
//! members, bundle entries, and the published copy all carry the fixed epoch
//! as their timestamps, and every directory walk is sorted by name.
//!
//! # Failure
//!
//! A failing stage halts the run. The staging directory is removed and the
//! error comes back as a [`PipelineError`] naming the [`Stage`] and carrying an
//! [`ErrorKind`].

pub mod error;
pub mod finish;
pub mod pipeline;
pub mod publish;
pub mod stages;
pub mod verify;
pub mod workdir;

pub use error::{ErrorKind, PipelineError, Stage, StageError};
pub use finish::{Finisher, HelperOrigin, StagedBundle};
pub use pipeline::{BuildOutcome, Pipeline, PipelineOptions, default_output_dir};
pub use publish::publish;
pub use verify::{Verifier, VerifyReport, reports_version};
pub use workdir::WorkDir;
