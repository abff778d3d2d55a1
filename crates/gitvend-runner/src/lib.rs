pub mod error;
pub mod executor;
pub mod step;

pub use error::RunnerError;
pub use executor::{CommandOutput, CommandSpec, ProcessRunner, ShellRunner};
pub use step::{DiagnosticLog, Step, StepError, StepRunner};
