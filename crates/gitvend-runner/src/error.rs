use std::process::ExitStatus;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to spawn `{command}`")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("command failed ({status}): {command}\n{stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stdout: String,
        stderr: String,
    },

    #[error("command cancelled: {command}")]
    Cancelled { command: String },
}

impl RunnerError {
    pub fn failed(command: &str, status: ExitStatus, stdout: String, stderr: String) -> Self {
        let status = match status.code() {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_owned(),
        };
        Self::CommandFailed {
            command: command.to_owned(),
            status,
            stdout,
            stderr,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
