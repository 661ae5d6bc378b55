use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::AuditError;

/// Stderr emitted by `yarn audit --offline` when the registry cannot be
/// reached. Expected whenever the offline flag is used and suppressed from
/// diagnostic logging.
pub(crate) const EXPECTED_OFFLINE_ERROR: &str = "{\"type\":\"error\",\"data\":\"Can't make a request in offline mode (\\\"https://registry.yarnpkg.com/-/npm/v1/security/audits\\\")\"}\n";

/// Captured outputs of one subprocess invocation.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Run a command and capture its full standard output.
///
/// Audit responses routinely exceed in-memory pipe limits, so stdout is
/// redirected to a temporary file and read back after the process exits
/// rather than streamed through a pipe. The file is unlinked on creation and
/// released when this call returns.
pub fn run_captured(
    program: &str,
    args: &[String],
    working_dir: &Path,
) -> Result<CommandOutput, AuditError> {
    debug!("launching: {} {}", program, args.join(" "));

    let stdout_file = tempfile::tempfile().map_err(AuditError::Io)?;
    let mut stdout_reader = stdout_file.try_clone().map_err(AuditError::Io)?;

    let mut child = Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_file))
        .stderr(Stdio::piped())
        .spawn()
        .map_err(AuditError::Io)?;

    // Drain stderr to EOF before waiting so a chatty process cannot block on
    // a full pipe while stdout goes to the file.
    let mut stderr = String::new();
    if let Some(mut pipe) = child.stderr.take() {
        pipe.read_to_string(&mut stderr).map_err(AuditError::Io)?;
    }

    let status = child.wait().map_err(|err| {
        if err.kind() == io::ErrorKind::Interrupted {
            AuditError::Interrupted
        } else {
            AuditError::Io(err)
        }
    })?;

    if !stderr.trim().is_empty() && !is_expected_offline_noise(&stderr) {
        debug!("process stderr: {}", stderr.trim_end());
    }

    let mut stdout = String::new();
    stdout_reader.seek(SeekFrom::Start(0)).map_err(AuditError::Io)?;
    stdout_reader
        .read_to_string(&mut stdout)
        .map_err(AuditError::Io)?;

    Ok(CommandOutput {
        stdout,
        stderr,
        exit_code: status.code(),
    })
}

/// Whether stderr text is exactly the documented offline-mode warning.
pub(crate) fn is_expected_offline_noise(stderr: &str) -> bool {
    stderr == EXPECTED_OFFLINE_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_offline_noise_exact_match_only() {
        assert!(is_expected_offline_noise(EXPECTED_OFFLINE_ERROR));
        // trailing newline is part of the documented string
        assert!(!is_expected_offline_noise(
            EXPECTED_OFFLINE_ERROR.trim_end()
        ));
        assert!(!is_expected_offline_noise("warning: something else\n"));
        assert!(!is_expected_offline_noise(""));
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_stdout_and_exit_code() {
        let output = run_captured(
            "sh",
            &["-c".to_string(), "echo hello; exit 3".to_string()],
            Path::new("."),
        )
        .unwrap();
        assert_eq!(output.stdout, "hello\n");
        assert_eq!(output.exit_code, Some(3));
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_stderr_separately() {
        let output = run_captured(
            "sh",
            &["-c".to_string(), "echo out; echo err >&2".to_string()],
            Path::new("."),
        )
        .unwrap();
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_output_larger_than_pipe_buffers() {
        // 256 KiB, well past the 64k pipe limit the temp file exists to avoid
        let output = run_captured(
            "sh",
            &[
                "-c".to_string(),
                "head -c 262144 /dev/zero | tr '\\0' 'a'".to_string(),
            ],
            Path::new("."),
        )
        .unwrap();
        assert_eq!(output.stdout.len(), 262_144);
        assert!(output.stdout.bytes().all(|b| b == b'a'));
    }

    #[test]
    fn test_missing_executable_is_io_error() {
        let err = run_captured(
            "definitely-not-a-real-binary-1f2e3d",
            &[],
            Path::new("."),
        )
        .unwrap_err();
        assert!(matches!(err, AuditError::Io(_)));
        assert!(err.to_string().contains("can be ignored"));
    }
}
