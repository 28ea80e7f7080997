//! Running external tools with captured output.

use std::ffi::OsStr;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::DriverError;

/// Output of a successful command
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
}

/// Run `program args...`, optionally feeding `stdin`, and fail on non-zero exit.
///
/// When `stdin` is `None` the child inherits the terminal so tools that prompt
/// for a passphrase can do so.
pub async fn run<I, S>(
    program: &str,
    args: I,
    stdin: Option<&str>,
    description: &str,
) -> Result<CommandOutput, DriverError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<_> = args
        .into_iter()
        .map(|a| a.as_ref().to_os_string())
        .collect();

    info!(program, "Executing: {}", description);
    debug!(
        program,
        args = ?args,
        "Command line"
    );

    let mut cmd = Command::new(program);
    cmd.args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });

    let mut child = cmd.spawn().map_err(|e| DriverError::Spawn {
        program: program.to_string(),
        source: e,
    })?;

    if let Some(input) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            // hdiutil -stdinpass reads up to a NUL or EOF
            pipe.write_all(input.as_bytes())
                .await
                .map_err(DriverError::Io)?;
            drop(pipe);
        }
    }

    let output = child.wait_with_output().await.map_err(DriverError::Io)?;
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !output.status.success() {
        error!(
            program,
            code = ?output.status.code(),
            stderr = %stderr,
            "{} failed",
            description
        );
        return Err(DriverError::CommandFailed {
            program: program.to_string(),
            code: output.status.code(),
            stderr,
        });
    }

    debug!(program, stdout = %stdout, "Command output");
    Ok(CommandOutput { stdout })
}

/// Blocking variant for release paths that cannot await (e.g. `Drop`).
pub fn run_blocking<I, S>(program: &str, args: I, description: &str) -> Result<(), DriverError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    info!(program, "Executing: {}", description);

    let output = std::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| DriverError::Spawn {
            program: program.to_string(),
            source: e,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        error!(program, code = ?output.status.code(), stderr = %stderr, "{} failed", description);
        return Err(DriverError::CommandFailed {
            program: program.to_string(),
            code: output.status.code(),
            stderr,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let out = run("sh", ["-c", "echo hello"], None, "echo").await.unwrap();
        assert_eq!(out.stdout, "hello");
    }

    #[tokio::test]
    async fn test_run_feeds_stdin() {
        let out = run("cat", Vec::<&str>::new(), Some("secret"), "cat")
            .await
            .unwrap();
        assert_eq!(out.stdout, "secret");
    }

    #[tokio::test]
    async fn test_run_reports_failure_with_stderr() {
        let err = run("sh", ["-c", "echo oops >&2; exit 3"], None, "failing command")
            .await
            .unwrap_err();

        match err {
            DriverError::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let err = run("definitely-not-a-real-program-xyz", ["--help"], None, "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Spawn { .. }));
    }

    #[test]
    fn test_run_blocking_failure() {
        let err = run_blocking("sh", ["-c", "exit 1"], "blocking fail").unwrap_err();
        assert!(matches!(err, DriverError::CommandFailed { code: Some(1), .. }));
    }
}
