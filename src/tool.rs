use crate::error::{PipelineError, Result};
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// 运行外部命令（ffmpeg、yt-dlp）并收集输出，超时后子进程会被杀掉
pub async fn run<I, S>(
    program: &str,
    args: I,
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    debug!("Running {:?}", command.as_std());

    let child = command.spawn().map_err(|e| {
        PipelineError::IoError(std::io::Error::new(
            e.kind(),
            format!("failed to run {}: {}", program, e),
        ))
    })?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => Ok(output?),
        Err(_) => Err(PipelineError::TimeoutError {
            program: program.to_string(),
            timeout,
        }),
    }
}

/// stderr 末尾几行，足够定位 ffmpeg / yt-dlp 的报错
pub fn stderr_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(8);
    lines[start..].join("\n")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collects_output() {
        let output = run("sh", ["-c", "echo out; echo err >&2"], None, Duration::from_secs(10))
            .await
            .unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout), "out\n");
        assert_eq!(stderr_tail(&output), "err");
    }

    #[tokio::test]
    async fn times_out() {
        let err = run("sh", ["-c", "sleep 5"], None, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::TimeoutError { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_an_io_error() {
        let err = run(
            "definitely-not-a-real-program",
            Vec::<String>::new(),
            None,
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::IoError(_)));
    }
}
