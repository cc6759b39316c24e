//! Helpers for running local child processes with timeouts and bounded output.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Exit code, or -1 when the process was killed by a signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }
}

/// How a child should be run.
#[derive(Debug, Clone)]
pub struct RunOptions<'a> {
    pub timeout: Duration,
    /// Bytes of stdout/stderr kept in memory; the rest is drained and counted.
    pub output_limit_bytes: usize,
    /// When set, stdout lines are echoed to the terminal as `[<label>] <line>`.
    pub echo_label: Option<&'a str>,
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. A timed-out child is killed
/// and reported with `timed_out = true`; callers decide whether that is fatal.
#[instrument(skip_all, fields(timeout_secs = options.timeout.as_secs(), echo = options.echo_label.is_some()))]
pub fn run_command(mut cmd: Command, options: &RunOptions<'_>) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(program = ?cmd.get_program(), "spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, program = ?cmd.get_program(), "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {:?}", cmd.get_program()));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let limit = options.output_limit_bytes;
    let echo = options.echo_label.map(str::to_string);
    let stdout_handle = thread::spawn(move || match echo {
        Some(label) => read_stream_limited_with_echo(stdout, limit, &label),
        None => read_stream_limited(stdout, limit),
    });
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, limit));

    let mut timed_out = false;
    let status = match child
        .wait_timeout(options.timeout)
        .context("wait for command")?
    {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = options.timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Run a command and fail unless it exits zero within the timeout. Returns stdout.
pub fn run_checked(cmd: Command, options: &RunOptions<'_>) -> Result<String> {
    let program = format!("{:?}", cmd.get_program());
    let output = run_command(cmd, options)?;
    if output.timed_out {
        return Err(anyhow!(
            "{program} timed out after {}s",
            options.timeout.as_secs()
        ));
    }
    if !output.status.success() {
        return Err(anyhow!(
            "{program} failed with exit code {}: {}",
            output.code(),
            output.stderr_lossy().trim()
        ));
    }
    Ok(output.stdout_lossy())
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited_with_echo<R: Read>(
    reader: R,
    limit: usize,
    label: &str,
) -> Result<(Vec<u8>, usize)> {
    let mut buf_reader = BufReader::new(reader);
    let mut collected = Vec::new();
    let mut truncated = 0usize;
    let stdout = std::io::stdout();

    loop {
        let mut line = Vec::new();
        let n = buf_reader
            .read_until(b'\n', &mut line)
            .context("read line")?;
        if n == 0 {
            break;
        }

        {
            let mut out = stdout.lock();
            let text = String::from_utf8_lossy(&line);
            if let Err(e) = writeln!(out, "[{label}] {}", text.trim_end_matches('\n')) {
                warn!(err = %e, "failed to echo output line");
            }
        }

        let remaining = limit.saturating_sub(collected.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            collected.extend_from_slice(&line[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((collected, truncated))
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(limit: usize) -> RunOptions<'static> {
        RunOptions {
            timeout: Duration::from_secs(10),
            output_limit_bytes: limit,
            echo_label: None,
        }
    }

    #[test]
    fn read_stream_limited_counts_truncated_bytes() {
        let data = vec![b'x'; 100];
        let (kept, truncated) = read_stream_limited(&data[..], 40).expect("read");
        assert_eq!(kept.len(), 40);
        assert_eq!(truncated, 60);
    }

    #[test]
    fn echo_reader_keeps_lines_within_limit() {
        let data = b"one\ntwo\nthree\n";
        let (kept, truncated) =
            read_stream_limited_with_echo(&data[..], 8, "test").expect("read");
        assert_eq!(kept, b"one\ntwo\n");
        assert_eq!(truncated, 6);
    }

    #[cfg(unix)]
    #[test]
    fn run_checked_returns_stdout() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf hello");
        let out = run_checked(cmd, &options(1000)).expect("run");
        assert_eq!(out, "hello");
    }

    #[cfg(unix)]
    #[test]
    fn run_checked_reports_exit_code_and_stderr() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo boom >&2; exit 3");
        let err = run_checked(cmd, &options(1000)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exit code 3"), "{msg}");
        assert!(msg.contains("boom"), "{msg}");
    }

    #[cfg(unix)]
    #[test]
    fn run_command_kills_on_timeout() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("exec sleep 5");
        let out = run_command(
            cmd,
            &RunOptions {
                timeout: Duration::from_millis(100),
                output_limit_bytes: 100,
                echo_label: None,
            },
        )
        .expect("run");
        assert!(out.timed_out);
    }
}
