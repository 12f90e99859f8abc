//! Bounded child-process execution shared by the agent and acceptance checks.
//!
//! Both pipes are drained on their own threads, and the prompt is fed from a
//! third, so a child that writes a lot before it finishes reading stdin
//! cannot wedge us. Only the first `output_bytes` of each stream are kept.

use std::io::{ErrorKind, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

const READ_CHUNK: usize = 8 * 1024;

/// How long a process may run and how much of its output is kept.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub timeout: Duration,
    pub output_bytes: usize,
}

/// One captured stream: the kept prefix plus a count of discarded bytes.
#[derive(Debug, Default)]
pub struct Captured {
    pub bytes: Vec<u8>,
    pub dropped: usize,
}

impl Captured {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Captured,
    pub stderr: Captured,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Stdout followed by stderr, with a note wherever bytes were dropped.
    pub fn transcript(&self) -> String {
        let mut text = self.stdout.text();
        append_dropped_note(&mut text, "stdout", self.stdout.dropped);
        if !self.stderr.bytes.is_empty() || self.stderr.dropped > 0 {
            text.push_str("\n--- stderr ---\n");
            text.push_str(&self.stderr.text());
            append_dropped_note(&mut text, "stderr", self.stderr.dropped);
        }
        text
    }
}

fn append_dropped_note(text: &mut String, stream: &str, dropped: usize) {
    if dropped > 0 {
        text.push_str(&format!("\n[{stream}: {dropped} more bytes not captured]\n"));
    }
}

/// Spawn `cmd`, optionally feed `input` on stdin, and wait up to
/// `limits.timeout`. A child still running at the deadline is killed and
/// reported with `timed_out` set.
#[instrument(skip_all, fields(timeout_secs = limits.timeout.as_secs()))]
pub fn run_bounded(
    mut cmd: Command,
    input: Option<&[u8]>,
    limits: Limits,
) -> Result<ProcessOutput> {
    cmd.stdin(if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    let mut child = cmd.spawn().context("spawn command")?;
    debug!(pid = child.id(), "child started");

    let stdout = capture(child.stdout.take(), "stdout", limits.output_bytes)?;
    let stderr = capture(child.stderr.take(), "stderr", limits.output_bytes)?;
    let feeder = match input {
        Some(bytes) => Some(feed_stdin(&mut child, bytes.to_vec())?),
        None => None,
    };

    let (status, timed_out) = wait_or_kill(&mut child, limits.timeout)?;

    if let Some(feeder) = feeder {
        join(feeder, "stdin")?;
    }
    let stdout = join(stdout, "stdout")?;
    let stderr = join(stderr, "stderr")?;
    if stdout.dropped > 0 || stderr.dropped > 0 {
        warn!(
            stdout_dropped = stdout.dropped,
            stderr_dropped = stderr.dropped,
            limit = limits.output_bytes,
            "process output exceeded capture limit"
        );
    }
    debug!(exit_code = ?status.code(), timed_out, "child finished");

    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

fn wait_or_kill(child: &mut Child, timeout: Duration) -> Result<(ExitStatus, bool)> {
    if let Some(status) = child.wait_timeout(timeout).context("wait for child")? {
        return Ok((status, false));
    }
    warn!(timeout_secs = timeout.as_secs(), "child exceeded timeout, killing");
    child.kill().context("kill timed-out child")?;
    let status = child.wait().context("reap killed child")?;
    Ok((status, true))
}

fn capture<R>(stream: Option<R>, name: &str, limit: usize) -> Result<JoinHandle<Result<Captured>>>
where
    R: Read + Send + 'static,
{
    let stream = stream.ok_or_else(|| anyhow!("{name} was not piped"))?;
    Ok(thread::spawn(move || read_bounded(stream, limit)))
}

/// The child may exit without reading all of its input; a broken pipe then is
/// not an error.
fn feed_stdin(child: &mut Child, input: Vec<u8>) -> Result<JoinHandle<Result<()>>> {
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("stdin was not piped"))?;
    Ok(thread::spawn(move || {
        match stdin.write_all(&input) {
            Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                debug!("child closed stdin before reading all input");
            }
            other => other.context("write child stdin")?,
        }
        Ok(())
    }))
}

fn join<T>(handle: JoinHandle<Result<T>>, name: &str) -> Result<T> {
    handle
        .join()
        .map_err(|_| anyhow!("{name} thread panicked"))?
        .with_context(|| format!("pump {name}"))
}

fn read_bounded<R: Read>(mut reader: R, limit: usize) -> Result<Captured> {
    let mut captured = Captured::default();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).context("read child output")?;
        if n == 0 {
            return Ok(captured);
        }
        let room = limit.saturating_sub(captured.bytes.len()).min(n);
        captured.bytes.extend_from_slice(&chunk[..room]);
        captured.dropped += n - room;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(timeout: Duration) -> Limits {
        Limits {
            timeout,
            output_bytes: 1024,
        }
    }

    #[test]
    fn read_bounded_keeps_prefix_and_counts_the_rest() {
        let data = vec![b'x'; 100];
        let captured = read_bounded(&data[..], 30).expect("read");
        assert_eq!(captured.bytes.len(), 30);
        assert_eq!(captured.dropped, 70);
    }

    #[cfg(unix)]
    #[test]
    fn transcript_marks_dropped_bytes_and_stderr() {
        let output = ProcessOutput {
            status: success_status(),
            stdout: Captured {
                bytes: b"out".to_vec(),
                dropped: 5,
            },
            stderr: Captured {
                bytes: b"err".to_vec(),
                dropped: 0,
            },
            timed_out: false,
        };
        let text = output.transcript();
        assert!(text.starts_with("out"));
        assert!(text.contains("[stdout: 5 more bytes not captured]"));
        assert!(text.ends_with("--- stderr ---\nerr"));
    }

    #[cfg(unix)]
    fn success_status() -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(0)
    }

    #[cfg(unix)]
    #[test]
    fn feeds_stdin_to_child() {
        let output = run_bounded(
            Command::new("cat"),
            Some(b"hello"),
            limits(Duration::from_secs(5)),
        )
        .expect("run cat");
        assert!(output.succeeded());
        assert_eq!(output.stdout.bytes, b"hello");
    }

    #[cfg(unix)]
    #[test]
    fn large_input_and_output_do_not_deadlock() {
        let input = vec![b'a'; 512 * 1024];
        let output = run_bounded(
            Command::new("cat"),
            Some(&input),
            limits(Duration::from_secs(10)),
        )
        .expect("run cat");
        assert!(output.succeeded());
        assert_eq!(output.stdout.bytes.len(), 1024);
        assert_eq!(output.stdout.dropped, input.len() - 1024);
    }

    #[cfg(unix)]
    #[test]
    fn kills_child_at_deadline() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let output = run_bounded(cmd, None, limits(Duration::from_millis(100))).expect("run");
        assert!(output.timed_out);
        assert!(!output.succeeded());
    }
}
