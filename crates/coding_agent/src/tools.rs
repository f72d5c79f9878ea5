use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use agent_provider::ToolCallRef;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

pub const SHELL_TOOL_NAME: &str = "shell";
const DEFAULT_MAX_OUTPUT_BYTES: usize = 100 * 1024;

/// The single host tool: runs one command line through `bash -lc`.
///
/// Output is stdout followed by stderr as one string. There is no separate
/// error channel; failures are reported inside the text, prefixed `[timeout]`
/// or `[error]`.
#[derive(Debug, Clone)]
pub struct ShellTool {
    timeout: Option<Duration>,
    max_output_bytes: usize,
}

impl ShellTool {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    /// Executes a model-requested tool call and returns the text handed back to the model.
    pub fn execute(&self, call: ToolCallRef<'_>) -> String {
        if call.tool_name != SHELL_TOOL_NAME {
            warn!(tool = call.tool_name, "model requested an unknown tool");
            return format!("[error] Unknown tool '{}'", call.tool_name);
        }

        match call.args.command() {
            Some(command) => self.run(command),
            None => "[error] shell tool requires a string `command` argument".to_string(),
        }
    }

    pub fn run(&self, command: &str) -> String {
        debug!(command, "running shell command");
        let output = run_shell_command(command, self.timeout);
        truncate_to_byte_limit(output, self.max_output_bytes)
    }
}

/// Runs `command` with `bash -lc` and returns combined stdout+stderr.
///
/// Both pipes are drained on reader threads while the command runs, so output
/// larger than the pipe buffer never stalls the child.
pub fn run_shell_command(command: &str, timeout: Option<Duration>) -> String {
    let mut child = match Command::new("bash")
        .arg("-lc")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(error) => return format!("[error] Failed to launch bash command: {error}"),
    };

    let stdout = PipeReader::spawn(child.stdout.take());
    let stderr = PipeReader::spawn(child.stderr.take());

    let finished = match timeout {
        Some(limit) => child.wait_timeout(limit).map(|status| status.is_some()),
        None => child.wait().map(|_| true),
    };

    match finished {
        Ok(true) => combined_output(stdout, stderr, None),
        Ok(false) => {
            let _ = child.kill();
            let _ = child.wait();
            let seconds = timeout.map(|limit| limit.as_secs()).unwrap_or_default();
            format!(
                "[timeout] Command exceeded {seconds} seconds. Partial output: {}",
                combined_output(stdout, stderr, Some(KILLED_OUTPUT_GRACE))
            )
        }
        Err(error) => {
            let _ = child.kill();
            format!("[error] Failed waiting for bash command: {error}")
        }
    }
}

/// How long to keep reading after a kill; background jobs may hold the pipes open.
const KILLED_OUTPUT_GRACE: Duration = Duration::from_millis(500);

fn combined_output(stdout: PipeReader, stderr: PipeReader, grace: Option<Duration>) -> String {
    let stdout = stdout.collect(grace);
    let stderr = stderr.collect(grace);
    format!(
        "{}{}",
        String::from_utf8_lossy(&stdout),
        String::from_utf8_lossy(&stderr)
    )
}

/// Background reader that accumulates everything written to one child pipe.
struct PipeReader {
    buffer: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

impl PipeReader {
    fn spawn(pipe: Option<impl Read + Send + 'static>) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done) = mpsc::channel();

        let Some(mut pipe) = pipe else {
            let _ = done_tx.send(());
            return Self { buffer, done };
        };

        let sink = Arc::clone(&buffer);
        thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(read) => lock_unpoisoned(&sink).extend_from_slice(&chunk[..read]),
                }
            }
            let _ = done_tx.send(());
        });

        Self { buffer, done }
    }

    /// Waits for end of stream (at most `grace`, when given) and takes what was read.
    fn collect(self, grace: Option<Duration>) -> Vec<u8> {
        match grace {
            Some(grace) => {
                let _ = self.done.recv_timeout(grace);
            }
            None => {
                let _ = self.done.recv();
            }
        }
        std::mem::take(&mut *lock_unpoisoned(&self.buffer))
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn truncate_to_byte_limit(content: String, max_bytes: usize) -> String {
    if content.len() <= max_bytes {
        return content;
    }

    let mut cutoff = max_bytes.min(content.len());
    while cutoff > 0 && !content.is_char_boundary(cutoff) {
        cutoff -= 1;
    }

    let mut truncated = content[..cutoff].to_string();
    truncated.push_str("\n[truncated]");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let truncated = truncate_to_byte_limit("héllo".to_string(), 2);
        assert_eq!(truncated, "h\n[truncated]");
    }

    #[test]
    fn short_output_is_untouched() {
        assert_eq!(truncate_to_byte_limit("ok".to_string(), 10), "ok");
    }
}
