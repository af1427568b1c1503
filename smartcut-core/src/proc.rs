//! Shared external-process invocation. The audio trimmer's encode step
//! (4.I) and the muxer driver (4.K) both shell out to a helper binary;
//! this is the one code path that spawns a child process and waits on it,
//! so the 10-minute ceiling and stderr-capture behavior are implemented
//! once.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::CutError;

pub struct ProcOutput {
    pub status_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcOutput {
    pub fn stderr_tail(&self, max_bytes: usize) -> String {
        let start = self.stderr.len().saturating_sub(max_bytes);
        String::from_utf8_lossy(&self.stderr[start..]).into_owned()
    }
}

/// Spawns `program` with `args`, capturing stdout/stderr fully, and
/// killing the child if it's still running after `timeout`. There is no
/// portable async process-timeout in `std::process`, so a dedicated
/// watchdog thread races a polling `try_wait` against the deadline while
/// the calling thread blocks on the reader threads.
pub fn run(program: &str, args: &[String], timeout: Duration) -> Result<ProcOutput, CutError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CutError::io(PathBuf::from(program), e))?;

    let mut stdout_pipe = child.stdout.take().expect("stdout was piped at spawn");
    let mut stderr_pipe = child.stderr.take().expect("stderr was piped at spawn");

    let stdout_thread = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf);
        buf
    });
    let stderr_thread = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf);
        buf
    });

    let deadline = Instant::now() + timeout;
    let watchdog = std::thread::spawn(move || -> std::io::Result<(i32, bool)> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok((status.code().unwrap_or(-1), false));
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let status = child.wait()?;
                return Ok((status.code().unwrap_or(-1), true));
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    });

    let (status_code, timed_out) =
        watchdog.join().expect("watchdog thread panicked").map_err(|e| CutError::io(PathBuf::from(program), e))?;

    let stdout = stdout_thread.join().expect("stdout reader thread panicked");
    let stderr = stderr_thread.join().expect("stderr reader thread panicked");

    if timed_out {
        return Err(CutError::MuxTimeout { timeout });
    }

    Ok(ProcOutput { status_code, stdout, stderr })
}

/// Interprets a muxer's exit status per spec.md 4.K: 0 success, 1 success
/// with warnings (logged, not fatal), anything else `MuxFailed`.
pub fn check_mux_status(output: &ProcOutput) -> Result<(), CutError> {
    match output.status_code {
        0 => Ok(()),
        1 => {
            log::warn!("muxer exited with warnings: {}", output.stderr_tail(2048));
            Ok(())
        }
        code => Err(CutError::MuxFailed { code, stderr_tail: output.stderr_tail(2048) }),
    }
}

pub fn temp_path(workspace: &Path, basename: &str, purpose: &str, ext: &str) -> PathBuf {
    workspace.join(format!(".{}_{}.{}", basename, purpose, ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_succeeds_and_captures_stdout() {
        let out = run("echo", &["hello".to_string()], Duration::from_secs(5)).unwrap();
        assert_eq!(out.status_code, 0);
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
    }

    #[test]
    fn exit_code_one_is_success_with_warnings() {
        let out = run("sh", &["-c".to_string(), "exit 1".to_string()], Duration::from_secs(5)).unwrap();
        assert!(check_mux_status(&out).is_ok());
    }

    #[test]
    fn nonzero_exit_other_than_one_is_mux_failed() {
        let out = run("sh", &["-c".to_string(), "exit 3".to_string()], Duration::from_secs(5)).unwrap();
        let err = check_mux_status(&out).unwrap_err();
        assert!(matches!(err, CutError::MuxFailed { code: 3, .. }));
    }

    #[test]
    fn temp_path_is_dot_prefixed_and_namespaced() {
        let p = temp_path(Path::new("/tmp"), "movie", "audio0", "wav");
        assert_eq!(p, Path::new("/tmp/.movie_audio0.wav"));
    }
}
