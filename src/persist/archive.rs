use serde::Serialize;
use std::{
    fs, io,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};
use tracing::{error, warn};

/// Moves a file from one path to another.
pub trait FileMover {
    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// Blocks between archive attempts.
pub trait Sleeper {
    fn sleep(&self, dur: Duration);
}

/// Rename, falling back to copy + remove when the rename crosses devices.
pub struct FsMover;

impl FileMover for FsMover {
    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(e) if is_cross_device(&e) => {
                fs::copy(from, to)?;
                fs::remove_file(from)
            }
            Err(e) => Err(e),
        }
    }
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, dur: Duration) {
        thread::sleep(dur);
    }
}

fn is_cross_device(e: &io::Error) -> bool {
    // ERROR_NOT_SAME_DEVICE on windows, EXDEV elsewhere
    let code = if cfg!(windows) { 17 } else { 18 };
    e.raw_os_error() == Some(code)
}

/// True when the error means another process holds the file open.
pub fn is_locked(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::PermissionDenied {
        return true;
    }
    // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
    cfg!(windows) && matches!(e.raw_os_error(), Some(32) | Some(33))
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArchiveOutcome {
    Moved { path: PathBuf, attempts: u32 },
    /// Still locked after every attempt.
    Exhausted { attempts: u32, error: String },
    /// Failed for a reason retrying cannot fix.
    Failed { attempts: u32, error: String },
}

impl ArchiveOutcome {
    pub fn is_moved(&self) -> bool {
        matches!(self, ArchiveOutcome::Moved { .. })
    }
}

enum State {
    Attempting(u32),
    Done(ArchiveOutcome),
}

/// Move `source` into `archive_dir`, retrying while the file is locked.
///
/// A lock error on attempt `n < attempts` sleeps `backoff` and tries again;
/// on the last attempt it ends as `Exhausted`. Any other error ends the loop
/// at once.
pub fn archive_with_retry(
    source: &Path,
    archive_dir: &Path,
    policy: RetryPolicy,
    mover: &dyn FileMover,
    sleeper: &dyn Sleeper,
) -> ArchiveOutcome {
    let target = match source.file_name() {
        Some(name) => archive_dir.join(name),
        None => {
            return ArchiveOutcome::Failed {
                attempts: 0,
                error: format!("{} has no file name", source.display()),
            }
        }
    };
    if let Err(e) = fs::create_dir_all(archive_dir) {
        return ArchiveOutcome::Failed {
            attempts: 0,
            error: format!("creating archive directory {}: {}", archive_dir.display(), e),
        };
    }

    let attempts = policy.attempts.max(1);
    let mut state = State::Attempting(1);
    loop {
        state = match state {
            State::Done(outcome) => return outcome,
            State::Attempting(n) => match mover.move_file(source, &target) {
                Ok(()) => State::Done(ArchiveOutcome::Moved {
                    path: target.clone(),
                    attempts: n,
                }),
                Err(e) if is_locked(&e) && n < attempts => {
                    warn!(file = %source.display(), attempt = n, error = %e, "archive blocked; retrying");
                    sleeper.sleep(policy.backoff);
                    State::Attempting(n + 1)
                }
                Err(e) if is_locked(&e) => {
                    error!(file = %source.display(), attempts = n, error = %e, "archive retries exhausted");
                    State::Done(ArchiveOutcome::Exhausted {
                        attempts: n,
                        error: e.to_string(),
                    })
                }
                Err(e) => {
                    error!(file = %source.display(), error = %e, "archive failed");
                    State::Done(ArchiveOutcome::Failed {
                        attempts: n,
                        error: e.to_string(),
                    })
                }
            },
        };
    }
}
