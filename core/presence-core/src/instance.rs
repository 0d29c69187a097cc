//! Single-instance guard.
//!
//! Only one controller may drive the managed application. The lock is a plain
//! text file holding the decimal PID of its owner:
//!
//! ```text
//! $TMPDIR/presenced.lock
//! 48213
//! ```
//!
//! # Stale Locks
//!
//! A lock whose PID no longer belongs to a running process is stale (the
//! previous controller crashed or was SIGKILLed). Acquiring reclaims it.
//! Unreadable or unparseable lock files are treated the same way.
//!
//! # Release
//!
//! [`InstanceLock`] removes the file when dropped, but only if the file still
//! names this process, so a lock that was reclaimed by a newer instance is
//! left alone.

use crate::error::{PresenceError, Result};
use fs_err as fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const MAX_CREATE_ATTEMPTS: usize = 3;

pub fn is_pid_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let Ok(pid) = i32::try_from(pid) else {
            return false;
        };
        if pid <= 0 {
            return false;
        }
        if unsafe { libc::kill(pid, 0) } == 0 {
            return true;
        }
        // EPERM: the process exists but belongs to another user.
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

/// Reads the PID recorded in a lock file. `None` if missing or unparseable.
pub fn read_lock_pid(path: &Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse().ok()
}

#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    pid: u32,
    released: bool,
}

impl InstanceLock {
    /// Acquires the lock for the current process.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        Self::acquire_for(path, std::process::id())
    }

    /// Acquires the lock on behalf of `pid`.
    ///
    /// The file is created with `O_EXCL`, so a lock is only ever written by
    /// the instance that created it. Stale-lock reclamation runs under an
    /// advisory `flock` on a sidecar file so two starting instances cannot
    /// both remove the same stale lock.
    pub fn acquire_for(path: impl Into<PathBuf>, pid: u32) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| lock_error(&path, err))?;
        }
        let _guard = ReclaimGuard::acquire(&path)?;

        for _ in 0..MAX_CREATE_ATTEMPTS {
            if create_exclusive(&path, pid)? {
                info!(pid, path = %path.display(), "Instance lock acquired");
                return Ok(Self {
                    path,
                    pid,
                    released: false,
                });
            }

            match read_lock_pid(&path) {
                Some(holder) if holder != pid && is_pid_alive(holder) => {
                    return Err(PresenceError::AlreadyRunning { pid: holder });
                }
                Some(holder) if holder != pid => {
                    info!(stale_pid = holder, path = %path.display(), "Reclaiming stale lock");
                }
                Some(_) => {}
                None => {
                    warn!(path = %path.display(), "Lock file unreadable; reclaiming");
                }
            }
            remove_if_present(&path)?;
        }

        Err(lock_error(
            &path,
            std::io::Error::new(ErrorKind::AlreadyExists, "lock file keeps reappearing"),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Removes the lock file if it still names this owner.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if read_lock_pid(&self.path) != Some(self.pid) {
            warn!(path = %self.path.display(), "Lock file no longer ours; leaving it");
            return;
        }
        match remove_if_present(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "Instance lock released"),
            Err(err) => warn!(error = %err, "Failed to remove lock file"),
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        self.release();
    }
}

fn lock_error(path: &Path, source: std::io::Error) -> PresenceError {
    PresenceError::Lock {
        path: path.to_path_buf(),
        source,
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(lock_error(path, err)),
    }
}

/// Creates the lock file holding `pid`. `Ok(false)` if it already exists.
fn create_exclusive(path: &Path, pid: u32) -> Result<bool> {
    let mut file = match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(err) => return Err(lock_error(path, err)),
    };
    if let Err(err) = file.write_all(pid.to_string().as_bytes()) {
        let _ = fs::remove_file(path);
        return Err(lock_error(path, err));
    }
    Ok(true)
}

/// Exclusive `flock` on `<lock>.guard`, held while a lock is created or
/// reclaimed. Dropping the file handle releases it.
struct ReclaimGuard {
    _file: fs::File,
}

impl ReclaimGuard {
    fn acquire(path: &Path) -> Result<Self> {
        let mut guard_name = path.as_os_str().to_owned();
        guard_name.push(".guard");
        let guard_path = PathBuf::from(guard_name);

        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&guard_path)
            .map_err(|err| lock_error(&guard_path, err))?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            if unsafe { libc::flock(file.file().as_raw_fd(), libc::LOCK_EX) } != 0 {
                return Err(lock_error(&guard_path, std::io::Error::last_os_error()));
            }
        }

        Ok(Self { _file: file })
    }
}
