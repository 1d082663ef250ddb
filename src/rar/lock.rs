use std::fs::{File, OpenOptions};
use std::thread;
use std::time::Instant;

use fs2::FileExt;

use crate::rar::io_csv::CsvSheet;
use crate::rar::*;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Exclusive access to the response sheet, held as an advisory lock on a lock file.
///
/// The lock file itself stays on disk. The lock is released when the value is dropped,
/// and by the operating system when the holding process dies.
#[derive(Debug)]
pub struct AppendLock {
    path: PathBuf,
    file: File,
}

impl AppendLock {
    /// Waits until the lock can be taken, for at most `timeout`.
    pub fn acquire(path: &Path, timeout: Duration) -> RarResult<AppendLock> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .context(LockIoSnafu {
                path: path.display().to_string(),
            })?;
        let contended = fs2::lock_contended_error().kind();
        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!("acquire: {:?} after {:?}", path, start.elapsed());
                    return Ok(AppendLock {
                        path: path.to_path_buf(),
                        file,
                    });
                }
                Err(e) if e.kind() == contended => {
                    let elapsed = start.elapsed();
                    if elapsed >= timeout {
                        warn!("acquire: gave up on {:?} after {:?}", path, elapsed);
                        return LockTimeoutSnafu {
                            seconds: timeout.as_secs(),
                        }
                        .fail();
                    }
                    thread::sleep(POLL_INTERVAL.min(timeout - elapsed));
                }
                Err(e) => {
                    return Err(e).context(LockIoSnafu {
                        path: path.display().to_string(),
                    })
                }
            }
        }
    }

    /// The lock guarding a given sheet, next to it.
    pub fn for_sheet(sheet: &CsvSheet, timeout: Duration) -> RarResult<AppendLock> {
        let mut p = sheet.path().to_path_buf().into_os_string();
        p.push(".lock");
        AppendLock::acquire(Path::new(&p), timeout)
    }
}

impl Drop for AppendLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!("AppendLock: could not release {:?}: {}", self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn second_holder_times_out() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("sheet.lock");
        let first = AppendLock::acquire(&path, Duration::from_secs(1)).expect("free lock");
        let second = AppendLock::acquire(&path, Duration::from_millis(120));
        assert!(matches!(second, Err(RarError::LockTimeout { .. })));
        drop(first);
        assert!(AppendLock::acquire(&path, Duration::from_millis(10)).is_ok());
    }

    #[test]
    fn leftover_lock_file_does_not_block() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("sheet.lock");
        fs::write(&path, "999999").expect("stale lock file");
        let lock = AppendLock::acquire(&path, Duration::from_millis(200));
        assert!(lock.is_ok());
    }

    #[test]
    fn holders_never_overlap() {
        let dir = TempDir::new().expect("tempdir");
        let path = Arc::new(dir.path().join("sheet.lock"));
        let inside = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = Arc::clone(&path);
                let inside = Arc::clone(&inside);
                thread::spawn(move || {
                    let _lock =
                        AppendLock::acquire(&path, Duration::from_secs(10)).expect("lock");
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                    thread::sleep(Duration::from_millis(20));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.join().expect("no overlap");
        }
    }

    #[test]
    fn missing_directory_is_not_a_timeout() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("missing").join("sheet.lock");
        let res = AppendLock::acquire(&path, Duration::from_secs(5));
        assert!(matches!(res, Err(RarError::LockIo { .. })));
    }
}
