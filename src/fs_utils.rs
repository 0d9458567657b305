//! Cross-platform filesystem helpers
//!
//! - `atomic_rename`: file replacement that also works on Windows
//! - `rotate_file`: size-triggered rename keeping one previous generation

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Cross-platform atomic rename that handles Windows file replacement.
///
/// On Unix, `fs::rename` atomically replaces the target if it exists.
/// On Windows, `fs::rename` fails if the target exists, so the target is
/// deleted first.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use copilot_daemon::fs_utils::atomic_rename;
///
/// std::fs::write("config.tmp", "port = 4141")?;
/// atomic_rename(Path::new("config.tmp"), Path::new("config.toml"))?;
/// # Ok::<(), std::io::Error>(())
/// ```
pub fn atomic_rename(src: &Path, dst: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        if dst.exists() {
            fs::remove_file(dst)?;
        }
    }
    fs::rename(src, dst)
}

/// Path of the single previous generation kept for `path` (`<file>.prev`)
pub fn previous_generation(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".prev");
    path.with_file_name(name)
}

/// Rename `path` to its previous generation once it reaches `max_size` bytes.
///
/// Any older `.prev` file is replaced. Returns `Ok(true)` when the file was
/// rotated and `Ok(false)` when it is missing or still below the limit.
pub fn rotate_file(path: &Path, max_size: u64) -> io::Result<bool> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    if metadata.len() < max_size {
        return Ok(false);
    }

    atomic_rename(path, &previous_generation(path))?;
    Ok(true)
}
