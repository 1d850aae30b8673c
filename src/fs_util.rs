use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::Builder;

use crate::error::KiraError;

/// Writes `bytes` to a temp file next to `dest` and renames it into place, so a
/// reader never observes a half-written file under the final name.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<(), KiraError> {
    let mut reader = bytes;
    write_atomic_from_reader(dest, &mut reader).map(|_| ())
}

/// Streams `reader` into a temp file next to `dest`, then persists it.
/// Returns the number of bytes written.
pub fn write_atomic_from_reader<R: Read + ?Sized>(
    dest: &Path,
    reader: &mut R,
) -> Result<u64, KiraError> {
    let parent = dest
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|err| KiraError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix(".kira-rg-write")
        .tempfile_in(parent)
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    let written =
        io::copy(reader, &mut temp).map_err(|err| KiraError::Filesystem(err.to_string()))?;
    temp.flush()
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    temp.persist(dest)
        .map_err(|err| KiraError::Filesystem(format!("persist {}: {}", dest.display(), err)))?;
    Ok(written)
}

pub fn require_dir(path: &Path) -> Result<(), KiraError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(KiraError::DestinationInvalid(path.to_path_buf()))
    }
}

pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.exists().then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}

#[cfg(unix)]
pub fn mark_executable(path: &Path) -> Result<(), KiraError> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)
        .map_err(|err| KiraError::Filesystem(err.to_string()))?
        .permissions();
    perms.set_mode(perms.mode() | 0o755);
    fs::set_permissions(path, perms).map_err(|err| KiraError::Filesystem(err.to_string()))
}

#[cfg(not(unix))]
pub fn mark_executable(_path: &Path) -> Result<(), KiraError> {
    Ok(())
}
