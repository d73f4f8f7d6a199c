//! File-system resource helpers.
use anyhow::{Context as _, Result};
use std::io::Write as _;
use std::path::{Path, PathBuf};

/// Infix separating a file name from its backup timestamp.
pub const BACKUP_INFIX: &str = ".provision-bak.";

/// Ensure the parent directory of `path` exists, creating it (and any
/// ancestors) if necessary.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create parent: {}", parent.display()))?;
    }
    Ok(())
}

/// Remove an existing file or symlink at `path`, including broken symlinks.
///
/// Does nothing if `path` does not exist.
///
/// # Errors
///
/// Returns an error if the path exists but cannot be removed.
pub fn remove_existing(path: &Path) -> Result<()> {
    if path.symlink_metadata().is_ok() {
        std::fs::remove_file(path)
            .with_context(|| format!("remove existing: {}", path.display()))?;
    }
    Ok(())
}

/// Read `path` as UTF-8, returning `None` when it does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
    }
}

/// Atomically replace `dest` with `contents`.
///
/// The new contents go to a temporary file in the destination directory,
/// which is flushed to disk and renamed over `dest`.  An existing `dest` is
/// first copied to `<name>.provision-bak.<YYYYmmddHHMMSS>` and any older
/// backups of the same file are removed.  If anything fails before the
/// rename, `dest` is left untouched.
///
/// Returns the path of the backup, if one was made.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be created, written,
/// synced, or persisted, or if the backup cannot be written.
pub fn write_atomic(dest: &Path, contents: &str) -> Result<Option<PathBuf>> {
    write_atomic_with_mode(dest, contents, None)
}

/// [`write_atomic`] with an explicit Unix mode for the new file.
///
/// With `mode = None` an existing file keeps its mode and a new file gets
/// `0644`.
///
/// # Errors
///
/// See [`write_atomic`].
pub fn write_atomic_with_mode(
    dest: &Path,
    contents: &str,
    mode: Option<u32>,
) -> Result<Option<PathBuf>> {
    use std::os::unix::fs::PermissionsExt as _;

    ensure_parent_dir(dest)?;
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = tempfile::Builder::new()
        .prefix(".provision-")
        .tempfile_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    tmp.write_all(contents.as_bytes())
        .with_context(|| format!("write temp file for {}", dest.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("sync temp file for {}", dest.display()))?;

    let permissions = match (mode, std::fs::metadata(dest)) {
        (Some(mode), _) => std::fs::Permissions::from_mode(mode),
        (None, Ok(meta)) => meta.permissions(),
        (None, Err(_)) => std::fs::Permissions::from_mode(0o644),
    };
    std::fs::set_permissions(tmp.path(), permissions)
        .with_context(|| format!("set permissions for {}", dest.display()))?;

    let backup = backup_existing(dest)?;

    tmp.persist(dest)
        .map_err(|e| e.error)
        .with_context(|| format!("rename into {}", dest.display()))?;
    Ok(backup)
}

/// Copy `path` to a fresh timestamped backup and prune older ones.
///
/// Returns `None` when `path` is not a regular file.
///
/// # Errors
///
/// Returns an error if an old backup cannot be removed or the copy fails.
pub fn backup_existing(path: &Path) -> Result<Option<PathBuf>> {
    if !path.is_file() {
        return Ok(None);
    }
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Ok(None);
    };
    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
    let backup = path.with_file_name(format!("{name}{BACKUP_INFIX}{stamp}"));

    for old in list_backups(path)? {
        if old != backup {
            std::fs::remove_file(&old)
                .with_context(|| format!("remove old backup {}", old.display()))?;
        }
    }
    std::fs::copy(path, &backup)
        .with_context(|| format!("backup {} to {}", path.display(), backup.display()))?;
    Ok(Some(backup))
}

/// All backups of `path` currently on disk, sorted oldest first.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be read.
pub fn list_backups(path: &Path) -> Result<Vec<PathBuf>> {
    let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
        return Ok(Vec::new());
    };
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    let prefix = format!("{}{BACKUP_INFIX}", name.to_string_lossy());
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("read directory {}", dir.display()))?
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
        .map(|e| e.path())
        .collect();
    found.sort();
    Ok(found)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // ensure_parent_dir
    // -----------------------------------------------------------------------

    #[test]
    fn ensure_parent_dir_creates_missing_parents() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("file.txt");
        ensure_parent_dir(&nested).unwrap();
        assert!(dir.path().join("a").join("b").exists());
    }

    // -----------------------------------------------------------------------
    // remove_existing
    // -----------------------------------------------------------------------

    #[test]
    fn remove_existing_noop_when_path_absent() {
        let dir = tempfile::tempdir().unwrap();
        remove_existing(&dir.path().join("nonexistent")).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn remove_existing_removes_broken_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink("/nonexistent/target", &link).unwrap();
        remove_existing(&link).unwrap();
        assert!(link.symlink_metadata().is_err());
    }

    // -----------------------------------------------------------------------
    // write_atomic
    // -----------------------------------------------------------------------

    #[test]
    fn write_atomic_creates_file_without_backup() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("conf").join("gitconfig");
        let backup = write_atomic(&dest, "[user]\n").unwrap();
        assert!(backup.is_none());
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "[user]\n");
    }

    #[test]
    fn write_atomic_keeps_single_backup() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("gitconfig");
        std::fs::write(&dest, "v1").unwrap();
        // Plant a stale backup from an earlier run.
        std::fs::write(dir.path().join("gitconfig.provision-bak.20000101000000"), "v0").unwrap();

        let backup = write_atomic(&dest, "v2").unwrap().expect("backup made");
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "v1");
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "v2");
        assert_eq!(list_backups(&dest).unwrap(), vec![backup]);
    }

    #[test]
    fn write_atomic_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file");
        write_atomic(&dest, "a").unwrap();
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["file"]);
    }

    #[test]
    fn write_atomic_failure_leaves_destination_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be replaced by a file rename.
        let dest = dir.path().join("occupied");
        std::fs::create_dir(&dest).unwrap();
        std::fs::write(dest.join("inner"), "keep").unwrap();
        assert!(write_atomic(&dest, "new").is_err());
        assert_eq!(std::fs::read_to_string(dest.join("inner")).unwrap(), "keep");
    }

    #[cfg(unix)]
    #[test]
    fn write_atomic_preserves_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("config");
        std::fs::write(&dest, "old").unwrap();
        std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(0o600)).unwrap();
        write_atomic(&dest, "new").unwrap();
        let mode = std::fs::metadata(&dest).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn write_atomic_new_file_defaults_and_explicit_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain");
        let secret = dir.path().join("secret");
        write_atomic(&plain, "a").unwrap();
        write_atomic_with_mode(&secret, "b", Some(0o600)).unwrap();
        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&plain), 0o644);
        assert_eq!(mode(&secret), 0o600);
    }

    #[test]
    fn read_optional_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_optional(&dir.path().join("nope")).unwrap().is_none());
    }
}
