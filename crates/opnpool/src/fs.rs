use std::io;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

/// Replace the file at `path` with `contents` in one rename.
///
/// The new contents go to a temporary file in the same directory first, so
/// the rename never crosses a filesystem. Readers see either the old file
/// or the new one, never a partial write.
pub fn replace_atomically(path: &Path, contents: &str) -> io::Result<()> {
    replace_atomically_with(path, contents, |_| Ok(()))
}

/// Like [`replace_atomically`], running `before_persist` on the fully
/// written temporary file just before it is renamed into place. If it
/// fails, the temporary file is removed and `path` is left untouched.
pub(crate) fn replace_atomically_with<F>(
    path: &Path,
    contents: &str,
    before_persist: F,
) -> io::Result<()>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;

    // NamedTempFile is created 0600; keep the mode of the file being replaced
    if let Ok(metadata) = std::fs::metadata(path) {
        std::fs::set_permissions(tmp.path(), metadata.permissions())?;
    }

    before_persist(tmp.path())?;

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, "old").unwrap();

        replace_atomically(&path, "new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fresh.ini");

        replace_atomically(&path, "[env]\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[env]\n");
    }

    #[test]
    fn test_temp_file_lives_next_to_target() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");

        replace_atomically_with(&path, "x", |tmp| {
            assert_eq!(tmp.parent(), Some(dir.path()));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_failure_before_rename_keeps_original() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, "old").unwrap();

        let result = replace_atomically_with(&path, "new", |_| {
            Err(io::Error::other("interrupted"))
        });

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "old");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("opnpool_ids.h");
        fs::write(&path, "old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        replace_atomically(&path, "new").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
