use std::fs::{self, Metadata, ReadDir};
use std::path::{Path, PathBuf};

use tracing::warn;

/// Lazy depth-first walk over the regular files below a directory.
///
/// Directories are opened only when the walk reaches them. Symlinks are not
/// followed. Unreadable directories and entries are logged and skipped so a
/// single permission problem never hides the rest of the tree.
pub(crate) struct DirWalker {
    stack: Vec<ReadDir>,
    skip_dir: Option<PathBuf>,
}

impl DirWalker {
    /// Start walking `root`. When `skip_dir` is set, that directory (and
    /// everything below it) is not visited.
    pub(crate) fn new(root: &Path, skip_dir: Option<PathBuf>) -> Self {
        let stack = match fs::read_dir(root) {
            Ok(entries) => vec![entries],
            Err(e) => {
                warn!(path = %root.display(), error = %e, "cannot read source directory");
                Vec::new()
            }
        };
        Self { stack, skip_dir }
    }
}

impl Iterator for DirWalker {
    type Item = (PathBuf, Metadata);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entries = self.stack.last_mut()?;
            let Some(entry) = entries.next() else {
                self.stack.pop();
                continue;
            };
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "cannot read directory entry");
                    continue;
                }
            };
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot stat directory entry");
                    continue;
                }
            };

            if file_type.is_dir() {
                if self.skip_dir.as_deref() == Some(path.as_path()) {
                    continue;
                }
                match fs::read_dir(&path) {
                    Ok(children) => self.stack.push(children),
                    Err(e) => warn!(path = %path.display(), error = %e, "cannot read directory"),
                }
            } else if file_type.is_file() {
                match entry.metadata() {
                    Ok(meta) => return Some((path, meta)),
                    Err(e) => warn!(path = %path.display(), error = %e, "cannot stat file"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn walks_nested_files_and_skips_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("cam1/2024")).unwrap();
        fs::create_dir_all(root.join("done")).unwrap();
        fs::write(root.join("a.jpg"), b"a").unwrap();
        fs::write(root.join("cam1/2024/b.jpg"), b"bb").unwrap();
        fs::write(root.join("done/c.jpg"), b"c").unwrap();

        let found: BTreeSet<PathBuf> = DirWalker::new(root, Some(root.join("done")))
            .map(|(p, _)| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        let expected: BTreeSet<PathBuf> = ["a.jpg", "cam1/2024/b.jpg"].iter().map(PathBuf::from).collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn missing_root_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(DirWalker::new(&dir.path().join("absent"), None).count(), 0);
    }
}
