//! Content fingerprint of a packaged directory.
//!
//! SHA-256 over every file's relative path and bytes, visited in sorted
//! order, so two byte-identical trees always produce the same digest no
//! matter which strategy built them. Symlinks contribute their target path,
//! never the content behind it.

use scout_core::{ScoutError, ScoutResult};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

pub fn fingerprint_dir(root: &Path) -> ScoutResult<String> {
    let mut files = Vec::new();
    collect_files(root, root, &mut files)
        .map_err(|e| ScoutError::io(format!("walk {}", root.display()), e))?;
    files.sort();

    let mut hasher = Sha256::new();
    for rel in &files {
        let path = root.join(rel);
        let is_link = fs::symlink_metadata(&path)
            .map_err(|e| ScoutError::io(format!("stat {}", rel.display()), e))?
            .file_type()
            .is_symlink();
        let bytes = if is_link {
            let target = fs::read_link(&path)
                .map_err(|e| ScoutError::io(format!("readlink {}", rel.display()), e))?;
            format!("symlink:{}", target.to_string_lossy()).into_bytes()
        } else {
            fs::read(&path).map_err(|e| ScoutError::io(format!("read {}", rel.display()), e))?
        };
        let rel = rel.to_string_lossy().replace('\\', "/");
        hasher.update((rel.len() as u64).to_le_bytes());
        hasher.update(rel.as_bytes());
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(root, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.to_path_buf());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_content_same_digest() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        for root in [a.path(), b.path()] {
            fs::create_dir_all(root.join("pkg")).unwrap();
            fs::write(root.join("pkg/mod.py"), "print(1)").unwrap();
        }
        assert_eq!(
            fingerprint_dir(a.path()).unwrap(),
            fingerprint_dir(b.path()).unwrap()
        );
    }

    #[test]
    fn path_change_changes_digest() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        fs::write(a.path().join("x.py"), "1").unwrap();
        fs::write(b.path().join("y.py"), "1").unwrap();
        assert_ne!(
            fingerprint_dir(a.path()).unwrap(),
            fingerprint_dir(b.path()).unwrap()
        );
    }

    #[cfg(unix)]
    #[test]
    fn link_hashes_its_target_not_the_content() {
        let linked = tempfile::tempdir().unwrap();
        let copied = tempfile::tempdir().unwrap();
        for root in [linked.path(), copied.path()] {
            fs::write(root.join("real.py"), "VALUE = 1").unwrap();
        }
        std::os::unix::fs::symlink("real.py", linked.path().join("alias.py")).unwrap();
        fs::write(copied.path().join("alias.py"), "VALUE = 1").unwrap();
        assert_ne!(
            fingerprint_dir(linked.path()).unwrap(),
            fingerprint_dir(copied.path()).unwrap()
        );
    }

    #[test]
    fn digest_is_hex_sha256() {
        let a = tempfile::tempdir().unwrap();
        let digest = fingerprint_dir(a.path()).unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
