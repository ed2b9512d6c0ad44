//! Host-filesystem build strategy.
//!
//! Executes copy steps directly with `std::fs`. Any I/O error becomes a
//! [`StrategyOutcome::Failed`]; nothing here raises. Dependency installation
//! is refused because host-built packages risk an ABI mismatch with the
//! target runtime.

use crate::bundle::{ArtifactKind, BundleSpec, BundleStep};
use crate::{BuildStrategy, StrategyOutcome};
use std::fs;
use std::io;
use std::path::Path;

/// Fast path: plain filesystem copies on the host.
#[derive(Debug, Clone, Default)]
pub struct LocalStrategy;

impl LocalStrategy {
    pub fn new() -> Self {
        Self
    }

    fn execute(&self, spec: &BundleSpec, output_dir: &Path) -> Result<(), String> {
        for step in &spec.steps {
            match step {
                BundleStep::CopyTree { from, to } => {
                    let src = spec.input_dir.join(from);
                    if !src.is_dir() {
                        return Err(format!("{} is not a directory", src.display()));
                    }
                    copy_tree(&src, &output_dir.join(to))
                        .map_err(|e| format!("copy {}: {e}", src.display()))?;
                }
                BundleStep::CopyContents { from, to } => {
                    let src = spec.input_dir.join(from);
                    let dest = output_dir.join(to);
                    fs::create_dir_all(&dest)
                        .map_err(|e| format!("mkdir {}: {e}", dest.display()))?;
                    let copied = copy_contents(&src, &dest)
                        .map_err(|e| format!("copy {}: {e}", src.display()))?;
                    // `cp -r dir/*` fails on an empty dir; stay consistent.
                    if copied == 0 {
                        return Err(format!("{} has no entries to copy", src.display()));
                    }
                }
                BundleStep::PipInstall { .. } => {
                    return Err("dependency installation is not allowed on the host".into());
                }
            }
        }
        Ok(())
    }
}

impl BuildStrategy for LocalStrategy {
    fn name(&self) -> &str {
        "local"
    }

    fn supports(&self, kind: ArtifactKind) -> bool {
        kind == ArtifactKind::Function
    }

    fn try_bundle(&self, spec: &BundleSpec, output_dir: &Path) -> StrategyOutcome {
        match self.execute(spec, output_dir) {
            Ok(()) => StrategyOutcome::Built,
            Err(reason) => StrategyOutcome::Failed(reason),
        }
    }
}

/// Recursively copies `src` to `dest`, creating `dest`.
pub fn copy_tree(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        copy_entry(&entry.path(), &dest.join(entry.file_name()))?;
    }
    Ok(())
}

/// Copies the top-level non-hidden entries of `src` into `dest`.
/// Returns how many entries were copied.
fn copy_contents(src: &Path, dest: &Path) -> io::Result<usize> {
    let mut copied = 0;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        copy_entry(&entry.path(), &dest.join(entry.file_name()))?;
        copied += 1;
    }
    Ok(copied)
}

/// Links are recreated, not followed, matching `cp -r` in the container.
fn copy_entry(src: &Path, dest: &Path) -> io::Result<()> {
    let file_type = fs::symlink_metadata(src)?.file_type();
    if file_type.is_symlink() {
        copy_link(src, dest)
    } else if file_type.is_dir() {
        copy_tree(src, dest)
    } else {
        fs::copy(src, dest).map(|_| ())
    }
}

#[cfg(unix)]
fn copy_link(src: &Path, dest: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(src)?, dest)
}

#[cfg(not(unix))]
fn copy_link(_src: &Path, dest: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot recreate symlink {} on this host", dest.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn spec(input: &Path, steps: Vec<BundleStep>) -> BundleSpec {
        BundleSpec {
            name: "t".into(),
            kind: ArtifactKind::Function,
            input_dir: input.to_path_buf(),
            steps,
        }
    }

    #[test]
    fn copy_contents_skips_hidden_entries() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::create_dir_all(input.path().join("h")).unwrap();
        fs::write(input.path().join("h/handler.py"), "x").unwrap();
        fs::write(input.path().join("h/.env"), "secret").unwrap();

        let s = spec(
            input.path(),
            vec![BundleStep::CopyContents {
                from: PathBuf::from("h"),
                to: PathBuf::from("nested/h"),
            }],
        );
        assert_eq!(LocalStrategy.try_bundle(&s, out.path()), StrategyOutcome::Built);
        assert!(out.path().join("nested/h/handler.py").is_file());
        assert!(!out.path().join("nested/h/.env").exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_copied_as_links() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::create_dir_all(input.path().join("lib/shared")).unwrap();
        fs::write(input.path().join("lib/shared/real.py"), "VALUE = 1").unwrap();
        std::os::unix::fs::symlink("shared/real.py", input.path().join("lib/alias.py")).unwrap();
        std::os::unix::fs::symlink("shared", input.path().join("lib/linked_dir")).unwrap();

        let s = spec(
            input.path(),
            vec![BundleStep::CopyTree {
                from: PathBuf::from("lib"),
                to: PathBuf::from("lib"),
            }],
        );
        assert_eq!(LocalStrategy.try_bundle(&s, out.path()), StrategyOutcome::Built);

        let alias = out.path().join("lib/alias.py");
        assert!(fs::symlink_metadata(&alias).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&alias).unwrap(), PathBuf::from("shared/real.py"));
        let linked = out.path().join("lib/linked_dir");
        assert!(fs::symlink_metadata(&linked).unwrap().file_type().is_symlink());
        assert!(out.path().join("lib/shared/real.py").is_file());

        // A tree with the same links, laid out by hand, fingerprints the same.
        let by_hand = tempfile::tempdir().unwrap();
        fs::create_dir_all(by_hand.path().join("lib/shared")).unwrap();
        fs::write(by_hand.path().join("lib/shared/real.py"), "VALUE = 1").unwrap();
        std::os::unix::fs::symlink("shared/real.py", by_hand.path().join("lib/alias.py")).unwrap();
        std::os::unix::fs::symlink("shared", by_hand.path().join("lib/linked_dir")).unwrap();
        assert_eq!(
            crate::fingerprint::fingerprint_dir(out.path()).unwrap(),
            crate::fingerprint::fingerprint_dir(by_hand.path()).unwrap()
        );
    }

    #[test]
    fn missing_source_fails_without_panicking() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let s = spec(
            input.path(),
            vec![BundleStep::CopyTree {
                from: PathBuf::from("absent"),
                to: PathBuf::from("absent"),
            }],
        );
        assert!(matches!(
            LocalStrategy.try_bundle(&s, out.path()),
            StrategyOutcome::Failed(_)
        ));
    }

    #[test]
    fn empty_handler_dir_fails() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::create_dir_all(input.path().join("empty")).unwrap();
        let s = spec(
            input.path(),
            vec![BundleStep::CopyContents {
                from: PathBuf::from("empty"),
                to: PathBuf::from("empty"),
            }],
        );
        assert!(matches!(
            LocalStrategy.try_bundle(&s, out.path()),
            StrategyOutcome::Failed(_)
        ));
    }

    #[test]
    fn refuses_dependency_install() {
        assert!(!LocalStrategy.supports(ArtifactKind::Layer));
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let s = BundleSpec::for_layer(input.path());
        assert!(matches!(
            LocalStrategy.try_bundle(&s, out.path()),
            StrategyOutcome::Failed(_)
        ));
    }
}
