use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use taintflow_core::Result;
use tracing::{debug, warn};

/// Directories that never hold analyzable project sources.
const DEFAULT_EXCLUDES: &[&str] = &[
    "**/__pycache__/**",
    "**/.git/**",
    "**/.pytest_cache/**",
    "**/.mypy_cache/**",
    "**/.tox/**",
];

fn build_excludes() -> Option<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in DEFAULT_EXCLUDES {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => warn!("Invalid exclude pattern '{}': {}", pattern, e),
        }
    }
    builder.build().ok()
}

/// Collect every `.py` file under `root` in a deterministic (sorted) order.
///
/// Ignore files and hidden-file filtering are disabled on purpose: the scan
/// must see the same tree the structural engine was built from.
pub fn collect_python_files(root: &Path) -> Result<Vec<PathBuf>> {
    let excludes = build_excludes();

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .build();

    let mut paths = Vec::new();
    for dent in walker {
        let dent = match dent {
            Ok(d) => d,
            Err(e) => {
                warn!("Walker error: {}", e);
                continue;
            }
        };
        let path = dent.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("py") {
            continue;
        }
        if let Some(ref set) = excludes {
            if set.is_match(path) {
                continue;
            }
        }
        paths.push(path.to_path_buf());
    }

    paths.sort();
    debug!("Collected {} Python files under {}", paths.len(), root.display());
    Ok(paths)
}

/// Read a source file with lossy decoding so encoding oddities never stop
/// the scan.
pub fn read_lossy(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Project-relative path with forward slashes, the form recorded in usage
/// records and matched by predicates.
pub fn relative_slash_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_only_python_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("b.py"), "x = 1\n").unwrap();
        fs::write(dir.path().join("a.py"), "y = 2\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "skip\n").unwrap();
        fs::write(dir.path().join("pkg/mod.py"), "z = 3\n").unwrap();
        fs::create_dir_all(dir.path().join("__pycache__")).unwrap();
        fs::write(dir.path().join("__pycache__/a.py"), "cached\n").unwrap();

        let files = collect_python_files(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| relative_slash_path(dir.path(), p))
            .collect();
        assert_eq!(names, vec!["a.py", "b.py", "pkg/mod.py"]);
    }

    #[test]
    fn lossy_read_survives_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weird.py");
        fs::write(&path, b"x = 'caf\xe9'\n").unwrap();
        let text = read_lossy(&path).unwrap();
        assert!(text.starts_with("x = 'caf"));
    }
}
