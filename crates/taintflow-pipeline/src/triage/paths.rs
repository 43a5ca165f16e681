//! Artifact URI resolution.
//!
//! SARIF locations arrive as `file:` URIs, absolute POSIX or Windows
//! paths, UNC paths or project-relative paths. Absolute forms resolve
//! unchanged; relative forms are joined onto the project root; `file:`
//! URIs are percent-decoded with Windows drive and UNC handling.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::path::{Path, PathBuf};

static WINDOWS_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[A-Za-z]:[\\/]|\\\\)").expect("valid regex"));

static SLASHED_DRIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/[A-Za-z]:(?:[\\/]|$)").expect("valid regex"));

fn is_absolute_path(text: &str) -> bool {
    text.starts_with('/') || WINDOWS_PATH_RE.is_match(text)
}

fn percent_decode(text: &str) -> String {
    match urlencoding::decode(text) {
        Ok(Cow::Borrowed(s)) => s.to_string(),
        Ok(Cow::Owned(s)) => s,
        Err(_) => text.to_string(),
    }
}

fn file_uri_to_path(rest: &str) -> PathBuf {
    let decoded = percent_decode(rest);
    if let Some(tail) = decoded.strip_prefix("//") {
        // Empty authority (`file:///...`) yields a rooted local path; a
        // non-empty authority (`file://server/share`) is a UNC path.
        if let Some(local) = tail.strip_prefix('/') {
            let rooted = format!("/{}", local);
            if SLASHED_DRIVE_RE.is_match(&rooted) {
                return PathBuf::from(local);
            }
            return PathBuf::from(rooted);
        }
        return PathBuf::from(format!("//{}", tail));
    }
    PathBuf::from(decoded)
}

/// Resolve one SARIF artifact URI against the project root.
pub fn resolve_artifact_uri(root: &Path, uri: &str) -> PathBuf {
    if let Some(rest) = uri.strip_prefix("file:") {
        return file_uri_to_path(rest);
    }
    if is_absolute_path(uri) {
        return PathBuf::from(uri);
    }
    root.join(uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_join_the_project_root() {
        let resolved = resolve_artifact_uri(Path::new("/proj"), "src/app.py");
        assert_eq!(resolved, Path::new("/proj/src/app.py"));
    }

    #[test]
    fn absolute_posix_paths_resolve_unchanged() {
        let resolved = resolve_artifact_uri(Path::new("/proj"), "/opt/app/main.py");
        assert_eq!(resolved, Path::new("/opt/app/main.py"));
    }

    #[test]
    fn absolute_windows_paths_resolve_unchanged() {
        let resolved = resolve_artifact_uri(Path::new("/proj"), r"C:\work\app.py");
        assert_eq!(resolved, Path::new(r"C:\work\app.py"));

        let unc = resolve_artifact_uri(Path::new("/proj"), r"\\server\share\app.py");
        assert_eq!(unc, Path::new(r"\\server\share\app.py"));
    }

    #[test]
    fn file_uri_with_percent_encoding_is_decoded() {
        let resolved = resolve_artifact_uri(Path::new("/proj"), "file:///home/user/my%20app/app.py");
        assert_eq!(resolved, Path::new("/home/user/my app/app.py"));
    }

    #[test]
    fn file_uri_with_windows_drive_drops_the_leading_slash() {
        let resolved = resolve_artifact_uri(Path::new("/proj"), "file:///C:/work/app.py");
        assert_eq!(resolved, Path::new("C:/work/app.py"));
    }

    #[test]
    fn file_uri_with_authority_is_a_unc_path() {
        let resolved = resolve_artifact_uri(Path::new("/proj"), "file://server/share/app.py");
        assert_eq!(resolved, Path::new("//server/share/app.py"));
    }
}
