//! Request path resolution against the served root.

use std::io;
use std::path::{Component, Path, PathBuf};

/// Resolve a decoded request path under `root`.
///
/// Leading slashes are ignored and `.` components are dropped. Any `..`
/// or absolute component is rejected with `PermissionDenied`, so the
/// result never escapes `root`.
pub fn resolve(root: &Path, request_path: &str) -> io::Result<PathBuf> {
    let relative = request_path.trim_start_matches('/');
    let mut resolved = root.to_path_buf();

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("path escapes the served root: {request_path}"),
                ));
            }
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_under_root() {
        let root = Path::new("/srv/files");
        assert_eq!(
            resolve(root, "/docs/a.txt").unwrap(),
            PathBuf::from("/srv/files/docs/a.txt")
        );
        assert_eq!(resolve(root, "/").unwrap(), PathBuf::from("/srv/files"));
        assert_eq!(
            resolve(root, "//./b.txt").unwrap(),
            PathBuf::from("/srv/files/b.txt")
        );
    }

    #[test]
    fn parent_components_are_rejected() {
        let root = Path::new("/srv/files");
        let err = resolve(root, "/../etc/passwd").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);

        let err = resolve(root, "/docs/../../secret").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }
}
