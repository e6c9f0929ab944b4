//! Local ↔ remote path mapping.
//!
//! Every stored connection and session is keyed by a *canonical* path: absolute,
//! `~`-expanded, free of `.`/`..` segments and with symlinks resolved for the
//! part of the path that exists on disk. Two spellings of the same directory
//! therefore always produce the same key.
//!
//! The mapping helpers are lexical and never touch the filesystem, so they can
//! be used on paths that only exist remotely.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Expand a leading `~` or `~/` against `home`.
pub fn expand_home(path: &str, home: &Path) -> PathBuf {
    if path == "~" {
        home.to_path_buf()
    } else if let Some(rest) = path.strip_prefix("~/") {
        home.join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// Contract `home` back to `~` for display.
pub fn contract_home(path: &Path, home: &Path) -> String {
    if path == home {
        return "~".to_string();
    }
    match path.strip_prefix(home) {
        Ok(rest) if !home.as_os_str().is_empty() && home != Path::new("/") => {
            format!("~/{}", rest.display())
        }
        _ => path.display().to_string(),
    }
}

/// Remove `.` and `..` segments without consulting the filesystem.
///
/// `..` at the root stays at the root, matching POSIX `resolve` semantics.
pub fn normalize_lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !path.is_absolute() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        if path.is_absolute() {
            PathBuf::from("/")
        } else {
            PathBuf::from(".")
        }
    } else {
        out
    }
}

/// Canonicalize `path` relative to `cwd`, expanding `~` against `home`.
pub fn canonicalize_with(path: &str, home: &Path, cwd: &Path) -> PathBuf {
    let expanded = expand_home(path, home);
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    };
    resolve_existing_prefix(&normalize_lexical(&absolute))
}

/// Canonicalize using the process home directory and working directory.
pub fn canonicalize(path: impl AsRef<Path>) -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    canonicalize_with(&path.as_ref().to_string_lossy(), &home, &cwd)
}

/// Resolve symlinks for the deepest ancestor of `path` that exists, then
/// re-append the components that do not exist yet.
fn resolve_existing_prefix(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut missing: Vec<OsString> = Vec::new();
    loop {
        if let Ok(real) = std::fs::canonicalize(existing) {
            let mut out = real;
            for name in missing.iter().rev() {
                out.push(name);
            }
            return out;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}

pub fn is_directory(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

/// Path of `path` relative to `root`.
///
/// Returns `.` for the root itself. A path that is not under `root` is
/// returned unchanged (absolute) rather than treated as an error.
pub fn relative_of(root: &Path, path: &Path) -> PathBuf {
    let root = normalize_lexical(root);
    let path = normalize_lexical(path);
    if path == root {
        return PathBuf::from(".");
    }
    match path.strip_prefix(&root) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => path,
    }
}

/// Map a local path under `local_root` onto the same place under `remote_root`.
///
/// Remote paths are always POSIX strings, independent of the local platform.
pub fn map_to_remote(local_root: &Path, remote_root: &str, local_path: &Path) -> String {
    let rel = relative_of(local_root, local_path);
    if rel == Path::new(".") {
        return remote_root.to_string();
    }
    if rel.is_absolute() {
        return rel.to_string_lossy().into_owned();
    }
    let segments: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let base = remote_root.trim_end_matches('/');
    format!("{}/{}", base, segments.join("/"))
}

/// Last path segment, used to derive default remote directories.
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn test_expand_home() {
        let home = Path::new("/home/alice");
        assert_eq!(expand_home("~", home), PathBuf::from("/home/alice"));
        assert_eq!(expand_home("~/foo/bar", home), PathBuf::from("/home/alice/foo/bar"));
        assert_eq!(expand_home("/srv/app", home), PathBuf::from("/srv/app"));
        assert_eq!(expand_home("~bob/x", home), PathBuf::from("~bob/x"));
    }

    #[test]
    fn test_contract_home() {
        let home = Path::new("/home/alice");
        assert_eq!(contract_home(Path::new("/home/alice"), home), "~");
        assert_eq!(contract_home(Path::new("/home/alice/src"), home), "~/src");
        assert_eq!(contract_home(Path::new("/home/alicex"), home), "/home/alicex");
        assert_eq!(contract_home(Path::new("/srv"), home), "/srv");
    }

    #[test]
    fn test_canonicalize_resolves_dots_and_home() {
        let home = Path::new("/nonexistent-home-for-test");
        let cwd = Path::new("/nonexistent-cwd");
        assert_eq!(
            canonicalize_with("~/foo/../bar", home, cwd),
            PathBuf::from("/nonexistent-home-for-test/bar")
        );
        assert_eq!(
            canonicalize_with("./a/./b", home, cwd),
            PathBuf::from("/nonexistent-cwd/a/b")
        );
        assert_eq!(canonicalize_with("/../..", home, cwd), PathBuf::from("/"));
    }

    #[cfg(unix)]
    #[test]
    fn test_canonicalize_resolves_symlinks() {
        let tmp = TempDir::new().unwrap();
        let real = tmp.path().join("real");
        std::fs::create_dir_all(real.join("sub")).unwrap();
        let link = tmp.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let via_link = canonicalize_with(&link.join("sub").to_string_lossy(), tmp.path(), tmp.path());
        let direct = canonicalize_with(&real.join("sub").to_string_lossy(), tmp.path(), tmp.path());
        assert_eq!(via_link, direct);

        // Missing tail is re-appended onto the resolved prefix
        let missing = canonicalize_with(&link.join("new/dir").to_string_lossy(), tmp.path(), tmp.path());
        assert_eq!(missing, direct.parent().unwrap().join("new/dir"));
    }

    #[test]
    fn test_relative_of() {
        let root = Path::new("/foo/bar");
        assert_eq!(relative_of(root, Path::new("/foo/bar")), PathBuf::from("."));
        assert_eq!(relative_of(root, Path::new("/foo/bar/baz")), PathBuf::from("baz"));
        assert_eq!(
            relative_of(root, Path::new("/foo/bar/baz/qux")),
            PathBuf::from("baz/qux")
        );
        assert_eq!(
            relative_of(root, Path::new("/other/path")),
            PathBuf::from("/other/path")
        );
        // Sibling sharing a string prefix is not a child
        assert_eq!(
            relative_of(root, Path::new("/foo/barbaz")),
            PathBuf::from("/foo/barbaz")
        );
    }

    #[test]
    fn test_map_to_remote() {
        let local = Path::new("/local/project");
        assert_eq!(map_to_remote(local, "/remote/project", local), "/remote/project");
        assert_eq!(
            map_to_remote(local, "/remote/project", Path::new("/local/project/src")),
            "/remote/project/src"
        );
        assert_eq!(
            map_to_remote(local, "/remote/project/", Path::new("/local/project/src/foo.ts")),
            "/remote/project/src/foo.ts"
        );
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name(Path::new("/work/app")), "app");
        assert_eq!(base_name(Path::new("/")), "");
    }

    proptest! {
        #[test]
        fn prop_map_consistent_with_relative_of(
            segs in proptest::collection::vec("[a-z0-9_]{1,8}", 0..5)
        ) {
            let root = Path::new("/work/app");
            let mut child = root.to_path_buf();
            for s in &segs {
                child.push(s);
            }
            let rel = relative_of(root, &child);
            let mapped = map_to_remote(root, "/config/workspace/app", &child);
            if segs.is_empty() {
                prop_assert_eq!(rel, PathBuf::from("."));
                prop_assert_eq!(mapped, "/config/workspace/app");
            } else {
                prop_assert_eq!(
                    mapped,
                    format!("/config/workspace/app/{}", rel.to_string_lossy())
                );
            }
        }
    }
}
