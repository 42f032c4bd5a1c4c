use std::path::{Path, PathBuf};

/// Directories never synced or watched, regardless of configuration.
pub const ALWAYS_IGNORED_DIRS: &[&str] = &["node_modules", ".git"];

/// Build/output directories ignored when no configuration overrides them.
pub const DEFAULT_IGNORED_DIRS: &[&str] = &["dist", "build", ".devsync"];

/// File written by the remote renderer; flows remote → local only.
pub const MANUAL_EDITS_FILE: &str = "manual-edits.json";

/// Optional per-project configuration file.
pub const CONFIG_FILE_NAME: &str = "devsync.config.json";

/// Entry candidates probed when none is configured, in order.
pub const DEFAULT_ENTRY_CANDIDATES: &[&str] = &[
    "index.tsx",
    "index.ts",
    "index.circuit.tsx",
    "index.jsx",
    "index.js",
];

/// Find the project root by walking up from `cwd` looking for `package.json` or `.git`.
///
/// Returns the first directory containing either marker, or `None` if neither is found.
#[must_use]
pub fn project_root(cwd: &Path) -> Option<PathBuf> {
    let mut current = cwd.to_path_buf();

    loop {
        if current.join("package.json").exists() || current.join(".git").exists() {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Locate the entry file.
///
/// An explicit entry is taken relative to `root` and must exist. Otherwise
/// the first existing [`DEFAULT_ENTRY_CANDIDATES`] entry wins.
#[must_use]
pub fn find_entry(root: &Path, explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(entry) = explicit {
        let path = if entry.is_absolute() {
            entry.to_path_buf()
        } else {
            root.join(entry)
        };
        return path.is_file().then_some(path);
    }

    DEFAULT_ENTRY_CANDIDATES
        .iter()
        .map(|name| root.join(name))
        .find(|p| p.is_file())
}

/// Check whether a project-relative POSIX path falls under an ignored directory.
///
/// Any path segment equal to an ignored name matches, so nested
/// `node_modules` directories are ignored too.
#[must_use]
pub fn is_ignored(relative: &str, ignored_dirs: &[String]) -> bool {
    let mut segments = relative.split('/').collect::<Vec<_>>();
    // Only directory segments count; the file name itself never matches.
    segments.pop();
    segments.iter().any(|seg| {
        ALWAYS_IGNORED_DIRS.contains(seg) || ignored_dirs.iter().any(|d| d == seg)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_project_root_with_package_json() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("c");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();

        let root = project_root(&nested);
        assert_eq!(root, Some(dir.path().to_path_buf()));
    }

    #[test]
    fn test_project_root_with_git() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("src");
        fs::create_dir_all(&nested).unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();

        let root = project_root(&nested);
        assert_eq!(root, Some(dir.path().to_path_buf()));
    }

    #[test]
    fn test_find_entry_default_order() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("index.ts"), "").unwrap();
        fs::write(dir.path().join("index.tsx"), "").unwrap();

        assert_eq!(find_entry(dir.path(), None), Some(dir.path().join("index.tsx")));
    }

    #[test]
    fn test_find_entry_explicit() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/board.tsx"), "").unwrap();

        assert_eq!(
            find_entry(dir.path(), Some(Path::new("lib/board.tsx"))),
            Some(dir.path().join("lib/board.tsx"))
        );
        assert_eq!(find_entry(dir.path(), Some(Path::new("missing.tsx"))), None);
    }

    #[test]
    fn test_is_ignored() {
        let ignored = vec!["dist".to_string()];
        assert!(is_ignored("dist/index.js", &ignored));
        assert!(is_ignored("node_modules/react/index.js", &ignored));
        assert!(is_ignored("packages/a/node_modules/x/y.js", &ignored));
        assert!(is_ignored(".git/HEAD", &ignored));
        assert!(!is_ignored("src/dist.ts", &ignored));
        assert!(!is_ignored("index.tsx", &ignored));
        assert!(!is_ignored("build/out.js", &ignored));
    }
}
