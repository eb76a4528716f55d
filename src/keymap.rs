//! Local path to storage key mapping.

use std::fmt;
use std::path::{Component, Path};

use serde::Serialize;

use crate::error::InvalidPathError;

/// A `/`-delimited object key, unique within a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keys read back from a bucket listing.
impl From<String> for StorageKey {
    fn from(key: String) -> Self {
        StorageKey(key)
    }
}

impl PartialEq<&str> for StorageKey {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the storage key of `file_path` relative to `root`.
///
/// Path components are joined with `/` whatever the host separator is. A
/// non-empty `prefix` is prepended with a single `/`; trailing slashes on the
/// prefix are dropped so `"run1/"` and `"run1"` map identically.
pub fn derive_key(
    root: &Path,
    file_path: &Path,
    prefix: Option<&str>,
) -> Result<StorageKey, InvalidPathError> {
    let invalid = || InvalidPathError {
        root: root.to_path_buf(),
        path: file_path.to_path_buf(),
    };

    let relative = file_path.strip_prefix(root).map_err(|_| invalid())?;

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_string_lossy()),
            Component::CurDir => {}
            // `..`, a drive prefix or a second root would escape the tree.
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(invalid())
            }
        }
    }
    if segments.is_empty() {
        return Err(invalid());
    }
    let relative = segments.join("/");

    let key = match prefix.map(|p| p.trim_end_matches('/')) {
        Some(p) if !p.is_empty() => format!("{p}/{relative}"),
        _ => relative,
    };
    Ok(StorageKey(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn derive_key_table_driven() {
        struct TestCase {
            name: &'static str,
            root: &'static str,
            file: PathBuf,
            prefix: Option<&'static str>,
            expected: &'static str,
        }

        let cases = vec![
            TestCase {
                name: "no prefix",
                root: "./screenshots",
                file: Path::new("./screenshots").join("a").join("1.png"),
                prefix: None,
                expected: "a/1.png",
            },
            TestCase {
                name: "with prefix",
                root: "./screenshots",
                file: Path::new("./screenshots").join("b").join("2.png"),
                prefix: Some("run1"),
                expected: "run1/b/2.png",
            },
            TestCase {
                name: "prefix with trailing slash",
                root: "/data/shots",
                file: Path::new("/data/shots").join("cell").join("x.jpg"),
                prefix: Some("run1/"),
                expected: "run1/cell/x.jpg",
            },
            TestCase {
                name: "empty prefix behaves like none",
                root: "/data/shots",
                file: Path::new("/data/shots").join("cell").join("x.jpg"),
                prefix: Some(""),
                expected: "cell/x.jpg",
            },
            TestCase {
                name: "deeper nesting keeps every segment",
                root: "/data",
                file: Path::new("/data").join("a").join("b").join("c.webp"),
                prefix: Some("nested/prefix"),
                expected: "nested/prefix/a/b/c.webp",
            },
        ];

        for tc in cases {
            let key = derive_key(Path::new(tc.root), &tc.file, tc.prefix)
                .unwrap_or_else(|e| panic!("{}: unexpected error {e}", tc.name));
            assert_eq!(key.as_str(), tc.expected, "{}", tc.name);
            assert!(!key.as_str().contains('\\'), "{}", tc.name);
        }
    }

    #[test]
    fn file_outside_root_is_rejected() {
        let err = derive_key(Path::new("/data/shots"), Path::new("/data/other/1.png"), None)
            .unwrap_err();
        assert_eq!(err.path, PathBuf::from("/data/other/1.png"));
        assert_eq!(err.root, PathBuf::from("/data/shots"));
    }

    #[test]
    fn root_itself_is_not_a_file_under_root() {
        assert!(derive_key(Path::new("/data/shots"), Path::new("/data/shots"), None).is_err());
    }

    #[test]
    fn parent_components_are_rejected() {
        let file = Path::new("/data/shots").join("..").join("escape.png");
        assert!(derive_key(Path::new("/data/shots"), &file, None).is_err());
    }

    #[test]
    fn distinct_files_map_to_distinct_keys() {
        let root = Path::new("/r");
        let a = derive_key(root, &root.join("a").join("1.png"), Some("p")).unwrap();
        let b = derive_key(root, &root.join("a1").join(".png"), Some("p")).unwrap();
        assert_ne!(a, b);
    }
}
