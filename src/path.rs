use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::path::{Component, Path};

/// A `/` separated path on the remote host, absolute or relative to the
/// session's working directory.
///
/// No normalisation is done beyond what [`RemotePath::new`] documents;
/// `.` and `..` are passed to the server as is.
#[derive(Debug, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RemotePath(String);

impl RemotePath {
    /// Create a remote path, dropping trailing `/` except for the root.
    pub fn new(path: impl Into<String>) -> Self {
        let mut path = path.into();

        while path.len() > 1 && path.ends_with('/') {
            path.pop();
        }

        Self(path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_absolute(&self) -> bool {
        self.0.starts_with('/')
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Non-empty segments, in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }

    /// Last segment, `None` for the root and the empty path.
    pub fn file_name(&self) -> Option<&str> {
        self.segments().last()
    }

    /// The path without its last segment.
    ///
    /// Return `None` for the root, the empty path and a relative path with
    /// a single segment.
    pub fn parent(&self) -> Option<RemotePath> {
        let trimmed = self.0.trim_end_matches('/');

        match trimmed.rfind('/') {
            Some(0) if trimmed.len() > 1 => Some(RemotePath::new("/")),
            Some(0) | None => None,
            Some(pos) => Some(RemotePath::new(&trimmed[..pos])),
        }
    }

    /// Directories from the immediate parent up to, but not including, the
    /// root.
    ///
    /// For a relative path the walk stops at its first segment.
    ///
    /// ```
    /// use xfer_client::RemotePath;
    ///
    /// let ancestors: Vec<_> = RemotePath::new("/a/b/c/file").ancestors().collect();
    /// assert_eq!(ancestors, ["/a/b/c", "/a/b", "/a"]);
    /// ```
    pub fn ancestors(&self) -> impl Iterator<Item = RemotePath> {
        std::iter::successors(self.parent(), RemotePath::parent).filter(|path| !path.is_root())
    }

    /// Append `name`; `name` replaces the path if it is absolute.
    pub fn join(&self, name: &str) -> RemotePath {
        if name.starts_with('/') || self.0.is_empty() {
            RemotePath::new(name)
        } else if self.0.ends_with('/') {
            RemotePath::new(format!("{}{name}", self.0))
        } else {
            RemotePath::new(format!("{}/{name}", self.0))
        }
    }
}

/// Same rule as [`RemotePath::ancestors`] applied to a local path, the
/// result expressed as remote paths.
///
/// Components that are not valid UTF-8 are converted lossily.
pub(crate) fn local_ancestors(path: &Path) -> Vec<RemotePath> {
    path.ancestors()
        .skip(1)
        .filter(|ancestor| ancestor.parent().is_some() && !ancestor.as_os_str().is_empty())
        .map(|ancestor| RemotePath::new(to_slash(ancestor)))
        .collect()
}

fn to_slash(path: &Path) -> String {
    let mut out = String::new();

    for component in path.components() {
        match component {
            Component::RootDir => out.push('/'),
            Component::Prefix(_) => (),
            component => {
                if !out.is_empty() && !out.ends_with('/') {
                    out.push('/');
                }
                out.push_str(&component.as_os_str().to_string_lossy());
            }
        }
    }

    out
}

impl Deref for RemotePath {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RemotePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for RemotePath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemotePath {
    fn from(path: &str) -> Self {
        RemotePath::new(path)
    }
}

impl From<String> for RemotePath {
    fn from(path: String) -> Self {
        RemotePath::new(path)
    }
}

impl From<RemotePath> for String {
    fn from(path: RemotePath) -> Self {
        path.0
    }
}

impl PartialEq<str> for RemotePath {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for RemotePath {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn collect(path: &str) -> Vec<String> {
        RemotePath::new(path)
            .ancestors()
            .map(RemotePath::into_string)
            .collect()
    }

    #[test]
    fn trailing_slashes() {
        assert_eq!(RemotePath::new("/a/b/"), "/a/b");
        assert_eq!(RemotePath::new("/"), "/");
        assert_eq!(RemotePath::new("///"), "/");
    }

    #[test]
    fn parent_and_file_name() {
        let path = RemotePath::new("/a/b/file.txt");
        assert_eq!(path.file_name(), Some("file.txt"));
        assert_eq!(path.parent().unwrap(), "/a/b");

        assert_eq!(RemotePath::new("/file").parent().unwrap(), "/");
        assert_eq!(RemotePath::new("/").parent(), None);
        assert_eq!(RemotePath::new("file").parent(), None);
        assert_eq!(RemotePath::new("a/file").parent().unwrap(), "a");
        assert_eq!(RemotePath::new("/").file_name(), None);
    }

    #[test]
    fn ancestors_exclude_root() {
        assert_eq!(collect("/a/b/c/file"), ["/a/b/c", "/a/b", "/a"]);
        assert_eq!(collect("/file"), Vec::<String>::new());
        assert_eq!(collect("a/b/file"), ["a/b", "a"]);
        assert_eq!(collect("file"), Vec::<String>::new());
        assert_eq!(collect(""), Vec::<String>::new());
    }

    #[test]
    fn join_paths() {
        assert_eq!(RemotePath::new("/a").join("b"), "/a/b");
        assert_eq!(RemotePath::new("/").join("b"), "/b");
        assert_eq!(RemotePath::new("a").join("/b"), "/b");
        assert_eq!(RemotePath::new("").join("b"), "b");
    }

    #[test]
    fn segments() {
        let path = RemotePath::new("/a//b/c");
        assert_eq!(path.segments().collect::<Vec<_>>(), ["a", "b", "c"]);
        assert!(path.is_absolute());
        assert!(!RemotePath::new("a").is_absolute());
    }

    #[cfg(unix)]
    #[test]
    fn local_ancestors_exclude_root() {
        let ancestors = local_ancestors(Path::new("/tmp/x/y/file"));
        assert_eq!(ancestors, ["/tmp/x/y", "/tmp/x", "/tmp"]);

        assert_eq!(local_ancestors(Path::new("file")), Vec::<RemotePath>::new());
        assert_eq!(local_ancestors(Path::new("a/file")), [RemotePath::new("a")]);
    }
}
