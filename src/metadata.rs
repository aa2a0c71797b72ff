use std::time::SystemTime;

/// Type of a [`DirectoryEntry`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum EntryType {
    File,
    Directory,
    Other,
}

/// One name returned by [`TransferClient::list`](crate::TransferClient::list).
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct DirectoryEntry {
    name: String,
    entry_type: Option<EntryType>,
}

impl DirectoryEntry {
    pub(crate) fn new(name: impl Into<String>, entry_type: Option<EntryType>) -> Self {
        Self {
            name: name.into(),
            entry_type,
        }
    }

    /// Base name of the entry.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type of the entry, `None` if the backend's listing does not report
    /// it.
    ///
    /// FTP name listings (`NLST`) carry names only.
    pub fn entry_type(&self) -> Option<EntryType> {
        self.entry_type
    }
}

/// Size and modification time of a remote file.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct FileMetadata {
    len: u64,
    modified: SystemTime,
}

impl FileMetadata {
    pub(crate) fn new(len: u64, modified: SystemTime) -> Self {
        Self { len, modified }
    }

    /// Size in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Return true if the file is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Last modification time as reported by the server's clock.
    ///
    /// FTP servers report whole seconds only.
    pub fn modified(&self) -> SystemTime {
        self.modified
    }
}

/// Reduce an entry reported by a listing to its base name.
///
/// Some servers answer `NLST dir` with `dir/name`.
pub(crate) fn base_name(entry: &str) -> Option<&str> {
    let entry = entry.trim_end_matches(|c: char| c == '\r' || c == '\n');
    let name = entry.trim_end_matches('/').rsplit('/').next()?;

    match name {
        "" | "." | ".." => None,
        name => Some(name),
    }
}
