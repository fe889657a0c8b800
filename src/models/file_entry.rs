use super::file_type::FileType;
use super::permission::Permission;
use crate::utils::remote_path;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    name: String,
    path: String,
    length: u64,
    file_type: FileType,
    permission: Permission,
    owner: Option<String>,
    group: Option<String>,
    last_access_time: DateTime<Utc>,
    last_modified_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAttributes {
    pub size: Option<u64>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub perm: Option<u32>,
    pub atime: Option<u64>,
    pub mtime: Option<u64>,
}

pub(crate) fn epoch_seconds(secs: Option<u64>) -> DateTime<Utc> {
    let secs = secs.and_then(|s| i64::try_from(s).ok()).unwrap_or(0);
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

pub struct FileEntryBuilder {
    entry: FileEntry,
}

impl FileEntryBuilder {
    pub fn owner(mut self, owner: Option<String>) -> Self {
        self.entry.owner = owner;
        self
    }

    pub fn group(mut self, group: Option<String>) -> Self {
        self.entry.group = group;
        self
    }

    pub fn build(self) -> FileEntry {
        self.entry
    }
}

impl FileEntry {
    pub fn builder(
        name: impl Into<String>,
        path: impl Into<String>,
        file_type: FileType,
        attrs: &RawAttributes,
    ) -> FileEntryBuilder {
        let mode = attrs.perm.unwrap_or(0);
        FileEntryBuilder {
            entry: FileEntry {
                name: name.into(),
                path: path.into(),
                length: attrs.size.unwrap_or(0),
                file_type,
                permission: Permission::new(mode),
                owner: None,
                group: None,
                last_access_time: epoch_seconds(attrs.atime),
                last_modified_time: epoch_seconds(attrs.mtime),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn last_access_time(&self) -> DateTime<Utc> {
        self.last_access_time
    }

    pub fn last_modified_time(&self) -> DateTime<Utc> {
        self.last_modified_time
    }

    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }

    // Anything that is not a directory.
    pub fn is_file(&self) -> bool {
        !self.is_directory()
    }

    pub fn parent(&self) -> Option<String> {
        if self.path.trim().is_empty() {
            return None;
        }
        Some(remote_path::parent(&self.path))
    }

    pub fn mode_string(&self) -> String {
        format!("{}{}", self.file_type.symbol(), self.permission)
    }
}
