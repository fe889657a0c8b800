use crate::errors::{Result, SshError};
use crate::models::{FileEntry, FileType, RawAttributes};
use crate::services::executor::CommandExecutor;
use crate::services::logger::Logger;
use crate::services::session::{SessionManager, SftpOf};
use crate::transport::{DirEntry, RemoteReader, RemoteWriter, SftpChannel, Transport, WriteMode};
use crate::utils::remote_path;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NameKind {
    User,
    Group,
}

impl NameKind {
    fn database(self) -> &'static str {
        match self {
            NameKind::User => "passwd",
            NameKind::Group => "group",
        }
    }
}

// uid/gid names come from `getent` and live until the session is replaced.
pub struct SftpOperations<T: Transport> {
    logger: Logger,
    session: Arc<SessionManager<T>>,
    executor: Arc<CommandExecutor<T>>,
    home: OnceCell<String>,
    names: DashMap<(NameKind, u32), Option<String>>,
    names_generation: AtomicU64,
}

impl<T: Transport> SftpOperations<T> {
    pub fn new(
        session: Arc<SessionManager<T>>,
        executor: Arc<CommandExecutor<T>>,
        logger: Logger,
    ) -> Self {
        Self {
            logger: logger.child("sftp"),
            session,
            executor,
            home: OnceCell::new(),
            names: DashMap::new(),
            names_generation: AtomicU64::new(0),
        }
    }

    fn with_channel<R, F>(&self, op: F) -> Result<R>
    where
        F: FnOnce(&mut SftpOf<T>) -> Result<R>,
    {
        let handle = self.session.get_live_sftp_channel()?;
        let mut channel = handle.lock().unwrap_or_else(|p| p.into_inner());
        op(&mut *channel)
    }

    pub fn home(&self) -> Result<&str> {
        self.home
            .get_or_try_init(|| {
                let home = self.with_channel(|c| c.realpath("."))?;
                self.logger.debug(
                    "Resolved home directory",
                    Some(&serde_json::json!({ "home": home })),
                );
                Ok(home)
            })
            .map(String::as_str)
    }

    pub fn normalize(&self, path: &str) -> Result<String> {
        if remote_path::has_home_prefix(path) {
            Ok(remote_path::expand_home(path, self.home()?))
        } else {
            Ok(path.to_string())
        }
    }

    fn sync_name_cache(&self) {
        let current = self.session.generation();
        if self.names_generation.swap(current, Ordering::SeqCst) != current {
            self.names.clear();
        }
    }

    fn lookup_name(&self, kind: NameKind, id: Option<u32>) -> Result<Option<String>> {
        let Some(id) = id else {
            return Ok(None);
        };
        self.sync_name_cache();
        if let Some(cached) = self.names.get(&(kind, id)) {
            return Ok(cached.clone());
        }
        let command = format!("getent {} {}", kind.database(), id);
        let result = self.executor.execute(&[command.as_str()])?;
        if result.has_error() {
            return Err(SshError::operation(format!(
                "Failed to resolve {} id {}: {}",
                kind.database(),
                id,
                result.stderr_str().trim()
            )));
        }
        let name = result
            .stdout_str()
            .lines()
            .next()
            .and_then(|line| line.split(':').next())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        self.names.insert((kind, id), name.clone());
        Ok(name)
    }

    pub fn user_name(&self, uid: Option<u32>) -> Result<Option<String>> {
        self.lookup_name(NameKind::User, uid)
    }

    pub fn group_name(&self, gid: Option<u32>) -> Result<Option<String>> {
        self.lookup_name(NameKind::Group, gid)
    }

    pub fn attributes(&self, path: &str) -> Result<RawAttributes> {
        let path = self.normalize(path)?;
        self.with_channel(|c| c.stat(&path))
    }

    pub fn file_type(&self, path: &str) -> Result<FileType> {
        let attrs = self.attributes(path)?;
        FileType::from_mode(attrs.perm.unwrap_or(0))
    }

    pub fn stat(&self, path: &str) -> Result<FileEntry> {
        let path = self.normalize(path)?;
        let attrs = self.with_channel(|c| c.stat(&path))?;
        let file_type = FileType::from_mode(attrs.perm.unwrap_or(0))?;
        let owner = self.user_name(attrs.uid)?;
        let group = self.group_name(attrs.gid)?;
        Ok(
            FileEntry::builder(remote_path::basename(&path), path.as_str(), file_type, &attrs)
                .owner(owner)
                .group(group)
                .build(),
        )
    }

    fn entry_from_listing(&self, base: &str, entry: &DirEntry) -> Result<FileEntry> {
        let file_type = FileType::from_mode(entry.attrs.perm.unwrap_or(0))?;
        let long_fields: Vec<&str> = entry
            .long_name
            .as_deref()
            .map(|line| line.split_whitespace().collect())
            .unwrap_or_default();
        let (owner, group) = if long_fields.len() >= 4 {
            (
                Some(long_fields[2].to_string()),
                Some(long_fields[3].to_string()),
            )
        } else {
            (
                self.user_name(entry.attrs.uid)?,
                self.group_name(entry.attrs.gid)?,
            )
        };
        Ok(FileEntry::builder(
            entry.name.as_str(),
            remote_path::join(&[base, entry.name.as_str()]),
            file_type,
            &entry.attrs,
        )
        .owner(owner)
        .group(group)
        .build())
    }

    pub fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let path = self.normalize(path)?;
        let (base, entries) = self.with_channel(|c| {
            let base = if remote_path::is_absolute(&path) {
                path.clone()
            } else {
                c.realpath(&path)?
            };
            Ok((base, c.list(&path)?))
        })?;
        entries
            .iter()
            .filter(|entry| entry.name != "." && entry.name != "..")
            .map(|entry| self.entry_from_listing(&base, entry))
            .collect()
    }

    pub fn get(&self, path: &str) -> Result<RemoteReader> {
        let path = self.normalize(path)?;
        self.with_channel(|c| c.get(&path))
    }

    pub fn put(&self, path: &str, mode: WriteMode) -> Result<RemoteWriter> {
        let path = self.normalize(path)?;
        self.with_channel(|c| c.put(&path, mode))
    }

    pub fn realpath(&self, path: &str) -> Result<String> {
        let path = self.normalize(path)?;
        self.with_channel(|c| c.realpath(&path))
    }

    /// Any failure reads as "does not exist".
    pub fn exists(&self, path: &str) -> bool {
        match self.realpath(path) {
            Ok(_) => true,
            Err(err) => {
                self.logger.debug(
                    "Path does not resolve",
                    Some(&serde_json::json!({ "path": path, "error": err.message })),
                );
                false
            }
        }
    }

    pub fn symlink(&self, target: &str, link: &str) -> Result<()> {
        let target = self.normalize(target)?;
        let link = self.normalize(link)?;
        self.with_channel(|c| c.symlink(&target, &link))
    }

    pub fn readlink(&self, path: &str) -> Result<String> {
        let path = self.normalize(path)?;
        self.with_channel(|c| c.readlink(&path))
    }
}
