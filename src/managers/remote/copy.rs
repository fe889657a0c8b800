use crate::errors::{Result, SshError};
use crate::models::file_entry::epoch_seconds;
use crate::transport::{Transport, WriteMode};
use crate::utils::fs_atomic::{ensure_parent_dir, persist_stream};
use crate::utils::remote_path;
use crate::utils::user_paths::{display, expand_local_home};
use std::fs;
use std::io::{self, BufReader, Write};
use std::path::Path;
use walkdir::WalkDir;

use super::RemoteFileSystem;
use crate::constants::network::COPY_BUFFER_BYTES;

impl<T: Transport> RemoteFileSystem<T> {
    /// A file copied onto an existing remote directory lands inside it.
    pub fn copy_from_local(&self, src: &str, dst: &str, overwrite: bool) -> Result<()> {
        if src.trim().is_empty() {
            return Err(SshError::invalid_argument("Source path must not be empty"));
        }
        let dst = if dst.trim().is_empty() { "." } else { dst };
        let local = expand_local_home(src);
        let meta = fs::metadata(&local).map_err(|_| SshError::local_file_not_found(&display(&local)))?;
        let dst = self.sftp.normalize(dst)?;

        self.logger.debug(
            "Copying from local",
            Some(&serde_json::json!({ "src": display(&local), "dst": dst, "overwrite": overwrite })),
        );
        if meta.is_dir() {
            return self.upload_dir(&local, &dst, overwrite);
        }
        if self.exists(&dst) && self.is_dir(&dst)? {
            let name = local
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            return self.upload_file(&local, &remote_path::join(&[dst.as_str(), name.as_str()]), overwrite);
        }
        self.upload_file(&local, &dst, overwrite)
    }

    fn ensure_remote_dir(&self, path: &str) -> Result<()> {
        if self.exists(path) {
            if self.is_dir(path)? {
                return Ok(());
            }
            return Err(SshError::not_a_directory(path));
        }
        self.mkdir(path, true)
    }

    fn upload_dir(&self, local: &Path, dst: &str, overwrite: bool) -> Result<()> {
        self.ensure_remote_dir(dst)?;
        let walker = WalkDir::new(local)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name();
        for entry in walker {
            let entry = entry.map_err(|err| {
                let path = err
                    .path()
                    .map(display)
                    .unwrap_or_else(|| display(local));
                SshError::operation(format!("Failed to walk {}: {}", path, err)).with_path(path)
            })?;
            let relative = entry.path().strip_prefix(local).map_err(|_| {
                SshError::operation(format!("Unexpected path {}", display(entry.path())))
            })?;
            let mut parts = vec![dst.to_string()];
            parts.extend(
                relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().to_string()),
            );
            let remote = remote_path::join(&parts);
            if entry.file_type().is_dir() {
                self.ensure_remote_dir(&remote)?;
            } else {
                self.upload_file(entry.path(), &remote, overwrite)?;
            }
        }
        Ok(())
    }

    fn upload_file(&self, local: &Path, dst: &str, overwrite: bool) -> Result<()> {
        let meta = fs::metadata(local).map_err(|_| SshError::local_file_not_found(&display(local)))?;
        if !meta.is_file() {
            return Err(SshError::not_a_file(&display(local)));
        }
        let parent = remote_path::parent(dst);
        if !parent.is_empty() && !self.exists(&parent) {
            self.mkdir(&parent, true)?;
        }
        if self.exists(dst) {
            if self.is_dir(dst)? {
                return Err(SshError::not_a_file(dst));
            }
            if !overwrite {
                return Err(SshError::file_exists(dst));
            }
        }

        let file = fs::File::open(local)?;
        let mut reader = BufReader::with_capacity(COPY_BUFFER_BYTES, file);
        let mut writer = self.sftp.put(dst, WriteMode::Overwrite)?;
        let bytes = io::copy(&mut reader, &mut writer)
            .and_then(|n| writer.flush().map(|_| n))
            .map_err(|err| SshError::wrap(format!("Failed to upload {}", dst), err).with_path(dst))?;
        self.logger.debug(
            "Uploaded file",
            Some(&serde_json::json!({ "src": display(local), "dst": dst, "bytes": bytes })),
        );
        Ok(())
    }

    /// Existing local files are never replaced.
    pub fn copy_to_local(&self, src: &str, dst: &str) -> Result<()> {
        if src.trim().is_empty() {
            return Err(SshError::invalid_argument("Source path must not be empty"));
        }
        let dst = if dst.trim().is_empty() { "." } else { dst };
        let src = self.sftp.normalize(src)?;
        if !self.exists(&src) {
            return Err(SshError::file_not_found(&src));
        }
        let local = expand_local_home(dst);
        if self.is_dir(&src)? {
            return self.download_dir(&src, &local);
        }
        if local.is_dir() {
            return self.download_file(&src, &local.join(remote_path::basename(&src)));
        }
        self.download_file(&src, &local)
    }

    fn download_dir(&self, src: &str, local: &Path) -> Result<()> {
        if local.exists() && !local.is_dir() {
            return Err(SshError::not_a_directory(&display(local)));
        }
        fs::create_dir_all(local)?;
        for entry in self.sftp.list(src)? {
            let target = local.join(entry.name());
            if entry.is_directory() {
                self.download_dir(entry.path(), &target)?;
            } else {
                self.download_file(entry.path(), &target)?;
            }
        }
        Ok(())
    }

    fn download_file(&self, src: &str, local: &Path) -> Result<()> {
        if local.exists() {
            if local.is_dir() {
                return Err(SshError::not_a_file(&display(local)));
            }
            return Err(SshError::file_exists(&display(local)));
        }
        ensure_parent_dir(local)?;
        let attrs = self.sftp.attributes(src)?;
        let mut reader = self.open_file(src)?;
        let bytes = persist_stream(&mut reader, local)
            .map_err(|err| SshError::wrap(format!("Failed to download {}", src), err).with_path(src))?;
        let atime = filetime::FileTime::from_unix_time(epoch_seconds(attrs.atime).timestamp(), 0);
        let mtime = filetime::FileTime::from_unix_time(epoch_seconds(attrs.mtime).timestamp(), 0);
        if let Err(err) = filetime::set_file_times(local, atime, mtime) {
            self.logger.warn(
                "Failed to apply remote file times",
                Some(&serde_json::json!({ "path": display(local), "error": err.to_string() })),
            );
        }
        self.logger.debug(
            "Downloaded file",
            Some(&serde_json::json!({ "src": src, "dst": display(local), "bytes": bytes })),
        );
        Ok(())
    }
}
