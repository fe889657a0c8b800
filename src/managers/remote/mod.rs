use crate::errors::{Result, SshError};
use crate::models::{CommandResult, FileEntry, FileType};
use crate::services::executor::CommandExecutor;
use crate::services::logger::Logger;
use crate::services::sftp::SftpOperations;
use crate::transport::{RemoteReader, RemoteWriter, Transport, WriteMode};
use std::sync::Arc;

mod copy;
mod shell_ops;

/// Shell-backed operations count as failed when they write anything to
/// stderr, whatever their exit code.
pub struct RemoteFileSystem<T: Transport> {
    logger: Logger,
    executor: Arc<CommandExecutor<T>>,
    sftp: Arc<SftpOperations<T>>,
}

impl<T: Transport> RemoteFileSystem<T> {
    pub fn new(
        executor: Arc<CommandExecutor<T>>,
        sftp: Arc<SftpOperations<T>>,
        logger: Logger,
    ) -> Self {
        Self {
            logger: logger.child("fs"),
            executor,
            sftp,
        }
    }

    pub fn executor(&self) -> &CommandExecutor<T> {
        &self.executor
    }

    pub fn sftp(&self) -> &SftpOperations<T> {
        &self.sftp
    }

    /// Unlike the file operations, stderr is returned rather than raised.
    pub fn execute<S: AsRef<str>>(&self, commands: &[S]) -> Result<CommandResult> {
        self.executor.execute(commands)
    }

    fn run_shell(&self, command: String, path: &str) -> Result<CommandResult> {
        let result = self.executor.execute(&[command.as_str()])?;
        if result.has_error() {
            let stderr = result.stderr_str();
            self.logger.warn(
                "Remote command reported an error",
                Some(&serde_json::json!({ "command": command, "stderr": stderr.trim() })),
            );
            return Err(SshError::operation(stderr.trim().to_string()).with_path(path));
        }
        Ok(result)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.sftp.exists(path)
    }

    pub fn is_dir(&self, path: &str) -> Result<bool> {
        Ok(self.sftp.file_type(path)? == FileType::Directory)
    }

    pub fn get_file(&self, path: &str) -> Result<FileEntry> {
        if !self.exists(path) {
            return Err(SshError::file_not_found(path));
        }
        self.sftp.stat(path)
    }

    pub fn list_files(&self, path: &str) -> Result<Vec<FileEntry>> {
        if !self.exists(path) {
            return Err(SshError::file_not_found(path));
        }
        if !self.is_dir(path)? {
            return Err(SshError::not_a_directory(path));
        }
        self.sftp.list(path)
    }

    pub fn absolute_path(&self, path: &str) -> Result<String> {
        self.sftp.realpath(path)
    }

    pub fn open_file(&self, path: &str) -> Result<RemoteReader> {
        if !self.exists(path) {
            return Err(SshError::file_not_found(path));
        }
        if self.is_dir(path)? {
            return Err(SshError::not_a_file(path));
        }
        self.sftp.get(path)
    }

    pub fn create_file(&self, path: &str) -> Result<RemoteWriter> {
        if self.exists(path) {
            return Err(SshError::file_exists(path));
        }
        self.sftp.put(path, WriteMode::Overwrite)
    }

    pub fn append_file(&self, path: &str) -> Result<RemoteWriter> {
        if !self.exists(path) {
            return Err(SshError::file_not_found(path));
        }
        if self.is_dir(path)? {
            return Err(SshError::not_a_file(path));
        }
        self.sftp.put(path, WriteMode::Append)
    }

    pub fn create_symlink(&self, target: &str, link: &str) -> Result<()> {
        if self.sftp.attributes(link).is_ok() {
            return Err(SshError::file_exists(link));
        }
        self.sftp.symlink(target, link)
    }

    pub fn read_symlink(&self, path: &str) -> Result<String> {
        self.sftp.readlink(path)
    }
}
