use crate::errors::{Result, SshError};
use crate::models::Permission;
use crate::transport::Transport;
use crate::utils::shell::command_line;

use super::RemoteFileSystem;

fn recursive_flag(recursive: bool) -> Option<&'static str> {
    recursive.then_some("-R")
}

impl<T: Transport> RemoteFileSystem<T> {
    // Refuses to replace an existing destination.
    pub fn move_path(&self, src: &str, dst: &str) -> Result<()> {
        let src = self.sftp.normalize(src)?;
        let dst = self.sftp.normalize(dst)?;
        if !self.exists(&src) {
            return Err(SshError::file_not_found(&src));
        }
        if self.exists(&dst) {
            return Err(SshError::file_exists(&dst));
        }
        self.run_shell(command_line("mv", None, &[src.as_str(), dst.as_str()]), &src)?;
        Ok(())
    }

    pub fn delete(&self, path: &str, recursive: bool) -> Result<()> {
        let path = self.sftp.normalize(path)?;
        if !self.exists(&path) {
            self.logger.debug(
                "Delete skipped, path missing",
                Some(&serde_json::json!({ "path": path })),
            );
            return Ok(());
        }
        let flag = if recursive { "-rf" } else { "-f" };
        self.run_shell(command_line("rm", Some(flag), &[path.as_str()]), &path)?;
        Ok(())
    }

    pub fn mkdir(&self, path: &str, create_parents: bool) -> Result<()> {
        let path = self.sftp.normalize(path)?;
        let flag = create_parents.then_some("-p");
        self.run_shell(command_line("mkdir", flag, &[path.as_str()]), &path)?;
        Ok(())
    }

    pub fn chown(&self, path: &str, owner: &str, recursive: bool) -> Result<()> {
        if owner.trim().is_empty() {
            return Err(SshError::invalid_argument("owner must not be empty"));
        }
        let absolute = self.absolute_path(path)?;
        self.run_shell(
            command_line("chown", recursive_flag(recursive), &[owner, absolute.as_str()]),
            &absolute,
        )?;
        Ok(())
    }

    pub fn chgrp(&self, path: &str, group: &str, recursive: bool) -> Result<()> {
        if group.trim().is_empty() {
            return Err(SshError::invalid_argument("group must not be empty"));
        }
        let absolute = self.absolute_path(path)?;
        self.run_shell(
            command_line("chgrp", recursive_flag(recursive), &[group, absolute.as_str()]),
            &absolute,
        )?;
        Ok(())
    }

    pub fn chmod(&self, path: &str, permission: impl Into<Permission>, recursive: bool) -> Result<()> {
        let permission = permission.into();
        let absolute = self.absolute_path(path)?;
        let octal = permission.octal();
        self.run_shell(
            command_line("chmod", recursive_flag(recursive), &[octal.as_str(), absolute.as_str()]),
            &absolute,
        )?;
        Ok(())
    }
}
