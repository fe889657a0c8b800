pub mod libssh2;

use crate::config::ClientConfig;
use crate::errors::Result;
use crate::models::RawAttributes;
use std::io::{self, Read, Write};

pub use libssh2::Ssh2Transport;

pub const EXIT_STATUS_RUNNING: i32 = -1;

pub type RemoteReader = Box<dyn Read + Send>;
pub type RemoteWriter = Box<dyn Write + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Overwrite,
    Append,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub attrs: RawAttributes,
    pub long_name: Option<String>,
}

pub trait Transport: Send + Sync + 'static {
    type Session: TransportSession;

    fn connect(&self, config: &ClientConfig) -> Result<Self::Session>;
}

// Clones share the same underlying session.
pub trait TransportSession: Clone + Send + Sync + 'static {
    type Exec: ExecChannel;
    type Sftp: SftpChannel;

    fn open_exec(&self) -> Result<Self::Exec>;
    fn open_sftp(&self) -> Result<Self::Sftp>;
    /// Cheap local check; a session can still be dead when this says yes.
    fn is_alive(&self) -> bool;
    /// Sends a keepalive now and fails when the peer is gone.
    fn send_keepalive(&self) -> Result<()>;
    fn disconnect(&self);
}

pub trait ExecChannel: Send {
    fn set_env(&mut self, key: &str, value: &str) -> Result<()>;
    fn start(&mut self, command: &str) -> Result<()>;
    /// Non-blocking read. `Ok(0)` is end of stream, `WouldBlock` means no
    /// data has arrived yet.
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// [`EXIT_STATUS_RUNNING`] until the remote side reports completion.
    fn exit_status(&mut self) -> Result<i32>;
    fn disconnect(&mut self);
}

pub trait SftpChannel: Send + 'static {
    fn stat(&mut self, path: &str) -> Result<RawAttributes>;
    fn list(&mut self, path: &str) -> Result<Vec<DirEntry>>;
    fn get(&mut self, path: &str) -> Result<RemoteReader>;
    fn put(&mut self, path: &str, mode: WriteMode) -> Result<RemoteWriter>;
    fn realpath(&mut self, path: &str) -> Result<String>;
    fn symlink(&mut self, target: &str, link: &str) -> Result<()>;
    fn readlink(&mut self, path: &str) -> Result<String>;
    fn is_closed(&self) -> bool;
    fn close(&mut self);
}
