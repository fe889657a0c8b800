pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod models;
pub mod transport;

pub mod managers {
    pub mod remote;
}

pub mod services {
    pub mod executor;
    pub mod logger;
    pub mod session;
    pub mod sftp;
}

pub mod utils {
    pub mod fs_atomic;
    pub mod remote_path;
    pub mod shell;
    pub mod user_paths;
}

pub use app::SshClient;
pub use config::{ClientConfig, Credential};
pub use errors::{Result, SshError, SshErrorKind};
pub use managers::remote::RemoteFileSystem;
pub use models::{CommandResult, FileAction, FileEntry, FileType, Permission};
