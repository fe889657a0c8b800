mod ssh_error;

pub use ssh_error::{Result, SshError, SshErrorKind};
