pub mod command_result;
pub mod file_entry;
pub mod file_type;
pub mod permission;

pub use command_result::CommandResult;
pub use file_entry::{FileEntry, RawAttributes};
pub use file_type::FileType;
pub use permission::{FileAction, Permission};
