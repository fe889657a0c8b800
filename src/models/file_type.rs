use crate::constants::mode::{
    S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO, S_IFLNK, S_IFMT, S_IFREG, S_IFSOCK,
};
use crate::errors::SshError;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Regular,
    Directory,
    Block,
    Character,
    Pipe,
    SymbolicLink,
    Socket,
}

impl FileType {
    const ALL: [FileType; 7] = [
        FileType::Regular,
        FileType::Directory,
        FileType::Block,
        FileType::Character,
        FileType::Pipe,
        FileType::SymbolicLink,
        FileType::Socket,
    ];

    pub fn mask(self) -> u32 {
        match self {
            FileType::Regular => S_IFREG,
            FileType::Directory => S_IFDIR,
            FileType::Block => S_IFBLK,
            FileType::Character => S_IFCHR,
            FileType::Pipe => S_IFIFO,
            FileType::SymbolicLink => S_IFLNK,
            FileType::Socket => S_IFSOCK,
        }
    }

    pub fn from_mode(mode: u32) -> Result<Self, SshError> {
        let masked = mode & S_IFMT;
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.mask() == masked)
            .ok_or_else(|| {
                SshError::operation(format!("Unknown file type: {:#o}", masked))
            })
    }

    pub fn symbol(self) -> char {
        match self {
            FileType::Regular => '-',
            FileType::Directory => 'd',
            FileType::Block => 'b',
            FileType::Character => 'c',
            FileType::Pipe => 'p',
            FileType::SymbolicLink => 'l',
            FileType::Socket => 's',
        }
    }
}
