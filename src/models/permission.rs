use crate::constants::mode::{S_ISGID, S_ISUID};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FileAction {
    None = 0,
    Execute = 1,
    Write = 2,
    WriteExecute = 3,
    Read = 4,
    ReadExecute = 5,
    ReadWrite = 6,
    All = 7,
}

const ACTIONS: [FileAction; 8] = [
    FileAction::None,
    FileAction::Execute,
    FileAction::Write,
    FileAction::WriteExecute,
    FileAction::Read,
    FileAction::ReadExecute,
    FileAction::ReadWrite,
    FileAction::All,
];

impl FileAction {
    pub fn from_bits(bits: u32) -> Self {
        ACTIONS[(bits & 0o7) as usize]
    }

    pub fn bits(self) -> u32 {
        self as u32
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        ACTIONS.iter().copied().find(|action| action.symbol() == symbol)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            FileAction::None => "---",
            FileAction::Execute => "--x",
            FileAction::Write => "-w-",
            FileAction::WriteExecute => "-wx",
            FileAction::Read => "r--",
            FileAction::ReadExecute => "r-x",
            FileAction::ReadWrite => "rw-",
            FileAction::All => "rwx",
        }
    }

    pub fn implies(self, other: FileAction) -> bool {
        self.bits() & other.bits() == other.bits()
    }

    pub fn and(self, other: FileAction) -> FileAction {
        Self::from_bits(self.bits() & other.bits())
    }

    pub fn or(self, other: FileAction) -> FileAction {
        Self::from_bits(self.bits() | other.bits())
    }

    pub fn not(self) -> FileAction {
        Self::from_bits(!self.bits())
    }

    pub fn can_read(self) -> bool {
        self.implies(FileAction::Read)
    }

    pub fn can_write(self) -> bool {
        self.implies(FileAction::Write)
    }

    pub fn can_execute(self) -> bool {
        self.implies(FileAction::Execute)
    }
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Permission {
    mode: u32,
    owner: FileAction,
    group: FileAction,
    other: FileAction,
}

impl Permission {
    pub fn new(mode: u32) -> Self {
        Self {
            mode,
            owner: FileAction::from_bits(mode >> 6),
            group: FileAction::from_bits(mode >> 3),
            other: FileAction::from_bits(mode),
        }
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn octal(&self) -> String {
        format!("{:o}", self.mode & 0o7777)
    }

    pub fn owner(&self) -> FileAction {
        self.owner
    }

    pub fn group(&self) -> FileAction {
        self.group
    }

    pub fn other(&self) -> FileAction {
        self.other
    }

    pub fn is_setuid(&self) -> bool {
        self.mode & S_ISUID != 0
    }

    pub fn is_setgid(&self) -> bool {
        self.mode & S_ISGID != 0
    }

    fn render(action: FileAction, special: bool, out: &mut String) {
        out.push(if action.can_read() { 'r' } else { '-' });
        out.push(if action.can_write() { 'w' } else { '-' });
        out.push(if special {
            's'
        } else if action.can_execute() {
            'x'
        } else {
            '-'
        });
    }
}

impl From<u32> for Permission {
    fn from(mode: u32) -> Self {
        Permission::new(mode)
    }
}

impl fmt::Display for Permission {
    // The sticky bit is not rendered.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::with_capacity(9);
        Self::render(self.owner, self.is_setuid(), &mut out);
        Self::render(self.group, self.is_setgid(), &mut out);
        Self::render(self.other, false, &mut out);
        f.write_str(&out)
    }
}
