use std::path::{Path, PathBuf};

pub fn expand_local_home(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let Some(raw) = path.to_str() else {
        return path.to_path_buf();
    };
    let home = match std::env::var("HOME") {
        Ok(home) if !home.trim().is_empty() => PathBuf::from(home),
        _ => return path.to_path_buf(),
    };
    if raw == "~" {
        return home;
    }
    match raw.strip_prefix("~/") {
        Some(rest) => home.join(rest),
        None => path.to_path_buf(),
    }
}

pub fn display(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
