use rand::{distributions::Alphanumeric, Rng};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

pub fn ensure_parent_dir(path: impl AsRef<Path>) -> io::Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn temp_sibling_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path.file_name().and_then(|s| s.to_str()).unwrap_or("download");
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    parent.join(format!(".{}.{}.part", file_name, token))
}

// The partial file is removed on failure.
pub fn persist_stream<R: Read + ?Sized>(reader: &mut R, dest: impl AsRef<Path>) -> io::Result<u64> {
    let dest = dest.as_ref();
    let tmp = temp_sibling_path(dest);
    let copied = {
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp)?;
        match io::copy(reader, &mut file).and_then(|n| file.sync_all().map(|_| n)) {
            Ok(n) => n,
            Err(err) => {
                drop(file);
                fs::remove_file(&tmp).ok();
                return Err(err);
            }
        }
    };
    if let Err(err) = fs::rename(&tmp, dest) {
        fs::remove_file(&tmp).ok();
        return Err(err);
    }
    Ok(copied)
}
