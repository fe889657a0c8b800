pub const SLASH: &str = "/";

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|part| !part.is_empty())
}

/// The result is absolute iff the first segment is.
pub fn join<S: AsRef<str>>(parts: &[S]) -> String {
    let Some(first) = parts.first() else {
        return String::new();
    };
    let first = first.as_ref();
    let mut out = String::new();
    if is_absolute(first) {
        out.push('/');
    }
    let mut written = false;
    for part in std::iter::once(first).chain(parts[1..].iter().map(|p| p.as_ref())) {
        for segment in segments(part) {
            if written {
                out.push('/');
            }
            out.push_str(segment);
            written = true;
        }
    }
    out
}

/// Everything before the last separator. `"path"` has no parent and yields
/// an empty string; a top-level absolute path yields `"/"`.
pub fn parent(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed == SLASH {
        return String::new();
    }
    let trimmed = trimmed.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => SLASH.to_string(),
        Some(idx) => trimmed[..idx].to_string(),
        None => String::new(),
    }
}

/// Last path component; surrounding whitespace of the input is ignored.
pub fn basename(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed == SLASH {
        return SLASH.to_string();
    }
    trimmed
        .split('/')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .last()
        .unwrap_or("")
        .to_string()
}

pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

pub fn is_relative(path: &str) -> bool {
    !is_absolute(path)
}

pub fn expand_home(path: &str, home: &str) -> String {
    if path == "~" {
        return home.to_string();
    }
    match path.strip_prefix("~/") {
        Some(rest) => join(&[home, rest]),
        None => path.to_string(),
    }
}

pub fn has_home_prefix(path: &str) -> bool {
    path == "~" || path.starts_with("~/")
}
