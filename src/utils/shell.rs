pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

pub fn command_line(program: &str, flag: Option<&str>, args: &[&str]) -> String {
    let mut parts = vec![program.to_string()];
    if let Some(flag) = flag {
        parts.push(flag.to_string());
    }
    parts.extend(args.iter().map(|arg| quote(arg)));
    parts.join(" ")
}

pub fn compose_script(source_files: &[String], commands: &[String]) -> String {
    source_files
        .iter()
        .map(|file| format!("source {}", file))
        .chain(commands.iter().cloned())
        .collect::<Vec<_>>()
        .join("\n")
}
