pub const XMIND_EXTENSION: &str = ".xmind";

/// File name a drive entry is stored under.
///
/// Separators are flattened so a name can never leave the backup directory.
/// Distinct entries that end up with the same name overwrite each other.
/// Blank names were already replaced during listing normalization.
pub fn sanitized_name(name: &str) -> String {
    let base: String = name
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    if base.ends_with(XMIND_EXTENSION) {
        base
    } else {
        format!("{base}{XMIND_EXTENSION}")
    }
}

pub fn backup_path(backup_dir: &str, file_name: &str) -> String {
    let dir = backup_dir.trim_end_matches('/');
    if dir.is_empty() {
        file_name.to_string()
    } else {
        format!("{dir}/{file_name}")
    }
}
