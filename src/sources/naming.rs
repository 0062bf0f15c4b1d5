use std::path::Path;

/// Keeps characters that are safe in a file name; runs of anything else become one `-`
pub fn sanitize_file_stem(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            if pending_dash && !sanitized.is_empty() {
                sanitized.push('-');
            }
            pending_dash = false;
            sanitized.push(c);
        } else {
            pending_dash = true;
        }
    }

    sanitized
}

/// Script name for a daemon image reference
/// If no tag is specified, adds "latest" as the default tag
pub fn script_name_for_image(image_name: &str) -> String {
    let normalized = if !image_name.contains(':') && !image_name.contains('@') {
        format!("{}:latest", image_name)
    } else {
        image_name.to_string()
    };

    let stem = sanitize_file_stem(&normalized.replace([':', '/', '@'], "-"));
    format!("{}.sh", if stem.is_empty() { "image" } else { &stem })
}

/// Script name for a tarball path: the file name without its extension
pub fn script_name_for_tar(tar_path: &str) -> String {
    let stem = Path::new(tar_path)
        .file_stem()
        .and_then(|name| name.to_str())
        .map(sanitize_file_stem)
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "tar-image".to_string());

    format!("{}.sh", stem)
}
