//! String helpers for locations: directory part, canonical form, default extension.
//!
//! Every function here is pure. Locations are URL-like strings; nothing in this
//! module touches the filesystem.

/// Extension appended to identifiers that do not already carry one.
pub const DEFAULT_EXTENSION: &str = ".js";

/// Directory portion of a location, up to and including the last `/` that
/// precedes any query or fragment.
///
/// `dirname("a/b/c.js?t=123#xx/zz") == "a/b/"`
pub fn dirname(path: &str) -> &str {
    let (head, _) = split_suffix(path);
    match head.rfind('/') {
        Some(i) => &path[..=i],
        None => "",
    }
}

/// Canonical form of a location.
///
/// Drops `.` segments and empty segments left by repeated slashes, then folds
/// each `name/..` pair. The `scheme://host` prefix is never touched, and a
/// `..` that would climb above the root is discarded. Query and fragment are
/// carried over verbatim. The result is a fixed point: `realpath(realpath(x)) ==
/// realpath(x)`.
pub fn realpath(path: &str) -> String {
    let (head, suffix) = split_suffix(path);
    let (prefix, rest) = split_authority(head);
    let rooted = rest.starts_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(last) if *last != ".." => {
                    segments.pop();
                }
                _ if rooted || !prefix.is_empty() => {}
                _ => segments.push(".."),
            },
            name => segments.push(name),
        }
    }

    let trailing = rest.ends_with('/') || rest.ends_with("/.") || rest.ends_with("/..");

    let mut out = String::with_capacity(path.len());
    out.push_str(prefix);
    if rooted {
        out.push('/');
    }
    out.push_str(&segments.join("/"));
    if trailing && !segments.is_empty() {
        out.push('/');
    }
    out.push_str(suffix);
    out
}

/// Append [`DEFAULT_EXTENSION`] unless the identifier already has it, carries a
/// query string, or names a directory. A trailing `#` is stripped instead and
/// suppresses the extension.
///
/// `normalize("path/to/a") == "path/to/a.js"`, `normalize("a.css#") == "a.css"`
pub fn normalize(id: &str) -> String {
    if let Some(stripped) = id.strip_suffix('#') {
        return stripped.to_string();
    }

    let has_query = id.find('?').is_some_and(|i| i > 0);
    if id.ends_with(DEFAULT_EXTENSION) || has_query || id.ends_with('/') {
        id.to_string()
    } else {
        format!("{id}{DEFAULT_EXTENSION}")
    }
}

/// Whether the identifier already names an absolute location: it has a scheme
/// or is protocol-relative (`//host/...`).
pub fn is_absolute(id: &str) -> bool {
    (id.starts_with("//") && id.len() > 2) || id.contains(":/")
}

/// `scheme://host/` part of a location, if it has one.
///
/// `root_dir("http://www.example.com/zhidao/answer/") == Some("http://www.example.com/")`
pub fn root_dir(location: &str) -> Option<&str> {
    let start = location.find("//")? + 2;
    let end = location[start..].find('/')? + start;
    Some(&location[..=end])
}

/// Scheme of a location including the colon, e.g. `"https:"`.
pub fn scheme(location: &str) -> Option<&str> {
    let i = location.find("://")?;
    let candidate = &location[..i];
    if candidate.is_empty() || candidate.contains('/') {
        return None;
    }
    Some(&location[..=i])
}

fn split_suffix(path: &str) -> (&str, &str) {
    match path.find(|c| c == '?' || c == '#') {
        Some(i) => path.split_at(i),
        None => (path, ""),
    }
}

// Splits `scheme://host` (or `//host`) from the path that follows it.
fn split_authority(head: &str) -> (&str, &str) {
    let authority_start = if scheme(head).is_some() {
        head.find("://").map(|i| i + 3)
    } else if head.starts_with("//") {
        Some(2)
    } else {
        None
    };

    match authority_start {
        Some(start) => match head[start..].find('/') {
            Some(j) => head.split_at(start + j),
            None => (head, ""),
        },
        None => ("", head),
    }
}
