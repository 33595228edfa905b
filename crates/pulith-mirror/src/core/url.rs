/// Join a mirror base URL and a relative path with exactly one `/` between them.
///
/// Trailing slashes on the base path and leading slashes on the relative path are
/// collapsed. A query or fragment on the base URL is kept after the joined path.
///
/// # Examples
///
/// ```
/// use pulith_mirror::join_url;
///
/// assert_eq!(join_url("http://h/dir/", "f.zip"), "http://h/dir/f.zip");
/// assert_eq!(join_url("http://h/dir", "f.zip"), "http://h/dir/f.zip");
/// assert_eq!(join_url("http://h/dir/", "/f.zip"), "http://h/dir/f.zip");
/// ```
pub fn join_url(base: &str, relative: &str) -> String {
    let (path, suffix) = match base.find(['?', '#']) {
        Some(i) => base.split_at(i),
        None => (base, ""),
    };
    let path = path.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');

    let mut joined = String::with_capacity(path.len() + relative.len() + suffix.len() + 1);
    joined.push_str(path);
    joined.push('/');
    joined.push_str(relative);
    joined.push_str(suffix);
    joined
}
