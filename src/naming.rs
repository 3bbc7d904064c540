//! Name helpers: labels from column names, endpoints from view names, safe upload file names.

/// Convert a single identifier from camelCase to snake_case.
/// e.g. "userId" -> "user_id", "BlogPost" -> "blog_post"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Human label for a column or view name: "user_name" -> "User Name".
pub fn prettify_name(name: &str) -> String {
    name.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Endpoint for a view: explicit value, else the snake_cased name with spaces removed.
pub fn endpoint_for(name: &str) -> String {
    to_snake_case(&name.replace(' ', "")).to_lowercase()
}

/// Strip a user supplied file name down to ASCII letters, digits, `_`, `-` and `.`.
/// Path separators become `_`; leading dots and underscores are dropped so the
/// result can never be hidden or traverse directories. May return an empty string.
pub fn secure_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '/' | '\\' | ' ' => out.push('_'),
            c if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' => out.push(c),
            _ => {}
        }
    }
    let trimmed = out.trim_start_matches(&['.', '_'][..]).trim_end_matches(&['.', '_'][..]);
    trimmed.to_string()
}
