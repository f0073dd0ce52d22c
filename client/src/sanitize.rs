//! Normalisation of service identifiers into parameter and binding names.

use lazy_regex::regex;

use crate::binding::OUTPUT_FORMATS_PARAM;

/// Names that cannot be used as-is. Rust keywords, plus the name of the
/// synthetic parameter that every binding carries.
const RESERVED: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "crate",
    "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl",
    "in", "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub",
    "ref", "return", "self", "static", "struct", "super", "trait", "true", "try", "type",
    "typeof", "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
    OUTPUT_FORMATS_PARAM,
];

/// Converts `name` into a valid, lower case identifier: non-word characters
/// become `_`, a leading digit is prefixed with `_`, and reserved names get a
/// trailing `_`.
pub fn sanitize(name: &str) -> String {
    let lowered = name.to_lowercase();
    let mut sanitized = regex!(r"\W").replace_all(&lowered, "_").into_owned();
    if sanitized.starts_with(|c: char| c.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }
    if is_reserved(&sanitized) {
        sanitized.push('_');
    }
    sanitized
}

pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name)
}
