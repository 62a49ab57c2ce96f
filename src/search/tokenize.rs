//! Identifier and query tokenization.
//!
//! Produces the searchable views of an FQN: package segments, CamelCase
//! splits of the simple name, the leading-letters abbreviation, and the
//! case-folded simple name.

/// Split an identifier on CamelCase boundaries, lowercased.
///
/// Consecutive uppercase letters group into one part, so `XMLParser`
/// yields `xml` and `parser`.
pub fn camel_parts(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut parts = Vec::new();
    let mut current = String::new();

    for (i, c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            continue;
        }
        let starts_word = c.is_uppercase()
            && (i == 0
                || !chars[i - 1].is_alphanumeric()
                || chars[i - 1].is_lowercase()
                || chars[i - 1].is_numeric()
                || chars.get(i + 1).is_some_and(|n| n.is_lowercase()));
        if starts_word && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Leading-letters abbreviation: the uppercase initials, lowercased.
///
/// `RichPresentationCompiler` becomes `rpc`.
pub fn abbreviation(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_uppercase())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Simple name of an FQN: the segment after the last `.`.
pub fn simple_name(fqn: &str) -> &str {
    fqn.rsplit_once('.').map_or(fqn, |(_, name)| name)
}

/// Package part of an FQN, empty for the default package.
pub fn package_of(fqn: &str) -> &str {
    fqn.rsplit_once('.').map_or("", |(pkg, _)| pkg)
}

/// Searchable name parts of a simple name: CamelCase splits of each
/// `$`-separated piece plus the case-folded pieces themselves.
pub fn name_parts(simple: &str) -> Vec<String> {
    let mut parts = Vec::new();
    for piece in simple.split('$').filter(|p| !p.is_empty()) {
        parts.extend(camel_parts(piece));
        let folded = piece.to_lowercase();
        if !parts.contains(&folded) {
            parts.push(folded);
        }
    }
    parts
}

/// Split a user query on whitespace and `.`, case-folded.
pub fn query_tokens(query: &str) -> Vec<String> {
    query
        .split(|c: char| c.is_whitespace() || c == '.')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}
