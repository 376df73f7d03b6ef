//! `.env` file parsing into a key/value map; application happens in `lib`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Resolves the `.env` path: `dir` when given, else the current directory.
/// Returns `None` when no readable `.env` file is there.
fn env_file_path(dir: Option<&Path>) -> Option<PathBuf> {
    let base = match dir {
        Some(d) => d.to_path_buf(),
        None => std::env::current_dir().ok()?,
    };
    let path = base.join(".env");
    path.is_file().then_some(path)
}

/// Strips matching surrounding quotes from a value.
///
/// Double quotes support the `\"` escape; single quotes are literal.
fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        return value[1..value.len() - 1].replace("\\\"", "\"");
    }
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        return value[1..value.len() - 1].to_string();
    }
    value.to_string()
}

/// Parses `KEY=VALUE` lines. Blank lines and `#` comment lines are skipped;
/// lines without `=` or with an empty key are ignored. No line continuations.
fn parse(content: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), unquote(value.trim()));
    }
    map
}

/// Loads `.env` from `dir` (or the current directory) into a map.
/// A missing file yields an empty map; a read failure is an error.
pub fn load(dir: Option<&Path>) -> std::io::Result<HashMap<String, String>> {
    match env_file_path(dir) {
        Some(path) => Ok(parse(&std::fs::read_to_string(path)?)),
        None => Ok(HashMap::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Plain KEY=VALUE pairs parse; comments and blanks are skipped.
    #[test]
    fn parse_pairs_and_skip_noise() {
        let map = parse("# comment\n\nALPHA=1\nBETA = two \n");
        assert_eq!(map.get("ALPHA").map(String::as_str), Some("1"));
        assert_eq!(map.get("BETA").map(String::as_str), Some("two"));
        assert_eq!(map.len(), 2);
    }

    /// **Scenario**: Quoted values are unquoted; escaped quotes survive.
    #[test]
    fn parse_quoted_values() {
        let map = parse("A=\"x y\"\nB='z'\nC=\"say \\\"hi\\\"\"\n");
        assert_eq!(map.get("A").map(String::as_str), Some("x y"));
        assert_eq!(map.get("B").map(String::as_str), Some("z"));
        assert_eq!(map.get("C").map(String::as_str), Some("say \"hi\""));
    }

    /// **Scenario**: Lines without `=` and empty keys are ignored; empty values kept.
    #[test]
    fn parse_degenerate_lines() {
        let map = parse("JUSTAWORD\n=nokey\nEMPTY=\n");
        assert_eq!(map.get("EMPTY").map(String::as_str), Some(""));
        assert_eq!(map.len(), 1);
    }

    /// **Scenario**: Missing .env yields an empty map, not an error.
    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(dir.path())).unwrap().is_empty());
    }

    /// **Scenario**: A real .env file in the given directory is read.
    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "K=v\n").unwrap();
        let map = load(Some(dir.path())).unwrap();
        assert_eq!(map.get("K").map(String::as_str), Some("v"));
    }
}
