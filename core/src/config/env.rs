//! `.env` file support
//!
//! File values are never written into the process environment. They are
//! consulted only for keys the real environment does not define, so the real
//! environment always wins over files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Candidate `.env` locations, most specific first
pub fn env_file_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".env"));
    }
    if let Some(dir) = super::get_config_dir() {
        paths.push(dir.join("aide.env"));
    }
    paths
}

/// Read every existing candidate file.
///
/// A key set by a more specific file is not replaced by a later one.
pub fn load_env_files() -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for path in env_file_candidates() {
        load_env_file(&path, &mut vars);
    }
    vars
}

fn load_env_file(path: &Path, vars: &mut BTreeMap<String, String>) {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return;
    };
    debug!("Loading environment from {}", path.display());
    merge_env_vars(vars, parse_env_file(&contents));
}

fn merge_env_vars(vars: &mut BTreeMap<String, String>, parsed: Vec<(String, String)>) {
    for (key, value) in parsed {
        vars.entry(key).or_insert(value);
    }
}

/// Look a key up in `process` first and fall back to the file values
pub fn layered_lookup<'a, F>(
    process: F,
    files: &'a BTreeMap<String, String>,
) -> impl Fn(&str) -> Option<String> + 'a
where
    F: Fn(&str) -> Option<String> + 'a,
{
    move |key| process(key).or_else(|| files.get(key).cloned())
}

/// Parse env file contents into key/value pairs
pub fn parse_env_file(contents: &str) -> Vec<(String, String)> {
    let mut vars = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line);

        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            if !key.is_empty() {
                vars.push((key.to_string(), value.to_string()));
            }
        }
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_export_and_quoted_values() {
        let vars = parse_env_file(
            "# comment\n\nOPENAI_API_KEY=sk-abc\nexport MODEL_NAME=\"gpt-4o\"\nTEMPERATURE='0.3'\nbroken line\n",
        );
        assert_eq!(
            vars,
            vec![
                ("OPENAI_API_KEY".to_string(), "sk-abc".to_string()),
                ("MODEL_NAME".to_string(), "gpt-4o".to_string()),
                ("TEMPERATURE".to_string(), "0.3".to_string()),
            ]
        );
    }

    #[test]
    fn keeps_equals_inside_values() {
        let vars = parse_env_file("OPENAI_BASE_URL=http://localhost:8080/v1?a=b\n");
        assert_eq!(vars[0].1, "http://localhost:8080/v1?a=b");
    }

    #[test]
    fn process_environment_beats_file_values() {
        let files = BTreeMap::from([
            ("MODEL_NAME".to_string(), "from-file".to_string()),
            ("TEMPERATURE".to_string(), "0.9".to_string()),
        ]);
        let lookup = layered_lookup(
            |key| (key == "MODEL_NAME").then(|| "from-process".to_string()),
            &files,
        );
        assert_eq!(lookup("MODEL_NAME").as_deref(), Some("from-process"));
        assert_eq!(lookup("TEMPERATURE").as_deref(), Some("0.9"));
        assert_eq!(lookup("MAX_TOKENS"), None);
    }

    #[test]
    fn earlier_file_keeps_its_values() {
        let mut vars = BTreeMap::new();
        merge_env_vars(&mut vars, parse_env_file("MODEL_NAME=local\n"));
        merge_env_vars(&mut vars, parse_env_file("MODEL_NAME=global\nMAX_TOKENS=512\n"));
        assert_eq!(vars["MODEL_NAME"], "local");
        assert_eq!(vars["MAX_TOKENS"], "512");
    }

    #[test]
    fn missing_file_adds_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut vars = BTreeMap::new();
        load_env_file(&dir.path().join("absent.env"), &mut vars);
        assert!(vars.is_empty());

        let path = dir.path().join("aide.env");
        std::fs::write(&path, "OPENAI_API_KEY=sk-file\n").unwrap();
        load_env_file(&path, &mut vars);
        assert_eq!(vars["OPENAI_API_KEY"], "sk-file");
    }
}
