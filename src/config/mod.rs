//! Loading and parsing of programmer/part config files.

pub mod build;
pub mod lexer;
pub mod parser;

use std::path::{Path, PathBuf};

use crate::error::{AvrError, AvrResult};
use crate::model::Config;

/// Parse and build a single config file's contents into a `Config`.
pub fn parse_str(source: &str, file: &Path) -> AvrResult<Config> {
    let toks = lexer::tokenize(source, file).map_err(AvrError::file)?;
    let raw = parser::parse(&toks, file.to_path_buf()).map_err(AvrError::file)?;
    build::build_file(raw, file)
}

/// Load and merge a sequence of config files in order, later files
/// amending earlier ones. Missing files are a `File` error.
pub fn load_files(paths: &[PathBuf]) -> AvrResult<Config> {
    let mut cfg = Config::new();
    for path in paths {
        let source = std::fs::read_to_string(path)
            .map_err(|e| AvrError::file(format!("{}: {e}", path.display())))?;
        cfg.merge(parse_str(&source, path)?);
    }
    Ok(cfg)
}

/// Default search path for the system and per-user config files, honoring
/// the `-C` override:
/// an explicit `-C path` replaces the system config entirely, otherwise
/// `/etc/avrtool.conf` is loaded first and `$HOME/.avrtoolrc` is merged on
/// top of it if present.
pub fn default_search_path(explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(p) = explicit {
        return vec![p.to_path_buf()];
    }
    let mut paths = vec![PathBuf::from("/etc/avrtool.conf")];
    if let Ok(home) = std::env::var("HOME") {
        paths.push(PathBuf::from(home).join(".avrtoolrc"));
    }
    paths
}

/// Load from `default_search_path`, skipping files that don't exist rather
/// than treating an absent per-user rc as fatal (only an explicit `-C`
/// path must exist).
pub fn load_default(explicit: Option<&Path>) -> AvrResult<Config> {
    let mut cfg = Config::new();
    for (i, path) in default_search_path(explicit).into_iter().enumerate() {
        let is_explicit = explicit.is_some() && i == 0;
        match std::fs::read_to_string(&path) {
            Ok(source) => cfg.merge(parse_str(&source, &path)?),
            Err(_) if !is_explicit => continue,
            Err(e) => return Err(AvrError::file(format!("{}: {e}", path.display()))),
        }
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_honors_explicit_override() {
        let explicit = PathBuf::from("/tmp/custom.conf");
        let paths = default_search_path(Some(&explicit));
        assert_eq!(paths, vec![explicit]);
    }

    #[test]
    fn load_missing_explicit_file_errors() {
        let err = load_default(Some(Path::new("/nonexistent/avrtool.conf"))).unwrap_err();
        assert!(matches!(err, AvrError::File(_)));
    }
}
