//! Minimal editing of SPECFEM `Par_file` entries of the form `KEY = value`.

use crate::{FwiError, FwiResult};
use std::fs;
use std::path::Path;

fn split_entry(line: &str) -> Option<(&str, &str)> {
    let content = line.split('#').next().unwrap_or("");
    let (key, value) = content.split_once('=')?;
    Some((key.trim(), value.trim()))
}

pub fn getpar(path: &Path, key: &str) -> FwiResult<String> {
    let text = fs::read_to_string(path)?;
    text.lines()
        .filter_map(split_entry)
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
        .ok_or_else(|| FwiError::Config(format!("{} not found in {}", key, path.display())))
}

/// Rewrite the value of `key` in place, keeping alignment and trailing comments.
pub fn setpar(path: &Path, key: &str, value: &str) -> FwiResult<()> {
    let text = fs::read_to_string(path)?;
    let mut found = false;

    let lines: Vec<String> = text
        .lines()
        .map(|line| match split_entry(line) {
            Some((k, _)) if !found && k == key => {
                found = true;
                let eq = line.find('=').unwrap_or(line.len());
                let comment = line.find('#').map(|i| &line[i..]);
                match comment {
                    Some(c) => format!("{}= {}   {}", &line[..eq], value, c),
                    None => format!("{}= {}", &line[..eq], value),
                }
            }
            _ => line.to_string(),
        })
        .collect();

    if !found {
        return Err(FwiError::Config(format!("{} not found in {}", key, path.display())));
    }

    let mut out = lines.join("\n");
    if text.ends_with('\n') {
        out.push('\n');
    }
    fs::write(path, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAR_FILE: &str = "# simulation input parameters\n\
SIMULATION_TYPE                 = 1\n\
NOISE_TOMOGRAPHY                = 0\n\
SAVE_FORWARD                    = .false.   # save last frame\n\
NPROC                           = 4\n";

    fn write_par(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("Par_file");
        fs::write(&path, PAR_FILE).unwrap();
        path
    }

    #[test]
    fn test_getpar() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_par(temp_dir.path());
        assert_eq!(getpar(&path, "NPROC").unwrap(), "4");
        assert_eq!(getpar(&path, "SAVE_FORWARD").unwrap(), ".false.");
        assert!(getpar(&path, "MODEL").is_err());
    }

    #[test]
    fn test_setpar_preserves_other_lines() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_par(temp_dir.path());

        setpar(&path, "SIMULATION_TYPE", "3").unwrap();
        setpar(&path, "SAVE_FORWARD", ".true.").unwrap();

        assert_eq!(getpar(&path, "SIMULATION_TYPE").unwrap(), "3");
        assert_eq!(getpar(&path, "SAVE_FORWARD").unwrap(), ".true.");
        assert_eq!(getpar(&path, "NOISE_TOMOGRAPHY").unwrap(), "0");

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# simulation input parameters\n"));
        assert!(text.contains("# save last frame"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_setpar_unknown_key() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_par(temp_dir.path());
        assert!(matches!(setpar(&path, "MODEL", "gll"), Err(FwiError::Config(_))));
    }
}
