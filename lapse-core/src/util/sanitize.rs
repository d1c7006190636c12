use crate::error::{LapseError, Result};

const FORBIDDEN: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Turn a profile display name into something safe for a file name:
/// whitespace becomes `_`, path and shell-hostile characters are dropped.
pub fn archive_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .filter(|c| !c.is_control() && !FORBIDDEN.contains(c))
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    let stem = stem.trim_start_matches('.');
    if stem.is_empty() {
        "timelapse".to_string()
    } else {
        stem.to_string()
    }
}

/// Reject identifiers that could escape their directory.
pub fn check_component(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(LapseError::InvalidInput(format!("missing {kind}")));
    }
    if value == "." || value == ".." || value.contains(['/', '\\', '\0']) {
        return Err(LapseError::InvalidInput(format!("bad {kind}: {value:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stems_replace_spaces() {
        assert_eq!(archive_stem("Front Door"), "Front_Door");
        assert_eq!(archive_stem("  garden  cam "), "garden__cam");
        assert_eq!(archive_stem("../etc/passwd"), "etcpasswd");
        assert_eq!(archive_stem("???"), "timelapse");
    }

    #[test]
    fn components_stay_in_their_directory() {
        assert!(check_component("profile id", "cam1").is_ok());
        assert!(check_component("profile id", "").is_err());
        assert!(check_component("profile id", "..").is_err());
        assert!(check_component("archive", "a/b.avi").is_err());
    }
}
