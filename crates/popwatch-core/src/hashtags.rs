use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

const BUNDLED_TABLE: &str = include_str!("../config/hashtags.yaml");

/// Versioned lookup data for series hashtags.
///
/// Generic licenses (e.g. "Marvel") make poor hashtags, so the formatter
/// swaps them for a character name found in the product title. The table is
/// data rather than code so it can grow without touching the formatter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashtagTable {
    pub version: u32,
    /// Lowercase license labels considered too broad to tag on their own.
    pub generic_licenses: Vec<String>,
    /// Character names checked in order; the first one contained in the
    /// product name wins.
    pub characters: Vec<String>,
}

impl HashtagTable {
    /// The table shipped with the binary.
    ///
    /// # Panics
    ///
    /// Panics if the bundled YAML is malformed, which the unit tests guard.
    #[must_use]
    pub fn bundled() -> Self {
        parse_table(BUNDLED_TABLE).expect("bundled hashtags.yaml must be valid")
    }

    /// `true` if `label` (compared case-insensitively) is a generic license.
    #[must_use]
    pub fn is_generic(&self, label: &str) -> bool {
        let label = label.to_lowercase();
        self.generic_licenses.iter().any(|g| g == &label)
    }

    /// First character whose name appears (case-insensitively) in `name`.
    #[must_use]
    pub fn find_character(&self, name: &str) -> Option<&str> {
        let haystack = name.to_lowercase();
        self.characters
            .iter()
            .find(|c| haystack.contains(&c.to_lowercase()))
            .map(String::as_str)
    }
}

impl Default for HashtagTable {
    fn default() -> Self {
        Self::bundled()
    }
}

/// Load a hashtag table from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_hashtags(path: &Path) -> Result<HashtagTable, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::HashtagsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_table(&content)
}

fn parse_table(content: &str) -> Result<HashtagTable, ConfigError> {
    let mut table: HashtagTable =
        serde_yaml::from_str(content).map_err(ConfigError::HashtagsFileParse)?;
    validate_table(&table)?;
    for label in &mut table.generic_licenses {
        *label = label.trim().to_lowercase();
    }
    Ok(table)
}

fn validate_table(table: &HashtagTable) -> Result<(), ConfigError> {
    if table.version == 0 {
        return Err(ConfigError::HashtagsValidation(
            "version must be at least 1".to_string(),
        ));
    }
    if let Some(blank) = table
        .generic_licenses
        .iter()
        .chain(&table.characters)
        .find(|s| s.trim().is_empty())
    {
        return Err(ConfigError::HashtagsValidation(format!(
            "blank entry {blank:?} in hashtag table"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn bundled_table_parses() {
        let table = HashtagTable::bundled();
        assert_eq!(table.version, 1);
        assert!(table.is_generic("Marvel"));
        assert!(table.is_generic("STAR WARS"));
        assert!(!table.is_generic("Chainsaw Man"));
        assert_eq!(table.characters.first().map(String::as_str), Some("Spider-Man"));
    }

    #[test]
    fn find_character_is_case_insensitive_and_ordered() {
        let table = HashtagTable::bundled();
        assert_eq!(table.find_character("pop! SPIDER-MAN"), Some("Spider-Man"));
        // "Batman" precedes "Joker" in the table.
        assert_eq!(table.find_character("Batman vs Joker"), Some("Batman"));
        assert_eq!(table.find_character("Groot"), None);
    }

    #[test]
    fn load_hashtags_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "version: 2\ngeneric_licenses: [\"  Pokemon \"]\ncharacters: [Pikachu]"
        )
        .unwrap();
        let table = load_hashtags(file.path()).unwrap();
        assert_eq!(table.version, 2);
        assert_eq!(table.generic_licenses, vec!["pokemon"]);
        assert_eq!(table.find_character("Pop! Pikachu"), Some("Pikachu"));
    }

    #[test]
    fn load_hashtags_missing_file_is_io_error() {
        let err = load_hashtags(Path::new("/nonexistent/hashtags.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::HashtagsFileIo { .. }));
    }

    #[test]
    fn blank_entries_are_rejected() {
        let err = parse_table("version: 1\ngeneric_licenses: [marvel]\ncharacters: [\"\"]")
            .unwrap_err();
        assert!(matches!(err, ConfigError::HashtagsValidation(_)));
    }

    #[test]
    fn zero_version_is_rejected() {
        let err =
            parse_table("version: 0\ngeneric_licenses: []\ncharacters: []").unwrap_err();
        assert!(matches!(err, ConfigError::HashtagsValidation(_)));
    }
}
