use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// One legal section record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(deserialize_with = "section_number")]
    pub section_number: String,
    pub section_title: String,
    pub description: String,
}

impl Entry {
    /// The text embedded for this entry when its corpus index is built.
    ///
    /// # Examples
    ///
    /// ```
    /// use vajra::Entry;
    ///
    /// let entry = Entry {
    ///     section_number: "303".to_string(),
    ///     section_title: "Theft".to_string(),
    ///     description: "Whoever intends to take dishonestly...".to_string(),
    /// };
    /// assert_eq!(entry.embedding_text(), "Theft: Whoever intends to take dishonestly...");
    /// ```
    pub fn embedding_text(&self) -> String {
        format!("{}: {}", self.section_title, self.description)
    }

    /// The single context line this entry contributes to a prompt.
    pub fn context_line(&self) -> String {
        format!(
            "Section {} - {}: {}",
            self.section_number, self.section_title, self.description
        )
    }

    /// The first `max_chars` characters of the description, with `...`
    /// appended when anything was cut.
    pub fn preview(&self, max_chars: usize) -> String {
        match self.description.char_indices().nth(max_chars) {
            Some((cut, _)) => format!("{}...", &self.description[..cut]),
            None => self.description.clone(),
        }
    }

    /// Case-insensitive substring match over title and description.
    /// `needle` must already be lowercase.
    pub(crate) fn matches_lowercase(&self, needle: &str) -> bool {
        self.section_title.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
    }
}

/// Datasets carry section numbers both as strings ("303", "2(1)") and as
/// bare JSON numbers.
fn section_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Integer(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
    })
}

/// Read a JSON array of entries, preserving file order.
pub fn load_entries(path: &Path) -> Result<Vec<Entry>> {
    if !path.exists() {
        return Err(Error::MissingData {
            kind: "entries",
            path: path.to_path_buf(),
        });
    }
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
