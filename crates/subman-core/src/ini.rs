//! Minimal INI documents.
//!
//! Used both to read `rhsm.conf` and to render the generated repository
//! file. Sections and keys keep their insertion order so that rendering
//! is deterministic.

use std::fmt;

use crate::error::{Error, Result};

/// One `[name]` section and its `key = value` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniSection {
    pub name: String,
    entries: Vec<(String, String)>,
}

impl IniSection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Set `key` to `value`, replacing an existing entry in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An ordered collection of sections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    sections: Vec<IniSection>,
}

impl IniDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse INI text.
    ///
    /// `#` and `;` start comment lines. Both `key = value` and `key: value`
    /// are accepted. An indented line continues the previous value.
    pub fn parse(text: &str) -> Result<Self> {
        let mut doc = Self::new();
        let mut last_key: Option<String> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            if raw.starts_with([' ', '\t']) {
                if let (Some(key), Some(section)) = (&last_key, doc.sections.last_mut()) {
                    let joined = match section.get(key) {
                        Some(prev) if !prev.is_empty() => format!("{prev}\n{trimmed}"),
                        _ => trimmed.to_string(),
                    };
                    section.set(key.clone(), joined);
                    continue;
                }
            }

            if let Some(rest) = trimmed.strip_prefix('[') {
                let name = rest.strip_suffix(']').ok_or_else(|| Error::IniSyntax {
                    line: line_no,
                    reason: "unterminated section header".into(),
                })?;
                doc.section_mut(name.trim());
                last_key = None;
                continue;
            }

            let split = trimmed
                .find(['=', ':'])
                .ok_or_else(|| Error::IniSyntax {
                    line: line_no,
                    reason: format!("expected key = value, got {trimmed:?}"),
                })?;
            let key = trimmed[..split].trim();
            let value = trimmed[split + 1..].trim();
            if key.is_empty() {
                return Err(Error::IniSyntax {
                    line: line_no,
                    reason: "empty key".into(),
                });
            }
            let section = doc.sections.last_mut().ok_or_else(|| Error::IniSyntax {
                line: line_no,
                reason: "key outside of any section".into(),
            })?;
            section.set(key, value);
            last_key = Some(key.to_string());
        }

        Ok(doc)
    }

    /// Get the named section, appending an empty one if missing.
    pub fn section_mut(&mut self, name: &str) -> &mut IniSection {
        let pos = match self.sections.iter().position(|s| s.name == name) {
            Some(pos) => pos,
            None => {
                self.sections.push(IniSection::new(name));
                self.sections.len() - 1
            }
        };
        &mut self.sections[pos]
    }

    pub fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section).and_then(|s| s.get(key))
    }

    pub fn sections(&self) -> &[IniSection] {
        &self.sections
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

impl fmt::Display for IniDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, section) in self.sections.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            writeln!(f, "[{}]", section.name)?;
            for (key, value) in section.entries() {
                writeln!(f, "{key} = {value}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_and_comments() {
        let text = "# comment\n[server]\nhostname = example.com\nport: 8443\n\n; other\n[rhsm]\nbaseurl = https://cdn.example.com\n";
        let doc = IniDocument::parse(text).unwrap();
        assert_eq!(doc.get("server", "hostname"), Some("example.com"));
        assert_eq!(doc.get("server", "port"), Some("8443"));
        assert_eq!(doc.get("rhsm", "baseurl"), Some("https://cdn.example.com"));
        assert_eq!(doc.get("rhsm", "missing"), None);
    }

    #[test]
    fn value_may_contain_equals() {
        let doc = IniDocument::parse("[a]\nurl = https://x/?a=b\n").unwrap();
        assert_eq!(doc.get("a", "url"), Some("https://x/?a=b"));
    }

    #[test]
    fn indented_line_continues_value() {
        let doc = IniDocument::parse("[a]\nlist =\n  one\n  two\n").unwrap();
        assert_eq!(doc.get("a", "list"), Some("one\ntwo"));
    }

    #[test]
    fn key_outside_section_is_error() {
        let err = IniDocument::parse("key = value\n").unwrap_err();
        assert!(matches!(err, Error::IniSyntax { line: 1, .. }));
    }

    #[test]
    fn unterminated_header_is_error() {
        let err = IniDocument::parse("[broken\n").unwrap_err();
        assert!(matches!(err, Error::IniSyntax { line: 1, .. }));
    }

    #[test]
    fn renders_in_insertion_order() {
        let mut doc = IniDocument::new();
        doc.section_mut("b").set("z", "1").set("a", "2");
        doc.section_mut("a").set("k", "v");
        assert_eq!(doc.to_string(), "[b]\nz = 1\na = 2\n\n[a]\nk = v\n");
    }

    #[test]
    fn set_replaces_existing_key() {
        let mut section = IniSection::new("s");
        section.set("k", "1").set("k", "2");
        assert_eq!(section.len(), 1);
        assert_eq!(section.get("k"), Some("2"));
    }

    #[test]
    fn rendered_document_parses_back() {
        let mut doc = IniDocument::new();
        doc.section_mut("repo").set("name", "Repo").set("enabled", "1");
        let parsed = IniDocument::parse(&doc.to_string()).unwrap();
        assert_eq!(parsed, doc);
    }
}
