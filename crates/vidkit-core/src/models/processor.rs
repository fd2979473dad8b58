use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// A named, versioned remote engine that executes tasks against a profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaProcessor {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl MediaProcessor {
    pub fn parsed_version(&self) -> ProcessorVersion {
        ProcessorVersion::parse(&self.version)
    }
}

/// Dotted version string ("4.1.0.0") compared component-wise.
///
/// Numeric components compare numerically, so "2.10" > "2.9". Missing
/// components count as zero ("1.0" == "1.0.0"). A non-numeric component sorts
/// after any numeric one and compares lexicographically against other text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorVersion {
    raw: String,
    parts: Vec<VersionPart>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum VersionPart {
    Number(u64),
    Text(String),
}

impl ProcessorVersion {
    pub fn parse(raw: &str) -> Self {
        let parts = raw
            .trim()
            .split('.')
            .map(|p| match p.parse::<u64>() {
                Ok(n) => VersionPart::Number(n),
                Err(_) => VersionPart::Text(p.to_string()),
            })
            .collect();
        Self {
            raw: raw.to_string(),
            parts,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Ord for ProcessorVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let zero = VersionPart::Number(0);
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let a = self.parts.get(i).unwrap_or(&zero);
            let b = other.parts.get(i).unwrap_or(&zero);
            match a.cmp(b) {
                Ordering::Equal => continue,
                non_eq => return non_eq,
            }
        }
        // Equal by value ("1.0" vs "1.0.0"): fall back to the raw text so the
        // ordering stays total and selection is deterministic.
        self.raw.cmp(&other.raw)
    }
}

impl PartialOrd for ProcessorVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for ProcessorVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.raw)
    }
}
