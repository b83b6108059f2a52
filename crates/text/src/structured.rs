use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::tables::ExtractionPatterns;

/// Structured fields pulled from cleaned text. Diagnostics only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredInfo {
    pub medications: Vec<String>,
    pub dosages: Vec<String>,
    pub times: Vec<String>,
    pub dates: Vec<String>,
    pub quantities: Vec<String>,
}

impl StructuredInfo {
    pub fn is_empty(&self) -> bool {
        self.medications.is_empty()
            && self.dosages.is_empty()
            && self.times.is_empty()
            && self.dates.is_empty()
            && self.quantities.is_empty()
    }
}

fn collect(re: &Regex, text: &str) -> Vec<String> {
    re.find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub(crate) fn extract(text: &str, patterns: &ExtractionPatterns) -> StructuredInfo {
    StructuredInfo {
        medications: collect(&patterns.medications, text),
        dosages: collect(&patterns.dosages, text),
        times: collect(&patterns.times, text),
        dates: collect(&patterns.dates, text),
        quantities: collect(&patterns.quantities, text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::CleanerTables;

    #[test]
    fn test_extract_prescription_fields() {
        let tables = CleanerTables::builtin().unwrap();
        let text = "Metformin 500mg twice daily, Atorvastatin 20mg at night. \
                    Issued 12/03/2024, 2x14 pack, next 8:30am";
        let info = extract(text, &tables.extraction);
        assert_eq!(info.medications, vec!["Atorvastatin", "Metformin"]);
        assert_eq!(info.dosages, vec!["20mg", "500mg"]);
        assert!(info.times.contains(&"night".to_string()));
        assert!(info.times.contains(&"8:30am".to_string()));
        assert!(info.times.contains(&"twice daily".to_string()));
        assert_eq!(info.dates, vec!["12/03/2024"]);
        assert!(info.quantities.contains(&"2x14".to_string()));
    }

    #[test]
    fn test_extract_deduplicates() {
        let tables = CleanerTables::builtin().unwrap();
        let info = extract("5mg then 5mg again", &tables.extraction);
        assert_eq!(info.dosages, vec!["5mg"]);
    }

    #[test]
    fn test_empty_text() {
        let tables = CleanerTables::builtin().unwrap();
        assert!(extract("", &tables.extraction).is_empty());
    }
}
