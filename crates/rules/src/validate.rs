//! Category validation gates

use crate::patterns::PatternTable;
use crate::PiiCategory;

fn digits(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// 10 digits, or 11 with a leading country code
pub fn is_valid_phone(value: &str) -> bool {
    matches!(digits(value).len(), 10 | 11)
}

/// Nine digits with a usable area, group and serial
pub fn is_valid_ssn(value: &str) -> bool {
    let digits = digits(value);
    if digits.len() != 9 {
        return false;
    }
    let (area, rest) = digits.split_at(3);
    let (group, serial) = rest.split_at(2);
    !(area == "000" || area == "666" || area.starts_with('9') || group == "00" || serial == "0000")
}

fn is_valid_dob(value: &str) -> bool {
    let parts: Vec<u32> = value
        .split(['/', '-'])
        .filter_map(|p| p.parse().ok())
        .collect();
    if parts.len() != 3 {
        return false;
    }
    let plausible = |month: u32, day: u32| (1..=12).contains(&month) && (1..=31).contains(&day);
    plausible(parts[0], parts[1]) || plausible(parts[1], parts[0])
}

fn is_valid_name(value: &str, following: &str, table: &PatternTable) -> bool {
    let has_stopword = value
        .split_whitespace()
        .any(|word| table.name_stopwords.contains(&word.to_lowercase()));
    !has_stopword && !table.dosage_follow.is_match(following)
}

/// Decides whether a raw candidate becomes a match.
///
/// `following` is the text right after the candidate, used to spot dosages.
pub(crate) fn accept(
    category: PiiCategory,
    value: &str,
    following: &str,
    table: &PatternTable,
) -> bool {
    match category {
        PiiCategory::Phone => is_valid_phone(value),
        PiiCategory::Ssn => is_valid_ssn(value),
        PiiCategory::Name => is_valid_name(value, following, table),
        PiiCategory::MedicalId => value.chars().any(|c| c.is_ascii_digit()),
        PiiCategory::Dob => is_valid_dob(value),
        PiiCategory::Address => value.chars().any(|c| c.is_alphabetic()),
    }
}
