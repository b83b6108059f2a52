//! Recognition output cleanup
//!
//! Collapses whitespace and fixes digit/letter confusions inside tokens that
//! are clearly words.

/// Suffixes that make "5mg" or "1st" a number rather than a misread word
const UNIT_SUFFIXES: &[&str] = &[
    "mg", "ml", "mcg", "g", "kg", "iu", "x", "am", "pm", "st", "nd", "rd", "th", "h", "hr", "hrs",
];

pub fn postprocess(text: &str) -> String {
    text.split_whitespace()
        .map(fix_token)
        .collect::<Vec<_>>()
        .join(" ")
}

fn fix_token(token: &str) -> String {
    if !is_word_like(token) {
        return token.to_string();
    }

    let chars: Vec<char> = token.chars().collect();
    let mut out = String::with_capacity(token.len());
    for (i, &c) in chars.iter().enumerate() {
        let upper = i == 0 || in_capitals(&chars, i);
        out.push(match c {
            '|' => 'I',
            '0' if upper => 'O',
            '0' => 'o',
            '5' if upper => 'S',
            '5' => 's',
            '1' if upper => 'I',
            '1' => 'l',
            other => other,
        });
    }
    out
}

/// Nearest letters on both sides are capitals (a missing side counts as one).
fn in_capitals(chars: &[char], i: usize) -> bool {
    let before = chars[..i].iter().rev().find(|c| c.is_ascii_alphabetic());
    let after = chars[i + 1..].iter().find(|c| c.is_ascii_alphabetic());
    before.map_or(true, |c| c.is_ascii_uppercase())
        && after.map_or(true, |c| c.is_ascii_uppercase())
}

fn is_word_like(token: &str) -> bool {
    if token.chars().count() <= 1 {
        return false;
    }
    if !token.chars().all(|c| c.is_ascii_alphanumeric() || c == '|') {
        return false;
    }
    let digits = token.chars().filter(|c| c.is_ascii_digit()).count();
    let letters = token.chars().filter(|c| c.is_ascii_alphabetic()).count();
    if digits == token.len() || letters <= digits {
        return false;
    }
    !is_quantity(token)
}

/// Digits followed by a unit suffix, e.g. "5mg"
fn is_quantity(token: &str) -> bool {
    let split = token
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(token.len());
    if split == 0 {
        return false;
    }
    let suffix = token[split..].to_ascii_lowercase();
    UNIT_SUFFIXES.contains(&suffix.as_str())
}
