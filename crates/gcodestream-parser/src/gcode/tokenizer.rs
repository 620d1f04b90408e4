//! G-Code line tokenizing
//!
//! Splits a raw line into `<letter><number>` words after stripping
//! comments, and extracts single words by letter.

use regex::Regex;
use std::sync::OnceLock;

fn paren_comment_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    // Non-nested: runs from an opening paren to the first closing paren
    // with no other opening paren in between.
    REGEX.get_or_init(|| Regex::new(r"\([^(]*\)").expect("invalid regex pattern"))
}

fn semicolon_comment_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r";.*").expect("invalid regex pattern"))
}

fn comment_text_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\(([^()]*)|;(.*)").expect("invalid regex pattern"))
}

/// Remove parenthesized and semicolon comments, then trim
pub fn remove_comment(line: &str) -> String {
    let without_parens = paren_comment_regex().replace_all(line, "");
    semicolon_comment_regex()
        .replace(&without_parens, "")
        .trim()
        .to_string()
}

/// Text of the first comment on the line, or `""` when there is none
pub fn parse_comment(line: &str) -> String {
    comment_text_regex()
        .captures(line)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Split a command into words, ignoring whitespace
///
/// A word boundary occurs when a numeric run is interrupted by anything
/// other than a digit or '.'. Comments are stripped first; an empty or
/// comment-only line yields no words. GRBL system commands (`$...`) are
/// returned as a single word.
pub fn split_command(line: &str) -> Vec<String> {
    let command = remove_comment(line);
    if command.starts_with('$') {
        return vec![command];
    }

    let mut words = Vec::new();
    let mut current = String::new();
    let mut reading_numeric = false;

    for c in command.chars() {
        if c.is_whitespace() {
            continue;
        }

        if reading_numeric && !c.is_ascii_digit() && c != '.' {
            reading_numeric = false;
            words.push(std::mem::take(&mut current));
            if c.is_alphabetic() {
                current.push(c);
            }
        } else if c.is_ascii_digit() || c == '.' || c == '-' {
            current.push(c);
            reading_numeric = true;
        } else if c.is_alphabetic() {
            current.push(c);
        }
    }

    if !current.is_empty() {
        words.push(current);
    }

    words
}

/// First word starting with `letter` (case-insensitive)
pub fn extract_word<'a>(words: &'a [String], letter: char) -> Option<&'a str> {
    let address = letter.to_ascii_uppercase();
    words
        .iter()
        .find(|w| w.chars().next().map(|c| c.to_ascii_uppercase()) == Some(address))
        .map(|w| w.as_str())
}

/// Numeric value of the first word for `letter`
///
/// Returns `None` when the letter is absent or its value does not parse.
/// When a letter repeats, the first occurrence wins.
pub fn parse_coord(words: &[String], letter: char) -> Option<f64> {
    let word = extract_word(words, letter)?;
    let value = word.get(1..)?;
    if value.is_empty() {
        return None;
    }
    value.parse::<f64>().ok()
}

/// Every code for `letter` in order of appearance, without the letter
///
/// Leading zeros are dropped so `G01` and `G1` compare equal; `G0` and
/// `G00` both become `"0"`.
pub fn parse_codes(words: &[String], letter: char) -> Vec<String> {
    let address = letter.to_ascii_uppercase();
    words
        .iter()
        .filter(|w| w.chars().next().map(|c| c.to_ascii_uppercase()) == Some(address))
        .filter_map(|w| w.get(1..))
        .map(normalize_code)
        .collect()
}

fn normalize_code(code: &str) -> String {
    let trimmed = code.trim_start_matches('0');
    if trimmed.is_empty() || trimmed.starts_with('.') {
        format!("0{}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// True if any word addresses an axis or arc parameter
pub fn has_axis_words(words: &[String]) -> bool {
    words.iter().any(|w| {
        w.len() > 1
            && matches!(
                w.chars().next().map(|c| c.to_ascii_uppercase()),
                Some('X' | 'Y' | 'Z' | 'I' | 'J' | 'K' | 'R')
            )
    })
}

fn decimal_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\d+\.(\d+)").expect("invalid regex pattern"))
}

/// Round every decimal number in `command` to at most `precision` places
///
/// Trailing zeros (and a trailing '.') are dropped from rewritten numbers.
pub fn truncate_decimals(command: &str, precision: usize) -> String {
    decimal_regex()
        .replace_all(command, |caps: &regex::Captures| {
            let matched = &caps[0];
            // Only numbers with more decimals than `precision` need rewriting.
            if caps[1].len() <= precision {
                return matched.to_string();
            }
            match matched.parse::<f64>() {
                Ok(value) => format_decimal(value, precision),
                Err(_) => matched.to_string(),
            }
        })
        .into_owned()
}

/// Format a number with at most `precision` decimals, no trailing zeros
pub fn format_decimal(value: f64, precision: usize) -> String {
    let formatted = format!("{:.*}", precision, value);
    let formatted = if formatted.contains('.') {
        formatted.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        formatted
    };
    if formatted == "-0" {
        "0".to_string()
    } else {
        formatted
    }
}

/// Strip every whitespace character
pub fn remove_whitespace(command: &str) -> String {
    command.chars().filter(|c| !c.is_whitespace()).collect()
}
