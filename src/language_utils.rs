use anyhow::{anyhow, Result};
use isolang::Language;

/// Language utilities for ISO language code handling
///
/// This module provides functions for validating, normalizing, and
/// matching ISO 639-1 (2-letter) and ISO 639-3 (3-letter) language codes.
/// Job submissions are validated here before anything is persisted.
/// Validate that a language code is a known ISO 639-1 or ISO 639-3 code
pub fn validate_language_code(code: &str) -> Result<()> {
    let normalized = code.trim().to_lowercase();

    if normalized.len() == 2 && Language::from_639_1(&normalized).is_some() {
        return Ok(());
    }
    if normalized.len() == 3 && Language::from_639_3(&normalized).is_some() {
        return Ok(());
    }

    Err(anyhow!("Invalid language code: {}", code))
}

/// Normalize a language code to ISO 639-3 (3-letter) format
pub fn normalize_to_part3(code: &str) -> Result<String> {
    let normalized = code.trim().to_lowercase();

    if normalized.len() == 2 {
        if let Some(lang) = Language::from_639_1(&normalized) {
            return Ok(lang.to_639_3().to_string());
        }
    } else if normalized.len() == 3 && Language::from_639_3(&normalized).is_some() {
        return Ok(normalized);
    }

    Err(anyhow!("Cannot normalize invalid language code: {}", code))
}

/// Check if two language codes represent the same language
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (normalize_to_part3(code1), normalize_to_part3(code2)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Get the English language name from a code
pub fn get_language_name(code: &str) -> Result<String> {
    let normalized = normalize_to_part3(code)?;
    let lang = Language::from_639_3(&normalized)
        .ok_or_else(|| anyhow!("Failed to get language from code: {}", normalized))?;

    Ok(lang.to_name().to_string())
}

/// Validate a submission's language pair: both codes known, and distinct
pub fn validate_language_pair(source: &str, target: &str) -> Result<()> {
    validate_language_code(source)?;
    validate_language_code(target)?;
    if language_codes_match(source, target) {
        return Err(anyhow!(
            "Source and target languages are the same: {} / {}",
            source,
            target
        ));
    }
    Ok(())
}
