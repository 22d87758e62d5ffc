//! Input validation for player-supplied lobby fields (display names and colors)

/// Display name validation errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NameError {
    #[error("Name is empty")]
    Empty,

    #[error("Name contains control characters: {chars}")]
    ControlCharacters { chars: String },
}

/// Color validation errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ColorError {
    #[error("Color is empty")]
    Empty,

    #[error("Color must be #rrggbb or a plain color name (max {max} characters)")]
    Malformed { max: usize },
}

/// Longest accepted plain color name, e.g. `rebeccapurple`.
pub const MAX_COLOR_NAME: usize = 16;

/// Validate and normalize a display name.
///
/// Surrounding whitespace is trimmed and the result is truncated to `max_chars`
/// characters (not bytes, so multi-byte names are never split).
pub fn validate_display_name(name: &str, max_chars: usize) -> Result<String, NameError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(NameError::Empty);
    }

    if trimmed.chars().any(|c| c.is_control()) {
        let chars = trimmed
            .chars()
            .filter(|c| c.is_control())
            .map(|c| format!("\\u{{{:04x}}}", c as u32))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(NameError::ControlCharacters { chars });
    }

    let truncated: String = trimmed.chars().take(max_chars).collect();
    // Truncation can leave trailing whitespace behind
    let normalized = truncated.trim_end().to_string();
    if normalized.is_empty() {
        return Err(NameError::Empty);
    }
    Ok(normalized)
}

/// Validate a player color: either a `#rrggbb` hex triplet or a short ASCII color name.
/// Hex colors are normalized to lowercase so uniqueness checks compare like with like.
pub fn validate_color(color: &str) -> Result<String, ColorError> {
    let trimmed = color.trim();
    if trimmed.is_empty() {
        return Err(ColorError::Empty);
    }

    if let Some(hex) = trimmed.strip_prefix('#') {
        if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(format!("#{}", hex.to_ascii_lowercase()));
        }
        return Err(ColorError::Malformed { max: MAX_COLOR_NAME });
    }

    if trimmed.len() <= MAX_COLOR_NAME && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return Ok(trimmed.to_ascii_lowercase());
    }
    Err(ColorError::Malformed { max: MAX_COLOR_NAME })
}
