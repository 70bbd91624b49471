//! Naming rules for saved plan presets.
//!
//! Presets are opaque JSON documents stored one file per name. Names are
//! reduced to a safe character set before they touch the filesystem.

use crate::error::CoreError;

/// Maximum length of a sanitized preset name.
pub const MAX_PRESET_NAME_LEN: usize = 128;

/// File extension used for stored presets.
pub const PRESET_EXTENSION: &str = "json";

/// Keep only alphanumerics, space, hyphen and underscore.
pub fn sanitize_preset_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Sanitize and validate a preset name, returning the stored form.
pub fn validate_preset_name(name: &str) -> Result<String, CoreError> {
    let safe = sanitize_preset_name(name);
    if safe.is_empty() {
        return Err(CoreError::Validation(
            "Preset name must contain at least one letter or digit".to_string(),
        ));
    }
    if safe.chars().count() > MAX_PRESET_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Preset name must not exceed {MAX_PRESET_NAME_LEN} characters"
        )));
    }
    Ok(safe)
}
