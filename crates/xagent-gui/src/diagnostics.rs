//! User-facing diagnostics for fatal run errors

/// Keywords that point at the screen capture stack
const DISPLAY_KEYWORDS: [&str; 3] = ["screen", "capture", "display"];

/// Diagnostic for a failed `do_initialize`
///
/// Best-effort: display and capture problems get a specific hint, anything
/// else is reported with the raw message.
pub fn classify_init_error(message: &str) -> String {
    let lower = message.to_lowercase();
    if DISPLAY_KEYWORDS.iter().any(|k| lower.contains(k)) {
        format!(
            "Failed to access the screen: {}. Check that a display is available and that screen recording permission is granted.",
            message
        )
    } else {
        format!("Failed to initialize the operator: {}", message)
    }
}
