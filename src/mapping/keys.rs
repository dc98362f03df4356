//! Key identifier normalization.
//!
//! Common aliases resolve to canonical key codes (`space` → `Space`,
//! `a` → `KeyA`, `1` → `Digit1`). Anything unrecognized is passed through
//! verbatim as a raw key identifier.

/// Resolves a configured key name to the identifier placed in the key set.
///
/// # Examples
///
/// ```
/// use control_mapper::mapping::keys::normalize_key;
///
/// assert_eq!(normalize_key("space"), "Space");
/// assert_eq!(normalize_key("w"), "KeyW");
/// assert_eq!(normalize_key("F13_custom"), "F13_custom");
/// ```
#[must_use]
pub fn normalize_key(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    let canonical = match lower.as_str() {
        "space" => "Space",
        "enter" | "return" => "Enter",
        "esc" | "escape" => "Escape",
        "tab" => "Tab",
        "backspace" => "Backspace",
        "shift" | "lshift" => "ShiftLeft",
        "rshift" => "ShiftRight",
        "ctrl" | "control" | "lctrl" => "ControlLeft",
        "rctrl" => "ControlRight",
        "alt" | "lalt" => "AltLeft",
        "ralt" => "AltRight",
        "up" => "ArrowUp",
        "down" => "ArrowDown",
        "left" => "ArrowLeft",
        "right" => "ArrowRight",
        _ => {
            let mut chars = lower.chars();
            return match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_lowercase() => {
                    format!("Key{}", c.to_ascii_uppercase())
                }
                (Some(c), None) if c.is_ascii_digit() => format!("Digit{c}"),
                _ => name.to_string(),
            };
        }
    };
    canonical.to_string()
}
