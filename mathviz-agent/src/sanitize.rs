//! Rewrites for constructs models invent that the renderer rejects.

use regex::Regex;
use std::sync::OnceLock;

/// Colour constants that do not exist in the renderer's palette
pub const INVALID_COLORS: &[&str] = &[
    "ORANGE_E", "BLUE_D", "BLUE_E", "RED_A", "GREEN_E", "GREEN_D", "YELLOW_E",
];

const REPLACEMENT_COLOR: &str = "BLUE";

fn rate_func_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r",?\s*rate_func\s*=\s*(ease_\w+|easeIn\w*|easeOut\w*)").expect("rate_func regex")
    })
}

fn color_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = format!(r"\b(?:{})\b", INVALID_COLORS.join("|"));
        Regex::new(&pattern).expect("color regex")
    })
}

/// Strip easing arguments, unknown colours and `.get_text()` calls.
///
/// Valid code passes through unchanged.
pub fn sanitize(code: &str) -> String {
    let code = rate_func_regex().replace_all(code, "");
    let code = color_regex().replace_all(&code, REPLACEMENT_COLOR);
    code.replace(".get_text()", "")
}
