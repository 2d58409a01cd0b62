//! Model capability detection.
//!
//! Vision dispatch is only attempted when the configured model declares
//! multimodal input support. Detection is by model family name; the
//! configuration may force it either way.

use serde::{Deserialize, Serialize};

/// Model-name fragments of known multimodal families.
const VISION_FAMILIES: [&str; 14] = [
    "gpt-4-vision",
    "gpt-4-turbo",
    "gpt-4o",
    "gpt-4.1",
    "gpt-5",
    "o1",
    "claude-3",
    "claude-sonnet-4",
    "claude-opus-4",
    "gemini-pro-vision",
    "gemini-1.5",
    "gemini-2",
    "qwen-vl",
    "llava",
];

/// Capabilities of a completion model relevant to orchestration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    /// Whether the model accepts image inputs.
    #[serde(default)]
    pub supports_vision: bool,
}

impl ModelCapabilities {
    /// Detects capabilities from a model identifier.
    ///
    /// `vision_override` wins over name detection when set.
    #[must_use]
    pub fn for_model(model: &str, vision_override: Option<bool>) -> Self {
        let supports_vision = vision_override.unwrap_or_else(|| {
            let name = model.to_lowercase();
            // Strip a vendor prefix such as "openai/".
            let name = name.rsplit('/').next().unwrap_or(&name);
            VISION_FAMILIES.iter().any(|family| name.starts_with(family))
        });
        Self { supports_vision }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("gpt-4o", true ; "gpt-4o")]
    #[test_case("gpt-4o-mini", true ; "gpt-4o mini")]
    #[test_case("openai/gpt-4-turbo", true ; "vendor prefix")]
    #[test_case("claude-3-5-sonnet-20240620", true ; "claude 3.5")]
    #[test_case("gemini-1.5-flash", true ; "gemini flash")]
    #[test_case("gpt-3.5-turbo", false ; "text only gpt")]
    #[test_case("deepseek-chat", false ; "text only deepseek")]
    fn test_vision_detection(model: &str, expected: bool) {
        assert_eq!(
            ModelCapabilities::for_model(model, None).supports_vision,
            expected
        );
    }

    #[test]
    fn test_override_wins() {
        assert!(!ModelCapabilities::for_model("gpt-4o", Some(false)).supports_vision);
        assert!(ModelCapabilities::for_model("local-model", Some(true)).supports_vision);
    }
}
