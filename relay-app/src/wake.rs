//! Wake-word address detection.

const WAKE_WORD_CHARS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub addressed: bool,
    /// Text after the wake word, trimmed. Empty when not addressed.
    pub payload: String,
}

impl Detection {
    fn ignored() -> Self {
        Self {
            addressed: false,
            payload: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AddressDetector {
    wake_word: String,
    greeting_payload: String,
}

impl AddressDetector {
    pub fn new(wake_word: &str, greeting_payload: &str) -> Self {
        Self {
            wake_word: wake_word.to_lowercase(),
            greeting_payload: greeting_payload.to_string(),
        }
    }

    /// A message is addressed when its first three characters equal the wake
    /// word, ignoring case.
    pub fn detect(&self, text: &str) -> Detection {
        if text.is_empty() {
            return Detection::ignored();
        }

        let split_at = text
            .char_indices()
            .nth(WAKE_WORD_CHARS)
            .map_or(text.len(), |(idx, _)| idx);
        let (prefix, rest) = text.split_at(split_at);
        if prefix.to_lowercase() != self.wake_word {
            return Detection::ignored();
        }

        let rest = rest.trim();
        let payload = if rest.is_empty() {
            self.greeting_payload.clone()
        } else {
            rest.to_string()
        };
        Detection {
            addressed: true,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> AddressDetector {
        AddressDetector::new("ろんな", "あいさつ")
    }

    #[test]
    fn wake_word_prefix_yields_trimmed_payload() {
        let d = detector().detect("ろんな元気？");
        assert_eq!(
            d,
            Detection {
                addressed: true,
                payload: "元気？".to_string()
            }
        );

        // Full-width spaces are whitespace too.
        let d = detector().detect("ろんな\u{3000} 今日の天気は？ ");
        assert_eq!(d.payload, "今日の天気は？");
    }

    #[test]
    fn bare_wake_word_becomes_greeting() {
        for text in ["ろんな", "ろんな   ", "ろんな\n"] {
            let d = detector().detect(text);
            assert!(d.addressed, "{text:?} should be addressed");
            assert_eq!(d.payload, "あいさつ");
        }
    }

    #[test]
    fn other_text_is_not_addressed() {
        for text in ["", "こんにちは", "ろん", "ねえろんな元気？", " ろんな元気？"] {
            let d = detector().detect(text);
            assert!(!d.addressed, "{text:?} should not be addressed");
            assert!(d.payload.is_empty());
        }
    }

    #[test]
    fn ascii_wake_word_ignores_case() {
        let detector = AddressDetector::new("Bot", "hello");
        assert_eq!(detector.detect("BOT what time is it").payload, "what time is it");
        assert_eq!(detector.detect("bot").payload, "hello");
        assert!(!detector.detect("bo").addressed);
        assert!(!detector.detect("robot").addressed);
    }
}
