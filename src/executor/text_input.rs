// CJK-aware text input.
// CJK text is injected in a single burst; Latin text is typed key by key.

/// Returns true if the text contains CJK (Chinese/Japanese/Korean) characters.
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| {
        ('\u{4e00}'..='\u{9fff}').contains(&c)
            || ('\u{3400}'..='\u{4dbf}').contains(&c)
            || ('\u{3040}'..='\u{309f}').contains(&c)
            || ('\u{30a0}'..='\u{30ff}').contains(&c)
            || ('\u{ac00}'..='\u{d7af}').contains(&c)
            || ('\u{3000}'..='\u{303f}').contains(&c)
            || ('\u{ff00}'..='\u{ffef}').contains(&c)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingStrategy {
    /// Send the whole string as one text event.
    Burst,
    /// One key event per character.
    PerKey,
}

pub fn typing_strategy(text: &str) -> TypingStrategy {
    if contains_cjk(text) {
        TypingStrategy::Burst
    } else {
        TypingStrategy::PerKey
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_cjk() {
        assert!(contains_cjk("打开微信"));
        assert!(contains_cjk("カタカナ"));
        assert!(contains_cjk("한국어"));
        assert!(contains_cjk("hello，world"));
        assert!(!contains_cjk("hello, world"));
        assert!(!contains_cjk("café"));
    }

    #[test]
    fn picks_strategy_by_script() {
        assert_eq!(typing_strategy("DeepSeek"), TypingStrategy::PerKey);
        assert_eq!(typing_strategy("搜索 DeepSeek"), TypingStrategy::Burst);
        assert_eq!(typing_strategy(""), TypingStrategy::PerKey);
    }
}
