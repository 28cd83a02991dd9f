//! Detect when a chat line addresses our nickname.

/// True when `text` mentions `nick` as `@nick`, `nick:`, `nick,` or `nick `
/// (nick followed by whitespace). Matching ignores ASCII case; the nick must
/// start at a word boundary for the last three forms and end at one for
/// `@nick`.
pub fn is_mentioned(text: &str, nick: &str) -> bool {
    let nick = nick.trim();
    if nick.is_empty() || nick.len() > text.len() {
        return false;
    }
    let hay = text.to_ascii_lowercase();
    let needle = nick.to_ascii_lowercase();
    let first = needle.chars().next();
    let last = needle.chars().next_back();

    (0..=hay.len() - needle.len())
        .filter(|&start| hay.is_char_boundary(start) && hay[start..].starts_with(&needle))
        .any(|start| {
            let before = hay[..start].chars().next_back();
            let after = hay[start + needle.len()..].chars().next();
            let at_sign = before == Some('@') && word_boundary(last, after);
            let addressed = word_boundary(before, first)
                && after.is_some_and(|c| c == ':' || c == ',' || c.is_whitespace());
            at_sign || addressed
        })
}

fn is_word(c: Option<char>) -> bool {
    c.is_some_and(|c| c.is_alphanumeric() || c == '_')
}

fn word_boundary(left: Option<char>, right: Option<char>) -> bool {
    is_word(left) != is_word(right)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addressed_forms() {
        assert!(is_mentioned("crab: ping", "crab"));
        assert!(is_mentioned("hey crab, look", "crab"));
        assert!(is_mentioned("thanks crab for that", "crab"));
        assert!(is_mentioned("ask @crab", "crab"));
        assert!(is_mentioned("@crab", "crab"));
        assert!(is_mentioned("CRAB: hello", "crab"));
        assert!(is_mentioned("hi @Crab!", "cRaB"));
    }

    #[test]
    fn test_non_mentions() {
        assert!(!is_mentioned("crabs are great", "crab"));
        assert!(!is_mentioned("ask @crabby", "crab"));
        assert!(!is_mentioned("hermitcrab: hi", "crab"));
        assert!(!is_mentioned("i like crab", "crab"));
        assert!(!is_mentioned("anything", ""));
        assert!(!is_mentioned("cr", "crab"));
    }

    #[test]
    fn test_nick_with_symbols() {
        assert!(is_mentioned("crab_: you there?", "crab_"));
        assert!(is_mentioned("[away]crab, hi", "crab"));
        assert!(is_mentioned("ping @crab_ now", "crab_"));
    }

    #[test]
    fn test_non_ascii_text() {
        assert!(is_mentioned("héllo crab: ça va", "crab"));
        assert!(!is_mentioned("日本語のテキスト", "crab"));
    }
}
