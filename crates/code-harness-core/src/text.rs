//! Text normalization shared by every lexical index.
//!
//! The in-memory keyword index, the keyword search adapter and the SQLite
//! FTS query builder all tokenize through [`tokenize`], so a query term
//! matches exactly when the indexed term does.
//!
//! Rules: lowercase, split on anything that is not alphanumeric or `.`,
//! trim leading/trailing dots (so `"101.1."` becomes `"101.1"`), drop
//! English stopwords. Section numbers such as `101.1` survive as a single
//! token.

const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "by", "can", "cover", "covers", "do",
    "does", "for", "from", "has", "have", "how", "i", "in", "is", "it", "its", "of", "on", "or",
    "say", "says", "that", "the", "there", "this", "to", "was", "what", "when", "where", "which",
    "who", "why", "will", "with",
];

/// Whether `term` (already lowercased) is ignored by the lexical index.
pub fn is_stopword(term: &str) -> bool {
    STOPWORDS.binary_search(&term).is_ok()
}

/// Split `text` into normalized, stopword-free index terms, in order.
///
/// ```rust
/// use code_harness_core::text::tokenize;
///
/// assert_eq!(tokenize("What does Section 101.1 cover?"), vec!["section", "101.1"]);
/// assert!(tokenize("what is the").is_empty());
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '.'))
        .map(|raw| raw.trim_matches('.').to_lowercase())
        .filter(|term| !term.is_empty() && !is_stopword(term))
        .collect()
}

/// Collapse runs of whitespace and trim, used to normalize text before hashing.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopword_list_is_sorted() {
        let mut sorted = STOPWORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOPWORDS, "binary_search requires a sorted list");
    }

    #[test]
    fn test_tokenize_keeps_section_numbers() {
        assert_eq!(tokenize("see 307.1(1) and R302"), vec!["see", "307.1", "1", "r302"]);
    }

    #[test]
    fn test_tokenize_trims_sentence_dots() {
        assert_eq!(tokenize("Exits. Stairs..."), vec!["exits", "stairs"]);
    }

    #[test]
    fn test_tokenize_empty_and_stopwords() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   ?! ").is_empty());
        assert!(tokenize("What is the").is_empty());
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  foo \n\t bar "), "foo bar");
    }
}
