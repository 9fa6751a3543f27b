//! AMQP topic-exchange binding semantics.
//!
//! A binding key is a dot-separated list of words where `*` matches exactly
//! one word and `#` matches zero or more words.

/// Returns true if `routing_key` matches the binding `pattern`.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| matches_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&k, key_rest)) => (word == "*" || word == k) && matches_words(rest, key_rest),
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(topic_matches("product.upserted", "product.upserted"));
        assert!(!topic_matches("product.upserted", "customer.upserted"));
        assert!(!topic_matches("product.upserted", "product.upserted.v2"));
    }

    #[test]
    fn test_star_matches_one_word() {
        assert!(topic_matches("*.upserted", "customer.upserted"));
        assert!(topic_matches("product.*", "product.deleted"));
        assert!(!topic_matches("product.*", "product"));
        assert!(!topic_matches("*.upserted", "a.b.upserted"));
    }

    #[test]
    fn test_hash_matches_any_number_of_words() {
        assert!(topic_matches("#", "product.upserted"));
        assert!(topic_matches("product.#", "product"));
        assert!(topic_matches("product.#", "product.upserted.v2"));
        assert!(topic_matches("#.upserted", "upserted"));
        assert!(!topic_matches("customer.#", "product.upserted"));
    }
}
