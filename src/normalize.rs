/// Canonical form of a question, used only for cache-key derivation.
///
/// Lowercases, drops every character that is neither alphanumeric nor
/// whitespace, collapses whitespace runs to one space and trims.
pub fn normalize(question: &str) -> String {
    let stripped: String = question
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_punctuation_and_spacing_collapse() {
        assert_eq!(normalize("What  is X?"), "what is x");
        assert_eq!(normalize("what is x"), "what is x");
    }

    #[test]
    fn is_idempotent() {
        for q in [
            "  Wat is de   dosis?! ",
            "Does IL-6 (interleukin) matter?",
            "\tTabs\nand\r\nnewlines ",
            "",
            "???",
            "Ünïcödé Ärzte ß",
        ] {
            let once = normalize(q);
            assert_eq!(normalize(&once), once, "not idempotent for {q:?}");
        }
    }

    #[test]
    fn keeps_unicode_letters_and_digits() {
        assert_eq!(normalize("Größe 42mg?"), "größe 42mg");
    }

    #[test]
    fn punctuation_only_becomes_empty() {
        assert_eq!(normalize(" ?!... "), "");
    }

    #[test]
    fn hyphen_removal_joins_words() {
        assert_eq!(normalize("covid-19"), "covid19");
    }
}
