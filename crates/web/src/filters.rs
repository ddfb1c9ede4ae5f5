//! Custom Askama template filters.

#![allow(clippy::unnecessary_wraps)]

use std::fmt::Display;

/// Words kept by [`excerpt`].
pub const EXCERPT_WORDS: usize = 25;

/// Returns the current year.
///
/// Usage in templates: `{{ ""|current_year }}`
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<i32> {
    use chrono::Datelike;
    Ok(chrono::Utc::now().year())
}

/// The first [`EXCERPT_WORDS`] words of a description.
///
/// Usage in templates: `{{ store.description|excerpt }}`
#[askama::filter_fn]
pub fn excerpt(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(first_words(&value.to_string(), EXCERPT_WORDS))
}

fn first_words(text: &str, n: usize) -> String {
    text.split_whitespace().take(n).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_words_truncates() {
        let text = (1..=30).map(|n| n.to_string()).collect::<Vec<_>>().join(" ");
        let cut = first_words(&text, EXCERPT_WORDS);
        assert_eq!(cut.split(' ').count(), 25);
        assert!(cut.ends_with("25"));
    }

    #[test]
    fn test_first_words_collapses_whitespace() {
        assert_eq!(first_words("  fresh\n\nbread  daily ", 10), "fresh bread daily");
    }
}
