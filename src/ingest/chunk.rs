//! Text cleanup and word-window chunking

use anyhow::Result;

const MD_SYMBOLS: &[char] = &[
    '#', '>', '*', '`', '_', '~', '[', ']', '(', ')', '!', '-',
];

/// Strip basic markdown symbols and collapse all whitespace runs into
/// single spaces
pub fn clean_markdown(text: &str) -> String {
    let replaced: String = text
        .chars()
        .map(|c| if MD_SYMBOLS.contains(&c) { ' ' } else { c })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split text into overlapping word windows.
///
/// Windows advance by `size - overlap` words; the final window may be
/// shorter. Empty text produces no chunks.
pub fn fixed_chunk(text: &str, size: usize, overlap: usize) -> Result<Vec<String>> {
    if size == 0 {
        anyhow::bail!("Chunk size must be positive");
    }
    if overlap >= size {
        anyhow::bail!("Chunk overlap must be smaller than chunk size");
    }

    let tokens: Vec<&str> = text.split_whitespace().collect();
    let step = size - overlap;

    Ok((0..tokens.len())
        .step_by(step)
        .map(|i| tokens[i..(i + size).min(tokens.len())].join(" "))
        .collect())
}

/// Number of whitespace-separated words
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_markdown_strips_symbols() {
        assert_eq!(
            clean_markdown("# Heading with *bold* and [link](url)"),
            "Heading with bold and link url"
        );
    }

    #[test]
    fn test_clean_markdown_collapses_whitespace() {
        assert_eq!(clean_markdown("a \t b\n\n  c"), "a b c");
        assert_eq!(clean_markdown("   "), "");
    }

    #[test]
    fn test_fixed_chunk_windows() {
        let text = "w0 w1 w2 w3 w4 w5 w6 w7 w8 w9";
        let chunks = fixed_chunk(text, 4, 1).unwrap();

        // step = 3, starts at 0, 3, 6, 9
        assert_eq!(
            chunks,
            vec![
                "w0 w1 w2 w3".to_string(),
                "w3 w4 w5 w6".to_string(),
                "w6 w7 w8 w9".to_string(),
                "w9".to_string(),
            ]
        );
    }

    #[test]
    fn test_fixed_chunk_no_overlap() {
        let chunks = fixed_chunk("a b c d e", 2, 0).unwrap();
        assert_eq!(chunks, vec!["a b", "c d", "e"]);
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = fixed_chunk("just two", 800, 100).unwrap();
        assert_eq!(chunks, vec!["just two".to_string()]);
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(fixed_chunk("", 800, 100).unwrap().is_empty());
        assert!(fixed_chunk("   \n\t ", 800, 100).unwrap().is_empty());
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(fixed_chunk("text", 0, 0).is_err());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        assert!(fixed_chunk("text", 5, 5).is_err());
        assert!(fixed_chunk("text", 5, 6).is_err());
        assert!(fixed_chunk("text", 5, 4).is_ok());
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("one two  three"), 3);
        assert_eq!(word_count(""), 0);
    }
}
