//! Pattern tokenizer for parameter and address sequences.
//!
//! Pattern strings are parsed exactly once, when a sender is constructed or
//! a parameter is set — never per dispatch. The resulting sequences are
//! treated as immutable and indexed cyclically by the iteration counter.
//!
//! Syntax is deliberately small:
//!
//! - tokens are separated by whitespace and/or commas
//! - `tok!n` replicates a token n times (`"bd!3"` -> `bd bd bd`)
//! - a blank string yields an empty sequence

/// One parsed element of a number pattern.
#[derive(Clone, Debug, PartialEq)]
pub enum PatternItem {
    /// A token that parsed as a number.
    Number(f64),
    /// A token that did not; coercion is retried when a message is
    /// composed, and fails only that message.
    Symbol(String),
}

impl PatternItem {
    /// The numeric value of this item, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PatternItem::Number(n) => Some(*n),
            PatternItem::Symbol(s) => s.parse().ok(),
        }
    }

    /// The raw token, for error reporting.
    pub fn token(&self) -> String {
        match self {
            PatternItem::Number(n) => n.to_string(),
            PatternItem::Symbol(s) => s.clone(),
        }
    }
}

/// Split a pattern string into raw tokens, expanding `tok!n` replication.
fn tokenize(input: &str) -> Vec<String> {
    let mut out = Vec::new();
    for raw in input.split(|c: char| c.is_whitespace() || c == ',') {
        let tok = raw.trim();
        if tok.is_empty() {
            continue;
        }
        if let Some((body, count)) = tok.rsplit_once('!') {
            if let Ok(n) = count.parse::<usize>() {
                if !body.is_empty() {
                    for _ in 0..n {
                        out.push(body.to_string());
                    }
                    continue;
                }
            }
        }
        out.push(tok.to_string());
    }
    out
}

/// Parse a number pattern into an ordered sequence of items.
pub fn parse_numbers(input: &str) -> Vec<PatternItem> {
    tokenize(input)
        .into_iter()
        .map(|tok| match tok.parse::<f64>() {
            Ok(n) => PatternItem::Number(n),
            Err(_) => PatternItem::Symbol(tok),
        })
        .collect()
}

/// Parse an address pattern into an ordered sequence of candidate
/// destinations. A single literal address yields a one-element sequence.
pub fn parse_addresses(input: &str) -> Vec<String> {
    tokenize(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numbers_basic() {
        let items = parse_numbers("60 62 64");
        assert_eq!(
            items,
            vec![
                PatternItem::Number(60.0),
                PatternItem::Number(62.0),
                PatternItem::Number(64.0),
            ]
        );
    }

    #[test]
    fn test_parse_numbers_floats_and_negatives() {
        let items = parse_numbers("-1 0.5 2.25");
        assert_eq!(items[0], PatternItem::Number(-1.0));
        assert_eq!(items[1], PatternItem::Number(0.5));
        assert_eq!(items[2], PatternItem::Number(2.25));
    }

    #[test]
    fn test_parse_numbers_keeps_symbols() {
        let items = parse_numbers("60 kick 64");
        assert_eq!(items[1], PatternItem::Symbol("kick".to_string()));
        assert_eq!(items[1].as_f64(), None);
        assert_eq!(items[1].token(), "kick");
    }

    #[test]
    fn test_parse_empty_is_empty() {
        assert!(parse_numbers("").is_empty());
        assert!(parse_numbers("   ").is_empty());
        assert!(parse_addresses("").is_empty());
    }

    #[test]
    fn test_comma_separation() {
        let items = parse_numbers("1, 2,3");
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn test_replication() {
        let addrs = parse_addresses("/foo!2 /bar");
        assert_eq!(addrs, vec!["/foo", "/foo", "/bar"]);

        let items = parse_numbers("60!3");
        assert_eq!(items.len(), 3);
        assert_eq!(items[2], PatternItem::Number(60.0));
    }

    #[test]
    fn test_single_literal_address() {
        assert_eq!(parse_addresses("/play"), vec!["/play"]);
    }
}
