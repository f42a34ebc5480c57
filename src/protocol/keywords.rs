//! Keyword extraction from IMPv2 message bodies
//!
//! Message bodies are free text that may carry `key=value` tokens, quoted or
//! parenthesized multi-word values, and `+flag`/`-flag` booleans:
//!
//! ```text
//! EXPSTATUS=INTEGRATING NAME='M 31 field' FILTERS=(U,B,V) +VERBOSE -DEBUG
//! ```
//!
//! Extraction is tolerant by design: bare words are skipped and an
//! unterminated quote or parenthesis simply ends the scan with the partial
//! value kept.

/// Insertion-ordered keyword dictionary with last-write-wins updates.
///
/// Built on demand per message body; duplicate keys keep their original
/// position but take the latest value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordDict {
    entries: Vec<(String, String)>,
}

impl KeywordDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Extract all keyword tokens from a message body.
pub fn extract(body: &str) -> KeywordDict {
    let mut dict = KeywordDict::new();
    let mut tokens = body.split_whitespace();

    while let Some(token) = tokens.next() {
        if let Some((key, value)) = token.split_once('=') {
            if key.is_empty() {
                continue;
            }
            let value = match value.chars().next() {
                Some('\'') => take_delimited(value, '\'', &mut tokens),
                Some('(') => take_delimited(value, ')', &mut tokens),
                _ => value.to_string(),
            };
            dict.insert(key, value);
        } else if let Some(key) = token.strip_prefix('+') {
            if !key.is_empty() {
                dict.insert(key, "T");
            }
        } else if let Some(key) = token.strip_prefix('-') {
            if !key.is_empty() {
                dict.insert(key, "F");
            }
        }
        // Bare words carry no keyword and are skipped.
    }

    dict
}

/// Consume tokens until one ends with `closer`, rejoining them with single
/// spaces. The opening delimiter of `first` is stripped; a missing closer is
/// tolerated and the partial value kept.
fn take_delimited<'a>(
    first: &str,
    closer: char,
    tokens: &mut impl Iterator<Item = &'a str>,
) -> String {
    let mut value = first[1..].to_string();
    if value.ends_with(closer) {
        value.pop();
        return value;
    }

    for token in tokens.by_ref() {
        value.push(' ');
        value.push_str(token);
        if token.ends_with(closer) {
            value.pop();
            return value;
        }
    }

    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_body_extraction() {
        let dict = extract("EXPSTATUS=INTEGRATING NAME='M 31 field' +VERBOSE -DEBUG");
        assert_eq!(dict.get("EXPSTATUS"), Some("INTEGRATING"));
        assert_eq!(dict.get("NAME"), Some("M 31 field"));
        assert_eq!(dict.get("VERBOSE"), Some("T"));
        assert_eq!(dict.get("DEBUG"), Some("F"));
        assert_eq!(dict.len(), 4);
    }

    #[test]
    fn test_insertion_order_preserved() {
        let dict = extract("B=2 A=1 C=3");
        let keys: Vec<&str> = dict.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_duplicate_key_last_write_wins() {
        let dict = extract("FILTER=U EXPTIME=30 FILTER=B");
        assert_eq!(dict.get("FILTER"), Some("B"));
        // Position of the first insertion is kept.
        let keys: Vec<&str> = dict.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["FILTER", "EXPTIME"]);
    }

    #[test]
    fn test_parenthesized_list_value() {
        let dict = extract("FILTERS=(U, B, V) GRATING=G400L");
        assert_eq!(dict.get("FILTERS"), Some("U, B, V"));
        assert_eq!(dict.get("GRATING"), Some("G400L"));
    }

    #[test]
    fn test_single_token_quoted_value() {
        let dict = extract("NAME='flat'");
        assert_eq!(dict.get("NAME"), Some("flat"));
    }

    #[test]
    fn test_unterminated_quote_keeps_partial_value() {
        let dict = extract("NAME='M 31 field EXPTIME=30");
        assert_eq!(dict.get("NAME"), Some("M 31 field EXPTIME=30"));
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn test_bare_words_are_skipped() {
        let dict = extract("status report EXPSTATUS=IDLE please");
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get("EXPSTATUS"), Some("IDLE"));
    }

    #[test]
    fn test_empty_body() {
        assert!(extract("").is_empty());
        assert!(extract("   ").is_empty());
    }

    #[test]
    fn test_empty_value_and_lone_signs() {
        let dict = extract("KEY= + - =x");
        assert_eq!(dict.get("KEY"), Some(""));
        assert_eq!(dict.len(), 1);
    }
}
