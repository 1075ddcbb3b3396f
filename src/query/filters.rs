//! Request filter map: ordered string keys to scalar-or-list values.

use serde::Serialize;

/// Query-string keys that are never filters.
pub const RESERVED_PARAMS: &[&str] = &["q", "limit", "offset", "sort", "order"];

/// A filter value as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FilterValue {
    Scalar(String),
    List(Vec<String>),
}

impl FilterValue {
    /// Parse a raw query-string value; commas split it into a list.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }
        if raw.contains(',') {
            let items: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if items.is_empty() {
                None
            } else {
                Some(FilterValue::List(items))
            }
        } else {
            Some(FilterValue::Scalar(raw.to_string()))
        }
    }

    /// The value if it is a non-empty scalar.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            FilterValue::Scalar(s) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FilterValue::Scalar(s) => s.is_empty(),
            FilterValue::List(items) => items.is_empty(),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Scalar(value.to_string())
    }
}

impl From<Vec<&str>> for FilterValue {
    fn from(values: Vec<&str>) -> Self {
        FilterValue::List(values.into_iter().map(str::to_string).collect())
    }
}

/// Insertion-ordered filter map.
///
/// Re-inserting a key replaces its value in place, so predicate order follows
/// the first appearance of each key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterMap {
    entries: Vec<(String, FilterValue)>,
}

impl FilterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FilterValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build from raw query pairs, skipping reserved keys and empty values.
    pub fn from_query_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut map = Self::new();
        for (key, raw) in pairs {
            if RESERVED_PARAMS.contains(&key) {
                continue;
            }
            if let Some(value) = FilterValue::parse(raw) {
                map.insert(key, value);
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalar_and_list() {
        assert_eq!(
            FilterValue::parse("ATTIVO"),
            Some(FilterValue::Scalar("ATTIVO".into()))
        );
        assert_eq!(
            FilterValue::parse("LAZIO,,PUGLIA"),
            Some(FilterValue::List(vec!["LAZIO".into(), "PUGLIA".into()]))
        );
        assert_eq!(FilterValue::parse(""), None);
        assert_eq!(FilterValue::parse(",,"), None);
    }

    #[test]
    fn test_from_query_pairs_skips_reserved_keys() {
        let map = FilterMap::from_query_pairs(vec![
            ("q", "scuola"),
            ("REGIONE", "LAZIO"),
            ("limit", "10"),
            ("STATO_PROGETTO", ""),
            ("HAS_CIG", "SI"),
        ]);
        let keys: Vec<&str> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["REGIONE", "HAS_CIG"]);
    }

    #[test]
    fn test_reinsert_keeps_first_position() {
        let mut map = FilterMap::new();
        map.insert("A", "1");
        map.insert("B", "2");
        map.insert("A", "3");
        let entries: Vec<(&str, &FilterValue)> = map.iter().collect();
        assert_eq!(entries[0], ("A", &FilterValue::Scalar("3".into())));
        assert_eq!(entries[1].0, "B");
    }
}
