use std::collections::BTreeMap;
use std::fmt;

/// Header block carried by open, reply and headers-update frames.
///
/// Names are stored lowercase; every lookup lowercases its key first, so
/// `get("Status")` and `get("status")` are the same query. A name may carry
/// several values.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: BTreeMap<String, Vec<String>>,
}

impl HeaderMap {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&normalize(name))
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// All values stored under `name`, in insertion order.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries
            .get(&normalize(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Replace every value of `name` with `value`.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.entries.insert(normalize(name), vec![value.into()]);
    }

    /// Add `value` after any existing values of `name`.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .entry(normalize(name))
            .or_default()
            .push(value.into());
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.contains_key(&normalize(name))
    }

    /// Fold `other` into `self`. Names present in `other` override ours;
    /// names only present here are kept.
    pub fn merge(&mut self, other: &HeaderMap) {
        for (name, values) in &other.entries {
            self.entries.insert(name.clone(), values.clone());
        }
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(name, values)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub(crate) fn insert_values(&mut self, name: String, values: Vec<String>) {
        self.entries.insert(name, values);
    }
}

impl fmt::Debug for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = HeaderMap::new();
        for (name, value) in iter {
            map.append(name.as_ref(), value);
        }
        map
    }
}

fn normalize(name: &str) -> String {
    name.to_ascii_lowercase()
}
