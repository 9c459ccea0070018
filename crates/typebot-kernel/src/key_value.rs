use typebot_contracts::{KeyValue, Variable};

use crate::variables::resolve_variables;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValueMap {
    entries: Vec<(String, String)>,
}

impl KeyValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: String) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get_ignore_case(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn remove_at(&mut self, index: usize) -> (String, String) {
        self.entries.remove(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_pairs(self) -> Vec<(String, String)> {
        self.entries
    }
}

impl FromIterator<(String, String)> for KeyValueMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut map = KeyValueMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// Compiles a header or query-param table. Entries without a key are
/// inactive and dropped; values go through variable resolution.
///
/// `None` in gives `None` out, so "nothing configured" stays distinct from
/// "configured but empty".
pub fn compile_key_values(
    entries: Option<&[KeyValue]>,
    variables: &[Variable],
) -> Option<KeyValueMap> {
    let entries = entries?;
    Some(
        entries
            .iter()
            .filter_map(|entry| {
                let key = entry.key.as_deref().filter(|k| !k.is_empty())?;
                let value = resolve_variables(entry.value.as_deref().unwrap_or(""), variables);
                Some((key.to_string(), value))
            })
            .collect(),
    )
}
