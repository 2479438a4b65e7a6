//! Ordered key/value block stored in every cube header.

use std::fmt;

pub const MODALITY: &str = "modality";
pub const PATIENT_NAME: &str = "patient_name";
pub const PATIENT_ID: &str = "patient_id";
pub const PLAN_ID: &str = "plan_id";
pub const CREATED_BY: &str = "created_by";
pub const COMMENT: &str = "comment";

/// Creation metadata of a cube.
///
/// Entries keep their insertion order so that a loaded header is written back
/// byte for byte. Keys are unique; [`Metadata::set`] replaces in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, String)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn modality(&self) -> Option<&str> {
        self.get(MODALITY)
    }

    pub fn patient_name(&self) -> Option<&str> {
        self.get(PATIENT_NAME)
    }

    pub fn patient_id(&self) -> Option<&str> {
        self.get(PATIENT_ID)
    }

    pub fn plan_id(&self) -> Option<&str> {
        self.get(PLAN_ID)
    }

    pub fn created_by(&self) -> Option<&str> {
        self.get(CREATED_BY)
    }

    pub fn comment(&self) -> Option<&str> {
        self.get(COMMENT)
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in self.iter() {
            writeln!(f, "{key}: {value}")?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Metadata::new();
        for (key, value) in iter {
            metadata.set(key, value);
        }
        metadata
    }
}
