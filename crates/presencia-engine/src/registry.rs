//! Identity registry — ordered enrolled names with contiguous labels.
//!
//! A label is the identity's index in the ordered list. Labels are never
//! reused or reassigned once allocated; only [`IdentityRegistry::rebuild`]
//! (the full-retrain path) replaces the whole assignment.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown label {0}")]
pub struct UnknownLabel(pub u32);

#[derive(Debug, Clone, Default)]
pub struct IdentityRegistry {
    names: Vec<String>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from a persisted ordered name list.
    pub fn from_names(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Return the label for `name`, allocating the next one if unseen.
    /// Idempotent: enrolling the same name twice yields the same label.
    pub fn allocate(&mut self, name: &str) -> u32 {
        if let Some(pos) = self.names.iter().position(|n| n == name) {
            return pos as u32;
        }
        let label = self.names.len() as u32;
        self.names.push(name.to_string());
        tracing::debug!(identity = name, label, "label allocated");
        label
    }

    pub fn resolve(&self, label: u32) -> Result<&str, UnknownLabel> {
        self.names
            .get(label as usize)
            .map(String::as_str)
            .ok_or(UnknownLabel(label))
    }

    /// Ordered copy of the enrolled names, safe to hand out across threads.
    pub fn snapshot(&self) -> Vec<String> {
        self.names.clone()
    }

    /// Replace the entire assignment; `names[i]` gets label `i`.
    pub fn rebuild(&mut self, names: Vec<String>) {
        self.names = names;
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
