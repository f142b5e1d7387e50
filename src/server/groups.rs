//! Group directory: named member sets, created on demand
//!
//! Members are tracked by handle; the registry resolves handles to sessions
//! at delivery time. A group that loses its last member disappears from the
//! directory in the same operation.

use std::collections::{HashMap, HashSet};

use crate::error::{RelayError, Result};

#[derive(Debug, Default)]
pub struct GroupDirectory {
    groups: HashMap<String, HashSet<String>>,
}

impl GroupDirectory {
    pub fn new() -> Self {
        Self {
            groups: HashMap::new(),
        }
    }

    /// Create a group with `founder` as its sole member.
    pub fn create(&mut self, name: &str, founder: &str) -> Result<()> {
        if self.groups.contains_key(name) {
            return Err(RelayError::group_exists(name));
        }
        let mut members = HashSet::new();
        members.insert(founder.to_string());
        self.groups.insert(name.to_string(), members);
        Ok(())
    }

    /// Add `handle` to an existing group. Joining a group twice is a no-op,
    /// not an error.
    pub fn join(&mut self, name: &str, handle: &str) -> Result<bool> {
        let members = self
            .groups
            .get_mut(name)
            .ok_or_else(|| RelayError::group_not_found(name))?;
        Ok(members.insert(handle.to_string()))
    }

    pub fn is_member(&self, name: &str, handle: &str) -> bool {
        self.groups
            .get(name)
            .map(|members| members.contains(handle))
            .unwrap_or(false)
    }

    pub fn members_of(&self, name: &str) -> Option<&HashSet<String>> {
        self.groups.get(name)
    }

    /// Remove `handle` from every group it belongs to, deleting any group
    /// left empty. Called once per registered disconnect.
    pub fn leave_all(&mut self, handle: &str) {
        self.groups.retain(|_, members| {
            members.remove(handle);
            !members.is_empty()
        });
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}
