//! Breakpoint storage and hit-testing indexes.
//!
//! One arena owns every [`Breakpoint`]. Two index structures hang off it:
//! path → ordered arena slots (insertion order, the order breakpoints are
//! replayed to the server) and path → element name → arena slot (for O(1)
//! hit testing). Both indexes are only mutated together, inside this
//! module, so the views cannot diverge.

use std::collections::HashMap;

use crate::paths;
use crate::types::{Breakpoint, BreakpointId};

#[derive(Debug)]
pub struct BreakpointRegistry {
    arena: Vec<Breakpoint>,
    by_path: HashMap<String, Vec<usize>>,
    by_element: HashMap<String, HashMap<String, usize>>,
    next_id: BreakpointId,
}

impl Default for BreakpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self {
            arena: Vec::new(),
            by_path: HashMap::new(),
            by_element: HashMap::new(),
            next_id: 1,
        }
    }

    /// Register a breakpoint for `element` in the file named by `uri`,
    /// returning a copy of the stored record.
    ///
    /// Every call mints a fresh id; re-registering the same element does
    /// not deduplicate, it appends to the path list and silently orphans
    /// the previous entry in the element index.
    // TODO: revisit the drive-letter stripping against UNC and file:// URIs
    pub fn register(&mut self, element: &str, uri: &str) -> Breakpoint {
        // leading-character artifact of Windows drive-letter URIs
        let path = match (uri.chars().nth(2), uri.char_indices().nth(1)) {
            (Some(':'), Some((second, _))) => &uri[second..],
            _ => uri,
        };
        let key = paths::normalize_key(path);

        let id = self.next_id;
        self.next_id += 1;
        let breakpoint = Breakpoint {
            id,
            name: element.to_string(),
            path: key.clone(),
            verified: false,
        };
        tracing::debug!(?breakpoint, "registering breakpoint");

        let slot = self.arena.len();
        self.arena.push(breakpoint.clone());
        self.by_path.entry(key.clone()).or_default().push(slot);
        self.by_element
            .entry(key)
            .or_default()
            .insert(element.to_string(), slot);

        breakpoint
    }

    /// Look up the breakpoint for `element` within the file whose
    /// normalized path is `key`.
    pub fn lookup(&self, key: &str, element: &str) -> Option<&Breakpoint> {
        let slot = *self.by_element.get(key)?.get(element)?;
        self.arena.get(slot)
    }

    /// Mark the breakpoint for (`key`, `element`) as verified, returning
    /// the updated record when it was previously unverified.
    pub fn mark_verified(&mut self, key: &str, element: &str) -> Option<Breakpoint> {
        let slot = *self.by_element.get(key)?.get(element)?;
        let breakpoint = self.arena.get_mut(slot)?;
        if breakpoint.verified {
            return None;
        }
        breakpoint.verified = true;
        Some(breakpoint.clone())
    }

    /// Remove every breakpoint. Ids are not reused afterwards.
    pub fn clear(&mut self) {
        self.arena.clear();
        self.by_path.clear();
        self.by_element.clear();
    }

    /// Every normalized path with at least one registered breakpoint.
    pub fn paths(&self) -> Vec<String> {
        self.by_path.keys().cloned().collect()
    }

    /// The `setbp` payload for one path: the file's basename followed by
    /// each element name in registration order.
    pub fn resync_payload(&self, key: &str) -> String {
        let mut data = paths::basename(key).to_string();
        if let Some(slots) = self.by_path.get(key) {
            for &slot in slots {
                data.push('|');
                data.push_str(&self.arena[slot].name);
            }
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_and_increasing_for_repeat_registration() {
        let mut registry = BreakpointRegistry::new();
        let a = registry.register("taskA", "/tmp/a.wf");
        let b = registry.register("taskA", "/tmp/a.wf");
        let c = registry.register("taskA", "/tmp/a.wf");
        assert!(a.id < b.id && b.id < c.id);
    }

    #[test]
    fn clear_forgets_everything() {
        let mut registry = BreakpointRegistry::new();
        registry.register("taskA", "/tmp/a.wf");
        registry.register("taskB", "/tmp/b.wf");
        registry.clear();

        assert!(registry.lookup("/tmp/a.wf", "taskA").is_none());
        assert!(registry.lookup("/tmp/b.wf", "taskB").is_none());
        assert!(registry.paths().is_empty());
    }

    #[test]
    fn ids_keep_increasing_after_clear() {
        let mut registry = BreakpointRegistry::new();
        let a = registry.register("taskA", "/tmp/a.wf");
        registry.clear();
        let b = registry.register("taskA", "/tmp/a.wf");
        assert!(b.id > a.id);
    }

    #[test]
    fn lookup_is_case_insensitive_on_path() {
        let mut registry = BreakpointRegistry::new();
        let bp = registry.register("taskA", "/Tmp/A.wf");
        assert_eq!(bp.path, "/tmp/a.wf");
        assert!(registry.lookup("/tmp/a.wf", "taskA").is_some());
    }

    #[test]
    fn drive_letter_artifact_is_stripped() {
        let mut registry = BreakpointRegistry::new();
        let bp = registry.register("taskA", "/c:/work/a.wf");
        assert_eq!(bp.path, paths::normalize_key("c:/work/a.wf"));
    }

    #[test]
    fn verification_fires_once() {
        let mut registry = BreakpointRegistry::new();
        let bp = registry.register("taskA", "/tmp/a.wf");
        assert!(!bp.verified);

        let verified = registry
            .mark_verified("/tmp/a.wf", "taskA")
            .expect("first hit verifies");
        assert!(verified.verified);
        assert!(registry.mark_verified("/tmp/a.wf", "taskA").is_none());
    }

    #[test]
    fn resync_payload_lists_elements_in_registration_order() {
        let mut registry = BreakpointRegistry::new();
        registry.register("taskB", "/tmp/a.wf");
        registry.register("taskA", "/tmp/a.wf");
        registry.register("other", "/tmp/b.wf");

        assert_eq!(registry.resync_payload("/tmp/a.wf"), "a.wf|taskB|taskA");
        assert_eq!(registry.resync_payload("/tmp/b.wf"), "b.wf|other");
    }
}
