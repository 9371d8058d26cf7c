//! Transient references to rendered documents.
//!
//! A reference stays resolvable until it is revoked. The controller keeps at
//! most one live reference: it revokes the previous one before installing a
//! new one.

use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

const REFERENCE_PREFIX: &str = "blob:quire/";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputRef(String);

impl OutputRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OutputRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Default)]
pub struct OutputRegistry {
    next: u64,
    live: HashMap<OutputRef, Arc<Vec<u8>>>,
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `bytes` and returns a fresh reference to them.
    pub fn create(&mut self, bytes: Vec<u8>) -> OutputRef {
        self.next += 1;
        let reference = OutputRef(format!("{}{}", REFERENCE_PREFIX, self.next));
        debug!("[CONTROLLER] Created {} ({} bytes)", reference, bytes.len());
        self.live.insert(reference.clone(), Arc::new(bytes));
        reference
    }

    /// Releases a reference. Returns false if it was not live.
    pub fn revoke(&mut self, reference: &OutputRef) -> bool {
        let revoked = self.live.remove(reference).is_some();
        if revoked {
            debug!("[CONTROLLER] Revoked {}", reference);
        }
        revoked
    }

    pub fn resolve(&self, reference: &OutputRef) -> Option<Arc<Vec<u8>>> {
        self.live.get(reference).cloned()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}
