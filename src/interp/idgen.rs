//! Collision-resistant short identifiers
//!
//! Used for the synthetic temporaries that condition re-evaluation and
//! string interpolation assign into, and for object identities. The salt
//! keeps ids from separate interpreter instances distinct.

use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug)]
pub struct IdGen {
    salt: u32,
    counter: u64,
}

impl IdGen {
    pub fn new() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        IdGen {
            salt: nanos ^ std::process::id(),
            counter: 0,
        }
    }

    /// Next id, e.g. `__cond_1a2b3c_7`. The double underscore keeps the
    /// name out of reach of ordinary script identifiers.
    pub fn next(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("__{}_{:x}_{}", prefix, self.salt, self.counter)
    }
}

impl Default for IdGen {
    fn default() -> Self {
        IdGen::new()
    }
}
