//! Guard against truncated re-sends
//!
//! One backend's streaming implementation occasionally re-sends a truncated
//! prefix of output it already delivered. The filter remembers the longest
//! complete candidate seen and drops fragments that would only rewind it.
//! This is a pragmatic patch for that backend, not a protocol guarantee, so
//! it is only engaged for providers configured with the quirk.

use tracing::debug;

#[derive(Debug, Default)]
pub struct DuplicateFilter {
    enabled: bool,
    last_candidate: Option<String>,
}

impl DuplicateFilter {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            last_candidate: None,
        }
    }

    /// Returns false if the fragment is judged a truncated repeat of content
    /// already delivered. Pass-through when the quirk is disabled.
    pub fn admit(&mut self, accumulated: &str, fragment: &str) -> bool {
        if !self.enabled || fragment.is_empty() {
            return true;
        }
        let candidate = format!("{accumulated}{fragment}");
        if let Some(previous) = &self.last_candidate {
            // The bug shows up as a proper prefix of output already seen,
            // re-sent either from scratch or on top of the accumulation
            let rewinds_candidate =
                previous.len() > candidate.len() && previous.starts_with(&candidate);
            let rewinds_fragment =
                previous.len() > fragment.len() && previous.starts_with(fragment);
            if rewinds_candidate || rewinds_fragment {
                debug!(
                    "Dropping truncated re-send ({} bytes against {} remembered)",
                    fragment.len(),
                    previous.len()
                );
                return false;
            }
        }
        self.last_candidate = Some(candidate);
        true
    }
}
