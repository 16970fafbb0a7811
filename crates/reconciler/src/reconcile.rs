//! Delta vs. full-replacement reconciliation
//!
//! Providers disagree on what a "delta" means: most send incremental
//! fragments, some resend the whole accumulated output every time, and a
//! few only deliver a final summary payload. These merge functions decide
//! per fragment which convention is in play.

/// How a fragment was folded into the accumulated content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Fragment was appended; content grew.
    Appended,
    /// Fragment contained the previous accumulation and replaced it.
    Replaced,
    /// Fragment was a repeat and was dropped.
    Discarded,
}

impl MergeOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, MergeOutcome::Discarded)
    }
}

/// Merge a plain-text fragment into the accumulated answer text.
pub fn merge_text(accumulated: &mut String, fragment: &str) -> MergeOutcome {
    if fragment.is_empty() {
        return MergeOutcome::Discarded;
    }
    if accumulated.is_empty() {
        accumulated.push_str(fragment);
        return MergeOutcome::Appended;
    }
    if fragment.contains(accumulated.as_str()) {
        // Cumulative provider: the fragment is the full output so far
        *accumulated = fragment.to_string();
        return MergeOutcome::Replaced;
    }
    accumulated.push_str(fragment);
    MergeOutcome::Appended
}

/// Merge a reasoning fragment. Same rule as text, but exact repeats and
/// trailing duplicates are discarded; at least one backend intermittently
/// resends the tail of the previous fragment.
pub fn merge_thinking(accumulated: &mut String, fragment: &str) -> MergeOutcome {
    if fragment.is_empty() {
        return MergeOutcome::Discarded;
    }
    if accumulated.is_empty() {
        accumulated.push_str(fragment);
        return MergeOutcome::Appended;
    }
    if fragment == accumulated || accumulated.ends_with(fragment) {
        return MergeOutcome::Discarded;
    }
    if fragment.contains(accumulated.as_str()) {
        *accumulated = fragment.to_string();
        return MergeOutcome::Replaced;
    }
    accumulated.push_str(fragment);
    MergeOutcome::Appended
}

/// Merge a completion payload delivered in one piece.
///
/// If the payload already contains everything accumulated, it replaces the
/// accumulation. Otherwise it is an unrelated final summary and is appended
/// after a blank line.
pub fn merge_completion(accumulated: &mut String, payload: &str) -> MergeOutcome {
    if payload.is_empty() {
        return MergeOutcome::Discarded;
    }
    if accumulated.is_empty() {
        accumulated.push_str(payload);
        return MergeOutcome::Appended;
    }
    if payload.contains(accumulated.as_str()) {
        *accumulated = payload.to_string();
        return MergeOutcome::Replaced;
    }
    if accumulated.ends_with(payload) {
        return MergeOutcome::Discarded;
    }
    accumulated.push_str("\n\n");
    accumulated.push_str(payload);
    MergeOutcome::Appended
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_deltas_append() {
        let mut acc = String::new();
        assert_eq!(merge_text(&mut acc, "Hel"), MergeOutcome::Appended);
        assert_eq!(merge_text(&mut acc, "lo, "), MergeOutcome::Appended);
        assert_eq!(merge_text(&mut acc, "world"), MergeOutcome::Appended);
        assert_eq!(acc, "Hello, world");
    }

    #[test]
    fn cumulative_text_replaces() {
        let mut acc = "Hello".to_string();
        assert_eq!(merge_text(&mut acc, "Hello, world"), MergeOutcome::Replaced);
        assert_eq!(acc, "Hello, world");
    }

    #[test]
    fn accumulation_never_shrinks() {
        let mut acc = String::new();
        for fragment in ["Hel", "Hello", "!", " More.", ""] {
            let before = acc.len();
            merge_text(&mut acc, fragment);
            assert!(acc.len() >= before, "shrank on {:?}", fragment);
        }
        assert_eq!(acc, "Hello! More.");
    }

    #[test]
    fn empty_fragment_is_discarded() {
        let mut acc = "Hello".to_string();
        assert_eq!(merge_text(&mut acc, ""), MergeOutcome::Discarded);
        assert_eq!(acc, "Hello");
    }

    #[test]
    fn thinking_drops_exact_repeat() {
        let mut acc = "step one".to_string();
        assert_eq!(merge_thinking(&mut acc, "step one"), MergeOutcome::Discarded);
        assert_eq!(acc, "step one");
    }

    #[test]
    fn thinking_drops_trailing_duplicate() {
        let mut acc = "step one, step two".to_string();
        assert_eq!(
            merge_thinking(&mut acc, " step two"),
            MergeOutcome::Discarded
        );
        assert_eq!(acc, "step one, step two");
    }

    #[test]
    fn thinking_appends_new_content() {
        let mut acc = "step one".to_string();
        assert_eq!(
            merge_thinking(&mut acc, ", step two"),
            MergeOutcome::Appended
        );
        assert_eq!(acc, "step one, step two");
    }

    #[test]
    fn completion_containing_prefix_replaces() {
        let mut acc = "The answer".to_string();
        assert_eq!(
            merge_completion(&mut acc, "The answer is 42."),
            MergeOutcome::Replaced
        );
        assert_eq!(acc, "The answer is 42.");
    }

    #[test]
    fn unrelated_completion_appends_with_separator() {
        let mut acc = "Working through it...".to_string();
        assert_eq!(
            merge_completion(&mut acc, "Final summary."),
            MergeOutcome::Appended
        );
        assert_eq!(acc, "Working through it...\n\nFinal summary.");
    }

    #[test]
    fn completion_into_empty_adopts_payload() {
        let mut acc = String::new();
        assert_eq!(
            merge_completion(&mut acc, "Only a summary."),
            MergeOutcome::Appended
        );
        assert_eq!(acc, "Only a summary.");
    }
}
