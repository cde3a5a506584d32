//! Identity helpers: counter-based ids and generated dropsite names.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic id source.
#[derive(Debug)]
pub(crate) struct IdSequence {
    next: AtomicU64,
}

impl IdSequence {
    pub(crate) fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub(crate) fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

/// Name for the anonymous dropsite wrapping an inline subscriber.
///
/// `taken` reports names already present in the registry; the counter is
/// advanced until the candidate is free, so a user-chosen dropsite name can
/// never be captured by an inline target.
pub(crate) fn inline_dropsite_name(
    prefix: &str,
    channel: &str,
    counter: &IdSequence,
    taken: impl Fn(&str) -> bool,
) -> String {
    loop {
        let candidate = format!("{} for {}/{}", prefix, channel, counter.next());
        if !taken(&candidate) {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_sequence_is_monotonic() {
        let seq = IdSequence::default();
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
        assert_eq!(seq.next(), 3);
    }

    #[test]
    fn test_inline_names_are_unique() {
        let counter = IdSequence::default();
        let mut names = HashSet::new();
        for _ in 0..50 {
            let name = inline_dropsite_name("inline", "cfg", &counter, |n| names.contains(n));
            assert!(names.insert(name));
        }
    }

    #[test]
    fn test_inline_name_skips_taken() {
        let counter = IdSequence::default();
        let name = inline_dropsite_name("inline", "cfg", &counter, |n| n == "inline for cfg/1");
        assert_eq!(name, "inline for cfg/2");
    }
}
