//! Collects finalized transcript fragments into one utterance.

/// Ordered, append-only collection of final transcript fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptAggregator {
    fragments: Vec<String>,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment. Blank fragments are dropped.
    ///
    /// Returns `true` if the fragment was kept.
    pub fn append(&mut self, fragment: impl Into<String>) -> bool {
        let fragment = fragment.into();
        if fragment.trim().is_empty() {
            return false;
        }
        self.fragments.push(fragment);
        true
    }

    /// Join all fragments with a single space and trim the result.
    pub fn finalize(&self) -> String {
        self.fragments.join(" ").trim().to_string()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }
}
