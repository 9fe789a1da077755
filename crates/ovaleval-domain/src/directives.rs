//! Reporting policy: which verdicts are exported, and how verbosely.

use ovaleval_types::{ContentLevel, DirectiveDoc, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directive {
    pub reported: bool,
    pub content: ContentLevel,
}

impl Default for Directive {
    fn default() -> Self {
        Self {
            reported: true,
            content: ContentLevel::Full,
        }
    }
}

/// Per-verdict directives. Everything is reported in full by default.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultDirectives {
    entries: [Directive; 7],
}

impl ResultDirectives {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reported(&mut self, verdict: Verdict, reported: bool) {
        self.entries[verdict.index()].reported = reported;
    }

    pub fn set_content(&mut self, verdict: Verdict, content: ContentLevel) {
        self.entries[verdict.index()].content = content;
    }

    pub fn reported(&self, verdict: Verdict) -> bool {
        self.entries[verdict.index()].reported
    }

    pub fn content(&self, verdict: Verdict) -> ContentLevel {
        self.entries[verdict.index()].content
    }

    /// Reported entries whose content level asks for the evidence trail.
    pub fn is_full(&self, verdict: Verdict) -> bool {
        self.reported(verdict) && self.content(verdict) == ContentLevel::Full
    }

    pub fn any_full(&self) -> bool {
        Verdict::ALL.into_iter().any(|v| self.is_full(v))
    }

    pub fn to_doc(&self) -> Vec<DirectiveDoc> {
        Verdict::ALL
            .into_iter()
            .filter(|v| v.is_valid())
            .map(|v| DirectiveDoc {
                result: v,
                reported: self.reported(v),
                content: self.content(v),
            })
            .collect()
    }

    /// Verdicts missing from `docs` keep their defaults.
    pub fn from_doc(docs: &[DirectiveDoc]) -> Self {
        let mut out = Self::default();
        out.apply(docs);
        out
    }

    pub fn apply(&mut self, docs: &[DirectiveDoc]) {
        for d in docs {
            self.set_reported(d.result, d.reported);
            self.set_content(d.result, d.content);
        }
    }
}
