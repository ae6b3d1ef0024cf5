use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::errors::ChannelError;

/// Opaque per-registration value handed back to the handler on every match.
pub type ProcessorState = Arc<dyn Any + Send + Sync>;

/// Callback invoked with `(channel, segments, payload, state)`.
pub type Handler<P> = Box<dyn FnMut(&str, &[&str], &P, Option<&ProcessorState>) + Send + 'static>;

const GLOBAL_WILDCARD: &str = "/**";

/// Matching strategy, chosen once from the pattern shape at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// No wildcard, ordinal equality.
    Exact,
    /// `*` segments match exactly one candidate segment.
    Wildcard,
    /// Trailing `/**` matches any number of trailing segments, including none.
    GlobalWildcard,
}

impl PatternKind {
    /// Picks the variant for `pattern`, rejecting a `/**` that is not the final segment.
    pub fn of(pattern: &str) -> Result<Self, ChannelError> {
        match pattern.find(GLOBAL_WILDCARD) {
            Some(pos) if pos + GLOBAL_WILDCARD.len() == pattern.len() => Ok(Self::GlobalWildcard),
            Some(_) => Err(ChannelError::UnsupportedWildcard(pattern.to_string())),
            None if pattern.contains('*') => Ok(Self::Wildcard),
            None => Ok(Self::Exact),
        }
    }
}

pub struct ChannelProcessor<P> {
    pattern: String,
    segments: Vec<String>,
    kind: PatternKind,
    handler: Handler<P>,
    state: Option<ProcessorState>,
}

impl<P> ChannelProcessor<P> {
    pub fn new(
        pattern: &str,
        handler: Handler<P>,
        state: Option<ProcessorState>,
    ) -> Result<Self, ChannelError> {
        crate::channel::validate(pattern)?;
        let kind = PatternKind::of(pattern)?;
        let mut segments: Vec<String> = crate::channel::split(pattern)
            .into_iter()
            .map(String::from)
            .collect();
        if kind == PatternKind::GlobalWildcard {
            // keep only the prefix, `**` itself is implied by the kind
            segments.pop();
        }
        Ok(Self {
            pattern: pattern.to_string(),
            segments,
            kind,
            handler,
            state,
        })
    }

    pub(crate) fn catch_all(handler: Handler<P>, state: Option<ProcessorState>) -> Self {
        Self {
            pattern: String::new(),
            segments: Vec::new(),
            kind: PatternKind::GlobalWildcard,
            handler,
            state,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    /// Tests `channel` (already split into `segments`) against this pattern.
    pub fn matches(&self, channel: &str, segments: &[&str]) -> bool {
        match self.kind {
            PatternKind::Exact => {
                channel.len() == self.pattern.len()
                    && segments.len() == self.segments.len()
                    && channel == self.pattern
            }
            PatternKind::Wildcard => {
                segments.len() == self.segments.len() && self.prefix_matches(segments)
            }
            PatternKind::GlobalWildcard => {
                segments.len() >= self.segments.len() && self.prefix_matches(segments)
            }
        }
    }

    fn prefix_matches(&self, segments: &[&str]) -> bool {
        self.segments
            .iter()
            .zip(segments)
            .all(|(pattern, candidate)| pattern == "*" || pattern == candidate)
    }

    pub(crate) fn invoke(&mut self, channel: &str, segments: &[&str], payload: &P) {
        (self.handler)(channel, segments, payload, self.state.as_ref());
    }
}

impl<P> fmt::Debug for ChannelProcessor<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelProcessor")
            .field("pattern", &self.pattern)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor(pattern: &str) -> ChannelProcessor<()> {
        ChannelProcessor::new(pattern, Box::new(|_, _, _, _| {}), None).unwrap()
    }

    fn matches(pattern: &str, channel: &str) -> bool {
        processor(pattern).matches(channel, &crate::channel::split(channel))
    }

    #[test]
    fn kind_selection() {
        assert_eq!(PatternKind::of("/foo/bar").unwrap(), PatternKind::Exact);
        assert_eq!(PatternKind::of("/foo/*").unwrap(), PatternKind::Wildcard);
        assert_eq!(PatternKind::of("/foo/*/bar").unwrap(), PatternKind::Wildcard);
        assert_eq!(PatternKind::of("/foo/**").unwrap(), PatternKind::GlobalWildcard);
        assert_eq!(PatternKind::of("/*/foo/**").unwrap(), PatternKind::GlobalWildcard);
    }

    #[test]
    fn global_wildcard_must_be_last() {
        assert_eq!(
            PatternKind::of("/foo/**/bar"),
            Err(ChannelError::UnsupportedWildcard("/foo/**/bar".into()))
        );
        assert!(ChannelProcessor::<()>::new("/**/x", Box::new(|_, _, _, _| {}), None).is_err());
    }

    #[test]
    fn exact() {
        assert!(matches("/services/test", "/services/test"));
        assert!(!matches("/services/test", "/services/test/1"));
        assert!(!matches("/services/test", "/services/tesT"));
        assert!(!matches("/services/test", "/services"));
    }

    #[test]
    fn single_wildcard() {
        assert!(matches("/services/test/*/edit", "/services/test/1/edit"));
        assert!(!matches("/services/test/*/edit", "/services/test/1/2/edit"));
        assert!(!matches("/services/test/*/edit", "/services/test/1/view"));
        assert!(matches("/services/*", "/services/x"));
        assert!(!matches("/services/*", "/services"));
    }

    #[test]
    fn global_wildcard() {
        assert!(matches("/services/test/**", "/services/test"));
        assert!(matches("/services/test/**", "/services/test/edit"));
        assert!(matches("/services/test/**", "/services/test/1/edit"));
        assert!(!matches("/services/test/**", "/services"));
        assert!(!matches("/services/test/**", "/services/other/edit"));
        assert!(matches("/services/*/**", "/services/a/b/c"));
    }
}
