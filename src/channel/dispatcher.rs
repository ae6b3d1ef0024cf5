use crate::errors::ChannelError;

use super::processor::{ChannelProcessor, Handler, ProcessorState};

/// Routes `(channel, payload)` pairs to the first registered matching handler.
///
/// Processors are tried in registration order, so earlier registrations win
/// when several patterns match. A single default handler, registered with an
/// empty pattern, receives everything nothing else matched.
///
/// ```rust
/// use tokio_bayeux::channel::ChannelDispatcher;
///
/// let mut dispatcher = ChannelDispatcher::<String>::new();
/// dispatcher
///     .register("/chat/*", Box::new(|channel, _, payload, _| {
///         println!("{channel}: {payload}");
///     }), None)
///     .unwrap();
///
/// assert_eq!(dispatcher.handle("/chat/lobby", &"hi".to_string()), Ok(true));
/// assert_eq!(dispatcher.handle("/news", &"ignored".to_string()), Ok(false));
/// ```
pub struct ChannelDispatcher<P> {
    processors: Vec<ChannelProcessor<P>>,
    default: Option<ChannelProcessor<P>>,
}

impl<P> Default for ChannelDispatcher<P> {
    fn default() -> Self {
        Self {
            processors: Vec::new(),
            default: None,
        }
    }
}

impl<P> ChannelDispatcher<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `pattern`; an empty pattern replaces the default handler.
    pub fn register(
        &mut self,
        pattern: &str,
        handler: Handler<P>,
        state: Option<ProcessorState>,
    ) -> Result<(), ChannelError> {
        if pattern.is_empty() {
            self.register_default(handler, state);
            return Ok(());
        }

        let processor = ChannelProcessor::new(pattern, handler, state)?;
        log::debug!("registered {:?} handler for {}", processor.kind(), pattern);
        self.processors.push(processor);
        Ok(())
    }

    pub fn register_default(&mut self, handler: Handler<P>, state: Option<ProcessorState>) {
        self.default = Some(ChannelProcessor::catch_all(handler, state));
    }

    /// Delivers `payload` to the first processor matching `channel`.
    ///
    /// Returns `Ok(true)` if a registered pattern matched. Otherwise the
    /// default handler, if any, is invoked and `Ok(false)` is returned.
    pub fn handle(&mut self, channel: &str, payload: &P) -> Result<bool, ChannelError> {
        if channel.is_empty() {
            return Err(ChannelError::Empty);
        }

        let segments = super::split(channel);
        if let Some(processor) = self
            .processors
            .iter_mut()
            .find(|p| p.matches(channel, &segments))
        {
            processor.invoke(channel, &segments, payload);
            return Ok(true);
        }

        if let Some(ref mut default) = self.default {
            default.invoke(channel, &segments, payload);
        }
        Ok(false)
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty() && self.default.is_none()
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn clear(&mut self) {
        self.processors.clear();
        self.default = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &Log, name: &'static str) -> Handler<u32> {
        let log = log.clone();
        Box::new(move |channel, _, payload, _| {
            log.lock().unwrap().push(format!("{name}:{channel}:{payload}"));
        })
    }

    #[test]
    fn first_registration_wins() {
        let log = Log::default();
        let mut dispatcher = ChannelDispatcher::new();
        dispatcher.register("/a/*", recorder(&log, "first"), None).unwrap();
        dispatcher.register("/a/b", recorder(&log, "second"), None).unwrap();

        assert_eq!(dispatcher.handle("/a/b", &1), Ok(true));
        assert_eq!(*log.lock().unwrap(), vec!["first:/a/b:1"]);
    }

    #[test]
    fn default_handler_fires_only_without_match() {
        let log = Log::default();
        let mut dispatcher = ChannelDispatcher::new();
        dispatcher.register("/a/**", recorder(&log, "tree"), None).unwrap();
        dispatcher.register("", recorder(&log, "old"), None).unwrap();
        dispatcher.register("", recorder(&log, "default"), None).unwrap();

        assert_eq!(dispatcher.handle("/a/b/c", &1), Ok(true));
        assert_eq!(dispatcher.handle("/b", &2), Ok(false));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["tree:/a/b/c:1", "default:/b:2"]
        );
    }

    #[test]
    fn no_match_without_default_is_silent() {
        let log = Log::default();
        let mut dispatcher = ChannelDispatcher::new();
        dispatcher.register("/a", recorder(&log, "a"), None).unwrap();

        assert_eq!(dispatcher.handle("/b", &1), Ok(false));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn empty_channel_is_rejected() {
        let mut dispatcher = ChannelDispatcher::<u32>::new();
        assert_eq!(dispatcher.handle("", &1), Err(ChannelError::Empty));
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        let log = Log::default();
        let mut dispatcher = ChannelDispatcher::new();
        assert!(matches!(
            dispatcher.register("/a/**/b", recorder(&log, "x"), None),
            Err(ChannelError::UnsupportedWildcard(_))
        ));
        assert!(matches!(
            dispatcher.register("/a b", recorder(&log, "x"), None),
            Err(ChannelError::InvalidCharacter { .. })
        ));
        assert_eq!(dispatcher.len(), 0);
    }

    #[test]
    fn state_is_passed_through() {
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        let mut dispatcher = ChannelDispatcher::new();
        dispatcher
            .register(
                "/a/*",
                Box::new(move |_, segments, _, state| {
                    let tag = state.and_then(|s| s.downcast_ref::<&'static str>()).copied();
                    *seen_clone.lock().unwrap() = Some((segments.join(","), tag));
                }),
                Some(Arc::new("tagged")),
            )
            .unwrap();

        dispatcher.handle("/a/b", &0u32).unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            Some(("a,b".to_string(), Some("tagged")))
        );
    }
}
