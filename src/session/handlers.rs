//! User handler table.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::identifiers::HandlerId;
use crate::protocol::SessionEvent;

// ============================================================================
// Types
// ============================================================================

/// User event handler.
///
/// Returning `Err` or panicking reports a `middleware_error` event; delivery
/// to the remaining handlers continues.
pub type Handler = Arc<dyn Fn(&SessionEvent) -> Result<()> + Send + Sync>;

// ============================================================================
// HandlerTable
// ============================================================================

/// Handlers keyed by event name, plus catch-all handlers.
#[derive(Default)]
pub(crate) struct HandlerTable {
    by_name: FxHashMap<String, Vec<(HandlerId, Handler)>>,
    any: Vec<(HandlerId, Handler)>,
}

impl HandlerTable {
    pub(crate) fn insert(&mut self, event: &str, handler: Handler) -> HandlerId {
        let id = HandlerId::next();
        self.by_name
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    pub(crate) fn insert_any(&mut self, handler: Handler) -> HandlerId {
        let id = HandlerId::next();
        self.any.push((id, handler));
        id
    }

    pub(crate) fn remove(&mut self, id: HandlerId) -> bool {
        if let Some(pos) = self.any.iter().position(|(h, _)| *h == id) {
            self.any.remove(pos);
            return true;
        }

        let mut removed = false;
        self.by_name.retain(|_, list| {
            if let Some(pos) = list.iter().position(|(h, _)| *h == id) {
                list.remove(pos);
                removed = true;
            }
            !list.is_empty()
        });
        removed
    }

    /// Handlers for `event` in registration order.
    pub(crate) fn snapshot(&self, event: &str) -> Vec<Handler> {
        let named = self.by_name.get(event).map(Vec::as_slice).unwrap_or(&[]);
        let mut matched: Vec<&(HandlerId, Handler)> =
            named.iter().chain(self.any.iter()).collect();
        // Ids are monotonic, so sorting restores registration order.
        matched.sort_by_key(|(id, _)| *id);
        matched.into_iter().map(|(_, h)| Arc::clone(h)).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.any.len() + self.by_name.values().map(Vec::len).sum::<usize>()
    }
}

// ============================================================================
// Panic Messages
// ============================================================================

/// Extracts a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "panic".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    fn recording(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> Handler {
        let log = Arc::clone(log);
        Arc::new(move |_| {
            log.lock().push(tag);
            Ok(())
        })
    }

    #[test]
    fn test_snapshot_interleaves_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut table = HandlerTable::default();

        table.insert("open", recording(&log, "first"));
        table.insert_any(recording(&log, "any"));
        table.insert("open", recording(&log, "third"));
        table.insert("close", recording(&log, "other"));

        for handler in table.snapshot("open") {
            handler(&SessionEvent::Open).expect("handler");
        }
        assert_eq!(*log.lock(), vec!["first", "any", "third"]);
    }

    #[test]
    fn test_remove() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut table = HandlerTable::default();

        let named = table.insert("open", recording(&log, "a"));
        let any = table.insert_any(recording(&log, "b"));
        assert_eq!(table.len(), 2);

        assert!(table.remove(named));
        assert!(table.remove(any));
        assert!(!table.remove(named));
        assert_eq!(table.len(), 0);
        assert!(table.snapshot("open").is_empty());
    }

    #[test]
    fn test_panic_message() {
        let payload = std::panic::catch_unwind(|| -> u8 { panic!("boom") }).expect_err("panicked");
        assert_eq!(panic_message(payload.as_ref()), "boom");
    }
}
