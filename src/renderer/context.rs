//! Shared renderer context
//!
//! Renderer ids and the count of live instances are kept in an explicit context
//! handed to every renderer, so two independent hosts never share a counter.

use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct Registry {
    next_id: u32,
    live: Vec<u32>,
}

/// Context shared by all renderers drawing through one GPU device
#[derive(Clone, Default)]
pub struct RenderContext {
    registry: Arc<Mutex<Registry>>,
}

impl RenderContext {
    /// Renderers allowed to coexist on one context
    pub const MAX_RENDERERS: usize = 4;

    pub fn new() -> Self {
        Self::default()
    }

    /// Number of usable renderers currently alive
    pub fn live_renderers(&self) -> usize {
        self.registry.lock().live.len()
    }

    pub(crate) fn register(&self) -> Registration {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;

        let usable = registry.live.len() < Self::MAX_RENDERERS;
        if usable {
            registry.live.push(id);
        } else {
            log::error!(
                "Too many renderer instances: renderer {} exceeds the limit of {} and is unusable",
                id,
                Self::MAX_RENDERERS
            );
        }

        Registration {
            registry: Arc::clone(&self.registry),
            id,
            usable,
        }
    }
}

/// A renderer's slot in its context, released on drop
pub(crate) struct Registration {
    registry: Arc<Mutex<Registry>>,
    pub(crate) id: u32,
    pub(crate) usable: bool,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.usable {
            self.registry.lock().live.retain(|id| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registrations_over_the_cap_are_unusable() {
        let context = RenderContext::new();
        let usable: Vec<_> = (0..RenderContext::MAX_RENDERERS).map(|_| context.register()).collect();
        assert!(usable.iter().all(|r| r.usable));

        let extra = context.register();
        assert!(!extra.usable);
        assert_eq!(extra.id, 4);
        assert_eq!(context.live_renderers(), 4);
    }

    #[test]
    fn test_dropping_frees_a_slot() {
        let context = RenderContext::new();
        let mut registrations: Vec<_> = (0..RenderContext::MAX_RENDERERS).map(|_| context.register()).collect();
        registrations.pop();
        assert_eq!(context.live_renderers(), 3);
        assert!(context.register().usable);
    }

    #[test]
    fn test_contexts_are_independent() {
        let a = RenderContext::new();
        let b = RenderContext::new();
        let _held: Vec<_> = (0..RenderContext::MAX_RENDERERS).map(|_| a.register()).collect();
        assert!(b.register().usable);
    }
}
