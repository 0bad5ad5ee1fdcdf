use std::{
    cell::RefCell,
    sync::{Arc, Weak},
    thread::{self, ThreadId},
};

use dashmap::DashMap;

use crate::optimizer::SharedState;

/// Per-thread shortcuts to partition states.
///
/// A thread's entry is removed when the thread exits, through a destructor
/// registered in the thread's local storage on first insert.
#[derive(Debug)]
pub(crate) struct ThreadCache<T> {
    entries: DashMap<ThreadId, Arc<SharedState<T>>>,
}

impl<T: Send + Sync + 'static> ThreadCache<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
        })
    }

    /// The calling thread's entry.
    pub(crate) fn get(&self) -> Option<Arc<SharedState<T>>> {
        self.entries
            .get(&thread::current().id())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// The calling thread's entry, inserting `init()` if there is none.
    ///
    /// Only the owning thread ever inserts under its own id.
    pub(crate) fn get_or_insert_with(
        self: &Arc<Self>,
        init: impl FnOnce() -> Arc<SharedState<T>>,
    ) -> Arc<SharedState<T>> {
        let thread = thread::current().id();
        if let Some(entry) = self.entries.get(&thread) {
            return Arc::clone(entry.value());
        }
        let state = init();
        self.entries.insert(thread, Arc::clone(&state));
        register_exit_hook(self);
        state
    }

    pub(crate) fn remove_current(&self) {
        self.entries.remove(&thread::current().id());
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

trait ForgetThread: Send + Sync {
    fn forget(&self, thread: ThreadId);
}

impl<T: Send + Sync> ForgetThread for ThreadCache<T> {
    fn forget(&self, thread: ThreadId) {
        self.entries.remove(&thread);
    }
}

/// Caches the current thread holds an entry in. Dropped on thread exit.
struct ExitHooks {
    thread: ThreadId,
    caches: RefCell<Vec<Weak<dyn ForgetThread>>>,
}

impl Drop for ExitHooks {
    fn drop(&mut self) {
        for cache in self.caches.get_mut().drain(..) {
            if let Some(cache) = cache.upgrade() {
                cache.forget(self.thread);
            }
        }
    }
}

thread_local! {
    static EXIT_HOOKS: ExitHooks = ExitHooks {
        thread: thread::current().id(),
        caches: RefCell::new(Vec::new()),
    };
}

fn register_exit_hook<T: Send + Sync + 'static>(cache: &Arc<ThreadCache<T>>) {
    let hook: Weak<dyn ForgetThread> = Arc::<ThreadCache<T>>::downgrade(cache);
    // Fails only while the thread is already tearing down its locals; the
    // entry is then left for `remove_current` or the cache's own drop.
    let _ = EXIT_HOOKS.try_with(|hooks| {
        let mut caches = hooks.caches.borrow_mut();
        caches.retain(|cache| cache.strong_count() > 0);
        if !caches.iter().any(|cache| Weak::ptr_eq(cache, &hook)) {
            caches.push(hook);
        }
    });
}
