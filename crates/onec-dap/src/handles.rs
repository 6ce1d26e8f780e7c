use std::collections::HashMap;

/// Maps opaque client-facing integers to values.
///
/// Handles are never reused: `next` only grows, so a handle that was removed
/// keeps failing to resolve even after new entries are allocated.
#[derive(Debug)]
pub(crate) struct HandleTable<T> {
    next: i64,
    map: HashMap<i64, T>,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self {
            next: 0,
            map: HashMap::new(),
        }
    }
}

impl<T> HandleTable<T> {
    pub(crate) fn alloc(&mut self, value: T) -> i64 {
        self.next += 1;
        let id = self.next;
        self.map.insert(id, value);
        id
    }

    pub(crate) fn get(&self, id: i64) -> Option<&T> {
        self.map.get(&id)
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        self.map.retain(|_, value| keep(value));
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }
}
