const NONE: usize = usize::MAX;

enum Entry<T> {
    Vacant { next: usize },
    Occupied(T),
}

/// Growable slab with a LIFO free list.
///
/// Keys stay valid until the entry is removed, so they can be handed out
/// as locators and stored in side structures (heap positions, buckets).
pub struct Slab<T> {
    entries: Vec<Entry<T>>,
    free_head: usize,
    len: usize,
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(unused)]
impl<T> Slab<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_head: NONE,
            len: 0,
        }
    }

    /// Insert a value. Returns the key.
    #[inline]
    pub fn insert(&mut self, value: T) -> usize {
        self.len += 1;

        if self.free_head == NONE {
            self.entries.push(Entry::Occupied(value));
            return self.entries.len() - 1;
        }

        let key = self.free_head;
        let entry = &mut self.entries[key];
        let Entry::Vacant { next } = *entry else {
            unreachable!("free list points at occupied entry {key}");
        };

        self.free_head = next;
        *entry = Entry::Occupied(value);
        key
    }

    /// Remove by key. Returns `None` if the key is vacant or out of range.
    #[inline]
    pub fn remove(&mut self, key: usize) -> Option<T> {
        let entry = self.entries.get_mut(key)?;
        if !matches!(entry, Entry::Occupied(_)) {
            return None;
        }

        let old = std::mem::replace(
            entry,
            Entry::Vacant {
                next: self.free_head,
            },
        );
        self.free_head = key;
        self.len -= 1;

        match old {
            Entry::Occupied(value) => Some(value),
            Entry::Vacant { .. } => None,
        }
    }

    #[inline]
    pub fn get(&self, key: usize) -> Option<&T> {
        match self.entries.get(key)? {
            Entry::Occupied(value) => Some(value),
            Entry::Vacant { .. } => None,
        }
    }

    #[inline]
    pub fn get_mut(&mut self, key: usize) -> Option<&mut T> {
        match self.entries.get_mut(key)? {
            Entry::Occupied(value) => Some(value),
            Entry::Vacant { .. } => None,
        }
    }

    /// Remove every occupied entry, yielding them in key order.
    ///
    /// Storage is released; the slab is empty afterwards.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.free_head = NONE;
        self.len = 0;
        self.entries.drain(..).filter_map(|entry| match entry {
            Entry::Occupied(value) => Some(value),
            Entry::Vacant { .. } => None,
        })
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }
}
