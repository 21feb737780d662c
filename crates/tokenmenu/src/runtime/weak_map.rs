use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::host::{TokenHandle, TokenId, TokenRef};

struct WeakEntry<V> {
    token: Weak<dyn TokenHandle>,
    value: V,
}

impl<V> WeakEntry<V> {
    fn is_live(&self) -> bool {
        self.token.strong_count() > 0
    }

    fn refers_to(&self, token: &TokenRef) -> bool {
        self.token.as_ptr() as *const () == Rc::as_ptr(token) as *const ()
    }
}

/// Per-token table whose entries die with their token. An entry stored for a
/// token that was dropped, or for a different token object reusing the same id,
/// reads as absent.
pub struct WeakTokenMap<V> {
    entries: HashMap<TokenId, WeakEntry<V>>,
}

impl<V> Default for WeakTokenMap<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V> WeakTokenMap<V> {
    pub fn insert(&mut self, token: &TokenRef, value: V) -> Option<V> {
        let previous = self.remove(token);
        self.entries.insert(
            token.id(),
            WeakEntry {
                token: Rc::downgrade(token),
                value,
            },
        );
        previous
    }

    pub fn get(&self, token: &TokenRef) -> Option<&V> {
        self.entries
            .get(&token.id())
            .filter(|entry| entry.is_live() && entry.refers_to(token))
            .map(|entry| &entry.value)
    }

    pub fn get_mut(&mut self, token: &TokenRef) -> Option<&mut V> {
        self.entries
            .get_mut(&token.id())
            .filter(|entry| entry.is_live() && entry.refers_to(token))
            .map(|entry| &mut entry.value)
    }

    pub fn contains(&self, token: &TokenRef) -> bool {
        self.get(token).is_some()
    }

    pub fn remove(&mut self, token: &TokenRef) -> Option<V> {
        let id = token.id();
        let refers = self
            .entries
            .get(&id)
            .is_some_and(|entry| entry.is_live() && entry.refers_to(token));
        let entry = self.entries.remove(&id)?;
        refers.then_some(entry.value)
    }

    /// Removes by id regardless of liveness, returning the token if it is still alive.
    pub fn remove_id(&mut self, id: &TokenId) -> Option<(Option<TokenRef>, V)> {
        self.entries
            .remove(id)
            .map(|entry| (entry.token.upgrade(), entry.value))
    }

    /// Drops entries whose token is gone; returns how many were dropped.
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live());
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.values().filter(|entry| entry.is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empties the table, handing back every value whether or not its token lives.
    pub fn drain_values(&mut self) -> Vec<V> {
        self.entries.drain().map(|(_, entry)| entry.value).collect()
    }

    /// Like `prune`, but hands back the dropped values so they can be released.
    pub fn take_dead(&mut self) -> Vec<V> {
        let dead = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_live())
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();
        dead.into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .map(|entry| entry.value)
            .collect()
    }
}
