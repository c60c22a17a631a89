//! Fixed-capacity ring of pooled connections with a cursor on the active member.

use std::sync::Arc;

use crate::pool::connection::{ConnectionHandle, ConnectionId};

#[derive(Debug)]
pub(crate) struct Ring<C> {
    members: Vec<Arc<C>>,
    cursor: usize,
}

impl<C> Default for Ring<C> {
    fn default() -> Self {
        Self {
            members: Vec::new(),
            cursor: 0,
        }
    }
}

impl<C> Ring<C> {
    pub fn from_members(members: Vec<Arc<C>>) -> Self {
        Self { members, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<C>> {
        self.members.get(index)
    }

    /// Member under the cursor.
    pub fn active(&self) -> Option<&Arc<C>> {
        self.members.get(self.cursor)
    }

    /// Slot the next predictive rotation moves to.
    pub fn next_index(&self) -> Option<usize> {
        if self.members.is_empty() {
            None
        } else {
            Some((self.cursor + 1) % self.members.len())
        }
    }

    /// Every slot except the cursor, in rotation order.
    pub fn indices_after_cursor(&self) -> Vec<usize> {
        let len = self.members.len();
        (1..len).map(|i| (self.cursor + i) % len).collect()
    }

    pub fn set_cursor(&mut self, index: usize) {
        debug_assert!(index < self.members.len());
        self.cursor = index;
    }

    /// Put `conn` in `index`, returning the previous occupant.
    pub fn replace(&mut self, index: usize, conn: Arc<C>) -> Arc<C> {
        std::mem::replace(&mut self.members[index], conn)
    }

    /// Install `conn` under the cursor; on an empty ring it becomes the only member.
    pub fn install_active(&mut self, conn: Arc<C>) -> Option<Arc<C>> {
        if self.members.is_empty() {
            self.members.push(conn);
            self.cursor = 0;
            None
        } else {
            Some(self.replace(self.cursor, conn))
        }
    }

    pub fn push(&mut self, conn: Arc<C>) {
        self.members.push(conn);
    }

    pub fn position(&self, conn: &Arc<C>) -> Option<usize> {
        self.members.iter().position(|m| Arc::ptr_eq(m, conn))
    }

    /// Remove every member, leaving an empty ring.
    pub fn drain(&mut self) -> Vec<Arc<C>> {
        self.cursor = 0;
        std::mem::take(&mut self.members)
    }
}

impl<C: ConnectionHandle> Ring<C> {
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.members.iter().map(|m| m.id()).collect()
    }
}
