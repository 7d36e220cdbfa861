//! In-memory list with optimistic edits.
//!
//! A view applies a delete or update before the server confirms it and keeps
//! the returned `Rollback`; if the call fails it hands the rollback back to
//! restore the previous entry in its original position.

use crate::models::{Asset, MaintenanceRecord, Page, User};

/// Anything with a stable server id
pub trait Keyed {
    fn key(&self) -> i64;
}

impl Keyed for Asset {
    fn key(&self) -> i64 {
        self.id
    }
}

impl Keyed for MaintenanceRecord {
    fn key(&self) -> i64 {
        self.id
    }
}

impl Keyed for User {
    fn key(&self) -> i64 {
        self.id
    }
}

/// Undo record for one optimistic edit
#[derive(Debug, Clone)]
#[must_use = "keep the rollback until the server confirms the change"]
pub enum Rollback<T> {
    Removed { index: usize, item: T },
    Replaced { item: T },
    Inserted { key: i64 },
}

#[derive(Debug, Clone)]
pub struct OptimisticList<T> {
    items: Vec<T>,
    total: u64,
}

impl<T> Default for OptimisticList<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

impl<T: Keyed + Clone> OptimisticList<T> {
    pub fn new(items: Vec<T>) -> Self {
        let total = items.len() as u64;
        Self { items, total }
    }

    pub fn from_page(page: Page<T>) -> Self {
        Self {
            total: page.total_elements.max(page.content.len() as u64),
            items: page.content,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Server-side total, adjusted by optimistic edits
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn get(&self, key: i64) -> Option<&T> {
        self.items.iter().find(|item| item.key() == key)
    }

    fn position(&self, key: i64) -> Option<usize> {
        self.items.iter().position(|item| item.key() == key)
    }

    /// Put a freshly created item at the top
    pub fn insert_optimistic(&mut self, item: T) -> Rollback<T> {
        let key = item.key();
        self.items.insert(0, item);
        self.total += 1;
        Rollback::Inserted { key }
    }

    pub fn remove_optimistic(&mut self, key: i64) -> Option<Rollback<T>> {
        let index = self.position(key)?;
        let item = self.items.remove(index);
        self.total = self.total.saturating_sub(1);
        Some(Rollback::Removed { index, item })
    }

    /// Swap in the edited version of an item already in the list
    pub fn replace_optimistic(&mut self, item: T) -> Option<Rollback<T>> {
        let index = self.position(item.key())?;
        let previous = std::mem::replace(&mut self.items[index], item);
        Some(Rollback::Replaced { item: previous })
    }

    pub fn rollback(&mut self, rollback: Rollback<T>) {
        match rollback {
            Rollback::Removed { index, item } => {
                if self.position(item.key()).is_none() {
                    let index = index.min(self.items.len());
                    self.items.insert(index, item);
                    self.total += 1;
                }
            }
            Rollback::Replaced { item } => {
                if let Some(index) = self.position(item.key()) {
                    self.items[index] = item;
                }
            }
            Rollback::Inserted { key } => {
                if let Some(index) = self.position(key) {
                    self.items.remove(index);
                    self.total = self.total.saturating_sub(1);
                }
            }
        }
    }
}
