//! Ordered, freezable list of identified units.
//!
//! A [`Stack`] holds interceptors for one method, or the concerns of one
//! service type. Entries are compared by identity ([`Unit::id`]), so inserting
//! relative to "the rescue interceptor" works without holding a reference to
//! the instance that was registered.

use std::fmt;
use std::sync::Arc;

/// Something that can live in a [`Stack`].
pub trait Unit: Clone {
    /// Identity of the wrapped behavior. Two entries with the same id are equal.
    fn id(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Anchor
// ---------------------------------------------------------------------------

/// Position reference for relative stack operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    /// Zero-based index into the current order.
    Index(usize),
    /// First entry with this id.
    Id(String),
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anchor::Index(index) => write!(f, "index {index}"),
            Anchor::Id(id) => write!(f, "`{id}`"),
        }
    }
}

impl From<usize> for Anchor {
    fn from(index: usize) -> Self {
        Anchor::Index(index)
    }
}

impl From<&str> for Anchor {
    fn from(id: &str) -> Self {
        Anchor::Id(id.to_string())
    }
}

impl From<String> for Anchor {
    fn from(id: String) -> Self {
        Anchor::Id(id)
    }
}

// ---------------------------------------------------------------------------
// StackError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StackError {
    #[error("stack `{stack}` is frozen")]
    Frozen { stack: String },
    #[error("stack `{stack}` has no entry at {anchor}")]
    MissingAnchor { stack: String, anchor: Anchor },
}

// ---------------------------------------------------------------------------
// Stack
// ---------------------------------------------------------------------------

/// Named ordered sequence of units. Mutable until [`Stack::freeze`].
#[derive(Clone)]
pub struct Stack<U> {
    name: String,
    entries: Vec<U>,
    frozen: bool,
}

impl<U: Unit> Stack<U> {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            frozen: false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Rejects every further mutation.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|entry| entry.id() == id)
    }

    /// Ids in current order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.id().to_string()).collect()
    }

    /// Entries in current order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<U> {
        self.entries.clone()
    }

    /// Read-only snapshot used as the compiled chain.
    #[must_use]
    pub fn compile(&self) -> Arc<[U]> {
        Arc::from(self.entries.as_slice())
    }

    /// Appends a unit.
    ///
    /// # Errors
    ///
    /// Returns `StackError::Frozen` after [`Stack::freeze`].
    pub fn push(&mut self, unit: U) -> Result<&mut Self, StackError> {
        self.ensure_mutable()?;
        self.entries.push(unit);
        Ok(self)
    }

    /// Inserts `unit` right before the anchored entry.
    ///
    /// # Errors
    ///
    /// Returns `StackError::Frozen` or `StackError::MissingAnchor`.
    pub fn insert_before(
        &mut self,
        anchor: impl Into<Anchor>,
        unit: U,
    ) -> Result<&mut Self, StackError> {
        self.ensure_mutable()?;
        let index = self.resolve(anchor.into())?;
        self.entries.insert(index, unit);
        Ok(self)
    }

    /// Inserts `unit` right after the anchored entry.
    ///
    /// # Errors
    ///
    /// Returns `StackError::Frozen` or `StackError::MissingAnchor`.
    pub fn insert_after(
        &mut self,
        anchor: impl Into<Anchor>,
        unit: U,
    ) -> Result<&mut Self, StackError> {
        self.ensure_mutable()?;
        let index = self.resolve(anchor.into())?;
        self.entries.insert(index + 1, unit);
        Ok(self)
    }

    /// Inserts a fresh unit before every existing entry.
    ///
    /// # Errors
    ///
    /// Returns `StackError::Frozen` after [`Stack::freeze`].
    pub fn insert_before_each(
        &mut self,
        mut factory: impl FnMut() -> U,
    ) -> Result<&mut Self, StackError> {
        self.ensure_mutable()?;
        let existing = std::mem::take(&mut self.entries);
        for entry in existing {
            self.entries.push(factory());
            self.entries.push(entry);
        }
        Ok(self)
    }

    /// Inserts a fresh unit after every existing entry.
    ///
    /// # Errors
    ///
    /// Returns `StackError::Frozen` after [`Stack::freeze`].
    pub fn insert_after_each(
        &mut self,
        mut factory: impl FnMut() -> U,
    ) -> Result<&mut Self, StackError> {
        self.ensure_mutable()?;
        let existing = std::mem::take(&mut self.entries);
        for entry in existing {
            self.entries.push(entry);
            self.entries.push(factory());
        }
        Ok(self)
    }

    /// Replaces the anchored entry, keeping its position.
    ///
    /// # Errors
    ///
    /// Returns `StackError::Frozen` or `StackError::MissingAnchor`.
    pub fn replace(&mut self, anchor: impl Into<Anchor>, unit: U) -> Result<U, StackError> {
        self.ensure_mutable()?;
        let index = self.resolve(anchor.into())?;
        Ok(std::mem::replace(&mut self.entries[index], unit))
    }

    /// Removes the anchored entry and returns it.
    ///
    /// # Errors
    ///
    /// Returns `StackError::Frozen` or `StackError::MissingAnchor`.
    pub fn delete(&mut self, anchor: impl Into<Anchor>) -> Result<U, StackError> {
        self.ensure_mutable()?;
        let index = self.resolve(anchor.into())?;
        Ok(self.entries.remove(index))
    }

    fn ensure_mutable(&self) -> Result<(), StackError> {
        if self.frozen {
            return Err(StackError::Frozen {
                stack: self.name.clone(),
            });
        }
        Ok(())
    }

    fn resolve(&self, anchor: Anchor) -> Result<usize, StackError> {
        let found = match &anchor {
            Anchor::Index(index) => (*index < self.entries.len()).then_some(*index),
            Anchor::Id(id) => self.entries.iter().position(|entry| entry.id() == id),
        };
        found.ok_or_else(|| StackError::MissingAnchor {
            stack: self.name.clone(),
            anchor,
        })
    }
}

impl<U: Unit> fmt::Debug for Stack<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("name", &self.name)
            .field("entries", &self.ids())
            .field("frozen", &self.frozen)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
