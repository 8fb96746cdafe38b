//! Progress cursor for the polling engine.

use thiserror::Error;

use crate::model::Cursor;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CursorError {
    #[error("cursor rewind refused: {requested} < {current}")]
    Rewind { current: u64, requested: u64 },
    #[error("cursor is not initialized")]
    Uninitialized,
}

/// Holds the last fully processed height. Implementations are mutated only
/// from the engine's single execution context.
pub trait CursorStore: Send {
    /// `None` until the first successful tick initialized the cursor.
    fn get(&self) -> Option<Cursor>;

    /// Sets the starting position. Has no effect once initialized.
    fn initialize(&mut self, height: u64) -> Cursor;

    /// Moves the cursor forward. Equal heights are a no-op; lower heights
    /// are refused with [`CursorError::Rewind`].
    fn advance(&mut self, height: u64) -> Result<Cursor, CursorError>;

    /// Operator override: unconditionally moves the cursor, including
    /// backwards.
    fn reset(&mut self, height: u64) -> Cursor;
}

/// Process-local cursor. Restarts begin again from the configured start
/// height or the chain tip.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCursorStore {
    cursor: Option<Cursor>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(height: u64) -> Self {
        Self {
            cursor: Some(Cursor::new(height)),
        }
    }
}

impl CursorStore for InMemoryCursorStore {
    fn get(&self) -> Option<Cursor> {
        self.cursor
    }

    fn initialize(&mut self, height: u64) -> Cursor {
        *self.cursor.get_or_insert(Cursor::new(height))
    }

    fn advance(&mut self, height: u64) -> Result<Cursor, CursorError> {
        let current = self.cursor.ok_or(CursorError::Uninitialized)?;
        if height < current.last_confirmed_height {
            return Err(CursorError::Rewind {
                current: current.last_confirmed_height,
                requested: height,
            });
        }
        let next = Cursor::new(height);
        self.cursor = Some(next);
        Ok(next)
    }

    fn reset(&mut self, height: u64) -> Cursor {
        let next = Cursor::new(height);
        self.cursor = Some(next);
        next
    }
}
