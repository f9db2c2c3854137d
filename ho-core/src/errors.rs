//! Error taxonomy for trace generation.
//!
//! Every failure is fatal for the run it belongs to: configuration problems surface before the first
//! record is emitted, and state or pool violations mean the event driver picked an event it should not
//! have. Nothing here is retried.

use std::fmt;

use thiserror::Error;

/// The pool an entity was sampled from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PoolKind {
    /// Active local-only entities.
    Active,
    /// Inactive local-only entities.
    Inactive,
    /// Active movable entities.
    Movable,
    /// A unit's migration ring.
    Migration,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Movable => "movable",
            Self::Migration => "migration",
        };
        write!(f, "{name}")
    }
}

/// Errors raised while building a topology or generating a trace.
#[derive(Debug, Error)]
pub enum GenError {
    /// An input parameter violates a precondition.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A transition was requested for an entity whose state forbids it.
    #[error("illegal transition for entity {entity}: {reason}")]
    IllegalState {
        /// Entity the transition was applied to.
        entity: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// A sample was drawn from an empty pool.
    #[error("cannot sample from empty {0} pool")]
    EmptyPool(PoolKind),

    /// The event sink failed to accept a record.
    #[error("failed to write trace output")]
    Sink(#[from] std::io::Error),
}

impl GenError {
    /// Shorthand for a [`GenError::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Shorthand for a [`GenError::IllegalState`].
    pub fn illegal(entity: usize, reason: impl Into<String>) -> Self {
        Self::IllegalState { entity, reason: reason.into() }
    }
}
