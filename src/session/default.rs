// src/session/default.rs

//! The process-wide "current default session" slot.
//!
//! Sugar for call sites that do not thread a session through. Every core
//! API also takes an explicit [`Session`].

use std::sync::RwLock;

use crate::errors::{Result, TasktideError};
use crate::locks::{read, write};

use super::Session;

static DEFAULT: RwLock<Option<Session>> = RwLock::new(None);

impl Session {
    /// Make this session the default, returning the one it replaced.
    pub fn set_as_default(&self) -> Option<Session> {
        write(&DEFAULT).replace(self.clone())
    }

    /// Whether this session currently occupies the default slot.
    pub fn is_default(&self) -> bool {
        read(&DEFAULT)
            .as_ref()
            .is_some_and(|current| Session::ptr_eq(current, self))
    }

    /// The default session, or [`TasktideError::NoDefaultSession`].
    pub fn current() -> Result<Session> {
        default_session().ok_or(TasktideError::NoDefaultSession)
    }
}

pub fn default_session() -> Option<Session> {
    read(&DEFAULT).clone()
}

/// Empty the default slot, returning what it held.
pub fn clear_default() -> Option<Session> {
    write(&DEFAULT).take()
}
