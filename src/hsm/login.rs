//! Application-wide login bookkeeping.
//!
//! PKCS#11 login state belongs to the application, not to a session: the
//! first login authenticates every session on the token and a logout from any
//! of them ends it for all. Sessions therefore share one counter. The first
//! session to open logs in and the last one to close logs out.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::Result;

#[derive(Debug, Default)]
pub struct LoginState {
    open_sessions: Mutex<usize>,
}

impl LoginState {
    pub fn new() -> Self {
        Self::default()
    }

    // The counter is only changed after login/logout returned, so a poisoned
    // lock still holds a consistent value.
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.open_sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a session. `login` runs only when no other session is open,
    /// and a failed login leaves the counter untouched.
    pub fn enter(&self, login: impl FnOnce() -> Result<()>) -> Result<()> {
        let mut open = self.lock();
        if *open == 0 {
            login()?;
            debug!("logged in to token");
        }
        *open += 1;
        Ok(())
    }

    /// Unregisters a session. `logout` runs when it was the last one open.
    pub fn leave(&self, logout: impl FnOnce() -> Result<()>) -> Result<()> {
        let mut open = self.lock();
        *open = open.saturating_sub(1);
        if *open > 0 {
            return Ok(());
        }
        debug!("last session leaving, logging out of token");
        logout()
    }

    /// Number of sessions currently holding the login.
    pub fn open_sessions(&self) -> usize {
        *self.lock()
    }
}
