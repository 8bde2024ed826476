//! Scoped suppression of backend diagnostic logging.

use std::cell::RefCell;
use std::rc::Rc;

use crate::backend::Backend;

/// Restores a backend's diagnostic logging state when released or dropped.
///
/// Created by [`DiagnosticsGuard::suppress`], which turns diagnostics off and
/// remembers the previous state. Dropping the guard on an error path restores
/// that state just like an explicit [`DiagnosticsGuard::restore`].
pub struct DiagnosticsGuard<B: Backend> {
    backend: Rc<RefCell<B>>,
    previous: Option<bool>,
}

impl<B: Backend> DiagnosticsGuard<B> {
    /// Silence diagnostics on the backend, if it supports them
    pub fn suppress(backend: &Rc<RefCell<B>>) -> Self {
        let previous = {
            let mut inner = backend.borrow_mut();
            let previous = inner.diagnostics();
            if previous.is_some() {
                inner.set_diagnostics(false);
            }
            previous
        };
        if previous.is_none() {
            log::debug!("Backend does not support diagnostic logging, nothing to suppress");
        }
        Self {
            backend: Rc::clone(backend),
            previous,
        }
    }

    /// State captured before suppression, `None` when unsupported
    #[must_use]
    pub const fn previous(&self) -> Option<bool> {
        self.previous
    }

    /// Restore the captured state now
    pub fn restore(mut self) {
        self.restore_inner();
    }

    fn restore_inner(&mut self) {
        let Some(previous) = self.previous.take() else {
            return;
        };
        match self.backend.try_borrow_mut() {
            Ok(mut backend) => backend.set_diagnostics(previous),
            Err(_) => log::warn!("Backend busy, diagnostic logging state could not be restored"),
        }
    }
}

impl<B: Backend> Drop for DiagnosticsGuard<B> {
    fn drop(&mut self) {
        self.restore_inner();
    }
}
