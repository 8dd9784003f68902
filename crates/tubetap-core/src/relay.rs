//! Command relay for player controls

use crate::types::Command;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// Runs commands on the page later, outside the normal history
pub trait CommandExecutor: Send + Sync {
    /// `force_run` asks for immediate execution without recording history
    fn submit(&self, command: Command, force_run: bool);
}

/// Single-slot relay: a new command replaces any unconsumed one
pub struct CommandRelay {
    executor: Arc<dyn CommandExecutor>,
    pending: Mutex<Option<Command>>,
}

impl CommandRelay {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            pending: Mutex::new(None),
        }
    }

    pub fn relay(&self, command: Command) {
        if let Some(previous) = self.pending.lock().replace(command) {
            debug!(%previous, "Discarding unconsumed command");
        }
        info!(%command, "Relaying command");
        self.executor.submit(command, true);
    }

    pub fn pending(&self) -> Option<Command> {
        *self.pending.lock()
    }

    /// Mark the pending command as executed
    pub fn take_pending(&self) -> Option<Command> {
        self.pending.lock().take()
    }
}
