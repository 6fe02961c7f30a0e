// BenchWire - Virtual Device Bench
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::monitor::MonitorContext;
use crate::{BenchError, BenchResult, UserData};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub type ActionId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    Callback,
    Script,
    Command,
}

type Callback = Arc<dyn Fn(&MonitorContext) -> BenchResult<()> + Send + Sync>;

enum ActionKind {
    Callback(Callback),
    Script(PathBuf),
    Command(String),
}

struct Action {
    kind: ActionKind,
    user_data: Mutex<Option<UserData>>,
}

/// Catalog of the effects a watchpoint or rule can trigger: in-process
/// callbacks, external scripts, and shell commands.
pub struct ActionRegistry {
    actions: Mutex<HashMap<ActionId, Arc<Action>>>,
    next_id: AtomicU32,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            actions: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
        }
    }

    fn actions(&self) -> BenchResult<MutexGuard<'_, HashMap<ActionId, Arc<Action>>>> {
        self.actions.lock().map_err(|_| BenchError::LockPoisoned)
    }

    fn insert(&self, kind: ActionKind) -> ActionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut actions) = self.actions() {
            actions.insert(
                id,
                Arc::new(Action {
                    kind,
                    user_data: Mutex::new(None),
                }),
            );
        }
        id
    }

    /// Registers an in-process callback. Bound state travels inside the
    /// closure; the separate per-action user-data slot is independent.
    pub fn create_callback<F>(&self, callback: F) -> ActionId
    where
        F: Fn(&MonitorContext) -> BenchResult<()> + Send + Sync + 'static,
    {
        self.insert(ActionKind::Callback(Arc::new(callback)))
    }

    /// Registers an external script, invoked with the positional arguments
    /// `<addr> <size> <value> <access>` (decimal, access per
    /// [`AccessType::as_u32`](crate::AccessType::as_u32)).
    pub fn create_script(&self, path: impl AsRef<Path>) -> BenchResult<ActionId> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(BenchError::InvalidParam);
        }
        Ok(self.insert(ActionKind::Script(path.to_path_buf())))
    }

    /// Registers a shell command, handed verbatim to `sh -c`.
    pub fn create_command(&self, command: &str) -> BenchResult<ActionId> {
        if command.is_empty() {
            return Err(BenchError::InvalidParam);
        }
        Ok(self.insert(ActionKind::Command(command.to_string())))
    }

    /// Removes the action. Watchpoint and rule bindings are left in place;
    /// a later fire through a stale binding reports `ActionNotFound`.
    pub fn destroy(&self, id: ActionId) -> BenchResult<()> {
        self.actions()?
            .remove(&id)
            .map(|_| ())
            .ok_or(BenchError::ActionNotFound(id))
    }

    pub fn kind(&self, id: ActionId) -> BenchResult<ActionType> {
        let actions = self.actions()?;
        let action = actions.get(&id).ok_or(BenchError::ActionNotFound(id))?;
        Ok(match action.kind {
            ActionKind::Callback(_) => ActionType::Callback,
            ActionKind::Script(_) => ActionType::Script,
            ActionKind::Command(_) => ActionType::Command,
        })
    }

    pub fn set_user_data(&self, id: ActionId, data: Option<UserData>) -> BenchResult<()> {
        let action = self.get(id)?;
        *action.user_data.lock().unwrap_or_else(|e| e.into_inner()) = data;
        Ok(())
    }

    pub fn get_user_data(&self, id: ActionId) -> BenchResult<Option<UserData>> {
        let action = self.get(id)?;
        let data = action.user_data.lock().unwrap_or_else(|e| e.into_inner());
        Ok(data.clone())
    }

    fn get(&self, id: ActionId) -> BenchResult<Arc<Action>> {
        self.actions()?
            .get(&id)
            .cloned()
            .ok_or(BenchError::ActionNotFound(id))
    }

    pub(crate) fn clear(&self) {
        if let Ok(mut actions) = self.actions() {
            actions.clear();
        }
    }

    /// Runs the action for one memory access. The registry lock is released
    /// before the callback or external process runs, so actions may call
    /// back into the bench, and external invocations never stall other
    /// threads' registry traffic.
    pub fn execute(&self, id: ActionId, context: &MonitorContext) -> BenchResult<()> {
        let action = self.get(id)?;
        match &action.kind {
            ActionKind::Callback(callback) => callback(context),
            ActionKind::Script(path) => {
                tracing::debug!("Running script action {} ({})", id, path.display());
                let status = Command::new(path)
                    .arg(context.addr.to_string())
                    .arg(context.size.to_string())
                    .arg(context.value.to_string())
                    .arg(context.access.as_u32().to_string())
                    .status()
                    .map_err(|e| BenchError::Io(e.to_string()))?;
                if !status.success() {
                    return Err(BenchError::ActionExecuteFailed {
                        id,
                        status: status.code(),
                    });
                }
                Ok(())
            }
            ActionKind::Command(command) => {
                tracing::debug!("Running command action {} ({})", id, command);
                let status = Command::new("sh")
                    .arg("-c")
                    .arg(command)
                    .status()
                    .map_err(|e| BenchError::Io(e.to_string()))?;
                if !status.success() {
                    return Err(BenchError::ActionExecuteFailed {
                        id,
                        status: status.code(),
                    });
                }
                Ok(())
            }
        }
    }
}
