// BenchWire - Virtual Device Bench
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::action::{ActionId, ActionRegistry};
use crate::config::BenchConfig;
use crate::monitor::MonitorContext;
use crate::{BenchError, BenchResult, UserData};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub type RuleId = u32;

type Predicate = Arc<dyn Fn(&MonitorContext) -> bool + Send + Sync>;

struct Rule {
    id: RuleId,
    name: String,
    predicate: Option<Predicate>,
    action_ids: Vec<ActionId>,
    enabled: bool,
    user_data: Option<UserData>,
}

/// Named rules pairing a predicate over an access context with an ordered
/// action list.
///
/// Rules are a layered abstraction on top of actions, not an interception
/// point: the monitor never evaluates them. Clients call
/// [`evaluate`](Self::evaluate), typically from inside an action bound to a
/// watchpoint.
pub struct RuleEngine {
    actions: Arc<ActionRegistry>,
    rules: Mutex<Vec<Rule>>,
    next_id: AtomicU32,
    action_limit: usize,
}

impl RuleEngine {
    pub fn new(actions: Arc<ActionRegistry>, config: BenchConfig) -> Self {
        Self {
            actions,
            rules: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
            action_limit: config.rule_action_limit,
        }
    }

    fn rules(&self) -> BenchResult<MutexGuard<'_, Vec<Rule>>> {
        self.rules.lock().map_err(|_| BenchError::LockPoisoned)
    }

    fn with_rule<T>(&self, id: RuleId, f: impl FnOnce(&mut Rule) -> T) -> BenchResult<T> {
        let mut rules = self.rules()?;
        let rule = rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(BenchError::RuleNotFound(id))?;
        Ok(f(rule))
    }

    /// Creates a rule with a unique, non-empty name. New rules start
    /// disabled with no predicate and must be enabled explicitly.
    pub fn create(&self, name: &str) -> BenchResult<RuleId> {
        if name.is_empty() {
            return Err(BenchError::InvalidParam);
        }
        let mut rules = self.rules()?;
        if rules.iter().any(|r| r.name == name) {
            return Err(BenchError::AlreadyExists(name.to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        rules.push(Rule {
            id,
            name: name.to_string(),
            predicate: None,
            action_ids: Vec::new(),
            enabled: false,
            user_data: None,
        });
        Ok(id)
    }

    pub fn destroy(&self, id: RuleId) -> BenchResult<()> {
        let mut rules = self.rules()?;
        let index = rules
            .iter()
            .position(|r| r.id == id)
            .ok_or(BenchError::RuleNotFound(id))?;
        rules.remove(index);
        Ok(())
    }

    pub fn enable(&self, id: RuleId) -> BenchResult<()> {
        self.with_rule(id, |rule| rule.enabled = true)
    }

    pub fn disable(&self, id: RuleId) -> BenchResult<()> {
        self.with_rule(id, |rule| rule.enabled = false)
    }

    /// Installs the predicate, replacing any previous one.
    pub fn set_condition<F>(&self, id: RuleId, predicate: F) -> BenchResult<()>
    where
        F: Fn(&MonitorContext) -> bool + Send + Sync + 'static,
    {
        let predicate: Predicate = Arc::new(predicate);
        self.with_rule(id, move |rule| rule.predicate = Some(predicate))
    }

    /// Appends an action; re-adding a bound action is a no-op.
    pub fn add_action(&self, id: RuleId, action_id: ActionId) -> BenchResult<()> {
        self.with_rule(id, |rule| {
            if !rule.action_ids.contains(&action_id) {
                rule.action_ids.push(action_id);
            }
        })
    }

    pub fn remove_action(&self, id: RuleId, action_id: ActionId) -> BenchResult<()> {
        self.with_rule(id, |rule| {
            let index = rule
                .action_ids
                .iter()
                .position(|&a| a == action_id)
                .ok_or(BenchError::NotFound)?;
            rule.action_ids.remove(index);
            Ok(())
        })?
    }

    /// Evaluates the rule against one access context.
    ///
    /// Disabled or predicate-less rules are a successful no-op. Otherwise
    /// the predicate and a bounded snapshot of the action list are taken
    /// under the lock, the lock is released, and - if the predicate holds -
    /// the actions run in order. Unlike monitor dispatch, evaluation stops
    /// at the first failing action and reports it as `RuleActionFailed`.
    pub fn evaluate(&self, id: RuleId, context: &MonitorContext) -> BenchResult<()> {
        let (predicate, action_ids) = {
            let rules = self.rules()?;
            let rule = rules
                .iter()
                .find(|r| r.id == id)
                .ok_or(BenchError::RuleNotFound(id))?;
            if !rule.enabled {
                return Ok(());
            }
            let Some(predicate) = rule.predicate.clone() else {
                return Ok(());
            };
            let mut action_ids = rule.action_ids.clone();
            if action_ids.len() > self.action_limit {
                tracing::warn!(
                    "Rule {} action list truncated to {} for this evaluation",
                    id,
                    self.action_limit
                );
                action_ids.truncate(self.action_limit);
            }
            (predicate, action_ids)
        };

        if !predicate(context) {
            return Ok(());
        }
        for action_id in action_ids {
            self.actions
                .execute(action_id, context)
                .map_err(|err| BenchError::RuleActionFailed(Box::new(err)))?;
        }
        Ok(())
    }

    pub fn find_by_name(&self, name: &str) -> Option<RuleId> {
        self.rules()
            .ok()?
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.id)
    }

    pub fn name(&self, id: RuleId) -> BenchResult<String> {
        self.with_rule(id, |rule| rule.name.clone())
    }

    pub fn set_user_data(&self, id: RuleId, data: Option<UserData>) -> BenchResult<()> {
        self.with_rule(id, |rule| rule.user_data = data)
    }

    pub fn get_user_data(&self, id: RuleId) -> BenchResult<Option<UserData>> {
        self.with_rule(id, |rule| rule.user_data.clone())
    }

    pub(crate) fn clear(&self) {
        if let Ok(mut rules) = self.rules() {
            rules.clear();
        }
    }
}
