//! Pattern-actions registration table.
//!
//! Built explicitly at startup by an initialization function supplied by
//! the embedding application — there is no runtime scanning for handlers.
//! Entries keep registration order: when several patterns of one unit match
//! the same message, the first registered wins, and the order published to
//! the directory is the order registered here.

use std::collections::HashMap;
use std::sync::Arc;

use mesh_types::Pattern;

use crate::handler::{MessageHandler, ResourceCtor};

/// One action body: native code or an externally-interpreted script,
/// resolved once at registration time.
#[derive(Clone)]
pub enum Action {
    /// Native handler.
    Handler(Arc<dyn MessageHandler>),
    /// Script source for the external interpreter.
    Script(String),
}

/// One registration: a pattern routed to an action within a unit.
#[derive(Clone)]
pub struct RegistryEntry {
    /// The advertised pattern.
    pub pattern: Pattern,
    /// The action invoked on a match.
    pub action: Action,
    /// The owning processing unit.
    pub unit_id: String,
}

/// The registration table for one node's processing units.
#[derive(Default)]
pub struct PatternActionsRegistry {
    entries: Vec<RegistryEntry>,
    resources: HashMap<String, ResourceCtor>,
}

impl PatternActionsRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a native handler for a pattern.
    pub fn add_handler(
        &mut self,
        pattern: Pattern,
        handler: Arc<dyn MessageHandler>,
        unit_id: impl Into<String>,
    ) {
        self.entries.push(RegistryEntry {
            pattern,
            action: Action::Handler(handler),
            unit_id: unit_id.into(),
        });
    }

    /// Register a script action for a pattern.
    pub fn add_script(
        &mut self,
        pattern: Pattern,
        script: impl Into<String>,
        unit_id: impl Into<String>,
    ) {
        self.entries.push(RegistryEntry {
            pattern,
            action: Action::Script(script.into()),
            unit_id: unit_id.into(),
        });
    }

    /// Register the scoped-resource constructor of a unit.
    pub fn set_unit_resource(&mut self, unit_id: impl Into<String>, ctor: ResourceCtor) {
        self.resources.insert(unit_id.into(), ctor);
    }

    /// Absorb another registry, keeping both registration orders.
    pub fn merge(&mut self, other: PatternActionsRegistry) {
        self.entries.extend(other.entries);
        self.resources.extend(other.resources);
    }

    /// All entries in registration order.
    #[must_use]
    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Whether any entry is a script action.
    #[must_use]
    pub fn has_script_actions(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| matches!(entry.action, Action::Script(_)))
    }

    /// The scoped-resource constructor of a unit, if registered.
    #[must_use]
    pub fn unit_resource(&self, unit_id: &str) -> Option<ResourceCtor> {
        self.resources.get(unit_id).cloned()
    }

    /// Group entries by unit, preserving both unit-first-seen order and
    /// per-unit registration order.
    #[must_use]
    pub fn by_unit(&self) -> Vec<(String, Vec<RegistryEntry>)> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<RegistryEntry>> = HashMap::new();
        for entry in &self.entries {
            if !groups.contains_key(&entry.unit_id) {
                order.push(entry.unit_id.clone());
            }
            groups.entry(entry.unit_id.clone()).or_default().push(entry.clone());
        }
        order
            .into_iter()
            .map(|unit_id| {
                let entries = groups.remove(&unit_id).unwrap_or_default();
                (unit_id, entries)
            })
            .collect()
    }
}
