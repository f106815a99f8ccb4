use super::{ComponentState, HubOrchestrator};
use std::collections::HashMap;
use tracing::debug;

impl HubOrchestrator {
    pub(super) fn set_component_state(&self, component: &str, state: ComponentState) {
        self.component_states
            .write()
            .insert(component.to_string(), state);
        debug!("Component '{}' is now {:?}", component, state);
    }

    pub fn component_state(&self, component: &str) -> Option<ComponentState> {
        self.component_states.read().get(component).copied()
    }

    pub fn component_states(&self) -> HashMap<String, ComponentState> {
        self.component_states.read().clone()
    }
}
