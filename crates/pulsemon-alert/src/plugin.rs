use crate::HealthPlugin;
use std::sync::Arc;

/// Rule id of the synthetic binding for a plugin component.
pub fn binding_id(component_name: &str) -> String {
    format!("{component_name}.failed")
}

/// Registry of custom health plugins, populated once at startup with
/// explicit [`register`](PluginRegistry::register) calls. There is no
/// runtime discovery; the full set is handed to
/// [`RuleSet::with_plugins`](crate::rule::RuleSet::with_plugins) when the
/// engine is assembled.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn HealthPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    pub fn register(&mut self, plugin: Arc<dyn HealthPlugin>) {
        tracing::info!(component = plugin.component_name(), "Health plugin registered");
        self.plugins.push(plugin);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn HealthPlugin>> {
        self.plugins.iter()
    }
}
