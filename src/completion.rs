use crate::error::Result;
use crate::plugins::PluginRegistry;
use crate::types::{CompletionItem, DronePlugin};

const STEPS_KEY: &str = "steps:";

/// Completion is only offered right after a `steps:` key.
pub fn wants_completion(line: &str) -> bool {
    line.trim().ends_with(STEPS_KEY)
}

pub fn completion_items(line: &str, plugins: &[DronePlugin]) -> Vec<CompletionItem> {
    if line.trim() != STEPS_KEY {
        return Vec::new();
    }
    plugins
        .iter()
        .map(|plugin| CompletionItem {
            label: plugin.name.clone(),
            detail: Some(plugin.image.clone()).filter(|image| !image.is_empty()),
        })
        .collect()
}

/// Plugin names to offer for `line`, or `None` when the line is not a
/// completion point. The registry is only consulted for completion points.
pub async fn provide_completions(
    line: &str,
    registry: &PluginRegistry,
) -> Result<Option<Vec<CompletionItem>>> {
    if !wants_completion(line) {
        return Ok(None);
    }
    let plugins = registry.plugins().await?;
    Ok(Some(completion_items(line, &plugins)))
}
