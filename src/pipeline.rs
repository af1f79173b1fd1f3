//! Read-only navigation of a `.drone.yml` pipeline document.

use crate::error::Result;
use serde_yaml::Value;

pub const PIPELINE_FILE_NAME: &str = ".drone.yml";

pub fn load_doc(yaml: &str) -> Result<Value> {
    Ok(serde_yaml::from_str(yaml)?)
}

/// The `steps` sequence, or `None` when the document has no usable steps.
pub fn load_and_get_steps(yaml: &str) -> Result<Option<Vec<Value>>> {
    let doc = load_doc(yaml)?;
    Ok(doc
        .get("steps")
        .and_then(Value::as_sequence)
        .cloned())
}

fn step_field<'a>(step: &'a Value, field: &str) -> Option<&'a str> {
    step.get(field).and_then(Value::as_str)
}

pub fn step_names(steps: &[Value]) -> Vec<String> {
    steps
        .iter()
        .filter_map(|step| step_field(step, "name"))
        .map(str::to_string)
        .collect()
}

/// `(name, image)` for every step that has both, in document order.
pub fn step_images(steps: &[Value]) -> Vec<(String, String)> {
    steps
        .iter()
        .filter_map(|step| {
            let name = step_field(step, "name")?;
            let image = step_field(step, "image")?;
            Some((name.to_string(), image.to_string()))
        })
        .collect()
}

pub fn pipeline_name(yaml: &str) -> Result<Option<String>> {
    let doc = load_doc(yaml)?;
    Ok(doc.get("name").and_then(Value::as_str).map(str::to_string))
}

/// The requested steps that exist in the pipeline, in pipeline order.
pub fn select_steps(available: &[String], requested: &[String]) -> Vec<String> {
    available
        .iter()
        .filter(|name| requested.contains(name))
        .cloned()
        .collect()
}

pub fn include_args(steps: &[String]) -> Vec<String> {
    steps.iter().map(|s| format!("--include={}", s)).collect()
}

/// Starter pipeline written when a workspace has none.
pub fn default_pipeline(arch: &str) -> String {
    format!(
        "kind: pipeline
type: docker
name: my-pipeline
platform:
  os: linux
  arch: {arch}
steps:
  - name: step-name
    image: busybox
    commands:
    - echo 'Test World'
"
    )
}
