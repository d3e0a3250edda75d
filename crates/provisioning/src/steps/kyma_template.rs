//! Kyma template handling
//!
//! The template is user tunable YAML, so it is kept as an untyped
//! `DynamicObject` and only `metadata` and `spec.modules` are ever touched.

use crate::model::{ModuleDto, ModulesDto};
use anyhow::{Context, anyhow};
use kube::api::DynamicObject;
use serde_json::{Map, Value};

pub fn decode(template: &str) -> anyhow::Result<DynamicObject> {
    serde_yaml::from_str(template).context("while decoding Kyma template")
}

pub fn encode(object: &DynamicObject) -> anyhow::Result<String> {
    serde_yaml::to_string(object).context("while encoding Kyma template")
}

/// Namespace declared by the template, empty when it declares none
pub fn namespace(object: &DynamicObject) -> &str {
    object.metadata.namespace.as_deref().unwrap_or_default()
}

/// Module list replacing `spec.modules`, `None` when the template's defaults stay
pub fn module_override(modules: Option<&ModulesDto>) -> Option<Vec<Value>> {
    let modules = modules?;
    match (modules.default, modules.list.as_ref()) {
        (Some(true), _) | (None, None) => None,
        (Some(false), _) => Some(Vec::new()),
        (None, Some(list)) => Some(list.iter().map(module_entry).collect()),
    }
}

fn module_entry(module: &ModuleDto) -> Value {
    let mut entry = Map::new();
    entry.insert("name".to_string(), Value::String(module.name.clone()));
    if let Some(channel) = module.channel.as_deref().filter(|c| !c.is_empty()) {
        entry.insert("channel".to_string(), Value::String(channel.to_string()));
    }
    if let Some(policy) = module.custom_resource_policy.as_deref().filter(|p| !p.is_empty()) {
        entry.insert("customResourcePolicy".to_string(), Value::String(policy.to_string()));
    }
    Value::Object(entry)
}

/// Replace `spec.modules`
pub fn set_modules(object: &mut DynamicObject, modules: Vec<Value>) -> anyhow::Result<()> {
    let spec = object
        .data
        .get_mut("spec")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| anyhow!("Kyma template has no spec"))?;
    spec.insert("modules".to_string(), Value::Array(modules));
    Ok(())
}

/// `spec.modules` of a template, if present
pub fn modules(object: &DynamicObject) -> Option<&Vec<Value>> {
    object.data.get("spec")?.get("modules")?.as_array()
}
