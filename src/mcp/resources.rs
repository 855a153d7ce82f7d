/// In-memory resource store keyed by URI.
use std::sync::RwLock;

use serde_json::{Value, json};

#[derive(Debug, Clone)]
pub struct Resource {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
    pub text: String,
}

#[derive(Default)]
pub struct ResourceStore {
    resources: RwLock<Vec<Resource>>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, resource: Resource) {
        let mut resources = self
            .resources
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        resources.retain(|r| r.uri != resource.uri);
        resources.push(resource);
    }

    pub fn list(&self) -> Value {
        let resources = self
            .resources
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let entries: Vec<Value> = resources
            .iter()
            .map(|r| {
                json!({
                    "uri": r.uri,
                    "name": r.name,
                    "description": r.description,
                    "mimeType": r.mime_type,
                })
            })
            .collect();
        json!({ "resources": entries })
    }

    pub fn read(&self, uri: &str) -> Option<Value> {
        let resources = self
            .resources
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let resource = resources.iter().find(|r| r.uri == uri)?;
        Some(json!({
            "contents": [{
                "uri": resource.uri,
                "mimeType": resource.mime_type,
                "text": resource.text,
            }]
        }))
    }
}
