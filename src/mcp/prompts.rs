/// In-memory prompt store with `{{arg}}` template substitution.
use std::sync::RwLock;

use serde_json::{Value, json};

#[derive(Debug, Clone)]
pub struct PromptArgument {
    pub name: String,
    pub description: String,
    pub required: bool,
}

#[derive(Debug, Clone)]
pub struct Prompt {
    pub name: String,
    pub description: String,
    pub arguments: Vec<PromptArgument>,
    pub template: String,
}

#[derive(Default)]
pub struct PromptStore {
    prompts: RwLock<Vec<Prompt>>,
}

impl PromptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, prompt: Prompt) {
        let mut prompts = self
            .prompts
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        prompts.retain(|p| p.name != prompt.name);
        prompts.push(prompt);
    }

    pub fn list(&self) -> Value {
        let prompts = self
            .prompts
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let entries: Vec<Value> = prompts
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "description": p.description,
                    "arguments": p.arguments.iter().map(|a| json!({
                        "name": a.name,
                        "description": a.description,
                        "required": a.required,
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();
        json!({ "prompts": entries })
    }

    /// Render a prompt with `{{name}}` placeholders replaced from `args`.
    pub fn get(&self, name: &str, args: &Value) -> Option<Value> {
        let prompts = self
            .prompts
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let prompt = prompts.iter().find(|p| p.name == name)?;

        let mut text = prompt.template.clone();
        if let Some(map) = args.as_object() {
            for (key, value) in map {
                let placeholder = format!("{{{{{}}}}}", key);
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                text = text.replace(&placeholder, &rendered);
            }
        }

        Some(json!({
            "description": prompt.description,
            "messages": [{
                "role": "user",
                "content": { "type": "text", "text": text }
            }]
        }))
    }
}
