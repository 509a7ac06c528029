//! The built-in model definitions: where a model's artifacts come from.

use once_cell::sync::Lazy;
use time::macros::datetime;
use uuid::uuid;

use crate::{api_types::ModelDefinition, names::DEFINITION_COLLECTION};

pub const LOCAL_ID: &str = "local";
pub const GITHUB_ID: &str = "github";

/// Source of a model's artifacts, by model definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    /// Archive uploaded through the multipart endpoint.
    Local,
    /// Tagged releases of a GitHub repository.
    GitHub,
}

impl DefinitionKind {
    pub fn id(&self) -> &'static str {
        match self {
            DefinitionKind::Local => LOCAL_ID,
            DefinitionKind::GitHub => GITHUB_ID,
        }
    }

    pub fn name(&self) -> String {
        definition_name(self.id())
    }

    /// Kind named by `model-definitions/{id}`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.strip_prefix(DEFINITION_COLLECTION)?.strip_prefix('/')? {
            LOCAL_ID => Some(DefinitionKind::Local),
            GITHUB_ID => Some(DefinitionKind::GitHub),
            _ => None,
        }
    }
}

pub fn definition_name(id: &str) -> String {
    format!("{}/{}", DEFINITION_COLLECTION, id)
}

static DEFINITIONS: Lazy<Vec<ModelDefinition>> = Lazy::new(|| {
    vec![
        ModelDefinition {
            name: definition_name(LOCAL_ID),
            uid: uuid!("909c3278-f7d1-461c-9352-87741bef11d3"),
            id: LOCAL_ID.to_owned(),
            title: "Local".to_owned(),
            documentation_url: "https://www.instill.tech/docs/import-models/local".to_owned(),
            icon: "local.svg".to_owned(),
            model_spec: Some(serde_json::json!({
                "$schema": "http://json-schema.org/draft-07/schema#",
                "title": "Local spec for model",
                "type": "object",
                "required": ["content"],
                "additionalProperties": false,
                "properties": {
                    "content": {
                        "type": "string",
                        "title": "Model archive",
                        "description": "Zip archive holding the model files and a README.md",
                        "contentMediaType": "application/zip"
                    }
                }
            })),
            create_time: datetime!(2022-06-01 00:00:00 UTC),
            update_time: datetime!(2022-06-01 00:00:00 UTC),
        },
        ModelDefinition {
            name: definition_name(GITHUB_ID),
            uid: uuid!("e4a3d84f-0a40-4b0d-9b8c-42d7a0e4c1f5"),
            id: GITHUB_ID.to_owned(),
            title: "GitHub".to_owned(),
            documentation_url: "https://www.instill.tech/docs/import-models/github".to_owned(),
            icon: "github.svg".to_owned(),
            model_spec: Some(serde_json::json!({
                "$schema": "http://json-schema.org/draft-07/schema#",
                "title": "GitHub spec for model",
                "type": "object",
                "required": ["repository"],
                "additionalProperties": false,
                "properties": {
                    "repository": {
                        "type": "string",
                        "title": "GitHub repository",
                        "description": "Repository in the form owner/name",
                        "pattern": "^[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+$"
                    },
                    "tag": {
                        "type": "string",
                        "title": "Tag",
                        "description": "Release tag to import; every tag when absent"
                    },
                    "html_url": {
                        "type": "string",
                        "title": "Repository URL",
                        "readOnly": true
                    }
                }
            })),
            create_time: datetime!(2022-06-01 00:00:00 UTC),
            update_time: datetime!(2022-06-01 00:00:00 UTC),
        },
    ]
});

/// Every built-in definition, `local` first.
pub fn all() -> &'static [ModelDefinition] {
    &DEFINITIONS
}

pub fn find_by_id(id: &str) -> Option<&'static ModelDefinition> {
    DEFINITIONS.iter().find(|d| d.id == id)
}

#[cfg(test)]
mod test {
    use super::{all, find_by_id, DefinitionKind};

    #[test]
    pub fn builtin_definitions() {
        let ids: Vec<_> = all().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["local", "github"]);

        let local = find_by_id("local").unwrap();
        assert_eq!(local.name, "model-definitions/local");
        assert_eq!(local.title, "Local");
        assert_eq!(local.icon, "local.svg");
        assert!(find_by_id("huggingface").is_none());
    }

    #[test]
    pub fn kinds_from_names() {
        assert_eq!(
            DefinitionKind::from_name("model-definitions/github"),
            Some(DefinitionKind::GitHub)
        );
        assert_eq!(
            DefinitionKind::from_name("model-definitions/local"),
            Some(DefinitionKind::Local)
        );
        assert_eq!(DefinitionKind::from_name("model-definitions/artivc"), None);
        assert_eq!(DefinitionKind::from_name("local"), None);
        assert_eq!(DefinitionKind::GitHub.name(), "model-definitions/github");
    }
}
