//! The passive event document the context selector reads from.
//!
//! A JSON object whose top-level keys are sections (`schedule`, `prizes`,
//! `people`, ...). Loading never fails: a missing or malformed document
//! yields an empty one and every bundle degrades to empty payloads.

use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, warn};

/// Sections whose `name` fields are harvested as entity names.
const ENTITY_SECTIONS: &[&str] = &["people", "judges", "sponsors", "communities"];

/// Optional top-level array of extra entity names.
const ENTITIES_KEY: &str = "entities";

/// A named thing from the document (a judge, a sponsor, a community).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// Lowercased, trimmed name used for matching.
    pub name: String,
    /// Section the name was found in, if any.
    pub section: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EventDocument {
    sections: Map<String, Value>,
    entities: Vec<Entity>,
}

impl EventDocument {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the document from disk.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Event document unavailable, answering without event data");
                return Self::empty();
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(value) => {
                let doc = Self::from_value(value);
                debug!(
                    path = %path.display(),
                    sections = doc.sections.len(),
                    entities = doc.entities.len(),
                    "Event document loaded"
                );
                doc
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Malformed event document, answering without event data");
                Self::empty()
            }
        }
    }

    /// Build from an already-parsed value. Non-object values give an empty document.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(sections) = value else {
            warn!("Event document is not a JSON object, ignoring it");
            return Self::empty();
        };

        let mut entities = Vec::new();
        for section in ENTITY_SECTIONS {
            if let Some(value) = sections.get(*section) {
                collect_names(value, section, &mut entities);
            }
        }
        if let Some(Value::Array(extra)) = sections.get(ENTITIES_KEY) {
            for name in extra.iter().filter_map(Value::as_str) {
                push_entity(&mut entities, name, None);
            }
        }

        Self { sections, entities }
    }

    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections.get(name)
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }
}

fn collect_names(value: &Value, section: &str, out: &mut Vec<Entity>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_names(item, section, out);
            }
        }
        Value::Object(fields) => {
            if let Some(Value::String(name)) = fields.get("name") {
                push_entity(out, name, Some(section));
            }
            for (key, nested) in fields {
                if key != "name" {
                    collect_names(nested, section, out);
                }
            }
        }
        _ => {}
    }
}

fn push_entity(out: &mut Vec<Entity>, name: &str, section: Option<&str>) {
    let name = name.trim().to_lowercase();
    // Very short names ("AI", "X") would match far too much text.
    if name.chars().count() < 3 || out.iter().any(|e| e.name == name) {
        return;
    }
    out.push(Entity {
        name,
        section: section.map(str::to_string),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "event": {"name": "HackSpring", "dates": "March 14-16"},
            "judges": [{"name": "Ada Lovelace", "role": "CTO"}, {"name": "Grace Hopper"}],
            "sponsors": {"gold": [{"name": "Acme Cloud"}], "silver": [{"name": "Initech"}]},
            "people": {"organizers": [{"name": "Linus", "email": "linus@example.com"}]},
            "entities": ["Rustacean Guild", "AI"]
        })
    }

    #[test]
    fn harvests_entity_names() {
        let doc = EventDocument::from_value(sample());
        let names: Vec<_> = doc.entities().iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"ada lovelace"));
        assert!(names.contains(&"grace hopper"));
        assert!(names.contains(&"acme cloud"));
        assert!(names.contains(&"initech"));
        assert!(names.contains(&"linus"));
        assert!(names.contains(&"rustacean guild"));
        assert!(!names.contains(&"ai"));
        // The event's own name is not an entity section.
        assert!(!names.contains(&"hackspring"));
    }

    #[test]
    fn entity_remembers_its_section() {
        let doc = EventDocument::from_value(sample());
        let ada = doc.entities().iter().find(|e| e.name == "ada lovelace").unwrap();
        assert_eq!(ada.section.as_deref(), Some("judges"));
        let guild = doc
            .entities()
            .iter()
            .find(|e| e.name == "rustacean guild")
            .unwrap();
        assert!(guild.section.is_none());
    }

    #[test]
    fn non_object_is_empty() {
        let doc = EventDocument::from_value(json!([1, 2, 3]));
        assert!(doc.is_empty());
        assert!(doc.entities().is_empty());
    }

    #[test]
    fn missing_and_malformed_files_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EventDocument::load(&dir.path().join("missing.json")).is_empty());

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ nope").unwrap();
        assert!(EventDocument::load(&bad).is_empty());
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(&path, sample().to_string()).unwrap();
        let doc = EventDocument::load(&path);
        assert!(doc.section("judges").is_some());
        assert!(doc.section("nope").is_none());
    }
}
