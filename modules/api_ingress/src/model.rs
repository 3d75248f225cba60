use std::collections::BTreeMap;

use utoipa::openapi::{schema::Schema, RefOr};

#[derive(Debug, Default, Clone)]
pub struct ComponentsRegistry {
    /// Schema name -> schema (serialized to components.schemas)
    pub schemas: BTreeMap<String, RefOr<Schema>>,
}

/// Outcome of a schema registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaInsert {
    Inserted,
    Identical,
    /// Different content under an existing name; the first one is kept.
    Conflict,
}

impl ComponentsRegistry {
    /// Register a schema component with conflict detection (JSON compare).
    pub fn register_schema(&mut self, name: impl Into<String>, schema: RefOr<Schema>) -> SchemaInsert {
        let name = name.into();
        match self.schemas.get(&name) {
            None => {
                self.schemas.insert(name, schema);
                SchemaInsert::Inserted
            }
            Some(existing) => {
                let same = match (serde_json::to_value(existing), serde_json::to_value(&schema)) {
                    (Ok(a), Ok(b)) => a == b,
                    _ => false,
                };
                if same {
                    SchemaInsert::Identical
                } else {
                    SchemaInsert::Conflict
                }
            }
        }
    }

    pub fn has_schema(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use utoipa::openapi::schema::{ObjectBuilder, Type};

    fn object(prop: &str) -> RefOr<Schema> {
        RefOr::T(Schema::Object(
            ObjectBuilder::new()
                .property(prop, ObjectBuilder::new().schema_type(Type::String))
                .build(),
        ))
    }

    #[test]
    fn first_registration_wins() {
        let mut reg = ComponentsRegistry::default();
        assert_eq!(reg.register_schema("User", object("name")), SchemaInsert::Inserted);
        assert_eq!(reg.register_schema("User", object("name")), SchemaInsert::Identical);
        assert_eq!(reg.register_schema("User", object("email")), SchemaInsert::Conflict);

        let kept = serde_json::to_value(&reg.schemas["User"]).unwrap();
        assert!(kept["properties"].get("name").is_some());
        assert!(reg.has_schema("User"));
    }
}
