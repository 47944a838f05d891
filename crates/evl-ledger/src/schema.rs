use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{LedgerError, LedgerResult};

/// Commit-time schema check for inline event data.
///
/// The ledger calls this once per event carrying `data`; any error rejects
/// the whole batch. Events carrying a `ref` are not checked.
pub trait SchemaValidator: Send + Sync {
    /// Check `data` against the schema registered for `event_type`, if any.
    fn validate(&self, event_type: &str, data: &Value) -> Result<(), String>;
}

/// Accepts everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSchemas;

impl SchemaValidator for NoSchemas {
    fn validate(&self, _event_type: &str, _data: &Value) -> Result<(), String> {
        Ok(())
    }
}

type SchemaCheck = Box<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Validators keyed by event type. Types without an entry pass unchecked.
#[derive(Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, SchemaCheck>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the check for an event type. A type can be registered once.
    pub fn register<F>(&mut self, event_type: impl Into<String>, check: F) -> LedgerResult<()>
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        let event_type = event_type.into();
        if self.schemas.contains_key(&event_type) {
            return Err(LedgerError::AlreadyExists(format!(
                "schema for event type '{event_type}'"
            )));
        }
        self.schemas.insert(event_type, Box::new(check));
        Ok(())
    }

    /// Require `data` to be an object containing every key in `keys`.
    pub fn register_required_keys(
        &mut self,
        event_type: impl Into<String>,
        keys: &[&str],
    ) -> LedgerResult<()> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.register(event_type, move |data| {
            let object = data.as_object().ok_or("data must be an object")?;
            match keys.iter().find(|k| !object.contains_key(k.as_str())) {
                Some(missing) => Err(format!("missing required key '{missing}'")),
                None => Ok(()),
            }
        })
    }

    /// Registered event types, sorted.
    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}

impl SchemaValidator for SchemaRegistry {
    fn validate(&self, event_type: &str, data: &Value) -> Result<(), String> {
        match self.schemas.get(event_type) {
            Some(check) => check(data),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("event_types", &self.schemas.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unregistered_types_pass() {
        let registry = SchemaRegistry::new();
        assert!(registry.validate("anything", &json!(null)).is_ok());
        assert!(NoSchemas.validate("anything", &json!(1)).is_ok());
    }

    #[test]
    fn required_keys_enforced() {
        let mut registry = SchemaRegistry::new();
        registry
            .register_required_keys("io.example.book-acquired", &["title", "isbn"])
            .unwrap();
        assert!(registry
            .validate("io.example.book-acquired", &json!({"title": "Dune", "isbn": "1"}))
            .is_ok());
        assert_eq!(
            registry
                .validate("io.example.book-acquired", &json!({"title": "Dune"}))
                .unwrap_err(),
            "missing required key 'isbn'"
        );
        assert!(registry.validate("io.example.book-acquired", &json!([1])).is_err());
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = SchemaRegistry::new();
        registry.register("t", |_| Ok(())).unwrap();
        let err = registry.register("t", |_| Ok(())).unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyExists(_)));
        assert_eq!(registry.event_types().collect::<Vec<_>>(), vec!["t"]);
    }
}
