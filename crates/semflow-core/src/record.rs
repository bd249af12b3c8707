//! Data records: one instance of a schema plus lineage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::schema::SchemaRef;
use crate::types::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRecord {
    pub id: Uuid,
    /// Record this one was derived from (provenance/profiling).
    pub parent_id: Option<Uuid>,
    pub schema: SchemaRef,
    values: BTreeMap<String, Value>,
}

impl DataRecord {
    pub fn new(schema: SchemaRef) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            schema,
            values: BTreeMap::new(),
        }
    }

    /// New empty record of `schema` whose parent is `parent`.
    pub fn derived(schema: SchemaRef, parent: &DataRecord) -> Self {
        let mut dr = Self::new(schema);
        dr.parent_id = Some(parent.id);
        dr
    }

    pub fn with_parent(mut self, parent_id: Option<Uuid>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn schema_name(&self) -> &str {
        &self.schema.name
    }

    /// Declared field names, in schema order.
    pub fn field_names(&self) -> Vec<&str> {
        self.schema.field_names()
    }

    pub fn values(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Required schema fields that carry no value.
    pub fn missing_required_fields(&self) -> Vec<&str> {
        self.schema
            .fields
            .iter()
            .filter(|f| f.required && !self.values.contains_key(&f.name))
            .map(|f| f.name.as_str())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_required_fields().is_empty()
    }

    /// JSON object of every value, declared fields and undeclared alike.
    pub fn as_json(&self) -> Json {
        self.to_json_object(false)
    }

    /// Like `as_json`, but byte payloads are elided; used as LLM context.
    pub fn as_text_json(&self) -> String {
        self.to_json_object(true).to_string()
    }

    fn to_json_object(&self, elide_bytes: bool) -> Json {
        let obj = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json(elide_bytes)))
            .collect::<serde_json::Map<_, _>>();
        Json::Object(obj)
    }
}

/// Records compare by schema and values; ids and lineage are ignored.
impl PartialEq for DataRecord {
    fn eq(&self, other: &Self) -> bool {
        self.schema.name == other.schema.name && self.values == other.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::builtin;

    #[test]
    fn missing_required_fields_follow_schema() {
        let rec = DataRecord::new(builtin::file()).with("filename", "a.txt");
        assert_eq!(rec.missing_required_fields(), vec!["contents"]);
        let rec = rec.with("contents", b"hi".to_vec());
        assert!(rec.is_complete());
    }

    #[test]
    fn text_json_elides_bytes() {
        let rec = DataRecord::new(builtin::file())
            .with("filename", "a.bin")
            .with("contents", vec![0u8, 1, 2]);
        let text = rec.as_text_json();
        assert!(text.contains("[binary 3 bytes]"));
        assert!(text.contains("\"filename\":\"a.bin\""));
    }

    #[test]
    fn equality_ignores_lineage() {
        let a = DataRecord::new(builtin::number()).with("value", 1i64);
        let b = DataRecord::derived(builtin::number(), &a).with("value", 1i64);
        assert_eq!(a, b);
        assert_eq!(b.parent_id, Some(a.id));
    }
}
