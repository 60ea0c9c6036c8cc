//! JSON entity documents.
//!
//! A document is an array of entities:
//!
//! ```json
//! [
//!   {"type": "Person", "identity": "alice",
//!    "properties": {"name": "Alice", "age": 30, "address": {"city": "Oslo"}},
//!    "associations": {"spouse": "bob"},
//!    "manyAssociations": {"friends": ["bob"]},
//!    "namedAssociations": {"pets": {"dog": "rex"}}}
//! ]
//! ```
//!
//! Association targets are resolved by identity within the document. A
//! target carries its own properties but not its associations, which is
//! all the SQL index records for it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value as Json;

use super::{EntityState, ModelError, Result, TypeModel, ValueType};
use crate::query::value::Value;
use crate::types::QualifiedName;

/// One entity in a JSON document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDocument {
    /// Entity type name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Identity.
    pub identity: String,
    /// Property values by member name.
    #[serde(default)]
    pub properties: BTreeMap<String, Json>,
    /// Single-valued association targets by member name.
    #[serde(default)]
    pub associations: BTreeMap<String, Option<String>>,
    /// Many-association targets by member name.
    #[serde(default)]
    pub many_associations: BTreeMap<String, Vec<String>>,
    /// Named-association targets by member name, then association name.
    #[serde(default)]
    pub named_associations: BTreeMap<String, BTreeMap<String, String>>,
}

impl TypeModel {
    /// Parses a JSON entity document into entity state.
    pub fn load_entities(&self, text: &str) -> Result<Vec<Arc<EntityState>>> {
        let documents: Vec<EntityDocument> = serde_json::from_str(text)?;
        self.build_entities(&documents)
    }

    /// Builds entity state from parsed documents, in document order.
    pub fn build_entities(&self, documents: &[EntityDocument]) -> Result<Vec<Arc<EntityState>>> {
        let mut bare = BTreeMap::new();
        for document in documents {
            let state = self.with_properties(document)?;
            bare.insert(document.identity.clone(), Arc::new(state));
        }
        let target = |identity: &str| -> Result<Arc<EntityState>> {
            bare.get(identity)
                .cloned()
                .ok_or_else(|| ModelError::UnknownEntity(identity.to_owned()))
        };

        let mut entities = Vec::with_capacity(documents.len());
        for document in documents {
            let mut state = self.with_properties(document)?;
            for (member, identity) in &document.associations {
                let resolved = identity.as_deref().map(target).transpose()?;
                state = state.with_association(member, resolved.as_ref())?;
            }
            for (member, identities) in &document.many_associations {
                let resolved = identities
                    .iter()
                    .map(|identity| target(identity))
                    .collect::<Result<Vec<_>>>()?;
                state = state.with_many(member, &resolved)?;
            }
            for (member, named) in &document.named_associations {
                let resolved = named
                    .iter()
                    .map(|(name, identity)| Ok((name.as_str(), target(identity)?)))
                    .collect::<Result<Vec<_>>>()?;
                state = state.with_named(member, &resolved)?;
            }
            entities.push(Arc::new(state));
        }
        Ok(entities)
    }

    fn with_properties(&self, document: &EntityDocument) -> Result<EntityState> {
        let mut state = self.new_entity(&document.type_name, document.identity.as_str())?;
        for (member, json) in &document.properties {
            let value = self.property_value(&document.type_name, member, json)?;
            state = state.with(member, value)?;
        }
        Ok(state)
    }

    fn property_value(&self, type_name: &str, member: &str, json: &Json) -> Result<Value> {
        let found = self
            .find_member(type_name, member)
            .ok_or_else(|| ModelError::UnknownMember {
                type_name: type_name.to_owned(),
                member: member.to_owned(),
            })?;
        let qname = found.qualified_name();
        let value_type = found
            .descriptor
            .value_type
            .clone()
            .ok_or_else(|| ModelError::MissingValueType(qname.clone()))?;
        self.json_value(&qname, &value_type, json)
    }

    fn json_value(&self, member: &QualifiedName, expected: &ValueType, json: &Json) -> Result<Value> {
        let mismatch = || ModelError::InvalidDocumentValue {
            member: member.clone(),
            expected: expected.clone(),
        };
        if json.is_null() {
            return Ok(Value::Null);
        }
        Ok(match expected {
            ValueType::Bool => Value::Bool(json.as_bool().ok_or_else(mismatch)?),
            ValueType::Int => Value::Int(json.as_i64().ok_or_else(mismatch)?),
            ValueType::Float => Value::Float(json.as_f64().ok_or_else(mismatch)?),
            ValueType::String => Value::String(json.as_str().ok_or_else(mismatch)?.to_owned()),
            ValueType::Collection(inner) => Value::List(
                json.as_array()
                    .ok_or_else(mismatch)?
                    .iter()
                    .map(|item| self.json_value(member, inner, item))
                    .collect::<Result<_>>()?,
            ),
            ValueType::Composite(name) => {
                let fields = json.as_object().ok_or_else(mismatch)?;
                let mut state = self.new_value(name)?;
                for (field, item) in fields {
                    let value = self.property_value(name, field, item)?;
                    state = state.with(field, value)?;
                }
                Value::from(state)
            }
        })
    }
}
