//! Qualified-name and entity-type layout of the SQL index.
//!
//! The compiler only needs to know, per qualified name, which table holds
//! its rows and how deeply it nests in collections, and, per entity type,
//! its key and the types it is assignable to.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{MemberKind, TypeModel, ValueType};
use crate::sql::names::sanitize;
use crate::types::QualifiedName;

/// Storage details of one qualified name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QNameInfo {
    /// Table holding the member's rows, without schema prefix.
    pub table_name: String,
    /// Collection nesting depth; zero for scalars and associations.
    pub collection_depth: usize,
    /// Accessor category.
    pub kind: MemberKind,
}

/// One indexed entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTypeInfo {
    /// Type name.
    pub type_name: String,
    /// Key stored in the entity table's type column.
    pub entity_type_pk: i64,
    /// Every type this one is assignable to, itself included.
    pub assignable_to: BTreeSet<String>,
}

/// Read-only index layout injected into the compiler.
pub trait IndexingMetadata: Send + Sync {
    /// Schema prefix of every table.
    fn schema_name(&self) -> &str;

    /// Storage details of a qualified name.
    fn qname_info(&self, name: &QualifiedName) -> Option<&QNameInfo>;

    /// Indexed entity types.
    fn entity_types(&self) -> &[EntityTypeInfo];

    /// Keys of the entity types assignable to `result_type`.
    fn entity_type_ids(&self, result_type: &str) -> Vec<i64> {
        self.entity_types()
            .iter()
            .filter(|info| info.assignable_to.contains(result_type))
            .map(|info| info.entity_type_pk)
            .collect()
    }
}

/// In-memory [`IndexingMetadata`].
#[derive(Debug, Clone, Default)]
pub struct IndexingState {
    schema: String,
    qnames: BTreeMap<QualifiedName, QNameInfo>,
    entity_types: Vec<EntityTypeInfo>,
}

impl IndexingState {
    /// Empty layout for `schema`.
    pub fn new(schema: impl Into<String>) -> Self {
        IndexingState {
            schema: schema.into(),
            ..Default::default()
        }
    }

    /// Registers the table of a qualified name.
    pub fn with_qname(mut self, name: QualifiedName, info: QNameInfo) -> Self {
        self.qnames.insert(name, info);
        self
    }

    /// Registers an entity type.
    pub fn with_entity_type(mut self, info: EntityTypeInfo) -> Self {
        self.entity_types.push(info);
        self
    }

    /// Derives the layout of every member and entity type in `model`.
    ///
    /// Entity types are keyed from 1 in name order; each member gets a
    /// `<type>_<member>` table.
    pub fn from_model(model: &TypeModel, schema: impl Into<String>) -> Self {
        let mut state = IndexingState::new(schema);
        for descriptor in model.descriptors() {
            for member in &descriptor.members {
                let info = QNameInfo {
                    table_name: format!(
                        "{}_{}",
                        sanitize(&descriptor.name),
                        sanitize(&member.name)
                    ),
                    collection_depth: member
                        .value_type
                        .as_ref()
                        .map(ValueType::collection_depth)
                        .unwrap_or(0),
                    kind: member.kind,
                };
                state
                    .qnames
                    .insert(QualifiedName::new(&descriptor.name, &member.name), info);
            }
        }
        for (pk, entity) in (1i64..).zip(model.entity_types()) {
            let assignable_to = model
                .descriptors()
                .filter(|candidate| model.is_assignable(&entity.name, &candidate.name))
                .map(|candidate| candidate.name.clone())
                .collect();
            state.entity_types.push(EntityTypeInfo {
                type_name: entity.name.clone(),
                entity_type_pk: pk,
                assignable_to,
            });
        }
        state
    }

    /// Every registered qualified name.
    pub fn qnames(&self) -> impl Iterator<Item = (&QualifiedName, &QNameInfo)> {
        self.qnames.iter()
    }

    /// The entity type registered under `type_name`.
    pub fn entity_type(&self, type_name: &str) -> Option<&EntityTypeInfo> {
        self.entity_types.iter().find(|info| info.type_name == type_name)
    }
}

impl IndexingMetadata for IndexingState {
    fn schema_name(&self) -> &str {
        &self.schema
    }

    fn qname_info(&self, name: &QualifiedName) -> Option<&QNameInfo> {
        self.qnames.get(name)
    }

    fn entity_types(&self) -> &[EntityTypeInfo] {
        &self.entity_types
    }
}
