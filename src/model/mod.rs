#![forbid(unsafe_code)]

//! Composite type model.
//!
//! Describes entity, value and mixin composites together with their
//! properties and associations. The model is the source of truth for path
//! construction (member lookup, accessor categories, queryability) and for
//! deriving the SQL index layout.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::query::value::Value;
use crate::types::{EntityReference, QualifiedName};

mod document;
mod state;

pub use document::EntityDocument;
pub use state::{Composite, CompositeRef, EntityState, ValueState};

/// Result alias for model construction.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while building a type model or populating composite state.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The TOML model document could not be parsed.
    #[error("invalid model document: {0}")]
    Parse(#[from] toml::de::Error),
    /// Two descriptors share a name.
    #[error("type '{0}' declared more than once")]
    DuplicateType(String),
    /// A descriptor extends a type that is not declared.
    #[error("type '{type_name}' extends unknown type '{supertype}'")]
    UnknownSupertype { type_name: String, supertype: String },
    /// An association or composite-valued property names an unknown type.
    #[error("member '{member}' refers to unknown type '{target}'")]
    UnknownTarget { member: QualifiedName, target: String },
    /// A property member did not declare its value type.
    #[error("property '{0}' has no value type")]
    MissingValueType(QualifiedName),
    /// An association member did not declare its target type.
    #[error("association '{0}' has no target type")]
    MissingTarget(QualifiedName),
    /// The requested type is not part of the model.
    #[error("unknown type '{0}'")]
    UnknownType(String),
    /// The type is not of the composite kind the operation needs.
    #[error("type '{type_name}' is a {found} composite, expected {expected}")]
    WrongCompositeKind {
        type_name: String,
        found: CompositeKind,
        expected: CompositeKind,
    },
    /// The member is not declared on the type or its supertypes.
    #[error("type '{type_name}' has no member '{member}'")]
    UnknownMember { type_name: String, member: String },
    /// The member exists but is of a different accessor category.
    #[error("member '{member}' is a {found}, not a {expected}")]
    WrongMemberKind {
        member: QualifiedName,
        found: MemberKind,
        expected: MemberKind,
    },
    /// The value does not conform to the declared property type.
    #[error("value {value:?} does not fit property '{member}' of type {expected:?}")]
    TypeMismatch {
        member: QualifiedName,
        expected: ValueType,
        value: Value,
    },
    /// An association target is not assignable to the declared target type.
    #[error("'{target}' is not assignable to the declared target of '{member}'")]
    TargetMismatch {
        member: QualifiedName,
        target: EntityReference,
    },
    /// The JSON entity document is malformed.
    #[error("invalid entity document: {0}")]
    Document(#[from] serde_json::Error),
    /// A JSON value does not have the shape of the declared property type.
    #[error("document value for '{member}' is not a {expected:?}")]
    InvalidDocumentValue {
        member: QualifiedName,
        expected: ValueType,
    },
    /// An association names an identity absent from the document.
    #[error("no entity with identity '{0}' in the document")]
    UnknownEntity(String),
}

impl ModelError {
    /// Stable identifier for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            ModelError::Parse(_) => "Parse",
            ModelError::DuplicateType(_) => "DuplicateType",
            ModelError::UnknownSupertype { .. } => "UnknownSupertype",
            ModelError::UnknownTarget { .. } => "UnknownTarget",
            ModelError::MissingValueType(_) => "MissingValueType",
            ModelError::MissingTarget(_) => "MissingTarget",
            ModelError::UnknownType(_) => "UnknownType",
            ModelError::WrongCompositeKind { .. } => "WrongCompositeKind",
            ModelError::UnknownMember { .. } => "UnknownMember",
            ModelError::WrongMemberKind { .. } => "WrongMemberKind",
            ModelError::TypeMismatch { .. } => "TypeMismatch",
            ModelError::TargetMismatch { .. } => "TargetMismatch",
            ModelError::Document(_) => "Document",
            ModelError::InvalidDocumentValue { .. } => "InvalidDocumentValue",
            ModelError::UnknownEntity(_) => "UnknownEntity",
        }
    }
}

/// Kind of composite a descriptor describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositeKind {
    /// Identity-bearing composite stored and indexed on its own.
    Entity,
    /// Immutable composite nested inside properties.
    Value,
    /// Abstract supertype shared by other composites.
    Mixin,
}

impl fmt::Display for CompositeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompositeKind::Entity => "entity",
            CompositeKind::Value => "value",
            CompositeKind::Mixin => "mixin",
        })
    }
}

/// Accessor category of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    /// Single value-typed field.
    #[default]
    Property,
    /// Single-valued reference to an entity.
    Association,
    /// Ordered multi-valued reference.
    ManyAssociation,
    /// Name-keyed multi-valued reference.
    NamedAssociation,
}

impl MemberKind {
    /// True for many- and named-associations.
    pub fn is_multi_valued(self) -> bool {
        matches!(self, MemberKind::ManyAssociation | MemberKind::NamedAssociation)
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MemberKind::Property => "property",
            MemberKind::Association => "association",
            MemberKind::ManyAssociation => "many-association",
            MemberKind::NamedAssociation => "named-association",
        })
    }
}

/// Declared type of a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Boolean.
    Bool,
    /// Signed 64-bit integer.
    Int,
    /// 64-bit float.
    Float,
    /// UTF-8 string.
    String,
    /// Value composite of the named type.
    Composite(String),
    /// Ordered collection of the inner type.
    Collection(Box<ValueType>),
}

impl ValueType {
    /// Number of nested collection levels.
    pub fn collection_depth(&self) -> usize {
        match self {
            ValueType::Collection(inner) => 1 + inner.collection_depth(),
            _ => 0,
        }
    }

    /// Innermost element type.
    pub fn element(&self) -> &ValueType {
        match self {
            ValueType::Collection(inner) => inner.element(),
            other => other,
        }
    }

    /// Checks that a runtime value fits this type. Null fits everything, NaN
    /// fits nothing since the SQL index cannot store it.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (_, Value::Float(f)) if f.is_nan() => false,
            (ValueType::Bool, Value::Bool(_)) => true,
            (ValueType::Int, Value::Int(_)) => true,
            (ValueType::Float, Value::Float(_) | Value::Int(_)) => true,
            (ValueType::String, Value::String(_)) => true,
            (ValueType::Composite(name), Value::Composite(state)) => state.type_name() == name,
            (ValueType::Collection(inner), Value::List(items)) => {
                items.iter().all(|item| inner.accepts(item))
            }
            _ => false,
        }
    }

    /// Whether a comparison operand belongs to this type's category. Integers
    /// and floats compare with each other; null compares with nothing.
    pub fn compares_with(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => false,
            (_, Value::Float(f)) if f.is_nan() => false,
            (ValueType::Int | ValueType::Float, Value::Int(_) | Value::Float(_)) => true,
            _ => self.accepts(value),
        }
    }
}

fn default_queryable() -> bool {
    true
}

/// Property or association declared on a composite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDescriptor {
    /// Member name, unique within the declaring type.
    pub name: String,
    /// Accessor category.
    #[serde(default)]
    pub kind: MemberKind,
    /// Value type for properties.
    #[serde(default)]
    pub value_type: Option<ValueType>,
    /// Target entity type for associations.
    #[serde(default)]
    pub target: Option<String>,
    /// Whether the member may be referenced by query expressions.
    #[serde(default = "default_queryable")]
    pub queryable: bool,
}

impl MemberDescriptor {
    fn new(name: impl Into<String>, kind: MemberKind) -> Self {
        Self {
            name: name.into(),
            kind,
            value_type: None,
            target: None,
            queryable: true,
        }
    }

    /// Declares a property.
    pub fn property(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            value_type: Some(value_type),
            ..Self::new(name, MemberKind::Property)
        }
    }

    /// Declares a single-valued association.
    pub fn association(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::new(name, MemberKind::Association)
        }
    }

    /// Declares a many-association.
    pub fn many_association(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::new(name, MemberKind::ManyAssociation)
        }
    }

    /// Declares a named-association.
    pub fn named_association(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::new(name, MemberKind::NamedAssociation)
        }
    }

    /// Marks the member as excluded from queries.
    pub fn not_queryable(mut self) -> Self {
        self.queryable = false;
        self
    }
}

/// Descriptor of one composite type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeDescriptor {
    /// Type name.
    pub name: String,
    /// Composite kind.
    pub kind: CompositeKind,
    /// Direct supertypes.
    #[serde(default)]
    pub extends: Vec<String>,
    /// Members declared directly on this type.
    #[serde(default)]
    pub members: Vec<MemberDescriptor>,
    /// Whether queries may reference values of this type.
    #[serde(default = "default_queryable")]
    pub queryable: bool,
}

impl CompositeDescriptor {
    fn new(name: impl Into<String>, kind: CompositeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            extends: Vec::new(),
            members: Vec::new(),
            queryable: true,
        }
    }

    /// Entity composite descriptor.
    pub fn entity(name: impl Into<String>) -> Self {
        Self::new(name, CompositeKind::Entity)
    }

    /// Value composite descriptor.
    pub fn value(name: impl Into<String>) -> Self {
        Self::new(name, CompositeKind::Value)
    }

    /// Abstract mixin descriptor.
    pub fn mixin(name: impl Into<String>) -> Self {
        Self::new(name, CompositeKind::Mixin)
    }

    /// Adds a direct supertype.
    pub fn extends(mut self, supertype: impl Into<String>) -> Self {
        self.extends.push(supertype.into());
        self
    }

    /// Adds a member.
    pub fn member(mut self, member: MemberDescriptor) -> Self {
        self.members.push(member);
        self
    }

    /// Marks the type as excluded from queries.
    pub fn not_queryable(mut self) -> Self {
        self.queryable = false;
        self
    }
}

/// A member found through the type hierarchy.
#[derive(Debug, Clone, Copy)]
pub struct MemberRef<'m> {
    /// Type that declares the member.
    pub declaring_type: &'m str,
    /// The member descriptor.
    pub descriptor: &'m MemberDescriptor,
}

impl MemberRef<'_> {
    /// Qualified name of the member.
    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName::new(self.declaring_type, &self.descriptor.name)
    }
}

#[derive(Debug, Deserialize)]
struct ModelDocument {
    #[serde(default)]
    types: Vec<CompositeDescriptor>,
}

/// Registry of composite descriptors. Cloning shares the registry.
#[derive(Debug, Clone, Default)]
pub struct TypeModel {
    types: Arc<BTreeMap<String, CompositeDescriptor>>,
}

impl TypeModel {
    /// Builds a model from descriptors, validating supertypes and member targets.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = CompositeDescriptor>,
    ) -> Result<Self> {
        let mut types = BTreeMap::new();
        for descriptor in descriptors {
            let name = descriptor.name.clone();
            if types.insert(name.clone(), descriptor).is_some() {
                return Err(ModelError::DuplicateType(name));
            }
        }
        let model = TypeModel {
            types: Arc::new(types),
        };
        model.validate()?;
        Ok(model)
    }

    /// Parses a TOML model document made of `[[types]]` tables.
    pub fn from_toml(text: &str) -> Result<Self> {
        let document: ModelDocument = toml::from_str(text)?;
        Self::from_descriptors(document.types)
    }

    fn validate(&self) -> Result<()> {
        for descriptor in self.types.values() {
            for supertype in &descriptor.extends {
                if !self.types.contains_key(supertype) {
                    return Err(ModelError::UnknownSupertype {
                        type_name: descriptor.name.clone(),
                        supertype: supertype.clone(),
                    });
                }
            }
            for member in &descriptor.members {
                let qname = QualifiedName::new(&descriptor.name, &member.name);
                match member.kind {
                    MemberKind::Property => {
                        let value_type = member
                            .value_type
                            .as_ref()
                            .ok_or_else(|| ModelError::MissingValueType(qname.clone()))?;
                        if let ValueType::Composite(target) = value_type.element() {
                            if !self.types.contains_key(target) {
                                return Err(ModelError::UnknownTarget {
                                    member: qname,
                                    target: target.clone(),
                                });
                            }
                        }
                    }
                    _ => {
                        let target = member
                            .target
                            .as_ref()
                            .ok_or_else(|| ModelError::MissingTarget(qname.clone()))?;
                        if !self.types.contains_key(target) {
                            return Err(ModelError::UnknownTarget {
                                member: qname,
                                target: target.clone(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Looks up a descriptor by name.
    pub fn descriptor(&self, name: &str) -> Option<&CompositeDescriptor> {
        self.types.get(name)
    }

    /// All descriptors in name order.
    pub fn descriptors(&self) -> impl Iterator<Item = &CompositeDescriptor> {
        self.types.values()
    }

    /// Entity descriptors in name order.
    pub fn entity_types(&self) -> impl Iterator<Item = &CompositeDescriptor> {
        self.types
            .values()
            .filter(|d| d.kind == CompositeKind::Entity)
    }

    /// Finds a member on the type or, breadth first, on its supertypes.
    pub fn find_member(&self, type_name: &str, member: &str) -> Option<MemberRef<'_>> {
        self.hierarchy(type_name).into_iter().find_map(|descriptor| {
            descriptor
                .members
                .iter()
                .find(|m| m.name == member)
                .map(|m| MemberRef {
                    declaring_type: descriptor.name.as_str(),
                    descriptor: m,
                })
        })
    }

    /// Every member visible on the type, nearest declaration first.
    pub fn members_of(&self, type_name: &str) -> Vec<MemberRef<'_>> {
        let mut seen = BTreeSet::new();
        let mut members = Vec::new();
        for descriptor in self.hierarchy(type_name) {
            for m in &descriptor.members {
                if seen.insert(m.name.as_str()) {
                    members.push(MemberRef {
                        declaring_type: descriptor.name.as_str(),
                        descriptor: m,
                    });
                }
            }
        }
        members
    }

    /// True when `sub` is `sup` or transitively extends it.
    pub fn is_assignable(&self, sub: &str, sup: &str) -> bool {
        self.hierarchy(sub).iter().any(|d| d.name == sup)
    }

    fn hierarchy(&self, type_name: &str) -> Vec<&CompositeDescriptor> {
        let mut visited = BTreeSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([type_name]);
        while let Some(name) = queue.pop_front() {
            if !visited.insert(name) {
                continue;
            }
            if let Some(descriptor) = self.types.get(name) {
                order.push(descriptor);
                queue.extend(descriptor.extends.iter().map(String::as_str));
            }
        }
        order
    }

    fn expect_kind(&self, type_name: &str, expected: CompositeKind) -> Result<&CompositeDescriptor> {
        let descriptor = self
            .descriptor(type_name)
            .ok_or_else(|| ModelError::UnknownType(type_name.to_owned()))?;
        if descriptor.kind != expected {
            return Err(ModelError::WrongCompositeKind {
                type_name: type_name.to_owned(),
                found: descriptor.kind,
                expected,
            });
        }
        Ok(descriptor)
    }

    /// Creates empty state for an entity of the given type.
    pub fn new_entity(
        &self,
        type_name: &str,
        identity: impl Into<EntityReference>,
    ) -> Result<EntityState> {
        self.expect_kind(type_name, CompositeKind::Entity)?;
        Ok(EntityState::new(self, type_name, identity.into()))
    }

    /// Creates empty state for a value composite of the given type.
    pub fn new_value(&self, type_name: &str) -> Result<ValueState> {
        self.expect_kind(type_name, CompositeKind::Value)?;
        Ok(ValueState::new(self, type_name))
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::people;
    use super::*;

    #[test]
    fn members_resolve_through_supertypes() {
        let model = people();
        let name = model.find_member("Employee", "name").unwrap();
        assert_eq!(name.declaring_type, "Nameable");
        assert_eq!(name.qualified_name(), QualifiedName::new("Nameable", "name"));
        assert!(model.find_member("Pet", "age").is_none());
    }

    #[test]
    fn assignability_follows_extends() {
        let model = people();
        assert!(model.is_assignable("Employee", "Person"));
        assert!(model.is_assignable("Employee", "Nameable"));
        assert!(model.is_assignable("Pet", "Pet"));
        assert!(!model.is_assignable("Person", "Employee"));
    }

    #[test]
    fn members_of_lists_inherited_members_once() {
        let model = people();
        let names: Vec<_> = model
            .members_of("Employee")
            .iter()
            .map(|m| m.descriptor.name.clone())
            .collect();
        assert!(names.contains(&"name".to_string()));
        assert!(names.contains(&"friends".to_string()));
        assert_eq!(names.iter().filter(|n| *n == "name").count(), 1);
    }

    #[test]
    fn unknown_supertype_is_rejected() {
        let err = TypeModel::from_descriptors([CompositeDescriptor::entity("A").extends("B")])
            .unwrap_err();
        assert_eq!(err.code(), "UnknownSupertype");
    }

    #[test]
    fn duplicate_types_are_rejected() {
        let err = TypeModel::from_descriptors([
            CompositeDescriptor::entity("A"),
            CompositeDescriptor::value("A"),
        ])
        .unwrap_err();
        assert!(matches!(err, ModelError::DuplicateType(name) if name == "A"));
    }

    #[test]
    fn model_loads_from_toml() {
        let model = TypeModel::from_toml(
            r#"
            [[types]]
            name = "Person"
            kind = "entity"

            [[types.members]]
            name = "age"
            value_type = "int"

            [[types.members]]
            name = "tags"
            value_type = { collection = "string" }

            [[types.members]]
            name = "friends"
            kind = "many_association"
            target = "Person"
            "#,
        )
        .unwrap();
        let tags = model.find_member("Person", "tags").unwrap();
        assert_eq!(
            tags.descriptor.value_type.as_ref().map(ValueType::collection_depth),
            Some(1)
        );
        let friends = model.find_member("Person", "friends").unwrap();
        assert_eq!(friends.descriptor.kind, MemberKind::ManyAssociation);
    }

    #[test]
    fn value_types_check_runtime_values() {
        let tags = ValueType::Collection(Box::new(ValueType::String));
        assert!(tags.accepts(&Value::List(vec!["a".into()])));
        assert!(!tags.accepts(&Value::List(vec![Value::Int(1)])));
        assert!(ValueType::Float.accepts(&Value::Int(3)));
        assert!(ValueType::Int.accepts(&Value::Null));
        assert!(!ValueType::Float.accepts(&Value::Float(f64::NAN)));
    }

    #[test]
    fn comparison_operands_match_the_category() {
        assert!(ValueType::Int.compares_with(&Value::Float(2.5)));
        assert!(ValueType::Float.compares_with(&Value::Int(2)));
        assert!(!ValueType::Int.compares_with(&Value::Null));
        assert!(!ValueType::String.compares_with(&Value::Int(5)));
        assert!(!ValueType::Float.compares_with(&Value::Float(f64::NAN)));
        assert!(ValueType::Bool.compares_with(&Value::Bool(true)));
    }
}
