//! Runtime composite state and the accessor capability traversal relies on.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{MemberKind, MemberRef, ModelError, Result, TypeModel, ValueType};
use crate::query::errors::TraversalError;
use crate::query::value::Value;
use crate::types::{EntityReference, QualifiedName};

/// Shared handle to any composite state.
pub type CompositeRef = Arc<dyn Composite>;

/// Accessor capability over a composite's state.
///
/// Accessors return `Ok(None)` (or an empty collection) for absent values and
/// [`TraversalError::UnknownAccessor`] when the member is not declared for the
/// state's type.
pub trait Composite: fmt::Debug + Send + Sync {
    /// Runtime type name.
    fn type_name(&self) -> &str;

    /// Identity of the composite, for entities.
    fn reference(&self) -> Option<&EntityReference>;

    /// Reads a property.
    fn property(&self, name: &QualifiedName) -> std::result::Result<Option<Value>, TraversalError>;

    /// Reads a single-valued association.
    fn association(
        &self,
        name: &QualifiedName,
    ) -> std::result::Result<Option<CompositeRef>, TraversalError>;

    /// Reads a many-association.
    fn many_association(
        &self,
        name: &QualifiedName,
    ) -> std::result::Result<Vec<CompositeRef>, TraversalError>;

    /// Reads a named-association.
    fn named_association(
        &self,
        name: &QualifiedName,
    ) -> std::result::Result<BTreeMap<String, CompositeRef>, TraversalError>;
}

fn unknown(type_name: &str, name: &QualifiedName, kind: MemberKind) -> TraversalError {
    TraversalError::UnknownAccessor {
        type_name: type_name.to_owned(),
        name: name.clone(),
        kind,
    }
}

fn lookup_member<'m>(
    model: &'m TypeModel,
    type_name: &str,
    member: &str,
    expected: MemberKind,
) -> Result<MemberRef<'m>> {
    let found = model
        .find_member(type_name, member)
        .ok_or_else(|| ModelError::UnknownMember {
            type_name: type_name.to_owned(),
            member: member.to_owned(),
        })?;
    if found.descriptor.kind != expected {
        return Err(ModelError::WrongMemberKind {
            member: found.qualified_name(),
            found: found.descriptor.kind,
            expected,
        });
    }
    Ok(found)
}

fn checked_value(member: &MemberRef<'_>, value: Value) -> Result<Value> {
    let expected = member
        .descriptor
        .value_type
        .clone()
        .unwrap_or(ValueType::String);
    if !expected.accepts(&value) {
        return Err(ModelError::TypeMismatch {
            member: member.qualified_name(),
            expected,
            value,
        });
    }
    Ok(value)
}

/// State of one entity.
#[derive(Debug, Clone)]
pub struct EntityState {
    reference: EntityReference,
    type_name: String,
    properties: BTreeMap<QualifiedName, Value>,
    associations: BTreeMap<QualifiedName, Option<CompositeRef>>,
    many_associations: BTreeMap<QualifiedName, Vec<CompositeRef>>,
    named_associations: BTreeMap<QualifiedName, BTreeMap<String, CompositeRef>>,
    model: TypeModel,
}

impl EntityState {
    pub(super) fn new(model: &TypeModel, type_name: &str, reference: EntityReference) -> Self {
        let mut state = EntityState {
            reference,
            type_name: type_name.to_owned(),
            properties: BTreeMap::new(),
            associations: BTreeMap::new(),
            many_associations: BTreeMap::new(),
            named_associations: BTreeMap::new(),
            model: model.clone(),
        };
        for member in model.members_of(type_name) {
            let qname = member.qualified_name();
            match member.descriptor.kind {
                MemberKind::Property => {
                    state.properties.insert(qname, Value::Null);
                }
                MemberKind::Association => {
                    state.associations.insert(qname, None);
                }
                MemberKind::ManyAssociation => {
                    state.many_associations.insert(qname, Vec::new());
                }
                MemberKind::NamedAssociation => {
                    state.named_associations.insert(qname, BTreeMap::new());
                }
            }
        }
        state
    }

    /// Sets a property by member name.
    pub fn with(mut self, member: &str, value: impl Into<Value>) -> Result<Self> {
        let found = lookup_member(&self.model, &self.type_name, member, MemberKind::Property)?;
        let value = checked_value(&found, value.into())?;
        self.properties.insert(found.qualified_name(), value);
        Ok(self)
    }

    fn check_target(&self, found: &MemberRef<'_>, target: &EntityState) -> Result<()> {
        let declared = found.descriptor.target.as_deref().unwrap_or_default();
        if !self.model.is_assignable(&target.type_name, declared) {
            return Err(ModelError::TargetMismatch {
                member: found.qualified_name(),
                target: target.reference.clone(),
            });
        }
        Ok(())
    }

    /// Sets a single-valued association by member name.
    pub fn with_association(mut self, member: &str, target: Option<&Arc<EntityState>>) -> Result<Self> {
        let found = lookup_member(&self.model, &self.type_name, member, MemberKind::Association)?;
        if let Some(target) = target {
            self.check_target(&found, target)?;
        }
        let qname = found.qualified_name();
        self.associations
            .insert(qname, target.map(|t| Arc::clone(t) as CompositeRef));
        Ok(self)
    }

    /// Sets the members of a many-association by member name.
    pub fn with_many(mut self, member: &str, targets: &[Arc<EntityState>]) -> Result<Self> {
        let found = lookup_member(
            &self.model,
            &self.type_name,
            member,
            MemberKind::ManyAssociation,
        )?;
        for target in targets {
            self.check_target(&found, target)?;
        }
        let qname = found.qualified_name();
        self.many_associations.insert(
            qname,
            targets
                .iter()
                .map(|t| Arc::clone(t) as CompositeRef)
                .collect(),
        );
        Ok(self)
    }

    /// Sets the members of a named-association by member name.
    pub fn with_named(mut self, member: &str, targets: &[(&str, Arc<EntityState>)]) -> Result<Self> {
        let found = lookup_member(
            &self.model,
            &self.type_name,
            member,
            MemberKind::NamedAssociation,
        )?;
        for (_, target) in targets {
            self.check_target(&found, target)?;
        }
        let qname = found.qualified_name();
        self.named_associations.insert(
            qname,
            targets
                .iter()
                .map(|(name, t)| ((*name).to_owned(), Arc::clone(t) as CompositeRef))
                .collect(),
        );
        Ok(self)
    }

    /// Identity of the entity.
    pub fn entity_reference(&self) -> &EntityReference {
        &self.reference
    }

    /// Property values keyed by qualified name.
    pub fn properties(&self) -> impl Iterator<Item = (&QualifiedName, &Value)> {
        self.properties.iter()
    }

    /// Association targets keyed by qualified name.
    pub fn associations(&self) -> impl Iterator<Item = (&QualifiedName, Option<&CompositeRef>)> {
        self.associations.iter().map(|(k, v)| (k, v.as_ref()))
    }

    /// Many-association members keyed by qualified name.
    pub fn many_associations(&self) -> impl Iterator<Item = (&QualifiedName, &[CompositeRef])> {
        self.many_associations
            .iter()
            .map(|(k, v)| (k, v.as_slice()))
    }

    /// Named-association members keyed by qualified name.
    pub fn named_associations(
        &self,
    ) -> impl Iterator<Item = (&QualifiedName, &BTreeMap<String, CompositeRef>)> {
        self.named_associations.iter()
    }
}

impl Composite for EntityState {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn reference(&self) -> Option<&EntityReference> {
        Some(&self.reference)
    }

    fn property(&self, name: &QualifiedName) -> std::result::Result<Option<Value>, TraversalError> {
        if name.is_identity() {
            return Ok(Some(Value::String(self.reference.identity().to_owned())));
        }
        match self.properties.get(name) {
            Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(value.clone())),
            None => Err(unknown(&self.type_name, name, MemberKind::Property)),
        }
    }

    fn association(
        &self,
        name: &QualifiedName,
    ) -> std::result::Result<Option<CompositeRef>, TraversalError> {
        self.associations
            .get(name)
            .cloned()
            .ok_or_else(|| unknown(&self.type_name, name, MemberKind::Association))
    }

    fn many_association(
        &self,
        name: &QualifiedName,
    ) -> std::result::Result<Vec<CompositeRef>, TraversalError> {
        self.many_associations
            .get(name)
            .cloned()
            .ok_or_else(|| unknown(&self.type_name, name, MemberKind::ManyAssociation))
    }

    fn named_association(
        &self,
        name: &QualifiedName,
    ) -> std::result::Result<BTreeMap<String, CompositeRef>, TraversalError> {
        self.named_associations
            .get(name)
            .cloned()
            .ok_or_else(|| unknown(&self.type_name, name, MemberKind::NamedAssociation))
    }
}

/// State of a value composite, held inside [`Value::Composite`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueState {
    type_name: String,
    members: BTreeMap<String, QualifiedName>,
    properties: BTreeMap<QualifiedName, Value>,
}

impl ValueState {
    pub(super) fn new(model: &TypeModel, type_name: &str) -> Self {
        let mut members = BTreeMap::new();
        let mut properties = BTreeMap::new();
        for member in model.members_of(type_name) {
            if member.descriptor.kind == MemberKind::Property {
                let qname = member.qualified_name();
                members.insert(member.descriptor.name.clone(), qname.clone());
                properties.insert(qname, Value::Null);
            }
        }
        ValueState {
            type_name: type_name.to_owned(),
            members,
            properties,
        }
    }

    /// Sets a property by member name. Types are checked by the owning entity.
    pub fn with(mut self, member: &str, value: impl Into<Value>) -> Result<Self> {
        let qname = self
            .members
            .get(member)
            .cloned()
            .ok_or_else(|| ModelError::UnknownMember {
                type_name: self.type_name.clone(),
                member: member.to_owned(),
            })?;
        self.properties.insert(qname, value.into());
        Ok(self)
    }

    /// Runtime type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Property values keyed by qualified name.
    pub fn properties(&self) -> impl Iterator<Item = (&QualifiedName, &Value)> {
        self.properties.iter()
    }
}

impl Composite for ValueState {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn reference(&self) -> Option<&EntityReference> {
        None
    }

    fn property(&self, name: &QualifiedName) -> std::result::Result<Option<Value>, TraversalError> {
        match self.properties.get(name) {
            Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(value.clone())),
            None => Err(unknown(&self.type_name, name, MemberKind::Property)),
        }
    }

    fn association(
        &self,
        name: &QualifiedName,
    ) -> std::result::Result<Option<CompositeRef>, TraversalError> {
        Err(unknown(&self.type_name, name, MemberKind::Association))
    }

    fn many_association(
        &self,
        name: &QualifiedName,
    ) -> std::result::Result<Vec<CompositeRef>, TraversalError> {
        Err(unknown(&self.type_name, name, MemberKind::ManyAssociation))
    }

    fn named_association(
        &self,
        name: &QualifiedName,
    ) -> std::result::Result<BTreeMap<String, CompositeRef>, TraversalError> {
        Err(unknown(&self.type_name, name, MemberKind::NamedAssociation))
    }
}
