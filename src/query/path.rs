#![forbid(unsafe_code)]

//! Reference chains over composite members.
//!
//! A path is a singly linked chain of accessor steps. Each step resolves its
//! predecessor first and uses the result as its traversal root. The four
//! handle types fix the category of the terminal step; the chain itself is
//! shared between every expression built from the same template.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::model::{Composite, CompositeRef, MemberKind, ValueType};
use crate::query::errors::TraversalError;
use crate::query::value::Value;
use crate::types::QualifiedName;

/// One accessor step of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accessor {
    /// Qualified name of the member.
    pub name: QualifiedName,
    /// Accessor category.
    pub kind: MemberKind,
    /// Declared value type, for properties.
    pub value_type: Option<ValueType>,
    /// Declared target type, for associations.
    pub target: Option<String>,
}

impl Accessor {
    /// Accessor for the identity property.
    pub fn identity() -> Self {
        Accessor {
            name: QualifiedName::identity(),
            kind: MemberKind::Property,
            value_type: Some(ValueType::String),
            target: None,
        }
    }

    /// Collection nesting depth of the declared value type.
    pub fn collection_depth(&self) -> usize {
        self.value_type
            .as_ref()
            .map(ValueType::collection_depth)
            .unwrap_or(0)
    }
}

#[derive(Debug, PartialEq)]
pub(crate) struct PathNode {
    traversed: Option<Arc<PathNode>>,
    accessor: Accessor,
}

enum Resolved {
    Value(Value),
    One(CompositeRef),
    Many(Vec<CompositeRef>),
    Named(BTreeMap<String, CompositeRef>),
}

impl PathNode {
    pub(crate) fn new(traversed: Option<Arc<PathNode>>, accessor: Accessor) -> Arc<Self> {
        Arc::new(PathNode {
            traversed,
            accessor,
        })
    }

    fn resolve(&self, root: &dyn Composite) -> Result<Option<Resolved>, TraversalError> {
        let owner: CompositeRef;
        let target: &dyn Composite = match &self.traversed {
            None => root,
            Some(prev) => {
                if prev.accessor.kind.is_multi_valued() {
                    return Err(TraversalError::MultiValuedTraversal {
                        through: prev.to_string(),
                        kind: prev.accessor.kind,
                    });
                }
                owner = match prev.resolve(root)? {
                    None => return Ok(None),
                    Some(Resolved::One(composite)) => composite,
                    Some(Resolved::Value(Value::Composite(state))) => state as CompositeRef,
                    Some(_) => {
                        return Err(TraversalError::NotComposite {
                            path: prev.to_string(),
                        })
                    }
                };
                owner.as_ref()
            }
        };

        let name = &self.accessor.name;
        Ok(match self.accessor.kind {
            MemberKind::Property => target.property(name)?.map(Resolved::Value),
            MemberKind::Association => target.association(name)?.map(Resolved::One),
            MemberKind::ManyAssociation => Some(Resolved::Many(target.many_association(name)?)),
            MemberKind::NamedAssociation => {
                Some(Resolved::Named(target.named_association(name)?))
            }
        })
    }

    fn steps(&self) -> Vec<&Accessor> {
        let mut steps = match &self.traversed {
            Some(prev) => prev.steps(),
            None => Vec::new(),
        };
        steps.push(&self.accessor);
        steps
    }
}

impl fmt::Display for PathNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prev) = &self.traversed {
            write!(f, "{prev}.")?;
        }
        f.write_str(self.accessor.name.member())
    }
}

macro_rules! path_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name(Arc<PathNode>);

        impl $name {
            pub(crate) fn from_node(node: Arc<PathNode>) -> Self {
                $name(node)
            }

            pub(crate) fn node(&self) -> &Arc<PathNode> {
                &self.0
            }

            /// Terminal accessor.
            pub fn accessor(&self) -> &Accessor {
                &self.0.accessor
            }

            /// Qualified name of the terminal accessor.
            pub fn qualified_name(&self) -> &QualifiedName {
                &self.0.accessor.name
            }

            /// Accessor steps from the root to the terminal step.
            pub fn steps(&self) -> Vec<&Accessor> {
                self.0.steps()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

path_handle!(
    /// Path ending in a property.
    PropertyPath
);
path_handle!(
    /// Path ending in a single-valued association.
    AssociationPath
);
path_handle!(
    /// Path ending in a many-association.
    ManyAssociationPath
);
path_handle!(
    /// Path ending in a named-association.
    NamedAssociationPath
);

impl PropertyPath {
    /// True when the terminal step is the identity property.
    pub fn is_identity(&self) -> bool {
        self.qualified_name().is_identity()
    }

    /// Resolves the property value; `None` when it or a predecessor is null.
    pub fn map(&self, item: &dyn Composite) -> Result<Option<Value>, TraversalError> {
        Ok(match self.0.resolve(item)? {
            Some(Resolved::Value(value)) => Some(value),
            _ => None,
        })
    }
}

impl AssociationPath {
    /// Resolves the associated composite.
    pub fn map(&self, item: &dyn Composite) -> Result<Option<CompositeRef>, TraversalError> {
        Ok(match self.0.resolve(item)? {
            Some(Resolved::One(composite)) => Some(composite),
            _ => None,
        })
    }
}

impl ManyAssociationPath {
    /// Resolves the members of the many-association.
    pub fn map(&self, item: &dyn Composite) -> Result<Option<Vec<CompositeRef>>, TraversalError> {
        Ok(match self.0.resolve(item)? {
            Some(Resolved::Many(members)) => Some(members),
            _ => None,
        })
    }
}

impl NamedAssociationPath {
    /// Resolves the members of the named-association.
    pub fn map(
        &self,
        item: &dyn Composite,
    ) -> Result<Option<BTreeMap<String, CompositeRef>>, TraversalError> {
        Ok(match self.0.resolve(item)? {
            Some(Resolved::Named(members)) => Some(members),
            _ => None,
        })
    }
}
