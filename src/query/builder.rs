//! Template-based construction of paths and expressions.
//!
//! A [`Template`] stands for "an instance of type T" while building a filter.
//! Member lookups on it produce typed paths, validated against the model when
//! they are built rather than when they are evaluated.

use std::sync::Arc;

use crate::model::{CompositeKind, MemberKind, TypeModel, ValueType};
use crate::query::ast::{CompareOp, Direction, Expr, MatchPattern, Operand, OrderBy, Pattern};
use crate::query::errors::{QueryExpressionError, Result};
use crate::query::path::{
    Accessor, AssociationPath, ManyAssociationPath, NamedAssociationPath, PathNode, PropertyPath,
};
use crate::query::value::Value;
use crate::types::{EntityReference, IDENTITY_MEMBER};

/// Placeholder for an instance of a composite type, rooted at an optional
/// traversal.
#[derive(Debug, Clone)]
pub struct Template<'m> {
    model: &'m TypeModel,
    type_name: String,
    traversed: Option<Arc<PathNode>>,
}

/// A path of any terminal category.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyPath {
    /// Property path.
    Property(PropertyPath),
    /// Association path.
    Association(AssociationPath),
    /// Many-association path.
    ManyAssociation(ManyAssociationPath),
    /// Named-association path.
    NamedAssociation(NamedAssociationPath),
}

impl TypeModel {
    /// Template for the root of a query over `type_name`.
    pub fn template(&self, type_name: &str) -> Result<Template<'_>> {
        if self.descriptor(type_name).is_none() {
            return Err(QueryExpressionError::UnknownType(type_name.to_owned()));
        }
        Ok(Template {
            model: self,
            type_name: type_name.to_owned(),
            traversed: None,
        })
    }

    /// Template for the target of an association, continuing its traversal.
    pub fn template_for(&self, association: &AssociationPath) -> Result<Template<'_>> {
        let target = association
            .accessor()
            .target
            .clone()
            .ok_or_else(|| QueryExpressionError::NotTraversable(association.to_string()))?;
        Ok(Template {
            model: self,
            type_name: target,
            traversed: Some(Arc::clone(association.node())),
        })
    }

    /// Template for a value composite held by a property.
    pub fn template_for_value(&self, property: &PropertyPath) -> Result<Template<'_>> {
        match &property.accessor().value_type {
            Some(ValueType::Composite(target)) => Ok(Template {
                model: self,
                type_name: target.clone(),
                traversed: Some(Arc::clone(property.node())),
            }),
            _ => Err(QueryExpressionError::NotTraversable(property.to_string())),
        }
    }
}

impl<'m> Template<'m> {
    /// Type this template stands for.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    fn describe(&self, member: &str) -> String {
        match &self.traversed {
            Some(prev) => format!("{prev}.{member}"),
            None => member.to_owned(),
        }
    }

    fn accessor(&self, member: &str, expected: MemberKind) -> Result<Accessor> {
        let found = self.model.find_member(&self.type_name, member).ok_or_else(|| {
            QueryExpressionError::UnknownMember {
                type_name: self.type_name.clone(),
                member: member.to_owned(),
            }
        })?;
        let descriptor = found.descriptor;
        if descriptor.kind != expected {
            return Err(QueryExpressionError::WrongAccessorKind {
                member: found.qualified_name(),
                found: descriptor.kind,
                expected,
            });
        }
        if !descriptor.queryable {
            return Err(QueryExpressionError::NotQueryable(self.describe(member)));
        }
        let referenced = match &descriptor.value_type {
            Some(value_type) => match value_type.element() {
                ValueType::Composite(name) => Some(name.as_str()),
                _ => None,
            },
            None => descriptor.target.as_deref(),
        };
        if let Some(referenced) = referenced {
            if self
                .model
                .descriptor(referenced)
                .is_some_and(|d| !d.queryable)
            {
                return Err(QueryExpressionError::NotQueryable(format!(
                    "{} ({referenced})",
                    self.describe(member)
                )));
            }
        }
        Ok(Accessor {
            name: found.qualified_name(),
            kind: descriptor.kind,
            value_type: descriptor.value_type.clone(),
            target: descriptor.target.clone(),
        })
    }

    fn node(&self, accessor: Accessor) -> Arc<PathNode> {
        PathNode::new(self.traversed.clone(), accessor)
    }

    fn has_identity(&self) -> bool {
        self.model
            .descriptor(&self.type_name)
            .is_some_and(|d| d.kind != CompositeKind::Value)
    }

    /// The identity property of the entity this template stands for.
    pub fn identity(&self) -> PropertyPath {
        PropertyPath::from_node(self.node(Accessor::identity()))
    }

    /// Property declared on the type or a supertype.
    pub fn property(&self, name: &str) -> Result<PropertyPath> {
        if name == IDENTITY_MEMBER
            && self.has_identity()
            && self.model.find_member(&self.type_name, name).is_none()
        {
            return Ok(self.identity());
        }
        let accessor = self.accessor(name, MemberKind::Property)?;
        Ok(PropertyPath::from_node(self.node(accessor)))
    }

    /// Single-valued association.
    pub fn association(&self, name: &str) -> Result<AssociationPath> {
        let accessor = self.accessor(name, MemberKind::Association)?;
        Ok(AssociationPath::from_node(self.node(accessor)))
    }

    /// Many-association.
    pub fn many_association(&self, name: &str) -> Result<ManyAssociationPath> {
        let accessor = self.accessor(name, MemberKind::ManyAssociation)?;
        Ok(ManyAssociationPath::from_node(self.node(accessor)))
    }

    /// Named-association.
    pub fn named_association(&self, name: &str) -> Result<NamedAssociationPath> {
        let accessor = self.accessor(name, MemberKind::NamedAssociation)?;
        Ok(NamedAssociationPath::from_node(self.node(accessor)))
    }

    /// Resolves a dotted path such as `spouse.address.city`. Intermediate
    /// segments must be associations or composite-valued properties.
    pub fn resolve(&self, dotted: &str) -> Result<AnyPath> {
        let segments: Vec<&str> = dotted.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(QueryExpressionError::MalformedPath(dotted.to_owned()));
        }
        let (last, hops) = match segments.split_last() {
            Some(split) => split,
            None => return Err(QueryExpressionError::MalformedPath(dotted.to_owned())),
        };

        let mut template = self.clone();
        for hop in hops {
            let found = template.model.find_member(&template.type_name, hop);
            template = match found.map(|m| m.descriptor.kind) {
                Some(MemberKind::Association) => {
                    let association = template.association(hop)?;
                    template.model.template_for(&association)?
                }
                Some(MemberKind::Property) => {
                    let property = template.property(hop)?;
                    template.model.template_for_value(&property)?
                }
                Some(_) => return Err(QueryExpressionError::NotTraversable(template.describe(hop))),
                None => {
                    return Err(QueryExpressionError::UnknownMember {
                        type_name: template.type_name.clone(),
                        member: (*hop).to_owned(),
                    })
                }
            };
        }

        let kind = template
            .model
            .find_member(&template.type_name, last)
            .map(|m| m.descriptor.kind)
            .unwrap_or(MemberKind::Property);
        Ok(match kind {
            MemberKind::Property => AnyPath::Property(template.property(last)?),
            MemberKind::Association => AnyPath::Association(template.association(last)?),
            MemberKind::ManyAssociation => {
                AnyPath::ManyAssociation(template.many_association(last)?)
            }
            MemberKind::NamedAssociation => {
                AnyPath::NamedAssociation(template.named_association(last)?)
            }
        })
    }

    /// Resolves a dotted path that must end in a property.
    pub fn path(&self, dotted: &str) -> Result<PropertyPath> {
        match self.resolve(dotted)? {
            AnyPath::Property(path) => Ok(path),
            other => Err(wrong_terminal(&other, MemberKind::Property)),
        }
    }
}

fn wrong_terminal(path: &AnyPath, expected: MemberKind) -> QueryExpressionError {
    let (member, found) = match path {
        AnyPath::Property(p) => (p.qualified_name().clone(), MemberKind::Property),
        AnyPath::Association(p) => (p.qualified_name().clone(), MemberKind::Association),
        AnyPath::ManyAssociation(p) => (p.qualified_name().clone(), MemberKind::ManyAssociation),
        AnyPath::NamedAssociation(p) => (p.qualified_name().clone(), MemberKind::NamedAssociation),
    };
    QueryExpressionError::WrongAccessorKind {
        member,
        found,
        expected,
    }
}

impl AnyPath {
    /// Requires an association terminal.
    pub fn into_association(self) -> Result<AssociationPath> {
        match self {
            AnyPath::Association(path) => Ok(path),
            other => Err(wrong_terminal(&other, MemberKind::Association)),
        }
    }

    /// Requires a many-association terminal.
    pub fn into_many_association(self) -> Result<ManyAssociationPath> {
        match self {
            AnyPath::ManyAssociation(path) => Ok(path),
            other => Err(wrong_terminal(&other, MemberKind::ManyAssociation)),
        }
    }

    /// Requires a named-association terminal.
    pub fn into_named_association(self) -> Result<NamedAssociationPath> {
        match self {
            AnyPath::NamedAssociation(path) => Ok(path),
            other => Err(wrong_terminal(&other, MemberKind::NamedAssociation)),
        }
    }
}

macro_rules! operand_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Operand::Literal(Value::from(value))
                }
            }
        )*
    };
}

operand_from!(bool, i32, i64, f64, &str, String, EntityReference);

/// Variable operand bound when the query runs.
pub fn variable(name: impl Into<String>) -> Operand {
    Operand::Variable(name.into())
}

/// Comparison with any operator. Literals must be non-null and of the
/// property's declared category; ordering operators also reject literals
/// without a total order.
pub fn compare(op: CompareOp, path: &PropertyPath, operand: impl Into<Operand>) -> Result<Expr> {
    let operand = operand.into();
    if let Operand::Literal(value) = &operand {
        check_literal(path, value)?;
        if op.is_ordering() && !value.is_orderable() {
            return Err(QueryExpressionError::NotOrderable(value.to_string()));
        }
    }
    Ok(Expr::Comparison {
        op,
        path: path.clone(),
        operand,
    })
}

fn check_literal(path: &PropertyPath, value: &Value) -> Result<()> {
    if value.is_null() {
        return Err(QueryExpressionError::NullOperand(path.to_string()));
    }
    match &path.accessor().value_type {
        Some(expected) if !expected.compares_with(value) => {
            Err(QueryExpressionError::TypeMismatch {
                path: path.to_string(),
                expected: expected.clone(),
                found: value.to_string(),
            })
        }
        _ => Ok(()),
    }
}

/// `path = operand`.
pub fn eq(path: &PropertyPath, operand: impl Into<Operand>) -> Result<Expr> {
    compare(CompareOp::Eq, path, operand)
}

/// `path != operand`.
pub fn ne(path: &PropertyPath, operand: impl Into<Operand>) -> Result<Expr> {
    compare(CompareOp::Ne, path, operand)
}

/// `path < operand`.
pub fn lt(path: &PropertyPath, operand: impl Into<Operand>) -> Result<Expr> {
    compare(CompareOp::Lt, path, operand)
}

/// `path <= operand`.
pub fn le(path: &PropertyPath, operand: impl Into<Operand>) -> Result<Expr> {
    compare(CompareOp::Le, path, operand)
}

/// `path > operand`.
pub fn gt(path: &PropertyPath, operand: impl Into<Operand>) -> Result<Expr> {
    compare(CompareOp::Gt, path, operand)
}

/// `path >= operand`.
pub fn ge(path: &PropertyPath, operand: impl Into<Operand>) -> Result<Expr> {
    compare(CompareOp::Ge, path, operand)
}

/// The association's target has the given identity.
pub fn eq_association(path: &AssociationPath, target: impl Into<EntityReference>) -> Expr {
    let identity = PropertyPath::from_node(PathNode::new(
        Some(Arc::clone(path.node())),
        Accessor::identity(),
    ));
    Expr::Comparison {
        op: CompareOp::Eq,
        path: identity,
        operand: Operand::Literal(Value::String(target.into().identity().to_owned())),
    }
}

/// `path is null`.
pub fn is_null(path: &PropertyPath) -> Expr {
    Expr::PropertyNull {
        path: path.clone(),
        is_null: true,
    }
}

/// `path is not null`.
pub fn is_not_null(path: &PropertyPath) -> Expr {
    Expr::PropertyNull {
        path: path.clone(),
        is_null: false,
    }
}

/// Association is null.
pub fn association_is_null(path: &AssociationPath) -> Expr {
    Expr::AssociationNull {
        path: path.clone(),
        is_null: true,
    }
}

/// Association is not null.
pub fn association_is_not_null(path: &AssociationPath) -> Expr {
    Expr::AssociationNull {
        path: path.clone(),
        is_null: false,
    }
}

fn require_collection(path: &PropertyPath) -> Result<()> {
    if path.accessor().collection_depth() == 0 {
        return Err(QueryExpressionError::NotACollection(path.to_string()));
    }
    Ok(())
}

/// Collection property contains `operand`.
pub fn contains(path: &PropertyPath, operand: impl Into<Operand>) -> Result<Expr> {
    require_collection(path)?;
    Ok(Expr::Contains {
        path: path.clone(),
        operand: operand.into(),
    })
}

/// Collection property contains every operand.
pub fn contains_all<I, O>(path: &PropertyPath, operands: I) -> Result<Expr>
where
    I: IntoIterator<Item = O>,
    O: Into<Operand>,
{
    require_collection(path)?;
    Ok(Expr::ContainsAll {
        path: path.clone(),
        operands: operands.into_iter().map(Into::into).collect(),
    })
}

/// Many-association contains the entity.
pub fn contains_entity(path: &ManyAssociationPath, operand: impl Into<Operand>) -> Expr {
    Expr::ManyAssociationContains {
        path: path.clone(),
        operand: operand.into(),
    }
}

/// Named-association contains the entity under some name.
pub fn contains_named_entity(path: &NamedAssociationPath, operand: impl Into<Operand>) -> Expr {
    Expr::NamedAssociationContains {
        path: path.clone(),
        operand: operand.into(),
    }
}

/// Named-association has an entry called `name`.
pub fn contains_name(path: &NamedAssociationPath, name: impl Into<Operand>) -> Expr {
    Expr::NamedAssociationContainsName {
        path: path.clone(),
        name: name.into(),
    }
}

fn require_string(path: &PropertyPath) -> Result<()> {
    if path.accessor().value_type != Some(ValueType::String) {
        return Err(QueryExpressionError::NotAString(path.to_string()));
    }
    Ok(())
}

/// String property matches `regex` in full.
pub fn matches(path: &PropertyPath, regex: &str) -> Result<Expr> {
    require_string(path)?;
    let pattern = Pattern::new(regex).map_err(|err| QueryExpressionError::InvalidRegex {
        pattern: regex.to_owned(),
        reason: err.to_string(),
    })?;
    Ok(Expr::Matches {
        path: path.clone(),
        pattern: MatchPattern::Regex(pattern),
    })
}

/// String property matches the pattern held by a variable.
pub fn matches_variable(path: &PropertyPath, name: impl Into<String>) -> Result<Expr> {
    require_string(path)?;
    Ok(Expr::Matches {
        path: path.clone(),
        pattern: MatchPattern::Variable(name.into()),
    })
}

/// `left and right`.
pub fn and(left: Expr, right: Expr) -> Expr {
    left.and(right)
}

/// `left or right`.
pub fn or(left: Expr, right: Expr) -> Expr {
    left.or(right)
}

/// Negation.
pub fn not(expr: Expr) -> Expr {
    !expr
}

/// Query text for an external engine.
pub fn native(language: impl Into<String>, query: impl Into<String>) -> Expr {
    Expr::Native {
        language: language.into(),
        query: query.into(),
    }
}

/// Order-by segment.
pub fn order_by(path: &PropertyPath, direction: Direction) -> OrderBy {
    OrderBy {
        path: path.clone(),
        direction,
    }
}
