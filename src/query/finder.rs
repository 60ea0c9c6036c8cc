//! Query descriptions and the finders that execute them.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::model::{Composite, EntityState, TypeModel};
use crate::query::ast::{Direction, Expr, OrderBy, Variables};
use crate::query::errors::EntityFinderError;
use crate::query::value::Value;
use crate::types::EntityReference;

/// Result alias for finder operations.
pub type FinderResult<T> = std::result::Result<T, EntityFinderError>;

/// A filter over one result type with ordering and paging.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Entities assignable to this type are candidates.
    pub result_type: String,
    /// Optional predicate; `None` selects every candidate.
    pub filter: Option<Expr>,
    /// Sort segments applied in order.
    pub order_by: Vec<OrderBy>,
    /// Number of leading results to skip.
    pub first_result: Option<u64>,
    /// Upper bound on returned results; zero or negative yields nothing.
    pub max_results: Option<i64>,
    /// Values for variables referenced by the filter.
    pub variables: Variables,
}

impl Query {
    /// Query selecting every entity assignable to `result_type`.
    pub fn new(result_type: impl Into<String>) -> Self {
        Query {
            result_type: result_type.into(),
            filter: None,
            order_by: Vec::new(),
            first_result: None,
            max_results: None,
            variables: Variables::new(),
        }
    }

    /// Sets the filter.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(expr);
        self
    }

    /// Appends an order-by segment.
    pub fn order_by(mut self, segment: OrderBy) -> Self {
        self.order_by.push(segment);
        self
    }

    /// Skips the first `n` results.
    pub fn first_result(mut self, n: u64) -> Self {
        self.first_result = Some(n);
        self
    }

    /// Returns at most `n` results.
    pub fn max_results(mut self, n: i64) -> Self {
        self.max_results = Some(n);
        self
    }

    /// Binds a variable.
    pub fn set_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// True when paging asks for no rows at all.
    pub fn is_empty_page(&self) -> bool {
        matches!(self.max_results, Some(n) if n <= 0)
    }

    /// Runs the query through `finder`.
    pub fn find(&self, finder: &dyn EntityFinder) -> FinderResult<Vec<EntityReference>> {
        finder.find_entities(self)
    }

    /// First result through `finder`.
    pub fn find_one(&self, finder: &dyn EntityFinder) -> FinderResult<Option<EntityReference>> {
        finder.find_entity(self)
    }

    /// Number of matches through `finder`, ignoring ordering and paging.
    pub fn count(&self, finder: &dyn EntityFinder) -> FinderResult<u64> {
        finder.count_entities(self)
    }
}

/// Executes queries and returns entity references.
pub trait EntityFinder {
    /// Matching entities after ordering and paging.
    fn find_entities(&self, query: &Query) -> FinderResult<Vec<EntityReference>>;

    /// The first matching entity after `first_result`. `None` without a lookup
    /// when `max_results` asks for no rows.
    fn find_entity(&self, query: &Query) -> FinderResult<Option<EntityReference>>;

    /// Number of matching entities.
    fn count_entities(&self, query: &Query) -> FinderResult<u64>;
}

/// Finder evaluating expressions against entities held in memory.
///
/// Supports every predicate kind, including the ones the SQL compiler
/// rejects. Ordering sorts nulls first when ascending.
#[derive(Debug, Clone)]
pub struct CollectionEntityFinder {
    model: TypeModel,
    entities: Vec<Arc<EntityState>>,
}

impl CollectionEntityFinder {
    /// Finder over `entities`, using `model` for subtype checks.
    pub fn new(model: TypeModel, entities: Vec<Arc<EntityState>>) -> Self {
        CollectionEntityFinder { model, entities }
    }

    fn matching(&self, query: &Query) -> FinderResult<Vec<&Arc<EntityState>>> {
        if self.model.descriptor(&query.result_type).is_none() {
            return Err(EntityFinderError::UnknownResultType(query.result_type.clone()));
        }
        Ok(self
            .entities
            .iter()
            .filter(|e| self.model.is_assignable(e.type_name(), &query.result_type))
            .filter(|e| {
                let entity: &EntityState = e;
                match &query.filter {
                    Some(expr) => expr.satisfied_by_with(entity, &query.variables),
                    None => true,
                }
            })
            .collect())
    }
}

fn sort_key(entity: &EntityState, segment: &OrderBy) -> Option<Value> {
    segment.path.map(entity).ok().flatten()
}

fn compare_entities(a: &EntityState, b: &EntityState, order_by: &[OrderBy]) -> Ordering {
    for segment in order_by {
        let ordering = match (sort_key(a, segment), sort_key(b, segment)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.sort_cmp(&y),
        };
        let ordering = match segment.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

impl EntityFinder for CollectionEntityFinder {
    fn find_entities(&self, query: &Query) -> FinderResult<Vec<EntityReference>> {
        if query.is_empty_page() {
            return Ok(Vec::new());
        }
        let mut found = self.matching(query)?;
        found.sort_by(|a, b| compare_entities(a, b, &query.order_by));
        let skip = query.first_result.unwrap_or(0) as usize;
        let take = query.max_results.map_or(usize::MAX, |n| n as usize);
        Ok(found
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|e| e.entity_reference().clone())
            .collect())
    }

    fn find_entity(&self, query: &Query) -> FinderResult<Option<EntityReference>> {
        if query.is_empty_page() {
            return Ok(None);
        }
        let mut found = self.matching(query)?;
        found.sort_by(|a, b| compare_entities(a, b, &query.order_by));
        let skip = query.first_result.unwrap_or(0) as usize;
        Ok(found.get(skip).map(|e| e.entity_reference().clone()))
    }

    fn count_entities(&self, query: &Query) -> FinderResult<u64> {
        Ok(self.matching(query)?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::people;
    use crate::query::builder::*;

    fn finder() -> CollectionEntityFinder {
        let model = people();
        let people = vec![
            ("alice", "Alice", Some(30), "Person"),
            ("bob", "Bob", Some(25), "Person"),
            ("carol", "Carol", None, "Employee"),
        ]
        .into_iter()
        .map(|(id, name, age, ty)| {
            let mut e = model.new_entity(ty, id).unwrap().with("name", name).unwrap();
            if let Some(age) = age {
                e = e.with("age", age).unwrap();
            }
            Arc::new(e)
        })
        .collect();
        CollectionEntityFinder::new(model, people)
    }

    fn ids(refs: Vec<EntityReference>) -> Vec<String> {
        refs.into_iter().map(|r| r.identity().to_owned()).collect()
    }

    #[test]
    fn filters_by_result_type_and_predicate() {
        let finder = finder();
        let model = people();
        let age = model.template("Person").unwrap().property("age").unwrap();

        assert_eq!(Query::new("Person").count(&finder).unwrap(), 3);
        assert_eq!(Query::new("Employee").count(&finder).unwrap(), 1);
        let adults = Query::new("Person").filter(ge(&age, 28).unwrap());
        assert_eq!(ids(adults.find(&finder).unwrap()), vec!["alice"]);
        assert_eq!(
            Query::new("Ghost").count(&finder).unwrap_err().code(),
            "UnknownResultType"
        );
    }

    #[test]
    fn orders_with_nulls_first_and_pages() {
        let finder = finder();
        let model = people();
        let age = model.template("Person").unwrap().property("age").unwrap();

        let by_age = Query::new("Person").order_by(order_by(&age, Direction::Asc));
        assert_eq!(ids(by_age.find(&finder).unwrap()), vec!["carol", "bob", "alice"]);

        let desc = Query::new("Person").order_by(order_by(&age, Direction::Desc));
        assert_eq!(ids(desc.find(&finder).unwrap()), vec!["alice", "bob", "carol"]);

        let page = by_age.clone().first_result(1).max_results(1);
        assert_eq!(ids(page.find(&finder).unwrap()), vec!["bob"]);
        assert!(by_age.clone().max_results(0).find(&finder).unwrap().is_empty());
        assert_eq!(
            by_age.find_one(&finder).unwrap().map(|r| r.identity().to_owned()),
            Some("carol".to_owned())
        );
    }
}
