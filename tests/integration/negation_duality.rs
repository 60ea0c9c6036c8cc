#![allow(missing_docs)]

mod support;

use std::collections::{BTreeMap, BTreeSet};

use entity_query::model::EntityDocument;
use entity_query::query::builder::{
    association_is_null, compare, contains_entity, eq, is_null, variable, Template,
};
use entity_query::query::{CollectionEntityFinder, CompareOp, EntityFinderError, PropertyPath};
use entity_query::sql::{Dialect, SqlQueryError};
use entity_query::{EntityReference, Expr, Query, TypeModel, Value};
use proptest::prelude::*;
use serde_json::json;
use support::{model, sorted, sql_finder};

const NAMES: [&str; 3] = ["Ann", "Bob", "Cid"];

#[derive(Debug, Clone)]
struct PersonSeed {
    age: Option<i64>,
    name: Option<usize>,
    spouse: Option<usize>,
    friends: BTreeSet<usize>,
}

#[derive(Debug, Clone)]
enum Leaf {
    Age(CompareOp, i64),
    AgeBetween(CompareOp, i64),
    Name(usize),
    AgeNull,
    SpouseNull,
    SpouseAge(CompareOp, i64),
    HasFriend(usize),
}

/// Operands a SQL column cannot compare the way values compare in memory.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Unencodable {
    Null,
    TextForAge,
    NumberForName,
    NanForAge,
    ListForAge,
    Address,
}

#[derive(Debug, Clone)]
enum Tree {
    Leaf(Leaf),
    Not(Box<Tree>),
    And(Vec<Tree>),
    Or(Vec<Tree>),
}

fn arb_op() -> impl Strategy<Value = CompareOp> {
    prop_oneof![
        Just(CompareOp::Eq),
        Just(CompareOp::Ne),
        Just(CompareOp::Lt),
        Just(CompareOp::Le),
        Just(CompareOp::Gt),
        Just(CompareOp::Ge),
    ]
}

fn arb_people() -> impl Strategy<Value = Vec<PersonSeed>> {
    (1usize..=6).prop_flat_map(|n| {
        prop::collection::vec(
            (
                prop::option::of(0i64..40),
                prop::option::of(0..NAMES.len()),
                prop::option::of(0..n),
                prop::collection::btree_set(0..n, 0..=n),
            )
                .prop_map(|(age, name, spouse, friends)| PersonSeed {
                    age,
                    name,
                    spouse,
                    friends,
                }),
            n,
        )
    })
}

fn arb_leaf() -> impl Strategy<Value = Leaf> {
    prop_oneof![
        (arb_op(), 0i64..40).prop_map(|(op, v)| Leaf::Age(op, v)),
        (arb_op(), 0i64..40).prop_map(|(op, v)| Leaf::AgeBetween(op, v)),
        (0..NAMES.len()).prop_map(Leaf::Name),
        Just(Leaf::AgeNull),
        Just(Leaf::SpouseNull),
        (arb_op(), 0i64..40).prop_map(|(op, v)| Leaf::SpouseAge(op, v)),
        (0usize..6).prop_map(Leaf::HasFriend),
    ]
}

fn arb_unencodable() -> impl Strategy<Value = Unencodable> {
    prop_oneof![
        Just(Unencodable::Null),
        Just(Unencodable::TextForAge),
        Just(Unencodable::NumberForName),
        Just(Unencodable::NanForAge),
        Just(Unencodable::ListForAge),
        Just(Unencodable::Address),
    ]
}

fn arb_tree() -> impl Strategy<Value = Tree> {
    arb_leaf().prop_map(Tree::Leaf).prop_recursive(3, 12, 3, |inner| {
        prop_oneof![
            inner.clone().prop_map(|t| Tree::Not(Box::new(t))),
            prop::collection::vec(inner.clone(), 2..=3).prop_map(Tree::And),
            prop::collection::vec(inner, 2..=3).prop_map(Tree::Or),
        ]
    })
}

fn identity(index: usize) -> String {
    format!("p{index}")
}

fn documents(people: &[PersonSeed]) -> Vec<EntityDocument> {
    people
        .iter()
        .enumerate()
        .map(|(i, seed)| {
            let mut properties = BTreeMap::new();
            if let Some(age) = seed.age {
                properties.insert("age".to_owned(), json!(age));
            }
            if let Some(name) = seed.name {
                properties.insert("name".to_owned(), json!(NAMES[name]));
            }
            EntityDocument {
                type_name: "Person".to_owned(),
                identity: identity(i),
                properties,
                associations: BTreeMap::from([("spouse".to_owned(), seed.spouse.map(identity))]),
                many_associations: BTreeMap::from([(
                    "friends".to_owned(),
                    seed.friends.iter().copied().map(identity).collect(),
                )]),
                named_associations: BTreeMap::new(),
            }
        })
        .collect()
}

fn leaf_expr(leaf: &Leaf, person: &Template<'_>) -> Expr {
    let age = person.property("age").unwrap();
    match leaf {
        Leaf::Age(op, v) => compare(*op, &age, *v).unwrap(),
        Leaf::AgeBetween(op, v) => compare(*op, &age, *v as f64 + 0.5).unwrap(),
        Leaf::Name(i) => eq(&person.property("name").unwrap(), NAMES[*i]).unwrap(),
        Leaf::AgeNull => is_null(&age),
        Leaf::SpouseNull => association_is_null(&person.association("spouse").unwrap()),
        Leaf::SpouseAge(op, v) => compare(*op, &person.path("spouse.age").unwrap(), *v).unwrap(),
        Leaf::HasFriend(i) => contains_entity(
            &person.many_association("friends").unwrap(),
            EntityReference::new(identity(*i)),
        ),
    }
}

fn unencodable_operand(
    kind: Unencodable,
    model: &TypeModel,
    person: &Template<'_>,
) -> (PropertyPath, Value) {
    let age = person.property("age").unwrap();
    match kind {
        Unencodable::Null => (age, Value::Null),
        Unencodable::TextForAge => (age, Value::from("30")),
        Unencodable::NumberForName => (person.property("name").unwrap(), Value::Int(5)),
        Unencodable::NanForAge => (age, Value::Float(f64::NAN)),
        Unencodable::ListForAge => (age, Value::from(vec![30i64])),
        Unencodable::Address => {
            let paris = model.new_value("Address").unwrap().with("city", "Paris").unwrap();
            (person.property("address").unwrap(), Value::from(paris))
        }
    }
}

fn to_expr(tree: &Tree, person: &Template<'_>) -> Expr {
    match tree {
        Tree::Leaf(leaf) => leaf_expr(leaf, person),
        Tree::Not(inner) => !to_expr(inner, person),
        Tree::And(parts) => Expr::And(parts.iter().map(|p| to_expr(p, person)).collect()),
        Tree::Or(parts) => Expr::Or(parts.iter().map(|p| to_expr(p, person)).collect()),
    }
}

struct World {
    model: TypeModel,
    memory: CollectionEntityFinder,
    sql: entity_query::sql::SqlEntityFinder,
}

fn world(people: &[PersonSeed]) -> World {
    let model = model();
    let entities = model.build_entities(&documents(people)).unwrap();
    let sql = sql_finder(&model, &entities, Dialect::Sqlite);
    let memory = CollectionEntityFinder::new(model.clone(), entities);
    World { model, memory, sql }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_engines_agree_and_negation_complements(people in arb_people(), tree in arb_tree()) {
        let world = world(&people);
        let person = world.model.template("Person").unwrap();
        let expr = to_expr(&tree, &person);

        let everyone: BTreeSet<String> = sorted(Query::new("Person").find(&world.sql).unwrap())
            .into_iter()
            .collect();
        prop_assert_eq!(everyone.len(), people.len());

        let positive = Query::new("Person").filter(expr.clone());
        let negative = Query::new("Person").filter(!expr);

        let sql_pos: BTreeSet<String> = sorted(positive.find(&world.sql).unwrap()).into_iter().collect();
        let sql_neg: BTreeSet<String> = sorted(negative.find(&world.sql).unwrap()).into_iter().collect();
        let mem_pos: BTreeSet<String> = sorted(positive.find(&world.memory).unwrap()).into_iter().collect();

        prop_assert_eq!(&sql_pos, &mem_pos);
        prop_assert!(sql_pos.is_disjoint(&sql_neg));
        let union: BTreeSet<String> = sql_pos.union(&sql_neg).cloned().collect();
        prop_assert_eq!(union, everyone);
        prop_assert_eq!(positive.count(&world.sql).unwrap(), sql_pos.len() as u64);
    }

    #[test]
    fn prop_unencodable_operands_are_rejected(op in arb_op(), kind in arb_unencodable()) {
        let world = world(&[]);
        let person = world.model.template("Person").unwrap();
        let (path, value) = unencodable_operand(kind, &world.model, &person);

        // Only a structural composite literal of the declared type gets past the builder.
        let mut candidates = Vec::new();
        if let Ok(expr) = compare(op, &path, value.clone()) {
            prop_assert_eq!(kind, Unencodable::Address);
            candidates.push(Query::new("Person").filter(expr));
        }
        let by_variable = compare(op, &path, variable("v")).unwrap();
        for expr in [by_variable.clone(), !by_variable] {
            candidates.push(Query::new("Person").filter(expr).set_variable("v", value.clone()));
        }

        for query in candidates {
            let err = query.find(&world.sql).unwrap_err();
            prop_assert!(
                matches!(err, EntityFinderError::Compile(SqlQueryError::Unsupported(_))),
                "{:?} compiled for {:?}", query, kind
            );
            prop_assert!(query.count(&world.sql).is_err());
        }
    }

    #[test]
    fn prop_nested_and_flat_conjunctions_agree(
        people in arb_people(),
        leaves in prop::collection::vec(arb_leaf(), 3),
    ) {
        let world = world(&people);
        let person = world.model.template("Person").unwrap();
        let [a, b, c] = [0, 1, 2].map(|i| leaf_expr(&leaves[i], &person));

        let flat = Query::new("Person").filter(a.clone().and(b.clone()).and(c.clone()));
        let nested = Query::new("Person").filter(Expr::And(vec![a, Expr::And(vec![b, c])]));

        prop_assert_eq!(
            sorted(flat.find(&world.sql).unwrap()),
            sorted(nested.find(&world.sql).unwrap())
        );
        prop_assert_eq!(
            sorted(flat.find(&world.sql).unwrap()),
            sorted(flat.find(&world.memory).unwrap())
        );
    }
}
