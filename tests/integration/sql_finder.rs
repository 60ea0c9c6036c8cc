#![allow(missing_docs)]

mod support;

use entity_query::query::builder::{
    association_is_null, contains_entity, contains_name, contains_named_entity, eq,
    eq_association, ge, gt, is_not_null, is_null, lt, matches, ne, order_by, variable,
};
use entity_query::query::{Direction, EntityFinderError};
use entity_query::sql::{Dialect, SqlQueryError};
use entity_query::{EntityFinder, EntityReference, Query, Value};
use support::{engines, ids, model, sorted, sql_finder, ENTITIES};

fn both(query: &Query) -> Vec<String> {
    let (_, memory, sql) = engines();
    let expected = sorted(query.find(&memory).expect("memory find"));
    let actual = sorted(query.find(&sql).expect("sql find"));
    assert_eq!(actual, expected, "engines disagree on {query:?}");
    actual
}

#[test]
fn comparison_and_its_negation_partition_people() {
    let model = model();
    let person = model.template("Person").unwrap();
    let age = person.property("age").unwrap();

    let older = Query::new("Person").filter(ge(&age, 28).unwrap());
    assert_eq!(both(&older), ["alice"]);

    // carol has no age; the negation still selects her
    let younger = Query::new("Person").filter(!ge(&age, 28).unwrap());
    assert_eq!(both(&younger), ["bob", "carol"]);
}

#[test]
fn conjunction_and_disjunction() {
    let model = model();
    let person = model.template("Person").unwrap();
    let age = person.property("age").unwrap();
    let name = person.property("name").unwrap();

    let query =
        Query::new("Person").filter(ge(&age, 28).unwrap().and(eq(&name, "Alice").unwrap()));
    assert_eq!(both(&query), ["alice"]);

    let query =
        Query::new("Person").filter(lt(&age, 26).unwrap().or(eq(&name, "Alice").unwrap()));
    assert_eq!(both(&query), ["alice", "bob"]);

    let query =
        Query::new("Person").filter(!(lt(&age, 26).unwrap().or(eq(&name, "Alice").unwrap())));
    assert_eq!(both(&query), ["carol"]);
}

#[test]
fn result_type_includes_subtypes_only() {
    let (_, memory, sql) = engines();
    assert_eq!(sorted(Query::new("Employee").find(&sql).unwrap()), ["bob"]);
    assert_eq!(
        sorted(Query::new("Person").find(&sql).unwrap()),
        sorted(Query::new("Person").find(&memory).unwrap())
    );
    assert_eq!(sql.count_entities(&Query::new("Pet")).unwrap(), 1);
}

#[test]
fn ordering_puts_nulls_first_and_paging_slices() {
    let (model, memory, sql) = engines();
    let age = model.template("Person").unwrap().property("age").unwrap();
    let ordered = Query::new("Person").order_by(order_by(&age, Direction::Asc));

    assert_eq!(ids(ordered.find(&sql).unwrap()), ["carol", "bob", "alice"]);
    assert_eq!(ids(ordered.find(&memory).unwrap()), ["carol", "bob", "alice"]);

    let page = ordered.clone().first_result(1).max_results(1);
    assert_eq!(ids(page.find(&sql).unwrap()), ["bob"]);
    assert_eq!(
        page.find_one(&sql).unwrap(),
        Some(EntityReference::new("bob"))
    );

    let empty = ordered.clone().max_results(0);
    assert!(empty.find(&sql).unwrap().is_empty());
    assert_eq!(empty.find_one(&sql).unwrap(), Some(EntityReference::new("carol")));

    let descending = Query::new("Person").order_by(order_by(&age, Direction::Desc));
    assert_eq!(ids(descending.find(&sql).unwrap()), ["alice", "bob", "carol"]);
}

#[test]
fn count_ignores_paging() {
    let (model, _, sql) = engines();
    let age = model.template("Person").unwrap().property("age").unwrap();
    let query = Query::new("Person")
        .filter(is_not_null(&age))
        .first_result(1)
        .max_results(1);
    assert_eq!(query.count(&sql).unwrap(), 2);
}

#[test]
fn null_checks_on_absent_rows() {
    let model = model();
    let person = model.template("Person").unwrap();
    let age = person.property("age").unwrap();
    let address = person.property("address").unwrap();
    let spouse = person.association("spouse").unwrap();

    assert_eq!(both(&Query::new("Person").filter(is_null(&age))), ["carol"]);
    assert_eq!(both(&Query::new("Person").filter(is_not_null(&age))), ["alice", "bob"]);
    assert_eq!(both(&Query::new("Person").filter(is_not_null(&address))), ["alice"]);
    assert_eq!(
        both(&Query::new("Person").filter(association_is_null(&spouse))),
        ["carol"]
    );
    assert_eq!(
        both(&Query::new("Person").filter(!association_is_null(&spouse))),
        ["alice", "bob"]
    );
}

#[test]
fn traversal_through_associations_and_value_composites() {
    let model = model();
    let person = model.template("Person").unwrap();
    let spouse_name = person.path("spouse.name").unwrap();
    let city = person.path("address.city").unwrap();
    let spouse = person.association("spouse").unwrap();

    assert_eq!(both(&Query::new("Person").filter(eq(&spouse_name, "Bob").unwrap())), ["alice"]);
    assert_eq!(
        both(&Query::new("Person").filter(!eq(&spouse_name, "Bob").unwrap())),
        ["bob", "carol"]
    );
    assert_eq!(both(&Query::new("Person").filter(eq(&city, "Oslo").unwrap())), ["alice"]);
    assert_eq!(
        both(&Query::new("Person").filter(eq_association(&spouse, "alice"))),
        ["bob"]
    );
}

#[test]
fn membership_and_its_negation() {
    let model = model();
    let person = model.template("Person").unwrap();
    let friends = person.many_association("friends").unwrap();
    let pets = person.named_association("pets").unwrap();

    let has_carol = contains_entity(&friends, EntityReference::new("carol"));
    assert_eq!(both(&Query::new("Person").filter(has_carol.clone())), ["alice"]);
    assert_eq!(both(&Query::new("Person").filter(!has_carol)), ["bob", "carol"]);

    let has_rex = contains_named_entity(&pets, EntityReference::new("rex"));
    assert_eq!(both(&Query::new("Person").filter(has_rex)), ["alice"]);

    assert_eq!(both(&Query::new("Person").filter(contains_name(&pets, "dog"))), ["alice"]);
    assert_eq!(
        both(&Query::new("Person").filter(!contains_name(&pets, "cat"))),
        ["alice", "bob", "carol"]
    );
}

#[test]
fn variables_bind_at_execution() {
    let model = model();
    let name = model.template("Person").unwrap().property("name").unwrap();
    let query = Query::new("Person")
        .filter(eq(&name, variable("who")).unwrap())
        .set_variable("who", "Bob");
    assert_eq!(both(&query), ["bob"]);

    let (_, _, sql) = engines();
    let unbound = Query::new("Person").filter(eq(&name, variable("who")).unwrap());
    let err = unbound.find(&sql).unwrap_err();
    assert!(matches!(
        err,
        EntityFinderError::Compile(SqlQueryError::UnboundVariable(ref name)) if name == "who"
    ));
}

#[test]
fn literals_without_a_column_encoding_are_rejected() {
    let (model, memory, sql) = engines();
    let person = model.template("Person").unwrap();
    let age = person.property("age").unwrap();
    let name = person.property("name").unwrap();
    let address = person.property("address").unwrap();

    assert_eq!(ne(&age, Value::Null).unwrap_err().code(), "NullOperand");
    assert_eq!(eq(&age, Value::Null).unwrap_err().code(), "NullOperand");
    assert_eq!(gt(&name, 5).unwrap_err().code(), "TypeMismatch");

    let paris = model.new_value("Address").unwrap().with("city", "Paris").unwrap();
    let structural = Query::new("Person").filter(eq(&address, Value::from(paris)).unwrap());
    assert!(structural.find(&memory).unwrap().is_empty());
    assert!(matches!(
        structural.find(&sql).unwrap_err(),
        EntityFinderError::Compile(SqlQueryError::Unsupported(_))
    ));

    let by_variable = eq(&age, variable("v")).unwrap();
    for value in [Value::Null, Value::from("thirty")] {
        for expr in [by_variable.clone(), !by_variable.clone()] {
            let query = Query::new("Person").filter(expr).set_variable("v", value.clone());
            assert!(matches!(
                query.find(&sql).unwrap_err(),
                EntityFinderError::Compile(SqlQueryError::Unsupported(_))
            ));
        }
    }
}

#[test]
fn mixed_numeric_literals_agree() {
    let model = model();
    let age = model.template("Person").unwrap().property("age").unwrap();
    assert_eq!(both(&Query::new("Person").filter(eq(&age, 30.0).unwrap())), ["alice"]);
    assert_eq!(both(&Query::new("Person").filter(lt(&age, 27.5).unwrap())), ["bob"]);
    assert_eq!(
        both(&Query::new("Person").filter(!lt(&age, 27.5).unwrap())),
        ["alice", "carol"]
    );
}

#[test]
fn find_one_on_an_empty_page_is_none() {
    let (model, memory, sql) = engines();
    let age = model.template("Person").unwrap().property("age").unwrap();
    let query = Query::new("Person")
        .order_by(order_by(&age, Direction::Asc))
        .max_results(0);
    assert_eq!(query.find_one(&memory).unwrap(), None);
    assert_eq!(query.find_one(&sql).unwrap(), None);
    assert!(query.clone().max_results(1).find_one(&sql).unwrap().is_some());
}

#[test]
fn predicates_without_translation_are_rejected() {
    let (model, memory, sql) = engines();
    let name = model.template("Person").unwrap().property("name").unwrap();
    let query = Query::new("Person").filter(matches(&name, "A.*").unwrap());

    assert_eq!(ids(query.find(&memory).unwrap()), ["alice"]);
    let err = query.find(&sql).unwrap_err();
    assert!(matches!(
        err,
        EntityFinderError::Compile(SqlQueryError::Unsupported(_))
    ));
    assert_eq!(err.code(), "Compile");
}

#[test]
fn unknown_result_type_is_a_compile_error() {
    let (_, _, sql) = engines();
    let err = Query::new("Robot").find(&sql).unwrap_err();
    assert!(matches!(
        err,
        EntityFinderError::Compile(SqlQueryError::UnknownResultType(_))
    ));
}

#[test]
fn reads_do_not_leave_a_transaction_open() {
    let model = model();
    let entities = model.load_entities(ENTITIES).unwrap();
    let finder = sql_finder(&model, &entities, Dialect::Sqlite);
    let age = model.template("Person").unwrap().property("age").unwrap();
    let query = Query::new("Person").filter(ge(&age, 0).unwrap());
    for _ in 0..3 {
        assert_eq!(query.count(&finder).unwrap(), 2);
    }
}
