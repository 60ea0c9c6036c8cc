#![forbid(unsafe_code)]

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use entity_query::model::{CompositeDescriptor, MemberDescriptor, ValueType};
use entity_query::query::builder::{contains_entity, eq, ge, is_null, lt, order_by};
use entity_query::query::Direction;
use entity_query::sql::{Dialect, IndexingState, SqlEntityFinder, SqlIndexer, SqlQueryParser};
use entity_query::{EntityReference, Expr, Query, TypeModel};
use parking_lot::Mutex;
use rusqlite::Connection;

const PEOPLE: usize = 2_048;

fn people_model() -> TypeModel {
    TypeModel::from_descriptors([
        CompositeDescriptor::entity("Person")
            .member(MemberDescriptor::property("name", ValueType::String))
            .member(MemberDescriptor::property("age", ValueType::Int))
            .member(MemberDescriptor::association("spouse", "Person"))
            .member(MemberDescriptor::many_association("friends", "Person")),
    ])
    .expect("valid model")
}

fn wide_filter(model: &TypeModel) -> Expr {
    let person = model.template("Person").expect("template");
    let age = person.property("age").expect("age");
    let name = person.property("name").expect("name");
    let spouse_age = person.path("spouse.age").expect("spouse.age");
    let friends = person.many_association("friends").expect("friends");
    (ge(&age, 30).expect("ge").and(!eq(&name, "p7").expect("eq")))
        .or(lt(&spouse_age, 20).expect("lt").and(is_null(&name)))
        .or(!contains_entity(&friends, EntityReference::new("p1")))
}

fn compile(c: &mut Criterion) {
    let model = people_model();
    let layout = Arc::new(IndexingState::from_model(&model, "main"));
    let parser = SqlQueryParser::new(layout, Dialect::Sqlite);
    let age = model
        .template("Person")
        .and_then(|t| t.property("age"))
        .expect("age");
    let query = Query::new("Person")
        .filter(wide_filter(&model))
        .order_by(order_by(&age, Direction::Asc));

    let mut group = c.benchmark_group("compile");
    group.throughput(Throughput::Elements(1));
    group.bench_function("wide_filter", |b| {
        b.iter(|| black_box(parser.compile(black_box(&query), false).expect("compile")));
    });
    group.bench_function("wide_filter_count", |b| {
        b.iter(|| black_box(parser.compile(black_box(&query), true).expect("compile")));
    });
    group.finish();
}

fn execute(c: &mut Criterion) {
    let model = people_model();
    let layout = Arc::new(IndexingState::from_model(&model, "main"));
    let mut entities = Vec::with_capacity(PEOPLE);
    for i in 0..PEOPLE {
        let mut person = model
            .new_entity("Person", format!("p{i}"))
            .and_then(|p| p.with("name", format!("p{i}")))
            .and_then(|p| p.with("age", (i % 90) as i64))
            .expect("person");
        if let Some(previous) = entities.last() {
            person = person
                .with_association("spouse", Some(previous))
                .and_then(|p| p.with_many("friends", std::slice::from_ref(previous)))
                .expect("links");
        }
        entities.push(Arc::new(person));
    }

    let mut conn = Connection::open_in_memory().expect("in-memory db");
    let indexer = SqlIndexer::new(Arc::clone(&layout));
    indexer.create_schema(&conn).expect("schema");
    indexer.index(&mut conn, &entities).expect("index");
    let finder = SqlEntityFinder::new(
        Arc::new(Mutex::new(conn)),
        SqlQueryParser::new(layout, Dialect::Sqlite),
    );
    let query = Query::new("Person").filter(wide_filter(&model)).max_results(100);

    let mut group = c.benchmark_group("execute");
    group.sample_size(30);
    group.throughput(Throughput::Elements(PEOPLE as u64));
    group.bench_function("find_first_100", |b| {
        b.iter(|| black_box(query.find(&finder).expect("find")));
    });
    group.bench_function("count", |b| {
        b.iter(|| black_box(query.count(&finder).expect("count")));
    });
    group.finish();
}

criterion_group!(benches, compile, execute);
criterion_main!(benches);
