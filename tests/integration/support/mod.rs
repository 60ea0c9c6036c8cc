#![allow(dead_code)]

use std::sync::Arc;

use entity_query::model::EntityState;
use entity_query::query::CollectionEntityFinder;
use entity_query::sql::{Dialect, IndexingState, SqlEntityFinder, SqlIndexer, SqlQueryParser};
use entity_query::{EntityReference, TypeModel};
use parking_lot::Mutex;
use rusqlite::Connection;

pub const MODEL: &str = r#"
[[types]]
name = "Nameable"
kind = "mixin"

[[types.members]]
name = "name"
value_type = "string"

[[types]]
name = "Address"
kind = "value"

[[types.members]]
name = "street"
value_type = "string"

[[types.members]]
name = "city"
value_type = "string"

[[types]]
name = "Person"
kind = "entity"
extends = ["Nameable"]

[[types.members]]
name = "age"
value_type = "int"

[[types.members]]
name = "address"
value_type = { composite = "Address" }

[[types.members]]
name = "tags"
value_type = { collection = "string" }

[[types.members]]
name = "spouse"
kind = "association"
target = "Person"

[[types.members]]
name = "friends"
kind = "many_association"
target = "Person"

[[types.members]]
name = "pets"
kind = "named_association"
target = "Pet"

[[types]]
name = "Employee"
kind = "entity"
extends = ["Person"]

[[types]]
name = "Pet"
kind = "entity"
extends = ["Nameable"]
"#;

pub const ENTITIES: &str = r#"[
  {"type": "Person", "identity": "alice",
   "properties": {"name": "Alice", "age": 30, "tags": ["a", "b"],
                  "address": {"street": "Main", "city": "Oslo"}},
   "associations": {"spouse": "bob"},
   "manyAssociations": {"friends": ["bob", "carol"]},
   "namedAssociations": {"pets": {"dog": "rex"}}},
  {"type": "Employee", "identity": "bob",
   "properties": {"name": "Bob", "age": 25},
   "associations": {"spouse": "alice"}},
  {"type": "Person", "identity": "carol",
   "properties": {"name": "Carol"}},
  {"type": "Pet", "identity": "rex",
   "properties": {"name": "Rex"}}
]"#;

pub fn model() -> TypeModel {
    TypeModel::from_toml(MODEL).expect("model parses")
}

/// Indexes `entities` into a fresh in-memory database.
pub fn sql_finder(model: &TypeModel, entities: &[Arc<EntityState>], dialect: Dialect) -> SqlEntityFinder {
    let layout = Arc::new(IndexingState::from_model(model, "main"));
    let mut conn = Connection::open_in_memory().expect("open in-memory db");
    let indexer = SqlIndexer::new(Arc::clone(&layout));
    indexer.create_schema(&conn).expect("create schema");
    indexer.index(&mut conn, entities).expect("index entities");
    SqlEntityFinder::new(Arc::new(Mutex::new(conn)), SqlQueryParser::new(layout, dialect))
}

/// The sample people loaded into both finders.
pub fn engines() -> (TypeModel, CollectionEntityFinder, SqlEntityFinder) {
    let model = model();
    let entities = model.load_entities(ENTITIES).expect("entities load");
    let sql = sql_finder(&model, &entities, Dialect::Sqlite);
    let memory = CollectionEntityFinder::new(model.clone(), entities);
    (model, memory, sql)
}

pub fn ids(found: Vec<EntityReference>) -> Vec<String> {
    found.into_iter().map(|r| r.identity().to_owned()).collect()
}

pub fn sorted(found: Vec<EntityReference>) -> Vec<String> {
    let mut ids = ids(found);
    ids.sort();
    ids
}
