//! Table and column names of the SQL index.

/// Table holding one row per indexed entity.
pub const ENTITY_TABLE: &str = "entities";
/// Primary key of the entity table.
pub const ENTITY_PK: &str = "entity_pk";
/// Identity string column of the entity table.
pub const ENTITY_IDENTITY: &str = "entity_identity";
/// Entity type key column of the entity table.
pub const ENTITY_TYPE_FK: &str = "entity_type_id";

/// Table listing indexed entity types.
pub const ENTITY_TYPES_TABLE: &str = "entity_types";
/// Primary key of the entity types table.
pub const ENTITY_TYPE_PK: &str = "entity_type_id";
/// Type name column of the entity types table.
pub const ENTITY_TYPE_NAME: &str = "entity_type_name";

/// Primary key of every qualified-name table row.
pub const QNAME_ID: &str = "qname_id";
/// Row of the enclosing value composite, null for top-level members.
pub const PARENT_QNAME: &str = "parent_qname";
/// Scalar value, or target entity key for associations.
pub const QNAME_VALUE: &str = "qname_value";
/// Position inside a many-association.
pub const ASSOCIATION_INDEX: &str = "association_index";
/// Entry name inside a named-association.
pub const ASSOCIATION_NAME: &str = "association_name";
/// Prefix of per-level collection index columns.
pub const COLLECTION_INDEX_PREFIX: &str = "collection_index_";

/// Name of the collection index column for nesting `level` (1-based).
pub fn collection_index(level: usize) -> String {
    format!("{COLLECTION_INDEX_PREFIX}{level}")
}

/// Lowercase identifier usable as part of a table name.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_columns_are_one_based() {
        assert_eq!(collection_index(1), "collection_index_1");
    }

    #[test]
    fn sanitize_lowercases_and_replaces_symbols() {
        assert_eq!(sanitize("Person.Name-2"), "person_name_2");
    }
}
