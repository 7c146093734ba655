//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random documents and names that
//! every backend accepts.

use proptest::prelude::*;
use serde_json::Value;
use tessera_core::{Document, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};

/// Strategy for generating valid collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9]{0,15}")
        .expect("Invalid regex")
        .prop_filter("Collection name must not be empty", |s| !s.is_empty())
}

/// Strategy for generating field names that don't collide with managed fields.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z]{0,9}")
        .expect("Invalid regex")
        .prop_filter("Field name must not be managed", |s| {
            s != ID_FIELD && s != CREATED_AT_FIELD && s != UPDATED_AT_FIELD
        })
}

/// Strategy for generating scalar field values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::from),
        prop::string::string_regex("[a-zA-Z0-9 ]{0,24}")
            .expect("Invalid regex")
            .prop_map(Value::String),
    ]
}

/// Strategy for generating documents holding scalar fields only.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::btree_map(field_name_strategy(), scalar_value_strategy(), 0..6)
        .prop_map(|fields| fields.into_iter().collect())
}

/// Strategy for generating documents with top-level array fields.
///
/// Arrays are stored in relationship tables by the relational backend, so
/// these documents exercise its multi-part writes.
pub fn document_with_arrays_strategy() -> impl Strategy<Value = Document> {
    (
        document_strategy(),
        prop::collection::btree_map(
            field_name_strategy(),
            prop::collection::vec(scalar_value_strategy(), 1..4),
            1..3,
        ),
    )
        .prop_map(|(mut doc, arrays)| {
            for (field, values) in arrays {
                doc.insert(field, Value::Array(values));
            }
            doc
        })
}

/// Strategy for generating a batch of documents.
pub fn documents_strategy(max: usize) -> impl Strategy<Value = Vec<Document>> {
    prop::collection::vec(document_strategy(), 1..=max.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn collection_names_are_plain(name in collection_name_strategy()) {
            prop_assert!(!name.is_empty());
            prop_assert!(!name.starts_with('_'));
            prop_assert!(name.chars().all(|c| c.is_ascii_alphanumeric()));
        }

        #[test]
        fn documents_have_no_managed_fields(doc in document_strategy()) {
            prop_assert!(!doc.contains_key(ID_FIELD));
            prop_assert!(!doc.contains_key(CREATED_AT_FIELD));
        }

        #[test]
        fn array_documents_carry_non_empty_arrays(doc in document_with_arrays_strategy()) {
            prop_assert!(doc.values().any(|v| matches!(v, Value::Array(items) if !items.is_empty())));
        }
    }
}
