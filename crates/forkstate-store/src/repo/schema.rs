//! Stored validation schemas

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, Result};
use forkstate_core::errors::{ExError, ExErrorKind};
use forkstate_core::model::StoredSchema;
use forkstate_core::validation::check_definition;
use rusqlite::{Connection, OptionalExtension};

/// Register a schema; re-registering an identical definition is a no-op,
/// a different definition for the same `(key, version)` is rejected
pub fn register_schema(conn: &Connection, schema: &StoredSchema) -> Result<()> {
    check_definition(&schema.definition)?;
    if let Some(existing) = get_schema(conn, &schema.schema_key, &schema.schema_version)? {
        if existing.definition == schema.definition {
            return Ok(());
        }
        return Err(ExError::new(ExErrorKind::ConstraintViolation)
            .with_op("register_schema")
            .with_message(format!(
                "schema {}@{} is already registered with a different definition",
                schema.schema_key, schema.schema_version
            )));
    }
    conn.execute(
        "INSERT INTO stored_schemas (schema_key, schema_version, definition) VALUES (?1, ?2, ?3)",
        rusqlite::params![schema.schema_key, schema.schema_version, schema.definition],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

pub fn get_schema(
    conn: &Connection,
    schema_key: &str,
    schema_version: &str,
) -> Result<Option<StoredSchema>> {
    conn.query_row(
        "SELECT schema_key, schema_version, definition FROM stored_schemas
         WHERE schema_key = ?1 AND schema_version = ?2",
        [schema_key, schema_version],
        |row| {
            Ok(StoredSchema {
                schema_key: row.get(0)?,
                schema_version: row.get(1)?,
                definition: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(from_rusqlite)
}

pub fn list_schemas(conn: &Connection) -> Result<Vec<StoredSchema>> {
    let mut stmt = conn
        .prepare(
            "SELECT schema_key, schema_version, definition FROM stored_schemas
             ORDER BY schema_key, schema_version",
        )
        .map_err(from_rusqlite)?;
    let schemas = stmt
        .query_map([], |row| {
            Ok(StoredSchema {
                schema_key: row.get(0)?,
                schema_version: row.get(1)?,
                definition: row.get(2)?,
            })
        })
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;
    Ok(schemas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_db;
    use serde_json::json;

    fn schema(definition: serde_json::Value) -> StoredSchema {
        StoredSchema {
            schema_key: "todo".to_string(),
            schema_version: "1.0".to_string(),
            definition,
        }
    }

    #[test]
    fn test_register_and_get() {
        let conn = memory_db();
        register_schema(&conn, &schema(json!({"type": "object"}))).unwrap();
        register_schema(&conn, &schema(json!({"type": "object"}))).unwrap();
        let got = get_schema(&conn, "todo", "1.0").unwrap().unwrap();
        assert_eq!(got.definition, json!({"type": "object"}));
        assert_eq!(list_schemas(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_conflicting_definition_rejected() {
        let conn = memory_db();
        register_schema(&conn, &schema(json!({"type": "object"}))).unwrap();
        let err = register_schema(&conn, &schema(json!({"type": "string"}))).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::ConstraintViolation);
    }

    #[test]
    fn test_malformed_definition_rejected() {
        let conn = memory_db();
        let err = register_schema(&conn, &schema(json!(42))).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::InvalidInput);
    }
}
