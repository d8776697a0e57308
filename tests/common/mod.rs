//! Shared fixtures for integration tests
//!
//! Standard tree (node type in brackets):
//!
//! ```text
//! 100 [1]
//! ├── 101 [1]
//! │   └── 103 [1]
//! └── 102 [2]
//!     └── 104 [3]
//! 200 [1] INACTIVE
//! └── 201 [1]
//! ```
//!
//! Parameters: 7 "Daily limit" (types 1, property 1), 8 "Commission"
//! (types 1 and 2, properties 2 and 3), 9 "Legacy" (inactive, property 4).

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hierarchy_params::db::definitions::{self, ParameterInput};
use hierarchy_params::db::hierarchy::{self, NodeInput};
use hierarchy_params::db::models::{
    AttributeSchema, Category, CreateValueInput, PropertyDefinition, Status, ValuePayload,
};
use hierarchy_params::ParamDb;

pub fn memory_db() -> Arc<ParamDb> {
    Arc::new(ParamDb::open_in_memory().unwrap())
}

/// File database with a separate read connection
pub fn file_db(dir: &Path) -> Arc<ParamDb> {
    Arc::new(ParamDb::open(&dir.join("parameters.db"), true, Duration::from_secs(5)).unwrap())
}

pub fn seeded_db() -> Arc<ParamDb> {
    let db = memory_db();
    seed_standard(&db);
    db
}

/// Definitions plus the standard tree
pub fn seed_standard(db: &ParamDb) {
    seed_definitions(db);
    seed_nodes(
        db,
        &[
            (100, None, 1, Status::Active),
            (101, Some(100), 1, Status::Active),
            (102, Some(100), 2, Status::Active),
            (103, Some(101), 1, Status::Active),
            (104, Some(102), 3, Status::Active),
            (200, None, 1, Status::Inactive),
            (201, Some(200), 1, Status::Active),
        ],
    );
}

pub fn seed_nodes(db: &ParamDb, nodes: &[(i64, Option<i64>, i64, Status)]) {
    db.write_tx(|tx| {
        for &(id, parent_id, node_type_id, status) in nodes {
            hierarchy::upsert_node(tx, &NodeInput { id, parent_id, node_type_id, status })?;
        }
        Ok(())
    })
    .unwrap();
}

pub fn seed_definitions(db: &ParamDb) {
    db.write_tx(|tx| {
        definitions::upsert_category(
            tx,
            &Category { id: 1, name: "Limits".into(), description: Some("Transaction limits".into()) },
        )?;
        definitions::upsert_category(tx, &Category { id: 2, name: "Fees".into(), description: None })?;

        for (id, name, category_id, types, status) in [
            (7, "Daily limit", 1, vec![1], Status::Active),
            (8, "Commission", 2, vec![1, 2], Status::Active),
            (9, "Legacy", 2, vec![1], Status::Inactive),
        ] {
            definitions::upsert_parameter(
                tx,
                &ParameterInput {
                    id,
                    name: name.into(),
                    description: None,
                    category_id,
                    applicable_node_types: types,
                    max_properties: 3,
                    status,
                },
            )?;
        }

        for (id, parameter_id, code) in [(1, 7, "LIMIT"), (2, 8, "FIXED"), (3, 8, "PERCENT"), (4, 9, "OLD")] {
            definitions::upsert_property(
                tx,
                &PropertyDefinition {
                    id,
                    parameter_id,
                    property_code: Some(code.into()),
                    attributes: vec![AttributeSchema {
                        label: Some("Amount".into()),
                        field_name: Some("AMOUNT".into()),
                        data_type: Some("decimal".into()),
                        required: Some(true),
                        ..Default::default()
                    }],
                },
            )?;
        }
        Ok(())
    })
    .unwrap();
}

pub fn payload(amount: &str) -> ValuePayload {
    ValuePayload {
        label_parameter: Some(format!("Tier {}", amount)),
        amount: Some(amount.into()),
        ..Default::default()
    }
}

pub fn value_input(hierarchy_id: i64, parameter_id: i64, property_id: i64, amount: &str) -> CreateValueInput {
    CreateValueInput {
        hierarchy_id,
        parameter_id,
        property_id,
        status: Status::Active,
        property_code: None,
        payload: payload(amount),
    }
}

/// Scalar count query on the write connection
pub fn count(db: &ParamDb, sql: &str) -> i64 {
    db.with_conn(|conn| Ok(conn.query_row(sql, [], |row| row.get(0))?))
        .unwrap()
}

pub fn total_bindings(db: &ParamDb) -> i64 {
    count(db, "SELECT COUNT(*) FROM hierarchy_parameters")
}

pub fn total_values(db: &ParamDb) -> i64 {
    count(db, "SELECT COUNT(*) FROM hierarchy_parameter_values")
}
