#![allow(dead_code)]

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::json;
use serde_json::Value;
use tablepod::api_model::TableDescriptor;
use tablepod::database_api::SqliteBackend;

pub fn new_backend() -> SqliteBackend {
    SqliteBackend::open_in_memory().expect("Failed to open in-memory database")
}

pub fn descriptor(value: Value) -> TableDescriptor {
    serde_json::from_value(value).expect("Invalid table descriptor")
}

/// Random lowercase identifier that is never a reserved or keyword name.
pub fn random_name(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("{}_{}", prefix, suffix.to_lowercase())
}

/// A table with a random name and between zero and five random columns.
pub fn random_descriptor() -> TableDescriptor {
    let mut rng = rand::thread_rng();
    let types = ["integer", "text", "real", "blob"];
    let count = rng.gen_range(0..6);
    let columns: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "name": format!("{}_{}", random_name("col"), i),
                "type": types[rng.gen_range(0..types.len())],
                "constraints": {"notNull": rng.gen_bool(0.5), "unique": rng.gen_bool(0.2)}
            })
        })
        .collect();
    descriptor(json!({"name": random_name("table"), "columns": columns}))
}
