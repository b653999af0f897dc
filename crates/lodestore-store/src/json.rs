//! JSON projection of objects.
//!
//! Links are followed up to a caller-controlled depth. With the unbounded
//! sentinel, traversal keeps going but each link column is only descended
//! once per path: a column already on the "followed" stack renders as a
//! reference stub instead of recursing, which breaks link cycles.

use std::collections::HashMap;

use lodestore_error::Result;
use lodestore_types::{ColumnType, ObjKey, TableKey, Value};
use serde_json::{json, Map};

use crate::group::GroupData;

/// Sentinel for "follow links indefinitely, guarding cycles".
pub const UNBOUNDED_LINK_DEPTH: usize = usize::MAX;

pub(crate) fn object_to_json(
    g: &GroupData,
    table: TableKey,
    key: ObjKey,
    link_depth: usize,
    renames: &HashMap<String, String>,
    followed: &mut Vec<(TableKey, u16)>,
) -> Result<serde_json::Value> {
    let rename = |name: &str| -> String {
        renames
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_owned())
    };

    let t = g.table(table);
    let (ci, row) = t
        .locate(key)
        .ok_or(lodestore_error::StoreError::ObjectNotAlive)?;
    let cluster = t.cluster(ci);

    let mut out = Map::new();
    out.insert(rename("_key"), json!(key.value()));

    for spec in t.columns() {
        let col = spec.key();
        if col.column_type() == ColumnType::Backlink {
            continue;
        }
        let name = rename(spec.name());
        let link = spec.link();

        if col.is_list() {
            if col.column_type() == ColumnType::LinkList {
                let link = link.expect("link column carries link info");
                let targets = cluster.column(col.index()).list_at(row).links();
                let stub = link_depth == 0
                    || (link_depth == UNBOUNDED_LINK_DEPTH
                        && followed.contains(&(table, col.index() as u16)));
                if stub {
                    let keys: Vec<i64> = targets.iter().map(|k| k.value()).collect();
                    out.insert(
                        name,
                        json!({"table": g.table(link.other_table).name(), "keys": keys}),
                    );
                } else {
                    followed.push((table, col.index() as u16));
                    let new_depth = next_depth(link_depth);
                    let mut arr = Vec::with_capacity(targets.len());
                    let targets: Vec<ObjKey> = targets.to_vec();
                    for k in targets {
                        arr.push(object_to_json(
                            g,
                            link.other_table,
                            k,
                            new_depth,
                            renames,
                            followed,
                        )?);
                    }
                    out.insert(name, serde_json::Value::Array(arr));
                }
            } else {
                let list = cluster.column(col.index()).list_at(row);
                let arr: Vec<serde_json::Value> =
                    (0..list.len()).map(|i| value_to_json(&list.value_at(i))).collect();
                out.insert(name, serde_json::Value::Array(arr));
            }
        } else if col.column_type() == ColumnType::Link {
            let link = link.expect("link column carries link info");
            match cluster.column(col.index()).link_at(row) {
                Some(k) => {
                    let stub = link_depth == 0
                        || (link_depth == UNBOUNDED_LINK_DEPTH
                            && followed.contains(&(table, col.index() as u16)));
                    if stub {
                        out.insert(
                            name,
                            json!({"table": g.table(link.other_table).name(), "key": k.value()}),
                        );
                    } else {
                        followed.push((table, col.index() as u16));
                        out.insert(
                            name,
                            object_to_json(
                                g,
                                link.other_table,
                                k,
                                next_depth(link_depth),
                                renames,
                                followed,
                            )?,
                        );
                    }
                }
                None => {
                    out.insert(name, serde_json::Value::Null);
                }
            }
        } else {
            out.insert(name, value_to_json(&cluster.column(col.index()).value_at(row)));
        }
    }
    Ok(serde_json::Value::Object(out))
}

fn next_depth(depth: usize) -> usize {
    if depth == UNBOUNDED_LINK_DEPTH {
        UNBOUNDED_LINK_DEPTH
    } else {
        depth - 1
    }
}

/// Scalar value rendering. Binaries render as lowercase hex; NaN floats
/// have no JSON number representation and render as null.
fn value_to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::Null => serde_json::Value::Null,
        Value::Int(i) => json!(i),
        Value::Bool(b) => json!(b),
        Value::Float(f) => serde_json::Number::from_f64(f64::from(*f))
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Double(d) => serde_json::Number::from_f64(*d)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::String(s) => json!(s),
        Value::Binary(b) => json!(hex::encode(b)),
        Value::Timestamp(t) => json!(t.to_string()),
        Value::Link(k) => json!(k.value()),
    }
}
