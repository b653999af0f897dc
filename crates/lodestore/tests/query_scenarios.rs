//! End-to-end query scenarios over larger data sets.

use lodestore::{
    CmpOp, ColumnType, Group, LinkStrength, Query, ScalarNode, StringNode, StringOp, Value,
};

fn populate(group: &Group, n: usize) -> (lodestore::Table, lodestore::ColKey, lodestore::ColKey) {
    let t = group.add_table("person");
    let name = t.add_column("name", ColumnType::String, false);
    let age = t.add_column("age", ColumnType::Int, false);
    let names = ["Adam", "Bob", "Cora", "Dan", "Eve"];
    for i in 0..n {
        let o = t.create_object().unwrap();
        o.set(name, names[i % names.len()].to_owned()).unwrap();
        o.set(age, (i % 11) as i64).unwrap();
    }
    (t, name, age)
}

/// `age > 2 AND name == "Bob"` over 1000 rows must return the same row
/// set regardless of where the cluster boundaries fall.
#[test]
fn thousand_rows_cluster_boundary_independence() {
    let reference: Vec<i64> = {
        let group = Group::with_cluster_capacity(1000);
        let (t, name, age) = populate(&group, 1000);
        Query::new(&t)
            .greater(age, 2i64)
            .string_equal(name, "Bob")
            .find_all()
            .iter()
            .map(|k| k.value())
            .collect()
    };
    assert!(!reference.is_empty());

    for capacity in [1, 7, 64, 256, 999] {
        let group = Group::with_cluster_capacity(capacity);
        let (t, name, age) = populate(&group, 1000);
        let got: Vec<i64> = Query::new(&t)
            .greater(age, 2i64)
            .string_equal(name, "Bob")
            .find_all()
            .iter()
            .map(|k| k.value())
            .collect();
        assert_eq!(got, reference, "cluster capacity {capacity}");
    }
}

#[test]
fn indexed_and_unindexed_agree_on_large_set() {
    for capacity in [13, 256] {
        let group = Group::with_cluster_capacity(capacity);
        let (t, name, age) = populate(&group, 1000);

        let plain = Query::new(&t)
            .string_equal(name, "Cora")
            .greater(age, 5i64)
            .find_all();
        t.add_search_index(name);
        let indexed = Query::new(&t)
            .string_equal(name, "Cora")
            .greater(age, 5i64)
            .find_all();
        assert_eq!(plain, indexed);
    }
}

#[test]
fn negation_composes_with_conjunction() {
    let group = Group::with_cluster_capacity(17);
    let (t, name, age) = populate(&group, 300);

    let mut q = Query::new(&t)
        .not(Box::new(StringNode::new(
            name,
            StringOp::Equal,
            Some("Bob".into()),
        )))
        .less(age, 4i64);
    let got = q.find_all();

    // Reference: per-object check through the single-object entry point.
    let mut expected = Vec::new();
    for key in t.object_keys() {
        let o = t.object(key).unwrap();
        let is_bob = o.get::<String>(name).unwrap() == "Bob";
        let young = o.get::<i64>(age).unwrap() < 4;
        if !is_bob && young {
            expected.push(key);
        }
    }
    assert_eq!(got, expected);
}

#[test]
fn aggregates_match_manual_computation() {
    let group = Group::with_cluster_capacity(23);
    let (t, name, age) = populate(&group, 500);

    let mut manual_sum = 0i64;
    let mut manual_count = 0usize;
    for key in t.object_keys() {
        let o = t.object(key).unwrap();
        if o.get::<String>(name).unwrap() == "Eve" {
            manual_sum += o.get::<i64>(age).unwrap();
            manual_count += 1;
        }
    }

    let mut q = Query::new(&t).string_equal(name, "Eve");
    assert_eq!(q.count(), manual_count);
    assert_eq!(q.sum(age), Value::Int(manual_sum));
    assert_eq!(
        q.average(age),
        Some(manual_sum as f64 / manual_count as f64)
    );
}

#[test]
fn or_needle_consolidation_matches_reference() {
    let group = Group::with_cluster_capacity(31);
    let (t, name, _age) = populate(&group, 400);

    let mut q = Query::new(&t).any_of(vec![
        Box::new(StringNode::new(name, StringOp::Equal, Some("Adam".into()))),
        Box::new(StringNode::new(name, StringOp::Equal, Some("Dan".into()))),
    ]);
    let got = q.find_all();

    let mut expected = Vec::new();
    for key in t.object_keys() {
        let o = t.object(key).unwrap();
        let n = o.get::<String>(name).unwrap();
        if n == "Adam" || n == "Dan" {
            expected.push(key);
        }
    }
    assert_eq!(got, expected);
}

#[test]
fn query_survives_interleaved_mutations() {
    let group = Group::with_cluster_capacity(8);
    let (t, name, age) = populate(&group, 100);

    let before = Query::new(&t).string_equal(name, "Bob").count();
    assert!(before > 0);

    // Delete every Bob, then re-run the same query shape.
    let bobs = Query::new(&t).string_equal(name, "Bob").find_all();
    for key in bobs {
        t.remove_object(key).unwrap();
    }
    assert_eq!(Query::new(&t).string_equal(name, "Bob").count(), 0);

    // The remaining rows are still fully queryable.
    let total = Query::new(&t).count();
    assert_eq!(total, t.object_count());
    let mut q = Query::new(&t).cmp(age, CmpOp::GreaterEqual, 0i64);
    assert_eq!(q.count(), total);
}

#[test]
fn cross_table_link_query_with_cascade() {
    let group = Group::with_cluster_capacity(4);
    let owner_table = group.add_table("owner");
    let pet_table = group.add_table("pet");
    let pets = owner_table.add_link_list_column("pets", &pet_table, LinkStrength::Strong);
    let kind = pet_table.add_column("kind", ColumnType::String, false);

    let ann = owner_table.create_object().unwrap();
    let list = ann.link_list(pets).unwrap();
    for k in ["cat", "dog", "cat"] {
        let p = pet_table.create_object().unwrap();
        p.set(kind, k.to_owned()).unwrap();
        list.add(p.key()).unwrap();
    }

    let cats = Query::new(&pet_table).string_equal(kind, "cat").count();
    assert_eq!(cats, 2);

    // Removing the owner cascades through the strong list.
    owner_table.remove_object(ann.key()).unwrap();
    assert_eq!(pet_table.object_count(), 0);
    assert_eq!(Query::new(&pet_table).string_equal(kind, "cat").count(), 0);
}

#[test]
fn scalar_node_types_cover_all_columns() {
    let group = Group::new();
    let t = group.add_table("mixed");
    let b = t.add_column("b", ColumnType::Bool, false);
    let f = t.add_column("f", ColumnType::Float, false);
    let d = t.add_column("d", ColumnType::Double, false);
    let ts = t.add_column("ts", ColumnType::Timestamp, false);
    let bin = t.add_column("bin", ColumnType::Binary, false);

    let o1 = t.create_object().unwrap();
    o1.set(b, true).unwrap();
    o1.set(f, 1.5f32).unwrap();
    o1.set(d, 2.5f64).unwrap();
    o1.set(ts, lodestore::Timestamp::new(100, 7)).unwrap();
    o1.set(bin, vec![1u8, 2]).unwrap();
    let _o2 = t.create_object().unwrap();

    assert_eq!(Query::new(&t).equal(b, true).find_all(), vec![o1.key()]);
    assert_eq!(Query::new(&t).greater(f, 1.0f32).find_all(), vec![o1.key()]);
    assert_eq!(Query::new(&t).less(d, 3.0f64).count(), 2);
    assert_eq!(
        Query::new(&t)
            .equal(ts, lodestore::Timestamp::new(100, 7))
            .find_all(),
        vec![o1.key()]
    );
    assert_eq!(
        Query::new(&t).equal(bin, vec![1u8, 2]).find_all(),
        vec![o1.key()]
    );
    assert_eq!(
        Query::new(&t)
            .and(Box::new(ScalarNode::new(d, CmpOp::Greater, 2.0f64)))
            .equal(b, true)
            .find_all(),
        vec![o1.key()]
    );
}
