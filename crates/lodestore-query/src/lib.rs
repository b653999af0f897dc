//! Query evaluation engine for the lodestore object store.
//!
//! A [`Query`] compiles to a tree of [`QueryNode`]s rooted at one table.
//! Execution drives the tree cluster by cluster: `find_first_local` on
//! children narrows candidate row ranges, matches are reported through an
//! aggregate action that may read values, follow link paths or descend
//! into subqueries.

pub mod expression;
pub mod link_path;
pub mod nodes;
pub mod not_node;
pub mod query;
pub mod state;
pub mod string_node;

pub use expression::{AggrKind, Compare, ExpressionNode, Operand};
pub use link_path::{LinkPath, LinkTargets};
pub use nodes::{find_first_in, AndNode, CmpOp, EvalCtx, LinksToNode, NullNode, OrNode, QueryNode, ScalarNode};
pub use not_node::{advance_known_range, KnownRange, NotNode};
pub use query::{or_node, Query};
pub use state::{AggregateOp, AggregateState};
pub use string_node::{StringNode, StringOp};

#[cfg(test)]
mod tests {
    use super::*;
    use lodestore_store::Group;
    use lodestore_types::{ColKey, ColumnType, LinkStrength, ObjKey, Value};

    fn people(group: &Group, rows: &[(&str, i64)]) -> (lodestore_store::Table, ColKey, ColKey) {
        let t = group.add_table("person");
        let name = t.add_column("name", ColumnType::String, false);
        let age = t.add_column("age", ColumnType::Int, false);
        for (n, a) in rows {
            let o = t.create_object().unwrap();
            o.set(name, (*n).to_owned()).unwrap();
            o.set(age, *a).unwrap();
        }
        (t, name, age)
    }

    const ROWS: &[(&str, i64)] = &[
        ("Adam", 1),
        ("Bob", 3),
        ("Bob", 7),
        ("Cora", 5),
        ("Dan", 3),
        ("Bob", 2),
        ("Eve", 9),
    ];

    #[test]
    fn conjunction_over_one_cluster() {
        let group = Group::new();
        let (t, name, age) = people(&group, ROWS);
        let keys = t.object_keys();

        let mut q = Query::new(&t)
            .greater(age, 2i64)
            .string_equal(name, "Bob");
        assert_eq!(q.find_all(), vec![keys[1], keys[2]]);
        assert_eq!(q.count(), 2);
        assert_eq!(q.find_first(), Some(keys[1]));
    }

    #[test]
    fn results_independent_of_cluster_capacity() {
        let reference: Vec<i64> = {
            let group = Group::new();
            let (t, name, age) = people(&group, ROWS);
            Query::new(&t)
                .greater(age, 2i64)
                .string_equal(name, "Bob")
                .find_all()
                .iter()
                .map(|k| k.value())
                .collect()
        };
        for capacity in [1, 2, 3, 5, 100] {
            let group = Group::with_cluster_capacity(capacity);
            let (t, name, age) = people(&group, ROWS);
            let got: Vec<i64> = Query::new(&t)
                .greater(age, 2i64)
                .string_equal(name, "Bob")
                .find_all()
                .iter()
                .map(|k| k.value())
                .collect();
            assert_eq!(got, reference, "capacity {capacity}");
        }
    }

    #[test]
    fn indexed_string_equality_matches_scan() {
        for capacity in [1, 2, 4, 100] {
            let group = Group::with_cluster_capacity(capacity);
            let (t, name, _age) = people(&group, ROWS);

            let unindexed: Vec<ObjKey> = Query::new(&t).string_equal(name, "Bob").find_all();
            t.add_search_index(name);
            let indexed: Vec<ObjKey> = Query::new(&t).string_equal(name, "Bob").find_all();
            assert_eq!(unindexed, indexed, "capacity {capacity}");
            assert_eq!(indexed.len(), 3);
        }
    }

    #[test]
    fn indexed_equality_after_mutations() {
        let group = Group::with_cluster_capacity(2);
        let (t, name, _age) = people(&group, ROWS);
        t.add_search_index(name);

        // Rename one Bob away and one Adam into Bob; the index must follow.
        let keys = t.object_keys();
        let bob1 = t.object(keys[1]).unwrap();
        bob1.set(name, "Zed".to_owned()).unwrap();
        let adam = t.object(keys[0]).unwrap();
        adam.set(name, "Bob".to_owned()).unwrap();

        let found = Query::new(&t).string_equal(name, "Bob").find_all();
        assert_eq!(found, vec![keys[0], keys[2], keys[5]]);
    }

    #[test]
    fn or_group_consolidates_to_needles() {
        let group = Group::new();
        let (t, name, _age) = people(&group, ROWS);

        let mut q = Query::new(&t).any_of(vec![
            Box::new(StringNode::new(name, StringOp::Equal, Some("Adam".into()))),
            Box::new(StringNode::new(name, StringOp::Equal, Some("Eve".into()))),
            Box::new(StringNode::new(name, StringOp::Equal, Some("Cora".into()))),
        ]);
        let keys = t.object_keys();
        assert_eq!(q.find_all(), vec![keys[0], keys[3], keys[6]]);
        // The consolidated node describes as a disjunction of equalities.
        assert!(q.describe().contains("or"));
    }

    #[test]
    fn or_group_of_mixed_conditions() {
        let group = Group::new();
        let (t, name, age) = people(&group, ROWS);
        let keys = t.object_keys();

        let mut q = Query::new(&t).any_of(vec![
            Box::new(ScalarNode::new(age, CmpOp::Greater, 7i64)),
            Box::new(StringNode::new(name, StringOp::Equal, Some("Adam".into()))),
        ]);
        assert_eq!(q.find_all(), vec![keys[0], keys[6]]);
    }

    #[test]
    fn not_node_against_reference() {
        for capacity in [1, 3, 100] {
            let group = Group::with_cluster_capacity(capacity);
            let (t, name, _age) = people(&group, ROWS);
            let keys = t.object_keys();

            let mut q = Query::new(&t).not(Box::new(StringNode::new(
                name,
                StringOp::Equal,
                Some("Bob".into()),
            )));
            let expected: Vec<ObjKey> = vec![keys[0], keys[3], keys[4], keys[6]];
            assert_eq!(q.find_all(), expected, "capacity {capacity}");
        }
    }

    #[test]
    fn string_operators() {
        let group = Group::new();
        let (t, name, _age) = people(&group, ROWS);
        let keys = t.object_keys();

        let mut q = Query::new(&t).string(name, StringOp::Contains, "o");
        assert_eq!(q.find_all(), vec![keys[1], keys[2], keys[3], keys[5]]);

        let mut q = Query::new(&t).string(name, StringOp::BeginsWith, "Da");
        assert_eq!(q.find_all(), vec![keys[4]]);

        let mut q = Query::new(&t).string(name, StringOp::EndsWith, "e");
        assert_eq!(q.find_all(), vec![keys[6]]);
    }

    #[test]
    fn aggregates_over_matches() {
        let group = Group::new();
        let (t, name, age) = people(&group, ROWS);

        let mut q = Query::new(&t).string_equal(name, "Bob");
        assert_eq!(q.sum(age), Value::Int(12));
        assert_eq!(q.min(age), Value::Int(2));
        assert_eq!(q.max(age), Value::Int(7));
        assert_eq!(q.average(age), Some(4.0));

        let mut none = Query::new(&t).string_equal(name, "Nobody");
        assert_eq!(none.sum(age), Value::Int(0));
        assert_eq!(none.min(age), Value::Null);
        assert_eq!(none.average(age), None);
    }

    #[test]
    fn for_each_stops_early() {
        let group = Group::new();
        let (t, _name, age) = people(&group, ROWS);

        let mut seen = Vec::new();
        let mut cb = |k: ObjKey| {
            seen.push(k);
            seen.len() < 2
        };
        Query::new(&t).greater(age, 0i64).for_each(&mut cb);
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn matches_single_object() {
        let group = Group::new();
        let (t, name, age) = people(&group, ROWS);
        let keys = t.object_keys();

        let mut q = Query::new(&t)
            .greater(age, 2i64)
            .string_equal(name, "Bob");
        assert!(q.matches(&t.object(keys[1]).unwrap()));
        assert!(!q.matches(&t.object(keys[0]).unwrap()));
    }

    #[test]
    fn link_path_property_comparison() {
        let group = Group::new();
        let person = group.add_table("person");
        let age = person.add_column("age", ColumnType::Int, false);
        let dog = group.add_table("dog");
        let owner = dog.add_link_column("owner", &person, LinkStrength::Weak);

        let old = person.create_object().unwrap();
        old.set(age, 70i64).unwrap();
        let young = person.create_object().unwrap();
        young.set(age, 20i64).unwrap();

        let rex = dog.create_object().unwrap();
        rex.set_link(owner, Some(old.key())).unwrap();
        let fido = dog.create_object().unwrap();
        fido.set_link(owner, Some(young.key())).unwrap();
        let stray = dog.create_object().unwrap();

        // Dogs whose owner is older than 50.
        let mut q = Query::new(&dog).expression(Compare::new(
            Operand::prop(LinkPath::new(vec![owner]), age),
            CmpOp::Greater,
            Operand::constant(50i64),
        ));
        assert_eq!(q.find_all(), vec![rex.key()]);
        assert!(!q.matches(&stray));
    }

    #[test]
    fn backlink_path_fan_out() {
        let group = Group::new();
        let person = group.add_table("person");
        let name = person.add_column("name", ColumnType::String, false);
        let dog = group.add_table("dog");
        let owner = dog.add_link_column("owner", &person, LinkStrength::Weak);
        let bl = person.backlink_column(&dog, owner).unwrap();

        let ann = person.create_object().unwrap();
        ann.set(name, "Ann".to_owned()).unwrap();
        let ben = person.create_object().unwrap();
        ben.set(name, "Ben".to_owned()).unwrap();

        for _ in 0..2 {
            let d = dog.create_object().unwrap();
            d.set_link(owner, Some(ann.key())).unwrap();
        }

        // People with at least one dog, via the backlink hop count.
        let mut q = Query::new(&person).expression(Compare::new(
            Operand::LinkCount {
                path: LinkPath::new(vec![bl]),
            },
            CmpOp::Greater,
            Operand::constant(0i64),
        ));
        assert_eq!(q.find_all(), vec![ann.key()]);
        assert!(!q.matches(&ben));
    }

    #[test]
    fn link_path_origin_keys_inverse_walk() {
        let group = Group::new();
        let person = group.add_table("person");
        let dog = group.add_table("dog");
        let owner = dog.add_link_column("owner", &person, LinkStrength::Weak);

        let ann = person.create_object().unwrap();
        let d1 = dog.create_object().unwrap();
        let d2 = dog.create_object().unwrap();
        d1.set_link(owner, Some(ann.key())).unwrap();
        d2.set_link(owner, Some(ann.key())).unwrap();

        let mut path = LinkPath::new(vec![owner]);
        let g = group.read();
        path.set_base_table(&g, dog.key());
        assert!(path.only_unary_links());
        // Forward: dog -> person; inverse from ann recovers both dogs.
        let origins = path.origin_keys(&g, ann.key());
        assert_eq!(origins, vec![d1.key(), d2.key()]);
    }

    #[test]
    fn list_aggregate_through_links() {
        let group = Group::new();
        let team = group.add_table("team");
        let player = group.add_table("player");
        let scores = player.add_list_column("scores", ColumnType::Int, false);
        let members = team.add_link_list_column("members", &player, LinkStrength::Weak);

        let squad = team.create_object().unwrap();
        let a = player.create_object().unwrap();
        let b = player.create_object().unwrap();
        for (p, vals) in [(&a, [1i64, 2]), (&b, [10, 20])] {
            let l = p.list::<i64>(scores).unwrap();
            for v in vals {
                l.add(Some(v)).unwrap();
            }
        }
        let ll = squad.link_list(members).unwrap();
        ll.add(a.key()).unwrap();
        ll.add(b.key()).unwrap();

        let mut q = Query::new(&team).expression(Compare::new(
            Operand::ListAggregate {
                path: LinkPath::new(vec![members]),
                col: scores,
                op: AggrKind::Sum,
            },
            CmpOp::Equal,
            Operand::constant(33i64),
        ));
        assert_eq!(q.find_all(), vec![squad.key()]);
    }

    #[test]
    fn subquery_count() {
        let group = Group::new();
        let team = group.add_table("team");
        let player = group.add_table("player");
        let age = player.add_column("age", ColumnType::Int, false);
        let members = team.add_link_list_column("members", &player, LinkStrength::Weak);

        let young = team.create_object().unwrap();
        let old = team.create_object().unwrap();
        for (t, ages) in [(&young, [15i64, 16, 30]), (&old, [40, 50, 16])] {
            let ll = t.link_list(members).unwrap();
            for a in ages {
                let p = player.create_object().unwrap();
                p.set(age, a).unwrap();
                ll.add(p.key()).unwrap();
            }
        }

        // Teams with at least two minor members.
        let mut q = Query::new(&team).expression(Compare::new(
            Operand::SubQueryCount {
                path: LinkPath::new(vec![members]),
                predicate: vec![Box::new(ScalarNode::new(age, CmpOp::Less, 18i64))],
            },
            CmpOp::GreaterEqual,
            Operand::constant(2i64),
        ));
        assert_eq!(q.find_all(), vec![young.key()]);
    }

    #[test]
    fn describe_round_trips_structure() {
        let group = Group::new();
        let (t, name, age) = people(&group, ROWS);
        let mut q = Query::new(&t)
            .greater(age, 2i64)
            .string_equal(name, "Bob");
        assert_eq!(q.describe(), "age > 2 and name == \"Bob\"");

        let mut empty = Query::new(&t);
        assert_eq!(empty.describe(), "TRUEPREDICATE");

        let mut negated = Query::new(&t).not(Box::new(ScalarNode::new(age, CmpOp::Less, 5i64)));
        assert_eq!(negated.describe(), "!(age < 5)");
    }

    #[test]
    fn null_conditions() {
        let group = Group::new();
        let t = group.add_table("t");
        let v = t.add_column("v", ColumnType::Int, true);
        let a = t.create_object().unwrap();
        let b = t.create_object().unwrap();
        b.set(v, 3i64).unwrap();

        assert_eq!(Query::new(&t).is_null(v).find_all(), vec![a.key()]);
        assert_eq!(Query::new(&t).not_null(v).find_all(), vec![b.key()]);
    }

    #[test]
    fn links_to_conditions() {
        let group = Group::new();
        let person = group.add_table("person");
        let dog = group.add_table("dog");
        let owner = dog.add_link_column("owner", &person, LinkStrength::Weak);
        let friends = dog.add_link_list_column("friends", &dog, LinkStrength::Weak);

        let ann = person.create_object().unwrap();
        let d1 = dog.create_object().unwrap();
        let d2 = dog.create_object().unwrap();
        d1.set_link(owner, Some(ann.key())).unwrap();
        d1.link_list(friends).unwrap().add(d2.key()).unwrap();

        assert_eq!(
            Query::new(&dog).links_to(owner, ann.key()).find_all(),
            vec![d1.key()]
        );
        assert_eq!(
            Query::new(&dog).links_to(friends, d2.key()).find_all(),
            vec![d1.key()]
        );
    }
}
