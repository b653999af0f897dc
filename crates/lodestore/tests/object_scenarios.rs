//! End-to-end accessor scenarios: replication streams, cascades and the
//! JSON projection, exercised through the public facade.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use lodestore::{
    ColumnType, Group, Instruction, InstructionLog, LinkStrength, StoreError, Value,
};

#[test]
fn removal_stream_orders_nullify_before_remove() {
    let group = Group::new();
    let person = group.add_table("person");
    let dog = group.add_table("dog");
    let owner = dog.add_link_column("owner", &person, LinkStrength::Weak);

    let ann = person.create_object().unwrap();
    let rex = dog.create_object().unwrap();
    rex.set_link(owner, Some(ann.key())).unwrap();

    let log = Rc::new(RefCell::new(InstructionLog::new()));
    group.set_replication(log.clone());

    person.remove_object(ann.key()).unwrap();

    let log = log.borrow();
    let instrs = log.instructions();
    // The link on the dog is nullified before the person's removal is
    // recorded.
    assert_eq!(
        instrs[0],
        Instruction::NullifyLink {
            table: dog.key(),
            col: owner,
            key: rex.key(),
        }
    );
    assert_eq!(
        instrs[1],
        Instruction::RemoveObject {
            table: person.key(),
            key: ann.key(),
        }
    );
    assert_eq!(rex.get_link(owner).unwrap(), None);
}

#[test]
fn link_list_stream_on_target_removal() {
    let group = Group::new();
    let a = group.add_table("a");
    let b = group.add_table("b");
    let items = a.add_link_list_column("items", &b, LinkStrength::Weak);

    let holder = a.create_object().unwrap();
    let x = b.create_object().unwrap();
    let y = b.create_object().unwrap();
    let list = holder.link_list(items).unwrap();
    list.add(x.key()).unwrap();
    list.add(y.key()).unwrap();

    let log = Rc::new(RefCell::new(InstructionLog::new()));
    group.set_replication(log.clone());

    b.remove_object(x.key()).unwrap();

    let log = log.borrow();
    assert_eq!(
        log.instructions()[0],
        Instruction::LinkListNullify {
            table: a.key(),
            col: items,
            key: holder.key(),
            ndx: 0,
        }
    );
    assert_eq!(list.size().unwrap(), 1);
    assert_eq!(list.get(0).unwrap(), y.key());
}

#[test]
fn list_mutation_stream() {
    let group = Group::new();
    let t = group.add_table("data");
    let vals = t.add_list_column("vals", ColumnType::Int, false);
    let obj = t.create_object().unwrap();

    let log = Rc::new(RefCell::new(InstructionLog::new()));
    group.set_replication(log.clone());

    let list = obj.list::<i64>(vals).unwrap();
    list.add(Some(1)).unwrap();
    list.add(Some(2)).unwrap();
    list.set(0, Some(9)).unwrap();
    list.move_item(0, 1).unwrap();
    list.swap_items(0, 1).unwrap();
    list.erase(1).unwrap();
    list.clear().unwrap();

    let log = log.borrow();
    let kinds: Vec<&Instruction> = log.instructions().iter().collect();
    assert!(matches!(kinds[0], Instruction::ListInsert { ndx: 0, value: Value::Int(1), .. }));
    assert!(matches!(kinds[1], Instruction::ListInsert { ndx: 1, value: Value::Int(2), .. }));
    assert!(matches!(kinds[2], Instruction::ListSet { ndx: 0, value: Value::Int(9), .. }));
    assert!(matches!(kinds[3], Instruction::ListMove { from: 0, to: 1, .. }));
    assert!(matches!(kinds[4], Instruction::ListSwap { a: 0, b: 1, .. }));
    assert!(matches!(kinds[5], Instruction::ListErase { ndx: 1, .. }));
    assert!(matches!(kinds[6], Instruction::ListClear { .. }));
}

#[test]
fn diamond_cascade_deletes_whole_subgraph() {
    // root -> {left, right} -> shared; all strong. Removing root must
    // delete the transitive closure with no dangling strong references.
    let group = Group::new();
    let t = group.add_table("node");
    let l = t.add_link_column("l", &t, LinkStrength::Strong);
    let r = t.add_link_column("r", &t, LinkStrength::Strong);

    let root = t.create_object().unwrap();
    let left = t.create_object().unwrap();
    let right = t.create_object().unwrap();
    let shared = t.create_object().unwrap();

    root.set_link(l, Some(left.key())).unwrap();
    root.set_link(r, Some(right.key())).unwrap();
    left.set_link(l, Some(shared.key())).unwrap();
    right.set_link(l, Some(shared.key())).unwrap();

    // Shared has two strong backlinks; deleting only left keeps it.
    t.remove_object(left.key()).unwrap();
    assert!(t.is_valid(shared.key()));

    t.remove_object(root.key()).unwrap();
    assert_eq!(t.object_count(), 0);
}

#[test]
fn oversized_values_are_rejected_atomically() {
    let group = Group::new();
    let t = group.add_table("doc");
    let body = t.add_column("body", ColumnType::String, false);
    let blob = t.add_column("blob", ColumnType::Binary, false);

    let o = t.create_object().unwrap();
    o.set(body, "ok".to_owned()).unwrap();

    let huge = "x".repeat(lodestore::MAX_STRING_SIZE + 1);
    assert!(matches!(
        o.set(body, huge),
        Err(StoreError::StringTooBig { .. })
    ));
    // The previous value is untouched.
    assert_eq!(o.get::<String>(body).unwrap(), "ok");

    let huge = vec![0u8; lodestore::MAX_BINARY_SIZE + 1];
    assert!(matches!(
        o.set(blob, huge),
        Err(StoreError::BinaryTooBig { .. })
    ));
}

#[test]
fn json_projection_with_renames_and_lists() {
    let group = Group::new();
    let person = group.add_table("person");
    let name = person.add_column("name", ColumnType::String, false);
    let nick = person.add_list_column("nicknames", ColumnType::String, false);
    let friend = person.add_link_column("friend", &person, LinkStrength::Weak);

    let a = person.create_object().unwrap();
    a.set(name, "Ann".to_owned()).unwrap();
    let nicks = a.list::<String>(nick).unwrap();
    nicks.add(Some("Annie".to_owned())).unwrap();
    nicks.add(Some("An".to_owned())).unwrap();

    let b = person.create_object().unwrap();
    b.set(name, "Ben".to_owned()).unwrap();
    a.set_link(friend, Some(b.key())).unwrap();
    b.set_link(friend, Some(a.key())).unwrap();

    let mut renames = HashMap::new();
    renames.insert("_key".to_owned(), "id".to_owned());
    renames.insert("name".to_owned(), "fullName".to_owned());

    let json = a.to_json(1, &renames).unwrap();
    assert_eq!(json["id"], a.key().value());
    assert_eq!(json["fullName"], "Ann");
    assert_eq!(json["nicknames"][0], "Annie");
    assert_eq!(json["friend"]["fullName"], "Ben");
    // Depth exhausted on the second hop: reference stub.
    assert_eq!(json["friend"]["friend"]["key"], a.key().value());
    assert_eq!(json["friend"]["friend"]["table"], "person");
}

#[test]
fn compare_and_same_content() {
    let group = Group::new();
    let t = group.add_table("person");
    let name = t.add_column("name", ColumnType::String, false);
    let age = t.add_column("age", ColumnType::Int, false);

    let a = t.create_object().unwrap();
    a.set(name, "Ann".to_owned()).unwrap();
    a.set(age, 30i64).unwrap();
    let b = t.create_object().unwrap();
    b.set(name, "Ann".to_owned()).unwrap();
    b.set(age, 30i64).unwrap();

    assert!(a.same_content(&b).unwrap());
    b.set(age, 31i64).unwrap();
    assert!(!a.same_content(&b).unwrap());
    assert_eq!(
        a.compare_on(age, &b).unwrap(),
        std::cmp::Ordering::Less
    );
}
