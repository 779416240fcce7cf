//! The six concrete end-to-end scenarios from the component design notes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use repstore::{Dict, Document, FixedArray, LocalStore, StoreConfig};

fn shared_store(dir: &tempfile::TempDir) -> repstore::SharedStore {
    let store = LocalStore::create(dir.path().join("store"), StoreConfig::small(64)).unwrap();
    Rc::new(RefCell::new(store))
}

#[test]
fn scenario_1_document_rewrites() {
    let dir = tempfile::tempdir().unwrap();
    let mut doc = Document::new(shared_store(&dir));
    doc.append(b"The quick brown fox jumped over the lazy dog.").unwrap();
    assert_eq!(doc.len(), 45);
    assert_eq!(doc.read_all().unwrap(), b"The quick brown fox jumped over the lazy dog.");

    doc.write_range(10, 19, b"RED FOX!!").unwrap();
    assert_eq!(
        doc.read_all().unwrap(),
        b"The quick RED FOX!! jumped over the lazy dog.".to_vec()
    );
}

#[test]
fn scenario_2_array_slice_insertion() {
    let dir = tempfile::tempdir().unwrap();
    let mut arr = FixedArray::new(shared_store(&dir), 3);
    arr.append(b"foo").unwrap();
    arr.append(b"bar").unwrap();

    arr.set_slice(1, 1, &[b"baz".to_vec(), b"qux".to_vec()]).unwrap();

    assert_eq!(
        arr.get_slice(0, arr.len()).unwrap(),
        vec![
            b"foo".to_vec(),
            b"baz".to_vec(),
            b"qux".to_vec(),
            b"bar".to_vec(),
        ]
    );
    assert_eq!(arr.len() * arr.item_size(), 12);
}

#[test]
fn scenario_3_dict_grows_from_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut dict = Dict::new(shared_store(&dir));
    let mut reference = HashMap::new();

    for i in 0..257u32 {
        let key = i.to_string().into_bytes();
        dict.set(&key, &key).unwrap();
        reference.insert(key.clone(), key);
    }

    let items = dict.items().unwrap();
    assert_eq!(items.len(), reference.len());
    for (k, v) in &items {
        assert_eq!(reference.get(k), Some(v));
    }
}

#[test]
fn scenario_4_dict_value_update_keeps_key_id() {
    let dir = tempfile::tempdir().unwrap();
    let mut dict = Dict::new(shared_store(&dir));

    dict.set(b"k", b"v1").unwrap();
    assert_eq!(dict.get(b"k").unwrap(), b"v1");

    dict.set(b"k", b"v2").unwrap();
    assert_eq!(dict.get(b"k").unwrap(), b"v2");

    // Only one (key, value) pair should ever be observable for "k".
    let items = dict.items().unwrap();
    let matches: Vec<_> = items.iter().filter(|(k, _)| k == b"k").collect();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].1, b"v2");
}

#[test]
fn scenario_5_batched_update_with_internal_collision_grows_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let mut dict = Dict::new(shared_store(&dir));

    // Insert one key first so the table starts at capacity 2, then batch
    // in two more keys to exercise growth from within `update`.
    dict.set(b"seed", b"0").unwrap();
    let pairs = vec![
        (b"alpha".to_vec(), b"1".to_vec()),
        (b"beta".to_vec(), b"2".to_vec()),
        (b"gamma".to_vec(), b"3".to_vec()),
    ];
    dict.update(&pairs).unwrap();

    assert_eq!(dict.get(b"alpha").unwrap(), b"1");
    assert_eq!(dict.get(b"beta").unwrap(), b"2");
    assert_eq!(dict.get(b"gamma").unwrap(), b"3");
    assert_eq!(dict.get(b"seed").unwrap(), b"0");
}

#[test]
fn scenario_6_allocator_shrink_after_fragmented_dealloc() {
    use repstore::Store;

    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::create(dir.path().join("store"), StoreConfig::small(64)).unwrap();
    let store = Rc::new(RefCell::new(store));

    let mut ids = Vec::new();
    for i in 0..100u32 {
        let payload = vec![(i % 256) as u8; 5 + (i as usize % 23)];
        let id = store.borrow_mut().alloc(&payload).unwrap();
        ids.push((id, payload));
    }

    let before_len = std::fs::metadata(dir.path().join("store")).unwrap().len();

    for (i, (id, _)) in ids.iter().enumerate() {
        if i % 2 == 0 {
            store.borrow_mut().dealloc(id).unwrap();
        }
    }
    store.borrow_mut().shrink().unwrap();

    let after_len = std::fs::metadata(dir.path().join("store")).unwrap().len();
    assert!(after_len <= before_len);

    for (i, (id, payload)) in ids.iter().enumerate() {
        if i % 2 != 0 {
            assert_eq!(&store.borrow().fetch(id).unwrap(), payload);
        }
    }
}
