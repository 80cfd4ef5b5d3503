#![allow(missing_docs)]

use std::cmp::Ordering;
use std::sync::{Arc, Once};

use strkv::{
    compare_keys, nth_idx, KvOps, KvStats, Node, Result, StrKvError, StrKvOps, StrKvOptions,
    VarKey,
};
use tracing_subscriber::EnvFilter;

const VSIZE: usize = 4;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("strkv::mutate=trace,strkv::verify=warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

fn ops_with(stats: Arc<KvStats>) -> Result<StrKvOps> {
    StrKvOps::with_stats(
        StrKvOptions {
            value_size: VSIZE,
            verify_after_write: true,
            ..StrKvOptions::default()
        },
        stats,
    )
}

fn key(bytes: &[u8]) -> VarKey {
    VarKey::from_bytes(bytes).expect("test key fits")
}

fn read(ops: &StrKvOps, node: &Node<Vec<u8>>, idx: usize) -> Result<(Vec<u8>, [u8; VSIZE])> {
    let mut k = VarKey::null();
    let mut v = [0u8; VSIZE];
    ops.get_kv(node, idx, &mut k, Some(&mut v))?;
    Ok((k.key_bytes().to_vec(), v))
}

#[test]
fn insert_overwrite_remove_walkthrough() -> Result<()> {
    init_tracing();
    let stats = Arc::new(KvStats::default());
    let ops = ops_with(Arc::clone(&stats))?;
    let mut node = Node::new(vec![0u8; 128]);

    ops.ins_kv(&mut node, 0, Some((&key(b"b"), &[1, 2, 3, 4])))?;
    assert_eq!(node.nentry(), 1);
    assert_eq!(read(&ops, &node, 0)?, (b"b".to_vec(), [1, 2, 3, 4]));

    ops.ins_kv(&mut node, 0, Some((&key(b"a"), &[5, 6, 7, 8])))?;
    assert_eq!(read(&ops, &node, 0)?.0, b"a".to_vec());
    assert_eq!(read(&ops, &node, 1)?.0, b"b".to_vec());

    let size_before = node.data_size();
    let second_before = node.offsets().get(1)?;
    ops.set_kv(&mut node, 0, &key(b"aa"), &[5, 6, 7, 8])?;
    assert_eq!(node.data_size(), size_before + 1);
    assert_eq!(node.offsets().get(1)?, second_before + 1);
    assert_eq!(read(&ops, &node, 1)?, (b"b".to_vec(), [1, 2, 3, 4]));

    ops.ins_kv(&mut node, 0, None)?;
    assert_eq!(node.nentry(), 1);
    assert_eq!(read(&ops, &node, 0)?, (b"b".to_vec(), [1, 2, 3, 4]));
    ops.check_node(&node)?;

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.appends, 1);
    assert_eq!(snapshot.inserts, 1);
    assert_eq!(snapshot.overwrites, 1);
    assert_eq!(snapshot.removes, 1);
    assert!(snapshot.bytes_moved > 0);
    stats.emit_tracing();
    Ok(())
}

#[test]
fn split_index_and_infinite_key_order() {
    assert_eq!(nth_idx(10, 1, 3), 4);
    let widest = key(&vec![0xFF; 65_534]);
    assert_eq!(compare_keys(&VarKey::infinite(), &widest), Ordering::Greater);
    assert!(VarKey::null() < key(b""));
}

#[test]
fn external_key_form_survives_detach() -> Result<()> {
    let ops = ops_with(Arc::new(KvStats::default()))?;
    let mut node = Node::new(vec![0u8; 64]);
    ops.set_kv(&mut node, 0, &key(b"hello"), &[0; VSIZE])?;

    let mut detached = VarKey::null();
    ops.nth_splitter(&node, &mut detached)?;
    assert_eq!(detached.as_encoded(), &[0, 5, b'h', b'e', b'l', b'l', b'o']);
    let decoded = VarKey::from_encoded(detached.as_encoded())?;
    assert_eq!(decoded, detached);

    // The detached key outlives edits to the node it came from.
    ops.set_kv(&mut node, 0, &key(b"x"), &[0; VSIZE])?;
    assert_eq!(detached.key_bytes(), b"hello");
    Ok(())
}

#[test]
fn reopened_buffer_keeps_entries() -> Result<()> {
    let ops = ops_with(Arc::new(KvStats::default()))?;
    let mut node = Node::new(vec![0u8; 64]);
    ops.set_kv(&mut node, 0, &key(b"k1"), &[1; VSIZE])?;
    ops.set_kv(&mut node, 1, &key(b"k2"), &[2; VSIZE])?;
    let nentry = node.nentry();
    let reopened = Node::from_parts(node.into_inner(), nentry)?;
    reopened.verify(VSIZE)?;
    let entry = reopened.entry(1, VSIZE)?;
    assert_eq!(entry.key, b"k2");
    assert_eq!(entry.value, &[2; VSIZE]);
    Ok(())
}

#[test]
fn overflow_reports_required_size() -> Result<()> {
    let ops = ops_with(Arc::new(KvStats::default()))?;
    let mut node = Node::new(vec![0u8; 12]);
    let err = ops
        .set_kv(&mut node, 0, &key(b"toolong"), &[0; VSIZE])
        .unwrap_err();
    assert_eq!(
        err,
        StrKvError::NodeOverflow {
            required: 4 + 7 + VSIZE,
            capacity: 12
        }
    );
    assert!(node.is_empty());
    assert!(err.to_string().contains("15"));
    Ok(())
}
