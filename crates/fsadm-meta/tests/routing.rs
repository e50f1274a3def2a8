//! Leader routing through the metadata client.

mod common;

use common::{init_tracing, route, routed_client, scenario_tree, MemCluster};
use fsadm_meta::{InodeId, MetaError, MetaServer};

const ADDRS: [&str; 3] = ["mds1:6700", "mds2:6700", "mds3:6700"];

#[tokio::test]
async fn test_calls_go_to_the_leader() {
    init_tracing();
    let cluster = MemCluster::new(scenario_tree());
    cluster.set_leader("mds2:6700");
    let (meta, cache) = routed_client(&cluster, &ADDRS);

    let entries = meta
        .list_children(&route(), InodeId::ROOT_INODE)
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(cache.cached().as_deref(), Some("mds2:6700"));
    assert_eq!(cache.probe_count(), 2);

    meta.get_file_attr(&route(), InodeId::new(12)).await.unwrap();
    assert_eq!(cache.probe_count(), 2);

    let stats = meta.executor().pool().stats();
    // probe connections for mds1 and mds2, plus the call connection reused on mds2
    assert_eq!(stats.addresses, 2);
    assert_eq!(meta.executor().pool().idle_count("mds3:6700"), 0);
}

#[tokio::test]
async fn test_no_leader_uses_every_candidate() {
    init_tracing();
    let cluster = MemCluster::new(scenario_tree());
    cluster.set_down("mds1:6700");
    let (meta, cache) = routed_client(&cluster, &ADDRS);

    meta.list_children(&route(), InodeId::ROOT_INODE)
        .await
        .unwrap();
    assert!(cache.cached().is_none());
    assert_eq!(cache.probe_count(), 3);
}

#[tokio::test]
async fn test_failed_leader_falls_through_and_is_forgotten() {
    init_tracing();
    let cluster = MemCluster::new(scenario_tree());
    cluster.set_leader("mds2:6700");
    let (meta, cache) = routed_client(&cluster, &ADDRS);

    meta.list_children(&route(), InodeId::ROOT_INODE)
        .await
        .unwrap();
    assert_eq!(cache.cached().as_deref(), Some("mds2:6700"));

    // the stale leader is tried first, then the rest in caller order
    cluster.set_down("mds2:6700");
    let before = cache.probe_count();
    let entries = meta
        .list_children(&route(), InodeId::ROOT_INODE)
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert!(cache.cached().is_none());
    assert_eq!(cache.probe_count(), before);
    assert_eq!(meta.executor().pool().idle_count("mds2:6700"), 0);
    assert_eq!(meta.executor().pool().idle_count("mds3:6700"), 0);

    // nobody claims leadership now, so the full list is used
    let entries = meta
        .list_children(&route(), InodeId::ROOT_INODE)
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert!(cache.cached().is_none());
}

#[tokio::test]
async fn test_every_candidate_down_reports_leader_first() {
    init_tracing();
    let cluster = MemCluster::new(scenario_tree());
    cluster.set_leader("mds3:6700");
    let (meta, cache) = routed_client(&cluster, &ADDRS);

    meta.get_file_attr(&route(), InodeId::new(10)).await.unwrap();
    for addr in ADDRS {
        cluster.set_down(addr);
    }

    let err = meta
        .get_file_attr(&route(), InodeId::new(10))
        .await
        .unwrap_err();
    match err {
        MetaError::Rpc(rpc) => {
            let tried: Vec<_> = rpc.failures().iter().map(|f| f.addr.as_str()).collect();
            assert_eq!(tried, vec!["mds3:6700", "mds1:6700", "mds2:6700"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(cache.cached().is_none());
}
