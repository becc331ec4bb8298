//! Behaviour every `ContactGraph` backend must share. Each scenario works in
//! its own account so backends can be reused across scenarios.

use std::future::Future;

use super::{ContactGraph, ContactNode, ContactResult, ContactsParams, EdgeType, EdgeUpdate};
use crate::error::AffinityError;

const T1: i64 = 2000;
const T2: i64 = 1000;

pub(crate) async fn run_all<F, Fut, G>(make: F)
where
    F: Fn(&str) -> Fut,
    Fut: Future<Output = G>,
    G: ContactGraph + Clone + 'static,
{
    updates_commute(&make("commute-a").await, &make("commute-b").await).await;
    clique_is_symmetric(&make("clique").await).await;
    directed_update_writes_one_edge(&make("directed").await).await;
    ranked_search(&make("search").await, &make("search-other").await).await;
    prune_is_idempotent(&make("prune").await).await;
    lower_bound_filters_weak_edges(&make("lower-bound").await).await;
    data_source_names_round_trip(&make("datasource").await).await;
    zero_multiplier_rejected(&make("multiplier").await).await;
    deletions(&make("deletions").await).await;
    unwritten_type_is_not_an_edge(&make("unwritten-type").await).await;
    concurrent_updates_converge(&make("concurrent").await).await;
}

fn nodes(contacts: &[&str]) -> Vec<ContactNode> {
    contacts.iter().map(|c| ContactNode::new(*c)).collect()
}

fn names(results: &[ContactResult]) -> Vec<&str> {
    results.iter().map(|r| r.name.as_str()).collect()
}

async fn add_clique<G: ContactGraph>(graph: &G, times: usize, edge_type: EdgeType, timestamp: i64, contacts: &[&str]) {
    let update = EdgeUpdate::new(edge_type, timestamp);
    for _ in 0..times {
        graph.add_clique(&nodes(contacts), &update).await.unwrap();
    }
}

async fn related<G: ContactGraph>(graph: &G, params: ContactsParams) -> Vec<ContactResult> {
    graph.get_related_contacts(&params).await.unwrap()
}

async fn updates_commute<G: ContactGraph>(first: &G, second: &G) {
    let a = ContactNode::new("a");
    let b = ContactNode::new("b");
    let u1 = EdgeUpdate::new(EdgeType::to(), 100);
    let u2 = EdgeUpdate::new(EdgeType::cc(), 50).with_multiplier(2);

    first.update_edge(&a, &b, &u1).await.unwrap();
    first.update_edge(&a, &b, &u2).await.unwrap();
    second.update_edge(&a, &b, &u2).await.unwrap();
    second.update_edge(&a, &b, &u1).await.unwrap();

    for graph in [first, second] {
        let results = related(graph, ContactsParams::new(["a"])).await;
        assert_eq!(results, vec![ContactResult { name: "b".to_string(), weight: 7 }]);
        // combined timestamp is the max of both writes
        assert_eq!(related(graph, ContactsParams::new(["a"]).with_update_cutoff(100)).await.len(), 1);
        assert!(related(graph, ContactsParams::new(["a"]).with_update_cutoff(101)).await.is_empty());
    }
}

async fn clique_is_symmetric<G: ContactGraph>(graph: &G) {
    add_clique(graph, 1, EdgeType::to(), 500, &["a", "b", "c"]).await;

    for (seed, expected) in [("a", ["b", "c"]), ("b", ["a", "c"]), ("c", ["a", "b"])] {
        for params in [
            ContactsParams::new([seed]).with_edge_type(EdgeType::to()),
            ContactsParams::new([seed]).all_edges(),
        ] {
            let results = related(graph, params).await;
            assert_eq!(names(&results), expected);
            assert!(results.iter().all(|r| r.weight == 3));
        }
        let fresh = ContactsParams::new([seed]).with_edge_type(EdgeType::to()).with_update_cutoff(500);
        assert_eq!(related(graph, fresh).await.len(), 2);
        let stale = ContactsParams::new([seed]).with_edge_type(EdgeType::to()).with_update_cutoff(501);
        assert!(related(graph, stale).await.is_empty());
    }

    let cc = ContactsParams::new(["a"]).with_edge_type(EdgeType::cc());
    assert!(related(graph, cc).await.is_empty());
}

async fn directed_update_writes_one_edge<G: ContactGraph>(graph: &G) {
    let s = ContactNode::new("s");
    let r = ContactNode::new("r");
    graph.update_edge(&s, &r, &EdgeUpdate::directed(EdgeType::to(), 10)).await.unwrap();

    assert_eq!(names(&related(graph, ContactsParams::new(["s"])).await), vec!["r"]);
    assert!(related(graph, ContactsParams::new(["r"])).await.is_empty());
}

// [A,B,C] is a clique with [A,B] stronger, [A,D] a single connection and
// [D,E,F,G] a stronger clique. [X,Y,Z] reaches A only through CC edges, and
// the Z connection is older.
async fn build_search_graph<G: ContactGraph>(graph: &G) {
    add_clique(graph, 5, EdgeType::to(), T1, &["A", "B"]).await;
    add_clique(graph, 5, EdgeType::to(), T1, &["A", "B", "C"]).await;
    add_clique(graph, 1, EdgeType::to(), T1, &["A", "D"]).await;
    add_clique(graph, 10, EdgeType::to(), T1, &["D", "E"]).await;
    add_clique(graph, 10, EdgeType::to(), T1, &["D", "E", "F"]).await;
    add_clique(graph, 11, EdgeType::to(), T1, &["D", "E", "F", "G"]).await;
    add_clique(graph, 1, EdgeType::to(), T1, &["X", "Y", "Z"]).await;
    add_clique(graph, 5, EdgeType::cc(), T2, &["A", "X", "Y", "Z"]).await;
    add_clique(graph, 5, EdgeType::cc(), T1, &["A", "X", "Y"]).await;
    add_clique(graph, 5, EdgeType::cc(), T1, &["A", "X"]).await;
}

async fn ranked_search<G: ContactGraph>(graph: &G, other: &G) {
    build_search_graph(graph).await;
    add_clique(other, 100, EdgeType::to(), T1, &["A", "OTHER"]).await;

    let results = related(graph, ContactsParams::new(["A"]).with_edge_type(EdgeType::to()).with_num_results(10)).await;
    assert_eq!(
        results,
        vec![
            ContactResult { name: "B".to_string(), weight: 30 },
            ContactResult { name: "C".to_string(), weight: 15 },
            ContactResult { name: "D".to_string(), weight: 3 },
        ]
    );

    let both = ContactsParams::new(["A", "D"]).with_edge_type(EdgeType::to()).with_num_results(10);
    let results = related(graph, both.clone()).await;
    assert_eq!(names(&results), vec!["E", "F", "G", "B", "C"]);
    assert_eq!(results[0].weight, 93);

    let top3 = related(graph, both.with_num_results(3)).await;
    assert_eq!(names(&top3), vec!["E", "F", "G"]);

    let cc = ContactsParams::new(["A"]).with_edge_type(EdgeType::cc()).with_num_results(10);
    assert_eq!(names(&related(graph, cc.clone()).await), vec!["X", "Y", "Z"]);
    assert_eq!(names(&related(graph, cc.with_update_cutoff(1500)).await), vec!["X", "Y"]);

    // other accounts never leak in
    let all = related(graph, ContactsParams::new(["A"])).await;
    assert!(!names(&all).contains(&"OTHER"));
    assert_eq!(names(&related(other, ContactsParams::new(["A"])).await), vec!["OTHER"]);
}

async fn prune_is_idempotent<G: ContactGraph>(graph: &G) {
    build_search_graph(graph).await;
    let cc = ContactsParams::new(["A"]).with_edge_type(EdgeType::cc()).with_num_results(10);
    assert_eq!(names(&related(graph, cc.clone()).await), vec!["X", "Y", "Z"]);

    graph.prune_edges(1500).await.unwrap();
    assert_eq!(names(&related(graph, cc.clone()).await), vec!["X", "Y"]);
    let after_first = related(graph, ContactsParams::new(["A"])).await;

    graph.prune_edges(1500).await.unwrap();
    assert_eq!(related(graph, ContactsParams::new(["A"])).await, after_first);

    // cutoff is inclusive
    graph.prune_edges(T1).await.unwrap();
    assert!(related(graph, ContactsParams::new(["A"])).await.is_empty());
}

async fn lower_bound_filters_weak_edges<G: ContactGraph>(graph: &G) {
    add_clique(graph, 3, EdgeType::to(), 10, &["a", "b"]).await;
    add_clique(graph, 1, EdgeType::to(), 10, &["a", "c"]).await;

    let strong = ContactsParams::new(["a"]).with_edge_type(EdgeType::to()).with_lower_bound(4);
    assert_eq!(names(&related(graph, strong).await), vec!["b"]);
    let everything = ContactsParams::new(["a"]).with_edge_type(EdgeType::to()).with_lower_bound(3);
    assert_eq!(names(&related(graph, everything).await), vec!["b", "c"]);
}

async fn data_source_names_round_trip<G: ContactGraph>(graph: &G) {
    let a = ContactNode::with_data_source("a@example.com", "ds1");
    let b = ContactNode::with_data_source("b@example.com", "ds1");
    graph.update_edge(&a, &b, &EdgeUpdate::new(EdgeType::to(), 10)).await.unwrap();

    let scoped = ContactsParams::new(["a@example.com"]).with_data_source("ds1");
    assert_eq!(names(&related(graph, scoped).await), vec!["b@example.com"]);
    assert!(related(graph, ContactsParams::new(["a@example.com"])).await.is_empty());
}

async fn zero_multiplier_rejected<G: ContactGraph>(graph: &G) {
    let a = ContactNode::new("a");
    let b = ContactNode::new("b");
    let update = EdgeUpdate::new(EdgeType::to(), 10).with_multiplier(0);
    let err = graph.update_edge(&a, &b, &update).await.unwrap_err();
    assert!(matches!(err, AffinityError::InvalidArgument(_)));
    assert!(related(graph, ContactsParams::new(["a"])).await.is_empty());
}

async fn deletions<G: ContactGraph>(graph: &G) {
    add_clique(graph, 1, EdgeType::to(), 10, &["a", "b", "c", "d"]).await;
    let ds_a = ContactNode::with_data_source("a", "ds1");
    let ds_b = ContactNode::with_data_source("b", "ds1");
    let ds10_e = ContactNode::with_data_source("e", "ds10");
    let ds10_f = ContactNode::with_data_source("f", "ds10");
    graph.update_edge(&ds_a, &ds_b, &EdgeUpdate::new(EdgeType::to(), 10)).await.unwrap();
    graph.update_edge(&ds10_e, &ds10_f, &EdgeUpdate::new(EdgeType::to(), 10)).await.unwrap();

    graph.delete_edge(&ContactNode::new("a"), &ContactNode::new("b")).await.unwrap();
    assert_eq!(names(&related(graph, ContactsParams::new(["a"])).await), vec!["c", "d"]);
    assert_eq!(names(&related(graph, ContactsParams::new(["b"])).await), vec!["c", "d"]);

    graph.delete_node(&ContactNode::new("c")).await.unwrap();
    assert_eq!(names(&related(graph, ContactsParams::new(["a"])).await), vec!["d"]);
    assert_eq!(names(&related(graph, ContactsParams::new(["d"])).await), vec!["a", "b"]);

    // "ds1" must not match nodes stored under "ds10"
    graph.delete_data_source("ds1").await.unwrap();
    let scoped = ContactsParams::new(["a"]).with_data_source("ds1");
    assert!(related(graph, scoped).await.is_empty());
    let ds10_seed = ContactsParams::new(["e"]).with_data_source("ds10");
    assert_eq!(names(&related(graph, ds10_seed).await), vec!["f"]);
    assert_eq!(names(&related(graph, ContactsParams::new(["d"])).await), vec!["a", "b"]);

    graph.delete_graph().await.unwrap();
    assert!(related(graph, ContactsParams::new(["d"])).await.is_empty());
}

async fn unwritten_type_is_not_an_edge<G: ContactGraph>(graph: &G) {
    add_clique(graph, 1, EdgeType::to(), 10, &["a", "b"]).await;

    let cc = ContactsParams::new(["a"]).with_edge_type(EdgeType::cc()).with_lower_bound(0);
    assert!(related(graph, cc).await.is_empty());
    let to = ContactsParams::new(["a"]).with_edge_type(EdgeType::to()).with_lower_bound(0);
    assert_eq!(names(&related(graph, to).await), vec!["b"]);
}

async fn concurrent_updates_converge<G: ContactGraph + Clone + 'static>(graph: &G) {
    const WRITERS: i64 = 40;
    let tasks: Vec<_> = (1..=WRITERS)
        .map(|ts| {
            let graph = graph.clone();
            tokio::spawn(async move {
                let update = EdgeUpdate::new(EdgeType::to(), ts);
                graph.update_edge(&ContactNode::new("a"), &ContactNode::new("b"), &update).await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    for (seed, other) in [("a", "b"), ("b", "a")] {
        let results = related(graph, ContactsParams::new([seed]).with_edge_type(EdgeType::to())).await;
        assert_eq!(results, vec![ContactResult { name: other.to_string(), weight: 3 * WRITERS as u64 }]);
        // last update is the max timestamp, whatever order the writes landed in
        let latest = ContactsParams::new([seed]).with_update_cutoff(WRITERS);
        assert_eq!(related(graph, latest).await.len(), 1);
        let after = ContactsParams::new([seed]).with_update_cutoff(WRITERS + 1);
        assert!(related(graph, after).await.is_empty());
    }
}
