use std::sync::Arc;

use metronome_client::Client;
use metronome_finder::{Error, FinderConfig, MetronomeFinder, Node};
use mockito::{Matcher, Server};
use pretty_assertions::assert_eq;

const METRICS: &str = r#"_({"metrics": ["pdns.ns1.example.com.auth.udp-queries", "other.metric"]});"#;

fn finder(server: &Server) -> MetronomeFinder {
    let client = Client::new(server.url()).expect("create client");
    MetronomeFinder::new(Arc::new(client), FinderConfig::default())
}

/// A `retrieve` body with `n` samples spaced 10s apart from `begin`, raw values counting up from 0
/// and a constant derivative of 0.5
fn retrieve_body(path: &str, begin: i64, n: i64) -> String {
    let raw = (0..n)
        .map(|i| format!("[{}, {}]", begin + i * 10, i))
        .collect::<Vec<_>>()
        .join(", ");
    let derivative = (0..n)
        .map(|i| format!("[{}, 0.5]", begin + i * 10))
        .collect::<Vec<_>>()
        .join(", ");
    format!("_({{ raw: {{\"{path}\": [{raw}]}}, derivative: {{\"{path}\": [{derivative}]}}}});")
}

#[test_log::test(tokio::test)]
async fn find_and_fetch_view_paths() {
    let mut server = Server::new_async().await;
    let list = server
        .mock("GET", "/")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("do".into(), "get-metrics".into()),
            Matcher::UrlEncoded("callback".into(), "_".into()),
        ]))
        .with_status(200)
        .with_body(METRICS)
        .create_async()
        .await;
    let retrieve = server
        .mock("GET", "/")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("do".into(), "retrieve".into()),
            Matcher::UrlEncoded(
                "name".into(),
                "pdns.ns1.example.com.auth.udp-queries".into(),
            ),
            Matcher::UrlEncoded("begin".into(), "1000".into()),
            Matcher::UrlEncoded("end".into(), "2030".into()),
            Matcher::UrlEncoded("datapoints".into(), "103".into()),
            Matcher::UrlEncoded("callback".into(), "_".into()),
        ]))
        .with_status(200)
        .with_body(retrieve_body("pdns.ns1.example.com.auth.udp-queries", 1_000, 103))
        .create_async()
        .await;

    let finder = finder(&server);

    let nodes: Vec<Node> = finder.find("_pdns_view.auth.*").await.unwrap().collect();
    assert_eq!(
        nodes,
        vec![Node::Branch("_pdns_view.auth.ns1--example--com".to_string())]
    );
    let leaves: Vec<String> = finder
        .find("_pdns_view.auth.ns1--example--com.auth.*")
        .await
        .unwrap()
        .filter(Node::is_leaf)
        .map(|n| n.path().to_string())
        .collect();
    assert_eq!(
        leaves,
        vec![
            "_pdns_view.auth.ns1--example--com.auth.udp-queries",
            "_pdns_view.auth.ns1--example--com.auth.udp-queries_dt",
        ]
    );

    // 3 points over [2000, 2030), requested with 100 leading points at a step of 10
    let result = finder.fetch(&leaves, 2_000, 2_030).await.unwrap();
    assert!(result.warnings.is_empty());
    assert_eq!((result.window.points, result.window.step), (3, 10));
    assert_eq!(
        result.series[&leaves[0]],
        vec![Some(100.0), Some(101.0), Some(102.0)]
    );
    assert_eq!(result.series[&leaves[1]], vec![Some(0.5); 3]);
    assert_eq!(result.series.len(), 2);

    list.assert_async().await;
    retrieve.assert_async().await;
}

#[test_log::test(tokio::test)]
async fn fetch_trims_leading_points() {
    let mut server = Server::new_async().await;
    let retrieve = server
        .mock("GET", "/")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("do".into(), "retrieve".into()),
            Matcher::UrlEncoded("name".into(), "other.metric".into()),
            Matcher::UrlEncoded("begin".into(), "1000".into()),
            Matcher::UrlEncoded("end".into(), "2030".into()),
            Matcher::UrlEncoded("datapoints".into(), "103".into()),
        ]))
        .with_status(200)
        .with_body(retrieve_body("other.metric", 1_000, 103))
        .create_async()
        .await;

    let finder = finder(&server);
    let paths = vec!["other.metric".to_string(), "other.metric_dt".to_string()];
    let result = finder.fetch(&paths, 2_000, 2_030).await.unwrap();

    assert_eq!((result.window.points, result.window.step), (3, 10));
    assert_eq!(
        result.series["other.metric"],
        vec![Some(100.0), Some(101.0), Some(102.0)]
    );
    assert_eq!(result.series["other.metric_dt"], vec![Some(0.5); 3]);

    // the follow-up fetch of the preceding range is answered from the cached leading points
    let (window, values) = finder
        .reader("other.metric")
        .fetch(1_970, 2_000)
        .await
        .unwrap();
    assert_eq!(window.points, 3);
    assert_eq!(values, vec![Some(97.0), Some(98.0), Some(99.0)]);

    retrieve.assert_async().await;
}

#[tokio::test]
async fn failed_chunk_is_not_fatal() {
    let mut server = Server::new_async().await;
    let _retrieve = server
        .mock("GET", "/")
        .match_query(Matcher::UrlEncoded("do".into(), "retrieve".into()))
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;

    let finder = finder(&server);
    let result = finder
        .fetch(&["a.b".to_string()], 0, 600)
        .await
        .unwrap();

    assert!(result.series.is_empty());
    assert_eq!(result.warnings.len(), 1);
    assert!(matches!(result.warnings[0], Error::ChunkFetch { paths: 1, .. }));
}

#[tokio::test]
async fn invalid_jsonp_is_fatal() {
    let mut server = Server::new_async().await;
    let _retrieve = server
        .mock("GET", "/")
        .match_query(Matcher::UrlEncoded("do".into(), "retrieve".into()))
        .with_status(200)
        .with_body("_({ raw: {\"a.b\": [[0, 1]}, derivative: {}});")
        .create_async()
        .await;

    let finder = finder(&server);
    let err = finder
        .fetch(&["a.b".to_string()], 0, 600)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::BackendProtocol { .. }), "{err}");
}

#[tokio::test]
async fn catalog_unavailable() {
    let mut server = Server::new_async().await;
    let _list = server
        .mock("GET", "/")
        .match_query(Matcher::UrlEncoded("do".into(), "get-metrics".into()))
        .with_status(503)
        .create_async()
        .await;

    let finder = finder(&server);
    let err = finder.find("*").await.unwrap_err();
    assert!(matches!(err, Error::CatalogUnavailable { .. }), "{err}");
}
