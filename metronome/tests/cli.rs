use assert_cmd::Command;
use mockito::{Matcher, Server};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

const METRICS: &str =
    r#"_({"metrics": ["pdns.ns1.example.com.auth.udp-queries", "other.metric"]});"#;

fn metronome(server: &Server) -> Command {
    let mut command = Command::cargo_bin("metronome").expect("create the metronome command");
    command
        .env("METRONOME_URL", server.url())
        .env("LOG_FILTER", "warn")
        .args(["--num-io-threads", "1"]);
    command
}

fn get_metrics(server: &mut Server, status: usize, hits: usize) -> mockito::Mock {
    server
        .mock("GET", "/")
        .match_query(Matcher::UrlEncoded("do".into(), "get-metrics".into()))
        .with_status(status)
        .with_body(METRICS)
        .expect(hits)
        .create()
}

#[test]
fn find_prints_nodes() {
    let mut server = Server::new();
    let list = get_metrics(&mut server, 200, 2);

    let output = metronome(&server)
        .args(["find", "other.*"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(
        String::from_utf8_lossy(&output),
        "other.metric leaf\nother.metric_dt leaf\n"
    );

    let output = metronome(&server)
        .args(["find", "_pdns_view.auth.*"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(
        String::from_utf8_lossy(&output),
        "_pdns_view.auth.ns1--example--com branch\n"
    );

    list.assert();
}

#[test]
fn find_rejects_invalid_pattern() {
    let mut server = Server::new();
    let list = get_metrics(&mut server, 200, 0);

    let output = metronome(&server)
        .args(["find", "pdns.{auth,recursor"])
        .assert()
        .failure()
        .code(1)
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8_lossy(&output);
    assert!(
        stderr.contains("Find command failed: invalid pattern"),
        "{stderr}"
    );

    list.assert();
}

#[test]
fn find_reports_unavailable_catalog() {
    let mut server = Server::new();
    let _list = get_metrics(&mut server, 503, 1);

    let output = metronome(&server)
        .args(["find", "*"])
        .assert()
        .failure()
        .code(1)
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8_lossy(&output);
    assert!(
        stderr.contains("Find command failed: metric catalog unavailable"),
        "{stderr}"
    );
}

#[test]
fn fetch_prints_json() {
    let mut server = Server::new();
    let raw = (0..103)
        .map(|i| format!("[{}, {i}]", 1_000 + i * 10))
        .collect::<Vec<_>>()
        .join(", ");
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
        .with_body(format!(
            "_({{ raw: {{\"other.metric\": [{raw}]}}, derivative: {{}}}});"
        ))
        .create();

    let output = metronome(&server)
        .args(["fetch", "--end", "2030", "--range", "30s", "other.metric"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let document: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(
        document,
        json!({
            "start": 2000,
            "end": 2030,
            "step": 10,
            "series": { "other.metric": [100.0, 101.0, 102.0] },
        })
    );

    retrieve.assert();
}

#[test]
fn fetch_requires_paths() {
    let server = Server::new();

    metronome(&server)
        .args(["fetch", "--end", "2030"])
        .assert()
        .failure()
        .code(2);
}
