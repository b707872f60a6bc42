use axum::{Router, extract::State, routing::get};
use pmoserver::Server;

#[tokio::test]
async fn test_routes_are_served_on_ephemeral_port() {
    let mut server = Server::new("test", "127.0.0.1", 0);

    server
        .add_route("/info", || async { serde_json::json!({"version": "1.0.0"}) })
        .await;

    async fn echo(State(name): State<String>) -> String {
        name
    }
    server
        .add_handler_with_state("/name", echo, "salon".to_string())
        .await;

    server
        .add_router("/api", Router::new().route("/ping", get(|| async { "pong" })))
        .await;

    server.start().await.expect("bind");
    let addr = server.local_addr().expect("bound address");
    assert_eq!(server.info().http_port, addr.port());

    let base = format!("http://127.0.0.1:{}", addr.port());

    let info: serde_json::Value = reqwest::get(format!("{}/info", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info["version"], "1.0.0");

    let name = reqwest::get(format!("{}/name", base))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(name, "salon");

    let pong = reqwest::get(format!("{}/api/ping", base))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(pong, "pong");
}
