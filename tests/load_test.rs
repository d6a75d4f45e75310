//! Load testing: many concurrent pages through the sample host.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::net::TcpListener;
use transclusion::config::AppConfig;
use transclusion::http::HttpServer;
use transclusion::lifecycle::Shutdown;

mod common;
use common::{start_fragment_backend, MockResponse};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pages_fetch_each_fragment_once() {
    // 1. Fragment sources
    let backend = start_fragment_backend(|path| {
        MockResponse::ok(&format!("[{path}]"))
            .header("Cache-Control", "max-age=120")
            .delayed(Duration::from_millis(100))
    })
    .await;

    // 2. Host
    let config = AppConfig::default();
    let transcluder = Arc::new(common::transcluder(config.transclusion.clone()));
    let server = HttpServer::with_transcluder(config, transcluder);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = format!("http://{}", listener.local_addr().unwrap());

    let shutdown = Shutdown::new();
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    // 3. Fire concurrent requests for the same page
    let page = format!(
        r#"<html><inc src="{}"/><main><inc src="{}" primary/></main></html>"#,
        backend.url("/nav"),
        backend.url("/content")
    );
    let client = common::http_client();
    let total_requests = 50;
    let start = Instant::now();

    let responses = join_all((0..total_requests).map(|_| {
        let client = client.clone();
        let url = format!("{host}/verify");
        let page = page.clone();
        async move {
            let res = client.post(url).body(page).send().await.unwrap();
            let status = res.status();
            let cache_control = res
                .headers()
                .get("cache-control")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            (status, cache_control, res.text().await.unwrap())
        }
    }))
    .await;

    let duration = start.elapsed();
    println!("Load test: {} requests in {:?}", total_requests, duration);

    // 4. Every page assembled, every fragment fetched once
    for (status, cache_control, body) in &responses {
        assert_eq!(status.as_u16(), 200);
        assert_eq!(body, "<html>[/nav]<main>[/content]</main></html>");
        let cache_control = cache_control.as_deref().unwrap();
        assert!(cache_control.starts_with("max-age="), "{cache_control}");
    }
    assert_eq!(backend.hits("/nav"), 1);
    assert_eq!(backend.hits("/content"), 1);

    let stats: serde_json::Value = client
        .get(format!("{host}/cache/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["entries"], 2);

    // 5. Graceful shutdown
    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), server_task)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}
