//! HttpCatalog against a local one-shot HTTP responder.

use basin_selector::basin_types::{Level, LocationId};
use basin_selector::{CatalogConfig, CatalogError, HttpCatalog, LocationCatalog};
use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

const VILLAGES: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    { "type": "Feature", "geometry": null, "properties": {
        "id": 101, "name": "Bhitari", "parentId": "D3", "drainNo": 3,
        "population": 1840, "district": "Varanasi", "subDistrict": "Pindra",
        "state_name": "Uttar Pradesh" } },
    { "type": "Feature", "properties": {
        "id": "102", "name": "Sindhora", "parent_id": "D3", "catchment_id": "C1",
        "drain_no": 3, "population": 2210, "district": "Varanasi",
        "sub_district": "Pindra", "state": "Uttar Pradesh" } }
  ]
}"#;

/// Serve one canned response and hand back the request head.
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}/api/locations/", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&request).into_owned()
    });

    (base_url, handle)
}

fn catalog(base_url: String) -> HttpCatalog {
    HttpCatalog::new(CatalogConfig {
        base_url,
        timeout_secs: 5,
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn fetches_and_decodes_villages() {
    let (base_url, server) = serve_once("200 OK", VILLAGES).await;
    let catalog = catalog(base_url);

    let nodes = catalog
        .children(Level::Village, Some(&LocationId::from("D3")))
        .await
        .unwrap();

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /api/locations/villages?parent_id=D3 "));

    let villages: Vec<_> = nodes.iter().filter_map(|n| n.as_village()).collect();
    assert_eq!(villages.len(), 2);
    assert_eq!(villages[0].id, LocationId::from("101"));
    assert_eq!(villages[0].sub_district, "Pindra");
    assert_eq!(villages[0].catchment_id, None);
    assert_eq!(villages[1].catchment_id, Some(LocationId::from("C1")));
    assert_eq!(villages[1].population, 2210);
}

#[tokio::test]
async fn error_status_carries_body() {
    let (base_url, server) = serve_once("503 Service Unavailable", "maintenance").await;
    let catalog = catalog(base_url);

    let err = catalog.children(Level::River, None).await.unwrap_err();
    server.await.unwrap();

    assert_eq!(
        err,
        CatalogError::Status {
            status: 503,
            body: "maintenance".into()
        }
    );
}

#[tokio::test]
async fn record_missing_required_field_is_malformed() {
    let body = r#"{ "features": [ { "properties": { "id": "D3", "name": "Nala 3", "parent_id": "S7" } } ] }"#;
    let (base_url, server) = serve_once("200 OK", body).await;
    let catalog = catalog(base_url);

    let err = catalog
        .children(Level::Drain, Some(&LocationId::from("S7")))
        .await
        .unwrap_err();
    server.await.unwrap();

    assert!(matches!(
        err,
        CatalogError::MalformedRecord {
            level: Level::Drain,
            index: 0,
            ..
        }
    ));
}
