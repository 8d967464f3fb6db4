use actix_web::{web, App, HttpServer};
use menuscan_core::testing::MemoryStore;
use menuscan_core::{CollectionPreparer, Config, RestaurantGenerator};
use menuscan_rs::{Client, ClientError, InstallRequest, Lookup, RestaurantQuery};
use menuscan_server::api;
use std::sync::Arc;

/// Serve the API over a seeded in-memory store on an ephemeral port
fn start_server(records: u64) -> Client {
    let store = Arc::new(MemoryStore::with_records(
        RestaurantGenerator::default().generate(0, records),
    ));
    let config = Config::default();
    let preparer = CollectionPreparer::from_config(Arc::clone(&store), &config.install);
    let state = web::Data::new(api::AppState::new(
        store,
        Arc::new(preparer),
        Arc::new(config),
    ));

    let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(api::configure))
        .workers(1)
        .bind("127.0.0.1:0")
        .unwrap();
    let addr = server.addrs()[0];
    actix_web::rt::spawn(server.run());

    Client::new(format!("http://{}", addr))
}

#[actix_web::test]
async fn test_ping_roundtrip() {
    let client = start_server(0);
    let status = client.ping().await.unwrap();
    assert_eq!(status.code, 200);
    assert_eq!(status.message, "pong!");
}

#[actix_web::test]
async fn test_scan_and_search_through_client() {
    let client = start_server(1_000);

    let found = client
        .scan(Lookup::All, &RestaurantQuery::new().city("CITY C"))
        .await
        .unwrap();
    assert_eq!(found.response.len(), 100);
    assert_eq!(found.status.message, "Found 100 restaurant(s)");

    let one = client
        .search(
            Lookup::One,
            &RestaurantQuery::new().state("STATE A").search_index("default"),
        )
        .await
        .unwrap();
    assert_eq!(one.response.len(), 1);

    let none = client
        .scan(Lookup::One, &RestaurantQuery::new().country("COUNTRY Z").explain())
        .await
        .unwrap();
    assert!(none.response.is_empty());
}

#[actix_web::test]
async fn test_rejected_install_surfaces_server_error() {
    let client = start_server(0);
    let err = client
        .run_install(&InstallRequest {
            install: "full".to_string(),
            load_indexes: false,
            document_count: Some(123),
        })
        .await
        .unwrap_err();

    match err {
        ClientError::Server { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("documentCount"));
        }
        other => panic!("unexpected error: {}", other),
    }
}
