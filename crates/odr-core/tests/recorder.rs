//! End-to-end recording scenarios over in-memory storage

use odr_core::{Recorder, RecorderConfig, RecorderError, ServiceConfig, TapResponse};
use odr_edm::{MetadataParseError, ODataVersion};
use odr_store::{MemoryStorage, SaveMode, Storage};
use odr_test_utils::{
    multipart_batch, multipart_part, stored_records, v2_collection, v2_orders_schema,
    v4_collection, v4_orders_schema, FailingSchemaReader, FailingStorage, StaticSchemaReader,
    EDMX_V2, EDMX_V4,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

const DATA_DIR: &str = "app/localService/main/data";

fn v4_service() -> ServiceConfig {
    ServiceConfig::new("main", ODataVersion::V4, "/odata/v4/orders/", DATA_DIR)
}

fn v2_service() -> ServiceConfig {
    ServiceConfig::new("main", ODataVersion::V2, "/sap/opu/odata/sap/ZSRV/", DATA_DIR)
}

fn active_config(service: ServiceConfig) -> RecorderConfig {
    RecorderConfig::new().with_service(service).with_auto_start(true)
}

fn v4_recorder(config: RecorderConfig, storage: Arc<dyn Storage>) -> Recorder {
    Recorder::new(config, storage, Arc::new(StaticSchemaReader::new(v4_orders_schema())))
}

fn path(file: &str) -> String {
    format!("{DATA_DIR}/{file}")
}

fn as_values(records: Vec<odr_edm::EntityRecord>) -> Value {
    Value::Array(records.into_iter().map(Value::Object).collect())
}

fn orders_page() -> String {
    v4_collection(
        "Orders",
        json!([
            {
                "ID": "o1",
                "customer_ID": "c1",
                "Items": [{ "ID": "i1", "qty": 2 }, { "ID": "i2", "qty": 1 }],
                "customer": { "ID": "c1", "name": "ACME" }
            },
            { "ID": "o2", "note": { "ID": "n1", "text": "call back" } }
        ]),
    )
}

#[tokio::test]
async fn v4_expansions_are_split_and_enriched() {
    let service = v4_service();
    let storage = Arc::new(MemoryStorage::new());
    let mut recorder = v4_recorder(active_config(service.clone()), storage.clone());

    recorder.handle(TapResponse::metadata(&service, EDMX_V4)).await;
    recorder
        .handle(TapResponse::json(&service, "/odata/v4/orders/Orders?$expand=Items,customer,note", orders_page()))
        .await;

    assert_eq!(storage.get("app/localService/main/metadata.xml").as_deref(), Some(EDMX_V4));
    assert_eq!(
        as_values(stored_records(&storage, path("Orders.json"))),
        json!([
            { "ID": "o1", "customer_ID": "c1" },
            { "ID": "o2", "note": { "ID": "n1", "text": "call back" } }
        ])
    );
    assert_eq!(
        as_values(stored_records(&storage, path("OrderItems.json"))),
        json!([
            { "ID": "i1", "qty": 2, "order_ID": "o1" },
            { "ID": "i2", "qty": 1, "order_ID": "o1" }
        ])
    );
    assert_eq!(
        as_values(stored_records(&storage, path("Customers.json"))),
        json!([{ "ID": "c1", "name": "ACME" }])
    );
    assert!(storage.get(path("Notes.json")).is_none());
}

#[tokio::test]
async fn identical_responses_are_idempotent() {
    let service = v4_service();
    let storage = Arc::new(MemoryStorage::new());
    let mut recorder = v4_recorder(active_config(service.clone()), storage.clone());
    recorder.handle(TapResponse::metadata(&service, EDMX_V4)).await;

    let response = TapResponse::json(&service, "/odata/v4/orders/Orders", orders_page());
    recorder.handle(response.clone()).await;
    let first = storage.get(path("Orders.json"));
    let writes = storage.write_count();

    recorder.handle(response).await;

    assert_eq!(storage.get(path("Orders.json")), first);
    assert_eq!(storage.write_count(), writes);
}

#[tokio::test]
async fn earliest_record_wins_across_responses() {
    let service = v4_service();
    let storage = Arc::new(MemoryStorage::new());
    let mut recorder = v4_recorder(active_config(service.clone()), storage.clone());
    recorder.handle(TapResponse::metadata(&service, EDMX_V4)).await;

    recorder
        .handle(TapResponse::json(
            &service,
            "/odata/v4/orders/Orders",
            v4_collection("Orders", json!([{ "ID": "o1", "status": "new" }])),
        ))
        .await;
    recorder
        .handle(TapResponse::json(
            &service,
            "/odata/v4/orders/Orders",
            v4_collection("Orders", json!([{ "ID": "o1", "status": "shipped" }, { "ID": "o3" }])),
        ))
        .await;

    assert_eq!(
        as_values(stored_records(&storage, path("Orders.json"))),
        json!([{ "ID": "o1", "status": "new" }, { "ID": "o3" }])
    );
}

#[tokio::test]
async fn unresolved_metadata_falls_back_to_whole_record_identity() {
    let service = v4_service();
    let storage = Arc::new(MemoryStorage::new());
    let mut recorder = v4_recorder(active_config(service.clone()), storage.clone());

    for status in ["new", "new", "shipped"] {
        recorder
            .handle(TapResponse::json(
                &service,
                "/odata/v4/orders/Orders",
                v4_collection("Orders", json!([{ "ID": "o1", "status": status, "Items": [{ "ID": "i1" }] }])),
            ))
            .await;
    }

    assert_eq!(
        as_values(stored_records(&storage, path("Orders.json"))),
        json!([
            { "ID": "o1", "status": "new", "Items": [{ "ID": "i1" }] },
            { "ID": "o1", "status": "shipped", "Items": [{ "ID": "i1" }] }
        ])
    );
    assert!(storage.get(path("OrderItems.json")).is_none());
}

#[tokio::test]
async fn v2_results_wrapper_and_deferred_links() {
    let service = v2_service();
    let storage = Arc::new(MemoryStorage::new());
    let mut recorder = Recorder::new(
        active_config(service.clone()),
        storage.clone(),
        Arc::new(StaticSchemaReader::new(v2_orders_schema())),
    );
    recorder.handle(TapResponse::metadata(&service, EDMX_V2)).await;

    let body = v2_collection(json!([{
        "__metadata": { "uri": "/sap/opu/odata/sap/ZSRV/Orders('1')" },
        "ID": "1",
        "to_Items": { "results": [{ "__metadata": { "uri": "OrderItems(OrderID='1',ItemID='10')" }, "ItemID": "10" }] },
        "to_Customer": { "__metadata": { "uri": "Customers('C1')" }, "ID": "C1" },
        "to_Notes": { "__deferred": { "uri": "Orders('1')/to_Notes" } }
    }]));
    recorder
        .handle(TapResponse::json(&service, "/sap/opu/odata/sap/ZSRV/Orders?$expand=to_Items,to_Customer", body))
        .await;

    assert_eq!(
        as_values(stored_records(&storage, path("Orders.json"))),
        json!([{
            "__metadata": { "uri": "/sap/opu/odata/sap/ZSRV/Orders('1')" },
            "ID": "1",
            "to_Notes": { "__deferred": { "uri": "Orders('1')/to_Notes" } },
            "to_Customer": { "__metadata": { "uri": "Customers('C1')" }, "ID": "C1" }
        }])
    );
    assert_eq!(
        as_values(stored_records(&storage, path("OrderItems.json"))),
        json!([{
            "__metadata": { "uri": "OrderItems(OrderID='1',ItemID='10')" },
            "ItemID": "10",
            "OrderID": "1"
        }])
    );
    assert!(storage.get(path("Customers.json")).is_none());
}

#[tokio::test]
async fn on_stop_mode_buffers_until_stop() {
    let service = v4_service();
    let storage = Arc::new(MemoryStorage::new());
    let config = RecorderConfig::new().with_service(service.clone());
    let mut recorder = v4_recorder(config, storage.clone());

    recorder.handle(TapResponse::metadata(&service, EDMX_V4)).await;
    assert!(storage.paths().is_empty(), "inactive recorder writes nothing");

    let (recording_id, mode) = recorder.start(Some("demo"), Some(SaveMode::OnStop));
    assert_eq!((recording_id.as_deref(), mode), (Some("demo"), SaveMode::OnStop));

    recorder.handle(TapResponse::metadata(&service, EDMX_V4)).await;
    recorder
        .handle(TapResponse::json(&service, "/odata/v4/orders/Orders", orders_page()))
        .await;
    recorder
        .handle(TapResponse::json(&service, "/odata/v4/orders/Orders", orders_page()))
        .await;

    let status = recorder.status();
    assert!(status.active);
    assert_eq!(
        status.buffered_keys,
        vec!["main|demo|Orders", "main|demo|OrderItems", "main|demo|Customers"]
    );
    assert!(storage.get(path("Orders-demo.json")).is_none());

    assert_eq!(recorder.stop().await, 3);

    let status = recorder.status();
    assert!(!status.active);
    assert!(status.buffered_keys.is_empty());
    assert_eq!(stored_records(&storage, path("Orders-demo.json")).len(), 2);
    assert_eq!(stored_records(&storage, path("OrderItems-demo.json")).len(), 2);
    assert_eq!(stored_records(&storage, path("Customers-demo.json")).len(), 1);
}

#[tokio::test]
async fn start_clears_buffers() {
    let service = v4_service();
    let storage = Arc::new(MemoryStorage::new());
    let config = active_config(service.clone()).with_auto_save(SaveMode::OnStop);
    let mut recorder = v4_recorder(config, storage.clone());

    recorder
        .handle(TapResponse::json(&service, "/odata/v4/orders/Orders", orders_page()))
        .await;
    assert_eq!(recorder.status().buffered_keys.len(), 1);

    recorder.start(None, None);
    assert!(recorder.status().buffered_keys.is_empty());
    assert_eq!(recorder.flush().await, 0);
    assert!(storage.paths().is_empty());
}

#[tokio::test]
async fn storage_failure_is_isolated_per_entity_set() {
    let service = v4_service();
    let storage = Arc::new(FailingStorage::matching("Customers"));
    let mut recorder = v4_recorder(active_config(service.clone()), storage.clone());
    recorder.handle(TapResponse::metadata(&service, EDMX_V4)).await;

    recorder
        .handle(TapResponse::json(&service, "/odata/v4/orders/Orders", orders_page()))
        .await;

    let written = storage.inner();
    assert_eq!(stored_records(written, path("Orders.json")).len(), 2);
    assert_eq!(stored_records(written, path("OrderItems.json")).len(), 2);
    assert!(written.get(path("Customers.json")).is_none());
}

#[tokio::test]
async fn failed_flush_write_does_not_block_others() {
    let service = v4_service();
    let storage = Arc::new(FailingStorage::matching("OrderItems"));
    let config = active_config(service.clone()).with_auto_save(SaveMode::OnStop);
    let mut recorder = v4_recorder(config, storage.clone());
    recorder.handle(TapResponse::metadata(&service, EDMX_V4)).await;

    recorder
        .handle(TapResponse::json(&service, "/odata/v4/orders/Orders", orders_page()))
        .await;

    assert_eq!(recorder.flush().await, 2);
    assert!(storage.inner().get(path("Orders.json")).is_some());
    assert!(storage.inner().get(path("Customers.json")).is_some());
    assert!(recorder.status().buffered_keys.is_empty());
}

#[tokio::test]
async fn rejected_metadata_keeps_previous_index() {
    let service = v4_service();
    let storage = Arc::new(MemoryStorage::new());
    let mut recorder = Recorder::new(
        active_config(service.clone()),
        storage.clone(),
        Arc::new(FailingSchemaReader),
    );
    recorder.load_schema("main", v4_orders_schema()).unwrap();

    let err = recorder
        .process(&TapResponse::metadata(&service, EDMX_V4))
        .await
        .unwrap_err();
    assert!(matches!(err, RecorderError::Metadata(MetadataParseError::Malformed(_))));

    // document is kept even though it could not be read
    assert_eq!(storage.get("app/localService/main/metadata.xml").as_deref(), Some(EDMX_V4));
    let index = recorder.registry().get("main").unwrap();
    assert_eq!(index.keys_for_entity_set("Orders"), vec!["ID"]);
}

#[tokio::test]
async fn non_xml_metadata_is_skipped() {
    let service = v4_service();
    let storage = Arc::new(MemoryStorage::new());
    let mut recorder = v4_recorder(active_config(service.clone()), storage.clone());

    let err = recorder
        .process(&TapResponse::metadata(&service, r#"{"error":"backend down"}"#))
        .await
        .unwrap_err();
    assert!(matches!(err, RecorderError::Metadata(MetadataParseError::NotMetadata(_))));

    recorder
        .process(&TapResponse::metadata(&service, EDMX_V4).with_status(304))
        .await
        .unwrap();
    recorder.process(&TapResponse::metadata(&service, "  ")).await.unwrap();

    assert!(storage.paths().is_empty());
    assert!(recorder.registry().is_empty());
}

#[tokio::test]
async fn metadata_writing_can_be_disabled() {
    let service = v4_service();
    let storage = Arc::new(MemoryStorage::new());
    let config = active_config(service.clone()).with_write_metadata(false);
    let mut recorder = v4_recorder(config, storage.clone());

    recorder.handle(TapResponse::metadata(&service, EDMX_V4)).await;

    assert!(storage.paths().is_empty());
    assert!(recorder.registry().contains("main"));
}

#[tokio::test]
async fn error_and_non_json_responses_are_skipped() {
    let service = v4_service();
    let storage = Arc::new(MemoryStorage::new());
    let mut recorder = v4_recorder(active_config(service.clone()), storage.clone());
    let page = v4_collection("Orders", json!([{ "ID": "o1" }]));

    for status in [401, 403, 404, 500] {
        recorder
            .process(&TapResponse::json(&service, "/odata/v4/orders/Orders", page.clone()).with_status(status))
            .await
            .unwrap();
    }
    recorder
        .process(
            &TapResponse::json(&service, "/odata/v4/orders/Orders", page.clone())
                .with_content_type("text/html"),
        )
        .await
        .unwrap();

    assert!(storage.paths().is_empty());
}

#[tokio::test]
async fn malformed_and_unknown_responses_report_errors() {
    let service = v4_service();
    let storage = Arc::new(MemoryStorage::new());
    let mut recorder = v4_recorder(active_config(service.clone()), storage.clone());

    let err = recorder
        .process(&TapResponse::json(&service, "/odata/v4/orders/Orders", "<html>"))
        .await
        .unwrap_err();
    assert!(matches!(err, RecorderError::Payload(_)));

    let mut foreign = TapResponse::json(&service, "/other/Orders", "{}");
    foreign.service_alias = "other".to_string();
    let err = recorder.process(&foreign).await.unwrap_err();
    assert!(matches!(err, RecorderError::UnknownService(ref alias) if alias == "other"));

    // handle() logs instead of failing
    recorder.handle(foreign).await;
    assert!(storage.paths().is_empty());
}

#[tokio::test]
async fn service_is_matched_by_base_path_without_alias() {
    let service = v4_service();
    let storage = Arc::new(MemoryStorage::new());
    let mut recorder = v4_recorder(active_config(service.clone()), storage.clone());

    let mut response = TapResponse::json(
        &service,
        "/odata/v4/orders/Customers('c9')",
        json!({ "@odata.context": "$metadata#Customers/$entity", "ID": "c9", "name": "Initech" }).to_string(),
    );
    response.service_alias.clear();
    recorder.process(&response).await.unwrap();

    assert_eq!(
        as_values(stored_records(&storage, path("Customers.json"))),
        json!([{ "@odata.context": "$metadata#Customers/$entity", "ID": "c9", "name": "Initech" }])
    );
}

#[tokio::test]
async fn batch_sub_responses_are_recorded() {
    let service = v4_service();
    let storage = Arc::new(MemoryStorage::new());
    let mut recorder = v4_recorder(active_config(service.clone()), storage.clone());
    recorder.handle(TapResponse::metadata(&service, EDMX_V4)).await;

    let body = multipart_batch(
        "batch_1",
        &[
            multipart_part(200, &v4_collection("Customers", json!([{ "ID": "c1", "name": "ACME" }]))),
            multipart_part(404, r#"{"error":{"code":"404","message":"not found"}}"#),
            multipart_part(200, &v4_collection("Notes", json!([{ "ID": "n1", "text": "hi" }]))),
        ],
    );
    recorder
        .handle(TapResponse::batch(&service, "multipart/mixed; boundary=batch_1", body))
        .await;

    assert_eq!(
        as_values(stored_records(&storage, path("Customers.json"))),
        json!([{ "ID": "c1", "name": "ACME" }])
    );
    assert_eq!(stored_records(&storage, path("Notes.json")).len(), 1);
    assert_eq!(storage.paths().len(), 3);
}

#[tokio::test]
async fn redacted_fields_never_reach_storage() {
    let service = v4_service();
    let storage = Arc::new(MemoryStorage::new());
    let config = active_config(service.clone()).with_redact(["password"]);
    let mut recorder = v4_recorder(config, storage.clone());
    recorder.handle(TapResponse::metadata(&service, EDMX_V4)).await;

    let body = v4_collection(
        "Orders",
        json!([{
            "ID": "o1",
            "customer_ID": "c1",
            "password": "hunter2",
            "customer": { "ID": "c1", "password": "swordfish" }
        }]),
    );
    recorder
        .handle(TapResponse::json(&service, "/odata/v4/orders/Orders", body))
        .await;

    assert_eq!(
        as_values(stored_records(&storage, path("Orders.json"))),
        json!([{ "ID": "o1", "customer_ID": "c1" }])
    );
    assert_eq!(
        as_values(stored_records(&storage, path("Customers.json"))),
        json!([{ "ID": "c1" }])
    );
}

#[tokio::test]
async fn default_recording_id_suffixes_files() {
    let service = v4_service();
    let storage = Arc::new(MemoryStorage::new());
    let config = active_config(service.clone()).with_default_recording_id("tenant-a");
    let mut recorder = v4_recorder(config, storage.clone());

    recorder
        .handle(TapResponse::json(
            &service,
            "/odata/v4/orders/Notes",
            v4_collection("Notes", json!([{ "ID": "n1" }])),
        ))
        .await;
    assert!(storage.get(path("Notes-tenant-a.json")).is_some());

    recorder.start(Some("demo"), None);
    recorder
        .handle(TapResponse::json(
            &service,
            "/odata/v4/orders/Notes",
            v4_collection("Notes", json!([{ "ID": "n2" }])),
        ))
        .await;
    assert!(storage.get(path("Notes-demo.json")).is_some());
}
