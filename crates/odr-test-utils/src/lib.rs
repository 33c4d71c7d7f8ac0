//! Testing utilities for ODR workspace
//!
//! Shared schemas, payload builders and storage doubles.

#![allow(missing_docs)]

use async_trait::async_trait;
use odr_edm::{
    Association, AssociationSet, EntityRecord, EntitySet, EntityType, MetadataIndex,
    MetadataParseError, NavigationProperty, ODataVersion, Schema, SchemaReader,
};
use odr_store::{MemoryStorage, Storage, StorageError};
use serde_json::Value;
use std::path::Path;

pub const EDMX_V4: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<edmx:Edmx Version="4.0" xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx">
  <edmx:DataServices/>
</edmx:Edmx>"#;

pub const EDMX_V2: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<edmx:Edmx Version="1.0" xmlns:edmx="http://schemas.microsoft.com/ado/2007/06/edmx">
  <edmx:DataServices m:DataServiceVersion="2.0"/>
</edmx:Edmx>"#;

/// V4 order service
///
/// - `Orders.customer` → `Customers`, constraint `customer_ID → ID`
/// - `Orders.Items` → `OrderItems`, constraint only on the partner `order`
/// - `Orders.note` → `Notes`, no constraint
/// - `Orders.DraftAdministrativeData`, containment
pub fn v4_orders_schema() -> Schema {
    Schema::new(ODataVersion::V4)
        .with_entity_set(
            EntitySet::new("Orders", "OrderService.Orders")
                .with_binding("Items", "OrderItems")
                .with_binding("customer", "Customers")
                .with_binding("note", "Notes")
                .with_binding("DraftAdministrativeData", "DraftAdministrativeData"),
        )
        .with_entity_set(EntitySet::new("OrderItems", "OrderService.OrderItems").with_binding("order", "Orders"))
        .with_entity_set(EntitySet::new("Customers", "OrderService.Customers"))
        .with_entity_set(EntitySet::new("Notes", "OrderService.Notes"))
        .with_entity_set(EntitySet::new(
            "DraftAdministrativeData",
            "OrderService.DraftAdministrativeData",
        ))
        .with_entity_type(
            EntityType::new("OrderService.Orders", ["ID"])
                .with_navigation(
                    NavigationProperty::v4("Items", "Collection(OrderService.OrderItems)", true)
                        .with_partner("order"),
                )
                .with_navigation(
                    NavigationProperty::v4("customer", "OrderService.Customers", false)
                        .with_constraint("customer_ID", "ID"),
                )
                .with_navigation(NavigationProperty::v4("note", "OrderService.Notes", false))
                .with_navigation(
                    NavigationProperty::v4(
                        "DraftAdministrativeData",
                        "OrderService.DraftAdministrativeData",
                        false,
                    )
                    .containing()
                    .with_constraint("DraftUUID", "DraftUUID"),
                ),
        )
        .with_entity_type(
            EntityType::new("OrderService.OrderItems", ["ID"]).with_navigation(
                NavigationProperty::v4("order", "OrderService.Orders", false)
                    .with_partner("Items")
                    .with_constraint("order_ID", "ID"),
            ),
        )
        .with_entity_type(EntityType::new("OrderService.Customers", ["ID"]))
        .with_entity_type(EntityType::new("OrderService.Notes", ["ID"]))
        .with_entity_type(EntityType::new("OrderService.DraftAdministrativeData", ["DraftUUID"]))
}

/// V2 order service
///
/// - `Orders.to_Items` → `OrderItems`, association constraint `ID → OrderID`
/// - `Orders.to_Customer` → `Customers`, association without constraint
pub fn v2_orders_schema() -> Schema {
    Schema::new(ODataVersion::V2)
        .with_entity_set(EntitySet::new("Orders", "ZSRV.Order"))
        .with_entity_set(EntitySet::new("OrderItems", "ZSRV.OrderItem"))
        .with_entity_set(EntitySet::new("Customers", "ZSRV.Customer"))
        .with_entity_type(
            EntityType::new("Order", ["ID"])
                .with_navigation(NavigationProperty::v2(
                    "to_Items",
                    "ZSRV.Order_Items",
                    "FromRole_Order",
                    "ToRole_Items",
                ))
                .with_navigation(NavigationProperty::v2(
                    "to_Customer",
                    "ZSRV.Order_Customer",
                    "FromRole_Order",
                    "ToRole_Customer",
                )),
        )
        .with_entity_type(EntityType::new("OrderItem", ["OrderID", "ItemID"]))
        .with_entity_type(EntityType::new("Customer", ["ID"]))
        .with_association(Association::new("ZSRV.Order_Items").with_constraint("ID", "OrderID"))
        .with_association(Association::new("ZSRV.Order_Customer"))
        .with_association_set(
            AssociationSet::new("Order_ItemsSet", "ZSRV.Order_Items")
                .with_end("FromRole_Order", "Orders")
                .with_end("ToRole_Items", "OrderItems"),
        )
        .with_association_set(
            AssociationSet::new("Order_CustomerSet", "ZSRV.Order_Customer")
                .with_end("FromRole_Order", "Orders")
                .with_end("ToRole_Customer", "Customers"),
        )
}

pub fn v4_index() -> MetadataIndex {
    MetadataIndex::new(v4_orders_schema())
}

pub fn v2_index() -> MetadataIndex {
    MetadataIndex::new(v2_orders_schema())
}

/// Reader that returns a fixed schema for any document
#[derive(Debug, Clone)]
pub struct StaticSchemaReader {
    schema: Schema,
}

impl StaticSchemaReader {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }
}

impl SchemaReader for StaticSchemaReader {
    fn read(&self, _text: &str) -> Result<Schema, MetadataParseError> {
        Ok(self.schema.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Reader that rejects every document
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingSchemaReader;

impl SchemaReader for FailingSchemaReader {
    fn read(&self, _text: &str) -> Result<Schema, MetadataParseError> {
        Err(MetadataParseError::malformed("unexpected end of document"))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

pub fn record(value: Value) -> EntityRecord {
    match value {
        Value::Object(map) => map,
        other => panic!("expected JSON object, got {other}"),
    }
}

/// `{"@odata.context": "$metadata#<set>", "value": [...]}`
pub fn v4_collection(entity_set: &str, values: Value) -> String {
    serde_json::json!({
        "@odata.context": format!("$metadata#{entity_set}"),
        "value": values,
    })
    .to_string()
}

/// `{"d": {"results": [...]}}`
pub fn v2_collection(values: Value) -> String {
    serde_json::json!({ "d": { "results": values } }).to_string()
}

/// One `application/http` part carrying a JSON response
pub fn multipart_part(status: u16, body: &str) -> String {
    format!(
        "Content-Type: application/http\r\n\
Content-Transfer-Encoding: binary\r\n\
\r\n\
HTTP/1.1 {status} OK\r\n\
Content-Type: application/json\r\n\
\r\n\
{body}\r\n"
    )
}

/// Multipart batch body from prepared parts
pub fn multipart_batch(boundary: &str, parts: &[String]) -> String {
    let mut body = String::new();
    for part in parts {
        body.push_str(&format!("--{boundary}\r\n{part}"));
    }
    body.push_str(&format!("--{boundary}--\r\n"));
    body
}

/// Parse a stored entity file
pub fn stored_records(storage: &MemoryStorage, path: impl AsRef<Path>) -> Vec<EntityRecord> {
    let text = storage
        .get(path.as_ref())
        .unwrap_or_else(|| panic!("no file at {}", path.as_ref().display()));
    serde_json::from_str(&text).unwrap()
}

/// Storage whose writes fail, for every path or only matching ones
///
/// Non-failing operations are served by an inner [`MemoryStorage`].
#[derive(Debug, Default)]
pub struct FailingStorage {
    inner: MemoryStorage,
    pattern: Option<String>,
}

impl FailingStorage {
    /// Fail every write
    pub fn always() -> Self {
        Self::default()
    }

    /// Fail writes to paths containing `pattern`
    pub fn matching(pattern: impl Into<String>) -> Self {
        Self {
            inner: MemoryStorage::new(),
            pattern: Some(pattern.into()),
        }
    }

    pub fn inner(&self) -> &MemoryStorage {
        &self.inner
    }

    fn fails(&self, path: &Path) -> bool {
        self.pattern
            .as_deref()
            .map_or(true, |pattern| path.to_string_lossy().contains(pattern))
    }
}

#[async_trait]
impl Storage for FailingStorage {
    async fn write_file(&self, path: &Path, text: &str) -> Result<(), StorageError> {
        if self.fails(path) {
            return Err(StorageError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only file system"),
            ));
        }
        self.inner.write_file(path, text).await
    }

    async fn read_file(&self, path: &Path) -> Result<Option<String>, StorageError> {
        self.inner.read_file(path).await
    }

    async fn file_exists(&self, path: &Path) -> bool {
        self.inner.file_exists(path).await
    }
}
