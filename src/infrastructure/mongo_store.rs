// MongoDB bucket and warehouse store
use crate::application::bucket_store::{
    BucketFilter, BucketStore, BulkOutcome, OpFailure, StoreError, WarehouseRepository,
};
use crate::domain::bucket::{Bucket, UpsertOp, BUCKET_CAPACITY};
use crate::domain::warehouse::WarehouseRef;
use crate::infrastructure::bson_mapper::{
    append_update, bucket_from_bson, bucket_match, open_bucket_filter, warehouse_from_bson,
    warehouse_to_bson,
};
use crate::infrastructure::config::StoreSettings;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};

#[derive(Debug, Clone)]
pub struct MongoStore {
    database: Database,
    buckets: Collection<Document>,
    warehouses: Collection<Document>,
}

fn unavailable(e: mongodb::error::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn command(e: mongodb::error::Error) -> StoreError {
    StoreError::Command(e.to_string())
}

/// One `writeErrors` entry; without a usable index the failed op is unknown
fn op_failure(entry: &Bson) -> Result<OpFailure, StoreError> {
    let malformed = || StoreError::Command(format!("malformed writeErrors entry: {entry}"));
    let Bson::Document(error) = entry else {
        return Err(malformed());
    };
    let index = match error.get("index") {
        Some(Bson::Int32(i)) => usize::try_from(*i).map_err(|_| malformed())?,
        Some(Bson::Int64(i)) => usize::try_from(*i).map_err(|_| malformed())?,
        _ => return Err(malformed()),
    };
    Ok(OpFailure {
        index,
        reason: error.get_str("errmsg").unwrap_or("unknown").to_string(),
    })
}

/// Per-op failures from the reply of an `update`/`insert` command
fn bulk_outcome(reply: &Document) -> Result<BulkOutcome, StoreError> {
    if let Ok(concern) = reply.get_document("writeConcernError") {
        return Err(StoreError::Command(format!(
            "write concern not satisfied: {}",
            concern.get_str("errmsg").unwrap_or("unknown")
        )));
    }

    let failures: Vec<OpFailure> = match reply.get_array("writeErrors") {
        Ok(errors) => errors
            .iter()
            .map(op_failure)
            .collect::<Result<Vec<_>, StoreError>>()?,
        Err(_) => Vec::new(),
    };

    Ok(BulkOutcome { failures })
}

impl MongoStore {
    /// Connect and ping; an unreachable server is reported here, at startup
    pub async fn connect(settings: &StoreSettings) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(&settings.uri)
            .await
            .map_err(unavailable)?;
        let database = client.database(&settings.database);
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(unavailable)?;

        tracing::info!(database = %settings.database, "Connected to MongoDB");
        Ok(Self {
            buckets: database.collection(&settings.bucket_collection),
            warehouses: database.collection(&settings.warehouse_collection),
            database,
        })
    }

    /// Indexes for trace queries, route queries and open-bucket lookup
    pub async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let capacity = BUCKET_CAPACITY as i32;
        let models = vec![
            IndexModel::builder()
                .keys(doc! { "vehicleId": 1, "minTs": 1, "maxTs": 1 })
                .build(),
            IndexModel::builder()
                .keys(doc! { "vehicleId": 1, "routeId": 1, "minTs": 1, "maxTs": 1 })
                .build(),
            IndexModel::builder()
                .keys(doc! { "vehicleId": 1, "routeId": 1, "bktSize": 1 })
                .options(
                    IndexOptions::builder()
                        .partial_filter_expression(doc! { "bktSize": { "$lt": capacity } })
                        .build(),
                )
                .build(),
        ];

        self.buckets.create_indexes(models).await.map_err(command)?;
        tracing::debug!("Bucket indexes in place");
        Ok(())
    }
}

#[async_trait]
impl BucketStore for MongoStore {
    async fn upsert_measurement(&self, op: &UpsertOp) -> Result<(), StoreError> {
        self.buckets
            .update_one(open_bucket_filter(op), append_update(op))
            .upsert(true)
            .await
            .map_err(command)?;
        Ok(())
    }

    async fn bulk_upsert(&self, ops: &[UpsertOp]) -> Result<BulkOutcome, StoreError> {
        let updates: Vec<Document> = ops
            .iter()
            .map(|op| {
                doc! {
                    "q": open_bucket_filter(op),
                    "u": append_update(op),
                    "upsert": true,
                }
            })
            .collect();

        let reply = self
            .database
            .run_command(doc! {
                "update": self.buckets.name(),
                "updates": updates,
                "ordered": false,
            })
            .await
            .map_err(command)?;

        bulk_outcome(&reply)
    }

    async fn find_buckets(&self, filter: &BucketFilter) -> Result<Vec<Bucket>, StoreError> {
        let pipeline = vec![
            doc! { "$match": bucket_match(filter) },
            doc! { "$sort": { "vehicleId": 1, "minTs": 1 } },
        ];

        let docs: Vec<Document> = self
            .buckets
            .aggregate(pipeline)
            .allow_disk_use(true)
            .await
            .map_err(unavailable)?
            .try_collect()
            .await
            .map_err(unavailable)?;

        docs.iter().map(bucket_from_bson).collect()
    }

    async fn list_vehicle_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self
            .buckets
            .distinct("vehicleId", doc! {})
            .await
            .map_err(unavailable)?
            .into_iter()
            .filter_map(|v| match v {
                Bson::String(s) => Some(s),
                _ => None,
            })
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl WarehouseRepository for MongoStore {
    async fn insert_warehouses(
        &self,
        warehouses: &[WarehouseRef],
    ) -> Result<BulkOutcome, StoreError> {
        let documents: Vec<Document> = warehouses.iter().map(warehouse_to_bson).collect();
        let reply = self
            .database
            .run_command(doc! {
                "insert": self.warehouses.name(),
                "documents": documents,
                "ordered": false,
            })
            .await
            .map_err(command)?;

        bulk_outcome(&reply)
    }

    async fn list_warehouses(&self) -> Result<Vec<WarehouseRef>, StoreError> {
        let docs: Vec<Document> = self
            .warehouses
            .find(doc! {})
            .await
            .map_err(unavailable)?
            .try_collect()
            .await
            .map_err(unavailable)?;

        docs.iter().map(warehouse_from_bson).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_outcome_without_errors() {
        let reply = doc! { "n": 10, "nModified": 9, "ok": 1.0 };
        assert!(bulk_outcome(&reply).unwrap().is_success());
    }

    #[test]
    fn test_write_error_without_index_fails_whole_call() {
        let reply = doc! {
            "n": 9,
            "writeErrors": [ { "code": 11000, "errmsg": "E11000 duplicate key" } ],
            "ok": 1.0,
        };
        assert!(matches!(
            bulk_outcome(&reply),
            Err(StoreError::Command(_))
        ));

        let negative = doc! { "writeErrors": [ { "index": -1, "errmsg": "bad" } ], "ok": 1.0 };
        assert!(bulk_outcome(&negative).is_err());
    }

    #[test]
    fn test_bulk_outcome_reports_failed_indices() {
        let reply = doc! {
            "n": 8,
            "writeErrors": [
                { "index": 2, "code": 11000, "errmsg": "E11000 duplicate key" },
                { "index": 7_i64, "code": 121, "errmsg": "Document failed validation" },
            ],
            "ok": 1.0,
        };
        let outcome = bulk_outcome(&reply).unwrap();
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(outcome.failures[0].index, 2);
        assert_eq!(outcome.failures[1].index, 7);
        assert_eq!(outcome.failures[0].reason, "E11000 duplicate key");
    }

    #[test]
    fn test_write_concern_error_fails_whole_call() {
        let reply = doc! {
            "n": 10,
            "writeConcernError": { "code": 64, "errmsg": "waiting for replication timed out" },
            "ok": 1.0,
        };
        assert!(matches!(
            bulk_outcome(&reply),
            Err(StoreError::Command(_))
        ));
    }
}
