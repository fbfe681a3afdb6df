use log::{debug, info};
use serde_json::Value;

use crate::client::FeedlyClient;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::flatten::{FieldMap, flatten};

pub const COLLECTIONS: &str = "collections";
pub const FEEDS: &str = "feeds";
pub const BOARDS: &str = "boards";
pub const ITEMS: &str = "items";
const PRIMARY_KEY: &str = "id";

/// How many entities a run wrote, counting repeats
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub collections: usize,
    pub feeds: usize,
    pub boards: usize,
    pub items: usize,
}

/// Fetches everything from Feedly and writes it into the database, in order.
pub struct Importer {
    db: Database,
    client: FeedlyClient,
    fields: FieldMap,
}

impl Importer {
    pub fn new(db: Database, client: FeedlyClient, fields: FieldMap) -> Self {
        Self { db, client, fields }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn run(&self) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();
        self.import_collections(&mut summary).await?;
        self.import_boards(&mut summary).await?;
        Ok(summary)
    }

    async fn import_collections(&self, summary: &mut ImportSummary) -> Result<()> {
        info!("Downloading subscriptions");
        let collections = self.client.collections().await?;

        for collection in &collections {
            let id = entity_id(COLLECTIONS, collection)?;
            let row = flatten(collection, &self.fields.collection);
            self.db.upsert_entity(COLLECTIONS, PRIMARY_KEY, &row).await?;
            summary.collections += 1;

            let feeds = collection
                .get("feeds")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            debug!("Collection {} has {} feeds", id, feeds.len());

            for feed in feeds {
                let feed_row = flatten(feed, &self.fields.feed);
                self.db
                    .link(COLLECTIONS, id, FEEDS, PRIMARY_KEY, &feed_row)
                    .await?;
                summary.feeds += 1;
            }
        }

        Ok(())
    }

    async fn import_boards(&self, summary: &mut ImportSummary) -> Result<()> {
        info!("Downloading boards");
        let boards = self.client.boards().await?;

        for board in &boards {
            let id = entity_id(BOARDS, board)?;
            let row = flatten(board, &self.fields.board);
            self.db.upsert_entity(BOARDS, PRIMARY_KEY, &row).await?;
            summary.boards += 1;

            let items = self.client.stream_contents(id).await?;
            info!("Board {}: {} items", id, items.len());

            for item in &items {
                let item_row = flatten(item, &self.fields.item);
                self.db
                    .link(BOARDS, id, ITEMS, PRIMARY_KEY, &item_row)
                    .await?;
                summary.items += 1;
            }
        }

        Ok(())
    }
}

fn entity_id<'v>(table: &str, entity: &'v Value) -> Result<&'v str> {
    entity
        .get(PRIMARY_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::MissingPrimaryKey {
            table: table.to_string(),
            key: PRIMARY_KEY.to_string(),
        })
}
