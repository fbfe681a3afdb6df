//! End-to-end tests for the import pipeline against a mocked Feedly API.
//!
//! Each test starts its own mock server and in-memory database.

use serde_json::{Value, json};
use sqlx::Row;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use feedly_to_sqlite::client::FeedlyClient;
use feedly_to_sqlite::db::Database;
use feedly_to_sqlite::flatten::FieldMap;
use feedly_to_sqlite::import::{ImportSummary, Importer};
use feedly_to_sqlite::Error;

const TOKEN: &str = "test-token";
const BOARD_ID: &str = "user/abc/tag/Read Later";

fn collections_fixture() -> Value {
    json!([{
        "id": "user/abc/category/tech",
        "label": "Tech",
        "created": 1700000000000i64,
        "customizable": true,
        "feeds": [
            {
                "id": "feed/https://blog.rust-lang.org/feed.xml",
                "title": "Rust Blog",
                "website": "https://blog.rust-lang.org/",
                "topics": ["rust", "programming"],
                "updated": 1700000001000i64,
                "language": "en",
                "state": "alive",
                "velocity": 1.2
            },
            {
                "id": "feed/https://lwn.net/headlines/rss",
                "title": "LWN.net",
                "website": "https://lwn.net"
            }
        ]
    }])
}

fn boards_fixture() -> Value {
    json!([{"id": BOARD_ID, "label": "Read Later", "created": 1}])
}

fn stream_fixture() -> Value {
    json!({
        "id": BOARD_ID,
        "items": [
            {
                "id": "item-1",
                "title": "Announcing Rust 1.80",
                "published": 1700000002000i64,
                "crawled": 1700000003000i64,
                "unread": false,
                "origin": {"title": "Rust Blog", "streamId": "feed/x"},
                "content": {"content": "<p>Hello</p>"},
                "alternate": [{"href": "https://blog.rust-lang.org/1.80", "type": "text/html"}]
            },
            {
                "id": "item-2",
                "title": "No extras",
                "alternate": []
            }
        ]
    })
}

async fn mount_api(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v3/collections"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(collections_fixture()))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v3/boards"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(boards_fixture()))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v3/streams/contents"))
        .and(query_param("streamId", BOARD_ID))
        .and(query_param("unreadOnly", "false"))
        .and(query_param("ranked", "oldest"))
        .and(query_param("count", "500"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stream_fixture()))
        .mount(server)
        .await;
}

async fn importer(server: &MockServer) -> Importer {
    Importer::new(
        Database::in_memory().await.unwrap(),
        FeedlyClient::new(&server.uri(), TOKEN),
        FieldMap::builtin().unwrap(),
    )
}

#[tokio::test]
async fn imports_everything() {
    let server = MockServer::start().await;
    mount_api(&server).await;
    let importer = importer(&server).await;

    let summary = importer.run().await.unwrap();

    assert_eq!(
        summary,
        ImportSummary {
            collections: 1,
            feeds: 2,
            boards: 1,
            items: 2,
        }
    );

    let db = importer.database();
    assert_eq!(
        db.table_names().await.unwrap(),
        ["boards", "boards_items", "collections", "collections_feeds", "feeds", "items"]
    );
    assert_eq!(db.count("collections").await.unwrap(), 1);
    assert_eq!(db.count("feeds").await.unwrap(), 2);
    assert_eq!(db.count("collections_feeds").await.unwrap(), 2);
    assert_eq!(db.count("boards").await.unwrap(), 1);
    assert_eq!(db.count("items").await.unwrap(), 2);
    assert_eq!(db.count("boards_items").await.unwrap(), 2);
}

#[tokio::test]
async fn only_allow_listed_fields_are_stored() {
    let server = MockServer::start().await;
    mount_api(&server).await;
    let importer = importer(&server).await;
    importer.run().await.unwrap();
    let db = importer.database();

    assert_eq!(db.columns("collections").await.unwrap(), ["label", "created", "id"]);
    assert_eq!(
        db.columns("items").await.unwrap(),
        [
            "id",
            "title",
            "published",
            "crawled",
            "unread",
            "readTime",
            "actionTimestamp",
            "origin_title",
            "content_content",
            "alternate_href",
            "alternate_type",
        ]
    );

    let item = sqlx::query(
        "SELECT origin_title, content_content, alternate_href, alternate_type FROM items WHERE id = ?",
    )
    .bind("item-1")
    .fetch_one(&db.pool)
    .await
    .unwrap();
    assert_eq!(item.get::<String, _>(0), "Rust Blog");
    assert_eq!(item.get::<String, _>(1), "<p>Hello</p>");
    assert_eq!(item.get::<String, _>(2), "https://blog.rust-lang.org/1.80");
    assert_eq!(item.get::<String, _>(3), "text/html");

    let bare = sqlx::query("SELECT origin_title, alternate_href FROM items WHERE id = ?")
        .bind("item-2")
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(bare.get::<Option<String>, _>(0), None);
    assert_eq!(bare.get::<Option<String>, _>(1), None);

    let topics: String = sqlx::query("SELECT topics FROM feeds WHERE title = 'Rust Blog'")
        .fetch_one(&db.pool)
        .await
        .unwrap()
        .get(0);
    assert_eq!(topics, r#"["rust","programming"]"#);
}

#[tokio::test]
async fn running_twice_changes_nothing() {
    let server = MockServer::start().await;
    mount_api(&server).await;
    let importer = importer(&server).await;

    importer.run().await.unwrap();
    importer.run().await.unwrap();

    let db = importer.database();
    for (table, expected) in [
        ("collections", 1),
        ("feeds", 2),
        ("collections_feeds", 2),
        ("boards", 1),
        ("items", 2),
        ("boards_items", 2),
    ] {
        assert_eq!(db.count(table).await.unwrap(), expected, "{}", table);
    }

    let label: String = sqlx::query("SELECT label FROM boards")
        .fetch_one(&db.pool)
        .await
        .unwrap()
        .get(0);
    assert_eq!(label, "Read Later");
}

#[tokio::test]
async fn collection_links_point_at_its_feeds() {
    let server = MockServer::start().await;
    mount_api(&server).await;
    let importer = importer(&server).await;
    importer.run().await.unwrap();

    let links = sqlx::query(
        "SELECT collections_id, feeds_id FROM collections_feeds ORDER BY feeds_id",
    )
    .fetch_all(&importer.database().pool)
    .await
    .unwrap();

    let pairs: Vec<(String, String)> = links
        .iter()
        .map(|row| (row.get(0), row.get(1)))
        .collect();
    assert_eq!(
        pairs,
        [
            (
                "user/abc/category/tech".to_string(),
                "feed/https://blog.rust-lang.org/feed.xml".to_string()
            ),
            (
                "user/abc/category/tech".to_string(),
                "feed/https://lwn.net/headlines/rss".to_string()
            ),
        ]
    );
}

#[tokio::test]
async fn unauthorized_collections_aborts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/collections"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/boards"))
        .respond_with(ResponseTemplate::new(200).set_body_json(boards_fixture()))
        .expect(0)
        .mount(&server)
        .await;
    let importer = importer(&server).await;

    let err = importer.run().await.unwrap_err();

    match err {
        Error::Http { status, .. } => assert_eq!(status.as_u16(), 401),
        other => panic!("expected HTTP error, got {:?}", other),
    }
    assert!(importer.database().table_names().await.unwrap().is_empty());
}

#[tokio::test]
async fn failing_stream_keeps_earlier_writes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/collections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(collections_fixture()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/boards"))
        .respond_with(ResponseTemplate::new(200).set_body_json(boards_fixture()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/streams/contents"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let importer = importer(&server).await;

    let err = importer.run().await.unwrap_err();

    assert!(matches!(err, Error::Http { .. }));
    let db = importer.database();
    assert_eq!(db.count("collections").await.unwrap(), 1);
    assert_eq!(db.count("boards").await.unwrap(), 1);
    assert!(db.columns("items").await.unwrap().is_empty());
}

#[tokio::test]
async fn board_without_items_key_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/collections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/boards"))
        .respond_with(ResponseTemplate::new(200).set_body_json(boards_fixture()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/streams/contents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": BOARD_ID})))
        .mount(&server)
        .await;
    let importer = importer(&server).await;

    let summary = importer.run().await.unwrap();

    assert_eq!(summary.boards, 1);
    assert_eq!(summary.items, 0);
}
