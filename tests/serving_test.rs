//! Read-path protocol tests: pagination, canonical redirects and fragmentation visibility.

use std::sync::Arc;

use futures_util::TryStreamExt;
use serde_json::Value;
use streamtree::config::ServerConfig;
use streamtree::core::{EntityStatus, Fragmentation, ShaclPath, StrategyConfig};
use streamtree::hypermedia::{TREE_MEMBER, TREE_NODE, TREE_RELATION, TREE_REMAINING_ITEMS, TREE_VALUE};
use streamtree::registry::{BuildRegistry, BuildStatus};
use streamtree::serving::{
    CreateFragmentation, DataService, OperatorService, PageRequest, RegisterStream, Reply,
};
use streamtree::storage::{MemoryStorage, Storage};
use streamtree::Error;

const BASE: &str = "http://streams.test";
const SOURCE: &str = "http://example.org/streams/cities";
const CREATED: &str = "http://purl.org/dc/terms/created";
const NAME: &str = "http://example.org/name";

struct Fixture {
    storage: Arc<dyn Storage>,
    data: DataService,
    operator: OperatorService,
}

fn fixture(page_size: usize) -> Fixture {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::with_chunk_size(3));
    let config = ServerConfig {
        base_url: Some(BASE.to_string()),
        page_size,
        bucket_page_size: page_size,
        ..Default::default()
    };
    Fixture {
        data: DataService::new(Arc::clone(&storage), &config),
        operator: OperatorService::new(Arc::clone(&storage), BuildRegistry::new(), config.progress_interval),
        storage,
    }
}

fn register(name: &str) -> RegisterStream {
    RegisterStream {
        name: name.to_string(),
        source_uri: SOURCE.to_string(),
        time_property: vec![CREATED.to_string()],
    }
}

fn city(id: u32, created: &str, name: &str) -> String {
    format!(
        "<http://example.org/city/{id}> <{CREATED}> \"{created}\"^^<http://www.w3.org/2001/XMLSchema#dateTime> .\n\
         <http://example.org/city/{id}> <{NAME}> \"{name}\" .\n"
    )
}

/// Events stamped t1, t1, t2, t3.
fn cities_payload() -> String {
    [
        city(1, "2021-09-01T10:00:01Z", "gent"),
        city(2, "2021-09-01T10:00:01Z", "genk"),
        city(3, "2021-09-01T10:00:02Z", "brugge"),
        city(4, "2021-09-01T10:00:03Z", "gentbrugge"),
    ]
    .concat()
}

async fn seeded(page_size: usize) -> Fixture {
    let fixture = fixture(page_size);
    fixture.operator.register_stream(register("cities")).await.unwrap();
    let stored = fixture.operator.ingest("cities", &cities_payload()).await.unwrap();
    assert_eq!(stored, 4);
    fixture
}

async fn build_names(fixture: &Fixture) {
    let request = CreateFragmentation {
        name: "names".to_string(),
        shacl_path: vec![NAME.to_string()],
        strategy: Default::default(),
    };
    fixture.operator.create_fragmentation("cities", request).await.unwrap();
    let finished = fixture
        .operator
        .builds()
        .wait(&(SOURCE.to_string(), "names".to_string()))
        .await
        .unwrap();
    assert_eq!(finished.status, BuildStatus::Completed);
}

fn document(reply: Reply) -> Value {
    match reply {
        Reply::Document(body) => body,
        Reply::Redirect(location) => panic!("unexpected redirect to {}", location),
    }
}

fn members(view: &Value) -> Vec<String> {
    view["@included"][0][TREE_MEMBER]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["@id"].as_str().unwrap().to_string())
        .collect()
}

fn next_link(view: &Value) -> Option<(String, String)> {
    let relations = view[TREE_RELATION].as_array().unwrap();
    relations.first().map(|r| {
        (
            r[TREE_NODE]["@id"].as_str().unwrap().to_string(),
            r[TREE_VALUE]["@value"].as_str().unwrap().to_string(),
        )
    })
}

#[tokio::test]
async fn test_first_page_ends_on_timestamp_boundary() {
    let fixture = seeded(2).await;
    let view = document(fixture.data.collection("cities", &PageRequest::default()).await.unwrap());

    assert_eq!(view["@id"], format!("{}/data/cities", BASE));
    assert_eq!(members(&view), vec!["http://example.org/city/1", "http://example.org/city/2"]);

    let (node, value) = next_link(&view).unwrap();
    assert_eq!(value, "2021-09-01T10:00:01Z");
    assert_eq!(node, format!("{}/data/cities?since=2021-09-01T10:00:01Z", BASE));
}

#[tokio::test]
async fn test_following_next_reaches_the_end_once() {
    let fixture = seeded(2).await;
    let view = document(
        fixture.data.collection("cities", &PageRequest::since("2021-09-01T10:00:01Z")).await.unwrap(),
    );

    assert_eq!(view["@id"], format!("{}/data/cities?since=2021-09-01T10:00:01Z", BASE));
    assert_eq!(members(&view), vec!["http://example.org/city/3", "http://example.org/city/4"]);
    assert!(next_link(&view).is_none());
}

#[tokio::test]
async fn test_limit_one_walk_visits_every_event_once() {
    let fixture = seeded(1).await;
    let mut request = PageRequest::default();
    let mut seen = Vec::new();
    let mut pages = 0;

    loop {
        let view = document(fixture.data.collection("cities", &request).await.unwrap());
        seen.extend(members(&view));
        pages += 1;
        match next_link(&view) {
            Some((_, since)) => request = PageRequest::since(&since),
            None => break,
        }
    }

    // [t1, t1] then [t2] then [t3]
    assert_eq!(pages, 3);
    assert_eq!(
        seen,
        vec![
            "http://example.org/city/1",
            "http://example.org/city/2",
            "http://example.org/city/3",
            "http://example.org/city/4",
        ]
    );
}

#[tokio::test]
async fn test_empty_stream_has_no_next() {
    let fixture = fixture(2);
    fixture.operator.register_stream(register("cities")).await.unwrap();
    let view = document(fixture.data.collection("cities", &PageRequest::default()).await.unwrap());

    assert!(members(&view).is_empty());
    assert!(next_link(&view).is_none());
}

#[tokio::test]
async fn test_alias_redirects_to_canonical_with_query() {
    let fixture = seeded(2).await;
    fixture.operator.register_stream(register("steden")).await.unwrap();

    let request = PageRequest::since("2021-09-01T10:00:01Z");
    let reply = fixture.data.collection("cities", &request).await.unwrap();
    assert_eq!(
        reply,
        Reply::Redirect(format!("{}/data/steden?since=2021-09-01T10:00:01Z", BASE))
    );

    // The redirect target serves what the old name would have.
    let canonical = document(fixture.data.collection("steden", &request).await.unwrap());
    assert_eq!(members(&canonical), vec!["http://example.org/city/3", "http://example.org/city/4"]);
}

#[tokio::test]
async fn test_alias_redirect_covers_fragment_routes() {
    let fixture = seeded(2).await;
    build_names(&fixture).await;
    fixture.operator.register_stream(register("steden")).await.unwrap();

    let index = fixture.data.fragmentation_index("cities", "names", &PageRequest::default()).await.unwrap();
    assert_eq!(index, Reply::Redirect(format!("{}/data/steden/names", BASE)));

    let fragment = fixture.data.fragment("cities", "names", "ge", &PageRequest::default()).await.unwrap();
    assert_eq!(fragment, Reply::Redirect(format!("{}/data/steden/names/ge", BASE)));
}

#[tokio::test]
async fn test_unknown_stream_is_not_found() {
    let fixture = fixture(2);
    let result = fixture.data.collection("nowhere", &PageRequest::default()).await;
    assert!(matches!(result, Err(Error::StreamNotFound(_))));
}

#[tokio::test]
async fn test_malformed_cursor_is_rejected() {
    let fixture = seeded(2).await;
    let result = fixture.data.collection("cities", &PageRequest::since("yesterday")).await;
    assert!(matches!(result, Err(Error::InvalidCursor(_))));
}

#[tokio::test]
async fn test_index_lists_every_bucket_with_counts() {
    let fixture = seeded(10).await;
    build_names(&fixture).await;

    let view = document(
        fixture.data.fragmentation_index("cities", "names", &PageRequest::default()).await.unwrap(),
    );
    assert_eq!(view["@id"], format!("{}/data/cities/names", BASE));

    let relations = view[TREE_RELATION].as_array().unwrap();
    let gen = relations
        .iter()
        .find(|r| r[TREE_VALUE]["@value"] == "gen")
        .expect("bucket 'gen' is indexed");
    assert_eq!(gen[TREE_NODE]["@id"], format!("{}/data/cities/names/gen", BASE));
    // gent, genk and gentbrugge
    assert_eq!(gen[TREE_NODE][TREE_REMAINING_ITEMS], 3);

    let values: Vec<&str> = relations.iter().map(|r| r[TREE_VALUE]["@value"].as_str().unwrap()).collect();
    assert!(values.contains(&"b"));
    assert!(values.contains(&"gentbrugge"));
}

#[tokio::test]
async fn test_fragment_returns_bucket_members() {
    let fixture = seeded(10).await;
    build_names(&fixture).await;

    let nodes = document(fixture.data.fragment("cities", "names", "gent", &PageRequest::default()).await.unwrap());
    let ids: Vec<&str> = nodes.as_array().unwrap().iter().map(|n| n["@id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["http://example.org/city/1", "http://example.org/city/4"]);

    let later = document(
        fixture
            .data
            .fragment("cities", "names", "gent", &PageRequest::since("2021-09-01T10:00:01Z"))
            .await
            .unwrap(),
    );
    assert_eq!(later.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_absent_and_retired_fragmentations_are_hidden() {
    let fixture = seeded(10).await;

    // Never defined.
    let unknown = fixture.data.fragmentation_index("cities", "names", &PageRequest::default()).await;
    assert!(matches!(unknown, Err(Error::FragmentationNotFound(_))));

    build_names(&fixture).await;
    assert!(fixture.data.fragmentation_index("cities", "names", &PageRequest::default()).await.is_ok());

    let retired = fixture.operator.retire_fragmentation("cities", "names").await.unwrap();
    assert_eq!(retired.status, EntityStatus::Retired);

    let index = fixture.data.fragmentation_index("cities", "names", &PageRequest::default()).await;
    assert!(matches!(index, Err(Error::FragmentationNotFound(_))));
    let fragment = fixture.data.fragment("cities", "names", "g", &PageRequest::default()).await;
    assert!(matches!(fragment, Err(Error::FragmentationNotFound(_))));

    // Retiring again is a no-op.
    let again = fixture.operator.retire_fragmentation("cities", "names").await.unwrap();
    assert_eq!(again.status, EntityStatus::Retired);
}

#[tokio::test]
async fn test_building_fragmentation_with_buckets_is_hidden() {
    let fixture = seeded(10).await;
    let fragmentation = Fragmentation::new(
        SOURCE,
        "names",
        ShaclPath::new(vec![NAME.to_string()]),
        StrategyConfig::default(),
    );
    fixture.storage.add_fragmentation(fragmentation).await.unwrap();

    // A backfill in progress has already written part of a bucket.
    let mut events = fixture.storage.get_events_by_stream(SOURCE, None).await.unwrap();
    let first = events.try_next().await.unwrap().unwrap();
    fixture.storage.append_event_to_bucket(SOURCE, "names", "g", &first).await.unwrap();
    assert_eq!(fixture.storage.get_buckets_by_fragmentation(SOURCE, "names").await.unwrap().len(), 1);

    let stored = fixture.storage.get_fragmentation_by_name(SOURCE, "names").await.unwrap().unwrap();
    assert_eq!(stored.status, EntityStatus::Building);

    let index = fixture.data.fragmentation_index("cities", "names", &PageRequest::default()).await;
    assert!(matches!(index, Err(Error::FragmentationNotFound(_))));
    let fragment = fixture.data.fragment("cities", "names", "g", &PageRequest::default()).await;
    assert!(matches!(fragment, Err(Error::FragmentationNotFound(_))));
}

#[tokio::test]
async fn test_failed_fragmentation_is_hidden_and_retirable() {
    let fixture = seeded(10).await;
    let mut fragmentation = Fragmentation::new(
        SOURCE,
        "names",
        ShaclPath::new(vec![NAME.to_string()]),
        StrategyConfig::default(),
    );
    fragmentation.status = EntityStatus::Failed;
    fixture.storage.add_fragmentation(fragmentation).await.unwrap();

    let index = fixture.data.fragmentation_index("cities", "names", &PageRequest::default()).await;
    assert!(matches!(index, Err(Error::FragmentationNotFound(_))));

    let retired = fixture.operator.retire_fragmentation("cities", "names").await.unwrap();
    assert_eq!(retired.status, EntityStatus::Retired);
}

#[tokio::test]
async fn test_recreating_a_fragmentation_conflicts() {
    let fixture = seeded(10).await;
    build_names(&fixture).await;

    let again = CreateFragmentation {
        name: "names".to_string(),
        shacl_path: vec![NAME.to_string()],
        strategy: Default::default(),
    };
    let result = fixture.operator.create_fragmentation("cities", again).await;
    assert!(matches!(result, Err(Error::Conflict(_))));
}
