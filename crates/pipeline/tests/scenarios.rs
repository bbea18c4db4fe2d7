//! End-to-end fixtures for the commit coordinator: one test per scenario,
//! each driving a real `coordinator::commit` against a migrated database
//! rather than poking the `db` accessors directly.

use content::{BalancesOracleConfig, ContentLimits, ContentRegistry};
use models::content::executable::{CodeVolume, Environment, ProgramContent, Resources, RuntimeRef, Triggers};
use models::content::{AggregateContent, Content, ForgetContent, PostContent, StoreContent};
use models::{Chain, ItemHash, ItemType, Message, MessageType};
use pipeline::coordinator::{commit, Trigger};
use pipeline::GarbageCollector;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use storage::{ContentFetcher, FileSystemEngine, StorageEngine};

async fn registry() -> ContentRegistry {
    let dir = tempfile::tempdir().unwrap();
    let local = Arc::new(FileSystemEngine::new(dir.path()).await.unwrap());
    let fetcher = Arc::new(ContentFetcher::new(local, None, None));
    ContentRegistry::new(
        fetcher,
        costs::default_schedule(),
        BalancesOracleConfig {
            post_type: "balances".to_string(),
            addresses: vec![],
        },
        ContentLimits::default(),
    )
}

fn base(item_hash: &str, sender: &str, message_type: MessageType, content: Content, time: f64) -> Message {
    Message {
        item_hash: ItemHash::new(item_hash),
        sender: sender.to_string(),
        chain: Chain::Test,
        message_type,
        item_type: ItemType::Inline,
        item_content: Some("{}".to_string()),
        signature: None,
        time,
        channel: None,
        content,
        size: 2,
    }
}

fn aggregate_element(item_hash: &str, address: &str, key: &str, body: serde_json::Value, time: f64) -> Message {
    let content = Content::Aggregate(AggregateContent {
        address: address.to_string(),
        key: key.to_string(),
        content: body.as_object().unwrap().clone(),
        time,
    });
    base(item_hash, address, MessageType::Aggregate, content, time)
}

#[sqlx::test]
async fn inline_aggregate_append_folds_in_arrival_order(pool: sqlx::PgPool) -> sqlx::Result<()> {
    let registry = registry().await;

    let first = aggregate_element("e1", "0xa", "k", json!({"a": 1}), 1.0);
    commit(&first, &registry, Trigger::Pending(uuid::Uuid::new_v4(), None), &pool)
        .await
        .unwrap();

    let second = aggregate_element("e2", "0xa", "k", json!({"b": 2}), 2.0);
    commit(&second, &registry, Trigger::Pending(uuid::Uuid::new_v4(), None), &pool)
        .await
        .unwrap();

    let mut txn = pool.begin().await?;
    let aggregate = db::aggregates::get("0xa", "k", &mut txn).await?.expect("aggregate exists");
    assert_eq!(aggregate.content.0, json!({"a": 1, "b": 2}));
    Ok(())
}

#[sqlx::test]
async fn out_of_order_aggregate_element_loses_to_the_later_write(pool: sqlx::PgPool) -> sqlx::Result<()> {
    let registry = registry().await;

    let late = aggregate_element("e3", "0xa", "k", json!({"a": "aleph"}), 3.0);
    commit(&late, &registry, Trigger::Pending(uuid::Uuid::new_v4(), None), &pool)
        .await
        .unwrap();

    // Arrives after the fact but timestamped earlier -- the recompute path
    // must still converge on the newer value for the shared key.
    let stale = aggregate_element("e2", "0xa", "k", json!({"a": "alien"}), 2.0);
    commit(&stale, &registry, Trigger::Pending(uuid::Uuid::new_v4(), None), &pool)
        .await
        .unwrap();

    let mut txn = pool.begin().await?;
    let aggregate = db::aggregates::get("0xa", "k", &mut txn).await?.expect("aggregate exists");
    assert_eq!(aggregate.content.0, json!({"a": "aleph"}));
    Ok(())
}

#[sqlx::test]
async fn post_amend_replaces_the_content_a_reader_sees(pool: sqlx::PgPool) -> sqlx::Result<()> {
    let registry = registry().await;

    let original = base(
        "h1",
        "0xa",
        MessageType::Post,
        Content::Post(PostContent {
            address: "0xa".to_string(),
            post_type: "article".to_string(),
            reference: None,
            content: json!({"body": "v1"}),
            time: 1.0,
        }),
        1.0,
    );
    commit(&original, &registry, Trigger::Pending(uuid::Uuid::new_v4(), None), &pool)
        .await
        .unwrap();

    let amend = base(
        "h2",
        "0xa",
        MessageType::Post,
        Content::Post(PostContent {
            address: "0xa".to_string(),
            post_type: PostContent::AMEND_TYPE.to_string(),
            reference: Some(ItemHash::new("h1")),
            content: json!({"body": "v2"}),
            time: 2.0,
        }),
        2.0,
    );
    commit(&amend, &registry, Trigger::Pending(uuid::Uuid::new_v4(), None), &pool)
        .await
        .unwrap();

    let mut txn = pool.begin().await?;
    let row = db::posts::get(&ItemHash::new("h1"), &mut txn).await?.expect("original post");
    assert_eq!(row.latest_amend, Some(ItemHash::new("h2")));
    Ok(())
}

#[sqlx::test]
async fn forgetting_a_store_message_removes_its_blob_after_gc(pool: sqlx::PgPool) -> sqlx::Result<()> {
    let registry = registry().await;
    let dir = tempfile::tempdir().unwrap();
    let local: Arc<dyn storage::StorageEngine> = Arc::new(FileSystemEngine::new(dir.path()).await.unwrap());

    // The store message's own item_hash doubles as the file hash here, so
    // the sweep's "does a REMOVING message share this blob's hash" check
    // (spec §4.14) lines up without a second indirection table.
    let file = ItemHash::new("f1");
    local.write(file.as_str(), bytes::Bytes::from_static(b"hello")).await.unwrap();

    let store = base(
        "f1",
        "0xa",
        MessageType::Store,
        Content::Store(StoreContent {
            address: "0xa".to_string(),
            item_type: ItemType::Storage,
            item_hash: file.clone(),
            reference: None,
            size: Some(5),
            time: 1.0,
        }),
        1.0,
    );
    // StoreHandler::fetch_related_content normally pulls the blob; pre-seed
    // the row it would have written so commit() can run standalone.
    {
        let mut txn = pool.begin().await?;
        db::files::upsert_stored_file(&file, 5, "storage", &mut txn).await?;
        txn.commit().await?;
    }
    commit(&store, &registry, Trigger::Pending(uuid::Uuid::new_v4(), None), &pool)
        .await
        .unwrap();

    let forget = base(
        "forget1",
        "0xa",
        MessageType::Forget,
        Content::Forget(ForgetContent {
            address: "0xa".to_string(),
            hashes: vec![file.clone()],
            aggregates: vec![],
            reason: None,
            time: 2.0,
        }),
        2.0,
    );
    commit(&forget, &registry, Trigger::Pending(uuid::Uuid::new_v4(), None), &pool)
        .await
        .unwrap();

    let mut txn = pool.begin().await?;
    let status = db::messages::get_status_in_txn(&file, &mut txn).await?.expect("status row");
    assert_eq!(status.status, models::MessageStatus::Removing);
    txn.commit().await?;

    // Simulate the grace period elapsing (spec §4.14's 25h window).
    let mut txn = pool.begin().await?;
    db::files::add_grace_period_pin(&file, chrono::Utc::now() - chrono::Duration::hours(1), &mut txn).await?;
    txn.commit().await?;

    let gc = GarbageCollector::new(pool.clone(), local, std::time::Duration::from_secs(3600), 10);
    let swept = gc.sweep_once().await?;
    assert_eq!(swept, 1);

    let mut txn = pool.begin().await?;
    assert!(db::files::get_stored_file(&file, &mut txn).await?.is_none());
    let status = db::messages::get_status_in_txn(&file, &mut txn).await?.expect("status row");
    assert_eq!(status.status, models::MessageStatus::Removed);
    Ok(())
}

fn program_message(item_hash: &str, address: &str) -> Message {
    let content = ProgramContent {
        address: address.to_string(),
        allow_amend: false,
        metadata: None,
        variables: None,
        environment: Environment::default(),
        resources: Resources {
            vcpus: 1,
            memory: 128,
            seconds: 30,
        },
        requirements: None,
        code: CodeVolume {
            encoding: "zip".to_string(),
            entrypoint: "main.py".to_string(),
            reference: ItemHash::new("code"),
            use_latest: false,
        },
        runtime: RuntimeRef {
            reference: ItemHash::new("runtime"),
            use_latest: false,
            comment: None,
        },
        data: None,
        volumes: vec![],
        on: Triggers {
            http: true,
            message: None,
            persistent: false,
        },
        replaces: None,
        time: 1.0,
    };
    base(item_hash, address, MessageType::Program, Content::Program(content), 1.0)
}

#[sqlx::test]
async fn program_exceeding_balance_is_rejected_without_a_vm_row(pool: sqlx::PgPool) -> sqlx::Result<()> {
    let registry = registry().await;

    let mut txn = pool.begin().await?;
    db::files::upsert_stored_file(&ItemHash::new("code"), 1024, "storage", &mut txn).await?;
    db::files::upsert_stored_file(&ItemHash::new("runtime"), 1024, "storage", &mut txn).await?;
    db::balances::upsert(
        &db::balances::BalanceRow {
            address: "0xa".to_string(),
            chain: "ETH".to_string(),
            dapp: "".to_string(),
            balance: dec!(1),
            eth_height: 1,
        },
        &mut txn,
    )
    .await?;
    txn.commit().await?;

    let program = program_message("vm1", "0xa");
    let err = commit(&program, &registry, Trigger::Pending(uuid::Uuid::new_v4(), None), &pool)
        .await
        .unwrap_err();

    assert_eq!(err.into_processing().error_code(), models::ErrorCode::BalanceInsufficient);

    let mut txn = pool.begin().await?;
    assert!(db::vms::get(&ItemHash::new("vm1"), &mut txn).await?.is_none());
    Ok(())
}

#[sqlx::test]
async fn confirming_tx_seen_before_its_message_still_links_once_it_commits(pool: sqlx::PgPool) -> sqlx::Result<()> {
    let registry = registry().await;

    // The ingestor enqueues a pending row carrying the confirming tx hash
    // before the message itself has ever reached the `messages` table
    // (spec §4.12); the chain_tx row it points at must exist first, since
    // `confirmations` has a foreign key into it.
    let mut txn = pool.begin().await?;
    db::chain_txs::insert_if_new(
        &db::chain_txs::ChainTxRow {
            hash: "tx1".to_string(),
            chain: "ETH".to_string(),
            height: 100,
            tx_datetime: chrono::Utc::now(),
            publisher: "0xpublisher".to_string(),
            protocol: "aleph".to_string(),
            protocol_version: 1,
            content: sqlx::types::Json(json!({"item_hash": "h3"})),
        },
        &mut txn,
    )
    .await?;
    let pending_id = uuid::Uuid::new_v4();
    db::pending::enqueue(
        db::pending::NewPending {
            item_hash: &ItemHash::new("h3"),
            sender: "0xa",
            chain: Chain::Test,
            message_type: MessageType::Post,
            item_type: ItemType::Inline,
            item_content: Some("{}"),
            signature: None,
            msg_time: 1.0,
            channel: None,
            check_message: false,
            origin: models::MessageOrigin::OnChain,
            tx_hash: Some("tx1"),
        },
        &mut txn,
    )
    .await?;
    txn.commit().await?;

    let mut txn = pool.begin().await?;
    assert!(!db::confirmations::is_confirmed(&ItemHash::new("h3"), &mut txn).await?);

    // The message itself now arrives via gossip and commits; the worker
    // pool reads `tx_hash` off the pending row it claimed and passes it
    // through as the trigger's confirmation link.
    let message = base(
        "h3",
        "0xa",
        MessageType::Post,
        Content::Post(PostContent {
            address: "0xa".to_string(),
            post_type: "article".to_string(),
            reference: None,
            content: json!({"body": "hello"}),
            time: 1.0,
        }),
        1.0,
    );
    commit(&message, &registry, Trigger::Pending(pending_id, Some("tx1")), &pool)
        .await
        .unwrap();

    let mut txn = pool.begin().await?;
    assert!(db::confirmations::is_confirmed(&ItemHash::new("h3"), &mut txn).await?);
    Ok(())
}
