/// Integration tests for persistence and the memory gateway
///
/// Tests the database lifecycle and the gateway contract:
/// - Schema creation via migrations
/// - Turn round-trip in recency order
/// - Append-only task records
/// - Preference upsert mirrored into semantic memory
/// - Semantic search ranking
/// - Memory scoped per profile
use std::sync::Arc;
use tempfile::TempDir;

use badi_engine::conductor::{CapabilityRef, Plan, PlanStatus, Step, StepResult, TaskRecord};
use badi_engine::db::{Database, NewTurn};
use badi_engine::memory::{
    HashEmbedder, MemoryGateway, SqliteMemoryGateway, SOURCE_CONVERSATION, SOURCE_PREFERENCE,
};
use serde_json::{json, Map};

async fn open(dir: &TempDir, auto_capture: bool) -> (Database, Arc<dyn MemoryGateway>) {
    let db = Database::new(&dir.path().join("badi.db")).await.unwrap();
    let gateway: Arc<dyn MemoryGateway> = Arc::new(SqliteMemoryGateway::new(
        &db,
        Arc::new(HashEmbedder::new(128)),
        auto_capture,
    ));
    (db, gateway)
}

fn turn(conversation: &str, request: &str, reply: &str) -> NewTurn {
    NewTurn {
        conversation_id: conversation.to_string(),
        request: request.to_string(),
        reply: reply.to_string(),
        intent: "chat".to_string(),
        backend: Some("ollama".to_string()),
    }
}

#[tokio::test]
async fn test_task_records_reject_update_and_delete() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("badi.db");
    let db = Database::new(&db_path).await.unwrap();

    let record = TaskRecord::new("c1", "nothing", &Plan::empty(vec![]), vec![]);
    db.task_records().insert(&record).await.unwrap();

    let update = sqlx::query("UPDATE task_records SET status = 'failed' WHERE id = ?")
        .bind(&record.id)
        .execute(db.pool())
        .await;
    assert!(update.unwrap_err().to_string().contains("append-only"));

    let delete = sqlx::query("DELETE FROM task_records")
        .execute(db.pool())
        .await;
    assert!(delete.is_err());
    db.close().await.unwrap();

    // Survives a reopen, which re-applies the schema
    let db = Database::new(&db_path).await.unwrap();
    assert_eq!(db.task_records().count().await.unwrap(), 1);
    let stored = db.task_records().get(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PlanStatus::NothingToDo);
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_turn_round_trip_in_recency_order() {
    let dir = TempDir::new().unwrap();
    let (_db, memory) = open(&dir, false).await;

    memory.save_turn(turn("c1", "first", "one")).await.unwrap();
    memory.save_turn(turn("c2", "other", "elsewhere")).await.unwrap();
    let saved = memory.save_turn(turn("c1", "second", "two")).await.unwrap();

    let turns = memory.recent_turns("c1", 10).await.unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0], saved);
    assert_eq!(turns[0].request, "second");
    assert_eq!(turns[1].request, "first");
    assert_eq!(turns[1].reply, "one");
    assert_eq!(turns[1].backend.as_deref(), Some("ollama"));

    assert_eq!(memory.recent_turns("c1", 1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_auto_capture_makes_turns_searchable() {
    let dir = TempDir::new().unwrap();
    let (db, memory) = open(&dir, true).await;

    memory
        .save_turn(turn("c1", "my sister lives in Lisbon", "Lovely city."))
        .await
        .unwrap();
    assert_eq!(db.snippets().count().await.unwrap(), 1);

    let query = memory.embed("where does my sister live").await.unwrap();
    let matches = memory.semantic_search("c1", &query, 5, 0.1).await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].source, SOURCE_CONVERSATION);
    assert!(matches[0].content.contains("Lisbon"));
}

#[tokio::test]
async fn test_without_auto_capture_no_snippets() {
    let dir = TempDir::new().unwrap();
    let (db, memory) = open(&dir, false).await;
    memory.save_turn(turn("c1", "hello", "hi")).await.unwrap();
    assert_eq!(db.snippets().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_preference_upsert_updates_mirror_in_place() {
    let dir = TempDir::new().unwrap();
    let (db, memory) = open(&dir, true).await;

    memory.upsert_preference("c1", "editor", "vim").await.unwrap();
    let first = db.snippets().for_owner("c1").await.unwrap();
    memory.upsert_preference("c1", "editor", "helix").await.unwrap();

    let pref = memory.get_preference("c1", "editor").await.unwrap().unwrap();
    assert_eq!(pref.value, "helix");
    assert!(memory.get_preference("c1", "shell").await.unwrap().is_none());

    let snippets = db.snippets().for_owner("c1").await.unwrap();
    assert_eq!(snippets.len(), 1);
    assert_eq!(snippets[0].source, SOURCE_PREFERENCE);
    assert!(snippets[0].content.contains("helix"));
    // Updated in place, not deleted and re-inserted
    assert_eq!(snippets[0].id, first[0].id);
}

#[tokio::test]
async fn test_semantic_search_ranks_and_limits() {
    let dir = TempDir::new().unwrap();
    let (_db, memory) = open(&dir, false).await;

    memory.add_snippet("c1", "note", "the garden needs watering on sunday").await.unwrap();
    memory.add_snippet("c1", "note", "garden hose is in the shed").await.unwrap();
    memory.add_snippet("c1", "note", "quarterly taxes are due in april").await.unwrap();
    memory.add_snippet("c1", "note", "the garden needs watering on sunday").await.unwrap();

    let query = memory.embed("garden needs watering").await.unwrap();
    let matches = memory.semantic_search("c1", &query, 2, -1.0).await.unwrap();

    assert_eq!(matches.len(), 2);
    assert!(matches[0].similarity >= matches[1].similarity);
    // Duplicates are allowed; the newer copy ranks first on a tie
    assert_eq!(matches[0].content, matches[1].content);
    assert!(matches[0].snippet_id > matches[1].snippet_id);
}

#[tokio::test]
async fn test_profiles_do_not_share_memory() {
    let dir = TempDir::new().unwrap();
    let (db, memory) = open(&dir, true).await;
    let alice = db.profiles().get_or_create("alice").await.unwrap();
    let bob = db.profiles().get_or_create("bob").await.unwrap();

    memory
        .save_turn(turn(&alice.id, "my bank pin is 4321", "noted"))
        .await
        .unwrap();
    memory.upsert_preference(&alice.id, "editor", "vim").await.unwrap();
    memory.upsert_preference(&bob.id, "editor", "emacs").await.unwrap();

    let query = memory.embed("what is my bank pin").await.unwrap();
    let bob_matches = memory.semantic_search(&bob.id, &query, 5, -1.0).await.unwrap();
    assert!(bob_matches.iter().all(|m| !m.content.contains("4321")));
    let alice_matches = memory.semantic_search(&alice.id, &query, 5, 0.1).await.unwrap();
    assert!(alice_matches[0].content.contains("4321"));

    assert_eq!(memory.get_preference(&alice.id, "editor").await.unwrap().unwrap().value, "vim");
    assert_eq!(memory.get_preference(&bob.id, "editor").await.unwrap().unwrap().value, "emacs");
}

#[tokio::test]
async fn test_task_records_are_appended() {
    let dir = TempDir::new().unwrap();
    let (_db, memory) = open(&dir, false).await;

    let mut params = Map::new();
    params.insert("path".into(), json!("/tmp"));
    let step = Step::new("scan", CapabilityRef::new("system_control", "scan_directory"), params);
    let plan = Plan::new(vec![step.clone()], vec![]).unwrap();

    let first = TaskRecord::new(
        "c1",
        "scan /tmp",
        &plan,
        vec![StepResult::success(0, &step, json!({"total_files": 3}), 4)],
    );
    let second = TaskRecord::new("c1", "scan /tmp again", &plan, vec![]);

    memory.save_task_record(&first).await.unwrap();
    memory.save_task_record(&second).await.unwrap();
    // Writing the same record twice does not overwrite it
    assert!(memory.save_task_record(&first).await.is_err());

    let records = memory.recent_task_records(10).await.unwrap();
    assert_eq!(records.len(), 2);
    let stored = records.iter().find(|r| r.id == first.id).unwrap();
    assert_eq!(stored, &first);
    assert_eq!(stored.status, PlanStatus::Success);
}

#[tokio::test]
async fn test_profiles_are_stable() {
    let dir = TempDir::new().unwrap();
    let (db, _memory) = open(&dir, false).await;

    let a = db.profiles().get_or_create("default").await.unwrap();
    let b = db.profiles().get_or_create("default").await.unwrap();
    let c = db.profiles().get_or_create("work").await.unwrap();
    assert_eq!(a.id, b.id);
    assert_ne!(a.id, c.id);
}
