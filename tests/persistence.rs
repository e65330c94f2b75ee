//! Behaviour when the repository is slow, failing or shared by several hubs

mod common;

use anyhow::Result;
use common::{assert_board_invariants, kanban_document, FlakyRepository};
use hlavi_hub::{BoardError, BoardId, CardId, ColumnId, Hub, Outcome, RequestContext};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_failed_write_leaves_board_unchanged() -> Result<()> {
    let repo = FlakyRepository::new();
    repo.inner.insert_document(kanban_document("b1")).await;
    let hub = Hub::with_defaults(repo.clone());
    let ctx = RequestContext::background();
    let model = hub.get_board(&ctx, &BoardId::new("b1")).await?;
    let mut sub = model.subscribe();

    repo.set_fail_writes(true);
    let err = model
        .move_card(
            &ctx,
            &CardId::new("card1"),
            &ColumnId::new("todo"),
            &ColumnId::new("doing"),
            0,
        )
        .await
        .unwrap_err();
    assert!(err.is_persistence());

    let err = model.add_column(&ctx, "Done").await.unwrap_err();
    assert!(err.is_persistence());
    let err = model
        .delete_card(&ctx, &CardId::new("card2"), &ColumnId::new("todo"))
        .await
        .unwrap_err();
    assert!(err.is_persistence());

    assert_eq!(model.columns().len(), 2);
    let todo: Vec<String> = model
        .cards_in(&ColumnId::new("todo"))
        .into_iter()
        .map(|c| c.id.to_string())
        .collect();
    assert_eq!(todo, vec!["card1", "card2"]);
    assert!(model.cards_in(&ColumnId::new("doing")).is_empty());

    // subscribers still see both cards in place
    let seen = sub.cards.current();
    assert_eq!(seen.value[&ColumnId::new("todo")].len(), 2);

    repo.set_fail_writes(false);
    let outcome = model
        .move_card(
            &ctx,
            &CardId::new("card1"),
            &ColumnId::new("todo"),
            &ColumnId::new("doing"),
            0,
        )
        .await?;
    assert_eq!(outcome, Outcome::Applied);
    assert_board_invariants(&model.columns(), &model.cards());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_slow_write_times_out_without_applying() -> Result<()> {
    let repo = FlakyRepository::new();
    repo.inner.insert_document(kanban_document("b1")).await;
    let hub = Hub::with_defaults(repo.clone());
    let ctx = RequestContext::background();
    let model = hub.get_board(&ctx, &BoardId::new("b1")).await?;

    repo.set_write_delay(Duration::from_secs(60));
    let err = model
        .add_card(&ctx, &ColumnId::new("doing"), "late")
        .await
        .unwrap_err();
    assert!(matches!(err, BoardError::Timeout { operation: "create_card" }));
    assert!(model.cards_in(&ColumnId::new("doing")).is_empty());

    // a caller deadline shorter than the configured one wins
    repo.set_write_delay(Duration::from_secs(2));
    let short = RequestContext::background().with_timeout(Duration::from_secs(1));
    let err = model
        .add_column(&short, "Done")
        .await
        .unwrap_err();
    assert!(matches!(err, BoardError::Timeout { .. }));
    assert_eq!(model.columns().len(), 2);

    repo.set_write_delay(Duration::ZERO);
    let stored = repo.inner.document(&BoardId::new("b1")).await.unwrap();
    assert_eq!(stored.cards.len(), 2);
    assert_eq!(stored.columns.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_write_that_lands_before_failing_is_picked_up() -> Result<()> {
    let repo = FlakyRepository::new();
    repo.inner.insert_document(kanban_document("b1")).await;
    let hub = Hub::with_defaults(repo.clone());
    let ctx = RequestContext::background();
    let model = hub.get_board(&ctx, &BoardId::new("b1")).await?;

    repo.set_fail_after_write(true);
    let err = model.add_column(&ctx, "Done").await.unwrap_err();
    assert!(err.is_persistence());
    repo.set_fail_after_write(false);

    // memory now agrees with the store rather than with the error
    let titles: Vec<String> = model.columns().iter().map(|c| c.title.clone()).collect();
    assert_eq!(titles, vec!["Todo", "Doing", "Done"]);
    assert_board_invariants(&model.columns(), &model.cards());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_mutation_resyncs_before_next_one() -> Result<()> {
    let repo = FlakyRepository::new();
    repo.inner.insert_document(kanban_document("b1")).await;
    let hub = Hub::with_defaults(repo.clone());
    let ctx = RequestContext::background();
    let model = hub.get_board(&ctx, &BoardId::new("b1")).await?;

    repo.set_write_delay(Duration::from_secs(3));
    let pending = tokio::spawn({
        let model = Arc::clone(&model);
        async move {
            model
                .add_card(&RequestContext::background(), &ColumnId::new("doing"), "lost")
                .await
        }
    });
    tokio::task::yield_now().await;
    pending.abort();
    assert!(pending.await.unwrap_err().is_cancelled());
    repo.set_write_delay(Duration::ZERO);

    // another writer changed the store meanwhile
    let mut doc = repo.inner.document(&BoardId::new("b1")).await.unwrap();
    doc.cards.push(
        hlavi_hub::Card::new(ColumnId::new("doing"), "external".into(), 0).with_id("ext"),
    );
    repo.inner.insert_document(doc).await;

    let card = model.add_card(&ctx, &ColumnId::new("doing"), "next").await?;
    assert_eq!(card.position, 1);
    let doing: Vec<String> = model
        .cards_in(&ColumnId::new("doing"))
        .into_iter()
        .map(|c| c.title)
        .collect();
    assert_eq!(doing, vec!["external", "next"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_load_failure_reaches_every_waiter() {
    let repo = FlakyRepository::new();
    repo.set_load_delay(Duration::from_millis(200));
    let hub = Arc::new(Hub::with_defaults(repo.clone()));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let hub = Arc::clone(&hub);
        handles.push(tokio::spawn(async move {
            hub.get_board(&RequestContext::background(), &BoardId::new("ghost"))
                .await
        }));
    }

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(err.is_not_found(), "unexpected error: {}", err);
    }
    assert_eq!(repo.inner.board_loads(), 1);
    assert!(hub.is_empty());

    // failures are not cached
    repo.inner.insert_document(kanban_document("ghost")).await;
    let model = hub
        .get_board(&RequestContext::background(), &BoardId::new("ghost"))
        .await
        .unwrap();
    assert_eq!(model.columns().len(), 2);
}

#[cfg(feature = "file-storage")]
mod file_backed {
    use super::*;
    use hlavi_hub::{storage::FileRepository, Board, DragEvent, Repository};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_board_survives_new_hub() -> Result<()> {
        let dir = TempDir::new()?;
        let ctx = RequestContext::background().with_actor("alice");

        let repo = Arc::new(FileRepository::new(dir.path()));
        repo.create_board(&Board::new("team", "Team", "alice")).await?;
        let hub = Hub::with_defaults(repo);
        let model = hub.get_board(&ctx, &BoardId::new("team")).await?;

        let todo = model.add_column(&ctx, "Todo").await?;
        let done = model.add_column(&ctx, "Done").await?;
        let first = model.add_card(&ctx, &todo.id, "write docs").await?;
        let second = model.add_card(&ctx, &todo.id, "ship").await?;
        model
            .apply_drag(
                &ctx,
                &DragEvent::new(second.id.as_str(), todo.id.as_str(), done.id.as_str(), 0),
            )
            .await?;
        model.add_column(&ctx, "Scratch").await?;
        let scratch = model.columns()[2].id.clone();
        model.add_card(&ctx, &scratch, "").await?;
        model.delete_column(&ctx, &scratch).await?;

        let reopened = Hub::with_defaults(Arc::new(FileRepository::new(dir.path())));
        let again = reopened.get_board(&ctx, &BoardId::new("team")).await?;

        let titles: Vec<String> = again.columns().iter().map(|c| c.title.clone()).collect();
        assert_eq!(titles, vec!["Todo", "Done"]);
        let todo_cards = again.cards_in(&todo.id);
        assert_eq!(todo_cards.len(), 1);
        assert_eq!(todo_cards[0].id, first.id);
        assert_eq!(todo_cards[0].position, 0);
        let done_cards = again.cards_in(&done.id);
        assert_eq!(done_cards.len(), 1);
        assert_eq!(done_cards[0].title, "ship");
        assert_board_invariants(&again.columns(), &again.cards());
        Ok(())
    }
}
