use chrono::{Duration, Utc};
use taskmarket_server::entities::offer::OfferStatus;
use taskmarket_server::entities::task::TaskStatus;
use taskmarket_server::offer::{NewOffer, OfferService};
use taskmarket_server::task::{TaskFilter, TaskService, TaskServiceError, TaskUpdate};

mod common;

use common::{new_task, post_task, register_user, setup_db};

#[tokio::test]
async fn can_create_open_task() -> anyhow::Result<()> {
    let db = setup_db().await?;
    let poster = register_user(&db, "poster").await;

    let task = post_task(&db, poster.id, "Move a sofa").await;

    assert_eq!(task.title, "Move a sofa");
    assert_eq!(task.status, TaskStatus::Open);
    assert_eq!(task.poster_id, poster.id);
    assert_eq!(task.assignee_id, None);
    Ok(())
}

#[tokio::test]
async fn cannot_create_task_with_bad_input() -> anyhow::Result<()> {
    let db = setup_db().await?;
    let poster = register_user(&db, "poster").await;
    let service = TaskService::new(&db);

    let mut blank_title = new_task("x");
    blank_title.title = "   ".to_string();
    assert!(matches!(
        service.create_task(poster.id, blank_title).await,
        Err(TaskServiceError::Validation(_))
    ));

    let mut free = new_task("Free work");
    free.budget_cents = 0;
    assert!(matches!(
        service.create_task(poster.id, free).await,
        Err(TaskServiceError::Validation(_))
    ));

    let mut overdue = new_task("Too late");
    overdue.due_date = Some(Utc::now() - Duration::days(1));
    assert!(matches!(
        service.create_task(poster.id, overdue).await,
        Err(TaskServiceError::Validation(_))
    ));
    Ok(())
}

#[tokio::test]
async fn can_filter_and_page_tasks() -> anyhow::Result<()> {
    let db = setup_db().await?;
    let alice = register_user(&db, "alice").await;
    let bob = register_user(&db, "bob").await;
    let service = TaskService::new(&db);

    let first = post_task(&db, alice.id, "Paint the fence").await;
    let second = post_task(&db, alice.id, "Walk the dog").await;
    let third = post_task(&db, bob.id, "Paint a room").await;

    let all = service.list_tasks(TaskFilter::default()).await?;
    let ids: Vec<i32> = all.iter().map(|task| task.id).collect();
    assert_eq!(ids, vec![third.id, second.id, first.id]);

    let by_alice = service
        .list_tasks(TaskFilter {
            poster_id: Some(alice.id),
            ..Default::default()
        })
        .await?;
    assert_eq!(by_alice.len(), 2);

    let painting = service
        .list_tasks(TaskFilter {
            search: Some("Paint".to_string()),
            ..Default::default()
        })
        .await?;
    assert_eq!(painting.len(), 2);

    let page = service
        .list_tasks(TaskFilter {
            limit: Some(1),
            offset: Some(1),
            ..Default::default()
        })
        .await?;
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, second.id);
    Ok(())
}

#[tokio::test]
async fn only_poster_can_edit_open_task() -> anyhow::Result<()> {
    let db = setup_db().await?;
    let poster = register_user(&db, "poster").await;
    let helper = register_user(&db, "helper").await;
    let service = TaskService::new(&db);
    let task = post_task(&db, poster.id, "Fix a tap").await;

    let forbidden = service
        .update_task(
            task.id,
            helper.id,
            TaskUpdate {
                title: Some("Mine now".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(forbidden, Err(TaskServiceError::Forbidden(_))));

    let updated = service
        .update_task(
            task.id,
            poster.id,
            TaskUpdate {
                budget_cents: Some(7500),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(updated.budget_cents, 7500);
    assert_eq!(updated.title, "Fix a tap");

    service.accept_task(task.id, helper.id).await?;
    let too_late = service
        .update_task(
            task.id,
            poster.id,
            TaskUpdate {
                budget_cents: Some(100),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(
        too_late,
        Err(TaskServiceError::NotEditable(_, TaskStatus::InProgress))
    ));
    Ok(())
}

#[tokio::test]
async fn can_run_task_through_its_lifecycle() -> anyhow::Result<()> {
    let db = setup_db().await?;
    let poster = register_user(&db, "poster").await;
    let helper = register_user(&db, "helper").await;
    let service = TaskService::new(&db);
    let task = post_task(&db, poster.id, "Assemble a wardrobe").await;

    let accepted = service.accept_task(task.id, helper.id).await?;
    assert_eq!(accepted.status, TaskStatus::InProgress);
    assert_eq!(accepted.assignee_id, Some(helper.id));

    let completed = service.complete_task(task.id, helper.id).await?;
    assert_eq!(completed.status, TaskStatus::Completed);

    let cancel = service.cancel_task(task.id, poster.id).await;
    assert!(matches!(cancel, Err(TaskServiceError::InvalidTransition(_))));
    Ok(())
}

#[tokio::test]
async fn cannot_accept_own_or_taken_task() -> anyhow::Result<()> {
    let db = setup_db().await?;
    let poster = register_user(&db, "poster").await;
    let first = register_user(&db, "first").await;
    let second = register_user(&db, "second").await;
    let service = TaskService::new(&db);
    let task = post_task(&db, poster.id, "Mow the lawn").await;

    assert!(matches!(
        service.accept_task(task.id, poster.id).await,
        Err(TaskServiceError::Forbidden(_))
    ));

    service.accept_task(task.id, first.id).await?;
    let err = service
        .accept_task(task.id, second.id)
        .await
        .expect_err("second accept must fail");
    assert_eq!(
        err.to_string(),
        "Cannot accept a task that is in progress"
    );
    Ok(())
}

#[tokio::test]
async fn outsiders_cannot_complete_task() -> anyhow::Result<()> {
    let db = setup_db().await?;
    let poster = register_user(&db, "poster").await;
    let helper = register_user(&db, "helper").await;
    let stranger = register_user(&db, "stranger").await;
    let service = TaskService::new(&db);
    let task = post_task(&db, poster.id, "Clean gutters").await;
    service.accept_task(task.id, helper.id).await?;

    assert!(matches!(
        service.complete_task(task.id, stranger.id).await,
        Err(TaskServiceError::Forbidden(_))
    ));
    let completed = service.complete_task(task.id, poster.id).await?;
    assert_eq!(completed.status, TaskStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn accepting_directly_settles_pending_offers() -> anyhow::Result<()> {
    let db = setup_db().await?;
    let poster = register_user(&db, "poster").await;
    let winner = register_user(&db, "winner").await;
    let loser = register_user(&db, "loser").await;
    let task = post_task(&db, poster.id, "Hang shelves").await;
    let offers = OfferService::new(&db);

    let winning = offers
        .submit_offer(
            task.id,
            winner.id,
            NewOffer {
                amount_cents: 4000,
                message: None,
            },
        )
        .await?;
    let losing = offers
        .submit_offer(
            task.id,
            loser.id,
            NewOffer {
                amount_cents: 3000,
                message: Some("Cheaper!".to_string()),
            },
        )
        .await?;

    TaskService::new(&db).accept_task(task.id, winner.id).await?;

    let visible = offers.list_offers_for_task(task.id, poster.id).await?;
    let status_of = |id: i32| {
        visible
            .iter()
            .find(|offer| offer.id == id)
            .map(|offer| offer.status)
    };
    assert_eq!(status_of(winning.id), Some(OfferStatus::Accepted));
    assert_eq!(status_of(losing.id), Some(OfferStatus::Rejected));
    Ok(())
}

#[tokio::test]
async fn cancelling_rejects_pending_offers() -> anyhow::Result<()> {
    let db = setup_db().await?;
    let poster = register_user(&db, "poster").await;
    let bidder = register_user(&db, "bidder").await;
    let task = post_task(&db, poster.id, "Water plants").await;
    let offers = OfferService::new(&db);
    let offer = offers
        .submit_offer(
            task.id,
            bidder.id,
            NewOffer {
                amount_cents: 1500,
                message: None,
            },
        )
        .await?;

    let cancelled = TaskService::new(&db).cancel_task(task.id, poster.id).await?;
    assert_eq!(cancelled.status, TaskStatus::Cancelled);

    let mine = offers.list_offers_by_bidder(bidder.id).await?;
    assert_eq!(mine[0].id, offer.id);
    assert_eq!(mine[0].status, OfferStatus::Rejected);
    Ok(())
}

#[tokio::test]
async fn can_delete_open_task_with_offers() -> anyhow::Result<()> {
    let db = setup_db().await?;
    let poster = register_user(&db, "poster").await;
    let bidder = register_user(&db, "bidder").await;
    let task = post_task(&db, poster.id, "Wash the car").await;
    OfferService::new(&db)
        .submit_offer(
            task.id,
            bidder.id,
            NewOffer {
                amount_cents: 2000,
                message: None,
            },
        )
        .await?;
    let service = TaskService::new(&db);

    assert!(matches!(
        service.delete_task(task.id, bidder.id).await,
        Err(TaskServiceError::Forbidden(_))
    ));
    service.delete_task(task.id, poster.id).await?;

    assert!(matches!(
        service.get_task(task.id).await,
        Err(TaskServiceError::TaskNotFound(_))
    ));
    assert!(
        OfferService::new(&db)
            .list_offers_by_bidder(bidder.id)
            .await?
            .is_empty()
    );
    Ok(())
}

#[tokio::test]
async fn cannot_delete_task_in_progress() -> anyhow::Result<()> {
    let db = setup_db().await?;
    let poster = register_user(&db, "poster").await;
    let helper = register_user(&db, "helper").await;
    let task = post_task(&db, poster.id, "Build a shed").await;
    let service = TaskService::new(&db);
    service.accept_task(task.id, helper.id).await?;

    assert!(matches!(
        service.delete_task(task.id, poster.id).await,
        Err(TaskServiceError::NotEditable(_, TaskStatus::InProgress))
    ));
    Ok(())
}

#[tokio::test]
async fn clamps_page_size_at_both_ends() -> anyhow::Result<()> {
    let db = setup_db().await?;
    let alice = register_user(&db, "alice").await;
    let service = TaskService::new(&db);
    for n in 0..105 {
        post_task(&db, alice.id, &format!("Task number {n}")).await;
    }

    let default_page = service.list_tasks(TaskFilter::default()).await?;
    assert_eq!(default_page.len(), 50);

    let too_many = service
        .list_tasks(TaskFilter {
            limit: Some(500),
            ..Default::default()
        })
        .await?;
    assert_eq!(too_many.len(), 100);

    let zero = service
        .list_tasks(TaskFilter {
            limit: Some(0),
            ..Default::default()
        })
        .await?;
    assert_eq!(zero.len(), 1);
    Ok(())
}

#[tokio::test]
async fn only_one_of_two_accepts_wins() -> anyhow::Result<()> {
    let db = setup_db().await?;
    let poster = register_user(&db, "poster").await;
    let first = register_user(&db, "first").await;
    let second = register_user(&db, "second").await;
    let task = post_task(&db, poster.id, "Fix a bike").await;

    let service = TaskService::new(&db);
    let (a, b) = tokio::join!(
        service.accept_task(task.id, first.id),
        service.accept_task(task.id, second.id)
    );
    let winners = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(winners, 1);
    let loser = a.err().or(b.err()).expect("one accept must fail");
    assert!(matches!(loser, TaskServiceError::InvalidTransition(_)));

    let task = service.get_task(task.id).await?;
    assert_eq!(task.status, TaskStatus::InProgress);
    assert!(task.assignee_id == Some(first.id) || task.assignee_id == Some(second.id));
    Ok(())
}
