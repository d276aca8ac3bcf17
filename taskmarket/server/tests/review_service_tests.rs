use taskmarket_server::review::{NewReview, ReviewService, ReviewServiceError};
use taskmarket_server::task::TaskService;

mod common;

use common::{post_task, register_user, setup_db};

fn rating(stars: u8) -> NewReview {
    NewReview {
        rating: stars,
        comment: Some("Great work".to_string()),
    }
}

#[tokio::test]
async fn both_sides_can_review_completed_task_once() -> anyhow::Result<()> {
    let db = setup_db().await?;
    let poster = register_user(&db, "poster").await;
    let helper = register_user(&db, "helper").await;
    let task = post_task(&db, poster.id, "Tile a floor").await;
    let tasks = TaskService::new(&db);
    tasks.accept_task(task.id, helper.id).await?;
    tasks.complete_task(task.id, helper.id).await?;
    let service = ReviewService::new(&db);

    let about_helper = service.create_review(task.id, poster.id, rating(5)).await?;
    assert_eq!(about_helper.reviewee_id, helper.id);
    let about_poster = service.create_review(task.id, helper.id, rating(4)).await?;
    assert_eq!(about_poster.reviewee_id, poster.id);

    assert!(matches!(
        service.create_review(task.id, poster.id, rating(1)).await,
        Err(ReviewServiceError::DuplicateReview(_))
    ));
    Ok(())
}

#[tokio::test]
async fn cannot_review_unfinished_task() -> anyhow::Result<()> {
    let db = setup_db().await?;
    let poster = register_user(&db, "poster").await;
    let helper = register_user(&db, "helper").await;
    let task = post_task(&db, poster.id, "Tile a floor").await;
    TaskService::new(&db).accept_task(task.id, helper.id).await?;

    let result = ReviewService::new(&db)
        .create_review(task.id, poster.id, rating(5))
        .await;
    assert!(matches!(result, Err(ReviewServiceError::TaskNotCompleted(_))));
    Ok(())
}

#[tokio::test]
async fn outsiders_and_bad_ratings_are_rejected() -> anyhow::Result<()> {
    let db = setup_db().await?;
    let poster = register_user(&db, "poster").await;
    let helper = register_user(&db, "helper").await;
    let stranger = register_user(&db, "stranger").await;
    let task = post_task(&db, poster.id, "Tile a floor").await;
    let tasks = TaskService::new(&db);
    tasks.accept_task(task.id, helper.id).await?;
    tasks.complete_task(task.id, poster.id).await?;
    let service = ReviewService::new(&db);

    assert!(matches!(
        service.create_review(task.id, stranger.id, rating(3)).await,
        Err(ReviewServiceError::NotAParticipant(_))
    ));
    assert!(matches!(
        service.create_review(task.id, poster.id, rating(0)).await,
        Err(ReviewServiceError::Validation(_))
    ));
    assert!(matches!(
        service.create_review(task.id, poster.id, rating(6)).await,
        Err(ReviewServiceError::Validation(_))
    ));
    Ok(())
}

#[tokio::test]
async fn can_summarise_ratings() -> anyhow::Result<()> {
    let db = setup_db().await?;
    let helper = register_user(&db, "helper").await;
    let service = ReviewService::new(&db);
    let tasks = TaskService::new(&db);

    let empty = service.rating_summary(helper.id).await?;
    assert_eq!(empty.count, 0);
    assert_eq!(empty.average, None);

    for (index, stars) in [5u8, 4, 4].into_iter().enumerate() {
        let poster = register_user(&db, &format!("poster{index}")).await;
        let task = post_task(&db, poster.id, "Odd job").await;
        tasks.accept_task(task.id, helper.id).await?;
        tasks.complete_task(task.id, helper.id).await?;
        service.create_review(task.id, poster.id, rating(stars)).await?;
    }

    let summary = service.rating_summary(helper.id).await?;
    assert_eq!(summary.count, 3);
    assert_eq!(summary.average, Some(4.33));
    assert_eq!(service.list_reviews_for_user(helper.id).await?.len(), 3);
    Ok(())
}
