use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::error::{AppError, Result};
use crate::model::{Item, NewReview, NewUser, RatingAverages, ReviewRow, User};

/// Open (or create) the single-file database, enable foreign keys, make sure
/// the schema exists and a few demo items are present.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    // An in-memory database only lives as long as its connection, so the
    // pool must never hand out a second (empty) one.
    let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    init_schema(&pool).await?;
    seed_items(&pool).await?;

    log::info!("database ready at {database_url}");
    Ok(pool)
}

/// Idempotent schema creation, safe to run on every startup.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user (
            user_id       INTEGER PRIMARY KEY AUTOINCREMENT,
            email         TEXT NOT NULL UNIQUE,
            name          TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            gender        TEXT NOT NULL,
            height        TEXT NOT NULL,
            top           TEXT NOT NULL,
            bottom        TEXT NOT NULL,
            bust          TEXT NOT NULL,
            shoe_size     TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS item (
            item_id          INTEGER PRIMARY KEY,
            item_name        TEXT NOT NULL,
            item_picture_url TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS review (
            review_id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id   INTEGER NOT NULL REFERENCES item(item_id),
            user_id   INTEGER NOT NULL REFERENCES user(user_id),
            date      INTEGER NOT NULL,
            text      TEXT NOT NULL,
            size      INTEGER NOT NULL,
            length    INTEGER NOT NULL,
            thickness INTEGER NOT NULL,
            quality   INTEGER NOT NULL,
            recommend INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Items are read-only in the app itself, so an empty catalog gets a couple
/// of demo rows to make the pages navigable.
pub async fn seed_items(pool: &SqlitePool) -> Result<()> {
    let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM item")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Ok(());
    }

    let demo = [
        (1_i64, "Wool sweater", "/static/img/sweater.jpg"),
        (2_i64, "Denim jacket", "/static/img/jacket.jpg"),
    ];
    for (item_id, item_name, item_picture_url) in demo {
        sqlx::query("INSERT INTO item (item_id, item_name, item_picture_url) VALUES (?, ?, ?)")
            .bind(item_id)
            .bind(item_name)
            .bind(item_picture_url)
            .execute(pool)
            .await?;
    }
    log::info!("seeded {} demo items", demo.len());
    Ok(())
}

pub async fn user_by_id(pool: &SqlitePool, user_id: i64) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM user WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn user_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM user WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Inserts one user row. A lost race on the unique email column surfaces as
/// `AppError::Conflict` instead of a bare driver error.
pub async fn insert_user(pool: &SqlitePool, user: &NewUser) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO user
        (email, name, password_hash, gender, height, top, bottom, bust, shoe_size)
        VALUES
        (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.email)
    .bind(&user.name)
    .bind(&user.password_hash)
    .bind(&user.gender)
    .bind(&user.height)
    .bind(&user.top)
    .bind(&user.bottom)
    .bind(&user.bust)
    .bind(&user.shoe_size)
    .execute(pool)
    .await
    .map_err(|err| match err {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Conflict("email already exists in the database".to_string())
        }
        other => AppError::Database(other),
    })?;

    Ok(())
}

pub async fn all_items(pool: &SqlitePool) -> Result<Vec<Item>> {
    let items = sqlx::query_as::<_, Item>("SELECT * FROM item ORDER BY item_id")
        .fetch_all(pool)
        .await?;
    Ok(items)
}

pub async fn item_by_id(pool: &SqlitePool, item_id: i64) -> Result<Option<Item>> {
    let item = sqlx::query_as::<_, Item>("SELECT * FROM item WHERE item_id = ?")
        .bind(item_id)
        .fetch_optional(pool)
        .await?;
    Ok(item)
}

pub async fn item_exists(pool: &SqlitePool, item_id: i64) -> Result<bool> {
    let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM item WHERE item_id = ?")
        .bind(item_id)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// All reviews for an item with the author's display name, newest first.
pub async fn reviews_for_item(pool: &SqlitePool, item_id: i64) -> Result<Vec<ReviewRow>> {
    let reviews = sqlx::query_as::<_, ReviewRow>(
        r#"
        SELECT review.text AS text, user.name AS user_name,
               review.size AS size, review.length AS length,
               review.thickness AS thickness, review.quality AS quality,
               review.recommend AS recommend
        FROM review
        JOIN user ON user.user_id = review.user_id
        WHERE review.item_id = ?
        ORDER BY review.date DESC, review.review_id DESC
        "#,
    )
    .bind(item_id)
    .fetch_all(pool)
    .await?;
    Ok(reviews)
}

/// Per-attribute averages scaled to 0-100. With no reviews every column is
/// NULL; the caller decides the default.
pub async fn rating_averages(pool: &SqlitePool, item_id: i64) -> Result<RatingAverages> {
    let averages = sqlx::query_as::<_, RatingAverages>(
        r#"
        SELECT avg(size)/3.0*100 AS size,
               avg(length)/3.0*100 AS length,
               avg(thickness)/3.0*100 AS thickness,
               avg(quality)/3.0*100 AS quality,
               avg(recommend)/3.0*100 AS recommend
        FROM review WHERE item_id = ?
        "#,
    )
    .bind(item_id)
    .fetch_one(pool)
    .await?;
    Ok(averages)
}

pub async fn insert_review(pool: &SqlitePool, review: &NewReview) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO review
        (item_id, user_id, date, text, size, length, thickness, quality, recommend)
        VALUES
        (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(review.item_id)
    .bind(review.user_id)
    .bind(review.date)
    .bind(&review.text)
    .bind(review.size)
    .bind(review.length)
    .bind(review.thickness)
    .bind(review.quality)
    .bind(review.recommend)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn review_count(pool: &SqlitePool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM review")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
