// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Database abstraction in terms of the operations needed by the service.

use crate::model::*;
use sqlx::Row;
use std::collections::HashMap;
#[cfg(feature = "postgres")]
use sqlx::postgres::PgRow;
#[cfg(any(feature = "sqlite", test))]
use sqlx::sqlite::SqliteRow;
#[cfg(feature = "postgres")]
use wanderlust_core::db::postgres;
#[cfg(any(feature = "sqlite", test))]
use wanderlust_core::db::sqlite::{self, build_timestamp, unpack_timestamp};
use wanderlust_core::db::{DbError, DbResult, Executor};


/// Initializes the database schema.
pub async fn init_schema(ex: &mut Executor) -> DbResult<()> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => postgres::run_schema(ex, include_str!("postgres.sql")).await,

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => sqlite::run_schema(ex, include_str!("sqlite.sql")).await,

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Columns to select to build a listing with `pg_listing_row` or `sqlite_listing_row`.
const LISTING_COLUMNS: &str = "id, title, description, image, price, location, country";

/// Extracts the identifier and fields of a listing from a PostgreSQL `row`.
#[cfg(feature = "postgres")]
fn pg_listing_row(row: &PgRow) -> DbResult<(ListingId, ListingFields)> {
    let map = postgres::map_sqlx_error;
    let id: uuid::Uuid = row.try_get("id").map_err(map)?;
    let fields = ListingFields::new(
        row.try_get("title").map_err(map)?,
        row.try_get("description").map_err(map)?,
        row.try_get("image").map_err(map)?,
        Price::new(row.try_get("price").map_err(map)?)?,
        row.try_get("location").map_err(map)?,
        row.try_get("country").map_err(map)?,
    );
    Ok((ListingId::new(id), fields))
}

/// Extracts the identifier and fields of a listing from a SQLite `row`.
#[cfg(any(feature = "sqlite", test))]
fn sqlite_listing_row(row: &SqliteRow) -> DbResult<(ListingId, ListingFields)> {
    let map = sqlite::map_sqlx_error;
    let id: String = row.try_get("id").map_err(map)?;
    let fields = ListingFields::new(
        row.try_get("title").map_err(map)?,
        row.try_get("description").map_err(map)?,
        row.try_get("image").map_err(map)?,
        Price::new(row.try_get("price").map_err(map)?)?,
        row.try_get("location").map_err(map)?,
        row.try_get("country").map_err(map)?,
    );
    Ok((id.parse::<ListingId>()?, fields))
}

/// Extracts a review from a PostgreSQL `row`.
#[cfg(feature = "postgres")]
fn pg_review_row(row: &PgRow) -> DbResult<Review> {
    let map = postgres::map_sqlx_error;
    let id: uuid::Uuid = row.try_get("id").map_err(map)?;
    let rating: i16 = row.try_get("rating").map_err(map)?;
    Ok(Review::new(
        ReviewId::new(id),
        row.try_get("comment").map_err(map)?,
        Rating::new(i64::from(rating))?,
        row.try_get("created_at").map_err(map)?,
    ))
}

/// Extracts a review from a SQLite `row`.
#[cfg(any(feature = "sqlite", test))]
fn sqlite_review_row(row: &SqliteRow) -> DbResult<Review> {
    let map = sqlite::map_sqlx_error;
    let id: String = row.try_get("id").map_err(map)?;
    let created_at_sec: i64 = row.try_get("created_at_sec").map_err(map)?;
    let created_at_nsec: i64 = row.try_get("created_at_nsec").map_err(map)?;
    Ok(Review::new(
        id.parse::<ReviewId>()?,
        row.try_get("comment").map_err(map)?,
        Rating::new(row.try_get("rating").map_err(map)?)?,
        build_timestamp(created_at_sec, created_at_nsec)?,
    ))
}

/// Ensures that an update or deletion touched exactly one row.
fn ensure_one_row(rows_affected: u64) -> DbResult<()> {
    match rows_affected {
        0 => Err(DbError::NotFound),
        1 => Ok(()),
        n => Err(DbError::BackendError(format!("Expected to affect one row but touched {}", n))),
    }
}

/// Creates a new listing with `id` and `fields`, without any reviews.
pub(crate) async fn create_listing(
    ex: &mut Executor,
    id: ListingId,
    fields: &ListingFields,
) -> DbResult<()> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                INSERT INTO listings (id, title, description, image, price, location, country)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
            ";
            sqlx::query(query_str)
                .bind(*id.as_ref())
                .bind(fields.title())
                .bind(fields.description())
                .bind(fields.image())
                .bind(fields.price().as_f64())
                .bind(fields.location())
                .bind(fields.country())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "
                INSERT INTO listings (id, title, description, image, price, location, country)
                VALUES (?, ?, ?, ?, ?, ?, ?)
            ";
            sqlx::query(query_str)
                .bind(id.to_string())
                .bind(fields.title())
                .bind(fields.description())
                .bind(fields.image())
                .bind(fields.price().as_f64())
                .bind(fields.location())
                .bind(fields.country())
                .execute(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
    Ok(())
}

/// Gets all listings in creation order, along with their review references.
pub(crate) async fn get_listings(ex: &mut Executor) -> DbResult<Vec<Listing>> {
    let listings_query = format!("SELECT {} FROM listings ORDER BY seq", LISTING_COLUMNS);
    let refs_query = "SELECT listing_id, review_id FROM listing_reviews ORDER BY listing_id, ordinal";

    let mut rows = vec![];
    let mut refs: HashMap<ListingId, Vec<ReviewId>> = HashMap::new();
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let map = postgres::map_sqlx_error;
            for row in sqlx::query(&listings_query).fetch_all(ex.conn()).await.map_err(map)? {
                rows.push(pg_listing_row(&row)?);
            }
            for row in sqlx::query(refs_query).fetch_all(ex.conn()).await.map_err(map)? {
                let listing_id: uuid::Uuid = row.try_get("listing_id").map_err(map)?;
                let review_id: uuid::Uuid = row.try_get("review_id").map_err(map)?;
                refs.entry(ListingId::new(listing_id)).or_default().push(ReviewId::new(review_id));
            }
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let map = sqlite::map_sqlx_error;
            for row in sqlx::query(&listings_query).fetch_all(ex.conn()).await.map_err(map)? {
                rows.push(sqlite_listing_row(&row)?);
            }
            for row in sqlx::query(refs_query).fetch_all(ex.conn()).await.map_err(map)? {
                let listing_id: String = row.try_get("listing_id").map_err(map)?;
                let review_id: String = row.try_get("review_id").map_err(map)?;
                refs.entry(listing_id.parse::<ListingId>()?)
                    .or_default()
                    .push(review_id.parse::<ReviewId>()?);
            }
        }

        #[allow(unused)]
        _ => unreachable!(),
    }

    Ok(rows
        .into_iter()
        .map(|(id, fields)| {
            let reviews = refs.remove(&id).unwrap_or_default();
            Listing::new(id, fields, reviews)
        })
        .collect())
}

/// Gets the listing identified by `id` along with its review references.
pub(crate) async fn get_listing(ex: &mut Executor, id: ListingId) -> DbResult<Listing> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let map = postgres::map_sqlx_error;
            let listing_query = format!("SELECT {} FROM listings WHERE id = $1", LISTING_COLUMNS);
            let refs_query =
                "SELECT review_id FROM listing_reviews WHERE listing_id = $1 ORDER BY ordinal";
            let row = sqlx::query(&listing_query)
                .bind(*id.as_ref())
                .fetch_optional(ex.conn())
                .await
                .map_err(map)?
                .ok_or(DbError::NotFound)?;
            let (id, fields) = pg_listing_row(&row)?;

            let mut reviews = vec![];
            for row in
                sqlx::query(refs_query).bind(*id.as_ref()).fetch_all(ex.conn()).await.map_err(map)?
            {
                let review_id: uuid::Uuid = row.try_get("review_id").map_err(map)?;
                reviews.push(ReviewId::new(review_id));
            }
            Ok(Listing::new(id, fields, reviews))
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let map = sqlite::map_sqlx_error;
            let listing_query = format!("SELECT {} FROM listings WHERE id = ?", LISTING_COLUMNS);
            let refs_query =
                "SELECT review_id FROM listing_reviews WHERE listing_id = ? ORDER BY ordinal";
            let row = sqlx::query(&listing_query)
                .bind(id.to_string())
                .fetch_optional(ex.conn())
                .await
                .map_err(map)?
                .ok_or(DbError::NotFound)?;
            let (id, fields) = sqlite_listing_row(&row)?;

            let mut reviews = vec![];
            for row in
                sqlx::query(refs_query).bind(id.to_string()).fetch_all(ex.conn()).await.map_err(map)?
            {
                let review_id: String = row.try_get("review_id").map_err(map)?;
                reviews.push(review_id.parse::<ReviewId>()?);
            }
            Ok(Listing::new(id, fields, reviews))
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Replaces the fields of the existing listing `id` with `fields`.
pub(crate) async fn update_listing(
    ex: &mut Executor,
    id: ListingId,
    fields: &ListingFields,
) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                UPDATE listings
                SET title = $1, description = $2, image = $3, price = $4, location = $5,
                    country = $6
                WHERE id = $7
            ";
            sqlx::query(query_str)
                .bind(fields.title())
                .bind(fields.description())
                .bind(fields.image())
                .bind(fields.price().as_f64())
                .bind(fields.location())
                .bind(fields.country())
                .bind(*id.as_ref())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?
                .rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "
                UPDATE listings
                SET title = ?, description = ?, image = ?, price = ?, location = ?, country = ?
                WHERE id = ?
            ";
            sqlx::query(query_str)
                .bind(fields.title())
                .bind(fields.description())
                .bind(fields.image())
                .bind(fields.price().as_f64())
                .bind(fields.location())
                .bind(fields.country())
                .bind(id.to_string())
                .execute(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?
                .rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    ensure_one_row(rows_affected)
}

/// Deletes the listing `id` and its review references.  The referenced reviews are left alone.
pub(crate) async fn delete_listing(ex: &mut Executor, id: ListingId) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            sqlx::query("DELETE FROM listings WHERE id = $1")
                .bind(*id.as_ref())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?
                .rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            sqlx::query("DELETE FROM listings WHERE id = ?")
                .bind(id.to_string())
                .execute(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?
                .rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    ensure_one_row(rows_affected)
}

/// Stores a new `review` that is not yet referenced by any listing.
pub(crate) async fn create_review(ex: &mut Executor, review: &Review) -> DbResult<()> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str =
                "INSERT INTO reviews (id, comment, rating, created_at) VALUES ($1, $2, $3, $4)";
            sqlx::query(query_str)
                .bind(*review.id().as_ref())
                .bind(review.comment())
                .bind(review.rating().as_i16())
                .bind(*review.created_at())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (created_at_sec, created_at_nsec) = unpack_timestamp(*review.created_at())?;

            let query_str = "
                INSERT INTO reviews (id, comment, rating, created_at_sec, created_at_nsec)
                VALUES (?, ?, ?, ?, ?)
            ";
            sqlx::query(query_str)
                .bind(review.id().to_string())
                .bind(review.comment())
                .bind(review.rating().as_i16())
                .bind(created_at_sec)
                .bind(created_at_nsec)
                .execute(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
    Ok(())
}

/// Appends a reference to `review_id` at the end of the reviews of `listing_id`.
///
/// Fails with `NotFound` if either the listing or the review do not exist.
pub(crate) async fn append_review_ref(
    ex: &mut Executor,
    listing_id: ListingId,
    review_id: ReviewId,
) -> DbResult<()> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                INSERT INTO listing_reviews (listing_id, review_id, ordinal)
                SELECT $1, $2, COALESCE(MAX(ordinal) + 1, 0)
                FROM listing_reviews WHERE listing_id = $1
            ";
            sqlx::query(query_str)
                .bind(*listing_id.as_ref())
                .bind(*review_id.as_ref())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "
                INSERT INTO listing_reviews (listing_id, review_id, ordinal)
                SELECT ?, ?, COALESCE(MAX(ordinal) + 1, 0)
                FROM listing_reviews WHERE listing_id = ?
            ";
            sqlx::query(query_str)
                .bind(listing_id.to_string())
                .bind(review_id.to_string())
                .bind(listing_id.to_string())
                .execute(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
    Ok(())
}

/// Gets the reviews referenced by `listing_id` in reference order.
///
/// A listing that does not exist has no reviews.
pub(crate) async fn get_listing_reviews(
    ex: &mut Executor,
    listing_id: ListingId,
) -> DbResult<Vec<Review>> {
    let mut reviews = vec![];
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                SELECT r.id, r.comment, r.rating, r.created_at
                FROM listing_reviews AS lr JOIN reviews AS r ON r.id = lr.review_id
                WHERE lr.listing_id = $1
                ORDER BY lr.ordinal
            ";
            let rows = sqlx::query(query_str)
                .bind(*listing_id.as_ref())
                .fetch_all(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            for row in rows {
                reviews.push(pg_review_row(&row)?);
            }
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "
                SELECT r.id, r.comment, r.rating, r.created_at_sec, r.created_at_nsec
                FROM listing_reviews AS lr JOIN reviews AS r ON r.id = lr.review_id
                WHERE lr.listing_id = ?
                ORDER BY lr.ordinal
            ";
            let rows = sqlx::query(query_str)
                .bind(listing_id.to_string())
                .fetch_all(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            for row in rows {
                reviews.push(sqlite_review_row(&row)?);
            }
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
    Ok(reviews)
}

/// Removes the reference to `review_id` from the reviews of `listing_id`, returning whether the
/// listing held that reference.
pub(crate) async fn remove_review_ref(
    ex: &mut Executor,
    listing_id: ListingId,
    review_id: ReviewId,
) -> DbResult<bool> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "DELETE FROM listing_reviews WHERE listing_id = $1 AND review_id = $2";
            sqlx::query(query_str)
                .bind(*listing_id.as_ref())
                .bind(*review_id.as_ref())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?
                .rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "DELETE FROM listing_reviews WHERE listing_id = ? AND review_id = ?";
            sqlx::query(query_str)
                .bind(listing_id.to_string())
                .bind(review_id.to_string())
                .execute(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?
                .rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    Ok(rows_affected > 0)
}

/// Deletes the review `id`, returning whether it existed.
pub(crate) async fn delete_review(ex: &mut Executor, id: ReviewId) -> DbResult<bool> {
    let count = delete_reviews(ex, &[id]).await?;
    Ok(count > 0)
}

/// Deletes all reviews in `ids` and returns how many of them existed.
pub(crate) async fn delete_reviews(ex: &mut Executor, ids: &[ReviewId]) -> DbResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }

    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let ids = ids.iter().map(|id| *id.as_ref()).collect::<Vec<uuid::Uuid>>();
            sqlx::query("DELETE FROM reviews WHERE id = ANY($1)")
                .bind(ids)
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?
                .rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let mut rows_affected = 0;
            for id in ids {
                rows_affected += sqlx::query("DELETE FROM reviews WHERE id = ?")
                    .bind(id.to_string())
                    .execute(ex.conn())
                    .await
                    .map_err(sqlite::map_sqlx_error)?
                    .rows_affected();
            }
            rows_affected
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    usize::try_from(rows_affected)
        .map_err(|e| DbError::BackendError(format!("Deleted row count out of range: {}", e)))
}

/// Counts all reviews in the database, whether they are referenced by a listing or not.
#[cfg(test)]
pub(crate) async fn count_reviews(ex: &mut Executor) -> DbResult<usize> {
    let query_str = "SELECT COUNT(*) AS total FROM reviews";
    let total: i64 = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let row = sqlx::query(query_str)
                .fetch_one(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            row.try_get("total").map_err(postgres::map_sqlx_error)?
        }

        Executor::Sqlite(ex) => {
            let row =
                sqlx::query(query_str).fetch_one(ex.conn()).await.map_err(sqlite::map_sqlx_error)?;
            row.try_get("total").map_err(sqlite::map_sqlx_error)?
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    usize::try_from(total).map_err(|e| DbError::DataIntegrityError(format!("Bad count: {}", e)))
}
