use model::{
    account::{Account, Caller},
    spot::ParkingSpot,
    WithDistance, WithId,
};
use parking::database::{DatabaseError, Replaced, Result};
use sqlx::{Executor, PgPool, Postgres};
use utility::{
    geo::{self, EARTH_RADIUS_METERS},
    id::Id,
    let_also::LetAlso,
};

use crate::data_model::{
    spot::{NearbySpotRow, RowStatus, SpotRow},
    with_id, with_ids,
};

use super::convert_error;

fn capacity(spot: &ParkingSpot) -> Result<i32> {
    i32::try_from(spot.capacity).map_err(|why| DatabaseError::Other(Box::new(why)))
}

pub async fn get<'c, E>(executor: E, id: &Id<ParkingSpot>) -> Result<WithId<ParkingSpot>>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as(
        "
        SELECT id, owner, name, description, latitude, longitude, address,
               capacity, price_per_hour, status, created_at
        FROM parking_spots
        WHERE id = $1;
        ",
    )
    .bind(id.raw_ref::<str>())
    .fetch_one(executor)
    .await
    .map(|row: SpotRow| with_id(row))
    .map_err(convert_error)
}

pub async fn get_by_owner<'c, E>(
    executor: E,
    owner: &Id<Account>,
) -> Result<Vec<WithId<ParkingSpot>>>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as(
        "
        SELECT id, owner, name, description, latitude, longitude, address,
               capacity, price_per_hour, status, created_at
        FROM parking_spots
        WHERE owner = $1
        ORDER BY created_at DESC, id;
        ",
    )
    .bind(owner.raw_ref::<str>())
    .fetch_all(executor)
    .await
    .map_err(convert_error)?
    .let_owned(|rows: Vec<SpotRow>| Ok(with_ids(rows)))
}

pub async fn insert<'c, E>(
    executor: E,
    id: &Id<ParkingSpot>,
    spot: &ParkingSpot,
) -> Result<WithId<ParkingSpot>>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as(
        "
        INSERT INTO parking_spots(
            id, owner, name, description, latitude, longitude, address,
            capacity, price_per_hour, status, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id, owner, name, description, latitude, longitude, address,
                  capacity, price_per_hour, status, created_at;
        ",
    )
    .bind(id.raw_ref::<str>())
    .bind(spot.owner.raw_ref::<str>())
    .bind(&spot.name)
    .bind(&spot.description)
    .bind(spot.latitude())
    .bind(spot.longitude())
    .bind(&spot.location.address)
    .bind(capacity(spot)?)
    .bind(spot.price_per_hour)
    .bind(RowStatus::from_status(spot.status))
    .bind(spot.created_at)
    .fetch_one(executor)
    .await
    .map(|row: SpotRow| with_id(row))
    .map_err(convert_error)
}

/// Overwrites every mutable column. `owner` and `created_at` are never changed.
pub async fn update<'c, E>(
    executor: E,
    id: &Id<ParkingSpot>,
    spot: &ParkingSpot,
) -> Result<WithId<ParkingSpot>>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as(
        "
        UPDATE parking_spots
        SET name = $2,
            description = $3,
            latitude = $4,
            longitude = $5,
            address = $6,
            capacity = $7,
            price_per_hour = $8,
            status = $9
        WHERE id = $1
        RETURNING id, owner, name, description, latitude, longitude, address,
                  capacity, price_per_hour, status, created_at;
        ",
    )
    .bind(id.raw_ref::<str>())
    .bind(&spot.name)
    .bind(&spot.description)
    .bind(spot.latitude())
    .bind(spot.longitude())
    .bind(&spot.location.address)
    .bind(capacity(spot)?)
    .bind(spot.price_per_hour)
    .bind(RowStatus::from_status(spot.status))
    .fetch_one(executor)
    .await
    .map(|row: SpotRow| with_id(row))
    .map_err(convert_error)
}

/// Reads a record and locks it until the surrounding transaction ends.
async fn get_for_update<'c, E>(
    executor: E,
    id: &Id<ParkingSpot>,
) -> Result<Option<WithId<ParkingSpot>>>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as(
        "
        SELECT id, owner, name, description, latitude, longitude, address,
               capacity, price_per_hour, status, created_at
        FROM parking_spots
        WHERE id = $1
        FOR UPDATE;
        ",
    )
    .bind(id.raw_ref::<str>())
    .fetch_optional(executor)
    .await
    .map(|row: Option<SpotRow>| row.map(with_id))
    .map_err(convert_error)
}

/// Checks the editor against the locked record and writes `change` of it in
/// one transaction. Nothing is written if the check fails.
pub async fn modify<F>(
    pool: &PgPool,
    editor: &Caller,
    id: &Id<ParkingSpot>,
    change: F,
) -> Result<WithId<ParkingSpot>>
where
    F: FnOnce(ParkingSpot) -> ParkingSpot + Send,
{
    let mut tx = pool.begin().await.map_err(convert_error)?;
    let stored = get_for_update(&mut *tx, id)
        .await?
        .ok_or(DatabaseError::NotFound)?;
    if !editor.may_edit(&stored.content.owner) {
        return Err(DatabaseError::Unauthorized);
    }
    let updated = update(&mut *tx, id, &change(stored.content)).await?;
    tx.commit().await.map_err(convert_error)?;
    Ok(updated)
}

pub async fn put(
    pool: &PgPool,
    editor: &Caller,
    spot: WithId<ParkingSpot>,
) -> Result<Replaced> {
    let mut tx = pool.begin().await.map_err(convert_error)?;
    let replaced = match get_for_update(&mut *tx, &spot.id).await? {
        Some(stored) => {
            if !editor.may_edit(&stored.content.owner) {
                return Err(DatabaseError::Unauthorized);
            }
            Replaced {
                spot: update(&mut *tx, &spot.id, &spot.content).await?,
                previous_status: Some(stored.content.status),
            }
        }
        None => Replaced {
            spot: insert(&mut *tx, &spot.id, &spot.content).await?,
            previous_status: None,
        },
    };
    tx.commit().await.map_err(convert_error)?;
    Ok(replaced)
}

pub async fn get_nearby<'c, E>(
    executor: E,
    center_latitude: f64,
    center_longitude: f64,
    radius_meters: f64,
) -> Result<Vec<WithDistance<WithId<ParkingSpot>>>>
where
    E: Executor<'c, Database = Postgres>,
{
    let bbox = geo::calculate_bounding_box(center_latitude, center_longitude, radius_meters);
    // at most two spans; a single span is bound twice
    let (west_min, west_max) = bbox
        .longitude_spans
        .first()
        .copied()
        .unwrap_or((-180.0, 180.0));
    let (east_min, east_max) = bbox
        .longitude_spans
        .last()
        .copied()
        .unwrap_or((west_min, west_max));

    sqlx::query_as(
        "
        WITH candidates AS (
            SELECT
                id, owner, name, description, latitude, longitude, address,
                capacity, price_per_hour, status, created_at,
                (2 * $1 * ASIN(SQRT(LEAST(1.0,
                    POWER(SIN(RADIANS(latitude - $2) / 2), 2) +
                    COS(RADIANS($2)) * COS(RADIANS(latitude)) *
                    POWER(SIN(RADIANS(longitude - $3) / 2), 2)
                )))) AS distance
            FROM
                parking_spots
            WHERE
                latitude BETWEEN $4 AND $5
                AND (
                    longitude BETWEEN $6 AND $7
                    OR longitude BETWEEN $8 AND $9
                )
        )
        SELECT *
        FROM candidates
        WHERE distance <= $10
        ORDER BY distance, id;
        ",
    )
    .bind(EARTH_RADIUS_METERS)
    .bind(center_latitude)
    .bind(center_longitude)
    .bind(bbox.min_latitude)
    .bind(bbox.max_latitude)
    .bind(west_min)
    .bind(west_max)
    .bind(east_min)
    .bind(east_max)
    .bind(radius_meters)
    .fetch_all(executor)
    .await
    .map_err(convert_error)?
    .let_owned(|rows: Vec<NearbySpotRow>| {
        Ok(rows.into_iter().map(NearbySpotRow::to_model).collect())
    })
}
