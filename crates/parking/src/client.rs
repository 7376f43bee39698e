use chrono::Utc;
use model::{
    account::Caller,
    spot::{NewParkingSpot, ParkingSpot, SpotPatch, Status, StatusUpdate},
    WithDistance, WithId,
};
use utility::{geo, id::Id, let_also::LetAlso};

use crate::{
    database::{Database, SpotRepo},
    fanout::{Fanout, Subscription},
    not_found_to_none, RequestError, RequestResult,
};

/// Radius of a proximity query when the caller does not give one.
pub const DEFAULT_RADIUS_METERS: f64 = 5000.0;

/// Entry point for everything a request handler does with parking spots.
///
/// Writes go to the store first. Only after the store accepted a status change
/// it is published to the fanout, so subscribers never see a change that was
/// not persisted. A failed publish is logged and does not fail the write.
#[derive(Clone)]
pub struct Client<D>
where
    D: Database,
{
    id: String,
    pub database: D,
    fanout: Fanout,
}

impl<D> Client<D>
where
    D: Database,
{
    pub(crate) fn new<S>(id: S, database: D, fanout: Fanout) -> Self
    where
        S: Into<String>,
    {
        Self {
            id: id.into(),
            database,
            fanout,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Attaches a realtime subscriber to the status fanout.
    pub fn subscribe(&self) -> Subscription {
        self.fanout.subscribe()
    }

    fn publish(&self, spot: &WithId<ParkingSpot>) {
        let update = StatusUpdate::new(spot.id.clone(), spot.content.status);
        if let Err(why) = self.fanout.publish(update) {
            log::warn!(
                "[{}] status `{}` of spot {} committed but not published: {}",
                self.id,
                spot.content.status,
                spot.id,
                why
            );
        }
    }
}

impl<D> Client<D>
where
    D: Database,
{
    pub async fn find_nearby(
        &self,
        latitude: f64,
        longitude: f64,
        radius_meters: Option<f64>,
    ) -> RequestResult<Vec<WithDistance<WithId<ParkingSpot>>>> {
        if !geo::is_valid_latitude(latitude) {
            return Err(RequestError::invalid_argument(format!(
                "latitude {} is not within [-90, 90]",
                latitude
            )));
        }
        if !geo::is_valid_longitude(longitude) {
            return Err(RequestError::invalid_argument(format!(
                "longitude {} is not within [-180, 180]",
                longitude
            )));
        }
        let radius = radius_meters.unwrap_or(DEFAULT_RADIUS_METERS);
        if !radius.is_finite() || radius < 0.0 {
            return Err(RequestError::invalid_argument(format!(
                "radius {} must be a non-negative number of meters",
                radius
            )));
        }
        Ok(self
            .database
            .auto()
            .find_nearby(latitude, longitude, radius)
            .await?)
    }

    pub async fn get_spot(&self, id: &Id<ParkingSpot>) -> RequestResult<WithId<ParkingSpot>> {
        Ok(self.database.auto().get(id).await?)
    }

    /// All spots of the caller, newest first.
    pub async fn get_own_spots(
        &self,
        caller: &Caller,
    ) -> RequestResult<Vec<WithId<ParkingSpot>>> {
        self.database
            .auto()
            .get_by_owner(&caller.account)
            .await?
            .let_owned(Ok)
    }

    pub async fn create_spot(
        &self,
        caller: &Caller,
        spot: NewParkingSpot,
    ) -> RequestResult<WithId<ParkingSpot>> {
        if !caller.may_create() {
            return Err(RequestError::Unauthorized);
        }
        spot.validate()?;
        let created = self
            .database
            .auto()
            .insert(spot.into_spot(caller.account.clone(), Utc::now()))
            .await?;
        log::info!(
            "[{}] spot {} created by {}",
            self.id,
            created.id,
            caller.account
        );
        Ok(created)
    }

    /// Stores the record under its id. Unknown ids are created with the caller
    /// as owner (admins may set any owner); known ids are replaced keeping their
    /// owner and creation time.
    pub async fn upsert_spot(
        &self,
        caller: &Caller,
        mut spot: WithId<ParkingSpot>,
    ) -> RequestResult<WithId<ParkingSpot>> {
        spot.content.validate()?;
        let mut db = self.database.auto();
        let existing = not_found_to_none(db.get(&spot.id).await.map_err(Into::into))?;
        if existing.is_none() {
            if !caller.may_create() {
                return Err(RequestError::Unauthorized);
            }
            if !caller.is_admin() {
                spot.content.owner = caller.account.clone();
            }
        }
        let replaced = db.put(caller, spot).await?;
        if replaced.status_changed() {
            self.publish(&replaced.spot);
        }
        Ok(replaced.spot)
    }

    /// Applies a partial update. A patch carrying a status is announced to
    /// realtime subscribers like `set_status`.
    pub async fn update_spot(
        &self,
        caller: &Caller,
        id: &Id<ParkingSpot>,
        patch: SpotPatch,
    ) -> RequestResult<WithId<ParkingSpot>> {
        patch.validate()?;
        if patch.is_empty() {
            log::debug!("[{}] empty update of spot {} by {}", self.id, id, caller.account);
        }
        let updated = self.database.auto().update(caller, id, &patch).await?;
        if patch.status.is_some() {
            self.publish(&updated);
        }
        Ok(updated)
    }

    pub async fn set_status(
        &self,
        caller: &Caller,
        id: &Id<ParkingSpot>,
        status: Status,
    ) -> RequestResult<WithId<ParkingSpot>> {
        let updated = self
            .database
            .auto()
            .set_status(caller, id, status)
            .await?;
        self.publish(&updated);
        Ok(updated)
    }
}
