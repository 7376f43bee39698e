use chrono::{DateTime, Utc};
use model::{
    spot::{Location, ParkingSpot, Status},
    WithDistance, WithId,
};
use sqlx::prelude::FromRow;
use utility::id::Id;

use super::{with_id, DatabaseRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "spot_status", rename_all = "lowercase")]
pub enum RowStatus {
    Available,
    Limited,
    Full,
}

impl RowStatus {
    pub fn to_status(self) -> Status {
        match self {
            Self::Available => Status::Available,
            Self::Limited => Status::Limited,
            Self::Full => Status::Full,
        }
    }

    pub fn from_status(status: Status) -> Self {
        match status {
            Status::Available => Self::Available,
            Status::Limited => Self::Limited,
            Status::Full => Self::Full,
        }
    }
}

/// Table: `parking_spots`
#[derive(Debug, Clone, FromRow)]
pub struct SpotRow {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub capacity: i32,
    pub price_per_hour: f64,
    pub status: RowStatus,
    pub created_at: DateTime<Utc>,
}

impl DatabaseRow for SpotRow {
    type Model = ParkingSpot;

    fn get_id(&self) -> Id<Self::Model> {
        Id::new(self.id.clone())
    }

    fn to_model(self) -> Self::Model {
        ParkingSpot {
            owner: Id::new(self.owner),
            name: self.name,
            description: self.description,
            location: Location::new(self.latitude, self.longitude, self.address),
            // the table rejects negative capacities
            capacity: self.capacity.max(0) as u32,
            price_per_hour: self.price_per_hour,
            status: self.status.to_status(),
            created_at: self.created_at,
        }
    }
}

/// A spot row of a proximity query, with its distance to the center in meters.
#[derive(Debug, Clone, FromRow)]
pub struct NearbySpotRow {
    #[sqlx(flatten)]
    pub spot: SpotRow,
    pub distance: f64,
}

impl NearbySpotRow {
    pub fn to_model(self) -> WithDistance<WithId<ParkingSpot>> {
        WithDistance::new(self.distance, with_id(self.spot))
    }
}
