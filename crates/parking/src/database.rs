use std::{error, fmt, result};

use async_trait::async_trait;
use model::{
    account::{Account, Caller},
    spot::{ParkingSpot, SpotPatch, Status},
    WithDistance, WithId,
};
use utility::id::Id;

#[derive(Debug)]
pub enum DatabaseError {
    NotFound,
    /// The editor is neither the owner of the record nor an admin.
    Unauthorized,
    /// The backing store could not be reached.
    Unavailable(Box<dyn error::Error + Send + Sync>),
    Other(Box<dyn error::Error + Send + Sync>),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "record not found"),
            Self::Unauthorized => write!(f, "not authorized to modify record"),
            Self::Unavailable(why) => write!(f, "database unavailable: {}", why),
            Self::Other(why) => write!(f, "database error: {}", why),
        }
    }
}

impl error::Error for DatabaseError {}

pub type Result<T> = result::Result<T, DatabaseError>;

/// Result of replacing a whole record.
#[derive(Debug, Clone)]
pub struct Replaced {
    pub spot: WithId<ParkingSpot>,
    /// Status before the write, `None` if the record was newly inserted.
    pub previous_status: Option<Status>,
}

impl Replaced {
    pub fn status_changed(&self) -> bool {
        self.previous_status
            .is_some_and(|previous| previous != self.spot.content.status)
    }
}

/// Storage of parking spots.
///
/// Every write that touches an existing record is a single conditional write:
/// implementations check existence and the editor's capability and apply the
/// change atomically, failing with `NotFound` or `Unauthorized` without
/// modifying anything.
#[async_trait]
pub trait SpotRepo {
    async fn get(&mut self, id: &Id<ParkingSpot>) -> Result<WithId<ParkingSpot>>;

    /// All spots of an owner, newest first.
    async fn get_by_owner(
        &mut self,
        owner: &Id<Account>,
    ) -> Result<Vec<WithId<ParkingSpot>>>;

    async fn insert(&mut self, spot: ParkingSpot) -> Result<WithId<ParkingSpot>>;

    /// Inserts the record under its id or replaces the stored one. A replaced
    /// record keeps its `owner` and `created_at`.
    async fn put(
        &mut self,
        editor: &Caller,
        spot: WithId<ParkingSpot>,
    ) -> Result<Replaced>;

    async fn update(
        &mut self,
        editor: &Caller,
        id: &Id<ParkingSpot>,
        patch: &SpotPatch,
    ) -> Result<WithId<ParkingSpot>>;

    async fn set_status(
        &mut self,
        editor: &Caller,
        id: &Id<ParkingSpot>,
        status: Status,
    ) -> Result<WithId<ParkingSpot>>;

    /// Spots within `radius_meters` great-circle distance of the center, nearest
    /// first, ties ordered by id.
    ///
    /// Implementations answer this from a spatial index, never by scanning and
    /// measuring the whole collection.
    async fn find_nearby(
        &mut self,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
    ) -> Result<Vec<WithDistance<WithId<ParkingSpot>>>>;
}

pub trait DatabaseOperations: SpotRepo {}

pub trait DatabaseAutocommit: DatabaseOperations {}

/// trait to implement a parking spot database.
/// multiple concurrent accesses should be possible by e.g. cloning the database object.
#[async_trait]
pub trait Database: Clone + Send + Sync + Sized + 'static {
    type Autocommit: DatabaseAutocommit + Send;

    fn auto(&self) -> Self::Autocommit;

    /// Releases all resources. Operations issued afterwards fail with
    /// `DatabaseError::Unavailable`.
    async fn close(&self);
}
