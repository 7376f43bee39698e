//! An in-process parking spot store.
//!
//! Records live in hash-sharded maps, each behind its own lock, and their points
//! in a separate [`GridIndex`]. Status writes only lock the shard of the record,
//! so proximity queries never wait for them; relocations lock the index just
//! long enough to move one entry.

use std::{
    collections::{hash_map::DefaultHasher, HashMap},
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

use async_trait::async_trait;
use itertools::Itertools;
use model::{
    account::{Account, Caller},
    spot::{ParkingSpot, SpotPatch, Status},
    WithDistance, WithId,
};
use utility::{geo, id::Id};

use crate::database::{
    Database, DatabaseAutocommit, DatabaseError, DatabaseOperations, Replaced, Result,
    SpotRepo,
};

pub mod index;

use index::GridIndex;

const SHARDS: usize = 16;

type Shard = RwLock<HashMap<String, WithId<ParkingSpot>>>;

struct Store {
    closed: AtomicBool,
    shards: Vec<Shard>,
    index: RwLock<GridIndex>,
}

#[derive(Debug)]
struct Poisoned;

impl std::fmt::Display for Poisoned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "in-memory store lock poisoned")
    }
}

impl std::error::Error for Poisoned {}

#[derive(Debug)]
struct Closed;

impl std::fmt::Display for Closed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "in-memory store closed")
    }
}

impl std::error::Error for Closed {}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| DatabaseError::Unavailable(Box::new(Poisoned)))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| DatabaseError::Unavailable(Box::new(Poisoned)))
}

impl Store {
    fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            shards: (0..SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
            index: RwLock::new(GridIndex::new()),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DatabaseError::Unavailable(Box::new(Closed)));
        }
        Ok(())
    }

    fn shard(&self, key: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % SHARDS]
    }

    fn get(&self, key: &str) -> Result<WithId<ParkingSpot>> {
        self.ensure_open()?;
        read(self.shard(key))?
            .get(key)
            .cloned()
            .ok_or(DatabaseError::NotFound)
    }

    /// Replaces the content of a stored record, keeping its owner and creation
    /// time. Returns the previous content.
    fn replace(
        &self,
        key: &str,
        stored: &mut WithId<ParkingSpot>,
        mut next: ParkingSpot,
    ) -> Result<ParkingSpot> {
        let previous = stored.content.clone();
        next.owner = previous.owner.clone();
        next.created_at = previous.created_at;
        if previous.location.point != next.location.point {
            write(&self.index)?.relocate(
                key,
                (previous.latitude(), previous.longitude()),
                (next.latitude(), next.longitude()),
            );
        }
        stored.content = next;
        Ok(previous)
    }

    /// Applies `change` to an existing record while holding its shard lock,
    /// after checking the editor's capability.
    fn modify<F>(&self, editor: &Caller, key: &str, change: F) -> Result<WithId<ParkingSpot>>
    where
        F: FnOnce(&ParkingSpot) -> ParkingSpot,
    {
        self.ensure_open()?;
        let mut shard = write(self.shard(key))?;
        let stored = shard.get_mut(key).ok_or(DatabaseError::NotFound)?;
        if !editor.may_edit(&stored.content.owner) {
            return Err(DatabaseError::Unauthorized);
        }
        let next = change(&stored.content);
        self.replace(key, stored, next)?;
        Ok(stored.clone())
    }
}

/// In-memory implementation of [`Database`]. Clones share the same data.
#[derive(Clone)]
pub struct MemoryDatabase {
    store: Arc<Store>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            store: Arc::new(Store::new()),
        }
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MemoryAutocommit {
    store: Arc<Store>,
}

impl DatabaseOperations for MemoryAutocommit {}

impl DatabaseAutocommit for MemoryAutocommit {}

#[async_trait]
impl Database for MemoryDatabase {
    type Autocommit = MemoryAutocommit;

    fn auto(&self) -> Self::Autocommit {
        MemoryAutocommit {
            store: self.store.clone(),
        }
    }

    async fn close(&self) {
        self.store.closed.store(true, Ordering::Release);
        log::info!("in-memory database closed");
    }
}

#[async_trait]
impl SpotRepo for MemoryAutocommit {
    async fn get(&mut self, id: &Id<ParkingSpot>) -> Result<WithId<ParkingSpot>> {
        self.store.get(id.raw_ref::<str>())
    }

    async fn get_by_owner(
        &mut self,
        owner: &Id<Account>,
    ) -> Result<Vec<WithId<ParkingSpot>>> {
        self.store.ensure_open()?;
        let mut spots = vec![];
        for shard in &self.store.shards {
            spots.extend(
                read(shard)?
                    .values()
                    .filter(|spot| &spot.content.owner == owner)
                    .cloned(),
            );
        }
        Ok(spots
            .into_iter()
            .sorted_by(|a, b| {
                b.content
                    .created_at
                    .cmp(&a.content.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .collect())
    }

    async fn insert(&mut self, spot: ParkingSpot) -> Result<WithId<ParkingSpot>> {
        self.store.ensure_open()?;
        let id: Id<ParkingSpot> = Id::random();
        let key = id.raw();
        let spot = WithId::new(id, spot);
        write(self.store.shard(&key))?.insert(key.clone(), spot.clone());
        write(&self.store.index)?.insert(
            &key,
            spot.content.latitude(),
            spot.content.longitude(),
        );
        Ok(spot)
    }

    async fn put(
        &mut self,
        editor: &Caller,
        spot: WithId<ParkingSpot>,
    ) -> Result<Replaced> {
        self.store.ensure_open()?;
        let key = spot.id.raw();
        let mut shard = write(self.store.shard(&key))?;
        if let Some(stored) = shard.get_mut(&key) {
            if !editor.may_edit(&stored.content.owner) {
                return Err(DatabaseError::Unauthorized);
            }
            let previous = self.store.replace(&key, stored, spot.content)?;
            return Ok(Replaced {
                spot: stored.clone(),
                previous_status: Some(previous.status),
            });
        }
        shard.insert(key.clone(), spot.clone());
        write(&self.store.index)?.insert(
            &key,
            spot.content.latitude(),
            spot.content.longitude(),
        );
        Ok(Replaced {
            spot,
            previous_status: None,
        })
    }

    async fn update(
        &mut self,
        editor: &Caller,
        id: &Id<ParkingSpot>,
        patch: &SpotPatch,
    ) -> Result<WithId<ParkingSpot>> {
        self.store
            .modify(editor, id.raw_ref::<str>(), |stored| patch.apply(stored.clone()))
    }

    async fn set_status(
        &mut self,
        editor: &Caller,
        id: &Id<ParkingSpot>,
        status: Status,
    ) -> Result<WithId<ParkingSpot>> {
        self.store
            .modify(editor, id.raw_ref::<str>(), |stored| ParkingSpot {
                status,
                ..stored.clone()
            })
    }

    async fn find_nearby(
        &mut self,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
    ) -> Result<Vec<WithDistance<WithId<ParkingSpot>>>> {
        self.store.ensure_open()?;
        let bbox = geo::calculate_bounding_box(latitude, longitude, radius_meters);
        // the index lock is released before any record is read
        let candidates = read(&self.store.index)?.candidates(&bbox);

        let mut nearby = vec![];
        for key in candidates {
            let Some(spot) = read(self.store.shard(&key))?.get(&key).cloned() else {
                continue;
            };
            if !bbox.contains(spot.content.latitude(), spot.content.longitude()) {
                continue;
            }
            let distance = spot.content.distance_to(latitude, longitude);
            if distance <= radius_meters {
                nearby.push(WithDistance::new(distance, spot));
            }
        }
        Ok(nearby
            .into_iter()
            .sorted_by(|a, b| {
                a.distance
                    .total_cmp(&b.distance)
                    .then_with(|| a.content.id.cmp(&b.content.id))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use model::{
        account::Role,
        spot::{Location, NewParkingSpot},
    };

    use super::*;

    fn owner(name: &str) -> Caller {
        Caller::new(Id::new(name.to_owned()), Role::Owner)
    }

    fn spot(owner: &Caller, latitude: f64, longitude: f64) -> ParkingSpot {
        NewParkingSpot {
            name: "Lot".to_owned(),
            description: None,
            location: Location::new(latitude, longitude, None),
            capacity: 10,
            price_per_hour: 2.0,
        }
        .into_spot(owner.account.clone(), Utc::now())
    }

    #[tokio::test]
    async fn nearby_is_filtered_and_sorted() {
        let database = MemoryDatabase::new();
        let alice = owner("alice");
        let mut db = database.auto();
        let far = db.insert(spot(&alice, 12.9716, 77.6146)).await.unwrap();
        let near = db.insert(spot(&alice, 12.9716, 77.5946)).await.unwrap();
        db.insert(spot(&alice, 13.9716, 77.5946)).await.unwrap();

        let result = db.find_nearby(12.9716, 77.5956, 3_000.0).await.unwrap();
        let ids = result.iter().map(|s| s.content.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids, vec![near.id, far.id]);
        assert!(result[0].distance < result[1].distance);
    }

    #[tokio::test]
    async fn equal_distances_are_ordered_by_id() {
        let database = MemoryDatabase::new();
        let alice = owner("alice");
        let mut db = database.auto();
        for _ in 0..5 {
            db.insert(spot(&alice, 1.0, 1.0)).await.unwrap();
        }
        let ids = db
            .find_nearby(1.0, 1.0, 10.0)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.content.id)
            .collect::<Vec<_>>();
        assert_eq!(ids.len(), 5);
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn writes_check_ownership() {
        let database = MemoryDatabase::new();
        let alice = owner("alice");
        let bob = owner("bob");
        let admin = Caller::new(Id::new("root".to_owned()), Role::Admin);
        let mut db = database.auto();
        let stored = db.insert(spot(&alice, 1.0, 1.0)).await.unwrap();

        let denied = db.set_status(&bob, &stored.id, Status::Full).await;
        assert!(matches!(denied, Err(DatabaseError::Unauthorized)));
        assert_eq!(
            db.get(&stored.id).await.unwrap().content.status,
            Status::Available
        );

        let updated = db.set_status(&admin, &stored.id, Status::Full).await.unwrap();
        assert_eq!(updated.content.status, Status::Full);

        let missing = db
            .set_status(&alice, &Id::new("missing".to_owned()), Status::Full)
            .await;
        assert!(matches!(missing, Err(DatabaseError::NotFound)));
    }

    #[tokio::test]
    async fn relocation_replaces_index_entry() {
        let database = MemoryDatabase::new();
        let alice = owner("alice");
        let mut db = database.auto();
        let stored = db.insert(spot(&alice, 1.0, 1.0)).await.unwrap();

        let patch = SpotPatch {
            location: Some(Location::new(48.8566, 2.3522, Some("Paris".to_owned()))),
            ..Default::default()
        };
        db.update(&alice, &stored.id, &patch).await.unwrap();

        assert!(db.find_nearby(1.0, 1.0, 1_000.0).await.unwrap().is_empty());
        let moved = db.find_nearby(48.8566, 2.3522, 10.0).await.unwrap();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].content.content.address(), Some("Paris".to_owned()));
    }

    #[tokio::test]
    async fn put_keeps_owner_and_creation_time() {
        let database = MemoryDatabase::new();
        let alice = owner("alice");
        let admin = Caller::new(Id::new("root".to_owned()), Role::Admin);
        let mut db = database.auto();
        let stored = db.insert(spot(&alice, 1.0, 1.0)).await.unwrap();

        let mut replacement = spot(&admin, 1.0, 1.0);
        replacement.status = Status::Limited;
        replacement.created_at = stored.content.created_at + Duration::days(1);
        let replaced = db
            .put(&admin, WithId::new(stored.id.clone(), replacement))
            .await
            .unwrap();

        assert!(replaced.status_changed());
        assert_eq!(replaced.previous_status, Some(Status::Available));
        assert_eq!(replaced.spot.content.owner, alice.account);
        assert_eq!(replaced.spot.content.created_at, stored.content.created_at);

        let fresh = db
            .put(&alice, WithId::new(Id::new("fresh".to_owned()), spot(&alice, 2.0, 2.0)))
            .await
            .unwrap();
        assert_eq!(fresh.previous_status, None);
        assert!(!fresh.status_changed());
        assert_eq!(db.find_nearby(2.0, 2.0, 1.0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn owner_listing_is_newest_first() {
        let database = MemoryDatabase::new();
        let alice = owner("alice");
        let bob = owner("bob");
        let mut db = database.auto();
        let mut older = spot(&alice, 1.0, 1.0);
        older.created_at = Utc::now() - Duration::hours(1);
        let older = db.insert(older).await.unwrap();
        let newer = db.insert(spot(&alice, 1.0, 1.0)).await.unwrap();
        db.insert(spot(&bob, 1.0, 1.0)).await.unwrap();

        let ids = db
            .get_by_owner(&alice.account)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn reads_run_alongside_writes() {
        const SPOTS: usize = 16;
        const ROUNDS: usize = 50;
        const RADIUS: f64 = 2_000.0;

        let database = MemoryDatabase::new();
        let alice = owner("alice");
        let near = |i: usize| Location::new(1.0, 1.0 + 0.001 * i as f64, None);
        let far = Location::new(1.5, 1.5, None);

        let mut stored = vec![];
        for i in 0..SPOTS {
            let location = near(i);
            let spot = spot(&alice, location.latitude(), location.longitude());
            stored.push(database.auto().insert(spot).await.unwrap().id);
        }

        let mut writers = vec![];
        for (i, id) in stored.iter().cloned().enumerate() {
            let database = database.clone();
            let alice = alice.clone();
            let far = far.clone();
            writers.push(tokio::spawn(async move {
                let mut db = database.auto();
                for round in 0..ROUNDS {
                    let status = if round % 2 == 0 { Status::Full } else { Status::Limited };
                    db.set_status(&alice, &id, status).await.unwrap();
                    let location = if round % 2 == 0 { far.clone() } else { near(i) };
                    let patch = SpotPatch {
                        location: Some(location),
                        ..Default::default()
                    };
                    db.update(&alice, &id, &patch).await.unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }

        let mut readers = vec![];
        for _ in 0..4 {
            let database = database.clone();
            readers.push(tokio::spawn(async move {
                let mut db = database.auto();
                for _ in 0..ROUNDS {
                    let found = db.find_nearby(1.0, 1.0, RADIUS).await.unwrap();
                    assert!(found.len() <= SPOTS);
                    for spot in &found {
                        let distance = geo::haversine_distance(
                            1.0,
                            1.0,
                            spot.content.content.latitude(),
                            spot.content.content.longitude(),
                        );
                        assert!(distance <= RADIUS);
                        assert!((distance - spot.distance).abs() < 1e-6);
                    }
                    assert!(found.windows(2).all(|pair| pair[0].distance <= pair[1].distance));
                    assert!(found
                        .iter()
                        .map(|spot| &spot.content.id)
                        .all_unique());
                    tokio::task::yield_now().await;
                }
            }));
        }

        for task in writers.into_iter().chain(readers) {
            task.await.unwrap();
        }

        // every spot ended on its near location, exactly once in the index
        let mut db = database.auto();
        let found = db.find_nearby(1.0, 1.0, RADIUS).await.unwrap();
        assert_eq!(found.len(), SPOTS);
        assert!(db.find_nearby(1.5, 1.5, RADIUS).await.unwrap().is_empty());
        assert!(found
            .iter()
            .all(|spot| spot.content.content.status == Status::Limited));
    }

    #[tokio::test]
    async fn closed_database_is_unavailable() {
        let database = MemoryDatabase::new();
        database.close().await;
        let result = database.auto().find_nearby(1.0, 1.0, 10.0).await;
        assert!(matches!(result, Err(DatabaseError::Unavailable(_))));
    }
}
