use std::{env, error::Error};

use async_trait::async_trait;
use model::{
    account::{Account, Caller},
    spot::{ParkingSpot, SpotPatch, Status},
    WithDistance, WithId,
};
use parking::database::{
    Database, DatabaseAutocommit, DatabaseOperations, Replaced, Result, SpotRepo,
};
use utility::id::Id;

pub mod data_model;
pub mod queries;

pub struct DatabaseConnectionInfo {
    pub username: String,
    pub password: String,
    pub hostname: String,
    pub port: u16,
    pub database: String,
}

impl DatabaseConnectionInfo {
    pub fn from_env() -> Option<Self> {
        let username = env::var("DATABASE_USER").ok()?;
        let password = env::var("DATABASE_PASSWORD").ok()?;
        let hostname = env::var("DATABASE_HOST").ok()?;
        let port: u16 = env::var("DATABASE_PORT").ok()?.parse().ok()?;
        let database = env::var("DATABASE_NAME").ok()?;
        Some(Self {
            username,
            password,
            hostname,
            port,
            database,
        })
    }

    pub(self) fn postgres_url(self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.hostname, self.port, self.database
        )
    }
}

#[derive(Clone)]
pub struct PgDatabase {
    connection: sqlx::PgPool,
}

pub struct PgDatabaseAutocommit {
    pool: sqlx::PgPool,
}

impl DatabaseOperations for PgDatabaseAutocommit {}

impl DatabaseAutocommit for PgDatabaseAutocommit {}

impl PgDatabase {
    pub async fn connect(
        database_connection_info: DatabaseConnectionInfo,
    ) -> std::result::Result<Self, Box<dyn Error>> {
        let url = database_connection_info.postgres_url();
        let pool = sqlx::postgres::PgPool::connect(&url).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        log::info!("connected to postgres, migrations applied");

        Ok(Self::from_pool(pool))
    }

    /// Uses an existing pool. The schema must already be migrated.
    pub fn from_pool(pool: sqlx::PgPool) -> Self {
        Self { connection: pool }
    }
}

#[async_trait]
impl Database for PgDatabase {
    type Autocommit = PgDatabaseAutocommit;

    fn auto(&self) -> Self::Autocommit {
        PgDatabaseAutocommit {
            pool: self.connection.clone(),
        }
    }

    async fn close(&self) {
        self.connection.close().await;
        log::info!("postgres connection pool closed");
    }
}

#[async_trait]
impl SpotRepo for PgDatabaseAutocommit {
    async fn get(&mut self, id: &Id<ParkingSpot>) -> Result<WithId<ParkingSpot>> {
        queries::spot::get(&self.pool, id).await
    }

    async fn get_by_owner(
        &mut self,
        owner: &Id<Account>,
    ) -> Result<Vec<WithId<ParkingSpot>>> {
        queries::spot::get_by_owner(&self.pool, owner).await
    }

    async fn insert(&mut self, spot: ParkingSpot) -> Result<WithId<ParkingSpot>> {
        queries::spot::insert(&self.pool, &Id::random(), &spot).await
    }

    async fn put(
        &mut self,
        editor: &Caller,
        spot: WithId<ParkingSpot>,
    ) -> Result<Replaced> {
        queries::spot::put(&self.pool, editor, spot).await
    }

    async fn update(
        &mut self,
        editor: &Caller,
        id: &Id<ParkingSpot>,
        patch: &SpotPatch,
    ) -> Result<WithId<ParkingSpot>> {
        queries::spot::modify(&self.pool, editor, id, |stored| patch.apply(stored)).await
    }

    async fn set_status(
        &mut self,
        editor: &Caller,
        id: &Id<ParkingSpot>,
        status: Status,
    ) -> Result<WithId<ParkingSpot>> {
        queries::spot::modify(&self.pool, editor, id, |stored| ParkingSpot {
            status,
            ..stored
        })
        .await
    }

    async fn find_nearby(
        &mut self,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
    ) -> Result<Vec<WithDistance<WithId<ParkingSpot>>>> {
        queries::spot::get_nearby(&self.pool, latitude, longitude, radius_meters).await
    }
}
