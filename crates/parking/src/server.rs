use crate::{client::Client, database::Database, fanout::Fanout};

/// Owns the process wide components: the spot store and the status fanout.
/// Both are handed in by whoever assembles the process, so tests can run
/// any number of isolated servers side by side.
pub struct Server<D>
where
    D: Database,
{
    database: D,
    fanout: Fanout,
}

impl<D> Server<D>
where
    D: Database,
{
    pub fn new(database: D, fanout: Fanout) -> Self {
        Self { database, fanout }
    }

    pub fn client<S: Into<String>>(&self, id: S) -> Client<D> {
        Client::new(id, self.database.clone(), self.fanout.clone())
    }

    pub fn fanout(&self) -> &Fanout {
        &self.fanout
    }

    /// Ends all realtime subscriptions, then releases the store.
    pub async fn shutdown(self) {
        self.fanout.close();
        self.database.close().await;
        log::info!("parking server shut down");
    }
}

#[cfg(test)]
mod tests {
    use model::{
        account::{Caller, Role},
        spot::{Location, NewParkingSpot},
    };
    use utility::id::Id;

    use super::*;
    use crate::{memory::MemoryDatabase, RequestError};

    #[tokio::test]
    async fn shutdown_ends_subscriptions_and_storage() {
        let server = Server::new(MemoryDatabase::new(), Fanout::new());
        let client = server.client("test");
        let mut subscription = client.subscribe();

        server.shutdown().await;

        assert_eq!(subscription.recv().await, None);
        let owner = Caller::new(Id::new("alice".to_owned()), Role::Owner);
        let spot = NewParkingSpot {
            name: "Lot".to_owned(),
            description: None,
            location: Location::new(1.0, 1.0, None),
            capacity: 1,
            price_per_hour: 0.0,
        };
        let result = client.create_spot(&owner, spot).await;
        assert!(matches!(result, Err(RequestError::StorageUnavailable(_))));
    }

    #[tokio::test]
    async fn servers_do_not_share_subscribers() {
        let one = Server::new(MemoryDatabase::new(), Fanout::new());
        let other = Server::new(MemoryDatabase::new(), Fanout::new());
        let _subscription = one.client("a").subscribe();
        assert_eq!(one.fanout().subscriber_count(), 1);
        assert_eq!(other.fanout().subscriber_count(), 0);
    }
}
