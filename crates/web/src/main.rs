use std::error::Error;

use database::{DatabaseConnectionInfo, PgDatabase};
use parking::{database::Database, fanout::Fanout, memory::MemoryDatabase, server::Server};
use web::{start_web_server, WebConfig, WebState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let config = WebConfig::from_env();
    let fanout = Fanout::new();

    // database
    match DatabaseConnectionInfo::from_env() {
        Some(database_connection_info) => {
            let database = PgDatabase::connect(database_connection_info).await?;
            run(database, fanout, config).await?;
        }
        None => {
            log::warn!("no database configured, parking spots are kept in memory only");
            run(MemoryDatabase::new(), fanout, config).await?;
        }
    }

    Ok(())
}

async fn run<D: Database>(database: D, fanout: Fanout, config: WebConfig) -> std::io::Result<()> {
    let server = Server::new(database, fanout);

    // realtime streams only end once the fanout is closed, graceful shutdown waits for them
    let fanout = server.fanout().clone();
    let shutdown = async move {
        if let Err(why) = tokio::signal::ctrl_c().await {
            log::error!("could not listen for shutdown signal: {}", why);
            std::future::pending::<()>().await;
        }
        log::info!("shutting down");
        fanout.close();
    };

    // web server
    let result = start_web_server(
        WebState {
            parking_client: server.client("REST API"),
        },
        config,
        shutdown,
    )
    .await;

    server.shutdown().await;
    result
}
