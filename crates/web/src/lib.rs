pub use crate::common::RouteResult;

use std::{
    env,
    future::Future,
    io,
    path::{Path, PathBuf},
};

use axum::{
    routing::{get_service, MethodRouter},
    Router,
};
use parking::{client::Client, database::Database};
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
};

pub mod api;
pub mod common;
pub mod hateoas;
pub mod middleware;

#[derive(Clone)]
pub struct WebState<D>
where
    D: Database,
{
    pub parking_client: Client<D>,
}

pub struct WebConfig {
    pub bind_address: String,
    pub port: u16,
    pub static_dir: PathBuf,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_owned(),
            port: 5000,
            static_dir: PathBuf::from("./resources/www/"),
        }
    }
}

impl WebConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(bind_address) = env::var("BIND_ADDRESS") {
            config.bind_address = bind_address;
        }
        if let Ok(port) = env::var("PORT") {
            match port.parse() {
                Ok(port) => config.port = port,
                Err(why) => log::warn!(
                    "ignoring PORT `{}` ({}), using {}",
                    port,
                    why,
                    config.port
                ),
            }
        }
        if let Ok(static_dir) = env::var("STATIC_DIR") {
            config.static_dir = PathBuf::from(static_dir);
        }
        config
    }
}

pub async fn start_web_server<D, F>(
    state: WebState<D>,
    config: WebConfig,
    shutdown: F,
) -> io::Result<()>
where
    D: Database,
    F: Future<Output = ()> + Send + 'static,
{
    let listener =
        TcpListener::bind((config.bind_address.as_str(), config.port)).await?;
    serve(listener, state, &config.static_dir, shutdown).await
}

/// Serves the API on an already bound listener until `shutdown` resolves.
pub async fn serve<D, F>(
    listener: TcpListener,
    state: WebState<D>,
    static_dir: &Path,
    shutdown: F,
) -> io::Result<()>
where
    D: Database,
    F: Future<Output = ()> + Send + 'static,
{
    let routes = Router::new()
        .nest_service("/api", api::routes(state))
        .fallback_service(static_content_router(static_dir))
        .layer(CorsLayer::permissive());

    log::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, routes.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
}

fn static_content_router(static_dir: &Path) -> MethodRouter {
    get_service(
        ServeDir::new(static_dir)
            .not_found_service(ServeFile::new(static_dir.join("error404.html"))),
    )
}
