use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        OriginalUri, Path, Query, State,
    },
    http::Method,
    routing::{get, on, patch, post},
    Extension, Json, Router,
};
use model::{
    spot::{Location, NewParkingSpot, ParkingSpot, SpotPatch, Status},
    WithDistance, WithId,
};
use parking::{database::Database, RequestError, RequestResult};
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, NoneAsEmptyString, PickFirst};
use utility::{id::Id, let_also::LetAlso};

use crate::{
    common::{route_not_found, schema, RouteErrorResponse, RouteResult, METHOD_FILTER_ALL},
    hateoas,
    middleware::{
        base_url::{base_url_middleware, BaseUrl},
        caller::Authenticated,
    },
    WebState,
};

use super::realtime;

macro_rules! resource {
    ($($arg:tt)*) => {
        crate::api::resource!("/parking{}", format_args!($($arg)*))
    };
}

type SpotResponse = hateoas::Response<WithId<ParkingSpot>>;

pub(crate) fn routes<D: Database>(state: WebState<D>) -> Router {
    Router::new()
        .route("/", post(create_spot::<D>))
        .route("/nearby", get(nearby::<D>))
        .route("/mine", get(my_spots::<D>))
        .route("/schema", get(schema::<ParkingSpot>))
        .route("/realtime", get(realtime::status_updates::<D>))
        .route("/:id", get(get_spot::<D>).put(update_spot::<D>))
        .route("/:id/availability", patch(set_availability::<D>))
        .layer(axum::middleware::from_fn(base_url_middleware))
        .with_state(state)
        .fallback_service(on(METHOD_FILTER_ALL, route_not_found))
}

pub(crate) fn spot_hateoas<T>(
    content: T,
    id: &Id<ParkingSpot>,
    base_url: Arc<BaseUrl>,
) -> hateoas::Response<T> {
    hateoas::Response::builder(content, base_url)
        .link("self", resource!("/{}", id))
        .link("availability", resource!("/{}/availability", id))
        .build()
}

fn with_links(spot: WithId<ParkingSpot>, base_url: Arc<BaseUrl>) -> SpotResponse {
    let id = spot.id.clone();
    spot_hateoas(spot, &id, base_url)
}

// - query and body parameters -

#[serde_as]
#[derive(Debug, Deserialize)]
struct NearbyQuery {
    lat: Option<f64>,
    lng: Option<f64>,
    /// In meters. An empty value falls back to the default radius.
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    radius: Option<f64>,
}

/// Numbers are accepted as JSON numbers or numeric strings, as form posts send them.
#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSpotBody {
    name: String,

    #[serde(default)]
    description: Option<String>,

    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    latitude: f64,

    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    longitude: f64,

    #[serde(default)]
    address: Option<String>,

    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    capacity: u32,

    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    price_per_hour: f64,
}

impl CreateSpotBody {
    fn into_new_spot(self) -> NewParkingSpot {
        NewParkingSpot {
            name: self.name,
            description: self.description,
            location: Location::new(self.latitude, self.longitude, self.address),
            capacity: self.capacity,
            price_per_hour: self.price_per_hour,
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateSpotBody {
    #[serde(default)]
    name: Option<String>,

    #[serde(default)]
    description: Option<String>,

    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default)]
    latitude: Option<f64>,

    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default)]
    longitude: Option<f64>,

    #[serde(default)]
    address: Option<String>,

    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default)]
    capacity: Option<u32>,

    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default)]
    price_per_hour: Option<f64>,

    #[serde(default)]
    status: Option<String>,
}

impl UpdateSpotBody {
    fn into_patch(self) -> RequestResult<SpotPatch> {
        let location = match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => {
                Some(Location::new(latitude, longitude, self.address))
            }
            (None, None) if self.address.is_some() => {
                return Err(RequestError::invalid_argument(
                    "address can only be changed together with latitude and longitude",
                ))
            }
            (None, None) => None,
            _ => {
                return Err(RequestError::invalid_argument(
                    "latitude and longitude must be given together",
                ))
            }
        };
        Ok(SpotPatch {
            name: self.name,
            description: self.description,
            location,
            capacity: self.capacity,
            price_per_hour: self.price_per_hour,
            status: self.status.as_deref().map(str::parse).transpose()?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AvailabilityBody {
    status: String,
}

// - handlers -

async fn nearby<D: Database>(
    OriginalUri(original_uri): OriginalUri,
    State(WebState { parking_client }): State<WebState<D>>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
    query: Result<Query<NearbyQuery>, QueryRejection>,
) -> RouteResult<Json<Vec<hateoas::Response<WithDistance<WithId<ParkingSpot>>>>>> {
    let Query(params) = query.map_err(|why| {
        RouteErrorResponse::from(why)
            .with_method(&Method::GET)
            .with_uri(original_uri.path())
    })?;
    let (Some(latitude), Some(longitude)) = (params.lat, params.lng) else {
        return Err(RouteErrorResponse::bad_request("Please provide lat and lng")
            .with_method(&Method::GET)
            .with_uri(original_uri.path()));
    };
    parking_client
        .find_nearby(latitude, longitude, params.radius)
        .await
        .map(|spots| {
            spots
                .into_iter()
                .map(|spot| {
                    let id = spot.content.id.clone();
                    spot_hateoas(spot, &id, base_url.clone())
                })
                .collect::<Vec<_>>()
                .let_owned(Json)
        })
        .map_err(|why| {
            RouteErrorResponse::from(why)
                .with_method(&Method::GET)
                .with_uri(original_uri.path())
        })
}

async fn create_spot<D: Database>(
    OriginalUri(original_uri): OriginalUri,
    State(WebState { parking_client }): State<WebState<D>>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
    Authenticated(caller): Authenticated,
    body: Result<Json<CreateSpotBody>, JsonRejection>,
) -> RouteResult<Json<SpotResponse>> {
    let Json(body) = body.map_err(|why| {
        RouteErrorResponse::from(why)
            .with_method(&Method::POST)
            .with_uri(original_uri.path())
    })?;
    parking_client
        .create_spot(&caller, body.into_new_spot())
        .await
        .map(|spot| with_links(spot, base_url).json())
        .map_err(|why| {
            RouteErrorResponse::from(why)
                .with_method(&Method::POST)
                .with_uri(original_uri.path())
        })
}

async fn my_spots<D: Database>(
    OriginalUri(original_uri): OriginalUri,
    State(WebState { parking_client }): State<WebState<D>>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
    Authenticated(caller): Authenticated,
) -> RouteResult<Json<Vec<SpotResponse>>> {
    parking_client
        .get_own_spots(&caller)
        .await
        .map(|spots| {
            spots
                .into_iter()
                .map(|spot| with_links(spot, base_url.clone()))
                .collect::<Vec<_>>()
                .let_owned(Json)
        })
        .map_err(|why| {
            RouteErrorResponse::from(why)
                .with_method(&Method::GET)
                .with_uri(original_uri.path())
        })
}

async fn get_spot<D: Database>(
    OriginalUri(original_uri): OriginalUri,
    Path(id): Path<String>,
    State(WebState { parking_client }): State<WebState<D>>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
) -> RouteResult<Json<SpotResponse>> {
    parking_client
        .get_spot(&Id::new(id))
        .await
        .map(|spot| with_links(spot, base_url).json())
        .map_err(|why| {
            RouteErrorResponse::from(why)
                .with_method(&Method::GET)
                .with_uri(original_uri.path())
        })
}

async fn update_spot<D: Database>(
    OriginalUri(original_uri): OriginalUri,
    Path(id): Path<String>,
    State(WebState { parking_client }): State<WebState<D>>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
    Authenticated(caller): Authenticated,
    body: Result<Json<UpdateSpotBody>, JsonRejection>,
) -> RouteResult<Json<SpotResponse>> {
    let error = |why: RouteErrorResponse| {
        why.with_method(&Method::PUT)
            .with_uri(original_uri.path())
    };
    let Json(body) = body.map_err(|why| error(why.into()))?;
    let patch = body.into_patch().map_err(|why| error(why.into()))?;
    parking_client
        .update_spot(&caller, &Id::new(id), patch)
        .await
        .map(|spot| with_links(spot, base_url).json())
        .map_err(|why| error(why.into()))
}

async fn set_availability<D: Database>(
    OriginalUri(original_uri): OriginalUri,
    Path(id): Path<String>,
    State(WebState { parking_client }): State<WebState<D>>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
    Authenticated(caller): Authenticated,
    body: Result<Json<AvailabilityBody>, JsonRejection>,
) -> RouteResult<Json<SpotResponse>> {
    let error = |why: RouteErrorResponse| {
        why.with_method(&Method::PATCH)
            .with_uri(original_uri.path())
    };
    let Json(body) = body.map_err(|why| error(why.into()))?;
    let status = body
        .status
        .parse::<Status>()
        .map_err(|why| error(RequestError::from(why).into()))?;
    parking_client
        .set_status(&caller, &Id::new(id), status)
        .await
        .map(|spot| with_links(spot, base_url).json())
        .map_err(|why| error(why.into()))
}
