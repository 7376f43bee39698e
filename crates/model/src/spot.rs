use std::{fmt, str::FromStr};

use chrono::{DateTime, TimeZone, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::{
    geo,
    id::{HasId, Id},
};

use crate::{account::Account, ExampleData};

/// Occupancy of a parking spot as reported by its owner.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Available,
    Limited,
    Full,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Available => "available",
            Status::Limited => "limited",
            Status::Full => "full",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Status::Available),
            "limited" => Ok(Status::Limited),
            "full" => Ok(Status::Full),
            other => Err(ValidationError::UnknownStatus(other.to_owned())),
        }
    }
}

/// A geographic point. On the wire this is the pair `[longitude, latitude]`,
/// longitude first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub longitude: f64,
    pub latitude: f64,
}

impl Point {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !geo::is_valid_longitude(self.longitude) {
            return Err(ValidationError::InvalidLongitude(self.longitude));
        }
        if !geo::is_valid_latitude(self.latitude) {
            return Err(ValidationError::InvalidLatitude(self.latitude));
        }
        Ok(())
    }

    pub fn distance_to(&self, latitude: f64, longitude: f64) -> f64 {
        geo::haversine_distance(latitude, longitude, self.latitude, self.longitude)
    }
}

impl From<[f64; 2]> for Point {
    fn from([longitude, latitude]: [f64; 2]) -> Self {
        Self::new(longitude, latitude)
    }
}

impl From<Point> for [f64; 2] {
    fn from(point: Point) -> Self {
        [point.longitude, point.latitude]
    }
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[schemars(with = "[f64; 2]")]
    pub point: Point,
    pub address: Option<String>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, address: Option<String>) -> Self {
        Self {
            point: Point::new(longitude, latitude),
            address,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.point.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.point.longitude
    }
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParkingSpot {
    pub owner: Id<Account>,
    pub name: String,
    pub description: Option<String>,
    pub location: Location,
    pub capacity: u32,
    pub price_per_hour: f64,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

impl HasId for ParkingSpot {
    type IdType = String;
}

impl ParkingSpot {
    pub fn latitude(&self) -> f64 {
        self.location.latitude()
    }

    pub fn longitude(&self) -> f64 {
        self.location.longitude()
    }

    pub fn address(&self) -> Option<String> {
        self.location.address.clone()
    }

    pub fn distance_to(&self, latitude: f64, longitude: f64) -> f64 {
        self.location.point.distance_to(latitude, longitude)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)?;
        self.location.point.validate()?;
        validate_capacity(self.capacity)?;
        validate_price(self.price_per_hour)
    }
}

impl ExampleData for ParkingSpot {
    fn example_data() -> Self {
        ParkingSpot {
            owner: Id::new("6f1c2b9e-8d3a-4c55-9f0e-2a7b1d4e8c31".to_owned()),
            name: "Downtown Parking".to_owned(),
            description: Some("Secure parking in city center".to_owned()),
            location: Location::new(
                40.7128,
                -74.0060,
                Some("123 Broadway, NY".to_owned()),
            ),
            capacity: 50,
            price_per_hour: 10.0,
            status: Status::Available,
            created_at: Utc
                .with_ymd_and_hms(2024, 5, 1, 8, 30, 0)
                .single()
                .unwrap_or_default(),
        }
    }
}

/// A spot as submitted by its owner, before it has an id or timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewParkingSpot {
    pub name: String,
    pub description: Option<String>,
    pub location: Location,
    pub capacity: u32,
    pub price_per_hour: f64,
}

impl NewParkingSpot {
    pub fn into_spot(self, owner: Id<Account>, created_at: DateTime<Utc>) -> ParkingSpot {
        ParkingSpot {
            owner,
            name: self.name.trim().to_owned(),
            description: self.description,
            location: self.location,
            capacity: self.capacity,
            price_per_hour: self.price_per_hour,
            status: Status::default(),
            created_at,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)?;
        self.location.point.validate()?;
        validate_capacity(self.capacity)?;
        validate_price(self.price_per_hour)
    }
}

/// A partial update. Absent fields keep their stored value; a location is only
/// ever replaced as a whole.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpotPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<Location>,
    pub capacity: Option<u32>,
    pub price_per_hour: Option<f64>,
    pub status: Option<Status>,
}

impl SpotPatch {
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(location) = &self.location {
            location.point.validate()?;
        }
        if let Some(capacity) = self.capacity {
            validate_capacity(capacity)?;
        }
        if let Some(price) = self.price_per_hour {
            validate_price(price)?;
        }
        Ok(())
    }

    pub fn apply(&self, mut spot: ParkingSpot) -> ParkingSpot {
        if let Some(name) = &self.name {
            spot.name = name.trim().to_owned();
        }
        if let Some(description) = &self.description {
            spot.description = Some(description.clone());
        }
        if let Some(location) = &self.location {
            spot.location = location.clone();
        }
        if let Some(capacity) = self.capacity {
            spot.capacity = capacity;
        }
        if let Some(price) = self.price_per_hour {
            spot.price_per_hour = price;
        }
        if let Some(status) = self.status {
            spot.status = status;
        }
        spot
    }
}

/// Broadcast to every realtime subscriber after a status write committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StatusUpdate {
    pub id: Id<ParkingSpot>,
    pub status: Status,
}

impl StatusUpdate {
    pub fn new(id: Id<ParkingSpot>, status: Status) -> Self {
        Self { id, status }
    }
}

/// Largest number of spaces a single spot may declare, bounded by the storage column.
pub const MAX_CAPACITY: u32 = i32::MAX as u32;

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyName,
    InvalidLatitude(f64),
    InvalidLongitude(f64),
    InvalidCapacity(u32),
    InvalidPrice(f64),
    UnknownStatus(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "name must not be empty"),
            Self::InvalidLatitude(value) => {
                write!(f, "latitude {} is not within [-90, 90]", value)
            }
            Self::InvalidLongitude(value) => {
                write!(f, "longitude {} is not within [-180, 180]", value)
            }
            Self::InvalidCapacity(value) => {
                write!(f, "capacity {} exceeds the maximum of {}", value, MAX_CAPACITY)
            }
            Self::InvalidPrice(value) => {
                write!(f, "price per hour {} must be a non-negative number", value)
            }
            Self::UnknownStatus(value) => write!(
                f,
                "status `{}` is not one of available, limited, full",
                value
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(())
}

fn validate_capacity(capacity: u32) -> Result<(), ValidationError> {
    if capacity > MAX_CAPACITY {
        return Err(ValidationError::InvalidCapacity(capacity));
    }
    Ok(())
}

fn validate_price(price: f64) -> Result<(), ValidationError> {
    if !price.is_finite() || price < 0.0 {
        return Err(ValidationError::InvalidPrice(price));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::WithId;

    #[test]
    fn serializes_point_longitude_first() {
        let spot = WithId::new(Id::new("spot-1".to_owned()), ParkingSpot::example_data());
        let value = serde_json::to_value(&spot).unwrap();
        assert_eq!(value["id"], json!("spot-1"));
        assert_eq!(value["location"]["point"], json!([-74.006, 40.7128]));
        assert_eq!(value["location"]["address"], json!("123 Broadway, NY"));
        assert_eq!(value["pricePerHour"], json!(10.0));
        assert_eq!(value["status"], json!("available"));
        assert_eq!(value["createdAt"], json!("2024-05-01T08:30:00Z"));
        assert_eq!(value["owner"], json!("6f1c2b9e-8d3a-4c55-9f0e-2a7b1d4e8c31"));
    }

    #[test]
    fn reads_point_longitude_first() {
        let location: Location =
            serde_json::from_value(json!({ "point": [77.5946, 12.9716] })).unwrap();
        assert_eq!(location.longitude(), 77.5946);
        assert_eq!(location.latitude(), 12.9716);
        assert_eq!(location.address, None);
    }

    #[test]
    fn rejects_unknown_status() {
        assert!(serde_json::from_value::<Status>(json!("busy")).is_err());
        assert_eq!(
            serde_json::from_value::<Status>(json!("limited")).unwrap(),
            Status::Limited
        );
        assert_eq!("full".parse::<Status>(), Ok(Status::Full));
        assert!(matches!(
            "FULL".parse::<Status>(),
            Err(ValidationError::UnknownStatus(_))
        ));
    }

    #[test]
    fn validates_new_spots() {
        let mut spot = NewParkingSpot {
            name: "  Lot A ".to_owned(),
            description: None,
            location: Location::new(12.9716, 77.5946, None),
            capacity: 0,
            price_per_hour: 0.0,
        };
        assert_eq!(spot.validate(), Ok(()));

        spot.location = Location::new(91.0, 77.5946, None);
        assert_eq!(spot.validate(), Err(ValidationError::InvalidLatitude(91.0)));

        spot.location = Location::new(12.0, -180.5, None);
        assert_eq!(
            spot.validate(),
            Err(ValidationError::InvalidLongitude(-180.5))
        );

        spot.location = Location::new(12.0, 77.0, None);
        spot.price_per_hour = -1.0;
        assert_eq!(spot.validate(), Err(ValidationError::InvalidPrice(-1.0)));

        spot.price_per_hour = 2.5;
        spot.name = "   ".to_owned();
        assert_eq!(spot.validate(), Err(ValidationError::EmptyName));

        spot.name = "Lot A".to_owned();
        spot.capacity = MAX_CAPACITY;
        assert_eq!(spot.validate(), Ok(()));
        spot.capacity = 3_000_000_000;
        assert_eq!(
            spot.validate(),
            Err(ValidationError::InvalidCapacity(3_000_000_000))
        );
    }

    #[test]
    fn patch_rejects_capacity_beyond_maximum() {
        let patch = SpotPatch {
            capacity: Some(MAX_CAPACITY + 1),
            ..Default::default()
        };
        assert_eq!(
            patch.validate(),
            Err(ValidationError::InvalidCapacity(MAX_CAPACITY + 1))
        );
        assert_eq!(
            SpotPatch {
                capacity: Some(12),
                ..Default::default()
            }
            .validate(),
            Ok(())
        );
    }

    #[test]
    fn new_spots_start_available_with_trimmed_name() {
        let owner: Id<Account> = Id::new("owner".to_owned());
        let spot = NewParkingSpot {
            name: "  Lot A ".to_owned(),
            description: Some("covered".to_owned()),
            location: Location::new(1.0, 2.0, None),
            capacity: 3,
            price_per_hour: 4.0,
        }
        .into_spot(owner.clone(), Utc::now());
        assert_eq!(spot.name, "Lot A");
        assert_eq!(spot.owner, owner);
        assert_eq!(spot.status, Status::Available);
    }

    #[test]
    fn patch_only_touches_given_fields() {
        let spot = ParkingSpot::example_data();
        let patch = SpotPatch {
            capacity: Some(0),
            status: Some(Status::Full),
            ..Default::default()
        };
        let patched = patch.apply(spot.clone());
        assert_eq!(patched.capacity, 0);
        assert_eq!(patched.status, Status::Full);
        assert_eq!(patched.name, spot.name);
        assert_eq!(patched.location, spot.location);
        assert_eq!(patched.created_at, spot.created_at);
        assert!(SpotPatch::default().is_empty());
        assert!(!SpotPatch::status(Status::Limited).is_empty());
    }

    #[test]
    fn distance_to_spot() {
        let spot = NewParkingSpot {
            name: "Lot".to_owned(),
            description: None,
            location: Location::new(12.9716, 77.5946, None),
            capacity: 1,
            price_per_hour: 1.0,
        }
        .into_spot(Id::new("o".to_owned()), Utc::now());
        let distance = spot.distance_to(12.9716, 77.5956);
        assert!(distance > 100.0 && distance < 115.0);
    }
}
