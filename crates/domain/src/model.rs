//! Domain models and value objects

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Marker column value meaning "not yet posted to this platform"
pub const UNPOSTED_MARKER: &str = "0";

/// Marker written when ingestion seeds everything up to the start pin
pub const SEEDED_MARKER: &str = "1";

/// A social platform the bot can post to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    Bluesky,
    Twitter,
}

impl Platform {
    /// All platforms in priority order. The first enabled one drives the cursor.
    pub const PRIORITY: [Platform; 2] = [Platform::Bluesky, Platform::Twitter];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Bluesky => "bluesky",
            Platform::Twitter => "twitter",
        }
    }

    /// Name of the marker column in the `lots` table
    pub fn marker_column(&self) -> &'static str {
        match self {
            Platform::Bluesky => "posted_bluesky",
            Platform::Twitter => "posted_twitter",
        }
    }

    /// Pick the platform whose history drives cursor advancement
    pub fn primary(enabled: &[Platform]) -> Option<Platform> {
        Self::PRIORITY.into_iter().find(|p| enabled.contains(p))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bluesky" => Ok(Platform::Bluesky),
            "twitter" | "x" => Ok(Platform::Twitter),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}

/// Translate a raw marker column value into an optional post identifier
pub fn marker_from_column(value: Option<&str>) -> Option<String> {
    match value {
        None | Some(UNPOSTED_MARKER) => None,
        Some(post_id) => Some(post_id.to_string()),
    }
}

/// A stored column that is not part of the fixed lot schema
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Null,
}

impl FieldValue {
    /// Numeric view of the value; text is parsed leniently
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Real(r) => Some(*r),
            FieldValue::Text(t) => t.trim().parse().ok(),
            FieldValue::Null => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(t) => f.write_str(t),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Real(r) => write!(f, "{}", r),
            FieldValue::Null => Ok(()),
        }
    }
}

/// One physical property record
#[derive(Debug, Clone, PartialEq)]
pub struct Lot {
    /// Parcel identifier; its ordering defines traversal order
    pub id: String,
    /// Street address, may be empty
    pub address: String,
    pub lat: f64,
    pub lon: f64,
    /// Post identifiers for the platforms this lot has been posted to
    pub posted: BTreeMap<Platform, String>,
    /// Any other stored columns (e.g. `floors`)
    pub extra: BTreeMap<String, FieldValue>,
}

impl Lot {
    pub fn new(id: impl Into<String>, address: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            lat,
            lon,
            posted: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Builder-style helper to attach a post marker
    pub fn with_posted(mut self, platform: Platform, post_id: impl Into<String>) -> Self {
        self.posted.insert(platform, post_id.into());
        self
    }

    /// Builder-style helper to attach an extra field
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    pub fn posted_id(&self, platform: Platform) -> Option<&str> {
        self.posted.get(&platform).map(String::as_str)
    }

    pub fn is_posted(&self, platform: Platform) -> bool {
        self.posted.contains_key(&platform)
    }

    /// `(0.0, 0.0)` means the lot has no coordinate
    pub fn has_coordinates(&self) -> bool {
        !(self.lat == 0.0 && self.lon == 0.0)
    }

    /// Raw marker column value for a platform
    pub fn marker(&self, platform: Platform) -> &str {
        self.posted_id(platform).unwrap_or(UNPOSTED_MARKER)
    }
}

/// Platform-agnostic post content produced from a lot
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedPost {
    pub lot_id: String,
    /// Rendered status text
    pub status: String,
    pub lat: f64,
    pub lon: f64,
    /// Image description for accessibility
    pub alt_text: String,
}

/// Parameters for acquiring a street-level image
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    /// Address query or `"lat,lon"`
    pub location: String,
    pub fov: u32,
    pub pitch: f64,
    pub zoom: Option<f64>,
}

/// Raw image returned by an image source
#[derive(Debug, Clone)]
pub struct StreetImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// A parcel as returned by a remote geographic data service
#[derive(Debug, Clone, PartialEq)]
pub struct Parcel {
    pub id: Option<String>,
    pub street: String,
    pub city_state_zip: String,
    pub lat: f64,
    pub lon: f64,
}
