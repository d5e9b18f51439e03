//! everylot adapters crate
//!
//! This crate contains infrastructure adapters implementing the domain ports:
//! - `lots`: SQLite lot store
//! - `imagery`: Google Street View image source
//! - `bluesky`: Bluesky (ATProto) publisher
//! - `x`: X (Twitter) API publisher
//! - `parcels`: ArcGIS FeatureServer parcel source

mod arcgis;
mod lots_sqlite;
mod streetview;

pub mod bluesky;
pub mod x_api;

/// Re-exports for lot store adapters
pub mod lots {
    pub use crate::lots_sqlite::SqliteLotStore;
}

/// Re-exports for image adapters
pub mod imagery {
    pub use crate::streetview::{STREETVIEW_BASE_URL, StreetViewImageSource};
}

/// Re-exports for parcel source adapters
pub mod parcels {
    pub use crate::arcgis::{ALBANY_FEATURE_SERVER, ArcGisParcelSource};
}

/// Re-exports for X API adapters
pub mod x {
    pub use crate::x_api::XPublisher;
}
