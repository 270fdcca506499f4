pub mod auth;
pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod types;

pub use auth::AccessToken;
pub use client::AylaService;
pub use device::Oekoboiler;
pub use error::{Error, Result};
pub use types::{Credentials, Property, PropertyCode};
