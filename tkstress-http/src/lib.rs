#![forbid(unsafe_code)]

mod api;
mod auth;
mod client;
mod error;
mod scenarios;
mod types;

pub use api::{ApiClient, ApiConfig, ConsignTarget, Food, OrderStatus};
pub use auth::ApiAuthenticator;
pub use client::HttpClient;
pub use error::{Error, Result};
pub use scenarios::{cycle_catalog, stress_catalog};
pub use types::{HttpRequest, HttpResponse};
