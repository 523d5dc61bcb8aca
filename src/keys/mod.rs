//! Stream key management
//!
//! Keys live in an external key-management service. The [`StreamKeyStore`]
//! caches them for the duration of a session; the [`KeyApi`] trait is the
//! seam to the service, with [`HttpKeyApi`] as the production client.

pub mod api;
pub mod http;
pub mod store;

pub use api::{KeyApi, UserId};
pub use http::{HttpKeyApi, KeyApiConfig, DEFAULT_API_BASE_URL};
pub use store::{KeySnapshot, StreamKeyStore};
