//! fOS Network Layer
//!
//! Small async networking toolkit used by the timezone subsystem.
//!
//! Architecture:
//! 1. `HttpClient` performs buffered HTTP(S) exchanges, optionally
//!    tunnelled through the user's SOCKS5 proxy
//! 2. `Fetch` is the transport seam callers are generic over
//! 3. `race::first_success` runs lookups concurrently, each with its
//!    own deadline, and keeps the first answer

mod client;
mod socks;
pub mod race;

pub use client::{Fetch, HttpClient, HttpClientConfig, HttpError, Response};
pub use hyper::{Method, StatusCode};
pub use race::{first_success, Entrant, Failure, RaceError, Win};
pub use socks::SocksError;
