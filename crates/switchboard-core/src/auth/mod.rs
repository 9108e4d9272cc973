//! Request authentication for signed channels.
//!
//! - [`Jwt`]: compact token decoding
//! - [`KeySetCache`]: rotating signing keys, refreshed in the background
//! - [`AuthGuard`]: the ordered validation checks

pub mod guard;
pub mod jwt;
pub mod keys;

pub use guard::{AuthGuard, DEFAULT_CLOCK_SKEW_SECS};
pub use jwt::{Jwt, JwtClaims, JwtHeader, encode_segment};
pub use keys::{
    DEFAULT_REFRESH_INTERVAL, Jwk, JwkSet, KeySetCache, KeySetSource, OpenIdKeySetSource,
    StaticKeySet,
};
