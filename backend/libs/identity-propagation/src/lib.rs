//! Identity propagation across the gateway -> backend trust boundary
//!
//! The gateway verifies the caller once and then tells the backend who the
//! caller is in one of two ways:
//!
//! - **Forward** ([`PropagationMode::ForwardToken`]): the original
//!   `Authorization: Bearer` header is passed through and the backend verifies
//!   it independently with the user-token public key.
//! - **Assertion** ([`PropagationMode::SignedAssertion`]): the gateway mints a
//!   short-lived RS256 token with its own key, bound to the `internal` audience,
//!   and sends it in `x-internal-assertion`.
//!
//! A freeform identity header (`x-user-payload`) is never trusted: it carries no
//! signature, so anything that can reach the backend could forge it.
//!
//! ## Core Components
//!
//! - **AssertionIssuer** / **IdentityPropagator**: gateway side
//! - **IdentityResolver**: backend side, turns request headers into a `Principal`

mod client;
mod server;

pub use client::{AssertionIssuer, IdentityPropagator, PropagationMode, UnknownMode};
pub use server::{IdentityResolver, ResolveError};

/// Header carrying the signed internal assertion
pub const INTERNAL_ASSERTION_HEADER: &str = "x-internal-assertion";

/// Audience every internal assertion is bound to
pub const INTERNAL_AUDIENCE: &str = "internal";

/// Default assertion lifetime
pub const DEFAULT_ASSERTION_TTL_SECS: i64 = 30;

/// Unsigned identity header from older gateways. Logged and ignored.
pub const UNTRUSTED_USER_PAYLOAD_HEADER: &str = "x-user-payload";
