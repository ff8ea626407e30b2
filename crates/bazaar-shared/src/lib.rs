//! # bazaar-shared
//!
//! Pure building blocks shared by the Bazaar store and server:
//!
//! - **Token Authority** ([`token`]): Ed25519-signed, time-limited identity tokens
//! - **Capabilities** ([`capability`]): role flags and the any-of / owner-or-admin
//!   combinators used by the access gate
//! - **Password verification** ([`password`]): pluggable one-way verifier
//! - **Errors**: the stable error taxonomy ([`error::ErrorKind`])
//!
//! Nothing in this crate performs I/O.

pub mod capability;
pub mod constants;
pub mod error;
pub mod password;
pub mod token;

pub use capability::{authorize, authorize_ownership, Capability, CapabilitySet, RoleFlags};
pub use error::{AccessError, ErrorKind, TokenError};
pub use token::{Claims, TokenAuthority};
