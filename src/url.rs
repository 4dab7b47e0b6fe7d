//! URL patterns and URL rules.
//!
//! ```text
//! "/user/{id:int}?q"  ──UrlMatcherFactory::compile──▶ UrlMatcher
//!                                                      │   exec(path, search, hash) -> params
//!                                                      │   format(params)           -> url
//!                                                      ▼
//!                                     UrlRouter rules (when / otherwise)
//!                                                      │
//!                         Location ── sync ──▶ UrlRuleMatch (redirect | state)
//! ```
//!
//! - `factory.rs`: URL configuration shared by all matchers.
//! - `matcher.rs`: pattern compilation, matching and formatting.
//! - `router.rs`: ordered URL rules, `href` and URL pushes.
//! - `location.rs`: the location collaborator contract plus an in-memory
//!   implementation.

#[path = "url/factory.rs"]
mod factory;
#[path = "url/location.rs"]
mod location;
#[path = "url/matcher.rs"]
mod matcher;
#[path = "url/router.rs"]
mod router;

#[cfg(test)]
#[path = "url/tests.rs"]
mod tests;

pub use factory::{UrlConfig, UrlMatcherFactory};
pub use location::{Location, MemoryLocation};
pub use matcher::UrlMatcher;
pub use router::{UrlMatch, UrlRouter, UrlRuleHandler, UrlRuleMatch, UrlRulePattern};

pub(crate) use location::{parse_query, split_url};
