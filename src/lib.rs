//! docql turns stored, declarative application definitions (a GraphQL schema
//! plus a table of field-to-query mappings) into live GraphQL resolvers that
//! execute parameterized queries against a document database.
//!
//! The crate is organized leaf-first:
//!
//! * [`Mapping`] and [`AppDefinition`] model a parsed definition document,
//! * [`interpolate`] resolves query templates against call arguments and a
//!   parent document,
//! * [`DocumentStore`] is the seam to the database; the data fetchers in
//!   `fetcher` issue the resolved queries through it,
//! * `schema` compiles SDL text and the mapping table into an executable
//!   schema,
//! * [`AppCache`] loads and caches compiled definitions with single-flight
//!   semantics, and [`AppRouter`] ties everything to the request boundary.

mod app_cache;
mod cache;
mod definition;
mod error;
mod fetcher;
mod interpolate;
mod json_ext;
mod request;
mod response;
mod router;
mod schema;
mod store;

pub use app_cache::*;
pub use cache::Abandoned;
pub use definition::*;
pub use error::*;
pub use fetcher::*;
pub use interpolate::*;
pub use json_ext::*;
pub use request::*;
pub use response::*;
pub use router::*;
pub use store::*;
