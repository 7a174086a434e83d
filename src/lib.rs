//! Stub Server
//!
//! A test-double server: callers register canned request/response pairs
//! ("stubs") for a service and method, then submit candidate requests to get
//! the matching canned output back. A second registry serves canned tabular
//! responses for UQL queries, matched by substring against the query text.
//!
//! # Features
//!
//! - **Equals**: every listed field is deep-equal to the request data
//! - **Contains**: substring, array element or object subset containment
//! - **Matches**: regex match against the string form of a field
//! - **Ordering**: the first registered matching stub wins
//! - **UQL responses**: substring-matched canned query results
//! - **Preloading**: stub definitions loaded from JSON/YAML files at startup
//!
//! # Example Stub
//!
//! ```json
//! {
//!   "service": "Greeter",
//!   "method": "sayHello",
//!   "input": { "equals": { "name": "bob" } },
//!   "output": { "data": { "reply": "hi bob" } }
//! }
//! ```

pub mod config;
pub mod error;
pub mod matcher;
pub mod registry;
pub mod server;
pub mod uql;

pub use config::{FindRequest, Input, Output, Stub, StubServerConfig};
pub use error::{FindError, MatchError, ValidationError};
pub use registry::StubRegistry;
pub use server::{build_router, AppState};
pub use uql::UqlRegistry;
