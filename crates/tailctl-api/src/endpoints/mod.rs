// Endpoint groups of the tailnet API, each an `impl ApiClient` block.
//
// Idempotency is asserted here, per call site: reads always retry, writes
// retry only when replaying them cannot change the outcome.

pub mod acl;
pub mod devices;
pub mod dns;
pub mod keys;
pub mod logging;
pub mod services;
pub mod users;
