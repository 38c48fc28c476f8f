/// Middleware module
///
/// Bearer authentication for gated routes.

mod authentication;

pub use authentication::Authentication;
