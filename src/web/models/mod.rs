pub mod task_models;

/// Caller identity resolved from the bearer token, passed as a request extension.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub display_name: String,
}
