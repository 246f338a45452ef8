/// Namespace prepended to every lock key.
pub const LOCK_KEY_PREFIX: &str = "REDIS_LOCK_PREFIX_";

/// Render the store key for a resource name.
pub fn lock_key(resource: &str) -> String {
    format!("{LOCK_KEY_PREFIX}{resource}")
}

/// Generate a fresh ownership token: the process id plus a random suffix, so
/// two attempts from the same process never share a token.
pub fn new_token() -> String {
    format!("{}_{}", std::process::id(), uuid::Uuid::new_v4().simple())
}
