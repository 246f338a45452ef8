use warden_lock::LockScript;

/// Lua script for releasing a lock.
///
/// KEYS\[1\] = lock key
/// ARGV\[1\] = owner token
///
/// Returns 1 if released, 0 if absent or held by another owner.
pub const LOCK_RELEASE: &str = r"
local owner = redis.call('GET', KEYS[1])
if not owner or owner ~= ARGV[1] then
    return 0
end
redis.call('DEL', KEYS[1])
return 1
";

/// Lua script for extending a lock's TTL.
///
/// KEYS\[1\] = lock key
/// ARGV\[1\] = owner token
/// ARGV\[2\] = new TTL in seconds
///
/// Returns 1 if extended, 0 if absent or held by another owner.
pub const LOCK_EXTEND: &str = r"
local owner = redis.call('GET', KEYS[1])
if not owner or owner ~= ARGV[1] then
    return 0
end
redis.call('EXPIRE', KEYS[1], ARGV[2])
return 1
";

/// Lua source for a lock script.
pub fn source(script: LockScript) -> &'static str {
    match script {
        LockScript::Release => LOCK_RELEASE,
        LockScript::Extend => LOCK_EXTEND,
    }
}
