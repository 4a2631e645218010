//! Server-side Lua scripts.
//!
//! Both keyspaces share one observe script: the set key, cooldown key and
//! TTL-key prefix arrive as inputs, so a single digest serves IP and subnet
//! mode alike.
//!
//! Reply shape of [`OBSERVE_AND_CHECK`] (matched by the parser in
//! `redis_store`):
//!
//! - `{0, count, is_new}` - recorded, under or at the limit
//! - `{1, {member, ...}}`  - limit crossed, cooldown armed, block now
//! - `{2, count}`          - over limit but cooldown already armed

/// KEYS[1] = locator set key, KEYS[2] = cooldown key
/// ARGV[1] = ttl key prefix, ARGV[2] = locator,
/// ARGV[3] = locator ttl secs, ARGV[4] = limit, ARGV[5] = cooldown secs
pub const OBSERVE_AND_CHECK: &str = r#"
local setKey = KEYS[1]
local cooldownKey = KEYS[2]
local ttlPrefix = ARGV[1]
local locator = ARGV[2]
local ttl = tonumber(ARGV[3])
local limit = tonumber(ARGV[4])
local cooldown = tonumber(ARGV[5])

local onCooldown = redis.call('EXISTS', cooldownKey) == 1
local count = redis.call('SCARD', setKey)
local isMember = redis.call('SISMEMBER', setKey, locator) == 1

if onCooldown and count >= limit and not isMember then
    return {2, count}
end

local added = redis.call('SADD', setKey, locator)
redis.call('SET', ttlPrefix .. ':' .. locator, '1', 'EX', ttl)
local setTtl = redis.call('TTL', setKey)
if setTtl < ttl then
    redis.call('EXPIRE', setKey, ttl)
end
count = redis.call('SCARD', setKey)

if count <= limit then
    return {0, count, added}
end

if onCooldown then
    return {2, count}
end

redis.call('SET', cooldownKey, '1', 'EX', cooldown)
return {1, redis.call('SMEMBERS', setKey)}
"#;

/// KEYS[1] = locator set key, ARGV[1] = ttl key prefix.
/// Deletes the set and every per-locator TTL key in one round trip.
pub const CLEAR_USER: &str = r#"
local items = redis.call('SMEMBERS', KEYS[1])
if #items == 0 then
    return redis.call('DEL', KEYS[1])
end
local keysToDelete = { KEYS[1] }
local prefix = ARGV[1]
for i, item in ipairs(items) do
    table.insert(keysToDelete, prefix .. ':' .. item)
end
return redis.call('DEL', unpack(keysToDelete))
"#;
