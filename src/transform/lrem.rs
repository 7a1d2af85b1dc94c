//! LREM emulation.
//!
//! The backend has no LREM. A server-side script walks the list from the
//! head (count >= 0) or tail (count < 0), drops up to |count| matches into
//! the void while moving survivors to a temporary list, then moves the
//! temporary list back over the original key with its TTL preserved.
//!
//! The script is loaded once per backend: before the plan is produced the
//! transform borrows a raw connection through the sub-pool, checks whether
//! the script's content hash is known and loads it if not. Only the EVALSHA
//! itself runs inside the plan.

use bytes::{BufMut, Bytes, BytesMut};
use once_cell::sync::Lazy;
use sha1::{Digest, Sha1};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::args::{Arg, ArgInfo};
use crate::catalog::CommandDescriptor;
use crate::error::{Error, Result};
use crate::rewriter::Rewriter;
use crate::subpool::RawConn;

use super::{Reduce, SendPlan, WireCommand};

const LREM_SCRIPT: &str = r#"
local function reverse(arr)
    local i, j = 1, #arr
    while i < j do
        arr[i], arr[j] = arr[j], arr[i]
        i = i + 1
        j = j - 1
    end
end

local listKey = KEYS[1]
local tempListKey = KEYS[2]
local count = tonumber(ARGV[1])
local value = ARGV[2]

local removedCount = 0
local listLen = ledis.call('LLEN', listKey)

if count >= 0
then
    local processed = 0
    for i = 0, listLen - 1, 1 do
        local element = ledis.call('LPOP', listKey)
        processed = processed + 1
        if element == value
        then
            removedCount = removedCount + 1
            if removedCount == count
            then
                break
            end
        else
            ledis.call('RPUSH', tempListKey, element)
        end
    end
    if processed < listLen
    then
        local remainingElements = ledis.call('LRANGE', listKey, 0, -1)
        ledis.call('RPUSH', tempListKey, unpack(remainingElements))
    end
else
    local processed = 0
    for i = 0, listLen - 1, 1 do
        local element = ledis.call('LINDEX', listKey, -1)
        processed = processed + 1
        if element == value
        then
            ledis.call('RPOP', listKey)
            removedCount = removedCount + 1
            if removedCount == -count
            then
                break
            end
        else
            ledis.call('RPOPLPUSH', listKey, tempListKey)
        end
    end
    if processed < listLen
    then
        local remainingElements = ledis.call('LRANGE', listKey, 0, -1)
        reverse(remainingElements)
        ledis.call('LPUSH', tempListKey, unpack(remainingElements))
    end
end

local tempListContent = ledis.call('LDUMP', tempListKey)
local listTTL = ledis.call('LTTL', listKey)

local restoreTTL = 0
if listTTL > -1
then
    restoreTTL = listTTL * 1000
end

ledis.call('RESTORE', listKey, restoreTTL, tempListContent)
ledis.call('LCLEAR', tempListKey)

return removedCount
"#;

static LREM_SCRIPT_HASH: Lazy<String> = Lazy::new(|| {
    let digest = Sha1::digest(LREM_SCRIPT.as_bytes());
    let mut hash = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hash.push_str(&format!("{byte:02x}"));
    }
    hash
});

pub(crate) async fn apply(
    rewriter: &Rewriter,
    _descriptor: &CommandDescriptor,
    args: &[Arg],
) -> Result<SendPlan> {
    if args.len() < 3 {
        return Err(Error::InvalidSyntax);
    }

    let list_key = ArgInfo::parse(&args[0]).to_redis_bytes()?;
    let temp_key = temp_key_for(&list_key);

    let token = CancellationToken::new();
    let mut raw = rewriter.sub_pool().get_raw(&token).await?;
    let bootstrap = ensure_script_loaded(&mut raw).await;
    let _ = raw.close().await;
    bootstrap?;

    Ok(SendPlan::single(
        WireCommand::new(
            "EVALSHA",
            vec![
                Arg::Str(LREM_SCRIPT_HASH.clone()),
                Arg::Int(2),
                Arg::Bytes(list_key),
                Arg::Bytes(temp_key),
                args[1].clone(),
                args[2].clone(),
            ],
        ),
        Reduce::First,
    ))
}

async fn ensure_script_loaded(raw: &mut RawConn) -> Result<()> {
    let wire = raw.wire()?;
    let reply = wire
        .round_trip(
            "SCRIPT",
            &[Arg::from("EXISTS"), Arg::Str(LREM_SCRIPT_HASH.clone())],
        )
        .await?;
    let exists = reply
        .as_array()
        .and_then(|values| values.first())
        .ok_or_else(|| Error::protocol("SCRIPT EXISTS reply is not an array"))?
        .expect_integer()?;

    if exists == 0 {
        debug!(hash = %*LREM_SCRIPT_HASH, "loading list-removal script");
        let reply = wire
            .round_trip("SCRIPT", &[Arg::from("LOAD"), Arg::from(LREM_SCRIPT)])
            .await?;
        if reply.is_error() {
            return Err(Error::protocol("backend rejected list-removal script"));
        }
    }

    Ok(())
}

/// A collision-resistant scratch key next to the original list.
fn temp_key_for(list_key: &Bytes) -> Bytes {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let mut key = BytesMut::new();
    key.put_slice(b"lediswrap:temp:");
    key.put_slice(now.as_secs().to_string().as_bytes());
    key.put_slice(now.subsec_nanos().to_string().as_bytes());
    key.put_u8(b':');
    key.put_slice(list_key);
    key.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_hash_is_hex_sha1() {
        assert_eq!(LREM_SCRIPT_HASH.len(), 40);
        assert!(LREM_SCRIPT_HASH.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn temp_keys_embed_the_list_key() {
        let key = temp_key_for(&Bytes::from_static(b"mylist"));
        assert!(key.starts_with(b"lediswrap:temp:"));
        assert!(key.ends_with(b":mylist"));
    }
}
