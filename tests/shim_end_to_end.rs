//! End-to-end scenarios against a scripted fake LedisDB server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use lediswrap::wire::RespCodec;
use lediswrap::{Arg, Error, Pool, PoolConfig, Reply, RespValue, Rewriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct ServerState {
    /// key -> namespace label ("kv", "list", "hash", "set", "zset").
    types: HashMap<String, &'static str>,
    /// Every command received, name first, arguments lossy-decoded.
    commands: Vec<Vec<String>>,
    script_loaded: bool,
}

impl ServerState {
    fn namespace_count(&mut self, namespace: &'static str, keys: &[String], remove: bool) -> i64 {
        let mut count = 0;
        for key in keys {
            if self.types.get(key).copied() == Some(namespace) {
                count += 1;
                if remove {
                    self.types.remove(key);
                }
            }
        }
        count
    }

    fn respond(&mut self, parts: &[String]) -> RespValue {
        self.commands.push(parts.to_vec());
        let name = parts[0].to_ascii_uppercase();
        let args = &parts[1..];

        match name.as_str() {
            "PING" => RespValue::simple("PONG"),
            "EXISTS" => RespValue::Integer(self.namespace_count("kv", args, false)),
            "LKEYEXISTS" => RespValue::Integer(self.namespace_count("list", args, false)),
            "HKEYEXISTS" => RespValue::Integer(self.namespace_count("hash", args, false)),
            "SKEYEXISTS" => RespValue::Integer(self.namespace_count("set", args, false)),
            "ZKEYEXISTS" => RespValue::Integer(self.namespace_count("zset", args, false)),
            "DEL" => RespValue::Integer(self.namespace_count("kv", args, true)),
            "LMCLEAR" => RespValue::Integer(self.namespace_count("list", args, true)),
            "HMCLEAR" => RespValue::Integer(self.namespace_count("hash", args, true)),
            "SMCLEAR" => RespValue::Integer(self.namespace_count("set", args, true)),
            "ZMCLEAR" => RespValue::Integer(self.namespace_count("zset", args, true)),
            "SET" | "SETEX" => {
                self.types.insert(args[0].clone(), "kv");
                RespValue::ok()
            }
            "SETNX" => {
                if self.types.contains_key(&args[0]) {
                    RespValue::Integer(0)
                } else {
                    self.types.insert(args[0].clone(), "kv");
                    RespValue::Integer(1)
                }
            }
            "EXPIRE" | "LEXPIRE" | "HEXPIRE" | "SEXPIRE" | "ZEXPIRE" => RespValue::Integer(1),
            "ZADD" => {
                self.types.insert(args[0].clone(), "zset");
                RespValue::Integer(((args.len() - 1) / 2) as i64)
            }
            "ZINCRBY" => RespValue::bulk("1"),
            "GET" => RespValue::NullBulk,
            "SCRIPT" => match args[0].to_ascii_uppercase().as_str() {
                "EXISTS" => RespValue::Array(vec![RespValue::Integer(i64::from(
                    self.script_loaded,
                ))]),
                "LOAD" => {
                    self.script_loaded = true;
                    RespValue::bulk("fakesha")
                }
                _ => RespValue::error("ERR unsupported SCRIPT subcommand"),
            },
            "EVALSHA" => RespValue::Integer(2),
            _ => RespValue::error(format!("ERR unknown command '{name}'")),
        }
    }
}

struct FakeLedisServer {
    addr: SocketAddr,
    state: Arc<Mutex<ServerState>>,
    accept_task: JoinHandle<()>,
}

impl FakeLedisServer {
    async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind fake backend")?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(ServerState::default()));

        let accept_state = state.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let state = accept_state.clone();
                tokio::spawn(handle_connection(socket, state));
            }
        });

        Ok(FakeLedisServer {
            addr,
            state,
            accept_task,
        })
    }

    fn addr(&self) -> String {
        self.addr.to_string()
    }

    fn set_type(&self, key: &str, namespace: &'static str) {
        self.state
            .lock()
            .unwrap()
            .types
            .insert(key.to_owned(), namespace);
    }

    fn commands(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().commands.clone()
    }

    fn count_command(&self, name: &str) -> usize {
        self.commands()
            .iter()
            .filter(|parts| parts[0].eq_ignore_ascii_case(name))
            .count()
    }

    fn saw_command(&self, expected: &[&str]) -> bool {
        self.commands()
            .iter()
            .any(|parts| parts.iter().map(String::as_str).eq(expected.iter().copied()))
    }
}

impl Drop for FakeLedisServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn handle_connection(socket: TcpStream, state: Arc<Mutex<ServerState>>) {
    let mut framed = Framed::new(socket, RespCodec);
    while let Some(frame) = framed.next().await {
        let Ok(frame) = frame else { break };
        let Some(parts) = command_parts(&frame) else {
            let _ = framed.send(RespValue::error("ERR bad frame")).await;
            continue;
        };
        let reply = state.lock().unwrap().respond(&parts);
        if framed.send(reply).await.is_err() {
            break;
        }
    }
}

fn command_parts(frame: &RespValue) -> Option<Vec<String>> {
    let values = frame.as_array()?;
    let mut parts = Vec::with_capacity(values.len());
    for value in values {
        let bytes = value.as_bytes()?;
        parts.push(String::from_utf8_lossy(bytes).into_owned());
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts)
    }
}

fn pool_for(server: &FakeLedisServer) -> (Rewriter, Pool) {
    let mut config = PoolConfig::for_addr(server.addr());
    config.max_idle = 4;
    let rewriter = Rewriter::new();
    let pool = rewriter.new_primary_pool(&config, 2).unwrap();
    (rewriter, pool)
}

fn resp(reply: Reply) -> RespValue {
    reply.into_resp().expect("value reply")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn set_with_expiration_becomes_setex() -> Result<()> {
    let server = FakeLedisServer::start().await?;
    let (_rewriter, pool) = pool_for(&server);
    let token = CancellationToken::new();

    let mut conn = pool.get(&token).await?;
    let reply = conn
        .do_cmd(
            "SET",
            &[
                Arg::from("foo"),
                Arg::from("bar"),
                Arg::from("EX"),
                Arg::from("10"),
            ],
        )
        .await?;
    assert_eq!(resp(reply), RespValue::ok());
    assert!(server.saw_command(&["SETEX", "foo", "10", "bar"]));
    conn.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn set_nx_reply_is_ok_or_nil() -> Result<()> {
    let server = FakeLedisServer::start().await?;
    let (_rewriter, pool) = pool_for(&server);
    let token = CancellationToken::new();

    let mut conn = pool.get(&token).await?;
    let nx_args = [Arg::from("foo"), Arg::from("bar"), Arg::from("NX")];
    let first = conn.do_cmd("SET", &nx_args).await?;
    assert_eq!(resp(first), RespValue::ok());

    let second = conn.do_cmd("SET", &nx_args).await?;
    assert_eq!(resp(second), RespValue::NullBulk);
    conn.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn set_xx_fails_before_any_wire_io() -> Result<()> {
    let server = FakeLedisServer::start().await?;
    let (_rewriter, pool) = pool_for(&server);
    let token = CancellationToken::new();

    let mut conn = pool.get(&token).await?;
    let err = conn
        .do_cmd("SET", &[Arg::from("foo"), Arg::from("bar"), Arg::from("XX")])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoEmulationPossible));
    assert!(server.commands().is_empty());

    // The connection is still usable afterwards.
    let reply = conn.do_cmd("PING", &[]).await?;
    assert_eq!(resp(reply), RespValue::simple("PONG"));
    conn.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn del_multiplexes_into_namespace_clears() -> Result<()> {
    let server = FakeLedisServer::start().await?;
    server.set_type("a", "kv");
    server.set_type("b", "list");
    let (_rewriter, pool) = pool_for(&server);
    let token = CancellationToken::new();

    let mut conn = pool.get(&token).await?;
    let reply = conn
        .do_cmd("DEL", &[Arg::from("a"), Arg::from("b"), Arg::from("c")])
        .await?;
    // a deleted via DEL, b via LMCLEAR, c resolved to nothing.
    assert_eq!(resp(reply), RespValue::Integer(2));
    assert!(server.saw_command(&["DEL", "a"]));
    assert!(server.saw_command(&["LMCLEAR", "b"]));
    // "c" only ever appeared in existence probes, never in a clear.
    for parts in server.commands() {
        if parts.iter().skip(1).any(|part| part == "c") {
            assert!(parts[0].ends_with("EXISTS"), "unexpected command {parts:?}");
        }
    }
    conn.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exists_is_debulked_per_key() -> Result<()> {
    let server = FakeLedisServer::start().await?;
    server.set_type("x", "hash");
    server.set_type("y", "hash");
    let (_rewriter, pool) = pool_for(&server);
    let token = CancellationToken::new();

    let mut conn = pool.get(&token).await?;
    let reply = conn
        .do_cmd("EXISTS", &[Arg::from("x"), Arg::from("y")])
        .await?;
    assert_eq!(resp(reply), RespValue::Integer(2));
    assert!(server.saw_command(&["HKEYEXISTS", "x"]));
    assert!(server.saw_command(&["HKEYEXISTS", "y"]));
    conn.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn expire_targets_the_resolved_namespace() -> Result<()> {
    let server = FakeLedisServer::start().await?;
    server.set_type("queue", "list");
    let (_rewriter, pool) = pool_for(&server);
    let token = CancellationToken::new();

    let mut conn = pool.get(&token).await?;
    let reply = conn
        .do_cmd("EXPIRE", &[Arg::from("queue"), Arg::from(30i64)])
        .await?;
    assert_eq!(resp(reply), RespValue::Integer(1));
    assert!(server.saw_command(&["LEXPIRE", "queue", "30"]));
    conn.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ping_with_message_synthesizes_the_echo() -> Result<()> {
    let server = FakeLedisServer::start().await?;
    let (_rewriter, pool) = pool_for(&server);
    let token = CancellationToken::new();

    let mut conn = pool.get(&token).await?;
    let bare = conn.do_cmd("PING", &[]).await?;
    assert_eq!(resp(bare), RespValue::simple("PONG"));

    let echoed = conn.do_cmd("PING", &[Arg::from("hello")]).await?;
    assert_eq!(resp(echoed), RespValue::bulk("hello"));
    // The backend only ever saw bare PINGs.
    assert!(server
        .commands()
        .iter()
        .filter(|parts| parts[0] == "PING")
        .all(|parts| parts.len() == 1));
    conn.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pipelined_commands_reduce_in_send_order() -> Result<()> {
    let server = FakeLedisServer::start().await?;
    let (_rewriter, pool) = pool_for(&server);
    let token = CancellationToken::new();

    let mut conn = pool.get(&token).await?;
    conn.send("SET", &[Arg::from("k"), Arg::from("v")]).await?;
    conn.send("PING", &[]).await?;
    conn.send("PING", &[Arg::from("tail")]).await?;
    conn.flush().await?;

    assert_eq!(resp(conn.receive().await?), RespValue::ok());
    assert_eq!(resp(conn.receive().await?), RespValue::simple("PONG"));
    assert_eq!(resp(conn.receive().await?), RespValue::bulk("tail"));
    conn.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_resolution_probes_once() -> Result<()> {
    let server = FakeLedisServer::start().await?;
    server.set_type("shared", "hash");
    let (_rewriter, pool) = pool_for(&server);

    let mut tasks = Vec::new();
    for _ in 0..3 {
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move {
            let token = CancellationToken::new();
            let mut conn = pool.get(&token).await?;
            let reply = conn.do_cmd("EXISTS", &[Arg::from("shared")]).await?;
            conn.close().await?;
            Ok::<_, Error>(reply)
        }));
    }

    for task in tasks {
        let reply = task.await.unwrap()?;
        assert_eq!(resp(reply), RespValue::Integer(1));
    }

    // One task owned the probe walk: the KV and List rounds ran exactly
    // once. (HKEYEXISTS also serves the rewritten EXISTS itself, so it
    // appears once as a probe plus once per caller.)
    assert_eq!(server.count_command("EXISTS"), 1);
    assert_eq!(server.count_command("LKEYEXISTS"), 1);
    assert_eq!(server.count_command("HKEYEXISTS"), 1 + 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_keys_resolve_as_deleted_and_probe_all_namespaces() -> Result<()> {
    let server = FakeLedisServer::start().await?;
    let (_rewriter, pool) = pool_for(&server);
    let token = CancellationToken::new();

    let mut conn = pool.get(&token).await?;
    let reply = conn.do_cmd("EXISTS", &[Arg::from("ghost")]).await?;
    assert_eq!(resp(reply), RespValue::Integer(0));
    for probe in ["EXISTS", "LKEYEXISTS", "HKEYEXISTS", "SKEYEXISTS", "ZKEYEXISTS"] {
        assert_eq!(server.count_command(probe), 1, "probe {probe}");
    }
    conn.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zadd_incr_becomes_zincrby() -> Result<()> {
    let server = FakeLedisServer::start().await?;
    let (_rewriter, pool) = pool_for(&server);
    let token = CancellationToken::new();

    let mut conn = pool.get(&token).await?;
    let reply = conn
        .do_cmd(
            "ZADD",
            &[Arg::from("k"), Arg::from("1"), Arg::from("a"), Arg::from("2"), Arg::from("b")],
        )
        .await?;
    assert_eq!(resp(reply), RespValue::Integer(2));
    assert!(server.saw_command(&["ZADD", "k", "1", "a", "2", "b"]));

    let incremented = conn
        .do_cmd(
            "ZADD",
            &[Arg::from("k"), Arg::from("INCR"), Arg::from("1"), Arg::from("a")],
        )
        .await?;
    assert_eq!(resp(incremented), RespValue::bulk("1"));
    assert!(server.saw_command(&["ZINCRBY", "k", "1", "a"]));
    conn.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lrem_bootstraps_and_evaluates_the_script() -> Result<()> {
    let server = FakeLedisServer::start().await?;
    server.set_type("mylist", "list");
    let (_rewriter, pool) = pool_for(&server);
    let token = CancellationToken::new();

    let mut conn = pool.get(&token).await?;
    let reply = conn
        .do_cmd(
            "LREM",
            &[Arg::from("mylist"), Arg::from(1i64), Arg::from("gone")],
        )
        .await?;
    assert_eq!(resp(reply), RespValue::Integer(2));

    // First call checks for the script, loads it, then evaluates.
    assert_eq!(server.count_command("EVALSHA"), 1);
    let script_calls: Vec<Vec<String>> = server
        .commands()
        .into_iter()
        .filter(|parts| parts[0] == "SCRIPT")
        .collect();
    assert_eq!(script_calls.len(), 2);
    assert!(script_calls[0][1].eq_ignore_ascii_case("EXISTS"));
    assert!(script_calls[1][1].eq_ignore_ascii_case("LOAD"));

    // A second LREM reuses the loaded script.
    let again = conn
        .do_cmd(
            "LREM",
            &[Arg::from("mylist"), Arg::from(1i64), Arg::from("gone")],
        )
        .await?;
    assert_eq!(resp(again), RespValue::Integer(2));
    assert_eq!(server.count_command("EVALSHA"), 2);
    assert_eq!(
        server
            .commands()
            .iter()
            .filter(|parts| parts[0] == "SCRIPT" && parts[1].eq_ignore_ascii_case("LOAD"))
            .count(),
        1
    );
    conn.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transactions_are_dropped_and_discard_fails() -> Result<()> {
    let server = FakeLedisServer::start().await?;
    let (_rewriter, pool) = pool_for(&server);
    let token = CancellationToken::new();

    let mut conn = pool.get(&token).await?;
    let watch = conn.do_cmd("WATCH", &[Arg::from("k")]).await?;
    assert_eq!(resp(watch), RespValue::NullBulk);
    let multi = conn.do_cmd("MULTI", &[]).await?;
    assert_eq!(resp(multi), RespValue::NullBulk);
    assert!(server.commands().is_empty());

    assert!(matches!(
        conn.do_cmd("DISCARD", &[]).await,
        Err(Error::NoEmulationPossible)
    ));
    conn.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unsafe_ledis_forwards_raw_backend_commands() -> Result<()> {
    let server = FakeLedisServer::start().await?;
    server.set_type("raw", "list");
    let (_rewriter, pool) = pool_for(&server);
    let token = CancellationToken::new();

    let mut conn = pool.get(&token).await?;
    let reply = conn
        .do_cmd(
            "UNSAFE",
            &[Arg::from("LEDIS"), Arg::from("LKEYEXISTS"), Arg::from("raw")],
        )
        .await?;
    assert_eq!(resp(reply), RespValue::Integer(1));
    assert!(server.saw_command(&["LKEYEXISTS", "raw"]));
    conn.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_borrowers_do_not_wait_for_a_slot() -> Result<()> {
    let server = FakeLedisServer::start().await?;
    let mut config = PoolConfig::for_addr(server.addr());
    config.max_active = 1;
    config.wait = true;
    let rewriter = Rewriter::new();
    let pool = rewriter.new_primary_pool(&config, 0)?;

    let token = CancellationToken::new();
    let held = pool.get(&token).await?;

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    assert!(matches!(
        pool.get(&cancelled).await,
        Err(Error::Cancelled)
    ));

    held.close().await?;
    let conn = pool.get(&token).await?;
    conn.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resolved_types_are_cached_across_connections() -> Result<()> {
    let server = FakeLedisServer::start().await?;
    server.set_type("hot", "zset");
    let (rewriter, pool) = pool_for(&server);
    let token = CancellationToken::new();

    let mut conn = pool.get(&token).await?;
    let first = conn.do_cmd("EXISTS", &[Arg::from("hot")]).await?;
    assert_eq!(resp(first), RespValue::Integer(1));
    let probes_after_first = server.count_command("ZKEYEXISTS");
    conn.close().await?;

    let mut conn = pool.get(&token).await?;
    let second = conn.do_cmd("EXISTS", &[Arg::from("hot")]).await?;
    assert_eq!(resp(second), RespValue::Integer(1));
    // The probe walk did not run again; only the rewritten EXISTS itself
    // touched the namespace.
    assert_eq!(server.count_command("ZKEYEXISTS"), probes_after_first + 1);
    assert_eq!(
        rewriter.cache().load_type(b"hot"),
        Some(lediswrap::LedisType::ZSet)
    );
    conn.close().await?;
    Ok(())
}
