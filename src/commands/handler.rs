//! Command Handler
//!
//! Turns decoded request frames into engine calls and engine results into
//! reply frames. This is the only layer that knows both vocabularies; the
//! engine never sees RESP and the protocol module never sees the store.
//!
//! ## Supported Commands
//!
//! ### Strings and keys
//! - `SET key value [EX seconds | NX]`
//! - `GET key`
//! - `DEL key [key ...]`
//! - `EXISTS key [key ...]`
//! - `EXPIRE key seconds`
//! - `TTL key`
//!
//! ### Sorted sets
//! - `ZADD key score member [score member ...]`
//! - `ZREM key member [member ...]`
//! - `ZSCORE key member`
//! - `ZRANGE key start stop [WITHSCORES]`
//! - `ZRANGEBYSCORE key min max [WITHSCORES]`
//! - `ZRANK key member`
//! - `ZCARD key`
//!
//! ### Server
//! - `PING [message]`, `ECHO message`
//! - `DBSIZE`, `FLUSHDB` (alias `FLUSHALL`), `QUIT`
//!
//! Command names are case-insensitive. Bad arity and unparsable arguments
//! come back as `-ERR ...` replies; the connection stays open. Operations
//! against a key of the wrong kind come back as `-WRONGTYPE ...` and
//! never mutate anything.

use crate::protocol::Frame;
use crate::storage::{KeyTtl, StorageEngine, StoreError};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// Executes commands against a shared storage engine.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    engine: Arc<StorageEngine>,
}

impl CommandHandler {
    pub fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }

    /// Executes one decoded request and returns the reply to send.
    ///
    /// The request must be an array of strings — both RESP clients and
    /// the inline dialect decode to that shape.
    pub fn execute(&self, request: Frame) -> Frame {
        let args = match request {
            Frame::Array(args) => args,
            _ => return Frame::error("ERR invalid request format"),
        };
        let Some((name_frame, args)) = args.split_first() else {
            return Frame::error("ERR empty command");
        };
        let Some(name) = name_frame.as_str() else {
            return Frame::error("ERR invalid command name");
        };
        self.dispatch(&name.to_uppercase(), args)
    }

    fn dispatch(&self, name: &str, args: &[Frame]) -> Frame {
        match name {
            "PING" => self.cmd_ping(args),
            "ECHO" => self.cmd_echo(args),
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "DEL" => self.cmd_del(args),
            "EXISTS" => self.cmd_exists(args),
            "EXPIRE" => self.cmd_expire(args),
            "TTL" => self.cmd_ttl(args),
            "DBSIZE" => self.cmd_dbsize(args),
            "FLUSHDB" | "FLUSHALL" => self.cmd_flushdb(args),

            "ZADD" => self.cmd_zadd(args),
            "ZREM" => self.cmd_zrem(args),
            "ZSCORE" => self.cmd_zscore(args),
            "ZRANGE" => self.cmd_zrange(args),
            "ZRANGEBYSCORE" => self.cmd_zrangebyscore(args),
            "ZRANK" => self.cmd_zrank(args),
            "ZCARD" => self.cmd_zcard(args),

            "QUIT" => Frame::ok(),
            _ => Frame::error(format!("ERR unknown command '{name}'")),
        }
    }

    // ========================================================================
    // String and key commands
    // ========================================================================

    /// PING [message]
    fn cmd_ping(&self, args: &[Frame]) -> Frame {
        match args {
            [] => Frame::pong(),
            [message] => match arg_bytes(message) {
                Some(payload) => Frame::Bulk(payload),
                None => Frame::error("ERR invalid argument"),
            },
            _ => wrong_arity("ping"),
        }
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Frame]) -> Frame {
        match args {
            [message] => match arg_bytes(message) {
                Some(payload) => Frame::Bulk(payload),
                None => Frame::error("ERR invalid argument"),
            },
            _ => wrong_arity("echo"),
        }
    }

    /// SET key value [EX seconds | NX]
    fn cmd_set(&self, args: &[Frame]) -> Frame {
        if args.len() < 2 {
            return wrong_arity("set");
        }
        let Some(key) = arg_bytes(&args[0]) else {
            return Frame::error("ERR invalid key");
        };
        let Some(value) = arg_bytes(&args[1]) else {
            return Frame::error("ERR invalid value");
        };

        let mut ttl: Option<Duration> = None;
        let mut if_absent = false;

        let mut i = 2;
        while i < args.len() {
            let Some(option) = args[i].as_str() else {
                return Frame::error("ERR syntax error");
            };
            match option.to_uppercase().as_str() {
                "EX" => {
                    i += 1;
                    let seconds = args.get(i).and_then(arg_i64);
                    match seconds {
                        Some(s) if s > 0 => ttl = Some(Duration::from_secs(s as u64)),
                        _ => return Frame::error("ERR invalid expire time in 'set' command"),
                    }
                }
                "NX" => if_absent = true,
                _ => return Frame::error("ERR syntax error"),
            }
            i += 1;
        }

        // One modifier at a time; EX together with NX is not supported.
        if ttl.is_some() && if_absent {
            return Frame::error("ERR syntax error");
        }

        if if_absent {
            if self.engine.set_if_absent(key, value) {
                Frame::ok()
            } else {
                Frame::Null
            }
        } else if let Some(ttl) = ttl {
            self.engine.set_with_ttl(key, value, ttl);
            Frame::ok()
        } else {
            self.engine.set(key, value);
            Frame::ok()
        }
    }

    /// GET key
    fn cmd_get(&self, args: &[Frame]) -> Frame {
        let [key] = args else {
            return wrong_arity("get");
        };
        let Some(key) = arg_bytes(key) else {
            return Frame::error("ERR invalid key");
        };
        match self.engine.get(&key) {
            Ok(Some(value)) => Frame::Bulk(value),
            Ok(None) => Frame::Null,
            Err(err) => store_error(err),
        }
    }

    /// DEL key [key ...]
    fn cmd_del(&self, args: &[Frame]) -> Frame {
        if args.is_empty() {
            return wrong_arity("del");
        }
        let mut deleted = 0;
        for arg in args {
            if let Some(key) = arg_bytes(arg) {
                if self.engine.delete(&key) {
                    deleted += 1;
                }
            }
        }
        Frame::integer(deleted)
    }

    /// EXISTS key [key ...]
    fn cmd_exists(&self, args: &[Frame]) -> Frame {
        if args.is_empty() {
            return wrong_arity("exists");
        }
        let mut found = 0;
        for arg in args {
            if let Some(key) = arg_bytes(arg) {
                if self.engine.exists(&key) {
                    found += 1;
                }
            }
        }
        Frame::integer(found)
    }

    /// EXPIRE key seconds
    fn cmd_expire(&self, args: &[Frame]) -> Frame {
        let [key, seconds] = args else {
            return wrong_arity("expire");
        };
        let Some(key) = arg_bytes(key) else {
            return Frame::error("ERR invalid key");
        };
        let Some(seconds) = arg_i64(seconds).filter(|s| *s >= 0) else {
            return Frame::error("ERR invalid expire time in 'expire' command");
        };
        let applied = self.engine.expire(&key, Duration::from_secs(seconds as u64));
        Frame::integer(applied as i64)
    }

    /// TTL key
    ///
    /// `-2` for a missing key, `-1` for a key without a deadline, else
    /// the remaining whole seconds.
    fn cmd_ttl(&self, args: &[Frame]) -> Frame {
        let [key] = args else {
            return wrong_arity("ttl");
        };
        let Some(key) = arg_bytes(key) else {
            return Frame::error("ERR invalid key");
        };
        match self.engine.ttl_of(&key) {
            KeyTtl::Missing => Frame::integer(-2),
            KeyTtl::Persistent => Frame::integer(-1),
            KeyTtl::Remaining(left) => Frame::integer(left.as_secs() as i64),
        }
    }

    /// DBSIZE
    fn cmd_dbsize(&self, args: &[Frame]) -> Frame {
        if !args.is_empty() {
            return wrong_arity("dbsize");
        }
        Frame::integer(self.engine.db_size() as i64)
    }

    /// FLUSHDB
    fn cmd_flushdb(&self, args: &[Frame]) -> Frame {
        if !args.is_empty() {
            return wrong_arity("flushdb");
        }
        self.engine.flush();
        Frame::ok()
    }

    // ========================================================================
    // Sorted set commands
    // ========================================================================

    /// ZADD key score member [score member ...]
    fn cmd_zadd(&self, args: &[Frame]) -> Frame {
        if args.len() < 3 || (args.len() - 1) % 2 != 0 {
            return wrong_arity("zadd");
        }
        let Some(key) = arg_bytes(&args[0]) else {
            return Frame::error("ERR invalid key");
        };

        // Validate every pair up front so a bad score mutates nothing.
        let mut pairs = Vec::with_capacity((args.len() - 1) / 2);
        for pair in args[1..].chunks(2) {
            let Some(score) = arg_f64(&pair[0]) else {
                return Frame::error("ERR value is not a valid float");
            };
            let Some(member) = arg_bytes(&pair[1]) else {
                return Frame::error("ERR invalid member");
            };
            pairs.push((score, member));
        }

        let mut changed = 0;
        for (score, member) in pairs {
            match self.engine.zadd(key.clone(), member, score) {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(err) => return store_error(err),
            }
        }
        Frame::integer(changed)
    }

    /// ZREM key member [member ...]
    fn cmd_zrem(&self, args: &[Frame]) -> Frame {
        if args.len() < 2 {
            return wrong_arity("zrem");
        }
        let Some(key) = arg_bytes(&args[0]) else {
            return Frame::error("ERR invalid key");
        };
        let mut removed = 0;
        for arg in &args[1..] {
            let Some(member) = arg_bytes(arg) else {
                continue;
            };
            match self.engine.zrem(&key, &member) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(err) => return store_error(err),
            }
        }
        Frame::integer(removed)
    }

    /// ZSCORE key member
    fn cmd_zscore(&self, args: &[Frame]) -> Frame {
        let [key, member] = args else {
            return wrong_arity("zscore");
        };
        let (Some(key), Some(member)) = (arg_bytes(key), arg_bytes(member)) else {
            return Frame::error("ERR invalid argument");
        };
        match self.engine.zscore(&key, &member) {
            Ok(Some(score)) => Frame::bulk(Bytes::from(format_score(score))),
            Ok(None) => Frame::Null,
            Err(err) => store_error(err),
        }
    }

    /// ZRANGE key start stop [WITHSCORES]
    ///
    /// Ranks may be negative, counting from the tail; they are resolved
    /// to non-negative form here before the engine sees them.
    fn cmd_zrange(&self, args: &[Frame]) -> Frame {
        if args.len() < 3 || args.len() > 4 {
            return wrong_arity("zrange");
        }
        let Some(key) = arg_bytes(&args[0]) else {
            return Frame::error("ERR invalid key");
        };
        let (Some(raw_start), Some(raw_stop)) = (arg_i64(&args[1]), arg_i64(&args[2])) else {
            return Frame::error("ERR value is not an integer or out of range");
        };
        let with_scores = match args.get(3) {
            None => false,
            Some(flag) if is_withscores(flag) => true,
            Some(_) => return Frame::error("ERR syntax error"),
        };

        let card = match self.engine.zcard(&key) {
            Ok(card) => card as i64,
            Err(err) => return store_error(err),
        };
        let mut start = raw_start;
        let mut stop = raw_stop;
        if start < 0 {
            start += card;
        }
        if stop < 0 {
            stop += card;
        }
        start = start.max(0);
        if stop < 0 || start > stop || start >= card {
            return Frame::array(vec![]);
        }

        match self.engine.zrange(&key, start as usize, stop as usize) {
            Ok(pairs) => pairs_reply(pairs, with_scores),
            Err(err) => store_error(err),
        }
    }

    /// ZRANGEBYSCORE key min max [WITHSCORES]
    fn cmd_zrangebyscore(&self, args: &[Frame]) -> Frame {
        if args.len() < 3 || args.len() > 4 {
            return wrong_arity("zrangebyscore");
        }
        let Some(key) = arg_bytes(&args[0]) else {
            return Frame::error("ERR invalid key");
        };
        let (Some(min), Some(max)) = (arg_f64(&args[1]), arg_f64(&args[2])) else {
            return Frame::error("ERR value is not a valid float");
        };
        let with_scores = match args.get(3) {
            None => false,
            Some(flag) if is_withscores(flag) => true,
            Some(_) => return Frame::error("ERR syntax error"),
        };

        match self.engine.zrangebyscore(&key, min, max) {
            Ok(pairs) => pairs_reply(pairs, with_scores),
            Err(err) => store_error(err),
        }
    }

    /// ZRANK key member
    fn cmd_zrank(&self, args: &[Frame]) -> Frame {
        let [key, member] = args else {
            return wrong_arity("zrank");
        };
        let (Some(key), Some(member)) = (arg_bytes(key), arg_bytes(member)) else {
            return Frame::error("ERR invalid argument");
        };
        match self.engine.zrank(&key, &member) {
            Ok(Some(rank)) => Frame::integer(rank as i64),
            Ok(None) => Frame::Null,
            Err(err) => store_error(err),
        }
    }

    /// ZCARD key
    fn cmd_zcard(&self, args: &[Frame]) -> Frame {
        let [key] = args else {
            return wrong_arity("zcard");
        };
        let Some(key) = arg_bytes(key) else {
            return Frame::error("ERR invalid key");
        };
        match self.engine.zcard(&key) {
            Ok(card) => Frame::integer(card as i64),
            Err(err) => store_error(err),
        }
    }
}

// ============================================================================
// Argument and reply helpers
// ============================================================================

fn arg_bytes(frame: &Frame) -> Option<Bytes> {
    match frame {
        Frame::Bulk(data) => Some(data.clone()),
        Frame::Simple(text) => Some(Bytes::copy_from_slice(text.as_bytes())),
        _ => None,
    }
}

fn arg_i64(frame: &Frame) -> Option<i64> {
    match frame {
        Frame::Integer(n) => Some(*n),
        _ => frame.as_str()?.parse().ok(),
    }
}

/// Parses a score. NaN never enters the store; the ordered index needs a
/// total order over whatever it holds.
fn arg_f64(frame: &Frame) -> Option<f64> {
    match frame {
        Frame::Integer(n) => Some(*n as f64),
        _ => frame.as_str()?.parse().ok().filter(|v: &f64| !v.is_nan()),
    }
}

fn is_withscores(frame: &Frame) -> bool {
    frame
        .as_str()
        .is_some_and(|flag| flag.eq_ignore_ascii_case("WITHSCORES"))
}

fn wrong_arity(name: &str) -> Frame {
    Frame::error(format!("ERR wrong number of arguments for '{name}' command"))
}

fn store_error(err: StoreError) -> Frame {
    Frame::error(err.to_string())
}

/// Renders a score the way replies carry it: integral scores keep one
/// decimal place ("2" becomes "2.0"), everything else prints as-is.
fn format_score(score: f64) -> String {
    if score.is_finite() && score == score.trunc() {
        format!("{score:.1}")
    } else {
        score.to_string()
    }
}

fn pairs_reply(pairs: Vec<(Bytes, f64)>, with_scores: bool) -> Frame {
    let mut items = Vec::with_capacity(pairs.len() * if with_scores { 2 } else { 1 });
    for (member, score) in pairs {
        items.push(Frame::Bulk(member));
        if with_scores {
            items.push(Frame::bulk(Bytes::from(format_score(score))));
        }
    }
    Frame::Array(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> CommandHandler {
        CommandHandler::new(Arc::new(StorageEngine::new()))
    }

    fn run(handler: &CommandHandler, parts: &[&str]) -> Frame {
        let frame = Frame::Array(
            parts
                .iter()
                .map(|part| Frame::bulk(Bytes::copy_from_slice(part.as_bytes())))
                .collect(),
        );
        handler.execute(frame)
    }

    fn bulk(s: &str) -> Frame {
        Frame::bulk(Bytes::copy_from_slice(s.as_bytes()))
    }

    #[test]
    fn test_ping() {
        let h = handler();
        assert_eq!(run(&h, &["PING"]), Frame::pong());
        assert_eq!(run(&h, &["ping", "hello"]), bulk("hello"));
        assert!(run(&h, &["PING", "a", "b"]).is_error());
    }

    #[test]
    fn test_echo() {
        let h = handler();
        assert_eq!(run(&h, &["ECHO", "hi"]), bulk("hi"));
        assert!(run(&h, &["ECHO"]).is_error());
    }

    #[test]
    fn test_set_get_roundtrip() {
        let h = handler();
        assert_eq!(run(&h, &["SET", "name", "quartz"]), Frame::ok());
        assert_eq!(run(&h, &["GET", "name"]), bulk("quartz"));
        assert_eq!(run(&h, &["GET", "missing"]), Frame::Null);
    }

    #[test]
    fn test_commands_are_case_insensitive() {
        let h = handler();
        assert_eq!(run(&h, &["set", "k", "v"]), Frame::ok());
        assert_eq!(run(&h, &["GeT", "k"]), bulk("v"));
    }

    #[test]
    fn test_set_nx_semantics() {
        let h = handler();
        assert_eq!(run(&h, &["SET", "a", "1", "NX"]), Frame::ok());
        assert_eq!(run(&h, &["SET", "a", "2", "NX"]), Frame::Null);
        assert_eq!(run(&h, &["GET", "a"]), bulk("1"));
    }

    #[test]
    fn test_set_ex_installs_a_ttl() {
        let h = handler();
        assert_eq!(run(&h, &["SET", "k", "v", "EX", "100"]), Frame::ok());
        match run(&h, &["TTL", "k"]) {
            Frame::Integer(left) => assert!(left > 95 && left <= 100),
            other => panic!("expected an integer ttl, got {other:?}"),
        }
    }

    #[test]
    fn test_set_option_errors() {
        let h = handler();
        assert!(run(&h, &["SET", "k", "v", "EX"]).is_error());
        assert!(run(&h, &["SET", "k", "v", "EX", "0"]).is_error());
        assert!(run(&h, &["SET", "k", "v", "EX", "abc"]).is_error());
        assert!(run(&h, &["SET", "k", "v", "BOGUS"]).is_error());
        // One modifier at a time.
        assert!(run(&h, &["SET", "k", "v", "EX", "5", "NX"]).is_error());
        assert!(run(&h, &["SET"]).is_error());
    }

    #[test]
    fn test_del_and_exists_count_keys() {
        let h = handler();
        run(&h, &["SET", "a", "1"]);
        run(&h, &["SET", "b", "2"]);

        assert_eq!(run(&h, &["EXISTS", "a", "b", "missing"]), Frame::integer(2));
        assert_eq!(run(&h, &["DEL", "a", "missing"]), Frame::integer(1));
        assert_eq!(run(&h, &["DEL", "a"]), Frame::integer(0));
        assert_eq!(run(&h, &["EXISTS", "a"]), Frame::integer(0));
    }

    #[test]
    fn test_ttl_wire_values() {
        let h = handler();
        assert_eq!(run(&h, &["TTL", "missing"]), Frame::integer(-2));

        run(&h, &["SET", "k", "v"]);
        assert_eq!(run(&h, &["TTL", "k"]), Frame::integer(-1));

        assert_eq!(run(&h, &["EXPIRE", "k", "100"]), Frame::integer(1));
        match run(&h, &["TTL", "k"]) {
            Frame::Integer(left) => assert!(left > 95 && left <= 100),
            other => panic!("expected an integer ttl, got {other:?}"),
        }
    }

    #[test]
    fn test_expire_semantics() {
        let h = handler();
        assert_eq!(run(&h, &["EXPIRE", "missing", "10"]), Frame::integer(0));

        run(&h, &["SET", "k", "v"]);
        // Zero deletes immediately.
        assert_eq!(run(&h, &["EXPIRE", "k", "0"]), Frame::integer(1));
        assert_eq!(run(&h, &["EXISTS", "k"]), Frame::integer(0));

        assert!(run(&h, &["EXPIRE", "k", "-5"]).is_error());
        assert!(run(&h, &["EXPIRE", "k", "abc"]).is_error());
    }

    #[test]
    fn test_dbsize_and_flushdb() {
        let h = handler();
        run(&h, &["SET", "a", "1"]);
        run(&h, &["ZADD", "z", "1", "m"]);
        assert_eq!(run(&h, &["DBSIZE"]), Frame::integer(2));

        assert_eq!(run(&h, &["FLUSHDB"]), Frame::ok());
        assert_eq!(run(&h, &["DBSIZE"]), Frame::integer(0));
        assert_eq!(run(&h, &["ZCARD", "z"]), Frame::integer(0));
    }

    #[test]
    fn test_zadd_and_zcard() {
        let h = handler();
        assert_eq!(
            run(&h, &["ZADD", "z", "1", "one", "2", "two", "3", "three"]),
            Frame::integer(3)
        );
        assert_eq!(run(&h, &["ZCARD", "z"]), Frame::integer(3));

        // Same score again: no change reported.
        assert_eq!(run(&h, &["ZADD", "z", "1", "one"]), Frame::integer(0));
        // New score: counted as a change.
        assert_eq!(run(&h, &["ZADD", "z", "9", "one"]), Frame::integer(1));
    }

    #[test]
    fn test_zadd_arity_and_float_validation() {
        let h = handler();
        assert!(run(&h, &["ZADD", "z"]).is_error());
        assert!(run(&h, &["ZADD", "z", "1"]).is_error());
        assert!(run(&h, &["ZADD", "z", "1", "a", "2"]).is_error());
        assert!(run(&h, &["ZADD", "z", "nan", "a"]).is_error());

        // A bad score anywhere rejects the whole command before any
        // member is added.
        assert!(run(&h, &["ZADD", "z", "1", "a", "oops", "b"]).is_error());
        assert_eq!(run(&h, &["ZCARD", "z"]), Frame::integer(0));
    }

    #[test]
    fn test_zscore_and_zrank() {
        let h = handler();
        run(&h, &["ZADD", "z", "1", "one", "2", "two", "3", "three"]);

        assert_eq!(run(&h, &["ZSCORE", "z", "one"]), bulk("1.0"));
        assert_eq!(run(&h, &["ZSCORE", "z", "missing"]), Frame::Null);
        assert_eq!(run(&h, &["ZRANK", "z", "two"]), Frame::integer(1));
        assert_eq!(run(&h, &["ZRANK", "z", "missing"]), Frame::Null);
        assert_eq!(run(&h, &["ZRANK", "missing", "m"]), Frame::Null);
    }

    #[test]
    fn test_zscore_formats_fractions_verbatim() {
        let h = handler();
        run(&h, &["ZADD", "z", "2.5", "half"]);
        assert_eq!(run(&h, &["ZSCORE", "z", "half"]), bulk("2.5"));
    }

    #[test]
    fn test_zrange_and_negative_indices() {
        let h = handler();
        run(&h, &["ZADD", "z", "1", "one", "2", "two", "3", "three"]);

        assert_eq!(
            run(&h, &["ZRANGE", "z", "0", "-1"]),
            Frame::array(vec![bulk("one"), bulk("two"), bulk("three")])
        );
        assert_eq!(
            run(&h, &["ZRANGE", "z", "-2", "-1"]),
            Frame::array(vec![bulk("two"), bulk("three")])
        );
        assert_eq!(
            run(&h, &["ZRANGE", "z", "1", "1"]),
            Frame::array(vec![bulk("two")])
        );
        assert_eq!(run(&h, &["ZRANGE", "z", "5", "10"]), Frame::array(vec![]));
        assert_eq!(run(&h, &["ZRANGE", "z", "2", "1"]), Frame::array(vec![]));
        assert_eq!(
            run(&h, &["ZRANGE", "missing", "0", "-1"]),
            Frame::array(vec![])
        );
    }

    #[test]
    fn test_zrange_withscores() {
        let h = handler();
        run(&h, &["ZADD", "z", "1", "one", "2", "two"]);

        assert_eq!(
            run(&h, &["ZRANGE", "z", "0", "-1", "WITHSCORES"]),
            Frame::array(vec![bulk("one"), bulk("1.0"), bulk("two"), bulk("2.0")])
        );
        assert!(run(&h, &["ZRANGE", "z", "0", "-1", "NOTAFLAG"]).is_error());
    }

    #[test]
    fn test_zrangebyscore() {
        let h = handler();
        run(&h, &["ZADD", "z", "1", "one", "2", "two", "3", "three"]);

        assert_eq!(
            run(&h, &["ZRANGEBYSCORE", "z", "2", "3"]),
            Frame::array(vec![bulk("two"), bulk("three")])
        );
        assert_eq!(
            run(&h, &["ZRANGEBYSCORE", "z", "2", "3", "withscores"]),
            Frame::array(vec![bulk("two"), bulk("2.0"), bulk("three"), bulk("3.0")])
        );
        assert_eq!(
            run(&h, &["ZRANGEBYSCORE", "z", "10", "20"]),
            Frame::array(vec![])
        );
        assert!(run(&h, &["ZRANGEBYSCORE", "z", "abc", "3"]).is_error());
    }

    #[test]
    fn test_zrem() {
        let h = handler();
        run(&h, &["ZADD", "z", "1", "a", "2", "b"]);

        assert_eq!(run(&h, &["ZREM", "z", "a", "missing"]), Frame::integer(1));
        assert_eq!(run(&h, &["ZCARD", "z"]), Frame::integer(1));
        assert_eq!(run(&h, &["ZREM", "missing", "m"]), Frame::integer(0));
    }

    #[test]
    fn test_score_update_reorders_members() {
        let h = handler();
        run(&h, &["ZADD", "z", "1", "one", "2", "two", "3", "three"]);
        run(&h, &["ZADD", "z", "5", "one"]);

        assert_eq!(
            run(&h, &["ZRANGE", "z", "0", "-1"]),
            Frame::array(vec![bulk("two"), bulk("three"), bulk("one")])
        );
        assert_eq!(run(&h, &["ZRANK", "z", "one"]), Frame::integer(2));
        assert_eq!(run(&h, &["ZCARD", "z"]), Frame::integer(3));
    }

    #[test]
    fn test_wrongtype_replies() {
        let h = handler();
        run(&h, &["SET", "s", "hello"]);

        let reply = run(&h, &["ZADD", "s", "1", "x"]);
        match &reply {
            Frame::Error(text) => assert!(text.starts_with("WRONGTYPE")),
            other => panic!("expected WRONGTYPE, got {other:?}"),
        }
        // The string survived the failed ZADD.
        assert_eq!(run(&h, &["GET", "s"]), bulk("hello"));

        run(&h, &["ZADD", "z", "1", "m"]);
        assert!(run(&h, &["GET", "z"]).is_error());
        assert!(run(&h, &["ZRANGE", "s", "0", "-1"]).is_error());
    }

    #[test]
    fn test_unknown_command() {
        let h = handler();
        let reply = run(&h, &["BOGUS", "x"]);
        match reply {
            Frame::Error(text) => assert!(text.contains("unknown command")),
            other => panic!("expected an error, got {other:?}"),
        }
    }

    #[test]
    fn test_non_array_request() {
        let h = handler();
        assert!(h.execute(Frame::integer(5)).is_error());
        assert!(h.execute(Frame::Array(vec![])).is_error());
    }

    #[test]
    fn test_quit_acknowledges() {
        let h = handler();
        assert_eq!(run(&h, &["QUIT"]), Frame::ok());
    }
}
