//! Store implementations.
//!
//! - [`RedisStore`]: Redis-protocol stores over an async multiplexed connection
//! - [`MemoryStore`]: in-process store used by tests and local experiments

mod memory;
mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// Glob match supporting `*`, `?`, `[...]` classes and `\` escapes, as used
/// by `SCAN MATCH`.
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let k: Vec<char> = key.chars().collect();
    glob_match_from(&p, &k)
}

fn glob_match_from(p: &[char], k: &[char]) -> bool {
    match p.first() {
        None => k.is_empty(),
        Some('*') => (0..=k.len()).any(|i| glob_match_from(&p[1..], &k[i..])),
        Some('?') => !k.is_empty() && glob_match_from(&p[1..], &k[1..]),
        Some('[') => {
            let Some(close) = p.iter().position(|&c| c == ']') else {
                return !k.is_empty() && k[0] == '[' && glob_match_from(&p[1..], &k[1..]);
            };
            if k.is_empty() {
                return false;
            }
            let class = &p[1..close];
            let (negate, class) = match class.first() {
                Some('^') => (true, &class[1..]),
                _ => (false, class),
            };
            let mut matched = false;
            let mut i = 0;
            while i < class.len() {
                if i + 2 < class.len() && class[i + 1] == '-' {
                    if class[i] <= k[0] && k[0] <= class[i + 2] {
                        matched = true;
                    }
                    i += 3;
                } else {
                    if class[i] == k[0] {
                        matched = true;
                    }
                    i += 1;
                }
            }
            matched != negate && glob_match_from(&p[close + 1..], &k[1..])
        }
        Some('\\') if p.len() > 1 => {
            !k.is_empty() && k[0] == p[1] && glob_match_from(&p[2..], &k[1..])
        }
        Some(&c) => !k.is_empty() && k[0] == c && glob_match_from(&p[1..], &k[1..]),
    }
}
