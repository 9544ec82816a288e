use anyhow::{anyhow, Context, Result};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

pub fn required_env(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("missing env: {name}"))
}

pub fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

pub fn socket_addr_from_env(name: &str, default: &str) -> Result<SocketAddr> {
    let value = env::var(name).unwrap_or_else(|_| default.to_string());
    SocketAddr::from_str(&value).map_err(|err| anyhow!("invalid socket addr for {name}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EnvGuard {
        key: &'static str,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            env::remove_var(self.key);
        }
    }

    fn set_env(key: &'static str, value: &str) -> EnvGuard {
        env::set_var(key, value);
        EnvGuard { key }
    }

    #[test]
    fn required_env_reads_value() {
        let _guard = set_env("ROLLCALL_TEST_REQUIRED", "value");
        assert_eq!(required_env("ROLLCALL_TEST_REQUIRED").unwrap(), "value");
    }

    #[test]
    fn required_env_missing_is_error() {
        env::remove_var("ROLLCALL_TEST_MISSING");
        assert!(required_env("ROLLCALL_TEST_MISSING").is_err());
    }

    #[test]
    fn env_or_falls_back() {
        env::remove_var("ROLLCALL_TEST_FALLBACK");
        assert_eq!(env_or("ROLLCALL_TEST_FALLBACK", "redis://localhost"), "redis://localhost");
    }

    #[test]
    fn socket_addr_default_and_override() {
        env::remove_var("ROLLCALL_TEST_ADDR");
        let addr = socket_addr_from_env("ROLLCALL_TEST_ADDR", "127.0.0.1:8085").unwrap();
        assert_eq!(addr, "127.0.0.1:8085".parse().unwrap());

        let _guard = set_env("ROLLCALL_TEST_ADDR", "0.0.0.0:9000");
        let addr = socket_addr_from_env("ROLLCALL_TEST_ADDR", "127.0.0.1:8085").unwrap();
        assert_eq!(addr, "0.0.0.0:9000".parse().unwrap());
    }

    #[test]
    fn socket_addr_invalid_is_error() {
        let _guard = set_env("ROLLCALL_TEST_BAD_ADDR", "not-an-addr");
        assert!(socket_addr_from_env("ROLLCALL_TEST_BAD_ADDR", "127.0.0.1:8085").is_err());
    }
}
