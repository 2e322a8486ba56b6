//!
//! board configuration
//! -------------------
//! Settings come from environment variables and can be overridden by command-line
//! flags. Precedence: flag > environment > default. Malformed values are logged and
//! replaced by the default.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

pub const HELP: &str = "board server\n\nUSAGE:\n  board_server [--port N] [--db-url URL] [--upload-dir PATH] [--public-dir PATH]\n\nOPTIONS:\n  --port N            HTTP port (env: PORT, default 3000)\n  --db-url URL        Store connection string: memory: | file://<dir> (env: DB_URL, default memory:)\n  --upload-dir PATH   Where uploads are written (env: BOARD_UPLOAD_DIR, default public/images)\n  --public-dir PATH   Static files served under /public (env: BOARD_PUBLIC_DIR, default public)\n\nENVIRONMENT:\n  BOARD_SESSION_TTL_SECS  Session lifetime in seconds (default 3600)\n  BOARD_SECURE_COOKIES    Mark the session cookie Secure (default false)\n  BOARD_PASSWORD_SCHEME   plain | argon2 (default plain)\n  BOARD_UPLOAD_LIMIT      Maximum request body for uploads in bytes (default 10485760)\n";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub http_port: u16,
    pub db_url: String,
    pub upload_dir: PathBuf,
    pub public_dir: PathBuf,
    pub session_ttl: Duration,
    pub secure_cookies: bool,
    pub password_scheme: String,
    pub upload_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            db_url: "memory:".to_string(),
            upload_dir: PathBuf::from("public/images"),
            public_dir: PathBuf::from("public"),
            session_ttl: Duration::from_secs(60 * 60),
            secure_cookies: false,
            password_scheme: "plain".to_string(),
            upload_limit: 10 * 1024 * 1024,
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let i = args.iter().position(|a| a == flag)?;
    args.get(i + 1).filter(|v| !v.starts_with("--")).cloned()
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parsed<T: std::str::FromStr>(name: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Invalid {name} value '{raw}', using default");
            None
        }
    }
}

impl Config {
    /// Load from the process environment and the given arguments.
    pub fn from_env_and_args(args: &[String]) -> Self {
        Self::load(args, |key| std::env::var(key).ok())
    }

    /// Load using `env` as the variable lookup.
    pub fn load(args: &[String], env: impl Fn(&str) -> Option<String>) -> Self {
        let d = Config::default();

        let http_port = parsed::<u16>("--port", arg_value(args, "--port"))
            .or_else(|| parsed::<u16>("PORT", env("PORT")))
            .unwrap_or(d.http_port);
        let db_url = arg_value(args, "--db-url").or_else(|| env("DB_URL")).unwrap_or(d.db_url);
        let upload_dir = arg_value(args, "--upload-dir")
            .or_else(|| env("BOARD_UPLOAD_DIR"))
            .map(PathBuf::from)
            .unwrap_or(d.upload_dir);
        let public_dir = arg_value(args, "--public-dir")
            .or_else(|| env("BOARD_PUBLIC_DIR"))
            .map(PathBuf::from)
            .unwrap_or(d.public_dir);
        let session_ttl = parsed::<u64>("BOARD_SESSION_TTL_SECS", env("BOARD_SESSION_TTL_SECS"))
            .map(Duration::from_secs)
            .unwrap_or(d.session_ttl);
        let secure_cookies = env("BOARD_SECURE_COOKIES")
            .and_then(|v| {
                let b = parse_bool(&v);
                if b.is_none() { warn!("Invalid BOARD_SECURE_COOKIES value '{v}', using default"); }
                b
            })
            .unwrap_or(d.secure_cookies);
        let password_scheme = env("BOARD_PASSWORD_SCHEME").unwrap_or(d.password_scheme);
        let upload_limit = parsed::<usize>("BOARD_UPLOAD_LIMIT", env("BOARD_UPLOAD_LIMIT")).unwrap_or(d.upload_limit);

        Config { http_port, db_url, upload_dir, public_dir, session_ttl, secure_cookies, password_scheme, upload_limit }
    }
}
