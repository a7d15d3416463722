use std::{env, fmt::Display, str::FromStr};

use tracing::error;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_LOCAL_DB_PATH: &str = "calls.db";
const DEFAULT_DB_POOL_SIZE: usize = 5;

pub fn get_host_uri() -> String {
    match env::var("HOST") {
        Ok(host) => format!("https://{host}"),
        _ => format!("http://localhost:{}", get_port()),
    }
}

pub fn get_port() -> u16 {
    parse_or_default("PORT", env::var("PORT").ok(), DEFAULT_PORT)
}

pub fn get_libsql_url() -> Option<String> {
    env::var("LIBSQL_CLIENT_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
}

pub fn get_libsql_token() -> String {
    env::var("LIBSQL_CLIENT_TOKEN").unwrap_or_default()
}

pub fn get_local_db_path() -> String {
    match env::var("LIBSQL_LOCAL_DB_PATH") {
        Ok(path) if !path.trim().is_empty() => path,
        _ => DEFAULT_LOCAL_DB_PATH.to_string(),
    }
}

pub fn get_db_pool_size() -> usize {
    match parse_or_default("DB_POOL_SIZE", env::var("DB_POOL_SIZE").ok(), DEFAULT_DB_POOL_SIZE) {
        0 => {
            error!("DB_POOL_SIZE must be at least 1, using default");
            DEFAULT_DB_POOL_SIZE
        }
        size => size,
    }
}

/// Parses an env var value, falling back to `default` (and logging) when it is unset or invalid.
pub fn parse_or_default<T>(name: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + Display,
{
    let Some(raw) = raw else {
        return default;
    };

    match raw.trim().parse::<T>() {
        Ok(value) => value,
        _ => {
            error!("Failed to parse {} env var, using default {}", name, default);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_values_use_default() {
        assert_eq!(parse_or_default::<u16>("PORT", None, 8080), 8080);
    }

    #[test]
    fn valid_values_are_parsed() {
        assert_eq!(parse_or_default::<u16>("PORT", Some("5000".into()), 8080), 5000);
        assert_eq!(parse_or_default::<usize>("DB_POOL_SIZE", Some(" 12 ".into()), 5), 12);
    }

    #[test]
    fn garbage_falls_back_to_default() {
        assert_eq!(parse_or_default::<u16>("PORT", Some("eighty".into()), 8080), 8080);
        assert_eq!(parse_or_default::<u16>("PORT", Some("70000".into()), 8080), 8080);
    }
}
