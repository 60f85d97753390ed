use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use zeroize::Zeroizing;

pub struct Config {
    pub bind_address: SocketAddr,
    /// Credential expected from approvers on `/admin/*`.
    pub admin_secret: Zeroizing<String>,
    /// Credential expected from requesters on `/server/*`.
    pub client_secret: Zeroizing<String>,
    /// The payload released for approved requests.
    pub secret: Zeroizing<String>,
    /// Lifetime of a request, measured from creation.
    /// Set via KEYGATE_REQUEST_TIMEOUT. Default: 5m.
    pub request_timeout: Duration,
    /// Period of the expiry sweeper.
    /// Set via KEYGATE_SWEEP_INTERVAL. Default: 60s.
    pub sweep_interval: Duration,
    /// Take the source address from `X-Forwarded-For` when behind a proxy.
    pub trust_proxy_headers: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("admin_secret", &"<redacted>")
            .field("client_secret", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .field("sweep_interval", &self.sweep_interval)
            .field("trust_proxy_headers", &self.trust_proxy_headers)
            .finish()
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Build a config from any key/value source. Every problem is fatal: a
/// misconfigured broker must not start.
pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let required_secret = |key: &str| -> anyhow::Result<Zeroizing<String>> {
        match lookup(key) {
            Some(v) if !v.is_empty() => Ok(Zeroizing::new(v)),
            _ => anyhow::bail!("{} must be set to a non-empty value", key),
        }
    };

    let admin_secret = required_secret("KEYGATE_ADMIN_SECRET")?;
    let client_secret = required_secret("KEYGATE_CLIENT_SECRET")?;
    let secret = required_secret("KEYGATE_SECRET")?;

    if admin_secret == client_secret {
        tracing::warn!(
            "KEYGATE_ADMIN_SECRET equals KEYGATE_CLIENT_SECRET; requesters can approve their own requests"
        );
    }

    let bind_raw = lookup("KEYGATE_BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".into());
    let bind_address = bind_raw
        .parse::<SocketAddr>()
        .with_context(|| format!("KEYGATE_BIND_ADDRESS is not a socket address: {}", bind_raw))?;

    let request_timeout = duration_var(&lookup, "KEYGATE_REQUEST_TIMEOUT", "5m")?;
    let sweep_interval = duration_var(&lookup, "KEYGATE_SWEEP_INTERVAL", "60s")?;

    let trust_proxy_headers = match lookup("KEYGATE_TRUST_PROXY_HEADERS").as_deref() {
        None | Some("") => false,
        Some(v) => parse_bool(v)
            .with_context(|| format!("KEYGATE_TRUST_PROXY_HEADERS is not a boolean: {}", v))?,
    };

    Ok(Config {
        bind_address,
        admin_secret,
        client_secret,
        secret,
        request_timeout,
        sweep_interval,
        trust_proxy_headers,
    })
}

fn duration_var<F>(lookup: &F, key: &str, default: &str) -> anyhow::Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    let d = parse_duration(&raw).with_context(|| format!("{} is not a valid duration: {:?}", key, raw))?;
    if d.is_zero() {
        anyhow::bail!("{} must be greater than zero", key);
    }
    Ok(d)
}

fn parse_bool(s: &str) -> anyhow::Result<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("expected true/false"),
    }
}

/// Parse durations like "500ms", "60s", "5m", "1h30m".
///
/// Supported units: "ms", "s", "m", "h". A unit is required on every
/// component, and fractional values are not accepted.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("empty duration");
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            anyhow::bail!("expected a number at {:?}", rest);
        }
        let value: u64 = rest[..digits].parse().context("number out of range")?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let part = match &rest[..unit_len] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.checked_mul(60).context("duration overflow")?),
            "h" => Duration::from_secs(value.checked_mul(3600).context("duration overflow")?),
            "" => anyhow::bail!("missing unit after {}", value),
            other => anyhow::bail!("unknown unit {:?}", other),
        };
        rest = &rest[unit_len..];
        total = total.checked_add(part).context("duration overflow")?;
    }
    Ok(total)
}
