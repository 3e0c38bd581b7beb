use crate::clock::{Clock, FixedClock, SystemClock};
use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_YEAR_START_MONTH: u32 = 4;
pub const DEFAULT_EDIT_WINDOW_DAYS: i64 = 31;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_MAIL_FROM: &str = "Attendance Office <attendance@attendd.local>";

/// Daemon settings, read from the environment (after `.env`).
///
/// | Env Var                    | Default                |
/// |----------------------------|------------------------|
/// | `ATTENDD_WORKSPACE`        | unset                  |
/// | `ATTENDD_TODAY`            | unset (system clock)   |
/// | `ATTENDD_YEAR_START_MONTH` | `4`                    |
/// | `ATTENDD_EDIT_WINDOW_DAYS` | `31`                   |
/// | `ATTENDD_BUSY_TIMEOUT_MS`  | `5000`                 |
/// | `ATTENDD_OUTBOX_DIR`       | `<workspace>/outbox`   |
/// | `ATTENDD_MAIL_FROM`        | `Attendance Office <attendance@attendd.local>` |
#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub fixed_today: Option<NaiveDate>,
    pub year_start_month: u32,
    pub edit_window_days: i64,
    pub busy_timeout: Duration,
    pub outbox_dir: Option<PathBuf>,
    pub mail_from: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            fixed_today: None,
            year_start_month: DEFAULT_YEAR_START_MONTH,
            edit_window_days: DEFAULT_EDIT_WINDOW_DAYS,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            outbox_dir: None,
            mail_from: DEFAULT_MAIL_FROM.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = Config::default();

        cfg.workspace = get("ATTENDD_WORKSPACE").map(PathBuf::from);
        cfg.outbox_dir = get("ATTENDD_OUTBOX_DIR").map(PathBuf::from);

        if let Some(raw) = get("ATTENDD_MAIL_FROM") {
            raw.parse::<lettre::message::Mailbox>()
                .with_context(|| format!("ATTENDD_MAIL_FROM must be a mail address, got {raw:?}"))?;
            cfg.mail_from = raw;
        }
        if let Some(raw) = get("ATTENDD_TODAY") {
            let d = NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .with_context(|| format!("ATTENDD_TODAY must be YYYY-MM-DD, got {raw:?}"))?;
            cfg.fixed_today = Some(d);
        }
        if let Some(raw) = get("ATTENDD_YEAR_START_MONTH") {
            let m: u32 = raw
                .parse()
                .with_context(|| format!("ATTENDD_YEAR_START_MONTH must be a number, got {raw:?}"))?;
            if !(1..=12).contains(&m) {
                return Err(anyhow!("ATTENDD_YEAR_START_MONTH must be between 1 and 12"));
            }
            cfg.year_start_month = m;
        }
        if let Some(raw) = get("ATTENDD_EDIT_WINDOW_DAYS") {
            let n: i64 = raw
                .parse()
                .with_context(|| format!("ATTENDD_EDIT_WINDOW_DAYS must be a number, got {raw:?}"))?;
            if n < 1 {
                return Err(anyhow!("ATTENDD_EDIT_WINDOW_DAYS must be at least 1"));
            }
            cfg.edit_window_days = n;
        }
        if let Some(raw) = get("ATTENDD_BUSY_TIMEOUT_MS") {
            let ms: u64 = raw
                .parse()
                .with_context(|| format!("ATTENDD_BUSY_TIMEOUT_MS must be a number, got {raw:?}"))?;
            cfg.busy_timeout = Duration::from_millis(ms);
        }
        Ok(cfg)
    }

    pub fn clock(&self) -> Box<dyn Clock> {
        match self.fixed_today {
            Some(d) => Box::new(FixedClock(d)),
            None => Box::new(SystemClock),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let c = cfg(&[]).expect("config");
        assert_eq!(c.year_start_month, 4);
        assert_eq!(c.edit_window_days, 31);
        assert_eq!(c.busy_timeout, Duration::from_millis(5000));
        assert!(c.fixed_today.is_none());
        assert!(c.workspace.is_none());
    }

    #[test]
    fn fixed_today_pins_the_clock() {
        let c = cfg(&[("ATTENDD_TODAY", "2024-03-15"), ("ATTENDD_YEAR_START_MONTH", "6")])
            .expect("config");
        assert_eq!(c.clock().today(), NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(c.year_start_month, 6);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(cfg(&[("ATTENDD_TODAY", "15/03/2024")]).is_err());
        assert!(cfg(&[("ATTENDD_YEAR_START_MONTH", "13")]).is_err());
        assert!(cfg(&[("ATTENDD_EDIT_WINDOW_DAYS", "0")]).is_err());
        assert!(cfg(&[("ATTENDD_MAIL_FROM", "office at school")]).is_err());
    }

    #[test]
    fn mail_from_defaults_and_overrides() {
        assert_eq!(cfg(&[]).expect("config").mail_from, DEFAULT_MAIL_FROM);
        let c = cfg(&[("ATTENDD_MAIL_FROM", "office@school.example")]).expect("config");
        assert_eq!(c.mail_from, "office@school.example");
    }
}
