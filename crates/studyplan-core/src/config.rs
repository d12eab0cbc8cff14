use chrono::Weekday;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WORK_START_HOUR: u32 = 9;
pub const DEFAULT_WORK_END_HOUR: u32 = 17;
pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const DEFAULT_OVERLOAD_THRESHOLD_HOURS: f64 = 40.0;
pub const DEFAULT_HORIZON_DAYS: i64 = 7;

/// Top-level config (studyplan.toml + STUDYPLAN_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudyplanConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl DatabaseConfig {
    /// Create the directory holding the database file if it is missing.
    pub fn ensure_parent_dir(&self) -> crate::error::Result<()> {
        if let Some(parent) = std::path::Path::new(&self.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

/// Order applied to tasks that tie on priority and deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    /// Most recently created task goes first.
    #[default]
    NewestFirst,
    /// Oldest task goes first.
    OldestFirst,
}

/// Work window and capacity settings used by the scheduling engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// First hour (local to `timezone`) a slot may start.
    #[serde(default = "default_work_start_hour")]
    pub work_start_hour: u32,
    /// Hour (local to `timezone`) by which every slot must have ended.
    #[serde(default = "default_work_end_hour")]
    pub work_end_hour: u32,
    /// IANA timezone name the work hours are expressed in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Days of the week slots may be placed on.
    #[serde(default = "default_working_days")]
    pub working_days: Vec<Weekday>,
    /// Weekly hours above which a week counts as overloaded.
    #[serde(default = "default_overload_threshold")]
    pub overload_threshold_hours: f64,
    /// Days covered by an auto-schedule run when no end is given.
    #[serde(default = "default_horizon_days")]
    pub horizon_days: i64,
    #[serde(default)]
    pub tie_break: TieBreak,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            work_start_hour: DEFAULT_WORK_START_HOUR,
            work_end_hour: DEFAULT_WORK_END_HOUR,
            timezone: default_timezone(),
            working_days: default_working_days(),
            overload_threshold_hours: DEFAULT_OVERLOAD_THRESHOLD_HOURS,
            horizon_days: DEFAULT_HORIZON_DAYS,
            tie_break: TieBreak::default(),
        }
    }
}

fn default_work_start_hour() -> u32 {
    DEFAULT_WORK_START_HOUR
}
fn default_work_end_hour() -> u32 {
    DEFAULT_WORK_END_HOUR
}
fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}
fn default_working_days() -> Vec<Weekday> {
    vec![
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ]
}
fn default_overload_threshold() -> f64 {
    DEFAULT_OVERLOAD_THRESHOLD_HOURS
}
fn default_horizon_days() -> i64 {
    DEFAULT_HORIZON_DAYS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.studyplan/studyplan.db", home)
}

impl StudyplanConfig {
    /// Load config from a TOML file with STUDYPLAN_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `STUDYPLAN_PLANNER__WORK_START_HOUR=8`. A missing file is not an
    /// error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: StudyplanConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("STUDYPLAN_").split("__"))
            .extract()
            .map_err(|e| crate::error::StudyplanError::Config(e.to_string()))?;

        tracing::debug!(%path, "configuration loaded");
        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.studyplan/studyplan.toml", home)
}
