//! Configuration loading and typed config structures for Tundra runs.
//!
//! The canonical configuration lives in `tundra-config.yaml` at the project
//! root. [`TundraConfig`] mirrors the YAML structure; every field has a
//! default so a partial (or empty) file is valid.
//!
//! A run never reads [`TundraConfig`] directly. [`StageConfig::from_config`]
//! validates it once, applies the mode and init-mode rules, and produces
//! the value the scheduler and coordinator borrow for the whole run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;
use tundra_types::{CohortId, Stage};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but describes an impossible run.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

impl ConfigError {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

/// How cohorts are selected and outputs are routed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// One cohort, site-level daily/monthly/yearly outputs.
    #[default]
    Site,
    /// A roster of cohorts, region-summary outputs.
    Regional,
    /// Spatially explicit regional run. Not supported.
    RegionalSpatial,
}

/// Where a cohort's initial state comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitMode {
    /// Default parameters and state.
    #[default]
    Lookup,
    /// Site-specific initial state. Reserved; runs as `lookup`.
    Sitein,
    /// State snapshot from the restart dataset.
    Restart,
}

/// Top-level run configuration.
///
/// Mirrors the structure of `tundra-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TundraConfig {
    /// Mode, case name, cohort selection, stages.
    #[serde(default)]
    pub run: RunConfig,

    /// Input dataset locations.
    #[serde(default)]
    pub inputs: InputsConfig,

    /// Stage year ranges and equilibrium sizing.
    #[serde(default)]
    pub time: TimeConfig,

    /// Driving-data switches.
    #[serde(default)]
    pub driving: DrivingConfig,

    /// Output location and enabled granularities.
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TundraConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `TUNDRA_INPUT_DIR` overrides both `inputs.grid_dir` and
    ///   `inputs.cohort_dir`
    /// - `TUNDRA_OUTPUT_DIR` overrides `output.dir`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("TUNDRA_INPUT_DIR") {
            self.inputs.grid_dir = PathBuf::from(&val);
            self.inputs.cohort_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("TUNDRA_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(val);
        }
    }
}

/// Run selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunConfig {
    /// Run mode.
    #[serde(default)]
    pub mode: RunMode,

    /// Case name, used to label outputs.
    #[serde(default = "default_case_name")]
    pub case_name: String,

    /// Cohort simulated in site mode.
    #[serde(default)]
    pub site_cohort: Option<CohortId>,

    /// Initialization mode.
    #[serde(default)]
    pub init_mode: InitMode,

    /// Stages to run. Order in the file does not matter.
    #[serde(default = "default_stages")]
    pub stages: Vec<Stage>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            case_name: default_case_name(),
            site_cohort: None,
            init_mode: InitMode::default(),
            stages: default_stages(),
        }
    }
}

/// Input dataset locations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InputsConfig {
    /// Directory holding grid, drainage, soil and fire-statistics datasets.
    #[serde(default = "default_input_dir")]
    pub grid_dir: PathBuf,

    /// Directory holding cohort, climate, vegetation and fire datasets.
    #[serde(default = "default_input_dir")]
    pub cohort_dir: PathBuf,

    /// Restart dataset (restart initialization only).
    #[serde(default)]
    pub restart_file: Option<PathBuf>,

    /// Regional roster of cohort ids.
    #[serde(default)]
    pub run_list_file: Option<PathBuf>,

    /// Directory holding region-wide inputs (`co2.json`). Defaults to
    /// `grid_dir`.
    #[serde(default)]
    pub region_dir: Option<PathBuf>,
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            grid_dir: default_input_dir(),
            cohort_dir: default_input_dir(),
            restart_file: None,
            run_list_file: None,
            region_dir: None,
        }
    }
}

/// An inclusive range of calendar years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct YearRange {
    /// First calendar year.
    pub begin: i32,
    /// Last calendar year (inclusive).
    pub end: i32,
}

impl YearRange {
    /// Create a range.
    pub const fn new(begin: i32, end: i32) -> Self {
        Self { begin, end }
    }

    /// Number of years in the range (0 when `end < begin`).
    pub fn years(self) -> usize {
        self.end
            .checked_sub(self.begin)
            .and_then(|d| d.checked_add(1))
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0)
    }
}

/// Stage timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimeConfig {
    /// Spin-up calendar years.
    #[serde(default = "default_spinup")]
    pub spinup: YearRange,

    /// Transient calendar years.
    #[serde(default = "default_transient")]
    pub transient: YearRange,

    /// Scenario calendar years.
    #[serde(default = "default_scenario")]
    pub scenario: YearRange,

    /// Lower bound on equilibrium length.
    #[serde(default = "default_min_equilibrium_years")]
    pub min_equilibrium_years: i32,

    /// Upper bound on equilibrium length.
    #[serde(default = "default_max_equilibrium_years")]
    pub max_equilibrium_years: i32,

    /// Nominal driving-data horizon for equilibrium and spin-up.
    #[serde(default = "default_nominal_horizon")]
    pub nominal_horizon: usize,

    /// Last year of the environment-only pre-pass (runs from year 0).
    #[serde(default = "default_prepass_end_year")]
    pub prepass_end_year: i32,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            spinup: default_spinup(),
            transient: default_transient(),
            scenario: default_scenario(),
            min_equilibrium_years: default_min_equilibrium_years(),
            max_equilibrium_years: default_max_equilibrium_years(),
            nominal_horizon: default_nominal_horizon(),
            prepass_end_year: default_prepass_end_year(),
        }
    }
}

/// Driving-data switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DrivingConfig {
    /// Force year-to-year climate variation on or off after equilibrium.
    #[serde(default)]
    pub change_climate: Option<bool>,

    /// Force rising CO2 on or off after equilibrium.
    #[serde(default)]
    pub change_co2: Option<bool>,

    /// Read fire severity from the fire dataset.
    #[serde(default)]
    pub use_severity: bool,
}

/// Output configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct OutputConfig {
    /// Directory the engine writes outputs to.
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    /// First calendar year written. Unset means every year is written.
    #[serde(default)]
    pub start_year: Option<i32>,

    /// Site daily output.
    #[serde(default)]
    pub daily: bool,

    /// Site monthly output.
    #[serde(default)]
    pub monthly: bool,

    /// Site yearly output.
    #[serde(default = "default_true")]
    pub yearly: bool,

    /// Variables written to region rows. Unset writes every variable.
    #[serde(default)]
    pub region_variables: Option<Vec<String>>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            start_year: None,
            daily: false,
            monthly: false,
            yearly: true,
            region_variables: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validated per-run configuration
// ---------------------------------------------------------------------------

/// Bounds on the length of the equilibrium full pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EquilibriumBounds {
    /// Minimum years.
    pub min_years: i32,
    /// Maximum years.
    pub max_years: i32,
}

/// Which output granularities are routed to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct OutputFlags {
    /// Per-day site output.
    pub daily: bool,
    /// Per-month site output.
    pub monthly: bool,
    /// Per-year site output.
    pub yearly: bool,
    /// Per-year region summary.
    pub region: bool,
    /// First output calendar year, if limited.
    pub start_year: Option<i32>,
}

/// The immutable, validated configuration of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageConfig {
    /// Run mode.
    pub mode: RunMode,
    /// Case name.
    pub case_name: String,
    /// Effective initialization mode.
    pub init_mode: InitMode,
    /// Enabled stages, sorted and without repeats.
    pub stages: Vec<Stage>,
    /// Spin-up calendar years.
    pub spinup: YearRange,
    /// Transient calendar years.
    pub transient: YearRange,
    /// Scenario calendar years.
    pub scenario: YearRange,
    /// Equilibrium length bounds.
    pub equilibrium: EquilibriumBounds,
    /// Last year of the equilibrium pre-pass.
    pub prepass_end_year: i32,
    /// Nominal driving horizon.
    pub nominal_horizon: usize,
    /// Post-equilibrium climate-variation override.
    pub change_climate: Option<bool>,
    /// Post-equilibrium CO2 override.
    pub change_co2: Option<bool>,
    /// Whether fire severity is decoded.
    pub use_severity: bool,
    /// Output routing.
    pub output: OutputFlags,
    /// Variables kept in region rows (`None` keeps all).
    pub region_variables: Option<Vec<String>>,
}

impl StageConfig {
    /// Validate a loaded configuration and derive the run configuration.
    ///
    /// `restart` initialization with equilibrium enabled is downgraded to
    /// `lookup`, and `sitein` always runs as `lookup`; both log a warning.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a stage range is reversed, the
    /// equilibrium bounds are not positive and ordered, the horizon is
    /// zero, no stage is enabled, a file the mode needs is not set, or the
    /// region variable list is empty.
    pub fn from_config(config: &TundraConfig) -> Result<Self, ConfigError> {
        let mut stages = config.run.stages.clone();
        stages.sort();
        stages.dedup();
        if stages.is_empty() {
            return Err(ConfigError::invalid("no stages enabled"));
        }

        let time = &config.time;
        for (name, range) in [
            ("spinup", time.spinup),
            ("transient", time.transient),
            ("scenario", time.scenario),
        ] {
            if range.begin > range.end {
                return Err(ConfigError::invalid(format!(
                    "{name} begins in {} but ends in {}",
                    range.begin, range.end
                )));
            }
        }
        if time.min_equilibrium_years <= 0 || time.min_equilibrium_years > time.max_equilibrium_years
        {
            return Err(ConfigError::invalid(format!(
                "equilibrium bounds must satisfy 0 < min <= max, got {}..{}",
                time.min_equilibrium_years, time.max_equilibrium_years
            )));
        }
        if time.nominal_horizon == 0 {
            return Err(ConfigError::invalid("nominal_horizon must be at least 1"));
        }
        if time.prepass_end_year < 0 {
            return Err(ConfigError::invalid("prepass_end_year must not be negative"));
        }

        let init_mode = effective_init_mode(config.run.init_mode, &stages);
        if init_mode == InitMode::Restart && config.inputs.restart_file.is_none() {
            return Err(ConfigError::invalid(
                "restart initialization requires inputs.restart_file",
            ));
        }

        match config.run.mode {
            RunMode::Site if config.run.site_cohort.is_none() => {
                return Err(ConfigError::invalid("site mode requires run.site_cohort"));
            }
            RunMode::Regional if config.inputs.run_list_file.is_none() => {
                return Err(ConfigError::invalid(
                    "regional mode requires inputs.run_list_file",
                ));
            }
            _ => {}
        }

        if config
            .output
            .region_variables
            .as_ref()
            .is_some_and(Vec::is_empty)
        {
            return Err(ConfigError::invalid(
                "output.region_variables must name at least one variable",
            ));
        }

        let site = config.run.mode == RunMode::Site;
        let output = OutputFlags {
            daily: site && config.output.daily,
            monthly: site && config.output.monthly,
            yearly: site && config.output.yearly,
            region: !site,
            start_year: config.output.start_year,
        };

        Ok(Self {
            mode: config.run.mode,
            case_name: config.run.case_name.clone(),
            init_mode,
            stages,
            spinup: time.spinup,
            transient: time.transient,
            scenario: time.scenario,
            equilibrium: EquilibriumBounds {
                min_years: time.min_equilibrium_years,
                max_years: time.max_equilibrium_years,
            },
            prepass_end_year: time.prepass_end_year,
            nominal_horizon: time.nominal_horizon,
            change_climate: config.driving.change_climate,
            change_co2: config.driving.change_co2,
            use_severity: config.driving.use_severity,
            output,
            region_variables: config.output.region_variables.clone(),
        })
    }

    /// Calendar years of a post-equilibrium stage (`None` for equilibrium,
    /// whose length depends on the cohort's fire regime).
    pub const fn stage_range(&self, stage: Stage) -> Option<YearRange> {
        match stage {
            Stage::Equilibrium => None,
            Stage::Spinup => Some(self.spinup),
            Stage::Transient => Some(self.transient),
            Stage::Scenario => Some(self.scenario),
        }
    }

    /// Whether cohorts are seeded from the restart dataset.
    pub fn uses_restart(&self) -> bool {
        self.init_mode == InitMode::Restart
    }
}

fn effective_init_mode(requested: InitMode, stages: &[Stage]) -> InitMode {
    match requested {
        InitMode::Restart if stages.contains(&Stage::Equilibrium) => {
            warn!("Restart initialization cannot precede equilibrium; using lookup");
            InitMode::Lookup
        }
        InitMode::Sitein => {
            warn!("Sitein initialization is not supported; using lookup");
            InitMode::Lookup
        }
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_case_name() -> String {
    "tundra".to_owned()
}

fn default_stages() -> Vec<Stage> {
    Stage::ALL.to_vec()
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("demos/site")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

const fn default_spinup() -> YearRange {
    YearRange::new(1001, 1900)
}

const fn default_transient() -> YearRange {
    YearRange::new(1901, 2006)
}

const fn default_scenario() -> YearRange {
    YearRange::new(2007, 2100)
}

const fn default_min_equilibrium_years() -> i32 {
    2000
}

const fn default_max_equilibrium_years() -> i32 {
    20_000
}

const fn default_nominal_horizon() -> usize {
    30
}

const fn default_prepass_end_year() -> i32 {
    100
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}
