use crate::error::{DecodeError, DecodeResult};
use clap::{parser::ValueSource, ArgMatches, Args};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Args, Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    #[command(flatten)]
    pub logmath: LogMathParams,
    #[command(flatten)]
    pub acoustic: AcousticParams,
    #[command(flatten)]
    pub search: PhoneLoopParams,
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogMathParams {
    #[arg(long, default_value_t = 1.0001)]
    pub logbase: f64,
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub use_table: bool,
}

impl Default for LogMathParams {
    fn default() -> Self {
        Self {
            logbase: 1.0001,
            use_table: true,
        }
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcousticParams {
    // Gaussians kept per codebook per stream
    #[arg(long, default_value_t = 4)]
    pub topn: usize,
    // Full codebook evaluation every Nth frame
    #[arg(long, default_value_t = 1)]
    pub ds_ratio: usize,
    #[arg(long, default_value_t = 0.0001)]
    pub tmatfloor: f32,
    #[arg(long, default_value_t = 0.000_000_1)]
    pub mixwfloor: f32,
    #[arg(long, default_value_t = 0.0001)]
    pub varfloor: f32,
    #[arg(long, default_value_t = false)]
    pub varnorm: bool,
    #[arg(long, default_value_t = false)]
    pub compallsen: bool,
}

impl Default for AcousticParams {
    fn default() -> Self {
        Self {
            topn: 4,
            ds_ratio: 1,
            tmatfloor: 0.0001,
            mixwfloor: 0.000_000_1,
            varfloor: 0.0001,
            varnorm: false,
            compallsen: false,
        }
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneLoopParams {
    /// Pruning beam, as a probability ratio.
    #[arg(long, default_value_t = 1e-10)]
    pub pl_beam: f64,
    /// Beam for exiting a phone into the rest of the loop.
    #[arg(long, default_value_t = 1e-10)]
    pub pl_pbeam: f64,
    /// Phone insertion penalty.
    #[arg(long, default_value_t = 1.0)]
    pub pl_pip: f64,
    /// Weight applied to stored phone penalties.
    #[arg(long, default_value_t = 3.0)]
    pub pl_weight: f64,
    /// Frames in the penalty smoothing window.
    #[arg(long, default_value_t = 5)]
    pub pl_window: usize,
}

impl Default for PhoneLoopParams {
    fn default() -> Self {
        Self {
            pl_beam: 1e-10,
            pl_pbeam: 1e-10,
            pl_pip: 1.0,
            pl_weight: 3.0,
            pl_window: 5,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> DecodeResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DecodeResult<()> {
        if self.logmath.logbase <= 1.0 {
            return Err(DecodeError::Config(format!(
                "logbase must be greater than 1.0, got {}",
                self.logmath.logbase
            )));
        }
        if self.acoustic.ds_ratio == 0 {
            return Err(DecodeError::Config("ds_ratio must be at least 1".into()));
        }
        if self.acoustic.topn == 0 {
            return Err(DecodeError::Config("topn must be at least 1".into()));
        }
        self.search.validate()
    }

    /// Overlays values the user explicitly passed on the command line onto a
    /// configuration loaded from a file.
    pub fn merge_from_cli(&mut self, cli: &Config, matches: &ArgMatches) {
        macro_rules! update_if_present {
            ($group:ident . $field:ident) => {
                if matches.value_source(stringify!($field)) == Some(ValueSource::CommandLine) {
                    self.$group.$field = cli.$group.$field.clone();
                }
            };
        }

        update_if_present!(logmath.logbase);
        update_if_present!(logmath.use_table);

        update_if_present!(acoustic.topn);
        update_if_present!(acoustic.ds_ratio);
        update_if_present!(acoustic.tmatfloor);
        update_if_present!(acoustic.mixwfloor);
        update_if_present!(acoustic.varfloor);
        update_if_present!(acoustic.varnorm);
        update_if_present!(acoustic.compallsen);

        update_if_present!(search.pl_beam);
        update_if_present!(search.pl_pbeam);
        update_if_present!(search.pl_pip);
        update_if_present!(search.pl_weight);
        update_if_present!(search.pl_window);
    }
}

impl PhoneLoopParams {
    pub fn validate(&self) -> DecodeResult<()> {
        if self.pl_window == 0 {
            return Err(DecodeError::Config("pl_window must be at least 1".into()));
        }
        if !(self.pl_weight > 0.0) {
            return Err(DecodeError::Config(format!(
                "pl_weight must be positive, got {}",
                self.pl_weight
            )));
        }
        for (name, p) in [
            ("pl_beam", self.pl_beam),
            ("pl_pbeam", self.pl_pbeam),
            ("pl_pip", self.pl_pip),
        ] {
            if !(p > 0.0 && p <= 1.0) {
                return Err(DecodeError::Config(format!(
                    "{} must be a probability in (0, 1], got {}",
                    name, p
                )));
            }
        }
        Ok(())
    }
}
