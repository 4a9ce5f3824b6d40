//! Command-line parsing for the beamline scan fitter.
//!
//! Argument parsing lives here; dispatch lives in `app`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "beamfit", version, about = "Beamline scan fitting: peaks, edges and statistics")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit a model (plus optional backgrounds) to a recorded scan.
    Fit(FitArgs),
    /// Compute fit-free statistics (max, min, COM, HM, HMi) of a recorded scan.
    Stat(StatArgs),
    /// Locate a falling edge in a recorded scan.
    Edge(EdgeArgs),
    /// Summarize a recorded line profile: peak, COM, and width/center from level crossings.
    Profile(ProfileArgs),
    /// Run a simulated scan-and-move against a synthetic peak or edge.
    Simulate(SimulateArgs),
    /// Repeat a noisy simulated scan many times and report how well the feature is recovered.
    Survey(SurveyArgs),
}

/// Where the scan data comes from.
#[derive(Debug, Args, Clone)]
pub struct InputArgs {
    /// Scan CSV with a header row.
    #[arg(short, long, value_name = "CSV")]
    pub input: PathBuf,

    /// Position column (default: first column).
    #[arg(long = "x-col")]
    pub x_col: Option<String>,

    /// Reading column (default: second column).
    #[arg(long = "y-col")]
    pub y_col: Option<String>,
}

/// Least-squares and quality settings shared by all fitting commands.
#[derive(Debug, Args, Clone)]
pub struct TuningArgs {
    /// Average relative deviation above which a fit is reported as poor.
    #[arg(long, env = "BEAMFIT_BAD_FIT_THRESHOLD", default_value_t = 0.06)]
    pub bad_fit_threshold: f64,

    /// Iteration budget per least-squares stage.
    #[arg(long, default_value_t = 200)]
    pub max_iterations: usize,
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Primary model (gauss, lorentz, doublesigmoid, square, sigmoid, sigmoid_r, step, step_r,
    /// tanh, tanh_r, erf, erf_r, constant, linear; aliases like `gaussian` are accepted).
    #[arg(short, long, default_value = "gauss")]
    pub model: String,

    /// Background component added to the model (repeatable).
    #[arg(short, long = "background")]
    pub backgrounds: Vec<String>,

    /// Write the result as JSON.
    #[arg(long)]
    pub export: Option<PathBuf>,

    #[command(flatten)]
    pub tuning: TuningArgs,
}

#[derive(Debug, Args, Clone)]
pub struct StatArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Statistic to compute (repeatable; the last one sets the reported position).
    #[arg(short, long = "stat", required = true)]
    pub stats: Vec<String>,

    /// Write the result as JSON.
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct EdgeArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub edge: EdgeTuningArgs,

    /// Write the result as JSON.
    #[arg(long)]
    pub export: Option<PathBuf>,

    #[command(flatten)]
    pub tuning: TuningArgs,
}

#[derive(Debug, Args, Clone)]
pub struct ProfileArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Normalized level (between 0 and 1) the crossings are taken at.
    #[arg(long, default_value_t = crate::stats::DEFAULT_SHIFT)]
    pub shift: f64,

    /// Analyze the point-to-point difference of the readings.
    #[arg(long, visible_alias = "der")]
    pub derivative: bool,

    /// Write the result as JSON.
    #[arg(long)]
    pub export: Option<PathBuf>,

    #[command(flatten)]
    pub tuning: TuningArgs,
}

#[derive(Debug, Args, Clone)]
pub struct EdgeTuningArgs {
    /// Starting edge width (clamped into the span-derived bounds).
    #[arg(long, default_value_t = 0.014)]
    pub sigma_guess: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResponseKind {
    Peak,
    Edge,
}

/// The synthetic rig and scan geometry.
#[derive(Debug, Args, Clone)]
pub struct SimArgs {
    /// Shape of the synthetic signal.
    #[arg(long, value_enum, default_value_t = ResponseKind::Peak)]
    pub response: ResponseKind,

    /// True feature position (default: -40 for a peak, -17 for an edge).
    #[arg(long, allow_hyphen_values = true)]
    pub center: Option<f64>,

    /// Feature width (Gaussian sigma or edge sigma; default: 0.1 peak, 0.05 edge).
    #[arg(long)]
    pub width: Option<f64>,

    /// Signal amplitude in counts.
    #[arg(long, default_value_t = 1000.0)]
    pub amplitude: f64,

    /// Flat background in counts.
    #[arg(long, default_value_t = 10.0)]
    pub background: f64,

    /// Motor position before the scan (default: 0.1 above the center).
    #[arg(long, allow_hyphen_values = true)]
    pub start: Option<f64>,

    /// Total scan width, centered on the start position.
    #[arg(long, default_value_t = 1.0, conflicts_with = "range")]
    pub span: f64,

    /// Scan from START+LO to START+HI instead of a centered span.
    #[arg(long, num_args = 2, value_names = ["LO", "HI"], allow_hyphen_values = true)]
    pub range: Option<Vec<f64>>,

    /// Number of scan points.
    #[arg(short, long, default_value_t = 11)]
    pub num: usize,

    /// Fit this model after the scan (a statistic name works too).
    #[arg(long, conflicts_with_all = ["stats", "edge"])]
    pub fit: Option<String>,

    /// Background component for `--fit` (repeatable).
    #[arg(long = "background-model")]
    pub backgrounds: Vec<String>,

    /// Compute this statistic after the scan (repeatable).
    #[arg(long = "stat", conflicts_with = "edge")]
    pub stats: Vec<String>,

    /// Run the edge-optimized fit after the scan.
    #[arg(long)]
    pub edge: bool,

    /// Seed for the counting noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Disable counting noise.
    #[arg(long)]
    pub no_noise: bool,

    #[command(flatten)]
    pub edge_tuning: EdgeTuningArgs,

    #[command(flatten)]
    pub tuning: TuningArgs,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub sim: SimArgs,

    /// Print live statistics every N points (with `--stat`).
    #[arg(long)]
    pub update_every: Option<usize>,

    /// Save the acquired scan as CSV.
    #[arg(long)]
    pub save_csv: Option<PathBuf>,

    /// Write the analysis result as JSON.
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct SurveyArgs {
    #[command(flatten)]
    pub sim: SimArgs,

    /// Number of independent noisy scans.
    #[arg(short, long, default_value_t = 100)]
    pub trials: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn fit_command_collects_backgrounds() {
        let cli = Cli::try_parse_from([
            "beamfit", "fit", "-i", "scan.csv", "--model", "gaussian", "-b", "constant", "-b", "linear",
        ])
        .unwrap();
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.model, "gaussian");
        assert_eq!(args.backgrounds, vec!["constant", "linear"]);
        assert_eq!(args.input.input, PathBuf::from("scan.csv"));
    }

    #[test]
    fn simulate_accepts_negative_ranges() {
        let cli = Cli::try_parse_from([
            "beamfit", "simulate", "--response", "edge", "--range", "-0.5", "0.5", "--edge", "--start", "-17.1",
        ])
        .unwrap();
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.sim.range, Some(vec![-0.5, 0.5]));
        assert_eq!(args.sim.start, Some(-17.1));
        assert!(args.sim.edge);
        assert_eq!(args.sim.response, ResponseKind::Edge);
    }

    #[test]
    fn profile_defaults_to_half_level() {
        let cli = Cli::try_parse_from(["beamfit", "profile", "-i", "scan.csv"]).unwrap();
        let Command::Profile(args) = cli.command else {
            panic!("expected profile");
        };
        assert_eq!(args.shift, 0.5);
        assert!(!args.derivative);

        let cli = Cli::try_parse_from(["beamfit", "profile", "-i", "scan.csv", "--der", "--shift", "0.3"]).unwrap();
        let Command::Profile(args) = cli.command else {
            panic!("expected profile");
        };
        assert!(args.derivative);
        assert_eq!(args.shift, 0.3);
    }

    #[test]
    fn stat_requires_a_statistic() {
        assert!(Cli::try_parse_from(["beamfit", "stat", "-i", "scan.csv"]).is_err());
    }
}
