use std::path::{Path, PathBuf};

use crate::calendar::CampaignCalendar;
use crate::endemic::{demographic_pressure, forecast, relative_susceptibility};
use crate::error::TsirError;
use crate::log::{error, info, set_log_level, warn, LevelFilter};
use crate::panel::{Frequency, TimePanel};
use crate::parameters::{load_parameters, Parameters};
use crate::random::RandomSource;
use crate::report::{
    EnsembleSummaryRow, ModelParameterRow, RelativeSusceptibilityRow, ReportOptions,
    ReportWriter, ScenarioComparisonRow, SeasonalProfileRow, TsirPanelRow,
};
use crate::scenario::{scenario_dates, ScenarioComparator, ScenarioPanel};
use crate::seasonality::{ProfileRegression, SeasonalProfile};
use crate::tsir::{TsirFit, TsirFitter};
use chrono::{Datelike, NaiveDate};
use clap::{Args, Command, FromArgMatches as _};
use indexmap::IndexMap;

/// Default cli arguments for the tsir runner
#[derive(Args, Debug)]
pub struct BaseArgs {
    /// Random seed, overriding the one in the configuration
    #[arg(short, long)]
    pub random_seed: Option<u64>,

    /// Optional path for a JSON parameters file
    #[arg(short, long, default_value = "")]
    pub config: String,

    /// Optional path for report output
    #[arg(short, long, default_value = "")]
    pub output_dir: String,

    /// Optional prefix for report file names
    #[arg(long, default_value = "")]
    pub file_prefix: String,

    /// Replace existing report files
    #[arg(long)]
    pub overwrite: bool,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(short, long)]
    pub log_level: Option<LevelFilter>,
}

#[derive(Args)]
pub struct PlaceholderCustom {}

/// Everything a run needs besides its input data.
#[derive(Debug)]
pub struct RunContext {
    pub parameters: Parameters,
    pub random: RandomSource,
    pub reports: ReportWriter,
}

fn create_tsir_cli() -> Command {
    let cli = Command::new("tsir");
    BaseArgs::augment_args(cli)
}

/// Runs with custom cli arguments.
///
/// # Parameters
/// - `setup_fn`: A function that takes a mutable reference to a `RunContext`, a `BaseArgs`
///   struct and an `Option<A>` where A is the custom cli arguments struct
///
/// # Errors
/// Returns an error if argument parsing, loading parameters or the setup function fails
#[allow(clippy::missing_errors_doc)]
pub fn run_with_custom_args<A, F>(setup_fn: F) -> Result<RunContext, Box<dyn std::error::Error>>
where
    A: Args,
    F: Fn(&mut RunContext, BaseArgs, Option<A>) -> Result<(), TsirError>,
{
    let mut cli = create_tsir_cli();
    cli = A::augment_args(cli);
    let matches = cli.get_matches();

    let base_args_matches = BaseArgs::from_arg_matches(&matches)?;
    let custom_matches = A::from_arg_matches(&matches)?;
    run_with_args_internal(base_args_matches, Some(custom_matches), setup_fn)
}

/// Runs with the default cli arguments.
///
/// # Errors
/// Returns an error if argument parsing, loading parameters or the setup function fails
#[allow(clippy::missing_errors_doc)]
pub fn run_with_args<F>(setup_fn: F) -> Result<RunContext, Box<dyn std::error::Error>>
where
    F: Fn(&mut RunContext, BaseArgs, Option<PlaceholderCustom>) -> Result<(), TsirError>,
{
    let cli = create_tsir_cli();
    let matches = cli.get_matches();

    let base_args_matches = BaseArgs::from_arg_matches(&matches)?;
    run_with_args_internal(base_args_matches, None, setup_fn)
}

fn run_with_args_internal<A, F>(
    args: BaseArgs,
    custom_args: Option<A>,
    setup_fn: F,
) -> Result<RunContext, Box<dyn std::error::Error>>
where
    F: Fn(&mut RunContext, BaseArgs, Option<A>) -> Result<(), TsirError>,
{
    if let Some(level) = args.log_level {
        set_log_level(level);
    }

    // Optionally load parameters from a file
    let parameters = if args.config.is_empty() {
        Parameters::default()
    } else {
        info!("Loading parameters from: {}", args.config);
        load_parameters(Path::new(&args.config))?
    };

    let mut options = ReportOptions::new();
    options.file_prefix(&args.file_prefix).overwrite(args.overwrite);
    if !args.output_dir.is_empty() {
        options.directory(PathBuf::from(&args.output_dir));
    }

    let seed = args.random_seed.unwrap_or(parameters.seed);
    let mut context = RunContext {
        parameters,
        random: RandomSource::new(seed),
        reports: ReportWriter::new(options),
    };

    // Run the provided Fn
    setup_fn(&mut context, args, custom_args)?;
    Ok(context)
}

fn relative_susceptibility_rows(
    parameters: &Parameters,
    panel: &TimePanel,
    profile: &SeasonalProfile,
    calendar: Option<&CampaignCalendar>,
) -> Result<Vec<RelativeSusceptibilityRow>, TsirError> {
    let (months, cases) = panel.monthly_cases();
    let row = |date: &NaiveDate, z: &f64, z_err: &f64, forecast: bool| RelativeSusceptibilityRow {
        region: panel.region().to_string(),
        date: *date,
        z: *z,
        z_err: *z_err,
        forecast,
    };
    let pressure = demographic_pressure(profile, parameters.stability_extent)?;
    let doses = calendar.map_or_else(
        || vec![0.0; months.len()],
        |c| c.monthly_doses(panel.region(), &months),
    );
    let reconstruction = relative_susceptibility(&pressure, &cases, &doses, &profile.residuals)?;
    let mut rows: Vec<RelativeSusceptibilityRow> = months
        .iter()
        .skip(1)
        .zip(reconstruction.z.iter().zip(&reconstruction.z_err))
        .map(|(date, (z, z_err))| row(date, z, z_err, false))
        .collect();

    if let (Some(horizon), Some(last)) = (parameters.horizon_end, months.last()) {
        let future = Frequency::Monthly.range(*last, horizon);
        let future_doses = calendar.map_or_else(
            || vec![0.0; future.len()],
            |c| c.monthly_doses(panel.region(), &future),
        );
        let projected = forecast(&reconstruction, &pressure, &future_doses);
        rows.extend(
            future
                .iter()
                .skip(1)
                .zip(projected.z.iter().zip(&projected.z_err))
                .map(|(date, (z, z_err))| row(date, z, z_err, true)),
        );
    }
    Ok(rows)
}

fn write_seasonality(
    context: &mut RunContext,
    panel: &TimePanel,
    calendar: Option<&CampaignCalendar>,
) -> Result<(), TsirError> {
    let region = panel.region();
    let (months, cases) = panel.monthly_cases();
    let first_month = months.first().map_or(1, Datelike::month);
    let regression = match ProfileRegression::fit(first_month, &[(region, &cases[..])]) {
        Ok(regression) => regression,
        Err(e) => {
            warn!("{region}: no seasonality profile: {e}");
            return Ok(());
        }
    };
    let Some(profile) = regression.profile(region) else {
        return Ok(());
    };
    context.reports.write_all(&SeasonalProfileRow::rows(profile))?;
    match relative_susceptibility_rows(&context.parameters, panel, profile, calendar) {
        Ok(rows) => context.reports.write_all(&rows),
        Err(e) => {
            warn!("{region}: no relative susceptibility: {e}");
            Ok(())
        }
    }
}

fn write_extrapolation(context: &mut RunContext, fit: &TsirFit) -> Result<(), TsirError> {
    let parameters = &context.parameters;
    let Some(horizon) = parameters.horizon_end else {
        return Ok(());
    };
    let baseline = ScenarioPanel::baseline(&fit.panel, horizon);
    let dates = baseline.panel().dates();
    let comparator =
        ScenarioComparator::new(&fit.model, baseline, context.random, parameters.num_samples)
            .with_burden_window(parameters.burden_window_years);
    let ensemble = comparator.run_baseline()?;
    let [low, mid, high] = parameters.percentiles;
    let summary = ensemble.summary(low, mid, high);
    let region = fit.panel.region.as_str();

    let comparisons = match (parameters.scenario_start, parameters.scenario_end) {
        (Some(start), Some(end)) => {
            let candidates =
                scenario_dates(start, end, fit.panel.frequency, parameters.scenario_stride);
            match comparator.compare_against(&ensemble, &candidates) {
                Ok(comparisons) => comparisons,
                Err(e) => {
                    warn!("{region}: skipping scenario comparison: {e}");
                    Vec::new()
                }
            }
        }
        _ => Vec::new(),
    };

    context
        .reports
        .write_all(&EnsembleSummaryRow::rows(region, &dates, &summary))?;
    let rows: Vec<ScenarioComparisonRow> = comparisons
        .iter()
        .map(|c| ScenarioComparisonRow::new(region, c))
        .collect();
    context.reports.write_all(&rows)
}

/// Fits every region, extrapolates past the data and compares campaign scenarios, writing
/// every stage's reports. A region whose data cannot be fit is logged and skipped.
///
/// Returns the number of regions fit.
///
/// # Errors
///
/// Report errors. Fitting errors only skip the region.
pub fn analyze(
    context: &mut RunContext,
    panels: &IndexMap<String, TimePanel>,
    calendar: Option<&CampaignCalendar>,
) -> Result<usize, TsirError> {
    let fitter = TsirFitter::from_parameters(&context.parameters);
    let mut fitted = 0;
    for (region, panel) in panels {
        let panel = match calendar.map(|c| c.apply_to(panel)) {
            Some(Ok(panel)) => panel,
            Some(Err(e)) => {
                error!("{region}: campaign calendar does not fit the panel: {e}");
                continue;
            }
            None => panel.clone(),
        };
        write_seasonality(context, &panel, calendar)?;

        let fit = match fitter.fit(&panel) {
            Ok(fit) => fit,
            Err(e) => {
                error!("{region}: fit failed: {e}");
                continue;
            }
        };
        let rows: Vec<TsirPanelRow> = fit
            .panel
            .rows
            .iter()
            .map(|r| TsirPanelRow::new(region, r))
            .collect();
        context.reports.write_all(&rows)?;
        context.reports.write_all(&ModelParameterRow::rows(&fit))?;
        write_extrapolation(context, &fit)?;
        fitted += 1;
    }
    info!("fit {fitted} of {} regions", panels.len());
    Ok(fitted)
}
