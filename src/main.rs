use clap::Args;
use std::path::PathBuf;
use tsir::panel::load_panels;
use tsir::runner::{analyze, run_with_custom_args};
use tsir::{error, CampaignCalendar, TsirError};

#[derive(Args, Debug)]
struct InputArgs {
    /// Long-format panel CSV: region,date,cases,adjusted_births,target_fraction
    #[arg(long)]
    panels: PathBuf,

    /// Campaign calendar CSV: region,date,doses
    #[arg(long)]
    campaigns: Option<PathBuf>,
}

fn main() {
    let result = run_with_custom_args(|context, _, inputs: Option<InputArgs>| {
        let inputs = inputs.ok_or_else(|| TsirError::from("missing input arguments"))?;
        let panels = load_panels(&inputs.panels, context.parameters.frequency)?;
        let calendar = inputs
            .campaigns
            .as_deref()
            .map(CampaignCalendar::from_csv)
            .transpose()?;
        let fitted = analyze(context, &panels, calendar.as_ref())?;
        if fitted == 0 {
            return Err(TsirError::from("no region could be fit"));
        }
        Ok(())
    });
    if let Err(e) = result {
        error!("{e}");
        eprintln!("tsir: {e}");
        std::process::exit(1);
    }
}
