//! Campaign calendars.
//!
//! The campaign calendar is plain data: one record per supplementary immunization activity
//! with its start date and the doses it delivered (or targeted). Fractions are relative to
//! the largest campaign in the same region, so the biggest campaign gets fraction 1 and the
//! fitter learns per-campaign efficacies on top of that.

use crate::error::TsirError;
use crate::panel::{nearest_index, TimePanel};
use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub region: String,
    pub date: NaiveDate,
    pub doses: Option<f64>,
}

#[derive(Clone, Debug, Default)]
pub struct CampaignCalendar {
    campaigns: IndexMap<String, Vec<CampaignRecord>>,
}

impl CampaignCalendar {
    /// Groups records by region, dropping records without a dose count.
    #[must_use]
    pub fn new(records: impl IntoIterator<Item = CampaignRecord>) -> Self {
        let mut campaigns: IndexMap<String, Vec<CampaignRecord>> = IndexMap::new();
        for record in records {
            if record.doses.is_none() {
                warn!("dropping {} campaign on {} with no doses", record.region, record.date);
                continue;
            }
            campaigns
                .entry(record.region.clone())
                .or_default()
                .push(record);
        }
        for records in campaigns.values_mut() {
            records.sort_by_key(|r| r.date);
        }
        CampaignCalendar { campaigns }
    }

    /// Reads a `region,date,doses` CSV.
    ///
    /// # Errors
    ///
    /// I/O and CSV parse errors.
    pub fn from_csv(path: &Path) -> Result<Self, TsirError> {
        let mut reader = csv::Reader::from_path(path)?;
        let records = reader
            .deserialize()
            .collect::<Result<Vec<CampaignRecord>, csv::Error>>()?;
        Ok(CampaignCalendar::new(records))
    }

    #[must_use]
    pub fn campaigns(&self, region: &str) -> &[CampaignRecord] {
        self.campaigns.get(region).map_or(&[], Vec::as_slice)
    }

    /// Campaign fraction for each of `dates`: `doses / max doses` in the region, with each
    /// campaign placed on the grid date nearest its start. When two campaigns land on the
    /// same date the later record wins.
    #[must_use]
    pub fn target_fractions(&self, region: &str, dates: &[NaiveDate]) -> Vec<f64> {
        let mut fractions = vec![0.0; dates.len()];
        let campaigns = self.campaigns(region);
        let max_doses = campaigns
            .iter()
            .filter_map(|c| c.doses)
            .fold(0.0_f64, f64::max);
        if dates.is_empty() || max_doses <= 0.0 {
            return fractions;
        }
        for campaign in campaigns {
            let Some(doses) = campaign.doses else {
                continue;
            };
            let index = nearest_index(dates, campaign.date);
            fractions[index] = doses / max_doses;
        }
        debug!(
            "{region}: {} campaigns mapped onto {} grid dates",
            campaigns.len(),
            dates.len()
        );
        fractions
    }

    /// Writes this calendar's fractions into the panel's campaign column.
    ///
    /// # Errors
    ///
    /// `InputShapeError` if the resulting panel fails validation.
    pub fn apply_to(&self, panel: &TimePanel) -> Result<TimePanel, TsirError> {
        let fractions = self.target_fractions(panel.region(), &panel.dates());
        panel.with_target_fractions(&fractions)
    }

    /// Campaign doses (in millions) summed by calendar month and aligned to `dates`, which
    /// are expected on the monthly grid. Dates without a campaign get zero.
    #[must_use]
    pub fn monthly_doses(&self, region: &str, dates: &[NaiveDate]) -> Vec<f64> {
        dates
            .iter()
            .map(|d| {
                self.campaigns(region)
                    .iter()
                    .filter(|c| c.date.year() == d.year() && c.date.month() == d.month())
                    .filter_map(|c| c.doses)
                    .sum::<f64>()
                    / 1.0e6
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::panel::{Frequency, PanelRow};
    use crate::assert_almost_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn calendar() -> CampaignCalendar {
        CampaignCalendar::new(vec![
            CampaignRecord {
                region: "niger".to_string(),
                date: date(2012, 3, 15),
                doses: Some(2.0e6),
            },
            CampaignRecord {
                region: "niger".to_string(),
                date: date(2010, 11, 2),
                doses: Some(4.0e6),
            },
            CampaignRecord {
                region: "niger".to_string(),
                date: date(2011, 1, 1),
                doses: None,
            },
            CampaignRecord {
                region: "mali".to_string(),
                date: date(2011, 6, 15),
                doses: Some(1.0e5),
            },
        ])
    }

    #[test]
    fn fractions_are_relative_to_largest_campaign() {
        let dates = Frequency::SemiMonthly.range(date(2010, 1, 1), date(2012, 12, 31));
        let fractions = calendar().target_fractions("niger", &dates);
        let nonzero: Vec<(NaiveDate, f64)> = dates
            .iter()
            .zip(&fractions)
            .filter(|(_, f)| **f > 0.0)
            .map(|(d, f)| (*d, *f))
            .collect();
        assert_eq!(nonzero.len(), 2);
        // 2010-11-02 is closest to 2010-10-31
        assert_eq!(nonzero[0], (date(2010, 10, 31), 1.0));
        assert_eq!(nonzero[1], (date(2012, 3, 15), 0.5));

        assert!(calendar()
            .target_fractions("chad", &dates)
            .iter()
            .all(|f| *f == 0.0));
    }

    #[test]
    fn apply_to_panel_and_monthly_doses() {
        let dates = Frequency::Monthly.range(date(2011, 1, 1), date(2011, 12, 31));
        let rows = dates
            .iter()
            .map(|d| PanelRow {
                date: *d,
                cases: Some(1.0),
                adjusted_births: 10.0,
                target_fraction: 0.0,
            })
            .collect();
        let panel = TimePanel::new("mali", Frequency::Monthly, rows).unwrap();
        let applied = calendar().apply_to(&panel).unwrap();
        assert_eq!(applied.target_fractions()[5], 1.0);
        assert_eq!(applied.target_fractions().iter().sum::<f64>(), 1.0);

        let doses = calendar().monthly_doses("mali", &dates);
        assert_almost_eq!(doses[5], 0.1, 1e-12);
        assert_almost_eq!(doses.iter().sum::<f64>(), 0.1, 1e-12);
    }
}
