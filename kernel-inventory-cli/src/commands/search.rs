//! `kinv search`

use clap::Args;
use kernel_inventory::{Database, KernelType, Quality, SearchQuery};

use super::common::{parse_list, print_json, resolve_settings, PathOverrides};
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Mission or instrument name (repeatable)
    #[arg(short, long = "name", required = true)]
    names: Vec<String>,

    /// Kernel type, e.g. ck, spk, fk (repeatable or comma-separated); all types by default
    #[arg(short, long = "type")]
    types: Vec<String>,

    /// Start time, ephemeris seconds past J2000
    #[arg(long, allow_hyphen_values = true)]
    start: Option<f64>,

    /// Stop time, ephemeris seconds past J2000
    #[arg(long, allow_hyphen_values = true)]
    stop: Option<f64>,

    /// CK quality tiers in preference order
    #[arg(long = "ck-quality")]
    ck_qualities: Vec<String>,

    /// SPK quality tiers in preference order
    #[arg(long = "spk-quality")]
    spk_qualities: Vec<String>,

    /// Print absolute paths
    #[arg(long)]
    full_path: bool,

    /// Keep only the last N matching CKs (0 for all)
    #[arg(long, default_value_t = 0)]
    limit_ck: usize,

    /// Keep only the last N matching SPKs (0 for all)
    #[arg(long, default_value_t = 0)]
    limit_spk: usize,

    /// Replace fields instead of unioning them when merging results across names
    #[arg(long)]
    overwrite: bool,
}

impl SearchArgs {
    fn to_query(&self) -> Result<SearchQuery, CliError> {
        let mut query = SearchQuery::new(self.names.iter().cloned())
            .with_ck_qualities(parse_list::<Quality>(&self.ck_qualities)?)
            .with_spk_qualities(parse_list::<Quality>(&self.spk_qualities)?)
            .with_full_path(self.full_path)
            .with_limit_ck(self.limit_ck)
            .with_limit_spk(self.limit_spk)
            .with_overwrite(self.overwrite);

        let types = parse_list::<KernelType>(&self.types)?;
        if !types.is_empty() {
            query = query.with_types(types);
        }
        let start = self.start.unwrap_or(query.start);
        let stop = self.stop.unwrap_or(query.stop);
        Ok(query.with_range(start, stop))
    }
}

pub fn run(overrides: &PathOverrides, args: SearchArgs) -> Result<(), CliError> {
    let query = args.to_query()?;
    let settings = resolve_settings(overrides)?;
    let db = Database::open(settings);
    let result = db.search(&query)?;
    print_json(&result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> SearchArgs {
        SearchArgs {
            names: vec!["lro".to_string()],
            types: Vec::new(),
            start: None,
            stop: Some(100.0),
            ck_qualities: vec!["reconstructed,predicted".to_string()],
            spk_qualities: Vec::new(),
            full_path: false,
            limit_ck: 2,
            limit_spk: 0,
            overwrite: false,
        }
    }

    #[test]
    fn test_to_query() {
        let query = args().to_query().unwrap();
        assert_eq!(query.types, KernelType::ALL.to_vec());
        assert_eq!(query.ck_qualities, vec![Quality::Reconstructed, Quality::Predicted]);
        assert!(query.spk_qualities.is_empty());
        assert_eq!(query.start, f64::MIN);
        assert_eq!(query.stop, 100.0);
        assert_eq!(query.limit_ck, 2);
    }

    #[test]
    fn test_bad_quality() {
        let mut args = args();
        args.spk_qualities = vec!["excellent".to_string()];
        assert!(matches!(args.to_query(), Err(CliError::InvalidArgument(_))));
    }
}
