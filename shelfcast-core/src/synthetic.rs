//! Deterministic M5-shaped raw dataset for tests, benches and demos.
//!
//! Produces the five raw CSVs with the real column layout (and optionally a
//! zip containing them). Output is a pure function of [`SyntheticSpec`].

use crate::data::DataError;
use chrono::{Datelike, Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Raw table file names, in archive order.
pub const RAW_FILES: [&str; 5] = [
    "calendar.csv",
    "sales_train_evaluation.csv",
    "sales_train_validation.csv",
    "sample_submission.csv",
    "sell_prices.csv",
];

const STORES: [(&str, &str); 3] = [("CA_1", "CA"), ("TX_1", "TX"), ("WI_1", "WI")];
const FORECAST_DAYS: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticSpec {
    pub n_series: usize,
    /// Days in the validation table; the evaluation table has 28 more.
    pub n_days: usize,
    pub seed: u64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            n_series: 6,
            n_days: 120,
            seed: 42,
        }
    }
}

struct SeriesKey {
    id_stem: String,
    item_id: String,
    dept_id: String,
    cat_id: String,
    store_id: String,
    state_id: String,
}

impl SyntheticSpec {
    fn series(&self) -> Vec<SeriesKey> {
        (0..self.n_series)
            .map(|i| {
                let (store, state) = STORES[i % STORES.len()];
                let item = format!("FOODS_1_{:03}", i / STORES.len() + 1);
                SeriesKey {
                    id_stem: format!("{item}_{store}"),
                    item_id: item,
                    dept_id: "FOODS_1".into(),
                    cat_id: "FOODS".into(),
                    store_id: store.into(),
                    state_id: state.into(),
                }
            })
            .collect()
    }

    fn total_days(&self) -> usize {
        self.n_days + FORECAST_DAYS
    }

    /// Write the raw CSVs into `dir`, returning their paths in [`RAW_FILES`] order.
    pub fn write_csvs(&self, dir: &Path) -> Result<Vec<PathBuf>, DataError> {
        fs::create_dir_all(dir).map_err(|e| DataError::io(dir, e))?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let series = self.series();

        // One trajectory per series over the evaluation span; validation is its prefix.
        let sales: Vec<Vec<u32>> = series
            .iter()
            .map(|_| {
                let base = rng.gen_range(0..4u32);
                (0..self.total_days())
                    .map(|_| base + rng.gen_range(0..3u32))
                    .collect()
            })
            .collect();

        let paths: Vec<PathBuf> = RAW_FILES.iter().map(|f| dir.join(f)).collect();
        self.write_calendar(&paths[0])?;
        self.write_sales(&paths[1], &series, &sales, self.total_days(), "evaluation")?;
        self.write_sales(&paths[2], &series, &sales, self.n_days, "validation")?;
        self.write_submission(&paths[3], &series)?;
        self.write_prices(&paths[4], &series, &mut rng)?;
        Ok(paths)
    }

    /// Write the CSVs and pack them into `<dir>/<zip_name>`.
    pub fn write_zip(&self, dir: &Path, zip_name: &str) -> Result<PathBuf, DataError> {
        let staging = dir.join(".synthetic_csv");
        let files = self.write_csvs(&staging)?;
        let zip_path = dir.join(zip_name);
        let file = File::create(&zip_path).map_err(|e| DataError::io(&zip_path, e))?;
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for (name, path) in RAW_FILES.iter().zip(&files) {
            let bytes = fs::read(path).map_err(|e| DataError::io(path, e))?;
            zip.start_file(*name, options)
                .map_err(|e| DataError::Archive(format!("add {name}: {e}")))?;
            zip.write_all(&bytes)
                .map_err(|e| DataError::io(&zip_path, e))?;
        }
        zip.finish()
            .map_err(|e| DataError::Archive(format!("finish {}: {e}", zip_path.display())))?;
        fs::remove_dir_all(&staging).map_err(|e| DataError::io(&staging, e))?;
        Ok(zip_path)
    }

    fn write_calendar(&self, path: &Path) -> Result<(), DataError> {
        let mut w = writer(path)?;
        row(
            &mut w,
            path,
            [
                "date", "wm_yr_wk", "weekday", "wday", "month", "year", "d", "event_name_1",
                "event_type_1", "event_name_2", "event_type_2", "snap_CA", "snap_TX", "snap_WI",
            ],
        )?;
        // M5 starts on a Saturday, which is wday 1.
        let start = NaiveDate::from_ymd_opt(2011, 1, 29)
            .ok_or_else(|| DataError::Validation("calendar start".into()))?;
        for i in 0..self.total_days() {
            let date = start + Duration::days(i as i64);
            let week = 11101 + (i / 7) as i64;
            let wday = i % 7 + 1;
            let event = if i % 30 == 9 { "SyntheticDay" } else { "" };
            let event_type = if event.is_empty() { "" } else { "Cultural" };
            let snap = |offset: usize| u8::from((date.day() as usize + offset) % 3 == 0).to_string();
            let record = vec![
                date.format("%Y-%m-%d").to_string(),
                week.to_string(),
                weekday_name(wday).to_string(),
                wday.to_string(),
                date.month().to_string(),
                date.year().to_string(),
                format!("d_{}", i + 1),
                event.to_string(),
                event_type.to_string(),
                String::new(),
                String::new(),
                snap(0),
                snap(1),
                snap(2),
            ];
            row(&mut w, path, &record)?;
        }
        flush(w, path)
    }

    fn write_sales(
        &self,
        path: &Path,
        series: &[SeriesKey],
        sales: &[Vec<u32>],
        days: usize,
        suffix: &str,
    ) -> Result<(), DataError> {
        let mut w = writer(path)?;
        let mut header: Vec<String> = ["id", "item_id", "dept_id", "cat_id", "store_id", "state_id"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        header.extend((1..=days).map(|d| format!("d_{d}")));
        row(&mut w, path, &header)?;

        for (key, values) in series.iter().zip(sales) {
            let mut record = vec![
                format!("{}_{suffix}", key.id_stem),
                key.item_id.clone(),
                key.dept_id.clone(),
                key.cat_id.clone(),
                key.store_id.clone(),
                key.state_id.clone(),
            ];
            record.extend(values[..days].iter().map(|v| v.to_string()));
            row(&mut w, path, &record)?;
        }
        flush(w, path)
    }

    fn write_submission(&self, path: &Path, series: &[SeriesKey]) -> Result<(), DataError> {
        let mut w = writer(path)?;
        let mut header = vec!["id".to_string()];
        header.extend((1..=FORECAST_DAYS).map(|f| format!("F{f}")));
        row(&mut w, path, &header)?;
        for suffix in ["validation", "evaluation"] {
            for key in series {
                let mut record = vec![format!("{}_{suffix}", key.id_stem)];
                record.extend(std::iter::repeat("0".to_string()).take(FORECAST_DAYS));
                row(&mut w, path, &record)?;
            }
        }
        flush(w, path)
    }

    fn write_prices(&self, path: &Path, series: &[SeriesKey], rng: &mut StdRng) -> Result<(), DataError> {
        let mut w = writer(path)?;
        row(&mut w, path, ["store_id", "item_id", "wm_yr_wk", "sell_price"])?;
        let weeks = self.total_days().div_ceil(7);
        for key in series {
            let cents: u32 = rng.gen_range(100..1000);
            for week in 0..weeks {
                let record = [
                    key.store_id.clone(),
                    key.item_id.clone(),
                    (11101 + week).to_string(),
                    format!("{}.{:02}", cents / 100, cents % 100),
                ];
                row(&mut w, path, &record)?;
            }
        }
        flush(w, path)
    }
}

fn weekday_name(wday: usize) -> &'static str {
    match wday {
        1 => "Saturday",
        2 => "Sunday",
        3 => "Monday",
        4 => "Tuesday",
        5 => "Wednesday",
        6 => "Thursday",
        _ => "Friday",
    }
}

fn writer(path: &Path) -> Result<csv::Writer<File>, DataError> {
    csv::Writer::from_path(path).map_err(|e| DataError::Csv(format!("create {}: {e}", path.display())))
}

fn row<I, T>(w: &mut csv::Writer<File>, path: &Path, record: I) -> Result<(), DataError>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    w.write_record(record)
        .map_err(|e| DataError::Csv(format!("write {}: {e}", path.display())))
}

fn flush(mut w: csv::Writer<File>, path: &Path) -> Result<(), DataError> {
    w.flush().map_err(|e| DataError::io(path, e))
}
