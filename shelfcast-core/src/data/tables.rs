//! Conformed analytic tables built from silver inputs.

use super::error::DataError;
use super::parquet::{parquet_column_names, read_head, require_column};
use polars::prelude::*;
use std::path::Path;

/// Identifier and categorical columns of a wide sales table.
pub const SERIES_COLUMNS: [&str; 6] = ["id", "item_id", "dept_id", "cat_id", "store_id", "state_id"];

/// Calendar with `is_weekend` and `is_event_day` appended.
pub fn calendar_gold(mut calendar: DataFrame) -> Result<DataFrame, DataError> {
    let weekday = require_column(&calendar, "calendar", "weekday")?
        .str()
        .map_err(|e| DataError::Validation(format!("calendar.weekday: {e}")))?;
    let is_weekend: Vec<bool> = weekday
        .into_iter()
        .map(|d| matches!(d, Some("Saturday") | Some("Sunday")))
        .collect();

    let is_event_day: Vec<bool> = require_column(&calendar, "calendar", "event_name_1")?
        .is_not_null()
        .into_iter()
        .map(|v| v.unwrap_or(false))
        .collect();

    calendar.with_column(Column::new("is_weekend".into(), is_weekend))?;
    calendar.with_column(Column::new("is_event_day".into(), is_event_day))?;
    Ok(calendar)
}

/// One row per distinct series, first occurrence order preserved.
pub fn series_dim(sales: DataFrame) -> Result<DataFrame, DataError> {
    for name in SERIES_COLUMNS {
        require_column(&sales, "sales", name)?;
    }
    sales
        .lazy()
        .select(SERIES_COLUMNS.iter().map(|c| col(*c)).collect::<Vec<_>>())
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()
        .map_err(|e| DataError::Parquet(format!("dim_series: {e}")))
}

/// Numeric suffix of a `d_<n>` day label.
pub fn day_ordinal(label: &str) -> Option<i64> {
    label.strip_prefix("d_")?.parse().ok()
}

/// Day columns sorted ascending by numeric suffix. Non-day columns are dropped.
pub fn sorted_day_columns<'a, I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut days: Vec<(i64, String)> = names
        .into_iter()
        .filter_map(|n| day_ordinal(n).map(|k| (k, n.to_string())))
        .collect();
    days.sort_by_key(|(k, _)| *k);
    days.into_iter().map(|(_, n)| n).collect()
}

/// Long-format sample of a wide sales table.
///
/// Takes the first `n_series` rows in file order and the `n_days` most recent
/// day columns, then emits one row per (series, day), series-major with days
/// ascending. Only the projected columns are read from disk.
pub fn sales_long_sample(
    wide_path: &Path,
    n_series: usize,
    n_days: usize,
) -> Result<DataFrame, DataError> {
    let names = parquet_column_names(wide_path)?;
    for required in SERIES_COLUMNS {
        if !names.iter().any(|n| n == required) {
            return Err(DataError::missing_column("sales", required));
        }
    }

    let all_days = sorted_day_columns(names.iter().map(String::as_str));
    if all_days.is_empty() {
        return Err(DataError::Validation(format!(
            "no day columns (d_<n>) in {}",
            wide_path.display()
        )));
    }
    let days = &all_days[all_days.len().saturating_sub(n_days)..];

    let mut projection: Vec<String> = SERIES_COLUMNS.iter().map(|c| c.to_string()).collect();
    projection.extend(days.iter().cloned());
    let wide = read_head(wide_path, &projection, n_series)?;

    melt_days(&wide, days)
}

/// Source-row index carried through the unpivot to restore series-major order.
const ROW_INDEX: &str = "__row";

fn melt_days(wide: &DataFrame, days: &[String]) -> Result<DataFrame, DataError> {
    let mut typed = wide.clone();
    for day in days {
        let cast = require_column(wide, "sales", day)?
            .cast(&DataType::Int32)
            .map_err(|e| DataError::Cast {
                column: day.clone(),
                reason: e.to_string(),
            })?;
        typed.with_column(cast)?;
    }

    let index = std::iter::once(ROW_INDEX).chain(SERIES_COLUMNS);
    let long = typed
        .with_row_index(ROW_INDEX.into(), None)?
        .unpivot(days.iter().map(String::as_str), index)?;

    // Unpivot emits day-major rows; a stable sort on the source row makes them series-major.
    let mut long = long
        .sort(
            [ROW_INDEX],
            SortMultipleOptions::default().with_maintain_order(true),
        )?
        .drop(ROW_INDEX)?;
    long.rename("variable", "d".into())?;
    long.rename("value", "sales".into())?;
    Ok(long)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parquet::write_parquet;

    fn wide_sales() -> DataFrame {
        df!(
            "id" => &["A_1_CA_1", "A_2_CA_1", "A_1_CA_1"],
            "item_id" => &["A_1", "A_2", "A_1"],
            "dept_id" => &["A", "A", "A"],
            "cat_id" => &["FOODS", "FOODS", "FOODS"],
            "store_id" => &["CA_1", "CA_1", "CA_1"],
            "state_id" => &["CA", "CA", "CA"],
            "d_1" => &[1i32, 2, 1],
            "d_10" => &[5i32, 6, 5],
            "d_2" => &[3i32, 4, 3],
        )
        .unwrap()
    }

    #[test]
    fn calendar_flags() {
        let cal = df!(
            "d" => &["d_1", "d_2", "d_3"],
            "weekday" => &["Saturday", "Sunday", "Monday"],
            "event_name_1" => &[None, Some("SuperBowl"), None],
        )
        .unwrap();
        let gold = calendar_gold(cal).unwrap();
        let weekend: Vec<Option<bool>> = gold.column("is_weekend").unwrap().bool().unwrap().into_iter().collect();
        let event: Vec<Option<bool>> = gold.column("is_event_day").unwrap().bool().unwrap().into_iter().collect();
        assert_eq!(weekend, vec![Some(true), Some(true), Some(false)]);
        assert_eq!(event, vec![Some(false), Some(true), Some(false)]);
    }

    #[test]
    fn calendar_requires_weekday() {
        let cal = df!("d" => &["d_1"]).unwrap();
        assert!(matches!(
            calendar_gold(cal),
            Err(DataError::MissingColumn { .. })
        ));
    }

    #[test]
    fn dim_series_dedups_in_order() {
        let dim = series_dim(wide_sales()).unwrap();
        assert_eq!(dim.height(), 2);
        assert_eq!(dim.width(), 6);
        let ids: Vec<Option<&str>> = dim.column("id").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(ids, vec![Some("A_1_CA_1"), Some("A_2_CA_1")]);
    }

    #[test]
    fn day_columns_sort_numerically() {
        let names = ["id", "d_10", "d_2", "d_1", "dept_id"];
        assert_eq!(sorted_day_columns(names), vec!["d_1", "d_2", "d_10"]);
        assert_eq!(day_ordinal("d_1913"), Some(1913));
        assert_eq!(day_ordinal("dept_id"), None);
    }

    #[test]
    fn long_sample_takes_prefix_and_latest_days() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sales.parquet");
        write_parquet(&mut wide_sales(), &path).unwrap();

        let long = sales_long_sample(&path, 2, 2).unwrap();
        assert_eq!(long.height(), 4);
        assert_eq!(
            long.get_column_names().iter().map(|n| n.as_str()).collect::<Vec<_>>(),
            vec!["id", "item_id", "dept_id", "cat_id", "store_id", "state_id", "d", "sales"]
        );
        let d: Vec<Option<&str>> = long.column("d").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(d, vec![Some("d_2"), Some("d_10"), Some("d_2"), Some("d_10")]);
        let sales: Vec<Option<i32>> = long.column("sales").unwrap().i32().unwrap().into_iter().collect();
        assert_eq!(sales, vec![Some(3), Some(5), Some(4), Some(6)]);
        assert_eq!(long.column("sales").unwrap().dtype(), &DataType::Int32);
    }

    #[test]
    fn long_sample_without_day_columns_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sales.parquet");
        let mut df = wide_sales().drop_many(["d_1", "d_2", "d_10"]);
        write_parquet(&mut df, &path).unwrap();
        assert!(matches!(
            sales_long_sample(&path, 2, 2),
            Err(DataError::Validation(_))
        ));
    }
}
