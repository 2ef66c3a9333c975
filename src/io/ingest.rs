//! CSV ingest and normalization.
//!
//! Turns a monthly speed-test CSV into [`Observation`] records. The expected
//! columns are `date`, `country`, `internet_type`, `aggregation`,
//! `download_speed`, `upload_speed` and optionally `latency` and `jitter`.
//!
//! Design goals:
//! - **Strict schema** for required fields (clear errors + exit code 2)
//! - **Strict rows**: any malformed row fails the load with its line number,
//!   since a silently dropped month would shift every derived time index
//! - **Separation of concerns**: no modelling logic here

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use csv::StringRecord;
use tracing::debug;

use crate::domain::{Aggregation, InternetType, Observation, Population};
use crate::error::{AnalysisError, AppError};

const REQUIRED_COLUMNS: [&str; 6] = [
    "date",
    "country",
    "internet_type",
    "aggregation",
    "download_speed",
    "upload_speed",
];

/// Load every record from a CSV file.
pub fn load_observations(path: &Path) -> Result<Vec<Observation>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    let records = read_observations(file)?;
    debug!(path = %path.display(), rows = records.len(), "loaded observations");
    Ok(records)
}

/// Parse records from any CSV reader.
pub fn read_observations<R: Read>(reader: R) -> Result<Vec<Observation>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    for col in REQUIRED_COLUMNS {
        if !header_map.contains_key(col) {
            return Err(AppError::new(2, format!("Missing required column: `{col}`")));
        }
    }

    let mut out = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // records() starts after the header line; CSV lines are 1-based.
        let line = idx + 2;
        let record = result.map_err(|e| {
            AppError::from(AnalysisError::DataIntegrity(format!(
                "line {line}: CSV parse error: {e}"
            )))
        })?;
        let obs = parse_row(&record, &header_map).map_err(|msg| {
            AppError::from(AnalysisError::DataIntegrity(format!("line {line}: {msg}")))
        })?;
        out.push(obs);
    }

    if out.is_empty() {
        return Err(AnalysisError::DataIntegrity("input contains no data rows".into()).into());
    }
    Ok(out)
}

/// Pool several comparator countries into one synthetic control population.
///
/// Each output record is the cross-country mean of the matching records for
/// one month. Months not covered by every comparator are dropped so the pooled
/// series never mixes different country sets.
pub fn pool_mean(
    records: &[Observation],
    comparators: &[String],
    aggregation: Aggregation,
    internet_type: InternetType,
    label: &str,
) -> Result<Vec<Observation>, AnalysisError> {
    if comparators.is_empty() {
        return Err(AnalysisError::InvalidConfig(
            "at least one comparator country is required".into(),
        ));
    }

    let mut by_date: BTreeMap<NaiveDate, Vec<&Observation>> = BTreeMap::new();
    for obs in records.iter().filter(|o| {
        o.aggregation == aggregation
            && o.population.internet_type == internet_type
            && comparators.iter().any(|c| c.eq_ignore_ascii_case(&o.population.country))
    }) {
        by_date.entry(obs.date).or_default().push(obs);
    }

    let population = Population::new(label, internet_type);
    let mut out = Vec::with_capacity(by_date.len());
    for (date, group) in by_date {
        if group.len() != comparators.len() {
            debug!(%date, present = group.len(), expected = comparators.len(), "skipping incomplete comparator month");
            continue;
        }
        let n = group.len() as f64;
        let mean = |f: fn(&Observation) -> f64| group.iter().map(|o| f(o)).sum::<f64>() / n;
        let mean_opt = |f: fn(&Observation) -> Option<f64>| {
            group
                .iter()
                .map(|o| f(o))
                .sum::<Option<f64>>()
                .map(|s| s / n)
        };
        out.push(Observation {
            date,
            population: population.clone(),
            aggregation,
            download_speed: mean(|o| o.download_speed),
            upload_speed: mean(|o| o.upload_speed),
            latency: mean_opt(|o| o.latency),
            jitter: mean_opt(|o| o.jitter),
        });
    }

    if out.is_empty() {
        return Err(AnalysisError::DataIntegrity(format!(
            "no month has records for all comparators ({})",
            comparators.join(", ")
        )));
    }
    Ok(out)
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<Observation, String> {
    let date = parse_date(get_required(record, header_map, "date")?)?;
    let country = get_required(record, header_map, "country")?.to_string();

    let internet_type_raw = get_required(record, header_map, "internet_type")?;
    let internet_type = InternetType::parse(internet_type_raw)
        .ok_or_else(|| format!("Unknown internet_type '{internet_type_raw}' (expected fixed or cellular)."))?;

    let aggregation_raw = get_required(record, header_map, "aggregation")?;
    let aggregation = Aggregation::parse(aggregation_raw)
        .ok_or_else(|| format!("Unknown aggregation '{aggregation_raw}' (expected mean or median)."))?;

    let download_speed = parse_speed(get_required(record, header_map, "download_speed")?, "download_speed")?;
    let upload_speed = parse_speed(get_required(record, header_map, "upload_speed")?, "upload_speed")?;

    let latency = parse_opt_metric(get_optional(record, header_map, "latency"), "latency")?;
    let jitter = parse_opt_metric(get_optional(record, header_map, "jitter"), "jitter")?;

    Ok(Observation {
        date,
        population: Population::new(country, internet_type),
        aggregation,
        download_speed,
        upload_speed,
        latency,
        jitter,
    })
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    // Monthly files come as either full ISO dates or bare `YYYY-MM`.
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d"))
        .map_err(|_| format!("Invalid date '{s}'. Expected YYYY-MM-DD or YYYY-MM."))?;
    if date.day() != 1 {
        return Err(format!("Date '{s}' is not the first day of a month."));
    }
    Ok(date)
}

fn parse_f64(s: &str, name: &str) -> Result<f64, String> {
    let v = s
        .parse::<f64>()
        .map_err(|_| format!("Invalid `{name}` value '{s}'."))?;
    if !v.is_finite() {
        return Err(format!("Non-finite `{name}` value '{s}'."));
    }
    Ok(v)
}

fn parse_speed(s: &str, name: &str) -> Result<f64, String> {
    let v = parse_f64(s, name)?;
    if v <= 0.0 {
        return Err(format!("Invalid `{name}` value '{s}' (must be > 0)."));
    }
    Ok(v)
}

fn parse_opt_metric(s: Option<&str>, name: &str) -> Result<Option<f64>, String> {
    let Some(s) = s else { return Ok(None) };
    let v = parse_f64(s, name)?;
    if v < 0.0 {
        return Err(format!("Invalid `{name}` value '{s}' (must be >= 0)."));
    }
    Ok(Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\u{feff}Date, Country ,internet_type,aggregation,download_speed,upload_speed,latency,jitter
2022-01-01,Azerbaijan,fixed,median,30.5,12.0,20,3
2022-02,Azerbaijan,fixed,median,31.0,12.5,,
2022-01-01,Georgia,Fixed,Median,40.0,20.0,18,2
2022-01-01,Armenia,fixed,median,20.0,10.0,22,4
2022-02-01,Georgia,fixed,median,42.0,21.0,17,2
";

    #[test]
    fn reads_rows_with_loose_headers() {
        let rows = read_observations(CSV.as_bytes()).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].population.country, "Azerbaijan");
        assert_eq!(rows[1].date, NaiveDate::from_ymd_opt(2022, 2, 1).unwrap());
        assert_eq!(rows[1].latency, None);
        assert_eq!(rows[2].population.internet_type, InternetType::Fixed);
        assert_eq!(rows[2].aggregation, Aggregation::Median);
    }

    #[test]
    fn missing_column_is_a_schema_error() {
        let err = read_observations("date,country,internet_type,aggregation,download_speed\n".as_bytes())
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("upload_speed"));
    }

    #[test]
    fn bad_value_reports_line() {
        let csv = "date,country,internet_type,aggregation,download_speed,upload_speed
2022-01-01,Azerbaijan,fixed,median,abc,1.0
";
        let err = read_observations(csv.as_bytes()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn mid_month_date_is_rejected() {
        let csv = "date,country,internet_type,aggregation,download_speed,upload_speed
2022-01-15,Azerbaijan,fixed,median,10.0,1.0
";
        let err = read_observations(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("first day of a month"));
    }

    #[test]
    fn pool_mean_keeps_only_complete_months() {
        let rows = read_observations(CSV.as_bytes()).unwrap();
        let comparators = vec!["Georgia".to_string(), "Armenia".to_string()];
        let pooled = pool_mean(&rows, &comparators, Aggregation::Median, InternetType::Fixed, "Comparators")
            .unwrap();

        // February lacks Armenia.
        assert_eq!(pooled.len(), 1);
        assert_eq!(pooled[0].population.country, "Comparators");
        assert!((pooled[0].download_speed - 30.0).abs() < 1e-12);
        assert!((pooled[0].upload_speed - 15.0).abs() < 1e-12);
        assert_eq!(pooled[0].latency, Some(20.0));
    }

    #[test]
    fn pool_mean_without_comparators_is_config_error() {
        let rows = read_observations(CSV.as_bytes()).unwrap();
        let err = pool_mean(&rows, &[], Aggregation::Median, InternetType::Fixed, "x").unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidConfig(_)));
    }
}
