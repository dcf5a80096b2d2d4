use chrono::NaiveDate;
use riskkit_core::risk_kit::ReturnsTable;
use tracing::debug;

/// Headers that mark the first column as period labels.
const DATE_HEADERS: [&str; 4] = ["", "date", "period", "month"];

/// Parse a returns table: one header row of asset names, one row per period.
///
/// The first column holds period labels when its header is blank or one of
/// `date`, `period`, `month`. Labels may be `YYYY-MM-DD`, `YYYY-MM` or
/// `YYYYMM`. With `percent`, every value is divided by 100.
pub fn parse_returns_csv(
    text: &str,
    percent: bool,
) -> Result<ReturnsTable, Box<dyn std::error::Error>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = rdr.headers()?.clone();
    let has_dates = headers
        .get(0)
        .map(|h| DATE_HEADERS.contains(&h.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    let skip = usize::from(has_dates);
    let asset_names: Vec<String> = headers.iter().skip(skip).map(String::from).collect();
    if asset_names.is_empty() {
        return Err("CSV has no return columns".into());
    }

    let scale = if percent { 0.01 } else { 1.0 };
    let mut dates = Vec::new();
    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let line = i + 2;
        if has_dates {
            let label = record.get(0).unwrap_or_default();
            dates.push(parse_period(label).ok_or_else(|| {
                format!("Line {}: cannot read '{}' as a date", line, label)
            })?);
        }
        let row = record
            .iter()
            .skip(skip)
            .map(|cell| {
                cell.parse::<f64>()
                    .map(|v| v * scale)
                    .map_err(|_| format!("Line {}: '{}' is not a number", line, cell))
            })
            .collect::<Result<Vec<f64>, String>>()?;
        rows.push(row);
    }
    debug!(assets = asset_names.len(), periods = rows.len(), "parsed returns csv");

    Ok(ReturnsTable {
        asset_names,
        dates,
        rows,
    })
}

fn parse_period(label: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(label, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{}-01", label), "%Y-%m-%d") {
        return Some(d);
    }
    if label.len() == 6 && label.chars().all(|c| c.is_ascii_digit()) {
        let year = label[..4].parse().ok()?;
        let month = label[4..].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, 1);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dated_percent_table() {
        let text = "date,SmallCap,LargeCap\n192607,-0.57,3.33\n192608,3.84,2.33\n";
        let table = parse_returns_csv(text, true).unwrap();
        assert_eq!(table.asset_names, vec!["SmallCap", "LargeCap"]);
        assert_eq!(table.dates[1], NaiveDate::from_ymd_opt(1926, 8, 1).unwrap());
        assert!((table.rows[0][0] + 0.0057).abs() < 1e-15);
        assert!((table.rows[1][1] - 0.0233).abs() < 1e-15);
    }

    #[test]
    fn test_undated_table() {
        let table = parse_returns_csv("A,B\n0.01,0.02\n-0.01,0.00\n", false).unwrap();
        assert!(table.dates.is_empty());
        assert_eq!(table.rows, vec![vec![0.01, 0.02], vec![-0.01, 0.0]]);
    }

    #[test]
    fn test_iso_and_month_labels() {
        assert_eq!(
            parse_period("2020-03"),
            NaiveDate::from_ymd_opt(2020, 3, 1)
        );
        assert_eq!(
            parse_period("2020-03-31"),
            NaiveDate::from_ymd_opt(2020, 3, 31)
        );
        assert_eq!(parse_period("March"), None);
    }

    #[test]
    fn test_bad_cell_reports_line() {
        let err = parse_returns_csv("date,A\n2020-01,0.01\n2020-02,n/a\n", false).unwrap_err();
        assert!(err.to_string().contains("Line 3"));
    }
}
