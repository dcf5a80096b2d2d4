use approx::assert_abs_diff_eq;
use chrono::NaiveDate;
use riskkit_core::efficient_frontier::{gmv, minimize_vol};
use riskkit_core::risk_kit::drawdown::{drawdown, DEFAULT_START_VALUE};
use riskkit_core::risk_kit::returns::{annualize_vol, estimate_market_inputs};
use riskkit_core::risk_kit::tail_risk::{cvar_historic, is_normal, var_gaussian, var_historic};
use riskkit_core::risk_kit::{summary_stats, ReturnFrequency, ReturnsTable, RiskSummaryInput};

// ===========================================================================
// Risk kit feeding the optimizers
// ===========================================================================

fn monthly_table() -> ReturnsTable {
    let dates = (1..=12)
        .map(|m| NaiveDate::from_ymd_opt(2023, m, 1).unwrap())
        .collect();
    ReturnsTable {
        asset_names: vec!["Growth".into(), "Value".into(), "Bonds".into()],
        dates,
        rows: vec![
            vec![0.031, 0.012, 0.004],
            vec![-0.022, 0.008, 0.006],
            vec![0.045, 0.019, -0.002],
            vec![-0.038, -0.011, 0.007],
            vec![0.027, 0.015, 0.003],
            vec![0.012, -0.004, 0.005],
            vec![-0.051, -0.020, 0.009],
            vec![0.066, 0.024, -0.004],
            vec![0.009, 0.006, 0.002],
            vec![-0.017, -0.009, 0.006],
            vec![0.038, 0.017, 0.001],
            vec![0.004, 0.010, 0.004],
        ],
    }
}

#[test]
fn test_estimated_inputs_drive_optimizer() {
    let ppy = ReturnFrequency::Monthly.periods_per_year();
    let market = estimate_market_inputs(&monthly_table(), ppy, true).unwrap();
    assert_eq!(market.validate().unwrap(), 3);

    let w = gmv(&market.covariance).unwrap();
    let total: f64 = w.iter().sum();
    assert_abs_diff_eq!(total, 1.0, epsilon = 1e-8);
    // Bonds are by far the least volatile asset.
    assert!(w[2] > 0.5, "gmv weights {:?}", w);

    let mid = (market.expected_returns[0] + market.expected_returns[2]) / 2.0;
    let w = minimize_vol(mid, &market.expected_returns, &market.covariance).unwrap();
    assert_eq!(w.len(), 3);
}

#[test]
fn test_annualized_variance_matches_vol() {
    let table = monthly_table();
    let market = estimate_market_inputs(&table, 12.0, true).unwrap();
    let vol = annualize_vol(&table.column(0), 12.0).unwrap();
    assert_abs_diff_eq!(market.covariance[0][0], vol * vol, epsilon = 1e-14);
}

#[test]
fn test_tail_risk_ordering() {
    let r = monthly_table().column(0);
    let var = var_historic(&r, 5.0).unwrap();
    let cvar = cvar_historic(&r, 5.0).unwrap();
    assert!(cvar >= var);
    assert!(var_gaussian(&r, 5.0, false).unwrap() > 0.0);
    assert!(is_normal(&r, 0.01).unwrap());
}

#[test]
fn test_drawdown_with_dates() {
    let table = monthly_table();
    let r = table.column(0);
    let out = drawdown(&r, Some(&table.dates), DEFAULT_START_VALUE).unwrap();
    assert_eq!(out.records.len(), 12);
    let s = &out.summary;
    assert!(s.peak_index < s.trough_index);
    assert_eq!(s.trough_date, Some(table.dates[s.trough_index]));
    let min = out
        .records
        .iter()
        .map(|r| r.drawdown)
        .fold(f64::INFINITY, f64::min);
    assert_eq!(s.max_drawdown, min);
}

#[test]
fn test_summary_stats_json_round() {
    let table = monthly_table();
    let input = RiskSummaryInput {
        returns: table.column(1),
        dates: table.dates.clone(),
        level: 5.0,
        periods_per_year: 12.0,
        risk_free_rate: 0.02,
        normality_level: 0.01,
    };
    let out = summary_stats(&input).unwrap();
    let json = serde_json::to_value(&out).unwrap();
    assert_eq!(json["result"]["n_observations"], 12);
    assert!(json["result"]["drawdown"]["trough_date"].is_string());
}
