use serde_json::Value;
use std::io;

use super::{result_of, ROW_SECTIONS};

/// Write output as CSV to stdout.
///
/// The first non-empty row-shaped section (weights, frontier, ...) becomes
/// the table; otherwise the result is written as field/value pairs.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    match result_of(value) {
        Value::Object(map) => {
            let rows = ROW_SECTIONS.iter().find_map(|section| match map.get(*section) {
                Some(Value::Array(rows)) if !rows.is_empty() => Some(rows),
                _ => None,
            });
            if let Some(rows) = rows {
                write_array_csv(&mut wtr, rows);
            } else {
                let _ = wtr.write_record(["field", "value"]);
                for (key, val) in map {
                    let _ = wtr.write_record([key.as_str(), &format_csv_value(val)]);
                }
            }
        }
        Value::Array(arr) => {
            write_array_csv(&mut wtr, arr);
        }
        other => {
            let _ = wtr.write_record([&format_csv_value(other)]);
        }
    }

    let _ = wtr.flush();
}

fn write_array_csv<W: io::Write>(wtr: &mut csv::Writer<W>, arr: &[Value]) {
    let Some(Value::Object(first)) = arr.first() else {
        for item in arr {
            let _ = wtr.write_record([&format_csv_value(item)]);
        }
        return;
    };

    // Weight vectors are spread over one column per asset.
    let width = first
        .get("weights")
        .and_then(Value::as_array)
        .map(|w| w.len())
        .unwrap_or(0);
    let mut headers: Vec<String> = first
        .keys()
        .filter(|k| !(width > 0 && k.as_str() == "weights"))
        .cloned()
        .collect();
    headers.extend((0..width).map(|i| format!("w{}", i)));
    let _ = wtr.write_record(&headers);

    for item in arr {
        if let Value::Object(map) = item {
            let mut row: Vec<String> = first
                .keys()
                .filter(|k| !(width > 0 && k.as_str() == "weights"))
                .map(|h| map.get(h).map(format_csv_value).unwrap_or_default())
                .collect();
            if let Some(Value::Array(w)) = map.get("weights") {
                row.extend(w.iter().map(format_csv_value));
            }
            let _ = wtr.write_record(&row);
        }
    }
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
