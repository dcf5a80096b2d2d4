use serde_json::Value;

use super::result_of;

/// Print just the key answer value from the output.
///
/// Looks for well-known result fields in order of priority, then falls
/// back to the first field in the result object.
pub fn print_minimal(value: &Value) {
    let result_obj = result_of(value);

    let priority_keys = [
        "weights",
        "var_historic",
        "expected_returns",
        "frontier",
        "max_drawdown",
    ];

    if let Value::Object(map) = result_obj {
        for key in &priority_keys {
            if let Some(val) = map.get(*key) {
                if !val.is_null() {
                    println!("{}", format_minimal(val));
                    return;
                }
            }
        }

        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(result_obj));
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(items) => {
            if let Some(pairs) = weight_pairs(items) {
                pairs.join(" ")
            } else if items.iter().all(Value::is_number) {
                items.iter().map(format_minimal).collect::<Vec<_>>().join(",")
            } else {
                serde_json::to_string(value).unwrap_or_default()
            }
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// `name=weight` for arrays of asset weight records.
fn weight_pairs(items: &[Value]) -> Option<Vec<String>> {
    items
        .iter()
        .map(|item| {
            let name = item.get("name")?.as_str()?;
            let weight = item.get("weight")?.as_f64()?;
            Some(format!("{}={:.6}", name, weight))
        })
        .collect()
}
