use serde_json::Value;

/// Result fields worth printing on their own, most specific first.
const PRIORITY_KEYS: [&str; 6] = [
    "intrinsic_value_per_share",
    "intrinsic_value",
    "implied_growth_rate",
    "wacc",
    "enterprise_value",
    "equity_value",
];

/// Print just the key answer value from the output.
///
/// Single calculations print their headline number. Batches print one
/// `ticker,date,value` line per row, with the error message in place of
/// the value for rows that failed.
pub fn print_minimal(value: &Value) {
    if let Some(Value::Array(rows)) = value.get("results") {
        for row in rows {
            println!("{}", batch_line(row));
        }
        return;
    }

    let result_obj = value.get("result").unwrap_or(value);

    if let Value::Object(map) = result_obj {
        for key in &PRIORITY_KEYS {
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

fn batch_line(row: &Value) -> String {
    let field = |name: &str| row.get(name).filter(|v| !v.is_null());
    let answer = field("intrinsic_value")
        .or_else(|| field("implied_perp_g_rate"))
        .or_else(|| field("error_message"));

    let mut parts = Vec::new();
    for name in ["ticker", "date", "year"] {
        if let Some(v) = field(name) {
            parts.push(format_minimal(v));
        }
    }
    parts.push(answer.map(format_minimal).unwrap_or_default());
    parts.join(",")
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
