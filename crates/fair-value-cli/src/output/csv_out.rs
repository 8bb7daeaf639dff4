use serde_json::{Map, Value};
use std::io::{self, Write};

/// Write output as CSV to stdout.
///
/// Batches write one line per row of `results`. Single calculations write
/// `field,value` pairs from the `result` envelope.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    if let Err(e) = write_csv(stdout.lock(), value) {
        eprintln!("CSV output error: {}", e);
    }
}

fn write_csv<W: Write>(out: W, value: &Value) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(out);

    match value.get("results").or_else(|| value.as_array().map(|_| value)) {
        Some(Value::Array(rows)) => write_rows(&mut wtr, rows)?,
        _ => {
            let pairs = value
                .get("result")
                .and_then(Value::as_object)
                .or_else(|| value.as_object());
            match pairs {
                Some(map) => write_pairs(&mut wtr, map)?,
                None => wtr.write_record([cell(value)])?,
            }
        }
    }

    wtr.flush()?;
    Ok(())
}

fn write_pairs<W: Write>(wtr: &mut csv::Writer<W>, map: &Map<String, Value>) -> Result<(), csv::Error> {
    wtr.write_record(["field", "value"])?;
    for (key, val) in map {
        wtr.write_record([key.clone(), cell(val)])?;
    }
    Ok(())
}

fn write_rows<W: Write>(wtr: &mut csv::Writer<W>, rows: &[Value]) -> Result<(), csv::Error> {
    let Some(first) = rows.first().and_then(Value::as_object) else {
        for row in rows {
            wtr.write_record([cell(row)])?;
        }
        return Ok(());
    };

    let headers: Vec<&String> = first.keys().collect();
    wtr.write_record(&headers)?;
    for map in rows.iter().filter_map(Value::as_object) {
        wtr.write_record(headers.iter().map(|h| map.get(*h).map(cell).unwrap_or_default()))?;
    }
    Ok(())
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
