//! Upgrading nbformat 3 documents to nbformat 4.
//!
//! Works on raw JSON before it is deserialized into [`JupyterNotebook`].
//!
//! [`JupyterNotebook`]: crate::JupyterNotebook

use serde_json::{Map, Value, json};

use crate::error::{SyncError, SyncResult};

/// Minor version given to upgraded documents. Cell ids are optional below 4.5.
pub const UPGRADED_MINOR: u32 = 4;

/// v3 output keys and the MIME types they become.
const MIME_KEYS: [(&str, &str); 8] = [
    ("text", "text/plain"),
    ("html", "text/html"),
    ("svg", "image/svg+xml"),
    ("png", "image/png"),
    ("jpeg", "image/jpeg"),
    ("latex", "text/latex"),
    ("json", "application/json"),
    ("javascript", "application/javascript"),
];

/// Convert a v3 document into v4 JSON.
///
/// Cells from every worksheet are concatenated, heading cells become markdown
/// and outputs are renamed to their v4 forms.
pub fn upgrade_v3(mut notebook: Map<String, Value>) -> SyncResult<Map<String, Value>> {
    let worksheets = match notebook.remove("worksheets") {
        Some(Value::Array(worksheets)) => worksheets,
        Some(_) => {
            return Err(SyncError::InvalidNotebook(
                "worksheets is not a list".to_string(),
            ));
        }
        None => Vec::new(),
    };

    let mut cells = Vec::new();
    for mut worksheet in worksheets {
        if let Some(Value::Array(sheet_cells)) = worksheet.get_mut("cells").map(Value::take) {
            for cell in sheet_cells {
                cells.push(upgrade_cell(cell)?);
            }
        }
    }

    if let Some(Value::Object(metadata)) = notebook.get_mut("metadata") {
        metadata.remove("name");
        metadata.remove("signature");
    }

    notebook.insert("cells".to_string(), Value::Array(cells));
    notebook.insert("nbformat".to_string(), json!(4));
    notebook.insert("nbformat_minor".to_string(), json!(UPGRADED_MINOR));
    Ok(notebook)
}

fn upgrade_cell(cell: Value) -> SyncResult<Value> {
    let Value::Object(mut cell) = cell else {
        return Err(SyncError::InvalidNotebook("cell is not an object".to_string()));
    };
    cell.entry("metadata").or_insert_with(|| json!({}));

    let cell_type = cell
        .get("cell_type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match cell_type.as_str() {
        "code" => {
            let source = cell.remove("input").unwrap_or_else(|| json!(""));
            let count = cell.remove("prompt_number").unwrap_or(Value::Null);
            cell.remove("language");
            if let Some(collapsed) = cell.remove("collapsed") {
                if let Some(Value::Object(metadata)) = cell.get_mut("metadata") {
                    metadata.insert("collapsed".to_string(), collapsed);
                }
            }

            let outputs = match cell.remove("outputs") {
                Some(Value::Array(outputs)) => outputs
                    .into_iter()
                    .map(upgrade_output)
                    .collect::<SyncResult<Vec<_>>>()?,
                _ => Vec::new(),
            };

            cell.insert("source".to_string(), source);
            cell.insert("execution_count".to_string(), count);
            cell.insert("outputs".to_string(), Value::Array(outputs));
        }
        "heading" => {
            let level = cell.remove("level").and_then(|l| l.as_u64()).unwrap_or(1) as usize;
            let text = joined(cell.get("source"));
            let heading = format!(
                "{} {}",
                "#".repeat(level.clamp(1, 6)),
                text.lines().collect::<Vec<_>>().join(" ")
            );
            cell.insert("cell_type".to_string(), json!("markdown"));
            cell.insert("source".to_string(), json!(heading));
        }
        "markdown" | "raw" => {
            cell.entry("source").or_insert_with(|| json!(""));
        }
        other => {
            return Err(SyncError::InvalidNotebook(format!(
                "unknown v3 cell type '{}'",
                other
            )));
        }
    }

    Ok(Value::Object(cell))
}

fn upgrade_output(output: Value) -> SyncResult<Value> {
    let Value::Object(mut output) = output else {
        return Err(SyncError::InvalidNotebook(
            "output is not an object".to_string(),
        ));
    };
    let output_type = output
        .remove("output_type")
        .and_then(|t| t.as_str().map(str::to_string))
        .unwrap_or_default();

    let upgraded = match output_type.as_str() {
        "stream" => json!({
            "output_type": "stream",
            "name": output.remove("stream").unwrap_or_else(|| json!("stdout")),
            "text": output.remove("text").unwrap_or_else(|| json!("")),
        }),
        "pyerr" | "error" => json!({
            "output_type": "error",
            "ename": output.remove("ename").unwrap_or_else(|| json!("")),
            "evalue": output.remove("evalue").unwrap_or_else(|| json!("")),
            "traceback": output.remove("traceback").unwrap_or_else(|| json!([])),
        }),
        "pyout" | "execute_result" => {
            let count = output.remove("prompt_number").unwrap_or(Value::Null);
            let metadata = output.remove("metadata").unwrap_or_else(|| json!({}));
            json!({
                "output_type": "execute_result",
                "execution_count": count,
                "data": mime_bundle(&mut output),
                "metadata": metadata,
            })
        }
        "display_data" => {
            let metadata = output.remove("metadata").unwrap_or_else(|| json!({}));
            json!({
                "output_type": "display_data",
                "data": mime_bundle(&mut output),
                "metadata": metadata,
            })
        }
        other => {
            return Err(SyncError::InvalidNotebook(format!(
                "unknown v3 output type '{}'",
                other
            )));
        }
    };
    Ok(upgraded)
}

fn mime_bundle(output: &mut Map<String, Value>) -> Value {
    let mut data = Map::new();
    for (key, mime) in MIME_KEYS {
        if let Some(value) = output.remove(key) {
            data.insert(mime.to_string(), value);
        }
    }
    Value::Object(data)
}

/// Source given either as a string or a list of lines.
fn joined(source: Option<&Value>) -> String {
    match source {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(lines)) => lines.iter().filter_map(Value::as_str).collect(),
        _ => String::new(),
    }
}
