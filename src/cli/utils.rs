use serde_json::{json, Value};

use crate::cli::OutputFormat;

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let (Some(Value::Object(extra)), Some(fields)) = (data, response.as_object_mut()) {
                fields.extend(extra);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output an error message in the appropriate format
pub fn output_error(output_format: &OutputFormat, message: &str, error_code: Option<&str>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": false,
                "error": message
            });

            if let Some(code) = error_code {
                response["error_code"] = json!(code);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            eprintln!("Error: {}", message);
        }
    }
    Ok(())
}

/// Text progress bar for the QR countdown, e.g. `[##########----------]  30s`
pub fn progress_bar(remaining_secs: u64, percent: u8, urgent: bool) -> String {
    const WIDTH: usize = 20;
    let filled = (percent as usize * WIDTH) / 100;
    let marker = if urgent { '!' } else { '#' };

    format!(
        "[{}{}] {:>3}s",
        marker.to_string().repeat(filled),
        "-".repeat(WIDTH - filled),
        remaining_secs
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_bar_fills_proportionally() {
        assert_eq!(progress_bar(60, 100, false), "[####################]  60s");
        assert_eq!(progress_bar(30, 50, false), "[##########----------]  30s");
        assert_eq!(progress_bar(6, 10, true), "[!!------------------]   6s");
    }
}
