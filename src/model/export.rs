//! CSV export of list rows.

use crate::error::AppError;
use crate::naming::secure_filename;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::NaiveDateTime;

/// `{name}_{YYYY-MM-DD_HH-MM-SS}.{ext}`, reduced to safe characters.
pub fn export_filename(name: &str, at: NaiveDateTime, ext: &str) -> String {
    let base = secure_filename(name);
    let base = if base.is_empty() { "export".to_string() } else { base };
    format!("{}_{}.{}", base, at.format("%Y-%m-%d_%H-%M-%S"), ext)
}

/// Header row of labels, then one row per record. Lines end with CRLF.
pub fn write_csv<I>(labels: &[String], rows: I) -> Result<Vec<u8>, AppError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());
    writer
        .write_record(labels)
        .map_err(|e| AppError::Export(e.to_string()))?;
    for row in rows {
        writer.write_record(&row).map_err(|e| AppError::Export(e.to_string()))?;
    }
    writer.into_inner().map_err(|e| AppError::Export(e.to_string()))
}

/// Attachment response for an export body.
pub fn attachment(filename: &str, content_type: &'static str, body: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment;filename=\"{}\"", filename)),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn names_file_with_timestamp() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap();
        assert_eq!(export_filename("Post", at, "csv"), "Post_2024-03-09_14-05-00.csv");
        assert_eq!(export_filename("Blog Post", at, "csv"), "Blog_Post_2024-03-09_14-05-00.csv");
    }

    #[test]
    fn quotes_values_that_need_it() {
        let body = write_csv(
            &["Title".to_string(), "Body".to_string()],
            vec![vec!["a, b".to_string(), "say \"hi\"".to_string()]],
        )
        .unwrap();
        assert_eq!(String::from_utf8(body).unwrap(), "Title,Body\r\n\"a, b\",\"say \"\"hi\"\"\"\r\n");
    }
}
