//! Deterministic derivation of the worker command line.

use crate::model::SearchRequest;
use std::path::PathBuf;
use time::macros::format_description;

/// Output file path for one run: chosen directory + sortable UTC timestamp
/// + requested extension.
pub fn output_file_path(request: &SearchRequest) -> PathBuf {
    let stamp = time::OffsetDateTime::now_utc()
        .format(format_description!(
            "[year][month][day]-[hour][minute][second]"
        ))
        .unwrap_or_else(|_| "now".into());
    request.output_directory.join(format!(
        "business-results-{}.{}",
        stamp,
        request.output_format.as_str()
    ))
}

/// Worker argv: `-k <keyword> -l <location> -r <max> -f <format>
/// [--no-web-scraping] -o <output path>`.
pub fn derive_args(request: &SearchRequest, output_path: &std::path::Path) -> Vec<String> {
    let mut args = vec![
        "-k".to_string(),
        request.keyword.clone(),
        "-l".to_string(),
        request.location.clone(),
        "-r".to_string(),
        request.max_results.to_string(),
        "-f".to_string(),
        request.output_format.as_str().to_string(),
    ];
    if !request.enable_web_scraping {
        args.push("--no-web-scraping".to_string());
    }
    args.push("-o".to_string());
    args.push(output_path.to_string_lossy().into_owned());
    args
}
