use crate::models::dap::{Device, Measurement};
use crate::services::export::ExportError;
use crate::utils::{TimestampError, unix_timestamp};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use log::info;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Column order of an output row.
///
/// Measurement files and scenario files place the padding zero differently:
/// - `Measurement`: `0,0,0,0,<temp>,<press>,<epoch>,<custom_id>`
/// - `Scenario`:    `0,0,0,<temp>,<press>,<epoch>,0,<custom_id>`
///
/// Downstream consumers read these positions; keep both layouts byte-for-byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RowLayout {
    Measurement,
    Scenario,
}

impl RowLayout {
    pub fn for_scenario(scenario: bool) -> Self {
        if scenario { RowLayout::Scenario } else { RowLayout::Measurement }
    }
}

/// Fields for one row. The timestamp column comes from the temperature sample.
pub fn row_fields(
    layout: RowLayout,
    temperature: &Measurement,
    pressure: &Measurement,
    custom_id: &str,
) -> Result<Vec<String>, TimestampError> {
    let epoch = unix_timestamp(&temperature.timestamp)?.to_string();
    let zero = || "0".to_string();

    let fields = match layout {
        RowLayout::Measurement => vec![
            zero(),
            zero(),
            zero(),
            zero(),
            temperature.value_text(),
            pressure.value_text(),
            epoch,
            custom_id.to_string(),
        ],
        RowLayout::Scenario => vec![
            zero(),
            zero(),
            zero(),
            temperature.value_text(),
            pressure.value_text(),
            epoch,
            zero(),
            custom_id.to_string(),
        ],
    };
    Ok(fields)
}

/// `<working_dir>/<prefix><custom_id>.csv`, concatenated as text.
///
/// A prefix or id starting with `/` stays inside `working_dir` (`/tmp/out//sub_UT5.csv`).
pub fn output_path(working_dir: &Path, file_name_prefix: &str, custom_id: &str) -> PathBuf {
    let mut path = working_dir.as_os_str().to_os_string();
    if !path.as_encoded_bytes().ends_with(b"/") {
        path.push("/");
    }
    path.push(file_name_prefix);
    path.push(custom_id);
    path.push(".csv");
    PathBuf::from(path)
}

/// Write one device's paired series, truncating any previous file.
///
/// Callers guarantee both slices have the same length; rows are paired by index.
pub fn write_measurements(
    device: &Device,
    pressure: &[Measurement],
    temperature: &[Measurement],
    file_name_prefix: &str,
    working_dir: &Path,
    layout: RowLayout,
) -> Result<PathBuf, ExportError> {
    debug_assert_eq!(pressure.len(), temperature.len());

    if !working_dir.is_dir() {
        fs::create_dir_all(working_dir).map_err(|source| ExportError::Io {
            path: working_dir.to_path_buf(),
            source,
        })?;
    }

    let path = output_path(working_dir, file_name_prefix, &device.custom_id);
    info!("Writing file {}", path.display());

    let file = File::create(&path).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Never)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(file);

    for (t, p) in temperature.iter().zip(pressure) {
        let fields = row_fields(layout, t, p, &device.custom_id)?;
        wtr.write_record(&fields)?;
    }
    wtr.flush().map_err(|source| ExportError::Io { path: path.clone(), source })?;

    Ok(path)
}
