pub mod models {
    pub mod dap;
}

pub mod client;
pub mod config;
pub mod utils;
pub mod services {
    pub mod csv_export;
    pub mod export;
    #[cfg(test)]
    pub mod fake_api;
    pub mod resolve;
}

use crate::client::DapClient;
use crate::config::{Config, load_env_file};
use crate::services::export::{self, DeviceSelector};
use log::{error, info, warn};
use std::path::PathBuf;

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
    applied: usize,
}

pub fn run() -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    let req = &cfg.request;
    let devices = match &req.devices {
        DeviceSelector::Profile(p) => format!("profile {}", p.0),
        DeviceSelector::Aggregations(ids) => format!(
            "aggregations {}",
            ids.iter().map(|a| a.0.to_string()).collect::<Vec<_>>().join(",")
        ),
    };
    info!(
        "Config loaded (base_url={}, context={}, scenario={}, devices={}, from={}, to={}, working_dir={}, prefix={:?}, verify_tls={})",
        cfg.base_url,
        req.context_id.0,
        req.scenario_id.map(|s| s.0.to_string()).unwrap_or_else(|| "-".to_string()),
        devices,
        req.window.from.map(|d| d.to_rfc3339()).unwrap_or_else(|| "-".to_string()),
        req.window.to.map(|d| d.to_rfc3339()).unwrap_or_else(|| "-".to_string()),
        req.working_dir.display(),
        req.file_name_prefix,
        cfg.verify_tls
    );
    if !cfg.verify_tls {
        warn!("TLS certificate verification is disabled for {}", cfg.base_url);
    }

    // 2) Init DAP client
    let client = DapClient::new(&cfg.base_url, &cfg.private_token, cfg.verify_tls);

    // 3) Export
    let summary = export::get(&client, req).map_err(|e| format!("export failed: {}", e))?;
    for skipped in &summary.skipped {
        info!("Skipped device {}: {}", skipped.custom_id, skipped.reason);
    }
    info!(
        "Export complete: {} file(s) written to {}, {} device(s) skipped",
        summary.written.len(),
        req.working_dir.display(),
        summary.skipped.len()
    );

    Ok(())
}

fn configure_env_from_cli() -> Result<Option<LoadedEnvFile>, String> {
    let mut args = std::env::args_os();
    args.next(); // skip program name

    let mut env_file: Option<PathBuf> = None;
    while let Some(arg) = args.next() {
        let path = match arg.to_str() {
            Some("--env-file") => args
                .next()
                .map(PathBuf::from)
                .ok_or_else(|| "`--env-file` requires a path argument".to_string())?,
            Some(s) if s.starts_with("--env-file=") => match &s["--env-file=".len()..] {
                "" => return Err("`--env-file` requires a path argument".to_string()),
                p => PathBuf::from(p),
            },
            Some("--") => break,
            Some(other) => return Err(format!("unrecognised argument: {}", other)),
            None => return Err("argument contains invalid UTF-8".to_string()),
        };
        if env_file.replace(path).is_some() {
            return Err("`--env-file` provided more than once".to_string());
        }
    }

    let (path, explicit) = match env_file {
        Some(path) if !path.is_file() => return Err(format!("env file not found: {}", path.display())),
        Some(path) => (path, true),
        None => {
            let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
            let default_path = cwd.join(".env");
            if !default_path.is_file() {
                return Ok(None);
            }
            (default_path, false)
        }
    };
    let applied = load_env_file(&path)?;
    Ok(Some(LoadedEnvFile {
        path,
        explicit,
        applied,
    }))
}

fn main() {
    let loaded_env = match configure_env_from_cli() {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!(
            "Environment loaded from {} .env file: {} ({} variable(s) applied)",
            origin,
            info.path.display(),
            info.applied
        );
    }

    info!(
        "dap-export {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run() {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
