//! Service configuration: optional YAML/JSON file, overridden by flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use facelog_faceid::DEFAULT_THRESHOLD;
use serde::Deserialize;

use crate::Args;

const DEFAULT_LISTEN: &str = ":8080";
const DEFAULT_LIVE_BUFFER: usize = 64;

/// Configuration file format. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    listen: Option<String>,
    /// Redb file path; `$VAR` / `${VAR}` is expanded.
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    threshold: Option<f64>,
    /// Dashboard directory; `$VAR` / `${VAR}` is expanded.
    #[serde(default)]
    static_dir: Option<String>,
    /// Live updates kept for slow subscribers before they start skipping.
    #[serde(default)]
    live_buffer: Option<usize>,
}

/// Effective configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub listen: String,
    /// `None` keeps everything in memory.
    pub data: Option<PathBuf>,
    pub threshold: f64,
    /// `None` serves the embedded index page.
    pub static_dir: Option<PathBuf>,
    pub live_buffer: usize,
}

impl ServiceConfig {
    /// Loads the file named by `--config` (if any) and applies flags on top.
    pub fn load(args: &Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => load_file(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::merge(file, args))
    }

    fn merge(file: FileConfig, args: &Args) -> Self {
        let data = args.data.clone().or_else(|| env_path(file.data.as_deref()));
        let static_dir = args
            .static_dir
            .clone()
            .or_else(|| env_path(file.static_dir.as_deref()));

        Self {
            listen: args
                .listen
                .clone()
                .or(file.listen)
                .unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
            data,
            static_dir,
            threshold: args.threshold.or(file.threshold).unwrap_or(DEFAULT_THRESHOLD),
            live_buffer: file.live_buffer.filter(|&n| n > 0).unwrap_or(DEFAULT_LIVE_BUFFER),
        }
    }
}

fn load_file(path: &Path) -> Result<FileConfig> {
    let data =
        std::fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    let cfg = match ext {
        "json" => serde_json::from_slice(&data)?,
        "yaml" | "yml" => serde_yaml::from_slice(&data)?,
        _ => anyhow::bail!("unsupported config extension: {}", path.display()),
    };
    Ok(cfg)
}

fn env_path(s: Option<&str>) -> Option<PathBuf> {
    s.map(expand_env).filter(|s| !s.is_empty()).map(PathBuf::from)
}

/// Expand environment variables in a string.
fn expand_env(s: &str) -> String {
    if let Some(rest) = s.strip_prefix('$') {
        // $VAR or ${VAR}
        let var_name = rest
            .strip_prefix('{')
            .and_then(|r| r.strip_suffix('}'))
            .unwrap_or(rest);
        std::env::var(var_name).unwrap_or_default()
    } else {
        s.to_string()
    }
}
