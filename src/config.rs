//! Configuration loader (C10).
//!
//! A typed, immutable snapshot of every environment field, loaded once at
//! process start from a `config.toml` (or a bundled platform default) and
//! handed down as a plain value — nothing below the session runner reaches
//! back into the loader.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PrintMode {
    Quiet,
    ErrorOnly,
    Live,
    #[default]
    Verbose,
}

#[derive(Clone, Debug, Deserialize)]
struct RawConfig {
    general: General,
    output: Output,
    hotkeys: Hotkeys,
    compression: Compression,
    compilation: Compilation,
    execution: Execution,
    #[serde(default)]
    scheduling: Scheduling,
}

#[derive(Clone, Debug, Deserialize)]
struct General {
    range_start: String,
    range_end: String,
    workspace_path: PathBuf,
    #[serde(default)]
    ignore_old_errors: bool,
    #[serde(default)]
    path_spec: String,
}

#[derive(Clone, Debug, Deserialize)]
struct Output {
    subwindow_rows: u16,
    #[serde(default = "default_true")]
    show_tags_on_histogram: bool,
    color_enabled: bool,
    message_color: String,
    important_color: String,
    commit_color: String,
    good_color: String,
    error_color: String,
    warning_color: String,
    progress_foreground_color: String,
    progress_background_color: String,
    #[serde(default)]
    heatmap_colors: Vec<String>,
    #[serde(default)]
    print_mode: PrintMode,
}

#[derive(Clone, Debug, Deserialize)]
struct Hotkeys {
    enable_hotkeys: bool,
    #[serde(default)]
    mark_good: String,
    #[serde(default)]
    mark_bad: String,
}

#[derive(Clone, Debug, Deserialize)]
struct Compression {
    pack_size: usize,
}

#[derive(Clone, Debug, Deserialize)]
struct Compilation {
    #[serde(default)]
    compiler_flags: String,
    #[serde(default)]
    library_flags: String,
    binary_name: String,
}

#[derive(Clone, Debug, Deserialize)]
struct Execution {
    execution_parameters: String,
}

#[derive(Clone, Debug, Deserialize)]
struct Scheduling {
    #[serde(default = "default_background_decompression_layers")]
    background_decompression_layers: u32,
    #[serde(default = "default_extraction_pool_size")]
    extraction_pool_size: usize,
}

impl Default for Scheduling {
    fn default() -> Self {
        Self {
            background_decompression_layers: default_background_decompression_layers(),
            extraction_pool_size: default_extraction_pool_size(),
        }
    }
}

fn default_background_decompression_layers() -> u32 {
    2
}

fn default_extraction_pool_size() -> usize {
    2
}

fn default_true() -> bool {
    true
}

/// Immutable, fully-resolved configuration.
#[derive(Clone, Debug)]
pub struct Configuration {
    pub range_start: String,
    pub range_end: String,
    pub workspace_path: PathBuf,
    pub force: bool,
    pub ignore_old_errors: bool,
    pub path_spec: String,

    pub subwindow_rows: u16,
    pub show_tags_on_histogram: bool,
    pub color_enabled: bool,
    pub message_color: String,
    pub important_color: String,
    pub commit_color: String,
    pub good_color: String,
    pub error_color: String,
    pub warning_color: String,
    pub progress_foreground_color: String,
    pub progress_background_color: String,
    pub heatmap_colors: Vec<String>,
    pub print_mode: PrintMode,

    pub enable_hotkeys: bool,
    pub mark_good_hotkey: String,
    pub mark_bad_hotkey: String,

    pub compress_pack_size: usize,

    pub compiler_flags: String,
    pub binary_name: String,

    pub default_execution_parameters: String,

    pub background_decompression_layers: u32,
    pub extraction_pool_size: usize,
}

impl Configuration {
    /// Loads from an explicit path, or discovers `config.toml` in `cwd`, or
    /// falls back to a platform-default file bundled alongside the binary.
    pub fn load(explicit_path: Option<&Path>, cwd: &Path) -> Result<Self> {
        let mut searched = Vec::new();

        let path = if let Some(path) = explicit_path {
            if !path.exists() {
                return Err(Error::ConfigMissing { searched: vec![path.to_path_buf()] });
            }
            path.to_path_buf()
        } else {
            let candidate = cwd.join("config.toml");
            searched.push(candidate.clone());
            if candidate.exists() {
                candidate
            } else {
                let default = default_config_path();
                searched.push(default.clone());
                if default.exists() {
                    default
                } else {
                    return Err(Error::ConfigMissing { searched });
                }
            }
        };

        let text = std::fs::read_to_string(&path)?;
        let raw: RawConfig =
            toml::from_str(&text).map_err(|source| Error::ConfigInvalid { path: path.clone(), source })?;

        let force = is_subdirectory(&raw.general.workspace_path, cwd);

        Ok(Self {
            range_start: raw.general.range_start,
            range_end: raw.general.range_end,
            workspace_path: raw.general.workspace_path,
            force,
            ignore_old_errors: raw.general.ignore_old_errors,
            path_spec: raw.general.path_spec,

            subwindow_rows: raw.output.subwindow_rows,
            show_tags_on_histogram: raw.output.show_tags_on_histogram,
            color_enabled: raw.output.color_enabled,
            message_color: raw.output.message_color,
            important_color: raw.output.important_color,
            commit_color: raw.output.commit_color,
            good_color: raw.output.good_color,
            error_color: raw.output.error_color,
            warning_color: raw.output.warning_color,
            progress_foreground_color: raw.output.progress_foreground_color,
            progress_background_color: raw.output.progress_background_color,
            heatmap_colors: raw.output.heatmap_colors,
            print_mode: raw.output.print_mode,

            enable_hotkeys: raw.hotkeys.enable_hotkeys,
            mark_good_hotkey: raw.hotkeys.mark_good,
            mark_bad_hotkey: raw.hotkeys.mark_bad,

            compress_pack_size: raw.compression.pack_size,

            compiler_flags: format!("{} {}", raw.compilation.compiler_flags, raw.compilation.library_flags),
            binary_name: raw.compilation.binary_name,

            default_execution_parameters: raw.execution.execution_parameters,

            background_decompression_layers: raw.scheduling.background_decompression_layers,
            extraction_pool_size: raw.scheduling.extraction_pool_size,
        })
    }
}

fn default_config_path() -> PathBuf {
    if cfg!(target_os = "windows") {
        PathBuf::from("default_windows_config.toml")
    } else if cfg!(target_os = "macos") {
        PathBuf::from("default_macos_config.toml")
    } else {
        PathBuf::from("default_config.toml")
    }
}

/// True when `path` is nested under `directory` — the heuristic used to
/// derive `force` (a workspace the tool owns outright is assumed scratch).
fn is_subdirectory(path: &Path, directory: &Path) -> bool {
    let Ok(path) = path.canonicalize() else { return false };
    let Ok(directory) = directory.canonicalize() else { return false };
    path.starts_with(&directory) && path != directory
}
