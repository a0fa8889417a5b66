use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::settings::Settings;

pub fn settings_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .map(|home| home.join(".config/jobline/settings.ini"))
}

/// Reads settings from `path`, falling back to defaults when the file is
/// missing. Unknown keys and malformed values are ignored.
pub fn load_settings(path: &Path) -> io::Result<Settings> {
    let mut settings = Settings::default();
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(settings),
        Err(error) => return Err(error),
    };
    apply_settings_ini(&mut settings, &source);
    Ok(settings)
}

pub fn save_settings(path: &Path, settings: &Settings) -> io::Result<()> {
    write_atomic(path, &render_settings_ini(settings))
}

fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let stem = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("settings");
    let tmp = path.with_file_name(format!("{stem}.tmp-{}", std::process::id()));
    fs::write(&tmp, content)?;
    #[cfg(windows)]
    {
        match fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                fs::remove_file(path)?;
                fs::rename(tmp, path)
            }
            Err(error) => Err(error),
        }
    }
    #[cfg(not(windows))]
    {
        fs::rename(tmp, path)
    }
}

fn parse_ini_section_name(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.starts_with('[') && line.ends_with(']') {
        return Some(line[1..line.len() - 1].trim());
    }
    None
}

pub fn apply_settings_ini(settings: &mut Settings, source: &str) {
    let mut section = String::new();

    for raw_line in source.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(section_name) = parse_ini_section_name(line) {
            section = section_name.to_ascii_lowercase();
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            continue;
        };
        let key = raw_key.trim().to_ascii_lowercase();
        let value = raw_value.trim();

        match (section.as_str(), key.as_str()) {
            ("worker", "name") => {
                if !value.is_empty() {
                    settings.worker.name = value.to_string();
                }
            }
            ("worker", "stack_size") => {
                if value.is_empty() {
                    settings.worker.stack_size = None;
                } else if let Ok(parsed) = value.parse::<usize>() {
                    settings.worker.stack_size = (parsed > 0).then_some(parsed);
                }
            }
            ("worker", "join_timeout_ms") => {
                if let Ok(parsed) = value.parse::<u64>() {
                    settings.worker.join_timeout_ms = parsed.max(1);
                }
            }
            ("ui", "tick_rate_ms") => {
                if let Ok(parsed) = value.parse::<u64>() {
                    settings.ui.tick_rate_ms = parsed.max(1);
                }
            }
            ("ui", "history_limit") => {
                if let Ok(parsed) = value.parse::<usize>() {
                    settings.ui.history_limit = parsed.max(1);
                }
            }
            ("demo", "steps") => {
                if let Ok(parsed) = value.parse::<u32>() {
                    settings.demo.steps = parsed.max(1);
                }
            }
            ("demo", "step_delay_ms") => {
                if let Ok(parsed) = value.parse::<u64>() {
                    settings.demo.step_delay_ms = parsed;
                }
            }
            _ => {}
        }
    }
}

pub fn render_settings_ini(settings: &Settings) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "[worker]");
    let _ = writeln!(output, "name={}", settings.worker.name);
    let _ = writeln!(
        output,
        "stack_size={}",
        settings
            .worker
            .stack_size
            .map(|size| size.to_string())
            .unwrap_or_default()
    );
    let _ = writeln!(output, "join_timeout_ms={}", settings.worker.join_timeout_ms);
    let _ = writeln!(output);
    let _ = writeln!(output, "[ui]");
    let _ = writeln!(output, "tick_rate_ms={}", settings.ui.tick_rate_ms);
    let _ = writeln!(output, "history_limit={}", settings.ui.history_limit);
    let _ = writeln!(output);
    let _ = writeln!(output, "[demo]");
    let _ = writeln!(output, "steps={}", settings.demo.steps);
    let _ = writeln!(output, "step_delay_ms={}", settings.demo.step_delay_ms);
    output
}
