use std::{
    collections::HashMap,
    env, fs,
    io::{BufRead, BufReader},
    path::PathBuf,
    time::Duration,
};

use directories::BaseDirs;

/// Key/value configuration: built-in defaults, overlaid by the rc file,
/// overlaid by environment variables (env wins).
#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let mut map = default_map();
        let config_path = default_config_path();

        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                let reader = BufReader::new(file);
                let text: String = reader
                    .lines()
                    .map_while(Result::ok)
                    .map(|l| l + "\n")
                    .collect();
                apply_rc_text(&mut map, &text);
            }
        }

        // Environment takes precedence over the rc file
        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Self { inner: map, config_path }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if let Ok(v) = env::var(key) {
            return Some(v);
        }
        self.inner.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(false)
    }

    pub fn script_path(&self) -> PathBuf {
        PathBuf::from(self.get("WOLFRAM_SCRIPT_PATH").unwrap_or_else(|| "wolframscript".into()))
    }

    pub fn kernel_path(&self) -> PathBuf {
        PathBuf::from(self.get("WOLFRAM_KERNEL_PATH").unwrap_or_else(|| "WolframKernel".into()))
    }

    pub fn use_kernel(&self) -> bool {
        self.get_bool("WOLFRAM_USE_KERNEL")
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.get_secs("WOLFRAM_DEFAULT_TIMEOUT", 30))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.get_secs("WOLFRAM_PROBE_TIMEOUT", 10))
    }

    pub fn max_concurrent(&self) -> usize {
        self.get("WOLFRAM_MAX_CONCURRENT")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n >= 1)
            .unwrap_or(4)
    }

    /// Extra error markers appended to the built-in set,
    /// semicolon-separated.
    pub fn extra_error_markers(&self) -> Vec<String> {
        self.get("WOLFRAM_ERROR_MARKERS")
            .map(|v| {
                v.split(';')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn get_secs(&self, key: &str, default: u64) -> u64 {
        self.get(key).and_then(|v| v.parse::<u64>().ok()).filter(|n| *n >= 1).unwrap_or(default)
    }
}

/// Parse `key = value` lines; `#` starts a comment, blank lines skipped.
fn apply_rc_text(map: &mut HashMap<String, String>, text: &str) {
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            map.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
}

fn is_config_key(k: &str) -> bool {
    k.starts_with("WOLFRAM_")
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("wolfram_bridge").join("config")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();
    m.insert("WOLFRAM_SCRIPT_PATH".into(), "wolframscript".into());
    m.insert("WOLFRAM_KERNEL_PATH".into(), "WolframKernel".into());
    m.insert("WOLFRAM_USE_KERNEL".into(), "false".into());
    m.insert("WOLFRAM_DEFAULT_TIMEOUT".into(), "30".into());
    m.insert("WOLFRAM_PROBE_TIMEOUT".into(), "10".into());
    m.insert("WOLFRAM_MAX_CONCURRENT".into(), "4".into());
    m
}
