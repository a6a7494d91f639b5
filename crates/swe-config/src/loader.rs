use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Ordered list of config file locations searched from lowest to highest priority.
/// Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("/etc/swe-agent/config.toml"));

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/swe-agent/config.toml"));
    }
    if let Some(cfg) = dirs::config_dir() {
        let p = cfg.join("swe-agent/config.toml");
        if !paths.contains(&p) {
            paths.push(p);
        }
    }

    // Workspace-local
    paths.push(PathBuf::from(".swe-agent/config.toml"));
    paths.push(PathBuf::from("swe-agent.toml"));

    paths
}

fn read_layer(path: &Path) -> anyhow::Result<toml::Value> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Load configuration by merging all discovered TOML files.
/// The `extra` argument may provide an explicit path (the `--config` flag).
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    load_from(&config_search_paths(), extra)
}

fn load_from(search: &[PathBuf], extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = toml::Value::Table(toml::map::Map::new());

    for path in search {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            merge_toml(&mut merged, read_layer(path)?);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        merge_toml(&mut merged, read_layer(p)?);
    }

    let config = merged
        .try_into::<Config>()
        .context("merged configuration does not match the schema")?;
    Ok(config)
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_toml(dst: &mut toml::Value, src: toml::Value) {
    match (dst, src) {
        (toml::Value::Table(d), toml::Value::Table(s)) => {
            for (k, v) in s {
                match d.get_mut(&k) {
                    Some(existing) => merge_toml(existing, v),
                    None => {
                        d.insert(k, v);
                    }
                }
            }
        }
        (dst, src) => *dst = src,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn val(s: &str) -> toml::Value {
        toml::from_str(s).unwrap()
    }

    fn layer(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{body}").unwrap();
        f
    }

    #[test]
    fn merge_scalar_src_wins() {
        let mut dst = val(r#"x = 1"#);
        merge_toml(&mut dst, val(r#"x = 2"#));
        assert_eq!(dst["x"].as_integer(), Some(2));
    }

    #[test]
    fn merge_preserves_keys_not_in_src() {
        let mut dst = val("a = 1\nb = 2");
        merge_toml(&mut dst, val("b = 99"));
        assert_eq!(dst["a"].as_integer(), Some(1));
        assert_eq!(dst["b"].as_integer(), Some(99));
    }

    #[test]
    fn merge_nested_tables() {
        let mut dst = val("[agent]\nmax_iterations = 10\nmax_sub_agents = 2");
        merge_toml(&mut dst, val("[agent]\nmax_iterations = 20"));
        assert_eq!(dst["agent"]["max_sub_agents"].as_integer(), Some(2));
        assert_eq!(dst["agent"]["max_iterations"].as_integer(), Some(20));
    }

    #[test]
    fn merge_replaces_arrays_wholesale() {
        let mut dst = val(r#"namespaces = ["core", "web"]"#);
        merge_toml(&mut dst, val(r#"namespaces = ["core"]"#));
        assert_eq!(dst["namespaces"].as_array().map(|a| a.len()), Some(1));
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let result = load_from(&[], Some(Path::new("/tmp/swe_agent_nonexistent_xyz.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn no_layers_yields_defaults() {
        let cfg = load_from(&[], None).unwrap();
        assert_eq!(cfg.agent.max_iterations, 50);
        assert_eq!(cfg.model.provider, "openai");
    }

    #[test]
    fn later_layers_override_earlier_ones() {
        let base = layer("[agent]\nmax_iterations = 10\nmax_sub_agents = 5\n");
        let top = layer("[agent]\nmax_iterations = 99\n");
        let cfg = load_from(&[base.path().to_path_buf()], Some(top.path())).unwrap();
        assert_eq!(cfg.agent.max_iterations, 99);
        assert_eq!(cfg.agent.max_sub_agents, 5);
    }

    #[test]
    fn malformed_layer_reports_its_path() {
        let bad = layer("[agent\nmax_iterations = ");
        let err = load_from(&[], Some(bad.path())).unwrap_err();
        assert!(format!("{err:#}").contains("parsing"));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let bad = layer("[agent]\nmax_iterations = \"many\"\n");
        assert!(load_from(&[], Some(bad.path())).is_err());
    }
}
