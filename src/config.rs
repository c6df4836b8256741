use std::{collections::HashMap, env, fs, path::Path, path::PathBuf};

use serde::Deserialize;

use crate::{NodeflowError, Result};

#[cfg(windows)]
const DEFAULT_INTERPRETER: &str = "python";
#[cfg(not(windows))]
const DEFAULT_INTERPRETER: &str = "python3";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// program used to run node entry scripts, defaults to python3
    pub interpreter: String,
    /// directory holding node bundles, created on first start
    pub node_dir: PathBuf,
    /// directory for generated invocation scripts
    pub scratch_dir: PathBuf,
    /// extra environment variables for every node process
    pub env: HashMap<String, String>,
    /// number of async worker threads, range [1, 32768), defaults to 16
    pub async_worker_thread_number: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interpreter: DEFAULT_INTERPRETER.to_string(),
            node_dir: PathBuf::from("nodes"),
            scratch_dir: env::temp_dir().join("nodeflow"),
            env: HashMap::new(),
            async_worker_thread_number: 16,
        }
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref()).map_err(|e| NodeflowError::Config(format!("failed to load config file {:?}: {}", path.as_ref(), e)))?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_str).map_err(|e| NodeflowError::Config(format!("failed to parse the toml str: {}", e)))?;
        if config.async_worker_thread_number == 0 {
            return Err(NodeflowError::Config("async_worker_thread_number must be at least 1".to_string()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use crate::Config;

    #[test]
    fn test_config_deserialize() {
        let toml_str = r#"
        interpreter = "/opt/python/bin/python3"
        node_dir = "/srv/nodes"
        async_worker_thread_number = 4

        [env]
        ROS_DOMAIN_ID = "7"
        "#;
        let config = Config::load_from_str(toml_str).unwrap();
        assert_eq!(config.interpreter, "/opt/python/bin/python3");
        assert_eq!(config.node_dir, PathBuf::from("/srv/nodes"));
        assert_eq!(config.async_worker_thread_number, 4);
        assert_eq!(config.env.get("ROS_DOMAIN_ID").map(String::as_str), Some("7"));
        assert!(config.scratch_dir.ends_with("nodeflow"));
    }

    #[test]
    fn test_config_defaults_and_errors() {
        let config = Config::load_from_str("").unwrap();
        assert_eq!(config.node_dir, PathBuf::from("nodes"));
        assert_eq!(config.async_worker_thread_number, 16);

        assert!(Config::load_from_str("async_worker_thread_number = 0").is_err());
        assert!(Config::load_from_str("interpreter = [").is_err());
        assert!(Config::create("/definitely/not/here.toml").is_err());
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodeflow.toml");
        std::fs::write(&path, "interpreter = \"python\"\n").unwrap();

        assert_eq!(Config::create(&path).unwrap().interpreter, "python");
    }
}
