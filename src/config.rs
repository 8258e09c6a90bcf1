use std::env;
use std::path::PathBuf;

/// How the relational store is run by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Member of a replicated deployment; shutdown hands leadership over first.
    Replicated,
    SingleNode,
}

impl std::str::FromStr for StoreMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replicated" => Ok(StoreMode::Replicated),
            "single" | "single-node" | "sqlite" => Ok(StoreMode::SingleNode),
            other => Err(format!("unknown store mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: String,
    pub db_name: String,
    pub store_mode: StoreMode,
    pub node_address: String,
    pub cluster_peers: Vec<String>,
    pub handover_timeout_secs: u64,
    pub max_db_connections: u32,
    pub tombstone_grace_secs: i64,
    pub tombstone_sweep_interval_secs: u64,
    pub download_chunk_size: usize,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env::var("PORT").unwrap_or_else(|_| "8080".into());
        let store_mode = env::var("STORE_MODE").unwrap_or_else(|_| "replicated".into());

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: port
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a number, got {}", port))?,
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "/data".into()),
            db_name: env::var("DB_NAME").unwrap_or_else(|_| "airgap".into()),
            store_mode: store_mode.parse().map_err(anyhow::Error::msg)?,
            node_address: env::var("NODE_ADDRESS").unwrap_or_else(|_| "127.0.0.1:8080".into()),
            cluster_peers: env::var("CLUSTER_PEERS")
                .map(|v| parse_peers(&v))
                .unwrap_or_default(),
            handover_timeout_secs: parse_env("HANDOVER_TIMEOUT_SECS", 30),
            max_db_connections: parse_env("MAX_DB_CONNECTIONS", 5),
            tombstone_grace_secs: parse_env("TOMBSTONE_GRACE_SECS", 12 * 60 * 60),
            tombstone_sweep_interval_secs: parse_env("TOMBSTONE_SWEEP_INTERVAL_SECS", 600),
            download_chunk_size: parse_env("DOWNLOAD_CHUNK_SIZE", 64 * 1024),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
        })
    }

    /// Directory holding the database files of this process.
    ///
    /// Replicas on the same host are kept apart by their node address.
    pub fn database_dir(&self) -> PathBuf {
        let root = PathBuf::from(&self.data_dir);
        match self.store_mode {
            StoreMode::Replicated => root.join(self.node_address.replace(':', "_")),
            StoreMode::SingleNode => root,
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_dir().join(format!("{}.db", self.db_name))
    }
}

fn parse_peers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_peers_skips_blanks() {
        assert_eq!(
            parse_peers(" 10.0.0.2:8080, ,10.0.0.3:8080,"),
            vec!["10.0.0.2:8080".to_string(), "10.0.0.3:8080".to_string()]
        );
    }

    #[test]
    fn test_store_mode_from_str() {
        assert_eq!("Replicated".parse::<StoreMode>(), Ok(StoreMode::Replicated));
        assert_eq!("single".parse::<StoreMode>(), Ok(StoreMode::SingleNode));
        assert!("raft".parse::<StoreMode>().is_err());
    }
}
