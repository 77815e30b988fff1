//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::fs;
use std::net::TcpListener;
use std::path::PathBuf;

use assert_cmd::Command;
use tempfile::TempDir;

/// Command for the peer-review binary with a clean environment
pub fn peer_review_cmd() -> Command {
    let mut cmd = Command::cargo_bin("peer-review").unwrap();
    for (key, _) in std::env::vars() {
        if key.starts_with("PEER_REVIEW_") {
            cmd.env_remove(key);
        }
    }
    cmd
}

/// A config file in its own temporary directory
pub struct ConfigFixture {
    _temp_dir: TempDir,
    config_path: PathBuf,
}

impl ConfigFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        Self {
            _temp_dir: temp_dir,
            config_path,
        }
    }

    pub fn with_content(content: &str) -> Self {
        let fixture = Self::new();
        fs::write(&fixture.config_path, content).unwrap();
        fixture
    }

    pub fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }
}

/// A port that was free a moment ago
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
