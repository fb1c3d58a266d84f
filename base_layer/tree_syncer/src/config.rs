// Copyright 2024. The Tari Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::time::Duration;

use config::{Config, ConfigError};
use log::*;
use serde::{Deserialize, Serialize};

use crate::TreeSyncerError;

const LOG_TARGET: &str = "tree_syncer::config";

/// Time allowed for fetching a single missing tree from a peer
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);
/// Number of missing trees fetched concurrently from a single peer
pub const DEFAULT_FETCH_CONCURRENCY: usize = 10;
/// Number of head exchanges run concurrently with a single peer
pub const DEFAULT_HEAD_CONCURRENCY: usize = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct TreeSyncConfig {
    /// The maximum time a fetch task may spend acquiring a missing tree, in milliseconds.
    /// Head exchanges are not bounded by this timeout.
    /// Default: 1,000 (1s)
    #[serde(with = "serializers::milliseconds")]
    pub request_timeout: Duration,
    /// The number of missing trees requested concurrently from each peer
    /// Default: 10
    pub fetch_concurrency: usize,
    /// The number of head exchanges run concurrently with each peer. Values greater than 1 give up the per-peer
    /// ordering of head exchanges.
    /// Default: 1
    pub head_concurrency: usize,
    /// The maximum number of tasks waiting to start in each pool. 0 means unbounded.
    /// Default: 0
    pub max_queued_tasks: usize,
}

impl TreeSyncConfig {
    /// The configuration section read by `load_from`
    pub const MAIN_KEY: &'static str = "tree_syncer";

    /// Loads the `tree_syncer` section from `config`. Missing values take their defaults and a missing section
    /// yields the default configuration.
    pub fn load_from(config: &Config) -> Result<Self, TreeSyncerError> {
        let config = match config.get::<Self>(Self::MAIN_KEY) {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => Self::default(),
            Err(err) => return Err(err.into()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TreeSyncerError> {
        if self.fetch_concurrency == 0 {
            return Err(TreeSyncerError::InvalidConfig(
                "fetch_concurrency must be greater than zero".to_string(),
            ));
        }
        if self.head_concurrency == 0 {
            return Err(TreeSyncerError::InvalidConfig(
                "head_concurrency must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(TreeSyncerError::InvalidConfig(
                "request_timeout must be greater than zero".to_string(),
            ));
        }
        if self.head_concurrency > 1 {
            warn!(
                target: LOG_TARGET,
                "head_concurrency is {}. Head updates with a peer may run concurrently and out of order.",
                self.head_concurrency
            );
        }
        Ok(())
    }
}

impl Default for TreeSyncConfig {
    fn default() -> Self {
        // NB: please remember to update field comments to reflect these defaults
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            head_concurrency: DEFAULT_HEAD_CONCURRENCY,
            max_queued_tasks: 0,
        }
    }
}

pub mod serializers {
    pub mod milliseconds {
        //! Helper module for serialising configuration variables from `Duration` to integers representing
        //! milliseconds and back. Use this converter by employing
        //! ```ignore
        //! use tree_syncer::serializers::milliseconds;
        //! ...
        //! #[serde(with = "milliseconds")]
        //! pub my_var: Duration
        //! ```
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
        where D: Deserializer<'de> {
            Ok(Duration::from_millis(u64::deserialize(deserializer)?))
        }

        pub fn serialize<S>(duration: &Duration, s: S) -> Result<S::Ok, S::Error>
        where S: Serializer {
            s.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
        }
    }
}

#[cfg(test)]
mod test {
    use treesync_test_utils::unpack_enum;

    use super::*;

    #[test]
    fn it_defaults_when_the_section_is_missing() {
        let config = Config::builder().build().unwrap();
        let tree_sync_config = TreeSyncConfig::load_from(&config).unwrap();
        assert_eq!(tree_sync_config, TreeSyncConfig::default());
        assert_eq!(tree_sync_config.request_timeout, Duration::from_secs(1));
        assert_eq!(tree_sync_config.fetch_concurrency, 10);
        assert_eq!(tree_sync_config.head_concurrency, 1);
    }

    #[test]
    fn it_loads_overrides() {
        let config = Config::builder()
            .set_override("tree_syncer.request_timeout", 250)
            .unwrap()
            .set_override("tree_syncer.fetch_concurrency", 4)
            .unwrap()
            .build()
            .unwrap();
        let tree_sync_config = TreeSyncConfig::load_from(&config).unwrap();
        assert_eq!(tree_sync_config.request_timeout, Duration::from_millis(250));
        assert_eq!(tree_sync_config.fetch_concurrency, 4);
        assert_eq!(tree_sync_config.head_concurrency, DEFAULT_HEAD_CONCURRENCY);
        assert_eq!(tree_sync_config.max_queued_tasks, 0);
    }

    #[test]
    fn it_loads_from_toml() {
        let toml = r#"
            [tree_syncer]
            request_timeout = 5000
            max_queued_tasks = 64
        "#;
        let config = Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap();
        let tree_sync_config = TreeSyncConfig::load_from(&config).unwrap();
        assert_eq!(tree_sync_config.request_timeout, Duration::from_secs(5));
        assert_eq!(tree_sync_config.max_queued_tasks, 64);
        assert_eq!(tree_sync_config.fetch_concurrency, DEFAULT_FETCH_CONCURRENCY);
    }

    #[test]
    fn it_rejects_zero_concurrency() {
        let config = Config::builder()
            .set_override("tree_syncer.fetch_concurrency", 0)
            .unwrap()
            .build()
            .unwrap();
        let err = TreeSyncConfig::load_from(&config).unwrap_err();
        unpack_enum!(TreeSyncerError::InvalidConfig(_msg) = err);

        let tree_sync_config = TreeSyncConfig {
            head_concurrency: 0,
            ..Default::default()
        };
        assert!(tree_sync_config.validate().is_err());
    }

    #[test]
    fn it_accepts_concurrent_head_updates() {
        let _ = env_logger::try_init();
        let tree_sync_config = TreeSyncConfig {
            head_concurrency: 4,
            ..Default::default()
        };
        tree_sync_config.validate().unwrap();
        assert!(TreeSyncConfig::default().validate().is_ok());
    }

    #[test]
    fn it_rejects_unknown_fields() {
        let config = Config::builder()
            .set_override("tree_syncer.fetch_workers", 3)
            .unwrap()
            .build()
            .unwrap();
        let err = TreeSyncConfig::load_from(&config).unwrap_err();
        unpack_enum!(TreeSyncerError::Config(_err) = err);
    }
}
