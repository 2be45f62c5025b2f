//! Process-wide tuning for token hierarchies.
//!
//! The current configuration lives in a versioned [Host]; hierarchies take a
//! snapshot at the start of each update, so a change made while an update is
//! running applies from the next one. Values can be changed programmatically or
//! loaded from `$XDG_CONFIG_HOME/lexhier/config.toml`.

use std::sync;

use lazy_static::lazy_static;
use serde_derive::Deserialize;
use tracing::debug;

use crate::model::versioned;

macro_rules! declare_config {
    [ $typename:ident {
        $($(#[doc = $doc:literal])* $name:ident : $type:ty = $default:expr),* $(,)?
    } ] => {
        #[derive(Clone, Debug)]
        pub struct $typename {
            $(
                $(#[doc = $doc])*
                pub $name: $type,
            )*

            stamp: $crate::model::versioned::Stamp,
        }

        impl Default for $typename {
            fn default() -> Self {
                Self {
                    $(
                        $name: $default,
                    )*

                    stamp: core::default::Default::default()
                }
            }
        }

        impl $typename {
            /// Applies a change directly, outside of any host.
            pub fn with(mut self, change: Change) -> Self {
                match change {
                    $(
                        Change::$name(value) => self.$name = value,
                    )*
                };
                self
            }
        }

        #[allow(non_camel_case_types)]
        #[derive(Debug, Clone, PartialEq)]
        pub enum Change {
            $(
                $name($type),
            )*
        }

        impl $crate::model::versioned::Versioned for $typename {
            type Change = Change;

            fn stamp(&self) -> versioned::Stamp {
                self.stamp
            }

            fn stamp_mut(&mut self) -> &mut versioned::Stamp {
                &mut self.stamp
            }
        }

        impl $crate::model::versioned::Change::<$typename> for Change {
            type ApplyError = ();
            type ApplyRecord = Self;

            fn apply(self, object: &mut $typename) -> Result<(Self, Self::ApplyRecord), Self::ApplyError> {
                match &self {
                    $(
                        Change::$name(value) => object.$name = value.clone(),
                    )*
                };
                Ok((self.clone(), self))
            }
        }

        /// The on-disk form. Every key is optional; missing keys keep their
        /// current value.
        #[derive(Debug, Default, Deserialize)]
        #[serde(default, deny_unknown_fields)]
        pub struct ConfigFile {
            $(
                pub $name: Option<$type>,
            )*
        }

        impl ConfigFile {
            pub fn changes(self) -> Vec<Change> {
                let mut changes = Vec::new();
                $(
                    if let Some(value) = self.$name {
                        changes.push(Change::$name(value));
                    }
                )*
                changes
            }
        }
    };
}

declare_config![Config {
    /// Consecutive matching tokens required before relexing stops. Zero is
    /// treated as one.
    resync_confirmations: usize = 1,

    /// Relexed tokens after which an update gives up and rebuilds the whole
    /// list. Zero means no limit.
    relex_limit: usize = 0,

    /// Before relexing, reread the lookahead window of the token ahead of the
    /// relex start in the old and new text, and rebuild from scratch if they differ.
    validate_resync: bool = true,

    /// Log every relexed token at trace level.
    trace_tokens: bool = false,
}];

pub type Host = versioned::Host<Config>;

lazy_static! {
    pub static ref INSTANCE: sync::Arc<Host> = sync::Arc::new(Host::default());
}

pub fn get() -> sync::Arc<Config> {
    INSTANCE.get()
}

pub fn set(change: Change) -> sync::Arc<Config> {
    match INSTANCE.change(change) {
        Ok((config, _)) => config,
        Err(()) => INSTANCE.get(),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Directories(xdg::BaseDirectoriesError),
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<xdg::BaseDirectoriesError> for ConfigError {
    fn from(e: xdg::BaseDirectoriesError) -> Self {
        ConfigError::Directories(e)
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "failed to parse config file: {}", e),
            ConfigError::Directories(e) => write!(f, "failed to locate config directory: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Directories(e) => Some(e),
        }
    }
}

/// Parses TOML into the changes it describes, without applying them.
pub fn parse(source: &str) -> Result<Vec<Change>, ConfigError> {
    let file: ConfigFile = toml::from_str(source)?;
    Ok(file.changes())
}

/// Parses TOML and applies it to `host`.
pub fn load_into(host: &Host, source: &str) -> Result<sync::Arc<Config>, ConfigError> {
    for change in parse(source)? {
        debug!(?change, "applying config change");
        /* config changes cannot fail */
        let _ = host.change(change);
    }
    Ok(host.get())
}

/// Loads the user's config file into [INSTANCE], if there is one.
pub fn load_user_config() -> Result<Option<sync::Arc<Config>>, ConfigError> {
    let directories = xdg::BaseDirectories::with_prefix("lexhier")?;

    match directories.find_config_file("config.toml") {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            let source = std::fs::read_to_string(&path)?;
            load_into(&INSTANCE, &source).map(Some)
        },
        None => Ok(None),
    }
}
