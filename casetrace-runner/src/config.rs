// Copyright (c) The casetrace Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! casetrace configuration.
//!
//! Configuration is read from an optional TOML file layered over the default config embedded in
//! the binary. Command-line flags are applied on top by the caller.

use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind},
    partition::SplitBy,
    resolver::ResolverOptions,
};
use bytesize::ByteSize;
use camino::{Utf8Path, Utf8PathBuf};
use config::{
    Config, ConfigBuilder, ConfigError, File, FileFormat, FileSourceFile, builder::DefaultState,
};
use serde::Deserialize;
use std::{collections::BTreeSet, fmt};
use tracing::warn;

/// The name of the config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "casetrace.toml";

/// The verbosity of the log written alongside the test output.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestLogLevel {
    /// Only critical errors.
    Critical,

    /// Errors.
    Error,

    /// Warnings and errors.
    Warning,

    /// Informational messages.
    Info,

    /// Everything.
    #[default]
    Debug,
}

impl TestLogLevel {
    /// All supported levels.
    pub const ALL: &'static [Self] = &[
        Self::Critical,
        Self::Error,
        Self::Warning,
        Self::Info,
        Self::Debug,
    ];

    /// Returns the name of the level.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    /// Returns the most verbose `tracing` level included at this level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Critical | Self::Error => tracing::Level::ERROR,
            Self::Warning => tracing::Level::WARN,
            Self::Info => tracing::Level::INFO,
            Self::Debug => tracing::Level::DEBUG,
        }
    }
}

impl fmt::Display for TestLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings under the `[run]` table.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunConfig {
    /// Report filtered-out cases as deselected.
    pub report_deselected: bool,

    /// How cases are grouped for sharding.
    pub split_by: SplitBy,

    /// Ignore expected-failure markers.
    pub run_xfail: bool,

    /// Default strictness for expected-failure markers.
    pub xfail_strict: bool,

    /// The level of the run log and of the per-case log files.
    pub test_log_level: TestLogLevel,

    /// The maximum canonical size of a result payload.
    pub result_max_size: ByteSize,
}

impl RunConfig {
    /// Returns the options passed to the status resolver.
    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            run_xfail: self.run_xfail,
            xfail_strict: self.xfail_strict,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CasetraceConfigDeserialize {
    run: RunConfig,
}

/// casetrace configuration, after layering.
#[derive(Clone, Debug)]
pub struct CasetraceConfig {
    config_file: Option<Utf8PathBuf>,
    run: RunConfig,
    unknown_keys: BTreeSet<String>,
}

impl CasetraceConfig {
    /// The default config, embedded in the binary.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Reads the config.
    ///
    /// If `config_file` is `None`, `casetrace.toml` in `working_dir` is used if it exists.
    /// Unknown keys are reported as warnings.
    pub fn from_sources(
        working_dir: &Utf8Path,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let config_file = match config_file {
            Some(config_file) => Some(config_file.to_owned()),
            None => {
                let candidate = working_dir.join(CONFIG_FILE_NAME);
                candidate.is_file().then_some(candidate)
            }
        };

        let mut builder = Self::make_default_config();
        if let Some(config_file) = &config_file {
            let source: File<FileSourceFile, FileFormat> =
                File::new(config_file.as_str(), FileFormat::Toml).required(true);
            builder = builder.add_source(source);
        }

        let error_path = config_file
            .clone()
            .unwrap_or_else(|| Utf8PathBuf::from("<default config>"));
        let (config, unknown_keys) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(error_path.clone(), kind))?;

        for key in &unknown_keys {
            warn!("ignoring unknown configuration key `{key}` in {error_path}");
        }

        Ok(Self {
            config_file,
            run: config.run,
            unknown_keys,
        })
    }

    /// Returns the default config.
    pub fn default_config() -> Result<Self, ConfigParseError> {
        let (config, unknown_keys) =
            Self::build_and_deserialize_config(&Self::make_default_config())
                .map_err(|kind| ConfigParseError::new("<default config>", kind))?;
        Ok(Self {
            config_file: None,
            run: config.run,
            unknown_keys,
        })
    }

    /// Returns the config file that was layered over the defaults, if any.
    pub fn config_file(&self) -> Option<&Utf8Path> {
        self.config_file.as_deref()
    }

    /// Returns the `[run]` settings.
    pub fn run(&self) -> &RunConfig {
        &self.run
    }

    /// Returns the keys that were present in the config but not understood.
    pub fn unknown_keys(&self) -> &BTreeSet<String> {
        &self.unknown_keys
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(CasetraceConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: CasetraceConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // The config crate also reports the key; drop it so it only appears once.
                let path = error.path().clone();
                let error = match error.into_inner() {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }
}
