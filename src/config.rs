//! Configuration types for contact-lake
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::error::ConfigError;
use crate::export::partition::{DateFormat, DateRangeMode, OverwriteMode};
use clap::Parser;
use std::path::PathBuf;

/// Maximum lookback for LAST_N_HOURS exports
const MAX_LOOKBACK_HOURS: u32 = 720;

/// Fetch row ceiling limits
const MIN_FETCH_ROWS: usize = 1;
const MAX_FETCH_ROWS: usize = 100_000;

/// Store paging limits
const MIN_PAGE_SIZE: usize = 1;
const MAX_PAGE_SIZE: usize = 10_000;

/// Contact record export pipeline with a SQL query gateway
#[derive(Parser, Debug, Clone)]
#[command(
    name = "contact-lake",
    version,
    about = "Exports contact records into a partitioned Parquet lake and serves SQL over it",
    long_about = "Pages contact records out of an indexed source store, derives date \
                  partitions, writes one ZSTD Parquet file per partition, and keeps an \
                  append-only column catalog in sync as the record shape evolves.\n\n\
                  The serve subcommand exposes the lake through a SELECT-only SQL gateway \
                  with asynchronous query executions and CSV downloads.",
    after_help = "EXAMPLES:\n    \
        contact-lake seed --count 500\n    \
        contact-lake bootstrap\n    \
        contact-lake export --range previous-day\n    \
        contact-lake export --range last-n-hours --lookback-hours 6 --overwrite append\n    \
        contact-lake serve --port 8080"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Source store directory
    #[arg(long, default_value = "contacts.rocks", value_name = "PATH", global = true)]
    pub store: PathBuf,

    /// Lake root directory (data files, catalog, query results)
    #[arg(long, default_value = "lake", value_name = "DIR", global = true)]
    pub lake_dir: PathBuf,

    /// Object key prefix for data files under the lake root
    #[arg(long, default_value = "exports", value_name = "PREFIX", global = true)]
    pub prefix: String,

    /// Lake table name
    #[arg(long, default_value = "contacts", value_name = "NAME", global = true)]
    pub table: String,

    /// Long-format unpivot view name
    #[arg(long, default_value = "contacts_long", value_name = "NAME", global = true)]
    pub view: String,

    /// Source partition-key attribute
    #[arg(long, default_value = "Channel", value_name = "ATTR", global = true)]
    pub partition_attribute: String,

    /// Partition-key value exported per run
    #[arg(long, default_value = "CHAT", value_name = "VALUE", global = true)]
    pub partition_value: String,

    /// Record attribute holding the event date
    #[arg(long, default_value = "InitiationTimestamp", value_name = "ATTR", global = true)]
    pub date_attribute: String,

    /// How the source encodes the date attribute
    #[arg(long, value_enum, default_value_t = DateFormat::Iso, global = true)]
    pub date_format: DateFormat,

    /// Derived canonical date column materialized during export
    #[arg(long, default_value = "report_date", value_name = "NAME", global = true)]
    pub date_column: String,

    /// Suffix marking question columns for the unpivot view
    #[arg(long, default_value = "_question", value_name = "SUFFIX", global = true)]
    pub question_suffix: String,

    /// Verbose output (debug-level logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

/// Subcommands
#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Load synthetic contact records into the source store
    Seed {
        /// Number of records to generate
        #[arg(long, default_value = "200", value_name = "NUM")]
        count: usize,
    },

    /// Create the lake table from a sample of the source store
    Bootstrap {
        /// Maximum records to sample for type inference
        #[arg(long, default_value = "1000", value_name = "NUM")]
        sample_limit: usize,
    },

    /// Run one export covering a date window
    Export {
        /// Which window to export
        #[arg(long, value_enum, default_value_t = DateRangeMode::PreviousDay)]
        range: DateRangeMode,

        /// Hours of lookback for last-n-hours mode
        #[arg(long, default_value = "24", value_name = "HOURS")]
        lookback_hours: u32,

        /// File placement policy per partition
        #[arg(long, value_enum, default_value_t = OverwriteMode::Overwrite)]
        overwrite: OverwriteMode,

        /// Records per store page
        #[arg(long, default_value = "500", value_name = "NUM")]
        page_size: usize,
    },

    /// Start the SQL query gateway
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Bind address
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,

        /// Ceiling on rows per result fetch
        #[arg(long, default_value = "20000", value_name = "NUM")]
        max_fetch_rows: usize,

        /// Lifetime of download URLs in seconds
        #[arg(long, default_value = "3600", value_name = "SECS")]
        download_ttl_secs: u64,

        /// Wall-clock budget for server-side poll loops in seconds
        #[arg(long, default_value = "30", value_name = "SECS")]
        poll_budget_secs: u64,
    },
}

/// Validated runtime configuration shared by every subcommand.
#[derive(Debug, Clone)]
pub struct LakeConfig {
    pub store_path: PathBuf,
    pub lake_dir: PathBuf,
    pub prefix: String,
    pub table: String,
    pub view: String,
    pub partition_attribute: String,
    pub partition_value: String,
    pub date_attribute: String,
    pub date_format: DateFormat,
    pub date_column: String,
    pub question_suffix: String,
}

impl LakeConfig {
    /// Create and validate configuration from CLI arguments.
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        if args.partition_attribute.trim().is_empty() {
            return Err(ConfigError::InvalidPartitionKey(
                "partition attribute must not be empty".to_string(),
            ));
        }
        if args.partition_value.trim().is_empty() {
            return Err(ConfigError::InvalidPartitionKey(
                "partition value must not be empty".to_string(),
            ));
        }
        if args.date_attribute.trim().is_empty() {
            return Err(ConfigError::InvalidPartitionKey(
                "date attribute must not be empty".to_string(),
            ));
        }

        if let Some(parent) = args.lake_dir.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidPath {
                    path: args.lake_dir.display().to_string(),
                    reason: format!("parent directory '{}' does not exist", parent.display()),
                });
            }
        }

        match &args.command {
            Command::Export {
                range,
                lookback_hours,
                page_size,
                ..
            } => {
                if *range == DateRangeMode::LastNHours
                    && (*lookback_hours == 0 || *lookback_hours > MAX_LOOKBACK_HOURS)
                {
                    return Err(ConfigError::InvalidLookback {
                        hours: *lookback_hours,
                        max: MAX_LOOKBACK_HOURS,
                    });
                }
                if *page_size < MIN_PAGE_SIZE || *page_size > MAX_PAGE_SIZE {
                    return Err(ConfigError::InvalidPageSize {
                        size: *page_size,
                        min: MIN_PAGE_SIZE,
                        max: MAX_PAGE_SIZE,
                    });
                }
            }
            Command::Bootstrap { sample_limit } => {
                if *sample_limit == 0 {
                    return Err(ConfigError::InvalidSampleLimit {
                        limit: *sample_limit,
                    });
                }
            }
            Command::Serve { max_fetch_rows, .. } => {
                if *max_fetch_rows < MIN_FETCH_ROWS || *max_fetch_rows > MAX_FETCH_ROWS {
                    return Err(ConfigError::InvalidFetchRows {
                        rows: *max_fetch_rows,
                        min: MIN_FETCH_ROWS,
                        max: MAX_FETCH_ROWS,
                    });
                }
            }
            Command::Seed { .. } => {}
        }

        Ok(Self {
            store_path: args.store.clone(),
            lake_dir: args.lake_dir.clone(),
            prefix: args.prefix.clone(),
            table: args.table.clone(),
            view: args.view.clone(),
            partition_attribute: args.partition_attribute.clone(),
            partition_value: args.partition_value.clone(),
            date_attribute: args.date_attribute.clone(),
            date_format: args.date_format,
            date_column: args.date_column.clone(),
            question_suffix: args.question_suffix.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["contact-lake", "export"]);
        let config = LakeConfig::from_args(&args).unwrap();
        assert_eq!(config.prefix, "exports");
        assert_eq!(config.table, "contacts");
        assert_eq!(config.view, "contacts_long");
        assert_eq!(config.partition_value, "CHAT");
        assert_eq!(config.date_format, DateFormat::Iso);
        assert_eq!(config.date_column, "report_date");
        assert_eq!(config.question_suffix, "_question");
    }

    #[test]
    fn test_lookback_validation() {
        let args = parse(&[
            "contact-lake",
            "export",
            "--range",
            "last-n-hours",
            "--lookback-hours",
            "0",
        ]);
        assert!(matches!(
            LakeConfig::from_args(&args),
            Err(ConfigError::InvalidLookback { .. })
        ));

        // Lookback is ignored outside last-n-hours mode
        let args = parse(&[
            "contact-lake",
            "export",
            "--range",
            "previous-day",
            "--lookback-hours",
            "0",
        ]);
        assert!(LakeConfig::from_args(&args).is_ok());
    }

    #[test]
    fn test_fetch_rows_validation() {
        let args = parse(&["contact-lake", "serve", "--max-fetch-rows", "0"]);
        assert!(matches!(
            LakeConfig::from_args(&args),
            Err(ConfigError::InvalidFetchRows { .. })
        ));
    }

    #[test]
    fn test_sample_limit_validation() {
        let args = parse(&["contact-lake", "bootstrap", "--sample-limit", "0"]);
        assert!(matches!(
            LakeConfig::from_args(&args),
            Err(ConfigError::InvalidSampleLimit { .. })
        ));
    }

    #[test]
    fn test_empty_partition_value_rejected() {
        let args = parse(&["contact-lake", "export", "--partition-value", " "]);
        assert!(matches!(
            LakeConfig::from_args(&args),
            Err(ConfigError::InvalidPartitionKey(_))
        ));
    }

    #[test]
    fn test_date_format_values() {
        let args = parse(&["contact-lake", "export", "--date-format", "epoch"]);
        assert_eq!(args.date_format, DateFormat::Epoch);
        let args = parse(&["contact-lake", "export", "--date-format", "human-readable"]);
        assert_eq!(args.date_format, DateFormat::HumanReadable);
    }
}
