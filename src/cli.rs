use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::codec::Direction;

#[derive(Parser)]
#[command(name = "ots")]
#[command(about = "Command line client for the OTS tabular-storage service", long_about = None)]
pub struct Cli {
    #[arg(short, long, help = "Path to the configuration file", default_value = "config/ots.toml")]
    pub config: PathBuf,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the tables of the configured instance
    ListTables,
    /// Show the schema and reserved throughput of a table
    DescribeTable {
        #[arg(short, long, help = "Table name")]
        table: String,
    },
    /// Read a single row by primary key
    GetRow {
        #[arg(short, long, help = "Table name")]
        table: String,
        #[arg(
            short,
            long,
            help = "Primary key as a JSON object in schema order, e.g. '{\"uid\": 1, \"name\": \"a\"}'"
        )]
        pk: String,
        #[arg(
            long,
            value_delimiter = ',',
            help = "Comma separated columns to return. All columns when omitted"
        )]
        columns: Vec<String>,
    },
    /// Read the rows between two primary keys, following continuation pages
    GetRange {
        #[arg(short, long, help = "Table name")]
        table: String,
        #[arg(long, help = "Inclusive start key as a JSON object, '{\"$inf\": \"min\"}' for unbounded")]
        start: String,
        #[arg(long, help = "Exclusive end key as a JSON object, '{\"$inf\": \"max\"}' for unbounded")]
        end: String,
        #[arg(long, default_value = "FORWARD", help = "FORWARD or BACKWARD")]
        direction: Direction,
        #[arg(long, help = "Stop after this many rows")]
        max_rows: Option<usize>,
        #[arg(
            long,
            value_delimiter = ',',
            help = "Comma separated columns to return. All columns when omitted"
        )]
        columns: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_row_arguments() {
        let cli = Cli::try_parse_from([
            "ots", "get-row", "--table", "users", "--pk", r#"{"uid": 1}"#, "--columns", "name,age",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("config/ots.toml"));
        match cli.command {
            Commands::GetRow { table, pk, columns } => {
                assert_eq!(table, "users");
                assert_eq!(pk, r#"{"uid": 1}"#);
                assert_eq!(columns, vec!["name".to_string(), "age".to_string()]);
            },
            _ => panic!("expected get-row"),
        }
    }

    #[test]
    fn config_path_is_global_to_commands() {
        let cli = Cli::try_parse_from(["ots", "--config", "/etc/ots.toml", "list-tables"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/ots.toml"));
        assert!(matches!(cli.command, Commands::ListTables));
    }

    #[test]
    fn get_range_parses_direction() {
        let cli = Cli::try_parse_from([
            "ots", "get-range", "-t", "users", "--start", r#"{"uid": 1}"#, "--end", r#"{"uid": 9}"#, "--direction",
            "BACKWARD", "--max-rows", "10",
        ])
        .unwrap();

        match cli.command {
            Commands::GetRange {
                direction, max_rows, columns, ..
            } => {
                assert_eq!(direction, Direction::Backward);
                assert_eq!(max_rows, Some(10));
                assert!(columns.is_empty());
            },
            _ => panic!("expected get-range"),
        }

        let cli = Cli::try_parse_from(["ots", "get-range", "-t", "users", "--start", "{}", "--end", "{}"]).unwrap();
        assert!(matches!(cli.command, Commands::GetRange { direction: Direction::Forward, .. }));
    }

    #[test]
    fn get_range_rejects_unknown_direction() {
        let err = Cli::try_parse_from([
            "ots", "get-range", "-t", "users", "--start", "{}", "--end", "{}", "--direction", "SIDEWAYS",
        ])
        .err()
        .unwrap();
        assert!(err.to_string().contains("direction should be one of [FORWARD, BACKWARD]"), "{}", err);
    }

    #[test]
    fn describe_table_requires_a_table() {
        assert!(Cli::try_parse_from(["ots", "describe-table"]).is_err());
    }
}
