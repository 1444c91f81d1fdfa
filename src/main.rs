use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use serde_json::{Value as JsonValue, json};

use ots_client::cli::{Cli, Commands};
use ots_client::codec::{
    CapacityUnit, DescribeTableResponse, GetRangeRequest, GetRangeResponse, GetRowRequest, GetRowResponse, Row,
};
use ots_client::config::load_configuration;
use ots_client::logging::init_logging;
use ots_client::{OtsClient, PrimaryKey};

fn describe_json(table: &DescribeTableResponse) -> JsonValue {
    let primary_key: Vec<JsonValue> = table
        .table_meta
        .schema_of_primary_key
        .iter()
        .map(|(name, column_type)| json!({ "name": name, "type": column_type.as_str() }))
        .collect();
    let details = &table.reserved_throughput_details;

    json!({
        "table_name": table.table_meta.table_name,
        "primary_key": primary_key,
        "reserved_throughput": {
            "read": details.capacity_unit.read,
            "write": details.capacity_unit.write,
            "last_increase_time": details.last_increase_time.to_rfc3339(),
            "last_decrease_time": details.last_decrease_time.map(|t| t.to_rfc3339()),
            "number_of_decreases_today": details.number_of_decreases_today,
        },
    })
}

fn consumed_json(consumed: &CapacityUnit) -> JsonValue {
    json!({ "read": consumed.read, "write": consumed.write })
}

fn row_entry(row: &Row) -> JsonValue {
    json!({
        "primary_key": JsonValue::from(&row.primary_key),
        "attributes": JsonValue::from(&row.attributes),
    })
}

fn row_json(response: &GetRowResponse) -> JsonValue {
    json!({
        "consumed": consumed_json(&response.consumed),
        "row": response.row.as_ref().map(row_entry),
    })
}

fn range_json(response: &GetRangeResponse) -> JsonValue {
    json!({
        "consumed": consumed_json(&response.consumed),
        "rows": response.rows.iter().map(row_entry).collect::<Vec<_>>(),
        "next_start_primary_key": response.next_start_primary_key.as_ref().map(JsonValue::from),
    })
}

fn parse_key(raw: &str, flag: &str) -> Result<PrimaryKey> {
    let value: JsonValue = serde_json::from_str(raw).with_context(|| format!("{} is not valid JSON", flag))?;
    PrimaryKey::try_from(value).with_context(|| format!("{} is not a valid primary key", flag))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let config = load_configuration(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    let client = OtsClient::new(&config).context("Failed to create OTS client")?;
    info!(endpoint = client.endpoint().as_str(), instance = client.instance_name(); "Client ready");

    let output = match cli.command {
        Commands::ListTables => {
            let tables = client.list_table().await.context("ListTable failed")?;
            json!(tables)
        },
        Commands::DescribeTable { table } => {
            let response = client
                .describe_table(&table)
                .await
                .with_context(|| format!("DescribeTable failed for {}", table))?;
            describe_json(&response)
        },
        Commands::GetRow { table, pk, columns } => {
            let primary_key = parse_key(&pk, "--pk")?;
            let request = GetRowRequest::new(table.as_str(), primary_key).columns_to_get(columns);
            let response = client
                .get_row(&request)
                .await
                .with_context(|| format!("GetRow failed for {}", table))?;
            row_json(&response)
        },
        Commands::GetRange {
            table,
            start,
            end,
            direction,
            max_rows,
            columns,
        } => {
            let request = GetRangeRequest::new(
                table.as_str(),
                direction,
                parse_key(&start, "--start")?,
                parse_key(&end, "--end")?,
            )
            .columns_to_get(columns);
            let response = client
                .get_range_all(&request, max_rows)
                .await
                .with_context(|| format!("GetRange failed for {}", table))?;
            range_json(&response)
        },
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
