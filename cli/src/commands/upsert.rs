use std::{
    collections::BTreeMap,
    fs,
    io::{self, Read},
    path::Path,
    time::Duration,
};

use bulk_upsert::{
    build_upsert_statement, classify_columns, get_table_columns, split_batches,
    upsert_field_maps, FieldMap, OutcomeKind, PostgresClient, TableConventions, UpsertOptions,
    UpsertResult,
};
use serde_json::Value;

use crate::{
    cli_interface::UpsertArgs,
    console::{print_error_message, print_outcome_summary, print_success_message, print_warn_message},
};

/// Options file first, then any flag given on the command line on top.
pub fn resolve_options(args: &UpsertArgs) -> Result<UpsertOptions, String> {
    let mut options = match &args.config {
        Some(path) => UpsertOptions::from_yaml_file(path)
            .map_err(|e| format!("Could not load options from {}: {}", path.display(), e))?,
        None => UpsertOptions::new(Vec::<String>::new()),
    };

    if !args.unique_by.is_empty() {
        options.unique_by = args.unique_by.clone();
    }
    if let Some(batch_size) = args.batch_size {
        options.batch_size = batch_size;
    }
    if !args.excluded_from_change_detection.is_empty() {
        options.excluded_from_change_detection = args.excluded_from_change_detection.clone();
    }
    if !args.non_updatable.is_empty() {
        options.non_updatable = args.non_updatable.clone();
    }
    if !args.returning.is_empty() {
        options = options.with_returning(args.returning.iter().copied());
    }
    if let Some(timeout_secs) = args.timeout_secs {
        options = options.with_timeout(Duration::from_secs(timeout_secs));
    }

    if options.unique_by.is_empty() {
        return Err("No conflict key given, pass --unique-by or set unique_by in the options file"
            .to_string());
    }

    Ok(options)
}

/// Accepts a JSON array of objects or a single object.
pub fn parse_rows(json: &str) -> Result<Vec<FieldMap>, String> {
    let value: Value = serde_json::from_str(json).map_err(|e| format!("Invalid JSON input: {}", e))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => return Ok(vec![map]),
        _ => return Err("Input must be a JSON array of objects".to_string()),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(map) => Ok(map),
            other => Err(format!("Item {} is not an object: {}", index, other)),
        })
        .collect()
}

fn read_input(input: Option<&Path>) -> Result<String, String> {
    match input {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .map_err(|e| format!("Could not read {}: {}", path.display(), e)),
        _ => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| format!("Could not read stdin: {}", e))?;
            Ok(buffer)
        }
    }
}

fn conventions_for(args: &UpsertArgs) -> TableConventions {
    let conventions = TableConventions::new(args.table.as_str());
    match &args.identity_column {
        Some(column) => conventions.with_identity_column(column.as_str()),
        None => conventions,
    }
}

/// Returned rows keyed by outcome tag, in the order they were reported.
pub fn rows_by_outcome(result: UpsertResult<FieldMap>) -> BTreeMap<OutcomeKind, Vec<FieldMap>> {
    result.into_map().into_iter().collect()
}

async fn connect(args: &UpsertArgs) -> Result<PostgresClient, Box<dyn std::error::Error>> {
    let client = match &args.database_url {
        Some(url) => PostgresClient::connect(url).await,
        None => PostgresClient::new().await,
    };

    client.map_err(|e| {
        print_error_message(&format!("Could not connect to Postgres, make sure your connection string is mapping in the .env correctly: trace: {}", e));
        e.into()
    })
}

async fn print_statements(
    client: &PostgresClient,
    conventions: &TableConventions,
    rows: &[FieldMap],
    options: &UpsertOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let batch_size = options.validate()?;
    let columns = get_table_columns(client, &conventions.table_name).await?.unwrap_or_default();
    let plan = classify_columns(conventions, &columns, rows, options)?;

    for batch in split_batches(rows, batch_size) {
        let statement = build_upsert_statement(&plan, batch.rows, &options.returning);
        println!("-- batch {} ({} rows)\n{};\n", batch.index, batch.len(), statement);
    }

    Ok(())
}

pub async fn handle_upsert_command(args: &UpsertArgs) -> Result<(), Box<dyn std::error::Error>> {
    let options = resolve_options(args).map_err(|e| {
        print_error_message(&e);
        e
    })?;

    let rows = read_input(args.input.as_deref()).and_then(|json| parse_rows(&json)).map_err(|e| {
        print_error_message(&e);
        e
    })?;

    if rows.is_empty() {
        print_warn_message("No rows in the input. Nothing to upsert.");
        return Ok(());
    }

    let conventions = conventions_for(args);
    let client = connect(args).await?;

    if args.dry_run {
        return print_statements(&client, &conventions, &rows, &options).await.map_err(|e| {
            print_error_message(&format!("Could not render the upsert statements: {}", e));
            e
        });
    }

    let result = upsert_field_maps(&client, &conventions, &rows, &options).await.map_err(|e| {
        print_error_message(&format!("Upsert into {} failed: trace: {}", conventions.table_name, e));
        e
    })?;

    print_success_message(&format!("Upserted {} rows into {}", rows.len(), conventions.table_name));
    print_outcome_summary(&result);

    if args.print_rows {
        println!("{}", serde_json::to_string_pretty(&rows_by_outcome(result))?);
    }

    Ok(())
}
