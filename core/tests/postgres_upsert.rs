//! End to end upserts against a real PostgreSQL.
//!
//! Every test returns early when `DATABASE_URL` is not set, so `cargo test` stays
//! green on machines without a database. Each test works on its own table.

use bulk_upsert::{
    connection_string, upsert, upsert_field_maps, FieldMap, OutcomeKind, PostgresClient,
    PostgresTransaction, TableConventions, UpsertOptions, UpsertRecord, UpsertResult,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Member {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    email: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,
}

impl UpsertRecord for Member {
    const TABLE_NAME: &'static str = "bulk_upsert_it_members";
}

fn member(email: &str, name: &str) -> Member {
    Member {
        id: None,
        email: email.to_string(),
        name: name.to_string(),
        profile: None,
        created_at: None,
        updated_at: None,
    }
}

async fn client() -> Option<PostgresClient> {
    if connection_string().is_err() {
        eprintln!("DATABASE_URL not set, skipping postgres upsert test");
        return None;
    }

    match PostgresClient::new().await {
        Ok(client) => Some(client),
        Err(e) => panic!("DATABASE_URL is set but connecting failed: {}", e),
    }
}

/// Recreates `table` with the member layout.
async fn create_members_table(client: &PostgresClient, table: &str) {
    client
        .batch_execute(&format!(
            r#"
            DROP TABLE IF EXISTS {table};
            CREATE TABLE {table} (
                id BIGSERIAL PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                profile JSON,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ
            );
            "#
        ))
        .await
        .unwrap();
}

async fn drop_table(client: &PostgresClient, table: &str) {
    client.batch_execute(&format!("DROP TABLE IF EXISTS {}", table)).await.unwrap();
}

fn emails<T>(rows: &[T], email: impl Fn(&T) -> &str) -> Vec<String> {
    let mut emails: Vec<String> = rows.iter().map(|row| email(row).to_string()).collect();
    emails.sort();
    emails
}

fn member_emails(rows: &[Member]) -> Vec<String> {
    emails(rows, |m| m.email.as_str())
}

fn row_emails(rows: &[FieldMap]) -> Vec<String> {
    emails(rows, |row| row.get("email").and_then(Value::as_str).unwrap_or_default())
}

fn field_maps(value: Value) -> Vec<FieldMap> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => map,
                _ => panic!("rows must be objects"),
            })
            .collect(),
        _ => panic!("expected an array"),
    }
}

#[tokio::test]
async fn test_insert_then_update_one_changed_row() {
    let Some(client) = client().await else { return };
    create_members_table(&client, Member::TABLE_NAME).await;
    let options = UpsertOptions::new(["email"]);

    let first = vec![
        member("a@example.com", "Ada"),
        member("b@example.com", "Bob"),
        member("c@example.com", "Cy"),
    ];
    let result = upsert(&client, &first, &options).await.unwrap();

    assert_eq!(result.inserted().len(), 3);
    assert!(result.updated().is_empty());
    assert!(result.unchanged().is_empty());
    assert!(result.inserted().iter().all(|m| m.id.is_some()));

    let second = vec![
        member("a@example.com", "Ada"),
        member("b@example.com", "Robert"),
        member("c@example.com", "Cy"),
    ];
    let result = upsert(&client, &second, &options).await.unwrap();

    assert!(result.inserted().is_empty());
    assert_eq!(member_emails(result.updated()), vec!["b@example.com"]);
    assert_eq!(result.updated()[0].name, "Robert");
    assert_eq!(member_emails(result.unchanged()), vec!["a@example.com", "c@example.com"]);

    drop_table(&client, Member::TABLE_NAME).await;
}

#[tokio::test]
async fn test_rerun_is_all_unchanged_and_covers_every_key() {
    let Some(client) = client().await else { return };
    let table = "bulk_upsert_it_rerun";
    create_members_table(&client, table).await;
    let conventions = TableConventions::new(table);
    let options = UpsertOptions::new(["email"]);
    let rows = field_maps(json!([
        {"email": "a@example.com", "name": "Ada", "profile": {"langs": ["en"]}},
        {"email": "b@example.com", "name": "Bob", "profile": null},
        {"email": "b@example.com", "name": "Bob", "profile": null},
    ]));

    let first = upsert_field_maps(&client, &conventions, &rows, &options).await.unwrap();
    assert_eq!(row_emails(first.inserted()), vec!["a@example.com", "b@example.com"]);

    let second = upsert_field_maps(&client, &conventions, &rows, &options).await.unwrap();
    assert!(second.inserted().is_empty());
    assert!(second.updated().is_empty());
    assert_eq!(row_emails(second.unchanged()), vec!["a@example.com", "b@example.com"]);

    drop_table(&client, table).await;
}

#[tokio::test]
async fn test_json_formatting_is_not_a_change() {
    let Some(client) = client().await else { return };
    let table = "bulk_upsert_it_json";
    create_members_table(&client, table).await;
    let conventions = TableConventions::new(table);
    let options = UpsertOptions::new(["email"]);

    let rows = field_maps(json!([{"email": "a@example.com", "name": "Ada", "profile": {"a": 1, "b": [1, 2]}}]));
    upsert_field_maps(&client, &conventions, &rows, &options).await.unwrap();

    client
        .batch_execute(&format!(
            "UPDATE {} SET profile = '{{ \"b\" : [1,2],   \"a\" : 1 }}'::json",
            table
        ))
        .await
        .unwrap();

    let result = upsert_field_maps(&client, &conventions, &rows, &options).await.unwrap();

    assert!(result.updated().is_empty());
    assert_eq!(result.unchanged().len(), 1);

    drop_table(&client, table).await;
}

#[tokio::test]
async fn test_excluded_and_non_updatable_columns() {
    let Some(client) = client().await else { return };
    let table = "bulk_upsert_it_roles";
    create_members_table(&client, table).await;
    let conventions = TableConventions::new(table);
    let options = UpsertOptions::new(["email"]);

    let original = field_maps(json!([{
        "email": "a@example.com",
        "name": "Ada",
        "created_at": "2020-01-01T00:00:00+00:00",
        "updated_at": "2020-01-01T00:00:00+00:00"
    }]));
    upsert_field_maps(&client, &conventions, &original, &options).await.unwrap();

    // Only excluded columns differ.
    let touched = field_maps(json!([{
        "email": "a@example.com",
        "name": "Ada",
        "created_at": "2021-06-01T00:00:00+00:00",
        "updated_at": "2021-06-01T00:00:00+00:00"
    }]));
    let result = upsert_field_maps(&client, &conventions, &touched, &options).await.unwrap();
    assert!(result.updated().is_empty());
    assert_eq!(result.unchanged().len(), 1);

    // A real change rewrites updated_at but never created_at.
    let renamed = field_maps(json!([{
        "email": "a@example.com",
        "name": "Ada L.",
        "created_at": "2022-01-01T00:00:00+00:00",
        "updated_at": "2022-01-01T00:00:00+00:00"
    }]));
    let result = upsert_field_maps(&client, &conventions, &renamed, &options).await.unwrap();
    let updated = &result.updated()[0];
    assert_eq!(updated.get("name"), Some(&json!("Ada L.")));
    assert_eq!(updated.get("created_at"), Some(&json!("2020-01-01T00:00:00+00:00")));
    assert_eq!(updated.get("updated_at"), Some(&json!("2022-01-01T00:00:00+00:00")));

    drop_table(&client, table).await;
}

#[tokio::test]
async fn test_key_covering_all_columns_never_updates() {
    let Some(client) = client().await else { return };
    let table = "bulk_upsert_it_keys_only";
    client
        .batch_execute(&format!(
            "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} (id BIGSERIAL PRIMARY KEY, email TEXT NOT NULL UNIQUE);"
        ))
        .await
        .unwrap();
    let conventions = TableConventions::new(table);
    let options = UpsertOptions::new(["email"]);

    let rows = field_maps(json!([{"email": "a@example.com"}, {"email": "b@example.com"}]));
    let first = upsert_field_maps(&client, &conventions, &rows, &options).await.unwrap();
    assert_eq!(first.inserted().len(), 2);

    // `nickname` has no column, so there is nothing left to compare.
    let changed = field_maps(json!([
        {"email": "a@example.com", "nickname": "A"},
        {"email": "b@example.com", "nickname": "B"}
    ]));
    let second = upsert_field_maps(&client, &conventions, &changed, &options).await.unwrap();
    assert!(second.updated().is_empty());
    assert_eq!(row_emails(second.unchanged()), vec!["a@example.com", "b@example.com"]);

    drop_table(&client, table).await;
}

#[tokio::test]
async fn test_non_updatable_column_keeps_excluded_only_change_unchanged() {
    let Some(client) = client().await else { return };
    let table = "bulk_upsert_it_role_overrides";
    client
        .batch_execute(&format!(
            "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} (id BIGSERIAL PRIMARY KEY, email TEXT NOT NULL UNIQUE, name TEXT, nickname TEXT);"
        ))
        .await
        .unwrap();
    let conventions = TableConventions::new(table);
    let options = UpsertOptions::new(["email"])
        .with_excluded_from_change_detection(["nickname"])
        .with_non_updatable(["name"]);

    let original = field_maps(json!([{"email": "a@example.com", "name": "A", "nickname": "x"}]));
    upsert_field_maps(&client, &conventions, &original, &options).await.unwrap();

    let touched = field_maps(json!([{"email": "a@example.com", "name": "A", "nickname": "y"}]));
    let result = upsert_field_maps(&client, &conventions, &touched, &options).await.unwrap();

    assert!(result.updated().is_empty());
    assert_eq!(result.unchanged().len(), 1);
    assert_eq!(result.unchanged()[0].get("nickname"), Some(&json!("x")));

    drop_table(&client, table).await;
}

#[tokio::test]
async fn test_columns_without_binary_mapping_still_come_back() {
    let Some(client) = client().await else { return };
    let table = "bulk_upsert_it_text_fallback";
    client
        .batch_execute(&format!(
            "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} (id BIGSERIAL PRIMARY KEY, host TEXT NOT NULL UNIQUE, ttl INTERVAL, seen_at TIMESTAMPTZ[]);"
        ))
        .await
        .unwrap();
    let conventions = TableConventions::new(table);
    let options = UpsertOptions::new(["host"]);
    let rows = field_maps(json!([
        {"host": "a.example.com", "ttl": "1 hour", "seen_at": ["2024-01-01T00:00:00Z"]},
        {"host": "b.example.com", "ttl": null, "seen_at": null},
    ]));

    let first = upsert_field_maps(&client, &conventions, &rows, &options).await.unwrap();
    assert_eq!(first.inserted().len(), 2);
    let a = first
        .inserted()
        .iter()
        .find(|row| row.get("host") == Some(&json!("a.example.com")))
        .unwrap();
    assert_eq!(a.get("ttl"), Some(&json!("01:00:00")));
    assert!(a.get("seen_at").and_then(Value::as_str).is_some());

    let second = upsert_field_maps(&client, &conventions, &rows, &options).await.unwrap();
    assert_eq!(second.unchanged().len(), 2);

    drop_table(&client, table).await;
}

#[tokio::test]
async fn test_null_key_values_match_each_other() {
    let Some(client) = client().await else { return };
    let table = "bulk_upsert_it_null_keys";
    // NULLS NOT DISTINCT needs PostgreSQL 15.
    client
        .batch_execute(&format!(
            "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} (id BIGSERIAL PRIMARY KEY, tenant TEXT, email TEXT NOT NULL, name TEXT, UNIQUE NULLS NOT DISTINCT (tenant, email));"
        ))
        .await
        .unwrap();
    let conventions = TableConventions::new(table);
    let options = UpsertOptions::new(["tenant", "email"]);
    let rows = field_maps(json!([
        {"tenant": null, "email": "a@example.com", "name": "A"},
        {"tenant": "t1", "email": "a@example.com", "name": "A"},
    ]));

    let first = upsert_field_maps(&client, &conventions, &rows, &options).await.unwrap();
    assert_eq!(first.inserted().len(), 2);

    let second = upsert_field_maps(&client, &conventions, &rows, &options).await.unwrap();
    assert!(second.inserted().is_empty());
    assert!(second.updated().is_empty());
    assert_eq!(second.unchanged().len(), 2);

    let renamed = field_maps(json!([
        {"tenant": null, "email": "a@example.com", "name": "A2"},
        {"tenant": "t1", "email": "a@example.com", "name": "A"},
    ]));
    let third = upsert_field_maps(&client, &conventions, &renamed, &options).await.unwrap();
    assert_eq!(third.updated().len(), 1);
    assert_eq!(third.updated()[0].get("tenant"), Some(&Value::Null));
    assert_eq!(third.updated()[0].get("name"), Some(&json!("A2")));
    assert_eq!(third.unchanged().len(), 1);
    assert_eq!(third.unchanged()[0].get("tenant"), Some(&json!("t1")));

    drop_table(&client, table).await;
}

#[tokio::test]
async fn test_mixed_batch_with_duplicates_covers_distinct_keys_once() {
    let Some(client) = client().await else { return };
    let table = "bulk_upsert_it_mixed";
    create_members_table(&client, table).await;
    let conventions = TableConventions::new(table);
    let options = UpsertOptions::new(["email"]);

    let seed = field_maps(json!([
        {"email": "a@example.com", "name": "A"},
        {"email": "b@example.com", "name": "B"},
        {"email": "c@example.com", "name": "C"},
    ]));
    upsert_field_maps(&client, &conventions, &seed, &options).await.unwrap();

    let rows = field_maps(json!([
        {"email": "a@example.com", "name": "A"},
        {"email": "b@example.com", "name": "B2"},
        {"email": "d@example.com", "name": "D"},
        {"email": "a@example.com", "name": "A"},
        {"email": "d@example.com", "name": "D"},
        {"email": "b@example.com", "name": "B2"},
    ]));
    let result = upsert_field_maps(&client, &conventions, &rows, &options).await.unwrap();

    assert_eq!(row_emails(result.inserted()), vec!["d@example.com"]);
    assert_eq!(row_emails(result.updated()), vec!["b@example.com"]);
    assert_eq!(row_emails(result.unchanged()), vec!["a@example.com"]);

    let mut reported: Vec<String> = OutcomeKind::ALL
        .iter()
        .flat_map(|kind| row_emails(result.get(*kind)))
        .collect();
    reported.sort();
    let mut distinct = row_emails(&rows);
    distinct.dedup();
    assert_eq!(reported, distinct);

    drop_table(&client, table).await;
}

#[tokio::test]
async fn test_batching_is_transparent() {
    let Some(client) = client().await else { return };
    let rows = field_maps(json!([
        {"email": "a@example.com", "name": "A"},
        {"email": "b@example.com", "name": "B"},
        {"email": "c@example.com", "name": "C"},
        {"email": "d@example.com", "name": "D"},
        {"email": "e@example.com", "name": "E"},
    ]));
    let changed = field_maps(json!([
        {"email": "a@example.com", "name": "A"},
        {"email": "b@example.com", "name": "B2"},
        {"email": "c@example.com", "name": "C"},
        {"email": "d@example.com", "name": "D2"},
        {"email": "f@example.com", "name": "F"},
    ]));

    let mut outcomes: Vec<Vec<Vec<String>>> = Vec::new();
    for batch_size in [2, 100] {
        let table = format!("bulk_upsert_it_batching_{}", batch_size);
        create_members_table(&client, &table).await;
        let conventions = TableConventions::new(table.as_str());
        let options = UpsertOptions::new(["email"]).with_batch_size(batch_size);

        upsert_field_maps(&client, &conventions, &rows, &options).await.unwrap();
        let result: UpsertResult<FieldMap> =
            upsert_field_maps(&client, &conventions, &changed, &options).await.unwrap();

        outcomes.push(OutcomeKind::ALL.iter().map(|kind| row_emails(result.get(*kind))).collect());
        drop_table(&client, &table).await;
    }

    assert_eq!(outcomes[0], outcomes[1]);
    assert_eq!(outcomes[0][0], vec!["f@example.com"]);
    assert_eq!(outcomes[0][1], vec!["b@example.com", "d@example.com"]);
}

#[tokio::test]
async fn test_caller_owned_transaction_is_left_to_the_caller() {
    let Some(client) = client().await else { return };
    let table = "bulk_upsert_it_transaction";
    create_members_table(&client, table).await;
    let conventions = TableConventions::new(table);
    let options = UpsertOptions::new(["email"]).with_batch_size(1);
    let rows = field_maps(json!([
        {"email": "a@example.com", "name": "A"},
        {"email": "b@example.com", "name": "B"},
    ]));

    {
        let mut connection = client.connection().await.unwrap();
        let transaction = PostgresTransaction::new(connection.transaction().await.unwrap());

        let result =
            upsert_field_maps(&transaction, &conventions, &rows, &options).await.unwrap();
        assert_eq!(result.inserted().len(), 2);

        transaction.rollback().await.unwrap();
    }

    let count = client
        .query(format!("SELECT count(*) FROM {}", table).as_str(), &[])
        .await
        .unwrap()[0]
        .get::<_, i64>(0);
    assert_eq!(count, 0);

    drop_table(&client, table).await;
}

#[tokio::test]
async fn test_unknown_key_column_is_rejected() {
    let Some(client) = client().await else { return };
    let table = "bulk_upsert_it_invalid";
    create_members_table(&client, table).await;

    let rows = field_maps(json!([{"email": "a@example.com", "name": "A"}]));
    let err = upsert_field_maps(
        &client,
        &TableConventions::new(table),
        &rows,
        &UpsertOptions::new(["username"]),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, bulk_upsert::UpsertError::InvalidArgument(_)));

    drop_table(&client, table).await;
}
