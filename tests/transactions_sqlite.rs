#![cfg(feature = "sqlite")]
use mysql_wizard::prelude::*;
use serde_json::{Value, json};
use tokio::runtime::Runtime;

async fn setup(dir: &tempfile::TempDir) -> Result<(ConnectionPool, Repository<Value>), DbError> {
    let path = dir.path().join("tx.db").to_string_lossy().into_owned();
    let pool = ConnectionPool::new(DbConfig::sqlite(path).with_connection_limit(4))?;
    autocommit(&pool, |conn| {
        Box::pin(async move {
            conn.execute_batch(
                "CREATE TABLE accounts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    owner TEXT NOT NULL UNIQUE,
                    balance INTEGER NOT NULL
                )",
            )
            .await
        })
    })
    .await?;
    let accounts = Repository::new(
        &pool,
        RepositoryConfig::new("accounts")
            .keys(["id", "owner", "balance"])
            .auto_set_columns(["id"]),
    );
    Ok((pool, accounts))
}

async fn balance(accounts: &Repository<Value>, owner: &str) -> Result<Option<i64>, DbError> {
    let row = accounts
        .select_one(CompareQuery::new().eq("owner", owner))
        .execute_json(None)
        .await?;
    Ok(row.and_then(|r| r.get("balance").and_then(Value::as_i64)))
}

#[test]
fn repository_calls_share_the_callers_transaction() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let dir = tempfile::tempdir()?;
        let (pool, accounts) = setup(&dir).await?;

        let repo = accounts.clone();
        let inserted = transaction(&pool, move |conn| {
            Box::pin(async move {
                let header = repo
                    .insert(
                        &[json!({"owner": "ann", "balance": 100}), json!({"owner": "bob", "balance": 0})],
                        Some(&mut *conn),
                    )
                    .await?;
                repo.update(
                    &[
                        (CompareQuery::new().eq("owner", "ann"), json!({"balance": 60})),
                        (CompareQuery::new().eq("owner", "bob"), json!({"balance": 40})),
                    ],
                    Some(&mut *conn),
                )
                .await?;
                // Reads on the same connection see the uncommitted writes.
                let seen = repo.select(None).execute_json(Some(&mut *conn)).await?;
                assert_eq!(seen.len(), 2);
                Ok(header.affected_rows)
            })
        })
        .await?;

        assert_eq!(inserted, 2);
        assert_eq!(balance(&accounts, "ann").await?, Some(60));
        assert_eq!(balance(&accounts, "bob").await?, Some(40));
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

#[test]
fn failure_rolls_back_every_write() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let dir = tempfile::tempdir()?;
        let (pool, accounts) = setup(&dir).await?;
        accounts
            .insert(&[json!({"owner": "ann", "balance": 100})], None)
            .await?;

        let repo = accounts.clone();
        let result: Result<(), DbError> = transaction(&pool, move |conn| {
            Box::pin(async move {
                repo.update(
                    &[(CompareQuery::new().eq("owner", "ann"), json!({"balance": 0}))],
                    Some(&mut *conn),
                )
                .await?;
                // Violates the UNIQUE constraint on owner.
                repo.insert(&[json!({"owner": "ann", "balance": 1})], Some(&mut *conn))
                    .await?;
                Ok(())
            })
        })
        .await;

        assert!(matches!(result, Err(DbError::Query(_))));
        assert_eq!(balance(&accounts, "ann").await?, Some(100));
        assert_eq!(pool.status().size, pool.status().available);
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

#[test]
fn batch_update_without_connection_is_atomic() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let dir = tempfile::tempdir()?;
        let (_pool, accounts) = setup(&dir).await?;
        accounts
            .insert(
                &[json!({"owner": "ann", "balance": 1}), json!({"owner": "bob", "balance": 2})],
                None,
            )
            .await?;

        let result = accounts
            .update(
                &[
                    (CompareQuery::new().eq("owner", "ann"), json!({"balance": 10})),
                    (CompareQuery::new().eq("owner", "bob"), json!({"owner": "ann"})),
                ],
                None,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(balance(&accounts, "ann").await?, Some(1));
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

#[test]
fn non_throwing_handler_yields_none() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let dir = tempfile::tempdir()?;
        let (pool, _accounts) = setup(&dir).await?;
        let options = HandlerOptions::default().throw_error(false);
        let result = run(&pool, options, |conn| {
            Box::pin(async move {
                conn.execute("INSERT INTO accounts (owner) VALUES (?)", &[RowValues::Text("x".into())])
                    .await
            })
        })
        .await?;
        assert!(result.is_none());

        let ok = run(&pool, options, |conn| {
            Box::pin(async move { conn.query("SELECT 1 AS one", &[]).await })
        })
        .await?;
        assert!(ok.is_some());
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
