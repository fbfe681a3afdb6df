use std::path::Path;
use std::str::FromStr;

use log::debug;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Row as _, Sqlite};

use crate::error::{Error, Result};
use crate::flatten::Row;

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// SQLite store whose tables are shaped by the rows written into them
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database file at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect(options).await
    }

    pub async fn in_memory() -> Result<Self> {
        Self::connect(SqliteConnectOptions::from_str("sqlite::memory:")?).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        // One writer, one connection. Also keeps an in-memory database alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Insert `row` into `table`, or update the existing row with the same `pk`.
    ///
    /// The table is created from the row's fields on first use, and columns
    /// the row introduces later are added to it.
    pub async fn upsert_entity(&self, table: &str, pk: &str, row: &Row) -> Result<()> {
        primary_key(table, pk, row)?;
        self.ensure_table(table, pk, row).await?;

        let columns: Vec<&String> = row.keys().collect();
        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; columns.len()].join(", ");
        let updates = columns
            .iter()
            .filter(|c| c.as_str() != pk)
            .map(|c| format!("{col} = excluded.{col}", col = quote_ident(c)))
            .collect::<Vec<_>>();

        let conflict = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
            quote_ident(table),
            column_list,
            placeholders,
            quote_ident(pk),
            conflict
        );

        let mut query = sqlx::query(&sql);
        for value in row.values() {
            query = bind_value(query, value);
        }
        query.execute(&self.pool).await?;

        Ok(())
    }

    /// Upsert `row_b` into `table_b` and record that it belongs to `id_a` of `table_a`.
    ///
    /// The `table_a` row is expected to exist already. The join table is
    /// named after both tables in sorted order, e.g. `boards_items`.
    pub async fn link(
        &self,
        table_a: &str,
        id_a: &str,
        table_b: &str,
        pk_b: &str,
        row_b: &Row,
    ) -> Result<()> {
        let id_b = primary_key(table_b, pk_b, row_b)?;
        self.upsert_entity(table_b, pk_b, row_b).await?;

        let mut sides = [(table_a, id_a), (table_b, id_b)];
        sides.sort_by(|x, y| x.0.cmp(y.0));
        let join = join_table_name(table_a, table_b);
        self.ensure_join_table(&join, sides[0].0, sides[1].0).await?;

        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}, {}) VALUES (?, ?)",
            quote_ident(&join),
            quote_ident(&join_column(sides[0].0)),
            quote_ident(&join_column(sides[1].0)),
        );
        sqlx::query(&sql)
            .bind(sides[0].1)
            .bind(sides[1].1)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        Ok(row.get(0))
    }

    pub async fn table_names(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    /// Column names of `table` in declaration order; empty if it doesn't exist
    pub async fn columns(&self, table: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT name FROM pragma_table_info(?) ORDER BY cid")
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    async fn primary_key_column(&self, table: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT name FROM pragma_table_info(?) WHERE pk = 1")
            .bind(table)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get(0)))
    }

    async fn ensure_table(&self, table: &str, pk: &str, row: &Row) -> Result<()> {
        let existing = self.columns(table).await?;

        if existing.is_empty() {
            let definitions = row
                .iter()
                .map(|(column, value)| format!("{} {}", quote_ident(column), column_type(value)))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {} ({}, PRIMARY KEY ({}))",
                quote_ident(table),
                definitions,
                quote_ident(pk)
            );
            debug!("Creating table {}", table);
            sqlx::query(&sql).execute(&self.pool).await?;
            return Ok(());
        }

        for (column, value) in row {
            if existing.iter().any(|c| c == column) {
                continue;
            }
            let sql = format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                quote_ident(table),
                quote_ident(column),
                column_type(value)
            );
            debug!("Adding column {}.{}", table, column);
            sqlx::query(&sql).execute(&self.pool).await?;
        }

        Ok(())
    }

    async fn ensure_join_table(&self, join: &str, first: &str, second: &str) -> Result<()> {
        let first_col = quote_ident(&join_column(first));
        let second_col = quote_ident(&join_column(second));

        let mut definitions = vec![
            format!("{} TEXT", first_col),
            format!("{} TEXT", second_col),
            format!("PRIMARY KEY ({}, {})", first_col, second_col),
        ];
        for (table, column) in [(first, &first_col), (second, &second_col)] {
            if let Some(pk) = self.primary_key_column(table).await? {
                definitions.push(format!(
                    "FOREIGN KEY ({}) REFERENCES {}({})",
                    column,
                    quote_ident(table),
                    quote_ident(&pk)
                ));
            }
        }

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(join),
            definitions.join(", ")
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }
}

/// Join tables are named after both sides, sorted: `collections_feeds`
pub fn join_table_name(table_a: &str, table_b: &str) -> String {
    let mut names = [table_a, table_b];
    names.sort();
    names.join("_")
}

pub fn join_column(table: &str) -> String {
    format!("{}_id", table)
}

fn primary_key<'r>(table: &str, pk: &str, row: &'r Row) -> Result<&'r str> {
    match row.get(pk) {
        Some(Value::String(id)) => Ok(id),
        _ => Err(Error::MissingPrimaryKey {
            table: table.to_string(),
            key: pk.to_string(),
        }),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_type(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "INTEGER",
        Value::Number(n) if n.is_i64() || n.is_u64() => "INTEGER",
        Value::Number(_) => "FLOAT",
        Value::Null | Value::String(_) | Value::Array(_) | Value::Object(_) => "TEXT",
    }
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        // Nested structures are stored as JSON text
        Value::Array(_) | Value::Object(_) => query.bind(value.to_string()),
    }
}
