// PostgreSQL and MySQL loading

use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use datalyzer_config::run::{DatabaseSource, Driver};
use datalyzer_recon::model::{CellValue, Dataset};
use sqlx::mysql::{MySqlConnectOptions, MySqlRow};
use sqlx::postgres::{PgConnectOptions, PgRow};
use sqlx::{Column, ConnectOptions, Executor, Row, Statement, TypeInfo};

use crate::error::LoadError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection target without the password, for logs and the run summary.
pub fn origin(db: &DatabaseSource) -> String {
    let user = db.user.as_deref().map(|u| format!("{u}@")).unwrap_or_default();
    let host = db.host.as_deref().unwrap_or_default();
    let port = db.port.or(db.driver.default_port()).unwrap_or_default();
    let database = db.database.as_deref().unwrap_or_default();
    format!("{}://{user}{host}:{port}/{database}", db.driver)
}

/// Run `sql` against a server source and collect the result set.
pub fn load(label: &str, db: &DatabaseSource, sql: &str) -> Result<Dataset, LoadError> {
    let target = origin(db);
    let password = db.password();
    if password.is_none() {
        log::debug!("{target}: {} is not set, connecting without a password", db.password_env());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| LoadError::Connect { origin: target.clone(), message: e.to_string() })?;

    log::debug!("{target}: {sql}");
    let (headers, rows) = runtime.block_on(async {
        match db.driver {
            Driver::Postgresql => fetch_postgres(db, password.as_deref(), sql, &target).await,
            Driver::Mysql => fetch_mysql(db, password.as_deref(), sql, &target).await,
            other => Err(LoadError::UnsupportedDriver(other.to_string())),
        }
    })?;

    Ok(Dataset::from_rows(label, &headers, rows)?)
}

type Fetched = (Vec<String>, Vec<Vec<CellValue>>);

async fn fetch_postgres(
    db: &DatabaseSource,
    password: Option<&str>,
    sql: &str,
    target: &str,
) -> Result<Fetched, LoadError> {
    let mut opts = PgConnectOptions::new()
        .host(db.host.as_deref().unwrap_or_default())
        .port(db.port.unwrap_or(5432))
        .database(db.database.as_deref().unwrap_or_default());
    if let Some(user) = &db.user {
        opts = opts.username(user);
    }
    if let Some(password) = password {
        opts = opts.password(password);
    }

    let mut conn = tokio::time::timeout(CONNECT_TIMEOUT, opts.connect())
        .await
        .map_err(|_| connect_error(target, "timed out"))?
        .map_err(|e| connect_error(target, e))?;

    let stmt = (&mut conn).prepare(sql).await?;
    let headers: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();
    let rows = stmt.query().fetch_all(&mut conn).await?;

    let data = rows
        .iter()
        .map(|row| (0..headers.len()).map(|i| pg_cell(row, i)).collect())
        .collect::<Result<Vec<Vec<CellValue>>, LoadError>>()?;
    Ok((headers, data))
}

async fn fetch_mysql(
    db: &DatabaseSource,
    password: Option<&str>,
    sql: &str,
    target: &str,
) -> Result<Fetched, LoadError> {
    let mut opts = MySqlConnectOptions::new()
        .host(db.host.as_deref().unwrap_or_default())
        .port(db.port.unwrap_or(3306))
        .database(db.database.as_deref().unwrap_or_default());
    if let Some(user) = &db.user {
        opts = opts.username(user);
    }
    if let Some(password) = password {
        opts = opts.password(password);
    }

    let mut conn = tokio::time::timeout(CONNECT_TIMEOUT, opts.connect())
        .await
        .map_err(|_| connect_error(target, "timed out"))?
        .map_err(|e| connect_error(target, e))?;

    let stmt = (&mut conn).prepare(sql).await?;
    let headers: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();
    let rows = stmt.query().fetch_all(&mut conn).await?;

    let data = rows
        .iter()
        .map(|row| (0..headers.len()).map(|i| mysql_cell(row, i)).collect())
        .collect::<Result<Vec<Vec<CellValue>>, LoadError>>()?;
    Ok((headers, data))
}

fn connect_error(target: &str, err: impl std::fmt::Display) -> LoadError {
    LoadError::Connect { origin: target.to_string(), message: err.to_string() }
}

fn decode_error(column: &str, type_name: &str, err: sqlx::Error) -> LoadError {
    LoadError::Sql(format!(
        "column '{column}' of type {type_name} cannot be read ({err}); cast it to text in the query"
    ))
}

// ---------------------------------------------------------------------------
// Cell decoding
// ---------------------------------------------------------------------------

// Dates render the way spreadsheet dates do.
fn date(d: NaiveDate) -> CellValue {
    CellValue::Text(d.format("%Y-%m-%d").to_string())
}

fn datetime(dt: NaiveDateTime) -> CellValue {
    CellValue::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn pg_cell(row: &PgRow, i: usize) -> Result<CellValue, LoadError> {
    let column = &row.columns()[i];
    let type_name = column.type_info().name();
    let cell = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(i).map(|v| v.map(CellValue::Bool)),
        "INT2" => row.try_get::<Option<i16>, _>(i).map(|v| v.map(|n| CellValue::Int(n.into()))),
        "INT4" => row.try_get::<Option<i32>, _>(i).map(|v| v.map(|n| CellValue::Int(n.into()))),
        "INT8" => row.try_get::<Option<i64>, _>(i).map(|v| v.map(CellValue::Int)),
        "FLOAT4" => row.try_get::<Option<f32>, _>(i).map(|v| v.map(|f| CellValue::Float(f.into()))),
        "FLOAT8" => row.try_get::<Option<f64>, _>(i).map(|v| v.map(CellValue::Float)),
        "DATE" => row.try_get::<Option<NaiveDate>, _>(i).map(|v| v.map(date)),
        "TIMESTAMP" => row.try_get::<Option<NaiveDateTime>, _>(i).map(|v| v.map(datetime)),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(i)
            .map(|v| v.map(|dt| datetime(dt.naive_utc()))),
        _ => row.try_get::<Option<String>, _>(i).map(|v| v.map(CellValue::Text)),
    };
    cell.map(|v| v.unwrap_or(CellValue::Null))
        .map_err(|e| decode_error(column.name(), type_name, e))
}

fn mysql_cell(row: &MySqlRow, i: usize) -> Result<CellValue, LoadError> {
    let column = &row.columns()[i];
    let type_name = column.type_info().name();
    let cell = match type_name {
        "BOOLEAN" => row.try_get::<Option<bool>, _>(i).map(|v| v.map(CellValue::Bool)),
        t if t.ends_with("UNSIGNED") => row.try_get::<Option<u64>, _>(i).map(|v| {
            v.map(|n| i64::try_from(n).map_or_else(|_| CellValue::Text(n.to_string()), CellValue::Int))
        }),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get::<Option<i64>, _>(i).map(|v| v.map(CellValue::Int))
        }
        "FLOAT" => row.try_get::<Option<f32>, _>(i).map(|v| v.map(|f| CellValue::Float(f.into()))),
        "DOUBLE" => row.try_get::<Option<f64>, _>(i).map(|v| v.map(CellValue::Float)),
        "DATE" => row.try_get::<Option<NaiveDate>, _>(i).map(|v| v.map(date)),
        "DATETIME" => row.try_get::<Option<NaiveDateTime>, _>(i).map(|v| v.map(datetime)),
        "TIMESTAMP" => row
            .try_get::<Option<DateTime<Utc>>, _>(i)
            .map(|v| v.map(|dt| datetime(dt.naive_utc()))),
        _ => row.try_get::<Option<String>, _>(i).map(|v| v.map(CellValue::Text)),
    };
    cell.map(|v| v.unwrap_or(CellValue::Null))
        .map_err(|e| decode_error(column.name(), type_name, e))
}
