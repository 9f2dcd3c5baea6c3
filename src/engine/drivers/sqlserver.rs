// SPDX-License-Identifier: Apache-2.0

//! SQL Server Driver
//!
//! Implements the TargetExecutor trait for Microsoft SQL Server using Tiberius.
//!
//! ## Connection Model
//!
//! Every call opens a fresh connection to the requested database and closes
//! it before returning. Nothing is pooled or shared between targets.
//!
//! ## Error Classification
//!
//! - Login and transport failures while connecting: soft, driver message
//! - Server errors (`Error::Server`) while executing: soft, server message
//! - Statements without a result set: soft, "No data was returned."
//! - Cancellation: soft, "Query cancelled by user.", plus `KILL <spid>`
//! - Anything else: fatal [`EngineError::Driver`] carrying the tiberius error

use async_trait::async_trait;
use tiberius::error::Error as TdsError;
use tiberius::{AuthMethod, Client, ColumnData, ColumnType, Config, EncryptionLevel, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::config::{RunnerConfig, DEFAULT_PORT};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::TargetExecutor;
use crate::engine::type_map::{
    map_type, TYPE_CODE_BINARY, TYPE_CODE_DATETIME, TYPE_CODE_DECIMAL, TYPE_CODE_NUMBER,
    TYPE_CODE_STRING,
};
use crate::engine::types::{build_columns, QueryResult, TargetOutcome, Value};

// ==================== Types ====================

type MssqlClient = Client<Compat<TcpStream>>;

const APPLICATION_NAME: &str = "mssql-multisource";

// ==================== Executor ====================

pub struct SqlServerExecutor {
    config: RunnerConfig,
}

impl SqlServerExecutor {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Build a tiberius Config for one database.
    fn build_config(config: &RunnerConfig, database: &str) -> EngineResult<Config> {
        let address = config.server_address();
        let server = parse_server_address(&address)?;

        let mut tib_config = Config::new();
        tib_config.host(server.host);
        match (server.instance, server.port) {
            // Without an explicit port the SQL Browser resolves the instance.
            (Some(instance), None) => tib_config.instance_name(instance),
            (_, port) => tib_config.port(port.unwrap_or(DEFAULT_PORT)),
        }
        tib_config.database(database);
        tib_config.application_name(APPLICATION_NAME);
        tib_config.authentication(AuthMethod::sql_server(
            &config.user,
            config.password.expose(),
        ));
        tib_config.encryption(if config.encrypt {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::NotSupported
        });
        if config.trust_server_certificate {
            tib_config.trust_cert();
        }
        Ok(tib_config)
    }

    /// Open a dedicated connection.
    ///
    /// Every failure here is reported as `ConnectionFailed`, which the
    /// caller turns into a soft error.
    async fn connect(&self, database: &str) -> EngineResult<MssqlClient> {
        let tib_config = Self::build_config(&self.config, database)?;
        let tcp = TcpStream::connect_named(&tib_config).await.map_err(|e| {
            EngineError::connection_failed(format!(
                "Failed to connect to {} - {}",
                self.config.server_address(),
                connection_error_message(&e)
            ))
        })?;
        tcp.set_nodelay(true).ok();

        Client::connect(tib_config, tcp.compat_write())
            .await
            .map_err(|e| EngineError::connection_failed(connection_error_message(&e)))
    }

    /// Best-effort `KILL` of a session whose query was cancelled.
    async fn kill_session(&self, spid: i16) {
        let mut admin = match self.connect(&self.config.master_db).await {
            Ok(client) => client,
            Err(e) => {
                warn!(spid, error = %e, "Could not open connection to cancel query");
                return;
            }
        };

        let killed = match admin.simple_query(format!("KILL {}", spid)).await {
            Ok(stream) => stream.into_results().await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = killed {
            warn!(spid, error = %e, "KILL failed for cancelled query");
        }
        close_client(admin, &self.config.master_db).await;
    }
}

#[async_trait]
impl TargetExecutor for SqlServerExecutor {
    async fn execute(
        &self,
        query: &str,
        database: &str,
        cancel: &CancellationToken,
    ) -> EngineResult<TargetOutcome> {
        if database.trim().is_empty() {
            return Err(EngineError::validation("Target database must not be empty"));
        }
        let query = self.config.charset.encode(query)?;

        if cancel.is_cancelled() {
            return Ok(TargetOutcome::cancelled());
        }

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(TargetOutcome::cancelled()),
            connected = self.connect(database) => connected,
        };
        let mut client = match connected {
            Ok(client) => client,
            Err(EngineError::ConnectionFailed { message }) => {
                return Ok(TargetOutcome::soft_error(message))
            }
            Err(e) => return Err(e),
        };

        let spid = session_spid(&mut client).await;
        debug!(database, query, "SqlServerExecutor running query");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = run_statement(&mut client, query) => Some(outcome),
        };

        // Released on every path, before any KILL is sent.
        close_client(client, database).await;

        match outcome {
            Some(outcome) => outcome,
            None => {
                if let Some(spid) = spid {
                    self.kill_session(spid).await;
                }
                Ok(TargetOutcome::cancelled())
            }
        }
    }
}

// ==================== Helpers ====================

/// Parts of a `server[\instance][:port]` address.
#[derive(Debug, PartialEq, Eq)]
struct ServerAddress<'a> {
    host: &'a str,
    instance: Option<&'a str>,
    port: Option<u16>,
}

/// Parse `host`, `host:port`, `host\instance`, `[v6]:port` or a bare IPv6 literal.
fn parse_server_address(address: &str) -> EngineResult<ServerAddress<'_>> {
    let invalid = || EngineError::validation(format!("Invalid server address: {address}"));

    if let Some(bracketed) = address.strip_prefix('[') {
        let (host, rest) = bracketed.split_once(']').ok_or_else(invalid)?;
        let port = match rest {
            "" => None,
            rest => Some(parse_port(rest.strip_prefix(':').ok_or_else(invalid)?, address)?),
        };
        return Ok(ServerAddress {
            host,
            instance: None,
            port,
        });
    }

    if address.matches(':').count() > 1 {
        return Ok(ServerAddress {
            host: address,
            instance: None,
            port: None,
        });
    }

    let (rest, port) = match address.rsplit_once(':') {
        Some((rest, port)) => (rest, Some(parse_port(port, address)?)),
        None => (address, None),
    };
    let (host, instance) = match rest.split_once('\\') {
        Some((host, instance)) if !instance.is_empty() => (host, Some(instance)),
        Some((host, _)) => (host, None),
        None => (rest, None),
    };
    if host.is_empty() {
        return Err(invalid());
    }
    Ok(ServerAddress {
        host,
        instance,
        port,
    })
}

fn parse_port(port: &str, address: &str) -> EngineResult<u16> {
    port.parse::<u16>()
        .map_err(|_| EngineError::validation(format!("Invalid port in server address: {address}")))
}

async fn close_client(client: MssqlClient, database: &str) {
    if let Err(e) = client.close().await {
        debug!(database, error = %e, "Error while closing connection");
    }
}

async fn session_spid(client: &mut MssqlClient) -> Option<i16> {
    let stream = client.simple_query("SELECT @@SPID").await.ok()?;
    let row = stream.into_row().await.ok()??;
    row.try_get::<i16, _>(0).ok().flatten()
}

/// Execute one statement, fetching every row of its first result set.
async fn run_statement(client: &mut MssqlClient, query: &str) -> EngineResult<TargetOutcome> {
    let mut stream = match client.simple_query(query).await {
        Ok(stream) => stream,
        Err(e) => return classify_query_error(e),
    };

    let columns = match stream.columns().await {
        Ok(Some(columns)) => build_columns(columns.iter().map(|col| {
            (
                col.name().to_string(),
                map_type(type_code(col.column_type())),
            )
        })),
        Ok(None) => return Ok(TargetOutcome::no_data()),
        Err(e) => return classify_query_error(e),
    };

    let rows = match stream.into_first_result().await {
        Ok(rows) => rows,
        Err(e) => return classify_query_error(e),
    };

    let records: Vec<Vec<Value>> = rows.iter().map(convert_row).collect();
    Ok(TargetOutcome::success(QueryResult::from_records(
        columns, records,
    )))
}

/// Server-reported errors are soft; anything else is fatal.
fn classify_query_error(error: TdsError) -> EngineResult<TargetOutcome> {
    match error {
        TdsError::Server(token) => Ok(TargetOutcome::soft_error(token.message())),
        other => Err(EngineError::driver("executing query", other)),
    }
}

/// Message for a failed login or handshake.
fn connection_error_message(error: &TdsError) -> String {
    match error {
        TdsError::Server(token) => token.message().to_string(),
        TdsError::Io { message, .. } => message.clone(),
        TdsError::Routing { host, port } => {
            format!("Server requested routing to {}:{}", host, port)
        }
        other => other.to_string(),
    }
}

/// DB-API type group of a TDS column type.
///
/// Unicode text and the newer temporal types are grouped with their classic
/// counterparts; everything without a natural group falls into BINARY.
pub fn type_code(column_type: ColumnType) -> i32 {
    match column_type {
        ColumnType::BigVarChar
        | ColumnType::BigChar
        | ColumnType::Text
        | ColumnType::NVarchar
        | ColumnType::NChar
        | ColumnType::NText
        | ColumnType::Xml
        | ColumnType::Guid => TYPE_CODE_STRING,
        ColumnType::Bit
        | ColumnType::Bitn
        | ColumnType::Int1
        | ColumnType::Int2
        | ColumnType::Int4
        | ColumnType::Int8
        | ColumnType::Intn
        | ColumnType::Float4
        | ColumnType::Float8
        | ColumnType::Floatn => TYPE_CODE_NUMBER,
        ColumnType::Money | ColumnType::Money4 | ColumnType::Decimaln | ColumnType::Numericn => {
            TYPE_CODE_DECIMAL
        }
        ColumnType::Datetime
        | ColumnType::Datetime4
        | ColumnType::Datetimen
        | ColumnType::Datetime2
        | ColumnType::DatetimeOffsetn
        | ColumnType::Daten
        | ColumnType::Timen => TYPE_CODE_DATETIME,
        _ => TYPE_CODE_BINARY,
    }
}

// ==================== Type Conversion ====================

fn convert_column_data(data: &ColumnData<'_>) -> Value {
    match data {
        ColumnData::Bit(Some(b)) => Value::Bool(*b),
        ColumnData::U8(Some(v)) => Value::Int(*v as i64),
        ColumnData::I16(Some(v)) => Value::Int(*v as i64),
        ColumnData::I32(Some(v)) => Value::Int(*v as i64),
        ColumnData::I64(Some(v)) => Value::Int(*v),
        ColumnData::F32(Some(v)) => Value::Float(*v as f64),
        ColumnData::F64(Some(v)) => Value::Float(*v),
        ColumnData::Numeric(Some(n)) => {
            Value::Float(n.value() as f64 / 10f64.powi(n.scale() as i32))
        }
        ColumnData::String(Some(s)) => Value::Text(s.to_string()),
        ColumnData::Guid(Some(g)) => Value::Uuid(*g),
        ColumnData::Binary(Some(b)) => Value::Bytes(b.to_vec()),
        ColumnData::Xml(Some(xml)) => Value::Text(xml.to_string()),
        _ => Value::Null,
    }
}

/// Temporal cells go through chrono's typed getters; the rest convert directly.
fn convert_row(row: &tiberius::Row) -> Vec<Value> {
    row.cells()
        .enumerate()
        .map(|(i, (_col, data))| match data {
            ColumnData::DateTime(Some(_))
            | ColumnData::SmallDateTime(Some(_))
            | ColumnData::DateTime2(Some(_)) => row
                .try_get::<chrono::NaiveDateTime, _>(i)
                .ok()
                .flatten()
                .map(Value::DateTime)
                .unwrap_or(Value::Null),
            ColumnData::DateTimeOffset(Some(_)) => row
                .try_get::<chrono::DateTime<chrono::Utc>, _>(i)
                .ok()
                .flatten()
                .map(Value::DateTimeOffset)
                .unwrap_or(Value::Null),
            ColumnData::Date(Some(_)) => row
                .try_get::<chrono::NaiveDate, _>(i)
                .ok()
                .flatten()
                .map(Value::Date)
                .unwrap_or(Value::Null),
            ColumnData::Time(Some(_)) => row
                .try_get::<chrono::NaiveTime, _>(i)
                .ok()
                .flatten()
                .map(Value::Time)
                .unwrap_or(Value::Null),
            _ => convert_column_data(data),
        })
        .collect()
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::PortableType;
    use serde_json::json;
    use tiberius::error::TokenError;

    fn config(port: u16) -> RunnerConfig {
        RunnerConfig::from_json(json!({
            "user": "sa",
            "password": "MyPassword123!",
            "server": "sql.internal",
            "port": port,
            "db": "Sales",
            "master_db": "master",
            "datasources_query": "SELECT name AS datasource FROM tenants"
        }))
        .unwrap()
    }

    fn address<'a>(host: &'a str, instance: Option<&'a str>, port: Option<u16>) -> ServerAddress<'a> {
        ServerAddress {
            host,
            instance,
            port,
        }
    }

    #[test]
    fn test_parse_server_address() {
        assert_eq!(
            parse_server_address("127.0.0.1").unwrap(),
            address("127.0.0.1", None, None)
        );
        assert_eq!(
            parse_server_address("sql.internal:14330").unwrap(),
            address("sql.internal", None, Some(14330))
        );
        assert!(parse_server_address("sql.internal:port").is_err());
        assert!(parse_server_address(":1433").is_err());
    }

    #[test]
    fn test_parse_ipv6_addresses() {
        assert_eq!(parse_server_address("::1").unwrap(), address("::1", None, None));
        assert_eq!(
            parse_server_address("[::1]:14330").unwrap(),
            address("::1", None, Some(14330))
        );
        assert_eq!(
            parse_server_address("[fe80::2]").unwrap(),
            address("fe80::2", None, None)
        );
        assert!(parse_server_address("[::1").is_err());
        assert!(parse_server_address("[::1]1433").is_err());
    }

    #[test]
    fn test_parse_named_instance() {
        assert_eq!(
            parse_server_address("sql01\\REPORTING").unwrap(),
            address("sql01", Some("REPORTING"), None)
        );
        assert_eq!(
            parse_server_address("sql01\\REPORTING:14330").unwrap(),
            address("sql01", Some("REPORTING"), Some(14330))
        );
    }

    #[test]
    fn test_build_config_uses_address_convention() {
        let tib_config = SqlServerExecutor::build_config(&config(14330), "tenant_a").unwrap();
        assert_eq!(tib_config.get_addr(), "sql.internal:14330");

        let tib_config = SqlServerExecutor::build_config(&config(1433), "tenant_a").unwrap();
        assert_eq!(tib_config.get_addr(), "sql.internal:1433");

        let mut ipv6 = config(14330);
        ipv6.server = "::1".to_string();
        let tib_config = SqlServerExecutor::build_config(&ipv6, "tenant_a").unwrap();
        assert_eq!(tib_config.get_addr(), "::1:14330");
    }

    #[test]
    fn test_type_codes_map_to_portable_types() {
        let portable = |t| map_type(type_code(t));
        assert_eq!(portable(ColumnType::NVarchar), PortableType::String);
        assert_eq!(portable(ColumnType::Guid), PortableType::String);
        assert_eq!(portable(ColumnType::Intn), PortableType::Float);
        assert_eq!(portable(ColumnType::Bitn), PortableType::Float);
        assert_eq!(portable(ColumnType::Decimaln), PortableType::Float);
        assert_eq!(portable(ColumnType::Money), PortableType::Float);
        assert_eq!(portable(ColumnType::Datetime2), PortableType::DateTime);
        assert_eq!(portable(ColumnType::Daten), PortableType::DateTime);
        assert_eq!(portable(ColumnType::BigVarBin), PortableType::Boolean);
    }

    #[test]
    fn test_convert_column_data() {
        assert_eq!(convert_column_data(&ColumnData::I32(Some(7))), Value::Int(7));
        assert_eq!(convert_column_data(&ColumnData::I32(None)), Value::Null);
        assert_eq!(
            convert_column_data(&ColumnData::Bit(Some(true))),
            Value::Bool(true)
        );
        assert_eq!(
            convert_column_data(&ColumnData::String(Some("tenant".into()))),
            Value::Text("tenant".to_string())
        );
        let guid = uuid::Uuid::new_v4();
        assert_eq!(
            convert_column_data(&ColumnData::Guid(Some(guid))),
            Value::Uuid(guid)
        );
    }

    fn server_error(number: u32, class: u8, message: &str) -> TdsError {
        TdsError::Server(TokenError::new(
            number,
            1,
            class,
            message.to_string(),
            "sql.internal".to_string(),
            String::new(),
            1,
        ))
    }

    #[test]
    fn test_server_query_errors_are_soft() {
        let outcome =
            classify_query_error(server_error(208, 16, "Invalid object name 'orders'.")).unwrap();
        assert_eq!(
            outcome,
            TargetOutcome::soft_error("Invalid object name 'orders'.")
        );
    }

    #[test]
    fn test_connection_error_message_uses_login_message() {
        let message = connection_error_message(&server_error(
            18456,
            14,
            "Login failed for user 'reader'.",
        ));
        assert_eq!(message, "Login failed for user 'reader'.");
    }

    #[test]
    fn test_non_server_query_errors_are_fatal() {
        let err = classify_query_error(TdsError::Protocol("unexpected token".into())).unwrap_err();
        assert!(matches!(err, EngineError::Driver { .. }));
    }

    #[test]
    fn test_connection_error_message_uses_io_message() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
        let message = connection_error_message(&TdsError::from(io));
        assert!(message.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_empty_database_is_rejected() {
        let executor = SqlServerExecutor::new(config(1433));
        let err = executor
            .execute("SELECT 1", "  ", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_connecting() {
        // Accepts TCP but never answers the TDS handshake.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut silent = config(listener.local_addr().unwrap().port());
        silent.server = "127.0.0.1".to_string();
        let executor = SqlServerExecutor::new(silent);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            executor.execute("SELECT 1", "tenant_a", &cancel),
        )
        .await
        .expect("cancellation should interrupt the connect")
        .unwrap();
        assert_eq!(outcome, TargetOutcome::cancelled());
        drop(listener);
    }

    #[tokio::test]
    async fn test_unencodable_query_is_fatal() {
        let executor = SqlServerExecutor::new(config(1433));
        let err = executor
            .execute("SELECT '€'", "tenant_a", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Encoding { .. }));
    }
}
