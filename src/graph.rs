use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use neo4rs::{
    BoltList, BoltMap, BoltNull, BoltString, BoltType, ConfigBuilder, Graph, Query, Row, query,
};
use regex::Regex;
use serde_json::{Map, Value, json};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

use crate::error::XmapError;

/// One result row: column name to value, in the order the query returned them.
pub type Record = Map<String, Value>;

/// Named query parameters, as given on the command line.
pub type Params = Map<String, Value>;

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn from_parts(user: Option<String>, password: Option<String>) -> Option<Self> {
        match (user, password) {
            (Some(user), Some(password)) => Some(Self { user, password }),
            _ => None,
        }
    }
}

pub trait GraphQuery {
    fn run_query(&self, cypher: &str, params: &Params) -> Result<Vec<Record>, XmapError>;
}

/// A single bolt connection driven on a private runtime so callers stay synchronous.
pub struct Neo4jBoltClient {
    graph: Graph,
    runtime: Runtime,
}

impl Neo4jBoltClient {
    pub fn connect(endpoint: &str, credentials: Option<Credentials>) -> Result<Self, XmapError> {
        let connection_error = |message: String| XmapError::GraphConnection {
            endpoint: endpoint.to_string(),
            message,
        };

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| connection_error(err.to_string()))?;

        // Servers with auth disabled accept any credentials.
        let Credentials { user, password } = credentials.unwrap_or_default();
        let config = ConfigBuilder::default()
            .uri(endpoint)
            .user(user.as_str())
            .password(password.as_str())
            .max_connections(1)
            .build()
            .map_err(|err| connection_error(err.to_string()))?;

        // Explicit transactions are not retried by the driver, so a dead
        // endpoint fails on the first attempt.
        let graph = runtime.block_on(async {
            let graph = Graph::connect(config).await?;
            fetch_rows(&graph, query("RETURN 1 AS ok")).await?;
            Ok::<_, neo4rs::Error>(graph)
        });
        let graph = graph.map_err(|err| connection_error(err.to_string()))?;
        info!(endpoint, "connected to Neo4j");

        Ok(Self { graph, runtime })
    }
}

impl GraphQuery for Neo4jBoltClient {
    fn run_query(&self, cypher: &str, params: &Params) -> Result<Vec<Record>, XmapError> {
        let mut q: Query = query(cypher);
        for (key, value) in params {
            q = q.param(key, to_bolt(value));
        }
        debug!(params = params.len(), "running cypher");

        let rows = self
            .runtime
            .block_on(fetch_rows(&self.graph, q))
            .map_err(|err| XmapError::GraphQuery(err.to_string()))?;
        let columns = return_columns(cypher);
        rows.iter().map(|row| row_to_record(row, &columns)).collect()
    }
}

async fn fetch_rows(graph: &Graph, q: Query) -> Result<Vec<Row>, neo4rs::Error> {
    let mut txn = graph.start_txn().await?;
    let mut stream = txn.execute(q).await?;
    let mut rows = Vec::new();
    while let Some(row) = stream.next(txn.handle()).await? {
        rows.push(row);
    }
    txn.commit().await?;
    Ok(rows)
}

/// Rebuilds a row in `columns` order. Bolt rows are unordered, so any field not
/// named in `columns` follows in key order, as do the keys of nested maps.
pub fn row_to_record(row: &Row, columns: &[String]) -> Result<Record, XmapError> {
    let mut values: BTreeMap<String, Value> = row
        .to_strict()
        .map_err(|err| XmapError::GraphQuery(err.to_string()))?;
    let mut record = Record::new();
    for column in columns {
        if let Some(value) = values.remove(column) {
            record.insert(column.clone(), sorted_keys(value));
        }
    }
    for (key, value) in values {
        record.insert(key, sorted_keys(value));
    }
    Ok(record)
}

fn sorted_keys(value: Value) -> Value {
    match value {
        Value::Object(entries) => {
            let sorted: BTreeMap<String, Value> = entries
                .into_iter()
                .map(|(key, value)| (key, sorted_keys(value)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted_keys).collect()),
        other => other,
    }
}

/// Column names of the last `RETURN` clause in `cypher`, in projection order.
/// Unaliased items keep their expression text, which is how Neo4j names them.
pub fn return_columns(cypher: &str) -> Vec<String> {
    static RETURN: OnceLock<Regex> = OnceLock::new();
    static ALIAS: OnceLock<Regex> = OnceLock::new();
    let re = RETURN.get_or_init(|| Regex::new(r"(?i)\bRETURN\s+(DISTINCT\b)?").unwrap());
    let alias = ALIAS.get_or_init(|| Regex::new(r"(?is)^.*\sAS\s+`?([^`\s]+)`?$").unwrap());

    let Some(found) = re.find_iter(cypher).last() else {
        return Vec::new();
    };
    projection_items(&cypher[found.end()..])
        .into_iter()
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| match alias.captures(item) {
            Some(caps) => caps[1].to_string(),
            None => item.to_string(),
        })
        .collect()
}

/// Splits a projection on top-level commas, stopping at a trailing
/// `ORDER BY`, `SKIP` or `LIMIT`.
fn projection_items(body: &str) -> Vec<&str> {
    let upper = body.to_ascii_uppercase();
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    let mut prev = ' ';
    for (at, ch) in body.char_indices() {
        if let Some(open) = quote {
            if ch == open {
                quote = None;
            }
            prev = ch;
            continue;
        }
        match ch {
            '\'' | '"' | '`' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(&body[start..at]);
                start = at + 1;
            }
            _ if depth == 0 && prev.is_whitespace() && ends_projection(&upper[at..]) => {
                items.push(&body[start..at]);
                return items;
            }
            _ => {}
        }
        prev = ch;
    }
    items.push(&body[start..]);
    items
}

fn ends_projection(rest: &str) -> bool {
    ["ORDER", "SKIP", "LIMIT", "UNION"].iter().any(|keyword| {
        rest.strip_prefix(keyword)
            .is_some_and(|tail| tail.starts_with(|c: char| c.is_whitespace()) || tail.is_empty())
    })
}

fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(flag) => (*flag).into(),
        Value::Number(number) => match number.as_i64() {
            Some(int) => int.into(),
            None => number.as_f64().unwrap_or(f64::NAN).into(),
        },
        Value::String(text) => text.clone().into(),
        Value::Array(items) => BoltType::List(BoltList {
            value: items.iter().map(to_bolt).collect(),
        }),
        Value::Object(entries) => BoltType::Map(BoltMap {
            value: entries
                .iter()
                .map(|(key, value)| (BoltString::from(key.as_str()), to_bolt(value)))
                .collect::<HashMap<_, _>>(),
        }),
    }
}

/// Stands in for a live connection; always answers with [`mock_records`].
pub struct DryRunGraph;

impl GraphQuery for DryRunGraph {
    fn run_query(&self, _cypher: &str, params: &Params) -> Result<Vec<Record>, XmapError> {
        info!(params = params.len(), "dry run, returning mock records");
        Ok(mock_records())
    }
}

pub fn mock_records() -> Vec<Record> {
    let record = json!({
        "Group": "TEST Group",
        "cl_mappings": [
            {"id": "CL:0000001", "name": "test cell", "labelset": "Group", "cell_set": "TEST Group"}
        ],
        "WMB_AT": [
            {"labelset": "supertype", "cell_set": "0123 TEST Supertype"}
        ],
        "refs": ["https://doi.org/example"],
        "no_cl_mapping": false
    });
    match record {
        Value::Object(map) => vec![map],
        _ => Vec::new(),
    }
}

/// Parses `--args`: inline JSON, or a path to a JSON file. Must be an object.
pub fn parse_params(raw: &str) -> Result<Params, XmapError> {
    let path = std::path::Path::new(raw);
    let text = if path.is_file() {
        std::fs::read_to_string(path).map_err(|err| XmapError::QueryArgs(err.to_string()))?
    } else {
        raw.to_string()
    };
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Params::new()),
        Ok(other) => Err(XmapError::QueryArgs(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(err) => Err(XmapError::QueryArgs(err.to_string())),
    }
}
