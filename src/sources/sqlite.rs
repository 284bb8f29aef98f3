//! SQLite adapter: one table row per code pair.

use std::collections::HashSet;
use std::path::Path;

use rusqlite::{params_from_iter, Connection, OpenFlags};
use tracing::debug;

use super::{DataSource, SourceConfig, SourceFilters, SourceKind};
use crate::error::{Error, Result};
use crate::models::CodePair;

/// Reads pairs out of a user-designated table with prepared statements.
#[derive(Debug)]
pub struct SqliteSource {
    conn: Connection,
    config: SourceConfig,
    filters: SourceFilters,
    max_cell_bytes: u64,
}

impl SqliteSource {
    /// Open the database and validate the column mapping.
    ///
    /// Missing table/columns and identifier collisions are rejected here,
    /// never mid-session.
    pub fn new(config: SourceConfig, filters: SourceFilters) -> Result<Self> {
        let SourceConfig::Sqlite {
            database_path,
            table_name,
            identifier_column,
            generated_code_column,
            expected_code_column,
            input_code_column,
            model_column,
            prompting_strategy_column,
        } = &config
        else {
            return Err(Error::Config(
                "sqlite adapter requires a sqlite configuration".into(),
            ));
        };

        if !Path::new(database_path).is_file() {
            return Err(Error::Config(format!(
                "database not found: {}",
                database_path.display()
            )));
        }
        let conn = Connection::open_with_flags(
            database_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let present = table_columns(&conn, table_name)?;
        let mut required: Vec<&String> = vec![identifier_column, generated_code_column];
        required.extend(expected_code_column.iter());
        required.extend(input_code_column.iter());
        required.extend(model_column.iter());
        required.extend(prompting_strategy_column.iter());
        for column in required {
            if !present.contains(column.as_str()) {
                return Err(Error::Config(format!(
                    "column '{}' not found in table '{}'",
                    column, table_name
                )));
            }
        }

        if filters.model.is_some() && model_column.is_none() {
            return Err(Error::Config(
                "model filter requires a model column".into(),
            ));
        }
        if filters.strategy.is_some() && prompting_strategy_column.is_none() {
            return Err(Error::Config(
                "strategy filter requires a prompting strategy column".into(),
            ));
        }

        let source = Self {
            conn,
            config,
            filters,
            max_cell_bytes: super::DEFAULT_MAX_CELL_BYTES,
        };
        source.reject_identifier_collisions()?;
        Ok(source)
    }

    /// Override the per-cell read ceiling.
    pub fn with_max_cell_bytes(mut self, max_cell_bytes: u64) -> Self {
        self.max_cell_bytes = max_cell_bytes;
        self
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn fields(&self) -> SqliteFields<'_> {
        match &self.config {
            SourceConfig::Sqlite {
                table_name,
                identifier_column,
                generated_code_column,
                expected_code_column,
                input_code_column,
                model_column,
                prompting_strategy_column,
                ..
            } => SqliteFields {
                table: table_name,
                identifier: identifier_column,
                generated: generated_code_column,
                expected: expected_code_column.as_deref(),
                input: input_code_column.as_deref(),
                model: model_column.as_deref(),
                strategy: prompting_strategy_column.as_deref(),
            },
            _ => unreachable!("constructor enforces a sqlite configuration"),
        }
    }

    /// WHERE clause + parameters for the configured filters.
    fn filter_clause(&self) -> (String, Vec<String>) {
        let fields = self.fields();
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        if let (Some(model), Some(column)) = (&self.filters.model, fields.model) {
            clauses.push(format!("{} = ?", quote_ident(column)));
            params.push(model.clone());
        }
        if let (Some(strategy), Some(column)) = (&self.filters.strategy, fields.strategy) {
            clauses.push(format!("{} = ?", quote_ident(column)));
            params.push(strategy.clone());
        }
        let clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" AND {}", clauses.join(" AND "))
        };
        (clause, params)
    }

    fn reject_identifier_collisions(&self) -> Result<()> {
        let fields = self.fields();
        let sql = format!(
            "SELECT CAST({id} AS TEXT) FROM {table} WHERE {id} IS NOT NULL \
             GROUP BY {id} HAVING COUNT(*) > 1 LIMIT 1",
            id = quote_ident(fields.identifier),
            table = quote_ident(fields.table),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        if let Some(row) = rows.next()? {
            let identifier: String = row.get(0)?;
            return Err(Error::ambiguous(identifier));
        }
        Ok(())
    }
}

struct SqliteFields<'a> {
    table: &'a str,
    identifier: &'a str,
    generated: &'a str,
    expected: Option<&'a str>,
    input: Option<&'a str>,
    model: Option<&'a str>,
    strategy: Option<&'a str>,
}

impl DataSource for SqliteSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Sqlite
    }

    fn inventory(&mut self) -> Result<Vec<String>> {
        let fields = self.fields();
        let (clause, params) = self.filter_clause();
        let sql = format!(
            "SELECT CAST({id} AS TEXT) FROM {table} WHERE {id} IS NOT NULL{clause} \
             ORDER BY rowid",
            id = quote_ident(fields.identifier),
            table = quote_ident(fields.table),
            clause = clause,
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            row.get::<_, String>(0)
        })?;
        let mut inventory = Vec::new();
        for row in rows {
            inventory.push(row?);
        }
        debug!(rows = inventory.len(), "sqlite inventory loaded");
        Ok(inventory)
    }

    fn get_code_pair(&mut self, identifier: &str) -> Result<CodePair> {
        let fields = self.fields();

        let mut select = vec![quote_ident(fields.generated)];
        for column in [fields.expected, fields.input, fields.model, fields.strategy]
            .into_iter()
            .flatten()
        {
            select.push(quote_ident(column));
        }
        let sql = format!(
            "SELECT {columns} FROM {table} WHERE CAST({id} AS TEXT) = ? LIMIT 1",
            columns = select.join(", "),
            table = quote_ident(fields.table),
            id = quote_ident(fields.identifier),
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([identifier])?;
        let row = rows
            .next()?
            .ok_or_else(|| Error::read_failed(identifier, "row not found"))?;

        let generated: Option<String> = row.get(0)?;
        let generated = generated.unwrap_or_default();
        if generated.len() as u64 > self.max_cell_bytes {
            return Err(Error::read_failed(
                identifier,
                format!("generated cell exceeds {} bytes", self.max_cell_bytes),
            ));
        }

        let mut next = 1usize;
        let mut take = |present: bool| -> rusqlite::Result<Option<String>> {
            if present {
                let value: Option<String> = row.get(next)?;
                next += 1;
                Ok(value)
            } else {
                Ok(None)
            }
        };
        let expected = take(fields.expected.is_some())?;
        let input = take(fields.input.is_some())?;
        let model = take(fields.model.is_some())?;
        let strategy = take(fields.strategy.is_some())?;

        let mut pair = CodePair::new(identifier, generated);
        if let Some(expected) = expected {
            pair = pair.with_expected(expected);
        }
        if let Some(input) = input {
            pair = pair.with_input(input);
        }
        if let Some(model) = model {
            pair = pair.with_source_info("model_name", model);
        }
        if let Some(strategy) = strategy {
            pair = pair.with_source_info("prompting_strategy", strategy);
        }
        pair = pair.with_source_info("table", fields.table.to_string());
        pair.validate()?;
        Ok(pair)
    }
}

/// Names validated against PRAGMA output, quoted against embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut columns = HashSet::new();
    for row in rows {
        columns.insert(row?);
    }
    if columns.is_empty() {
        return Err(Error::Config(format!("table '{}' not found", table)));
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn seeded_db(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("pairs.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE results (
                id TEXT,
                generated TEXT,
                expected TEXT,
                model TEXT,
                strategy TEXT
            );
            INSERT INTO results VALUES ('a', 'gen a', 'exp a', 'm1', 's1');
            INSERT INTO results VALUES ('b', 'gen b', NULL, 'm1', 's2');
            INSERT INTO results VALUES ('c', 'gen c', 'exp c', 'm2', 's1');",
        )
        .unwrap();
        path
    }

    fn sqlite_config(path: PathBuf) -> SourceConfig {
        SourceConfig::Sqlite {
            database_path: path,
            table_name: "results".into(),
            identifier_column: "id".into(),
            generated_code_column: "generated".into(),
            expected_code_column: Some("expected".into()),
            input_code_column: None,
            model_column: Some("model".into()),
            prompting_strategy_column: Some("strategy".into()),
        }
    }

    #[test]
    fn test_inventory_preserves_row_order() {
        let dir = TempDir::new().unwrap();
        let mut source =
            SqliteSource::new(sqlite_config(seeded_db(&dir)), SourceFilters::default()).unwrap();
        assert_eq!(source.inventory().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(source.total_count().unwrap(), 3);
    }

    #[test]
    fn test_get_code_pair_materializes_columns() {
        let dir = TempDir::new().unwrap();
        let mut source =
            SqliteSource::new(sqlite_config(seeded_db(&dir)), SourceFilters::default()).unwrap();

        let pair = source.get_code_pair("a").unwrap();
        assert_eq!(pair.generated_code, "gen a");
        assert_eq!(pair.expected_code.as_deref(), Some("exp a"));
        assert_eq!(pair.model_name(), Some("m1"));
        assert_eq!(pair.prompting_strategy(), Some("s1"));

        // NULL expected column is a legal pair.
        let pair = source.get_code_pair("b").unwrap();
        assert!(pair.expected_code.is_none());
    }

    #[test]
    fn test_model_filter_pushdown() {
        let dir = TempDir::new().unwrap();
        let filters = SourceFilters {
            model: Some("m1".into()),
            strategy: None,
        };
        let mut source = SqliteSource::new(sqlite_config(seeded_db(&dir)), filters).unwrap();
        assert_eq!(source.inventory().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_missing_column_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = sqlite_config(seeded_db(&dir));
        if let SourceConfig::Sqlite {
            generated_code_column,
            ..
        } = &mut config
        {
            *generated_code_column = "no_such_column".into();
        }
        let err = SqliteSource::new(config, SourceFilters::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_identifier_collision_rejected_at_configure_time() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dup.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE results (id TEXT, generated TEXT, expected TEXT, model TEXT, strategy TEXT);
            INSERT INTO results VALUES ('x', 'one', NULL, NULL, NULL);
            INSERT INTO results VALUES ('x', 'two', NULL, NULL, NULL);",
        )
        .unwrap();
        drop(conn);

        let err = SqliteSource::new(sqlite_config(path), SourceFilters::default()).unwrap_err();
        assert!(matches!(err, Error::AmbiguousIdentifiers { .. }));
    }

    #[test]
    fn test_missing_database_rejected() {
        let err = SqliteSource::new(
            sqlite_config(PathBuf::from("/no/such/db.sqlite")),
            SourceFilters::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_data_samples_handles() {
        let dir = TempDir::new().unwrap();
        let mut source =
            SqliteSource::new(sqlite_config(seeded_db(&dir)), SourceFilters::default()).unwrap();
        let handles = source.load_data(100.0, "session").unwrap();
        assert_eq!(handles.len(), 3);
        assert!(handles.iter().all(|pair| pair.is_lazy()));
    }
}
