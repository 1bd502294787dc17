//! pgvector-backed index
//!
//! Expects a table with `object_type TEXT, object_id BIGINT, chunk_id INT,
//! vector VECTOR(n), metadata JSONB` and ideally an HNSW cosine index on
//! `vector`. Similarity is `1 - (vector <=> query)`.

use async_trait::async_trait;
use signal_core::{ObjectType, PipelineError, VectorHit, VectorIndex};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::collections::BTreeMap;
use tracing::debug;

/// Schema-qualified Postgres table name
#[derive(Debug, Clone)]
pub struct TableName {
    schema: String,
    table: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Result<Self, PipelineError> {
        let schema = schema.into();
        let table = table.into();
        if schema.trim().is_empty() || table.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "vector table schema and name are required".to_string(),
            ));
        }
        Ok(Self { schema, table })
    }

    /// Quoted `"schema"."table"` reference
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }
}

impl Default for TableName {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            table: "research_embedding".to_string(),
        }
    }
}

fn quote_ident(input: &str) -> String {
    format!("\"{}\"", input.replace('"', "\"\""))
}

/// Render a vector as a pgvector literal, e.g. `[0.1,0.2]`
pub fn vector_literal(v: &[f32]) -> String {
    let body: Vec<String> = v.iter().map(|x| x.to_string()).collect();
    format!("[{}]", body.join(","))
}

/// Parse pgvector text output back into floats
pub fn parse_vector_literal(text: &str) -> Result<Vec<f32>, PipelineError> {
    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| PipelineError::InvalidData(format!("malformed vector literal: {text}")))?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|e| PipelineError::InvalidData(format!("bad vector component '{part}': {e}")))
        })
        .collect()
}

fn map_sqlx(err: sqlx::Error) -> PipelineError {
    match &err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            PipelineError::Configuration(format!("vector index unreachable: {err}"))
        }
        _ => PipelineError::Database(err.to_string()),
    }
}

pub struct PgVectorIndex {
    pool: PgPool,
    table: TableName,
}

impl PgVectorIndex {
    pub fn new(pool: PgPool, table: TableName) -> Self {
        Self { pool, table }
    }

    pub async fn connect(database_url: &str, table: TableName) -> Result<Self, PipelineError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| PipelineError::Configuration(format!("vector index unreachable: {e}")))?;
        Ok(Self::new(pool, table))
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn search(
        &self,
        query: &[f32],
        allowed: &[ObjectType],
        k: usize,
    ) -> Result<Vec<VectorHit>, PipelineError> {
        if k == 0 || allowed.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT object_type, object_id, chunk_id,
                    1 - (vector <=> $1::vector) AS sim,
                    metadata::text AS metadata
             FROM {}
             WHERE object_type = ANY($2)
             ORDER BY vector <=> $1::vector
             LIMIT $3",
            self.table.qualified()
        );
        let types: Vec<String> = allowed.iter().map(|t| t.as_str().to_string()).collect();

        let rows = sqlx::query(&sql)
            .bind(vector_literal(query))
            .bind(&types)
            .bind(k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let object_type: String = row.try_get("object_type").map_err(map_sqlx)?;
            let metadata: Option<String> = row.try_get("metadata").map_err(map_sqlx)?;
            hits.push(VectorHit {
                object_type: object_type.parse()?,
                object_id: row.try_get("object_id").map_err(map_sqlx)?,
                chunk_id: row.try_get("chunk_id").map_err(map_sqlx)?,
                similarity: row.try_get("sim").map_err(map_sqlx)?,
                metadata: match metadata {
                    Some(text) => serde_json::from_str(&text)?,
                    None => serde_json::Value::Null,
                },
            });
        }

        debug!(hits = hits.len(), k, "pgvector search");
        Ok(hits)
    }

    async fn vectors_for(
        &self,
        object_type: ObjectType,
        object_id: i64,
    ) -> Result<BTreeMap<i32, Vec<f32>>, PipelineError> {
        let sql = format!(
            "SELECT chunk_id, vector::text AS vector FROM {} WHERE object_type = $1 AND object_id = $2",
            self.table.qualified()
        );
        let rows = sqlx::query(&sql)
            .bind(object_type.as_str())
            .bind(object_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        let mut out = BTreeMap::new();
        for row in rows {
            let chunk_id: i32 = row.try_get("chunk_id").map_err(map_sqlx)?;
            let text: String = row.try_get("vector").map_err(map_sqlx)?;
            out.insert(chunk_id, parse_vector_literal(&text)?);
        }
        Ok(out)
    }

    async fn health(&self) -> Result<(), PipelineError> {
        let (exists,): (Option<String>,) = sqlx::query_as("SELECT to_regclass($1::text)::text")
            .bind(self.table.qualified())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PipelineError::Configuration(format!("vector index unreachable: {e}")))?;

        match exists {
            Some(_) => Ok(()),
            None => Err(PipelineError::Configuration(format!(
                "vector table {} does not exist",
                self.table.qualified()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_literal_round_trip() {
        let v = vec![0.5f32, -1.0, 2.25];
        let text = vector_literal(&v);
        assert_eq!(text, "[0.5,-1,2.25]");
        assert_eq!(parse_vector_literal(&text).unwrap(), v);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_vector_literal("0.1,0.2").is_err());
        assert!(parse_vector_literal("[0.1,abc]").is_err());
        assert!(parse_vector_literal("[]").unwrap().is_empty());
    }

    #[test]
    fn test_table_name_quoting() {
        let t = TableName::new("public", "research\"embedding").unwrap();
        assert_eq!(t.qualified(), "\"public\".\"research\"\"embedding\"");
        assert!(TableName::new("", "x").is_err());
    }
}
