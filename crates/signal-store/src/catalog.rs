//! Reference catalog reads and the SQL-backed research catalog

use async_trait::async_trait;
use signal_core::{
    CompanyRecord, IndustryPlayerRecord, IndustryRecord, ObjectType, PipelineError,
    ResearchCatalog, ResearchObject, ThesisSide,
};

use crate::db::SignalDb;
use crate::error::StoreResult;

type PlayerRow = (i64, i64, Option<i64>, String, Option<f64>);

fn player_from_row((id, industry_id, company_id, name, market_cap_usd): PlayerRow) -> IndustryPlayerRecord {
    IndustryPlayerRecord {
        id,
        industry_id,
        company_id,
        name,
        market_cap_usd,
    }
}

impl SignalDb {
    /// All companies ordered by descending market cap, then id
    pub async fn companies(&self) -> StoreResult<Vec<CompanyRecord>> {
        let rows: Vec<(i64, String, String, Option<f64>, bool)> = sqlx::query_as(
            "SELECT id, ticker, name, market_cap, is_active FROM companies
             ORDER BY market_cap IS NULL, market_cap DESC, id",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, ticker, name, market_cap, is_active)| CompanyRecord {
                id,
                ticker,
                name,
                market_cap,
                is_active,
            })
            .collect())
    }

    pub async fn industries(&self) -> StoreResult<Vec<IndustryRecord>> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM industries ORDER BY id")
                .fetch_all(self.pool())
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| IndustryRecord { id, name })
            .collect())
    }

    /// Every industry player, bound or not
    pub async fn industry_players(&self) -> StoreResult<Vec<IndustryPlayerRecord>> {
        let rows: Vec<PlayerRow> = sqlx::query_as(
            "SELECT id, industry_id, company_id, name, market_cap_usd
             FROM industry_players ORDER BY id",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(player_from_row).collect())
    }

    pub async fn upsert_company(&self, company: &CompanyRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO companies (id, ticker, name, market_cap, is_active)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                ticker = excluded.ticker,
                name = excluded.name,
                market_cap = excluded.market_cap,
                is_active = excluded.is_active
            "#,
        )
        .bind(company.id)
        .bind(&company.ticker)
        .bind(&company.name)
        .bind(company.market_cap)
        .bind(company.is_active)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn upsert_industry(&self, industry: &IndustryRecord) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO industries (id, name) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        )
        .bind(industry.id)
        .bind(&industry.name)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn upsert_industry_player(&self, player: &IndustryPlayerRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO industry_players (id, industry_id, company_id, name, market_cap_usd)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                industry_id = excluded.industry_id,
                company_id = excluded.company_id,
                name = excluded.name,
                market_cap_usd = excluded.market_cap_usd
            "#,
        )
        .bind(player.id)
        .bind(player.industry_id)
        .bind(player.company_id)
        .bind(&player.name)
        .bind(player.market_cap_usd)
        .execute(self.pool())
        .await?;

        Ok(())
    }
}

/// Resolves vector-hit objects against the research tables
#[derive(Clone)]
pub struct SqlResearchCatalog {
    db: SignalDb,
}

impl SqlResearchCatalog {
    pub fn new(db: SignalDb) -> Self {
        Self { db }
    }

    async fn owner_of(&self, table: &str, owner_column: &str, id: i64) -> StoreResult<Option<i64>> {
        let sql = format!("SELECT {owner_column} FROM {table} WHERE id = ?");
        let row: Option<(i64,)> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.map(|(owner,)| owner))
    }

    async fn lookup_inner(
        &self,
        object_type: ObjectType,
        object_id: i64,
    ) -> StoreResult<Option<ResearchObject>> {
        let object = match object_type {
            ObjectType::NewsChunk => None,
            ObjectType::CompanyProfile => self
                .owner_of("company_profiles", "company_id", object_id)
                .await?
                .map(|company_id| ResearchObject::CompanyProfile { company_id }),
            ObjectType::CompanyRisk => self
                .owner_of("company_risks", "company_id", object_id)
                .await?
                .map(|company_id| ResearchObject::CompanyRisk { company_id }),
            ObjectType::IndustryProfile => self
                .owner_of("industry_profiles", "industry_id", object_id)
                .await?
                .map(|industry_id| ResearchObject::IndustryProfile { industry_id }),
            ObjectType::CompanyCatalyst => {
                let row: Option<(i64, bool)> =
                    sqlx::query_as("SELECT company_id, positive FROM company_catalysts WHERE id = ?")
                        .bind(object_id)
                        .fetch_optional(self.db.pool())
                        .await?;
                row.map(|(company_id, positive)| ResearchObject::CompanyCatalyst {
                    company_id,
                    positive,
                })
            }
            ObjectType::CompanyThesis => {
                let row: Option<(i64, String)> =
                    sqlx::query_as("SELECT company_id, side FROM company_theses WHERE id = ?")
                        .bind(object_id)
                        .fetch_optional(self.db.pool())
                        .await?;
                row.map(|(company_id, side)| ResearchObject::CompanyThesis {
                    company_id,
                    side: ThesisSide::from_label(&side),
                })
            }
            ObjectType::IndustryPlayer => {
                let row: Option<PlayerRow> = sqlx::query_as(
                    "SELECT id, industry_id, company_id, name, market_cap_usd
                     FROM industry_players WHERE id = ?",
                )
                .bind(object_id)
                .fetch_optional(self.db.pool())
                .await?;
                row.map(|r| ResearchObject::IndustryPlayer(player_from_row(r)))
            }
        };

        Ok(object)
    }
}

#[async_trait]
impl ResearchCatalog for SqlResearchCatalog {
    async fn lookup(
        &self,
        object_type: ObjectType,
        object_id: i64,
    ) -> Result<Option<ResearchObject>, PipelineError> {
        Ok(self.lookup_inner(object_type, object_id).await?)
    }

    async fn industry_players(
        &self,
        industry_id: i64,
    ) -> Result<Vec<IndustryPlayerRecord>, PipelineError> {
        let rows: Vec<PlayerRow> = sqlx::query_as(
            "SELECT id, industry_id, company_id, name, market_cap_usd
             FROM industry_players
             WHERE industry_id = ? AND company_id IS NOT NULL
             ORDER BY id",
        )
        .bind(industry_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(crate::error::StoreError::from)?;

        Ok(rows.into_iter().map(player_from_row).collect())
    }
}
