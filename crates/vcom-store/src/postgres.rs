//! Postgres vote store via SQLx.
//!
//! Tables are created by the embedded migrations in `migrations/`. The
//! `commitments` primary key on `cycle` enforces write-once at the database;
//! a unique violation is reported as `DuplicateCommitment`.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use vcom_core::{
    BallotRecord, CommitmentRecord, CycleId, Digest32, LeafSchema, OptionId, PositionId,
    Timestamp, TxRef, VoterId,
};

use crate::error::StoreError;
use crate::VoteStore;

/// Postgres-backed [`VoteStore`].
#[derive(Debug, Clone)]
pub struct PgVoteStore {
    pool: PgPool,
}

impl PgVoteStore {
    /// Wrap an existing pool. Migrations are not run.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `url` and apply the embedded migrations.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(url)
            .await?;
        tracing::info!("Connected to PostgreSQL");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {e}")))?;
        tracing::info!("Database migrations applied");

        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a ballot unless its cycle is closed.
    ///
    /// The closed check and the insert run in one transaction holding a
    /// share lock on `closed_cycles`, so a concurrent close cannot slip in
    /// between them.
    pub async fn cast(&self, ballot: &BallotRecord) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("LOCK TABLE closed_cycles IN SHARE MODE")
            .execute(&mut *tx)
            .await?;
        let closed: Option<(String,)> =
            sqlx::query_as("SELECT cycle FROM closed_cycles WHERE cycle = $1")
                .bind(ballot.cycle.as_str())
                .fetch_optional(&mut *tx)
                .await?;
        if closed.is_some() {
            return Err(StoreError::CycleClosed {
                cycle: ballot.cycle.clone(),
            });
        }
        sqlx::query(
            "INSERT INTO ballots (cycle, voter, position, selections) VALUES ($1, $2, $3, $4)",
        )
        .bind(ballot.cycle.as_str())
        .bind(ballot.voter.as_str())
        .bind(ballot.position.as_str())
        .bind(Json(&ballot.selections))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

impl VoteStore for PgVoteStore {
    async fn ballots(&self, cycle: &CycleId) -> Result<Vec<BallotRecord>, StoreError> {
        let rows = sqlx::query_as::<_, BallotRow>(
            "SELECT cycle, voter, position, selections FROM ballots WHERE cycle = $1 ORDER BY id",
        )
        .bind(cycle.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(BallotRow::into_record).collect())
    }

    async fn commitment(&self, cycle: &CycleId) -> Result<Option<CommitmentRecord>, StoreError> {
        let row = sqlx::query_as::<_, CommitmentRow>(
            "SELECT cycle, root, tx_ref, ledger, leaf_count, leaf_schema, created_at
             FROM commitments WHERE cycle = $1",
        )
        .bind(cycle.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(CommitmentRow::into_record).transpose()
    }

    async fn insert_commitment(&self, record: &CommitmentRecord) -> Result<(), StoreError> {
        let leaf_count = i64::try_from(record.leaf_count).map_err(|_| StoreError::Corrupt {
            location: "commitments.leaf_count".into(),
            reason: format!("{} does not fit BIGINT", record.leaf_count),
        })?;
        let result = sqlx::query(
            "INSERT INTO commitments (cycle, root, tx_ref, ledger, leaf_count, leaf_schema, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(record.cycle.as_str())
        .bind(record.root.to_hex())
        .bind(record.tx_ref.as_str())
        .bind(&record.ledger)
        .bind(leaf_count)
        .bind(record.schema.as_str())
        .bind(*record.created_at.as_datetime())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::DuplicateCommitment {
                    cycle: record.cycle.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn close_cycle(&self, cycle: &CycleId) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO closed_cycles (cycle, closed_at) VALUES ($1, $2)
             ON CONFLICT (cycle) DO NOTHING",
        )
        .bind(cycle.as_str())
        .bind(*Timestamp::now().as_datetime())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_closed(&self, cycle: &CycleId) -> Result<bool, StoreError> {
        let (closed,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM closed_cycles WHERE cycle = $1)")
                .bind(cycle.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(closed)
    }
}

#[derive(sqlx::FromRow)]
struct BallotRow {
    cycle: String,
    voter: String,
    position: String,
    selections: Json<Vec<OptionId>>,
}

impl BallotRow {
    fn into_record(self) -> BallotRecord {
        BallotRecord {
            voter: VoterId::new(self.voter),
            selections: self.selections.0,
            position: PositionId::new(self.position),
            cycle: CycleId::new(self.cycle),
        }
    }
}

#[derive(sqlx::FromRow)]
struct CommitmentRow {
    cycle: String,
    root: String,
    tx_ref: String,
    ledger: String,
    leaf_count: i64,
    leaf_schema: String,
    created_at: DateTime<Utc>,
}

impl CommitmentRow {
    fn into_record(self) -> Result<CommitmentRecord, StoreError> {
        let corrupt = |field: &str, reason: String| StoreError::Corrupt {
            location: format!("commitments.{field} ({})", self.cycle),
            reason,
        };
        let root = Digest32::from_hex(&self.root).map_err(|e| corrupt("root", e.to_string()))?;
        let schema: LeafSchema = self
            .leaf_schema
            .parse()
            .map_err(|e: vcom_core::ParseError| corrupt("leaf_schema", e.to_string()))?;
        let leaf_count = u64::try_from(self.leaf_count)
            .map_err(|_| corrupt("leaf_count", format!("negative: {}", self.leaf_count)))?;
        Ok(CommitmentRecord {
            cycle: CycleId::new(self.cycle.clone()),
            root,
            tx_ref: TxRef::new(self.tx_ref),
            ledger: self.ledger,
            leaf_count,
            schema,
            created_at: Timestamp::from_utc(self.created_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commitment_row() -> CommitmentRow {
        CommitmentRow {
            cycle: "2024".into(),
            root: "ab".repeat(32),
            tx_ref: "0xbeef".into(),
            ledger: "base".into(),
            leaf_count: 3,
            leaf_schema: "selection-v1".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn commitment_row_maps_to_record() {
        let record = commitment_row().into_record().unwrap();
        assert_eq!(record.cycle.as_str(), "2024");
        assert_eq!(record.root, Digest32::from_bytes([0xab; 32]));
        assert_eq!(record.schema, LeafSchema::SelectionV1);
        assert_eq!(record.leaf_count, 3);
    }

    #[test]
    fn corrupt_commitment_row_is_reported() {
        let mut row = commitment_row();
        row.root = "zz".into();
        assert!(matches!(row.into_record(), Err(StoreError::Corrupt { .. })));

        let mut row = commitment_row();
        row.leaf_schema = "ballot-v9".into();
        assert!(matches!(row.into_record(), Err(StoreError::Corrupt { .. })));

        let mut row = commitment_row();
        row.leaf_count = -1;
        assert!(matches!(row.into_record(), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn ballot_row_maps_to_record() {
        let row = BallotRow {
            cycle: "2024".into(),
            voter: "V3".into(),
            position: "P2".into(),
            selections: Json(vec![OptionId::new("C3"), OptionId::new("C1")]),
        };
        assert_eq!(
            row.into_record(),
            BallotRecord::new("V3", ["C3", "C1"], "P2", "2024")
        );
    }
}
