//! Repository for case artifact database operations

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::models::{HostIocRow, NetworkIocRow, TimelineRow, category_to_string};
use super::{CaseStore, DbError};
use crate::model::{CaseData, CommitBatch, HostIoc, NetworkIoc, Provenance, TimelineEvent};

/// Repository for host, network and timeline artifacts of a case
#[derive(Clone)]
pub struct CaseRepository {
    pool: PgPool,
}

impl CaseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_host_ioc(
        tx: &mut Transaction<'_, Postgres>,
        ioc: &HostIoc,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO host_ioc (
                indicator_id, case_id, run_id, indicator_type, indicator, full_path,
                sha256, sha1, md5, type_purpose, size_bytes, source, submitted_by, notes,
                status, capability, iteration, model, date_added
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(&ioc.indicator_id)
        .bind(&ioc.case_id)
        .bind(&ioc.provenance.run_id)
        .bind(&ioc.indicator_type)
        .bind(&ioc.indicator)
        .bind(&ioc.full_path)
        .bind(&ioc.sha256)
        .bind(&ioc.sha1)
        .bind(&ioc.md5)
        .bind(&ioc.type_purpose)
        .bind(ioc.size_bytes)
        .bind(&ioc.source)
        .bind(&ioc.submitted_by)
        .bind(&ioc.notes)
        .bind(ioc.status.as_str())
        .bind(category_to_string(ioc.provenance.capability))
        .bind(iteration_column(&ioc.provenance)?)
        .bind(&ioc.provenance.model)
        .bind(ioc.date_added)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn insert_network_ioc(
        tx: &mut Transaction<'_, Postgres>,
        ioc: &NetworkIoc,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO network_ioc (
                indicator_id, case_id, run_id, indicator_type, indicator, initial_lead,
                details_comments, earliest_evidence_utc, attack_alignment, source,
                submitted_by, notes, status, capability, iteration, model, date_added
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(&ioc.indicator_id)
        .bind(&ioc.case_id)
        .bind(&ioc.provenance.run_id)
        .bind(&ioc.indicator_type)
        .bind(&ioc.indicator)
        .bind(&ioc.initial_lead)
        .bind(&ioc.details_comments)
        .bind(ioc.earliest_evidence_utc)
        .bind(&ioc.attack_alignment)
        .bind(&ioc.source)
        .bind(&ioc.submitted_by)
        .bind(&ioc.notes)
        .bind(ioc.status.as_str())
        .bind(category_to_string(ioc.provenance.capability))
        .bind(iteration_column(&ioc.provenance)?)
        .bind(&ioc.provenance.model)
        .bind(ioc.date_added)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn insert_timeline_event(
        tx: &mut Transaction<'_, Postgres>,
        event: &TimelineEvent,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO timeline (
                event_id, case_id, run_id, timestamp_utc, timestamp_type, status_tag,
                system_name, activity, evidence_source, details_comments, attack_alignment,
                size_bytes, hash, submitted_by, notes, status, capability, iteration, model,
                date_added
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(&event.event_id)
        .bind(&event.case_id)
        .bind(&event.provenance.run_id)
        .bind(event.timestamp_utc)
        .bind(&event.timestamp_type)
        .bind(&event.status_tag)
        .bind(&event.system_name)
        .bind(&event.activity)
        .bind(&event.evidence_source)
        .bind(&event.details_comments)
        .bind(&event.attack_alignment)
        .bind(event.size_bytes)
        .bind(&event.hash)
        .bind(&event.submitted_by)
        .bind(&event.notes)
        .bind(event.status.as_str())
        .bind(category_to_string(event.provenance.capability))
        .bind(iteration_column(&event.provenance)?)
        .bind(&event.provenance.model)
        .bind(event.date_added)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

fn iteration_column(provenance: &Provenance) -> Result<i32, DbError> {
    i32::try_from(provenance.iteration)
        .map_err(|e| DbError::Serialization(format!("Invalid iteration: {}", e)))
}

#[async_trait]
impl CaseStore for CaseRepository {
    /// Insert every record of the batch inside one transaction
    async fn write_batch(&self, batch: &CommitBatch) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        for ioc in &batch.host_iocs {
            Self::insert_host_ioc(&mut tx, ioc).await?;
        }
        for ioc in &batch.network_iocs {
            Self::insert_network_ioc(&mut tx, ioc).await?;
        }
        for event in &batch.timeline_events {
            Self::insert_timeline_event(&mut tx, event).await?;
        }

        // Dropping the transaction on any error above rolls it back
        tx.commit().await?;

        let summary = batch.summary();
        tracing::debug!(
            case_id = %batch.case_id,
            run_id = %batch.run_id,
            host = summary.host,
            network = summary.network,
            timeline = summary.timeline,
            "Committed extraction batch"
        );

        Ok(())
    }

    async fn read_case_data(&self, case_id: &str) -> Result<CaseData, DbError> {
        let host_rows: Vec<HostIocRow> = sqlx::query_as(
            r#"
            SELECT * FROM host_ioc WHERE case_id = $1 ORDER BY date_added, indicator_id
            "#,
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;

        let network_rows: Vec<NetworkIocRow> = sqlx::query_as(
            r#"
            SELECT * FROM network_ioc WHERE case_id = $1 ORDER BY date_added, indicator_id
            "#,
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;

        let timeline_rows: Vec<TimelineRow> = sqlx::query_as(
            r#"
            SELECT * FROM timeline WHERE case_id = $1 ORDER BY timestamp_utc, event_id
            "#,
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(CaseData {
            host_iocs: host_rows
                .into_iter()
                .map(HostIocRow::into_domain)
                .collect::<Result<_, _>>()
                .map_err(DbError::Serialization)?,
            network_iocs: network_rows
                .into_iter()
                .map(NetworkIocRow::into_domain)
                .collect::<Result<_, _>>()
                .map_err(DbError::Serialization)?,
            timeline_events: timeline_rows
                .into_iter()
                .map(TimelineRow::into_domain)
                .collect::<Result<_, _>>()
                .map_err(DbError::Serialization)?,
        })
    }
}
