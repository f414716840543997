//! PostgreSQL inventory store
//!
//! A transition is one transaction: the conditional state update, the
//! `FOR UPDATE` locks on the touched stock rows, the shortfall check, the
//! ledger writes, the movement rows and the history event. Any error drops
//! the transaction before commit, which rolls everything back.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    find_shortfalls, net_deltas, Discrepancy, DiscrepancyKind, LedgerEntry, LineDiscrepancy,
    Location, MovementReason, Pagination, ReceiptSummary, StockDelta, StockKey, StockMovement,
    Transfer, TransferAction, TransferEvent, TransferFilter, TransferLine, TransferLineInput,
    TransferState,
};
use sqlx::{types::Json, FromRow, PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{InventoryStore, Transition};
use crate::error::{AppError, AppResult};
use crate::tenant::TenantScope;

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgInventoryStore {
    db: PgPool,
    lock_timeout_ms: u64,
}

impl PgInventoryStore {
    pub fn new(db: PgPool, lock_timeout_ms: u64) -> Self {
        Self { db, lock_timeout_ms }
    }

    /// Apply pending migrations from `backend/migrations`
    pub async fn run_migrations(&self) -> AppResult<()> {
        sqlx::migrate!("./migrations").run(&self.db).await?;
        Ok(())
    }

    /// Begin a transaction whose row-lock waits are bounded
    async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        let mut tx = self.db.begin().await?;
        sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout_ms))
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn load_transfer(&self, scope: &TenantScope, transfer_id: Uuid) -> AppResult<Option<Transfer>> {
        let mut conn = self.db.acquire().await?;
        let row = fetch_transfer_row(&mut conn, scope.tenant_id(), transfer_id).await?;
        match row {
            Some(row) => Ok(Some(hydrate_one(&mut conn, row).await?)),
            None => Ok(None),
        }
    }
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, FromRow)]
struct LocationRow {
    id: Uuid,
    tenant_id: Uuid,
    name: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<LocationRow> for Location {
    fn from(row: LocationRow) -> Self {
        Location {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct TransferRow {
    id: Uuid,
    tenant_id: Uuid,
    code: String,
    origin_location_id: Uuid,
    destination_location_id: Uuid,
    state: String,
    notes: Option<String>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    dispatched_by: Option<Uuid>,
    dispatched_at: Option<DateTime<Utc>>,
    received_by: Option<Uuid>,
    received_at: Option<DateTime<Utc>>,
    cancelled_by: Option<Uuid>,
    cancelled_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct LineRow {
    id: Uuid,
    transfer_id: Uuid,
    product_id: Uuid,
    quantity_dispatched: Decimal,
    quantity_received: Option<Decimal>,
    discrepancy_kind: Option<String>,
    discrepancy_quantity: Option<Decimal>,
}

#[derive(Debug, FromRow)]
struct EventRow {
    id: Uuid,
    transfer_id: Uuid,
    from_state: Option<String>,
    to_state: String,
    actor_id: Uuid,
    discrepancies: Json<Vec<LineDiscrepancy>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct StockLevelRow {
    tenant_id: Uuid,
    location_id: Uuid,
    product_id: Uuid,
    quantity_on_hand: Decimal,
    updated_at: DateTime<Utc>,
}

impl From<StockLevelRow> for LedgerEntry {
    fn from(row: StockLevelRow) -> Self {
        LedgerEntry {
            tenant_id: row.tenant_id,
            location_id: row.location_id,
            product_id: row.product_id,
            quantity_on_hand: row.quantity_on_hand,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    tenant_id: Uuid,
    location_id: Uuid,
    product_id: Uuid,
    delta: Decimal,
    balance_after: Decimal,
    reason: String,
    reference_id: Uuid,
    actor_id: Uuid,
    created_at: DateTime<Utc>,
}

fn parse_state(s: &str) -> AppResult<TransferState> {
    TransferState::parse(s).ok_or_else(|| AppError::Internal(format!("Unknown transfer state '{}'", s)))
}

impl TryFrom<LineRow> for TransferLine {
    type Error = AppError;

    fn try_from(row: LineRow) -> AppResult<Self> {
        let discrepancy = match (row.discrepancy_kind, row.discrepancy_quantity) {
            (Some(kind), Some(quantity)) => Some(Discrepancy {
                kind: DiscrepancyKind::parse(&kind)
                    .ok_or_else(|| AppError::Internal(format!("Unknown discrepancy kind '{}'", kind)))?,
                quantity,
            }),
            _ => None,
        };
        Ok(TransferLine {
            id: row.id,
            product_id: row.product_id,
            quantity_dispatched: row.quantity_dispatched,
            quantity_received: row.quantity_received,
            discrepancy,
        })
    }
}

impl TryFrom<EventRow> for TransferEvent {
    type Error = AppError;

    fn try_from(row: EventRow) -> AppResult<Self> {
        Ok(TransferEvent {
            id: row.id,
            transfer_id: row.transfer_id,
            from_state: row.from_state.as_deref().map(parse_state).transpose()?,
            to_state: parse_state(&row.to_state)?,
            actor_id: row.actor_id,
            discrepancies: row.discrepancies.0,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = AppError;

    fn try_from(row: MovementRow) -> AppResult<Self> {
        Ok(StockMovement {
            id: row.id,
            tenant_id: row.tenant_id,
            location_id: row.location_id,
            product_id: row.product_id,
            delta: row.delta,
            balance_after: row.balance_after,
            reason: MovementReason::parse(&row.reason)
                .ok_or_else(|| AppError::Internal(format!("Unknown movement reason '{}'", row.reason)))?,
            reference_id: row.reference_id,
            actor_id: row.actor_id,
            created_at: row.created_at,
        })
    }
}

fn into_transfer(row: TransferRow, lines: Vec<TransferLine>) -> AppResult<Transfer> {
    Ok(Transfer {
        id: row.id,
        tenant_id: row.tenant_id,
        code: row.code,
        origin_location_id: row.origin_location_id,
        destination_location_id: row.destination_location_id,
        state: parse_state(&row.state)?,
        notes: row.notes,
        lines,
        created_by: row.created_by,
        created_at: row.created_at,
        dispatched_by: row.dispatched_by,
        dispatched_at: row.dispatched_at,
        received_by: row.received_by,
        received_at: row.received_at,
        cancelled_by: row.cancelled_by,
        cancelled_at: row.cancelled_at,
        updated_at: row.updated_at,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

// ============================================================================
// Queries shared by pool reads and transactions
// ============================================================================

const TRANSFER_COLUMNS: &str = r#"
    id, tenant_id, code, origin_location_id, destination_location_id, state, notes,
    created_by, created_at, dispatched_by, dispatched_at, received_by, received_at,
    cancelled_by, cancelled_at, updated_at
"#;

async fn fetch_transfer_row(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    transfer_id: Uuid,
) -> AppResult<Option<TransferRow>> {
    let row = sqlx::query_as::<_, TransferRow>(&format!(
        "SELECT {} FROM transfers WHERE id = $1 AND tenant_id = $2",
        TRANSFER_COLUMNS
    ))
    .bind(transfer_id)
    .bind(tenant_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

/// Lines of several transfers, grouped by transfer id and kept in entry order
async fn fetch_lines(
    conn: &mut PgConnection,
    transfer_ids: &[Uuid],
) -> AppResult<HashMap<Uuid, Vec<TransferLine>>> {
    let rows = sqlx::query_as::<_, LineRow>(
        r#"
        SELECT id, transfer_id, product_id, quantity_dispatched, quantity_received,
               discrepancy_kind, discrepancy_quantity
        FROM transfer_lines
        WHERE transfer_id = ANY($1)
        ORDER BY transfer_id, position
        "#,
    )
    .bind(transfer_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut grouped: HashMap<Uuid, Vec<TransferLine>> = HashMap::new();
    for row in rows {
        let transfer_id = row.transfer_id;
        grouped
            .entry(transfer_id)
            .or_default()
            .push(TransferLine::try_from(row)?);
    }
    Ok(grouped)
}

async fn hydrate_one(conn: &mut PgConnection, row: TransferRow) -> AppResult<Transfer> {
    let mut lines = fetch_lines(conn, &[row.id]).await?;
    let lines = lines.remove(&row.id).unwrap_or_default();
    into_transfer(row, lines)
}

async fn insert_lines(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    transfer_id: Uuid,
    lines: &[TransferLine],
) -> AppResult<()> {
    for (position, line) in lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO transfer_lines (id, transfer_id, tenant_id, product_id, position, quantity_dispatched)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(line.id)
        .bind(transfer_id)
        .bind(tenant_id)
        .bind(line.product_id)
        .bind(position as i32)
        .bind(line.quantity_dispatched)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_event(conn: &mut PgConnection, tenant_id: Uuid, event: &TransferEvent) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO transfer_events (id, transfer_id, tenant_id, from_state, to_state, actor_id, discrepancies, notes, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(event.id)
    .bind(event.transfer_id)
    .bind(tenant_id)
    .bind(event.from_state.map(|s| s.as_str()))
    .bind(event.to_state.as_str())
    .bind(event.actor_id)
    .bind(Json(&event.discrepancies))
    .bind(&event.notes)
    .bind(event.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Lock, check and write a batch of deltas inside the caller's transaction.
///
/// Rows are locked in key order so concurrent batches touching the same
/// entries cannot deadlock. Nothing is written when any key would go negative.
async fn write_deltas(
    conn: &mut PgConnection,
    scope: &TenantScope,
    deltas: &[StockDelta],
    reason: MovementReason,
    reference_id: Uuid,
) -> AppResult<Vec<LedgerEntry>> {
    let net = net_deltas(deltas)?;

    let mut balances: HashMap<StockKey, Decimal> = HashMap::with_capacity(net.len());
    for key in net.keys() {
        let on_hand = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT quantity_on_hand FROM stock_levels
            WHERE tenant_id = $1 AND location_id = $2 AND product_id = $3
            FOR UPDATE
            "#,
        )
        .bind(scope.tenant_id())
        .bind(key.location_id)
        .bind(key.product_id)
        .fetch_optional(&mut *conn)
        .await?;
        balances.insert(*key, on_hand.unwrap_or(Decimal::ZERO));
    }

    let shortfalls = find_shortfalls(deltas, |key| {
        balances.get(key).copied().unwrap_or(Decimal::ZERO)
    })?;
    if !shortfalls.is_empty() {
        return Err(AppError::InsufficientStock { shortfalls });
    }

    let mut touched = Vec::with_capacity(net.len());
    for (key, change) in net {
        if change.is_zero() {
            continue;
        }
        tracing::debug!(
            location_id = %key.location_id,
            product_id = %key.product_id,
            delta = %change,
            reason = reason.as_str(),
            "Applying ledger delta"
        );

        let entry: LedgerEntry = sqlx::query_as::<_, StockLevelRow>(
            r#"
            INSERT INTO stock_levels (tenant_id, location_id, product_id, quantity_on_hand, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (tenant_id, location_id, product_id)
            DO UPDATE SET quantity_on_hand = stock_levels.quantity_on_hand + EXCLUDED.quantity_on_hand,
                          updated_at = NOW()
            RETURNING tenant_id, location_id, product_id, quantity_on_hand, updated_at
            "#,
        )
        .bind(scope.tenant_id())
        .bind(key.location_id)
        .bind(key.product_id)
        .bind(change)
        .fetch_one(&mut *conn)
        .await?
        .into();

        sqlx::query(
            r#"
            INSERT INTO stock_movements
                (id, tenant_id, location_id, product_id, delta, balance_after, reason, reference_id, actor_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(scope.tenant_id())
        .bind(key.location_id)
        .bind(key.product_id)
        .bind(change)
        .bind(entry.quantity_on_hand)
        .bind(reason.as_str())
        .bind(reference_id)
        .bind(scope.user_id())
        .execute(&mut *conn)
        .await?;

        touched.push(entry);
    }
    Ok(touched)
}

#[async_trait]
impl InventoryStore for PgInventoryStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    async fn create_location(&self, scope: &TenantScope, name: &str) -> AppResult<Location> {
        let result = sqlx::query_as::<_, LocationRow>(
            r#"
            INSERT INTO locations (id, tenant_id, name, is_active, created_at)
            VALUES ($1, $2, $3, TRUE, NOW())
            RETURNING id, tenant_id, name, is_active, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(scope.tenant_id())
        .bind(name)
        .fetch_one(&self.db)
        .await;

        match result {
            Ok(row) => Ok(row.into()),
            Err(e) if is_unique_violation(&e) => Err(AppError::DuplicateEntry("location name".to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_location(&self, scope: &TenantScope, location_id: Uuid) -> AppResult<Option<Location>> {
        let row = sqlx::query_as::<_, LocationRow>(
            r#"
            SELECT id, tenant_id, name, is_active, created_at
            FROM locations
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(location_id)
        .bind(scope.tenant_id())
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Location::from))
    }

    async fn list_locations(&self, scope: &TenantScope) -> AppResult<Vec<Location>> {
        let rows = sqlx::query_as::<_, LocationRow>(
            r#"
            SELECT id, tenant_id, name, is_active, created_at
            FROM locations
            WHERE tenant_id = $1
            ORDER BY name
            "#,
        )
        .bind(scope.tenant_id())
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Location::from).collect())
    }

    async fn next_transfer_sequence(&self, scope: &TenantScope, year: i32) -> AppResult<i64> {
        let seq = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO transfer_code_counters (tenant_id, year, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (tenant_id, year)
            DO UPDATE SET last_value = transfer_code_counters.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(scope.tenant_id())
        .bind(year)
        .fetch_one(&self.db)
        .await?;
        Ok(seq)
    }

    async fn insert_transfer(&self, scope: &TenantScope, transfer: &Transfer) -> AppResult<()> {
        let mut tx = self.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO transfers
                (id, tenant_id, code, origin_location_id, destination_location_id, state, notes,
                 created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            "#,
        )
        .bind(transfer.id)
        .bind(scope.tenant_id())
        .bind(&transfer.code)
        .bind(transfer.origin_location_id)
        .bind(transfer.destination_location_id)
        .bind(transfer.state.as_str())
        .bind(&transfer.notes)
        .bind(scope.user_id())
        .bind(transfer.created_at)
        .execute(&mut *tx)
        .await;
        if let Err(e) = inserted {
            return Err(if is_unique_violation(&e) {
                AppError::DuplicateEntry("transfer code".to_string())
            } else {
                e.into()
            });
        }

        insert_lines(&mut tx, scope.tenant_id(), transfer.id, &transfer.lines).await?;
        insert_event(
            &mut tx,
            scope.tenant_id(),
            &TransferEvent {
                id: Uuid::new_v4(),
                transfer_id: transfer.id,
                from_state: None,
                to_state: TransferState::Draft,
                actor_id: scope.user_id(),
                discrepancies: Vec::new(),
                notes: None,
                created_at: transfer.created_at,
            },
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_transfer(&self, scope: &TenantScope, transfer_id: Uuid) -> AppResult<Option<Transfer>> {
        self.load_transfer(scope, transfer_id).await
    }

    async fn get_transfer_by_code(&self, scope: &TenantScope, code: &str) -> AppResult<Option<Transfer>> {
        let mut conn = self.db.acquire().await?;
        let row = sqlx::query_as::<_, TransferRow>(&format!(
            "SELECT {} FROM transfers WHERE code = $1 AND tenant_id = $2",
            TRANSFER_COLUMNS
        ))
        .bind(code)
        .bind(scope.tenant_id())
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(Some(hydrate_one(&mut conn, row).await?)),
            None => Ok(None),
        }
    }

    async fn list_transfers(
        &self,
        scope: &TenantScope,
        filter: &TransferFilter,
        pagination: Pagination,
    ) -> AppResult<(Vec<Transfer>, u64)> {
        let mut conn = self.db.acquire().await?;
        let state = filter.state.map(|s| s.as_str());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM transfers
            WHERE tenant_id = $1
              AND ($2::text IS NULL OR state = $2)
              AND ($3::uuid IS NULL OR origin_location_id = $3 OR destination_location_id = $3)
            "#,
        )
        .bind(scope.tenant_id())
        .bind(state)
        .bind(filter.location_id)
        .fetch_one(&mut *conn)
        .await?;

        let rows = sqlx::query_as::<_, TransferRow>(&format!(
            r#"
            SELECT {} FROM transfers
            WHERE tenant_id = $1
              AND ($2::text IS NULL OR state = $2)
              AND ($3::uuid IS NULL OR origin_location_id = $3 OR destination_location_id = $3)
            ORDER BY created_at DESC, code DESC
            LIMIT $4 OFFSET $5
            "#,
            TRANSFER_COLUMNS
        ))
        .bind(scope.tenant_id())
        .bind(state)
        .bind(filter.location_id)
        .bind(pagination.limit() as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(&mut *conn)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut lines = fetch_lines(&mut conn, &ids).await?;
        let transfers = rows
            .into_iter()
            .map(|row| {
                let row_lines = lines.remove(&row.id).unwrap_or_default();
                into_transfer(row, row_lines)
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok((transfers, total.max(0) as u64))
    }

    async fn update_draft(
        &self,
        scope: &TenantScope,
        transfer_id: Uuid,
        lines: Option<Vec<TransferLineInput>>,
        notes: Option<String>,
    ) -> AppResult<Transfer> {
        let mut tx = self.begin().await?;

        let current = sqlx::query_as::<_, (String, String)>(
            "SELECT code, state FROM transfers WHERE id = $1 AND tenant_id = $2 FOR UPDATE",
        )
        .bind(transfer_id)
        .bind(scope.tenant_id())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Transfer".to_string()))?;

        let (code, state) = current;
        let state = parse_state(&state)?;
        if state.next(TransferAction::Edit).is_none() {
            return Err(AppError::InvalidState {
                code,
                current: state,
                attempted: TransferAction::Edit,
            });
        }

        if let Some(lines) = lines {
            sqlx::query("DELETE FROM transfer_lines WHERE transfer_id = $1")
                .bind(transfer_id)
                .execute(&mut *tx)
                .await?;
            let lines: Vec<TransferLine> = lines.iter().map(TransferLine::from_input).collect();
            insert_lines(&mut tx, scope.tenant_id(), transfer_id, &lines).await?;
        }

        sqlx::query(
            r#"
            UPDATE transfers SET notes = COALESCE($3, notes), updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(transfer_id)
        .bind(scope.tenant_id())
        .bind(notes)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.load_transfer(scope, transfer_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Transfer".to_string()))
    }

    async fn apply_transition(&self, scope: &TenantScope, transition: Transition) -> AppResult<Transfer> {
        let mut tx = self.begin().await?;

        let to = transition.to.as_str();
        let updated = sqlx::query(
            r#"
            UPDATE transfers SET
                state = $4::text,
                updated_at = NOW(),
                dispatched_by = CASE WHEN $4::text = 'dispatched' THEN $5 ELSE dispatched_by END,
                dispatched_at = CASE WHEN $4::text = 'dispatched' THEN NOW() ELSE dispatched_at END,
                received_by = CASE WHEN $4::text = 'received' THEN $5 ELSE received_by END,
                received_at = CASE WHEN $4::text = 'received' THEN NOW() ELSE received_at END,
                cancelled_by = CASE WHEN $4::text = 'cancelled' THEN $5 ELSE cancelled_by END,
                cancelled_at = CASE WHEN $4::text = 'cancelled' THEN NOW() ELSE cancelled_at END
            WHERE id = $1 AND tenant_id = $2 AND state = $3 AND updated_at = $6
            "#,
        )
        .bind(transition.transfer_id)
        .bind(scope.tenant_id())
        .bind(transition.from.as_str())
        .bind(to)
        .bind(scope.user_id())
        .bind(transition.observed_at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            // Someone else moved or edited the transfer first, or it is not ours
            drop(tx);
            let current = self
                .load_transfer(scope, transition.transfer_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Transfer".to_string()))?;
            if current.state != transition.from {
                return Err(super::invalid_state(&current, transition.action));
            }
            return Err(AppError::Conflict(current.code));
        }

        write_deltas(
            &mut tx,
            scope,
            &transition.deltas,
            transition.reason,
            transition.transfer_id,
        )
        .await?;

        for line in &transition.received_lines {
            sqlx::query(
                r#"
                UPDATE transfer_lines
                SET quantity_received = $3, discrepancy_kind = $4, discrepancy_quantity = $5
                WHERE id = $1 AND transfer_id = $2
                "#,
            )
            .bind(line.id)
            .bind(transition.transfer_id)
            .bind(line.quantity_received)
            .bind(line.discrepancy.map(|d| d.kind.as_str()))
            .bind(line.discrepancy.map(|d| d.quantity))
            .execute(&mut *tx)
            .await?;
        }

        let discrepancies = if transition.to == TransferState::Received {
            ReceiptSummary::from_lines(&transition.received_lines).discrepancies
        } else {
            Vec::new()
        };
        insert_event(
            &mut tx,
            scope.tenant_id(),
            &TransferEvent {
                id: Uuid::new_v4(),
                transfer_id: transition.transfer_id,
                from_state: Some(transition.from),
                to_state: transition.to,
                actor_id: scope.user_id(),
                discrepancies,
                notes: transition.notes,
                created_at: Utc::now(),
            },
        )
        .await?;

        tx.commit().await?;

        self.load_transfer(scope, transition.transfer_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Transfer".to_string()))
    }

    async fn transfer_events(&self, scope: &TenantScope, transfer_id: Uuid) -> AppResult<Vec<TransferEvent>> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM transfers WHERE id = $1 AND tenant_id = $2)",
        )
        .bind(transfer_id)
        .bind(scope.tenant_id())
        .fetch_one(&self.db)
        .await?;
        if !exists {
            return Err(AppError::NotFound("Transfer".to_string()));
        }

        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, transfer_id, from_state, to_state, actor_id, discrepancies, notes, created_at
            FROM transfer_events
            WHERE transfer_id = $1 AND tenant_id = $2
            ORDER BY created_at, id
            "#,
        )
        .bind(transfer_id)
        .bind(scope.tenant_id())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TransferEvent::try_from).collect()
    }

    async fn apply_deltas(
        &self,
        scope: &TenantScope,
        deltas: &[StockDelta],
        reason: MovementReason,
        reference_id: Uuid,
    ) -> AppResult<Vec<LedgerEntry>> {
        let mut tx = self.begin().await?;
        let entries = write_deltas(&mut tx, scope, deltas, reason, reference_id).await?;
        tx.commit().await?;
        Ok(entries)
    }

    async fn get_balance(
        &self,
        scope: &TenantScope,
        location_id: Uuid,
        product_id: Uuid,
    ) -> AppResult<Option<LedgerEntry>> {
        let row = sqlx::query_as::<_, StockLevelRow>(
            r#"
            SELECT tenant_id, location_id, product_id, quantity_on_hand, updated_at
            FROM stock_levels
            WHERE tenant_id = $1 AND location_id = $2 AND product_id = $3
            "#,
        )
        .bind(scope.tenant_id())
        .bind(location_id)
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(LedgerEntry::from))
    }

    async fn list_balances(&self, scope: &TenantScope, location_id: Uuid) -> AppResult<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, StockLevelRow>(
            r#"
            SELECT tenant_id, location_id, product_id, quantity_on_hand, updated_at
            FROM stock_levels
            WHERE tenant_id = $1 AND location_id = $2
            ORDER BY product_id
            "#,
        )
        .bind(scope.tenant_id())
        .bind(location_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(LedgerEntry::from).collect())
    }

    async fn list_movements(
        &self,
        scope: &TenantScope,
        location_id: Uuid,
        product_id: Option<Uuid>,
    ) -> AppResult<Vec<StockMovement>> {
        let rows = sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT id, tenant_id, location_id, product_id, delta, balance_after, reason,
                   reference_id, actor_id, created_at
            FROM stock_movements
            WHERE tenant_id = $1 AND location_id = $2
              AND ($3::uuid IS NULL OR product_id = $3)
            ORDER BY created_at DESC, id
            LIMIT 500
            "#,
        )
        .bind(scope.tenant_id())
        .bind(location_id)
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(StockMovement::try_from).collect()
    }
}
