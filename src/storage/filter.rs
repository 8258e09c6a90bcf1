//! Translation of list requests into a single SQL statement.
//!
//! Predefined columns compare directly against `metadata`; free-form keys are
//! matched through a semi-join on `metadata_entry`. Entries are left-joined so
//! one record spans consecutive rows, which are folded back together while
//! streaming.

use futures_util::{Stream, TryStreamExt};
use sqlx::{Encode, QueryBuilder, Sqlite, SqlitePool, Type};
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::models::file::{FileId, FileInfo};
use crate::models::query::{Column, FilterOperator, FilterPredicate, ListFileMetadataRequest};

const SELECT_RECORDS: &str = "SELECT m.id AS record_id, m.provided_id, m.provided_name, m.size, \
     m.compression, m.compression_type, m.created_at, m.deleted_at, \
     e.key AS entry_key, e.value AS entry_value \
     FROM metadata m LEFT JOIN metadata_entry e ON e.metadata_id = m.id";

#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    record_id: String,
    provided_id: String,
    provided_name: String,
    size: i64,
    compression: bool,
    compression_type: String,
    created_at: i64,
    deleted_at: Option<i64>,
    entry_key: Option<String>,
    entry_value: Option<String>,
}

impl RecordRow {
    fn to_file_info(&self) -> FileInfo {
        FileInfo {
            file_id: FileId {
                id: self.provided_id.clone(),
                name: self.provided_name.clone(),
            },
            size: self.size.max(0) as u64,
            compression: self.compression,
            compression_type: self.compression_type.clone(),
            created_at: self.created_at,
            deleted_at: self.deleted_at,
            metadata: Default::default(),
        }
    }
}

/// Pull side of a running list query.
pub struct RecordStream {
    rx: mpsc::Receiver<Result<FileInfo, StoreError>>,
}

impl RecordStream {
    pub(crate) fn new(rx: mpsc::Receiver<Result<FileInfo, StoreError>>) -> Self {
        Self { rx }
    }

    pub async fn next(&mut self) -> Option<Result<FileInfo, StoreError>> {
        self.rx.recv().await
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<FileInfo, StoreError>> + Send {
        futures_util::stream::unfold(self.rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
    }
}

pub fn build_list_query(
    request: &ListFileMetadataRequest,
) -> Result<QueryBuilder<'static, Sqlite>, StoreError> {
    let mut qb = QueryBuilder::new(SELECT_RECORDS);

    // Tombstoned records stay hidden unless the caller asks about deletion.
    let targets_deleted = request
        .filter_by
        .iter()
        .any(|p| p.key == Column::DeletedAt.key());
    let mut joiner = " WHERE ";
    if !targets_deleted {
        qb.push(joiner);
        qb.push("m.deleted_at IS NULL");
        joiner = " AND ";
    }

    for predicate in &request.filter_by {
        qb.push(joiner);
        push_predicate(&mut qb, predicate)?;
        joiner = " AND ";
    }

    qb.push(" ORDER BY ");
    for sort in &request.sort_by {
        let column = Column::from_key(&sort.key).ok_or_else(|| {
            StoreError::InvalidQuery(format!(
                "invalid operand passed for sort operation: {}",
                sort.key
            ))
        })?;
        qb.push(format_args!("m.{} {}, ", column.key(), sort.order.as_str()));
    }
    qb.push("m.rowid, e.key");

    Ok(qb)
}

fn push_predicate(
    qb: &mut QueryBuilder<'static, Sqlite>,
    predicate: &FilterPredicate,
) -> Result<(), StoreError> {
    let operator = predicate.operator;
    if !operator.allowed_for(&predicate.key) {
        return Err(StoreError::InvalidQuery(format!(
            "invalid filter operation used: {}",
            operator.as_str()
        )));
    }

    let Some(column) = Column::from_key(&predicate.key) else {
        qb.push("EXISTS (SELECT 1 FROM metadata_entry f WHERE f.metadata_id = m.id AND f.key = ");
        qb.push_bind(predicate.key.clone());
        qb.push(" AND ");
        push_comparison(qb, "f.value", operator, predicate.value.clone());
        qb.push(")");
        return Ok(());
    };

    let target = format!("m.{}", column.key());
    if column.is_numeric() && operator != FilterOperator::Contains {
        let value: i64 = predicate.value.parse().map_err(|_| {
            StoreError::InvalidQuery(format!(
                "{} expects an integer value, got '{}'",
                column.key(),
                predicate.value
            ))
        })?;
        push_comparison(qb, &target, operator, value);
    } else {
        push_comparison(qb, &target, operator, predicate.value.clone());
    }
    Ok(())
}

/// Appends `<target> <op> ?`, or an `instr` test for substring matches.
fn push_comparison<T>(
    qb: &mut QueryBuilder<'static, Sqlite>,
    target: &str,
    operator: FilterOperator,
    value: T,
) where
    T: Encode<'static, Sqlite> + Type<Sqlite> + Send + 'static,
{
    let op = match operator {
        FilterOperator::Contains => {
            qb.push(format_args!("instr(CAST({} AS TEXT), ", target));
            qb.push_bind(value);
            qb.push(") > 0");
            return;
        }
        FilterOperator::Equal => "=",
        FilterOperator::LessThan => "<",
        FilterOperator::GreaterThan => ">",
    };
    qb.push(format_args!("{} {} ", target, op));
    qb.push_bind(value);
}

/// Runs the query and forwards one `FileInfo` per record, stopping early if
/// the receiver goes away.
pub(crate) async fn stream_records(
    pool: SqlitePool,
    mut builder: QueryBuilder<'static, Sqlite>,
    tx: mpsc::Sender<Result<FileInfo, StoreError>>,
) {
    let mut rows = builder.build_query_as::<RecordRow>().fetch(&pool);
    let mut current: Option<(String, FileInfo)> = None;
    let mut sent = 0u64;

    loop {
        match rows.try_next().await {
            Ok(Some(row)) => {
                let same_record = current
                    .as_ref()
                    .is_some_and(|(id, _)| *id == row.record_id);
                if !same_record {
                    if let Some((_, info)) = current.take() {
                        if tx.send(Ok(info)).await.is_err() {
                            tracing::debug!("List receiver dropped, stopping query");
                            return;
                        }
                        sent += 1;
                    }
                    current = Some((row.record_id.clone(), row.to_file_info()));
                }
                if let (Some((_, info)), Some(key), Some(value)) =
                    (current.as_mut(), row.entry_key, row.entry_value)
                {
                    info.metadata.insert(key, value);
                }
            }
            Ok(None) => {
                if let Some((_, info)) = current.take() {
                    if tx.send(Ok(info)).await.is_ok() {
                        sent += 1;
                    }
                }
                tracing::debug!(records = sent, "List query complete");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "List query failed");
                let _ = tx.send(Err(StoreError::Database(e))).await;
                return;
            }
        }
    }
}
