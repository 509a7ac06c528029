use std::{path::Path, sync::Arc};

use anyhow::Context;
use log::debug;
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row, Transaction};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    manager::{LinearMigrationManager, MigrationManager},
    migration::V0,
};
use crate::{
    api_types::{State, Task, Visibility},
    db_types::{Model, ModelInstance, Page},
    error::{Result, ServiceError},
};

const MODEL_COLUMNS: &str = "seq, uid, id, description, model_definition, configuration, \
     visibility, owner, create_time, update_time";

const INSTANCE_COLUMNS: &str = "seq, uid, model_uid, id, state, task, model_definition, \
     configuration, readme, create_time, update_time";

/// Handle to the [database connection](rusqlite::Connection)
pub struct DB {
    conn: Mutex<Connection>,
}

impl DB {
    pub fn open<T: AsRef<Path>>(db_path: T) -> anyhow::Result<Self> {
        let conn = Connection::open(db_path).context("failed to open connection")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open connection")?;
        Self::with_connection(conn)
    }

    fn with_connection(mut conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch("pragma foreign_keys = on;")?;

        let mut migration_manager = LinearMigrationManager::new();
        migration_manager.register_migration(Arc::new(V0));

        let txn = conn.transaction()?;
        let version = migration_manager.migrate(&txn)?;
        txn.commit()?;
        debug!("database schema at version {}", version);

        Ok(DB {
            conn: Mutex::new(conn),
        })
    }

    /// Whether the database still answers queries.
    pub async fn ping(&self) -> bool {
        let conn = self.conn.lock().await;
        conn.query_row("select 1", [], |row| row.get::<usize, i64>(0))
            .is_ok()
    }

    /// Insert a model together with its initial instances, atomically.
    pub async fn insert_model(&self, model: &Model, instances: &[ModelInstance]) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let txn = conn.transaction()?;

        let exists = txn
            .query_row("select 1 from model where id = ?1", [&model.id], |_| Ok(()))
            .optional()?
            .is_some();
        if exists {
            return Err(ServiceError::AlreadyExists(format!(
                "model {:?} already exists",
                model.id
            )));
        }

        txn.execute(
            "insert into model (uid, id, description, model_definition, configuration, \
             visibility, owner, create_time, update_time) \
             values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                model.uid.to_string(),
                model.id,
                model.description,
                model.model_definition,
                encode_json(&model.configuration)?,
                visibility_str(model.visibility),
                model.owner,
                encode_time(&model.create_time)?,
                encode_time(&model.update_time)?,
            ],
        )?;

        for instance in instances {
            insert_instance(&txn, instance)?;
        }

        txn.commit()?;
        debug!(
            "inserted model uid={} with {} instance(s)",
            model.uid,
            instances.len()
        );

        Ok(())
    }

    pub async fn get_model_by_id(&self, id: &str) -> Result<Option<Model>> {
        let conn = self.conn.lock().await;
        let model = conn
            .query_row(
                &format!("select {} from model where id = ?1", MODEL_COLUMNS),
                [id],
                model_from_row,
            )
            .optional()?;

        Ok(model)
    }

    pub async fn get_model_by_uid(&self, uid: &Uuid) -> Result<Option<Model>> {
        let conn = self.conn.lock().await;
        let model = conn
            .query_row(
                &format!("select {} from model where uid = ?1", MODEL_COLUMNS),
                [uid.to_string()],
                model_from_row,
            )
            .optional()?;

        Ok(model)
    }

    /// Models in insertion order, starting after `after_seq`.
    pub async fn list_models(&self, after_seq: Option<i64>, limit: usize) -> Result<Page<Model>> {
        let conn = self.conn.lock().await;
        let total_size: i64 = conn.query_row("select count(*) from model", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(&format!(
            "select {} from model where seq > ?1 order by seq limit ?2",
            MODEL_COLUMNS
        ))?;
        let items = stmt
            .query_map(
                params![after_seq.unwrap_or(0), (limit + 1) as i64],
                model_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(paginate(items, total_size, limit, |m| m.seq))
    }

    pub async fn update_model_description(
        &self,
        uid: &Uuid,
        description: &str,
        now: &OffsetDateTime,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "update model set description = ?1, update_time = ?2 where uid = ?3",
            params![description, encode_time(now)?, uid.to_string()],
        )?;

        Ok(changed > 0)
    }

    pub async fn set_model_visibility(
        &self,
        uid: &Uuid,
        visibility: Visibility,
        now: &OffsetDateTime,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "update model set visibility = ?1, update_time = ?2 where uid = ?3",
            params![visibility_str(visibility), encode_time(now)?, uid.to_string()],
        )?;

        Ok(changed > 0)
    }

    /// Delete a model; its instances go with it.
    pub async fn delete_model(&self, uid: &Uuid) -> Result<bool> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute("delete from model where uid = ?1", [uid.to_string()])?;

        Ok(deleted > 0)
    }

    pub async fn get_instance(&self, model_uid: &Uuid, id: &str) -> Result<Option<ModelInstance>> {
        let conn = self.conn.lock().await;
        let instance = conn
            .query_row(
                &format!(
                    "select {} from model_instance where model_uid = ?1 and id = ?2",
                    INSTANCE_COLUMNS
                ),
                params![model_uid.to_string(), id],
                instance_from_row,
            )
            .optional()?;

        Ok(instance)
    }

    pub async fn get_instance_by_uid(
        &self,
        model_uid: &Uuid,
        uid: &Uuid,
    ) -> Result<Option<ModelInstance>> {
        let conn = self.conn.lock().await;
        let instance = conn
            .query_row(
                &format!(
                    "select {} from model_instance where model_uid = ?1 and uid = ?2",
                    INSTANCE_COLUMNS
                ),
                params![model_uid.to_string(), uid.to_string()],
                instance_from_row,
            )
            .optional()?;

        Ok(instance)
    }

    pub async fn list_instances(
        &self,
        model_uid: &Uuid,
        after_seq: Option<i64>,
        limit: usize,
    ) -> Result<Page<ModelInstance>> {
        let conn = self.conn.lock().await;
        let total_size: i64 = conn.query_row(
            "select count(*) from model_instance where model_uid = ?1",
            [model_uid.to_string()],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "select {} from model_instance where model_uid = ?1 and seq > ?2 order by seq limit ?3",
            INSTANCE_COLUMNS
        ))?;
        let items = stmt
            .query_map(
                params![
                    model_uid.to_string(),
                    after_seq.unwrap_or(0),
                    (limit + 1) as i64
                ],
                instance_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(paginate(items, total_size, limit, |i| i.seq))
    }

    /// Every instance in `state`, across models, oldest first.
    pub async fn instances_in_state(&self, state: State) -> Result<Vec<ModelInstance>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "select {} from model_instance where state = ?1 order by seq",
            INSTANCE_COLUMNS
        ))?;
        let instances = stmt
            .query_map([state_str(state)], instance_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(instances)
    }

    pub async fn set_instance_state(
        &self,
        uid: &Uuid,
        state: State,
        now: &OffsetDateTime,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "update model_instance set state = ?1, update_time = ?2 where uid = ?3",
            params![state_str(state), encode_time(now)?, uid.to_string()],
        )?;

        Ok(changed > 0)
    }
}

fn insert_instance(txn: &Transaction, instance: &ModelInstance) -> Result<()> {
    txn.execute(
        "insert into model_instance (uid, model_uid, id, state, task, model_definition, \
         configuration, readme, create_time, update_time) \
         values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            instance.uid.to_string(),
            instance.model_uid.to_string(),
            instance.id,
            state_str(instance.state),
            instance.task.as_str(),
            instance.model_definition,
            encode_json(&instance.configuration)?,
            instance.readme,
            encode_time(&instance.create_time)?,
            encode_time(&instance.update_time)?,
        ],
    )?;

    Ok(())
}

/// Trim the one-row lookahead off `items` and record where the next page starts.
fn paginate<T>(
    mut items: Vec<T>,
    total_size: i64,
    limit: usize,
    seq: impl Fn(&T) -> i64,
) -> Page<T> {
    let has_more = items.len() > limit;
    items.truncate(limit);
    let next_seq = if has_more { items.last().map(seq) } else { None };

    Page {
        items,
        total_size: total_size as u64,
        next_seq,
    }
}

fn visibility_str(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Private => "VISIBILITY_PRIVATE",
        Visibility::Public => "VISIBILITY_PUBLIC",
    }
}

fn state_str(state: State) -> &'static str {
    match state {
        State::Offline => "STATE_OFFLINE",
        State::Online => "STATE_ONLINE",
    }
}

fn encode_time(time: &OffsetDateTime) -> Result<String> {
    time.format(&Rfc3339)
        .context("failed to format timestamp")
        .map_err(ServiceError::from)
}

fn encode_json(value: &Option<serde_json::Value>) -> Result<Option<String>> {
    match value {
        Some(v) => Ok(Some(serde_json::to_string(v)?)),
        None => Ok(None),
    }
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn invalid_value(idx: usize, value: &str) -> rusqlite::Error {
    conversion_error(
        idx,
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unexpected value {:?}", value),
        ),
    )
}

fn uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let value: String = row.get(idx)?;
    Uuid::parse_str(&value).map_err(|e| conversion_error(idx, e))
}

fn time_at(row: &Row, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let value: String = row.get(idx)?;
    OffsetDateTime::parse(&value, &Rfc3339).map_err(|e| conversion_error(idx, e))
}

fn json_at(row: &Row, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    let value: Option<String> = row.get(idx)?;
    value
        .map(|v| serde_json::from_str(&v).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn model_from_row(row: &Row) -> rusqlite::Result<Model> {
    let visibility: String = row.get(6)?;
    Ok(Model {
        seq: row.get(0)?,
        uid: uuid_at(row, 1)?,
        id: row.get(2)?,
        description: row.get(3)?,
        model_definition: row.get(4)?,
        configuration: json_at(row, 5)?,
        visibility: match visibility.as_str() {
            "VISIBILITY_PRIVATE" => Visibility::Private,
            "VISIBILITY_PUBLIC" => Visibility::Public,
            other => return Err(invalid_value(6, other)),
        },
        owner: row.get(7)?,
        create_time: time_at(row, 8)?,
        update_time: time_at(row, 9)?,
    })
}

fn instance_from_row(row: &Row) -> rusqlite::Result<ModelInstance> {
    let state: String = row.get(4)?;
    let task: String = row.get(5)?;
    Ok(ModelInstance {
        seq: row.get(0)?,
        uid: uuid_at(row, 1)?,
        model_uid: uuid_at(row, 2)?,
        id: row.get(3)?,
        state: match state.as_str() {
            "STATE_OFFLINE" => State::Offline,
            "STATE_ONLINE" => State::Online,
            other => return Err(invalid_value(4, other)),
        },
        task: Task::parse(&task).ok_or_else(|| invalid_value(5, &task))?,
        model_definition: row.get(6)?,
        configuration: json_at(row, 7)?,
        readme: row.get(8)?,
        create_time: time_at(row, 9)?,
        update_time: time_at(row, 10)?,
    })
}
