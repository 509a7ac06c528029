use rusqlite::Transaction;

/// A forward-only schema change, applied once inside the migration transaction.
pub trait Migration: Send + Sync {
    /// Recorded next to the version once applied.
    fn name(&self) -> &'static str;

    fn forward(&self, conn: &Transaction) -> anyhow::Result<()>;
}

/// Initial schema: models and their instances.
pub struct V0;

impl Migration for V0 {
    fn name(&self) -> &'static str {
        "models and instances"
    }

    fn forward(&self, conn: &Transaction) -> anyhow::Result<()> {
        conn.execute_batch(
            r"
            create table if not exists model (
                seq                 integer primary key autoincrement,
                uid                 text not null unique,
                id                  text not null unique,
                description         text not null,
                model_definition    text not null,
                configuration       text,
                visibility          text not null,
                owner               text not null,
                create_time         text not null,
                update_time         text not null
            );

            create table if not exists model_instance (
                seq                 integer primary key autoincrement,
                uid                 text not null unique,
                model_uid           text not null,
                id                  text not null,
                state               text not null,
                task                text not null,
                model_definition    text not null,
                configuration       text,
                readme              text,
                create_time         text not null,
                update_time         text not null,

                unique (model_uid, id),
                foreign key (model_uid) references model(uid) on delete cascade
            );
        ",
        )?;

        Ok(())
    }
}
