//! SQLite persistence for asset types, cryptocurrencies and follows.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{
    AssetRef, AssetType, Cryptocurrency, CryptocurrencyUpsert, FollowedCryptocurrency,
    UpsertOutcome, UserId,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("row for external id {0} missing after upsert")]
    MissingAfterUpsert(String),
}

/// Storage operations the core needs from its persistence collaborator.
pub trait CryptoRepository: Send + Sync + 'static {
    fn get_or_create_asset_type(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<AssetType, StoreError>;

    fn upsert_cryptocurrency(&self, row: &CryptocurrencyUpsert)
        -> Result<UpsertOutcome, StoreError>;

    /// All rows, largest market cap first.
    fn list_by_market_cap(&self) -> Result<Vec<Cryptocurrency>, StoreError>;

    fn find_cryptocurrency(&self, asset: &AssetRef) -> Result<Option<Cryptocurrency>, StoreError>;

    fn count_cryptocurrencies(&self) -> Result<u64, StoreError>;

    /// Returns `true` when a new follow row was written.
    fn insert_follow(&self, user: UserId, cryptocurrency_id: i64) -> Result<bool, StoreError>;

    /// Returns `true` when a follow row was removed.
    fn delete_follow(&self, user: UserId, cryptocurrency_id: i64) -> Result<bool, StoreError>;

    fn list_followed(&self, user: UserId) -> Result<Vec<FollowedCryptocurrency>, StoreError>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

const CRYPTO_COLUMNS: &str = "c.id, c.asset_type_id, c.symbol, c.name, c.slug, c.external_id, \
     c.current_price, c.market_cap, c.volume_24h, c.price_change_24h, c.image_url, \
     c.created_at, c.updated_at";

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            ",
        )?;
        info!(
            component = "store",
            event = "store.open",
            path = %path.display()
        );
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CryptoRepository for SqliteStore {
    fn get_or_create_asset_type(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<AssetType, StoreError> {
        let conn = self.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO asset_types (name, description, created_at) VALUES (?1, ?2, ?3)",
            params![name, description, timestamp_now()],
        )?;
        if inserted > 0 {
            info!(
                component = "store",
                event = "store.asset_type.created",
                name
            );
        }

        let asset_type = conn.query_row(
            "SELECT id, name, description FROM asset_types WHERE name = ?1",
            params![name],
            |row| {
                Ok(AssetType {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            },
        )?;
        Ok(asset_type)
    }

    fn upsert_cryptocurrency(
        &self,
        row: &CryptocurrencyUpsert,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM cryptocurrencies WHERE external_id = ?1",
                params![row.external_id],
                |r| r.get(0),
            )
            .optional()?;

        tx.execute(
            "
            INSERT INTO cryptocurrencies (
                asset_type_id,
                symbol,
                name,
                slug,
                external_id,
                current_price,
                market_cap,
                volume_24h,
                price_change_24h,
                image_url,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
            ON CONFLICT(external_id) DO UPDATE SET
                asset_type_id = excluded.asset_type_id,
                symbol = excluded.symbol,
                name = excluded.name,
                slug = excluded.slug,
                current_price = excluded.current_price,
                market_cap = excluded.market_cap,
                volume_24h = excluded.volume_24h,
                price_change_24h = excluded.price_change_24h,
                image_url = COALESCE(excluded.image_url, cryptocurrencies.image_url),
                updated_at = excluded.updated_at
            ",
            params![
                row.asset_type_id,
                row.symbol,
                row.name,
                row.slug,
                row.external_id,
                row.current_price.to_string(),
                row.market_cap.to_string(),
                row.volume_24h.to_string(),
                row.price_change_24h.to_string(),
                row.image_url,
                timestamp_now(),
            ],
        )?;

        let id: i64 = tx
            .query_row(
                "SELECT id FROM cryptocurrencies WHERE external_id = ?1",
                params![row.external_id],
                |r| r.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::MissingAfterUpsert(row.external_id.clone()))?;
        tx.commit()?;

        debug!(
            component = "store",
            event = "store.cryptocurrency.upsert",
            external_id = %row.external_id,
            created = existing.is_none()
        );

        Ok(match existing {
            Some(_) => UpsertOutcome::Updated(id),
            None => UpsertOutcome::Created(id),
        })
    }

    fn list_by_market_cap(&self) -> Result<Vec<Cryptocurrency>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CRYPTO_COLUMNS} FROM cryptocurrencies c \
             ORDER BY CAST(c.market_cap AS REAL) DESC, c.id ASC"
        ))?;
        let rows = stmt
            .query_map([], cryptocurrency_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn find_cryptocurrency(&self, asset: &AssetRef) -> Result<Option<Cryptocurrency>, StoreError> {
        let conn = self.lock();
        // A numeric reference prefers the id match over a slug that happens to be numeric.
        let found = conn
            .query_row(
                &format!(
                    "SELECT {CRYPTO_COLUMNS} FROM cryptocurrencies c \
                     WHERE c.id = ?1 OR c.slug = ?2 \
                     ORDER BY (c.id = ?1) DESC LIMIT 1"
                ),
                params![asset.as_id(), asset.as_str()],
                cryptocurrency_from_row,
            )
            .optional()?;
        Ok(found)
    }

    fn count_cryptocurrencies(&self) -> Result<u64, StoreError> {
        let conn = self.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM cryptocurrencies", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn insert_follow(&self, user: UserId, cryptocurrency_id: i64) -> Result<bool, StoreError> {
        let conn = self.lock();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO follows (user_id, cryptocurrency_id, created_at) \
             VALUES (?1, ?2, ?3)",
            params![user.0, cryptocurrency_id, timestamp_now()],
        )?;
        Ok(changed > 0)
    }

    fn delete_follow(&self, user: UserId, cryptocurrency_id: i64) -> Result<bool, StoreError> {
        let conn = self.lock();
        let changed = conn.execute(
            "DELETE FROM follows WHERE user_id = ?1 AND cryptocurrency_id = ?2",
            params![user.0, cryptocurrency_id],
        )?;
        Ok(changed > 0)
    }

    fn list_followed(&self, user: UserId) -> Result<Vec<FollowedCryptocurrency>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CRYPTO_COLUMNS}, a.id, a.name, a.description \
             FROM follows f \
             JOIN cryptocurrencies c ON c.id = f.cryptocurrency_id \
             JOIN asset_types a ON a.id = c.asset_type_id \
             WHERE f.user_id = ?1 \
             ORDER BY f.created_at ASC, c.id ASC"
        ))?;
        let rows = stmt
            .query_map(params![user.0], |row| {
                Ok(FollowedCryptocurrency {
                    cryptocurrency: cryptocurrency_from_row(row)?,
                    asset_type: AssetType {
                        id: row.get(13)?,
                        name: row.get(14)?,
                        description: row.get(15)?,
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn ensure_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS asset_types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cryptocurrencies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            asset_type_id INTEGER NOT NULL REFERENCES asset_types(id),
            symbol TEXT NOT NULL,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            external_id TEXT NOT NULL UNIQUE,
            current_price TEXT NOT NULL,
            market_cap TEXT NOT NULL,
            volume_24h TEXT NOT NULL,
            price_change_24h TEXT NOT NULL,
            image_url TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS follows (
            user_id INTEGER NOT NULL,
            cryptocurrency_id INTEGER NOT NULL
                REFERENCES cryptocurrencies(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            PRIMARY KEY (user_id, cryptocurrency_id)
        );
        ",
    )?;
    Ok(())
}

fn cryptocurrency_from_row(row: &Row<'_>) -> rusqlite::Result<Cryptocurrency> {
    Ok(Cryptocurrency {
        id: row.get(0)?,
        asset_type_id: row.get(1)?,
        symbol: row.get(2)?,
        name: row.get(3)?,
        slug: row.get(4)?,
        external_id: row.get(5)?,
        current_price: decimal_column(row, 6)?,
        market_cap: decimal_column(row, 7)?,
        volume_24h: decimal_column(row, 8)?,
        price_change_24h: decimal_column(row, 9)?,
        image_url: row.get(10)?,
        created_at: timestamp_column(row, 11)?,
        updated_at: timestamp_column(row, 12)?,
    })
}

fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

/// RFC 3339 in UTC with a fixed microsecond width, so text order is time order.
fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}
