//! Modem allow-list mirror.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::modems::Modem;

/// Replace the mirrored allow-list with the freshly loaded CSV contents.
pub async fn replace_all(pool: &SqlitePool, modems: &[Modem]) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM modems").execute(&mut *tx).await?;
    for modem in modems {
        sqlx::query("INSERT INTO modems (imei, organization, name) VALUES (?1, ?2, ?3)")
            .bind(modem.imei as i64)
            .bind(&modem.org)
            .bind(&modem.name)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Fallback source when the CSV is unreadable.
pub async fn load_all(pool: &SqlitePool) -> Result<Vec<Modem>> {
    let rows = sqlx::query_as::<_, ModemRow>("SELECT imei, organization, name FROM modems")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(ModemRow::into_modem).collect())
}

#[derive(sqlx::FromRow)]
struct ModemRow {
    imei: i64,
    organization: String,
    name: String,
}

impl ModemRow {
    fn into_modem(self) -> Modem {
        Modem {
            imei: self.imei as u64,
            org: self.organization,
            name: self.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_database;

    #[tokio::test]
    async fn mirrors_and_reloads_the_allow_list() {
        let db = init_database(":memory:", 1).await.unwrap();
        let modems = vec![
            Modem {
                imei: 300234060252680,
                org: "State-Uni".into(),
                name: "MDM_001".into(),
            },
            Modem {
                imei: 300234060252681,
                org: "State-Uni".into(),
                name: "MDM_002".into(),
            },
        ];

        replace_all(db.pool(), &modems).await.unwrap();
        // A second replace is not additive.
        replace_all(db.pool(), &modems).await.unwrap();

        let mut loaded = load_all(db.pool()).await.unwrap();
        loaded.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].imei, 300234060252680);
        assert_eq!(loaded[1].name, "MDM_002");
    }
}
