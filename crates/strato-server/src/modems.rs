//! Modem allow-list loaded from a CSV file at startup.
//!
//! The CSV is the source of truth and is mirrored into the database on every
//! successful load, so the list survives a missing or broken file on the next
//! boot. Full IMEIs never leave the server; clients only see the trailing
//! digits.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use strato_core::ModemRegistry;

/// Trailing IMEI digits exposed to clients.
pub const EXPOSED_IMEI_DIGITS: usize = 5;

#[derive(Debug, Error)]
pub enum ModemLoadError {
    #[error("failed to read modem CSV: {0}")]
    Io(#[from] std::io::Error),
    #[error("modem CSV invalid: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct Modem {
    pub imei: u64,
    pub org: String,
    pub name: String,
}

/// Client-facing view of a modem with the IMEI truncated.
#[derive(Debug, Clone, Serialize)]
pub struct RedactedModem {
    pub partial_imei: String,
    pub org: String,
    pub name: String,
}

impl Modem {
    pub fn redacted(&self) -> RedactedModem {
        let digits = self.imei.to_string();
        let start = digits.len().saturating_sub(EXPOSED_IMEI_DIGITS);
        RedactedModem {
            partial_imei: digits[start..].to_string(),
            org: self.org.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ModemList {
    modems: HashMap<u64, Modem>,
}

impl ModemList {
    pub fn from_modems(modems: Vec<Modem>) -> Self {
        Self {
            modems: modems.into_iter().map(|m| (m.imei, m)).collect(),
        }
    }

    /// Parse and validate the allow-list CSV: a `[IMEI, Organization,
    /// Modem Name]` header followed by one modem per row. Organization spaces
    /// become dashes and name spaces underscores, matching how the values are
    /// used in URLs. Names must be unique and non-blank.
    pub fn parse_csv(path: impl AsRef<Path>) -> Result<Vec<Modem>, ModemLoadError> {
        let content = std::fs::read_to_string(path)?;
        let mut rows = content.lines().filter(|line| !line.trim().is_empty());

        let header: Vec<String> = rows
            .next()
            .ok_or_else(|| ModemLoadError::Validation("no records in CSV".into()))?
            .split(',')
            .map(|field| field.trim().to_lowercase())
            .collect();
        if header.len() < 3
            || header[0] != "imei"
            || header[1] != "organization"
            || header[2] != "modem name"
        {
            return Err(ModemLoadError::Validation(
                "first row must match [IMEI, Organization, Modem Name]".into(),
            ));
        }

        let mut modems = Vec::new();
        let mut seen_names = HashSet::new();
        for (index, row) in rows.enumerate() {
            let fields: Vec<&str> = row.split(',').collect();
            if fields.len() < 3 {
                return Err(ModemLoadError::Validation(format!(
                    "row index {index} must have 3 columns"
                )));
            }
            let imei: u64 = fields[0].trim().parse().map_err(|_| {
                ModemLoadError::Validation(format!(
                    "IMEI incorrect for row index {index}, must be a number"
                ))
            })?;
            let org = fields[1].trim().replace(' ', "-");
            let name = fields[2].trim().replace(' ', "_");
            if name.is_empty() {
                return Err(ModemLoadError::Validation(format!(
                    "modem name cannot be blank for row index {index}"
                )));
            }
            if !seen_names.insert(name.clone()) {
                return Err(ModemLoadError::Validation(format!(
                    "duplicate modem name '{name}'"
                )));
            }
            modems.push(Modem { imei, org, name });
        }

        if modems.is_empty() {
            return Err(ModemLoadError::Validation("no records in CSV".into()));
        }
        Ok(modems)
    }

    pub fn len(&self) -> usize {
        self.modems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modems.is_empty()
    }

    pub fn get(&self, imei: u64) -> Option<&Modem> {
        self.modems.get(&imei)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Modem> {
        self.modems.values().find(|m| m.name == name)
    }

    pub fn get_by_org(&self, org: &str) -> Vec<&Modem> {
        self.modems.values().filter(|m| m.org == org).collect()
    }

    pub fn redacted(&self, imei: u64) -> Option<RedactedModem> {
        self.get(imei).map(Modem::redacted)
    }

    /// All modems, redacted, sorted by name for stable listings.
    pub fn redacted_set(&self) -> Vec<RedactedModem> {
        let mut set: Vec<RedactedModem> = self.modems.values().map(Modem::redacted).collect();
        set.sort_by(|a, b| a.name.cmp(&b.name));
        set
    }
}

impl ModemRegistry for ModemList {
    fn contains(&self, imei: u64) -> bool {
        self.modems.contains_key(&imei)
    }
}

/// Load the allow-list from CSV and mirror it into the database; when the
/// CSV is unreadable, fall back to the mirror from the previous boot.
pub async fn load_allow_list(
    path: &str,
    db: &crate::persistence::Database,
) -> anyhow::Result<ModemList> {
    match ModemList::parse_csv(path) {
        Ok(modems) => {
            crate::persistence::modems::replace_all(db.pool(), &modems).await?;
            tracing::info!("Loaded {} modems from {}", modems.len(), path);
            Ok(ModemList::from_modems(modems))
        }
        Err(err) => {
            tracing::warn!("Modem CSV load failed ({err}), falling back to database");
            let modems = crate::persistence::modems::load_all(db.pool()).await?;
            if modems.is_empty() {
                anyhow::bail!("no modems available from CSV or database");
            }
            tracing::info!("Loaded {} modems from database mirror", modems.len());
            Ok(ModemList::from_modems(modems))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_csv(content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("modems-{}.csv", uuid::Uuid::new_v4()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn parses_and_normalizes_records() {
        let path = write_csv(
            "IMEI, Organization, Modem Name\n\
             300234060252680, State Uni, MDM 001\n\
             300234060252681, State Uni, MDM 002\n",
        );
        let modems = ModemList::parse_csv(&path).unwrap();
        assert_eq!(modems.len(), 2);
        assert_eq!(modems[0].org, "State-Uni");
        assert_eq!(modems[0].name, "MDM_001");

        let list = ModemList::from_modems(modems);
        assert!(list.contains(300234060252680));
        assert!(!list.contains(1));
        assert_eq!(list.get_by_name("MDM_002").unwrap().imei, 300234060252681);
        assert_eq!(list.get_by_org("State-Uni").len(), 2);
    }

    #[test]
    fn rejects_bad_header_blank_name_and_duplicates() {
        let bad_header = write_csv("serial,org,label\n1,a,b\n");
        assert!(matches!(
            ModemList::parse_csv(&bad_header),
            Err(ModemLoadError::Validation(_))
        ));

        let blank_name = write_csv("IMEI,Organization,Modem Name\n123,Org,   \n");
        assert!(ModemList::parse_csv(&blank_name).is_err());

        let duplicate = write_csv(
            "IMEI,Organization,Modem Name\n1,Org,SAME\n2,Org,SAME\n",
        );
        assert!(ModemList::parse_csv(&duplicate).is_err());

        let bad_imei = write_csv("IMEI,Organization,Modem Name\nnotanumber,Org,NAME\n");
        assert!(ModemList::parse_csv(&bad_imei).is_err());
    }

    #[test]
    fn redaction_exposes_only_trailing_digits() {
        let modem = Modem {
            imei: 300234060252680,
            org: "Org".into(),
            name: "MDM_001".into(),
        };
        assert_eq!(modem.redacted().partial_imei, "52680");

        let short = Modem {
            imei: 42,
            org: "Org".into(),
            name: "SHORT".into(),
        };
        assert_eq!(short.redacted().partial_imei, "42");
    }
}
