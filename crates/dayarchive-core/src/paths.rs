//! Artifact Naming
//!
//! Every archive job produces three artifacts in sequence. Their keys are
//! derived only from the day, the slug and the variant, so any stage can
//! recompute them without reading the others' state.
//!
//! ```text
//! sor-<slug>-<YYYY-MM-DD>-<variant>.csv          raw delimited file
//! sor-<slug>-<YYYY-MM-DD>-<variant>.csv.zip      compressed archive
//! sor-<slug>-<YYYY-MM-DD>-<variant>.csv.zip.sha1 checksum
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::scope::Variant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivePaths {
    pub raw: String,
    pub archive: String,
    pub checksum: String,
}

impl ArchivePaths {
    pub fn new(date: NaiveDate, slug: &str, variant: Variant) -> Self {
        let raw = format!("sor-{}-{}-{}.csv", slug, date.format("%Y-%m-%d"), variant);
        let archive = format!("{}.zip", raw);
        let checksum = format!("{}.sha1", archive);
        Self {
            raw,
            archive,
            checksum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_deterministic() {
        let date = NaiveDate::from_ymd_opt(2023, 8, 8).unwrap();
        let paths = ArchivePaths::new(date, "global", Variant::Light);
        assert_eq!(paths.raw, "sor-global-2023-08-08-light.csv");
        assert_eq!(paths.archive, "sor-global-2023-08-08-light.csv.zip");
        assert_eq!(paths.checksum, "sor-global-2023-08-08-light.csv.zip.sha1");
        assert_eq!(paths, ArchivePaths::new(date, "global", Variant::Light));
    }
}
